// src/errors.rs

//! Crate-wide error types.
//!
//! - [`ActionError`]: a page-level action (fill, click, wait, read) failed.
//! - [`ResolveError`]: a credential or interactive-input resolver failed.
//! - [`HandlerError`]: the outcome of a reaction or workflow step.
//! - [`TrialwatchError`]: what the top-level run reports.
//!
//! Watcher and group outcomes live in [`crate::watch::WatchError`].

use std::time::Duration;

use thiserror::Error;

use crate::watch::{Cause, WatchError};

/// Failure of a single page action.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The element did not reach the requested state within the bound.
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    /// The element is not attached to the page at all.
    #[error("element not found: {0}")]
    NotFound(String),

    /// The driver rejected or failed the command.
    #[error("driver error: {0}")]
    Driver(String),

    /// The page (or its driver session) is gone.
    #[error("page closed")]
    Closed,
}

impl ActionError {
    /// True only for "not in the requested state within the bound".
    ///
    /// This is the single condition the expected-absence helpers absorb.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ActionError::Timeout { .. })
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            ActionError::Timeout { .. } => "action_timeout",
            ActionError::NotFound(_) => "action_not_found",
            ActionError::Driver(_) => "action_driver",
            ActionError::Closed => "action_closed",
        }
    }
}

/// Failure of a credential / secret / interactive-input resolver.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("no credentials specified for {0}")]
    Missing(String),

    #[error("environment variable {var} is not set")]
    Env { var: String },

    #[error("reading input: {0}")]
    Input(#[from] std::io::Error),

    #[error("empty {0}")]
    Empty(String),
}

/// Outcome of a reaction or a workflow step.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("resolving {what}: {source}")]
    Resolver {
        what: &'static str,
        #[source]
        source: ResolveError,
    },

    #[error(transparent)]
    Action(#[from] ActionError),

    /// The application answered, but with a rejection (e.g. a login error banner).
    #[error("{stage} error: {message}")]
    Rejected {
        stage: &'static str,
        message: String,
    },

    #[error("could not parse {what} from {value:?}")]
    Parse { what: &'static str, value: String },

    /// The enclosing scope ended while this step was suspended.
    #[error("interrupted: {0}")]
    Interrupted(Cause),
}

impl HandlerError {
    pub fn resolver(what: &'static str, source: ResolveError) -> Self {
        HandlerError::Resolver { what, source }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Resolver { .. } => "handler_resolver",
            HandlerError::Action(_) => "handler_action",
            HandlerError::Rejected { .. } => "handler_rejected",
            HandlerError::Parse { .. } => "handler_parse",
            HandlerError::Interrupted(_) => "handler_interrupted",
        }
    }
}

impl From<Cause> for HandlerError {
    fn from(cause: Cause) -> Self {
        HandlerError::Interrupted(cause)
    }
}

#[derive(Error, Debug)]
pub enum TrialwatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("{stage}: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: HandlerError,
    },

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error("interrupted: {0}")]
    Interrupted(Cause),

    #[error("{0} instance(s) failed")]
    InstancesFailed(usize),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrialwatchError {
    pub fn stage(stage: &'static str, source: impl Into<HandlerError>) -> Self {
        TrialwatchError::Stage {
            stage,
            source: source.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TrialwatchError>;
