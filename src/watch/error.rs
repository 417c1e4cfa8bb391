// src/watch/error.rs

use std::sync::Arc;

use thiserror::Error;

use crate::errors::{ActionError, HandlerError};

use super::Cause;

/// Terminal outcome of a watcher or a watch group, other than success.
///
/// Cloneable so the same failure can be stored as a scope [`Cause`] and
/// returned to the caller.
#[derive(Error, Debug, Clone)]
pub enum WatchError {
    /// The watcher's own reaction failed.
    #[error("{watcher}: {source}")]
    Failed {
        watcher: String,
        #[source]
        source: Arc<HandlerError>,
    },

    /// Something outside the watcher concluded the wait: a sibling failure,
    /// the parent scope finishing or being cancelled, or a caller deadline.
    #[error("{watcher} interrupted: {cause}")]
    Interrupted { watcher: String, cause: Cause },

    /// The target refused the handler registration.
    #[error("{watcher}: registering handler: {source}")]
    Register {
        watcher: String,
        #[source]
        source: ActionError,
    },
}

impl WatchError {
    /// True when the watcher did not fail by itself.
    pub fn is_external(&self) -> bool {
        matches!(self, WatchError::Interrupted { .. })
    }

    pub fn watcher(&self) -> &str {
        match self {
            WatchError::Failed { watcher, .. }
            | WatchError::Interrupted { watcher, .. }
            | WatchError::Register { watcher, .. } => watcher,
        }
    }

    /// The reaction error, if the watcher failed by itself.
    pub fn handler_error(&self) -> Option<&HandlerError> {
        match self {
            WatchError::Failed { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }

    /// The interruption cause, if the wait was concluded from outside.
    pub fn interrupt_cause(&self) -> Option<&Cause> {
        match self {
            WatchError::Interrupted { cause, .. } => Some(cause),
            _ => None,
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            WatchError::Failed { .. } => "watch_failed",
            WatchError::Interrupted { .. } => "watch_interrupted",
            WatchError::Register { .. } => "watch_register",
        }
    }
}
