// src/flows/mod.rs

//! Page workflows built on the watch core.
//!
//! - [`jira`]: Jira login and websudo watchers, license inspection and update.
//! - [`atlassian`]: my.atlassian.com login watchers and evaluation license
//!   generation.
//!
//! Every suspension point inside a flow goes through [`step`], so a flow
//! stops at its next action once its scope ends.

pub mod atlassian;
pub mod jira;

use std::future::Future;

use crate::errors::HandlerError;
use crate::watch::Scope;

/// Await `fut` unless `scope` ends first.
///
/// The scope's cause becomes [`HandlerError::Interrupted`]; the action's own
/// error is converted into a [`HandlerError`].
pub async fn step<T, E, F>(scope: &Scope, fut: F) -> Result<T, HandlerError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<HandlerError>,
{
    scope.run_until_cancelled(fut).await?.map_err(Into::into)
}
