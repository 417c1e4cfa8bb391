// src/engine/mod.rs

//! Renewal engine.
//!
//! - [`session`]: the shared my.atlassian.com page, opened at most once and
//!   only when a license actually has to be generated.
//! - [`renewer`]: processes instances one after another. Per instance the
//!   Jira auth watchers run concurrently with the renewal steps under an
//!   instance scope:
//!
//! ```text
//! root scope ──► instance scope (optional deadline)
//!                  ├─► auth scope ──► jira-login, jira-websudo watchers
//!                  └─► renewal steps: license details ─► server id
//!                                     ─► evaluation key ─► update
//! root scope ──► atlassian login scope ──► atlassian login watchers
//! ```
//!
//! A failing instance is recorded and the next one is processed. A failure
//! of the Atlassian login cancels the root scope, which ends the run.

use chrono::NaiveDate;

pub mod renewer;
pub mod session;

pub use renewer::{Renewer, RunSummary};
pub use session::{AtlassianSession, SESSION_WATCHER};

/// How processing one instance ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceOutcome {
    /// A fresh evaluation license was installed.
    Renewed {
        server_id: String,
        previous_expiry: Option<NaiveDate>,
    },
    /// The trial has enough time left.
    Skipped { expires_at: NaiveDate },
}
