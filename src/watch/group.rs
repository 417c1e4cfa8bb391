// src/watch/group.rs

//! Several watchers racing on one target under one shared scope.
//!
//! ```text
//! caller scope
//!    └─► group scope ─┬─► watcher "username"
//!                     ├─► watcher "password"
//!                     └─► watcher "otp"
//! ```
//!
//! All watchers run concurrently on the caller's task (no spawning, so the
//! target is only borrowed). Outcome rules:
//!
//! - The first watcher failure is the group's result. It is fanned out by
//!   cancelling the group scope with that failure, which interrupts watchers
//!   still waiting. Reactions already running are not aborted; they see the
//!   cancellation at their next suspension point and their outcome is
//!   discarded.
//! - [`GroupPolicy::AllSettled`]: succeed once every watcher completed.
//! - [`GroupPolicy::FirstSettled`]: succeed as soon as one watcher completed;
//!   the rest are interrupted with [`Cause::Done`].
//! - If the caller's scope ends first, the group reports
//!   [`WatchError::Interrupted`] with that cause.
//!
//! The group always waits for every member to reach a terminal state before
//! returning, so no handler stays registered after `run` returns. The result
//! does not depend on the order in which members fire.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info, warn};

use crate::page::ObservableTarget;

use super::{Cause, Scope, WatchError, Watcher};

/// When a group counts as successfully settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupPolicy {
    /// Every member must complete.
    #[default]
    AllSettled,
    /// The first member to complete concludes the group.
    FirstSettled,
}

/// A set of watchers for one logical wait point. Consumed by [`run`](Self::run).
#[derive(Debug)]
pub struct WatchGroup {
    name: String,
    policy: GroupPolicy,
    watchers: Vec<Watcher>,
}

impl WatchGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy: GroupPolicy::default(),
            watchers: Vec::new(),
        }
    }

    pub fn with_policy(mut self, policy: GroupPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with(mut self, watcher: Watcher) -> Self {
        self.watchers.push(watcher);
        self
    }

    pub fn push(&mut self, watcher: Watcher) {
        self.watchers.push(watcher);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> GroupPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Run every member against `target` until the group settles.
    pub async fn run<T>(self, target: &T, parent: &Scope) -> Result<(), WatchError>
    where
        T: ObservableTarget + ?Sized,
    {
        let total = self.watchers.len();
        if total == 0 {
            return Ok(());
        }

        let scope = parent.child();
        debug!(group = %self.name, members = total, policy = ?self.policy, "starting watch group");

        let mut running: FuturesUnordered<_> = self
            .watchers
            .iter()
            .map(|watcher| {
                let scope = &scope;
                async move { (watcher.name(), watcher.run(target, scope).await) }
            })
            .collect();

        let mut completed = 0usize;
        let mut first_failure: Option<WatchError> = None;

        while let Some((name, res)) = running.next().await {
            match res {
                Ok(()) => {
                    completed += 1;
                    debug!(group = %self.name, watcher = %name, completed, total, "group member completed");
                    if self.policy == GroupPolicy::FirstSettled {
                        scope.cancel(Cause::Done);
                    }
                }
                Err(err) if err.is_external() => {
                    debug!(group = %self.name, watcher = %name, error = %err, "group member interrupted");
                }
                Err(err) => {
                    if first_failure.is_none() {
                        warn!(group = %self.name, watcher = %name, error = %err, "group member failed");
                        scope.cancel(Cause::Failed(Arc::new(err.clone())));
                        first_failure = Some(err);
                    } else {
                        debug!(group = %self.name, watcher = %name, error = %err, "further group member failure");
                    }
                }
            }
        }
        drop(running);

        if let Some(err) = first_failure {
            return Err(err);
        }

        let settled = completed == total
            || (self.policy == GroupPolicy::FirstSettled && completed > 0);
        if settled {
            info!(group = %self.name, completed, total, "watch group settled");
            return Ok(());
        }

        let cause = scope.cause().unwrap_or(Cause::Canceled);
        debug!(group = %self.name, %cause, "watch group interrupted");
        Err(WatchError::Interrupted {
            watcher: self.name,
            cause,
        })
    }
}
