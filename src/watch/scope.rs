// src/watch/scope.rs

//! Cancellation scopes that carry a cause.
//!
//! A [`Scope`] wraps a `tokio_util` [`CancellationToken`] and remembers *why*
//! it was cancelled. Scopes form a tree:
//!
//! ```text
//! root ──► group ──► watcher #1
//!                └─► watcher #2
//! ```
//!
//! - The first cause set on a scope (or inherited from an ancestor) wins;
//!   later `cancel` calls are no-ops.
//! - Cancelling a parent cancels every descendant, which then reports the
//!   parent's cause. Cancelling a child never touches its parent or siblings.
//! - [`Scope::cancelled`] parks the caller on the token; nothing polls.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::WatchError;

/// Why a scope ended.
#[derive(Debug, Clone)]
pub enum Cause {
    /// The work the scope was created for completed successfully.
    Done,
    /// Cancelled from outside (Ctrl-C, caller teardown).
    Canceled,
    /// A caller-imposed deadline expired.
    DeadlineExceeded(Duration),
    /// A watcher failed.
    Failed(Arc<WatchError>),
}

impl Cause {
    pub fn as_label(&self) -> &'static str {
        match self {
            Cause::Done => "done",
            Cause::Canceled => "canceled",
            Cause::DeadlineExceeded(_) => "deadline_exceeded",
            Cause::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cause::Done => f.write_str("completed"),
            Cause::Canceled => f.write_str("canceled"),
            Cause::DeadlineExceeded(after) => write!(f, "deadline of {after:?} exceeded"),
            Cause::Failed(err) => write!(f, "{err}"),
        }
    }
}

struct ScopeInner {
    token: CancellationToken,
    cause: OnceLock<Cause>,
    parent: Option<Scope>,
}

/// A node in the cancellation tree. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("cancelled", &self.is_cancelled())
            .field("cause", &self.cause())
            .finish_non_exhaustive()
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::root()
    }
}

impl Scope {
    /// A scope with no parent.
    pub fn root() -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                token: CancellationToken::new(),
                cause: OnceLock::new(),
                parent: None,
            }),
        }
    }

    /// Derive a child that is cancelled whenever `self` is.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                token: self.inner.token.child_token(),
                cause: OnceLock::new(),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Derive a child that cancels itself with [`Cause::DeadlineExceeded`]
    /// once `after` has elapsed.
    ///
    /// Must be called from within a Tokio runtime. The timer task exits as
    /// soon as the child ends for any reason.
    pub fn child_with_deadline(&self, after: Duration) -> Self {
        let child = self.child();
        let timer = child.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.inner.token.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    debug!(?after, "scope deadline reached");
                    timer.cancel(Cause::DeadlineExceeded(after));
                }
            }
        });
        child
    }

    /// Cancel with `cause`. Returns `false` if this scope already had a cause,
    /// own or inherited; the earlier cause is kept.
    pub fn cancel(&self, cause: Cause) -> bool {
        if self.cause().is_some() {
            return false;
        }
        if self.inner.cause.set(cause).is_err() {
            return false;
        }
        self.inner.token.cancel();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// The cause set directly on this scope, ignoring ancestors.
    pub fn own_cause(&self) -> Option<Cause> {
        self.inner.cause.get().cloned()
    }

    /// The effective cause: this scope's own, else the nearest ancestor's.
    pub fn cause(&self) -> Option<Cause> {
        if let Some(cause) = self.inner.cause.get() {
            return Some(cause.clone());
        }
        self.inner.parent.as_ref().and_then(Scope::cause)
    }

    /// Wait until the scope is cancelled and return the effective cause.
    pub async fn cancelled(&self) -> Cause {
        self.inner.token.cancelled().await;
        // Causes are stored before tokens are cancelled, so one is always
        // visible here.
        self.cause().unwrap_or(Cause::Canceled)
    }

    /// Run `fut` unless the scope ends first.
    pub async fn run_until_cancelled<F>(&self, fut: F) -> Result<F::Output, Cause>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            cause = self.cancelled() => Err(cause),
            out = fut => Ok(out),
        }
    }

    /// Sleep for `dur` unless the scope ends first.
    pub async fn sleep(&self, dur: Duration) -> Result<(), Cause> {
        self.run_until_cancelled(tokio::time::sleep(dur)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_cause_wins() {
        let scope = Scope::root();
        assert!(scope.cancel(Cause::Done));
        assert!(!scope.cancel(Cause::Canceled));
        assert!(matches!(scope.cause(), Some(Cause::Done)));
    }

    #[test]
    fn test_child_inherits_parent_cause() {
        let parent = Scope::root();
        let child = parent.child();
        let grandchild = child.child();

        parent.cancel(Cause::DeadlineExceeded(Duration::from_secs(1)));

        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
        assert!(child.own_cause().is_none());
        assert!(matches!(
            grandchild.cause(),
            Some(Cause::DeadlineExceeded(d)) if d == Duration::from_secs(1)
        ));
        // A child cannot overwrite what it inherited.
        assert!(!child.cancel(Cause::Done));
    }

    #[test]
    fn test_child_cancel_does_not_reach_parent_or_sibling() {
        let parent = Scope::root();
        let a = parent.child();
        let b = parent.child();

        a.cancel(Cause::Done);

        assert!(a.is_cancelled());
        assert!(!parent.is_cancelled());
        assert!(!b.is_cancelled());
        assert!(b.cause().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let scope = Scope::root();
        let waiter = {
            let scope = scope.clone();
            tokio::spawn(async move { scope.cancelled().await })
        };

        tokio::task::yield_now().await;
        scope.cancel(Cause::Canceled);

        let cause = waiter.await.unwrap();
        assert!(matches!(cause, Cause::Canceled));
    }

    #[tokio::test]
    async fn test_run_until_cancelled_stops_pending_future() {
        let scope = Scope::root();
        scope.cancel(Cause::Done);

        let res = scope
            .run_until_cancelled(std::future::pending::<()>())
            .await;
        assert!(matches!(res, Err(Cause::Done)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_child_only() {
        let parent = Scope::root();
        let child = parent.child_with_deadline(Duration::from_millis(500));

        let cause = child.cancelled().await;

        assert!(matches!(cause, Cause::DeadlineExceeded(d) if d == Duration::from_millis(500)));
        assert!(!parent.is_cancelled());
    }
}
