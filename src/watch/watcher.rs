// src/watch/watcher.rs

//! Single-pattern watch-and-react.
//!
//! [`run_watch`] binds one [`Reaction`] to one [`Locator`] on a target and
//! parks until a reaction invocation concludes the watch:
//!
//! ```text
//! parent scope
//!    └─► watcher scope ──(registered handler)──► target
//!
//! locator appears ─► target spawns handler ─► reaction(scope, locator)
//!                                              ├─ Ok  ─► cancel(Done)
//!                                              └─ Err ─► cancel(Failed(err))
//! waiter: scope.cancelled() ─► remove handler ─► classify cause
//! ```
//!
//! The reaction runs on the target's task, never on the waiter. If the
//! locator appears several times before the watch ends, each invocation
//! races to set the watcher scope's cause and the first to finish wins; there
//! is no fairness between them. Invocations that start after the watch ended
//! are discarded.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::errors::HandlerError;
use crate::page::{Handler, HandlerFuture, HandlerId, Locator, ObservableTarget};

use super::{Cause, Scope, WatchError};

/// Boxed future returned by a [`Reaction`].
pub type ReactionFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'static>>;

/// What to do when a watched locator appears.
///
/// The scope passed in is the watcher's own: it ends when the watch ends, so
/// reactions should route their suspension points through
/// [`Scope::run_until_cancelled`].
///
/// Implemented for every `Fn(Scope, Locator) -> impl Future<Output = Result<(), HandlerError>>`.
pub trait Reaction: Send + Sync + 'static {
    fn react(&self, scope: Scope, locator: Locator) -> ReactionFuture;
}

impl<F, Fut> Reaction for F
where
    F: Fn(Scope, Locator) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn react(&self, scope: Scope, locator: Locator) -> ReactionFuture {
        Box::pin(self(scope, locator))
    }
}

/// A named (locator, reaction) pair.
#[derive(Clone)]
pub struct Watcher {
    name: Arc<str>,
    locator: Locator,
    reaction: Arc<dyn Reaction>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("name", &self.name)
            .field("locator", &self.locator)
            .finish_non_exhaustive()
    }
}

impl Watcher {
    pub fn new(name: impl AsRef<str>, locator: Locator, reaction: impl Reaction) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            locator,
            reaction: Arc::new(reaction),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// See [`run_watch`].
    pub async fn run<T>(&self, target: &T, parent: &Scope) -> Result<(), WatchError>
    where
        T: ObservableTarget + ?Sized,
    {
        run_watch(target, self, parent).await
    }
}

/// Watch `watcher.locator` on `target` until a reaction concludes the watch
/// or `parent` ends.
///
/// - `Ok(())`: a reaction completed successfully.
/// - `Err(WatchError::Failed)`: a reaction failed; carries its exact error.
/// - `Err(WatchError::Interrupted)`: `parent` ended first (its cause is
///   attached, including [`Cause::Done`] when a sibling or the caller
///   finished normally).
///
/// The handler is registered before the first suspension point and removed
/// on every exit path, including this future being dropped.
pub async fn run_watch<T>(target: &T, watcher: &Watcher, parent: &Scope) -> Result<(), WatchError>
where
    T: ObservableTarget + ?Sized,
{
    let scope = parent.child();

    let id = target
        .add_handler(watcher.locator.clone(), reaction_handler(watcher, &scope))
        .map_err(|source| WatchError::Register {
            watcher: watcher.name.to_string(),
            source,
        })?;
    let registration = Registration {
        target,
        id,
        scope: scope.clone(),
    };

    debug!(watcher = %watcher.name, locator = %watcher.locator, handler = %id, "watching");

    let cause = scope.cancelled().await;
    drop(registration);

    let res = classify(&watcher.name, &scope, cause);
    match &res {
        Ok(()) => debug!(watcher = %watcher.name, "reaction completed"),
        Err(err) => debug!(watcher = %watcher.name, reason = err.as_label(), error = %err, "watch ended"),
    }
    res
}

fn classify(name: &str, scope: &Scope, cause: Cause) -> Result<(), WatchError> {
    match scope.own_cause() {
        Some(Cause::Done) => Ok(()),
        Some(Cause::Failed(err)) => Err(err.as_ref().clone()),
        _ => Err(WatchError::Interrupted {
            watcher: name.to_string(),
            cause,
        }),
    }
}

fn reaction_handler(watcher: &Watcher, scope: &Scope) -> Handler {
    let name = Arc::clone(&watcher.name);
    let reaction = Arc::clone(&watcher.reaction);
    let scope = scope.clone();

    Arc::new(move |locator: Locator| -> HandlerFuture {
        let name = Arc::clone(&name);
        let reaction = Arc::clone(&reaction);
        let scope = scope.clone();

        Box::pin(async move {
            if scope.is_cancelled() {
                trace!(watcher = %name, "invocation after the watch ended; discarded");
                return;
            }

            debug!(watcher = %name, "pattern matched; running reaction");
            let cause = match reaction.react(scope.clone(), locator).await {
                Ok(()) => Cause::Done,
                Err(err) => Cause::Failed(Arc::new(WatchError::Failed {
                    watcher: name.to_string(),
                    source: Arc::new(err),
                })),
            };

            if !scope.cancel(cause) {
                trace!(watcher = %name, "watch already concluded; reaction outcome discarded");
            }
        })
    })
}

/// Removes the handler and ends the watcher scope when dropped.
struct Registration<'a, T: ObservableTarget + ?Sized> {
    target: &'a T,
    id: HandlerId,
    scope: Scope,
}

impl<T: ObservableTarget + ?Sized> Drop for Registration<'_, T> {
    fn drop(&mut self) {
        self.target.remove_handler(self.id);
        self.scope.cancel(Cause::Canceled);
    }
}
