// src/watch/mod.rs

//! Reactive handler orchestration.
//!
//! - [`scope`]: cancellation scopes that carry a cause (`Done`, `Canceled`,
//!   `DeadlineExceeded`, `Failed`), first cause wins.
//! - [`watcher`]: watch one locator and run a reaction, see [`run_watch`].
//! - [`group`]: run several watchers under one shared scope.
//! - [`probe`]: expected-absence helpers.
//! - [`error`]: [`WatchError`].
//!
//! Nothing here knows about a concrete page: the only requirement on the
//! target is [`crate::page::ObservableTarget`].

pub mod error;
pub mod group;
pub mod probe;
pub mod scope;
pub mod watcher;

pub use error::WatchError;
pub use group::{GroupPolicy, WatchGroup};
pub use probe::{Probe, absorb_timeout, probe_absence};
pub use scope::{Cause, Scope};
pub use watcher::{Reaction, ReactionFuture, Watcher, run_watch};
