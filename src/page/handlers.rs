// src/page/handlers.rs

//! Handler registry shared by page implementations.
//!
//! A page driver owns one [`HandlerTable`] and feeds it visibility
//! observations; the table decides when a handler fires:
//!
//! - once per rising edge (hidden → visible) of its locator,
//! - never while the previous invocation of the same registration runs,
//! - never after the registration is removed.
//!
//! Registration, removal and observation may happen concurrently from any
//! task; the table is guarded by a single mutex that is never held across an
//! `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::{Handler, HandlerId, Locator};

struct Entry {
    locator: Locator,
    handler: Handler,
    visible: bool,
    running: Arc<AtomicBool>,
}

#[derive(Default)]
pub struct HandlerTable {
    next_id: AtomicU64,
    entries: Mutex<HashMap<HandlerId, Entry>>,
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerTable")
            .field("registered", &self.len())
            .finish()
    }
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, locator: Locator, handler: Handler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        debug!(handler = %id, %locator, "registering locator handler");
        self.lock().insert(
            id,
            Entry {
                locator,
                handler,
                visible: false,
                running: Arc::new(AtomicBool::new(false)),
            },
        );
        id
    }

    /// Returns `false` if `id` was not registered (already removed).
    pub fn remove(&self, id: HandlerId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            debug!(handler = %id, "removed locator handler");
        } else {
            trace!(handler = %id, "handler already removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: HandlerId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Current registrations, for drivers that poll each locator.
    pub fn snapshot(&self) -> Vec<(HandlerId, Locator)> {
        let mut out: Vec<_> = self
            .lock()
            .iter()
            .map(|(id, entry)| (*id, entry.locator.clone()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    /// Record whether registration `id`'s locator is visible right now.
    ///
    /// Returns the invocation to run if this observation is a rising edge.
    pub fn observe(&self, id: HandlerId, visible: bool) -> Option<Dispatch> {
        let mut entries = self.lock();
        let entry = entries.get_mut(&id)?;
        Self::edge(id, entry, visible)
    }

    /// Like [`observe`](Self::observe) for every registration on `locator`.
    pub fn observe_locator(&self, locator: &Locator, visible: bool) -> Vec<Dispatch> {
        let mut entries = self.lock();
        let mut out: Vec<_> = entries
            .iter_mut()
            .filter(|(_, entry)| &entry.locator == locator)
            .filter_map(|(id, entry)| Self::edge(*id, entry, visible))
            .collect();
        out.sort_by_key(|d| d.id);
        out
    }

    fn edge(id: HandlerId, entry: &mut Entry, visible: bool) -> Option<Dispatch> {
        let rising = visible && !entry.visible;
        entry.visible = visible;
        if !rising {
            return None;
        }
        if entry.running.swap(true, Ordering::AcqRel) {
            trace!(handler = %id, "locator reappeared while handler still running; skipping");
            return None;
        }
        Some(Dispatch {
            id,
            locator: entry.locator.clone(),
            handler: Arc::clone(&entry.handler),
            guard: RunningGuard(Arc::clone(&entry.running)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<HandlerId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One pending handler invocation produced by a rising edge.
///
/// The registration counts as running until the spawned handler finishes, or
/// until the dispatch is dropped unspawned.
pub struct Dispatch {
    id: HandlerId,
    locator: Locator,
    handler: Handler,
    guard: RunningGuard,
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch")
            .field("id", &self.id)
            .field("locator", &self.locator)
            .finish_non_exhaustive()
    }
}

struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Dispatch {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Run the handler on its own Tokio task.
    pub fn spawn(self) -> JoinHandle<()> {
        let Dispatch {
            id,
            locator,
            handler,
            guard,
        } = self;
        debug!(handler = %id, %locator, "locator visible; invoking handler");
        tokio::spawn(async move {
            let _guard = guard;
            handler(locator).await;
        })
    }
}
