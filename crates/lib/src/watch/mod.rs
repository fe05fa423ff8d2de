//! Live subscriptions to sub-trees.
//!
//! [`Watch`] keeps a snapshot of the document at a path and turns committed
//! writes into events:
//!
//! 1. On subscribe the watch registers with the store's dispatcher, then
//!    reads the current document and emits one [`WatchEvent::Value`]. The
//!    read reports the sequence number of the last write it reflects; queued
//!    changes numbered at or below it are dropped, the rest are applied.
//! 2. For every committed change touching the sub-tree it copies the
//!    snapshot, applies the change to the copy, and emits
//!    `child_removed`/`child_added`/`child_changed` for the direct children
//!    that differ, followed by `value`. `value` is emitted even when the
//!    change left the snapshot as it was.
//! 3. [`Watch::close`] (or dropping the watch) stops it. No event is
//!    delivered after close, and closing twice is fine.
//!
//! If the initial read fails or the engine feed goes away, the watch emits a
//! single [`WatchEvent::Error`] and closes itself.

mod diff;
pub(crate) mod dispatcher;

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU8, Ordering},
};

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{Instrument, debug, info_span, warn};

use crate::{
    backend::Backend,
    document::Document,
    path::Path,
    tree,
};

use dispatcher::{Delivery, Dispatcher, MutationReceiver, SubscriptionId};

/// An event emitted by a [`Watch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// The complete document at the watched path; `None` when nothing is stored.
    Value(Option<Document>),
    /// A direct child appeared.
    ChildAdded { key: String, value: Document },
    /// A direct child was replaced by a different value.
    ChildChanged { key: String, value: Document },
    /// A direct child disappeared; `value` is what it held before.
    ChildRemoved { key: String, value: Document },
    /// The watch failed and has closed.
    Error(String),
}

impl WatchEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            WatchEvent::Value(_) => "value",
            WatchEvent::ChildAdded { .. } => "child_added",
            WatchEvent::ChildChanged { .. } => "child_changed",
            WatchEvent::ChildRemoved { .. } => "child_removed",
            WatchEvent::Error(_) => "error",
        }
    }

    /// Child key for child-level events.
    pub fn key(&self) -> Option<&str> {
        match self {
            WatchEvent::ChildAdded { key, .. }
            | WatchEvent::ChildChanged { key, .. }
            | WatchEvent::ChildRemoved { key, .. } => Some(key),
            WatchEvent::Value(_) | WatchEvent::Error(_) => None,
        }
    }
}

/// Lifecycle of a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WatchState {
    /// Seeding the snapshot.
    Initializing = 0,
    /// Applying changes as they are committed.
    Live = 1,
    /// Terminal.
    Closed = 2,
}

impl WatchState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WatchState::Initializing,
            1 => WatchState::Live,
            _ => WatchState::Closed,
        }
    }
}

/// State shared by a watch, its handles, and its task.
struct Shared {
    path: Path,
    subscription: SubscriptionId,
    dispatcher: Dispatcher,
    state: AtomicU8,
    cancelled: AtomicBool,
}

impl Shared {
    fn state(&self) -> WatchState {
        WatchState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WatchState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns `true` only for the call that actually closed the watch.
    fn close(&self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.set_state(WatchState::Closed);
        self.dispatcher.unregister(self.subscription);
        debug!(path = %self.path, "watch closed");
        true
    }
}

/// A live subscription to the document at a path.
///
/// Created by [`Store::watch`](crate::Store::watch).
pub struct Watch {
    shared: Arc<Shared>,
    events: mpsc::UnboundedReceiver<WatchEvent>,
    task: JoinHandle<()>,
}

impl Watch {
    /// Starts the watch task. The registration must already exist so that no
    /// change committed after this call is missed.
    pub(crate) fn spawn(
        backend: Arc<dyn Backend>,
        path: Path,
        dispatcher: Dispatcher,
        subscription: SubscriptionId,
        mutations: MutationReceiver,
    ) -> Self {
        let shared = Arc::new(Shared {
            path: path.clone(),
            subscription,
            dispatcher,
            state: AtomicU8::new(WatchState::Initializing as u8),
            cancelled: AtomicBool::new(false),
        });
        let (tx, events) = mpsc::unbounded_channel();
        let task = tokio::spawn(
            run(backend, Arc::clone(&shared), mutations, tx)
                .instrument(info_span!("watch", path = %path)),
        );
        Self {
            shared,
            events,
            task,
        }
    }

    /// Waits for the next event. Returns `None` once the watch is closed.
    pub async fn recv(&mut self) -> Option<WatchEvent> {
        if self.shared.is_cancelled() {
            return None;
        }
        let event = self.events.recv().await?;
        // An event may have been queued just before a concurrent close.
        if self.shared.is_cancelled() {
            return None;
        }
        Some(event)
    }

    /// Returns an event if one is ready, without waiting.
    pub fn try_recv(&mut self) -> Option<WatchEvent> {
        if self.shared.is_cancelled() {
            return None;
        }
        self.events.try_recv().ok()
    }

    /// The watched path.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn state(&self) -> WatchState {
        self.shared.state()
    }

    /// A handle that can close this watch from another task.
    pub fn handle(&self) -> WatchHandle {
        WatchHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Stops the watch. Idempotent.
    pub fn close(&self) {
        if self.shared.close() {
            self.task.abort();
        }
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watch")
            .field("path", &self.shared.path)
            .field("state", &self.shared.state())
            .finish()
    }
}

/// Clonable handle for closing a [`Watch`] from elsewhere.
#[derive(Clone)]
pub struct WatchHandle {
    shared: Arc<Shared>,
}

impl WatchHandle {
    /// Stops the watch. Idempotent, and safe while the watch is mid-diff: the
    /// task checks for cancellation before every event it emits.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn state(&self) -> WatchState {
        self.shared.state()
    }
}

/// Forwards events to the subscriber unless the watch has been cancelled.
struct Emitter {
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<WatchEvent>,
}

impl Emitter {
    fn emit(&self, event: WatchEvent) -> bool {
        !self.shared.is_cancelled() && self.tx.send(event).is_ok()
    }

    /// Emits a terminal error and closes the watch.
    ///
    /// The error stays queued for the subscriber; the channel ends once the
    /// task returns.
    fn fail(&self, message: String) {
        warn!(path = %self.shared.path, "{message}");
        self.emit(WatchEvent::Error(message));
        self.shared.set_state(WatchState::Closed);
        self.shared.dispatcher.unregister(self.shared.subscription);
    }
}

async fn run(
    backend: Arc<dyn Backend>,
    shared: Arc<Shared>,
    mut deliveries: MutationReceiver,
    tx: mpsc::UnboundedSender<WatchEvent>,
) {
    let path = shared.path.clone();
    let emitter = Emitter {
        shared: Arc::clone(&shared),
        tx,
    };

    let (seeded_at, mut snapshot) = match tree::read_at(backend.as_ref(), &path).await {
        Ok(seeded) => seeded,
        Err(e) => {
            emitter.fail(format!("initial read failed: {e}"));
            return;
        }
    };
    drop(backend);

    if shared.is_cancelled() {
        return;
    }
    shared.set_state(WatchState::Live);
    if !emitter.emit(WatchEvent::Value(snapshot.clone())) {
        return;
    }

    while let Some(Delivery { sequence, mutations: batch }) = deliveries.recv().await {
        if sequence <= seeded_at {
            debug!(sequence, seeded_at, "skipping change already in seed");
            continue;
        }
        // The snapshot handed out with earlier events is never mutated.
        let mut next = snapshot.clone();
        for mutation in &batch {
            if let Err(e) = diff::apply(&mut next, &path, mutation) {
                emitter.fail(format!("cannot apply change: {e}"));
                return;
            }
        }
        let events = diff::diff(snapshot.as_ref(), next.as_ref());
        snapshot = next;
        debug!(sequence, mutations = batch.len(), events = events.len(), "applied change");
        for event in events {
            if !emitter.emit(event) {
                return;
            }
        }
    }

    if !shared.is_cancelled() {
        emitter.fail("change feed closed".to_string());
    }
}
