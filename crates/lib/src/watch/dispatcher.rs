//! Fans the engine change feed out to watches.
//!
//! A store owns one dispatcher. The first registration subscribes to the
//! engine feed and starts a task that forwards each committed change to every
//! registered watch whose key range it touches. Every watch receives its
//! mutations in commit order over an unbounded channel, so nothing is dropped
//! or reordered. Each delivery keeps the commit sequence number, which lets a
//! watch skip changes its initial read already reflects.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, OnceLock, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::{
    Result,
    backend::{Backend, BackendError, Change, ChangeFeed, Mutation},
    key::KeyRange,
};

/// Identifies one registration with a dispatcher.
pub(crate) type SubscriptionId = u64;

/// The part of one committed change that falls inside a registration's range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Delivery {
    pub(crate) sequence: u64,
    pub(crate) mutations: Vec<Mutation>,
}

/// Receiving side of a registration: one [`Delivery`] per committed change.
pub(crate) type MutationReceiver = mpsc::UnboundedReceiver<Delivery>;

struct Registration {
    range: KeyRange,
    tx: mpsc::UnboundedSender<Delivery>,
}

#[derive(Default)]
struct DispatcherInner {
    next_id: AtomicU64,
    registrations: Mutex<HashMap<SubscriptionId, Registration>>,
    started: OnceLock<()>,
    feed_closed: AtomicBool,
}

/// Cheap-to-clone handle to a store's dispatcher.
#[derive(Clone, Default)]
pub(crate) struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers interest in every change touching `range`.
    ///
    /// Starts the fan-out task on first use; must be called inside a Tokio
    /// runtime.
    pub(crate) fn register(
        &self,
        backend: &Arc<dyn Backend>,
        range: KeyRange,
    ) -> Result<(SubscriptionId, MutationReceiver)> {
        self.inner.started.get_or_init(|| {
            let feed = backend.subscribe();
            tokio::spawn(
                run(feed, Arc::downgrade(&self.inner)).instrument(info_span!("dispatcher")),
            );
        });

        let mut registrations = self.inner.lock();
        // Checked under the lock so a registration cannot slip past shutdown.
        if self.inner.feed_closed.load(Ordering::Acquire) {
            return Err(BackendError::FeedClosed.into());
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        registrations.insert(id, Registration { range, tx });
        debug!(id, watchers = registrations.len(), "registered watch");
        Ok((id, rx))
    }

    /// Drops a registration. Unknown ids are ignored.
    pub(crate) fn unregister(&self, id: SubscriptionId) {
        if self.inner.lock().remove(&id).is_some() {
            debug!(id, "unregistered watch");
        }
    }

    /// Number of live registrations.
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

impl DispatcherInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, Registration>> {
        self.registrations.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dispatch(&self, change: Change) {
        let sequence = change.sequence;
        let mutations = change.event.into_mutations();
        let mut registrations = self.lock();
        registrations.retain(|_, registration| {
            let matching: Vec<Mutation> = mutations
                .iter()
                .filter(|m| registration.range.contains(m.key()))
                .cloned()
                .collect();
            matching.is_empty()
                || registration
                    .tx
                    .send(Delivery {
                        sequence,
                        mutations: matching,
                    })
                    .is_ok()
        });
    }

    fn shut_down(&self) {
        let mut registrations = self.lock();
        self.feed_closed.store(true, Ordering::Release);
        // Dropping the senders tells every watch the feed is gone.
        registrations.clear();
    }
}

async fn run(mut feed: ChangeFeed, inner: Weak<DispatcherInner>) {
    info!("dispatcher started");
    while let Some(change) = feed.recv().await {
        let Some(inner) = inner.upgrade() else {
            info!("store dropped, dispatcher stopping");
            return;
        };
        inner.dispatch(change);
    }
    warn!("change feed closed");
    if let Some(inner) = inner.upgrade() {
        inner.shut_down();
    }
}
