//! The document store facade.
//!
//! [`Store`] ties the pieces together: it plans writes with [`crate::tree`],
//! commits them to a [`Backend`] as single atomic batches, rebuilds documents
//! on read, generates push ids, and hands out [`Watch`]es fed by one shared
//! dispatcher.

use std::sync::Arc;

use handle_trait::Handle;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    Result,
    backend::{Backend, Mutation},
    clock::{Clock, SystemClock},
    document::Document,
    key::Key,
    path::Path,
    push_id::PushIdGenerator,
    tree,
    watch::{Watch, dispatcher::Dispatcher},
};

/// A hierarchical JSON document store over an ordered key-value engine.
///
/// Cloning is cheap and every clone shares the same engine, dispatcher,
/// push-id generator and write lock.
///
/// Writes are serialized per store: each write plans against the current
/// state and commits before the next one plans, so two writes to the same
/// path never merge.
///
/// # Example
/// ```
/// # use livetree::{Store, backend::database::InMemory};
/// # use serde_json::json;
/// # #[tokio::main]
/// # async fn main() -> livetree::Result<()> {
/// let store = Store::new(Box::new(InMemory::new()));
/// store.put("users/eugene", json!({"name": "Eugene"})).await?;
///
/// let name = store.get("users/eugene/name").await?;
/// assert_eq!(name.unwrap().to_json(), json!("Eugene"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Handle)]
pub struct Store {
    backend: Arc<dyn Backend>,
    dispatcher: Dispatcher,
    push_ids: Arc<PushIdGenerator>,
    /// Held from planning a write until its batch is committed.
    write_lock: Arc<Mutex<()>>,
}

impl Store {
    /// Creates a store over `backend`.
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self::new_impl(Arc::from(backend), Arc::new(SystemClock))
    }

    /// Creates a store whose push ids take their time from `clock`.
    ///
    /// Only available with the `testing` feature or in test builds.
    #[cfg(any(test, feature = "testing"))]
    pub fn with_clock(backend: Box<dyn Backend>, clock: Arc<dyn Clock>) -> Self {
        Self::new_impl(Arc::from(backend), clock)
    }

    fn new_impl(backend: Arc<dyn Backend>, clock: Arc<dyn Clock>) -> Self {
        info!("store opened");
        Self {
            backend,
            dispatcher: Dispatcher::new(),
            push_ids: Arc::new(PushIdGenerator::new(clock)),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The engine this store writes to.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Stores `value` at `path`, replacing whatever was there.
    ///
    /// The whole sub-tree at `path` is replaced: children missing from `value`
    /// are removed, and a scalar stored at `path` or above it is overwritten.
    pub async fn put(&self, path: &str, value: impl Into<Document>) -> Result<()> {
        let path = Path::parse(path);
        let value: Document = value.into();
        let _guard = self.write_lock.lock().await;
        let plan = tree::plan_put(&self.backend, &path, &value).await?;
        self.commit(&path, plan).await
    }

    /// Reads the document at `path`. `Ok(None)` when nothing is stored there.
    pub async fn get(&self, path: &str) -> Result<Option<Document>> {
        let path = Path::parse(path);
        tree::read(self.backend.as_ref(), &path).await
    }

    /// Stores `value` under a fresh child of `path` and returns the child key.
    ///
    /// Keys from one store sort in creation order.
    pub async fn push(&self, path: &str, value: impl Into<Document>) -> Result<String> {
        let id = self.push_ids.generate();
        let path = Path::parse(path).child(id.clone())?;
        let value: Document = value.into();
        let _guard = self.write_lock.lock().await;
        let plan = tree::plan_put(&self.backend, &path, &value).await?;
        self.commit(&path, plan).await?;
        Ok(id)
    }

    /// Removes `path` and everything below it. Removing an absent path is a
    /// no-op.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let path = Path::parse(path);
        let _guard = self.write_lock.lock().await;
        let plan = tree::plan_delete(&self.backend, &path).await?;
        self.commit(&path, plan).await
    }

    /// Watches the document at `path`.
    ///
    /// The first event is always a [`WatchEvent::Value`](crate::WatchEvent::Value)
    /// with the current document.
    pub async fn watch(&self, path: &str) -> Result<Watch> {
        let path = Path::parse(path);
        let (subscription, mutations) = self
            .dispatcher
            .register(&self.backend, Key::subtree(&path))?;
        debug!(%path, subscription, "watch registered");
        Ok(Watch::spawn(
            Arc::clone(&self.backend),
            path,
            self.dispatcher.clone(),
            subscription,
            mutations,
        ))
    }

    /// Number of open watches.
    pub fn watch_count(&self) -> usize {
        self.dispatcher.len()
    }

    async fn commit(&self, path: &Path, plan: Vec<Mutation>) -> Result<()> {
        if plan.is_empty() {
            debug!(%path, "nothing to commit");
            return Ok(());
        }
        let mutations = plan.len();
        self.backend.batch(plan).await?;
        debug!(%path, mutations, "committed");
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("watches", &self.dispatcher.len())
            .finish_non_exhaustive()
    }
}
