use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, Span};

use crate::db::Storage;
use crate::models::Operation;
use crate::session::SessionError;

/// Live binding of one document identifier to its operation log.
///
/// Shared by every connection for the document. Ordering of operations is
/// owned by the storage backend; the handle only fans out change
/// notifications to streaming connections and long polls.
pub struct SessionHandle {
    id: String,
    storage: Arc<dyn Storage>,
    span: Span,
    // Bumped after every append that stored at least one operation.
    generation: watch::Sender<u64>,
    shutdown: watch::Sender<bool>,
    connections: AtomicUsize,
}

impl SessionHandle {
    pub fn new(id: &str, storage: Arc<dyn Storage>, span: Span) -> Self {
        let (generation, _) = watch::channel(0);
        let (shutdown, _) = watch::channel(false);
        Self {
            id: id.to_string(),
            storage,
            span,
            generation,
            shutdown,
            connections: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Count a connection as open until the returned guard is dropped
    pub(crate) fn track_connection(&self) -> ConnectionGuard<'_> {
        self.connections.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard(&self.connections)
    }

    pub(crate) fn watch_changes(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    pub(crate) fn watch_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Signal every streaming connection of this session to finish
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    /// Append operations and wake subscribers if anything new was stored.
    pub async fn append(&self, ops: Vec<Operation>) -> Result<Vec<Operation>, SessionError> {
        let submitted = ops.len();
        let accepted = self.storage.append(&self.id, ops).await?;
        debug!(parent: &self.span, "Appended {}/{} operations", accepted.len(), submitted);
        if !accepted.is_empty() {
            self.generation.send_modify(|g| *g += 1);
        }
        Ok(accepted)
    }

    pub async fn get_since(&self, version: u64, limit: usize) -> Result<Vec<Operation>, SessionError> {
        Ok(self.storage.read(&self.id, version, limit).await?)
    }

    /// Like [`get_since`](Self::get_since), but waits up to `wait` for
    /// operations to appear when none are available yet.
    pub async fn wait_since(
        &self,
        version: u64,
        limit: usize,
        wait: Duration,
    ) -> Result<Vec<Operation>, SessionError> {
        // Subscribe before reading so an append in between is not missed.
        let mut changes = self.watch_changes();
        let ops = self.get_since(version, limit).await?;
        if !ops.is_empty() || wait.is_zero() {
            return Ok(ops);
        }

        let deadline = tokio::time::sleep(wait);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        return Ok(Vec::new());
                    }
                    let ops = self.get_since(version, limit).await?;
                    if !ops.is_empty() {
                        return Ok(ops);
                    }
                }
                _ = &mut deadline => return Ok(Vec::new()),
            }
        }
    }
}

pub(crate) struct ConnectionGuard<'a>(&'a AtomicUsize);

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemStorage;
    use serde_json::json;

    fn handle() -> Arc<SessionHandle> {
        Arc::new(SessionHandle::new("doc", Arc::new(MemStorage::new()), Span::none()))
    }

    #[tokio::test]
    async fn append_then_read() {
        let session = handle();
        let accepted = session
            .append(vec![Operation::new("a", json!({"insert": "x"}))])
            .await
            .unwrap();
        assert_eq!(accepted[0].version, Some(0));

        let ops = session.get_since(0, 10).await.unwrap();
        assert_eq!(ops, accepted);
    }

    #[tokio::test]
    async fn wait_since_returns_empty_after_timeout() {
        let session = handle();
        let ops = session.wait_since(0, 10, Duration::from_millis(20)).await.unwrap();
        assert!(ops.is_empty());
    }

    #[tokio::test]
    async fn wait_since_wakes_on_append() {
        let session = handle();
        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.wait_since(0, 10, Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        session.append(vec![Operation::new("late", json!(1))]).await.unwrap();

        let ops = waiter.await.unwrap().unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].id, "late");
    }

    #[test]
    fn connection_guard_tracks_open_connections() {
        let session = handle();
        let first = session.track_connection();
        let second = session.track_connection();
        assert_eq!(session.connection_count(), 2);
        drop(first);
        assert_eq!(session.connection_count(), 1);
        drop(second);
        assert_eq!(session.connection_count(), 0);
    }

    #[tokio::test]
    async fn close_is_observable() {
        let session = handle();
        let mut shutdown = session.watch_shutdown();
        assert!(!session.is_closed());
        session.close();
        shutdown.changed().await.unwrap();
        assert!(session.is_closed());
    }
}
