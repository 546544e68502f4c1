use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::session::{SessionError, SessionFactory, SessionHandle};

/// Maps document identifiers to their session handles.
///
/// At most one handle is ever published per identifier. Identifiers are
/// used verbatim: no case folding or other normalization.
pub struct SessionRegistry {
    factory: Arc<dyn SessionFactory>,
    sessions: Mutex<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<SessionHandle>>> {
        // The map is never left half-updated, so a poisoned lock is still usable.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the handle for `doc_id`, building it on first access.
    ///
    /// Construction is cheap and runs under the lock, which makes the
    /// existence check and the insert one atomic step. A failed build
    /// leaves no entry behind, so the next request retries from scratch.
    pub fn get_or_create(&self, doc_id: &str) -> Result<Arc<SessionHandle>, SessionError> {
        let mut sessions = self.lock();
        if let Some(handle) = sessions.get(doc_id) {
            return Ok(handle.clone());
        }

        let handle = match self.factory.build(doc_id) {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                warn!("Failed to create session for '{}': {}", doc_id, e);
                return Err(e);
            }
        };
        sessions.insert(doc_id.to_string(), handle.clone());
        info!("Session created for '{}' ({} active)", doc_id, sessions.len());
        Ok(handle)
    }

    pub fn get(&self, doc_id: &str) -> Option<Arc<SessionHandle>> {
        self.lock().get(doc_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Open streaming connections across all sessions
    pub fn connection_count(&self) -> usize {
        self.lock().values().map(|h| h.connection_count()).sum()
    }

    /// Drop every session and tell its connections to finish.
    pub fn shutdown(&self) {
        let drained: Vec<_> = self.lock().drain().collect();
        for (_, handle) in &drained {
            handle.close();
        }
        info!("Session registry shut down ({} sessions closed)", drained.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemStorage, Storage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use tracing::Span;

    struct CountingFactory {
        storage: Arc<dyn Storage>,
        builds: AtomicUsize,
        // Number of builds that fail before construction succeeds
        failures: AtomicUsize,
    }

    impl CountingFactory {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                storage: Arc::new(MemStorage::new()),
                builds: AtomicUsize::new(0),
                failures: AtomicUsize::new(failures),
            })
        }
    }

    impl SessionFactory for CountingFactory {
        fn build(&self, doc_id: &str) -> Result<SessionHandle, SessionError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(SessionError::BackendUnavailable("backend offline".into()));
            }
            Ok(SessionHandle::new(doc_id, self.storage.clone(), Span::none()))
        }
    }

    #[test]
    fn concurrent_first_access_builds_once() {
        let factory = CountingFactory::new(0);
        let registry = SessionRegistry::new(factory.clone());
        let barrier = Barrier::new(50);

        let handles: Vec<Arc<SessionHandle>> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..50)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        registry.get_or_create("doc-x").unwrap()
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
        assert_eq!(handles.len(), 50);
        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_identifiers_get_distinct_handles() {
        let registry = SessionRegistry::new(CountingFactory::new(0));
        let a = registry.get_or_create("doc-a").unwrap();
        let b = registry.get_or_create("doc-b").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &registry.get_or_create("doc-a").unwrap()));
    }

    #[test]
    fn identifiers_are_case_sensitive() {
        let registry = SessionRegistry::new(CountingFactory::new(0));
        registry.get_or_create("Doc").unwrap();
        registry.get_or_create("doc").unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn failed_construction_is_not_cached() {
        let factory = CountingFactory::new(1);
        let registry = SessionRegistry::new(factory.clone());

        assert!(registry.get_or_create("doc-z").is_err());
        assert!(registry.get("doc-z").is_none());
        assert!(registry.is_empty());

        let handle = registry.get_or_create("doc-z").unwrap();
        assert_eq!(handle.id(), "doc-z");
        assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shutdown_closes_and_forgets_sessions() {
        let registry = SessionRegistry::new(CountingFactory::new(0));
        let handle = registry.get_or_create("doc").unwrap();
        registry.shutdown();
        assert!(handle.is_closed());
        assert!(registry.is_empty());
    }
}
