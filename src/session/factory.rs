use std::sync::Arc;

use tracing::info_span;

use crate::db::Storage;
use crate::session::{SessionError, SessionHandle};

/// Builds the session handle for a document identifier.
///
/// Construction must stay cheap: the registry calls it while holding its
/// lock.
pub trait SessionFactory: Send + Sync {
    fn build(&self, doc_id: &str) -> Result<SessionHandle, SessionError>;
}

/// Binds every session to the process-wide operation log storage
pub struct LogSessionFactory {
    storage: Arc<dyn Storage>,
}

impl LogSessionFactory {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

impl SessionFactory for LogSessionFactory {
    fn build(&self, doc_id: &str) -> Result<SessionHandle, SessionError> {
        self.storage
            .check()
            .map_err(|e| SessionError::BackendUnavailable(e.to_string()))?;
        let span = info_span!("session", doc = %doc_id);
        Ok(SessionHandle::new(doc_id, self.storage.clone(), span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{FileStorage, MemStorage};

    #[test]
    fn builds_handle_for_identifier() {
        let factory = LogSessionFactory::new(Arc::new(MemStorage::new()));
        let handle = factory.build("doc/with/slashes").unwrap();
        assert_eq!(handle.id(), "doc/with/slashes");
        assert_eq!(handle.connection_count(), 0);
    }

    #[test]
    fn missing_storage_directory_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("store");
        let storage = FileStorage::open(&root).unwrap();
        std::fs::remove_dir_all(&root).unwrap();

        let factory = LogSessionFactory::new(Arc::new(storage));
        assert!(matches!(factory.build("doc"), Err(SessionError::BackendUnavailable(_))));
    }
}
