use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use thiserror::Error;

use crate::models::Operation;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt operation log for '{doc_id}': {source}")]
    Corrupt {
        doc_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode operation: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Durable operation log keyed by document id and operation sequence.
///
/// One instance is shared by every session in the process. Implementations
/// must serialize appends per document.
pub trait Storage: Send + Sync {
    /// Append operations to the document log.
    ///
    /// Operations whose id is already stored are dropped. The accepted
    /// operations are returned with their assigned versions.
    fn append<'a>(&'a self, doc_id: &'a str, ops: Vec<Operation>) -> StoreFuture<'a, Vec<Operation>>;

    /// Read at most `limit` operations starting at `version`.
    fn read<'a>(&'a self, doc_id: &'a str, version: u64, limit: usize) -> StoreFuture<'a, Vec<Operation>>;

    /// Cheap readiness probe, used before handing out new sessions.
    fn check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// In-memory operation log of a single document
#[derive(Debug, Default)]
pub struct DocLog {
    ops: Vec<Operation>,
    ids: HashSet<String>,
}

impl DocLog {
    pub fn from_ops(ops: Vec<Operation>) -> Self {
        let ids = ops.iter().map(|op| op.id.clone()).collect();
        Self { ops, ids }
    }

    pub fn len(&self) -> u64 {
        self.ops.len() as u64
    }

    pub fn append(&mut self, ops: Vec<Operation>) -> Vec<Operation> {
        let mut accepted = Vec::with_capacity(ops.len());
        for mut op in ops {
            if !self.ids.insert(op.id.clone()) {
                continue;
            }
            op.version = Some(self.len());
            self.ops.push(op.clone());
            accepted.push(op);
        }
        accepted
    }

    pub fn since(&self, version: u64, limit: usize) -> Vec<Operation> {
        let start = usize::try_from(version).unwrap_or(usize::MAX);
        self.ops.iter().skip(start).take(limit).cloned().collect()
    }
}

/// Process-local storage. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemStorage {
    docs: Mutex<HashMap<String, DocLog>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemStorage {
    fn append<'a>(&'a self, doc_id: &'a str, ops: Vec<Operation>) -> StoreFuture<'a, Vec<Operation>> {
        Box::pin(async move {
            let mut docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
            Ok(docs.entry(doc_id.to_string()).or_default().append(ops))
        })
    }

    fn read<'a>(&'a self, doc_id: &'a str, version: u64, limit: usize) -> StoreFuture<'a, Vec<Operation>> {
        Box::pin(async move {
            let docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
            Ok(docs
                .get(doc_id)
                .map(|log| log.since(version, limit))
                .unwrap_or_default())
        })
    }
}
