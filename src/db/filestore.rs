use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::db::store::{DocLog, Storage, StoreError, StoreFuture};
use crate::models::Operation;

type SharedLog = Arc<tokio::sync::Mutex<Option<DocLog>>>;

/// Longest path component produced for a document
const MAX_NAME_LEN: usize = 200;

/// Operation logs persisted as one JSON-lines file per document.
///
/// A document's file is read the first time the document is touched and
/// kept in memory afterwards; appends go to both.
pub struct FileStorage {
    root: PathBuf,
    docs: Mutex<HashMap<String, SharedLog>>,
}

impl FileStorage {
    /// Open (and create if needed) the storage directory
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        info!("File storage opened at {}", root.display());
        Ok(Self {
            root,
            docs: Mutex::new(HashMap::new()),
        })
    }

    /// Location of a document's log.
    ///
    /// Identifiers may contain '/' and other characters unfit for filenames,
    /// so the name is base64url encoded. Long encodings are split into
    /// nested directories to stay under filesystem name limits.
    fn doc_path(&self, doc_id: &str) -> PathBuf {
        let encoded = URL_SAFE_NO_PAD.encode(doc_id.as_bytes());
        let mut path = self.root.clone();
        let mut rest = encoded.as_str();
        while rest.len() > MAX_NAME_LEN {
            let (segment, tail) = rest.split_at(MAX_NAME_LEN);
            path.push(segment);
            rest = tail;
        }
        path.push(format!("{}.jsonl", rest));
        path
    }

    fn shared_log(&self, doc_id: &str) -> SharedLog {
        let mut docs = self.docs.lock().unwrap_or_else(|e| e.into_inner());
        docs.entry(doc_id.to_string()).or_default().clone()
    }

    async fn load(path: &Path, doc_id: &str) -> Result<DocLog, StoreError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(DocLog::default()),
            Err(e) => return Err(e.into()),
        };

        // Every record is newline terminated; anything after the last newline
        // is a write that never completed.
        let complete = content.rfind('\n').map(|i| i + 1).unwrap_or(0);
        if complete < content.len() {
            warn!(
                "Discarding {} bytes of incomplete record for '{}'",
                content.len() - complete,
                doc_id
            );
            let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
            file.set_len(complete as u64).await?;
        }

        let mut ops = Vec::new();
        for line in content[..complete].lines().filter(|l| !l.trim().is_empty()) {
            let op: Operation = serde_json::from_str(line).map_err(|source| StoreError::Corrupt {
                doc_id: doc_id.to_string(),
                source,
            })?;
            ops.push(op);
        }
        debug!("Loaded {} operations for '{}'", ops.len(), doc_id);
        Ok(DocLog::from_ops(ops))
    }
}

impl Storage for FileStorage {
    fn append<'a>(&'a self, doc_id: &'a str, ops: Vec<Operation>) -> StoreFuture<'a, Vec<Operation>> {
        Box::pin(async move {
            let path = self.doc_path(doc_id);
            let shared = self.shared_log(doc_id);
            let mut guard = shared.lock().await;
            if guard.is_none() {
                *guard = Some(Self::load(&path, doc_id).await?);
            }
            let Some(log) = guard.as_mut() else {
                return Ok(Vec::new());
            };

            let accepted = log.append(ops);
            if accepted.is_empty() {
                return Ok(accepted);
            }

            let mut buf = Vec::new();
            for op in &accepted {
                serde_json::to_writer(&mut buf, op)?;
                buf.push(b'\n');
            }

            let written = async {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .await?;
                let before = file.metadata().await?.len();
                let result = async {
                    file.write_all(&buf).await?;
                    file.flush().await
                }
                .await;
                if result.is_err() {
                    // Cut off a partial record so the log stays readable.
                    if let Err(e) = file.set_len(before).await {
                        error!("Failed to roll back partial write for '{}': {}", doc_id, e);
                    }
                }
                result
            }
            .await;

            if let Err(e) = written {
                error!("Failed to persist operations for '{}': {}", doc_id, e);
                // Reload on next access so memory matches what reached disk.
                *guard = None;
                return Err(e.into());
            }
            Ok(accepted)
        })
    }

    fn read<'a>(&'a self, doc_id: &'a str, version: u64, limit: usize) -> StoreFuture<'a, Vec<Operation>> {
        Box::pin(async move {
            let shared = self.shared_log(doc_id);
            let mut guard = shared.lock().await;
            if guard.is_none() {
                *guard = Some(Self::load(&self.doc_path(doc_id), doc_id).await?);
            }
            Ok(guard
                .as_ref()
                .map(|log| log.since(version, limit))
                .unwrap_or_default())
        })
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("storage directory {} is missing", self.root.display()),
            )
            .into())
        }
    }
}
