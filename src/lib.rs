pub mod config;
pub mod db;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod session;
pub mod ws;

use std::sync::Arc;

use axum::body::Bytes;
use chrono::{DateTime, Utc};

use db::Storage;
use routes::MountTable;
use session::{LogSessionFactory, SessionRegistry, SessionSettings};
use ws::OriginPolicy;

/// State shared by every request handler
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub storage: Arc<dyn Storage>,
    pub mounts: MountTable,
    pub landing: Bytes,
    pub origin_policy: OriginPolicy,
    pub settings: SessionSettings,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wire the registry to a storage backend and bundle the routing state
    pub fn new(
        storage: Arc<dyn Storage>,
        mounts: MountTable,
        landing: impl Into<Bytes>,
        origin_policy: OriginPolicy,
        settings: SessionSettings,
    ) -> Self {
        let factory = Arc::new(LogSessionFactory::new(storage.clone()));
        Self {
            registry: Arc::new(SessionRegistry::new(factory)),
            storage,
            mounts,
            landing: landing.into(),
            origin_policy,
            settings,
            started_at: Utc::now(),
        }
    }
}
