pub mod factory;
pub mod handle;
pub mod poll;
pub mod registry;
pub mod stream;

use std::time::Duration;

use thiserror::Error;

use crate::db::StoreError;

pub use factory::{LogSessionFactory, SessionFactory};
pub use handle::SessionHandle;
pub use registry::SessionRegistry;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Transport knobs shared by every session
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Close streaming connections after this long without traffic.
    /// `None` keeps them open until the peer goes away.
    pub idle_timeout: Option<Duration>,
    /// Upper bound for a long-poll wait
    pub max_poll_wait: Duration,
    /// Maximum operations per outgoing batch
    pub batch_limit: usize,
    /// Largest accepted client message, after decompression
    pub max_message_size: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            max_poll_wait: Duration::from_secs(30),
            batch_limit: 1000,
            max_message_size: 4 * 1024 * 1024,
        }
    }
}
