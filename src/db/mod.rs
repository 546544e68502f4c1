pub mod filestore;
pub mod store;

pub use filestore::FileStorage;
pub use store::{MemStorage, Storage, StoreError};
