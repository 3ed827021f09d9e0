//! Block store implementations for Contexta.

pub mod file_backend;
pub mod in_memory;

pub use file_backend::FileBlockStore;
pub use in_memory::InMemoryBlockStore;

use contexta_config::{StoreBackend, StoreConfig};
use contexta_core::error::StoreError;
use contexta_core::memory::BlockStore;
use std::sync::Arc;

/// Build the block store selected in configuration.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn BlockStore>, StoreError> {
    Ok(match config.backend {
        StoreBackend::Memory => Arc::new(InMemoryBlockStore::new()),
        StoreBackend::File => Arc::new(FileBlockStore::new(config.resolved_path())?),
    })
}
