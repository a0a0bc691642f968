use std::sync::Arc;

use serde::Deserialize;

use crate::{
    backends::{FileStateStore, MemoryStateStore},
    r#trait::StateStore,
};

/// Runtime selection of the state store backend.
///
/// File-backed store in RON config:
/// ```ron
/// Herald (
///     store: File(
///         path: "/var/lib/herald",
///     ),
/// )
/// ```
///
/// Memory-backed store for development:
/// ```ron
/// Herald (
///     store: Memory,
/// )
/// ```
#[derive(Debug, Clone, Deserialize)]
pub enum StoreConfig {
    /// File-based store (production)
    File(FileStateStore),
    /// Memory-based store (testing/development)
    Memory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::File(FileStateStore::default())
    }
}

impl StoreConfig {
    /// The filesystem path for file-backed stores, if applicable.
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::File(store) => Some(store.path()),
            Self::Memory => None,
        }
    }

    /// Convert the configuration into a concrete state store.
    #[must_use]
    pub fn into_state_store(self) -> Arc<dyn StateStore> {
        match self {
            Self::File(store) => Arc::new(store),
            Self::Memory => Arc::new(MemoryStateStore::new()),
        }
    }
}
