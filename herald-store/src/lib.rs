pub mod backends;
pub mod config;
pub mod error;
pub mod snapshot;
pub mod r#trait;

pub use backends::{FileStateStore, MemoryStateStore, TestStateStore};
pub use config::StoreConfig;
pub use error::{Result, SerializationError, StoreError, ValidationError};
pub use snapshot::{RecipientSnapshot, UsageLog};
pub use r#trait::StateStore;
