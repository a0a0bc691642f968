use std::path::{Path, PathBuf};

use async_trait::async_trait;
use herald_common::{ProgressEvent, SenderIdentity};
use serde::Deserialize;
use tokio::fs;

use crate::{
    SerializationError, StoreError, ValidationError,
    snapshot::{RecipientSnapshot, UsageLog},
    r#trait::StateStore,
};

const RECIPIENTS_FILE: &str = "recipients.bin";
const IDENTITIES_FILE: &str = "identities.bin";
const USAGE_FILE: &str = "usage.bin";
const EVENTS_FILE: &str = "events.bin";

/// File-based state store implementation
///
/// Each concern lives in its own bincode-encoded file under the store
/// directory: `recipients.bin`, `identities.bin`, `usage.bin`, and
/// `events.bin`. A missing file loads as empty state, so a fresh directory
/// (or a partially written one) is always a valid starting point.
///
/// # Atomicity
/// Every write goes to a `.tmp` sibling first and is then renamed over the
/// live file, so a crash mid-write never leaves a torn snapshot behind;
/// the previous complete snapshot survives.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl Default for FileStateStore {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/herald"),
        }
    }
}

// Custom Deserialize implementation with path validation
impl<'de> Deserialize<'de> for FileStateStore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct FileStateStoreHelper {
            path: PathBuf,
        }

        let helper = FileStateStoreHelper::deserialize(deserializer)?;
        Self::validate_path(&helper.path).map_err(serde::de::Error::custom)?;

        Ok(Self { path: helper.path })
    }
}

impl FileStateStore {
    /// Create a store rooted at the given directory.
    ///
    /// # Errors
    /// Returns an error if the path fails validation.
    pub fn new(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();
        Self::validate_path(&path).map_err(|e| ValidationError::InvalidPath(e.to_string()))?;
        Ok(Self { path })
    }

    /// Validate a store path for security
    ///
    /// # Errors
    /// Returns an error if the path contains `..` components, is relative,
    /// or points into a sensitive system directory.
    fn validate_path(path: &Path) -> anyhow::Result<()> {
        for component in path.components() {
            if component == std::path::Component::ParentDir {
                return Err(anyhow::anyhow!(
                    "Store path cannot contain '..' components: {}",
                    path.display()
                ));
            }
        }

        if !path.is_absolute() {
            return Err(anyhow::anyhow!(
                "Store path must be absolute: {}",
                path.display()
            ));
        }

        let sensitive_prefixes = [
            "/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/boot", "/sys", "/proc", "/dev",
        ];

        for prefix in &sensitive_prefixes {
            if path.starts_with(prefix) {
                return Err(anyhow::anyhow!(
                    "Store path cannot be in system directory {}: {}",
                    prefix,
                    path.display()
                ));
            }
        }

        Ok(())
    }

    /// The store's root directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the store directory exists.
    async fn ensure_dir(&self) -> crate::Result<()> {
        fs::create_dir_all(&self.path).await?;

        let meta = fs::metadata(&self.path).await?;
        if !meta.is_dir() {
            return Err(
                ValidationError::NotDirectory(self.path.display().to_string()).into(),
            );
        }

        Ok(())
    }

    /// Atomically persist one concern: encode, write to a temp sibling,
    /// rename over the live file.
    async fn persist<T>(&self, file: &str, value: &T) -> crate::Result<()>
    where
        T: serde::Serialize + Sync,
    {
        self.ensure_dir().await?;

        let encoded = bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(SerializationError::Encode)?;

        let target = self.path.join(file);
        let temp = self.path.join(format!("{file}.tmp"));

        fs::write(&temp, &encoded).await?;
        fs::rename(&temp, &target).await?;

        Ok(())
    }

    /// Load one concern, returning the default for a missing file.
    async fn load_or_default<T>(&self, file: &str) -> crate::Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        let target = self.path.join(file);

        let bytes = match fs::read(&target).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(e.into()),
        };

        let (value, read) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                .map_err(SerializationError::Decode)?;

        if read != bytes.len() {
            return Err(StoreError::Serialization(SerializationError::Corrupted(
                format!(
                    "{file}: {read} of {} bytes decoded",
                    bytes.len()
                ),
            )));
        }

        Ok(value)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load_recipients(&self) -> crate::Result<RecipientSnapshot> {
        self.load_or_default(RECIPIENTS_FILE).await
    }

    async fn save_recipients(&self, snapshot: &RecipientSnapshot) -> crate::Result<()> {
        self.persist(RECIPIENTS_FILE, snapshot).await
    }

    async fn load_identities(&self) -> crate::Result<Vec<SenderIdentity>> {
        self.load_or_default(IDENTITIES_FILE).await
    }

    async fn save_identities(&self, identities: &[SenderIdentity]) -> crate::Result<()> {
        self.persist(IDENTITIES_FILE, &identities).await
    }

    async fn load_usage(&self) -> crate::Result<UsageLog> {
        self.load_or_default(USAGE_FILE).await
    }

    async fn save_usage(&self, usage: &UsageLog) -> crate::Result<()> {
        self.persist(USAGE_FILE, usage).await
    }

    async fn load_events(&self) -> crate::Result<Vec<ProgressEvent>> {
        self.load_or_default(EVENTS_FILE).await
    }

    async fn save_events(&self, events: &[ProgressEvent]) -> crate::Result<()> {
        self.persist(EVENTS_FILE, &events).await
    }
}
