//! `.storage/` directory persistence
//!
//! Every document lives in its own file, wrapped with the key and version it
//! was written under:
//!
//! ```json
//! {
//!   "version": 1,
//!   "minor_version": 2,
//!   "key": "climate_scheduler.buffer",
//!   "data": { ... }
//! }
//! ```

use crate::error::{StorageError, StorageResult};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Envelope around a stored document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    /// Major version, bumped on incompatible layout changes
    pub version: u32,
    /// Minor version, bumped on additive changes
    pub minor_version: u32,
    /// Storage key (also the file name)
    pub key: String,
    pub data: T,
}

impl<T> StorageFile<T> {
    pub fn new(key: impl Into<String>, data: T, version: u32, minor_version: u32) -> Self {
        Self {
            version,
            minor_version,
            key: key.into(),
            data,
        }
    }
}

/// A document type with a fixed storage key and version
pub trait Storable: Serialize + DeserializeOwned {
    /// Storage key for this document
    const KEY: &'static str;
    /// Current major version
    const VERSION: u32;
    /// Current minor version
    const MINOR_VERSION: u32;

    /// Decode the `data` section of a file written under `version`
    ///
    /// Documents with older layouts override this to upgrade them in place.
    fn from_stored(data: serde_json::Value, _version: u32) -> StorageResult<Self> {
        Ok(serde_json::from_value(data)?)
    }

    /// Borrowing envelope for writing
    fn to_storage_file(&self) -> StorageFile<&Self> {
        StorageFile::new(Self::KEY, self, Self::VERSION, Self::MINOR_VERSION)
    }
}

/// Handle on a `.storage/` directory
#[derive(Debug, Clone)]
pub struct Storage {
    storage_dir: PathBuf,
}

impl Storage {
    /// Storage rooted at `<data_dir>/.storage`
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: data_dir.as_ref().join(".storage"),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn file_path(&self, key: &str) -> PathBuf {
        self.storage_dir.join(key)
    }

    pub async fn exists(&self, key: &str) -> bool {
        fs::try_exists(self.file_path(key)).await.unwrap_or(false)
    }

    async fn ensure_dir(&self) -> StorageResult<()> {
        if !fs::try_exists(&self.storage_dir).await.unwrap_or(false) {
            fs::create_dir_all(&self.storage_dir).await?;
            debug!(dir = ?self.storage_dir, "Created storage directory");
        }
        Ok(())
    }

    /// Read a raw envelope, `None` when the file does not exist
    pub async fn read<T>(&self, key: &str) -> StorageResult<Option<StorageFile<T>>>
    where
        T: DeserializeOwned,
    {
        let path = self.file_path(key);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(key, "Storage file not found");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let file: StorageFile<T> = serde_json::from_str(&content)?;
        if file.key != key {
            return Err(StorageError::KeyMismatch {
                path: path.display().to_string(),
                expected: key.to_string(),
                found: file.key,
            });
        }
        Ok(Some(file))
    }

    /// Write an envelope atomically (temp file, then rename)
    pub async fn write<T>(&self, file: &StorageFile<T>) -> StorageResult<()>
    where
        T: Serialize,
    {
        self.ensure_dir().await?;

        let path = self.file_path(&file.key);
        let temp_path = self.file_path(&format!("{}.tmp", file.key));
        let content = serde_json::to_string_pretty(file)?;

        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(
            key = %file.key,
            version = file.version,
            minor_version = file.minor_version,
            "Saved storage file"
        );
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> StorageResult<()> {
        match fs::remove_file(self.file_path(key)).await {
            Ok(()) => {
                debug!(key, "Deleted storage file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load a [`Storable`] document, upgrading older major versions
    pub async fn load_document<T: Storable>(&self) -> StorageResult<Option<T>> {
        let Some(file) = self.read::<serde_json::Value>(T::KEY).await? else {
            return Ok(None);
        };

        if file.version > T::VERSION {
            return Err(StorageError::UnsupportedVersion {
                key: T::KEY.to_string(),
                found: file.version,
                supported: T::VERSION,
            });
        }
        if file.version == T::VERSION && file.minor_version < T::MINOR_VERSION {
            warn!(
                key = T::KEY,
                found = file.minor_version,
                current = T::MINOR_VERSION,
                "Storage has an older minor version"
            );
        }

        T::from_stored(file.data, file.version).map(Some)
    }

    pub async fn save_document<T: Storable>(&self, doc: &T) -> StorageResult<()> {
        self.write(&doc.to_storage_file()).await
    }
}
