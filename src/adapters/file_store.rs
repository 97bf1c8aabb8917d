//! Durable contract storage.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::{ContractStore, RegistryState, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFormat {
    Yaml,
    Json,
}

impl StoreFormat {
    /// Format implied by the file extension; YAML unless the file ends in `.json`
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => StoreFormat::Json,
            _ => StoreFormat::Yaml,
        }
    }
}

/// Stores the registry in a single YAML or JSON file.
///
/// Writes go to a sibling temporary file which is then renamed over the
/// target, so readers never observe a half-written file.
pub struct FileStore {
    path: PathBuf,
    format: StoreFormat,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, format: StoreFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = StoreFormat::from_path(&path);
        Self { path, format }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl ContractStore for FileStore {
    async fn load(&self) -> Result<RegistryState, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No contract store yet, starting empty");
                return Ok(RegistryState::default());
            }
            Err(e) => return Err(Self::io_error(&self.path, e)),
        };

        if content.trim().is_empty() {
            return Ok(RegistryState::default());
        }

        match self.format {
            StoreFormat::Json => serde_json::from_str(&content).map_err(|e| StoreError::Serialization(e.to_string())),
            StoreFormat::Yaml => serde_yaml::from_str(&content).map_err(|e| StoreError::Serialization(e.to_string())),
        }
    }

    async fn save(&self, state: &RegistryState) -> Result<(), StoreError> {
        let content = match self.format {
            StoreFormat::Json => serde_json::to_string_pretty(state).map_err(|e| StoreError::Serialization(e.to_string()))?,
            StoreFormat::Yaml => serde_yaml::to_string(state).map_err(|e| StoreError::Serialization(e.to_string()))?,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_error(parent, e))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, content)
            .await
            .map_err(|e| Self::io_error(&temp, e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| Self::io_error(&self.path, e))?;

        debug!(path = %self.path.display(), contracts = state.contracts.len(), "Saved contract store");
        Ok(())
    }
}

/// Keeps the registry in memory only; used for ephemeral servers and tests
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<RegistryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContractStore for MemoryStore {
    async fn load(&self) -> Result<RegistryState, StoreError> {
        Ok(self.state.read().await.clone())
    }

    async fn save(&self, state: &RegistryState) -> Result<(), StoreError> {
        *self.state.write().await = state.clone();
        Ok(())
    }
}
