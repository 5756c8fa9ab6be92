//! Tunnel persistence.
//!
//! Saved forwards live in `~/.portpilot/forwards.json`. The store is the
//! only writer; reads tolerate a missing file (first run).

use std::future::Future;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{ForwardError, Result};
use crate::models::PortForwardDescriptor;

/// Interface to the durable store for tunnel descriptors.
///
/// `ready` is awaited once before the store's startup reconciliation.
pub trait ForwardStorage: Send + Sync {
    /// Resolves once the backing storage can serve reads.
    fn ready(&self) -> impl Future<Output = Result<()>> + Send;

    /// Loads the saved descriptor list, or `None` if nothing was persisted yet.
    fn load(&self) -> impl Future<Output = Result<Option<Vec<PortForwardDescriptor>>>> + Send;

    /// Replaces the saved descriptor list with the given snapshot.
    fn save(&self, forwards: &[PortForwardDescriptor]) -> impl Future<Output = Result<()>> + Send;
}

/// On-disk document wrapping the saved forwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ForwardsFile {
    #[serde(default)]
    forwards: Vec<PortForwardDescriptor>,
}

/// JSON-file storage for tunnel descriptors.
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    /// Creates storage at the default path (`~/.portpilot/forwards.json`).
    pub fn new() -> Result<Self> {
        let dir = dirs::home_dir()
            .ok_or_else(|| ForwardError::Storage("Could not find home directory".to_string()))?
            .join(".portpilot");

        Ok(Self {
            path: dir.join("forwards.json"),
        })
    }

    /// Creates storage at a custom path.
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ForwardStorage for JsonFileStorage {
    async fn ready(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                ForwardError::Storage(format!("Failed to create storage dir: {}", e))
            })?;
        }
        Ok(())
    }

    async fn load(&self) -> Result<Option<Vec<PortForwardDescriptor>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| ForwardError::Storage(format!("Failed to read forwards: {}", e)))?;

        let file: ForwardsFile = serde_json::from_str(&content)
            .map_err(|e| ForwardError::Storage(format!("Failed to parse forwards: {}", e)))?;

        Ok(Some(file.forwards))
    }

    async fn save(&self, forwards: &[PortForwardDescriptor]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                ForwardError::Storage(format!("Failed to create storage dir: {}", e))
            })?;
        }

        // Write to a temp file first, then rename (atomic write)
        let temp_path = self.path.with_extension("json.tmp");
        let file = ForwardsFile {
            forwards: forwards.to_vec(),
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| ForwardError::Storage(format!("Failed to serialize forwards: {}", e)))?;

        fs::write(&temp_path, content)
            .await
            .map_err(|e| ForwardError::Storage(format!("Failed to write forwards: {}", e)))?;

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| ForwardError::Storage(format!("Failed to save forwards: {}", e)))?;

        Ok(())
    }
}
