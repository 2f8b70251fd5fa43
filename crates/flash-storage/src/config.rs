use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{FileFlash, FlashDevice, FlashError, MemFlash, Result, SparseConfig, SparseFlash};

/// Backend selection for [`FlashConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Memory,
    File { path: PathBuf },
    Sparse(SparseConfig),
}

/// Describes a flash device to construct.
///
/// ```json
/// { "capacity": 1048576, "backend": { "kind": "sparse", "merge": "coalesce" } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashConfig {
    pub capacity: u64,
    pub backend: BackendConfig,
}

impl FlashConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(FlashError::InvalidConfig("capacity must be > 0"));
        }
        Ok(())
    }

    /// Construct the configured backend. The device still has to be opened.
    pub fn build(&self) -> Result<Box<dyn FlashDevice>> {
        self.validate()?;
        let device: Box<dyn FlashDevice> = match &self.backend {
            BackendConfig::Memory => Box::new(MemFlash::new(self.capacity)?),
            BackendConfig::File { path } => Box::new(FileFlash::new(path.clone(), self.capacity)),
            BackendConfig::Sparse(config) => {
                Box::new(SparseFlash::with_config(self.capacity, *config))
            }
        };
        tracing::debug!(capacity = self.capacity, backend = ?self.backend, "built flash device");
        Ok(device)
    }
}
