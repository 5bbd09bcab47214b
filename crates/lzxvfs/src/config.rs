//! Configuration for the virtual filesystem layer

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{DEFAULT_COPY_BUFFER_SIZE, DEFAULT_EXTENSION, Result, VfsError};

/// Configuration for a [`Vfs`](crate::Vfs) instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VfsConfig {
    /// Container extension without the leading dot, matched case-insensitively
    pub extension: String,

    /// Copy buffer size reported to hosts (in bytes)
    pub copy_buffer_size: usize,

    /// Create missing parent directories when extracting
    pub create_directories: bool,
}

impl Default for VfsConfig {
    fn default() -> Self {
        Self {
            extension: DEFAULT_EXTENSION.to_string(),
            copy_buffer_size: DEFAULT_COPY_BUFFER_SIZE,
            create_directories: true,
        }
    }
}

impl VfsConfig {
    /// Create a configuration handling the given container extension
    pub fn new(extension: &str) -> Self {
        Self::default().with_extension(extension)
    }

    /// Set the container extension. A leading dot is ignored.
    #[must_use]
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    /// Set the copy buffer size
    #[must_use]
    pub const fn with_copy_buffer_size(mut self, size: usize) -> Self {
        self.copy_buffer_size = size;
        self
    }

    /// Enable or disable parent directory creation during extraction
    #[must_use]
    pub const fn with_create_directories(mut self, enable: bool) -> Self {
        self.create_directories = enable;
        self
    }

    /// Check the configuration for values the layer cannot work with
    pub fn validate(&self) -> Result<()> {
        let extension = self.extension.trim_start_matches('.');
        if extension.is_empty() {
            return Err(VfsError::Config(
                "container extension must not be empty".to_string(),
            ));
        }
        if extension.contains(['/', '\\']) {
            return Err(VfsError::Config(format!(
                "container extension contains a path separator: {extension}"
            )));
        }
        if self.copy_buffer_size == 0 {
            return Err(VfsError::Config(
                "copy buffer size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(json)
            .map_err(|e| VfsError::Config(format!("invalid configuration: {e}")))?;
        config.extension = config.extension.trim_start_matches('.').to_string();
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| VfsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}
