//! Configuration root resolution strategies

use std::path::PathBuf;

use directories::BaseDirs;

use crate::error::{AuthError, Result};

/// Resolves the root directory under which the store keeps its files.
///
/// The store asks for the root on every operation and never caches it.
pub trait ConfigDirResolver: Send + Sync {
    /// Root configuration directory
    fn config_dir(&self) -> Result<PathBuf>;
}

/// The current user's OS configuration directory
#[derive(Debug, Clone, Copy, Default)]
pub struct UserConfigDir;

impl ConfigDirResolver for UserConfigDir {
    fn config_dir(&self) -> Result<PathBuf> {
        BaseDirs::new()
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or_else(|| {
                AuthError::ConfigDirUnavailable(
                    "could not determine user configuration directory".to_string(),
                )
            })
    }
}

/// A fixed root directory (for testing or explicit overrides)
#[derive(Debug, Clone)]
pub struct FixedConfigDir(PathBuf);

impl FixedConfigDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }
}

impl ConfigDirResolver for FixedConfigDir {
    fn config_dir(&self) -> Result<PathBuf> {
        Ok(self.0.clone())
    }
}

impl<F> ConfigDirResolver for F
where
    F: Fn() -> Result<PathBuf> + Send + Sync,
{
    fn config_dir(&self) -> Result<PathBuf> {
        self()
    }
}
