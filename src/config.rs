//! Transfer engine configuration
//!
//! Loaded from the platform-specific app config folder:
//! - Linux: ~/.config/s3-transfer/transfer.json
//! - Windows: %APPDATA%/s3-transfer/transfer.json
//! - macOS: ~/Library/Application Support/s3-transfer/transfer.json

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::TransferError;

const MIB: u64 = 1024 * 1024;

/// Payloads strictly larger than this go through multipart upload
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 15 * MIB;

/// Size of every multipart part except the last
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * MIB;

/// Keys requested per listing page
pub const DEFAULT_LIST_PAGE_SIZE: i32 = 1000;

const DEFAULT_DOWNLOAD_BUFFER_SIZE: usize = 64 * 1024;

/// Tunables for the transfer engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Size above which uploads switch to multipart
    pub multipart_threshold: u64,

    /// Multipart part size
    pub chunk_size: u64,

    /// Keys per listing request
    pub list_page_size: i32,

    /// Maximum listing pages to follow; `None` follows continuation tokens to the end
    pub max_list_pages: Option<u32>,

    /// Read buffer used when streaming downloads to disk
    pub download_buffer_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
            max_list_pages: None,
            download_buffer_size: DEFAULT_DOWNLOAD_BUFFER_SIZE,
        }
    }
}

impl TransferConfig {
    /// Load config from the default location, returning defaults if the file doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load config from an explicit path, returning defaults if the file doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        let config: TransferConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))?;

        config
            .validate()
            .with_context(|| format!("Invalid config in {:?}", path))?;

        tracing::info!(
            "Loaded transfer config: threshold={}, chunk={}, page_size={}, max_pages={:?}",
            config.multipart_threshold,
            config.chunk_size,
            config.list_page_size,
            config.max_list_pages
        );

        Ok(config)
    }

    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "github.n-orlov", "s3-transfer")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("transfer.json"))
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.chunk_size == 0 {
            return Err(TransferError::Configuration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        // Anything multipart must need at least two parts
        if self.multipart_threshold < self.chunk_size {
            return Err(TransferError::Configuration(format!(
                "multipart_threshold ({}) must not be below chunk_size ({})",
                self.multipart_threshold, self.chunk_size
            )));
        }
        if self.list_page_size <= 0 {
            return Err(TransferError::Configuration(
                "list_page_size must be greater than zero".to_string(),
            ));
        }
        if self.max_list_pages == Some(0) {
            return Err(TransferError::Configuration(
                "max_list_pages must be at least 1 when set".to_string(),
            ));
        }
        if self.download_buffer_size == 0 {
            return Err(TransferError::Configuration(
                "download_buffer_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
