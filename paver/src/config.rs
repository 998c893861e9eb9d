// SPDX-License-Identifier: MIT

//! Paver settings, loaded from TOML.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PaveError, PaveResult};
use crate::partitioner::Platform;

pub const DEFAULT_BIND_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_WIPE_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaverConfig {
    /// Directory of `*.img` files standing in for the block device class.
    pub device_dir: Option<PathBuf>,
    pub image_block_size: u32,
    /// Probe order to use; the build target's when unset.
    pub platform: Option<Platform>,
    pub bind_timeout_ms: u64,
    pub wipe_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for PaverConfig {
    fn default() -> Self {
        Self {
            device_dir: None,
            image_block_size: 512,
            platform: None,
            bind_timeout_ms: DEFAULT_BIND_TIMEOUT_MS,
            wipe_timeout_ms: DEFAULT_WIPE_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl PaverConfig {
    pub fn from_file(path: &Path) -> PaveResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> PaveResult<Self> {
        let config: PaverConfig =
            toml::from_str(content).map_err(|e| PaveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PaveResult {
        let bs = self.image_block_size;
        if bs < 512 || !bs.is_power_of_two() {
            return Err(PaveError::Config(format!(
                "image_block_size must be a power of two >= 512, got {bs}"
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(PaveError::Config("poll_interval_ms must be non-zero".into()));
        }
        Ok(())
    }

    pub fn platform(&self) -> Option<Platform> {
        self.platform.or_else(Platform::host)
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            bind: Duration::from_millis(self.bind_timeout_ms),
            wipe: Duration::from_millis(self.wipe_timeout_ms),
            poll: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

/// Bounded waits for partition nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Binding a new partition or opening an existing one.
    pub bind: Duration,
    /// Opening a partition to scrub it before removal.
    pub wipe: Duration,
    pub poll: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        PaverConfig::default().timeouts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = PaverConfig::from_toml_str("").unwrap();
        assert_eq!(config, PaverConfig::default());
        assert_eq!(config.timeouts().bind, Duration::from_secs(5));
        assert_eq!(config.timeouts().wipe, Duration::from_secs(2));
    }

    #[test]
    fn parses_all_fields() {
        let config = PaverConfig::from_toml_str(
            r#"
            device_dir = "/tmp/disks"
            image_block_size = 4096
            platform = "arm64"
            bind_timeout_ms = 100
            wipe_timeout_ms = 50
            poll_interval_ms = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.device_dir, Some(PathBuf::from("/tmp/disks")));
        assert_eq!(config.image_block_size, 4096);
        assert_eq!(config.platform(), Some(Platform::Arm64));
        assert_eq!(config.timeouts().poll, Duration::from_millis(5));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            PaverConfig::from_toml_str("image_block_size = 1000"),
            Err(PaveError::Config(_))
        ));
        assert!(matches!(
            PaverConfig::from_toml_str("platform = \"riscv\""),
            Err(PaveError::Config(_))
        ));
        assert!(matches!(
            PaverConfig::from_toml_str("bogus = 1"),
            Err(PaveError::Config(_))
        ));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paver.toml");
        fs::write(&path, "platform = \"x64\"\n").unwrap();
        let config = PaverConfig::from_file(&path).unwrap();
        assert_eq!(config.platform, Some(Platform::X64));

        assert!(matches!(
            PaverConfig::from_file(&dir.path().join("missing.toml")),
            Err(PaveError::NotFound(_))
        ));
    }
}
