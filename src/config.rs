use std::path::PathBuf;

use crate::consts::{
    DEFAULT_BLOCK_COUNT, DEFAULT_BLOCK_SIZE, DEFAULT_JOURNAL_PATH, DEFAULT_MAX_FILES,
    DEFAULT_VOLUME_PATH,
    MAX_BLOCKS_PER_FILE,
};
use crate::util::error::{FsError, Result};

/// Volume shape fixed at format time and recorded in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub block_size: usize,
    pub block_count: u32,
    pub max_files: u32,
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry {
            block_size: DEFAULT_BLOCK_SIZE,
            block_count: DEFAULT_BLOCK_COUNT,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

impl Geometry {
    pub fn new(block_size: usize, block_count: u32, max_files: u32) -> Geometry {
        Geometry { block_size, block_count, max_files }
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || self.block_count == 0 || self.max_files == 0 {
            return Err(FsError::InvalidVolume(format!("degenerate geometry {:?}", self)));
        }

        // the largest file must still have a size that fits the u32 size field
        if self.block_size as u64 * MAX_BLOCKS_PER_FILE as u64 > u32::MAX as u64 {
            return Err(FsError::InvalidVolume(format!(
                "block size {} is too large",
                self.block_size
            )));
        }

        Ok(())
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.block_size as u64 * self.block_count as u64
    }
}

#[derive(Debug, Clone)]
pub struct VolumeConfig {
    pub volume_path: PathBuf,
    pub journal_path: PathBuf,
    /// Used only when a new volume has to be formatted.
    pub geometry: Geometry,
    /// fsync the journal after every append.
    pub sync_journal: bool,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        VolumeConfig {
            volume_path: PathBuf::from(DEFAULT_VOLUME_PATH),
            journal_path: PathBuf::from(DEFAULT_JOURNAL_PATH),
            geometry: Geometry::default(),
            sync_journal: true,
        }
    }
}

impl VolumeConfig {
    pub fn new(volume_path: impl Into<PathBuf>, journal_path: impl Into<PathBuf>) -> VolumeConfig {
        VolumeConfig {
            volume_path: volume_path.into(),
            journal_path: journal_path.into(),
            ..VolumeConfig::default()
        }
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> VolumeConfig {
        self.geometry = geometry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_geometry() {
        let geometry = Geometry::default();
        assert_eq!(geometry.block_size, 512);
        assert_eq!(geometry.block_count, 2048);
        assert_eq!(geometry.max_files, 128);
        assert_eq!(geometry.capacity_bytes(), 1024 * 1024);
        assert!(geometry.validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_geometry() {
        assert!(Geometry::new(0, 16, 4).validate().is_err());
        assert!(Geometry::new(512, 0, 4).validate().is_err());
        assert!(Geometry::new(512, 16, 0).validate().is_err());
        assert!(Geometry::new(1 << 24, 16, 4).validate().is_err());
    }

    #[test]
    fn config_paths() {
        let config =
            VolumeConfig::new("a.img", "a.journal").with_geometry(Geometry::new(512, 8, 2));
        assert_eq!(config.volume_path, PathBuf::from("a.img"));
        assert_eq!(config.journal_path, PathBuf::from("a.journal"));
        assert_eq!(config.geometry.block_count, 8);
        assert!(config.sync_journal);
    }
}
