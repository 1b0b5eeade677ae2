//! Partition geometry for the SD card image.
//!
//! The image is a single sparse file of `filesystem_size_mb` MiB. The boot
//! partition size is passed to the partition-table tool as-is, in whatever
//! units that tool uses; no alignment or unit reconciliation happens here.

use crate::config::BuildConfig;
use crate::error::ConfigError;

/// Boot partition size, in the partition-table tool's units.
pub const BOOT_PARTITION_SIZE: u64 = 352816;

/// MBR type code for FAT32 with LBA addressing.
pub const FAT32_LBA_TYPE: u8 = 0x0c;

/// MBR type code for a native Linux filesystem.
pub const LINUX_TYPE: u8 = 0x83;

/// Size of one partition table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionSize {
    Fixed(u64),
    /// Whatever is left on the disk.
    Remainder,
}

/// One entry of an MBR partition table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    pub size: PartitionSize,
    pub type_code: u8,
    pub bootable: bool,
}

/// Sizes derived from the build configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Total image size in bytes.
    pub image_bytes: u64,
    /// Boot partition size in the partition tool's units.
    pub boot_partition: u64,
}

impl Geometry {
    pub fn from_config(config: &BuildConfig) -> Result<Self, ConfigError> {
        Self::new(config.filesystem_size_mb(), config.boot_partition_size())
    }

    pub fn new(filesystem_size_mb: u64, boot_partition: u64) -> Result<Self, ConfigError> {
        let image_bytes = filesystem_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| ConfigError::InvalidSize(filesystem_size_mb.to_string()))?;
        Ok(Self {
            image_bytes,
            boot_partition,
        })
    }

    /// Bootable FAT partition first, Linux root on the rest.
    pub fn partition_table(&self) -> Vec<PartitionSpec> {
        vec![
            PartitionSpec {
                size: PartitionSize::Fixed(self.boot_partition),
                type_code: FAT32_LBA_TYPE,
                bootable: true,
            },
            PartitionSpec {
                size: PartitionSize::Remainder,
                type_code: LINUX_TYPE,
                bootable: false,
            },
        ]
    }
}
