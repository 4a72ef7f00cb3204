//! Type-safe enums shared by the planner
//!
//! Partition roles, disk labels, filesystems and planning modes are proper Rust
//! enums instead of string tags, so every match over them is exhaustive.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Partition type IDs (MBR system IDs) the planner knows about
pub mod fsid {
    pub const LINUX_NATIVE: u32 = 0x83;
    pub const LINUX_SWAP: u32 = 0x82;
    pub const LINUX_LVM: u32 = 0x8e;
    pub const LINUX_RAID: u32 = 0xfd;
    /// Extended container written for newly planned extended partitions
    pub const EXTENDED_LBA: u32 = 0x0f;
    pub const EXTENDED: u32 = 0x05;
    pub const LINUX_EXTENDED: u32 = 0x85;

    /// FAT and NTFS variants that can be shrunk to make room
    pub const WINDOWS: &[u32] = &[0x06, 0x07, 0x0b, 0x0c, 0x0e];

    /// Vendor diagnostics (0x12), hibernation (0xa0) and Dell utility (0xde)
    /// partitions are never deleted by the forced-removal pass.
    pub const ALWAYS_PROTECTED: &[u32] = &[0x12, 0xa0, 0xde];

    /// Returns true for partition IDs that may be reused as Linux partitions
    pub fn is_linux_reusable(id: u32) -> bool {
        id == LINUX_NATIVE || id == LINUX_SWAP
    }

    /// Returns true for FAT/NTFS partition IDs
    pub fn is_windows(id: u32) -> bool {
        WINDOWS.contains(&id)
    }

    /// Returns true for any extended container ID
    pub fn is_extended(id: u32) -> bool {
        matches!(id, EXTENDED | EXTENDED_LBA | LINUX_EXTENDED)
    }
}

/// Filesystem type for partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Filesystem {
    #[default]
    Ext4,
    Ext3,
    Ext2,
    Btrfs,
    Xfs,
    Swap,
    Vfat,
    Ntfs,
}

impl Filesystem {
    /// Filesystems whose partitions carry the swap ID
    pub fn is_swap(self) -> bool {
        matches!(self, Self::Swap)
    }
}

/// Role of a partition in an MBR-style table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PartitionKind {
    #[default]
    Primary,
    Extended,
    Logical,
}

/// Disk label (partition table) kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DiskLabel {
    #[default]
    Msdos,
    Gpt,
    Mac,
    Sun,
    Bsd,
}

impl DiskLabel {
    /// Number of primary slots the label provides
    pub fn max_primary(self) -> u32 {
        match self {
            Self::Msdos => 4,
            Self::Gpt => 128,
            Self::Mac => 63,
            Self::Sun | Self::Bsd => 8,
        }
    }

    /// Number of logical slots available inside an extended partition
    pub fn max_logical(self) -> u32 {
        match self {
            Self::Msdos => 60,
            Self::Gpt | Self::Mac | Self::Sun | Self::Bsd => 0,
        }
    }

    /// Whether the label can hold an extended container
    pub fn has_extended(self) -> bool {
        matches!(self, Self::Msdos)
    }
}

/// Placement strategy a solution was computed under.
///
/// The declaration order is the precedence order: earlier modes are always
/// preferred over later ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlanMode {
    /// Only unpartitioned space is used
    Free,
    /// Existing Linux/swap partitions may be reused
    Reuse,
    /// A FAT/NTFS partition is shrunk first
    ResizeWindows,
    /// Unprotected partitions are deleted first
    Desperate,
}

impl PlanMode {
    /// Additive weight bias applied by the scorer
    pub fn bias(self) -> i64 {
        match self {
            Self::Free => 0,
            Self::Reuse => -100,
            Self::ResizeWindows => -1_000,
            Self::Desperate => -1_000_000,
        }
    }

    /// Ranking tier used when comparing solutions across disks.
    ///
    /// Free and reuse compete on weight alone; the destructive strategies
    /// never outrank a non-destructive one.
    pub fn tier(self) -> u8 {
        match self {
            Self::Free | Self::Reuse => 0,
            Self::ResizeWindows => 1,
            Self::Desperate => 2,
        }
    }
}
