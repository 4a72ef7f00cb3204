//! Desired partitions as requested by the installation profile
//!
//! The profile parser (out of scope) turns each `<partition>` entry into a
//! `DesiredPartition`. The planner never mutates these; per-disk cylinder
//! requirements are derived separately by `engine::sizing`.

use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};
use crate::types::{fsid, Filesystem, PartitionKind};

/// How large a desired partition should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizePolicy {
    /// Exact size in bytes, rounded up to whole cylinders
    Fixed(u64),
    /// Percentage of the disk; requests summing over 100 are scaled down
    Percent(u8),
    /// As large as possible
    Max,
    /// Size chosen from the mount point (swap, /boot), otherwise `Max`
    #[default]
    Auto,
    /// Swap large enough to hold a suspend image
    Suspend,
}

/// Encryption settings passed through to the executor untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptParams {
    /// Mapper name, e.g. `cr_home`
    pub name: String,
    #[serde(default)]
    pub cipher: Option<String>,
}

/// One partition the profile asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesiredPartition {
    pub mount: Option<String>,
    pub size: SizePolicy,
    pub filesystem: Option<Filesystem>,
    pub format: bool,
    /// May absorb leftover cylinders of its gap
    pub grow: bool,
    pub max_size: Option<u64>,
    /// Existing partition number that must be reused
    pub reuse: Option<u32>,
    pub lvm_group: Option<String>,
    pub raid_name: Option<String>,
    pub crypt: Option<CryptParams>,
    pub fstab_options: Option<String>,
    pub kind: Option<PartitionKind>,
    /// Declared partition number; `Some(0)` marks a placeholder entry
    pub number: Option<u32>,
    /// Explicit partition ID overriding the mount-derived one
    pub fsid: Option<u32>,
    /// Partition must start at or below this cylinder
    pub max_cylinder: Option<u64>,
    /// Inserted by the planner rather than requested by the profile
    #[serde(skip)]
    pub auto_added: bool,
}

impl Default for DesiredPartition {
    fn default() -> Self {
        Self {
            mount: None,
            size: SizePolicy::Auto,
            filesystem: None,
            format: true,
            grow: false,
            max_size: None,
            reuse: None,
            lvm_group: None,
            raid_name: None,
            crypt: None,
            fstab_options: None,
            kind: None,
            number: None,
            fsid: None,
            max_cylinder: None,
            auto_added: false,
        }
    }
}

impl DesiredPartition {
    /// Create a formatted partition for `mount` with the given size policy
    pub fn new(mount: impl Into<String>, size: SizePolicy) -> Self {
        Self {
            mount: Some(mount.into()),
            size,
            ..Self::default()
        }
    }

    pub fn with_filesystem(mut self, filesystem: Filesystem) -> Self {
        self.filesystem = Some(filesystem);
        self
    }

    pub fn with_grow(mut self) -> Self {
        self.grow = true;
        self
    }

    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    /// Pin the request to an existing partition number
    pub fn with_reuse(mut self, number: u32) -> Self {
        self.reuse = Some(number);
        self
    }

    pub fn with_kind(mut self, kind: PartitionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_number(mut self, number: u32) -> Self {
        self.number = Some(number);
        self
    }

    pub fn with_max_cylinder(mut self, cylinder: u64) -> Self {
        self.max_cylinder = Some(cylinder);
        self
    }

    /// Make the partition an LVM physical volume of `group`
    pub fn with_lvm_group(mut self, group: impl Into<String>) -> Self {
        self.lvm_group = Some(group.into());
        self
    }

    /// Make the partition a member of RAID `name`
    pub fn with_raid(mut self, name: impl Into<String>) -> Self {
        self.raid_name = Some(name.into());
        self
    }

    pub fn is_swap(&self) -> bool {
        self.mount.as_deref() == Some("swap") || self.filesystem.is_some_and(Filesystem::is_swap)
    }

    pub fn is_mount(&self, path: &str) -> bool {
        self.mount.as_deref() == Some(path)
    }

    /// Entries the search never places: numbered placeholders and explicit
    /// extended containers (containers are synthesized by the planner).
    pub fn is_placeholder(&self) -> bool {
        self.number == Some(0) || self.kind == Some(PartitionKind::Extended)
    }

    /// Partition ID written to the table for this request
    pub fn fsid(&self) -> u32 {
        if let Some(id) = self.fsid {
            id
        } else if self.is_swap() {
            fsid::LINUX_SWAP
        } else if self.lvm_group.is_some() {
            fsid::LINUX_LVM
        } else if self.raid_name.is_some() {
            fsid::LINUX_RAID
        } else {
            fsid::LINUX_NATIVE
        }
    }

    /// Filesystem to create; LVM and RAID members carry none
    pub fn effective_filesystem(&self) -> Option<Filesystem> {
        if self.lvm_group.is_some() || self.raid_name.is_some() {
            return None;
        }
        match self.filesystem {
            Some(fs) => Some(fs),
            None if self.is_swap() => Some(Filesystem::Swap),
            None => Some(Filesystem::default()),
        }
    }

    /// Reject requests the planner cannot interpret.
    pub fn validate(&self) -> Result<()> {
        let name = self.mount.as_deref().unwrap_or("<unmounted>");
        match self.size {
            SizePolicy::Fixed(0) => {
                return Err(PlannerError::invalid_partition(format!("{name}: fixed size is zero")));
            }
            SizePolicy::Percent(p) if p == 0 || p > 100 => {
                return Err(PlannerError::invalid_partition(format!(
                    "{name}: percentage {p} is outside 1..=100"
                )));
            }
            _ => {}
        }
        if let (SizePolicy::Fixed(bytes), Some(max)) = (self.size, self.max_size) {
            if max < bytes {
                return Err(PlannerError::invalid_partition(format!(
                    "{name}: max size {max} is below the fixed size {bytes}"
                )));
            }
        }
        if self.max_size == Some(0) {
            return Err(PlannerError::invalid_partition(format!("{name}: max size is zero")));
        }
        if self.lvm_group.is_some() && self.raid_name.is_some() {
            return Err(PlannerError::invalid_partition(format!(
                "{name}: cannot be both an LVM volume and a RAID member"
            )));
        }
        if self.reuse == Some(0) {
            return Err(PlannerError::invalid_partition(format!("{name}: reuse pin 0 is invalid")));
        }
        Ok(())
    }
}
