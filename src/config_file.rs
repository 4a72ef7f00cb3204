//! Planning request files and planner options.
//!
//! A `PlanRequest` bundles everything one planning call needs: the probed
//! disks, the desired partitions from the profile and the `PlanOptions`.
//! It is saved and loaded as JSON so a request captured on one machine can be
//! replayed through `autopart plan`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::disk::Disk;
use crate::partition::DesiredPartition;
use crate::types::Filesystem;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Existing partitions the forced-removal pass must leave alone.
///
/// A partition matching any of the three lists is protected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepList {
    pub numbers: Vec<u32>,
    pub fsids: Vec<u32>,
    pub filesystems: Vec<Filesystem>,
}

impl KeepList {
    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty() && self.fsids.is_empty() && self.filesystems.is_empty()
    }
}

/// Knobs that change how the planner treats existing data and sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanOptions {
    /// Delete unprotected partitions when nothing else fits, instead of
    /// shrinking a Windows partition
    pub prefer_remove: bool,
    pub keep: KeepList,
    /// Installed memory, used for `Auto` swap and `Suspend` sizes
    pub ram_bytes: u64,
    /// Firmware limit below which `/boot` must end. When set and `/` has no
    /// separate `/boot`, one is added automatically.
    pub boot_limit_bytes: Option<u64>,
    /// Size of an automatically sized `/boot`
    pub boot_size_bytes: u64,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            prefer_remove: false,
            keep: KeepList::default(),
            ram_bytes: GIB,
            boot_limit_bytes: None,
            boot_size_bytes: 200 * MIB,
        }
    }
}

/// A complete planning request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub disks: Vec<Disk>,
    pub partitions: Vec<DesiredPartition>,
    #[serde(default)]
    pub options: PlanOptions,
}

impl PlanRequest {
    pub fn new(disks: Vec<Disk>, partitions: Vec<DesiredPartition>) -> Self {
        Self { disks, partitions, options: PlanOptions::default() }
    }

    /// Save request to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize plan request to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write plan request to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load request from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read plan request from {:?}", path.as_ref()))?;

        let request: Self =
            serde_json::from_str(&content).context("Failed to parse plan request JSON")?;

        Ok(request)
    }

    /// Validate the request.
    ///
    /// Size strings and mount/filesystem combinations are the profile
    /// parser's job; this only rejects what would make the planner's
    /// arithmetic meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.disks.is_empty() {
            anyhow::bail!("At least one disk must be given");
        }
        for disk in &self.disks {
            disk.validate()?;
        }
        for partition in &self.partitions {
            partition.validate()?;
        }

        // A reuse pin must name a partition on at least one disk
        for partition in &self.partitions {
            if let Some(pin) = partition.reuse {
                let found = self.disks.iter().any(|d| d.partition(pin).is_some());
                if !found {
                    anyhow::bail!("Reuse pin {} does not match any existing partition", pin);
                }
            }
        }

        let mut mounts: Vec<&str> = self
            .partitions
            .iter()
            .filter(|p| !p.is_placeholder())
            .filter_map(|p| p.mount.as_deref())
            .filter(|m| *m != "swap")
            .collect();
        mounts.sort_unstable();
        if let Some(dup) = mounts.windows(2).find(|w| w[0] == w[1]) {
            anyhow::bail!("Mount point {} is requested twice", dup[0]);
        }

        if self.options.boot_size_bytes == 0 {
            anyhow::bail!("Boot size must be greater than zero");
        }

        Ok(())
    }
}
