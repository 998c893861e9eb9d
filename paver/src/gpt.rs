// SPDX-License-Identifier: MIT

//! Shared GPT primitives: disk discovery, table bootstrap, allocation,
//! lookup and wipe.

use log::{debug, error, info, warn};
use paveio::prelude::*;
use pavepart::guids::random_guid;
use pavepart::{GptEntry, GptTable};

use crate::config::Timeouts;
use crate::device::{DeviceDirectory, DeviceEntry, PARTITION_PATH_MARKER};
use crate::error::{PaveError, PaveResult};
use crate::filter::PartitionFilter;
use crate::first_fit::{PartitionPosition, find_first_fit};

/// Bytes scrubbed at the head of a partition before it is removed.
pub const WIPE_HEAD_BYTES: usize = 8 * 1024;

/// A GPT disk session: the disk handle, its geometry and the loaded table.
pub struct GptDevicePartitioner<D: DeviceDirectory> {
    dir: D,
    disk: D::Device,
    disk_path: String,
    info: BlockInfo,
    table: GptTable,
    timeouts: Timeouts,
}

impl<D: DeviceDirectory> core::fmt::Debug for GptDevicePartitioner<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GptDevicePartitioner")
            .field("disk_path", &self.disk_path)
            .field("info", &self.info)
            .field("partitions", &self.table.len())
            .finish()
    }
}

impl<D: DeviceDirectory> GptDevicePartitioner<D> {
    /// First non-removable node that is not itself a partition.
    pub fn find_target_disk(dir: &D) -> PaveResult<DeviceEntry> {
        dir.list()?
            .into_iter()
            .find(|entry| {
                !entry.info.is_removable()
                    && !entry.is_partition()
                    && !entry.topological_path.contains(PARTITION_PATH_MARKER)
            })
            .ok_or_else(|| {
                error!("no candidate GPT disk found");
                PaveError::NotFound("no candidate GPT disk".into())
            })
    }

    /// Opens the target disk and loads its GPT, rewriting an invalid table
    /// as an empty valid one.
    pub fn initialize_gpt(dir: D, timeouts: Timeouts) -> PaveResult<Self> {
        let target = Self::find_target_disk(&dir)?;
        let mut disk = dir.open(&target.name).map_err(|e| {
            error!("failed to open GPT disk {}: {e}", target.topological_path);
            PaveError::NotFound(format!("cannot open {}", target.topological_path))
        })?;
        let info = disk.block_info().map_err(|e| {
            error!("couldn't get GPT block info: {e}");
            PaveError::NotFound(format!("no block info for {}", target.topological_path))
        })?;

        let mut table = GptTable::load(&mut disk, info.block_size as u64, info.block_count)
            .map_err(|e| {
                error!("failed to read GPT: {e}");
                PaveError::BadState(format!("cannot read GPT: {e}"))
            })?;

        if !table.is_valid() {
            warn!(
                "GPT on {} is invalid; initializing an empty table",
                target.topological_path
            );
            table.remove_all();
            table.sync(&mut disk).map_err(|e| {
                error!("failed to sync empty GPT: {e}");
                PaveError::BadState(format!("cannot write empty GPT: {e}"))
            })?;
            disk.rescan_partitions().map_err(|e| {
                error!("failed to re-read GPT: {e}");
                PaveError::BadState(format!("rescan failed: {e}"))
            })?;
        }

        info!(
            "using GPT disk {} ({} blocks of {} bytes, {} partition(s))",
            target.topological_path,
            info.block_count,
            info.block_size,
            table.len()
        );
        Ok(Self {
            dir,
            disk,
            disk_path: target.topological_path,
            info,
            table,
            timeouts,
        })
    }

    #[inline]
    pub fn block_info(&self) -> BlockInfo {
        self.info
    }

    #[inline]
    pub fn disk_path(&self) -> &str {
        &self.disk_path
    }

    #[inline]
    pub fn table(&self) -> &GptTable {
        &self.table
    }

    #[inline]
    pub fn table_mut(&mut self) -> &mut GptTable {
        &mut self.table
    }

    #[inline]
    fn block_size(&self) -> u64 {
        self.info.block_size as u64
    }

    /// Persists the in-memory table.
    pub fn sync(&mut self) -> PaveResult {
        self.table.sync(&mut self.disk).map_err(|e| {
            error!("failed to sync GPT: {e}");
            PaveError::Io(format!("GPT sync failed: {e}"))
        })
    }

    /// Asks the block layer to re-read the table.
    pub fn rescan(&mut self) -> PaveResult {
        self.disk.rescan_partitions().map_err(|e| {
            error!("failed to rebind GPT: {e}");
            PaveError::Io(format!("rescan failed: {e}"))
        })
    }

    pub fn find_first_fit(&self, bytes: u64) -> PaveResult<PartitionPosition> {
        find_first_fit(
            self.table.partitions(),
            self.block_size(),
            self.info.block_count,
            bytes,
        )
    }

    /// Carves a new partition out of the first gap that fits and opens it.
    ///
    /// With a reserve, the partition takes the gap minus the reserve when
    /// both fit, else the whole gap. Without one it takes exactly the
    /// block-rounded minimum.
    pub fn add_partition(
        &mut self,
        name: &str,
        type_guid: [u8; 16],
        minimum_size_bytes: u64,
        optional_reserve_bytes: u64,
    ) -> PaveResult<D::Device> {
        let bs = self.block_size();
        let position = self.find_first_fit(minimum_size_bytes)?;
        debug!(
            "found space in GPT: {} blocks at {}",
            position.length_blocks, position.start_block
        );

        let minimum_blocks = minimum_size_bytes.div_ceil(bs).max(1);
        let length = if optional_reserve_bytes > 0 {
            let reserve_blocks = optional_reserve_bytes.div_ceil(bs);
            match position.length_blocks.checked_sub(reserve_blocks) {
                Some(rest) if rest >= minimum_blocks => {
                    debug!("space for reserve of {reserve_blocks} blocks");
                    rest
                }
                _ => position.length_blocks,
            }
        } else {
            minimum_blocks
        };
        debug!("final space in GPT: {length} blocks at {}", position.start_block);

        let unique_guid = self.create_gpt_partition(name, type_guid, position.start_block, length)?;
        debug!("added partition \"{name}\", waiting for bind");

        self.dir
            .open_partition(
                &type_guid,
                Some(&unique_guid),
                self.timeouts.bind,
                self.timeouts.poll,
            )
            .map_err(|e| {
                error!("added partition \"{name}\" but it never bound: {e}");
                PaveError::Io(format!("partition \"{name}\" did not bind: {e}"))
            })
    }

    fn create_gpt_partition(
        &mut self,
        name: &str,
        type_guid: [u8; 16],
        start: u64,
        blocks: u64,
    ) -> PaveResult<[u8; 16]> {
        let unique_guid = random_guid();
        self.table
            .add_partition(name, type_guid, unique_guid, start, blocks, 0)
            .map_err(|e| {
                error!("failed to add partition \"{name}\": {e}");
                PaveError::Io(format!("cannot add partition: {e}"))
            })?;
        self.sync()?;
        self.table.clear(&mut self.disk, start, 1).map_err(|e| {
            error!("failed to clear first block of new partition: {e}");
            PaveError::Io(format!("cannot clear partition head: {e}"))
        })?;
        self.rescan()?;
        Ok(unique_guid)
    }

    /// First record matching `filter`, in slot order.
    pub fn find_partition(&self, filter: &PartitionFilter) -> PaveResult<GptEntry> {
        let bs = self.block_size();
        self.table
            .partitions()
            .iter()
            .enumerate()
            .find(|(_, entry)| filter.matches(entry, bs))
            .map(|(index, entry)| {
                debug!("found partition in GPT, slot {index}");
                *entry
            })
            .ok_or_else(|| PaveError::NotFound(format!("no partition matches {filter:?}")))
    }

    /// Like [`Self::find_partition`], then opens the partition node.
    pub fn find_partition_device(&self, filter: &PartitionFilter) -> PaveResult<D::Device> {
        let entry = self.find_partition(filter)?;
        self.dir
            .open_partition(
                &entry.type_guid,
                Some(&entry.unique_guid),
                self.timeouts.bind,
                self.timeouts.poll,
            )
            .map_err(|e| {
                error!("couldn't open partition \"{}\": {e}", entry.name());
                PaveError::Io(format!("cannot open partition \"{}\": {e}", entry.name()))
            })
    }

    /// Scrubs and removes every record matching `filter`.
    ///
    /// Scrubbing is best effort. The table is synced only if something was
    /// removed; the rescan is always requested.
    pub fn wipe_partitions(&mut self, filter: &PartitionFilter) -> PaveResult {
        let bs = self.block_size();
        let doomed: Vec<GptEntry> = self
            .table
            .partitions()
            .iter()
            .filter(|entry| filter.matches(entry, bs))
            .copied()
            .collect();

        let mut modified = false;
        for entry in &doomed {
            self.scrub_head(entry);
            match self.table.remove_entry(entry) {
                Ok(_) => modified = true,
                Err(e) => warn!("could not remove partition \"{}\": {e}", entry.name()),
            }
        }

        if modified {
            self.sync()?;
            info!("GPT updated, reboot strongly recommended immediately");
            self.rescan()
        } else {
            if let Err(e) = self.disk.rescan_partitions() {
                warn!("rescan after empty wipe failed: {e}");
            }
            Ok(())
        }
    }

    fn scrub_head(&self, entry: &GptEntry) {
        let opened = self.dir.open_partition(
            &entry.type_guid,
            Some(&entry.unique_guid),
            self.timeouts.wipe,
            self.timeouts.poll,
        );
        let mut device = match opened {
            Ok(device) => device,
            Err(e) => {
                warn!("could not open \"{}\" to overwrite its head: {e}", entry.name());
                return;
            }
        };
        let len = entry
            .num_blocks()
            .saturating_mul(self.block_size())
            .min(WIPE_HEAD_BYTES as u64) as usize;
        if let Err(e) = device.zero_fill(0, len).and_then(|_| device.flush()) {
            warn!("could not overwrite head of \"{}\": {e}", entry.name());
        }
    }
}
