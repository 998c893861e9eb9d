// SPDX-License-Identifier: MIT

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use log::{debug, warn};
use paveio::prelude::*;
use pavepart::GptTable;

use super::{DeviceDirectory, DeviceEntry, PARTITION_PATH_MARKER, PartitionIdent};
use crate::error::{PaveError, PaveResult};

#[derive(Debug, Clone)]
struct MemNode {
    topological_path: String,
    info: BlockInfo,
    io: MemBlockIO,
    partition: Option<PartitionIdent>,
    /// Disk node this partition was published for by a rescan.
    parent: Option<String>,
}

#[derive(Debug, Default)]
struct MemState {
    nodes: BTreeMap<String, MemNode>,
    next_id: u32,
    fail_rescan: bool,
    rescans: u32,
}

impl MemState {
    fn insert(&mut self, node: MemNode) -> String {
        let name = format!("{:03}", self.next_id);
        self.next_id += 1;
        self.nodes.insert(name.clone(), node);
        name
    }
}

/// In-memory device class.
///
/// Disks are sparse `MemBlockIO` buffers. A rescan of a disk re-reads its
/// GPT and republishes one `part-NNN` child per record; partition nodes
/// share the disk's backing store. Clones refer to the same directory.
#[derive(Debug, Clone, Default)]
pub struct MemDirectory {
    state: Rc<RefCell<MemState>>,
}

impl MemDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a zero-filled disk and returns a handle on its contents.
    pub fn add_disk(&self, topological_path: &str, info: BlockInfo) -> MemBlockIO {
        let io = MemBlockIO::new(info.size_bytes());
        self.add_disk_with(topological_path, info, io.clone());
        io
    }

    /// Adds a disk backed by `io`, returning its node name.
    pub fn add_disk_with(&self, topological_path: &str, info: BlockInfo, io: MemBlockIO) -> String {
        self.state.borrow_mut().insert(MemNode {
            topological_path: topological_path.to_string(),
            info,
            io,
            partition: None,
            parent: None,
        })
    }

    /// Publishes a standalone partition node, as firmware-defined
    /// partitions appear on boards without a GPT.
    pub fn add_partition_node(
        &self,
        topological_path: &str,
        info: BlockInfo,
        type_guid: [u8; 16],
        unique_guid: [u8; 16],
    ) -> MemBlockIO {
        let io = MemBlockIO::new(info.size_bytes());
        self.state.borrow_mut().insert(MemNode {
            topological_path: topological_path.to_string(),
            info,
            io: io.clone(),
            partition: Some(PartitionIdent {
                type_guid,
                unique_guid,
            }),
            parent: None,
        });
        io
    }

    /// Makes subsequent rescans fail.
    pub fn set_fail_rescan(&self, fail: bool) {
        self.state.borrow_mut().fail_rescan = fail;
    }

    /// Number of disk rescans served so far.
    pub fn rescan_count(&self) -> u32 {
        self.state.borrow().rescans
    }

    /// Re-reads the GPT of disk `name` and republishes its partition nodes.
    pub fn rescan(&self, name: &str) -> BlockIOResult {
        let mut state = self.state.borrow_mut();
        if state.fail_rescan {
            return Err(BlockIOError::Other("rescan refused"));
        }
        let disk = match state.nodes.get(name) {
            Some(node) if node.partition.is_none() => node.clone(),
            Some(_) => return Err(BlockIOError::Unsupported),
            None => return Err(BlockIOError::Invalid("no such disk")),
        };
        state.rescans += 1;
        state
            .nodes
            .retain(|_, node| node.parent.as_deref() != Some(name));

        let bs = disk.info.block_size as u64;
        let mut io = disk.io.clone();
        let table = match GptTable::load(&mut io, bs, disk.info.block_count) {
            Ok(table) => table,
            Err(e) => {
                warn!("rescan of {}: cannot read GPT: {e}", disk.topological_path);
                return Ok(());
            }
        };
        if !table.is_valid() {
            debug!("rescan of {}: no valid GPT", disk.topological_path);
            return Ok(());
        }

        for (index, entry) in table.partitions().iter().enumerate() {
            let window = disk.io.window(entry.first_lba * bs, entry.num_blocks() * bs)?;
            let info = BlockInfo::new(disk.info.block_size, entry.num_blocks())
                .with_flags(disk.info.flags);
            state.insert(MemNode {
                topological_path: format!(
                    "{}/{PARTITION_PATH_MARKER}{index:03}/block",
                    disk.topological_path
                ),
                info,
                io: window,
                partition: Some(PartitionIdent {
                    type_guid: entry.type_guid,
                    unique_guid: entry.unique_guid,
                }),
                parent: Some(name.to_string()),
            });
        }
        debug!(
            "rescan of {}: published {} partition(s)",
            disk.topological_path,
            table.len()
        );
        Ok(())
    }
}

impl DeviceDirectory for MemDirectory {
    type Device = MemDevice;

    fn list(&self) -> PaveResult<Vec<DeviceEntry>> {
        Ok(self
            .state
            .borrow()
            .nodes
            .iter()
            .map(|(name, node)| DeviceEntry {
                name: name.clone(),
                topological_path: node.topological_path.clone(),
                info: node.info,
                partition: node.partition,
            })
            .collect())
    }

    fn open(&self, name: &str) -> PaveResult<MemDevice> {
        let state = self.state.borrow();
        let node = state
            .nodes
            .get(name)
            .ok_or_else(|| PaveError::NotFound(format!("no device node {name}")))?;
        Ok(MemDevice {
            name: name.to_string(),
            io: node.io.clone(),
            info: node.info,
            disk: node.partition.is_none(),
            dir: self.clone(),
        })
    }
}

/// An open node of a [`MemDirectory`].
#[derive(Debug, Clone)]
pub struct MemDevice {
    name: String,
    io: MemBlockIO,
    info: BlockInfo,
    disk: bool,
    dir: MemDirectory,
}

impl MemDevice {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle on the node's bytes (a window for partitions).
    pub fn io(&self) -> &MemBlockIO {
        &self.io
    }
}

impl BlockIO for MemDevice {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlockIOResult {
        if self.info.flags.contains(BlockFlags::READONLY) {
            return Err(BlockIOError::ReadOnly);
        }
        self.io.write_at(offset, data)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlockIOResult {
        self.io.read_at(offset, buf)
    }

    fn flush(&mut self) -> BlockIOResult {
        self.io.flush()
    }
}

impl BlockDevice for MemDevice {
    fn block_info(&self) -> BlockIOResult<BlockInfo> {
        Ok(self.info)
    }

    fn rescan_partitions(&mut self) -> BlockIOResult {
        if !self.disk {
            return Err(BlockIOError::Unsupported);
        }
        self.dir.rescan(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pavepart::guids::*;

    const BS: u64 = 512;
    const COUNT: u64 = 100_000;

    #[test]
    fn rescan_publishes_partitions() {
        let dir = MemDirectory::new();
        let mut io = dir.add_disk("/dev/sys/pci/00:17.0/ahci/sata0/block", BlockInfo::new(512, COUNT));

        let mut table = GptTable::new_empty(BS, COUNT).unwrap();
        table
            .add_partition("fvm", GPT_PARTITION_TYPE_FVM, [3; 16], 100, 50, 0)
            .unwrap();
        table.sync(&mut io).unwrap();

        let mut disk = dir.open("000").unwrap();
        disk.rescan_partitions().unwrap();

        let entries = dir.list().unwrap();
        assert_eq!(entries.len(), 2);
        let part = &entries[1];
        assert!(part.topological_path.ends_with("/part-000/block"));
        assert_eq!(part.info.block_count, 50);

        let node = dir
            .find_partition_node(&GPT_PARTITION_TYPE_FVM, Some(&[3; 16]))
            .unwrap()
            .unwrap();
        let mut dev = dir.open(&node.name).unwrap();
        dev.write_at(0, &[0x5A; 4]).unwrap();
        let mut buf = [0u8; 4];
        io.read_at(100 * BS, &mut buf).unwrap();
        assert_eq!(buf, [0x5A; 4]);
        assert!(dev.rescan_partitions().is_err());

        // A second rescan replaces the children instead of duplicating them.
        disk.rescan_partitions().unwrap();
        assert_eq!(dir.list().unwrap().len(), 2);
        assert_eq!(dir.rescan_count(), 2);
    }

    #[test]
    fn rescan_of_blank_disk_publishes_nothing() {
        let dir = MemDirectory::new();
        dir.add_disk("/dev/blank", BlockInfo::new(512, COUNT));
        dir.rescan("000").unwrap();
        assert_eq!(dir.list().unwrap().len(), 1);

        dir.set_fail_rescan(true);
        assert!(dir.rescan("000").is_err());
    }

    #[test]
    fn open_partition_times_out() {
        use std::time::Duration;

        let dir = MemDirectory::new();
        let err = dir
            .open_partition(
                &GPT_PARTITION_TYPE_ZIRCON_A,
                None,
                Duration::from_millis(20),
                Duration::from_millis(5),
            )
            .unwrap_err();
        assert!(matches!(err, PaveError::NotFound(_)));

        dir.add_partition_node(
            "/dev/sys/platform/zircon-a/block",
            BlockInfo::new(512, 16),
            GPT_PARTITION_TYPE_ZIRCON_A,
            [1; 16],
        );
        let dev = dir
            .open_partition(
                &GPT_PARTITION_TYPE_ZIRCON_A,
                None,
                Duration::from_millis(20),
                Duration::from_millis(5),
            )
            .unwrap();
        assert_eq!(dev.block_info().unwrap().block_count, 16);
    }
}
