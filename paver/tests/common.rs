// SPDX-License-Identifier: MIT

#![allow(dead_code)]

use std::time::Duration;

use paveio::prelude::*;
use paver::{MemDirectory, PaverConfig, Platform, Timeouts};
use pavepart::GptTable;
use pavepart::cros::{set_priority, set_successful, set_tries};
use pavepart::guids::*;

pub const BS: u64 = 512;
/// 16 GiB of 512-byte blocks; sparse, so only touched chunks cost memory.
pub const COUNT: u64 = 1 << 25;
pub const MIB: u64 = 1 << 20;
pub const GIB: u64 = 1 << 30;

pub const DISK_PATH: &str = "/dev/sys/pci/00:17.0/ahci/sata0/block";

pub fn timeouts() -> Timeouts {
    Timeouts {
        bind: Duration::from_millis(50),
        wipe: Duration::from_millis(50),
        poll: Duration::from_millis(1),
    }
}

pub fn config(platform: Platform) -> PaverConfig {
    PaverConfig {
        platform: Some(platform),
        bind_timeout_ms: 50,
        wipe_timeout_ms: 50,
        poll_interval_ms: 1,
        ..PaverConfig::default()
    }
}

/// A directory holding one blank 16 GiB disk.
pub fn blank_disk() -> (MemDirectory, MemBlockIO) {
    let dir = MemDirectory::new();
    let io = dir.add_disk(DISK_PATH, BlockInfo::new(BS as u32, COUNT));
    (dir, io)
}

pub fn guid(n: u8) -> [u8; 16] {
    [n; 16]
}

/// Writes a GPT with the given `(name, type, first, blocks)` records.
pub fn write_table(io: &mut MemBlockIO, parts: &[(&str, [u8; 16], u64, u64)]) -> GptTable {
    let mut table = GptTable::new_empty(BS, COUNT).unwrap();
    for (i, (name, type_guid, first, blocks)) in parts.iter().enumerate() {
        table
            .add_partition(name, *type_guid, guid(i as u8 + 1), *first, *blocks, 0)
            .unwrap();
    }
    table.sync(io).unwrap();
    table
}

pub fn reload(io: &mut MemBlockIO) -> GptTable {
    GptTable::load(io, BS, COUNT).unwrap()
}

/// Kernel priorities for KERN-A/B/C; `None` leaves KERN-C out.
pub fn cros_disk(prio_a: u8, prio_b: u8, prio_c: Option<u8>) -> (MemDirectory, MemBlockIO) {
    let (dir, mut io) = blank_disk();
    let kernel = GPT_PARTITION_TYPE_CROS_KERNEL;
    let root = GPT_PARTITION_TYPE_CROS_ROOTFS;
    let kern_blocks = 64 * MIB / BS;

    let mut parts = vec![
        ("KERN-A", kernel, 2048, kern_blocks),
        ("ROOT-A", root, 2048 + kern_blocks, kern_blocks),
        ("KERN-B", kernel, 2048 + 2 * kern_blocks, kern_blocks),
        ("ROOT-B", root, 2048 + 3 * kern_blocks, kern_blocks),
    ];
    if prio_c.is_some() {
        parts.push(("KERN-C", kernel, 2048 + 4 * kern_blocks, kern_blocks));
    }
    let mut table = write_table(&mut io, &parts);

    let prios = [(1u8, prio_a), (3, prio_b)];
    for (index, prio) in prios {
        let entry = table.partition_mut(&guid(index)).unwrap();
        set_priority(entry, prio).unwrap();
        set_tries(entry, 0).unwrap();
        set_successful(entry, true);
    }
    if let Some(prio) = prio_c {
        let entry = table.partition_mut(&guid(5)).unwrap();
        set_priority(entry, prio).unwrap();
    }
    table.sync(&mut io).unwrap();
    dir.rescan("000").unwrap();
    (dir, io)
}
