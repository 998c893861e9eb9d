// SPDX-License-Identifier: MIT

use colored::Colorize;
use paveio::prelude::BlockInfo;
use paver::DeviceEntry;
use pavepart::guids::{GptPartitionKind, format_guid};

pub fn pretty_bytes(n: u64) -> String {
    const UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
    let mut val = n as f64;
    let mut idx = 0usize;
    while val >= 1024.0 && idx + 1 < UNITS.len() {
        val /= 1024.0;
        idx += 1;
    }
    if idx == 0 {
        format!("{n} {}", UNITS[idx])
    } else {
        format!("{val:.1} {}", UNITS[idx])
    }
}

pub fn geometry(info: &BlockInfo) -> String {
    format!(
        "{} blocks of {} bytes ({})",
        info.block_count,
        info.block_size,
        pretty_bytes(info.size_bytes())
    )
}

/// One line per node of the device directory.
pub fn print_entries(entries: &[DeviceEntry]) {
    for entry in entries {
        let mut line = format!("{:>10}  {}", entry.name, entry.topological_path);
        match &entry.partition {
            Some(ident) => {
                let kind = GptPartitionKind::from_guid(&ident.type_guid);
                line.push_str(&format!(
                    "  {kind}  {}",
                    format_guid(&ident.unique_guid).dimmed()
                ));
            }
            None if entry.info.is_removable() => line.push_str(&format!("  {}", "removable".yellow())),
            None => {}
        }
        println!("{line}  {}", pretty_bytes(entry.info.size_bytes()));
    }
}

pub fn ok(msg: impl AsRef<str>) {
    println!("[disk-pave] {} {}", "ok".green().bold(), msg.as_ref());
}

pub fn failed(msg: impl AsRef<str>) {
    eprintln!("[disk-pave] {} {}", "error".red().bold(), msg.as_ref());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(pretty_bytes(512), "512 B");
        assert_eq!(pretty_bytes(64 << 20), "64.0 MiB");
        assert_eq!(pretty_bytes(3 << 29), "1.5 GiB");
    }

    #[test]
    fn geometry_line() {
        let info = BlockInfo::new(512, 2048);
        assert_eq!(geometry(&info), "2048 blocks of 512 bytes (1.0 MiB)");
    }
}
