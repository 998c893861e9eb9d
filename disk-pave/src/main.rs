// SPDX-License-Identifier: MIT

mod logging;
mod output;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use log::{debug, info};
use paveio::prelude::*;
use paver::gpt::GptDevicePartitioner;
use paver::{DeviceDirectory, DevicePartitioner, ImageDirectory, PartitionRole, PaverConfig, Platform};
use pavepart::GptTable;
use pavepart::guids::format_guid;
use pavepart::mbr::read_mbr;

#[derive(Parser)]
#[command(name = "disk-pave", version, about = "Prepare OS partitions on a disk", long_about = None)]
struct Cli {
    /// Less output (repeat for errors only)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    quiet: u8,

    /// More output (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory of *.img disk images acting as block devices
    #[arg(short, long, global = true)]
    device_dir: Option<PathBuf>,

    /// Logical block size of the images
    #[arg(long, global = true)]
    block_size: Option<u32>,

    /// Probe order override
    #[arg(long, value_enum, global = true)]
    platform: Option<PlatformArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum PlatformArg {
    X64,
    Arm64,
}

impl From<PlatformArg> for Platform {
    fn from(arg: PlatformArg) -> Self {
        match arg {
            PlatformArg::X64 => Platform::X64,
            PlatformArg::Arm64 => Platform::Arm64,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List device nodes and the GPT of the target disk, without writing
    Probe,
    /// Create the partition backing a role
    Add { role: PartitionRole },
    /// Locate the partition backing a role
    Find { role: PartitionRole },
    /// Mark the partition backing a role as bootable
    Finalize { role: PartitionRole },
    /// Remove every partition backing the given roles
    Wipe {
        #[arg(required = true)]
        roles: Vec<PartitionRole>,
    },
    /// Write a payload into the partition backing a role, creating it if needed
    Pave { role: PartitionRole, payload: PathBuf },
}

fn load_config(cli: &Cli) -> anyhow::Result<PaverConfig> {
    let mut config = match &cli.config {
        Some(path) => PaverConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PaverConfig::default(),
    };
    if let Some(dir) = &cli.device_dir {
        config.device_dir = Some(dir.clone());
    }
    if let Some(bs) = cli.block_size {
        config.image_block_size = bs;
    }
    if let Some(platform) = cli.platform {
        config.platform = Some(platform.into());
    }
    config.validate()?;
    Ok(config)
}

fn probe(dir: &ImageDirectory) -> anyhow::Result<()> {
    let entries = dir.list()?;
    if entries.is_empty() {
        bail!("no disk images in {}", dir.root().display());
    }
    output::print_entries(&entries);

    let target = GptDevicePartitioner::find_target_disk(dir)?;
    println!("\ntarget disk: {}", target.topological_path);
    println!("  {}", output::geometry(&target.info));

    let mut disk = dir.open(&target.name)?;
    let info = disk.block_info()?;
    if !read_mbr(&mut disk).is_ok_and(|mbr| mbr.is_protective()) {
        println!("  {}", "no protective MBR".yellow());
    }
    let table = GptTable::load(&mut disk, info.block_size as u64, info.block_count)?;
    if !table.is_valid() {
        println!("  no valid GPT");
        return Ok(());
    }
    println!(
        "  GPT {} with {} partition(s), usable blocks {}..={}",
        format_guid(&table.disk_guid()),
        table.len(),
        table.first_usable(),
        table.last_usable()
    );
    for (slot, entry) in table.partitions().iter().enumerate() {
        println!(
            "  [{slot:3}] {:<16} {:<12} {:>10}..={:<10} {}",
            entry.name(),
            entry.kind().to_string(),
            entry.first_lba,
            entry.last_lba,
            output::pretty_bytes(entry.num_blocks() * info.block_size as u64)
        );
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let Some(root) = config.device_dir.clone() else {
        bail!("no device directory: pass --device-dir or set device_dir in the config");
    };
    let dir = ImageDirectory::new(root, config.image_block_size);
    debug!("device directory {}", dir.root().display());

    match cli.command {
        Commands::Probe => probe(&dir),
        command => execute(&dir, &config, command),
    }
}

fn execute(dir: &ImageDirectory, config: &PaverConfig, command: Commands) -> anyhow::Result<()> {
    let Some(mut partitioner) = paver::create(dir, config) else {
        bail!("no partitioner matches the disks in {}", dir.root().display());
    };
    info!("using the {} partitioner", partitioner.name());

    match command {
        Commands::Probe => return probe(dir),
        Commands::Add { role } => {
            let device = partitioner.add_partition(role)?;
            let info = partitioner.block_info(&device)?;
            output::ok(format!("added {role}: {}", output::geometry(&info)));
        }
        Commands::Find { role } => {
            let device = partitioner.find_partition(role)?;
            let info = partitioner.block_info(&device)?;
            output::ok(format!("found {role}: {}", output::geometry(&info)));
        }
        Commands::Finalize { role } => {
            partitioner.finalize_partition(role)?;
            output::ok(format!("finalized {role}"));
        }
        Commands::Wipe { roles } => {
            partitioner.wipe_partitions(&roles)?;
            let names: Vec<&str> = roles.iter().map(|r| r.as_str()).collect();
            output::ok(format!("wiped {}", names.join(", ")));
        }
        Commands::Pave { role, payload } => {
            let data = fs::read(&payload)
                .with_context(|| format!("reading {}", payload.display()))?;
            let info = partitioner.pave(role, &data)?;
            output::ok(format!(
                "paved {} into {role} ({})",
                output::pretty_bytes(data.len() as u64),
                output::geometry(&info)
            ));
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    logging::init(logging::level(cli.quiet, cli.verbose));

    if let Err(e) = run(cli) {
        output::failed(format!("{e:#}"));
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "platform = \"arm64\"\nbind_timeout_ms = 100").unwrap();
        let path = file.path().to_str().unwrap();

        let cli = Cli::try_parse_from([
            "disk-pave", "--config", path, "--device-dir", "/tmp/disks", "--platform", "x64",
            "wipe", "fvm", "data",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.platform, Some(Platform::X64));
        assert_eq!(config.bind_timeout_ms, 100);
        assert_eq!(config.device_dir, Some(PathBuf::from("/tmp/disks")));

        let Commands::Wipe { roles } = cli.command else {
            panic!("expected wipe");
        };
        assert_eq!(roles, [PartitionRole::FuchsiaVolumeManager, PartitionRole::Data]);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(Cli::try_parse_from(["disk-pave", "wipe"]).is_err());
        assert!(Cli::try_parse_from(["disk-pave", "add", "kernel-z"]).is_err());

        let cli = Cli::try_parse_from(["disk-pave", "--block-size", "1000", "probe"]).unwrap();
        assert!(load_config(&cli).is_err());
    }
}
