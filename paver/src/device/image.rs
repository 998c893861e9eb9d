// SPDX-License-Identifier: MIT

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use log::debug;
use paveio::prelude::*;
use pavepart::GptTable;

use super::{DeviceDirectory, DeviceEntry, PARTITION_PATH_MARKER, PartitionIdent};
use crate::error::{PaveError, PaveResult};

pub const IMAGE_EXTENSION: &str = "img";

/// A node opened from an [`ImageDirectory`]. Partition nodes are windows
/// into the image file.
pub type ImageDevice = Disk<StdBlockIO<File>>;

/// A host directory of disk images acting as the device class.
///
/// Each `*.img` file is a non-removable disk. Its partition nodes are
/// derived from the GPT on every listing, so rescans have nothing to do.
#[derive(Debug, Clone)]
pub struct ImageDirectory {
    root: PathBuf,
    block_size: u32,
}

impl ImageDirectory {
    pub fn new(root: impl Into<PathBuf>, block_size: u32) -> Self {
        Self {
            root: root.into(),
            block_size,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn images(&self) -> PaveResult<Vec<String>> {
        let mut names: Vec<String> = fs::read_dir(&self.root)?
            .flatten()
            .filter(|e| e.path().extension().is_some_and(|ext| ext == IMAGE_EXTENSION))
            .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        Ok(names)
    }

    fn disk_info(&self, file: &File) -> PaveResult<BlockInfo> {
        let len = file.metadata()?.len();
        Ok(BlockInfo::new(self.block_size, len / self.block_size as u64))
    }

    fn topological_path(image: &str) -> String {
        format!("/image/{image}/block")
    }

    fn load_table(&self, file: File, info: BlockInfo) -> PaveResult<GptTable> {
        let mut io = StdBlockIO::new(file);
        Ok(GptTable::load(
            &mut io,
            info.block_size as u64,
            info.block_count,
        )?)
    }
}

impl DeviceDirectory for ImageDirectory {
    type Device = ImageDevice;

    fn list(&self) -> PaveResult<Vec<DeviceEntry>> {
        let mut out = Vec::new();
        for image in self.images()? {
            let file = File::open(self.root.join(&image))?;
            let info = self.disk_info(&file)?;
            let disk_path = Self::topological_path(&image);
            out.push(DeviceEntry {
                name: image.clone(),
                topological_path: disk_path.clone(),
                info,
                partition: None,
            });

            let table = match self.load_table(file, info) {
                Ok(table) if table.is_valid() => table,
                Ok(_) => continue,
                Err(e) => {
                    debug!("{image}: no usable GPT: {e}");
                    continue;
                }
            };
            for (index, entry) in table.partitions().iter().enumerate() {
                out.push(DeviceEntry {
                    name: format!("{image}/{PARTITION_PATH_MARKER}{index:03}"),
                    topological_path: format!(
                        "/image/{image}/{PARTITION_PATH_MARKER}{index:03}/block"
                    ),
                    info: BlockInfo::new(self.block_size, entry.num_blocks()),
                    partition: Some(PartitionIdent {
                        type_guid: entry.type_guid,
                        unique_guid: entry.unique_guid,
                    }),
                });
            }
        }
        Ok(out)
    }

    fn open(&self, name: &str) -> PaveResult<ImageDevice> {
        let not_found = || PaveError::NotFound(format!("no device node {name}"));
        let (image, index) = match name.split_once(&format!("/{PARTITION_PATH_MARKER}")) {
            Some((image, index)) => (image, Some(index.parse::<usize>().map_err(|_| not_found())?)),
            None => (name, None),
        };
        let path = self.root.join(image);
        if !path.is_file() {
            return Err(not_found());
        }
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let info = self.disk_info(&file)?;

        let Some(index) = index else {
            return Ok(Disk::new(StdBlockIO::new(file), info));
        };

        let table = self.load_table(file.try_clone()?, info)?;
        let entry = *table.partitions().get(index).ok_or_else(not_found)?;
        let bs = self.block_size as u64;
        Ok(Disk::new(
            StdBlockIO::new_with_window(file, entry.first_lba * bs, entry.num_blocks() * bs),
            BlockInfo::new(self.block_size, entry.num_blocks()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pavepart::guids::*;
    use tempfile::tempdir;

    const BS: u64 = 512;
    const COUNT: u64 = 20_000;

    fn make_image(dir: &Path, name: &str) -> File {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(dir.join(name))
            .unwrap();
        file.set_len(BS * COUNT).unwrap();
        file
    }

    #[test]
    fn lists_images_and_partitions() {
        let tmp = tempdir().unwrap();
        let file = make_image(tmp.path(), "disk.img");
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let mut io = StdBlockIO::new(file);
        let mut table = GptTable::new_empty(BS, COUNT).unwrap();
        table
            .add_partition("data", GPT_PARTITION_TYPE_DATA, [2; 16], 2048, 100, 0)
            .unwrap();
        table.sync(&mut io).unwrap();

        let dir = ImageDirectory::new(tmp.path(), 512);
        let entries = dir.list().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "disk.img");
        assert_eq!(entries[0].info.block_count, COUNT);
        assert!(!entries[0].info.is_removable());
        assert_eq!(entries[1].name, "disk.img/part-000");
        assert!(entries[1].topological_path.contains("part-000"));

        let mut part = dir
            .open_partition(
                &GPT_PARTITION_TYPE_DATA,
                Some(&[2; 16]),
                std::time::Duration::ZERO,
                std::time::Duration::from_millis(1),
            )
            .unwrap();
        part.write_at(0, b"payload").unwrap();
        assert!(part.write_at(100 * BS, &[0]).is_err());

        let mut disk = dir.open("disk.img").unwrap();
        let mut buf = [0u8; 7];
        disk.read_at(2048 * BS, &mut buf).unwrap();
        assert_eq!(&buf, b"payload");
        assert!(disk.rescan_partitions().is_ok());
    }

    #[test]
    fn unknown_nodes_are_not_found() {
        let tmp = tempdir().unwrap();
        make_image(tmp.path(), "blank.img");
        let dir = ImageDirectory::new(tmp.path(), 512);

        assert_eq!(dir.list().unwrap().len(), 1);
        assert!(matches!(dir.open("other.img"), Err(PaveError::NotFound(_))));
        assert!(matches!(
            dir.open("blank.img/part-000"),
            Err(PaveError::NotFound(_))
        ));
        assert!(matches!(
            dir.open("blank.img/part-xyz"),
            Err(PaveError::NotFound(_))
        ));
    }
}
