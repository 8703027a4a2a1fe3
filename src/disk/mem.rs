//! In-Memory Disks and Partition Views

use std::fs;
use std::path::Path;
use std::rc::Rc;

use crate::disk::types::{check_range, Disk, DiskError, SECTOR_SIZE};
use crate::partition::Partition;

/// A disk backed by a byte buffer, used for images and tests.
#[derive(Debug, Clone)]
pub struct MemDisk {
    name: String,
    data: Vec<u8>,
}

impl MemDisk {
    /// A zero-filled disk of `sectors` sectors.
    pub fn zeroed(name: impl Into<String>, sectors: u64) -> Self {
        Self {
            name: name.into(),
            data: vec![0u8; sectors as usize * SECTOR_SIZE],
        }
    }

    /// Wrap an image; a trailing partial sector is padded with zeroes.
    pub fn from_image(name: impl Into<String>, mut data: Vec<u8>) -> Self {
        let rem = data.len() % SECTOR_SIZE;
        if rem != 0 {
            data.resize(data.len() + SECTOR_SIZE - rem, 0);
        }
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn load(name: impl Into<String>, path: &Path) -> Result<Self, DiskError> {
        let name = name.into();
        let data = fs::read(path).map_err(|e| DiskError::Io {
            device: name.clone(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        Ok(Self::from_image(name, data))
    }

    /// Overwrite bytes starting `offset` bytes into `sector`.
    pub fn write(&mut self, sector: u64, offset: usize, bytes: &[u8]) -> Result<(), DiskError> {
        check_range(self, sector, offset, bytes.len())?;
        let start = sector as usize * SECTOR_SIZE + offset;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Disk for MemDisk {
    fn name(&self) -> &str {
        &self.name
    }

    fn total_sectors(&self) -> Option<u64> {
        Some((self.data.len() / SECTOR_SIZE) as u64)
    }

    fn read(&self, sector: u64, offset: usize, buf: &mut [u8]) -> Result<(), DiskError> {
        check_range(self, sector, offset, buf.len())?;
        let start = sector as usize * SECTOR_SIZE + offset;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }
}

/// A window onto one partition of its parent device.
pub struct PartitionDisk {
    name: String,
    parent: Rc<dyn Disk>,
    partition: Partition,
}

impl PartitionDisk {
    pub fn new(parent: Rc<dyn Disk>, partition: Partition) -> Self {
        let name = format!("{},{}", parent.name(), partition.name());
        Self {
            name,
            parent,
            partition,
        }
    }

    pub fn parent(&self) -> &Rc<dyn Disk> {
        &self.parent
    }
}

impl Disk for PartitionDisk {
    fn name(&self) -> &str {
        &self.name
    }

    fn total_sectors(&self) -> Option<u64> {
        Some(self.partition.len)
    }

    fn read(&self, sector: u64, offset: usize, buf: &mut [u8]) -> Result<(), DiskError> {
        check_range(self, sector, offset, buf.len())?;
        self.parent.read(self.partition.start + sector, offset, buf)
    }

    fn partition(&self) -> Option<&Partition> {
        Some(&self.partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(start: u64, len: u64) -> Partition {
        Partition {
            start,
            len,
            ..Partition::new("msdos")
        }
    }

    #[test]
    fn test_mem_disk_reads_across_sectors() {
        let mut disk = MemDisk::zeroed("hd0", 4);
        disk.write(0, 510, &[1, 2, 3, 4]).unwrap();
        let mut buf = [0u8; 4];
        disk.read(0, 510, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        disk.read(1, 0, &mut buf[..2]).unwrap();
        assert_eq!(&buf[..2], &[3, 4]);
    }

    #[test]
    fn test_mem_disk_rejects_out_of_range() {
        let disk = MemDisk::zeroed("hd0", 2);
        let mut buf = [0u8; 8];
        let err = disk.read(1, 508, &mut buf).unwrap_err();
        assert_eq!(err, DiskError::OutOfRange { device: "hd0".to_string() });
    }

    #[test]
    fn test_image_padded_to_sector() {
        let disk = MemDisk::from_image("hd1", vec![7u8; 700]);
        assert_eq!(disk.total_sectors(), Some(2));
    }

    #[test]
    fn test_partition_view_offsets_reads() {
        let mut disk = MemDisk::zeroed("hd0", 8);
        disk.write(5, 0, b"hello").unwrap();
        let view = PartitionDisk::new(Rc::new(disk), part(4, 2));
        assert_eq!(view.name(), "hd0,msdos1");
        let mut buf = [0u8; 5];
        view.read(1, 0, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert!(view.read(2, 0, &mut buf).is_err());
    }
}
