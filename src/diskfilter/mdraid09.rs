//! Linux md 0.90 superblocks.
//!
//! The 4096-byte superblock lives in the last 64 KiB aligned block of the
//! device. It is stored in host byte order, so both little- and big-endian
//! variants are registered as separate filters.

use tracing::warn;

use crate::diskfilter::{is_known_level, DetectedMember, DiskFilter, LEVEL_MULTIPATH};
use crate::disk::{Disk, DiskError, SECTOR_SIZE};

pub const MD_SB_MAGIC: u32 = 0xa92b_4efc;
pub const MD_SB_BYTES: usize = 4096;
const MD_RESERVED_SECTORS: u64 = 64 * 1024 / SECTOR_SIZE as u64;

// word offsets into the superblock
const W_MAGIC: usize = 0;
const W_MAJOR: usize = 1;
const W_MINOR: usize = 2;
const W_UUID0: usize = 5;
const W_LEVEL: usize = 7;
const W_SIZE: usize = 8;
const W_RAID_DISKS: usize = 10;
const W_MD_MINOR: usize = 11;
const W_UUID1: usize = 13;
const W_LAYOUT: usize = 64;
const W_CHUNK: usize = 65;
const W_THIS_NUMBER: usize = 992;
const W_THIS_RAID_DISK: usize = 995;
const W_THIS_STATE: usize = 996;

const DISK_FAULTY: u32 = 1 << 0;

/// Sector of the superblock on a device of `total` sectors.
pub fn superblock_sector(total: u64) -> u64 {
    (total & !(MD_RESERVED_SECTORS - 1)).saturating_sub(MD_RESERVED_SECTORS)
}

pub struct MdRaid09 {
    big_endian: bool,
}

impl MdRaid09 {
    pub fn little_endian() -> Self {
        Self { big_endian: false }
    }

    pub fn big_endian() -> Self {
        Self { big_endian: true }
    }

    fn word(&self, sb: &[u8], index: usize) -> u32 {
        let at = index * 4;
        let bytes = [sb[at], sb[at + 1], sb[at + 2], sb[at + 3]];
        if self.big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        }
    }

    fn reject(&self, disk: &dyn Disk, reason: &str) -> Result<Option<DetectedMember>, DiskError> {
        warn!(device = disk.name(), filter = self.name(), reason, "superblock rejected");
        Ok(None)
    }
}

impl DiskFilter for MdRaid09 {
    fn name(&self) -> &'static str {
        if self.big_endian {
            "mdraid09_be"
        } else {
            "mdraid09"
        }
    }

    fn detect(&self, disk: &dyn Disk) -> Result<Option<DetectedMember>, DiskError> {
        let Some(total) = disk.total_sectors() else {
            return Ok(None);
        };
        if total < MD_RESERVED_SECTORS * 2 {
            return Ok(None);
        }
        let sector = superblock_sector(total);
        let mut sb = vec![0u8; MD_SB_BYTES];
        disk.read(sector, 0, &mut sb)?;

        if self.word(&sb, W_MAGIC) != MD_SB_MAGIC
            || self.word(&sb, W_MAJOR) != 0
            || self.word(&sb, W_MINOR) != 90
        {
            return Ok(None);
        }

        let mut level = self.word(&sb, W_LEVEL) as i32;
        if !is_known_level(level) {
            return self.reject(disk, "unsupported RAID level");
        }
        if level == LEVEL_MULTIPATH {
            level = 1;
        }

        let number = self.word(&sb, W_THIS_NUMBER);
        if number == 0xffff || number == 0xfffe {
            return self.reject(disk, "spare device");
        }
        if self.word(&sb, W_THIS_STATE) & DISK_FAULTY != 0 {
            return self.reject(disk, "faulty device");
        }
        let raid_disks = self.word(&sb, W_RAID_DISKS) as usize;
        let role = self.word(&sb, W_THIS_RAID_DISK) as usize;
        if raid_disks == 0 || role >= raid_disks {
            return self.reject(disk, "spare device");
        }

        let size = u64::from(self.word(&sb, W_SIZE)) * 2;
        if size > sector {
            return self.reject(disk, "declared size exceeds device");
        }

        let mut uuid = Vec::with_capacity(16);
        uuid.extend_from_slice(&sb[W_UUID0 * 4..W_UUID0 * 4 + 4]);
        uuid.extend_from_slice(&sb[W_UUID1 * 4..W_UUID1 * 4 + 12]);

        Ok(Some(DetectedMember {
            uuid,
            volume_name: Some(format!("md/{}", self.word(&sb, W_MD_MINOR))),
            level,
            layout: self.word(&sb, W_LAYOUT),
            nmemb: raid_disks,
            chunk_size: u64::from(self.word(&sb, W_CHUNK)) >> 9,
            member_sectors: if size == 0 { sector } else { size },
            index: role,
            start_sector: 0,
        }))
    }
}


#[cfg(test)]
mod tests {
    use super::test_images::*;
    use super::*;
    use crate::disk::MemDisk;

    fn disk_with(big_endian: bool, level: i32) -> MemDisk {
        let mut disk = MemDisk::zeroed("hd0", 300);
        write_sb09(&mut disk, big_endian, level, 3, 2, 7);
        disk
    }

    #[test]
    fn test_superblock_position() {
        assert_eq!(superblock_sector(256), 128);
        assert_eq!(superblock_sector(300), 128);
        assert_eq!(superblock_sector(1000), 768);
    }

    #[test]
    fn test_detects_little_endian_member() {
        let disk = disk_with(false, 5);
        let found = MdRaid09::little_endian().detect(&disk).unwrap().unwrap();
        assert_eq!(found.volume_name.as_deref(), Some("md/7"));
        assert_eq!(found.level, 5);
        assert_eq!(found.nmemb, 3);
        assert_eq!(found.index, 2);
        assert_eq!(found.chunk_size, 8);
        assert_eq!(found.member_sectors, 128);
        assert_eq!(found.uuid.len(), 16);
        assert_eq!(MdRaid09::big_endian().detect(&disk).unwrap(), None);
    }

    #[test]
    fn test_detects_big_endian_member() {
        let disk = disk_with(true, 1);
        assert_eq!(MdRaid09::little_endian().detect(&disk).unwrap(), None);
        let found = MdRaid09::big_endian().detect(&disk).unwrap().unwrap();
        assert_eq!(found.level, 1);
    }

    #[test]
    fn test_multipath_is_a_mirror() {
        let disk = disk_with(false, LEVEL_MULTIPATH);
        let found = MdRaid09::little_endian().detect(&disk).unwrap().unwrap();
        assert_eq!(found.level, 1);
    }

    #[yare::parameterized(
        level_3        = { W_LEVEL, 3 },
        level_7        = { W_LEVEL, 7 },
        spare_number   = { W_THIS_NUMBER, 0xffff },
        removed_number = { W_THIS_NUMBER, 0xfffe },
        faulty         = { W_THIS_STATE, 0b001 },
        spare_role     = { W_THIS_RAID_DISK, 3 },
        oversized      = { W_SIZE, 65 },
        wrong_minor    = { W_MINOR, 91 },
    )]
    fn test_rejected_superblocks(word: usize, value: u32) {
        let mut disk = disk_with(false, 1);
        set_word(&mut disk, false, word, value);
        assert_eq!(MdRaid09::little_endian().detect(&disk).unwrap(), None);
    }

    #[test]
    fn test_small_device_is_ignored() {
        let disk = MemDisk::zeroed("fd0", 100);
        assert_eq!(MdRaid09::little_endian().detect(&disk).unwrap(), None);
    }
}
