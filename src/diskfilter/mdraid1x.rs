//! Linux md 1.x superblocks (minor versions 0, 1 and 2).

use tracing::warn;

use crate::diskfilter::mdraid09::MD_SB_MAGIC;
use crate::diskfilter::{is_known_level, DetectedMember, DiskFilter, LEVEL_MULTIPATH};
use crate::disk::{le_u16, le_u32, le_u64, Disk, DiskError};

const SB_BYTES: usize = 4096;
const ROLES_OFFSET: usize = 256;
const ROLE_SPARE: u16 = 0xffff;
const ROLE_FAULTY: u16 = 0xfffe;

/// Superblock sector for each minor version on a device of `total` sectors.
pub fn superblock_sector(minor: u32, total: u64) -> u64 {
    match minor {
        0 => total.saturating_sub(16) & !7,
        1 => 0,
        _ => 8,
    }
}

pub struct MdRaid1x;

impl MdRaid1x {
    fn decode(&self, disk: &dyn Disk, total: u64, sb: &[u8]) -> Option<DetectedMember> {
        let reject = |reason: &str| -> Option<DetectedMember> {
            warn!(device = disk.name(), filter = "mdraid1x", reason, "superblock rejected");
            None
        };

        let mut level = le_u32(sb, 72) as i32;
        if !is_known_level(level) {
            return reject("unsupported RAID level");
        }
        if level == LEVEL_MULTIPATH {
            level = 1;
        }

        let dev_number = le_u32(sb, 160) as usize;
        let max_dev = le_u32(sb, 220) as usize;
        if dev_number >= max_dev || ROLES_OFFSET + dev_number * 2 + 2 > SB_BYTES {
            return reject("device number outside role table");
        }
        let role = le_u16(sb, ROLES_OFFSET + dev_number * 2);
        if role == ROLE_SPARE || role == ROLE_FAULTY {
            return reject("spare device");
        }
        let raid_disks = le_u32(sb, 92) as usize;
        if usize::from(role) >= raid_disks {
            return reject("spare device");
        }

        let size = le_u64(sb, 80);
        let data_offset = le_u64(sb, 128);
        let data_size = le_u64(sb, 136);
        if size > data_size || data_offset.saturating_add(data_size) > total {
            return reject("declared size exceeds device");
        }

        let uuid = sb[16..32].to_vec();
        let raw_name = &sb[32..64];
        let end = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
        let full = String::from_utf8_lossy(&raw_name[..end]).into_owned();
        // "homehost:name" names the array by the part after the colon
        let short = full.rsplit(':').next().unwrap_or("").to_string();

        Some(DetectedMember {
            uuid,
            volume_name: (!short.is_empty()).then(|| format!("md/{}", short)),
            level,
            layout: le_u32(sb, 76),
            nmemb: raid_disks,
            chunk_size: u64::from(le_u32(sb, 88)),
            member_sectors: if level == 1 || size == 0 { data_size } else { size },
            index: usize::from(role),
            start_sector: data_offset,
        })
    }
}

impl DiskFilter for MdRaid1x {
    fn name(&self) -> &'static str {
        "mdraid1x"
    }

    fn detect(&self, disk: &dyn Disk) -> Result<Option<DetectedMember>, DiskError> {
        let Some(total) = disk.total_sectors() else {
            return Ok(None);
        };
        let mut sb = vec![0u8; SB_BYTES];
        for minor in 0..3 {
            let sector = superblock_sector(minor, total);
            if sector + (SB_BYTES / 512) as u64 > total {
                continue;
            }
            disk.read(sector, 0, &mut sb)?;
            if le_u32(&sb, 0) != MD_SB_MAGIC || le_u32(&sb, 4) != 1 {
                continue;
            }
            if le_u64(&sb, 144) != sector {
                continue;
            }
            return Ok(self.decode(disk, total, &sb));
        }
        Ok(None)
    }
}

#[cfg(test)]
pub(crate) mod test_images {
    use super::*;
    use crate::disk::MemDisk;

    pub struct Sb1x<'a> {
        pub minor: u32,
        pub level: i32,
        pub raid_disks: u32,
        pub role: u16,
        pub name: &'a str,
        pub data_offset: u64,
        pub data_size: u64,
        pub size: u64,
    }

    impl Default for Sb1x<'_> {
        fn default() -> Self {
            Self {
                minor: 2,
                level: 1,
                raid_disks: 2,
                role: 0,
                name: "box:boot",
                data_offset: 16,
                data_size: 64,
                size: 64,
            }
        }
    }

    pub fn write_sb1x(disk: &mut MemDisk, sb: &Sb1x<'_>) {
        let total = disk.total_sectors().unwrap();
        let sector = superblock_sector(sb.minor, total);
        let mut buf = vec![0u8; SB_BYTES];
        buf[0..4].copy_from_slice(&MD_SB_MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&1u32.to_le_bytes());
        buf[16..32].copy_from_slice(&[0x5a; 16]);
        buf[32..32 + sb.name.len()].copy_from_slice(sb.name.as_bytes());
        buf[72..76].copy_from_slice(&(sb.level as u32).to_le_bytes());
        buf[80..88].copy_from_slice(&sb.size.to_le_bytes());
        buf[88..92].copy_from_slice(&8u32.to_le_bytes());
        buf[92..96].copy_from_slice(&sb.raid_disks.to_le_bytes());
        buf[128..136].copy_from_slice(&sb.data_offset.to_le_bytes());
        buf[136..144].copy_from_slice(&sb.data_size.to_le_bytes());
        buf[144..152].copy_from_slice(&sector.to_le_bytes());
        buf[160..164].copy_from_slice(&1u32.to_le_bytes());
        buf[220..224].copy_from_slice(&4u32.to_le_bytes());
        buf[258..260].copy_from_slice(&sb.role.to_le_bytes());
        disk.write(sector, 0, &buf).unwrap();
    }
}
