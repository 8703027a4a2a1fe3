//! Diskfilters
//!
//! A diskfilter recognises member devices of a composite volume (software
//! RAID) by an on-disk superblock. The [`DiskFilterRegistry`] tries every
//! filter in registration order against a candidate device, and the first
//! positive detection is merged into a [`Volume`] keyed by the volume UUID.
//! Volumes are presented as ordinary [`Disk`]s through [`VolumeDisk`].

pub mod mdraid09;
pub mod mdraid1x;

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::disk::{check_range, Disk, DiskError, SECTOR_SIZE};

pub const LEVEL_LINEAR: i32 = -1;
pub const LEVEL_MULTIPATH: i32 = -4;

/// Levels the md filters accept; anything else is rejected at detection.
pub fn is_known_level(level: i32) -> bool {
    matches!(level, LEVEL_LINEAR | LEVEL_MULTIPATH | 0 | 1 | 4 | 5 | 6 | 10)
}

/// What a filter learned about one member device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedMember {
    pub uuid: Vec<u8>,
    /// Device name of the volume, e.g. `md/0`. Falls back to `mduuid/<hex>`.
    pub volume_name: Option<String>,
    pub level: i32,
    pub layout: u32,
    pub nmemb: usize,
    /// Chunk size in sectors.
    pub chunk_size: u64,
    /// Data sectors this member contributes.
    pub member_sectors: u64,
    /// Slot (role) of this member within the volume.
    pub index: usize,
    /// First data sector on the member device.
    pub start_sector: u64,
}

pub trait DiskFilter {
    fn name(&self) -> &'static str;

    /// `Ok(None)` when the device carries no superblock of this format, or
    /// one that must not be accepted.
    fn detect(&self, disk: &dyn Disk) -> Result<Option<DetectedMember>, DiskError>;
}

#[derive(Clone)]
pub struct Member {
    pub device: String,
    pub disk: Rc<dyn Disk>,
    pub start_sector: u64,
    pub sectors: u64,
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("device", &self.device)
            .field("start_sector", &self.start_sector)
            .field("sectors", &self.sectors)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Volume {
    pub uuid: Vec<u8>,
    pub name: String,
    pub filter: &'static str,
    pub level: i32,
    pub layout: u32,
    pub chunk_size: u64,
    /// Indexed by role; `None` until that member has been seen.
    pub members: Vec<Option<Member>>,
}

pub fn uuid_hex(uuid: &[u8]) -> String {
    uuid.iter().map(|b| format!("{:02x}", b)).collect()
}

impl Volume {
    /// Alternative name that is always unique.
    pub fn uuid_name(&self) -> String {
        format!("mduuid/{}", uuid_hex(&self.uuid))
    }

    pub fn nmemb(&self) -> usize {
        self.members.len()
    }

    pub fn present(&self) -> usize {
        self.members.iter().filter(|m| m.is_some()).count()
    }

    fn member_sectors(&self) -> u64 {
        self.members
            .iter()
            .flatten()
            .map(|m| m.sectors)
            .min()
            .unwrap_or(0)
    }

    /// Logical size of the composite in sectors.
    pub fn total_sectors(&self) -> u64 {
        let n = self.nmemb() as u64;
        let size = self.member_sectors();
        match self.level {
            LEVEL_LINEAR => self.members.iter().flatten().map(|m| m.sectors).sum(),
            0 => n * size,
            1 | LEVEL_MULTIPATH => size,
            4 | 5 => n.saturating_sub(1) * size,
            6 => n.saturating_sub(2) * size,
            10 => {
                let near = u64::from(self.layout & 0xff).max(1);
                let far = u64::from((self.layout >> 8) & 0xff).max(1);
                n * size / (near * far)
            }
            _ => 0,
        }
    }

    /// Whether the volume can serve reads: mirrors need one member, the
    /// rest need every slot.
    pub fn is_readable(&self) -> bool {
        match self.level {
            1 | LEVEL_MULTIPATH => self.present() > 0,
            _ => self.present() == self.nmemb(),
        }
    }

    fn missing(&self, slot: usize) -> DiskError {
        DiskError::Io {
            device: self.name.clone(),
            reason: format!("member {} is missing", slot),
        }
    }

    /// Map a logical sector to `(member slot, sector within member data)`.
    fn locate(&self, sector: u64) -> Result<(usize, u64), DiskError> {
        match self.level {
            LEVEL_LINEAR => {
                let mut rest = sector;
                for (slot, member) in self.members.iter().enumerate() {
                    let member = member.as_ref().ok_or_else(|| self.missing(slot))?;
                    if rest < member.sectors {
                        return Ok((slot, rest));
                    }
                    rest -= member.sectors;
                }
                Err(DiskError::OutOfRange {
                    device: self.name.clone(),
                })
            }
            0 => {
                let chunk = self.chunk_size.max(1);
                let n = self.nmemb() as u64;
                let stripe = sector / chunk;
                let slot = (stripe % n) as usize;
                Ok((slot, (stripe / n) * chunk + sector % chunk))
            }
            1 | LEVEL_MULTIPATH => {
                let slot = self
                    .members
                    .iter()
                    .position(|m| m.is_some())
                    .ok_or_else(|| self.missing(0))?;
                Ok((slot, sector))
            }
            level => Err(DiskError::Unsupported(format!(
                "reading RAID level {} is not supported",
                level
            ))),
        }
    }
}

/// A volume presented as a disk.
#[derive(Debug, Clone)]
pub struct VolumeDisk {
    volume: Volume,
}

impl VolumeDisk {
    pub fn new(volume: Volume) -> Self {
        Self { volume }
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }
}

impl Disk for VolumeDisk {
    fn name(&self) -> &str {
        &self.volume.name
    }

    fn total_sectors(&self) -> Option<u64> {
        Some(self.volume.total_sectors())
    }

    fn read(&self, sector: u64, offset: usize, buf: &mut [u8]) -> Result<(), DiskError> {
        check_range(self, sector, offset, buf.len())?;
        let mut pos = sector * SECTOR_SIZE as u64 + offset as u64;
        let mut done = 0;
        while done < buf.len() {
            let logical = pos / SECTOR_SIZE as u64;
            let within = (pos % SECTOR_SIZE as u64) as usize;
            let n = (SECTOR_SIZE - within).min(buf.len() - done);
            let (slot, mapped) = self.volume.locate(logical)?;
            let member = self.volume.members[slot]
                .as_ref()
                .ok_or_else(|| self.volume.missing(slot))?;
            member
                .disk
                .read(member.start_sector + mapped, within, &mut buf[done..done + n])?;
            done += n;
            pos += n as u64;
        }
        Ok(())
    }
}

pub struct DiskFilterRegistry {
    filters: Vec<Box<dyn DiskFilter>>,
    volumes: IndexMap<Vec<u8>, Volume>,
}

impl DiskFilterRegistry {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            volumes: IndexMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(mdraid09::MdRaid09::little_endian()));
        registry.register(Box::new(mdraid09::MdRaid09::big_endian()));
        registry.register(Box::new(mdraid1x::MdRaid1x));
        registry
    }

    pub fn register(&mut self, filter: Box<dyn DiskFilter>) {
        self.filters.push(filter);
    }

    pub fn filter_names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run the filters over one candidate. Returns the volume name when a
    /// filter claimed the device.
    pub fn scan(&mut self, device: &str, disk: Rc<dyn Disk>) -> Option<String> {
        for filter in &self.filters {
            let detected = match filter.detect(disk.as_ref()) {
                Ok(Some(detected)) => detected,
                Ok(None) => continue,
                Err(err) => {
                    debug!(device, filter = filter.name(), error = %err, "detect failed");
                    continue;
                }
            };
            if detected.index >= detected.nmemb {
                warn!(
                    device,
                    filter = filter.name(),
                    index = detected.index,
                    nmemb = detected.nmemb,
                    "member role outside the volume, ignoring"
                );
                return None;
            }
            let filter_name = filter.name();
            debug!(device, filter = filter_name, index = detected.index, "member detected");
            return Some(self.merge(device, disk, filter_name, detected));
        }
        None
    }

    /// Insert or refresh a member. A device occupies at most one slot
    /// across all volumes.
    fn merge(
        &mut self,
        device: &str,
        disk: Rc<dyn Disk>,
        filter: &'static str,
        detected: DetectedMember,
    ) -> String {
        for volume in self.volumes.values_mut() {
            for slot in volume.members.iter_mut() {
                if slot.as_ref().map_or(false, |m| m.device == device) {
                    *slot = None;
                }
            }
        }

        let volume = self
            .volumes
            .entry(detected.uuid.clone())
            .or_insert_with(|| {
                let name = detected
                    .volume_name
                    .clone()
                    .unwrap_or_else(|| format!("mduuid/{}", uuid_hex(&detected.uuid)));
                Volume {
                    uuid: detected.uuid.clone(),
                    name,
                    filter,
                    level: detected.level,
                    layout: detected.layout,
                    chunk_size: detected.chunk_size,
                    members: Vec::new(),
                }
            });
        volume.level = detected.level;
        volume.layout = detected.layout;
        volume.chunk_size = detected.chunk_size;
        if volume.members.len() < detected.nmemb {
            volume.members.resize(detected.nmemb, None);
        }
        volume.members[detected.index] = Some(Member {
            device: device.to_string(),
            disk,
            start_sector: detected.start_sector,
            sectors: detected.member_sectors,
        });
        volume.name.clone()
    }

    pub fn volumes(&self) -> impl Iterator<Item = &Volume> {
        self.volumes.values()
    }

    /// Find a volume by its name or its `mduuid/` name.
    pub fn volume(&self, name: &str) -> Option<&Volume> {
        self.volumes
            .values()
            .find(|v| v.name == name || v.uuid_name() == name)
    }

    /// Whether `device` is a member of some volume.
    pub fn is_member(&self, device: &str) -> bool {
        self.volumes
            .values()
            .flat_map(|v| v.members.iter().flatten())
            .any(|m| m.device == device)
    }

    pub fn clear(&mut self) {
        self.volumes.clear();
    }
}

impl Default for DiskFilterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::mdraid09::test_images::write_sb09;
    use super::*;
    use crate::disk::MemDisk;

    fn member(name: &str, fill: u8, sectors: u64, role: u32, disks: u32, level: i32) -> Rc<dyn Disk> {
        let mut disk = MemDisk::zeroed(name, sectors);
        for s in 0..64 {
            disk.write(s, 0, &[fill.wrapping_add(s as u8); SECTOR_SIZE]).unwrap();
        }
        write_sb09(&mut disk, false, level, disks, role, 0);
        Rc::new(disk)
    }

    fn assembled(level: i32) -> (DiskFilterRegistry, String) {
        let mut registry = DiskFilterRegistry::with_defaults();
        let mut name = String::new();
        for (i, dev) in ["hd0", "hd1"].iter().enumerate() {
            let disk = member(dev, (i as u8) * 100, 256, i as u32, 2, level);
            name = registry.scan(dev, disk).unwrap();
        }
        (registry, name)
    }

    fn first_byte(disk: &dyn Disk, sector: u64) -> u8 {
        let mut b = [0u8; 1];
        disk.read(sector, 0, &mut b).unwrap();
        b[0]
    }

    #[test]
    fn test_detects_and_assembles_mirror() {
        let (registry, name) = assembled(1);
        assert_eq!(name, "md/0");
        let volume = registry.volume("md/0").unwrap();
        assert_eq!(volume.nmemb(), 2);
        assert_eq!(volume.present(), 2);
        let disk = VolumeDisk::new(volume.clone());
        assert_eq!(disk.total_sectors(), Some(128));
        assert_eq!(first_byte(&disk, 3), 3);
        assert!(registry.volume(&volume.uuid_name()).is_some());
    }

    #[test]
    fn test_repeated_detection_is_idempotent() {
        let mut registry = DiskFilterRegistry::with_defaults();
        let disk = member("hd0", 0, 256, 0, 2, 1);
        registry.scan("hd0", disk.clone());
        registry.scan("hd0", disk);
        let volume = registry.volume("md/0").unwrap();
        assert_eq!(volume.nmemb(), 2);
        assert_eq!(volume.present(), 1);
        assert_eq!(registry.volumes().count(), 1);
    }

    #[test]
    fn test_striped_reads_alternate_members() {
        let (registry, _) = assembled(0);
        let disk = VolumeDisk::new(registry.volume("md/0").unwrap().clone());
        assert_eq!(disk.total_sectors(), Some(256));
        // chunk of 8 sectors: 0..8 on hd0, 8..16 on hd1, 16..24 on hd0
        assert_eq!(first_byte(&disk, 0), 0);
        assert_eq!(first_byte(&disk, 9), 101);
        assert_eq!(first_byte(&disk, 17), 9);
    }

    #[test]
    fn test_linear_reads_concatenate() {
        let (registry, _) = assembled(LEVEL_LINEAR);
        let disk = VolumeDisk::new(registry.volume("md/0").unwrap().clone());
        assert_eq!(disk.total_sectors(), Some(256));
        assert_eq!(first_byte(&disk, 2), 2);
        assert_eq!(first_byte(&disk, 130), 102);
    }

    #[test]
    fn test_parity_levels_size_but_do_not_read() {
        let (registry, _) = assembled(5);
        let disk = VolumeDisk::new(registry.volume("md/0").unwrap().clone());
        assert_eq!(disk.total_sectors(), Some(128));
        let mut b = [0u8; 1];
        assert!(matches!(disk.read(0, 0, &mut b), Err(DiskError::Unsupported(_))));
    }

    #[test]
    fn test_incomplete_stripe_is_not_readable() {
        let mut registry = DiskFilterRegistry::with_defaults();
        registry.scan("hd0", member("hd0", 0, 256, 0, 2, 0));
        let volume = registry.volume("md/0").unwrap();
        assert!(!volume.is_readable());
        let disk = VolumeDisk::new(volume.clone());
        let mut b = [0u8; 1];
        assert!(disk.read(8, 0, &mut b).is_err());
    }

    #[test]
    fn test_bad_magic_is_rejected_by_every_filter() {
        let mut disk = MemDisk::zeroed("hd0", 256);
        write_sb09(&mut disk, false, 1, 2, 0, 0);
        let sb = mdraid09::superblock_sector(256);
        disk.write(sb, 0, &[0xfc, 0x4e, 0x2b, 0xa8]).unwrap();
        let disk: Rc<dyn Disk> = Rc::new(disk);
        let mut registry = DiskFilterRegistry::with_defaults();
        assert_eq!(registry.scan("hd0", disk.clone()), None);
        for filter in &registry.filters {
            assert_eq!(filter.detect(disk.as_ref()).unwrap(), None);
        }
    }

    #[test]
    fn test_moving_member_vacates_old_slot() {
        let mut registry = DiskFilterRegistry::with_defaults();
        registry.scan("hd0", member("hd0", 0, 256, 0, 2, 1));
        registry.scan("hd0", member("hd0", 0, 256, 1, 2, 1));
        let volume = registry.volume("md/0").unwrap();
        assert!(volume.members[0].is_none());
        assert_eq!(volume.members[1].as_ref().unwrap().device, "hd0");
        assert!(registry.is_member("hd0"));
    }
}
