//! Partition Maps
//!
//! A partition map decodes one on-disk table format into [`Partition`]
//! descriptors handed to a caller-supplied hook. Maps are kept in a
//! [`PartmapRegistry`] and tried in registration order: a map that does not
//! find its signature reports [`DiskError::NotRecognized`] and the next one is
//! tried; any other error ends the iteration.

pub mod gpt;
pub mod msdos;

use std::ops::ControlFlow;

use crate::disk::{Disk, DiskError};

/// Table-specific type tag of a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionType {
    /// MBR system id byte
    Msdos(u8),
    /// GPT partition type GUID, formatted
    Gpt(String),
}

/// One decoded table entry. Sectors are relative to the device the table
/// was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub start: u64,
    pub len: u64,
    /// Sector holding the table this entry came from.
    pub offset: u64,
    /// Slot within that table.
    pub index: usize,
    /// Running number across chained tables, zero based.
    pub number: u32,
    pub part_type: PartitionType,
    pub partmap: &'static str,
    pub uuid: Option<String>,
    pub label: Option<String>,
}

impl Partition {
    pub fn new(partmap: &'static str) -> Self {
        Self {
            start: 0,
            len: 0,
            offset: 0,
            index: 0,
            number: 0,
            part_type: PartitionType::Msdos(0),
            partmap,
            uuid: None,
            label: None,
        }
    }

    /// Name component used in device names, e.g. `msdos1`.
    pub fn name(&self) -> String {
        format!("{}{}", self.partmap, self.number + 1)
    }
}

pub type PartitionHook<'h> = dyn FnMut(&Partition) -> ControlFlow<()> + 'h;

pub trait PartitionMap {
    fn name(&self) -> &'static str;

    /// Call `hook` for every partition; `Break` stops early without error.
    fn iterate(&self, disk: &dyn Disk, hook: &mut PartitionHook<'_>) -> Result<(), DiskError>;

    /// Identifier of the table itself, when the format has one.
    fn disk_uuid(&self, _disk: &dyn Disk) -> Result<Option<String>, DiskError> {
        Ok(None)
    }

    /// Whether this map may be looked for inside a partition of `parent`.
    fn nests_in(&self, _parent: &str) -> bool {
        false
    }

    /// Sectors where boot code of `sectors` sectors may be embedded.
    fn embed(&self, _disk: &dyn Disk, _sectors: u64) -> Result<Vec<u64>, DiskError> {
        Err(DiskError::Unsupported(format!(
            "partition map `{}' does not support embedding",
            self.name()
        )))
    }
}

pub struct PartmapRegistry {
    maps: Vec<Box<dyn PartitionMap>>,
}

impl PartmapRegistry {
    pub fn new() -> Self {
        Self { maps: Vec::new() }
    }

    /// GPT first: a GPT disk carries a protective MBR that msdos rejects.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(gpt::GptPartitionMap));
        registry.register(Box::new(msdos::MsdosPartitionMap));
        registry
    }

    pub fn register(&mut self, map: Box<dyn PartitionMap>) {
        self.maps.push(map);
    }

    pub fn get(&self, name: &str) -> Option<&dyn PartitionMap> {
        self.maps.iter().find(|m| m.name() == name).map(|m| m.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.maps.iter().map(|m| m.name()).collect()
    }

    /// Candidate maps for `disk`: inside a partition only maps that accept
    /// nesting in the parent's map are tried.
    fn candidates<'r>(&'r self, disk: &dyn Disk) -> Vec<&'r dyn PartitionMap> {
        let parent = disk.partition().map(|p| p.partmap);
        self.maps
            .iter()
            .map(|m| m.as_ref())
            .filter(|m| parent.map_or(true, |p| m.nests_in(p)))
            .collect()
    }

    /// Iterate with the first map that recognises the disk. Returns the map
    /// name, or `None` when no map applies.
    pub fn iterate(
        &self,
        disk: &dyn Disk,
        hook: &mut PartitionHook<'_>,
    ) -> Result<Option<&'static str>, DiskError> {
        for map in self.candidates(disk) {
            match map.iterate(disk, hook) {
                Ok(()) => return Ok(Some(map.name())),
                Err(DiskError::NotRecognized(_)) => continue,
                // short reads on tiny devices just mean "not this map"
                Err(DiskError::OutOfRange { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    /// Collect every partition of `disk`.
    pub fn partitions(&self, disk: &dyn Disk) -> Result<Vec<Partition>, DiskError> {
        let mut found = Vec::new();
        self.iterate(disk, &mut |p: &Partition| {
            found.push(p.clone());
            ControlFlow::Continue(())
        })?;
        Ok(found)
    }

    /// Look up a partition by its 1-based number, optionally restricted to
    /// the map called `partmap`.
    pub fn find(
        &self,
        disk: &dyn Disk,
        partmap: Option<&str>,
        number: u32,
    ) -> Result<Option<Partition>, DiskError> {
        let mut found = None;
        let mut hook = |p: &Partition| {
            if p.number + 1 == number {
                found = Some(p.clone());
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        };
        match partmap {
            Some(name) => {
                let map = self
                    .get(name)
                    .ok_or_else(|| DiskError::BadDeviceName(name.to_string()))?;
                match map.iterate(disk, &mut hook) {
                    Ok(()) | Err(DiskError::NotRecognized(_)) => {}
                    Err(err) => return Err(err),
                }
            }
            None => {
                self.iterate(disk, &mut hook)?;
            }
        }
        Ok(found)
    }

    /// Table identifier from the first map that recognises the disk.
    pub fn disk_uuid(&self, disk: &dyn Disk) -> Result<Option<String>, DiskError> {
        for map in self.candidates(disk) {
            match map.disk_uuid(disk) {
                Ok(Some(uuid)) => return Ok(Some(uuid)),
                Ok(None) | Err(DiskError::NotRecognized(_)) | Err(DiskError::OutOfRange { .. }) => {
                    continue
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }
}

impl Default for PartmapRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
pub(crate) mod test_images {
    //! Builders for synthetic partition tables.

    use crate::disk::{MemDisk, SECTOR_SIZE};

    pub const MBR_SIGNATURE: [u8; 2] = [0x55, 0xaa];

    /// Write a four-entry table at `sector`: `(type, start, len)` per entry.
    pub fn write_mbr(disk: &mut MemDisk, sector: u64, entries: &[(u8, u32, u32)]) {
        let mut buf = [0u8; SECTOR_SIZE];
        for (i, (kind, start, len)) in entries.iter().enumerate() {
            let at = 446 + i * 16;
            buf[at + 4] = *kind;
            buf[at + 8..at + 12].copy_from_slice(&start.to_le_bytes());
            buf[at + 12..at + 16].copy_from_slice(&len.to_le_bytes());
        }
        buf[510..512].copy_from_slice(&MBR_SIGNATURE);
        disk.write(sector, 0, &buf).unwrap();
    }

    pub fn set_disk_signature(disk: &mut MemDisk, signature: u32) {
        disk.write(0, 440, &signature.to_le_bytes()).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_images::*;
    use super::*;
    use crate::disk::MemDisk;

    #[test]
    fn test_registry_falls_through_to_msdos() {
        let mut disk = MemDisk::zeroed("hd0", 64);
        write_mbr(&mut disk, 0, &[(0x83, 8, 16)]);
        let registry = PartmapRegistry::with_defaults();
        let mut names = Vec::new();
        let map = registry
            .iterate(&disk, &mut |p: &Partition| {
                names.push(p.name());
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(map, Some("msdos"));
        assert_eq!(names, vec!["msdos1"]);
    }

    #[test]
    fn test_blank_disk_has_no_map() {
        let disk = MemDisk::zeroed("hd0", 8);
        let registry = PartmapRegistry::with_defaults();
        assert!(registry.partitions(&disk).unwrap().is_empty());
    }

    #[test]
    fn test_find_by_number_and_map() {
        let mut disk = MemDisk::zeroed("hd0", 64);
        write_mbr(&mut disk, 0, &[(0x83, 8, 8), (0x83, 16, 8)]);
        let registry = PartmapRegistry::with_defaults();
        let p = registry.find(&disk, None, 2).unwrap().unwrap();
        assert_eq!(p.start, 16);
        assert!(registry.find(&disk, Some("gpt"), 1).unwrap().is_none());
        assert!(registry.find(&disk, Some("msdos"), 3).unwrap().is_none());
        assert!(registry.find(&disk, Some("bsd"), 1).is_err());
    }

    #[test]
    fn test_hook_break_stops_early() {
        let mut disk = MemDisk::zeroed("hd0", 64);
        write_mbr(&mut disk, 0, &[(0x83, 8, 8), (0x83, 16, 8), (0x83, 24, 8)]);
        let registry = PartmapRegistry::with_defaults();
        let mut seen = 0;
        registry
            .iterate(&disk, &mut |_p: &Partition| {
                seen += 1;
                ControlFlow::Break(())
            })
            .unwrap();
        assert_eq!(seen, 1);
    }
}
