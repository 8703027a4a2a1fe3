//! Device Context
//!
//! Owns the registered disks, the partition-map and diskfilter registries,
//! the filesystem probe and the search cache. One context is built per
//! interpreter and handed down by `&mut`; nothing here is global.

use std::ops::ControlFlow;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::disk::mem::PartitionDisk;
use crate::disk::types::{Disk, DiskError};
use crate::diskfilter::{DiskFilterRegistry, VolumeDisk};
use crate::fs::FsProbe;
use crate::partition::PartmapRegistry;
use crate::search::SearchCache;

/// A parsed device name: `hd0,msdos1,bsd2` is disk `hd0` with two
/// partition components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceName {
    pub disk: String,
    pub partitions: Vec<String>,
}

/// Parse `(hd0,msdos1)` or `hd0,msdos1`.
pub fn parse_device_name(name: &str) -> Result<DeviceName, DiskError> {
    let bad = || DiskError::BadDeviceName(name.to_string());
    let inner = match name.strip_prefix('(') {
        Some(rest) => rest.strip_suffix(')').ok_or_else(bad)?,
        None => name,
    };
    let mut parts = inner.split(',');
    let disk = parts.next().unwrap_or("");
    if disk.is_empty() || disk.contains(['(', ')']) {
        return Err(bad());
    }
    let partitions: Vec<String> = parts.map(str::to_string).collect();
    if partitions.iter().any(|p| p.is_empty()) {
        return Err(bad());
    }
    Ok(DeviceName {
        disk: disk.to_string(),
        partitions,
    })
}

/// Split a partition component into its map name and 1-based number:
/// `msdos5` gives `(Some("msdos"), 5)`, `2` gives `(None, 2)`.
fn parse_component(component: &str) -> Option<(Option<&str>, u32)> {
    let digits = component.find(|c: char| c.is_ascii_digit())?;
    let (map, number) = component.split_at(digits);
    let number: u32 = number.parse().ok()?;
    if number == 0 {
        return None;
    }
    Some(((!map.is_empty()).then_some(map), number))
}

/// Split `(dev)/path` into device and path. Text without a leading device
/// yields `None` and the text unchanged.
pub fn split_device_path(text: &str) -> (Option<&str>, &str) {
    if let Some(rest) = text.strip_prefix('(') {
        if let Some(close) = rest.find(')') {
            return (Some(&rest[..close]), &rest[close + 1..]);
        }
    }
    (None, text)
}

pub type DeviceHook<'h> = dyn FnMut(&str, &Rc<dyn Disk>) -> ControlFlow<()> + 'h;

pub struct DeviceContext {
    disks: IndexMap<String, Rc<dyn Disk>>,
    partmaps: PartmapRegistry,
    filters: DiskFilterRegistry,
    fs: Rc<dyn FsProbe>,
    pub cache: SearchCache,
}

impl DeviceContext {
    pub fn new(fs: Rc<dyn FsProbe>) -> Self {
        Self::with_registries(fs, PartmapRegistry::with_defaults(), DiskFilterRegistry::with_defaults())
    }

    pub fn with_registries(
        fs: Rc<dyn FsProbe>,
        partmaps: PartmapRegistry,
        filters: DiskFilterRegistry,
    ) -> Self {
        Self {
            disks: IndexMap::new(),
            partmaps,
            filters,
            fs,
            cache: SearchCache::new(),
        }
    }

    pub fn fs(&self) -> &dyn FsProbe {
        self.fs.as_ref()
    }

    pub fn partmaps(&self) -> &PartmapRegistry {
        &self.partmaps
    }

    pub fn filters(&self) -> &DiskFilterRegistry {
        &self.filters
    }

    /// Add a physical disk and re-run diskfilter detection.
    pub fn register_disk(&mut self, disk: Rc<dyn Disk>) {
        debug!(device = disk.name(), "disk registered");
        self.disks.insert(disk.name().to_string(), disk);
        self.scan_diskfilters();
    }

    pub fn remove_disk(&mut self, name: &str) -> bool {
        let removed = self.disks.shift_remove(name).is_some();
        if removed {
            self.scan_diskfilters();
        }
        removed
    }

    /// Rebuild every composite volume from the physical disks and their
    /// partitions.
    pub fn scan_diskfilters(&mut self) {
        self.filters.clear();
        let mut candidates: Vec<(String, Rc<dyn Disk>)> = Vec::new();
        for disk in self.disks.values() {
            // The hook never stops the walk.
            let _ = self.walk(disk.clone(), &mut |name: &str, disk: &Rc<dyn Disk>| {
                candidates.push((name.to_string(), disk.clone()));
                ControlFlow::Continue(())
            });
        }
        for (name, disk) in candidates {
            self.filters.scan(&name, disk);
        }
    }

    fn volume_disk(&self, name: &str) -> Option<Rc<dyn Disk>> {
        let volume = self.filters.volume(name)?;
        Some(Rc::new(VolumeDisk::new(volume.clone())))
    }

    /// Resolve a device name to a readable disk.
    pub fn open(&self, name: &str) -> Result<Rc<dyn Disk>, DiskError> {
        let parsed = parse_device_name(name)?;
        let mut disk = match self.disks.get(&parsed.disk) {
            Some(disk) => disk.clone(),
            None => self
                .volume_disk(&parsed.disk)
                .ok_or_else(|| DiskError::UnknownDevice(parsed.disk.clone()))?,
        };
        for component in &parsed.partitions {
            let (map, number) = parse_component(component)
                .ok_or_else(|| DiskError::BadDeviceName(name.to_string()))?;
            let partition = self
                .partmaps
                .find(disk.as_ref(), map, number)?
                .ok_or_else(|| DiskError::NoSuchPartition(name.to_string()))?;
            disk = Rc::new(PartitionDisk::new(disk, partition));
        }
        Ok(disk)
    }

    /// Visit `disk` and, depth first, every partition below it. Broken
    /// tables are logged and skipped so one bad disk does not hide the rest.
    fn walk(&self, disk: Rc<dyn Disk>, hook: &mut DeviceHook<'_>) -> ControlFlow<()> {
        if hook(disk.name(), &disk).is_break() {
            return ControlFlow::Break(());
        }
        let partitions = match self.partmaps.partitions(disk.as_ref()) {
            Ok(partitions) => partitions,
            Err(err) => {
                warn!(device = disk.name(), error = %err, "skipping partitions");
                Vec::new()
            }
        };
        for partition in partitions {
            let child: Rc<dyn Disk> = Rc::new(PartitionDisk::new(disk.clone(), partition));
            if self.walk(child, hook).is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Call `hook` for every device: physical disks first, then composite
    /// volumes, each followed by its partitions. Returns `true` when the
    /// hook stopped the iteration.
    pub fn iterate_devices(&self, hook: &mut DeviceHook<'_>) -> bool {
        for disk in self.disks.values() {
            if self.walk(disk.clone(), hook).is_break() {
                return true;
            }
        }
        for volume in self.filters.volumes() {
            let disk: Rc<dyn Disk> = Rc::new(VolumeDisk::new(volume.clone()));
            if self.walk(disk, hook).is_break() {
                return true;
            }
        }
        false
    }

    /// Visit `name` and every partition below it.
    pub fn iterate_from(&self, name: &str, hook: &mut DeviceHook<'_>) -> Result<bool, DiskError> {
        let disk = self.open(name)?;
        Ok(self.walk(disk, hook).is_break())
    }

    pub fn device_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.iterate_devices(&mut |name: &str, _disk: &Rc<dyn Disk>| {
            names.push(name.to_string());
            ControlFlow::Continue(())
        });
        names
    }

    /// Identifier of the partition table on `name`.
    pub fn disk_uuid(&self, name: &str) -> Result<Option<String>, DiskError> {
        let disk = self.open(name)?;
        self.partmaps.disk_uuid(disk.as_ref())
    }
}
