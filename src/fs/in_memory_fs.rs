//! In-Memory File System Implementation
//!
//! A table of formatted devices, each holding a flat path map. Used by the
//! CLI configuration and by tests in place of real filesystem drivers.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;

use super::types::*;

#[derive(Debug, Clone)]
struct FsVolume {
    info: FsInfo,
    needs_autoload: bool,
    data: IndexMap<String, FsEntry>,
}

/// In-memory filesystems keyed by device name. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFs {
    volumes: Rc<RefCell<IndexMap<String, FsVolume>>>,
    probes: Rc<Cell<usize>>,
}

impl InMemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a fresh filesystem on `device`, replacing any previous one.
    pub fn format(&self, device: &str, fs_type: &str, uuid: Option<&str>, label: Option<&str>) {
        let mut data = IndexMap::new();
        data.insert("/".to_string(), FsEntry::Directory);
        self.volumes.borrow_mut().insert(
            device_key(device),
            FsVolume {
                info: FsInfo {
                    fs_type: fs_type.to_string(),
                    uuid: uuid.map(str::to_string),
                    label: label.map(str::to_string),
                },
                needs_autoload: false,
                data,
            },
        );
    }

    /// Only visible to probes that allow driver autoloading.
    pub fn set_needs_autoload(&self, device: &str, needs: bool) {
        if let Some(volume) = self.volumes.borrow_mut().get_mut(&device_key(device)) {
            volume.needs_autoload = needs;
        }
    }

    pub fn set_label(&self, device: &str, label: Option<&str>) {
        if let Some(volume) = self.volumes.borrow_mut().get_mut(&device_key(device)) {
            volume.info.label = label.map(str::to_string);
        }
    }

    pub fn set_uuid(&self, device: &str, uuid: Option<&str>) {
        if let Some(volume) = self.volumes.borrow_mut().get_mut(&device_key(device)) {
            volume.info.uuid = uuid.map(str::to_string);
        }
    }

    /// Wipe the filesystem from `device`.
    pub fn remove(&self, device: &str) {
        self.volumes.borrow_mut().shift_remove(&device_key(device));
    }

    pub fn write_file(&self, device: &str, path: &str, content: &[u8]) -> Result<(), FsError> {
        let key = device_key(device);
        let mut volumes = self.volumes.borrow_mut();
        let volume = volumes
            .get_mut(&key)
            .ok_or_else(|| FsError::UnknownFs { device: key.clone() })?;
        let normalized = normalize_path(path);
        ensure_parent_dirs(&mut volume.data, &normalized);
        volume.data.insert(
            normalized,
            FsEntry::File {
                content: content.to_vec(),
            },
        );
        Ok(())
    }

    pub fn mkdir(&self, device: &str, path: &str) -> Result<(), FsError> {
        let key = device_key(device);
        let mut volumes = self.volumes.borrow_mut();
        let volume = volumes
            .get_mut(&key)
            .ok_or_else(|| FsError::UnknownFs { device: key.clone() })?;
        let normalized = normalize_path(path);
        ensure_parent_dirs(&mut volume.data, &normalized);
        volume.data.entry(normalized).or_insert(FsEntry::Directory);
        Ok(())
    }

    pub fn read_file(&self, device: &str, path: &str) -> Result<Vec<u8>, FsError> {
        let key = device_key(device);
        let volumes = self.volumes.borrow();
        let volume = volumes
            .get(&key)
            .ok_or_else(|| FsError::UnknownFs { device: key.clone() })?;
        match volume.data.get(&normalize_path(path)) {
            Some(FsEntry::File { content }) => Ok(content.clone()),
            _ => Err(FsError::NotFound {
                device: key,
                path: path.to_string(),
            }),
        }
    }

    /// Number of `probe` calls so far.
    pub fn probe_count(&self) -> usize {
        self.probes.get()
    }

    pub fn devices(&self) -> Vec<String> {
        self.volumes.borrow().keys().cloned().collect()
    }

    fn visible(volume: &FsVolume, autoload: bool) -> bool {
        autoload || !volume.needs_autoload
    }
}

impl FsProbe for InMemoryFs {
    fn probe(&self, device: &str, autoload: bool) -> Option<FsInfo> {
        self.probes.set(self.probes.get() + 1);
        let volumes = self.volumes.borrow();
        let volume = volumes.get(&device_key(device))?;
        Self::visible(volume, autoload).then(|| volume.info.clone())
    }

    fn exists(&self, device: &str, path: &str, autoload: bool) -> bool {
        let volumes = self.volumes.borrow();
        volumes.get(&device_key(device)).map_or(false, |volume| {
            Self::visible(volume, autoload) && volume.data.contains_key(&normalize_path(path))
        })
    }

    fn read_dir(&self, device: &str, path: &str) -> Result<Vec<DirEntry>, FsError> {
        let key = device_key(device);
        let volumes = self.volumes.borrow();
        let volume = volumes
            .get(&key)
            .ok_or_else(|| FsError::UnknownFs { device: key.clone() })?;
        let normalized = normalize_path(path);
        match volume.data.get(&normalized) {
            Some(FsEntry::Directory) => {}
            Some(_) => {
                return Err(FsError::NotDirectory {
                    device: key,
                    path: path.to_string(),
                })
            }
            None => {
                return Err(FsError::NotFound {
                    device: key,
                    path: path.to_string(),
                })
            }
        }

        let prefix = if normalized == "/" {
            "/".to_string()
        } else {
            format!("{}/", normalized)
        };

        let mut entries: IndexMap<String, DirEntry> = IndexMap::new();
        for (p, fs_entry) in volume.data.iter() {
            if p == &normalized {
                continue;
            }
            if let Some(rest) = p.strip_prefix(&prefix) {
                let name = rest.split('/').next().unwrap_or("");
                if !name.is_empty() && !rest[name.len()..].contains('/') {
                    entries.entry(name.to_string()).or_insert_with(|| DirEntry {
                        name: name.to_string(),
                        is_directory: fs_entry.is_directory(),
                    });
                }
            }
        }

        let mut entries: Vec<DirEntry> = entries.into_values().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

/// Device names are stored without surrounding parentheses.
fn device_key(device: &str) -> String {
    device
        .strip_prefix('(')
        .and_then(|d| d.strip_suffix(')'))
        .unwrap_or(device)
        .to_string()
}

// ============================================================================
// Path utilities
// ============================================================================

pub(crate) fn normalize_path(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_string();
    }
    let parts = path.split('/').filter(|p| !p.is_empty() && *p != ".");
    let mut resolved: Vec<&str> = Vec::new();
    for part in parts {
        if part == ".." {
            resolved.pop();
        } else {
            resolved.push(part);
        }
    }
    if resolved.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", resolved.join("/"))
    }
}

fn dirname(path: &str) -> String {
    let normalized = normalize_path(path);
    match normalized.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(pos) => normalized[..pos].to_string(),
    }
}

fn ensure_parent_dirs(data: &mut IndexMap<String, FsEntry>, path: &str) {
    let dir = dirname(path);
    if dir == "/" {
        return;
    }
    if !data.contains_key(&dir) {
        ensure_parent_dirs(data, &dir);
        data.insert(dir, FsEntry::Directory);
    }
}
