//! Device Set Configuration
//!
//! TOML description of the disks, filesystems and initial variables a
//! [`BootShell`] starts with:
//!
//! ```toml
//! [[disk]]
//! name = "hd0"
//! image = "disk.img"
//!
//! [[disk]]
//! name = "hd1"
//! size_sectors = 2048
//!
//! [[filesystem]]
//! device = "hd0,msdos1"
//! uuid = "1234-abcd"
//! label = "boot"
//! files = { "/boot/vmlinuz" = "" }
//!
//! [env]
//! prefix = "/boot/grub"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use crate::boot_shell::{BootShell, BootShellOptions};
use crate::disk::{DiskError, MemDisk};
use crate::fs::{FsError, InMemoryFs};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read `{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("disk `{0}' needs exactly one of `image' or `size_sectors'")]
    DiskSource(String),

    #[error(transparent)]
    Disk(#[from] DiskError),

    #[error(transparent)]
    Fs(#[from] FsError),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiskConfig {
    pub name: String,
    #[serde(default)]
    pub image: Option<PathBuf>,
    #[serde(default)]
    pub size_sectors: Option<u64>,
}

fn default_fs_type() -> String {
    "ext2".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesystemConfig {
    pub device: String,
    #[serde(default = "default_fs_type")]
    pub fs_type: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    /// Path to content.
    #[serde(default)]
    pub files: IndexMap<String, String>,
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default)]
    pub needs_autoload: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default, rename = "disk")]
    pub disks: Vec<DiskConfig>,
    #[serde(default, rename = "filesystem")]
    pub filesystems: Vec<FilesystemConfig>,
    #[serde(default)]
    pub env: IndexMap<String, String>,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read `path`; relative image paths are taken from its directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&text)?;
        config.rebase_paths(path);
        Ok(config)
    }

    fn rebase_paths(&mut self, path: &Path) {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for disk in &mut self.disks {
            if let Some(image) = &mut disk.image {
                if image.is_relative() {
                    *image = base.join(&*image);
                }
            }
        }
    }

    /// Build a shell holding the configured devices.
    pub fn build(&self) -> Result<BootShell, ConfigError> {
        let fs = InMemoryFs::new();
        let mut shell = BootShell::new(BootShellOptions {
            env: Some(self.env.clone()),
            fs: Some(Rc::new(fs.clone())),
            ..Default::default()
        });

        for disk in &self.disks {
            let mem = match (&disk.image, disk.size_sectors) {
                (Some(image), None) => MemDisk::load(disk.name.as_str(), image)?,
                (None, Some(sectors)) => MemDisk::zeroed(disk.name.as_str(), sectors),
                _ => return Err(ConfigError::DiskSource(disk.name.clone())),
            };
            shell.register_disk(Rc::new(mem));
        }

        for volume in &self.filesystems {
            fs.format(&volume.device, &volume.fs_type, volume.uuid.as_deref(), volume.label.as_deref());
            for dir in &volume.directories {
                fs.mkdir(&volume.device, dir)?;
            }
            for (path, content) in &volume.files {
                fs.write_file(&volume.device, path, content.as_bytes())?;
            }
            fs.set_needs_autoload(&volume.device, volume.needs_autoload);
        }
        Ok(shell)
    }
}
