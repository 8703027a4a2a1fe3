//! File System Types
//!
//! The probe interface the search layer and the wildcard translator use to
//! ask what filesystem a device carries and what files it holds.

use thiserror::Error;

/// File system errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("unknown filesystem on `{device}'")]
    UnknownFs { device: String },

    #[error("file `{path}' not found on `{device}'")]
    NotFound { device: String, path: String },

    #[error("`{path}' on `{device}' is not a directory")]
    NotDirectory { device: String, path: String },
}

/// What probing a device revealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsInfo {
    pub fs_type: String,
    pub uuid: Option<String>,
    pub label: Option<String>,
}

/// Directory entry with type information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_directory: bool,
}

/// File system entry types
#[derive(Debug, Clone)]
pub enum FsEntry {
    File { content: Vec<u8> },
    Directory,
}

impl FsEntry {
    pub fn is_directory(&self) -> bool {
        matches!(self, FsEntry::Directory)
    }
}

/// Filesystem driver collaborator.
///
/// `autoload` says whether the probe may load drivers on demand. Probing
/// without it is the cheap path: a device whose driver is not loaded yet
/// simply reports nothing.
pub trait FsProbe {
    fn probe(&self, device: &str, autoload: bool) -> Option<FsInfo>;

    fn exists(&self, device: &str, path: &str, autoload: bool) -> bool;

    fn read_dir(&self, device: &str, path: &str) -> Result<Vec<DirEntry>, FsError>;
}
