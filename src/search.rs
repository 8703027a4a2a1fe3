//! Device search
//!
//! Resolves a filesystem UUID, filesystem label, partition UUID, partition
//! label, disk UUID or the presence of a file to device names. The lookup
//! order is: the cached device for the key, then caller hints, then every
//! device. When a variable is requested the first match is bound to it and
//! the search stops; otherwise every match is listed.

use std::fmt;
use std::ops::ControlFlow;
use std::rc::Rc;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

use crate::disk::{Disk, DeviceContext};
use crate::interpreter::variables::VariableStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchKind {
    FsUuid,
    Label,
    PartUuid,
    PartLabel,
    DiskUuid,
    File,
}

impl SearchKind {
    /// UUIDs compare without regard to case.
    fn case_insensitive(self) -> bool {
        matches!(self, SearchKind::FsUuid | SearchKind::PartUuid | SearchKind::DiskUuid)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SearchKind::FsUuid => "fs_uuid",
            SearchKind::Label => "label",
            SearchKind::PartUuid => "part_uuid",
            SearchKind::PartLabel => "part_label",
            SearchKind::DiskUuid => "disk_uuid",
            SearchKind::File => "file",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchKey {
    pub kind: SearchKind,
    pub value: String,
}

impl SearchKey {
    pub fn new(kind: SearchKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    fn cache_key(&self) -> SearchKey {
        if self.kind.case_insensitive() {
            SearchKey::new(self.kind, self.value.to_ascii_lowercase())
        } else {
            self.clone()
        }
    }

    fn equals(&self, candidate: &str) -> bool {
        if self.kind.case_insensitive() {
            self.value.eq_ignore_ascii_case(candidate)
        } else {
            self.value == candidate
        }
    }
}

impl fmt::Display for SearchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("no such device: {key}")]
    NoSuchDevice { key: String },
}

/// Last device found for each key; one entry per key.
#[derive(Debug, Clone, Default)]
pub struct SearchCache {
    entries: IndexMap<SearchKey, String>,
}

impl SearchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SearchKey) -> Option<&str> {
        self.entries.get(&key.cache_key()).map(String::as_str)
    }

    pub fn insert(&mut self, key: &SearchKey, device: &str) {
        self.entries.insert(key.cache_key(), device.to_string());
    }

    pub fn evict(&mut self, key: &SearchKey) -> Option<String> {
        self.entries.shift_remove(&key.cache_key())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub key: SearchKey,
    /// Bind the first match here; `None` lists every match.
    pub var: Option<String>,
    pub no_floppy: bool,
    pub hints: Vec<String>,
}

impl SearchRequest {
    pub fn new(key: SearchKey) -> Self {
        Self {
            key,
            var: None,
            no_floppy: false,
            hints: Vec::new(),
        }
    }
}

/// Accumulated state of one resolve call.
struct Pass<'r> {
    request: &'r SearchRequest,
    autoload: bool,
    found: Vec<String>,
    /// Device to remember for the key, taken from the first fresh match.
    cache_write: Option<String>,
}

impl<'r> Pass<'r> {
    fn stop_at_first(&self) -> bool {
        self.request.var.is_some()
    }

    fn matches(&self, ctx: &DeviceContext, name: &str, disk: &dyn Disk) -> bool {
        let key = &self.request.key;
        match key.kind {
            SearchKind::FsUuid => ctx
                .fs()
                .probe(name, self.autoload)
                .and_then(|info| info.uuid)
                .map_or(false, |uuid| key.equals(&uuid)),
            SearchKind::Label => ctx
                .fs()
                .probe(name, self.autoload)
                .and_then(|info| info.label)
                .map_or(false, |label| key.equals(&label)),
            SearchKind::PartUuid => disk
                .partition()
                .and_then(|p| p.uuid.as_deref())
                .map_or(false, |uuid| key.equals(uuid)),
            SearchKind::PartLabel => disk
                .partition()
                .and_then(|p| p.label.as_deref())
                .map_or(false, |label| key.equals(label)),
            SearchKind::DiskUuid => {
                disk.partition().is_none()
                    && matches!(ctx.partmaps().disk_uuid(disk), Ok(Some(uuid)) if key.equals(&uuid))
            }
            SearchKind::File => ctx.fs().exists(name, &key.value, self.autoload),
        }
    }

    /// Check one device. Returns whether it matched.
    fn check(&mut self, ctx: &DeviceContext, name: &str, disk: &dyn Disk, from_cache: bool) -> bool {
        if self.request.no_floppy && disk.is_floppy() {
            return false;
        }
        if !self.matches(ctx, name, disk) {
            return false;
        }
        if !from_cache && self.found.is_empty() && self.cache_write.is_none() {
            self.cache_write = Some(name.to_string());
        }
        if !self.found.iter().any(|f| f == name) {
            self.found.push(name.to_string());
        }
        true
    }

    fn visit(&mut self, ctx: &DeviceContext, name: &str, disk: &Rc<dyn Disk>) -> ControlFlow<()> {
        if self.check(ctx, name, disk.as_ref(), false) && self.stop_at_first() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    fn done(&self) -> bool {
        self.stop_at_first() && !self.found.is_empty()
    }

    fn run(&mut self, ctx: &mut DeviceContext) {
        let request = self.request;
        let key = &request.key;

        if let Some(cached) = ctx.cache.get(key).map(str::to_string) {
            let hit = match ctx.open(&cached) {
                Ok(disk) => self.check(ctx, &cached, disk.as_ref(), true),
                Err(_) => false,
            };
            if hit {
                debug!(key = %key, device = %cached, "search cache hit");
                if self.done() {
                    return;
                }
            } else if self.found.is_empty() {
                debug!(key = %key, device = %cached, "evicting stale search cache entry");
                ctx.cache.evict(key);
            }
        }

        let ctx_ref: &DeviceContext = ctx;
        for hint in &request.hints {
            let hint = hint
                .strip_prefix('(')
                .and_then(|h| h.strip_suffix(')'))
                .unwrap_or(hint);
            if let Some(whole) = hint.strip_suffix(',') {
                let walked = ctx_ref.iterate_from(whole, &mut |name: &str, disk: &Rc<dyn Disk>| {
                    self.visit(ctx_ref, name, disk)
                });
                if let Err(err) = walked {
                    debug!(hint, error = %err, "search hint unusable");
                }
            } else if let Ok(disk) = ctx_ref.open(hint) {
                self.check(ctx_ref, hint, disk.as_ref(), false);
            }
            if self.done() {
                return;
            }
        }

        ctx_ref.iterate_devices(&mut |name: &str, disk: &Rc<dyn Disk>| self.visit(ctx_ref, name, disk));
    }
}

/// Resolve `request` against the devices of `ctx`. Returns every device
/// found, or the first one when a variable is bound.
pub fn resolve(
    ctx: &mut DeviceContext,
    request: &SearchRequest,
    vars: &mut dyn VariableStore,
) -> Result<Vec<String>, SearchError> {
    // With a variable, try the cheap path first: drivers that are not
    // loaded yet are only loaded when nothing was found without them.
    let autoload_passes: &[bool] = if request.var.is_some() {
        &[false, true]
    } else {
        &[true]
    };

    let mut found = Vec::new();
    for &autoload in autoload_passes {
        let mut pass = Pass {
            request,
            autoload,
            found: Vec::new(),
            cache_write: None,
        };
        pass.run(ctx);
        if let Some(device) = pass.cache_write.take() {
            ctx.cache.insert(&request.key, &device);
        }
        found = pass.found;
        if !found.is_empty() {
            break;
        }
    }

    if found.is_empty() {
        return Err(SearchError::NoSuchDevice {
            key: request.key.value.clone(),
        });
    }
    if let Some(var) = &request.var {
        vars.set(var, &found[0]);
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::MemDisk;
    use crate::fs::InMemoryFs;
    use crate::interpreter::variables::Environment;
    use crate::partition::test_images::{set_disk_signature, write_mbr};

    struct Fixture {
        fs: InMemoryFs,
        ctx: DeviceContext,
        vars: Environment,
    }

    fn fixture() -> Fixture {
        let fs = InMemoryFs::new();
        let mut ctx = DeviceContext::new(Rc::new(fs.clone()));
        for (name, signature) in [("hd0", 0x1111_1111u32), ("hd1", 0x2222_2222)] {
            let mut disk = MemDisk::zeroed(name, 256);
            set_disk_signature(&mut disk, signature);
            write_mbr(&mut disk, 0, &[(0x83, 8, 100), (0x83, 120, 100)]);
            ctx.register_disk(Rc::new(disk));
        }
        ctx.register_disk(Rc::new(MemDisk::zeroed("fd0", 16)));
        fs.format("hd0,msdos1", "ext2", Some("AAAA-0001"), Some("boot"));
        fs.format("hd1,msdos2", "ext2", Some("bbbb-0002"), Some("data"));
        fs.format("fd0", "fat", Some("cccc-0003"), Some("floppy"));
        fs.write_file("hd1,msdos2", "/boot/grub/grub.cfg", b"").unwrap();
        Fixture {
            fs,
            ctx,
            vars: Environment::new(),
        }
    }

    fn request(kind: SearchKind, value: &str, var: Option<&str>) -> SearchRequest {
        SearchRequest {
            var: var.map(str::to_string),
            ..SearchRequest::new(SearchKey::new(kind, value))
        }
    }

    #[yare::parameterized(
        fs_uuid    = { SearchKind::FsUuid, "aaaa-0001", "hd0,msdos1" },
        label      = { SearchKind::Label, "data", "hd1,msdos2" },
        part_uuid  = { SearchKind::PartUuid, "22222222-02", "hd1,msdos2" },
        disk_uuid  = { SearchKind::DiskUuid, "22222222", "hd1" },
        file       = { SearchKind::File, "/boot/grub/grub.cfg", "hd1,msdos2" },
    )]
    fn test_resolves_each_key_kind(kind: SearchKind, value: &str, device: &str) {
        let mut f = fixture();
        let found = resolve(&mut f.ctx, &request(kind, value, Some("root")), &mut f.vars).unwrap();
        assert_eq!(found, vec![device]);
        assert_eq!(f.vars.get("root").as_deref(), Some(device));
    }

    #[test]
    fn test_no_match_leaves_variable_unset() {
        let mut f = fixture();
        let mut empty = DeviceContext::new(Rc::new(InMemoryFs::new()));
        let err = resolve(
            &mut empty,
            &request(SearchKind::FsUuid, "nonexistent-uuid", Some("foo")),
            &mut f.vars,
        )
        .unwrap_err();
        assert_eq!(
            err,
            SearchError::NoSuchDevice {
                key: "nonexistent-uuid".to_string()
            }
        );
        assert_eq!(err.to_string(), "no such device: nonexistent-uuid");
        assert_eq!(f.vars.get("foo"), None);
    }

    #[test]
    fn test_list_mode_returns_every_match() {
        let mut f = fixture();
        f.fs.set_label("hd0,msdos1", Some("data"));
        let found = resolve(&mut f.ctx, &request(SearchKind::Label, "data", None), &mut f.vars).unwrap();
        assert_eq!(found, vec!["hd0,msdos1", "hd1,msdos2"]);
        assert_eq!(f.ctx.cache.get(&SearchKey::new(SearchKind::Label, "data")), Some("hd0,msdos1"));
    }

    #[test]
    fn test_cached_device_is_checked_first() {
        let mut f = fixture();
        let key = SearchKey::new(SearchKind::Label, "data");
        resolve(&mut f.ctx, &request(SearchKind::Label, "data", None), &mut f.vars).unwrap();
        assert_eq!(f.ctx.cache.get(&key), Some("hd1,msdos2"));

        let before = f.fs.probe_count();
        let found = resolve(&mut f.ctx, &request(SearchKind::Label, "data", Some("root")), &mut f.vars).unwrap();
        assert_eq!(found, vec!["hd1,msdos2"]);
        assert_eq!(f.fs.probe_count() - before, 1);
    }

    #[test]
    fn test_stale_cache_entry_is_evicted() {
        let mut f = fixture();
        let key = SearchKey::new(SearchKind::Label, "data");
        resolve(&mut f.ctx, &request(SearchKind::Label, "data", Some("root")), &mut f.vars).unwrap();
        assert_eq!(f.ctx.cache.get(&key), Some("hd1,msdos2"));

        f.fs.set_label("hd1,msdos2", None);
        f.fs.format("hd0,msdos2", "ext2", None, Some("data"));
        let found = resolve(&mut f.ctx, &request(SearchKind::Label, "data", Some("root")), &mut f.vars).unwrap();
        assert_eq!(found, vec!["hd0,msdos2"]);
        assert_eq!(f.ctx.cache.get(&key), Some("hd0,msdos2"));
    }

    #[test]
    fn test_cache_entry_dropped_when_nothing_matches() {
        let mut f = fixture();
        let key = SearchKey::new(SearchKind::Label, "boot");
        resolve(&mut f.ctx, &request(SearchKind::Label, "boot", Some("root")), &mut f.vars).unwrap();
        f.fs.set_label("hd0,msdos1", None);
        assert!(resolve(&mut f.ctx, &request(SearchKind::Label, "boot", Some("root")), &mut f.vars).is_err());
        assert_eq!(f.ctx.cache.get(&key), None);
    }

    #[test]
    fn test_hints_are_tried_before_full_scan() {
        let mut f = fixture();
        f.fs.set_label("hd0,msdos1", Some("data"));
        let mut req = request(SearchKind::Label, "data", Some("root"));
        req.hints = vec!["(hd1,msdos2)".to_string()];
        let found = resolve(&mut f.ctx, &req, &mut f.vars).unwrap();
        assert_eq!(found, vec!["hd1,msdos2"]);

        f.ctx.cache.clear();
        req.hints = vec!["hd1,".to_string()];
        let before = f.fs.probe_count();
        resolve(&mut f.ctx, &req, &mut f.vars).unwrap();
        // hd1 itself, then hd1,msdos1, then hd1,msdos2
        assert_eq!(f.fs.probe_count() - before, 3);
        assert_eq!(f.vars.get("root").as_deref(), Some("hd1,msdos2"));
    }

    #[test]
    fn test_no_floppy_skips_floppies() {
        let mut f = fixture();
        let mut req = request(SearchKind::Label, "floppy", Some("root"));
        assert!(resolve(&mut f.ctx, &req, &mut f.vars).is_ok());
        f.ctx.cache.clear();
        req.no_floppy = true;
        assert!(resolve(&mut f.ctx, &req, &mut f.vars).is_err());
    }

    #[test]
    fn test_autoload_pass_runs_only_when_needed() {
        let mut f = fixture();
        f.fs.set_needs_autoload("hd1,msdos2", true);
        let found = resolve(&mut f.ctx, &request(SearchKind::Label, "data", Some("root")), &mut f.vars).unwrap();
        assert_eq!(found, vec!["hd1,msdos2"]);

        let before = f.fs.probe_count();
        resolve(&mut f.ctx, &request(SearchKind::Label, "boot", Some("root")), &mut f.vars).unwrap();
        // found on the no-autoload pass: hd0, then hd0,msdos1
        assert_eq!(f.fs.probe_count() - before, 2);
    }
}
