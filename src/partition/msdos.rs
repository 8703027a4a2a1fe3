//! MBR partition tables, including chained extended tables.

use std::ops::ControlFlow;

use tracing::{debug, trace};

use crate::disk::{le_u16, le_u32, read_sectors, Disk, DiskError};
use crate::partition::{Partition, PartitionHook, PartitionMap, PartitionType};

pub const MBR_SIGNATURE: u16 = 0xaa55;
pub const TYPE_EMPTY: u8 = 0x00;
pub const TYPE_GPT_PROTECTIVE: u8 = 0xee;

const ENTRY_TABLE: usize = 446;
const ENTRY_SIZE: usize = 16;
const DISK_SIGNATURE: usize = 440;

pub fn is_extended(kind: u8) -> bool {
    matches!(kind, 0x05 | 0x0f | 0x85)
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    flag: u8,
    kind: u8,
    start: u32,
    len: u32,
}

struct Table {
    signature: u16,
    disk_signature: u32,
    entries: [Entry; 4],
}

impl Table {
    fn read(disk: &dyn Disk, sector: u64) -> Result<Self, DiskError> {
        let buf = read_sectors(disk, sector, 1)?;
        let mut entries = [Entry {
            flag: 0,
            kind: 0,
            start: 0,
            len: 0,
        }; 4];
        for (i, entry) in entries.iter_mut().enumerate() {
            let at = ENTRY_TABLE + i * ENTRY_SIZE;
            *entry = Entry {
                flag: buf[at],
                kind: buf[at + 4],
                start: le_u32(&buf, at + 8),
                len: le_u32(&buf, at + 12),
            };
        }
        Ok(Self {
            signature: le_u16(&buf, 510),
            disk_signature: le_u32(&buf, DISK_SIGNATURE),
            entries,
        })
    }
}

pub struct MsdosPartitionMap;

impl MsdosPartitionMap {
    fn bad_table(disk: &dyn Disk, sector: u64, reason: &str) -> DiskError {
        DiskError::BadPartitionTable {
            device: disk.name().to_string(),
            sector,
            reason: reason.to_string(),
        }
    }

    /// Read the table at `offset`, applying the loop check first.
    fn visit(
        disk: &dyn Disk,
        offset: u64,
        walk: &mut Walk,
    ) -> Result<Table, DiskError> {
        let table = Table::read(disk, offset)?;

        // Remember the offset seen at every power-of-two step; a chain that
        // comes back to it is cyclic. Bounded by roughly three times the
        // cycle length.
        if walk.steps != 0 && walk.checkpoint == offset {
            return Err(DiskError::LoopDetected {
                device: disk.name().to_string(),
                sector: offset,
            });
        }
        walk.steps += 1;
        if walk.steps & (walk.steps - 1) == 0 {
            walk.checkpoint = offset;
        }

        if table.signature != MBR_SIGNATURE {
            if offset == 0 {
                return Err(DiskError::NotRecognized(disk.name().to_string()));
            }
            return Err(Self::bad_table(disk, offset, "no signature"));
        }
        if offset == 0
            && table
                .entries
                .iter()
                .any(|e| e.kind == TYPE_GPT_PROTECTIVE)
        {
            return Err(DiskError::NotRecognized(disk.name().to_string()));
        }
        if table.entries.iter().any(|e| e.flag & 0x7f != 0) {
            return Err(Self::bad_table(disk, offset, "bad boot flag"));
        }
        Ok(table)
    }
}

#[derive(Default)]
struct Walk {
    steps: u64,
    checkpoint: u64,
}

impl PartitionMap for MsdosPartitionMap {
    fn name(&self) -> &'static str {
        "msdos"
    }

    fn iterate(&self, disk: &dyn Disk, hook: &mut PartitionHook<'_>) -> Result<(), DiskError> {
        let mut walk = Walk::default();
        let mut offset = 0u64;
        let mut ext_offset = 0u64;
        let mut number: i64 = -1;
        let mut disk_signature = None;

        loop {
            let table = Self::visit(disk, offset, &mut walk)?;
            trace!(device = disk.name(), offset, "msdos table");
            let signature = *disk_signature.get_or_insert(table.disk_signature);

            for (index, entry) in table.entries.iter().enumerate() {
                if entry.kind != TYPE_EMPTY && !is_extended(entry.kind) {
                    number += 1;
                    let p = Partition {
                        start: offset + u64::from(entry.start),
                        len: u64::from(entry.len),
                        offset,
                        index,
                        number: number as u32,
                        part_type: PartitionType::Msdos(entry.kind),
                        partmap: "msdos",
                        uuid: Some(format!("{:08x}-{:02x}", signature, number + 1)),
                        label: None,
                    };
                    if hook(&p).is_break() {
                        return Ok(());
                    }
                } else if number < 3 {
                    // primary slots keep their numbers even when unused
                    number += 1;
                }
            }

            let Some(ext) = table.entries.iter().find(|e| is_extended(e.kind)) else {
                break;
            };
            offset = ext_offset + u64::from(ext.start);
            if ext_offset == 0 {
                ext_offset = offset;
            }
            debug!(device = disk.name(), offset, "following extended partition");
        }
        Ok(())
    }

    fn disk_uuid(&self, disk: &dyn Disk) -> Result<Option<String>, DiskError> {
        let table = Self::visit(disk, 0, &mut Walk::default())?;
        Ok(Some(format!("{:08x}", table.disk_signature)))
    }

    fn nests_in(&self, parent: &str) -> bool {
        parent != "msdos"
    }

    /// The gap between the MBR and the first partition.
    fn embed(&self, disk: &dyn Disk, sectors: u64) -> Result<Vec<u64>, DiskError> {
        let mut end = disk.total_sectors().unwrap_or(u64::MAX);
        let mut walk = Walk::default();
        let mut offset = 0u64;
        let mut ext_offset = 0u64;
        loop {
            let table = Self::visit(disk, offset, &mut walk)?;
            for entry in table.entries.iter().filter(|e| e.kind != TYPE_EMPTY) {
                let start = offset + u64::from(entry.start);
                if start > 0 && start < end {
                    end = start;
                }
            }
            let Some(ext) = table.entries.iter().find(|e| is_extended(e.kind)) else {
                break;
            };
            offset = ext_offset + u64::from(ext.start);
            if ext_offset == 0 {
                ext_offset = offset;
            }
            if offset > 0 && offset < end {
                end = offset;
            }
        }

        if end <= 1 || end - 1 < sectors {
            return Err(DiskError::Unsupported(format!(
                "embedding area on `{}' has {} sectors, {} needed",
                disk.name(),
                end.saturating_sub(1),
                sectors
            )));
        }
        Ok((1..=sectors).collect())
    }
}

/// Collect every partition; convenience for callers that do not stream.
pub fn partitions(disk: &dyn Disk) -> Result<Vec<Partition>, DiskError> {
    let mut found = Vec::new();
    MsdosPartitionMap.iterate(disk, &mut |p: &Partition| {
        found.push(p.clone());
        ControlFlow::Continue(())
    })?;
    Ok(found)
}
