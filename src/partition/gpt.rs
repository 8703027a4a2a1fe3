//! GUID partition tables.

use lazy_static::lazy_static;
use tracing::trace;

use crate::disk::{le_u16, le_u32, le_u64, read_sectors, Disk, DiskError, SECTOR_SIZE};
use crate::partition::msdos::{MBR_SIGNATURE, TYPE_GPT_PROTECTIVE};
use crate::partition::{Partition, PartitionHook, PartitionMap, PartitionType};

pub const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";
pub const BIOS_BOOT_GUID: &str = "21686148-6449-6e6f-744e-656564454649";

const HEADER_LBA: u64 = 1;
const MIN_ENTRY_SIZE: usize = 128;
const MAX_ENTRIES_BYTES: usize = 1024 * 1024;

lazy_static! {
    static ref CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            let mut c = i as u32;
            for _ in 0..8 {
                c = if c & 1 != 0 { 0xedb8_8320 ^ (c >> 1) } else { c >> 1 };
            }
            *slot = c;
        }
        table
    };
}

/// IEEE CRC-32 as used by GPT headers and entry arrays.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &b in data {
        crc = CRC32_TABLE[((crc ^ u32::from(b)) & 0xff) as usize] ^ (crc >> 8);
    }
    !crc
}

/// Mixed-endian GUID bytes as the usual lowercase string.
pub fn format_guid(b: &[u8]) -> String {
    format!(
        "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        le_u32(b, 0),
        le_u16(b, 4),
        le_u16(b, 6),
        b[8],
        b[9],
        b[10],
        b[11],
        b[12],
        b[13],
        b[14],
        b[15]
    )
}

struct Header {
    disk_guid: String,
    entries_lba: u64,
    entry_count: usize,
    entry_size: usize,
    entries_crc: u32,
}

pub struct GptPartitionMap;

impl GptPartitionMap {
    fn bad_table(disk: &dyn Disk, sector: u64, reason: &str) -> DiskError {
        DiskError::BadPartitionTable {
            device: disk.name().to_string(),
            sector,
            reason: reason.to_string(),
        }
    }

    fn read_header(disk: &dyn Disk) -> Result<Header, DiskError> {
        let mbr = read_sectors(disk, 0, 1)?;
        let protective = le_u16(&mbr, 510) == MBR_SIGNATURE
            && (0..4).any(|i| mbr[446 + i * 16 + 4] == TYPE_GPT_PROTECTIVE);
        if !protective {
            return Err(DiskError::NotRecognized(disk.name().to_string()));
        }

        let buf = read_sectors(disk, HEADER_LBA, 1)?;
        if &buf[0..8] != GPT_SIGNATURE {
            return Err(Self::bad_table(disk, HEADER_LBA, "no GPT signature"));
        }
        let header_size = le_u32(&buf, 12) as usize;
        if !(92..=SECTOR_SIZE).contains(&header_size) {
            return Err(Self::bad_table(disk, HEADER_LBA, "bad header size"));
        }
        let mut check = buf[..header_size].to_vec();
        check[16..20].fill(0);
        if crc32(&check) != le_u32(&buf, 16) {
            return Err(DiskError::ChecksumMismatch {
                device: disk.name().to_string(),
                sector: HEADER_LBA,
            });
        }

        let header = Header {
            disk_guid: format_guid(&buf[56..72]),
            entries_lba: le_u64(&buf, 72),
            entry_count: le_u32(&buf, 80) as usize,
            entry_size: le_u32(&buf, 84) as usize,
            entries_crc: le_u32(&buf, 88),
        };
        if header.entry_size < MIN_ENTRY_SIZE || header.entry_size % 8 != 0 {
            return Err(Self::bad_table(disk, HEADER_LBA, "bad entry size"));
        }
        if header.entry_count.saturating_mul(header.entry_size) > MAX_ENTRIES_BYTES {
            return Err(Self::bad_table(disk, HEADER_LBA, "too many entries"));
        }
        Ok(header)
    }

    fn read_entries(disk: &dyn Disk, header: &Header) -> Result<Vec<u8>, DiskError> {
        let mut entries = vec![0u8; header.entry_count * header.entry_size];
        disk.read(header.entries_lba, 0, &mut entries)?;
        if crc32(&entries) != header.entries_crc {
            return Err(DiskError::ChecksumMismatch {
                device: disk.name().to_string(),
                sector: header.entries_lba,
            });
        }
        Ok(entries)
    }
}

fn decode_label(raw: &[u8]) -> Option<String> {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    if units.is_empty() {
        return None;
    }
    Some(String::from_utf16_lossy(&units))
}

impl PartitionMap for GptPartitionMap {
    fn name(&self) -> &'static str {
        "gpt"
    }

    fn iterate(&self, disk: &dyn Disk, hook: &mut PartitionHook<'_>) -> Result<(), DiskError> {
        let header = Self::read_header(disk)?;
        let entries = Self::read_entries(disk, &header)?;

        for (index, raw) in entries.chunks_exact(header.entry_size).enumerate() {
            if raw[..16].iter().all(|&b| b == 0) {
                continue;
            }
            let first = le_u64(raw, 32);
            let last = le_u64(raw, 40);
            if last < first {
                return Err(Self::bad_table(
                    disk,
                    header.entries_lba,
                    &format!("entry {} ends before it starts", index + 1),
                ));
            }
            let p = Partition {
                start: first,
                len: last - first + 1,
                offset: header.entries_lba,
                index,
                number: index as u32,
                part_type: PartitionType::Gpt(format_guid(&raw[..16])),
                partmap: "gpt",
                uuid: Some(format_guid(&raw[16..32])),
                label: decode_label(&raw[56..128]),
            };
            trace!(device = disk.name(), partition = %p.name(), "gpt entry");
            if hook(&p).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn disk_uuid(&self, disk: &dyn Disk) -> Result<Option<String>, DiskError> {
        Ok(Some(Self::read_header(disk)?.disk_guid))
    }

    /// The BIOS boot partition, when present and large enough.
    fn embed(&self, disk: &dyn Disk, sectors: u64) -> Result<Vec<u64>, DiskError> {
        let mut boot = None;
        self.iterate(disk, &mut |p: &Partition| {
            if p.part_type == PartitionType::Gpt(BIOS_BOOT_GUID.to_string()) {
                boot = Some(p.clone());
                std::ops::ControlFlow::Break(())
            } else {
                std::ops::ControlFlow::Continue(())
            }
        })?;
        let boot = boot.ok_or_else(|| {
            DiskError::Unsupported(format!("`{}' has no BIOS boot partition", disk.name()))
        })?;
        if boot.len < sectors {
            return Err(DiskError::Unsupported(format!(
                "BIOS boot partition on `{}' is too small",
                disk.name()
            )));
        }
        Ok((boot.start..boot.start + sectors).collect())
    }
}
