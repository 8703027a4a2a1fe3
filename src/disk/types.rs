//! Disk Types
//!
//! The [`Disk`] trait every block device implements, plus the error type the
//! whole device-resolution layer reports.

use thiserror::Error;

use crate::partition::Partition;

pub const SECTOR_SIZE: usize = 512;
pub const SECTOR_BITS: u32 = 9;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiskError {
    #[error("attempt to read or write outside of disk `{device}'")]
    OutOfRange { device: String },

    #[error("disk `{0}' not found")]
    UnknownDevice(String),

    #[error("no partition table or filter recognises `{0}'")]
    NotRecognized(String),

    #[error("invalid partition table on `{device}' at sector {sector}: {reason}")]
    BadPartitionTable {
        device: String,
        sector: u64,
        reason: String,
    },

    #[error("loop detected in partition table of `{device}' at sector {sector}")]
    LoopDetected { device: String, sector: u64 },

    #[error("checksum mismatch on `{device}' at sector {sector}")]
    ChecksumMismatch { device: String, sector: u64 },

    #[error("invalid device name `{0}'")]
    BadDeviceName(String),

    #[error("no such partition `{0}'")]
    NoSuchPartition(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("read error on `{device}': {reason}")]
    Io { device: String, reason: String },
}

/// A readable block device: a physical disk, a partition of one, or a
/// composite volume assembled by a diskfilter.
pub trait Disk {
    fn name(&self) -> &str;

    /// Size in sectors, `None` when the device cannot tell.
    fn total_sectors(&self) -> Option<u64>;

    /// Fill `buf` starting `offset` bytes into `sector`. Reads may cross
    /// sector boundaries.
    fn read(&self, sector: u64, offset: usize, buf: &mut [u8]) -> Result<(), DiskError>;

    /// The partition this device is, when it is one.
    fn partition(&self) -> Option<&Partition> {
        None
    }

    fn is_floppy(&self) -> bool {
        is_floppy_name(self.name())
    }
}

/// `fd` followed by a digit.
pub fn is_floppy_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() > 2 && bytes[0] == b'f' && bytes[1] == b'd' && bytes[2].is_ascii_digit()
}

/// Read whole sectors into a fresh buffer.
pub fn read_sectors(disk: &dyn Disk, sector: u64, count: usize) -> Result<Vec<u8>, DiskError> {
    let mut buf = vec![0u8; count * SECTOR_SIZE];
    disk.read(sector, 0, &mut buf)?;
    Ok(buf)
}

/// Bounds check shared by every implementation.
pub(crate) fn check_range(
    disk: &dyn Disk,
    sector: u64,
    offset: usize,
    len: usize,
) -> Result<(), DiskError> {
    let Some(total) = disk.total_sectors() else {
        return Ok(());
    };
    let end = sector
        .checked_mul(SECTOR_SIZE as u64)
        .and_then(|b| b.checked_add(offset as u64))
        .and_then(|b| b.checked_add(len as u64));
    match end {
        Some(end) if end <= total * SECTOR_SIZE as u64 => Ok(()),
        _ => Err(DiskError::OutOfRange {
            device: disk.name().to_string(),
        }),
    }
}

pub(crate) fn le_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

pub(crate) fn le_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

pub(crate) fn le_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        fd0   = { "fd0", true },
        fd12  = { "fd12", true },
        fd    = { "fd", false },
        fdx   = { "fdx", false },
        hd0   = { "hd0", false },
    )]
    fn test_floppy_names(name: &str, floppy: bool) {
        assert_eq!(is_floppy_name(name), floppy);
    }

    #[test]
    fn test_little_endian_readers() {
        let buf = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(le_u16(&buf, 0), 0x0201);
        assert_eq!(le_u32(&buf, 0), 0x04030201);
        assert_eq!(le_u64(&buf, 0), 0x0807060504030201);
    }
}
