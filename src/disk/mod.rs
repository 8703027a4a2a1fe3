//! Block devices and device-name resolution
//!
//! Physical disks are registered with a [`DeviceContext`], which layers
//! partition maps and diskfilter volumes on top of them and resolves
//! names such as `hd0,msdos1` or `md/0,gpt2`.

pub mod context;
pub mod mem;
pub mod types;

pub use context::{parse_device_name, DeviceContext, DeviceName};
pub use mem::{MemDisk, PartitionDisk};
pub use types::{is_floppy_name, read_sectors, Disk, DiskError, SECTOR_BITS, SECTOR_SIZE};

pub(crate) use types::{check_range, le_u16, le_u32, le_u64};
