#![no_std]

extern crate alloc;

/* sector-fs 的整体架构，自上而下 */

// 文件系统层：路径解析与 format/create/open/remove/list 的编排
mod fs;
pub use fs::{FileSystem, ListEntry, OPEN_TABLE_CAPACITY};

// 打开文件层：读写游标 + 缓存于内存的文件头
mod open_file;
pub use open_file::OpenFile;

// 磁盘数据结构层：空闲扇区位图、文件头、目录
mod layout;
pub use layout::{DirEntry, Directory, FileHeader, FreeMap};
pub use layout::{NAME_MAX_LEN, NUM_DIR_ENTRIES};

// 扇区缓存层：内存上的磁盘扇区缓存
mod block_cache;
pub use block_cache::CachedDisk;

// 磁盘设备接口层：读写原始磁盘的接口
mod block_dev;
pub use block_dev::BlockDevice;

mod error;
pub use error::{FsError, FsResult};

/// 扇区大小（字节），原始磁盘I/O的单位
pub const SECTOR_SIZE: usize = 128;
/// 磁盘扇区总数
pub const NUM_SECTORS: usize = 1024;

/// 空闲扇区位图文件的文件头固定所在的扇区
pub const FREE_MAP_SECTOR: u32 = 0;
/// 根目录文件的文件头固定所在的扇区
pub const ROOT_DIR_SECTOR: u32 = 1;

/// 位图文件大小：每个扇区一位
pub const FREE_MAP_FILE_SIZE: u32 = (NUM_SECTORS / 8) as u32;
/// 目录文件大小：定长目录项数组
pub const DIRECTORY_FILE_SIZE: u32 = (NUM_DIR_ENTRIES * DirEntry::SIZE) as u32;

type SectorBuf = [u8; SECTOR_SIZE];
