//! # 打开文件层
//!
//! [`OpenFile`] 是覆盖在已分配文件上的内存游标：
//! 文件头缓存在内存里，顺序读写自带字节偏移。
//! 文件大小创建时定死，写越过末尾的部分直接截掉。

use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::block_cache::CachedDisk;
use crate::layout::FileHeader;
use crate::SectorBuf;
use crate::SECTOR_SIZE;

pub struct OpenFile {
    /// 内存中的文件头副本
    header: FileHeader,
    /// 文件头所在扇区
    header_sector: u32,
    disk: Arc<CachedDisk>,
    /// 顺序读写的游标（字节偏移）
    pos: Mutex<usize>,
}

impl core::fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OpenFile")
            .field("header", &self.header)
            .field("header_sector", &self.header_sector)
            .finish()
    }
}

impl OpenFile {
    /// 读入指定扇区的文件头，建立句柄
    pub fn new(disk: Arc<CachedDisk>, header_sector: u32) -> Self {
        let header = FileHeader::fetch_from(&disk, header_sector);
        Self {
            header,
            header_sector,
            disk,
            pos: Mutex::new(0),
        }
    }

    /// 从指定字节偏移读出数据填充 `buf`，返回实际读到的字节数
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let mut start = offset;
        let end = (offset + buf.len()).min(self.header.len() as usize);

        if start >= end {
            return 0;
        }

        let mut read_size = 0;
        loop {
            // 当前扇区的逻辑索引，见 `FileHeader::data_sector`
            let sector_index = start / SECTOR_SIZE;
            // 当前扇区内可读范围的末地址（字节）
            let current_end = ((sector_index + 1) * SECTOR_SIZE).min(end);
            let chunk = current_end - start;
            let dest = &mut buf[read_size..read_size + chunk];

            let sector = self.header.data_sector(sector_index, &self.disk);
            self.disk
                .get(sector as usize)
                .lock()
                .map(0, |data: &SectorBuf| {
                    // 绝对偏移 % 扇区大小 = 扇区内偏移
                    let at = start % SECTOR_SIZE;
                    dest.copy_from_slice(&data[at..at + chunk]);
                });

            read_size += chunk;

            if current_end == end {
                break;
            }
            start = current_end;
        }

        read_size
    }

    /// 从指定字节偏移写入 `buf`，越过文件末尾的部分截掉，
    /// 返回实际写入的字节数
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> usize {
        let mut start = offset;
        let end = (offset + buf.len()).min(self.header.len() as usize);

        if start >= end {
            return 0;
        }

        let mut written_size = 0;
        loop {
            let sector_index = start / SECTOR_SIZE;
            let current_end = ((sector_index + 1) * SECTOR_SIZE).min(end);
            let chunk = current_end - start;

            let sector = self.header.data_sector(sector_index, &self.disk);
            self.disk
                .get(sector as usize)
                .lock()
                .map_mut(0, |data: &mut SectorBuf| {
                    let at = start % SECTOR_SIZE;
                    data[at..at + chunk].copy_from_slice(&buf[written_size..written_size + chunk]);
                });

            written_size += chunk;

            if current_end == end {
                break;
            }
            start = current_end;
        }

        self.disk.sync_all();
        written_size
    }

    /// 从游标处顺序读，游标随之推进
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let mut pos = self.pos.lock();
        let read_size = self.read_at(*pos, buf);
        *pos += read_size;
        read_size
    }

    /// 从游标处顺序写，游标随之推进
    pub fn write(&self, buf: &[u8]) -> usize {
        let mut pos = self.pos.lock();
        let written_size = self.write_at(*pos, buf);
        *pos += written_size;
        written_size
    }

    /// 移动游标到指定字节偏移
    pub fn seek(&self, offset: usize) {
        *self.pos.lock() = offset;
    }

    /// 文件字节长度
    #[inline]
    pub fn len(&self) -> u32 {
        self.header.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.header.is_empty()
    }

    /// 文件头所在扇区
    #[inline]
    pub fn sector(&self) -> u32 {
        self.header_sector
    }

    #[inline]
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// 文件占用的全部扇区，不含文件头自身所在的扇区
    pub fn owned_sectors(&self) -> Vec<u32> {
        self.header.owned_sectors(&self.disk)
    }
}
