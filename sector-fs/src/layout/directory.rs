//! 目录：字节内容为定长目录项数组的文件。
//!
//! 目录里没有 `.` 与 `..`；根目录文件的文件头固定在1号扇区。
//! 名字按字节精确比较，不做大小写折叠。

use alloc::vec;
use alloc::vec::Vec;
use core::{ptr, slice, str};

use crate::OpenFile;

/// 路径单段名字的最大长度
pub const NAME_MAX_LEN: usize = 9;
/// 每个目录的目录项数，格式化时定死
pub const NUM_DIR_ENTRIES: usize = 64;

/// 目录项：单段名字到文件头扇区的映射
#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct DirEntry {
    in_use: u8,
    is_dir: u8,
    // 最后一字节留给 \0
    name: [u8; NAME_MAX_LEN + 1],
    sector: u32,
}

impl DirEntry {
    /// 目录项恒为16字节
    pub const SIZE: usize = 16;

    fn new(name: &str, sector: u32, is_dir: bool) -> Self {
        debug_assert!(!name.is_empty() && name.len() <= NAME_MAX_LEN);
        let bytes = name.as_bytes();
        let mut buf = [0; NAME_MAX_LEN + 1];
        buf[..bytes.len()].copy_from_slice(bytes);

        Self {
            in_use: 1,
            is_dir: is_dir as u8,
            name: buf,
            sector,
        }
    }

    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&c| c == 0).unwrap();
        str::from_utf8(&self.name[..len]).unwrap()
    }

    #[inline]
    pub fn sector(&self) -> u32 {
        self.sector
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.is_dir != 0
    }

    #[inline]
    pub fn in_use(&self) -> bool {
        self.in_use != 0
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), Self::SIZE) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(ptr::from_mut(self).cast(), Self::SIZE) }
    }
}

/// 目录的内存副本；按操作自文件拉取，操作成功才写回
pub struct Directory {
    table: Vec<DirEntry>,
}

impl Directory {
    /// 全空的目录表
    pub fn new(capacity: usize) -> Self {
        Self {
            table: vec![DirEntry::default(); capacity],
        }
    }

    /// 把目录文件的字节读入内存并解析
    pub fn fetch_from(file: &OpenFile) -> Self {
        let num_bytes = file.len() as usize;
        let mut bytes = vec![0; num_bytes];
        assert_eq!(file.read_at(0, &mut bytes), num_bytes);

        let table = bytes
            .chunks_exact(DirEntry::SIZE)
            .map(|chunk| {
                let mut entry = DirEntry::default();
                entry.as_bytes_mut().copy_from_slice(chunk);
                entry
            })
            .collect();

        Self { table }
    }

    /// 把整张目录表写回目录文件
    pub fn write_back(&self, file: &OpenFile) {
        let mut bytes = Vec::with_capacity(self.table.len() * DirEntry::SIZE);
        for entry in &self.table {
            bytes.extend_from_slice(entry.as_bytes());
        }
        assert_eq!(file.write_at(0, &bytes), bytes.len());
    }

    /// 按名字查文件头扇区
    pub fn find(&self, name: &str) -> Option<u32> {
        self.entries()
            .find(|entry| entry.name() == name)
            .map(DirEntry::sector)
    }

    /// 同名项是否是子目录
    pub fn is_dir(&self, name: &str) -> bool {
        self.entries()
            .any(|entry| entry.name() == name && entry.is_dir())
    }

    /// 加入新项；空名、重名或没有空位都算失败
    pub fn add(&mut self, name: &str, sector: u32, is_dir: bool) -> bool {
        if name.is_empty() || self.find(name).is_some() {
            return false;
        }
        let Some(slot) = self.table.iter_mut().find(|entry| !entry.in_use()) else {
            return false;
        };

        *slot = DirEntry::new(name, sector, is_dir);
        true
    }

    /// 摘除同名项；不存在则返回 false
    pub fn remove(&mut self, name: &str) -> bool {
        match self
            .table
            .iter_mut()
            .find(|entry| entry.in_use() && entry.name() == name)
        {
            Some(entry) => {
                entry.in_use = 0;
                true
            }
            None => false,
        }
    }

    /// 存活的目录项
    pub fn entries(&self) -> impl Iterator<Item = &DirEntry> {
        self.table.iter().filter(|entry| entry.in_use())
    }
}
