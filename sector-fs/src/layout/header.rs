//! 文件头：恰好占据一个扇区的索引结构，
//! 把文件的逻辑字节偏移映射到数据扇区，并记录文件字节长度。
//!
//! 索引机制：
//! - 直接索引：头内 28 个扇区号
//! - 一级索引：一个索引扇区，连续存储 32 个数据扇区号
//! - 二级索引：一个索引扇区，32 个扇区号各指向一个一级索引扇区
//!
//! 文件大小在创建时一次定死，之后不再增长，
//! 所以索引在 [`FileHeader::allocate`] 里一次建满。

use alloc::vec::Vec;

use crate::block_cache::CachedDisk;
use crate::layout::FreeMap;
use crate::SECTOR_SIZE;

/// 索引扇区的编号容量
const INDIRECT_COUNT: usize = SECTOR_SIZE / 4;
/// 索引扇区
type IndirectSector = [u32; INDIRECT_COUNT];

/// 直接索引的编号数量
const DIRECT_COUNT: usize = 28;
/// 只用直接索引时的编号容量
const DIRECT_CAP: usize = DIRECT_COUNT;
/// 用上一级索引时的编号容量
const INDIRECT1_CAP: usize = DIRECT_CAP + INDIRECT_COUNT;
/// 用上二级索引时的编号容量，已超出整面磁盘
const INDIRECT2_CAP: usize = INDIRECT1_CAP + INDIRECT_COUNT * INDIRECT_COUNT;

/// 文件头的磁盘布局，32 个 u32 正好一个扇区
#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct FileHeader {
    /// 文件字节长度
    num_bytes: u32,
    /// 数据扇区个数
    num_sectors: u32,
    direct: [u32; DIRECT_COUNT],
    /// 指向一级索引扇区
    indirect1: u32,
    /// 指向二级索引扇区
    indirect2: u32,
}

impl FileHeader {
    /// 为 `num_bytes` 字节的文件预留数据扇区与辅助索引扇区，
    /// 返回文件头与数据共消耗的字节数。
    /// 空闲扇区不足时返回空，此时位图未被改动。
    pub fn allocate(
        &mut self,
        free_map: &mut FreeMap,
        disk: &CachedDisk,
        num_bytes: u32,
    ) -> Option<usize> {
        let data_sectors = (num_bytes as usize).div_ceil(SECTOR_SIZE);
        let aux_sectors = Self::count_aux_sector(data_sectors);
        if data_sectors > INDIRECT2_CAP
            || free_map.count_clear() < data_sectors + aux_sectors
        {
            return None;
        }

        self.num_bytes = num_bytes;
        self.num_sectors = data_sectors as u32;

        // 预检过位图余量，此后 find_and_set 不会失败
        for slot in self.direct.iter_mut().take(data_sectors) {
            *slot = free_map.find_and_set().unwrap();
        }

        if data_sectors > DIRECT_CAP {
            self.indirect1 = free_map.find_and_set().unwrap();
            let count = (data_sectors - DIRECT_CAP).min(INDIRECT_COUNT);
            disk.get(self.indirect1 as usize).lock().map_mut(
                0,
                |indirect1: &mut IndirectSector| {
                    indirect1.fill(0);
                    for slot in indirect1.iter_mut().take(count) {
                        *slot = free_map.find_and_set().unwrap();
                    }
                },
            );
        }

        if data_sectors > INDIRECT1_CAP {
            self.indirect2 = free_map.find_and_set().unwrap();
            let mut rest = data_sectors - INDIRECT1_CAP;
            disk.get(self.indirect2 as usize).lock().map_mut(
                0,
                |indirect2: &mut IndirectSector| {
                    indirect2.fill(0);
                    for slot2 in indirect2.iter_mut() {
                        if rest == 0 {
                            break;
                        }
                        *slot2 = free_map.find_and_set().unwrap();
                        let count = rest.min(INDIRECT_COUNT);
                        disk.get(*slot2 as usize).lock().map_mut(
                            0,
                            |indirect1: &mut IndirectSector| {
                                indirect1.fill(0);
                                for slot1 in indirect1.iter_mut().take(count) {
                                    *slot1 = free_map.find_and_set().unwrap();
                                }
                            },
                        );
                        rest -= count;
                    }
                },
            );
        }

        Some((1 + aux_sectors + data_sectors) * SECTOR_SIZE)
    }

    /// 归还文件持有的全部扇区。
    /// 文件头自身所在的扇区由调用者清除。
    pub fn deallocate(&self, free_map: &mut FreeMap, disk: &CachedDisk) {
        for sector in self.owned_sectors(disk) {
            free_map.clear(sector);
        }
    }

    /// 文件占用的全部扇区：数据扇区加辅助索引扇区，
    /// 不含文件头自身所在的扇区。
    pub fn owned_sectors(&self, disk: &CachedDisk) -> Vec<u32> {
        let data_sectors = self.num_sectors as usize;
        let mut out = Vec::with_capacity(data_sectors + Self::count_aux_sector(data_sectors));

        out.extend_from_slice(&self.direct[..data_sectors.min(DIRECT_CAP)]);

        if data_sectors > DIRECT_CAP {
            out.push(self.indirect1);
            let count = (data_sectors - DIRECT_CAP).min(INDIRECT_COUNT);
            disk.get(self.indirect1 as usize)
                .lock()
                .map(0, |indirect1: &IndirectSector| {
                    out.extend_from_slice(&indirect1[..count]);
                });
        }

        if data_sectors > INDIRECT1_CAP {
            out.push(self.indirect2);
            let mut rest = data_sectors - INDIRECT1_CAP;
            disk.get(self.indirect2 as usize)
                .lock()
                .map(0, |indirect2: &IndirectSector| {
                    for &sector1 in indirect2.iter() {
                        if rest == 0 {
                            break;
                        }
                        out.push(sector1);
                        let count = rest.min(INDIRECT_COUNT);
                        disk.get(sector1 as usize)
                            .lock()
                            .map(0, |indirect1: &IndirectSector| {
                                out.extend_from_slice(&indirect1[..count]);
                            });
                        rest -= count;
                    }
                });
        }

        out
    }

    /// 逻辑上文件头指向一系列数据扇区，
    /// 传入数据扇区的逻辑索引，返回其在磁盘上的扇区号
    pub fn data_sector(&self, index: usize, disk: &CachedDisk) -> u32 {
        assert!(index < self.num_sectors as usize);

        if index < DIRECT_CAP {
            self.direct[index]
        } else if index < INDIRECT1_CAP {
            disk.get(self.indirect1 as usize)
                .lock()
                .map(0, |indirect1: &IndirectSector| {
                    // 剔去直接索引的部分
                    indirect1[index - DIRECT_CAP]
                })
        } else {
            // 剔去直接与一级索引的部分
            let index = index - INDIRECT1_CAP;

            let indirect1 = disk.get(self.indirect2 as usize).lock().map(
                0,
                |indirect2: &IndirectSector| indirect2[index / INDIRECT_COUNT],
            );
            disk.get(indirect1 as usize)
                .lock()
                .map(0, |indirect1: &IndirectSector| {
                    indirect1[index % INDIRECT_COUNT]
                })
        }
    }

    /// 从指定扇区读出文件头
    pub fn fetch_from(disk: &CachedDisk, sector: u32) -> Self {
        disk.get(sector as usize)
            .lock()
            .map(0, |header: &FileHeader| header.clone())
    }

    /// 把文件头写到指定扇区
    pub fn write_back(&self, disk: &CachedDisk, sector: u32) {
        disk.get(sector as usize)
            .lock()
            .map_mut(0, |header: &mut FileHeader| *header = self.clone());
    }

    /// 文件字节长度
    #[inline]
    pub fn len(&self) -> u32 {
        self.num_bytes
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_bytes == 0
    }

    /// 数据扇区个数
    #[inline]
    pub fn num_data_sectors(&self) -> u32 {
        self.num_sectors
    }

    /// 容纳指定数据量需要的扇区总数，文件头自身在内
    pub fn count_total_sector(num_bytes: u32) -> usize {
        let data_sectors = (num_bytes as usize).div_ceil(SECTOR_SIZE);
        1 + data_sectors + Self::count_aux_sector(data_sectors)
    }

    /// 容纳指定数据量需要的辅助索引扇区数
    fn count_aux_sector(data_sectors: usize) -> usize {
        let mut aux = 0;
        if data_sectors > DIRECT_CAP {
            aux += 1;
        }
        if data_sectors > INDIRECT1_CAP {
            aux += 1 + (data_sectors - INDIRECT1_CAP).div_ceil(INDIRECT_COUNT);
        }
        aux
    }
}
