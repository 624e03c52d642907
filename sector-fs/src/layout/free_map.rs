//! 空闲扇区位图：置位表示扇区在使用中。
//!
//! 位图自身持久化为一个普通文件，其文件头固定在0号扇区；
//! 文件内容是紧凑位串，字节 `i / 8` 的第 `i % 8` 位对应扇区 `i`。

use alloc::vec;
use alloc::vec::Vec;

use crate::OpenFile;

/// 一组64位
const GROUP_BITS: usize = 64;

/// 空闲扇区位图的内存副本
pub struct FreeMap {
    groups: Vec<u64>,
    num_sectors: usize,
}

impl FreeMap {
    pub fn new(num_sectors: usize) -> Self {
        assert_eq!(num_sectors % GROUP_BITS, 0);
        Self {
            groups: vec![0; num_sectors / GROUP_BITS],
            num_sectors,
        }
    }

    /// 位图所指示的扇区总数
    #[inline]
    pub fn capacity(&self) -> usize {
        self.num_sectors
    }

    pub fn mark(&mut self, sector: u32) {
        let (group, bit) = self.locate(sector);
        self.groups[group] |= 1 << bit;
    }

    pub fn clear(&mut self, sector: u32) {
        let (group, bit) = self.locate(sector);
        // 归还的扇区一定得是在用的
        assert_ne!(self.groups[group] & (1 << bit), 0);
        self.groups[group] &= !(1 << bit);
    }

    pub fn test(&self, sector: u32) -> bool {
        let (group, bit) = self.locate(sector);
        self.groups[group] & (1 << bit) != 0
    }

    /// 取编号最低的空闲扇区并立即置位；位图用尽则返回空。
    /// 最低编号优先使得分配结果可复现。
    pub fn find_and_set(&mut self) -> Option<u32> {
        let (group, bit) = self
            .groups
            .iter()
            .enumerate()
            .find_map(|(group, &bits)| {
                (bits != u64::MAX).then_some((group, bits.trailing_ones() as usize))
            })?;

        self.groups[group] |= 1 << bit;
        Some((group * GROUP_BITS + bit) as u32)
    }

    /// 仍空闲的扇区数
    pub fn count_clear(&self) -> usize {
        self.num_sectors
            - self
                .groups
                .iter()
                .map(|bits| bits.count_ones() as usize)
                .sum::<usize>()
    }

    /// 从位图文件读出整幅位图
    pub fn fetch_from(file: &OpenFile) -> Self {
        let num_bytes = file.len() as usize;
        let mut bytes = vec![0; num_bytes];
        assert_eq!(file.read_at(0, &mut bytes), num_bytes);

        let groups = bytes
            .chunks_exact(8)
            .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
            .collect();

        Self {
            groups,
            num_sectors: num_bytes * 8,
        }
    }

    /// 把整幅位图写回位图文件
    pub fn write_back(&self, file: &OpenFile) {
        let mut bytes = Vec::with_capacity(self.groups.len() * 8);
        for group in &self.groups {
            bytes.extend_from_slice(&group.to_le_bytes());
        }
        assert_eq!(file.write_at(0, &bytes), bytes.len());
    }
}

impl FreeMap {
    #[inline]
    fn locate(&self, sector: u32) -> (usize, usize) {
        let sector = sector as usize;
        assert!(sector < self.num_sectors);
        (sector / GROUP_BITS, sector % GROUP_BITS)
    }
}
