use std::mem;

use sector_fs::{DirEntry, FileHeader, SECTOR_SIZE};

#[test]
fn layout() {
    assert_eq!(SECTOR_SIZE, mem::size_of::<FileHeader>());
    assert_eq!(DirEntry::SIZE, mem::size_of::<DirEntry>());
}

// 文件头在内的扇区总数：数据扇区加上逐级启用的索引扇区
#[test]
fn total_sector_arithmetic() {
    let sector = SECTOR_SIZE as u32;

    assert_eq!(FileHeader::count_total_sector(0), 1);
    assert_eq!(FileHeader::count_total_sector(1), 2);
    assert_eq!(FileHeader::count_total_sector(sector), 2);
    // 28个数据扇区以内直接索引就够
    assert_eq!(FileHeader::count_total_sector(28 * sector), 29);
    // 第29个起要一个一级索引扇区
    assert_eq!(FileHeader::count_total_sector(29 * sector), 31);
    assert_eq!(FileHeader::count_total_sector(60 * sector), 62);
    // 第61个起再加二级索引扇区与其子索引扇区
    assert_eq!(FileHeader::count_total_sector(61 * sector), 65);
    assert_eq!(FileHeader::count_total_sector(100 * sector), 105);
}
