
use std::fs::File;
use std::io::{Read, Write};
use std::io::{Seek, SeekFrom};
use std::sync::Mutex;

use sector_fs::BlockDevice;
use sector_fs::SECTOR_SIZE;

/// 宿主文件充当的模拟磁盘，顺着字节偏移摆放各扇区
pub struct BlockFile(pub Mutex<File>);

impl BlockDevice for BlockFile {
    fn read_sector(&self, sector: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((sector * SECTOR_SIZE) as u64))
            .expect("seeking error");
        assert_eq!(file.read(buf).unwrap(), SECTOR_SIZE, "not a complete sector!");
    }

    fn write_sector(&self, sector: usize, buf: &[u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((sector * SECTOR_SIZE) as u64))
            .expect("seeking error");
        assert_eq!(
            file.write(buf).unwrap(),
            SECTOR_SIZE,
            "not a complete sector!"
        );
    }
}
