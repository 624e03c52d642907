//! # 文件系统层
//!
//! 路径解析与 format/create/open/remove/list 的编排。
//!
//! 位图与根目录自身就是两个普通文件，文件头固定在0、1号扇区，
//! 启动时按固定扇区打开，整个文件系统存续期间保持打开。
//!
//! 修改目录或位图的操作（create、remove）先把两者拉入内存副本，
//! 全部检查通过后才依次写回磁盘；失败时直接丢弃副本，
//! 磁盘上不留半成品。这里假定没有并发访问。

use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Write;

use log::debug;

use crate::block_cache::CachedDisk;
use crate::error::{FsError, FsResult};
use crate::layout::{Directory, FileHeader, FreeMap};
use crate::layout::{NAME_MAX_LEN, NUM_DIR_ENTRIES};
use crate::{BlockDevice, OpenFile};
use crate::{DIRECTORY_FILE_SIZE, FREE_MAP_FILE_SIZE, FREE_MAP_SECTOR, NUM_SECTORS, ROOT_DIR_SECTOR};

/// 打开文件表的槽位上限
pub const OPEN_TABLE_CAPACITY: usize = 487;

pub struct FileSystem {
    disk: Arc<CachedDisk>,
    /// 常开：空闲扇区位图文件
    free_map_file: Arc<OpenFile>,
    /// 常开：根目录文件
    root_dir_file: Arc<OpenFile>,
    /// 打开文件表；关闭后的槽位可复用
    open_table: Vec<Option<Arc<OpenFile>>>,
}

/// 列目录产出的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    /// 文件头所在扇区
    pub sector: u32,
    pub is_dir: bool,
    /// 嵌套深度，被列目录的直接子项为0
    pub depth: usize,
}

/// 路径解析的游标。
/// 根目录句柄全程共享、绝不关闭；中间目录句柄随游标一起释放。
enum DirCursor {
    Root(Arc<OpenFile>),
    Nested(OpenFile),
}

impl DirCursor {
    fn file(&self) -> &OpenFile {
        match self {
            DirCursor::Root(file) => file,
            DirCursor::Nested(file) => file,
        }
    }
}

impl FileSystem {
    /// 格式化任意内容的磁盘：
    /// 建立空位图并占住0、1号扇区，为位图文件与根目录文件
    /// 分配文件头，写回两个文件头后打开两个文件，
    /// 最后通过句柄写入空目录表与最新位图。
    pub fn format(device: Arc<dyn BlockDevice>) -> Self {
        debug!("formatting the file system");
        let disk = CachedDisk::new(device);

        let mut free_map = FreeMap::new(NUM_SECTORS);
        free_map.mark(FREE_MAP_SECTOR);
        free_map.mark(ROOT_DIR_SECTOR);

        // 两份元文件的空间必须分配得出来
        let mut map_header = FileHeader::default();
        let mut dir_header = FileHeader::default();
        map_header
            .allocate(&mut free_map, &disk, FREE_MAP_FILE_SIZE)
            .expect("no space for the free map file");
        dir_header
            .allocate(&mut free_map, &disk, DIRECTORY_FILE_SIZE)
            .expect("no space for the root directory file");

        // 先落盘文件头，之后才能按扇区打开这两个文件
        map_header.write_back(&disk, FREE_MAP_SECTOR);
        dir_header.write_back(&disk, ROOT_DIR_SECTOR);

        let free_map_file = Arc::new(OpenFile::new(disk.clone(), FREE_MAP_SECTOR));
        let root_dir_file = Arc::new(OpenFile::new(disk.clone(), ROOT_DIR_SECTOR));

        Directory::new(NUM_DIR_ENTRIES).write_back(&root_dir_file);
        free_map.write_back(&free_map_file);
        disk.sync_all();

        Self {
            disk,
            free_map_file,
            root_dir_file,
            open_table: Vec::new(),
        }
    }

    /// 挂载已格式化的磁盘：只需打开两份常开文件
    pub fn mount(device: Arc<dyn BlockDevice>) -> Self {
        let disk = CachedDisk::new(device);
        let free_map_file = Arc::new(OpenFile::new(disk.clone(), FREE_MAP_SECTOR));
        let root_dir_file = Arc::new(OpenFile::new(disk.clone(), ROOT_DIR_SECTOR));

        Self {
            disk,
            free_map_file,
            root_dir_file,
            open_table: Vec::new(),
        }
    }

    /// 建立定长的新文件或子目录；子目录的文件大小固定。
    ///
    /// 任何一步失败，内存副本直接作废，磁盘不发生改动。
    pub fn create(&mut self, path: &str, initial_size: u32, is_dir: bool) -> FsResult<()> {
        let initial_size = if is_dir { DIRECTORY_FILE_SIZE } else { initial_size };

        let (parent, name) = self.resolve_parent(path)?;
        if name.len() > NAME_MAX_LEN {
            return Err(FsError::PathInvalid);
        }
        debug!("creating {path:?} size {initial_size}");

        let parent_file = parent.file();
        let mut directory = Directory::fetch_from(parent_file);
        if directory.find(name).is_some() {
            return Err(FsError::AlreadyExists);
        }

        let mut free_map = FreeMap::fetch_from(&self.free_map_file);
        // 文件头所在的扇区
        let sector = free_map.find_and_set().ok_or(FsError::NoFreeSector)?;
        if !directory.add(name, sector, is_dir) {
            return Err(FsError::DirectoryFull);
        }

        let mut header = FileHeader::default();
        let total = header
            .allocate(&mut free_map, &self.disk, initial_size)
            .ok_or(FsError::NoFreeSector)?;
        debug!("allocated {total} bytes of headers and data for {name:?}");

        // 全部就绪，依次写回：文件头、父目录、位图
        header.write_back(&self.disk, sector);
        directory.write_back(parent_file);
        free_map.write_back(&self.free_map_file);

        if is_dir {
            // 新目录的内容扇区即刻清成空表，否则首次打开会读到未初始化字节
            let new_dir_file = OpenFile::new(self.disk.clone(), sector);
            Directory::new(NUM_DIR_ENTRIES).write_back(&new_dir_file);
        }

        self.disk.sync_all();
        Ok(())
    }

    /// 打开文件，句柄登记进打开文件表
    pub fn open(&mut self, path: &str) -> FsResult<Arc<OpenFile>> {
        let (parent, name) = self.resolve_parent(path)?;
        debug!("opening {path:?}");

        let directory = Directory::fetch_from(parent.file());
        let sector = directory.find(name).ok_or(FsError::NoSuchEntry)?;

        let slot = self.alloc_slot().ok_or(FsError::OpenTableFull)?;
        let file = Arc::new(OpenFile::new(self.disk.clone(), sector));
        self.open_table[slot] = Some(file.clone());

        Ok(file)
    }

    /// 释放句柄占据的表槽；句柄不在表中则返回 false
    pub fn close(&mut self, file: &Arc<OpenFile>) -> bool {
        match self
            .open_table
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|open| Arc::ptr_eq(open, file)))
        {
            Some(slot) => {
                slot.take();
                true
            }
            None => false,
        }
    }

    /// 删除文件或目录。
    /// 目录要么为空，要么 `recursive` 置位逐项删净。
    pub fn remove(&mut self, path: &str, recursive: bool) -> FsResult<()> {
        let (parent, name) = self.resolve_parent(path)?;
        debug!("removing {path:?}");

        let parent_file = parent.file();
        let mut directory = Directory::fetch_from(parent_file);
        let sector = directory.find(name).ok_or(FsError::NoSuchEntry)?;

        if directory.is_dir(name) {
            let target_dir = Directory::fetch_from(&OpenFile::new(self.disk.clone(), sector));
            if recursive {
                // 拼出每个子项的完整路径，从根重新解析后删除
                let base = path.trim_end_matches('/');
                let children: Vec<String> = target_dir
                    .entries()
                    .map(|entry| format!("{base}/{}", entry.name()))
                    .collect();
                for child in &children {
                    self.remove(child, true)?;
                }
            } else if target_dir.entries().next().is_some() {
                return Err(FsError::DirectoryNotEmpty);
            }
        }

        let header = FileHeader::fetch_from(&self.disk, sector);
        let mut free_map = FreeMap::fetch_from(&self.free_map_file);
        header.deallocate(&mut free_map, &self.disk); // 归还数据与索引扇区
        free_map.clear(sector); // 归还文件头扇区
        directory.remove(name);

        free_map.write_back(&self.free_map_file);
        directory.write_back(parent_file);
        self.disk.sync_all();

        Ok(())
    }

    /// 列出目录内容；`recursive` 时深入子目录，深度逐层递增
    pub fn list(&self, path: &str, recursive: bool) -> FsResult<Vec<ListEntry>> {
        let mut out = Vec::new();

        if path == "/" {
            let directory = Directory::fetch_from(&self.root_dir_file);
            self.walk(&directory, recursive, 0, &mut out);
            return Ok(out);
        }

        let (parent, name) = self.resolve_parent(path)?;
        let directory = Directory::fetch_from(parent.file());
        let sector = directory.find(name).ok_or(FsError::NoSuchEntry)?;
        if !directory.is_dir(name) {
            return Err(FsError::PathNotFound);
        }

        let target = Directory::fetch_from(&OpenFile::new(self.disk.clone(), sector));
        self.walk(&target, recursive, 0, &mut out);
        Ok(out)
    }

    /// 位图的即时副本，诊断与测试用
    pub fn free_map(&self) -> FreeMap {
        FreeMap::fetch_from(&self.free_map_file)
    }

    /// 当前在用的全部扇区：
    /// 两份元文件与目录树上每个文件的头、数据、索引扇区
    pub fn live_sectors(&self) -> Vec<u32> {
        let mut out = vec![FREE_MAP_SECTOR, ROOT_DIR_SECTOR];
        out.extend(self.free_map_file.owned_sectors());
        out.extend(self.root_dir_file.owned_sectors());
        self.collect_tree(&Directory::fetch_from(&self.root_dir_file), &mut out);
        out
    }

    /// 整个文件系统的概况：位图、两份元文件头、根目录表
    pub fn dump(&self) -> String {
        let mut out = String::new();

        let map_header = FileHeader::fetch_from(&self.disk, FREE_MAP_SECTOR);
        let dir_header = FileHeader::fetch_from(&self.disk, ROOT_DIR_SECTOR);
        writeln!(
            out,
            "free map file: {} bytes in {} sectors",
            map_header.len(),
            map_header.num_data_sectors()
        )
        .unwrap();
        writeln!(
            out,
            "root directory file: {} bytes in {} sectors",
            dir_header.len(),
            dir_header.num_data_sectors()
        )
        .unwrap();

        let free_map = FreeMap::fetch_from(&self.free_map_file);
        let used: Vec<u32> = (0..free_map.capacity() as u32)
            .filter(|&sector| free_map.test(sector))
            .collect();
        writeln!(out, "used sectors ({}): {used:?}", used.len()).unwrap();

        writeln!(out, "root directory:").unwrap();
        for entry in self.list("/", true).unwrap() {
            let header = FileHeader::fetch_from(&self.disk, entry.sector);
            writeln!(
                out,
                "{:indent$}{}{} (sector {}, {} bytes)",
                "",
                entry.name,
                if entry.is_dir { "/" } else { "" },
                entry.sector,
                header.len(),
                indent = entry.depth * 2,
            )
            .unwrap();
        }

        out
    }
}

impl FileSystem {
    /// 解析到应当包含末段的目录，返回（目录游标, 末段名字）。
    /// 中间段缺失或不是目录都算 `PathNotFound`。
    fn resolve_parent<'p>(&self, path: &'p str) -> FsResult<(DirCursor, &'p str)> {
        let mut segments = path.split('/').filter(|segment| !segment.is_empty());
        let mut current = segments.next().ok_or(FsError::PathInvalid)?;
        let mut cursor = DirCursor::Root(self.root_dir_file.clone());

        for next in segments {
            let directory = Directory::fetch_from(cursor.file());
            let sector = directory
                .find(current)
                .filter(|_| directory.is_dir(current))
                .ok_or(FsError::PathNotFound)?;

            cursor = DirCursor::Nested(OpenFile::new(self.disk.clone(), sector));
            current = next;
        }

        Ok((cursor, current))
    }

    // 打开文件表满了之后，留空的槽位先复用
    fn alloc_slot(&mut self) -> Option<usize> {
        if let Some(slot) = self.open_table.iter().position(Option::is_none) {
            return Some(slot);
        }
        if self.open_table.len() < OPEN_TABLE_CAPACITY {
            self.open_table.push(None);
            return Some(self.open_table.len() - 1);
        }
        None
    }

    fn walk(&self, directory: &Directory, recursive: bool, depth: usize, out: &mut Vec<ListEntry>) {
        for entry in directory.entries() {
            out.push(ListEntry {
                name: entry.name().into(),
                sector: entry.sector(),
                is_dir: entry.is_dir(),
                depth,
            });

            if recursive && entry.is_dir() {
                let sub =
                    Directory::fetch_from(&OpenFile::new(self.disk.clone(), entry.sector()));
                self.walk(&sub, recursive, depth + 1, out);
            }
        }
    }

    fn collect_tree(&self, directory: &Directory, out: &mut Vec<u32>) {
        for entry in directory.entries() {
            out.push(entry.sector());
            let file = OpenFile::new(self.disk.clone(), entry.sector());
            out.extend(file.owned_sectors());

            if entry.is_dir() {
                self.collect_tree(&Directory::fetch_from(&file), out);
            }
        }
    }
}
