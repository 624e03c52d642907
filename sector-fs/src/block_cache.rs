//! # 扇区缓存层
//!
//! 磁盘读写一般慢于内存读写，因此把即将操作的扇区复制到内存缓冲区，
//! 对扇区的所有操作都经过缓冲区，同时尽量复用已缓存的扇区。
//!
//! 缓存池不设全局单例：每面磁盘配一个 [`CachedDisk`]，
//! 由文件系统与各打开文件通过 `Arc` 共享，彼此互不串扰。
//!
//! 脏扇区在换出、[`CachedDisk::sync_all`] 或释放时写回磁盘。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem;

use spin::Mutex;

use crate::BlockDevice;
use crate::SectorBuf;
use crate::SECTOR_SIZE;

/// 一面磁盘与其扇区缓存池
pub struct CachedDisk {
    device: Arc<dyn BlockDevice>,
    pool: Mutex<CachePool>,
}

struct CachePool {
    queue: Vec<(usize, Arc<Mutex<SectorCache>>)>,
}

/// 内存中的扇区缓存
pub struct SectorCache {
    /// 缓存的数据
    data: SectorBuf,
    /// 对应的扇区号
    sector: usize,
    /// 底层磁盘驱动的引用
    device: Arc<dyn BlockDevice>,
    /// 是否为脏扇区
    modified: bool,
}

impl CachedDisk {
    pub fn new(device: Arc<dyn BlockDevice>) -> Arc<Self> {
        Arc::new(Self {
            device,
            pool: Mutex::new(CachePool::new()),
        })
    }

    #[inline]
    pub fn get(&self, sector: usize) -> Arc<Mutex<SectorCache>> {
        self.pool.lock().get(sector, &self.device)
    }

    pub fn sync_all(&self) {
        self.pool
            .lock()
            .queue
            .iter()
            .for_each(|(_, cache)| cache.lock().sync());
    }
}

impl SectorCache {
    pub fn new(sector: usize, device: Arc<dyn BlockDevice>) -> Self {
        let mut data = [0; SECTOR_SIZE];
        device.read_sector(sector, &mut data);

        Self {
            data,
            sector,
            device,
            modified: false,
        }
    }

    pub fn sync(&mut self) {
        if self.modified {
            self.modified = false;
            self.device.write_sector(self.sector, &self.data);
        }
    }

    pub fn get<T: Sized>(&self, offset: usize) -> &T {
        let type_size = mem::size_of::<T>();
        assert!(type_size + offset <= SECTOR_SIZE);
        let addr = self.offset(offset).cast();
        unsafe { &*addr }
    }

    pub fn get_mut<T: Sized>(&mut self, offset: usize) -> &mut T {
        let type_size = mem::size_of::<T>();
        assert!(type_size + offset <= SECTOR_SIZE);
        self.modified = true;
        let addr = self.offset(offset).cast_mut().cast();
        unsafe { &mut *addr }
    }

    #[inline]
    pub fn map<T: Sized, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get(offset))
    }

    #[inline]
    pub fn map_mut<T: Sized, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        f(self.get_mut(offset))
    }
}

impl SectorCache {
    #[inline]
    fn offset(&self, count: usize) -> *const u8 {
        &self.data[count]
    }
}

impl Drop for SectorCache {
    fn drop(&mut self) {
        self.sync();
    }
}

impl CachePool {
    /// 扇区缓存个数的上限
    const CAPACITY: usize = 16;

    const fn new() -> Self {
        Self { queue: Vec::new() }
    }

    // 缓存调度策略：踢走闲置扇区
    fn get(&mut self, sector: usize, device: &Arc<dyn BlockDevice>) -> Arc<Mutex<SectorCache>> {
        // 尝试从缓冲区中取出扇区
        if let Some(cache) = self
            .queue
            .iter()
            .find_map(|(id, cache)| (sector == *id).then_some(cache))
        {
            return Arc::clone(cache);
        };

        // 触及上限，写回一个扇区
        if self.queue.len() == Self::CAPACITY {
            let index = self
                .queue
                .iter()
                .position(|(_, cache)| Arc::strong_count(cache) == 1) // 没有其它引用的才能写回
                .expect("run out of sector cache");
            self.queue.remove(index);
        }

        // 缓存新扇区
        let cache = Arc::new(Mutex::new(SectorCache::new(sector, device.clone())));
        self.queue.push((sector, cache.clone()));

        cache
    }
}
