//! 就绪队列：L1 按预估突发升序，L2 按优先级降序。
//!
//! 两条队列的比较语义各自定死，独立成类型；
//! 键值并列的线程维持先来后到。

use alloc::collections::VecDeque;
use alloc::sync::Arc;

use crate::thread::Thread;

/// L1：最短预估突发优先
pub struct BurstQueue {
    queue: VecDeque<Arc<Thread>>,
}

impl BurstQueue {
    pub const fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// 插到第一个预估突发更长的线程之前
    pub fn insert(&mut self, thread: Arc<Thread>) {
        let burst = thread.burst_estimate();
        let at = self
            .queue
            .iter()
            .position(|queued| queued.burst_estimate() > burst)
            .unwrap_or(self.queue.len());
        self.queue.insert(at, thread);
    }

    pub fn pop_front(&mut self) -> Option<Arc<Thread>> {
        self.queue.pop_front()
    }

    /// 按身份摘除；不在队里则返回 false
    pub fn remove(&mut self, thread: &Arc<Thread>) -> bool {
        remove_by_identity(&mut self.queue, thread)
    }

    pub fn contains(&self, thread: &Arc<Thread>) -> bool {
        contains_by_identity(&self.queue, thread)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Thread>> {
        self.queue.iter()
    }
}

/// L2：最高优先级优先
pub struct PriorityQueue {
    queue: VecDeque<Arc<Thread>>,
}

impl PriorityQueue {
    pub const fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// 插到第一个优先级更低的线程之前
    pub fn insert(&mut self, thread: Arc<Thread>) {
        let priority = thread.priority();
        let at = self
            .queue
            .iter()
            .position(|queued| queued.priority() < priority)
            .unwrap_or(self.queue.len());
        self.queue.insert(at, thread);
    }

    pub fn pop_front(&mut self) -> Option<Arc<Thread>> {
        self.queue.pop_front()
    }

    /// 按身份摘除；不在队里则返回 false
    pub fn remove(&mut self, thread: &Arc<Thread>) -> bool {
        remove_by_identity(&mut self.queue, thread)
    }

    pub fn contains(&self, thread: &Arc<Thread>) -> bool {
        contains_by_identity(&self.queue, thread)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Thread>> {
        self.queue.iter()
    }
}

pub fn remove_by_identity(queue: &mut VecDeque<Arc<Thread>>, thread: &Arc<Thread>) -> bool {
    let target = Arc::as_ptr(thread);
    match queue.iter().position(|queued| Arc::as_ptr(queued) == target) {
        Some(at) => {
            queue.remove(at);
            true
        }
        None => false,
    }
}

pub fn contains_by_identity(queue: &VecDeque<Arc<Thread>>, thread: &Arc<Thread>) -> bool {
    let target = Arc::as_ptr(thread);
    queue.iter().any(|queued| Arc::as_ptr(queued) == target)
}
