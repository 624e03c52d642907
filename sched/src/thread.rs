//! 线程的调度视角元数据

use alloc::string::String;

use spin::Mutex;

/// 线程优先级的上限
pub const PRIORITY_MAX: u32 = 149;

/// 优先级带，决定线程归属的就绪队列及其调度纪律
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// [100, 149]：按预估突发排序，最短者优先，可抢占
    L1,
    /// [50, 99]：按优先级排序，最高者优先
    L2,
    /// [0, 49]：先来先服务
    L3,
}

impl Band {
    pub fn of(priority: u32) -> Self {
        match priority {
            100..=149 => Band::L1,
            50..=99 => Band::L2,
            _ => Band::L3,
        }
    }

    /// 日志里的队列编号
    pub fn number(self) -> usize {
        match self {
            Band::L1 => 1,
            Band::L2 => 2,
            Band::L3 => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    JustCreated,
    Running,
    Ready,
    Blocked,
}

pub struct Thread {
    id: usize,
    name: String,
    /// 是否携带用户地址空间，决定上下台时要不要保存恢复用户态
    user_space: bool,
    inner: Mutex<ThreadInner>,
}

struct ThreadInner {
    status: ThreadStatus,
    priority: u32,
    /// 下一次CPU突发的指数平均预测值
    burst_estimate: f64,
    /// 上次上台时的用户态时刻
    start_time: usize,
    /// 开始等待（入列就绪）的时刻
    start_wait_time: usize,
}

impl Thread {
    pub fn new(id: usize, name: impl Into<String>, priority: u32) -> Self {
        assert!(priority <= PRIORITY_MAX);
        Self {
            id,
            name: name.into(),
            user_space: false,
            inner: Mutex::new(ThreadInner {
                status: ThreadStatus::JustCreated,
                priority,
                burst_estimate: 0.0,
                start_time: 0,
                start_wait_time: 0,
            }),
        }
    }

    /// 携带用户地址空间的线程
    pub fn new_user(id: usize, name: impl Into<String>, priority: u32) -> Self {
        let mut thread = Self::new(id, name, priority);
        thread.user_space = true;
        thread
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn has_user_space(&self) -> bool {
        self.user_space
    }

    pub fn status(&self) -> ThreadStatus {
        self.inner.lock().status
    }

    pub fn set_status(&self, status: ThreadStatus) {
        self.inner.lock().status = status;
    }

    pub fn priority(&self) -> u32 {
        self.inner.lock().priority
    }

    /// 优先级只升不降
    pub fn set_priority(&self, priority: u32) {
        assert!(priority <= PRIORITY_MAX);
        let mut inner = self.inner.lock();
        assert!(priority >= inner.priority);
        inner.priority = priority;
    }

    /// 所处的优先级带
    pub fn band(&self) -> Band {
        Band::of(self.priority())
    }

    pub fn burst_estimate(&self) -> f64 {
        self.inner.lock().burst_estimate
    }

    pub fn set_burst_estimate(&self, burst: f64) {
        self.inner.lock().burst_estimate = burst;
    }

    pub fn start_time(&self) -> usize {
        self.inner.lock().start_time
    }

    pub fn set_start_time(&self, tick: usize) {
        self.inner.lock().start_time = tick;
    }

    pub fn start_wait_time(&self) -> usize {
        self.inner.lock().start_wait_time
    }

    pub fn set_start_wait_time(&self, tick: usize) {
        self.inner.lock().start_wait_time = tick;
    }
}
