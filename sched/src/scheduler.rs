//! 挑选下一个上台的线程，并完成调度。
//!
//! 这里的入口全都假定中断已经屏蔽：单处理器上这就是互斥。
//! 调度器内部不允许用锁，等锁可能再次进入调度器，无限递归。
//!
//! 就绪线程按优先级分成三条队列：
//! L1 预估突发最短者优先且可抢占，L2 优先级最高者优先，L3 先来先服务。
//! 等待过久的就绪线程由周期性的老化检查提升优先级，防止饿死。

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::sync::Arc;
use core::fmt::Write;
use core::sync::atomic::{AtomicUsize, Ordering};

use log::info;

use crate::queue::{contains_by_identity, remove_by_identity, BurstQueue, PriorityQueue};
use crate::thread::{Band, Thread, ThreadStatus, PRIORITY_MAX};

/// 就绪线程等待满此 tick 数便获得优先级提升
pub const AGING_INTERVAL: usize = 1500;
/// 每次老化提升的优先级
pub const AGING_BOOST: u32 = 10;

/// 时钟统计，由内核在时钟中断里推进
#[derive(Debug, Default)]
pub struct Stats {
    total_ticks: AtomicUsize,
    user_ticks: AtomicUsize,
}

impl Stats {
    pub const fn new() -> Self {
        Self {
            total_ticks: AtomicUsize::new(0),
            user_ticks: AtomicUsize::new(0),
        }
    }

    /// 开机以来的全部 tick 数
    #[inline]
    pub fn total_ticks(&self) -> usize {
        self.total_ticks.load(Ordering::Relaxed)
    }

    /// 其中花在用户态的 tick 数
    #[inline]
    pub fn user_ticks(&self) -> usize {
        self.user_ticks.load(Ordering::Relaxed)
    }

    /// 推进时钟；用户态时间同时计入用户 tick
    pub fn advance(&self, ticks: usize, user: bool) {
        self.total_ticks.fetch_add(ticks, Ordering::Relaxed);
        if user {
            self.user_ticks.fetch_add(ticks, Ordering::Relaxed);
        }
    }
}

/// 机器相关的协作件：中断查询、上下文切换原语、用户态保存恢复
pub trait Machine {
    /// 中断当前是否屏蔽
    fn interrupts_off(&self) -> bool;

    /// 切换上下文；返回时已经再次运行在 `old` 的栈上
    fn switch(&mut self, old: &Arc<Thread>, new: &Arc<Thread>);

    fn save_user_state(&mut self, thread: &Arc<Thread>) {
        let _ = thread;
    }

    fn restore_user_state(&mut self, thread: &Arc<Thread>) {
        let _ = thread;
    }
}

pub struct Scheduler {
    /// L1：按预估突发升序
    l1_queue: BurstQueue,
    /// L2：按优先级降序
    l2_queue: PriorityQueue,
    /// L3：先来先服务
    ready_list: VecDeque<Arc<Thread>>,
    current: Option<Arc<Thread>>,
    /// 下台后待回收的线程，至多一个
    to_be_destroyed: Option<Arc<Thread>>,
    stats: Arc<Stats>,
    machine: Box<dyn Machine>,
}

impl Scheduler {
    pub fn new(stats: Arc<Stats>, machine: Box<dyn Machine>) -> Self {
        Self {
            l1_queue: BurstQueue::new(),
            l2_queue: PriorityQueue::new(),
            ready_list: VecDeque::new(),
            current: None,
            to_be_destroyed: None,
            stats,
            machine,
        }
    }

    /// 安放初始线程：不经过就绪队列，直接上台
    pub fn start(&mut self, initial: Arc<Thread>) {
        assert!(self.current.is_none());
        initial.set_status(ThreadStatus::Running);
        initial.set_start_time(self.stats.user_ticks());
        self.current = Some(initial);
    }

    #[inline]
    pub fn current(&self) -> Option<&Arc<Thread>> {
        self.current.as_ref()
    }

    #[inline]
    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// 线程入列就绪，按优先级带挑选队列。
    /// 新线程落在 L1 且预估突发严格短于当前线程的剩余突发时，
    /// 当前线程让位。
    pub fn ready_to_run(&mut self, thread: Arc<Thread>) {
        assert!(self.machine.interrupts_off());

        thread.set_status(ThreadStatus::Ready);
        let now = self.stats.total_ticks();
        let band = thread.band();

        info!(
            "Tick {now}: Thread {} is inserted into queue L{}",
            thread.id(),
            band.number()
        );
        match band {
            Band::L1 => self.l1_queue.insert(thread.clone()),
            Band::L2 => self.l2_queue.insert(thread.clone()),
            Band::L3 => self.ready_list.push_back(thread.clone()),
        }

        // 线程自此开始等待
        thread.set_start_wait_time(now);

        if band == Band::L1 {
            self.preempt_if_shorter(&thread);
        }
    }

    /// 取最高非空带的队首；线程随之离开就绪队列
    pub fn find_next_to_run(&mut self) -> Option<Arc<Thread>> {
        assert!(self.machine.interrupts_off());
        let now = self.stats.total_ticks();

        let (thread, band) = if let Some(thread) = self.l1_queue.pop_front() {
            (thread, Band::L1)
        } else if let Some(thread) = self.l2_queue.pop_front() {
            (thread, Band::L2)
        } else if let Some(thread) = self.ready_list.pop_front() {
            (thread, Band::L3)
        } else {
            return None;
        };

        info!(
            "Tick {now}: Thread {} is removed from queue L{}",
            thread.id(),
            band.number()
        );
        Some(thread)
    }

    /// 调度 `next` 上台。`finishing` 表示下台线程就此终结，
    /// 等切换完成、离开它的栈之后才回收。
    ///
    /// 调用前 `next` 必须已经离开所有就绪队列。
    pub fn run(&mut self, next: Arc<Thread>, finishing: bool) {
        assert!(self.machine.interrupts_off());

        let old = self.current.clone().expect("no running thread");
        let now = self.stats.total_ticks();
        let now_user = self.stats.user_ticks();

        next.set_start_time(now_user);
        let old_executed = now_user - old.start_time();

        info!(
            "Tick {now}: Thread {} is now selected for execution",
            next.id()
        );
        info!(
            "Tick {now}: Thread {} is replaced, and it has executed {old_executed} ticks",
            old.id()
        );

        if finishing {
            // 终结的线程排队回收，一次至多一个
            assert!(self.to_be_destroyed.is_none());
            self.to_be_destroyed = Some(old.clone());
        }

        if old.has_user_space() {
            self.machine.save_user_state(&old);
        }

        self.current = Some(next.clone());
        next.set_status(ThreadStatus::Running);

        self.machine.switch(&old, &next);

        // 切换回来，重新运行在 old 的栈上；中断仍然屏蔽
        assert!(self.machine.interrupts_off());
        self.reclaim_destroyed();
        if old.has_user_space() {
            self.machine.restore_user_state(&old);
        }
    }

    /// 当前线程让位：重新入列就绪，换下一个就绪线程上台
    pub fn yield_current(&mut self) {
        let Some(next) = self.find_next_to_run() else {
            return;
        };
        let current = self.current.clone().expect("no running thread");
        self.ready_to_run(current);
        self.run(next, false);
    }

    /// 周期性的老化检查：就绪中等待满 [`AGING_INTERVAL`] 的线程
    /// 优先级提升 [`AGING_BOOST`]（上限 [`PRIORITY_MAX`]）。
    /// 跨带时从旧优先级所在的队列摘除、插入新带的队列；
    /// 线程不在旧带队列里时摘除视作无事发生。
    /// 升入 L1 同样要做抢占检查。
    ///
    /// 返回线程是否经此升入 L1。
    pub fn check_aging(&mut self, thread: &Arc<Thread>) -> bool {
        let now = self.stats.total_ticks();
        if thread.status() != ThreadStatus::Ready
            || now - thread.start_wait_time() < AGING_INTERVAL
        {
            return false;
        }

        let old_priority = thread.priority();
        let new_priority = (old_priority + AGING_BOOST).min(PRIORITY_MAX);
        thread.set_priority(new_priority);
        if old_priority != new_priority {
            info!(
                "Tick {now}: Thread {} changes its priority from {old_priority} to {new_priority}",
                thread.id()
            );
        }

        let old_band = Band::of(old_priority);
        let new_band = Band::of(new_priority);
        let mut promoted_to_l1 = false;

        if old_band != new_band {
            match (old_band, new_band) {
                (Band::L2, Band::L1) => {
                    self.l2_queue.remove(thread);
                    self.l1_queue.insert(thread.clone());
                    info!("Tick {now}: Thread {} is removed from queue L2", thread.id());
                    info!("Tick {now}: Thread {} is inserted into queue L1", thread.id());
                    promoted_to_l1 = true;
                }
                (Band::L3, Band::L2) => {
                    remove_by_identity(&mut self.ready_list, thread);
                    self.l2_queue.insert(thread.clone());
                    info!("Tick {now}: Thread {} is removed from queue L3", thread.id());
                    info!("Tick {now}: Thread {} is inserted into queue L2", thread.id());
                }
                // 一次提升至多跨一带，且优先级绝不下降
                _ => unreachable!("aging moved thread from {old_band:?} to {new_band:?}"),
            }
        }

        // 等待重新起算
        thread.set_start_wait_time(now);

        if promoted_to_l1 {
            self.preempt_if_shorter(thread);
        }
        promoted_to_l1
    }

    /// 把线程从就绪队列里摘走，
    /// 用于就绪中的线程被终结或转入阻塞的场合
    pub fn remove_ready(&mut self, thread: &Arc<Thread>) -> bool {
        self.l1_queue.remove(thread)
            || self.l2_queue.remove(thread)
            || remove_by_identity(&mut self.ready_list, thread)
    }

    /// 线程当前排在哪条就绪队列，诊断与测试用
    pub fn band_of_queued(&self, thread: &Arc<Thread>) -> Option<Band> {
        if self.l1_queue.contains(thread) {
            Some(Band::L1)
        } else if self.l2_queue.contains(thread) {
            Some(Band::L2)
        } else if contains_by_identity(&self.ready_list, thread) {
            Some(Band::L3)
        } else {
            None
        }
    }

    /// 三条就绪队列的现状，调试用
    pub fn dump(&self) -> String {
        let mut out = String::new();

        write!(out, "L1:").unwrap();
        for thread in self.l1_queue.iter() {
            write!(out, " {}({})", thread.id(), thread.burst_estimate()).unwrap();
        }
        write!(out, "\nL2:").unwrap();
        for thread in self.l2_queue.iter() {
            write!(out, " {}({})", thread.id(), thread.priority()).unwrap();
        }
        write!(out, "\nL3:").unwrap();
        for thread in self.ready_list.iter() {
            write!(out, " {}", thread.id()).unwrap();
        }
        out.push('\n');

        out
    }
}

impl Scheduler {
    // L1 的抢占检查：新就绪者预估突发严格更短才让当前线程下台
    fn preempt_if_shorter(&mut self, thread: &Arc<Thread>) {
        let Some(current) = self.current.clone() else {
            return;
        };
        if current.band() != Band::L1 || current.id() == thread.id() {
            return;
        }

        if thread.burst_estimate() < self.estimated_remaining_burst(&current) {
            self.yield_current();
        }
    }

    /// 剩余突发估计：本次已执行时长与上次估计的指数平均
    fn estimated_remaining_burst(&self, thread: &Arc<Thread>) -> f64 {
        let actual = (self.stats.user_ticks() - thread.start_time()) as f64;
        0.5 * actual + 0.5 * thread.burst_estimate()
    }

    /// 上一个下台的线程若已终结，此刻才能回收；
    /// 在这之前还踩着它的栈
    fn reclaim_destroyed(&mut self) {
        self.to_be_destroyed.take();
    }
}
