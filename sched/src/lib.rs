#![no_std]

extern crate alloc;

/* sched 的整体架构，自上而下 */

// 调度器：三级反馈队列的状态机，挑选并调度下一个线程
mod scheduler;
pub use scheduler::{Machine, Scheduler, Stats};
pub use scheduler::{AGING_BOOST, AGING_INTERVAL};

// 就绪队列：L1、L2 各自固定的排序纪律
mod queue;

// 线程的调度视角元数据
mod thread;
pub use thread::{Band, Thread, ThreadStatus, PRIORITY_MAX};
