use std::sync::{Arc, Mutex};

use log::{Level, LevelFilter, Log, Metadata, Record};
use sched::{Band, Machine, Scheduler, Stats, Thread, ThreadStatus};

/// 只记账的切换原语：中断视作永远屏蔽
struct TestMachine {
    switches: Arc<Mutex<Vec<(usize, usize)>>>,
}

impl Machine for TestMachine {
    fn interrupts_off(&self) -> bool {
        true
    }

    fn switch(&mut self, old: &Arc<Thread>, new: &Arc<Thread>) {
        self.switches.lock().unwrap().push((old.id(), new.id()));
    }
}

fn scheduler() -> (Scheduler, Arc<Stats>, Arc<Mutex<Vec<(usize, usize)>>>) {
    let stats = Arc::new(Stats::new());
    let switches = Arc::new(Mutex::new(Vec::new()));
    let machine = TestMachine {
        switches: switches.clone(),
    };
    (
        Scheduler::new(stats.clone(), Box::new(machine)),
        stats,
        switches,
    )
}

fn thread(id: usize, priority: u32) -> Arc<Thread> {
    Arc::new(Thread::new(id, format!("t{id}"), priority))
}

fn thread_with_burst(id: usize, priority: u32, burst: f64) -> Arc<Thread> {
    let thread = thread(id, priority);
    thread.set_burst_estimate(burst);
    thread
}

#[test]
fn bands_partition_priorities() {
    assert_eq!(Band::of(0), Band::L3);
    assert_eq!(Band::of(49), Band::L3);
    assert_eq!(Band::of(50), Band::L2);
    assert_eq!(Band::of(99), Band::L2);
    assert_eq!(Band::of(100), Band::L1);
    assert_eq!(Band::of(149), Band::L1);
}

// L1 按预估突发升序出队，键值并列维持先来后到
#[test]
fn l1_orders_by_burst() {
    let (mut scheduler, _, _) = scheduler();

    scheduler.ready_to_run(thread_with_burst(1, 120, 30.0));
    scheduler.ready_to_run(thread_with_burst(2, 120, 10.0));
    scheduler.ready_to_run(thread_with_burst(3, 120, 20.0));
    scheduler.ready_to_run(thread_with_burst(4, 120, 10.0));

    let order: Vec<usize> = std::iter::from_fn(|| scheduler.find_next_to_run())
        .map(|thread| thread.id())
        .collect();
    assert_eq!(order, [2, 4, 3, 1]);
}

// L2 按优先级降序出队
#[test]
fn l2_orders_by_priority() {
    let (mut scheduler, _, _) = scheduler();

    scheduler.ready_to_run(thread(1, 55));
    scheduler.ready_to_run(thread(2, 99));
    scheduler.ready_to_run(thread(3, 70));
    scheduler.ready_to_run(thread(4, 99));

    let order: Vec<usize> = std::iter::from_fn(|| scheduler.find_next_to_run())
        .map(|thread| thread.id())
        .collect();
    assert_eq!(order, [2, 4, 3, 1]);
}

// 高带非空时低带绝不会被选中
#[test]
fn bands_drain_top_down() {
    let (mut scheduler, _, _) = scheduler();

    scheduler.ready_to_run(thread(3, 10));
    scheduler.ready_to_run(thread(2, 60));
    scheduler.ready_to_run(thread(1, 110));

    assert_eq!(scheduler.find_next_to_run().unwrap().id(), 1);
    assert_eq!(scheduler.find_next_to_run().unwrap().id(), 2);
    assert_eq!(scheduler.find_next_to_run().unwrap().id(), 3);
    assert!(scheduler.find_next_to_run().is_none());
}

// 入列的线程全是就绪态，且不含当前线程
#[test]
fn queued_threads_are_ready() {
    let (mut scheduler, _, _) = scheduler();

    let current = thread_with_burst(1, 120, 5.0);
    scheduler.start(current.clone());
    assert_eq!(current.status(), ThreadStatus::Running);
    assert!(scheduler.band_of_queued(&current).is_none());

    let waiting = thread_with_burst(2, 120, 50.0);
    scheduler.ready_to_run(waiting.clone());
    assert_eq!(waiting.status(), ThreadStatus::Ready);
    assert_eq!(scheduler.band_of_queued(&waiting), Some(Band::L1));
}

// 新就绪的 L1 线程预估突发严格更短，当前线程让位
#[test]
fn sjf_preemption() {
    let (mut scheduler, _, switches) = scheduler();

    let current = thread_with_burst(1, 120, 20.0);
    scheduler.start(current.clone());

    // 当前线程尚未消耗用户时间：剩余突发估计 0.5*0 + 0.5*20 = 10
    let shorter = thread_with_burst(2, 110, 5.0);
    scheduler.ready_to_run(shorter.clone());

    assert_eq!(scheduler.current().unwrap().id(), 2);
    assert_eq!(shorter.status(), ThreadStatus::Running);
    assert_eq!(switches.lock().unwrap().as_slice(), [(1, 2)]);

    // 让位的线程回到 L1 等待
    assert_eq!(scheduler.band_of_queued(&current), Some(Band::L1));
    assert_eq!(scheduler.find_next_to_run().unwrap().id(), 1);
}

// 预估突发相等不抢占：必须严格更短
#[test]
fn preemption_requires_strictly_shorter_burst() {
    let (mut scheduler, _, switches) = scheduler();

    let current = thread_with_burst(1, 120, 20.0);
    scheduler.start(current.clone());

    let equal = thread_with_burst(2, 110, 10.0);
    scheduler.ready_to_run(equal.clone());

    assert_eq!(scheduler.current().unwrap().id(), 1);
    assert!(switches.lock().unwrap().is_empty());
    assert_eq!(scheduler.band_of_queued(&equal), Some(Band::L1));
}

// 剩余突发估计随已执行时长变化
#[test]
fn preemption_accounts_elapsed_user_ticks() {
    let (mut scheduler, stats, _) = scheduler();

    let current = thread_with_burst(1, 120, 20.0);
    scheduler.start(current.clone());
    stats.advance(8, true); // 估计变为 0.5*8 + 0.5*20 = 14

    let incoming = thread_with_burst(2, 110, 13.0);
    scheduler.ready_to_run(incoming);
    assert_eq!(scheduler.current().unwrap().id(), 2);
}

/// 记录用户态保存恢复时机的切换原语
struct UserTrackMachine {
    events: Arc<Mutex<Vec<String>>>,
}

impl Machine for UserTrackMachine {
    fn interrupts_off(&self) -> bool {
        true
    }

    fn switch(&mut self, old: &Arc<Thread>, new: &Arc<Thread>) {
        self.events
            .lock()
            .unwrap()
            .push(format!("switch {}->{}", old.id(), new.id()));
    }

    fn save_user_state(&mut self, thread: &Arc<Thread>) {
        self.events.lock().unwrap().push(format!("save {}", thread.id()));
    }

    fn restore_user_state(&mut self, thread: &Arc<Thread>) {
        self.events
            .lock()
            .unwrap()
            .push(format!("restore {}", thread.id()));
    }
}

// 带用户地址空间的线程：下台前保存、切换回来后恢复
#[test]
fn user_state_saved_and_restored_around_switch() {
    let stats = Arc::new(Stats::new());
    let events = Arc::new(Mutex::new(Vec::new()));
    let mut scheduler = Scheduler::new(
        stats,
        Box::new(UserTrackMachine {
            events: events.clone(),
        }),
    );

    let user = Arc::new(Thread::new_user(1, "shell", 120));
    scheduler.start(user);
    scheduler.run(thread(2, 120), false);

    assert_eq!(
        events.lock().unwrap().as_slice(),
        ["save 1", "switch 1->2", "restore 1"]
    );
}

// 非 L1 的当前线程不参与突发抢占
#[test]
fn no_preemption_outside_l1() {
    let (mut scheduler, _, switches) = scheduler();

    let current = thread(1, 80);
    scheduler.start(current);

    scheduler.ready_to_run(thread_with_burst(2, 110, 0.5));
    assert_eq!(scheduler.current().unwrap().id(), 1);
    assert!(switches.lock().unwrap().is_empty());
}

// 等满1500个tick才老化，1499不行
#[test]
fn aging_boundary() {
    let (mut scheduler, stats, _) = scheduler();

    let waiting = thread(7, 40);
    scheduler.ready_to_run(waiting.clone());

    stats.advance(1499, false);
    assert!(!scheduler.check_aging(&waiting));
    assert_eq!(waiting.priority(), 40);
    assert_eq!(scheduler.band_of_queued(&waiting), Some(Band::L3));

    stats.advance(1, false);
    assert!(!scheduler.check_aging(&waiting));
    assert_eq!(waiting.priority(), 50);
    assert_eq!(scheduler.band_of_queued(&waiting), Some(Band::L2));
    // 等待从头起算
    assert_eq!(waiting.start_wait_time(), 1500);
}

// 优先级提升到149封顶，且此后老化不再变动数值
#[test]
fn aging_caps_at_priority_max() {
    let (mut scheduler, stats, _) = scheduler();

    let waiting = thread(8, 145);
    scheduler.ready_to_run(waiting.clone());

    stats.advance(1500, false);
    assert!(!scheduler.check_aging(&waiting));
    assert_eq!(waiting.priority(), 149);

    stats.advance(1500, false);
    assert!(!scheduler.check_aging(&waiting));
    assert_eq!(waiting.priority(), 149);
}

// 只有就绪中的线程才老化
#[test]
fn aging_skips_non_ready_threads() {
    let (mut scheduler, stats, _) = scheduler();

    let current = thread(1, 40);
    scheduler.start(current.clone());
    stats.advance(3000, false);

    assert!(!scheduler.check_aging(&current));
    assert_eq!(current.priority(), 40);
}

// 场景：49的线程一路老化，穿带直至升入L1并抢占
#[test]
fn aging_cascade() {
    let (mut scheduler, stats, switches) = scheduler();

    let current = thread_with_burst(1, 100, 50.0);
    scheduler.start(current.clone());

    let starved = thread(9, 49);
    scheduler.ready_to_run(starved.clone());

    // 1500：49 -> 59，L3 -> L2
    stats.advance(1500, false);
    assert!(!scheduler.check_aging(&starved));
    assert_eq!(starved.priority(), 59);
    assert_eq!(scheduler.band_of_queued(&starved), Some(Band::L2));

    // 3000：59 -> 69，仍在 L2
    stats.advance(1500, false);
    assert!(!scheduler.check_aging(&starved));
    assert_eq!(starved.priority(), 69);
    assert_eq!(scheduler.band_of_queued(&starved), Some(Band::L2));

    // 一路升到99
    for _ in 0..3 {
        stats.advance(1500, false);
        assert!(!scheduler.check_aging(&starved));
    }
    assert_eq!(starved.priority(), 99);
    assert_eq!(scheduler.band_of_queued(&starved), Some(Band::L2));

    // 9000：99 -> 109，L2 -> L1；突发更短，当前线程被抢占
    stats.advance(1500, false);
    assert!(scheduler.check_aging(&starved));
    assert_eq!(starved.priority(), 109);
    assert_eq!(scheduler.current().unwrap().id(), 9);
    assert_eq!(scheduler.band_of_queued(&current), Some(Band::L1));
    assert_eq!(switches.lock().unwrap().as_slice(), [(1, 9)]);
}

// 就绪但意外不在旧带队列里的线程：摘除视作无事发生，照样入新带
#[test]
fn aging_tolerates_missing_queue_entry() {
    let (mut scheduler, stats, _) = scheduler();

    let stray = thread(11, 95);
    stray.set_status(ThreadStatus::Ready);
    assert!(scheduler.band_of_queued(&stray).is_none());

    stats.advance(1500, false);
    assert!(scheduler.check_aging(&stray));
    assert_eq!(stray.priority(), 105);
    assert_eq!(scheduler.band_of_queued(&stray), Some(Band::L1));
}

// finishing 的线程在切换完成后回收
#[test]
fn run_finishing_reclaims_after_switch() {
    let (mut scheduler, _, switches) = scheduler();

    let dying = thread(1, 120);
    scheduler.start(dying.clone());

    let next = thread(2, 120);
    scheduler.run(next.clone(), true);

    assert_eq!(scheduler.current().unwrap().id(), 2);
    assert_eq!(next.status(), ThreadStatus::Running);
    assert_eq!(switches.lock().unwrap().as_slice(), [(1, 2)]);
    // 调度器不再持有任何对它的引用
    assert_eq!(Arc::strong_count(&dying), 1);
}

// 就绪中的线程被摘走后不再参与调度
#[test]
fn remove_ready_thread() {
    let (mut scheduler, _, _) = scheduler();

    let blocked = thread_with_burst(1, 120, 5.0);
    let other = thread(2, 60);
    scheduler.ready_to_run(blocked.clone());
    scheduler.ready_to_run(other);

    assert!(scheduler.remove_ready(&blocked));
    assert!(!scheduler.remove_ready(&blocked));
    assert!(scheduler.band_of_queued(&blocked).is_none());

    blocked.set_status(ThreadStatus::Blocked);
    assert_eq!(scheduler.find_next_to_run().unwrap().id(), 2);
    assert!(scheduler.find_next_to_run().is_none());
}

// 没有就绪线程时让位是空操作
#[test]
fn yield_without_ready_threads() {
    let (mut scheduler, _, switches) = scheduler();

    let only = thread(1, 120);
    scheduler.start(only.clone());
    scheduler.yield_current();

    assert_eq!(scheduler.current().unwrap().id(), 1);
    assert!(switches.lock().unwrap().is_empty());
}

#[test]
fn dump_shows_queues() {
    let (mut scheduler, _, _) = scheduler();

    scheduler.ready_to_run(thread_with_burst(1, 120, 3.0));
    scheduler.ready_to_run(thread(2, 60));
    scheduler.ready_to_run(thread(3, 10));

    let report = scheduler.dump();
    assert!(report.contains("L1: 1(3)"));
    assert!(report.contains("L2: 2(60)"));
    assert!(report.contains("L3: 3"));
}

/// 捕获日志行，核对调度轨迹的确切格式
struct CaptureLogger;

static LINES: Mutex<Vec<String>> = Mutex::new(Vec::new());

impl Log for CaptureLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            LINES.lock().unwrap().push(format!("{}", record.args()));
        }
    }

    fn flush(&self) {}
}

#[test]
fn trace_line_format() {
    static LOGGER: CaptureLogger = CaptureLogger;
    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Info));

    let (mut scheduler, stats, _) = scheduler();
    let current = thread_with_burst(901, 120, 20.0);
    scheduler.start(current);
    stats.advance(4, true);

    let shorter = thread_with_burst(902, 110, 5.0);
    scheduler.ready_to_run(shorter);

    // 本测试的线程编号独一无二，并发测试的日志不会混进来
    let lines: Vec<String> = LINES
        .lock()
        .unwrap()
        .iter()
        .filter(|line| line.contains("Thread 901") || line.contains("Thread 902"))
        .cloned()
        .collect();

    assert_eq!(
        lines,
        [
            "Tick 4: Thread 902 is inserted into queue L1",
            "Tick 4: Thread 902 is removed from queue L1",
            "Tick 4: Thread 901 is inserted into queue L1",
            "Tick 4: Thread 902 is now selected for execution",
            "Tick 4: Thread 901 is replaced, and it has executed 4 ticks",
        ]
    );
}
