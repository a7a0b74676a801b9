//! 时钟 tick 与睡眠/延时子系统
//!
//! 以周期性硬件时钟中断为唯一时间基准，提供：
//!
//! - 单调 tick 计数器（[`TimerCore::now`] / [`TimerCore::elapsed`]）
//! - 按唤醒期限排序的睡眠队列与专职的延迟唤醒线程
//! - 阻塞式 sleep 与忙等 delay 两族接口
//!
//! # 分工
//!
//! 时钟中断处理函数运行在中断上下文，不允许阻塞、分配或触碰睡眠
//! 队列的保护信号量（它可能正被刚刚被打断的线程持有）。因此中断侧
//! 只做三件事：递增 tick、调用调度器簿记钩子、非阻塞地点醒延迟
//! 唤醒线程；真正的出队与唤醒全部推迟到该线程的线程上下文中完成，
//! 代价是至多一个"中断到 worker 恢复运行"周期的额外唤醒延迟。
//!
//! # 使用
//!
//! 内核在启动时把 [`TimerCore`] 嵌入一个 `static`，注册好 `sync`
//! 的 ArchOps/ThreadOps 后调用 [`TimerCore::init`]，再把硬件时钟
//! 中断向量指到 [`TimerCore::handle_tick`]。

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod clock;
mod delay;
mod sleep;
mod worker;

#[cfg(test)]
mod tests;

use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use sync::{IntrGuard, IrqContext, Semaphore, ThreadId, arch_ops, thread_ops};

use clock::TickClock;
use sleep::{SleepEntry, SleepQueue};

/// 每秒时钟中断次数
pub const TICKS_PER_SEC: i64 = 100;

// 8254 风格 PIT 的可用范围：太低一个 tick 装不进计数器，
// 太高中断开销不可接受
const _: () = assert!(TICKS_PER_SEC >= 19);
const _: () = assert!(TICKS_PER_SEC <= 1000);

/// worker 句柄尚未发布时的哨兵值
const NO_WORKER: usize = usize::MAX;

/// 全进程唯一的定时器上下文对象。
///
/// 所有可变状态（tick 计数、睡眠队列、worker 句柄、忙等校准值）
/// 都收拢在这里；以 `const fn new` 构造后嵌入内核的 `static`，
/// [`TimerCore::init`] 之后对中断处理函数与延迟唤醒线程可达。
/// 内核启动时创建一次，此后从不销毁。
pub struct TimerCore {
    clock: TickClock,
    queue: SleepQueue,
    /// 延迟唤醒线程的句柄原始值；中断侧免锁读取
    worker: AtomicUsize,
    /// init 与 worker 之间的启动握手
    startup: Semaphore,
    /// 每 tick 忙等循环数，由外部校准流程注入
    loops_per_tick: AtomicUsize,
}

/// init 注册的 TimerCore 指针，worker 线程入口由此找到上下文
static REGISTERED: AtomicPtr<TimerCore> = AtomicPtr::new(core::ptr::null_mut());

impl TimerCore {
    /// 创建尚未启动的定时器上下文。
    pub const fn new() -> Self {
        TimerCore {
            clock: TickClock::new(),
            queue: SleepQueue::new(),
            worker: AtomicUsize::new(NO_WORKER),
            startup: Semaphore::new(0),
            loops_per_tick: AtomicUsize::new(0),
        }
    }

    /// 启动睡眠/唤醒机制：创建延迟唤醒线程并等待其就绪。
    ///
    /// 返回时唤醒链路已可用，之后才允许打开时钟中断。
    /// 整个内核生命周期只能调用一次，重复调用致命报错。
    pub fn init(&'static self) {
        let registered = REGISTERED.compare_exchange(
            core::ptr::null_mut(),
            self as *const TimerCore as *mut TimerCore,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if registered.is_err() {
            panic!("timer: TimerCore already initialized");
        }
        thread_ops().spawn("kwakeupd", worker::entry);
        // 等 worker 发布自己的句柄后 init 才返回
        self.startup.down();
        log::info!("timer: wakeup worker online");
    }

    /// 时钟中断处理函数。
    ///
    /// 每个硬件 tick 调用一次：计数器加一、驱动调度器簿记、
    /// 非阻塞地点醒延迟唤醒线程。绝不阻塞、不分配、不触碰
    /// 睡眠队列的保护信号量。
    pub fn handle_tick(&self, _irq: &IrqContext) {
        self.clock.advance();
        thread_ops().on_tick();
        // 每个 tick 都发信号；worker 未阻塞时 try_unblock 是空操作
        let worker = self.worker.load(Ordering::Acquire);
        if worker != NO_WORKER {
            thread_ops().try_unblock(ThreadId(worker));
        }
    }

    /// 开机以来的 tick 数（关中断快照，任何上下文可读）。
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// 自 `since`（此前某次 [`TimerCore::now`] 的返回值）以来
    /// 经过的 tick 数。
    pub fn elapsed(&self, since: i64) -> i64 {
        self.clock.elapsed(since)
    }

    /// 阻塞当前线程约 `ticks` 个 tick。
    ///
    /// 必须在中断开启的线程上下文调用，否则致命报错。
    /// 返回时刻不早于期限；晚多少取决于 worker 的调度延迟。
    pub fn sleep(&self, ticks: i64) {
        assert!(
            arch_ops().interrupts_enabled(),
            "timer: sleep requires interrupts enabled"
        );
        let deadline = self.now() + ticks;
        let me = thread_ops().current();
        self.queue.enqueue(SleepEntry::new(me, deadline));
        // 入队先于阻塞：队列的唯一消费者是 worker，它即便在这个
        // 间隙就弹出了条目，唤醒令牌也保证随后的阻塞立即返回。
        let _intr = IntrGuard::new();
        // SAFETY: 中断已禁用，唤醒由 worker 在期限到达后执行
        unsafe { thread_ops().block_current() };
    }

    /// 睡眠约 `ms` 毫秒；中断必须开启。
    pub fn msleep(&self, ms: i64) {
        self.real_time_sleep(ms, 1000);
    }

    /// 睡眠约 `us` 微秒；中断必须开启。
    pub fn usleep(&self, us: i64) {
        self.real_time_sleep(us, 1000 * 1000);
    }

    /// 睡眠约 `ns` 纳秒；中断必须开启。
    pub fn nsleep(&self, ns: i64) {
        self.real_time_sleep(ns, 1000 * 1000 * 1000);
    }

    /// 输出定时器统计信息。
    pub fn print_stats(&self) {
        log::info!("timer: {} ticks", self.now());
    }

    // ---- worker 侧 ----

    /// worker 自注册：发布句柄并完成启动握手。
    pub(crate) fn publish_worker(&self, worker: ThreadId) {
        self.worker.store(worker.0, Ordering::Release);
        self.startup.up();
    }

    pub(crate) fn queue(&self) -> &SleepQueue {
        &self.queue
    }

    /// 睡眠队列长度 (仅用于测试)
    #[cfg(test)]
    pub(crate) fn sleep_queue_len(&self) -> usize {
        self.queue.len()
    }

    /// worker 是否已完成自注册 (仅用于测试)
    #[cfg(test)]
    pub(crate) fn worker_published(&self) -> bool {
        self.worker.load(Ordering::Acquire) != NO_WORKER
    }
}

impl Default for TimerCore {
    fn default() -> Self {
        Self::new()
    }
}

/// 取得 init 注册的上下文对象。
pub(crate) fn registered_core() -> &'static TimerCore {
    let ptr = REGISTERED.load(Ordering::Acquire);
    if ptr.is_null() {
        panic!("timer: TimerCore not initialized");
    }
    // SAFETY: init 以 &'static self 注册，指针在内核生命周期内有效
    unsafe { &*ptr }
}
