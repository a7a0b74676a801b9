//! 调度器层的 Mock 实现
//!
//! 以宿主 OS 线程模拟内核线程。block/wake 按**唤醒令牌**语义
//! 实现：先 wake 后 block 不会丢失唤醒，block 立即返回并消费
//! 令牌，与内核调度层对 `ThreadOps` 的契约一致，因此丢失唤醒
//! 一类的时序问题能在宿主测试里真实复现。
//!
//! 身份与事件记录都是线程局部的：每个 `#[test]` 在自己的 OS
//! 线程上 `adopt()` 出互不冲突的身份，并只观察自己发出的唤醒。
//!
//! 底层机制以裸 `usize` 为键暴露（`raw_*`），供需要把同一份
//! 状态绑到别的 trait 实例上的测试复用；`MockThreads` 把它绑到
//! `sync::ThreadOps` 上，供下游 crate 的测试直接注册。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};

use sync::{ThreadId, ThreadOps};

use super::arch::MOCK_ARCH_OPS;

#[derive(Default)]
struct SlotState {
    wake_pending: bool,
    blocked: bool,
}

#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
    wakeup: Condvar,
}

fn slots() -> &'static Mutex<HashMap<usize, Arc<Slot>>> {
    static SLOTS: OnceLock<Mutex<HashMap<usize, Arc<Slot>>>> = OnceLock::new();
    SLOTS.get_or_init(Default::default)
}

static NEXT_TID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static CURRENT: Cell<Option<usize>> = const { Cell::new(None) };
    static WOKEN: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
    static ON_TICKS: Cell<usize> = const { Cell::new(0) };
}

/// 取得线程的唤醒槽，不存在时建立。
///
/// 唤醒令牌允许先于目标线程首次阻塞投递，槽位因此按需建立，
/// 而不是只在线程取得身份时建立。
fn slot(id: usize) -> Arc<Slot> {
    slots().lock().unwrap().entry(id).or_default().clone()
}

/// 分配一个新的、进程内唯一的线程编号。
pub fn raw_new_id() -> usize {
    NEXT_TID.fetch_add(1, Ordering::Relaxed)
}

/// 将当前 OS 线程的身份切换为 `id`。
pub fn raw_set_current(id: usize) {
    CURRENT.set(Some(id));
}

/// 为当前 OS 线程分配一个新身份并返回。
pub fn raw_adopt() -> usize {
    let id = raw_new_id();
    raw_set_current(id);
    id
}

/// 当前 OS 线程的身份。
pub fn raw_current() -> usize {
    CURRENT
        .get()
        .expect("mock: current thread has no identity, call adopt() first")
}

/// 以新身份启动一个 OS 线程执行 `entry`。
pub fn raw_spawn(name: &str, entry: fn()) {
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            raw_adopt();
            entry();
        })
        .expect("mock: failed to spawn thread");
}

/// 阻塞当前身份，直到收到唤醒令牌。
pub fn raw_block_current() {
    // 契约校验：阻塞必须发生在关中断的临界区内
    assert!(
        !MOCK_ARCH_OPS.interrupts_enabled(),
        "mock: block_current called with interrupts enabled"
    );
    let slot = slot(raw_current());
    let mut st = slot.state.lock().unwrap();
    if st.wake_pending {
        // 唤醒先于阻塞到达：消费令牌，立即返回
        st.wake_pending = false;
        return;
    }
    st.blocked = true;
    while !st.wake_pending {
        st = slot.wakeup.wait(st).unwrap();
    }
    st.wake_pending = false;
    st.blocked = false;
}

/// 投递唤醒令牌（无条件）。
pub fn raw_wake(id: usize) {
    let slot = slot(id);
    {
        let mut st = slot.state.lock().unwrap();
        st.wake_pending = true;
    }
    slot.wakeup.notify_all();
    WOKEN.with(|v| v.borrow_mut().push(id));
}

/// 仅当目标处于阻塞态时投递唤醒令牌。
pub fn raw_try_wake(id: usize) -> bool {
    let slot = slot(id);
    let mut st = slot.state.lock().unwrap();
    if st.blocked {
        st.wake_pending = true;
        slot.wakeup.notify_all();
        drop(st);
        WOKEN.with(|v| v.borrow_mut().push(id));
        true
    } else {
        false
    }
}

/// 取走当前 OS 线程记录的唤醒事件（wake/try_wake 的目标，按序）。
pub fn raw_take_woken() -> Vec<usize> {
    WOKEN.with(|v| v.take())
}

/// 记一次 tick 簿记。
pub fn raw_on_tick() {
    ON_TICKS.set(ON_TICKS.get() + 1);
}

/// 当前 OS 线程累计的 tick 簿记次数。
pub fn raw_tick_count() -> usize {
    ON_TICKS.get()
}

/// Mock 调度器操作
pub struct MockThreads;

/// 全局 Mock 实例
pub static MOCK_THREADS: MockThreads = MockThreads;

impl ThreadOps for MockThreads {
    fn current(&self) -> ThreadId {
        ThreadId(raw_current())
    }

    fn spawn(&self, name: &'static str, entry: fn()) {
        raw_spawn(name, entry);
    }

    unsafe fn block_current(&self) {
        raw_block_current();
    }

    fn unblock(&self, thread: ThreadId) {
        raw_wake(thread.0);
    }

    fn try_unblock(&self, thread: ThreadId) -> bool {
        raw_try_wake(thread.0)
    }

    fn on_tick(&self) {
        raw_on_tick();
    }
}

// ---- 类型化便捷接口 ----

/// 分配一个新线程编号。
pub fn new_tid() -> ThreadId {
    ThreadId(raw_new_id())
}

/// 为当前 OS 线程分配一个新身份并返回。
pub fn adopt() -> ThreadId {
    ThreadId(raw_adopt())
}

/// 将当前 OS 线程的身份切换为 `thread`。
pub fn set_current(thread: ThreadId) {
    raw_set_current(thread.0);
}

/// 取走当前 OS 线程记录的唤醒事件。
pub fn take_unblocked() -> Vec<ThreadId> {
    raw_take_woken().into_iter().map(ThreadId).collect()
}

/// 当前 OS 线程累计触发的 on_tick 次数。
pub fn on_tick_count() -> usize {
    raw_tick_count()
}
