//! 睡眠读写锁
//!
//! 共享读、独占写，等待者阻塞在外部调度器上（不自旋）。
//! 公平性采用**写者优先**：一旦有写者排队，后到的读者必须排在它
//! 之后，防止持续到来的读者饿死写者；排队的写者之间按 FIFO 服务。
//!
//! # 一次等待与释放时移交
//!
//! 每次 acquire 至多等待一次：需要等待的线程入队、阻塞一次，醒来
//! 即持有锁。这之所以成立，是因为**所有权在释放时移交**：释放方
//! 在唤醒等待者之前就把 `writer` / `reader_count` 记到它们名下，
//! 后到的线程不可能插队抢走已经授出的所有权。被唤醒的线程只做
//! 校验：若发现自己仍在等待队列中（说明这次唤醒不是来自本锁的
//! 授权），按单次等待不变式立即致命报错，绝不重新排队。
//!
//! 四个操作的完整临界区都在关中断下执行：阻塞与唤醒会触达调度器
//! 中与 tick 处理共享的状态。

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::intr_guard::IntrGuard;
use crate::spin_lock::SpinLock;
use crate::{ThreadId, thread_ops};

#[derive(Debug, Clone, Copy)]
struct Waiter {
    thread: ThreadId,
    wants_write: bool,
}

struct RwState {
    writer: Option<ThreadId>,
    reader_count: usize,
    waiters: VecDeque<Waiter>,
}

impl RwState {
    /// 同一线程在队列中至多出现一次；重复入队立即致命报错。
    fn check_not_queued(&self, me: ThreadId) {
        if self.waiters.iter().any(|w| w.thread == me) {
            panic!("sync: rwlock: thread already waiting on this lock (single-wait invariant)");
        }
    }
}

/// 睡眠读写锁的裸协议层。
///
/// 不携带数据，只仲裁访问权；需要 RAII 数据保护时用
/// [`SleepRwLock`]。
///
/// 不变式：
/// - `writer` 非空时 `reader_count == 0`，反之亦然；
/// - 等待队列非空时，必有写者持锁或写者在队（读者只会排在
///   写者之后）。
pub struct RawSleepRwLock {
    state: SpinLock<RwState>,
}

impl RawSleepRwLock {
    /// 创建一个未被持有的读写锁。
    pub const fn new() -> Self {
        RawSleepRwLock {
            state: SpinLock::new(RwState {
                writer: None,
                reader_count: 0,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// 获取共享读权限，必要时阻塞。
    ///
    /// 写者持锁或已有等待者（意味着有写者在队）时排队等待，
    /// 否则立即进入。只能在线程上下文调用。
    pub fn read_acquire(&self) {
        let me = thread_ops().current();
        let _intr = IntrGuard::new();
        if self.try_read_or_enqueue(me) {
            // SAFETY: 中断已禁用，唤醒来源是之后的某次 release
            unsafe { thread_ops().block_current() };
            self.finish_read_wait(me);
        }
    }

    /// 释放共享读权限。
    ///
    /// 最后一个读者离开且有等待者时，队首必然是写者
    /// （读者只会排在写者之后），将锁移交给它并唤醒。
    pub fn read_release(&self) {
        let _intr = IntrGuard::new();
        let woken = {
            let mut st = self.state.lock();
            if st.reader_count == 0 {
                panic!("sync: rwlock: read_release without an active reader");
            }
            st.reader_count -= 1;
            if st.reader_count == 0 {
                if let Some(front) = st.waiters.pop_front() {
                    assert!(
                        front.wants_write,
                        "sync: rwlock: waiter queue corrupted: reader queued with no writer ahead"
                    );
                    st.writer = Some(front.thread);
                    Some(front.thread)
                } else {
                    None
                }
            } else {
                None
            }
        };
        if let Some(t) = woken {
            thread_ops().unblock(t);
        }
    }

    /// 获取独占写权限，必要时阻塞。
    ///
    /// 锁空闲（无写者、无读者）时立即进入，否则排队等待。
    /// 只能在线程上下文调用。
    pub fn write_acquire(&self) {
        let me = thread_ops().current();
        let _intr = IntrGuard::new();
        if self.try_write_or_enqueue(me) {
            // SAFETY: 同 read_acquire
            unsafe { thread_ops().block_current() };
            self.finish_write_wait(me);
        }
    }

    /// 释放独占写权限，按写者优先规则移交。
    ///
    /// 从队首扫描：队首是写者则只移交并唤醒它；队首是读者则批量
    /// 唤醒这段连续的读者，遇到第一个写者或队列耗尽为止；排队的
    /// 写者挡住其身后所有读者的唤醒。
    pub fn write_release(&self) {
        let me = thread_ops().current();
        let _intr = IntrGuard::new();
        let woken = {
            let mut st = self.state.lock();
            if st.writer != Some(me) {
                panic!("sync: rwlock: write_release by a thread that does not hold the write lock");
            }
            st.writer = None;

            let mut woken = Vec::new();
            while let Some(front) = st.waiters.front().copied() {
                if front.wants_write {
                    if woken.is_empty() {
                        st.waiters.pop_front();
                        st.writer = Some(front.thread);
                        woken.push(front.thread);
                    }
                    break;
                }
                st.waiters.pop_front();
                st.reader_count += 1;
                woken.push(front.thread);
            }
            woken
        };
        for t in woken {
            thread_ops().unblock(t);
        }
    }

    /// 读路径准入：立即获得则返回 false；否则入队并返回 true。
    fn try_read_or_enqueue(&self, me: ThreadId) -> bool {
        let mut st = self.state.lock();
        st.check_not_queued(me);
        if st.writer == Some(me) {
            panic!("sync: rwlock: read_acquire while holding the write lock");
        }
        if st.writer.is_none() && st.waiters.is_empty() {
            st.reader_count += 1;
            false
        } else {
            st.waiters.push_back(Waiter {
                thread: me,
                wants_write: false,
            });
            true
        }
    }

    /// 写路径准入：立即获得则返回 false；否则入队并返回 true。
    fn try_write_or_enqueue(&self, me: ThreadId) -> bool {
        let mut st = self.state.lock();
        st.check_not_queued(me);
        if st.writer == Some(me) {
            panic!("sync: rwlock: recursive write_acquire");
        }
        if st.writer.is_none() && st.reader_count == 0 {
            st.writer = Some(me);
            false
        } else {
            st.waiters.push_back(Waiter {
                thread: me,
                wants_write: true,
            });
            true
        }
    }

    /// 读者醒来后的授权校验：仍在队列中说明唤醒并非来自本锁。
    fn finish_read_wait(&self, me: ThreadId) {
        let st = self.state.lock();
        if st.waiters.iter().any(|w| w.thread == me) {
            panic!("sync: rwlock: woken without grant (single-wait invariant)");
        }
        debug_assert!(st.reader_count > 0);
    }

    /// 写者醒来后的授权校验。
    fn finish_write_wait(&self, me: ThreadId) {
        let st = self.state.lock();
        if st.writer != Some(me) {
            panic!("sync: rwlock: woken without grant (single-wait invariant)");
        }
    }

    /// 当前活跃读者数 (仅用于调试/测试)
    #[cfg(test)]
    fn reader_count(&self) -> usize {
        self.state.lock().reader_count
    }

    /// 当前写者 (仅用于调试/测试)
    #[cfg(test)]
    fn writer(&self) -> Option<ThreadId> {
        self.state.lock().writer
    }

    /// 等待队列快照 (仅用于调试/测试)
    #[cfg(test)]
    fn queued(&self) -> Vec<(ThreadId, bool)> {
        self.state
            .lock()
            .waiters
            .iter()
            .map(|w| (w.thread, w.wants_write))
            .collect()
    }
}

impl Default for RawSleepRwLock {
    fn default() -> Self {
        Self::new()
    }
}

// ========== lock_api 适配 ==========

// SAFETY: read_acquire/write_acquire 与对应 release 实现了
// RawRwLock 要求的共享/独占语义；guard 不可跨线程（释放校验
// 依赖 current()），故 GuardMarker 取 GuardNoSend。
unsafe impl lock_api::RawRwLock for RawSleepRwLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new();

    type GuardMarker = lock_api::GuardNoSend;

    fn lock_shared(&self) {
        self.read_acquire();
    }

    fn try_lock_shared(&self) -> bool {
        let mut st = self.state.lock();
        if st.writer.is_none() && st.waiters.is_empty() {
            st.reader_count += 1;
            true
        } else {
            false
        }
    }

    unsafe fn unlock_shared(&self) {
        self.read_release();
    }

    fn lock_exclusive(&self) {
        self.write_acquire();
    }

    fn try_lock_exclusive(&self) -> bool {
        let me = thread_ops().current();
        let mut st = self.state.lock();
        if st.writer.is_none() && st.reader_count == 0 {
            st.writer = Some(me);
            true
        } else {
            false
        }
    }

    unsafe fn unlock_exclusive(&self) {
        self.write_release();
    }
}

/// 携带数据的睡眠读写锁，RAII guard 由 `lock_api` 提供。
pub type SleepRwLock<T> = lock_api::RwLock<RawSleepRwLock, T>;

/// [`SleepRwLock`] 的读 guard。
pub type SleepRwLockReadGuard<'a, T> = lock_api::RwLockReadGuard<'a, RawSleepRwLock, T>;

/// [`SleepRwLock`] 的写 guard。
pub type SleepRwLockWriteGuard<'a, T> = lock_api::RwLockWriteGuard<'a, RawSleepRwLock, T>;
