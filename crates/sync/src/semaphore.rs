//! 内核信号量
//!
//! 计数信号量，等待者按 FIFO 顺序阻塞在外部调度器上。
//! 初始计数为 1 时即为二元信号量，可用作线程上下文的互斥保护。
//!
//! `down` 可能阻塞，只能在线程上下文调用；`up` 不阻塞。

use alloc::collections::VecDeque;

use crate::intr_guard::IntrGuard;
use crate::spin_lock::SpinLock;
use crate::{ThreadId, thread_ops};

struct SemaState {
    value: usize,
    waiters: VecDeque<ThreadId>,
}

/// 计数信号量
///
/// # 示例
/// ```ignore
/// static GUARD: Semaphore = Semaphore::new(1);
/// GUARD.down(); // 进入临界区
/// GUARD.up();   // 离开临界区
/// ```
pub struct Semaphore {
    state: SpinLock<SemaState>,
}

impl Semaphore {
    /// 创建一个信号量，初始计数为 `value`。
    pub const fn new(value: usize) -> Self {
        Semaphore {
            state: SpinLock::new(SemaState {
                value,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// P 操作：计数减一，计数为零时阻塞等待。
    ///
    /// 只能在线程上下文调用。被唤醒后重新检查计数（唤醒与取得
    /// 计数之间可能有其它线程插入），必要时重新排队等待。
    pub fn down(&self) {
        let me = thread_ops().current();
        let _intr = IntrGuard::new();
        loop {
            {
                let mut st = self.state.lock();
                if st.value > 0 {
                    st.value -= 1;
                    // 虚假唤醒路径下可能仍留在队列里，取走计数时一并清除
                    if let Some(pos) = st.waiters.iter().position(|&t| t == me) {
                        st.waiters.remove(pos);
                    }
                    return;
                }
                if !st.waiters.contains(&me) {
                    st.waiters.push_back(me);
                }
            }
            // SAFETY: 中断已由 _intr 禁用，唤醒来源是之后的某次 up()
            unsafe { thread_ops().block_current() };
        }
    }

    /// 尝试 P 操作：计数大于零时减一并返回 true，否则立即返回 false。
    pub fn try_down(&self) -> bool {
        let mut st = self.state.lock();
        if st.value > 0 {
            st.value -= 1;
            true
        } else {
            false
        }
    }

    /// V 操作：计数加一，并唤醒队首的等待者（若有）。
    pub fn up(&self) {
        let _intr = IntrGuard::new();
        let woken = {
            let mut st = self.state.lock();
            st.value += 1;
            st.waiters.pop_front()
        };
        // 在释放内部锁之后再触达调度器
        if let Some(t) = woken {
            thread_ops().unblock(t);
        }
    }

    /// 当前计数 (仅用于调试/测试)
    #[cfg(test)]
    pub fn value(&self) -> usize {
        self.state.lock().value
    }

    /// 当前等待者数量 (仅用于调试/测试)
    #[cfg(test)]
    pub fn waiter_count(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use crate::test_mock as mock;

    #[test]
    fn down_consumes_available_count() {
        mock::install();
        mock::adopt();

        let sema = Semaphore::new(2);
        sema.down();
        sema.down();
        assert_eq!(sema.value(), 0);
        assert_eq!(sema.waiter_count(), 0);
        sema.up();
        assert_eq!(sema.value(), 1);
    }

    #[test]
    fn try_down_does_not_block() {
        mock::install();
        mock::adopt();

        let sema = Semaphore::new(1);
        assert!(sema.try_down());
        assert!(!sema.try_down());
        sema.up();
        assert!(sema.try_down());
    }

    #[test]
    fn up_wakes_waiters_in_fifo_order() {
        mock::install();
        mock::adopt();

        static SEMA: Semaphore = Semaphore::new(0);
        let (tx, rx) = mpsc::channel();

        let spawn_waiter = |label: &'static str| {
            let tx = tx.clone();
            thread::spawn(move || {
                mock::adopt();
                SEMA.down();
                tx.send(label).unwrap();
            });
        };

        // 逐个入队，保证 FIFO 顺序可断言
        spawn_waiter("first");
        while SEMA.waiter_count() < 1 {
            thread::sleep(Duration::from_millis(1));
        }
        spawn_waiter("second");
        while SEMA.waiter_count() < 2 {
            thread::sleep(Duration::from_millis(1));
        }

        SEMA.up();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "first");
        SEMA.up();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "second");
    }

    #[test]
    fn binary_semaphore_serializes_critical_section() {
        mock::install();
        mock::adopt();

        static GUARD: Semaphore = Semaphore::new(1);
        static COUNTER: SpinLock<u32> = SpinLock::new(0);

        let mut handles = std::vec::Vec::new();
        for _ in 0..4 {
            handles.push(thread::spawn(|| {
                mock::adopt();
                for _ in 0..100 {
                    GUARD.down();
                    let v = *COUNTER.lock();
                    thread::yield_now();
                    *COUNTER.lock() = v + 1;
                    GUARD.up();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*COUNTER.lock(), 400);
    }
}
