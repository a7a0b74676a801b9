//! 睡眠队列
//!
//! 挂起中的定时等待集合，按唤醒期限升序排列，期限相同按入队
//! 顺序。队列由二元信号量保护，只能在线程上下文操作；中断侧
//! 从不触碰它。

use alloc::collections::VecDeque;

use sync::{Semaphore, SpinLock, ThreadId};

/// 条目完整性哨兵，插入与弹出时校验
const SLEEP_ENTRY_MAGIC: u32 = 0x536c_6565;

/// 一次定时等待：谁在等、等到哪个 tick。
///
/// 以值的形式存进队列并随弹出移出，生命周期完全由队列持有，
/// 属主线程从 `sleep` 返回时条目已被消费。
pub(crate) struct SleepEntry {
    pub owner: ThreadId,
    pub wake_at: i64,
    magic: u32,
}

impl SleepEntry {
    pub fn new(owner: ThreadId, wake_at: i64) -> Self {
        SleepEntry {
            owner,
            wake_at,
            magic: SLEEP_ENTRY_MAGIC,
        }
    }

    fn assert_intact(&self) {
        assert!(
            self.magic == SLEEP_ENTRY_MAGIC,
            "timer: sleep queue corrupted"
        );
    }
}

/// 按 `wake_at` 升序的睡眠队列。
///
/// `guard` 是对外的访问协议：所有入队/出队先 down 后 up，等待
/// 保护权的线程阻塞而非自旋。内层 SpinLock 只是存储单元的内存
/// 安全边界，持有时间仅覆盖单次容器操作。
pub(crate) struct SleepQueue {
    guard: Semaphore,
    entries: SpinLock<VecDeque<SleepEntry>>,
}

impl SleepQueue {
    pub const fn new() -> Self {
        SleepQueue {
            guard: Semaphore::new(1),
            entries: SpinLock::new(VecDeque::new()),
        }
    }

    /// 有序插入一个等待条目。
    ///
    /// 线程上下文专用：可能为保护权阻塞。
    pub fn enqueue(&self, entry: SleepEntry) {
        entry.assert_intact();
        self.guard.down();
        {
            let mut entries = self.entries.lock();
            // 线性扫描：插到第一个期限更晚的条目之前，期限相同保持入队顺序
            let pos = entries.iter().position(|e| {
                e.assert_intact();
                e.wake_at > entry.wake_at
            });
            match pos {
                Some(i) => entries.insert(i, entry),
                None => entries.push_back(entry),
            }
        }
        self.guard.up();
    }

    /// 弹出队首条目；到期则返回，未到期则放回队首并返回 None。
    ///
    /// 期限检查在释放保护权之后进行，避免持有保护权处理条目时
    /// 挡住其它入队者。放回队首不破坏有序性：未到期的队首仍是
    /// 全局最小期限。
    pub fn try_pop_due(&self, now: i64) -> Option<SleepEntry> {
        self.guard.down();
        let entry = self.entries.lock().pop_front();
        self.guard.up();

        let entry = entry?;
        entry.assert_intact();
        if entry.wake_at <= now {
            Some(entry)
        } else {
            self.guard.down();
            self.entries.lock().push_front(entry);
            self.guard.up();
            None
        }
    }

    /// 队列长度 (仅用于测试)
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;
    use test_support::mock;

    fn setup() {
        mock::install();
        mock::threads::adopt();
    }

    #[test]
    fn drains_in_deadline_order_with_stable_ties() {
        setup();

        let queue = SleepQueue::new();
        let owners: Vec<_> = (0..4).map(|_| mock::threads::new_tid()).collect();

        // 期限 [5, 2, 8, 2]，到期后应按 2, 2, 5, 8 弹出，
        // 两个期限 2 的条目保持入队顺序
        for (owner, deadline) in owners.iter().zip([5, 2, 8, 2]) {
            queue.enqueue(SleepEntry::new(*owner, deadline));
        }

        let mut drained = Vec::new();
        while let Some(entry) = queue.try_pop_due(10) {
            drained.push((entry.owner, entry.wake_at));
        }

        assert_eq!(
            drained,
            std::vec![
                (owners[1], 2),
                (owners[3], 2),
                (owners[0], 5),
                (owners[2], 8),
            ]
        );
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn undue_front_entry_is_put_back() {
        setup();

        let queue = SleepQueue::new();
        let owner = mock::threads::new_tid();
        queue.enqueue(SleepEntry::new(owner, 5));

        assert!(queue.try_pop_due(4).is_none());
        assert_eq!(queue.len(), 1, "undue entry must return to the queue");

        let entry = queue.try_pop_due(5).expect("entry is due at its deadline");
        assert_eq!(entry.owner, owner);
    }

    #[test]
    fn pop_on_empty_queue_returns_none() {
        setup();

        let queue = SleepQueue::new();
        assert!(queue.try_pop_due(100).is_none());
    }

    #[test]
    fn drain_stops_at_first_undue_entry() {
        setup();

        let queue = SleepQueue::new();
        let t1 = mock::threads::new_tid();
        let t2 = mock::threads::new_tid();
        queue.enqueue(SleepEntry::new(t1, 3));
        queue.enqueue(SleepEntry::new(t2, 7));

        assert_eq!(queue.try_pop_due(3).map(|e| e.owner), Some(t1));
        assert!(queue.try_pop_due(3).is_none());
        assert_eq!(queue.len(), 1);
    }
}
