//! 单调 tick 计数器
//!
//! 全系统唯一的时间基准：每次硬件时钟中断加一，只增不减，
//! 内核运行期间绝不清零。
//!
//! 64 位计数在目标平台上未必有原子读，读取通过关中断快照完成
//! （锁的获取即关中断）。单核上持有者运行期间不可能被抢占，
//! 中断处理函数因此永远不会观察到锁被占用：递增路径绝不自旋。

use sync::SpinLock;

pub(crate) struct TickClock {
    ticks: SpinLock<i64>,
}

impl TickClock {
    pub const fn new() -> Self {
        TickClock {
            ticks: SpinLock::new(0),
        }
    }

    /// 当前 tick 数的关中断快照。
    pub fn now(&self) -> i64 {
        *self.ticks.lock()
    }

    /// 自 `since` 以来经过的 tick 数。
    pub fn elapsed(&self, since: i64) -> i64 {
        self.now() - since
    }

    /// 计数加一。只允许时钟中断处理函数调用。
    pub fn advance(&self) {
        *self.ticks.lock() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_support::mock;

    #[test]
    fn starts_at_zero_and_counts_up() {
        mock::install();

        let clock = TickClock::new();
        assert_eq!(clock.now(), 0);
        clock.advance();
        clock.advance();
        clock.advance();
        assert_eq!(clock.now(), 3);
    }

    #[test]
    fn elapsed_is_relative_and_monotonic() {
        mock::install();

        let clock = TickClock::new();
        assert_eq!(clock.elapsed(clock.now()), 0);

        let since = clock.now();
        let mut last = 0;
        for _ in 0..5 {
            clock.advance();
            let e = clock.elapsed(since);
            assert!(e >= last);
            last = e;
        }
        assert_eq!(last, 5);
    }
}
