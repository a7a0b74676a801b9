//! 忙等延时
//!
//! 亚 tick 精度的延时以校准过的空转循环实现：不阻塞、不涉及
//! 调度器，关中断下也可以调用。注意关中断下跨越一个以上 tick
//! 边界的忙等会丢 tick，这是调用方自担的风险；中断开着时应改用
//! 对应的 sleep 变体。

use core::sync::atomic::{Ordering, compiler_fence};

use sync::arch_ops;

use crate::{TICKS_PER_SEC, TimerCore};

impl TimerCore {
    /// 注入校准结果：每个 tick 可空转的循环次数。
    ///
    /// 由外部校准流程在启动阶段调用一次。
    pub fn set_loops_per_tick(&self, loops: usize) {
        self.loops_per_tick.store(loops, Ordering::Relaxed);
        log::debug!("timer: {} loops per tick", loops);
    }

    /// 忙等约 `ms` 毫秒；无需开启中断。
    pub fn mdelay(&self, ms: i64) {
        self.real_time_delay(ms, 1000);
    }

    /// 忙等约 `us` 微秒；无需开启中断。
    pub fn udelay(&self, us: i64) {
        self.real_time_delay(us, 1000 * 1000);
    }

    /// 忙等约 `ns` 纳秒；无需开启中断。
    pub fn ndelay(&self, ns: i64) {
        self.real_time_delay(ns, 1000 * 1000 * 1000);
    }

    /// 睡眠约 num/denom 秒。
    ///
    /// 凑得够整 tick 就走睡眠队列让出 CPU，否则退化为忙等以获得
    /// 亚 tick 精度。两条路径都要求中断开启。
    pub(crate) fn real_time_sleep(&self, num: i64, denom: i64) {
        let ticks = ticks_from_duration(num, denom);
        assert!(
            arch_ops().interrupts_enabled(),
            "timer: blocking sleep requires interrupts enabled"
        );
        if ticks > 0 {
            self.sleep(ticks);
        } else {
            self.real_time_delay(num, denom);
        }
    }

    /// 忙等约 num/denom 秒。
    pub(crate) fn real_time_delay(&self, num: i64, denom: i64) {
        assert!(
            denom % 1000 == 0,
            "timer: delay denominator must be a multiple of 1000"
        );
        let loops_per_tick = self.loops_per_tick.load(Ordering::Relaxed);
        busy_wait(delay_loops(loops_per_tick, num, denom));
    }
}

/// num/denom 秒换算成 tick 数，向下取整。
///
/// ```text
///    (num / denom) s
/// ---------------------- = num * TICKS_PER_SEC / denom 个 tick
/// 1 s / TICKS_PER_SEC
/// ```
pub(crate) fn ticks_from_duration(num: i64, denom: i64) -> i64 {
    num * TICKS_PER_SEC / denom
}

/// 换算忙等循环数。分子分母各缩小 1000，避免乘法溢出。
pub(crate) fn delay_loops(loops_per_tick: usize, num: i64, denom: i64) -> i64 {
    loops_per_tick as i64 * num / 1000 * TICKS_PER_SEC / (denom / 1000)
}

/// 空转 `loops` 次。
///
/// 禁止内联：内联位置不同会改变循环体的代码对齐，使校准出的
/// 循环速率在不同调用点之间失真。
#[inline(never)]
pub(crate) fn busy_wait(mut loops: i64) {
    while loops > 0 {
        // 编译器屏障，阻止循环被整体删除
        compiler_fence(Ordering::SeqCst);
        loops -= 1;
    }
}
