//! 延迟唤醒线程
//!
//! 中断处理函数不能获取睡眠队列的保护信号量，也不能对任意线程
//! 调用通用的 unblock（调度器的共享结构可能正被被打断的线程改到
//! 一半），所以真正的出队与唤醒由这个专职线程在线程上下文完成。
//!
//! 状态机只有两个状态：
//!
//! - **排空**：逐个弹出到期条目并唤醒其属主；弹到未到期条目
//!   （已放回队首）或队列为空时转入空闲。启动握手完成后的初始
//!   状态是排空。
//! - **空闲**：关中断下阻塞自己，等待时钟中断（或其它来源）的
//!   非阻塞点醒，醒来回到排空。

use sync::{IntrGuard, thread_ops};

use crate::{TimerCore, registered_core};

/// worker 线程入口，由 [`TimerCore::init`] 通过 `ThreadOps::spawn` 启动。
pub(crate) fn entry() {
    run(registered_core())
}

fn run(core: &'static TimerCore) -> ! {
    core.publish_worker(thread_ops().current());
    loop {
        // 排空：到期条目全部唤醒
        while let Some(entry) = core.queue().try_pop_due(core.now()) {
            thread_ops().unblock(entry.owner);
        }
        // 空闲：等待下一次点醒
        let _intr = IntrGuard::new();
        // SAFETY: 中断已禁用；时钟中断的 try_unblock 负责唤醒
        unsafe { thread_ops().block_current() };
    }
}
