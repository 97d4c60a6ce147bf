// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::domain::models::work_unit::WorkUnit;

#[derive(Default)]
struct QueueState {
    items: VecDeque<WorkUnit>,
    active: usize,
}

/// 共享工作队列
///
/// 处理中的单元可能再向队列追加单元，因此只有在队列为空且没有处理中的单元时才算耗尽
#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 入队单元
    pub fn push(&self, unit: WorkUnit) {
        self.state.lock().items.push_back(unit);
        self.notify.notify_waiters();
    }

    /// 批量入队
    pub fn extend(&self, units: impl IntoIterator<Item = WorkUnit>) {
        self.state.lock().items.extend(units);
        self.notify.notify_waiters();
    }

    /// 取下一个单元
    ///
    /// 队列暂时为空但仍有单元在处理时等待；队列耗尽或收到取消信号时返回 `None`。
    /// 取到的单元处理完后必须调用 [`WorkQueue::complete`]
    pub async fn next(&self, cancel: &CancellationToken) -> Option<WorkUnit> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(unit) = state.items.pop_front() {
                    state.active += 1;
                    return Some(unit);
                }
                if state.active == 0 {
                    drop(state);
                    self.notify.notify_waiters();
                    return None;
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// 标记一个已取出的单元处理结束
    pub fn complete(&self) {
        let drained = {
            let mut state = self.state.lock();
            state.active = state.active.saturating_sub(1);
            state.active == 0 && state.items.is_empty()
        };
        if drained {
            self.notify.notify_waiters();
        }
    }

    /// 排队中的单元数
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }
}
