//! 回滚定时器登记表
//!
//! 不变量：任意时刻每个预订 id 至多武装一个回滚定时器。
//! 武装新定时器前必须先解除同 id 的旧定时器，防止过期回滚覆盖更新的乐观状态。
//!
//! 每次武装分配一个全局递增的代号（generation）。服务端响应和定时器触发
//! 都用代号与登记表比对：代号不匹配说明自己已经过期，不得再改动状态。

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::task::JoinHandle;

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub(crate) struct RollbackTimers {
    armed: DashMap<String, ArmedTimer>,
    /// 已触发回滚的定时器代号，供迟到的确认区分“超时”与“被取代”
    fired: DashMap<String, u64>,
    next_generation: AtomicU64,
}

impl RollbackTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// 分配下一个定时器代号
    pub fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// 武装定时器；同 id 的旧定时器（若有）先被中止
    pub fn arm(&self, id: &str, generation: u64, handle: JoinHandle<()>) {
        if let Some(previous) = self
            .armed
            .insert(id.to_string(), ArmedTimer { generation, handle })
        {
            previous.handle.abort();
        }
    }

    /// 解除定时器：仅当该 id 当前武装的正是 `generation` 时生效
    ///
    /// 服务端响应到达时调用；返回 false 表示定时器已先触发或已被更新的
    /// 操作取代，调用方不得再套用自己的结果。
    pub fn disarm(&self, id: &str, generation: u64) -> bool {
        match self.armed.remove_if(id, |_, timer| timer.generation == generation) {
            Some((_, timer)) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// 定时器触发时调用：仅当自己仍是当前代时才接管回滚
    ///
    /// 与 `disarm` 在同一个键上互斥，两者只有一方能摘下登记项。
    pub fn take_if_current(&self, id: &str, generation: u64) -> bool {
        if self
            .armed
            .remove_if(id, |_, timer| timer.generation == generation)
            .is_some()
        {
            self.fired.insert(id.to_string(), generation);
            true
        } else {
            false
        }
    }

    /// 迟到的响应查询并消费自己那一代的触发记录
    ///
    /// 返回 true 表示该代定时器确实触发过回滚；false 表示定时器是被
    /// 更新的操作取代的，并没有超时发生。
    pub fn consume_fired(&self, id: &str, generation: u64) -> bool {
        self.fired
            .remove_if(id, |_, fired| *fired == generation)
            .is_some()
    }

    /// 解除全部定时器（teardown 路径）
    pub fn disarm_all(&self) {
        let ids: Vec<String> = self.armed.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            if let Some((_, timer)) = self.armed.remove(&id) {
                timer.handle.abort();
            }
        }
        self.fired.clear();
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_arming_replaces_previous_timer_for_same_id() {
        let timers = RollbackTimers::new();

        let first = timers.next_generation();
        timers.arm("b1", first, tokio::spawn(async {}));
        let second = timers.next_generation();
        timers.arm("b1", second, tokio::spawn(async {}));

        assert_eq!(timers.armed_count(), 1);
        // 旧代号已经失效，新代号才能解除
        assert!(!timers.disarm("b1", first));
        assert!(timers.disarm("b1", second));
        assert_eq!(timers.armed_count(), 0);
    }

    #[tokio::test]
    async fn test_take_if_current_excludes_disarm() {
        let timers = RollbackTimers::new();
        let generation = timers.next_generation();
        timers.arm("b1", generation, tokio::spawn(async {}));

        assert!(timers.take_if_current("b1", generation));
        assert!(!timers.disarm("b1", generation));
    }

    #[tokio::test]
    async fn test_fired_record_distinguishes_timeout_from_supersession() {
        let timers = RollbackTimers::new();

        // 第一代被新的武装取代：没有触发记录
        let first = timers.next_generation();
        timers.arm("b1", first, tokio::spawn(async {}));
        let second = timers.next_generation();
        timers.arm("b1", second, tokio::spawn(async {}));
        assert!(!timers.consume_fired("b1", first));

        // 第二代触发回滚：触发记录只能被本代消费一次
        assert!(timers.take_if_current("b1", second));
        assert!(!timers.consume_fired("b1", first));
        assert!(timers.consume_fired("b1", second));
        assert!(!timers.consume_fired("b1", second));
    }

    #[tokio::test]
    async fn test_disarm_all_clears_every_entry() {
        let timers = RollbackTimers::new();
        for id in ["b1", "b2", "b3"] {
            let generation = timers.next_generation();
            timers.arm(id, generation, tokio::spawn(async {}));
        }
        assert_eq!(timers.armed_count(), 3);

        timers.disarm_all();
        assert_eq!(timers.armed_count(), 0);
        assert!(!timers.disarm("b2", 0));
    }
}
