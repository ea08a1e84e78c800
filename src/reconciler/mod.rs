//! 乐观预订协调器
//!
//! 持有当前登录用户的预订集合，在服务端确认之前先套用本地乐观变更，
//! 并在失败或超时的时候回滚，保证 UI 状态不会与服务端永久分叉。
//!
//! 核心保证：
//! - 每个 id 任意时刻只有一份权威记录，占位记录整体替换、从不合并
//! - 每个 id 至多武装一个回滚定时器
//! - 所有失败路径都有补偿动作，集合不会停留在不一致状态
//! - 本地定时器（回滚、自动刷新）全部可取消，`cleanup` 后不再触发

mod state;
mod timers;


use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval, sleep};
use tracing::{debug, info, warn};

use crate::config::ReconcilerConfig;
use crate::domain::model::{
    BookingDetail, BookingFilters, BookingStatus, BookingSummary, CreateBookingRequest,
    PageRequest, PaginationState, SessionIdentity,
};
use crate::domain::repository::{BookingService, SessionProvider};
use crate::error::{BookingError, Result};

pub use state::BookingSnapshot;
use state::ReconcilerState;
use timers::RollbackTimers;

/// `load` 的可选参数
#[derive(Clone, Copy, Debug, Default)]
pub struct LoadOptions {
    /// 目标页码（1 起始）；None 表示沿用当前页
    pub page: Option<u32>,
    /// 跳过新鲜窗口检查，强制发起网络调用
    pub skip_cache: bool,
    /// 静默模式：不设置 loading 标记（自动刷新使用）
    pub silent: bool,
}

/// 乐观预订协调器
///
/// 由应用的组合根创建并持有，两个外部协作者在构造时注入。
/// 视图层只通过快照读取状态，所有变更都经由本类型的操作方法。
pub struct BookingReconciler {
    inner: Arc<ReconcilerInner>,
}

struct ReconcilerInner {
    service: Arc<dyn BookingService>,
    session: Arc<dyn SessionProvider>,
    config: ReconcilerConfig,
    state: RwLock<ReconcilerState>,
    rollback_timers: RollbackTimers,
    refresh_task: StdMutex<Option<JoinHandle<()>>>,
}

impl BookingReconciler {
    pub fn new(
        service: Arc<dyn BookingService>,
        session: Arc<dyn SessionProvider>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ReconcilerInner {
                service,
                session,
                config,
                state: RwLock::new(ReconcilerState::default()),
                rollback_timers: RollbackTimers::new(),
                refresh_task: StdMutex::new(None),
            }),
        }
    }

    /// 拉取当前页的预订列表
    ///
    /// 新鲜窗口内的重复调用直接使用缓存（除非 `skip_cache`）；
    /// 失败时保留旧数据，只记录错误。
    pub async fn load(&self, options: LoadOptions) -> Result<()> {
        self.inner.load(options).await
    }

    /// 创建预订
    ///
    /// 乐观模式下先在列表头部插入占位记录，网络调用结束后以权威记录
    /// 替换或移除占位；占位记录的生命周期不会超过网络调用本身。
    /// 失败会向调用方传播，便于表单层做针对性处理。
    pub async fn create(
        &self,
        request: CreateBookingRequest,
        optimistic: bool,
    ) -> Result<BookingDetail> {
        self.inner.create(request, optimistic).await
    }

    /// 变更预订状态
    ///
    /// 乐观模式下立即套用新状态并武装回滚定时器；服务端确认先到则
    /// 解除定时器并以权威记录替换，定时器先触发则恢复原始记录。
    pub async fn update_status(
        &self,
        id: &str,
        status: BookingStatus,
        reason: Option<&str>,
        optimistic: bool,
    ) -> Result<()> {
        ReconcilerInner::update_status(&self.inner, id, status, reason, optimistic).await
    }

    /// 删除预订
    ///
    /// 乐观模式先移除，失败时以追加方式恢复原始记录（不保证原位置）。
    pub async fn delete_by_id(&self, id: &str, optimistic: bool) -> Result<()> {
        self.inner.delete_by_id(id, optimistic).await
    }

    /// 拉取并缓存单条预订详情；传 None 清除选中
    pub async fn select_booking(&self, id: Option<&str>) -> Result<Option<BookingDetail>> {
        self.inner.select_booking(id).await
    }

    /// 替换过滤条件并重建过滤视图
    pub async fn set_filters(&self, filters: BookingFilters) {
        let mut state = self.inner.state.write().await;
        state.filters = filters;
        state.refresh_filtered();
    }

    /// 以当前过滤条件重建过滤视图（幂等）
    pub async fn apply_filters(&self) {
        self.inner.state.write().await.refresh_filtered();
    }

    /// 启动周期性静默刷新（幂等，重复调用不会产生重复定时器）
    pub fn start_auto_refresh(&self) {
        ReconcilerInner::start_auto_refresh(&self.inner);
    }

    /// 停止周期性静默刷新
    pub fn stop_auto_refresh(&self) {
        self.inner.stop_auto_refresh();
    }

    /// 释放协调器持有的全部定时器，teardown 后不再有任何定时器触发
    pub fn cleanup(&self) {
        self.inner.cleanup();
    }

    /// 全量只读快照
    pub async fn snapshot(&self) -> BookingSnapshot {
        self.inner.state.read().await.snapshot()
    }

    /// 原始集合快照
    pub async fn bookings(&self) -> Vec<BookingSummary> {
        self.inner.state.read().await.bookings.clone()
    }

    /// 过滤视图快照
    pub async fn filtered_bookings(&self) -> Vec<BookingSummary> {
        self.inner.state.read().await.filtered.clone()
    }

    pub async fn pagination(&self) -> PaginationState {
        self.inner.state.read().await.pagination.clone()
    }

    pub async fn selected(&self) -> Option<BookingDetail> {
        self.inner.state.read().await.selected.clone()
    }

    pub async fn last_error(&self) -> Option<String> {
        self.inner.state.read().await.last_error.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.inner.state.read().await.loading
    }

    /// 当前武装中的回滚定时器数量
    pub fn armed_rollback_timers(&self) -> usize {
        self.inner.rollback_timers.armed_count()
    }

    /// 自动刷新是否在运行
    pub fn is_auto_refresh_running(&self) -> bool {
        self.inner
            .refresh_guard()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl ReconcilerInner {
    /// 校验登录身份；缺失时记录错误并短路，不发起任何网络调用
    async fn require_identity(&self) -> Result<SessionIdentity> {
        match self.session.current_identity() {
            Some(identity) => Ok(identity),
            None => {
                let err = BookingError::NoActiveSession;
                self.state.write().await.last_error = Some(err.user_message());
                Err(err)
            }
        }
    }

    async fn load(&self, options: LoadOptions) -> Result<()> {
        let identity = self.require_identity().await?;

        {
            let state = self.state.read().await;
            if !options.skip_cache && state.is_fresh(self.config.freshness_window(), options.page) {
                debug!("booking list still fresh, serving cached collection");
                return Ok(());
            }
        }

        let page_number = match options.page {
            Some(page) => page,
            None => self.state.read().await.pagination.page,
        };

        if !options.silent {
            self.state.write().await.loading = true;
        }

        let request = PageRequest {
            page: page_number,
            size: self.config.page_size,
        };
        let result = self
            .service
            .list_bookings(&identity.user_id, identity.role, request)
            .await;

        let mut state = self.state.write().await;
        state.loading = false;
        match result {
            Ok(page) => {
                state.pagination = PaginationState::from_page(&page, self.config.page_size);
                state.bookings = page.content;
                state.last_loaded_at = Some(Instant::now());
                state.loaded_page = Some(page_number);
                state.last_error = None;
                state.refresh_filtered();
                info!(
                    count = state.bookings.len(),
                    page = page_number,
                    "booking list loaded"
                );
                Ok(())
            }
            Err(err) => {
                // 拉取失败保留旧数据（stale-but-available）
                state.last_error = Some(err.user_message());
                warn!(error = %err, "failed to load bookings");
                Err(err)
            }
        }
    }

    async fn create(
        &self,
        request: CreateBookingRequest,
        optimistic: bool,
    ) -> Result<BookingDetail> {
        self.require_identity().await?;

        let placeholder_id = if optimistic {
            let placeholder = BookingSummary::placeholder(&request);
            let id = placeholder.id.clone();
            let mut state = self.state.write().await;
            state.bookings.insert(0, placeholder);
            state.refresh_filtered();
            Some(id)
        } else {
            None
        };

        match self.service.create_booking(&request).await {
            Ok(detail) => {
                let mut state = self.state.write().await;
                if let Some(placeholder_id) = &placeholder_id {
                    state.bookings.retain(|b| b.id != *placeholder_id);
                }
                // 静默刷新可能已在确认到达前拉回同 id 的记录，先去重再插入
                state.bookings.retain(|b| b.id != detail.id);
                state.bookings.insert(0, detail.to_summary());
                state.refresh_filtered();
                info!(id = %detail.id, "booking created");
                Ok(detail)
            }
            Err(err) => {
                let mut state = self.state.write().await;
                if let Some(placeholder_id) = &placeholder_id {
                    state.bookings.retain(|b| b.id != *placeholder_id);
                    state.refresh_filtered();
                }
                state.last_error = Some(err.user_message());
                warn!(error = %err, "failed to create booking");
                Err(err)
            }
        }
    }

    async fn update_status(
        inner: &Arc<ReconcilerInner>,
        id: &str,
        new_status: BookingStatus,
        reason: Option<&str>,
        optimistic: bool,
    ) -> Result<()> {
        inner.require_identity().await?;

        let original = inner.state.read().await.find_booking(id);
        let Some(original) = original else {
            let err = BookingError::BookingNotFound { id: id.to_string() };
            inner.state.write().await.last_error = Some(err.user_message());
            return Err(err);
        };

        let generation = if optimistic {
            {
                let mut state = inner.state.write().await;
                if let Some(slot) = state.bookings.iter_mut().find(|b| b.id == id) {
                    slot.status = new_status;
                }
                state.refresh_filtered();
            }
            Some(Self::arm_rollback(inner, id, original.clone()))
        } else {
            None
        };

        let result = inner
            .service
            .update_booking_status(id, new_status, reason)
            .await;

        match result {
            Ok(detail) => {
                if let Some(generation) = generation {
                    if !inner.rollback_timers.disarm(id, generation) {
                        if inner.rollback_timers.consume_fired(id, generation) {
                            // 定时器先一步触发并回滚，错误已由定时器记录
                            debug!(%id, "confirmation arrived after rollback timeout, ignoring");
                            return Err(BookingError::UpdateTimedOut { id: id.to_string() });
                        }
                        // 更新的乐观操作已接管该记录，本次确认视为过期响应
                        let err = BookingError::UpdateSuperseded { id: id.to_string() };
                        inner.state.write().await.last_error = Some(err.user_message());
                        debug!(%id, "confirmation superseded by a newer update, ignoring");
                        return Err(err);
                    }
                }
                let mut state = inner.state.write().await;
                state.replace_booking(detail.to_summary());
                info!(%id, status = new_status.as_str(), "booking status updated");
                Ok(())
            }
            Err(err) => {
                if let Some(generation) = generation {
                    if inner.rollback_timers.disarm(id, generation) {
                        inner.state.write().await.replace_booking(original);
                    } else {
                        // 定时器已触发或被取代，只需清掉残留的触发记录
                        inner.rollback_timers.consume_fired(id, generation);
                    }
                }
                inner.state.write().await.last_error = Some(err.user_message());
                warn!(%id, error = %err, "failed to update booking status");
                Err(err)
            }
        }
    }

    /// 武装回滚定时器，返回本次武装的代号
    ///
    /// `arm` 内部会先中止同 id 的旧定时器，维持每个 id 至多一个的不变量。
    /// 定时器任务只持有弱引用，协调器销毁后触发即为空操作。
    fn arm_rollback(inner: &Arc<ReconcilerInner>, id: &str, original: BookingSummary) -> u64 {
        let generation = inner.rollback_timers.next_generation();
        let weak = Arc::downgrade(inner);
        let timeout = inner.config.rollback_timeout();
        let booking_id = id.to_string();

        let handle = tokio::spawn(async move {
            sleep(timeout).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            // 过期定时器（已被解除或取代）不允许改动状态
            if inner.rollback_timers.take_if_current(&booking_id, generation) {
                warn!(id = %booking_id, "optimistic update timed out, rolling back");
                let err = BookingError::UpdateTimedOut {
                    id: booking_id.clone(),
                };
                let mut state = inner.state.write().await;
                state.replace_booking(original);
                state.last_error = Some(err.user_message());
            }
        });

        inner.rollback_timers.arm(id, generation, handle);
        generation
    }

    async fn delete_by_id(&self, id: &str, optimistic: bool) -> Result<()> {
        self.require_identity().await?;

        let original = self.state.read().await.find_booking(id);
        let Some(original) = original else {
            let err = BookingError::BookingNotFound { id: id.to_string() };
            self.state.write().await.last_error = Some(err.user_message());
            return Err(err);
        };

        if optimistic {
            let mut state = self.state.write().await;
            state.bookings.retain(|b| b.id != id);
            state.refresh_filtered();
        }

        match self.service.delete_booking(id).await {
            Ok(()) => {
                let mut state = self.state.write().await;
                if !optimistic {
                    state.bookings.retain(|b| b.id != id);
                }
                if state.selected.as_ref().is_some_and(|d| d.id == id) {
                    state.selected = None;
                }
                state.refresh_filtered();
                info!(%id, "booking deleted");
                Ok(())
            }
            Err(err) => {
                let mut state = self.state.write().await;
                if optimistic {
                    // 恢复策略是追加，不保证原来的相对位置；
                    // 静默刷新已拉回该记录时不再重复插入
                    if state.bookings.iter().all(|b| b.id != id) {
                        state.bookings.push(original);
                    }
                    state.refresh_filtered();
                }
                state.last_error = Some(err.user_message());
                warn!(%id, error = %err, "failed to delete booking");
                Err(err)
            }
        }
    }

    async fn select_booking(&self, id: Option<&str>) -> Result<Option<BookingDetail>> {
        let Some(id) = id else {
            self.state.write().await.selected = None;
            return Ok(None);
        };

        self.require_identity().await?;

        match self.service.get_booking_by_id(id).await {
            Ok(detail) => {
                self.state.write().await.selected = Some(detail.clone());
                Ok(Some(detail))
            }
            Err(err) => {
                // 详情拉取失败不触碰列表
                self.state.write().await.last_error = Some(err.user_message());
                warn!(%id, error = %err, "failed to load booking detail");
                Err(err)
            }
        }
    }

    fn start_auto_refresh(inner: &Arc<ReconcilerInner>) {
        let mut guard = inner.refresh_guard();
        if guard.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("auto refresh already running, ignoring duplicate start");
            return;
        }

        let weak = Arc::downgrade(inner);
        let period = inner.config.auto_refresh_interval();
        *guard = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            // interval 的首个 tick 立即完成，跳过以免启动时重复拉取
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let options = LoadOptions {
                    page: None,
                    skip_cache: true,
                    silent: true,
                };
                if let Err(err) = inner.load(options).await {
                    debug!(error = %err, "silent refresh failed");
                }
            }
        }));
        info!(period_ms = period.as_millis() as u64, "auto refresh started");
    }

    fn stop_auto_refresh(&self) {
        let handle = self.refresh_guard().take();
        if let Some(handle) = handle {
            handle.abort();
            info!("auto refresh stopped");
        }
    }

    fn cleanup(&self) {
        self.stop_auto_refresh();
        self.rollback_timers.disarm_all();
    }

    fn refresh_guard(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.refresh_task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
