//! 外部协作者接口
//!
//! 协调器只依赖这两个边界，不关心具体传输方式。两者都在组合根注入，
//! 不通过任何全局查找获取，保证协调器可以脱离框架运行时做单元测试。

use async_trait::async_trait;

use crate::domain::model::{
    BookingDetail, BookingPage, BookingStatus, CreateBookingRequest, PageRequest, SessionIdentity,
    UserRole,
};
use crate::error::Result;

/// 预订网络服务接口（需要作为 trait 对象使用，保留 async-trait）
#[async_trait]
pub trait BookingService: Send + Sync {
    /// 按身份分页拉取预订列表
    async fn list_bookings(
        &self,
        user_id: &str,
        role: UserRole,
        page: PageRequest,
    ) -> Result<BookingPage>;

    /// 拉取单条预订详情
    async fn get_booking_by_id(&self, id: &str) -> Result<BookingDetail>;

    /// 创建预订，返回服务端权威记录
    async fn create_booking(&self, request: &CreateBookingRequest) -> Result<BookingDetail>;

    /// 变更预订状态，返回变更后的权威记录
    async fn update_booking_status(
        &self,
        id: &str,
        status: BookingStatus,
        reason: Option<&str>,
    ) -> Result<BookingDetail>;

    /// 删除预订
    async fn delete_booking(&self, id: &str) -> Result<()>;
}

/// 会话提供者：暴露当前登录身份
///
/// 返回 None 表示未登录，此时所有网络操作在发起调用前短路。
pub trait SessionProvider: Send + Sync {
    fn current_identity(&self) -> Option<SessionIdentity>;
}
