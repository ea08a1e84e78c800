//! 预订核心错误类型
//!
//! - 所有协调器操作统一返回 `Result<T, BookingError>`
//! - 每个失败路径都有对应的补偿动作（移除占位记录、恢复原始记录），
//!   错误本身只承载面向用户的描述信息

use thiserror::Error;

/// 预订核心统一 Result 类型
pub type Result<T> = std::result::Result<T, BookingError>;

/// 预订协调器错误
#[derive(Debug, Clone, Error)]
pub enum BookingError {
    /// 前置条件失败：当前没有已登录身份，操作在任何网络调用之前短路
    #[error("no active session, sign in before accessing bookings")]
    NoActiveSession,

    /// 本地集合中不存在该预订（同步抛出，不发起网络调用）
    #[error("booking {id} not found in local collection")]
    BookingNotFound { id: String },

    /// 远端预订服务调用失败（乐观变更已回滚，可安全重试）
    #[error("booking service error: {0}")]
    Service(String),

    /// 乐观状态更新在服务端确认之前超时，已回滚到原始状态
    #[error("update timed out for booking {id}")]
    UpdateTimedOut { id: String },

    /// 确认到达时该预订已被更新的变更接管，本次结果被丢弃
    #[error("update for booking {id} was superseded by a newer change")]
    UpdateSuperseded { id: String },
}

impl BookingError {
    /// 记录到状态中的用户可见信息（最新一条覆盖旧的，无错误队列）
    pub fn user_message(&self) -> String {
        self.to_string()
    }

    /// 该错误对应的操作是否可以安全重试
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            BookingError::Service(_) | BookingError::UpdateTimedOut { .. }
        )
    }
}
