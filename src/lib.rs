//! PawLink 预订核心库
//!
//! 为宠物托管市场客户端提供乐观预订协调器：本地集合的乐观变更、
//! 失败/超时回滚，以及与服务端权威状态的对账

pub mod config;
pub mod domain;
pub mod error;
pub mod reconciler;
pub mod tracing;

pub use config::{BookingCoreConfig, LoggingConfig, ReconcilerConfig, load_config};
pub use domain::model::{
    BookingDetail, BookingFilters, BookingPage, BookingSortKey, BookingStatus, BookingSummary,
    CreateBookingRequest, PageRequest, PaginationState, SessionIdentity, SortOrder, UserRole,
};
pub use domain::repository::{BookingService, SessionProvider};
pub use error::{BookingError, Result};
pub use reconciler::{BookingReconciler, BookingSnapshot, LoadOptions};
