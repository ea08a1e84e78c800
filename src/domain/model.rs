//! 预订领域模型
//!
//! 集合中的记录只能通过协调器的操作变更，UI 侧永远拿到克隆的快照。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 预订状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn from_str(status: &str) -> Option<Self> {
        match status {
            "PENDING" => Some(BookingStatus::Pending),
            "CONFIRMED" => Some(BookingStatus::Confirmed),
            "IN_PROGRESS" => Some(BookingStatus::InProgress),
            "COMPLETED" => Some(BookingStatus::Completed),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::InProgress => "IN_PROGRESS",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    /// 列表排序使用的生命周期顺序（PENDING 最前，CANCELLED 最后）
    pub fn sort_rank(&self) -> u8 {
        match self {
            BookingStatus::Pending => 0,
            BookingStatus::Confirmed => 1,
            BookingStatus::InProgress => 2,
            BookingStatus::Completed => 3,
            BookingStatus::Cancelled => 4,
        }
    }
}

/// 用户角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Owner,
    Sitter,
}

/// 当前登录身份（由 SessionProvider 提供，用于限定查询范围）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: String,
    pub role: UserRole,
}

/// 预订摘要（列表展示形态）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookingSummary {
    /// 服务端分配的 id；乐观占位记录使用本地生成的 `local-` 前缀 uuid
    pub id: String,
    pub pet_name: String,
    pub sitter_name: String,
    pub start_time: DateTime<Utc>,
    pub status: BookingStatus,
    pub total_price: f64,
    /// 瞬态标记：true 表示该记录尚未得到服务端确认
    #[serde(default)]
    pub pending_local: bool,
}

impl BookingSummary {
    /// 为乐观创建合成占位摘要
    ///
    /// id 使用本地 uuid，保证不会与服务端 id 冲突；
    /// 真实的宠物/帮溜员名称在服务端确认后随权威记录一并补齐。
    pub fn placeholder(request: &CreateBookingRequest) -> Self {
        Self {
            id: format!("local-{}", Uuid::new_v4()),
            pet_name: request.pet_id.clone(),
            sitter_name: request.sitter_id.clone(),
            start_time: request.start_time,
            status: BookingStatus::Pending,
            total_price: 0.0,
            pending_local: true,
        }
    }
}

/// 预订详情（详情页形态，摘要的超集）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookingDetail {
    pub id: String,
    pub owner_id: String,
    pub pet_id: String,
    pub pet_name: String,
    pub sitter_id: String,
    pub sitter_name: String,
    pub service_offering_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: BookingStatus,
    pub status_reason: Option<String>,
    pub notes: Option<String>,
    pub total_price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BookingDetail {
    /// 映射为列表摘要形态（服务端确认后整体替换本地记录）
    pub fn to_summary(&self) -> BookingSummary {
        BookingSummary {
            id: self.id.clone(),
            pet_name: self.pet_name.clone(),
            sitter_name: self.sitter_name.clone(),
            start_time: self.start_time,
            status: self.status,
            total_price: self.total_price,
            pending_local: false,
        }
    }
}

/// 创建预订请求
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub pet_id: String,
    pub sitter_id: String,
    pub service_offering_id: String,
    pub start_time: DateTime<Utc>,
    pub notes: Option<String>,
}

/// 列表排序键
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingSortKey {
    StartTime,
    TotalPrice,
    Status,
}

/// 排序方向
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// 列表过滤条件（纯视图状态，不触发网络请求）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookingFilters {
    /// 要展示的状态子集；空集合表示不过滤
    pub statuses: Vec<BookingStatus>,
    pub sort_key: BookingSortKey,
    pub sort_order: SortOrder,
}

impl Default for BookingFilters {
    fn default() -> Self {
        Self {
            statuses: Vec::new(),
            sort_key: BookingSortKey::StartTime,
            sort_order: SortOrder::Desc,
        }
    }
}

/// 分页请求
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    /// 1 起始页码
    pub page: u32,
    pub size: u32,
}

/// 分页状态（仅在列表拉取成功或显式翻页后变更）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaginationState {
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub total_elements: u64,
    pub has_next: bool,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 10,
            total_pages: 0,
            total_elements: 0,
            has_next: false,
        }
    }
}

impl PaginationState {
    pub fn from_page(page: &BookingPage, page_size: u32) -> Self {
        Self {
            page: page.page_number,
            page_size,
            total_pages: page.total_pages,
            total_elements: page.total_elements,
            has_next: !page.is_last_page,
        }
    }
}

/// 列表拉取结果
#[derive(Clone, Debug)]
pub struct BookingPage {
    pub content: Vec<BookingSummary>,
    pub total_elements: u64,
    pub total_pages: u32,
    /// 1 起始页码
    pub page_number: u32,
    pub is_last_page: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::InProgress,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
        ] {
            assert_eq!(BookingStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(BookingStatus::from_str("UNKNOWN"), None);
    }

    #[test]
    fn test_placeholder_is_tagged_and_local() {
        let request = CreateBookingRequest {
            pet_id: "pet-1".to_string(),
            sitter_id: "sitter-1".to_string(),
            service_offering_id: "offer-1".to_string(),
            start_time: Utc::now(),
            notes: None,
        };
        let placeholder = BookingSummary::placeholder(&request);
        assert!(placeholder.pending_local);
        assert!(placeholder.id.starts_with("local-"));
        assert_eq!(placeholder.status, BookingStatus::Pending);

        // 两次合成不会产生相同的本地 id
        let other = BookingSummary::placeholder(&request);
        assert_ne!(placeholder.id, other.id);
    }

    #[test]
    fn test_summary_serialization_uses_wire_names() {
        let summary = BookingSummary {
            id: "b1".to_string(),
            pet_name: "Momo".to_string(),
            sitter_name: "Alex".to_string(),
            start_time: Utc::now(),
            status: BookingStatus::InProgress,
            total_price: 42.5,
            pending_local: false,
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["status"], "IN_PROGRESS");
    }
}
