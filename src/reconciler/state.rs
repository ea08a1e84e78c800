//! 协调器内部状态与派生视图
//!
//! 原始集合、分页状态和过滤条件由协调器独占持有；
//! 过滤后的展示列表永远是 (原始集合, 过滤条件) 的纯函数结果，
//! 每次原始集合变更后必须重新计算，保证两者不会漂移。

use std::time::Duration;

use tokio::time::Instant;

use crate::domain::model::{
    BookingDetail, BookingFilters, BookingSortKey, BookingSummary, PaginationState, SortOrder,
};

/// 协调器持有的全部可变状态
#[derive(Debug, Default)]
pub(crate) struct ReconcilerState {
    /// 原始集合：每个 id 在任意时刻只有一份权威拷贝
    pub bookings: Vec<BookingSummary>,
    /// 派生的过滤视图，只能通过 `refresh_filtered` 重建
    pub filtered: Vec<BookingSummary>,
    pub filters: BookingFilters,
    pub pagination: PaginationState,
    /// 详情页缓存的选中记录
    pub selected: Option<BookingDetail>,
    /// 最近一条用户可见错误（最新覆盖旧的）
    pub last_error: Option<String>,
    pub loading: bool,
    /// 最近一次成功列表拉取的时间与页码，用于新鲜窗口判断
    pub last_loaded_at: Option<Instant>,
    pub loaded_page: Option<u32>,
}

impl ReconcilerState {
    /// 重建过滤视图
    pub fn refresh_filtered(&mut self) {
        self.filtered = filtered_view(&self.bookings, &self.filters);
    }

    /// 最近一次拉取是否仍在新鲜窗口内（且页码未变）
    pub fn is_fresh(&self, window: Duration, requested_page: Option<u32>) -> bool {
        let within_window = self
            .last_loaded_at
            .is_some_and(|at| at.elapsed() <= window);
        let same_page = match requested_page {
            Some(page) => self.loaded_page == Some(page),
            None => true,
        };
        within_window && same_page
    }

    /// 按 id 查找记录的克隆
    pub fn find_booking(&self, id: &str) -> Option<BookingSummary> {
        self.bookings.iter().find(|b| b.id == id).cloned()
    }

    /// 整体替换某条记录（不存在则忽略），随后重建视图
    pub fn replace_booking(&mut self, record: BookingSummary) {
        if let Some(slot) = self.bookings.iter_mut().find(|b| b.id == record.id) {
            *slot = record;
        }
        self.refresh_filtered();
    }
}

/// 过滤视图的纯函数实现：状态子集过滤 + 按键/方向排序
///
/// 对同一输入重复调用结果一致（幂等）。
pub fn filtered_view(bookings: &[BookingSummary], filters: &BookingFilters) -> Vec<BookingSummary> {
    let mut view: Vec<BookingSummary> = bookings
        .iter()
        .filter(|b| filters.statuses.is_empty() || filters.statuses.contains(&b.status))
        .cloned()
        .collect();

    view.sort_by(|a, b| {
        let ordering = match filters.sort_key {
            BookingSortKey::StartTime => a.start_time.cmp(&b.start_time),
            BookingSortKey::TotalPrice => a.total_price.total_cmp(&b.total_price),
            BookingSortKey::Status => a.status.sort_rank().cmp(&b.status.sort_rank()),
        };
        match filters.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });

    view
}

/// 对外暴露的只读快照，UI 层只能看到克隆的数据
#[derive(Clone, Debug)]
pub struct BookingSnapshot {
    pub bookings: Vec<BookingSummary>,
    pub filtered: Vec<BookingSummary>,
    pub filters: BookingFilters,
    pub pagination: PaginationState,
    pub selected: Option<BookingDetail>,
    pub last_error: Option<String>,
    pub loading: bool,
}

impl ReconcilerState {
    pub fn snapshot(&self) -> BookingSnapshot {
        BookingSnapshot {
            bookings: self.bookings.clone(),
            filtered: self.filtered.clone(),
            filters: self.filters.clone(),
            pagination: self.pagination.clone(),
            selected: self.selected.clone(),
            last_error: self.last_error.clone(),
            loading: self.loading,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::BookingStatus;
    use chrono::{TimeZone, Utc};

    fn summary(id: &str, status: BookingStatus, price: f64, day: u32) -> BookingSummary {
        BookingSummary {
            id: id.to_string(),
            pet_name: format!("pet-{id}"),
            sitter_name: format!("sitter-{id}"),
            start_time: Utc.with_ymd_and_hms(2026, 8, day, 9, 0, 0).unwrap(),
            status,
            total_price: price,
            pending_local: false,
        }
    }

    #[test]
    fn test_status_subset_filter() {
        let bookings = vec![
            summary("b1", BookingStatus::Pending, 10.0, 1),
            summary("b2", BookingStatus::Confirmed, 20.0, 2),
            summary("b3", BookingStatus::Cancelled, 30.0, 3),
        ];
        let filters = BookingFilters {
            statuses: vec![BookingStatus::Pending, BookingStatus::Confirmed],
            sort_key: BookingSortKey::StartTime,
            sort_order: SortOrder::Asc,
        };

        let view = filtered_view(&bookings, &filters);
        let ids: Vec<&str> = view.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b2"]);
    }

    #[test]
    fn test_empty_status_set_means_no_filter() {
        let bookings = vec![
            summary("b1", BookingStatus::Pending, 10.0, 1),
            summary("b2", BookingStatus::Cancelled, 20.0, 2),
        ];
        let view = filtered_view(&bookings, &BookingFilters::default());
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn test_sort_by_price_desc() {
        let bookings = vec![
            summary("cheap", BookingStatus::Pending, 5.0, 1),
            summary("mid", BookingStatus::Pending, 25.0, 2),
            summary("dear", BookingStatus::Pending, 50.0, 3),
        ];
        let filters = BookingFilters {
            statuses: Vec::new(),
            sort_key: BookingSortKey::TotalPrice,
            sort_order: SortOrder::Desc,
        };

        let view = filtered_view(&bookings, &filters);
        let ids: Vec<&str> = view.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["dear", "mid", "cheap"]);
    }

    #[test]
    fn test_filtered_view_is_idempotent() {
        let bookings = vec![
            summary("b1", BookingStatus::Confirmed, 12.0, 5),
            summary("b2", BookingStatus::Pending, 7.0, 2),
            summary("b3", BookingStatus::Completed, 40.0, 9),
        ];
        let filters = BookingFilters {
            statuses: vec![BookingStatus::Pending, BookingStatus::Confirmed],
            sort_key: BookingSortKey::StartTime,
            sort_order: SortOrder::Desc,
        };

        let once = filtered_view(&bookings, &filters);
        let twice = filtered_view(&once, &filters);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_refresh_filtered_tracks_raw_mutations() {
        let mut state = ReconcilerState::default();
        state.bookings = vec![summary("b1", BookingStatus::Pending, 10.0, 1)];
        state.refresh_filtered();
        assert_eq!(state.filtered.len(), 1);

        state.bookings.push(summary("b2", BookingStatus::Pending, 20.0, 2));
        state.refresh_filtered();
        assert_eq!(state.filtered.len(), 2);
    }
}
