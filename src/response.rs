use axum::{response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message),
        }
    }
}

/// `ceil(total / per_page)`, zero when `per_page` is zero.
pub fn page_count(total: u64, per_page: u64) -> u64 {
    if per_page == 0 {
        0
    } else {
        total.div_ceil(per_page)
    }
}

/// Clamps a 1-based page so its row offset still fits a signed 64-bit SQL
/// offset. Page 0 is treated as page 1.
pub fn clamp_page(page: u64, per_page: u64) -> u64 {
    let last = (i64::MAX as u64) / per_page.max(1);
    page.clamp(1, last.max(1))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T: Serialize> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

impl<T: Serialize> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, per_page: u64) -> Self {
        Self {
            items,
            total,
            page,
            per_page,
            total_pages: page_count(total, per_page),
        }
    }

    pub fn map<U: Serialize>(self, f: impl FnMut(T) -> U) -> PaginatedResponse<U> {
        PaginatedResponse {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
            total_pages: self.total_pages,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaginationQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_count_with_remainder() {
        assert_eq!(page_count(25, 20), 2);
        assert_eq!(page_count(101, 20), 6);
    }

    #[test]
    fn page_count_exact_division() {
        assert_eq!(page_count(60, 20), 3);
    }

    #[test]
    fn page_count_edges() {
        assert_eq!(page_count(10, 0), 0);
        assert_eq!(page_count(0, 20), 0);
        assert_eq!(page_count(1, 20), 1);
    }

    #[test]
    fn pages_are_clamped_to_a_representable_offset() {
        assert_eq!(clamp_page(0, 20), 1);
        assert_eq!(clamp_page(3, 20), 3);

        let last = clamp_page(u64::MAX, 20);
        assert_eq!(last, i64::MAX as u64 / 20);
        assert!((last - 1).checked_mul(20).is_some_and(|o| o <= i64::MAX as u64));
    }

    #[test]
    fn map_keeps_pagination() {
        let resp = PaginatedResponse::new(vec![1, 2], 25, 2, 20).map(|n| n * 10);
        assert_eq!(resp.items, vec![10, 20]);
        assert_eq!(resp.total_pages, 2);
        assert_eq!(resp.page, 2);
    }
}
