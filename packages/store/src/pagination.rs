// ABOUTME: Query parameters and response wrapper for paginated listings

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// 1-indexed page selection as it arrives on the query string.
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl PaginationParams {
    /// Normalize to a SQL-ready (limit, offset) pair. Out-of-range values
    /// are clamped, not rejected.
    pub fn validate(&self) -> (i64, i64) {
        let page = self.page.max(1);
        let limit = self.limit.clamp(1, MAX_PAGE_SIZE);
        (limit, (page - 1) * limit)
    }

    pub fn page(&self) -> i64 {
        self.page.max(1)
    }
}

/// One page of results plus enough context to render a pager.
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: i64,
    #[serde(rename = "pageSize")]
    pub page_size: i64,
    pub total: i64,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, params: &PaginationParams, total: i64) -> Self {
        let (page_size, _) = params.validate();
        Self {
            items,
            page: params.page(),
            page_size,
            total,
            total_pages: (total + page_size - 1) / page_size,
        }
    }
}
