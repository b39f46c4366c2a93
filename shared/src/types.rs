//! Common types used across the service

use serde::{Deserialize, Serialize};

pub const DEFAULT_PER_PAGE: u32 = 25;
pub const MIN_PER_PAGE: u32 = 5;
pub const MAX_PER_PAGE: u32 = 200;

/// Pagination parameters, always clamped into range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl Pagination {
    /// Build from raw request values; missing or out-of-range values are clamped
    pub fn from_raw(page: Option<i64>, per_page: Option<i64>) -> Self {
        let page = page.unwrap_or(1).max(1).min(u32::MAX as i64) as u32;
        let per_page = per_page
            .unwrap_or(DEFAULT_PER_PAGE as i64)
            .clamp(MIN_PER_PAGE as i64, MAX_PER_PAGE as i64) as u32;
        Self { page, per_page }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// One page of rows plus the unpaged total
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = Pagination::from_raw(None, None);
        assert_eq!(p, Pagination::default());
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_clamping() {
        let p = Pagination::from_raw(Some(0), Some(1));
        assert_eq!(p.page, 1);
        assert_eq!(p.per_page, MIN_PER_PAGE);

        let p = Pagination::from_raw(Some(3), Some(10_000));
        assert_eq!(p.per_page, MAX_PER_PAGE);
        assert_eq!(p.offset(), 400);
    }
}
