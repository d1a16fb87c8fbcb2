//! Page-based pagination carried in request context

use serde::{Deserialize, Serialize};

fn default_page() -> u64 {
    1
}

fn default_page_size() -> u64 {
    20
}

/// One-based page number plus page size, as received from a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Page number, starting at 1 (default: 1)
    #[serde(default = "default_page")]
    pub page: u64,
    /// Rows per page (default: 20)
    #[serde(default = "default_page_size")]
    pub page_size: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

impl Pagination {
    pub fn new(page: u64, page_size: u64) -> Self {
        Self { page, page_size }
    }

    /// Rows to skip; page 0 is treated as page 1
    pub fn offset(&self) -> u64 {
        self.page.max(1).saturating_sub(1).saturating_mul(self.limit())
    }

    /// Rows to return, at least 1
    ///
    /// A limit of 0 means "no LIMIT" to the query builder, so a page size
    /// of 0 is read as 1.
    pub fn limit(&self) -> u64 {
        self.page_size.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = Pagination::default();
        assert_eq!(p.page, 1);
        assert_eq!(p.page_size, 20);
        assert_eq!(p.offset(), 0);
        assert_eq!(p.limit(), 20);
    }

    #[test]
    fn test_offset_for_later_pages() {
        let p = Pagination::new(3, 25);
        assert_eq!(p.offset(), 50);
        assert_eq!(p.limit(), 25);
    }

    #[test]
    fn test_page_zero_is_first_page() {
        assert_eq!(Pagination::new(0, 10).offset(), 0);
    }

    #[test]
    fn test_zero_page_size_still_limits() {
        let p = Pagination::new(3, 0);
        assert_eq!(p.limit(), 1);
        assert_eq!(p.offset(), 2);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let p: Pagination = serde_json::from_str(r#"{"page": 4}"#).unwrap();
        assert_eq!(p, Pagination::new(4, 20));

        let p: Pagination = serde_json::from_str("{}").unwrap();
        assert_eq!(p, Pagination::default());
    }
}
