use serde::Serialize;
use utoipa::ToSchema;

/// Uniform success envelope wrapping every request/response payload.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Always `true`; error responses carry `false` with a message instead.
    pub success: bool,
    /// Operation payload.
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Wrap a payload in the success envelope.
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Pagination metadata derived from a total count and the requested window.
#[derive(Debug, Serialize, ToSchema, Clone, PartialEq, Eq)]
pub struct Pagination {
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
    pub current_page: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl Pagination {
    /// Compute page numbers from a count/limit/offset triple.
    pub fn new(total: u64, limit: u64, offset: u64) -> Self {
        let limit = limit.max(1);
        let total_pages = total.div_ceil(limit);
        let current_page = offset / limit + 1;
        Self {
            total,
            limit,
            offset,
            current_page,
            total_pages,
            has_next: offset + limit < total,
            has_previous: offset > 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_window_math() {
        let page = Pagination::new(25, 10, 10);
        assert_eq!(page.current_page, 2);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next);
        assert!(page.has_previous);
    }

    #[test]
    fn empty_population_has_no_pages() {
        let page = Pagination::new(0, 10, 0);
        assert_eq!(page.total_pages, 0);
        assert!(!page.has_next);
        assert!(!page.has_previous);
    }
}
