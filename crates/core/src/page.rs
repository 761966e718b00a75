//! Pagination primitives for the paged read operations.

use serde::{Deserialize, Serialize};

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    /// Page numbers below 1 and sizes below 1 are clamped to 1.
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page: page.max(1),
            size: size.max(1),
        }
    }

    pub fn offset(&self) -> usize {
        ((self.page - 1) as usize) * (self.size as usize)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, size: 10 }
    }
}

/// One chunk of a paged result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub total_results: u64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total_results: u64) -> Self {
        // The fields of `PageRequest` are public, so a zero size can
        // arrive without passing through the clamping constructor.
        let size = (request.size as u64).max(1);
        let total_pages = if total_results % size == 0 {
            total_results / size
        } else {
            total_results / size + 1
        };
        Self {
            items,
            page: request.page,
            total_results,
            total_pages: total_pages as u32,
        }
    }

    pub fn empty(request: PageRequest) -> Self {
        Self {
            items: Vec::new(),
            page: request.page,
            total_results: 0,
            total_pages: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        let page = Page::new(vec![1, 2, 3], PageRequest::new(1, 2), 3);
        assert_eq!(page.total_pages, 2);

        let page = Page::new(vec![1, 2, 3, 4], PageRequest::new(1, 2), 4);
        assert_eq!(page.total_pages, 2);
    }

    #[test]
    fn offset_is_zero_based() {
        assert_eq!(PageRequest::new(1, 10).offset(), 0);
        assert_eq!(PageRequest::new(3, 10).offset(), 20);
    }

    #[test]
    fn page_and_size_are_clamped() {
        let request = PageRequest::new(0, 0);
        assert_eq!(request.page, 1);
        assert_eq!(request.size, 1);
    }

    #[test]
    fn zero_size_request_does_not_panic() {
        let request = PageRequest { page: 1, size: 0 };
        let page = Page::new(vec![1, 2, 3], request, 3);
        assert_eq!(page.total_pages, 3);
    }
}
