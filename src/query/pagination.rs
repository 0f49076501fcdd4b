//! Offset pagination: clamped page size, 1-based pages, page meta for responses.

use serde::Serialize;

pub const MAX_PER_PAGE: u64 = 100;
pub const DEFAULT_PER_PAGE: u64 = 15;
/// Largest row offset a store accepts (PostgreSQL `OFFSET` is a bigint).
pub const MAX_OFFSET: u64 = i64::MAX as u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub per_page: u64,
}

impl PageRequest {
    /// `per_page` clamped to `[1, 100]`; missing, non-numeric, zero or negative → `default`.
    /// `page` defaults to 1, is never below 1, and never puts the offset past [`MAX_OFFSET`].
    pub fn from_params(per_page: Option<&str>, page: Option<&str>, default: u64) -> Self {
        let default = default.clamp(1, MAX_PER_PAGE);
        let per_page = per_page
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|n| *n > 0)
            .map(|n| (n as u64).min(MAX_PER_PAGE))
            .unwrap_or(default);
        let page = page
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|n| *n >= 1)
            .map(|n| n as u64)
            .unwrap_or(1)
            .min(MAX_OFFSET / per_page + 1);
        PageRequest { page, per_page }
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.per_page).min(MAX_OFFSET)
    }

    pub fn limit(&self) -> u64 {
        self.per_page
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    pub current_page: u64,
    pub from: Option<u64>,
    pub last_page: u64,
    pub per_page: u64,
    pub to: Option<u64>,
    pub total: u64,
}

impl PaginationMeta {
    /// Meta for a page that returned `count` items out of `total`.
    pub fn new(req: PageRequest, count: u64, total: u64) -> Self {
        let last_page = total.div_ceil(req.per_page).max(1);
        let (from, to) = if count == 0 {
            (None, None)
        } else {
            let from = req.offset() + 1;
            (Some(from), Some(from + count - 1))
        };
        PaginationMeta {
            current_page: req.page,
            from,
            last_page,
            per_page: req.per_page,
            to,
            total,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PaginationMeta,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, req: PageRequest) -> Self {
        let meta = PaginationMeta::new(req, items.len() as u64, total);
        Page { items, meta }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_page_is_clamped() {
        assert_eq!(PageRequest::from_params(Some("500"), None, 15).per_page, 100);
        assert_eq!(PageRequest::from_params(Some("0"), None, 15).per_page, 15);
        assert_eq!(PageRequest::from_params(Some("-3"), None, 15).per_page, 15);
        assert_eq!(PageRequest::from_params(Some("abc"), None, 20).per_page, 20);
        assert_eq!(PageRequest::from_params(None, None, 0).per_page, 1);
    }

    #[test]
    fn page_defaults_to_one() {
        assert_eq!(PageRequest::from_params(None, Some("0"), 15).page, 1);
        assert_eq!(PageRequest::from_params(None, Some("3"), 15).offset(), 30);
    }

    #[test]
    fn huge_page_keeps_offset_in_bigint_range() {
        let req = PageRequest::from_params(None, Some("9223372036854775807"), 15);
        assert!(req.offset() <= i64::MAX as u64);
        assert_eq!(req.offset() % 15, 0);
        let req = PageRequest::from_params(Some("100"), Some("9223372036854775807"), 15);
        assert!(req.offset() <= i64::MAX as u64);
        let raw = PageRequest { page: u64::MAX, per_page: 100 };
        assert_eq!(raw.offset(), MAX_OFFSET);
        let meta = PaginationMeta::new(req, 0, 3);
        assert_eq!((meta.from, meta.to, meta.last_page), (None, None, 1));
    }

    #[test]
    fn meta_for_partial_and_empty_pages() {
        let req = PageRequest { page: 2, per_page: 10 };
        let m = PaginationMeta::new(req, 5, 15);
        assert_eq!((m.from, m.to, m.last_page), (Some(11), Some(15), 2));
        let m = PaginationMeta::new(PageRequest { page: 1, per_page: 10 }, 0, 0);
        assert_eq!((m.from, m.to, m.last_page), (None, None, 1));
    }
}
