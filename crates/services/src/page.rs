use serde::Serialize;

pub const MAX_PAGE_SIZE: usize = 100;
pub const MAX_PAGE: usize = 1_000_000;

/// 1-based pagination input as sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
}

impl PageRequest {
    /// Fills in defaults and clamps into `1..=MAX_PAGE` and
    /// `1..=MAX_PAGE_SIZE`.
    pub fn new(page: Option<usize>, page_size: Option<usize>, default_size: usize) -> Self {
        Self {
            page: page.unwrap_or(1).clamp(1, MAX_PAGE),
            page_size: page_size.unwrap_or(default_size).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn skip(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }

    /// Slices an already-filtered list.
    pub fn slice<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len();
        let has_more = self.skip().saturating_add(self.page_size) < total;
        let data = items.into_iter().skip(self.skip()).take(self.page_size).collect();
        Page { data, total, page: self.page, page_size: self.page_size, has_more }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        let req = PageRequest::new(None, None, 20);
        assert_eq!((req.page, req.page_size), (1, 20));
        let req = PageRequest::new(Some(0), Some(10_000), 20);
        assert_eq!((req.page, req.page_size), (1, MAX_PAGE_SIZE));
    }

    #[test]
    fn slice_reports_total() {
        let page = PageRequest::new(Some(2), Some(2), 20).slice((1..=5).collect());
        assert_eq!(page.data, vec![3, 4]);
        assert_eq!(page.total, 5);
        assert!(page.has_more);
        assert!(!PageRequest::new(Some(3), Some(2), 20).slice((1..=5).collect::<Vec<_>>()).has_more);
    }

    #[test]
    fn huge_page_numbers_are_capped() {
        let req = PageRequest::new(Some(usize::MAX), Some(50), 50);
        assert_eq!(req.page, MAX_PAGE);
        assert_eq!(req.skip(), (MAX_PAGE - 1) * 50);

        let page = req.slice(vec![1, 2, 3]);
        assert!(page.data.is_empty());
        assert!(!page.has_more);

        let raw = PageRequest { page: usize::MAX, page_size: MAX_PAGE_SIZE };
        assert_eq!(raw.skip(), usize::MAX);
    }
}
