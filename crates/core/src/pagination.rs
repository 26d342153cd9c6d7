use crate::models::HitCount;

/// `ceil(total_hits / page_size)`, never less than one page.
pub fn total_pages(total_hits: u64, page_size: u32) -> u32 {
    let page_size = u64::from(page_size.max(1));
    let pages = total_hits.div_ceil(page_size).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    page: u32,
    page_size: u32,
    total_hits: HitCount,
}

impl Pagination {
    pub fn new(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            total_hits: HitCount::Exact(0),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn total_hits(&self) -> HitCount {
        self.total_hits
    }

    pub fn total_pages(&self) -> u32 {
        total_pages(self.total_hits.value(), self.page_size)
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    /// Moves to `page`, clamped to `[1, total_pages]`. Returns whether the
    /// page changed.
    pub fn go_to(&mut self, page: u32) -> bool {
        let target = page.clamp(1, self.total_pages());
        let changed = target != self.page;
        self.page = target;
        changed
    }

    pub fn next(&mut self) -> bool {
        self.go_to(self.page.saturating_add(1))
    }

    pub fn prev(&mut self) -> bool {
        self.go_to(self.page.saturating_sub(1))
    }

    /// Back to page 1. Issued on every term or facet change.
    pub fn reset(&mut self) {
        self.page = 1;
    }

    /// Records the hit count of the latest committed page. The current page is
    /// pulled back inside the new range if the result set shrank.
    pub fn set_total(&mut self, total_hits: HitCount) {
        self.total_hits = total_hits;
        self.page = self.page.clamp(1, self.total_pages());
    }

    pub fn clear(&mut self) {
        self.page = 1;
        self.total_hits = HitCount::Exact(0);
    }

    /// Page numbers to render, in order.
    pub fn page_numbers(&self) -> impl Iterator<Item = u32> {
        1..=self.total_pages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_hits_is_still_one_page() {
        assert_eq!(total_pages(0, 10), 1);
        assert_eq!(total_pages(0, 1), 1);
    }

    #[test]
    fn pages_round_up() {
        assert_eq!(total_pages(25, 10), 3);
        assert_eq!(total_pages(30, 10), 3);
        assert_eq!(total_pages(31, 10), 4);
        assert_eq!(total_pages(1, 10), 1);
    }

    #[test]
    fn total_pages_is_monotonic_in_hits() {
        for page_size in [1, 3, 10, 24] {
            let mut previous = 1;
            for hits in 0..200 {
                let pages = total_pages(hits, page_size);
                assert!(pages >= 1);
                assert!(pages >= previous, "hits={hits} page_size={page_size}");
                previous = pages;
            }
        }
    }

    #[test]
    fn go_to_clamps_into_range() {
        let mut pagination = Pagination::new(10);
        pagination.set_total(HitCount::Exact(25));

        assert!(pagination.go_to(7));
        assert_eq!(pagination.page(), 3);
        assert!(pagination.go_to(0));
        assert_eq!(pagination.page(), 1);
        assert!(!pagination.prev());
        assert_eq!(pagination.page(), 1);
    }

    #[test]
    fn next_stops_at_last_page() {
        let mut pagination = Pagination::new(10);
        pagination.set_total(HitCount::Estimated(21));

        assert!(pagination.next());
        assert!(pagination.next());
        assert!(!pagination.has_next());
        assert!(!pagination.next());
        assert_eq!(pagination.page(), 3);
        assert_eq!(pagination.page_numbers().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn shrinking_results_pull_page_back() {
        let mut pagination = Pagination::new(10);
        pagination.set_total(HitCount::Exact(50));
        pagination.go_to(5);

        pagination.set_total(HitCount::Exact(12));
        assert_eq!(pagination.page(), 2);
    }
}
