// src/history.rs

use crate::config::DEFAULT_PAGE_SIZE;
use crate::database::PageRequest;

/// Pagination state for the history table. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pager {
    current_page: usize,
    per_page: usize,
    total_items: usize,
}

impl Default for Pager {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl Pager {
    pub fn new(per_page: usize) -> Self {
        Self {
            current_page: 1,
            per_page: per_page.max(1),
            total_items: 0,
        }
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    pub fn total_items(&self) -> usize {
        self.total_items
    }

    pub fn total_pages(&self) -> usize {
        self.total_items.div_ceil(self.per_page).max(1)
    }

    /// Updates the item count, pulling the current page back into range.
    pub fn set_total(&mut self, total_items: usize) {
        self.total_items = total_items;
        self.current_page = self.current_page.clamp(1, self.total_pages());
    }

    pub fn set_per_page(&mut self, per_page: usize) {
        self.per_page = per_page.max(1);
        self.set_total(self.total_items);
    }

    pub fn first(&mut self) {
        self.current_page = 1;
    }

    pub fn next(&mut self) -> bool {
        if self.current_page < self.total_pages() {
            self.current_page += 1;
            true
        } else {
            false
        }
    }

    pub fn prev(&mut self) -> bool {
        if self.current_page > 1 {
            self.current_page -= 1;
            true
        } else {
            false
        }
    }

    pub fn page_request(&self) -> PageRequest {
        PageRequest {
            page: self.current_page,
            per_page: self.per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_has_one_page() {
        let pager = Pager::default();
        assert_eq!(pager.per_page(), 20);
        assert_eq!(pager.total_pages(), 1);
        assert_eq!(pager.current_page(), 1);
    }

    #[test]
    fn navigation_stays_in_bounds() {
        let mut pager = Pager::new(20);
        pager.set_total(45);
        assert_eq!(pager.total_pages(), 3);
        assert!(!pager.prev());
        assert!(pager.next());
        assert!(pager.next());
        assert!(!pager.next());
        assert_eq!(pager.current_page(), 3);
        assert_eq!(pager.page_request(), PageRequest { page: 3, per_page: 20 });
    }

    #[test]
    fn shrinking_total_clamps_page() {
        let mut pager = Pager::new(10);
        pager.set_total(50);
        while pager.next() {}
        assert_eq!(pager.current_page(), 5);
        pager.set_total(12);
        assert_eq!(pager.current_page(), 2);
        pager.set_total(0);
        assert_eq!(pager.current_page(), 1);
    }

    #[test]
    fn exact_multiple_and_page_size_change() {
        let mut pager = Pager::new(20);
        pager.set_total(40);
        assert_eq!(pager.total_pages(), 2);
        pager.next();
        pager.set_per_page(50);
        assert_eq!(pager.total_pages(), 1);
        assert_eq!(pager.current_page(), 1);
        assert_eq!(Pager::new(0).per_page(), 1);
    }
}
