//! Pagination types for windowed listings.
//!
//! [`PaginationParams`] describes a 1-indexed page of a fixed size and converts it into the
//! skip/top window a repository listing takes. [`Page`] carries the window's items together
//! with the total count and navigation metadata.

use serde::{Deserialize, Serialize};

/// A single page of paginated results.
///
/// # Example
///
/// ```ignore
/// use docrepo::page::Page;
///
/// let page: Page<String> = Page::builder(vec!["item1".to_string()])
///     .with_count(100)
///     .with_next_page(Some(2))
///     .build();
///
/// assert_eq!(page.items.len(), 1);
/// assert_eq!(page.count, 100);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// Total count of items across all pages.
    pub count: u64,
    /// The next page number (if more pages exist).
    pub next_page: Option<usize>,
    /// The previous page number (if this is not the first page).
    pub previous_page: Option<usize>,
}

impl<T> Page<T> {
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }
}

/// Builder for constructing [`Page`] instances.
pub struct PageBuilder<T> {
    items: Vec<T>,
    count: u64,
    next_page: Option<usize>,
    previous_page: Option<usize>,
}

impl<T> PageBuilder<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }

    /// Sets the total count of items across all pages.
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    pub fn with_next_page(mut self, next_page: Option<usize>) -> Self {
        self.next_page = next_page;
        self
    }

    pub fn with_previous_page(mut self, previous_page: Option<usize>) -> Self {
        self.previous_page = previous_page;
        self
    }

    pub fn build(self) -> Page<T> {
        Page {
            items: self.items,
            count: self.count,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
    }
}

/// Parameters selecting one page of a listing. Pages are 1-indexed.
///
/// ```ignore
/// use docrepo::page::PaginationParams;
///
/// let params = PaginationParams::new(3, 20);
/// assert_eq!(params.skip(), 40);
/// assert_eq!(params.top(), 20);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationParams {
    /// The page number (1-indexed).
    pub page: usize,
    /// Number of items per page.
    pub per_page: usize,
}

impl PaginationParams {
    /// Creates new pagination parameters. A page number of 0 is treated as 1.
    pub fn new(page: usize, per_page: usize) -> Self {
        Self { page: page.max(1), per_page }
    }

    pub fn builder() -> PaginationParamsBuilder {
        PaginationParamsBuilder::new()
    }

    /// Number of items to skip to reach this page.
    pub fn skip(&self) -> usize {
        self.page
            .saturating_sub(1)
            .saturating_mul(self.per_page)
    }

    /// Maximum number of items on this page.
    pub fn top(&self) -> usize {
        self.per_page
    }

    /// Wraps the items fetched for this page with navigation metadata.
    pub fn page_of<T>(&self, items: Vec<T>, count: u64) -> Page<T> {
        let end = self.skip().saturating_add(items.len()) as u64;

        Page::builder(items)
            .with_count(count)
            .with_next_page(if end < count { Some(self.page + 1) } else { None })
            .with_previous_page(if self.page > 1 { Some(self.page - 1) } else { None })
            .build()
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { page: 1, per_page: 10 }
    }
}

/// Builder for constructing [`PaginationParams`] instances.
///
/// Uses defaults for any unset values (page=1, per_page=10).
pub struct PaginationParamsBuilder {
    page: Option<usize>,
    per_page: Option<usize>,
}

impl PaginationParamsBuilder {
    pub fn new() -> Self {
        Self { page: None, per_page: None }
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn build(self) -> PaginationParams {
        PaginationParams::new(self.page.unwrap_or(1), self.per_page.unwrap_or(10))
    }
}

impl Default for PaginationParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
