use serde::{Deserialize, Serialize};

/// A catalog entry as persisted in the `books` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Book {
    /// Assigned by the repository on insert, never reused
    pub id: i64,
    /// Unique across the catalog
    pub name: String,
    pub author: String,
    pub translator: Option<String>,
    /// Free-form date token of at most 8 characters
    pub translation_date: Option<String>,
    /// Stored cover file name, or the default reference
    pub image: String,
}

/// Validated input for a new catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub name: String,
    pub author: String,
    pub translator: Option<String>,
    pub translation_date: Option<String>,
    /// `None` resolves to the default cover reference.
    pub image: Option<String>,
}

/// Uploaded cover as received from the client.
#[derive(Debug, Clone)]
pub struct CoverUpload {
    /// File name declared by the client; only its extension is used.
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Raw submission, before validation.
#[derive(Debug, Clone, Default)]
pub struct BookForm {
    pub name: String,
    pub author: String,
    pub translator: Option<String>,
    pub translation_date: Option<String>,
    pub image: Option<CoverUpload>,
}

/// One slice of an ordered collection.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page number
    pub page: u32,
    pub per_page: u32,
    /// Size of the whole collection
    pub total: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u32, per_page: u32, total: i64) -> Self {
        let seen = i64::from(page) * i64::from(per_page);
        Self {
            items,
            page,
            per_page,
            total,
            has_next: seen < total,
            has_prev: page > 1,
        }
    }

    /// Number of pages needed to hold `total` items.
    pub fn pages(&self) -> u32 {
        if self.per_page == 0 || self.total <= 0 {
            return 0;
        }
        let per_page = i64::from(self.per_page);
        u32::try_from((self.total + per_page - 1) / per_page).unwrap_or(u32::MAX)
    }

    pub fn next_page(&self) -> Option<u32> {
        self.has_next.then(|| self.page + 1)
    }

    pub fn prev_page(&self) -> Option<u32> {
        self.has_prev.then(|| self.page - 1)
    }
}

/// What the browse view renders: one page of books plus navigation tokens.
#[derive(Debug, Clone, Serialize)]
pub struct BrowsePage {
    pub items: Vec<Book>,
    pub page: u32,
    pub pages: u32,
    pub total: i64,
    pub has_next: bool,
    pub has_prev: bool,
    pub next_page: Option<u32>,
    pub prev_page: Option<u32>,
}

impl From<Page<Book>> for BrowsePage {
    fn from(page: Page<Book>) -> Self {
        Self {
            pages: page.pages(),
            next_page: page.next_page(),
            prev_page: page.prev_page(),
            page: page.page,
            total: page.total,
            has_next: page.has_next,
            has_prev: page.has_prev,
            items: page.items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_of_two_pages() {
        let page: Page<u8> = Page::new(vec![1, 2, 3, 4], 1, 4, 5);
        assert!(page.has_next);
        assert!(!page.has_prev);
        assert_eq!(page.pages(), 2);
        assert_eq!(page.next_page(), Some(2));
        assert_eq!(page.prev_page(), None);
    }

    #[test]
    fn last_page_that_is_exactly_full() {
        let page: Page<u8> = Page::new(vec![5, 6, 7, 8], 2, 4, 8);
        assert!(!page.has_next);
        assert!(page.has_prev);
        assert_eq!(page.pages(), 2);
        assert_eq!(page.prev_page(), Some(1));
    }

    #[test]
    fn empty_collection_has_no_pages() {
        let page: Page<u8> = Page::new(vec![], 1, 4, 0);
        assert_eq!(page.pages(), 0);
        assert!(!page.has_next);
        assert!(!page.has_prev);
    }
}
