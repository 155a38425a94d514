//! Paginated result collections.

use std::ops::Deref;

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::backend::FindOptions;

/// An ordered sequence of results plus pagination metadata.
///
/// `page` and `page_size` are only set when the caller asked for a page.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection<T> {
    items: Vec<T>,
    total_count: u64,
    page: Option<u32>,
    page_size: Option<u32>,
}

impl<T> Collection<T> {
    /// Creates an unpaginated collection.
    #[must_use]
    pub fn new(items: Vec<T>, total_count: u64) -> Self {
        Self {
            items,
            total_count,
            page: None,
            page_size: None,
        }
    }

    /// Creates a collection, copying page metadata from `options` when a page
    /// was requested.
    #[must_use]
    pub fn with_options(items: Vec<T>, total_count: u64, options: &FindOptions) -> Self {
        Self {
            items,
            total_count,
            page: options.page,
            page_size: options.page.map(|_| options.page_size),
        }
    }

    /// Total number of matches, independent of the page size.
    #[must_use]
    pub const fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Current page number (1-based).
    #[must_use]
    pub const fn page(&self) -> Option<u32> {
        self.page
    }

    /// Page size.
    #[must_use]
    pub const fn page_size(&self) -> Option<u32> {
        self.page_size
    }

    /// Returns true if there is a page before this one.
    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.page.is_some_and(|page| page > 1)
    }

    /// Returns true if matches remain after this page.
    #[must_use]
    pub fn has_next(&self) -> bool {
        match (self.page, self.page_size) {
            (Some(page), Some(size)) => self.total_count > u64::from(page) * u64::from(size),
            _ => false,
        }
    }

    /// Returns the items.
    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Consumes the collection and returns the items.
    #[must_use]
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Maps every item, keeping the metadata.
    #[must_use]
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Collection<U> {
        Collection {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

impl<T> Deref for Collection<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T> IntoIterator for Collection<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Collection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Serialize> Serialize for Collection<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Collection", 6)?;
        state.serialize_field("objects", &self.items)?;
        state.serialize_field("total_count", &self.total_count)?;
        state.serialize_field("page", &self.page)?;
        state.serialize_field("page_size", &self.page_size)?;
        state.serialize_field("has_next", &self.has_next())?;
        state.serialize_field("has_previous", &self.has_previous())?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(page: u32, items: usize) -> Collection<usize> {
        let options = FindOptions::new().page(page).page_size(10);
        Collection::with_options((0..items).collect(), 25, &options)
    }

    #[test]
    fn test_middle_page() {
        let c = page(2, 10);
        assert!(c.has_previous());
        assert!(c.has_next());
    }

    #[test]
    fn test_last_page() {
        let c = page(3, 5);
        assert!(c.has_previous());
        assert!(!c.has_next());
        assert_eq!(c.len(), 5);
    }

    #[test]
    fn test_first_page() {
        let c = page(1, 10);
        assert!(!c.has_previous());
        assert!(c.has_next());
    }

    #[test]
    fn test_unpaginated_has_no_neighbours() {
        let c = Collection::new(vec![1, 2, 3], 3);
        assert_eq!(c.page(), None);
        assert_eq!(c.page_size(), None);
        assert!(!c.has_next());
        assert!(!c.has_previous());
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_value(page(3, 2)).unwrap();
        assert_eq!(json["objects"], serde_json::json!([0, 1]));
        assert_eq!(json["total_count"], 25);
        assert_eq!(json["page"], 3);
        assert_eq!(json["has_next"], false);
        assert_eq!(json["has_previous"], true);
    }

    #[test]
    fn test_map_keeps_metadata() {
        let c = page(2, 3).map(|n| n * 2);
        assert_eq!(c.items(), [0, 2, 4]);
        assert_eq!(c.total_count(), 25);
        assert_eq!(c.page(), Some(2));
    }
}
