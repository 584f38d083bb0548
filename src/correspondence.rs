//! One-to-many lookup between source and destination identities
//!
//! A source page may be dropped (no entries), carried over (one entry) or
//! replicated (several entries). Entries are only ever appended, in the order
//! the page operation produced them, and removed all at once by [`Correspondence::clear`].

use std::hash::Hash;

use indexmap::IndexMap;

use crate::model::PageId;

/// Lookup table from source pages to the destination pages derived from them
pub type PageCorrespondence = Correspondence<PageId>;

/// Insertion-ordered, multi-valued association between identities
#[derive(Debug, Clone)]
pub struct Correspondence<K> {
    by_source: IndexMap<K, Vec<K>>,
    entries: Vec<(K, K)>,
}

impl<K> Default for Correspondence<K> {
    fn default() -> Self {
        Self {
            by_source: IndexMap::new(),
            entries: Vec::new(),
        }
    }
}

impl<K: Copy + Eq + Hash> Correspondence<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `source` was seen, without deriving anything from it
    pub fn register(&mut self, source: K) {
        self.by_source.entry(source).or_default();
    }

    /// Appends `destination` to the identities derived from `source`
    pub fn add_entry(&mut self, source: K, destination: K) {
        self.by_source.entry(source).or_default().push(destination);
        self.entries.push((source, destination));
    }

    /// Destination identities for `source`, in production order
    pub fn entries_for(&self, source: &K) -> &[K] {
        self.by_source
            .get(source)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First destination derived from `source`
    pub fn first_for(&self, source: &K) -> Option<K> {
        self.entries_for(source).first().copied()
    }

    /// Every `(source, destination)` pair in insertion order
    pub fn all_entries(&self) -> &[(K, K)] {
        &self.entries
    }

    /// Source identities in the order they were first seen
    pub fn sources(&self) -> impl Iterator<Item = &K> + '_ {
        self.by_source.keys()
    }

    pub fn contains_source(&self, source: &K) -> bool {
        self.by_source.contains_key(source)
    }

    /// Number of destination identities recorded
    pub fn destination_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_source.clear();
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_keep_production_order() {
        let mut table = Correspondence::new();
        table.add_entry(1, 10);
        table.add_entry(2, 20);
        table.add_entry(1, 11);

        assert_eq!(table.entries_for(&1), &[10, 11]);
        assert_eq!(table.entries_for(&2), &[20]);
        assert_eq!(table.all_entries(), &[(1, 10), (2, 20), (1, 11)]);
        assert_eq!(table.first_for(&1), Some(10));
        assert_eq!(table.destination_count(), 3);
    }

    #[test]
    fn test_registered_source_without_entries() {
        let mut table = Correspondence::new();
        table.register(1);
        table.add_entry(2, 20);

        assert!(table.contains_source(&1));
        assert!(table.entries_for(&1).is_empty());
        assert!(table.entries_for(&3).is_empty());
        assert_eq!(table.sources().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_register_does_not_drop_entries() {
        let mut table = Correspondence::new();
        table.add_entry(1, 10);
        table.register(1);
        assert_eq!(table.entries_for(&1), &[10]);
    }

    #[test]
    fn test_clear() {
        let mut table = Correspondence::new();
        table.add_entry(1, 10);
        table.clear();

        assert!(table.is_empty());
        assert!(table.all_entries().is_empty());
        assert!(table.entries_for(&1).is_empty());
    }
}
