//! Frozen and mutable ordered view sets.

use super::sort_key::{sort_items, view_order, SortKey, ViewItem};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, OnceLock};

struct Inner<T> {
    items: BTreeSet<T>,
    reverse: bool,
    sorted: OnceLock<Vec<T>>,
}

/// An immutable set with a lazily computed, cached sort order.
///
/// Clones share both the items and the sort cache. Since the contents never
/// change, the cache is never cleared.
pub struct OrderedViewSet<T> {
    inner: Arc<Inner<T>>,
}

impl<T: ViewItem> OrderedViewSet<T> {
    /// Creates a view over `items`.
    pub fn new(items: impl IntoIterator<Item = T>, reverse: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                items: items.into_iter().collect(),
                reverse,
                sorted: OnceLock::new(),
            }),
        }
    }

    /// Creates an empty view.
    #[must_use]
    pub fn empty(reverse: bool) -> Self {
        Self::new(std::iter::empty(), reverse)
    }

    /// Whether items sort by descending key.
    #[must_use]
    pub fn is_reversed(&self) -> bool {
        self.inner.reverse
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.len()
    }

    /// Whether the view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.is_empty()
    }

    /// Whether `item` is a member.
    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.inner.items.contains(item)
    }

    /// Iterates items in their own (unsorted) order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.inner.items.iter()
    }

    /// Returns the items sorted by sort key, computing and caching the order on first use.
    pub fn sorted(&self) -> &[T] {
        self.inner
            .sorted
            .get_or_init(|| sort_items(self.inner.items.iter(), self.inner.reverse))
    }

    /// Returns the item at `index` in sorted order.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.sorted().get(index)
    }

    /// Whether the sort order has been computed.
    #[must_use]
    pub fn is_sort_cached(&self) -> bool {
        self.inner.sorted.get().is_some()
    }

    /// Returns the key `item` sorts by.
    pub fn item_sort_key(&self, item: &T) -> T::Key {
        item.sort_key()
    }

    /// Sorts by an arbitrary key. The result is not cached.
    pub fn sort_with<K: Ord>(&self, key: impl Fn(&T) -> K, reverse: bool) -> Vec<T> {
        let mut items: Vec<T> = self.inner.items.iter().cloned().collect();
        items.sort_by(|a, b| {
            let ordering = key(a).cmp(&key(b));
            if reverse {
                ordering.reverse()
            } else {
                ordering
            }
        });
        items
    }

    /// Returns a mutable copy. A populated sort cache is carried over.
    #[must_use]
    pub fn to_mutable(&self) -> OrderedViewMutableSet<T> {
        OrderedViewMutableSet {
            items: self.inner.items.clone(),
            reverse: self.inner.reverse,
            sorted: self.inner.sorted.clone(),
        }
    }

    /// Whether both handles share the same backing storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for OrderedViewSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ViewItem> PartialEq for OrderedViewSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T: ViewItem> Eq for OrderedViewSet<T> {}

impl<T: ViewItem> PartialOrd for OrderedViewSet<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: ViewItem> Ord for OrderedViewSet<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.inner
            .items
            .iter()
            .cmp(other.inner.items.iter())
            .then_with(|| self.inner.reverse.cmp(&other.inner.reverse))
    }
}

impl<T: ViewItem> FromIterator<T> for OrderedViewSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter, false)
    }
}

impl<T: fmt::Debug> fmt::Debug for OrderedViewSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.inner.items.iter()).finish()
    }
}

impl<T: ViewItem + Serialize> Serialize for OrderedViewSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.sorted())
    }
}

/// A mutable ordered view. Every change to membership drops the sort cache.
#[derive(Clone)]
pub struct OrderedViewMutableSet<T> {
    items: BTreeSet<T>,
    reverse: bool,
    sorted: OnceLock<Vec<T>>,
}

impl<T: ViewItem> OrderedViewMutableSet<T> {
    /// Creates an empty mutable view.
    #[must_use]
    pub fn new(reverse: bool) -> Self {
        Self {
            items: BTreeSet::new(),
            reverse,
            sorted: OnceLock::new(),
        }
    }

    /// Whether items sort by descending key.
    #[must_use]
    pub fn is_reversed(&self) -> bool {
        self.reverse
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether `item` is a member.
    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    /// Iterates items in their own (unsorted) order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Adds an item. Returns false if it was already present.
    pub fn add(&mut self, item: T) -> bool {
        let inserted = self.items.insert(item);
        if inserted {
            self.clear_sort_cache();
        }
        inserted
    }

    /// Removes an item. Returns false if it was absent.
    pub fn discard(&mut self, item: &T) -> bool {
        let removed = self.items.remove(item);
        if removed {
            self.clear_sort_cache();
        }
        removed
    }

    /// Removes every item.
    pub fn clear(&mut self) {
        self.items.clear();
        self.clear_sort_cache();
    }

    /// Drops the cached sort order.
    pub fn clear_sort_cache(&mut self) {
        self.sorted.take();
    }

    /// Whether the sort order has been computed.
    #[must_use]
    pub fn is_sort_cached(&self) -> bool {
        self.sorted.get().is_some()
    }

    /// Returns the items sorted by sort key, computing and caching the order on first use.
    pub fn sorted(&self) -> &[T] {
        self.sorted
            .get_or_init(|| sort_items(self.items.iter(), self.reverse))
    }

    /// Returns the key `item` sorts by.
    pub fn item_sort_key(&self, item: &T) -> T::Key {
        item.sort_key()
    }

    /// Moves `item` to the position matching its current sort key.
    ///
    /// Only the cached order is touched; with no cache there is nothing to do.
    /// Returns false if `item` is not a member.
    pub fn reposition(&mut self, item: &T) -> bool {
        if !self.items.contains(item) {
            return false;
        }
        let reverse = self.reverse;
        if let Some(sorted) = self.sorted.get_mut() {
            if let Some(position) = sorted.iter().position(|candidate| candidate == item) {
                let moved = sorted.remove(position);
                let moved_key = moved.sort_key();
                let at = sorted.partition_point(|other| {
                    view_order(other, &other.sort_key(), &moved, &moved_key, reverse)
                        == Ordering::Less
                });
                sorted.insert(at, moved);
            }
        }
        true
    }

    /// Converts into a frozen view, keeping any computed sort order.
    #[must_use]
    pub fn freeze(self) -> OrderedViewSet<T> {
        OrderedViewSet {
            inner: Arc::new(Inner {
                items: self.items,
                reverse: self.reverse,
                sorted: self.sorted,
            }),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for OrderedViewMutableSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.items.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};

    /// Item whose sort key can change after insertion.
    #[derive(Clone, Debug)]
    struct Movable {
        id: u32,
        key: Arc<AtomicI64>,
    }

    impl Movable {
        fn new(id: u32, key: i64) -> Self {
            Self {
                id,
                key: Arc::new(AtomicI64::new(key)),
            }
        }
    }

    impl PartialEq for Movable {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }

    impl Eq for Movable {}

    impl PartialOrd for Movable {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    impl Ord for Movable {
        fn cmp(&self, other: &Self) -> Ordering {
            self.id.cmp(&other.id)
        }
    }

    impl SortKey for Movable {
        type Key = i64;

        fn sort_key(&self) -> i64 {
            self.key.load(AtomicOrdering::Relaxed)
        }
    }

    #[test]
    fn sorts_lazily_and_caches() {
        let view: OrderedViewSet<i64> = [5, 1, 3].into_iter().collect();
        assert!(!view.is_sort_cached());
        assert_eq!(view.sorted(), &[1, 3, 5]);
        assert!(view.is_sort_cached());
        assert_eq!(view.get(1), Some(&3));

        let shared = view.clone();
        assert!(shared.is_sort_cached());
        assert!(shared.ptr_eq(&view));
    }

    #[test]
    fn reverse_order() {
        let view = OrderedViewSet::new([5i64, 1, 3], true);
        assert_eq!(view.sorted(), &[5, 3, 1]);
    }

    #[test]
    fn mutation_clears_cache() {
        let mut view = OrderedViewSet::new([1i64, 3, 5], false).to_mutable();
        assert_eq!(view.sorted(), &[1, 3, 5]);
        assert!(view.add(4));
        assert!(!view.is_sort_cached());
        assert_eq!(view.sorted(), &[1, 3, 4, 5]);

        assert!(!view.add(4));
        assert!(view.is_sort_cached());

        assert!(view.discard(&1));
        assert!(!view.is_sort_cached());
        assert!(!view.discard(&1));

        view.clear();
        assert!(view.is_empty());
    }

    #[test]
    fn custom_sort_is_uncached() {
        let view: OrderedViewSet<i64> = [1, -4, 3].into_iter().collect();
        assert_eq!(view.sort_with(|v| v.abs(), false), vec![1, 3, -4]);
        assert_eq!(view.sort_with(|v| v.abs(), true), vec![-4, 3, 1]);
        assert!(!view.is_sort_cached());
    }

    #[test]
    fn reposition_moves_one_item() {
        let a = Movable::new(1, 10);
        let b = Movable::new(2, 20);
        let c = Movable::new(3, 30);
        let mut view = OrderedViewSet::new([a.clone(), b.clone(), c.clone()], false).to_mutable();
        let ids: Vec<u32> = view.sorted().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        a.key.store(25, AtomicOrdering::Relaxed);
        assert!(view.reposition(&a));
        assert!(view.is_sort_cached());
        let ids: Vec<u32> = view.sorted().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);

        assert!(!view.reposition(&Movable::new(9, 0)));
    }

    #[test]
    fn freeze_keeps_cache() {
        let mut view = OrderedViewMutableSet::new(false);
        view.add(2i64);
        view.add(1);
        let _ = view.sorted();
        let frozen = view.freeze();
        assert!(frozen.is_sort_cached());
        assert_eq!(frozen.sorted(), &[1, 2]);
    }

    proptest! {
        #[test]
        fn sort_is_pure_function_of_contents(items in prop::collection::vec(any::<i64>(), 0..40)) {
            let forward: OrderedViewSet<i64> = items.iter().copied().collect();
            let backward: OrderedViewSet<i64> = items.iter().rev().copied().collect();
            let mut expected: Vec<i64> = items.clone();
            expected.sort_unstable();
            expected.dedup();
            prop_assert_eq!(forward.sorted(), expected.as_slice());
            prop_assert_eq!(backward.sorted(), expected.as_slice());
        }

        #[test]
        fn reposition_matches_full_sort(
            keys in prop::collection::vec(-50i64..50, 1..20),
            target in any::<prop::sample::Index>(),
            new_key in -50i64..50,
        ) {
            let items: Vec<Movable> = keys
                .iter()
                .enumerate()
                .map(|(id, key)| Movable::new(id as u32, *key))
                .collect();
            let mut view = OrderedViewSet::new(items.clone(), false).to_mutable();
            let _ = view.sorted();

            let moved = &items[target.index(items.len())];
            moved.key.store(new_key, AtomicOrdering::Relaxed);
            view.reposition(moved);

            let incremental: Vec<u32> = view.sorted().iter().map(|m| m.id).collect();
            view.clear_sort_cache();
            let full: Vec<u32> = view.sorted().iter().map(|m| m.id).collect();
            prop_assert_eq!(incremental, full);
        }
    }
}
