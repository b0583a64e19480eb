//! Sort key capability for ordered view items.

use crate::uid::Uid;
use std::cmp::Ordering;
use std::fmt;

/// Capability of an item to report the key it sorts by inside an ordered view.
///
/// Plain values sort by identity. Entities sort by their schema's sort key
/// fields followed by their UID.
pub trait SortKey {
    /// The comparable key.
    type Key: Ord + Clone + fmt::Debug;

    /// Returns this item's current sort key.
    fn sort_key(&self) -> Self::Key;
}

macro_rules! identity_sort_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SortKey for $ty {
                type Key = $ty;

                fn sort_key(&self) -> $ty {
                    self.clone()
                }
            }
        )*
    };
}

identity_sort_key!(bool, i32, i64, u32, u64, usize, String, Uid);

/// Bound shared by everything stored in an ordered view.
pub trait ViewItem: SortKey + Ord + Clone {}

impl<T: SortKey + Ord + Clone> ViewItem for T {}

/// Total order used by ordered views: by key (descending when `reverse`),
/// ties broken by the items' own ascending order.
pub(crate) fn view_order<T: ViewItem>(
    a: &T,
    a_key: &T::Key,
    b: &T,
    b_key: &T::Key,
    reverse: bool,
) -> Ordering {
    let by_key = if reverse {
        b_key.cmp(a_key)
    } else {
        a_key.cmp(b_key)
    };
    by_key.then_with(|| a.cmp(b))
}

/// Sorts `items` by their sort keys.
pub(crate) fn sort_items<'a, T: ViewItem + 'a>(
    items: impl Iterator<Item = &'a T>,
    reverse: bool,
) -> Vec<T> {
    let mut keyed: Vec<(T::Key, T)> = items.map(|item| (item.sort_key(), item.clone())).collect();
    keyed.sort_by(|(a_key, a), (b_key, b)| view_order(a, a_key, b, b_key, reverse));
    keyed.into_iter().map(|(_, item)| item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_keys() {
        assert_eq!(5i64.sort_key(), 5);
        assert_eq!("abc".to_string().sort_key(), "abc");
    }

    #[test]
    fn sort_forward_and_reverse() {
        let items = [3i64, 1, 2];
        assert_eq!(sort_items(items.iter(), false), vec![1, 2, 3]);
        assert_eq!(sort_items(items.iter(), true), vec![3, 2, 1]);
    }
}
