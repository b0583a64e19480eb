//! Copy-on-write collections that record an ordered edit log.
//!
//! Each wrapper holds a reference to an immutable original. Reads pass
//! through to it until the first mutating call, which copies the original
//! exactly once; every later read and write hits the copy. Mutations append
//! an edit record that the audit log uses as the field's diff.

mod mapping;
mod ordered_view_set;
mod sequence;
mod set;

pub use mapping::JournalledMapping;
pub use ordered_view_set::JournalledOrderedViewSet;
pub use sequence::JournalledSequence;
pub use set::JournalledSet;

use serde::Serialize;

/// Behaviour shared by every journalled collection.
pub trait JournalledCollection {
    /// The immutable container type the wrapper produces.
    type Frozen;
    /// The edit record type.
    type Edit;

    /// Whether the collection diverged from its original.
    fn edited(&self) -> bool;

    /// The edits applied so far, oldest first.
    fn edits(&self) -> &[Self::Edit];

    /// Returns the current contents as an immutable container.
    ///
    /// An unedited wrapper returns its original unchanged.
    fn make_immutable(&self) -> Self::Frozen;

    /// Rejects every further mutation.
    fn freeze(&mut self);

    /// Whether [`freeze`](Self::freeze) was called.
    fn is_frozen(&self) -> bool;
}

/// Edit record of a [`JournalledSequence`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SequenceEdit<T> {
    /// An element was replaced.
    SetItem {
        /// Position of the element.
        index: usize,
        /// New element.
        value: T,
    },
    /// An element was removed.
    DelItem {
        /// Position of the removed element.
        index: usize,
    },
    /// An element was inserted.
    Insert {
        /// Position of the new element.
        index: usize,
        /// Inserted element.
        value: T,
    },
}

/// Edit record of a [`JournalledMapping`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingEdit<K, V> {
    /// A key was inserted or overwritten.
    SetItem {
        /// The key.
        key: K,
        /// The new value.
        value: V,
    },
    /// A key was removed.
    DelItem {
        /// The key.
        key: K,
    },
}

/// Edit record of a [`JournalledSet`] or [`JournalledOrderedViewSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetEdit<T> {
    /// An item was added.
    Add {
        /// The item.
        value: T,
    },
    /// An item was removed.
    Discard {
        /// The item.
        value: T,
    },
    /// An item's sort key changed and it was repositioned.
    ItemUpdated {
        /// The item.
        value: T,
    },
}
