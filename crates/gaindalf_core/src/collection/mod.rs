//! Collection types used as entity field values.
//!
//! - [`ordered_view`]: sets with a cached sort order
//! - [`journalled`]: copy-on-write wrappers used while a field is being edited

pub mod journalled;
pub mod ordered_view;

pub use journalled::{
    JournalledCollection, JournalledMapping, JournalledOrderedViewSet, JournalledSequence,
    JournalledSet, MappingEdit, SequenceEdit, SetEdit,
};
pub use ordered_view::{OrderedViewMutableSet, OrderedViewSet, SortKey, ViewItem};
