//! Sets with a lazily computed, cached sort order.

mod set;
mod sort_key;

pub use set::{OrderedViewMutableSet, OrderedViewSet};
pub use sort_key::{SortKey, ViewItem};
