use super::{JournalledCollection, SetEdit};
use crate::collection::ordered_view::{OrderedViewMutableSet, OrderedViewSet, SortKey, ViewItem};
use crate::error::{CoreError, CoreResult};

/// Copy-on-write wrapper over an [`OrderedViewSet`].
///
/// Besides the edit log it tracks the frontier sort key: the lowest key
/// touched since the copy was made (the highest for reversed views). Items
/// sorting before the frontier kept their positions.
#[derive(Debug, Clone)]
pub struct JournalledOrderedViewSet<T: SortKey> {
    original: OrderedViewSet<T>,
    copy: Option<OrderedViewMutableSet<T>>,
    edits: Vec<SetEdit<T>>,
    frontier: Option<T::Key>,
    frozen: bool,
}

impl<T: ViewItem> JournalledOrderedViewSet<T> {
    /// Wraps `original` without copying it.
    #[must_use]
    pub fn new(original: OrderedViewSet<T>) -> Self {
        Self {
            original,
            copy: None,
            edits: Vec::new(),
            frontier: None,
            frozen: false,
        }
    }

    /// The untouched original.
    #[must_use]
    pub fn original(&self) -> &OrderedViewSet<T> {
        &self.original
    }

    /// Whether items sort by descending key.
    #[must_use]
    pub fn is_reversed(&self) -> bool {
        self.original.is_reversed()
    }

    /// Whether `item` is a member.
    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        match &self.copy {
            Some(copy) => copy.contains(item),
            None => self.original.contains(item),
        }
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.copy {
            Some(copy) => copy.len(),
            None => self.original.len(),
        }
    }

    /// Whether the view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current items in sort order.
    pub fn sorted(&self) -> &[T] {
        match &self.copy {
            Some(copy) => copy.sorted(),
            None => self.original.sorted(),
        }
    }

    /// Item at `index` in sort order.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.sorted().get(index)
    }

    /// Returns the key `item` sorts by.
    pub fn item_sort_key(&self, item: &T) -> T::Key {
        item.sort_key()
    }

    /// The most extreme sort key touched since the view diverged.
    #[must_use]
    pub fn frontier_sort_key(&self) -> Option<&T::Key> {
        self.frontier.as_ref()
    }

    /// Whether an item with `key` may have moved, i.e. lies at or beyond the frontier.
    #[must_use]
    pub fn affects(&self, key: &T::Key) -> bool {
        match &self.frontier {
            None => false,
            Some(frontier) if self.is_reversed() => key <= frontier,
            Some(frontier) => key >= frontier,
        }
    }

    /// Copies the original so it can diverge. Fails if already copied.
    pub fn copy_on_write(&mut self) -> CoreResult<()> {
        self.ensure_not_frozen()?;
        if self.copy.is_some() {
            return Err(CoreError::AlreadyCloned);
        }
        self.copy = Some(self.original.to_mutable());
        Ok(())
    }

    fn ensure_not_frozen(&self) -> CoreResult<()> {
        if self.frozen {
            return Err(CoreError::Frozen {
                target: "journalled ordered view set",
            });
        }
        Ok(())
    }

    fn container_mut(&mut self) -> CoreResult<&mut OrderedViewMutableSet<T>> {
        self.ensure_not_frozen()?;
        if self.copy.is_none() {
            self.copy_on_write()?;
        }
        self.copy.as_mut().ok_or_else(|| {
            CoreError::invalid_operation("journalled ordered view set has no working copy")
        })
    }

    fn update_frontier(&mut self, key: T::Key) {
        let reverse = self.is_reversed();
        self.frontier = Some(match self.frontier.take() {
            None => key,
            Some(frontier) if reverse => frontier.max(key),
            Some(frontier) => frontier.min(key),
        });
    }

    /// Adds `item`. Returns false, without recording an edit, if it was present.
    pub fn add(&mut self, item: T) -> CoreResult<bool> {
        self.ensure_not_frozen()?;
        if self.contains(&item) {
            return Ok(false);
        }
        let key = item.sort_key();
        self.container_mut()?.add(item.clone());
        self.edits.push(SetEdit::Add { value: item });
        self.update_frontier(key);
        Ok(true)
    }

    /// Removes `item`. Returns false, without recording an edit, if it was absent.
    pub fn discard(&mut self, item: &T) -> CoreResult<bool> {
        self.ensure_not_frozen()?;
        if !self.contains(item) {
            return Ok(false);
        }
        self.container_mut()?.discard(item);
        self.edits.push(SetEdit::Discard {
            value: item.clone(),
        });
        self.update_frontier(item.sort_key());
        Ok(true)
    }

    /// Reacts to `item` changing its sort key from `old_key`.
    ///
    /// Only items present both in the original and in the current contents
    /// are repositioned; items added or removed in this journal are left
    /// alone. Returns whether an `ItemUpdated` edit was recorded.
    pub fn on_item_updated(&mut self, item: &T, old_key: T::Key) -> CoreResult<bool> {
        self.ensure_not_frozen()?;
        if !self.original.contains(item) || !self.contains(item) {
            return Ok(false);
        }
        let new_key = item.sort_key();
        if new_key == old_key {
            return Ok(false);
        }
        self.container_mut()?.reposition(item);
        self.edits.push(SetEdit::ItemUpdated {
            value: item.clone(),
        });
        self.update_frontier(old_key);
        self.update_frontier(new_key);
        Ok(true)
    }
}

impl<T: ViewItem> JournalledCollection for JournalledOrderedViewSet<T> {
    type Frozen = OrderedViewSet<T>;
    type Edit = SetEdit<T>;

    fn edited(&self) -> bool {
        self.copy.is_some() || !self.edits.is_empty()
    }

    fn edits(&self) -> &[SetEdit<T>] {
        &self.edits
    }

    fn make_immutable(&self) -> OrderedViewSet<T> {
        match &self.copy {
            Some(copy) => copy.clone().freeze(),
            None => self.original.clone(),
        }
    }

    fn freeze(&mut self) {
        self.frozen = true;
    }

    fn is_frozen(&self) -> bool {
        self.frozen
    }
}
