use super::{JournalledCollection, SetEdit};
use crate::error::{CoreError, CoreResult};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Copy-on-write wrapper over an immutable `BTreeSet`.
#[derive(Debug, Clone)]
pub struct JournalledSet<T> {
    original: Arc<BTreeSet<T>>,
    copy: Option<BTreeSet<T>>,
    edits: Vec<SetEdit<T>>,
    frozen: bool,
}

impl<T: Ord + Clone> JournalledSet<T> {
    /// Wraps `original` without copying it.
    #[must_use]
    pub fn new(original: Arc<BTreeSet<T>>) -> Self {
        Self {
            original,
            copy: None,
            edits: Vec::new(),
            frozen: false,
        }
    }

    /// The untouched original.
    #[must_use]
    pub fn original(&self) -> &Arc<BTreeSet<T>> {
        &self.original
    }

    /// Current contents.
    #[must_use]
    pub fn as_set(&self) -> &BTreeSet<T> {
        match &self.copy {
            Some(copy) => copy,
            None => self.original.as_ref(),
        }
    }

    /// Whether `item` is a member.
    #[must_use]
    pub fn contains(&self, item: &T) -> bool {
        self.as_set().contains(item)
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_set().len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_set().is_empty()
    }

    /// Iterates the current items in order.
    pub fn iter(&self) -> std::collections::btree_set::Iter<'_, T> {
        self.as_set().iter()
    }

    /// Copies the original so it can diverge. Fails if already copied.
    pub fn copy_on_write(&mut self) -> CoreResult<()> {
        self.ensure_not_frozen()?;
        if self.copy.is_some() {
            return Err(CoreError::AlreadyCloned);
        }
        self.copy = Some(self.original.as_ref().clone());
        Ok(())
    }

    fn ensure_not_frozen(&self) -> CoreResult<()> {
        if self.frozen {
            return Err(CoreError::Frozen {
                target: "journalled set",
            });
        }
        Ok(())
    }

    fn container_mut(&mut self) -> CoreResult<&mut BTreeSet<T>> {
        self.ensure_not_frozen()?;
        if self.copy.is_none() {
            self.copy_on_write()?;
        }
        self.copy
            .as_mut()
            .ok_or_else(|| CoreError::invalid_operation("journalled set has no working copy"))
    }

    /// Adds `item`. Returns false, without recording an edit, if it was present.
    pub fn add(&mut self, item: T) -> CoreResult<bool> {
        self.ensure_not_frozen()?;
        if self.contains(&item) {
            return Ok(false);
        }
        self.container_mut()?.insert(item.clone());
        self.edits.push(SetEdit::Add { value: item });
        Ok(true)
    }

    /// Removes `item`. Returns false, without recording an edit, if it was absent.
    pub fn discard(&mut self, item: &T) -> CoreResult<bool> {
        self.ensure_not_frozen()?;
        if !self.contains(item) {
            return Ok(false);
        }
        self.container_mut()?.remove(item);
        self.edits.push(SetEdit::Discard {
            value: item.clone(),
        });
        Ok(true)
    }
}

impl<T: Ord + Clone> JournalledCollection for JournalledSet<T> {
    type Frozen = Arc<BTreeSet<T>>;
    type Edit = SetEdit<T>;

    fn edited(&self) -> bool {
        self.copy.is_some() || !self.edits.is_empty()
    }

    fn edits(&self) -> &[SetEdit<T>] {
        &self.edits
    }

    fn make_immutable(&self) -> Arc<BTreeSet<T>> {
        match &self.copy {
            Some(copy) => Arc::new(copy.clone()),
            None => Arc::clone(&self.original),
        }
    }

    fn freeze(&mut self) {
        self.frozen = true;
    }

    fn is_frozen(&self) -> bool {
        self.frozen
    }
}
