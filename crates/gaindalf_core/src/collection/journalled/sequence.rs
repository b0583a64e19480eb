use super::{JournalledCollection, SequenceEdit};
use crate::error::{CoreError, CoreResult};
use std::sync::Arc;

/// Copy-on-write wrapper over an immutable `Vec`.
#[derive(Debug, Clone)]
pub struct JournalledSequence<T> {
    original: Arc<Vec<T>>,
    copy: Option<Vec<T>>,
    edits: Vec<SequenceEdit<T>>,
    frozen: bool,
}

impl<T: Clone> JournalledSequence<T> {
    /// Wraps `original` without copying it.
    #[must_use]
    pub fn new(original: Arc<Vec<T>>) -> Self {
        Self {
            original,
            copy: None,
            edits: Vec::new(),
            frozen: false,
        }
    }

    /// The untouched original.
    #[must_use]
    pub fn original(&self) -> &Arc<Vec<T>> {
        &self.original
    }

    /// Current contents.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        match &self.copy {
            Some(copy) => copy.as_slice(),
            None => self.original.as_slice(),
        }
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Whether the sequence is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// Element at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    /// Iterates the current contents.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
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
                target: "journalled sequence",
            });
        }
        Ok(())
    }

    fn container_mut(&mut self) -> CoreResult<&mut Vec<T>> {
        self.ensure_not_frozen()?;
        if self.copy.is_none() {
            self.copy_on_write()?;
        }
        self.copy
            .as_mut()
            .ok_or_else(|| CoreError::invalid_operation("journalled sequence has no working copy"))
    }

    fn check_index(&self, index: usize, len: usize) -> CoreResult<()> {
        if index >= len {
            return Err(CoreError::IndexOutOfRange { index, len });
        }
        Ok(())
    }

    /// Replaces the element at `index`, returning the previous one.
    pub fn set(&mut self, index: usize, value: T) -> CoreResult<T> {
        self.check_index(index, self.len())?;
        let container = self.container_mut()?;
        let previous = std::mem::replace(&mut container[index], value.clone());
        self.edits.push(SequenceEdit::SetItem { index, value });
        Ok(previous)
    }

    /// Inserts `value` at `index`, shifting later elements.
    pub fn insert(&mut self, index: usize, value: T) -> CoreResult<()> {
        let len = self.len();
        if index > len {
            return Err(CoreError::IndexOutOfRange { index, len });
        }
        self.container_mut()?.insert(index, value.clone());
        self.edits.push(SequenceEdit::Insert { index, value });
        Ok(())
    }

    /// Appends `value`.
    pub fn push(&mut self, value: T) -> CoreResult<()> {
        self.insert(self.len(), value)
    }

    /// Removes and returns the element at `index`.
    pub fn remove(&mut self, index: usize) -> CoreResult<T> {
        self.check_index(index, self.len())?;
        let removed = self.container_mut()?.remove(index);
        self.edits.push(SequenceEdit::DelItem { index });
        Ok(removed)
    }
}

impl<T: Clone> JournalledCollection for JournalledSequence<T> {
    type Frozen = Arc<Vec<T>>;
    type Edit = SequenceEdit<T>;

    fn edited(&self) -> bool {
        self.copy.is_some() || !self.edits.is_empty()
    }

    fn edits(&self) -> &[SequenceEdit<T>] {
        &self.edits
    }

    fn make_immutable(&self) -> Arc<Vec<T>> {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence(items: &[i64]) -> JournalledSequence<i64> {
        JournalledSequence::new(Arc::new(items.to_vec()))
    }

    #[test]
    fn reads_pass_through_until_edited() {
        let seq = sequence(&[1, 2, 3]);
        assert!(!seq.edited());
        assert_eq!(seq.as_slice(), &[1, 2, 3]);
        assert!(Arc::ptr_eq(&seq.make_immutable(), seq.original()));
    }

    #[test]
    fn edits_are_recorded_in_order() {
        let mut seq = sequence(&[1, 2, 3]);
        assert_eq!(seq.set(0, 10).unwrap(), 1);
        seq.push(4).unwrap();
        seq.insert(1, 7).unwrap();
        assert_eq!(seq.remove(2).unwrap(), 2);

        assert!(seq.edited());
        assert_eq!(seq.as_slice(), &[10, 7, 3, 4]);
        assert_eq!(seq.original().as_slice(), &[1, 2, 3]);
        assert_eq!(
            seq.edits(),
            &[
                SequenceEdit::SetItem { index: 0, value: 10 },
                SequenceEdit::Insert { index: 3, value: 4 },
                SequenceEdit::Insert { index: 1, value: 7 },
                SequenceEdit::DelItem { index: 2 },
            ]
        );
        assert_eq!(seq.make_immutable().as_slice(), &[10, 7, 3, 4]);
    }

    #[test]
    fn out_of_range_does_not_copy() {
        let mut seq = sequence(&[1]);
        assert!(matches!(
            seq.set(3, 0),
            Err(CoreError::IndexOutOfRange { index: 3, len: 1 })
        ));
        assert!(seq.remove(1).is_err());
        assert!(seq.insert(2, 0).is_err());
        assert!(!seq.edited());
    }

    #[test]
    fn second_copy_is_rejected() {
        let mut seq = sequence(&[1]);
        seq.copy_on_write().unwrap();
        assert!(matches!(seq.copy_on_write(), Err(CoreError::AlreadyCloned)));
    }

    #[test]
    fn frozen_rejects_edits() {
        let mut seq = sequence(&[1]);
        seq.freeze();
        assert!(matches!(seq.push(2), Err(CoreError::Frozen { .. })));
        assert!(!seq.edited());
    }
}
