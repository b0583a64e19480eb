use super::{JournalledCollection, MappingEdit};
use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Copy-on-write wrapper over an immutable `BTreeMap`.
#[derive(Debug, Clone)]
pub struct JournalledMapping<K, V> {
    original: Arc<BTreeMap<K, V>>,
    copy: Option<BTreeMap<K, V>>,
    edits: Vec<MappingEdit<K, V>>,
    frozen: bool,
}

impl<K: Ord + Clone, V: Clone> JournalledMapping<K, V> {
    /// Wraps `original` without copying it.
    #[must_use]
    pub fn new(original: Arc<BTreeMap<K, V>>) -> Self {
        Self {
            original,
            copy: None,
            edits: Vec::new(),
            frozen: false,
        }
    }

    /// The untouched original.
    #[must_use]
    pub fn original(&self) -> &Arc<BTreeMap<K, V>> {
        &self.original
    }

    /// Current contents.
    #[must_use]
    pub fn as_map(&self) -> &BTreeMap<K, V> {
        match &self.copy {
            Some(copy) => copy,
            None => self.original.as_ref(),
        }
    }

    /// Value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.as_map().get(key)
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.as_map().contains_key(key)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_map().len()
    }

    /// Whether the mapping is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_map().is_empty()
    }

    /// Iterates the current entries in key order.
    pub fn iter(&self) -> std::collections::btree_map::Iter<'_, K, V> {
        self.as_map().iter()
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
                target: "journalled mapping",
            });
        }
        Ok(())
    }

    fn container_mut(&mut self) -> CoreResult<&mut BTreeMap<K, V>> {
        self.ensure_not_frozen()?;
        if self.copy.is_none() {
            self.copy_on_write()?;
        }
        self.copy
            .as_mut()
            .ok_or_else(|| CoreError::invalid_operation("journalled mapping has no working copy"))
    }

    /// Inserts or overwrites `key`, returning the previous value.
    pub fn insert(&mut self, key: K, value: V) -> CoreResult<Option<V>> {
        let previous = self.container_mut()?.insert(key.clone(), value.clone());
        self.edits.push(MappingEdit::SetItem { key, value });
        Ok(previous)
    }

    /// Removes `key`, returning its value. Absent keys leave the mapping untouched.
    pub fn remove(&mut self, key: &K) -> CoreResult<Option<V>> {
        self.ensure_not_frozen()?;
        if !self.contains_key(key) {
            return Ok(None);
        }
        let removed = self.container_mut()?.remove(key);
        self.edits.push(MappingEdit::DelItem { key: key.clone() });
        Ok(removed)
    }
}

impl<K: Ord + Clone, V: Clone> JournalledCollection for JournalledMapping<K, V> {
    type Frozen = Arc<BTreeMap<K, V>>;
    type Edit = MappingEdit<K, V>;

    fn edited(&self) -> bool {
        self.copy.is_some() || !self.edits.is_empty()
    }

    fn edits(&self) -> &[MappingEdit<K, V>] {
        &self.edits
    }

    fn make_immutable(&self) -> Arc<BTreeMap<K, V>> {
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
    use proptest::prelude::*;

    fn mapping(pairs: &[(&str, i64)]) -> JournalledMapping<String, i64> {
        JournalledMapping::new(Arc::new(
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        ))
    }

    #[test]
    fn set_then_delete() {
        let mut map = mapping(&[("a", 1), ("b", 2)]);
        map.insert("a".to_string(), 10).unwrap();
        map.remove(&"b".to_string()).unwrap();

        assert!(map.edited());
        let current: Vec<(&String, &i64)> = map.iter().collect();
        assert_eq!(current, vec![(&"a".to_string(), &10)]);
        assert_eq!(map.original().get("a"), Some(&1));
        assert_eq!(map.original().get("b"), Some(&2));
        assert_eq!(
            map.edits(),
            &[
                MappingEdit::SetItem {
                    key: "a".to_string(),
                    value: 10
                },
                MappingEdit::DelItem {
                    key: "b".to_string()
                },
            ]
        );
    }

    #[test]
    fn second_copy_is_rejected() {
        let mut map = mapping(&[("a", 1)]);
        map.copy_on_write().unwrap();
        assert!(matches!(map.copy_on_write(), Err(CoreError::AlreadyCloned)));

        map.insert("a".to_string(), 2).unwrap();
        assert!(matches!(map.copy_on_write(), Err(CoreError::AlreadyCloned)));
        assert_eq!(map.get(&"a".to_string()), Some(&2));
        assert_eq!(map.original().get("a"), Some(&1));
    }

    #[test]
    fn removing_absent_key_is_not_an_edit() {
        let mut map = mapping(&[("a", 1)]);
        assert_eq!(map.remove(&"z".to_string()).unwrap(), None);
        assert!(!map.edited());
    }

    #[test]
    fn edit_log_serializes_with_op_tags() {
        let mut map = mapping(&[]);
        map.insert("k".to_string(), 3).unwrap();
        let json = serde_json::to_value(map.edits()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{ "op": "SET_ITEM", "key": "k", "value": 3 }])
        );
    }

    proptest! {
        #[test]
        fn original_never_changes(
            ops in prop::collection::vec((any::<bool>(), 0u8..8, any::<i64>()), 0..30)
        ) {
            let original: BTreeMap<u8, i64> = (0u8..4).map(|k| (k, i64::from(k))).collect();
            let mut map = JournalledMapping::new(Arc::new(original.clone()));
            let mut model = original.clone();
            for (insert, key, value) in ops {
                if insert {
                    map.insert(key, value).unwrap();
                    model.insert(key, value);
                } else {
                    map.remove(&key).unwrap();
                    model.remove(&key);
                }
            }
            prop_assert_eq!(map.original().as_ref(), &original);
            prop_assert_eq!(map.as_map(), &model);
            prop_assert_eq!(map.edited(), !map.edits().is_empty());
        }
    }
}
