//! Dynamic field values.

use crate::collection::ordered_view::{OrderedViewSet, SortKey};
use crate::entity::{Entity, EntityRef};
use crate::uid::Uid;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Field values of an entity, keyed by field name.
pub type FieldMap = BTreeMap<String, Value>;

/// A dynamic field value.
///
/// Values are totally ordered (there are no floats) so they can key maps and
/// sets. Entity references compare by UID only, whatever version they point at.
/// Collections are reference counted and never mutated in place.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Text string.
    Text(String),
    /// A bare identifier.
    Uid(Uid),
    /// A reference to an entity.
    Entity(EntityRef),
    /// Ordered list.
    Sequence(Arc<Vec<Value>>),
    /// Key ordered map.
    Mapping(Arc<BTreeMap<Value, Value>>),
    /// Set in value order.
    Set(Arc<BTreeSet<Value>>),
    /// Set viewed in sort key order.
    OrderedView(OrderedViewSet<Value>),
}

impl Value {
    /// Creates a sequence value.
    pub fn sequence(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Sequence(Arc::new(items.into_iter().collect()))
    }

    /// Creates a mapping value.
    pub fn mapping(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Value::Mapping(Arc::new(pairs.into_iter().collect()))
    }

    /// Creates a set value.
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Set(Arc::new(items.into_iter().collect()))
    }

    /// Creates an ordered view value.
    pub fn ordered_view(items: impl IntoIterator<Item = Value>, reverse: bool) -> Self {
        Value::OrderedView(OrderedViewSet::new(items, reverse))
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Integer(_) => 2,
            Value::Text(_) => 3,
            Value::Uid(_) => 4,
            Value::Entity(_) => 5,
            Value::Sequence(_) => 6,
            Value::Mapping(_) => 7,
            Value::Set(_) => 8,
            Value::OrderedView(_) => 9,
        }
    }

    /// Short name of this value's type, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Text(_) => "text",
            Value::Uid(_) => "uid",
            Value::Entity(_) => "entity",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
            Value::Set(_) => "set",
            Value::OrderedView(_) => "ordered view set",
        }
    }

    /// Returns true if this is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true for null and for empty collections.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            Value::Sequence(items) => items.is_empty(),
            Value::Mapping(map) => map.is_empty(),
            Value::Set(items) => items.is_empty(),
            Value::OrderedView(view) => view.is_empty(),
            _ => false,
        }
    }

    /// Returns the boolean value if this is a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer value if this is an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the text if this is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the UID if this is a bare identifier.
    pub fn as_uid(&self) -> Option<&Uid> {
        match self {
            Value::Uid(uid) => Some(uid),
            _ => None,
        }
    }

    /// Returns the entity reference if this is one.
    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Value::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// Returns the items if this is a sequence.
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Returns the map if this is a mapping.
    pub fn as_mapping(&self) -> Option<&BTreeMap<Value, Value>> {
        match self {
            Value::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the set if this is a set.
    pub fn as_set(&self) -> Option<&BTreeSet<Value>> {
        match self {
            Value::Set(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the view if this is an ordered view set.
    pub fn as_ordered_view(&self) -> Option<&OrderedViewSet<Value>> {
        match self {
            Value::OrderedView(view) => Some(view),
            _ => None,
        }
    }

    /// Whether a sequence, set or ordered view contains `item`.
    pub fn contains_item(&self, item: &Value) -> bool {
        match self {
            Value::Sequence(items) => items.contains(item),
            Value::Set(items) => items.contains(item),
            Value::OrderedView(view) => view.contains(item),
            _ => false,
        }
    }

    /// Returns a copy of this collection without `item`, or `None` if it was not a member.
    pub fn without_item(&self, item: &Value) -> Option<Value> {
        if !self.contains_item(item) {
            return None;
        }
        match self {
            Value::Sequence(items) => Some(Value::sequence(
                items.iter().filter(|candidate| *candidate != item).cloned(),
            )),
            Value::Set(items) => Some(Value::set(
                items.iter().filter(|candidate| *candidate != item).cloned(),
            )),
            Value::OrderedView(view) => Some(Value::ordered_view(
                view.iter().filter(|candidate| *candidate != item).cloned(),
                view.is_reversed(),
            )),
            _ => None,
        }
    }

    /// Adds the UID of every entity referenced by this value to `out`.
    pub fn collect_entity_refs(&self, out: &mut BTreeSet<Uid>) {
        match self {
            Value::Entity(entity) => {
                out.insert(entity.uid().clone());
            }
            Value::Sequence(items) => items.iter().for_each(|v| v.collect_entity_refs(out)),
            Value::Set(items) => items.iter().for_each(|v| v.collect_entity_refs(out)),
            Value::OrderedView(view) => view.iter().for_each(|v| v.collect_entity_refs(out)),
            Value::Mapping(map) => {
                for (key, value) in map.iter() {
                    key.collect_entity_refs(out);
                    value.collect_entity_refs(out);
                }
            }
            _ => {}
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Uid(a), Value::Uid(b)) => a.cmp(b),
            (Value::Entity(a), Value::Entity(b)) => a.uid().cmp(b.uid()),
            (Value::Sequence(a), Value::Sequence(b)) => a.cmp(b),
            (Value::Mapping(a), Value::Mapping(b)) => a.cmp(b),
            (Value::Set(a), Value::Set(b)) => a.cmp(b),
            (Value::OrderedView(a), Value::OrderedView(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl SortKey for Value {
    type Key = Value;

    /// Entities sort by the sort key of their latest version; every other
    /// value sorts by itself.
    fn sort_key(&self) -> Value {
        match self {
            Value::Entity(entity) => entity.latest().sort_key(),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<'a>(
            f: &mut fmt::Formatter<'_>,
            open: &str,
            items: impl Iterator<Item = &'a Value>,
            close: &str,
        ) -> fmt::Result {
            f.write_str(open)?;
            for (i, item) in items.enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{item}")?;
            }
            f.write_str(close)
        }

        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Uid(uid) => write!(f, "{uid}"),
            Value::Entity(entity) => write!(f, "<{}>", entity.uid()),
            Value::Sequence(items) => join(f, "[", items.iter(), "]"),
            Value::Set(items) => join(f, "{", items.iter(), "}"),
            Value::OrderedView(view) => join(f, "[", view.sorted().iter(), "]"),
            Value::Mapping(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(n) => serializer.serialize_i64(*n),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Uid(uid) => serializer.collect_str(uid),
            Value::Entity(entity) => serializer.collect_str(entity.uid()),
            Value::Sequence(items) => serializer.collect_seq(items.iter()),
            Value::Set(items) => serializer.collect_seq(items.iter()),
            Value::OrderedView(view) => view.serialize(serializer),
            Value::Mapping(map) => {
                let mut state = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map.iter() {
                    match key {
                        Value::Text(s) => state.serialize_entry(s, value)?,
                        other => state.serialize_entry(&other.to_string(), value)?,
                    }
                }
                state.end()
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Uid> for Value {
    fn from(uid: Uid) -> Self {
        Value::Uid(uid)
    }
}

impl From<EntityRef> for Value {
    fn from(entity: EntityRef) -> Self {
        Value::Entity(entity)
    }
}

impl From<Arc<Entity>> for Value {
    fn from(entity: Arc<Entity>) -> Self {
        Value::Entity(EntityRef::new(entity))
    }
}

impl From<&Arc<Entity>> for Value {
    fn from(entity: &Arc<Entity>) -> Self {
        Value::Entity(EntityRef::new(Arc::clone(entity)))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::sequence(items.into_iter().map(Into::into))
    }
}

impl From<BTreeSet<Value>> for Value {
    fn from(items: BTreeSet<Value>) -> Self {
        Value::Set(Arc::new(items))
    }
}

impl From<BTreeMap<Value, Value>> for Value {
    fn from(map: BTreeMap<Value, Value>) -> Self {
        Value::Mapping(Arc::new(map))
    }
}

impl From<OrderedViewSet<Value>> for Value {
    fn from(view: OrderedViewSet<Value>) -> Self {
        Value::OrderedView(view)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
