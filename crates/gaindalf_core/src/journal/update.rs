//! Pending change of a single field.

use crate::audit::FieldDiff;
use crate::collection::{
    JournalledCollection, JournalledMapping, JournalledOrderedViewSet, JournalledSequence,
    JournalledSet,
};
use crate::schema::{FieldDef, FieldKind};
use crate::value::Value;

/// A field update held by a journal.
#[derive(Debug, Clone)]
pub enum FieldUpdate {
    /// The field was reassigned wholesale.
    Assigned(Value),
    /// A sequence field being edited in place.
    Sequence(JournalledSequence<Value>),
    /// A mapping field being edited in place.
    Mapping(JournalledMapping<Value, Value>),
    /// A set field being edited in place.
    Set(JournalledSet<Value>),
    /// An ordered view set field being edited in place.
    OrderedView(JournalledOrderedViewSet<Value>),
}

impl FieldUpdate {
    /// Wraps a collection value in the journalled type matching `field`.
    ///
    /// Returns `None` for scalar fields and for values of the wrong kind.
    pub(crate) fn wrap(field: &FieldDef, value: &Value) -> Option<Self> {
        match (field.kind(), value) {
            (FieldKind::Sequence, Value::Sequence(items)) => {
                Some(Self::Sequence(JournalledSequence::new(items.clone())))
            }
            (FieldKind::Mapping, Value::Mapping(map)) => {
                Some(Self::Mapping(JournalledMapping::new(map.clone())))
            }
            (FieldKind::Set, Value::Set(items)) => Some(Self::Set(JournalledSet::new(items.clone()))),
            (FieldKind::OrderedViewSet, Value::OrderedView(view)) => Some(Self::OrderedView(
                JournalledOrderedViewSet::new(view.clone()),
            )),
            _ => None,
        }
    }

    /// Whether this update changes the entity when committed.
    ///
    /// Assignments always do; wrappers only once edited.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        match self {
            Self::Assigned(_) => true,
            Self::Sequence(inner) => inner.edited(),
            Self::Mapping(inner) => inner.edited(),
            Self::Set(inner) => inner.edited(),
            Self::OrderedView(inner) => inner.edited(),
        }
    }

    /// The field's value with this update applied.
    #[must_use]
    pub fn materialize(&self) -> Value {
        match self {
            Self::Assigned(value) => value.clone(),
            Self::Sequence(inner) => Value::Sequence(inner.make_immutable()),
            Self::Mapping(inner) => Value::Mapping(inner.make_immutable()),
            Self::Set(inner) => Value::Set(inner.make_immutable()),
            Self::OrderedView(inner) => Value::OrderedView(inner.make_immutable()),
        }
    }

    /// Audit form: the assigned value, or the wrapper's edit log.
    #[must_use]
    pub fn diff(&self) -> FieldDiff {
        match self {
            Self::Assigned(value) => FieldDiff::Value(value.clone()),
            Self::Sequence(inner) => FieldDiff::Sequence(inner.edits().to_vec()),
            Self::Mapping(inner) => FieldDiff::Mapping(inner.edits().to_vec()),
            Self::Set(inner) => FieldDiff::Set(inner.edits().to_vec()),
            Self::OrderedView(inner) => FieldDiff::Set(inner.edits().to_vec()),
        }
    }

    pub(crate) fn freeze(&mut self) {
        match self {
            Self::Assigned(_) => {}
            Self::Sequence(inner) => inner.freeze(),
            Self::Mapping(inner) => inner.freeze(),
            Self::Set(inner) => inner.freeze(),
            Self::OrderedView(inner) => inner.freeze(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ItemConstraint;

    #[test]
    fn unedited_wrapper_is_not_pending() {
        let field = FieldDef::sequence("tags", ItemConstraint::Text);
        let mut update = FieldUpdate::wrap(&field, &Value::sequence([Value::from("a")])).unwrap();
        assert!(!update.is_pending());

        if let FieldUpdate::Sequence(inner) = &mut update {
            inner.push(Value::from("b")).unwrap();
        }
        assert!(update.is_pending());
        assert_eq!(
            update.materialize(),
            Value::sequence([Value::from("a"), Value::from("b")])
        );
        assert!(matches!(update.diff(), FieldDiff::Sequence(edits) if edits.len() == 1));
    }

    #[test]
    fn scalars_are_not_wrapped() {
        let field = FieldDef::scalar("name", ItemConstraint::Text);
        assert!(FieldUpdate::wrap(&field, &Value::from("x")).is_none());
    }

    #[test]
    fn frozen_wrapper_rejects_edits() {
        let field = FieldDef::set("labels", ItemConstraint::Text);
        let mut update = FieldUpdate::wrap(&field, &Value::set([])).unwrap();
        update.freeze();
        if let FieldUpdate::Set(inner) = &mut update {
            assert!(matches!(
                inner.add(Value::from("x")),
                Err(crate::CoreError::Frozen { .. })
            ));
        }
    }
}
