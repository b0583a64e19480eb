//! Entity schemas: declared fields, their kinds, and model invariants.

use crate::collection::ordered_view::OrderedViewSet;
use crate::error::{CoreError, CoreResult};
use crate::uid::validate_namespace;
use crate::value::{FieldMap, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Custom model invariant. Returns an error message when the fields are rejected.
pub type Validator = Arc<dyn Fn(&FieldMap) -> Result<(), String> + Send + Sync>;

/// Shape of a field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A single value.
    Scalar,
    /// A [`Value::Sequence`].
    Sequence,
    /// A [`Value::Mapping`].
    Mapping,
    /// A [`Value::Set`].
    Set,
    /// A [`Value::OrderedView`].
    OrderedViewSet,
}

impl FieldKind {
    /// Whether values of this kind are journalled collections while edited.
    #[must_use]
    pub fn is_collection(self) -> bool {
        !matches!(self, FieldKind::Scalar)
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            FieldKind::Scalar => "scalar",
            FieldKind::Sequence => "sequence",
            FieldKind::Mapping => "mapping",
            FieldKind::Set => "set",
            FieldKind::OrderedViewSet => "ordered view set",
        }
    }
}

/// Constraint on a scalar value or on each item of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemConstraint {
    /// Anything, including null.
    Any,
    /// A bool.
    Bool,
    /// An integer.
    Integer,
    /// A text string.
    Text,
    /// A bare UID, optionally restricted to one namespace.
    Uid {
        /// Required namespace.
        namespace: Option<String>,
    },
    /// An entity reference, optionally restricted to one namespace.
    Entity {
        /// Required namespace.
        namespace: Option<String>,
    },
}

impl ItemConstraint {
    /// Entity references into `namespace`.
    pub fn entity(namespace: impl Into<String>) -> Self {
        Self::Entity {
            namespace: Some(namespace.into()),
        }
    }

    /// UIDs in `namespace`.
    pub fn uid(namespace: impl Into<String>) -> Self {
        Self::Uid {
            namespace: Some(namespace.into()),
        }
    }

    fn check_namespace(field: &str, expected: Option<&String>, actual: &str) -> CoreResult<()> {
        match expected {
            Some(expected) if expected != actual => Err(CoreError::NamespaceMismatch {
                field: field.to_string(),
                expected: expected.clone(),
                actual: actual.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Checks one non-null value against this constraint.
    pub fn check(&self, field: &str, value: &Value) -> CoreResult<()> {
        let mismatch = |expected: &str| -> CoreResult<()> {
            Err(CoreError::type_mismatch(field, expected, value.type_name()))
        };
        match (self, value) {
            (ItemConstraint::Any, _)
            | (ItemConstraint::Bool, Value::Bool(_))
            | (ItemConstraint::Integer, Value::Integer(_))
            | (ItemConstraint::Text, Value::Text(_)) => Ok(()),
            (ItemConstraint::Uid { namespace }, Value::Uid(uid)) => {
                Self::check_namespace(field, namespace.as_ref(), uid.namespace())
            }
            (ItemConstraint::Entity { namespace }, Value::Entity(entity)) => {
                Self::check_namespace(field, namespace.as_ref(), entity.uid().namespace())
            }
            (ItemConstraint::Bool, _) => mismatch("bool"),
            (ItemConstraint::Integer, _) => mismatch("integer"),
            (ItemConstraint::Text, _) => mismatch("text"),
            (ItemConstraint::Uid { .. }, _) => mismatch("uid"),
            (ItemConstraint::Entity { .. }, _) => mismatch("entity"),
        }
    }
}

/// Declaration of one entity field.
#[derive(Debug, Clone)]
pub struct FieldDef {
    name: String,
    kind: FieldKind,
    items: ItemConstraint,
    required: bool,
    read_only: bool,
    protected: bool,
    aliases: Vec<String>,
    reverse: bool,
}

impl FieldDef {
    fn new(name: impl Into<String>, kind: FieldKind, items: ItemConstraint) -> Self {
        Self {
            name: name.into(),
            kind,
            items,
            required: false,
            read_only: false,
            protected: kind == FieldKind::OrderedViewSet,
            aliases: Vec::new(),
            reverse: false,
        }
    }

    /// A single value.
    pub fn scalar(name: impl Into<String>, items: ItemConstraint) -> Self {
        Self::new(name, FieldKind::Scalar, items)
    }

    /// A sequence whose items satisfy `items`.
    pub fn sequence(name: impl Into<String>, items: ItemConstraint) -> Self {
        Self::new(name, FieldKind::Sequence, items)
    }

    /// A mapping whose values satisfy `items`.
    pub fn mapping(name: impl Into<String>, items: ItemConstraint) -> Self {
        Self::new(name, FieldKind::Mapping, items)
    }

    /// A set whose items satisfy `items`.
    pub fn set(name: impl Into<String>, items: ItemConstraint) -> Self {
        Self::new(name, FieldKind::Set, items)
    }

    /// An ordered view set. Protected unless [`protected(false)`](Self::protected) is set.
    pub fn ordered_view_set(name: impl Into<String>, items: ItemConstraint) -> Self {
        Self::new(name, FieldKind::OrderedViewSet, items)
    }

    /// Rejects null values.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Forbids writes through journals.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Sets whether reassignment is forbidden.
    #[must_use]
    pub fn protected(mut self, value: bool) -> Self {
        self.protected = value;
        self
    }

    /// Adds an alternative name.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Sorts an ordered view set by descending key.
    #[must_use]
    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field kind.
    #[must_use]
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Item constraint.
    #[must_use]
    pub fn items(&self) -> &ItemConstraint {
        &self.items
    }

    /// Whether null is rejected.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Whether journals may write this field.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether reassignment is forbidden.
    #[must_use]
    pub fn is_protected(&self) -> bool {
        self.protected
    }

    /// Alternative names.
    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Whether an ordered view set sorts descending.
    #[must_use]
    pub fn is_reversed(&self) -> bool {
        self.reverse
    }

    /// Value of this field on an entity that does not set it.
    #[must_use]
    pub fn default_value(&self) -> Value {
        match self.kind {
            FieldKind::Scalar => Value::Null,
            FieldKind::Sequence => Value::sequence([]),
            FieldKind::Mapping => Value::mapping([]),
            FieldKind::Set => Value::set([]),
            FieldKind::OrderedViewSet => Value::OrderedView(OrderedViewSet::empty(self.reverse)),
        }
    }

    /// Converts close-enough collection values into this field's kind.
    ///
    /// Sequences and sets become ordered view sets (with this field's
    /// direction) or sets; null becomes the default.
    #[must_use]
    pub fn coerce(&self, value: Value) -> Value {
        match (self.kind, value) {
            (FieldKind::Scalar, value) => value,
            (_, Value::Null) => self.default_value(),
            (FieldKind::OrderedViewSet, Value::Sequence(items)) => {
                Value::ordered_view(items.iter().cloned(), self.reverse)
            }
            (FieldKind::OrderedViewSet, Value::Set(items)) => {
                Value::ordered_view(items.iter().cloned(), self.reverse)
            }
            (FieldKind::OrderedViewSet, Value::OrderedView(view))
                if view.is_reversed() != self.reverse =>
            {
                Value::ordered_view(view.iter().cloned(), self.reverse)
            }
            (FieldKind::Set, Value::Sequence(items)) => Value::set(items.iter().cloned()),
            (_, value) => value,
        }
    }

    fn check_items<'a>(&self, mut items: impl Iterator<Item = &'a Value>) -> CoreResult<()> {
        items.try_for_each(|item| self.items.check(&self.name, item))
    }

    /// Checks a value against this field's kind and item constraint.
    pub fn validate_value(&self, value: &Value) -> CoreResult<()> {
        match (self.kind, value) {
            (FieldKind::Scalar, Value::Null) => Ok(()),
            (FieldKind::Scalar, value) => self.items.check(&self.name, value),
            (FieldKind::Sequence, Value::Sequence(items)) => self.check_items(items.iter()),
            (FieldKind::Mapping, Value::Mapping(map)) => self.check_items(map.values()),
            (FieldKind::Set, Value::Set(items)) => self.check_items(items.iter()),
            (FieldKind::OrderedViewSet, Value::OrderedView(view)) => self.check_items(view.iter()),
            (kind, value) => Err(CoreError::type_mismatch(
                &self.name,
                kind.name(),
                value.type_name(),
            )),
        }
    }
}

/// Fields, sort key and invariants of one entity namespace.
#[derive(Clone)]
pub struct EntitySchema {
    namespace: String,
    fields: Vec<FieldDef>,
    sort_key_fields: Vec<String>,
    validators: Vec<(String, Validator)>,
}

impl EntitySchema {
    /// Starts building a schema for `namespace`.
    pub fn builder(namespace: impl Into<String>) -> EntitySchemaBuilder {
        EntitySchemaBuilder {
            namespace: namespace.into(),
            fields: Vec::new(),
            sort_key_fields: Vec::new(),
            validators: Vec::new(),
        }
    }

    /// The namespace this schema governs.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Declared fields in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Fields an entity's sort key is built from, in order.
    #[must_use]
    pub fn sort_key_fields(&self) -> &[String] {
        &self.sort_key_fields
    }

    /// Looks up a field by name or alias.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .or_else(|| {
                self.fields
                    .iter()
                    .find(|field| field.aliases.iter().any(|alias| alias == name))
            })
    }

    /// Looks up a field by name or alias, failing for unknown names.
    pub fn resolve(&self, name: &str) -> CoreResult<&FieldDef> {
        self.field(name).ok_or_else(|| CoreError::UnknownField {
            namespace: self.namespace.clone(),
            field: name.to_string(),
        })
    }

    /// Resolves aliases, rejects unknown fields, coerces values and fills defaults.
    pub fn complete(&self, fields: FieldMap) -> CoreResult<FieldMap> {
        let mut completed = FieldMap::new();
        for (name, value) in fields {
            let field = self.resolve(&name)?;
            completed.insert(field.name.clone(), field.coerce(value));
        }
        for field in &self.fields {
            completed
                .entry(field.name.clone())
                .or_insert_with(|| field.default_value());
        }
        Ok(completed)
    }

    /// Checks every model invariant on a completed field map.
    pub fn validate(&self, fields: &FieldMap) -> CoreResult<()> {
        for name in fields.keys() {
            self.resolve(name)?;
        }
        for field in &self.fields {
            let value = fields.get(&field.name).unwrap_or(&Value::Null);
            if field.required && value.is_null() {
                return Err(CoreError::MissingField {
                    namespace: self.namespace.clone(),
                    field: field.name.clone(),
                });
            }
            field.validate_value(value)?;
        }
        for (name, validator) in &self.validators {
            (validator.as_ref())(fields).map_err(|message| CoreError::ValidationFailed {
                namespace: self.namespace.clone(),
                message: format!("{name}: {message}"),
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for EntitySchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("namespace", &self.namespace)
            .field("fields", &self.fields)
            .field("sort_key_fields", &self.sort_key_fields)
            .finish_non_exhaustive()
    }
}

/// Builder for [`EntitySchema`].
pub struct EntitySchemaBuilder {
    namespace: String,
    fields: Vec<FieldDef>,
    sort_key_fields: Vec<String>,
    validators: Vec<(String, Validator)>,
}

impl EntitySchemaBuilder {
    /// Declares a field.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Sets the fields the entity sort key is built from.
    #[must_use]
    pub fn sort_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sort_key_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a named custom invariant.
    #[must_use]
    pub fn validator<F>(mut self, name: impl Into<String>, validator: F) -> Self
    where
        F: Fn(&FieldMap) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validators.push((name.into(), Arc::new(validator)));
        self
    }

    /// Builds the schema, checking names for clashes.
    pub fn build(self) -> CoreResult<EntitySchema> {
        validate_namespace(&self.namespace)?;
        let mut seen = BTreeSet::new();
        for field in &self.fields {
            for name in std::iter::once(&field.name).chain(field.aliases.iter()) {
                if !seen.insert(name.clone()) {
                    return Err(CoreError::invalid_operation(format!(
                        "field name {name} declared twice on {}",
                        self.namespace
                    )));
                }
            }
        }
        for name in &self.sort_key_fields {
            if !self.fields.iter().any(|field| &field.name == name) {
                return Err(CoreError::UnknownField {
                    namespace: self.namespace.clone(),
                    field: name.clone(),
                });
            }
        }
        Ok(EntitySchema {
            namespace: self.namespace,
            fields: self.fields,
            sort_key_fields: self.sort_key_fields,
            validators: self.validators,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn ledger_schema() -> EntitySchema {
        EntitySchema::builder("Ledger")
            .field(FieldDef::scalar("name", ItemConstraint::Text).required().alias("title"))
            .field(FieldDef::scalar("currency", ItemConstraint::Text).read_only())
            .field(FieldDef::sequence("tags", ItemConstraint::Text))
            .field(FieldDef::ordered_view_set(
                "transactions",
                ItemConstraint::entity("Transaction"),
            ))
            .sort_key(["name"])
            .validator("name length", |fields| match fields.get("name") {
                Some(Value::Text(name)) if name.len() > 32 => Err("name too long".into()),
                _ => Ok(()),
            })
            .build()
            .unwrap()
    }

    fn fields(pairs: &[(&str, Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn aliases_resolve() {
        let schema = ledger_schema();
        assert_eq!(schema.field("title").unwrap().name(), "name");
        assert!(schema.field("missing").is_none());
        assert!(matches!(
            schema.resolve("missing"),
            Err(CoreError::UnknownField { .. })
        ));
    }

    #[test]
    fn ordered_views_are_protected_by_default() {
        let schema = ledger_schema();
        assert!(schema.field("transactions").unwrap().is_protected());
        assert!(!schema.field("tags").unwrap().is_protected());
    }

    #[test]
    fn complete_fills_defaults_and_coerces() {
        let schema = ledger_schema();
        let completed = schema
            .complete(fields(&[
                ("title", Value::from("Main")),
                ("tags", Value::from(vec!["a"])),
            ]))
            .unwrap();
        assert_eq!(completed.get("name"), Some(&Value::from("Main")));
        assert!(completed.get("currency").unwrap().is_null());
        assert!(completed.get("transactions").unwrap().as_ordered_view().is_some());
        schema.validate(&completed).unwrap();
    }

    #[test]
    fn validation_errors() {
        let schema = ledger_schema();

        let missing = schema.complete(FieldMap::new()).unwrap();
        assert!(matches!(
            schema.validate(&missing),
            Err(CoreError::MissingField { .. })
        ));

        let wrong_type = schema
            .complete(fields(&[("name", Value::from(3i64))]))
            .unwrap();
        let err = schema.validate(&wrong_type).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let too_long = schema
            .complete(fields(&[("name", Value::from("x".repeat(40)))]))
            .unwrap();
        assert!(matches!(
            schema.validate(&too_long),
            Err(CoreError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn uid_namespace_is_checked() {
        let constraint = ItemConstraint::uid("Ledger");
        let ok = Value::Uid(crate::Uid::with_int("Ledger", 1).unwrap());
        let wrong = Value::Uid(crate::Uid::with_int("Account", 1).unwrap());
        constraint.check("owner", &ok).unwrap();
        assert!(matches!(
            constraint.check("owner", &wrong),
            Err(CoreError::NamespaceMismatch { .. })
        ));
    }

    #[test]
    fn builder_rejects_clashes() {
        let result = EntitySchema::builder("Ledger")
            .field(FieldDef::scalar("name", ItemConstraint::Text))
            .field(FieldDef::scalar("label", ItemConstraint::Text).alias("name"))
            .build();
        assert!(result.is_err());

        let result = EntitySchema::builder("Ledger")
            .field(FieldDef::scalar("name", ItemConstraint::Text))
            .sort_key(["date"])
            .build();
        assert!(matches!(result, Err(CoreError::UnknownField { .. })));

        assert!(EntitySchema::builder("bad namespace").build().is_err());
    }
}
