//! Immutable, versioned entities.

use super::store::EntityStore;
use crate::audit::AuditContext;
use crate::error::{CoreError, CoreResult};
use crate::schema::EntitySchema;
use crate::uid::Uid;
use crate::value::{FieldMap, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// One immutable version of a UID-addressed record.
///
/// Field values never change. [`update`](Entity::update) builds the next
/// version, links it from this one and swaps it into the store; from then on
/// this instance is superseded and refuses field reads that expect current
/// data. Identity, version and [`snapshot_field`](Entity::snapshot_field)
/// stay readable for auditing.
pub struct Entity {
    uid: Uid,
    version: u64,
    parent: Option<Uid>,
    schema: Arc<EntitySchema>,
    fields: FieldMap,
    superseding: OnceLock<Arc<Entity>>,
    deleted: AtomicBool,
}

impl Entity {
    /// Builds and validates a version.
    pub(crate) fn build(
        uid: Uid,
        version: u64,
        parent: Option<Uid>,
        schema: Arc<EntitySchema>,
        fields: FieldMap,
    ) -> CoreResult<Self> {
        if uid.namespace() != schema.namespace() {
            return Err(CoreError::NamespaceMismatch {
                field: "uid".to_string(),
                expected: schema.namespace().to_string(),
                actual: uid.namespace().to_string(),
            });
        }
        let fields = schema.complete(fields)?;
        schema.validate(&fields)?;
        Ok(Self {
            uid,
            version,
            parent,
            schema,
            fields,
            superseding: OnceLock::new(),
            deleted: AtomicBool::new(false),
        })
    }

    /// Builds the next version with `changes` applied over the current fields.
    pub(crate) fn next_version(&self, changes: FieldMap) -> CoreResult<Self> {
        let mut merged = self.fields.clone();
        for (name, value) in changes {
            let field = self.schema.resolve(&name)?;
            merged.insert(field.name().to_string(), field.coerce(value));
        }
        Self::build(
            self.uid.clone(),
            self.version + 1,
            self.parent.clone(),
            Arc::clone(&self.schema),
            merged,
        )
    }

    /// The UID shared by every version.
    #[must_use]
    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    /// This instance's version, starting at 1.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// UID of the owning entity, if any.
    #[must_use]
    pub fn parent_uid(&self) -> Option<&Uid> {
        self.parent.as_ref()
    }

    /// The UID's namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.uid.namespace()
    }

    /// The schema this entity was validated against.
    #[must_use]
    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }

    /// Whether a newer version exists or the entity was deleted.
    #[must_use]
    pub fn superseded(&self) -> bool {
        self.superseding.get().is_some() || self.is_deleted()
    }

    /// The version that replaced this one.
    #[must_use]
    pub fn superseding(&self) -> Option<&Arc<Entity>> {
        self.superseding.get()
    }

    /// Whether this version was deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Follows the superseding chain to the newest version.
    #[must_use]
    pub fn latest(self: &Arc<Self>) -> Arc<Entity> {
        let mut current = Arc::clone(self);
        while let Some(next) = current.superseding().cloned() {
            current = next;
        }
        current
    }

    /// Fails if this instance is superseded.
    pub fn ensure_current(&self) -> CoreResult<()> {
        if self.superseded() {
            return Err(CoreError::superseded(self.describe()));
        }
        Ok(())
    }

    pub(crate) fn describe(&self) -> String {
        format!("entity {} v{}", self.uid, self.version)
    }

    /// Reads a field by name or alias. Fails on superseded instances.
    pub fn field(&self, name: &str) -> CoreResult<&Value> {
        self.ensure_current()?;
        let field = self.schema.resolve(name)?;
        Ok(self.fields.get(field.name()).unwrap_or(&Value::Null))
    }

    /// Reads a field of this exact version, superseded or not.
    #[must_use]
    pub fn snapshot_field(&self, name: &str) -> Option<&Value> {
        let field = self.schema.field(name)?;
        self.fields.get(field.name())
    }

    /// All field values of this version.
    #[must_use]
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Key this entity sorts by in ordered views: the schema's sort key
    /// fields followed by the UID.
    #[must_use]
    pub fn sort_key(&self) -> Value {
        let mut key: Vec<Value> = self
            .schema
            .sort_key_fields()
            .iter()
            .map(|name| self.fields.get(name).cloned().unwrap_or(Value::Null))
            .collect();
        key.push(Value::Uid(self.uid.clone()));
        Value::sequence(key)
    }

    /// UIDs of every entity referenced from this version's fields.
    #[must_use]
    pub fn referenced_uids(&self) -> BTreeSet<Uid> {
        let mut uids = BTreeSet::new();
        for value in self.fields.values() {
            value.collect_entity_refs(&mut uids);
        }
        uids.remove(&self.uid);
        uids
    }

    /// Produces the next version with `changes` applied and registers it.
    ///
    /// The new version is validated before anything is swapped; on success
    /// this instance becomes superseded and an `Updated` audit entry is
    /// appended with a field-level diff.
    ///
    /// Only allowed while a session commit is in progress on `store`, and
    /// `changes` must not be empty. Anything else is an
    /// [`InvalidOperation`](crate::CoreError::InvalidOperation).
    pub fn update(self: &Arc<Self>, store: &EntityStore, changes: FieldMap) -> CoreResult<Arc<Entity>> {
        store.apply_update(self, changes, &AuditContext::default(), None)
    }

    pub(crate) fn supersede_with(&self, next: Arc<Entity>) -> CoreResult<()> {
        self.superseding
            .set(next)
            .map_err(|_| CoreError::superseded(self.describe()))
    }

    pub(crate) fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("uid", &self.uid)
            .field("version", &self.version)
            .field("parent", &self.parent)
            .field("superseded", &self.superseded())
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// Reference to an entity from a field value.
///
/// It keeps the version it was created from, which may be stale;
/// [`latest`](EntityRef::latest) resolves the current one. Two references
/// are equal when they name the same UID.
#[derive(Clone)]
pub struct EntityRef(Arc<Entity>);

impl EntityRef {
    /// Wraps an entity version.
    #[must_use]
    pub fn new(entity: Arc<Entity>) -> Self {
        Self(entity)
    }

    /// The referenced version.
    #[must_use]
    pub fn entity(&self) -> &Arc<Entity> {
        &self.0
    }

    /// The referenced UID.
    #[must_use]
    pub fn uid(&self) -> &Uid {
        self.0.uid()
    }

    /// The newest version of the referenced entity.
    #[must_use]
    pub fn latest(&self) -> Arc<Entity> {
        self.0.latest()
    }
}

impl fmt::Debug for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityRef({} v{})", self.0.uid(), self.0.version())
    }
}

/// Description of an entity to create.
#[derive(Debug, Clone)]
pub struct EntityDraft {
    namespace: String,
    uid: Option<Uid>,
    parent: Option<Uid>,
    fields: FieldMap,
}

impl EntityDraft {
    /// Starts a draft in `namespace`. The UID is allocated on creation.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            uid: None,
            parent: None,
            fields: FieldMap::new(),
        }
    }

    /// Uses an explicit UID instead of allocating one.
    #[must_use]
    pub fn with_uid(mut self, uid: Uid) -> Self {
        self.namespace = uid.namespace().to_string();
        self.uid = Some(uid);
        self
    }

    /// Sets the owning entity.
    #[must_use]
    pub fn parent(mut self, parent: &Uid) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Sets a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Namespace of the entity to create.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub(crate) fn into_parts(self) -> (String, Option<Uid>, Option<Uid>, FieldMap) {
        (self.namespace, self.uid, self.parent, self.fields)
    }
}
