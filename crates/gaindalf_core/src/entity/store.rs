//! Registry of current entity versions.

use super::entity::{Entity, EntityDraft};
use crate::audit::{
    created_diff, deleted_diff, manual_diff, AuditContext, EntityAudit, EntityAuditLog,
    EntityAuditType, EntityDiff,
};
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::schema::EntitySchema;
use crate::stats::EngineStats;
use crate::uid::{validate_namespace, IncrementingUidFactory, Uid};
use crate::value::FieldMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Maps every UID to its current version, and keeps the audit logs and
/// dependency indexes that go with it.
///
/// The store is the only shared mutable state of the engine. Existing
/// versions are replaced or deleted only while a session commit is in
/// progress; locks are held only for the duration of a single swap.
pub struct EntityStore {
    config: EngineConfig,
    stats: EngineStats,
    uid_factory: IncrementingUidFactory,
    schemas: RwLock<HashMap<String, Arc<EntitySchema>>>,
    entities: RwLock<BTreeMap<Uid, Arc<Entity>>>,
    audit_logs: RwLock<HashMap<Uid, EntityAuditLog>>,
    /// Referenced UID -> UIDs of entities whose fields reference it.
    referrers: RwLock<HashMap<Uid, BTreeSet<Uid>>>,
    /// Parent UID -> child UIDs.
    children: RwLock<HashMap<Uid, BTreeSet<Uid>>>,
    /// Number of live [`CommitScope`]s.
    commit_scopes: AtomicUsize,
}

/// Marks a session commit in progress on a store.
///
/// Updates and deletions are refused while no scope is held.
#[must_use]
pub(crate) struct CommitScope<'a> {
    store: &'a EntityStore,
}

impl Drop for CommitScope<'_> {
    fn drop(&mut self) {
        self.store.commit_scopes.fetch_sub(1, Ordering::AcqRel);
    }
}

impl EntityStore {
    /// Creates an empty store.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            stats: EngineStats::new(),
            uid_factory: IncrementingUidFactory::new(),
            schemas: RwLock::new(HashMap::new()),
            entities: RwLock::new(BTreeMap::new()),
            audit_logs: RwLock::new(HashMap::new()),
            referrers: RwLock::new(HashMap::new()),
            children: RwLock::new(HashMap::new()),
            commit_scopes: AtomicUsize::new(0),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Activity counters.
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    // === Schemas ===

    /// Registers the schema governing one namespace.
    pub fn register_schema(&self, schema: EntitySchema) -> CoreResult<Arc<EntitySchema>> {
        let mut schemas = self.schemas.write();
        if schemas.contains_key(schema.namespace()) {
            return Err(CoreError::DuplicateSchema {
                namespace: schema.namespace().to_string(),
            });
        }
        let schema = Arc::new(schema);
        schemas.insert(schema.namespace().to_string(), Arc::clone(&schema));
        debug!(namespace = schema.namespace(), "schema registered");
        Ok(schema)
    }

    /// The schema governing `namespace`.
    pub fn schema(&self, namespace: &str) -> CoreResult<Arc<EntitySchema>> {
        self.schemas
            .read()
            .get(namespace)
            .cloned()
            .ok_or_else(|| CoreError::UnknownNamespace {
                namespace: namespace.to_string(),
            })
    }

    // === Identifiers ===

    /// Allocates the next UID in `namespace`, starting at 1.
    pub fn generate_next_uid(&self, namespace: &str) -> CoreResult<Uid> {
        self.uid_factory.next(namespace)
    }

    // === Lookups ===

    /// The current version of `uid`.
    pub fn by_uid(&self, uid: &Uid) -> CoreResult<Arc<Entity>> {
        self.by_uid_or_none(uid)
            .ok_or_else(|| CoreError::EntityNotFound { uid: uid.clone() })
    }

    /// The current version of `uid`, if registered.
    pub fn by_uid_or_none(&self, uid: &Uid) -> Option<Arc<Entity>> {
        self.entities.read().get(uid).cloned()
    }

    /// Whether `uid` has a current version.
    pub fn contains(&self, uid: &Uid) -> bool {
        self.entities.read().contains_key(uid)
    }

    /// Number of current entities.
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// Whether the store holds no entities.
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// UIDs of every current entity, in order.
    pub fn uids(&self) -> Vec<Uid> {
        self.entities.read().keys().cloned().collect()
    }

    /// UIDs of current entities whose parent is `uid`.
    pub fn children_uids(&self, uid: &Uid) -> BTreeSet<Uid> {
        self.children.read().get(uid).cloned().unwrap_or_default()
    }

    /// Entities that must be told when `uid` changes: its parent plus every
    /// entity whose fields reference it.
    pub fn dependent_uids(&self, uid: &Uid) -> BTreeSet<Uid> {
        match self.by_uid_or_none(uid) {
            Some(entity) => self.dependents_of(&entity),
            None => self.referrers.read().get(uid).cloned().unwrap_or_default(),
        }
    }

    /// Dependents of one specific version, which may already be superseded.
    pub fn dependents_of(&self, entity: &Entity) -> BTreeSet<Uid> {
        let mut dependents = self
            .referrers
            .read()
            .get(entity.uid())
            .cloned()
            .unwrap_or_default();
        if let Some(parent) = entity.parent_uid() {
            dependents.insert(parent.clone());
        }
        dependents.remove(entity.uid());
        dependents
    }

    /// A copy of the audit log of `uid`.
    pub fn audit_log(&self, uid: &Uid) -> Option<EntityAuditLog> {
        self.audit_logs.read().get(uid).cloned()
    }

    // === Mutation ===

    /// Opens a commit scope, allowing updates and deletions until dropped.
    pub(crate) fn commit_scope(&self) -> CommitScope<'_> {
        self.commit_scopes.fetch_add(1, Ordering::AcqRel);
        CommitScope { store: self }
    }

    /// Whether a session commit is in progress.
    pub fn committing(&self) -> bool {
        self.commit_scopes.load(Ordering::Acquire) > 0
    }

    fn ensure_committing(&self, action: &str, entity: &Entity) -> CoreResult<()> {
        if self.committing() {
            Ok(())
        } else {
            Err(CoreError::invalid_operation(format!(
                "cannot {action} {} outside of a session commit",
                entity.describe()
            )))
        }
    }

    /// Builds version 1 of a draft without registering it.
    pub(crate) fn instantiate(&self, draft: EntityDraft) -> CoreResult<Arc<Entity>> {
        let (namespace, uid, parent, fields) = draft.into_parts();
        validate_namespace(&namespace)?;
        let schema = self.schema(&namespace)?;
        let uid = match uid {
            Some(uid) => uid,
            None => self.generate_next_uid(&namespace)?,
        };
        if self.contains(&uid) {
            return Err(CoreError::DuplicateUid { uid });
        }
        Ok(Arc::new(Entity::build(uid, 1, parent, schema, fields)?))
    }

    /// Builds and registers a new entity outside of any session.
    pub fn create(&self, draft: EntityDraft) -> CoreResult<Arc<Entity>> {
        self.create_with(draft, &AuditContext::default())
    }

    /// Builds and registers a new entity, recording `context` in its audit log.
    pub fn create_with(&self, draft: EntityDraft, context: &AuditContext) -> CoreResult<Arc<Entity>> {
        let entity = self.instantiate(draft)?;
        self.register_with(Arc::clone(&entity), context)?;
        Ok(entity)
    }

    /// Registers a newly built entity and records its creation.
    ///
    /// Registering the instance that is already current is a no-op; any other
    /// instance holding the same UID is rejected.
    pub fn register(&self, entity: Arc<Entity>) -> CoreResult<()> {
        self.register_with(entity, &AuditContext::default())
    }

    pub(crate) fn register_with(&self, entity: Arc<Entity>, context: &AuditContext) -> CoreResult<()> {
        entity.ensure_current()?;
        if let Some(existing) = self.by_uid_or_none(entity.uid()) {
            if Arc::ptr_eq(&existing, &entity) {
                return Ok(());
            }
            return Err(CoreError::DuplicateUid {
                uid: entity.uid().clone(),
            });
        }

        let diff = self.config.track_entity_diff.then(|| created_diff(&entity));
        let audit = EntityAudit::new(EntityAuditType::Created, entity.version(), context, diff);
        self.record(entity.uid(), audit, || {
            self.entities
                .write()
                .insert(entity.uid().clone(), Arc::clone(&entity));
            Ok(())
        })?;
        self.index(&entity);

        self.stats.record_entity_created();
        debug!(uid = %entity.uid(), version = entity.version(), "entity registered");
        Ok(())
    }

    /// Replaces the current version of `entity` with one carrying `changes`.
    ///
    /// `diff` is the journal's structural diff; without one, a field-level
    /// diff of the two versions is recorded instead.
    pub(crate) fn apply_update(
        &self,
        entity: &Arc<Entity>,
        changes: FieldMap,
        context: &AuditContext,
        diff: Option<EntityDiff>,
    ) -> CoreResult<Arc<Entity>> {
        self.ensure_committing("update", entity)?;
        entity.ensure_current()?;
        if changes.is_empty() {
            return Err(CoreError::invalid_operation(format!(
                "no changes provided to update {}",
                entity.describe()
            )));
        }
        let current = self.by_uid(entity.uid())?;
        if !Arc::ptr_eq(&current, entity) {
            return Err(CoreError::superseded(entity.describe()));
        }

        let next = Arc::new(entity.next_version(changes)?);
        let diff = if self.config.track_entity_diff {
            Some(diff.unwrap_or_else(|| manual_diff(entity, &next)))
        } else {
            None
        };
        let audit = EntityAudit::new(EntityAuditType::Updated, next.version(), context, diff);
        self.record(entity.uid(), audit, || {
            entity.supersede_with(Arc::clone(&next))?;
            self.entities
                .write()
                .insert(next.uid().clone(), Arc::clone(&next));
            Ok(())
        })?;
        self.reindex(entity, &next);

        self.stats.record_entity_updated();
        debug!(uid = %next.uid(), version = next.version(), "entity updated");
        Ok(next)
    }

    /// Deletes `entity` and, children first, every entity it owns.
    ///
    /// Returns the deleted versions in deletion order.
    pub(crate) fn delete(
        &self,
        entity: &Arc<Entity>,
        context: &AuditContext,
    ) -> CoreResult<Vec<Arc<Entity>>> {
        self.ensure_committing("delete", entity)?;
        entity.ensure_current()?;
        let mut deleted = Vec::new();
        self.delete_tree(entity, context, &mut deleted)?;
        Ok(deleted)
    }

    fn delete_tree(
        &self,
        entity: &Arc<Entity>,
        context: &AuditContext,
        deleted: &mut Vec<Arc<Entity>>,
    ) -> CoreResult<()> {
        for child_uid in self.children_uids(entity.uid()) {
            if let Some(child) = self.by_uid_or_none(&child_uid) {
                self.delete_tree(&child, context, deleted)?;
            }
        }

        let diff = self.config.track_entity_diff.then(|| deleted_diff(entity));
        let audit = EntityAudit::new(EntityAuditType::Deleted, entity.version() + 1, context, diff);
        self.record(entity.uid(), audit, || {
            entity.mark_deleted();
            self.entities.write().remove(entity.uid());
            Ok(())
        })?;
        self.unindex(entity);

        self.stats.record_entity_deleted();
        info!(uid = %entity.uid(), version = entity.version(), "entity deleted");
        deleted.push(Arc::clone(entity));
        Ok(())
    }

    /// Checks `audit` against the log of `uid`, runs `swap`, then appends.
    ///
    /// Nothing is appended if the check or the swap fails.
    fn record(
        &self,
        uid: &Uid,
        audit: EntityAudit,
        swap: impl FnOnce() -> CoreResult<()>,
    ) -> CoreResult<()> {
        let mut logs = self.audit_logs.write();
        match logs.get(uid) {
            Some(log) => log.check(&audit)?,
            None => EntityAuditLog::new(uid.clone()).check(&audit)?,
        }
        swap()?;
        logs.entry(uid.clone())
            .or_insert_with(|| EntityAuditLog::new(uid.clone()))
            .append(audit)
    }

    // === Indexes ===

    fn index(&self, entity: &Entity) {
        let mut referrers = self.referrers.write();
        for referenced in entity.referenced_uids() {
            referrers
                .entry(referenced)
                .or_default()
                .insert(entity.uid().clone());
        }
        drop(referrers);
        if let Some(parent) = entity.parent_uid() {
            self.children
                .write()
                .entry(parent.clone())
                .or_default()
                .insert(entity.uid().clone());
        }
    }

    fn reindex(&self, previous: &Entity, next: &Entity) {
        let before = previous.referenced_uids();
        let after = next.referenced_uids();
        let mut referrers = self.referrers.write();
        for dropped in before.difference(&after) {
            if let Some(set) = referrers.get_mut(dropped) {
                set.remove(next.uid());
            }
        }
        for added in after.difference(&before) {
            referrers
                .entry(added.clone())
                .or_default()
                .insert(next.uid().clone());
        }
    }

    fn unindex(&self, entity: &Entity) {
        let mut referrers = self.referrers.write();
        for referenced in entity.referenced_uids() {
            if let Some(set) = referrers.get_mut(&referenced) {
                set.remove(entity.uid());
            }
        }
        drop(referrers);
        let mut children = self.children.write();
        if let Some(parent) = entity.parent_uid() {
            if let Some(set) = children.get_mut(parent) {
                set.remove(entity.uid());
            }
        }
        children.remove(entity.uid());
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("entities", &self.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
