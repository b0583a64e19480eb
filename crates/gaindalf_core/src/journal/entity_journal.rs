//! Per-entity pending-mutation tracker.

use super::update::FieldUpdate;
use crate::audit::{AuditContext, EntityDiff};
use crate::collection::{
    JournalledMapping, JournalledOrderedViewSet, JournalledSequence, JournalledSet,
};
use crate::entity::{Entity, EntityRef, EntityStore};
use crate::error::{CoreError, CoreResult};
use crate::schema::{FieldDef, FieldKind};
use crate::uid::Uid;
use crate::value::{FieldMap, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Lifecycle of an [`EntityJournal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalState {
    /// Open with nothing pending.
    Clean,
    /// Open with pending changes or dirty children.
    Dirty,
    /// Changes were applied to the store.
    Committed,
    /// Changes were discarded.
    Aborted,
    /// Terminal; the journal can no longer be used.
    Invalidated,
}

impl JournalState {
    /// Whether the journal still accepts reads and writes.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Clean | Self::Dirty)
    }
}

/// Result of committing one journal.
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    /// Nothing was pending; the entity is unchanged.
    Unchanged(Arc<Entity>),
    /// A new version replaced the journal's entity.
    Updated {
        /// The version the journal was tracking.
        previous: Arc<Entity>,
        /// The version now in the store.
        current: Arc<Entity>,
    },
    /// The entity was deleted, along with the children listed before it.
    Deleted(Vec<Arc<Entity>>),
}

/// Pending changes to one entity within a session.
///
/// Reads see the pending value of a field, falling back to the entity.
/// Collection fields are wrapped in journalled collections on first access so
/// they can be edited in place; nothing reaches the store until
/// [`commit`](EntityJournal::commit).
#[derive(Debug)]
pub struct EntityJournal {
    entity: Arc<Entity>,
    updates: BTreeMap<String, FieldUpdate>,
    dirty_children: BTreeSet<Uid>,
    /// Dirty flag last reported to the parent journal.
    propagated_dirty: bool,
    marked_for_deletion: bool,
    /// `Clean` while open; `state()` reports `Dirty` when appropriate.
    lifecycle: JournalState,
    validate_on_set: bool,
    diff_cache: Option<EntityDiff>,
}

impl EntityJournal {
    /// Creates a clean journal over the current version of an entity.
    pub fn new(entity: Arc<Entity>, validate_on_set: bool) -> Self {
        Self {
            entity,
            updates: BTreeMap::new(),
            dirty_children: BTreeSet::new(),
            propagated_dirty: false,
            marked_for_deletion: false,
            lifecycle: JournalState::Clean,
            validate_on_set,
            diff_cache: None,
        }
    }

    /// The entity version this journal tracks.
    #[must_use]
    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    /// UID of the tracked entity.
    #[must_use]
    pub fn uid(&self) -> &Uid {
        self.entity.uid()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> JournalState {
        match self.lifecycle {
            JournalState::Clean if self.dirty() => JournalState::Dirty,
            state => state,
        }
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if !self.lifecycle.is_open() {
            return Err(CoreError::superseded(format!(
                "journal of {}",
                self.entity.describe()
            )));
        }
        Ok(())
    }

    fn writable_field(&self, name: &str) -> CoreResult<FieldDef> {
        let field = self.entity.schema().resolve(name)?;
        if field.is_read_only() {
            return Err(CoreError::ReadOnlyField {
                namespace: self.entity.namespace().to_string(),
                field: field.name().to_string(),
            });
        }
        Ok(field.clone())
    }

    fn original(&self, field: &str) -> Value {
        self.entity.fields().get(field).cloned().unwrap_or(Value::Null)
    }

    // === Fields ===

    /// Reads a field as it would be after commit.
    ///
    /// Writable collection fields are wrapped on first access, which records
    /// an update entry that stays clean until edited.
    pub fn get_field(&mut self, name: &str) -> CoreResult<Value> {
        self.ensure_open()?;
        let field = self.entity.schema().resolve(name)?.clone();
        if let Some(update) = self.updates.get(field.name()) {
            return Ok(update.materialize());
        }
        let original = self.original(field.name());
        if field.kind().is_collection() && !field.is_read_only() {
            if let Some(update) = FieldUpdate::wrap(&field, &original) {
                self.updates.insert(field.name().to_string(), update);
            }
        }
        Ok(original)
    }

    /// Assigns a field.
    ///
    /// Assigning a value equal to the entity's own clears any pending update
    /// for that field.
    pub fn set_field(&mut self, name: &str, value: Value) -> CoreResult<()> {
        self.ensure_open()?;
        let field = self.writable_field(name)?;
        let value = field.coerce(value);
        if value == self.original(field.name()) {
            self.updates.remove(field.name());
            return Ok(());
        }
        if field.is_protected() {
            return Err(CoreError::ProtectedField {
                namespace: self.entity.namespace().to_string(),
                field: field.name().to_string(),
            });
        }
        if self.validate_on_set {
            field.validate_value(&value)?;
        }
        self.updates
            .insert(field.name().to_string(), FieldUpdate::Assigned(value));
        Ok(())
    }

    fn wrapper_mut(&mut self, name: &str, kind: FieldKind) -> CoreResult<&mut FieldUpdate> {
        self.ensure_open()?;
        let field = self.writable_field(name)?;
        if field.kind() != kind {
            return Err(CoreError::type_mismatch(
                field.name(),
                kind.name(),
                field.kind().name(),
            ));
        }
        if !self.updates.contains_key(field.name()) {
            let original = self.original(field.name());
            let update = FieldUpdate::wrap(&field, &original).ok_or_else(|| {
                CoreError::type_mismatch(field.name(), kind.name(), original.type_name())
            })?;
            self.updates.insert(field.name().to_string(), update);
        }
        match self.updates.get_mut(field.name()) {
            Some(FieldUpdate::Assigned(_)) => Err(CoreError::invalid_operation(format!(
                "field {} was reassigned in this journal and cannot be edited in place",
                field.name()
            ))),
            Some(update) => Ok(update),
            None => Err(CoreError::invalid_operation("field update vanished")),
        }
    }

    /// Journalled view of a sequence field.
    pub fn sequence_mut(&mut self, name: &str) -> CoreResult<&mut JournalledSequence<Value>> {
        match self.wrapper_mut(name, FieldKind::Sequence)? {
            FieldUpdate::Sequence(inner) => Ok(inner),
            _ => Err(CoreError::invalid_operation("field is not a sequence")),
        }
    }

    /// Journalled view of a mapping field.
    pub fn mapping_mut(&mut self, name: &str) -> CoreResult<&mut JournalledMapping<Value, Value>> {
        match self.wrapper_mut(name, FieldKind::Mapping)? {
            FieldUpdate::Mapping(inner) => Ok(inner),
            _ => Err(CoreError::invalid_operation("field is not a mapping")),
        }
    }

    /// Journalled view of a set field.
    pub fn set_mut(&mut self, name: &str) -> CoreResult<&mut JournalledSet<Value>> {
        match self.wrapper_mut(name, FieldKind::Set)? {
            FieldUpdate::Set(inner) => Ok(inner),
            _ => Err(CoreError::invalid_operation("field is not a set")),
        }
    }

    /// Journalled view of an ordered view set field.
    pub fn ordered_view_mut(
        &mut self,
        name: &str,
    ) -> CoreResult<&mut JournalledOrderedViewSet<Value>> {
        match self.wrapper_mut(name, FieldKind::OrderedViewSet)? {
            FieldUpdate::OrderedView(inner) => Ok(inner),
            _ => Err(CoreError::invalid_operation("field is not an ordered view set")),
        }
    }

    /// Pending updates by canonical field name, clean wrappers included.
    #[must_use]
    pub fn updates(&self) -> &BTreeMap<String, FieldUpdate> {
        &self.updates
    }

    // === Dirty tracking ===

    /// Whether committing would change anything.
    #[must_use]
    pub fn dirty(&self) -> bool {
        self.marked_for_deletion
            || !self.dirty_children.is_empty()
            || self.updates.values().any(FieldUpdate::is_pending)
    }

    /// Whether any child journal is dirty.
    #[must_use]
    pub fn has_dirty_children(&self) -> bool {
        !self.dirty_children.is_empty()
    }

    /// UIDs of dirty child journals.
    #[must_use]
    pub fn dirty_children(&self) -> &BTreeSet<Uid> {
        &self.dirty_children
    }

    /// Records whether the child journal of `child` is dirty.
    pub fn update_child_dirty_state(&mut self, child: &Uid, dirty: bool) {
        if dirty {
            self.dirty_children.insert(child.clone());
        } else {
            self.dirty_children.remove(child);
        }
    }

    /// Returns the new dirty flag if it changed since last reported.
    pub(crate) fn take_propagation(&mut self) -> Option<bool> {
        let dirty = self.dirty();
        if dirty == self.propagated_dirty {
            return None;
        }
        self.propagated_dirty = dirty;
        Some(dirty)
    }

    // === Diff ===

    /// Pending updates in audit form, clean wrappers omitted.
    ///
    /// Fixed once the journal is invalidated.
    #[must_use]
    pub fn get_diff(&self) -> EntityDiff {
        if let Some(cached) = &self.diff_cache {
            return cached.clone();
        }
        self.updates
            .iter()
            .filter(|(_, update)| update.is_pending())
            .map(|(name, update)| (name.clone(), update.diff()))
            .collect()
    }

    fn pending_changes(&self) -> FieldMap {
        self.updates
            .iter()
            .filter(|(_, update)| update.is_pending())
            .map(|(name, update)| (name.clone(), update.materialize()))
            .collect()
    }

    // === Lifecycle ===

    /// Marks the entity for deletion at commit.
    pub fn delete(&mut self) -> CoreResult<()> {
        self.ensure_open()?;
        self.marked_for_deletion = true;
        Ok(())
    }

    /// Whether [`delete`](Self::delete) was called.
    #[must_use]
    pub fn is_marked_for_deletion(&self) -> bool {
        self.marked_for_deletion
    }

    /// Applies the pending changes to the store.
    ///
    /// A journal with nothing pending returns its entity unchanged. Dirty
    /// children must already have been committed by the caller.
    pub fn commit(&mut self, store: &EntityStore, context: &AuditContext) -> CoreResult<CommitOutcome> {
        self.ensure_open()?;
        if self.marked_for_deletion {
            let deleted = store.delete(&self.entity, context)?;
            self.lifecycle = JournalState::Committed;
            return Ok(CommitOutcome::Deleted(deleted));
        }
        let changes = self.pending_changes();
        if changes.is_empty() {
            self.lifecycle = JournalState::Committed;
            return Ok(CommitOutcome::Unchanged(Arc::clone(&self.entity)));
        }
        let current = store.apply_update(&self.entity, changes, context, Some(self.get_diff()))?;
        self.lifecycle = JournalState::Committed;
        Ok(CommitOutcome::Updated {
            previous: Arc::clone(&self.entity),
            current,
        })
    }

    /// Discards every pending change.
    pub fn abort(&mut self) -> CoreResult<()> {
        self.ensure_open()?;
        self.updates.clear();
        self.dirty_children.clear();
        self.marked_for_deletion = false;
        self.lifecycle = JournalState::Aborted;
        Ok(())
    }

    /// Makes the journal terminal, freezing its collections and its diff.
    pub fn invalidate(&mut self) {
        if self.lifecycle == JournalState::Invalidated {
            return;
        }
        self.diff_cache = Some(self.get_diff());
        for update in self.updates.values_mut() {
            update.freeze();
        }
        self.lifecycle = JournalState::Invalidated;
    }

    /// Reacts to a referenced entity being replaced or deleted.
    ///
    /// On deletion (`current` is `None`) the entity is removed from set and
    /// ordered view fields. On update, ordered views holding it reposition
    /// it if its sort key changed. Returns whether anything was recorded.
    pub fn on_dependency_invalidated(
        &mut self,
        previous: &Arc<Entity>,
        current: Option<&Arc<Entity>>,
    ) -> CoreResult<bool> {
        self.ensure_open()?;
        let item = Value::Entity(EntityRef::new(Arc::clone(previous)));
        let fields: Vec<FieldDef> = self
            .entity
            .schema()
            .fields()
            .iter()
            .filter(|field| matches!(field.kind(), FieldKind::Set | FieldKind::OrderedViewSet))
            .cloned()
            .collect();

        let mut changed = false;
        for field in fields {
            let holds_item = match self.updates.get(field.name()) {
                Some(update) => update.materialize().contains_item(&item),
                None => self.original(field.name()).contains_item(&item),
            };
            if !holds_item {
                continue;
            }
            changed |= match current {
                None => self.discard_reference(&field, &item)?,
                Some(_) => self.reposition_reference(&field, &item, previous.sort_key())?,
            };
        }
        Ok(changed)
    }

    fn discard_reference(&mut self, field: &FieldDef, item: &Value) -> CoreResult<bool> {
        if let Some(FieldUpdate::Assigned(value)) = self.updates.get(field.name()) {
            return Ok(match value.without_item(item) {
                Some(remaining) => {
                    self.updates
                        .insert(field.name().to_string(), FieldUpdate::Assigned(remaining));
                    true
                }
                None => false,
            });
        }
        match field.kind() {
            FieldKind::Set => self.set_mut(field.name())?.discard(item),
            _ => self.ordered_view_mut(field.name())?.discard(item),
        }
    }

    fn reposition_reference(
        &mut self,
        field: &FieldDef,
        item: &Value,
        old_key: Value,
    ) -> CoreResult<bool> {
        if field.kind() != FieldKind::OrderedViewSet {
            return Ok(false);
        }
        if let Some(FieldUpdate::Assigned(value)) = self.updates.get(field.name()) {
            // An assigned view may hold a sort cache built with the old key.
            if let Value::OrderedView(view) = value {
                let rebuilt = Value::ordered_view(view.iter().cloned(), view.is_reversed());
                self.updates
                    .insert(field.name().to_string(), FieldUpdate::Assigned(rebuilt));
            }
            return Ok(false);
        }
        self.ordered_view_mut(field.name())?
            .on_item_updated(item, old_key)
    }
}
