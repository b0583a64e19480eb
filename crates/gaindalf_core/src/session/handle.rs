//! Typed accessor for one entity's journal.

use super::state::Session;
use crate::audit::EntityDiff;
use crate::collection::{
    JournalledMapping, JournalledOrderedViewSet, JournalledSequence, JournalledSet,
};
use crate::entity::Entity;
use crate::error::CoreResult;
use crate::journal::{EntityJournal, JournalState};
use crate::uid::Uid;
use crate::value::Value;
use std::sync::Arc;

/// Reads and writes one entity through its session journal.
///
/// Every mutating call reports the journal's dirty state to its parent.
pub struct JournalHandle<'s> {
    session: &'s mut Session,
    uid: Uid,
}

impl<'s> JournalHandle<'s> {
    pub(crate) fn new(session: &'s mut Session, uid: Uid) -> Self {
        Self { session, uid }
    }

    fn journal(&mut self) -> CoreResult<&mut EntityJournal> {
        self.session.journal_mut(&self.uid)
    }

    /// UID of the journalled entity.
    #[must_use]
    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    /// The entity version the journal tracks.
    pub fn entity(&mut self) -> CoreResult<Arc<Entity>> {
        Ok(Arc::clone(self.journal()?.entity()))
    }

    /// Journal state.
    pub fn state(&mut self) -> CoreResult<JournalState> {
        Ok(self.journal()?.state())
    }

    /// Whether the journal holds pending changes.
    pub fn dirty(&mut self) -> CoreResult<bool> {
        Ok(self.journal()?.dirty())
    }

    /// Pending changes in audit form.
    pub fn diff(&mut self) -> CoreResult<EntityDiff> {
        Ok(self.journal()?.get_diff())
    }

    /// Reads a field as it would be after commit.
    pub fn get_field(&mut self, name: &str) -> CoreResult<Value> {
        self.journal()?.get_field(name)
    }

    /// Assigns a field.
    pub fn set_field(&mut self, name: &str, value: impl Into<Value>) -> CoreResult<()> {
        let result = self.journal()?.set_field(name, value.into());
        self.finish(result)
    }

    /// Marks the entity, and the entities it owns, for deletion at commit.
    pub fn delete(&mut self) -> CoreResult<()> {
        let result = self.journal()?.delete();
        self.finish(result)
    }

    /// Edits a sequence field in place.
    pub fn edit_sequence<R>(
        &mut self,
        name: &str,
        edit: impl FnOnce(&mut JournalledSequence<Value>) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let result = edit(self.journal()?.sequence_mut(name)?);
        self.finish(result)
    }

    /// Edits a mapping field in place.
    pub fn edit_mapping<R>(
        &mut self,
        name: &str,
        edit: impl FnOnce(&mut JournalledMapping<Value, Value>) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let result = edit(self.journal()?.mapping_mut(name)?);
        self.finish(result)
    }

    /// Edits a set field in place.
    pub fn edit_set<R>(
        &mut self,
        name: &str,
        edit: impl FnOnce(&mut JournalledSet<Value>) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let result = edit(self.journal()?.set_mut(name)?);
        self.finish(result)
    }

    /// Edits an ordered view set field in place.
    pub fn edit_ordered_view<R>(
        &mut self,
        name: &str,
        edit: impl FnOnce(&mut JournalledOrderedViewSet<Value>) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let result = edit(self.journal()?.ordered_view_mut(name)?);
        self.finish(result)
    }

    fn finish<R>(&mut self, result: CoreResult<R>) -> CoreResult<R> {
        self.session.propagate(&self.uid)?;
        result
    }
}

impl std::fmt::Debug for JournalHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalHandle")
            .field("session", self.session.uid())
            .field("uid", &self.uid)
            .finish()
    }
}
