//! Session state and the journals it owns.

use super::handle::JournalHandle;
use crate::audit::{now_millis, AuditContext};
use crate::entity::{Entity, EntityDraft, EntityStore};
use crate::error::{CoreError, CoreResult};
use crate::journal::{CommitOutcome, EntityJournal};
use crate::uid::Uid;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Namespace session UIDs are allocated from.
pub const SESSION_NAMESPACE: &str = "Session";

/// State of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Open, possibly with pending changes.
    Active,
    /// Open; everything pending so far was committed.
    Committed,
    /// Pending changes were discarded. Terminal.
    Aborted,
    /// Committed and closed. Terminal.
    Ended,
    /// A commit failed part-way. Terminal.
    Failed,
}

impl SessionState {
    /// Whether the session still accepts work.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Active | Self::Committed)
    }
}

/// A transaction boundary grouping the journals of every entity it touches.
///
/// Entities are never changed while the session runs; edits accumulate in
/// journals and reach the store on [`commit`](Session::commit). Dropping an
/// open session aborts it.
pub struct Session {
    store: Arc<EntityStore>,
    active: Arc<AtomicBool>,
    uid: Uid,
    context: AuditContext,
    started_at: u64,
    state: SessionState,
    journals: BTreeMap<Uid, EntityJournal>,
    /// Entities created in this session, registered at commit.
    staged: BTreeMap<Uid, Arc<Entity>>,
    released: bool,
}

impl Session {
    pub(crate) fn new(
        store: Arc<EntityStore>,
        active: Arc<AtomicBool>,
        actor: String,
        reason: String,
    ) -> CoreResult<Self> {
        let uid = store.generate_next_uid(SESSION_NAMESPACE)?;
        store.stats().record_session_start();
        info!(session = %uid, actor = %actor, reason = %reason, "session started");
        Ok(Self {
            store,
            active,
            uid,
            context: AuditContext::new(actor, reason),
            started_at: now_millis(),
            state: SessionState::Active,
            journals: BTreeMap::new(),
            staged: BTreeMap::new(),
            released: false,
        })
    }

    /// UID of this session.
    #[must_use]
    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    /// Actor recorded in audit entries.
    #[must_use]
    pub fn actor(&self) -> Option<&str> {
        self.context.who.as_deref()
    }

    /// Reason recorded in audit entries.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.context.why.as_deref()
    }

    /// Milliseconds since the Unix epoch when the session began.
    #[must_use]
    pub fn started_at(&self) -> u64 {
        self.started_at
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The store the session commits to.
    #[must_use]
    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if !self.state.is_open() {
            return Err(CoreError::superseded(format!("session {}", self.uid)));
        }
        Ok(())
    }

    /// Whether any journal or staged creation is pending.
    #[must_use]
    pub fn dirty(&self) -> bool {
        !self.staged.is_empty() || self.journals.values().any(EntityJournal::dirty)
    }

    // === Lookup ===

    fn lookup_or_none(&self, uid: &Uid) -> Option<Arc<Entity>> {
        self.staged
            .get(uid)
            .cloned()
            .or_else(|| self.store.by_uid_or_none(uid))
    }

    /// Current version of `uid`, including entities staged in this session.
    pub fn entity(&self, uid: &Uid) -> CoreResult<Arc<Entity>> {
        self.ensure_open()?;
        self.lookup_or_none(uid)
            .ok_or_else(|| CoreError::EntityNotFound { uid: uid.clone() })
    }

    /// Stages a new entity. It is validated now and registered at commit.
    pub fn create(&mut self, draft: EntityDraft) -> CoreResult<Arc<Entity>> {
        self.ensure_open()?;
        let entity = self.store.instantiate(draft)?;
        if self.staged.contains_key(entity.uid()) {
            return Err(CoreError::DuplicateUid {
                uid: entity.uid().clone(),
            });
        }
        self.staged.insert(entity.uid().clone(), Arc::clone(&entity));
        self.state = SessionState::Active;
        debug!(session = %self.uid, uid = %entity.uid(), "entity staged");
        Ok(entity)
    }

    // === Journals ===

    /// Creates or returns the journal tracking `entity`.
    ///
    /// A journal left behind by an older version is replaced if clean. If it
    /// holds changes it is invalidated and the call fails.
    pub fn get_entity_journal(&mut self, entity: &Arc<Entity>) -> CoreResult<&mut EntityJournal> {
        self.ensure_open()?;
        let current = self
            .lookup_or_none(entity.uid())
            .ok_or_else(|| CoreError::EntityNotFound {
                uid: entity.uid().clone(),
            })?;
        if !Arc::ptr_eq(&current, entity) {
            return Err(CoreError::superseded(entity.describe()));
        }

        let uid = entity.uid().clone();
        let stale = self
            .journals
            .get(&uid)
            .is_some_and(|journal| !Arc::ptr_eq(journal.entity(), &current));
        if stale {
            if let Some(mut journal) = self.journals.remove(&uid) {
                if journal.dirty() {
                    journal.invalidate();
                    warn!(session = %self.uid, uid = %uid, "discarded dirty journal of a superseded entity");
                    return Err(CoreError::superseded(format!(
                        "journal of {}",
                        journal.entity().describe()
                    )));
                }
            }
        }

        self.state = SessionState::Active;
        let validate_on_set = self.store.config().validate_on_set;
        Ok(self
            .journals
            .entry(uid)
            .or_insert_with(|| EntityJournal::new(current, validate_on_set)))
    }

    /// Typed accessor for the journal of `uid`.
    pub fn journal(&mut self, uid: &Uid) -> CoreResult<JournalHandle<'_>> {
        let entity = self.entity(uid)?;
        self.get_entity_journal(&entity)?;
        Ok(JournalHandle::new(self, uid.clone()))
    }

    pub(crate) fn journal_mut(&mut self, uid: &Uid) -> CoreResult<&mut EntityJournal> {
        self.ensure_open()?;
        self.journals
            .get_mut(uid)
            .ok_or_else(|| CoreError::invalid_operation(format!("no journal open for {uid}")))
    }

    /// Reports dirty-state transitions of `uid`'s journal up the parent chain.
    pub(crate) fn propagate(&mut self, uid: &Uid) -> CoreResult<()> {
        let mut current = uid.clone();
        loop {
            let Some(journal) = self.journals.get_mut(&current) else {
                return Ok(());
            };
            let Some(dirty) = journal.take_propagation() else {
                return Ok(());
            };
            let Some(parent_uid) = journal.entity().parent_uid().cloned() else {
                return Ok(());
            };
            if !dirty && !self.journals.contains_key(&parent_uid) {
                return Ok(());
            }
            let Some(parent) = self.lookup_or_none(&parent_uid) else {
                return Ok(());
            };
            self.get_entity_journal(&parent)?
                .update_child_dirty_state(&current, dirty);
            current = parent_uid;
        }
    }

    /// Journals under `root` in commit order: children before their parent.
    ///
    /// Subtrees whose journal fails `condition` are skipped. A journal that
    /// is no longer open is a commit ordering error.
    pub fn commit_yield_hierarchy(
        &self,
        root: &Uid,
        condition: impl Fn(&EntityJournal) -> bool,
    ) -> CoreResult<Vec<Uid>> {
        let mut order = Vec::new();
        let mut visited = BTreeSet::new();
        self.visit_hierarchy(root, &condition, &mut visited, &mut order)?;
        Ok(order)
    }

    fn visit_hierarchy(
        &self,
        uid: &Uid,
        condition: &impl Fn(&EntityJournal) -> bool,
        visited: &mut BTreeSet<Uid>,
        order: &mut Vec<Uid>,
    ) -> CoreResult<()> {
        let Some(journal) = self.journals.get(uid) else {
            return Ok(());
        };
        if !journal.state().is_open() {
            return Err(CoreError::commit_order(format!(
                "journal of {uid} was invalidated during commit"
            )));
        }
        if !condition(journal) || !visited.insert(uid.clone()) {
            return Ok(());
        }
        for child in journal.dirty_children() {
            self.visit_hierarchy(child, condition, visited, order)?;
        }
        order.push(uid.clone());
        Ok(())
    }

    // === Commit ===

    fn is_dirty_root(&self, journal: &EntityJournal) -> bool {
        if !journal.dirty() {
            return false;
        }
        match journal.entity().parent_uid() {
            None => true,
            Some(parent) => self
                .journals
                .get(parent)
                .map_or(true, |parent| !parent.dirty_children().contains(journal.uid())),
        }
    }

    /// Applies every pending change to the store.
    ///
    /// Staged entities are registered first. Dirty journals are then
    /// committed children first, and entities depending on a committed one
    /// are notified, which may dirty them for another pass. A failure leaves
    /// the store consistent but the session unusable.
    pub fn commit(&mut self) -> CoreResult<()> {
        self.ensure_open()?;
        if !self.dirty() {
            self.discard_journals();
            self.state = SessionState::Committed;
            return Ok(());
        }
        match self.commit_pending() {
            Ok(committed) => {
                self.discard_journals();
                self.state = SessionState::Committed;
                self.store.stats().record_session_commit();
                info!(session = %self.uid, journals = committed, "session committed");
                Ok(())
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn commit_pending(&mut self) -> CoreResult<usize> {
        let store = Arc::clone(&self.store);
        let _scope = store.commit_scope();
        for (_, entity) in std::mem::take(&mut self.staged) {
            self.store.register_with(entity, &self.context)?;
        }

        let max_passes = self.store.config().max_commit_passes;
        let mut committed = 0;
        let mut passes = 0;
        loop {
            let roots: Vec<Uid> = self
                .journals
                .values()
                .filter(|journal| self.is_dirty_root(journal))
                .map(|journal| journal.uid().clone())
                .collect();
            if roots.is_empty() {
                return Ok(committed);
            }
            passes += 1;
            if passes > max_passes {
                return Err(CoreError::commit_order(format!(
                    "{} journals still dirty after {max_passes} commit passes",
                    roots.len()
                )));
            }
            self.store.stats().record_commit_pass();
            debug!(session = %self.uid, pass = passes, roots = roots.len(), "commit pass");

            for root in roots {
                for uid in self.commit_yield_hierarchy(&root, EntityJournal::dirty)? {
                    if self.commit_journal(&uid)? {
                        committed += 1;
                    }
                }
            }
        }
    }

    fn commit_journal(&mut self, uid: &Uid) -> CoreResult<bool> {
        let Some(mut journal) = self.journals.remove(uid) else {
            return Ok(false);
        };
        if !journal.dirty() {
            self.journals.insert(uid.clone(), journal);
            return Ok(false);
        }
        if journal.has_dirty_children() {
            return Err(CoreError::commit_order(format!(
                "journal of {uid} committed before its dirty children"
            )));
        }

        let outcome = journal.commit(&self.store, &self.context)?;
        journal.invalidate();
        self.store.stats().record_journal_commit();
        debug!(session = %self.uid, uid = %uid, "journal committed");

        if let Some(parent) = journal.entity().parent_uid() {
            if let Some(parent_journal) = self.journals.get_mut(parent) {
                parent_journal.update_child_dirty_state(uid, false);
            }
            let parent = parent.clone();
            self.propagate(&parent)?;
        }

        match outcome {
            CommitOutcome::Unchanged(_) => {}
            CommitOutcome::Updated { previous, current } => {
                self.notify_dependents(&previous, Some(&current))?;
            }
            CommitOutcome::Deleted(deleted) => {
                for entity in &deleted {
                    self.journals.remove(entity.uid());
                }
                for entity in &deleted {
                    self.notify_dependents(entity, None)?;
                }
            }
        }
        Ok(true)
    }

    fn notify_dependents(
        &mut self,
        previous: &Arc<Entity>,
        current: Option<&Arc<Entity>>,
    ) -> CoreResult<()> {
        for dependent_uid in self.store.dependents_of(previous) {
            let Some(dependent) = self.lookup_or_none(&dependent_uid) else {
                continue;
            };
            let changed = self
                .get_entity_journal(&dependent)?
                .on_dependency_invalidated(previous, current)?;
            if changed {
                debug!(
                    session = %self.uid,
                    uid = %dependent_uid,
                    dependency = %previous.uid(),
                    "dependent updated"
                );
                self.propagate(&dependent_uid)?;
            }
        }
        Ok(())
    }

    fn discard_journals(&mut self) {
        for journal in self.journals.values_mut() {
            journal.invalidate();
        }
        self.journals.clear();
    }

    fn fail(&mut self, err: &CoreError) {
        self.discard_journals();
        self.staged.clear();
        self.state = SessionState::Failed;
        self.store.stats().record_error();
        self.release();
        warn!(session = %self.uid, error = %err, "session commit failed");
    }

    fn release(&mut self) {
        if !self.released {
            self.active.store(false, Ordering::Release);
            self.released = true;
        }
    }

    // === Termination ===

    /// Discards every pending change and closes the session.
    pub fn abort(&mut self) -> CoreResult<()> {
        self.ensure_open()?;
        for journal in self.journals.values_mut() {
            journal.abort()?;
        }
        self.discard_journals();
        self.staged.clear();
        self.state = SessionState::Aborted;
        self.store.stats().record_session_abort();
        self.release();
        info!(session = %self.uid, "session aborted");
        Ok(())
    }

    /// Commits and closes the session.
    pub fn end(&mut self) -> CoreResult<()> {
        self.commit()?;
        self.state = SessionState::Ended;
        self.release();
        info!(session = %self.uid, "session ended");
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state.is_open() {
            if self.dirty() {
                warn!(session = %self.uid, "session dropped with pending changes; aborting");
            }
            if let Err(err) = self.abort() {
                warn!(session = %self.uid, error = %err, "abort on drop failed");
            }
        }
        self.release();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("uid", &self.uid)
            .field("state", &self.state)
            .field("journals", &self.journals.len())
            .field("staged", &self.staged.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::schema::{EntitySchema, FieldDef, ItemConstraint};
    use crate::session::SessionManager;
    use crate::value::Value;

    fn manager_with(config: EngineConfig) -> SessionManager {
        let store = EntityStore::new(config);
        store
            .register_schema(
                EntitySchema::builder("Book")
                    .field(FieldDef::scalar("title", ItemConstraint::Text))
                    .field(FieldDef::ordered_view_set("pages", ItemConstraint::entity("Page")))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        store
            .register_schema(
                EntitySchema::builder("Page")
                    .field(FieldDef::scalar("number", ItemConstraint::Integer))
                    .sort_key(["number"])
                    .build()
                    .unwrap(),
            )
            .unwrap();
        SessionManager::new(Arc::new(store))
    }

    fn book_with_pages(manager: &SessionManager, numbers: &[i64]) -> (Arc<Entity>, Vec<Arc<Entity>>) {
        let store = manager.store();
        let book_uid = store.generate_next_uid("Book").unwrap();
        let pages: Vec<Arc<Entity>> = numbers
            .iter()
            .map(|n| {
                store
                    .create(EntityDraft::new("Page").parent(&book_uid).field("number", *n))
                    .unwrap()
            })
            .collect();
        let items: Vec<Value> = pages.iter().map(Value::from).collect();
        let book = store
            .create(
                EntityDraft::new("Book")
                    .with_uid(book_uid)
                    .field("title", "Draft")
                    .field("pages", Value::sequence(items)),
            )
            .unwrap();
        (book, pages)
    }

    #[test]
    fn child_edits_mark_parent_dirty() {
        let manager = manager_with(EngineConfig::default());
        let (book, pages) = book_with_pages(&manager, &[1, 2]);
        let mut session = manager.begin("editor", "renumber").unwrap();

        session.journal(pages[0].uid()).unwrap().set_field("number", 5i64).unwrap();
        let parent = session.journal_mut(book.uid()).unwrap();
        assert!(parent.dirty_children().contains(pages[0].uid()));
        assert!(parent.dirty());

        let order = session
            .commit_yield_hierarchy(book.uid(), EntityJournal::dirty)
            .unwrap();
        assert_eq!(order, vec![pages[0].uid().clone(), book.uid().clone()]);

        session.journal(pages[0].uid()).unwrap().set_field("number", 1i64).unwrap();
        assert!(!session.journal_mut(book.uid()).unwrap().dirty());
        assert!(!session.dirty());
    }

    #[test]
    fn commit_repositions_parent_view() {
        let manager = manager_with(EngineConfig::default());
        let (book, pages) = book_with_pages(&manager, &[1, 2]);
        let mut session = manager.begin("editor", "renumber").unwrap();
        session.journal(pages[0].uid()).unwrap().set_field("number", 5i64).unwrap();
        session.commit().unwrap();
        assert_eq!(session.state(), SessionState::Committed);

        let store = manager.store();
        let page = store.by_uid(pages[0].uid()).unwrap();
        assert_eq!(page.version(), 2);
        let book_now = store.by_uid(book.uid()).unwrap();
        assert_eq!(book_now.version(), book.version() + 1);
        let order: Vec<Uid> = book_now
            .field("pages")
            .unwrap()
            .as_ordered_view()
            .unwrap()
            .sorted()
            .iter()
            .map(|item| item.as_entity().unwrap().uid().clone())
            .collect();
        assert_eq!(order, vec![pages[1].uid().clone(), pages[0].uid().clone()]);
        session.end().unwrap();
    }

    #[test]
    fn stale_journal_entity_is_rejected() {
        let manager = manager_with(EngineConfig::default());
        let (book, _) = book_with_pages(&manager, &[]);
        let mut session = manager.begin("editor", "retitle").unwrap();
        session.journal(book.uid()).unwrap().set_field("title", "Final").unwrap();
        session.commit().unwrap();

        assert!(session.get_entity_journal(&book).unwrap_err().is_superseded());
        let current = session.entity(book.uid()).unwrap();
        assert!(session.get_entity_journal(&current).is_ok());
    }

    #[test]
    fn ended_session_refuses_work() {
        let manager = manager_with(EngineConfig::default());
        let (book, _) = book_with_pages(&manager, &[]);
        let mut session = manager.begin("editor", "nothing").unwrap();
        session.end().unwrap();
        assert!(session.journal(book.uid()).unwrap_err().is_superseded());
        assert!(session.commit().unwrap_err().is_superseded());
        assert!(session.abort().unwrap_err().is_superseded());
    }

    #[test]
    fn exhausted_passes_fail_the_session() {
        let manager = manager_with(EngineConfig::new().max_commit_passes(0));
        let (book, _) = book_with_pages(&manager, &[]);
        let mut session = manager.begin("editor", "retitle").unwrap();
        session.journal(book.uid()).unwrap().set_field("title", "Final").unwrap();

        assert!(matches!(
            session.commit(),
            Err(CoreError::CommitOrder { .. })
        ));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(!manager.in_session());
        assert!(!manager.store().committing());
        assert!(!book.superseded());
        assert_eq!(manager.store().stats().errors(), 1);
    }

    #[test]
    fn staged_entities_register_at_commit() {
        let manager = manager_with(EngineConfig::default());
        let mut session = manager.begin("editor", "new book").unwrap();
        let book = session
            .create(EntityDraft::new("Book").field("title", "New"))
            .unwrap();
        assert!(session.dirty());
        assert!(!manager.store().contains(book.uid()));
        assert!(Arc::ptr_eq(&session.entity(book.uid()).unwrap(), &book));

        session.journal(book.uid()).unwrap().set_field("title", "Newer").unwrap();
        session.commit().unwrap();

        let stored = manager.store().by_uid(book.uid()).unwrap();
        assert_eq!(stored.version(), 2);
        assert_eq!(stored.field("title").unwrap(), &Value::from("Newer"));
        let log = manager.store().audit_log(book.uid()).unwrap();
        assert_eq!(log.entries()[0].why.as_deref(), Some("new book"));
    }

    #[test]
    fn drop_aborts_open_session() {
        let manager = manager_with(EngineConfig::default());
        let (book, _) = book_with_pages(&manager, &[]);
        {
            let mut session = manager.begin("editor", "forgotten").unwrap();
            session.journal(book.uid()).unwrap().set_field("title", "Lost").unwrap();
        }
        assert!(!manager.in_session());
        assert!(!book.superseded());
        assert_eq!(manager.store().stats().sessions_aborted(), 1);
    }
}
