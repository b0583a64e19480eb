//! Session manager.

use super::state::Session;
use crate::entity::EntityStore;
use crate::error::{CoreError, CoreResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Hands out sessions over one store, one at a time.
///
/// The manager is the execution context: while a session it created is
/// open, [`begin`](SessionManager::begin) fails.
#[derive(Debug)]
pub struct SessionManager {
    store: Arc<EntityStore>,
    active: Arc<AtomicBool>,
}

impl SessionManager {
    /// Creates a manager over `store`.
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self {
            store,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The store sessions commit to.
    #[must_use]
    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// Whether a session is currently open.
    #[must_use]
    pub fn in_session(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Opens a session.
    pub fn begin(&self, actor: impl Into<String>, reason: impl Into<String>) -> CoreResult<Session> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CoreError::SessionAlreadyActive)?;
        Session::new(
            Arc::clone(&self.store),
            Arc::clone(&self.active),
            actor.into(),
            reason.into(),
        )
        .inspect_err(|_| self.active.store(false, Ordering::Release))
    }

    /// Runs `f` inside a session.
    ///
    /// The session is ended (committed) if `f` succeeds and aborted if it
    /// fails; the error from `f` is returned either way.
    pub fn run<T>(
        &self,
        actor: impl Into<String>,
        reason: impl Into<String>,
        f: impl FnOnce(&mut Session) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut session = self.begin(actor, reason)?;
        match f(&mut session) {
            Ok(value) => {
                session.end()?;
                Ok(value)
            }
            Err(err) => {
                // Try to abort, but don't mask the original error
                if session.state().is_open() {
                    if let Err(abort_err) = session.abort() {
                        warn!(session = %session.uid(), error = %abort_err, "abort failed");
                    }
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::entity::EntityDraft;
    use crate::schema::{EntitySchema, FieldDef, ItemConstraint};
    use crate::session::SessionState;
    use crate::value::Value;

    fn manager() -> SessionManager {
        let store = EntityStore::new(EngineConfig::default());
        store
            .register_schema(
                EntitySchema::builder("Counter")
                    .field(FieldDef::scalar("value", ItemConstraint::Integer))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        SessionManager::new(Arc::new(store))
    }

    #[test]
    fn one_session_at_a_time() {
        let manager = manager();
        let session = manager.begin("alice", "first").unwrap();
        assert!(manager.in_session());
        assert!(matches!(
            manager.begin("bob", "second"),
            Err(CoreError::SessionAlreadyActive)
        ));
        drop(session);
        assert!(!manager.in_session());
        assert!(manager.begin("bob", "second").is_ok());
    }

    #[test]
    fn sessions_get_uids() {
        let manager = manager();
        let mut first = manager.begin("alice", "first").unwrap();
        assert_eq!(first.uid().to_string(), "Session-1");
        assert_eq!(first.actor(), Some("alice"));
        assert_eq!(first.reason(), Some("first"));
        first.end().unwrap();
        assert_eq!(first.state(), SessionState::Ended);
        let second = manager.begin("alice", "again").unwrap();
        assert_eq!(second.uid().to_string(), "Session-2");
    }

    #[test]
    fn run_ends_on_success() {
        let manager = manager();
        let uid = manager
            .run("alice", "create", |session| {
                let counter = session.create(EntityDraft::new("Counter").field("value", 1i64))?;
                Ok(counter.uid().clone())
            })
            .unwrap();
        assert!(!manager.in_session());
        let counter = manager.store().by_uid(&uid).unwrap();
        assert_eq!(counter.field("value").unwrap(), &Value::from(1i64));
        let log = manager.store().audit_log(&uid).unwrap();
        assert_eq!(log.entries()[0].who.as_deref(), Some("alice"));
        assert_eq!(manager.store().stats().sessions_committed(), 1);
    }

    #[test]
    fn run_aborts_on_error() {
        let manager = manager();
        let counter = manager
            .store()
            .create(EntityDraft::new("Counter").field("value", 1i64))
            .unwrap();
        let err = manager
            .run("alice", "fail", |session| {
                session.journal(counter.uid())?.set_field("value", 2i64)?;
                Err::<(), _>(CoreError::invalid_operation("changed my mind"))
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
        assert!(!manager.in_session());
        assert!(!counter.superseded());
        assert_eq!(manager.store().stats().sessions_aborted(), 1);
    }
}
