//! Engine statistics.
//!
//! Counters describing session and entity activity on one
//! [`EntityStore`](crate::EntityStore).
//!
//! # Usage
//!
//! ```rust,ignore
//! use gaindalf_core::{EngineConfig, EntityStore};
//!
//! let store = EntityStore::new(EngineConfig::default());
//!
//! // Open sessions, commit changes...
//!
//! let stats = store.stats().snapshot();
//! println!("Sessions committed: {}", stats.sessions_committed);
//! println!("Entities updated: {}", stats.entities_updated);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Engine statistics.
///
/// All counters are atomic and only ever increase.
#[derive(Debug, Default)]
pub struct EngineStats {
    // Session counters
    sessions_started: AtomicU64,
    sessions_committed: AtomicU64,
    sessions_aborted: AtomicU64,

    // Entity counters
    entities_created: AtomicU64,
    entities_updated: AtomicU64,
    entities_deleted: AtomicU64,

    // Journal counters
    journals_committed: AtomicU64,
    commit_passes: AtomicU64,

    errors: AtomicU64,
}

impl EngineStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    // === Increment methods (internal use) ===

    pub(crate) fn record_session_start(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_session_commit(&self) {
        self.sessions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_session_abort(&self) {
        self.sessions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_entity_created(&self) {
        self.entities_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_entity_updated(&self) {
        self.entities_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_entity_deleted(&self) {
        self.entities_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_journal_commit(&self) {
        self.journals_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit_pass(&self) {
        self.commit_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    // === Getter methods (public API) ===

    /// Returns the number of sessions started.
    pub fn sessions_started(&self) -> u64 {
        self.sessions_started.load(Ordering::Relaxed)
    }

    /// Returns the number of successful session commits.
    ///
    /// A session that commits several times counts once per commit.
    pub fn sessions_committed(&self) -> u64 {
        self.sessions_committed.load(Ordering::Relaxed)
    }

    /// Returns the number of aborted sessions.
    pub fn sessions_aborted(&self) -> u64 {
        self.sessions_aborted.load(Ordering::Relaxed)
    }

    /// Returns the number of entities registered.
    pub fn entities_created(&self) -> u64 {
        self.entities_created.load(Ordering::Relaxed)
    }

    /// Returns the number of entity versions produced by updates.
    pub fn entities_updated(&self) -> u64 {
        self.entities_updated.load(Ordering::Relaxed)
    }

    /// Returns the number of entities deleted, cascades included.
    pub fn entities_deleted(&self) -> u64 {
        self.entities_deleted.load(Ordering::Relaxed)
    }

    /// Returns the number of journals committed.
    pub fn journals_committed(&self) -> u64 {
        self.journals_committed.load(Ordering::Relaxed)
    }

    /// Returns the number of commit passes run across all sessions.
    pub fn commit_passes(&self) -> u64 {
        self.commit_passes.load(Ordering::Relaxed)
    }

    /// Returns the number of failed commits.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sessions_started: self.sessions_started(),
            sessions_committed: self.sessions_committed(),
            sessions_aborted: self.sessions_aborted(),
            entities_created: self.entities_created(),
            entities_updated: self.entities_updated(),
            entities_deleted: self.entities_deleted(),
            journals_committed: self.journals_committed(),
            commit_passes: self.commit_passes(),
            errors: self.errors(),
        }
    }
}

/// A point-in-time snapshot of engine statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Sessions started.
    pub sessions_started: u64,
    /// Successful session commits.
    pub sessions_committed: u64,
    /// Sessions aborted.
    pub sessions_aborted: u64,
    /// Entities registered.
    pub entities_created: u64,
    /// Entity versions produced by updates.
    pub entities_updated: u64,
    /// Entities deleted.
    pub entities_deleted: u64,
    /// Journals committed.
    pub journals_committed: u64,
    /// Commit passes run.
    pub commit_passes: u64,
    /// Failed commits.
    pub errors: u64,
}
