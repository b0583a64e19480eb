//! Per-session tracking of pending entity changes.
//!
//! A journal records field assignments and in-place collection edits for one
//! entity, tracks which child journals are dirty, and applies everything as
//! a single new entity version on commit.

mod entity_journal;
mod update;

pub use entity_journal::{CommitOutcome, EntityJournal, JournalState};
pub use update::FieldUpdate;
