//! # Gaindalf Core
//!
//! Versioned entity engine for the gaindalf portfolio tracker.
//!
//! This crate provides:
//! - Immutable, UID-addressed entities whose updates produce new versions
//! - An entity store mapping each UID to its current version
//! - Per-entity audit logs with structural diffs
//! - Copy-on-write journalled collections and cached ordered views
//! - Sessions that batch journalled edits and commit them children first
//!
//! ```no_run
//! use gaindalf_core::{
//!     EngineConfig, EntityDraft, EntitySchema, EntityStore, FieldDef, ItemConstraint,
//!     SessionManager,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> gaindalf_core::CoreResult<()> {
//! let store = Arc::new(EntityStore::new(EngineConfig::default()));
//! store.register_schema(
//!     EntitySchema::builder("Account")
//!         .field(FieldDef::scalar("balance", ItemConstraint::Integer))
//!         .build()?,
//! )?;
//! let account = store.create(EntityDraft::new("Account").field("balance", 1i64))?;
//!
//! let manager = SessionManager::new(Arc::clone(&store));
//! manager.run("importer", "daily sync", |session| {
//!     session.journal(account.uid())?.set_field("balance", 99i64)
//! })?;
//! assert!(account.superseded());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod collection;
mod config;
pub mod entity;
mod error;
pub mod journal;
pub mod schema;
pub mod session;
mod stats;
mod uid;
pub mod value;

pub use audit::{
    AuditContext, EntityAudit, EntityAuditLog, EntityAuditType, EntityDiff, FieldDiff,
};
pub use collection::{
    JournalledCollection, JournalledMapping, JournalledOrderedViewSet, JournalledSequence,
    JournalledSet, MappingEdit, OrderedViewMutableSet, OrderedViewSet, SequenceEdit, SetEdit,
    SortKey, ViewItem,
};
pub use config::EngineConfig;
pub use entity::{Entity, EntityDraft, EntityRef, EntityStore};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use journal::{CommitOutcome, EntityJournal, FieldUpdate, JournalState};
pub use schema::{EntitySchema, EntitySchemaBuilder, FieldDef, FieldKind, ItemConstraint, Validator};
pub use session::{JournalHandle, Session, SessionManager, SessionState, SESSION_NAMESPACE};
pub use stats::{EngineStats, StatsSnapshot};
pub use uid::{validate_namespace, IncrementingUidFactory, Uid, UidId, UID_SEPARATOR};
pub use value::{FieldMap, Value};
