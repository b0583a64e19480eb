//! Per-entity audit trail.
//!
//! Every UID owns an append-only [`EntityAuditLog`]. Entry `n` carries
//! version `n`, the first entry is always [`EntityAuditType::Created`], and
//! nothing may be updated or deleted once it no longer exists.

use crate::collection::journalled::{MappingEdit, SequenceEdit, SetEdit};
use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::uid::Uid;
use crate::value::Value;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Kind of change an audit entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityAuditType {
    /// First version registered.
    Created,
    /// A new version replaced the previous one.
    Updated,
    /// The entity was removed from the store.
    Deleted,
}

/// Change recorded for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldDiff {
    /// The field now holds this value (null when cleared or deleted).
    Value(Value),
    /// Edits applied to a sequence field.
    Sequence(Vec<SequenceEdit<Value>>),
    /// Edits applied to a mapping field.
    Mapping(Vec<MappingEdit<Value, Value>>),
    /// Edits applied to a set or ordered view set field.
    Set(Vec<SetEdit<Value>>),
}

/// Per-field changes of one audit entry.
pub type EntityDiff = BTreeMap<String, FieldDiff>;

/// Every non-empty field of a newly created entity.
pub(crate) fn created_diff(entity: &Entity) -> EntityDiff {
    entity
        .fields()
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| (name.clone(), FieldDiff::Value(value.clone())))
        .collect()
}

/// Every non-empty field of a deleted entity, mapped to null.
pub(crate) fn deleted_diff(entity: &Entity) -> EntityDiff {
    entity
        .fields()
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, _)| (name.clone(), FieldDiff::Value(Value::Null)))
        .collect()
}

/// Fields whose values differ between two versions, with their new values.
pub(crate) fn manual_diff(previous: &Entity, next: &Entity) -> EntityDiff {
    next.fields()
        .iter()
        .filter(|(name, value)| previous.fields().get(*name) != Some(*value))
        .map(|(name, value)| (name.clone(), FieldDiff::Value(value.clone())))
        .collect()
}

/// Who is making a change, and why.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditContext {
    /// Actor responsible for the change.
    pub who: Option<String>,
    /// Reason given for the change.
    pub why: Option<String>,
}

impl AuditContext {
    /// Creates a context naming an actor and a reason.
    pub fn new(who: impl Into<String>, why: impl Into<String>) -> Self {
        Self {
            who: Some(who.into()),
            why: Some(why.into()),
        }
    }
}

/// One entry of an audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityAudit {
    /// Kind of change.
    pub what: EntityAuditType,
    /// Milliseconds since the Unix epoch.
    pub when: u64,
    /// Actor responsible.
    pub who: Option<String>,
    /// Reason given.
    pub why: Option<String>,
    /// Structural diff, if diff tracking is enabled.
    pub diff: Option<EntityDiff>,
    /// Entity version this entry produced.
    pub version: u64,
}

impl EntityAudit {
    /// Creates an entry stamped with the current time.
    pub fn new(
        what: EntityAuditType,
        version: u64,
        context: &AuditContext,
        diff: Option<EntityDiff>,
    ) -> Self {
        Self {
            what,
            when: now_millis(),
            who: context.who.clone(),
            why: context.why.clone(),
            diff,
            version,
        }
    }
}

/// Append-only audit trail of one UID.
#[derive(Debug, Clone)]
pub struct EntityAuditLog {
    uid: Uid,
    entries: Vec<EntityAudit>,
}

impl EntityAuditLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new(uid: Uid) -> Self {
        Self {
            uid,
            entries: Vec::new(),
        }
    }

    /// The UID this log belongs to.
    #[must_use]
    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    /// All entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[EntityAudit] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Version of the most recent entry, or 0.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.most_recent().map_or(0, |entry| entry.version)
    }

    /// Version the next entry must carry.
    #[must_use]
    pub fn next_version(&self) -> u64 {
        self.version() + 1
    }

    /// Whether the entity was created and not deleted since.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.most_recent()
            .is_some_and(|entry| entry.what != EntityAuditType::Deleted)
    }

    /// The latest entry.
    #[must_use]
    pub fn most_recent(&self) -> Option<&EntityAudit> {
        self.entries.last()
    }

    /// The entry that produced `version`.
    #[must_use]
    pub fn entry_by_version(&self, version: u64) -> Option<&EntityAudit> {
        let index = usize::try_from(version.checked_sub(1)?).ok()?;
        self.entries.get(index)
    }

    /// Checks whether `entry` may be appended next.
    pub fn check(&self, entry: &EntityAudit) -> CoreResult<()> {
        let expected = self.next_version();
        if entry.version != expected {
            return Err(CoreError::AuditVersionMismatch {
                uid: self.uid.clone(),
                expected,
                actual: entry.version,
            });
        }
        match entry.what {
            EntityAuditType::Created if !self.entries.is_empty() => Err(
                CoreError::audit_sequence(&self.uid, "entity was already created"),
            ),
            EntityAuditType::Updated | EntityAuditType::Deleted if self.entries.is_empty() => Err(
                CoreError::audit_sequence(&self.uid, "first entry must be a creation"),
            ),
            EntityAuditType::Updated | EntityAuditType::Deleted if !self.exists() => Err(
                CoreError::audit_sequence(&self.uid, "entity does not exist"),
            ),
            _ => Ok(()),
        }
    }

    /// Appends `entry` after checking it.
    pub fn append(&mut self, entry: EntityAudit) -> CoreResult<()> {
        self.check(&entry)?;
        self.entries.push(entry);
        Ok(())
    }

    /// The entries as a JSON array, oldest first.
    pub fn as_json(&self) -> CoreResult<serde_json::Value> {
        Ok(serde_json::to_value(&self.entries)?)
    }

    /// The entries as a JSON string.
    pub fn as_json_str(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(&self.entries)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid() -> Uid {
        Uid::with_int("Ledger", 1).unwrap()
    }

    fn entry(what: EntityAuditType, version: u64) -> EntityAudit {
        EntityAudit::new(what, version, &AuditContext::new("tester", "unit test"), None)
    }

    #[test]
    fn lifecycle() {
        let mut log = EntityAuditLog::new(uid());
        assert!(!log.exists());
        assert_eq!(log.next_version(), 1);

        log.append(entry(EntityAuditType::Created, 1)).unwrap();
        log.append(entry(EntityAuditType::Updated, 2)).unwrap();
        assert!(log.exists());
        assert_eq!(log.version(), 2);

        log.append(entry(EntityAuditType::Deleted, 3)).unwrap();
        assert!(!log.exists());
        assert_eq!(log.most_recent().unwrap().what, EntityAuditType::Deleted);
        assert_eq!(
            log.entry_by_version(2).unwrap().what,
            EntityAuditType::Updated
        );
        assert!(log.entry_by_version(0).is_none());
        assert!(log.entry_by_version(4).is_none());
    }

    #[test]
    fn rejects_out_of_sequence_entries() {
        let mut log = EntityAuditLog::new(uid());
        assert!(matches!(
            log.append(entry(EntityAuditType::Updated, 1)),
            Err(CoreError::AuditSequence { .. })
        ));
        assert!(matches!(
            log.append(entry(EntityAuditType::Created, 2)),
            Err(CoreError::AuditVersionMismatch {
                expected: 1,
                actual: 2,
                ..
            })
        ));

        log.append(entry(EntityAuditType::Created, 1)).unwrap();
        assert!(log.append(entry(EntityAuditType::Created, 2)).is_err());

        log.append(entry(EntityAuditType::Deleted, 2)).unwrap();
        assert!(matches!(
            log.append(entry(EntityAuditType::Deleted, 3)),
            Err(CoreError::AuditSequence { .. })
        ));
    }

    #[test]
    fn json_export() {
        let mut log = EntityAuditLog::new(uid());
        let mut diff = EntityDiff::new();
        diff.insert("name".into(), FieldDiff::Value(Value::from("Main")));
        log.append(EntityAudit::new(
            EntityAuditType::Created,
            1,
            &AuditContext::new("importer", "initial load"),
            Some(diff),
        ))
        .unwrap();

        let json = log.as_json().unwrap();
        let first = &json[0];
        assert_eq!(first["what"], "created");
        assert_eq!(first["who"], "importer");
        assert_eq!(first["why"], "initial load");
        assert_eq!(first["version"], 1);
        assert_eq!(first["diff"]["name"], "Main");

        let text = log.as_json_str().unwrap();
        assert!(text.starts_with('['));
        assert!(text.contains("\"what\":\"created\""));
    }
}
