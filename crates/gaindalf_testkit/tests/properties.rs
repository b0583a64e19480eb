//! Property tests over whole sessions.

use gaindalf_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Expected ledger contents, maintained alongside the session.
#[derive(Debug, Clone, PartialEq)]
struct LedgerModel {
    name: String,
    tags: Vec<String>,
    metadata: BTreeMap<String, i64>,
    labels: BTreeSet<String>,
}

impl LedgerModel {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tags: Vec::new(),
            metadata: BTreeMap::new(),
            labels: BTreeSet::new(),
        }
    }

    fn apply(&mut self, edit: &LedgerEdit) {
        match edit {
            LedgerEdit::Rename(name) => self.name = name.clone(),
            LedgerEdit::PushTag(tag) => self.tags.push(tag.clone()),
            LedgerEdit::RemoveTag(index) => {
                if *index < self.tags.len() {
                    self.tags.remove(*index);
                }
            }
            LedgerEdit::SetMetadata(key, value) => {
                self.metadata.insert(key.clone(), *value);
            }
            LedgerEdit::RemoveMetadata(key) => {
                self.metadata.remove(key);
            }
            LedgerEdit::AddLabel(label) => {
                self.labels.insert(label.clone());
            }
            LedgerEdit::DiscardLabel(label) => {
                self.labels.remove(label);
            }
        }
    }

    fn matches(&self, entity: &Entity) -> bool {
        let tags = Value::sequence(self.tags.iter().map(|tag| Value::from(tag.as_str())));
        let metadata = Value::mapping(
            self.metadata
                .iter()
                .map(|(key, value)| (Value::from(key.as_str()), Value::from(*value))),
        );
        let labels = Value::set(self.labels.iter().map(|label| Value::from(label.as_str())));
        entity.field("name").ok() == Some(&Value::from(self.name.as_str()))
            && entity.field("tags").ok() == Some(&tags)
            && entity.field("metadata").ok() == Some(&metadata)
            && entity.field("labels").ok() == Some(&labels)
    }
}

fn apply_edit(session: &mut Session, ledger: &Uid, edit: &LedgerEdit) -> CoreResult<()> {
    let mut journal = session.journal(ledger)?;
    match edit {
        LedgerEdit::Rename(name) => journal.set_field("name", name.as_str()),
        LedgerEdit::PushTag(tag) => {
            journal.edit_sequence("tags", |tags| tags.push(Value::from(tag.as_str())))
        }
        LedgerEdit::RemoveTag(index) => journal.edit_sequence("tags", |tags| {
            if *index < tags.len() {
                tags.remove(*index)?;
            }
            Ok(())
        }),
        LedgerEdit::SetMetadata(key, value) => journal.edit_mapping("metadata", |meta| {
            meta.insert(Value::from(key.as_str()), Value::from(*value))
                .map(|_| ())
        }),
        LedgerEdit::RemoveMetadata(key) => journal.edit_mapping("metadata", |meta| {
            meta.remove(&Value::from(key.as_str())).map(|_| ())
        }),
        LedgerEdit::AddLabel(label) => journal.edit_set("labels", |labels| {
            labels.add(Value::from(label.as_str())).map(|_| ())
        }),
        LedgerEdit::DiscardLabel(label) => journal.edit_set("labels", |labels| {
            labels.discard(&Value::from(label.as_str())).map(|_| ())
        }),
    }
}

fn assert_audit_invariant(engine: &TestEngine, uid: &Uid) -> Result<(), TestCaseError> {
    let log = engine.store.audit_log(uid).expect("entity has a log");
    prop_assert_eq!(log.entries()[0].what, EntityAuditType::Created);
    for (index, entry) in log.entries().iter().enumerate() {
        prop_assert_eq!(entry.version, index as u64 + 1);
    }
    if let Some(current) = engine.store.by_uid_or_none(uid) {
        prop_assert_eq!(log.version(), current.version());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn committed_session_matches_model(edits in ledger_edits_strategy(24)) {
        let engine = TestEngine::new();
        let ledger = engine.ledger("Main");
        let mut model = LedgerModel::new("Main");

        let mut session = engine.manager.begin("prop", "edits").unwrap();
        for edit in &edits {
            apply_edit(&mut session, ledger.uid(), edit).unwrap();
            model.apply(edit);
        }
        session.end().unwrap();

        let current = engine.current(ledger.uid());
        prop_assert!(model.matches(&current));
        prop_assert!(current.version() <= 2);
        if current.version() == 2 {
            prop_assert!(ledger.superseded());
            prop_assert!(Arc::ptr_eq(ledger.superseding().unwrap(), &current));
        }
        assert_audit_invariant(&engine, ledger.uid())?;
    }

    #[test]
    fn aborted_session_changes_nothing(edits in ledger_edits_strategy(24)) {
        let engine = TestEngine::new();
        let ledger = engine.ledger("Main");

        let mut session = engine.manager.begin("prop", "abandon").unwrap();
        for edit in &edits {
            apply_edit(&mut session, ledger.uid(), edit).unwrap();
        }
        session.abort().unwrap();

        prop_assert!(!session.dirty());
        prop_assert!(!ledger.superseded());
        prop_assert!(LedgerModel::new("Main").matches(&ledger));
        prop_assert_eq!(engine.store.audit_log(ledger.uid()).unwrap().len(), 1);
    }

    #[test]
    fn every_commit_adds_one_version(renames in prop::collection::vec("[A-Z][a-z]{1,6}", 1..8)) {
        let engine = TestEngine::new();
        let ledger = engine.ledger("Start");
        let mut previous = Arc::clone(&ledger);

        for name in &renames {
            engine
                .manager
                .run("prop", "rename", |session| {
                    session.journal(ledger.uid())?.set_field("name", name.as_str())
                })
                .unwrap();
            let current = engine.current(ledger.uid());
            if Arc::ptr_eq(&current, &previous) {
                prop_assert_eq!(current.field("name").unwrap(), &Value::from(name.as_str()));
            } else {
                prop_assert_eq!(current.version(), previous.version() + 1);
                prop_assert!(previous.superseded());
                prop_assert!(previous.field("name").unwrap_err().is_superseded());
            }
            previous = current;
        }
        assert_audit_invariant(&engine, ledger.uid())?;
    }

    #[test]
    fn transactions_stay_sorted(
        initial in prop::collection::vec(transaction_strategy(), 1..6),
        moves in prop::collection::vec((0usize..6, 0i64..365), 0..4),
    ) {
        let engine = TestEngine::new();
        let ledger = engine.ledger("Main");
        let mut expected: Vec<(i64, i64, Uid)> = initial
            .iter()
            .map(|(date, amount)| {
                let txn = engine.transaction(ledger.uid(), *date, *amount);
                (*date, *amount, txn.uid().clone())
            })
            .collect();

        engine
            .manager
            .run("prop", "redate", |session| {
                for (index, date) in &moves {
                    if let Some(entry) = expected.get_mut(*index) {
                        session.journal(&entry.2)?.set_field("date", *date)?;
                        entry.0 = *date;
                    }
                }
                Ok(())
            })
            .unwrap();

        expected.sort();
        let order: Vec<Uid> = expected.into_iter().map(|(_, _, uid)| uid).collect();
        prop_assert_eq!(engine.transaction_order(ledger.uid()), order);
        assert_audit_invariant(&engine, ledger.uid())?;
    }
}
