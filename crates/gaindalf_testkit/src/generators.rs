//! Property-based test generators using proptest.
//!
//! Provides strategies for generating values and edit scripts that respect
//! the ledger model's invariants.

use gaindalf_core::{Uid, Value};
use proptest::prelude::*;

/// Strategy for generating valid namespaces.
pub fn namespace_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9_@#]{0,15}").expect("Invalid regex")
}

/// Strategy for generating UIDs with integer or text ids.
pub fn uid_strategy() -> impl Strategy<Value = Uid> {
    let int_id = (namespace_strategy(), 1u64..1_000_000)
        .prop_map(|(namespace, id)| Uid::with_int(namespace, id).expect("valid namespace"));
    let text_id = (
        namespace_strategy(),
        prop::string::string_regex("[A-Za-z][A-Za-z0-9-]{0,11}").expect("Invalid regex"),
    )
        .prop_map(|(namespace, id)| Uid::with_text(namespace, id).expect("valid namespace"));
    prop_oneof![int_id, text_id]
}

/// Strategy for generating scalar values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z]{0,8}".prop_map(Value::from),
    ]
}

/// Strategy for generating nested values (sequences, sets and mappings of scalars).
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(|items| Value::sequence(items)),
            prop::collection::btree_set(inner.clone(), 0..6).prop_map(|items| Value::set(items)),
            prop::collection::vec((inner.clone(), inner), 0..4).prop_map(|pairs| Value::mapping(pairs)),
        ]
    })
}

/// Strategy for short text tags.
pub fn tag_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,6}"
}

/// One edit applied to a ledger inside a session.
#[derive(Debug, Clone)]
pub enum LedgerEdit {
    /// Reassign the name.
    Rename(String),
    /// Append a tag.
    PushTag(String),
    /// Remove the tag at an index, if in range.
    RemoveTag(usize),
    /// Set a metadata entry.
    SetMetadata(String, i64),
    /// Remove a metadata entry.
    RemoveMetadata(String),
    /// Add a label.
    AddLabel(String),
    /// Remove a label.
    DiscardLabel(String),
}

/// Strategy for a single ledger edit.
pub fn ledger_edit_strategy() -> impl Strategy<Value = LedgerEdit> {
    prop_oneof![
        "[A-Z][a-z]{0,8}".prop_map(LedgerEdit::Rename),
        tag_strategy().prop_map(LedgerEdit::PushTag),
        (0usize..4).prop_map(LedgerEdit::RemoveTag),
        ("[a-c]", any::<i64>()).prop_map(|(key, value)| LedgerEdit::SetMetadata(key, value)),
        "[a-c]".prop_map(LedgerEdit::RemoveMetadata),
        "[a-c]".prop_map(LedgerEdit::AddLabel),
        "[a-c]".prop_map(LedgerEdit::DiscardLabel),
    ]
}

/// Strategy for a script of ledger edits.
pub fn ledger_edits_strategy(max_len: usize) -> impl Strategy<Value = Vec<LedgerEdit>> {
    prop::collection::vec(ledger_edit_strategy(), 0..max_len)
}

/// Strategy for `(date, amount)` pairs of transactions.
pub fn transaction_strategy() -> impl Strategy<Value = (i64, i64)> {
    (0i64..365, -10_000i64..10_000)
}
