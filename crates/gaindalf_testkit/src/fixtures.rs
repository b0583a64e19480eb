//! Test fixtures and engine helpers.
//!
//! Provides a ledger / transaction model and convenience functions for
//! setting up stores, sessions and common scenarios.

use gaindalf_core::{
    EngineConfig, Entity, EntityDraft, EntitySchema, EntityStore, FieldDef, ItemConstraint,
    SessionManager, Uid, Value,
};
use std::sync::Arc;
use tracing::debug;

/// Namespace of ledger entities.
pub const LEDGER: &str = "Ledger";
/// Namespace of transaction entities.
pub const TRANSACTION: &str = "Transaction";

/// Schema of a ledger.
///
/// `transactions` is an ordered view of its transactions, sorted by date
/// then amount. `currency` is fixed at creation.
pub fn ledger_schema() -> EntitySchema {
    EntitySchema::builder(LEDGER)
        .field(FieldDef::scalar("name", ItemConstraint::Text).required())
        .field(FieldDef::scalar("currency", ItemConstraint::Text).read_only())
        .field(FieldDef::sequence("tags", ItemConstraint::Text))
        .field(FieldDef::mapping("metadata", ItemConstraint::Any))
        .field(FieldDef::set("labels", ItemConstraint::Text))
        .field(FieldDef::ordered_view_set(
            "transactions",
            ItemConstraint::entity(TRANSACTION),
        ))
        .validator("name must not be blank", |fields| {
            match fields.get("name").and_then(Value::as_text) {
                Some(name) if name.trim().is_empty() => Err("blank name".to_string()),
                _ => Ok(()),
            }
        })
        .build()
        .expect("ledger schema is valid")
}

/// Schema of a transaction, owned by a ledger.
pub fn transaction_schema() -> EntitySchema {
    EntitySchema::builder(TRANSACTION)
        .field(FieldDef::scalar("date", ItemConstraint::Integer).required())
        .field(FieldDef::scalar("amount", ItemConstraint::Integer))
        .field(FieldDef::scalar("description", ItemConstraint::Text).alias("memo"))
        .sort_key(["date", "amount"])
        .build()
        .expect("transaction schema is valid")
}

/// A store with the ledger model registered, and a session manager over it.
#[derive(Debug)]
pub struct TestEngine {
    /// The store.
    pub store: Arc<EntityStore>,
    /// Session manager over `store`.
    pub manager: SessionManager,
}

impl TestEngine {
    /// Creates an engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an engine with a custom configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(EntityStore::new(config));
        store
            .register_schema(ledger_schema())
            .expect("Failed to register ledger schema");
        store
            .register_schema(transaction_schema())
            .expect("Failed to register transaction schema");
        let manager = SessionManager::new(Arc::clone(&store));
        Self { store, manager }
    }

    /// Registers a ledger directly in the store.
    pub fn ledger(&self, name: &str) -> Arc<Entity> {
        let ledger = self
            .store
            .create(
                EntityDraft::new(LEDGER)
                    .field("name", name)
                    .field("currency", "EUR"),
            )
            .expect("Failed to create ledger");
        debug!(uid = %ledger.uid(), "fixture ledger created");
        ledger
    }

    /// Creates a transaction in its own session and adds it to the ledger's
    /// `transactions` view.
    pub fn transaction(&self, ledger: &Uid, date: i64, amount: i64) -> Arc<Entity> {
        let uid = self
            .manager
            .run("fixture", "add transaction", |session| {
                let txn = session.create(
                    EntityDraft::new(TRANSACTION)
                        .parent(ledger)
                        .field("date", date)
                        .field("amount", amount),
                )?;
                session
                    .journal(ledger)?
                    .edit_ordered_view("transactions", |view| view.add(Value::from(&txn)))?;
                Ok(txn.uid().clone())
            })
            .expect("Failed to add transaction");
        self.current(&uid)
    }

    /// Current version of `uid`.
    pub fn current(&self, uid: &Uid) -> Arc<Entity> {
        self.store.by_uid(uid).expect("entity is registered")
    }

    /// UIDs of a ledger's transactions in sort order.
    pub fn transaction_order(&self, ledger: &Uid) -> Vec<Uid> {
        self.current(ledger)
            .field("transactions")
            .expect("ledger is current")
            .as_ordered_view()
            .expect("transactions is an ordered view")
            .sorted()
            .iter()
            .filter_map(|item| item.as_entity().map(|entity| entity.uid().clone()))
            .collect()
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a field map from name / value pairs.
pub fn fields<const N: usize>(pairs: [(&str, Value); N]) -> gaindalf_core::FieldMap {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_has_model() {
        let engine = TestEngine::new();
        assert!(engine.store.schema(LEDGER).is_ok());
        assert!(engine.store.schema(TRANSACTION).is_ok());
    }

    #[test]
    fn transactions_are_ordered() {
        let engine = TestEngine::new();
        let ledger = engine.ledger("Main");
        let late = engine.transaction(ledger.uid(), 20, 5);
        let early = engine.transaction(ledger.uid(), 10, 7);
        assert_eq!(
            engine.transaction_order(ledger.uid()),
            vec![early.uid().clone(), late.uid().clone()]
        );
        assert_eq!(late.parent_uid(), Some(ledger.uid()));
    }

    #[test]
    fn blank_names_are_rejected() {
        let engine = TestEngine::new();
        let err = engine
            .store
            .create(EntityDraft::new(LEDGER).field("name", "  "))
            .unwrap_err();
        assert!(matches!(err, gaindalf_core::CoreError::ValidationFailed { .. }));
    }
}
