//! Entities and the store that tracks their current versions.

mod entity;
mod store;

pub use entity::{Entity, EntityDraft, EntityRef};
pub use store::EntityStore;
