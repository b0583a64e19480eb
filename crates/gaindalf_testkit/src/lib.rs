//! # Gaindalf Testkit
//!
//! Test utilities for the gaindalf engine.
//!
//! This crate provides:
//! - Ledger and transaction schemas plus a pre-wired store and session manager
//! - Property-based test generators using proptest
//! - Tracing initialisation for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gaindalf_testkit::prelude::*;
//!
//! #[test]
//! fn renames_ledger() {
//!     let engine = TestEngine::new();
//!     let ledger = engine.ledger("Main");
//!     engine
//!         .manager
//!         .run("test", "rename", |s| s.journal(ledger.uid())?.set_field("name", "Other"))
//!         .unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
mod logging;

pub use logging::init_tracing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::init_tracing;
    pub use gaindalf_core::*;
}

pub use fixtures::*;
pub use generators::*;
