//! Sessions: transaction boundaries around entity journals.

mod handle;
mod manager;
mod state;

pub use handle::JournalHandle;
pub use manager::SessionManager;
pub use state::{Session, SessionState, SESSION_NAMESPACE};
