//! Per-connection lifecycle
//!
//! Each connection runs its own task and owns its `SessionState`; the
//! registry is the only state shared between connections.

pub mod context;
pub mod dispatcher;
pub mod state;

pub use context::SessionContext;
pub use dispatcher::{LifecycleDispatcher, Session};
pub use state::{ConnectionPhase, SessionState};
