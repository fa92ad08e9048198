//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs, then the binaries):
//!     Parse CLI → Load config → Validate → Init logging/metrics → Build stacks → Start listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → HTTP server drains, cache updaters
//!     close their caches (releasing every connection) → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Listeners start last (traffic only when stacks are built)
//! - Ordered shutdown: stop accept, drain, release connections

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::{init_observability, StartupArgs};
