//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (fmt layer, filtered by RUST_LOG / configured level)
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Structured fields, never interpolated strings, for anything a query needs
//! - Metrics go through the `metrics` facade; without an installed recorder
//!   every update is a no-op, so library users and tests pay nothing

pub mod logging;
pub mod metrics;
