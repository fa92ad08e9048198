//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig / ServiceConfig (validated, immutable)
//!     → CLI overrides applied by the binaries
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; instance membership is the only thing
//!   that changes at runtime, and it comes from discovery, not from here
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CircuitBreakerConfig, DiscoveryConfig, GatewayConfig, LimitConfig, ListenerConfig, ObservabilityConfig,
    Protocol, RateLimitConfig, RateLimitScope, RetryConfig, ServiceConfig, TransportConfig,
};
pub use validation::{Validate, ValidationError};
