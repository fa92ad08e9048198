//! Configuration schema definitions.
//!
//! This module defines the configuration of both binaries. All types derive
//! Serde traits for deserialization from TOML files, and every field has a
//! default so a minimal (even empty) file is valid.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::{BreakerConfig, RetryPolicy, TripPolicy};

/// Root configuration for the API gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, request timeout).
    pub listener: ListenerConfig,

    /// Where backend instances come from.
    pub discovery: DiscoveryConfig,

    /// Retry budget per logical call.
    pub retry: RetryConfig,

    /// Per-instance circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Client-side rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Outbound HTTP transport settings.
    pub transport: TransportConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Root configuration for the add service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub listener: ListenerConfig,

    /// Server-side admission limit for `sum`.
    pub sum_limit: LimitConfig,

    /// Server-side admission limit for `concat`.
    pub concat_limit: LimitConfig,

    pub observability: ObservabilityConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig {
                bind_address: "0.0.0.0:8081".to_string(),
                ..ListenerConfig::default()
            },
            sum_limit: LimitConfig {
                capacity: 1,
                refill_rate: 1.0,
            },
            concat_limit: LimitConfig {
                capacity: 100,
                refill_rate: 1.0,
            },
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Upper bound on handling one inbound request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Discovery source. A watched file wins over the static list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Logical service name, used in logs and metrics.
    pub service: String,

    /// Static instance list (`host:port`).
    pub instances: Vec<String>,

    /// TOML file with `instances = [...]`, watched for changes.
    pub file: Option<PathBuf>,

    /// Drop all instances once discovery errors persist this long.
    pub invalidate_on_error_secs: Option<u64>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service: "addsvc".to_string(),
            instances: vec!["127.0.0.1:8081".to_string()],
            file: None,
            invalidate_on_error_secs: None,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per logical call.
    pub max_attempts: u32,

    /// Deadline for the whole logical call in milliseconds.
    pub timeout_ms: u64,

    /// Base delay for exponential backoff in milliseconds (0 disables backoff).
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_ms: 500,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            timeout: Duration::from_millis(self.timeout_ms),
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the breaker.
    pub consecutive_failures: u32,

    /// Cooldown before a half-open trial call, in milliseconds.
    pub open_timeout_ms: u64,

    /// When set, trip on this failure ratio instead of consecutive failures.
    pub failure_ratio: Option<f64>,

    /// Minimum results in the window before the ratio is evaluated.
    pub min_requests: u32,

    /// Ratio window length in seconds.
    pub window_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            consecutive_failures: 5,
            open_timeout_ms: 30_000,
            failure_ratio: None,
            min_requests: 10,
            window_secs: 60,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn breaker_config(&self) -> BreakerConfig {
        let trip = match self.failure_ratio {
            Some(ratio) => TripPolicy::FailureRatio {
                ratio,
                min_requests: self.min_requests,
                window: Duration::from_secs(self.window_secs),
            },
            None => TripPolicy::ConsecutiveFailures(self.consecutive_failures),
        };
        BreakerConfig {
            trip,
            open_timeout: Duration::from_millis(self.open_timeout_ms),
        }
    }
}

/// Which calls share a token bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitScope {
    /// One bucket per instance, owned by its cache entry.
    #[default]
    Instance,
    /// One bucket for all instances of a method.
    Method,
}

/// Client-side rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Burst capacity.
    pub capacity: u32,

    /// Steady-state calls per second.
    pub refill_rate: f64,

    pub scope: RateLimitScope,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: 100,
            refill_rate: 100.0,
            scope: RateLimitScope::Instance,
        }
    }
}

/// A token bucket.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LimitConfig {
    pub capacity: u32,
    pub refill_rate: f64,
}

/// Outbound transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Wire protocol spoken to instances.
    pub protocol: Protocol,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 250,
            protocol: Protocol::Http,
        }
    }
}

/// Wire protocol of the outbound transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// JSON bodies posted to `/sum` and `/concat`.
    #[default]
    Http,
    /// JSON-RPC 2.0 envelopes posted to `/rpc`.
    JsonRpc,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
