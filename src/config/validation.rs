//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (attempts ≥ 1, timeouts > 0, addresses parse)
//! - Reject blank discovery entries
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function of the config
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{
    CircuitBreakerConfig, GatewayConfig, LimitConfig, ListenerConfig, ObservabilityConfig, RateLimitConfig,
    RetryConfig, ServiceConfig,
};

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Configs that can check themselves.
pub trait Validate {
    fn validate(&self) -> Vec<ValidationError>;
}

impl Validate for GatewayConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        check_listener(&self.listener, &mut errors);
        check_retry(&self.retry, &mut errors);
        check_breaker(&self.circuit_breaker, &mut errors);
        check_rate_limit(&self.rate_limit, &mut errors);
        check_observability(&self.observability, &mut errors);

        if self.discovery.service.trim().is_empty() {
            errors.push(ValidationError::new("discovery.service", "must not be empty"));
        }
        for (i, instance) in self.discovery.instances.iter().enumerate() {
            if instance.trim().is_empty() {
                errors.push(ValidationError::new(format!("discovery.instances[{i}]"), "must not be empty"));
            }
        }
        if self.discovery.invalidate_on_error_secs == Some(0) {
            errors.push(ValidationError::new(
                "discovery.invalidate_on_error_secs",
                "must be greater than 0 (omit to disable)",
            ));
        }
        if self.transport.connect_timeout_ms == 0 {
            errors.push(ValidationError::new("transport.connect_timeout_ms", "must be greater than 0"));
        }
        errors
    }
}

impl Validate for ServiceConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        check_listener(&self.listener, &mut errors);
        check_limit("sum_limit", &self.sum_limit, &mut errors);
        check_limit("concat_limit", &self.concat_limit, &mut errors);
        check_observability(&self.observability, &mut errors);
        errors
    }
}

fn check_listener(listener: &ListenerConfig, errors: &mut Vec<ValidationError>) {
    if listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", listener.bind_address),
        ));
    }
    if listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be greater than 0"));
    }
}

fn check_retry(retry: &RetryConfig, errors: &mut Vec<ValidationError>) {
    if retry.max_attempts == 0 {
        errors.push(ValidationError::new("retry.max_attempts", "must be at least 1"));
    }
    if retry.timeout_ms == 0 {
        errors.push(ValidationError::new("retry.timeout_ms", "must be greater than 0"));
    }
    if retry.base_delay_ms > 0 && retry.max_delay_ms < retry.base_delay_ms {
        errors.push(ValidationError::new("retry.max_delay_ms", "must not be below base_delay_ms"));
    }
}

fn check_breaker(breaker: &CircuitBreakerConfig, errors: &mut Vec<ValidationError>) {
    if breaker.open_timeout_ms == 0 {
        errors.push(ValidationError::new("circuit_breaker.open_timeout_ms", "must be greater than 0"));
    }
    match breaker.failure_ratio {
        Some(ratio) => {
            if !(ratio > 0.0 && ratio <= 1.0) {
                errors.push(ValidationError::new("circuit_breaker.failure_ratio", "must be in (0, 1]"));
            }
            if breaker.window_secs == 0 {
                errors.push(ValidationError::new("circuit_breaker.window_secs", "must be greater than 0"));
            }
        }
        None => {
            if breaker.consecutive_failures == 0 {
                errors.push(ValidationError::new("circuit_breaker.consecutive_failures", "must be at least 1"));
            }
        }
    }
}

fn check_rate_limit(rate_limit: &RateLimitConfig, errors: &mut Vec<ValidationError>) {
    if rate_limit.enabled {
        check_limit(
            "rate_limit",
            &LimitConfig {
                capacity: rate_limit.capacity,
                refill_rate: rate_limit.refill_rate,
            },
            errors,
        );
    }
}

fn check_limit(section: &str, limit: &LimitConfig, errors: &mut Vec<ValidationError>) {
    if limit.capacity == 0 {
        errors.push(ValidationError::new(format!("{section}.capacity"), "must be at least 1"));
    }
    if !(limit.refill_rate.is_finite() && limit.refill_rate > 0.0) {
        errors.push(ValidationError::new(format!("{section}.refill_rate"), "must be a positive number"));
    }
}

fn check_observability(observability: &ObservabilityConfig, errors: &mut Vec<ValidationError>) {
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", observability.metrics_address),
        ));
    }
}
