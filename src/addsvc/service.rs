//! Business logic.

use thiserror::Error;

/// Maximum length of a concatenated string.
pub const MAX_CONCAT_LEN: usize = 10;

/// Business errors. These travel to callers unchanged and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("can't sum two zeroes")]
    TwoZeroes,

    #[error("integer overflow")]
    IntOverflow,

    #[error("result exceeds maximum size")]
    MaxSizeExceeded,
}

impl ServiceError {
    /// Recover an error from its wire message.
    pub fn from_message(message: &str) -> Option<Self> {
        [Self::TwoZeroes, Self::IntOverflow, Self::MaxSizeExceeded]
            .into_iter()
            .find(|e| e.to_string() == message)
    }
}

pub trait AddService: Send + Sync + 'static {
    fn sum(&self, a: i32, b: i32) -> Result<i32, ServiceError>;
    fn concat(&self, a: &str, b: &str) -> Result<String, ServiceError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BasicService;

impl AddService for BasicService {
    fn sum(&self, a: i32, b: i32) -> Result<i32, ServiceError> {
        if a == 0 && b == 0 {
            return Err(ServiceError::TwoZeroes);
        }
        a.checked_add(b).ok_or(ServiceError::IntOverflow)
    }

    fn concat(&self, a: &str, b: &str) -> Result<String, ServiceError> {
        if a.chars().count() + b.chars().count() > MAX_CONCAT_LEN {
            return Err(ServiceError::MaxSizeExceeded);
        }
        Ok(format!("{a}{b}"))
    }
}
