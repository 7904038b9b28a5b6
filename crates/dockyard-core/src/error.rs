//! Validation errors for core domain values.

use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid job id: {0:?}")]
    InvalidJobId(String),

    #[error("unknown framework: {0}")]
    UnknownFramework(String),

    #[error("invalid root directory hint: {0}")]
    InvalidRootDir(String),

    #[error("invalid status tag: {0}")]
    InvalidStatus(String),

    #[error("invalid domain token: {0:?}")]
    InvalidDomainToken(String),
}
