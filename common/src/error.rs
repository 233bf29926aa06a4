//! Error vocabulary shared by every crate in the workspace.
//!
//! The variants name the error kinds from the error handling design:
//! each higher-level crate defines its own `thiserror` enum and converts
//! into or wraps these where the failure is general enough to originate
//! here (option parsing, address matching, time parsing).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("invalid streamid: {0}")]
    InvalidStreamId(String),

    #[error("invalid socket address: {0}")]
    InvalidAddress(String),

    #[error("invalid access condition: {0}")]
    InvalidAccessCondition(String),

    #[error("invalid glob pattern: {0}")]
    InvalidPattern(String),

    #[error("could not parse time value: {0}")]
    InvalidTime(String),

    #[error("option value out of range for key '{key}': {value}")]
    OutOfRange { key: String, value: String },
}
