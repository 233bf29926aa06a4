use common::CommonError;
use session::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReflectorError {
    #[error("{0}")]
    Common(#[from] CommonError),

    #[error("{0}")]
    Session(#[from] SessionError),

    #[error("denied: {0}")]
    Denied(String),
}
