use thiserror::Error;
use transport::TransportError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("handshake rejected: {0}")]
    Rejected(String),

    #[error("session already closed")]
    Closed,
}
