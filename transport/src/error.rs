use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bind failed: {0}")]
    BindFailed(String),

    #[error("listen failed: {0}")]
    ListenFailed(String),

    #[error("accept failed: {0}")]
    AcceptFailed(String),

    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("send would block")]
    WouldBlock,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("socket option rejected: {0}")]
    SetOptFailed(String),

    #[error("socket closed")]
    Closed,
}
