use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoopRecError {
    #[error("segment io: {0}")]
    SegmentIo(#[from] std::io::Error),

    /// A short read on the index file — distinguished from other I/O
    /// failures because it means "no more data yet" rather than
    /// corruption.
    #[error("reached index end")]
    IndexShortRead,

    #[error("not acceptable: {0}")]
    NotAcceptable(String),

    #[error("remote storage failed: {0}")]
    RemoteStorageFailed(String),

    #[error("aborted")]
    Aborted,
}
