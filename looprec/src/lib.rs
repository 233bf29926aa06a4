pub mod config;
pub mod error;
pub mod looprec;
pub mod playback;
pub mod reader;
pub mod segment;
pub mod storage;
pub mod writer;

pub use config::{LoopRecConfig, S3Config};
pub use error::LoopRecError;
pub use looprec::LoopRec;
pub use playback::PlaybackRequest;
pub use reader::SegmentReader;
pub use segment::Segment;
pub use storage::ObjectStore;
pub use writer::SegmentWriter;
