//! Shared types for the SRT live reflector workspace: the option-map
//! family, streamid parsing, address/pattern matchers, and time/speed
//! parsing for playback requests.

pub mod error;
pub mod glob;
pub mod option;
pub mod sockaddr;
pub mod streamid;
pub mod time;

pub use error::CommonError;
pub use option::{ByteOrder, OptionMap};
pub use sockaddr::SockAddr;
pub use streamid::StreamOption;
pub use time::{parse_at, GapPolicy, Speed};
