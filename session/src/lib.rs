//! Session layer: the `Listener`/`Receiver`/`Sender` triad that turns
//! accepted [`transport`] sockets into running publisher/subscriber
//! sessions, plus the consumer fan-out each receiver drives.

pub mod consumer;
pub mod error;
pub mod listener;
pub mod receiver;
pub mod sender;
pub mod stats;

pub use consumer::Consumer;
pub use error::SessionError;
pub use listener::Listener;
pub use receiver::Receiver;
pub use sender::Sender;
