//! Transport abstraction standing in for the SRT library itself.
//!
//! The SRT transport — socket create/bind/listen/accept, per-socket
//! options, statistics, epoll-style polling — is an explicit non-goal of
//! this workspace; it is named only by the interfaces the core consumes.
//! This crate defines those interfaces as `async` traits and ships an
//! in-memory mock implementation so every other crate can be exercised
//! without a real transport present.

pub mod error;
pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common::{OptionMap, SockAddr, StreamOption};

pub use error::TransportError;

/// Decision returned from the pre-accept hook, mirroring the SRT
/// library's handshake-time callback (`srt_listen_callback`): it runs
/// before the connection is fully established and may contribute
/// "pre" socket options that take effect before the handshake
/// completes.
pub struct PreAcceptDecision {
    pub allow: bool,
    pub pre_options: OptionMap,
}

impl PreAcceptDecision {
    pub fn deny() -> Self {
        PreAcceptDecision {
            allow: false,
            pre_options: OptionMap::new(),
        }
    }

    pub fn allow(pre_options: OptionMap) -> Self {
        PreAcceptDecision {
            allow: true,
            pre_options,
        }
    }
}

/// Invoked synchronously at handshake time, before the socket is
/// established — analogous to `srt_listen_callback`. Must not block.
pub type PreAcceptHook =
    Arc<dyn Fn(&SockAddr, &StreamOption) -> PreAcceptDecision + Send + Sync>;

/// A socket accepted past the pre-accept hook, with post-accept options
/// still to be applied by the caller before first use.
pub struct AcceptedSocket {
    pub peer: SockAddr,
    pub stream_option: StreamOption,
    pub socket: Arc<dyn SrtSocket>,
}

/// What one call to [`SrtSocket::recv`] produced.
pub enum RecvOutcome {
    /// A payload message, with `discrete` set when this message's
    /// sequence number was more than one beyond the previous message
    /// (a loss or reorder gap SRT just filled or dropped).
    Data { bytes: Bytes, discrete: bool },
    /// The peer disconnected (socket state became broken / non-existent
    /// / closed).
    Disconnected,
}

/// One SRT socket, in either receive or send mode.
#[async_trait]
pub trait SrtSocket: Send + Sync {
    async fn recv(&self) -> Result<RecvOutcome, TransportError>;

    /// Non-blocking send. `Err(TransportError::WouldBlock)` is a soft
    /// failure the caller may retry; any other error is terminal.
    async fn send(&self, buf: &[u8]) -> Result<(), TransportError>;

    fn set_post_options(&self, opts: &OptionMap) -> Result<(), TransportError>;

    /// Leveled, key:value, `sep`-joined rendering of the socket's
    /// performance counters (level 0 = empty string).
    fn statistics(&self, level: u8, sep: &str) -> String;

    fn peer(&self) -> SockAddr;

    fn close(&self);
}

/// One bound, listening endpoint.
#[async_trait]
pub trait SrtListener: Send + Sync {
    /// Registers the hook invoked for every incoming handshake before
    /// the connection is established. Replaces any previously
    /// registered hook.
    fn set_pre_accept_hook(&self, hook: PreAcceptHook);

    /// Awaits and returns the next socket that passed the pre-accept
    /// hook (or `Err` if the listener itself failed).
    async fn accept(&self) -> Result<AcceptedSocket, TransportError>;

    fn close(&self);
}

/// Factory for listeners, standing in for `srt_startup`/socket creation.
#[async_trait]
pub trait SrtTransport: Send + Sync {
    async fn bind(
        &self,
        bind_addr: SockAddr,
        pre_bind_options: &OptionMap,
    ) -> Result<Arc<dyn SrtListener>, TransportError>;
}
