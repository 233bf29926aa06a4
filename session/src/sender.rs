use std::sync::{Arc, Mutex};

use common::{OptionMap, SockAddr, StreamOption};
use transport::{SrtSocket, TransportError};

use crate::error::SessionError;

/// One accepted subscriber connection. Writes are non-blocking; a
/// would-block result is not a failure (mirrors the original sender's
/// treatment of `SRT_EASYNCSND` as a soft outcome the caller need not
/// react to beyond skipping this write).
pub struct Sender {
    socket: Arc<dyn SrtSocket>,
    peer: SockAddr,
    stream_option: StreamOption,
    last_error: Mutex<Option<String>>,
}

impl Sender {
    pub fn new(
        socket: Arc<dyn SrtSocket>,
        peer: SockAddr,
        stream_option: StreamOption,
        post_options: &OptionMap,
    ) -> Result<Self, SessionError> {
        socket.set_post_options(post_options)?;
        Ok(Sender {
            socket,
            peer,
            stream_option,
            last_error: Mutex::new(None),
        })
    }

    pub fn peer(&self) -> SockAddr {
        self.peer
    }

    pub fn stream_option(&self) -> &StreamOption {
        &self.stream_option
    }

    pub fn statistics(&self, level: u8) -> String {
        crate::stats::render(self.socket.as_ref(), crate::stats::Direction::Sender, level)
    }

    /// The most recent terminal send error, if any — set when `send`
    /// closes the socket after a non-soft failure.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().expect("lock poisoned").clone()
    }

    /// Returns `Ok(true)` if the connection is still usable (including
    /// the would-block case), `Ok(false)` once the peer has gone away.
    /// A terminal error closes the socket before being reported, so the
    /// caller's disconnect handling always finds a closed socket.
    pub async fn send(&self, data: &[u8]) -> Result<bool, SessionError> {
        match self.socket.send(data).await {
            Ok(()) => Ok(true),
            Err(TransportError::WouldBlock) => Ok(true),
            Err(TransportError::Closed) => Ok(false),
            Err(other) => {
                *self.last_error.lock().expect("lock poisoned") = Some(other.to_string());
                self.socket.close();
                Err(other.into())
            }
        }
    }

    pub fn close(&self) {
        self.socket.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport::mock::MockSocketPair;

    #[tokio::test]
    async fn send_after_peer_drop_reports_not_usable() {
        let MockSocketPair { server, client } =
            transport::mock::paired_sockets(SockAddr::new("127.0.0.1:9100".parse().unwrap()));
        drop(client);

        let sender = Sender::new(
            server,
            SockAddr::new("127.0.0.1:9100".parse().unwrap()),
            StreamOption::parse("r=live;m=request"),
            &OptionMap::new(),
        )
        .unwrap();

        let result = sender.send(b"payload").await.unwrap();
        assert!(!result);
    }
}
