//! In-memory stand-in for the SRT library, used by every crate's test
//! suite. A [`MockTransport`] hands out [`MockListener`]s; a test drives
//! inbound connections through the listener's [`MockConnector`], which
//! plays the role of a remote SRT peer completing a handshake.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use common::{OptionMap, SockAddr, StreamOption};
use tokio::sync::{mpsc, oneshot};

use crate::{
    AcceptedSocket, PreAcceptHook, RecvOutcome, SrtListener, SrtSocket, SrtTransport,
    TransportError,
};

#[derive(Default)]
pub struct MockTransport;

#[async_trait]
impl SrtTransport for MockTransport {
    async fn bind(
        &self,
        bind_addr: SockAddr,
        _pre_bind_options: &OptionMap,
    ) -> Result<Arc<dyn SrtListener>, TransportError> {
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        Ok(Arc::new(MockListener {
            bind_addr,
            pre_accept_hook: RwLock::new(None),
            conn_tx,
            conn_rx: Mutex::new(conn_rx),
            closed: AtomicBool::new(false),
        }))
    }
}

struct PendingConnection {
    peer: SockAddr,
    stream_option: StreamOption,
    respond: oneshot::Sender<Result<Arc<MockSocket>, TransportError>>,
}

pub struct MockListener {
    bind_addr: SockAddr,
    pre_accept_hook: RwLock<Option<PreAcceptHook>>,
    conn_tx: mpsc::UnboundedSender<PendingConnection>,
    conn_rx: Mutex<mpsc::UnboundedReceiver<PendingConnection>>,
    closed: AtomicBool,
}

impl MockListener {
    /// Returns a handle a test can use to simulate a peer dialing this
    /// listener.
    pub fn connector(self: &Arc<Self>) -> MockConnector {
        MockConnector {
            bind_addr: self.bind_addr.clone(),
            conn_tx: self.conn_tx.clone(),
        }
    }
}

#[async_trait]
impl SrtListener for MockListener {
    fn set_pre_accept_hook(&self, hook: PreAcceptHook) {
        *self.pre_accept_hook.write().expect("lock poisoned") = Some(hook);
    }

    async fn accept(&self) -> Result<AcceptedSocket, TransportError> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Err(TransportError::AcceptFailed("listener closed".into()));
            }
            let mut rx = self.conn_rx.lock().expect("lock poisoned");
            let pending = rx.recv().await;
            drop(rx);
            let Some(pending) = pending else {
                return Err(TransportError::AcceptFailed("listener closed".into()));
            };

            let decision = self
                .pre_accept_hook
                .read()
                .expect("lock poisoned")
                .as_ref()
                .map(|hook| hook(&pending.peer, &pending.stream_option));

            let allow = decision.as_ref().is_none_or(|d| d.allow);
            if !allow {
                let _ = pending
                    .respond
                    .send(Err(TransportError::HandshakeRejected(
                        "rejected by pre-accept hook".into(),
                    )));
                continue;
            }

            let (server_side, client_side) = MockSocket::paired(pending.peer.clone());
            let server_side = Arc::new(server_side);
            let client_side = Arc::new(client_side);
            if pending.respond.send(Ok(client_side)).is_err() {
                continue;
            }

            return Ok(AcceptedSocket {
                peer: pending.peer,
                stream_option: pending.stream_option,
                socket: server_side,
            });
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Drives simulated inbound connections into a [`MockListener`].
#[derive(Clone)]
pub struct MockConnector {
    bind_addr: SockAddr,
    conn_tx: mpsc::UnboundedSender<PendingConnection>,
}

impl MockConnector {
    pub fn bind_addr(&self) -> &SockAddr {
        &self.bind_addr
    }

    /// Simulates a peer at `peer` presenting `stream_option` at
    /// handshake time. Resolves once the listener's `accept` loop has
    /// run the pre-accept hook; an `Err` means the hook rejected the
    /// connection.
    pub async fn connect(
        &self,
        peer: SockAddr,
        stream_option: StreamOption,
    ) -> Result<Arc<dyn SrtSocket>, TransportError> {
        let (respond_tx, respond_rx) = oneshot::channel();
        self.conn_tx
            .send(PendingConnection {
                peer,
                stream_option,
                respond: respond_tx,
            })
            .map_err(|_| TransportError::AcceptFailed("listener dropped".into()))?;
        let socket = respond_rx
            .await
            .map_err(|_| TransportError::AcceptFailed("listener dropped".into()))??;
        Ok(socket as Arc<dyn SrtSocket>)
    }
}

/// One half of an in-memory duplex socket pair.
pub struct MockSocket {
    peer: SockAddr,
    outbound: mpsc::UnboundedSender<Bytes>,
    inbound: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    options: Mutex<OptionMap>,
    closed: AtomicBool,
}

/// A directly-constructed socket pair, bypassing listener/connector
/// plumbing — handy for tests of code that only needs a connected
/// [`SrtSocket`], not a full handshake.
pub struct MockSocketPair {
    pub server: Arc<dyn SrtSocket>,
    pub client: Arc<dyn SrtSocket>,
}

pub fn paired_sockets(peer: SockAddr) -> MockSocketPair {
    let (server, client) = MockSocket::paired(peer);
    MockSocketPair {
        server: Arc::new(server),
        client: Arc::new(client),
    }
}

impl MockSocket {
    fn paired(peer: SockAddr) -> (MockSocket, MockSocket) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let server_side = MockSocket {
            peer: peer.clone(),
            outbound: b_tx,
            inbound: Mutex::new(a_rx),
            options: Mutex::new(OptionMap::new()),
            closed: AtomicBool::new(false),
        };
        let client_side = MockSocket {
            peer,
            outbound: a_tx,
            inbound: Mutex::new(b_rx),
            options: Mutex::new(OptionMap::new()),
            closed: AtomicBool::new(false),
        };
        (server_side, client_side)
    }
}

#[async_trait]
impl SrtSocket for MockSocket {
    async fn recv(&self) -> Result<RecvOutcome, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let mut rx = self.inbound.lock().expect("lock poisoned");
        match rx.recv().await {
            Some(bytes) => Ok(RecvOutcome::Data {
                bytes,
                discrete: false,
            }),
            None => Ok(RecvOutcome::Disconnected),
        }
    }

    async fn send(&self, buf: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(Bytes::copy_from_slice(buf))
            .map_err(|_| TransportError::Closed)
    }

    fn set_post_options(&self, opts: &OptionMap) -> Result<(), TransportError> {
        let mut guard = self.options.lock().expect("lock poisoned");
        for (key, value) in opts.iter() {
            guard.set(key, value);
        }
        Ok(())
    }

    fn statistics(&self, level: u8, sep: &str) -> String {
        if level == 0 {
            return String::new();
        }
        format!("mock_socket:connected{sep}peer:{}", self.peer.to_display_string())
    }

    fn peer(&self) -> SockAddr {
        self.peer.clone()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::StreamOption;

    fn addr(s: &str) -> SockAddr {
        SockAddr::new(s.parse().unwrap())
    }

    fn mock_listener(bind_addr: SockAddr) -> Arc<MockListener> {
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        Arc::new(MockListener {
            bind_addr,
            pre_accept_hook: RwLock::new(None),
            conn_tx,
            conn_rx: Mutex::new(conn_rx),
            closed: AtomicBool::new(false),
        })
    }

    #[tokio::test]
    async fn accept_delivers_matching_socket_pair() {
        let listener = mock_listener(addr("127.0.0.1:4200"));
        let connector = listener.connector();

        let accept_task = tokio::spawn({
            let listener = listener.clone();
            async move { listener.accept().await }
        });

        let client = connector
            .connect(addr("203.0.113.5:9000"), StreamOption::parse("live/stream"))
            .await
            .unwrap();
        let accepted = accept_task.await.unwrap().unwrap();

        client.send(b"hello").await.unwrap();
        match accepted.socket.recv().await.unwrap() {
            RecvOutcome::Data { bytes, .. } => assert_eq!(&bytes[..], b"hello"),
            RecvOutcome::Disconnected => panic!("expected data"),
        }
    }

    #[tokio::test]
    async fn pre_accept_hook_can_reject() {
        let listener = mock_listener(addr("127.0.0.1:4201"));
        listener.set_pre_accept_hook(Arc::new(|_peer, _so| crate::PreAcceptDecision::deny()));
        let connector = listener.connector();

        let accept_task = tokio::spawn({
            let listener = listener.clone();
            async move { listener.accept().await }
        });

        let result = connector
            .connect(addr("203.0.113.6:9001"), StreamOption::parse(""))
            .await;
        assert!(result.is_err());

        listener.close();
        let _ = accept_task.await;
    }
}
