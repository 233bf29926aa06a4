use std::sync::Arc;

use common::{OptionMap, SockAddr, StreamOption};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use transport::{RecvOutcome, SrtSocket};

use crate::consumer::Consumer;
use crate::error::SessionError;

/// One entry in a [`Receiver`]'s fan-out list: a consumer, its
/// dispatch priority (higher first; insertion order preserved among
/// equal priorities), and whether the Receiver owns it — only an owned
/// consumer is dropped from the list when its `on_receive` returns
/// `false`.
struct ConsumerEntry {
    priority: i32,
    owned: bool,
    consumer: Arc<dyn Consumer>,
}

/// One accepted publisher connection. Fans incoming payloads out to a
/// dynamic set of [`Consumer`]s — the loop recorder and zero or more
/// live subscribers attach here.
pub struct Receiver {
    socket: Arc<dyn SrtSocket>,
    peer: SockAddr,
    stream_option: StreamOption,
    consumers: RwLock<Vec<ConsumerEntry>>,
}

impl Receiver {
    pub fn new(
        socket: Arc<dyn SrtSocket>,
        peer: SockAddr,
        stream_option: StreamOption,
        post_options: &OptionMap,
    ) -> Result<Self, SessionError> {
        socket.set_post_options(post_options)?;
        Ok(Receiver {
            socket,
            peer,
            stream_option,
            consumers: RwLock::new(Vec::new()),
        })
    }

    pub fn peer(&self) -> SockAddr {
        self.peer
    }

    pub fn stream_option(&self) -> &StreamOption {
        &self.stream_option
    }

    /// Attaches a consumer at priority 0, owned by this Receiver (the
    /// shape every current caller — the loop recorder, live subscriber
    /// fan-out — actually uses).
    pub async fn add_consumer(&self, consumer: Arc<dyn Consumer>) {
        self.add_consumer_with(consumer, 0, true).await;
    }

    /// Attaches a consumer at the given priority (higher values are
    /// dispatched first; insertion order is preserved among equal
    /// priorities, matching the original's descending-sorted event
    /// list). `owned` controls whether a `false` return from
    /// `on_receive` removes it from the fan-out list at all.
    pub async fn add_consumer_with(&self, consumer: Arc<dyn Consumer>, priority: i32, owned: bool) {
        let mut consumers = self.consumers.write().await;
        let pos = consumers.partition_point(|entry| entry.priority >= priority);
        consumers.insert(pos, ConsumerEntry { priority, owned, consumer });
    }

    pub fn statistics(&self, level: u8) -> String {
        crate::stats::render(self.socket.as_ref(), crate::stats::Direction::Receiver, level)
    }

    /// Polls the socket until disconnection or `cancel` fires, fanning
    /// every message out to the current consumer set and dropping any
    /// consumer whose `on_receive` returns `false`.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    self.socket.close();
                    break;
                }
                outcome = self.socket.recv() => match outcome {
                    Ok(RecvOutcome::Data { bytes, discrete }) => {
                        self.dispatch(&bytes, discrete).await;
                    }
                    Ok(RecvOutcome::Disconnected) => {
                        self.notify_disconnected().await;
                        break;
                    }
                    Err(err) => {
                        warn!(peer = %self.peer.to_display_string(), error = %err, "receiver poll failed");
                        self.notify_disconnected().await;
                        break;
                    }
                },
            }
        }
    }

    /// Delivers to every consumer in priority order, completing before
    /// the next packet's deliveries begin. A `false` return only drops
    /// the consumer when it's owned; an unowned consumer that declines
    /// delivery stays attached.
    async fn dispatch(&self, data: &[u8], discrete: bool) {
        let mut consumers = self.consumers.write().await;
        consumers.retain(|entry| entry.consumer.on_receive(data, discrete) || !entry.owned);
    }

    async fn notify_disconnected(&self) {
        let consumers = self.consumers.read().await;
        for entry in consumers.iter() {
            entry.consumer.on_disconnected();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use transport::mock::MockSocketPair;

    struct CountingConsumer {
        received: AtomicUsize,
        keep: AtomicBool,
        disconnected: AtomicBool,
    }

    impl Consumer for CountingConsumer {
        fn on_receive(&self, _data: &[u8], _discrete: bool) -> bool {
            self.received.fetch_add(1, Ordering::SeqCst);
            self.keep.load(Ordering::SeqCst)
        }

        fn on_disconnected(&self) {
            self.disconnected.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn fan_out_drops_consumer_that_returns_false() {
        let MockSocketPair { server, client } =
            transport::mock::paired_sockets(SockAddr::new("127.0.0.1:9000".parse().unwrap()));

        let receiver = Arc::new(
            Receiver::new(
                server,
                SockAddr::new("127.0.0.1:9000".parse().unwrap()),
                StreamOption::parse("r=live"),
                &OptionMap::new(),
            )
            .unwrap(),
        );

        let consumer = Arc::new(CountingConsumer {
            received: AtomicUsize::new(0),
            keep: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
        });
        receiver.add_consumer(consumer.clone()).await;

        let cancel = CancellationToken::new();
        let run_handle = tokio::spawn(receiver.clone().run(cancel.clone()));

        client.send(b"frame-1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        client.send(b"frame-2").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(consumer.received.load(Ordering::SeqCst), 1);

        cancel.cancel();
        let _ = run_handle.await;
    }

    #[tokio::test]
    async fn disconnection_notifies_remaining_consumers() {
        let MockSocketPair { server, client } =
            transport::mock::paired_sockets(SockAddr::new("127.0.0.1:9001".parse().unwrap()));

        let receiver = Arc::new(
            Receiver::new(
                server,
                SockAddr::new("127.0.0.1:9001".parse().unwrap()),
                StreamOption::parse("r=live"),
                &OptionMap::new(),
            )
            .unwrap(),
        );

        let consumer = Arc::new(CountingConsumer {
            received: AtomicUsize::new(0),
            keep: AtomicBool::new(true),
            disconnected: AtomicBool::new(false),
        });
        receiver.add_consumer(consumer.clone()).await;

        let run_handle = tokio::spawn(receiver.clone().run(CancellationToken::new()));
        drop(client);
        let _ = run_handle.await;

        assert!(consumer.disconnected.load(Ordering::SeqCst));
    }
}
