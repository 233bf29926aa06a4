//! Wires the config-level `reflects[]` entries into bound listeners and
//! drives each endpoint's accept loop: publishers become `Receiver`s,
//! live `request`s fan out to the matching `Receiver`, and archive-only
//! `request`s are handed to the loop recorder's paced playback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use common::{GapPolicy, Speed};
use reflector::{Accepted, ArchiveSource, Reflector};
use session::{Consumer, Listener, Receiver, Sender};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use transport::{AcceptedSocket, SrtTransport};

use crate::config::ReflectEntry;

/// Multiplexes [`ArchiveSource::is_available`] across every `LoopRec`
/// attached to one endpoint, keyed by resource name — an endpoint may
/// record more than one resource, each with its own recorder.
struct MultiArchive(HashMap<String, Arc<looprec::LoopRec>>);

impl ArchiveSource for MultiArchive {
    fn is_available(&self, resource: &str, stream_option: &common::StreamOption) -> bool {
        self.0
            .get(resource)
            .is_some_and(|loop_rec| loop_rec.is_available(resource, stream_option))
    }
}

/// One successfully bound `reflects[]` entry, ready to run its accept
/// loop.
pub struct BoundEndpoint {
    reflector: Arc<Reflector>,
    listener: Listener,
    loop_recs: HashMap<String, Arc<looprec::LoopRec>>,
}

/// No real SRT binding crate exists in this workspace (the SRT
/// transport is an explicit external collaborator); `MockTransport` is
/// the only concrete `SrtTransport` the codebase ships; wiring it in
/// here is a real-socket binding's drop-in placeholder.
pub fn default_transport() -> Arc<dyn SrtTransport> {
    Arc::new(transport::mock::MockTransport)
}

/// Starts every configured loop recorder and binds every configured
/// endpoint, logging and skipping (rather than aborting the whole
/// process) any single endpoint that fails to bind.
pub async fn bind_all(transport: Arc<dyn SrtTransport>, reflects: Vec<ReflectEntry>) -> Vec<BoundEndpoint> {
    let mut bound = Vec::with_capacity(reflects.len());

    for entry in reflects {
        let bind_addr = entry.endpoint.bind_addr;

        let mut loop_recs = HashMap::new();
        for cfg in entry.loop_recs {
            let name = cfg.name.clone();
            let store: Option<Arc<dyn looprec::ObjectStore>> = None;
            loop_recs.insert(name, looprec::LoopRec::start(cfg, store));
        }

        let archive: Option<Arc<dyn ArchiveSource>> = if loop_recs.is_empty() {
            None
        } else {
            Some(Arc::new(MultiArchive(loop_recs.clone())))
        };

        let reflector = Reflector::new(entry.endpoint, archive);

        match Listener::bind(transport.as_ref(), bind_addr, &entry.pre_bind_option).await {
            Ok(listener) => {
                listener.set_pre_accept_hook(reflector.pre_accept_hook());
                info!(addr = %bind_addr.to_display_string(), "endpoint bound");
                bound.push(BoundEndpoint {
                    reflector,
                    listener,
                    loop_recs,
                });
            }
            Err(err) => {
                warn!(addr = %bind_addr.to_display_string(), error = %err, "endpoint failed to bind");
            }
        }
    }

    bound
}

/// Runs one endpoint's accept loop until `cancel` fires. Every accepted
/// socket is dispatched on its own task so a slow handshake on one
/// connection never stalls the accept loop for the rest.
pub async fn run_endpoint(endpoint: BoundEndpoint, cancel: CancellationToken) {
    let stats_task = endpoint.reflector.stats_interval().map(|interval| {
        let reflector = endpoint.reflector.clone();
        let cancel = cancel.clone();
        tokio::spawn(run_periodic_stats(reflector, interval, cancel))
    });

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                endpoint.listener.close();
                break;
            }
            accepted = endpoint.listener.accept() => match accepted {
                Ok(socket) => {
                    let reflector = endpoint.reflector.clone();
                    let loop_recs = endpoint.loop_recs.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(handle_accepted(reflector, loop_recs, socket, cancel));
                }
                Err(err) => {
                    warn!(error = %err, "listener accept failed, stopping endpoint");
                    break;
                }
            },
        }
    }

    if let Some(task) = stats_task {
        task.abort();
    }
}

/// The listener-flag poll loop: every `interval`, logs statistics for
/// every receiver currently active on this endpoint.
async fn run_periodic_stats(reflector: Arc<Reflector>, interval: std::time::Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => reflector.log_statistics(1).await,
        }
    }
}

async fn handle_accepted(
    reflector: Arc<Reflector>,
    loop_recs: HashMap<String, Arc<looprec::LoopRec>>,
    socket: AcceptedSocket,
    cancel: CancellationToken,
) {
    let peer = socket.peer;
    match reflector.on_accept(socket).await {
        Ok(Accepted::Receiver(receiver)) => {
            let resource = receiver.stream_option().resource_name();
            if let Some(loop_rec) = loop_recs.get(&resource) {
                receiver.add_consumer(loop_rec.clone()).await;
            }
            receiver.clone().run(cancel).await;
            reflector.remove_receiver(&resource).await;
        }
        Ok(Accepted::LiveSender { receiver, sender }) => {
            receiver.add_consumer(FanoutConsumer::spawn(sender)).await;
        }
        Ok(Accepted::PlaybackSender { resource, sender }) => {
            let Some(loop_rec) = loop_recs.get(&resource).cloned() else {
                warn!(%resource, "playback sender with no matching loop recorder, dropping");
                return;
            };
            let request = playback_request(&sender);
            looprec::playback::run(loop_rec, sender, request, cancel).await;
        }
        Err(err) => {
            warn!(peer = %peer.to_display_string(), error = %err, "connection rejected");
        }
    }
}

/// Builds a [`looprec::PlaybackRequest`] from the accepted subscriber's
/// `streamid` options: `at` (default now, i.e. the live edge), `speed`
/// (or its `x` synonym), `bufsiz`, and `gap`.
fn playback_request(sender: &Sender) -> looprec::PlaybackRequest {
    let map = sender.stream_option().map();
    let now = Utc::now();
    let at_raw = map.get_str("at", "");
    let t_start = if at_raw.is_empty() {
        now
    } else {
        common::parse_at(&at_raw, now).unwrap_or(now)
    };
    let speed = Speed::new(map.get_f64("speed", map.get_f64("x", 1.0)));
    let buffer_size = map.get_i64("bufsiz", 1456).max(1) as usize;
    let gap_policy = GapPolicy::parse(&map.get_str("gap", "skip"));

    looprec::PlaybackRequest {
        t_start,
        speed,
        buffer_size,
        gap_policy,
    }
}

/// Bridges a live subscriber's async [`Sender::send`] to the
/// synchronous [`Consumer`] interface the receiver's fan-out dispatch
/// requires — the same channel-to-background-task shape `LoopRec` uses
/// for the same reason: `on_receive` cannot block on socket I/O.
struct FanoutConsumer {
    tx: mpsc::UnboundedSender<Bytes>,
    alive: Arc<AtomicBool>,
}

impl FanoutConsumer {
    fn spawn(sender: Arc<Sender>) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
        let alive = Arc::new(AtomicBool::new(true));
        let worker_alive = alive.clone();
        tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                match sender.send(&bytes).await {
                    Ok(true) => continue,
                    Ok(false) | Err(_) => break,
                }
            }
            worker_alive.store(false, Ordering::Release);
        });
        Arc::new(FanoutConsumer { tx, alive })
    }
}

impl Consumer for FanoutConsumer {
    fn on_receive(&self, data: &[u8], _discrete: bool) -> bool {
        if !self.alive.load(Ordering::Acquire) {
            return false;
        }
        self.tx.send(Bytes::copy_from_slice(data)).is_ok()
    }

    fn on_disconnected(&self) {
        self.alive.store(false, Ordering::Release);
    }
}
