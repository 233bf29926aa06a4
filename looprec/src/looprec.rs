use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::{ByteOrder, StreamOption};
use reflector::ArchiveSource;
use session::Consumer;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::LoopRecConfig;
use crate::segment::{parse_stem, Segment};
use crate::storage::ObjectStore;
use crate::writer::SegmentWriter;

enum WorkerMsg {
    Packet { at: Instant, bytes: Bytes },
    Disconnected,
}

struct ActiveWriter {
    writer: SegmentWriter,
    created_at: Instant,
    rotation_deadline: Instant,
}

/// One archived resource: a directory of rotating (data, index) segment
/// pairs plus the background task that owns the currently-open
/// [`SegmentWriter`]. Attaches to a live [`session::Receiver`] as a
/// [`Consumer`] and answers [`ArchiveSource::is_available`] for
/// playback-only subscribers.
pub struct LoopRec {
    config: LoopRecConfig,
    dir: PathBuf,
    data_ext: String,
    index_ext: String,
    byte_order: ByteOrder,
    idx_interval: Duration,
    segment_duration: chrono::Duration,
    total_duration: chrono::Duration,
    pub(crate) segments: Arc<StdMutex<BTreeMap<DateTime<Utc>, Arc<Segment>>>>,
    tx: mpsc::UnboundedSender<WorkerMsg>,
}

impl LoopRec {
    /// Scans `config.dir` for existing segments, runs an immediate
    /// retention sweep, and spawns the background writer task.
    ///
    /// `on_receive` is a synchronous [`Consumer`] method, so the actual
    /// file I/O can't run inline — every packet is handed to this
    /// background task over an unbounded channel, which is also where
    /// the channel itself plays the role of the original's "unbounded
    /// deque" write queue.
    pub fn start(config: LoopRecConfig, store: Option<Arc<dyn ObjectStore>>) -> Arc<Self> {
        let dir = PathBuf::from(&config.dir);
        std::fs::create_dir_all(&dir).ok();

        let (data_ext, index_ext) = config.resolved_extensions();
        let byte_order = config.byte_order();
        let idx_interval = config.index_interval();
        let segment_duration = config.segment_duration();
        let total_duration = config.total_duration();

        let segments = Arc::new(StdMutex::new(scan_directory(&dir, &data_ext, &index_ext)));

        let (tx, rx) = mpsc::unbounded_channel();
        let this = Arc::new(LoopRec {
            config,
            dir,
            data_ext,
            index_ext,
            byte_order,
            idx_interval,
            segment_duration,
            total_duration,
            segments,
            tx,
        });

        this.retention_sweep();
        tokio::spawn(run_worker(this.clone(), rx, store));
        this
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Expired segments are dropped from the map unconditionally, local
    /// files deleted regardless of push state (the original's
    /// `segments_.erase(begin, it)`, which relies on the `Segment`
    /// destructor to remove local and remote copies for anything past
    /// retention). Among the survivors, any already pushed to object
    /// storage get their local files evicted eagerly, since the remote
    /// copy is now the durable one.
    fn retention_sweep(&self) {
        let now = Utc::now();
        let mut segments = self.segments.lock().expect("lock poisoned");
        let mut evict = Vec::new();
        for (t0, segment) in segments.iter() {
            if segment.is_retention_expired(now, self.total_duration, self.segment_duration) {
                segment.mark_expired();
                let _ = std::fs::remove_file(segment.data_path());
                let _ = std::fs::remove_file(segment.index_path());
                evict.push(*t0);
            } else if segment.is_pushed() {
                let _ = std::fs::remove_file(segment.data_path());
                let _ = std::fs::remove_file(segment.index_path());
            }
        }
        for t0 in evict {
            segments.remove(&t0);
        }
    }

    /// Returns the segment covering `at` if one exists; otherwise the
    /// next segment starting after `at` (so the caller can detect and
    /// apply its gap policy to the hole), or `None` if nothing follows.
    pub(crate) fn segment_for(&self, at: DateTime<Utc>) -> Option<Arc<Segment>> {
        let segments = self.segments.lock().expect("lock poisoned");
        if let Some((_, segment)) = segments.range(..=at).next_back() {
            if at < segment.t0 + self.segment_duration {
                return Some(segment.clone());
            }
        }
        segments
            .range((std::ops::Bound::Excluded(at), std::ops::Bound::Unbounded))
            .next()
            .map(|(_, segment)| segment.clone())
    }

    pub(crate) fn next_segment(&self, after: DateTime<Utc>) -> Option<Arc<Segment>> {
        let segments = self.segments.lock().expect("lock poisoned");
        segments.range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded)).next().map(|(_, s)| s.clone())
    }

    pub fn idx_interval(&self) -> Duration {
        self.idx_interval
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn segment_duration(&self) -> chrono::Duration {
        self.segment_duration
    }

    pub fn total_duration(&self) -> chrono::Duration {
        self.total_duration
    }

    pub fn prefetch(&self) -> Duration {
        self.config.prefetch()
    }
}

impl Consumer for LoopRec {
    fn on_receive(&self, data: &[u8], _discrete: bool) -> bool {
        let _ = self.tx.send(WorkerMsg::Packet { at: Instant::now(), bytes: Bytes::copy_from_slice(data) });
        true
    }

    fn on_disconnected(&self) {
        let _ = self.tx.send(WorkerMsg::Disconnected);
    }
}

impl ArchiveSource for LoopRec {
    fn is_available(&self, resource: &str, stream_option: &StreamOption) -> bool {
        if resource != self.config.name {
            return false;
        }
        let now = Utc::now();
        let at_raw = stream_option.map().get_str("at", "");
        let Ok(at) = common::parse_at(&at_raw, now) else {
            return false;
        };
        now - self.total_duration <= at && at <= now
    }
}

fn scan_directory(dir: &std::path::Path, data_ext: &str, index_ext: &str) -> BTreeMap<DateTime<Utc>, Arc<Segment>> {
    let mut map = BTreeMap::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return map;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else { continue };
        if ext != data_ext {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
        let Some((t0, continuous)) = parse_stem(stem) else { continue };
        let segment = Arc::new(Segment::new(
            dir.to_path_buf(),
            t0,
            continuous,
            data_ext.to_owned(),
            index_ext.to_owned(),
        ));
        map.insert(t0, segment);
    }
    map
}

async fn run_worker(loop_rec: Arc<LoopRec>, mut rx: mpsc::UnboundedReceiver<WorkerMsg>, store: Option<Arc<dyn ObjectStore>>) {
    let mut current: Option<ActiveWriter> = None;
    let queue_ms = loop_rec.config.queue_ms();
    let queue_age = if queue_ms >= 1 { Some(Duration::from_millis(queue_ms)) } else { None };

    while let Some(msg) = rx.recv().await {
        match msg {
            WorkerMsg::Disconnected => {
                if let Some(active) = current.take() {
                    close_writer(&loop_rec, active.writer, &store).await;
                }
            }
            WorkerMsg::Packet { at, bytes } => {
                if let Some(age) = queue_age {
                    if at.elapsed() > age {
                        warn!(loop_rec = loop_rec.name(), "write queue overflow, clearing backlog");
                        while rx.try_recv().is_ok() {}
                        if let Some(active) = current.take() {
                            close_writer(&loop_rec, active.writer, &store).await;
                        }
                        continue;
                    }
                }

                let now_instant = Instant::now();
                let needs_rotation = match &current {
                    None => true,
                    Some(active) => now_instant >= active.rotation_deadline,
                };

                if needs_rotation {
                    let continuous = current.is_some();
                    let next_deadline = match current.take() {
                        Some(active) => {
                            let deadline = active.rotation_deadline;
                            close_writer(&loop_rec, active.writer, &store).await;
                            deadline + std_duration(loop_rec.segment_duration)
                        }
                        None => now_instant + std_duration(loop_rec.segment_duration),
                    };
                    loop_rec.retention_sweep();

                    let t0 = Utc::now();
                    let segment = Arc::new(Segment::new(
                        loop_rec.dir.clone(),
                        t0,
                        continuous,
                        loop_rec.data_ext.clone(),
                        loop_rec.index_ext.clone(),
                    ));
                    match SegmentWriter::create(segment.clone(), loop_rec.idx_interval, loop_rec.byte_order).await {
                        Ok(writer) => {
                            loop_rec.segments.lock().expect("lock poisoned").insert(t0, segment);
                            current = Some(ActiveWriter { writer, created_at: now_instant, rotation_deadline: next_deadline });
                        }
                        Err(err) => {
                            warn!(loop_rec = loop_rec.name(), error = %err, "failed to open segment");
                            continue;
                        }
                    }
                }

                if let Some(active) = current.as_mut() {
                    let elapsed = at.saturating_duration_since(active.created_at);
                    if let Err(err) = active.writer.write(elapsed, &bytes).await {
                        warn!(loop_rec = loop_rec.name(), error = %err, "segment write failed");
                    }
                }
            }
        }
    }

    if let Some(active) = current.take() {
        close_writer(&loop_rec, active.writer, &store).await;
    }
}

fn std_duration(d: chrono::Duration) -> Duration {
    d.to_std().unwrap_or(Duration::from_secs(600))
}

async fn close_writer(loop_rec: &Arc<LoopRec>, writer: SegmentWriter, store: &Option<Arc<dyn ObjectStore>>) {
    let segment = match writer.close().await {
        Ok(segment) => segment,
        Err(err) => {
            warn!(loop_rec = loop_rec.name(), error = %err, "failed to close segment");
            return;
        }
    };
    debug!(loop_rec = loop_rec.name(), path = %segment.data_path().display(), "segment closed");

    let Some(store) = store.clone() else { return };
    let config = loop_rec.config.s3.clone();
    tokio::spawn(async move {
        let Some(s3) = config else { return };
        let stem = segment.stem();
        let folder = if s3.folder.is_empty() {
            hostname_fallback()
        } else {
            s3.folder.clone()
        };
        let data_key = format!("{folder}/{stem}.{}", segment.data_ext);
        let index_key = format!("{folder}/{stem}.{}", segment.index_ext);

        let data_bytes = match tokio::fs::read(segment.data_path()).await {
            Ok(b) => Bytes::from(b),
            Err(_) => return,
        };
        let index_bytes = match tokio::fs::read(segment.index_path()).await {
            Ok(b) => Bytes::from(b),
            Err(_) => return,
        };

        let data_put = store.put(&s3.bucket, &data_key, data_bytes);
        let index_put = store.put(&s3.bucket, &index_key, index_bytes);
        let (data_result, index_result) = tokio::join!(data_put, index_put);
        if data_result.is_ok() && index_result.is_ok() {
            segment.mark_pushed(data_key, index_key);
            info!(path = %stem, "segment pushed to object storage");
        }
    });
}

fn hostname_fallback() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoopRecConfig;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration as StdDuration;

    fn test_config(dir: &tempfile::TempDir) -> LoopRecConfig {
        LoopRecConfig {
            name: "cam1".into(),
            dir: dir.path().to_string_lossy().into_owned(),
            data_extension: "dat".into(),
            index_extension: "idx".into(),
            segment_duration: 10,
            total_duration: 10,
            index_interval: 50,
            index_endian: "big".into(),
            prefetch: 1000,
            queue: 0,
            queue_limit_min: None,
            queue_limit_max: None,
            s3: None,
        }
    }

    #[tokio::test]
    async fn receiving_packets_creates_a_segment_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let loop_rec = LoopRec::start(test_config(&dir), None);

        loop_rec.on_receive(b"hello", false);
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        let segments = loop_rec.segments.lock().unwrap();
        assert_eq!(segments.len(), 1);
    }

    #[tokio::test]
    async fn is_available_rejects_unparseable_at() {
        let dir = tempfile::tempdir().unwrap();
        let loop_rec = LoopRec::start(test_config(&dir), None);
        let opt = StreamOption::parse("r=cam1,m=request");
        assert!(!loop_rec.is_available("cam1", &opt));
    }

    #[tokio::test]
    async fn is_available_accepts_recent_at_within_total_duration() {
        let dir = tempfile::tempdir().unwrap();
        let loop_rec = LoopRec::start(test_config(&dir), None);
        let opt = StreamOption::parse("r=cam1,m=request,at=now-5");
        assert!(loop_rec.is_available("cam1", &opt));
    }

    #[tokio::test]
    async fn is_available_rejects_mismatched_resource() {
        let dir = tempfile::tempdir().unwrap();
        let loop_rec = LoopRec::start(test_config(&dir), None);
        let opt = StreamOption::parse("r=other,m=request,at=now-1");
        assert!(!loop_rec.is_available("cam1", &opt));
    }

    struct NoopConsumer(AtomicBool);
    impl Consumer for NoopConsumer {
        fn on_receive(&self, _data: &[u8], _discrete: bool) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn noop_consumer_compiles_against_trait() {
        let c = NoopConsumer(AtomicBool::new(true));
        assert!(c.on_receive(b"x", false));
    }
}
