use std::time::{Duration, Instant};

use common::ByteOrder;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

use crate::error::LoopRecError;
use crate::segment::Segment;

/// What one [`SegmentReader::read`] call produced.
pub enum ReadOutcome {
    /// The reader is ahead of schedule; sleep this long and retry with
    /// an empty buffer.
    AheadOfSchedule(Duration),
    /// The data stream is exhausted — move to the next segment. This is
    /// distinct from [`LoopRecError::IndexShortRead`], which means the
    /// index (not the data) ran out.
    EndOfStream,
    Data {
        bytes: Vec<u8>,
        /// How long the caller should sleep before sending this chunk,
        /// derived from interpolating the reference time inside the
        /// current index interval. `None` means send immediately.
        pace: Option<Duration>,
        /// Set when the caller is more than 300ms late sending relative
        /// to the interpolated reference time.
        late: bool,
    },
}

/// Paced reader over one segment's (data, index) pair: seeks to a
/// requested millisecond offset using the index, then reads forward,
/// reporting how each chunk should be paced against a `base_time`
/// monotonic reference.
pub struct SegmentReader {
    data_file: File,
    index_file: File,
    byte_order: ByteOrder,
    idx_interval: Duration,
    k: i64,
    pos_k: i64,
    pos_k1: i64,
    pos_ns: i64,
    read: i64,
    base_time: Instant,
    speed: f64,
    reached_idx_end: bool,
}

impl SegmentReader {
    pub async fn open(
        segment: &Segment,
        idx_interval: Duration,
        byte_order: ByteOrder,
        speed: f64,
        base_time: Instant,
        offset_ms: u64,
    ) -> Result<Self, LoopRecError> {
        let mut index_file = File::open(segment.index_path()).await?;
        let mut data_file = File::open(segment.data_path()).await?;

        let idx_interval_ms = idx_interval.as_millis().max(1) as u64;
        let k = (offset_ms / idx_interval_ms) as i64;

        index_file.seek(SeekFrom::Start((k * 8) as u64)).await?;
        let pos_k = read_index_record(&mut index_file, byte_order)
            .await?
            .ok_or(LoopRecError::IndexShortRead)?;
        let pos_k1 = read_index_record(&mut index_file, byte_order)
            .await?
            .ok_or(LoopRecError::IndexShortRead)?;

        data_file.seek(SeekFrom::Start(pos_k as u64)).await?;

        Ok(SegmentReader {
            data_file,
            index_file,
            byte_order,
            idx_interval,
            k,
            pos_k,
            pos_k1,
            pos_ns: k * idx_interval.as_nanos() as i64,
            read: 0,
            base_time,
            speed,
            reached_idx_end: false,
        })
    }

    pub fn base_time(&self) -> Instant {
        self.base_time
    }

    pub fn reached_idx_end(&self) -> bool {
        self.reached_idx_end
    }

    /// Bytes remaining before the current index interval boundary —
    /// used by the playback loop's prefetch trigger.
    pub fn bytes_remaining_in_interval(&self) -> i64 {
        (self.pos_k1 - self.pos_k - self.read).max(0)
    }

    pub async fn read(&mut self, tick: Instant, max_len: usize) -> Result<ReadOutcome, LoopRecError> {
        let elapsed_ns: i64 = match tick.checked_duration_since(self.base_time) {
            Some(d) => d.as_nanos() as i64,
            None => {
                let behind = self.base_time.duration_since(tick);
                return Ok(ReadOutcome::AheadOfSchedule(behind));
            }
        };

        let mut buf = vec![0u8; max_len];
        let n = self.data_file.read(&mut buf).await?;
        if n == 0 {
            return Ok(ReadOutcome::EndOfStream);
        }
        buf.truncate(n);

        let interval_bytes = (self.pos_k1 - self.pos_k).max(1) as f64;
        let reference_ns = (self.pos_ns as f64
            + self.idx_interval.as_nanos() as f64 * self.read as f64 / interval_bytes)
            / self.speed;

        let pace = if reference_ns > elapsed_ns as f64 {
            Some(Duration::from_nanos((reference_ns - elapsed_ns as f64) as u64))
        } else {
            None
        };
        let late = (elapsed_ns as f64 - reference_ns) > 300_000_000.0;

        self.read += n as i64;
        while self.pos_k + self.read >= self.pos_k1 {
            match read_index_record(&mut self.index_file, self.byte_order).await? {
                Some(next) => {
                    self.read -= self.pos_k1 - self.pos_k;
                    self.k += 1;
                    self.pos_ns += self.idx_interval.as_nanos() as i64;
                    self.pos_k = self.pos_k1;
                    self.pos_k1 = next;
                }
                None => {
                    self.reached_idx_end = true;
                    break;
                }
            }
        }

        Ok(ReadOutcome::Data { bytes: buf, pace, late })
    }
}

async fn read_index_record(file: &mut File, byte_order: ByteOrder) -> Result<Option<i64>, LoopRecError> {
    let mut buf = [0u8; 8];
    match file.read_exact(&mut buf).await {
        Ok(()) => Ok(Some(byte_order.from_bytes(buf))),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::SegmentWriter;
    use chrono::Utc;
    use std::path::PathBuf;
    use std::sync::Arc;

    async fn write_fixture(dir: &tempfile::TempDir, chunks: &[(Duration, &[u8])]) -> Arc<Segment> {
        let segment = Arc::new(Segment::new(
            PathBuf::from(dir.path()),
            Utc::now(),
            false,
            "dat".into(),
            "idx".into(),
        ));
        let mut writer = SegmentWriter::create(segment.clone(), Duration::from_millis(100), ByteOrder::Big)
            .await
            .unwrap();
        for (elapsed, bytes) in chunks {
            writer.write(*elapsed, bytes).await.unwrap();
        }
        writer.close().await.unwrap()
    }

    #[tokio::test]
    async fn seek_to_zero_starts_at_first_record() {
        let dir = tempfile::tempdir().unwrap();
        let segment = write_fixture(
            &dir,
            &[(Duration::from_millis(50), b"abcd"), (Duration::from_millis(150), b"efgh")],
        )
        .await;

        let base = Instant::now();
        let reader = SegmentReader::open(&segment, Duration::from_millis(100), ByteOrder::Big, 1.0, base, 0)
            .await
            .unwrap();
        assert_eq!(reader.k, 0);
        assert_eq!(reader.pos_k, 0);
    }

    #[tokio::test]
    async fn reading_past_end_of_data_reports_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let segment = write_fixture(&dir, &[(Duration::from_millis(50), b"abcd")]).await;

        let base = Instant::now() - Duration::from_secs(10);
        let mut reader =
            SegmentReader::open(&segment, Duration::from_millis(100), ByteOrder::Big, 1.0, base, 0)
                .await
                .unwrap();

        let first = reader.read(Instant::now(), 64).await.unwrap();
        assert!(matches!(first, ReadOutcome::Data { .. }));
        let second = reader.read(Instant::now(), 64).await.unwrap();
        assert!(matches!(second, ReadOutcome::EndOfStream));
    }

    #[tokio::test]
    async fn offset_beyond_index_end_fails_with_short_read() {
        let dir = tempfile::tempdir().unwrap();
        let segment = write_fixture(&dir, &[(Duration::from_millis(50), b"abcd")]).await;

        let result = SegmentReader::open(
            &segment,
            Duration::from_millis(100),
            ByteOrder::Big,
            1.0,
            Instant::now(),
            10_000,
        )
        .await;
        assert!(matches!(result, Err(LoopRecError::IndexShortRead)));
    }

    #[tokio::test]
    async fn reader_ahead_of_schedule_reports_sleep() {
        let dir = tempfile::tempdir().unwrap();
        let segment = write_fixture(&dir, &[(Duration::from_millis(50), b"abcd")]).await;

        let base = Instant::now() + Duration::from_secs(5);
        let mut reader =
            SegmentReader::open(&segment, Duration::from_millis(100), ByteOrder::Big, 1.0, base, 0)
                .await
                .unwrap();

        let outcome = reader.read(Instant::now(), 64).await.unwrap();
        assert!(matches!(outcome, ReadOutcome::AheadOfSchedule(_)));
    }
}
