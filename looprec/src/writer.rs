use std::sync::Arc;
use std::time::Duration;

use common::ByteOrder;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::LoopRecError;
use crate::segment::Segment;

/// Appends captured payloads to a segment's data file and maintains its
/// index file: one 8-byte record per `idx_interval` of wall-clock time
/// elapsed since the segment started.
pub struct SegmentWriter {
    segment: Arc<Segment>,
    data_file: BufWriter<File>,
    index_file: BufWriter<File>,
    byte_order: ByteOrder,
    idx_interval: Duration,
    idx_time: Duration,
    data_pos: i64,
}

impl SegmentWriter {
    pub async fn create(
        segment: Arc<Segment>,
        idx_interval: Duration,
        byte_order: ByteOrder,
    ) -> Result<Self, LoopRecError> {
        let data_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(segment.data_path())
            .await?;
        let index_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(segment.index_path())
            .await?;

        let mut writer = SegmentWriter {
            segment,
            data_file: BufWriter::new(data_file),
            index_file: BufWriter::new(index_file),
            byte_order,
            idx_interval,
            idx_time: Duration::ZERO,
            data_pos: 0,
        };

        writer.write_index_record().await?;
        writer.index_file.flush().await?;
        debug!(path = %writer.segment.data_path().display(), "segment created");
        Ok(writer)
    }

    /// Appends `bytes` at wall-clock offset `elapsed` since the segment
    /// started, running the index catch-up loop for every boundary
    /// `elapsed` has crossed.
    pub async fn write(&mut self, elapsed: Duration, bytes: &[u8]) -> Result<(), LoopRecError> {
        self.data_file.write_all(bytes).await?;
        self.data_pos += bytes.len() as i64;

        let mut wrote_index = false;
        while elapsed >= self.idx_time + self.idx_interval {
            self.idx_time += self.idx_interval;
            self.write_index_record().await?;
            wrote_index = true;
        }

        if wrote_index {
            self.data_file.flush().await?;
            self.index_file.flush().await?;
        }
        Ok(())
    }

    async fn write_index_record(&mut self) -> Result<(), LoopRecError> {
        let record = self.byte_order.to_be(self.data_pos);
        self.index_file.write_all(&record).await?;
        Ok(())
    }

    pub async fn close(mut self) -> Result<Arc<Segment>, LoopRecError> {
        self.data_file.flush().await?;
        self.index_file.flush().await?;
        self.data_file.shutdown().await?;
        self.index_file.shutdown().await?;
        Ok(self.segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    async fn test_segment(dir: &tempfile::TempDir) -> Arc<Segment> {
        Arc::new(Segment::new(
            PathBuf::from(dir.path()),
            Utc::now(),
            false,
            "dat".into(),
            "idx".into(),
        ))
    }

    #[tokio::test]
    async fn first_index_record_is_zero_before_any_data() {
        let dir = tempfile::tempdir().unwrap();
        let segment = test_segment(&dir).await;
        let writer = SegmentWriter::create(segment.clone(), Duration::from_millis(100), ByteOrder::Big)
            .await
            .unwrap();
        let segment = writer.close().await.unwrap();

        let raw = std::fs::read(segment.index_path()).unwrap();
        assert_eq!(raw.len(), 8);
        assert_eq!(i64::from_be_bytes(raw.try_into().unwrap()), 0);
    }

    #[tokio::test]
    async fn catch_up_loop_writes_one_record_per_crossed_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let segment = test_segment(&dir).await;
        let mut writer =
            SegmentWriter::create(segment.clone(), Duration::from_millis(100), ByteOrder::Big)
                .await
                .unwrap();

        writer.write(Duration::from_millis(250), b"abcdefgh").await.unwrap();
        let segment = writer.close().await.unwrap();

        let raw = std::fs::read(segment.index_path()).unwrap();
        assert_eq!(raw.len() / 8, 3);
    }

    #[tokio::test]
    async fn index_records_track_data_position_at_crossing_time() {
        let dir = tempfile::tempdir().unwrap();
        let segment = test_segment(&dir).await;
        let mut writer =
            SegmentWriter::create(segment.clone(), Duration::from_millis(100), ByteOrder::Big)
                .await
                .unwrap();

        writer.write(Duration::from_millis(50), b"1234").await.unwrap();
        writer.write(Duration::from_millis(150), b"5678").await.unwrap();
        let segment = writer.close().await.unwrap();

        let raw = std::fs::read(segment.index_path()).unwrap();
        let records: Vec<i64> = raw
            .chunks(8)
            .map(|c| i64::from_be_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(records, vec![0, 8]);
    }
}
