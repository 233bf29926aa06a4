use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use common::{GapPolicy, Speed};
use session::Sender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::looprec::LoopRec;
use crate::reader::{ReadOutcome, SegmentReader};
use crate::segment::Segment;

const MAX_BUFFER: usize = 1456;
const GAP_POLL: Duration = Duration::from_millis(100);

/// Parameters for one subscriber's paced playback session, derived from
/// the `streamid` fields on the accepted socket.
pub struct PlaybackRequest {
    pub t_start: DateTime<Utc>,
    pub speed: Speed,
    pub buffer_size: usize,
    pub gap_policy: GapPolicy,
}

type Prefetch = JoinHandle<Option<(Arc<Segment>, SegmentReader)>>;

/// Runs one subscriber's pacer to completion: reads segments in order,
/// sleeping to keep wall-clock pace with `request.speed`, until the
/// sender disconnects, the gap policy tells it to stop, or it catches
/// up to the live edge.
pub async fn run(loop_rec: Arc<LoopRec>, sender: Arc<Sender>, request: PlaybackRequest, cancel: CancellationToken) {
    let buffer_size = request.buffer_size.min(MAX_BUFFER).max(1);
    let speed = request.speed.value();
    let gap_policy = request.gap_policy;

    let mut base = Instant::now();
    let mut reader: Option<SegmentReader> = None;
    let mut current_seg: Option<Arc<Segment>> = None;
    let mut prefetch: Option<(DateTime<Utc>, Prefetch)> = None;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let tick = Instant::now();
        let at = request.t_start + scale_elapsed(tick.saturating_duration_since(base), speed);
        let now = Utc::now();

        if reader.is_none() {
            if speed < 1.0 && at + loop_rec.total_duration() < now {
                info!("playback got out of range");
                break;
            }
            if speed > 1.0 && at > now {
                info!("playback reached live edge");
                break;
            }

            let Some(seg) = loop_rec.segment_for(at) else {
                if gap_policy == GapPolicy::Break {
                    break;
                }
                if sleep_or_cancel(GAP_POLL, &cancel).await {
                    break;
                }
                continue;
            };

            if seg.t0 > at {
                match gap_policy {
                    GapPolicy::Break => break,
                    GapPolicy::Wait => {
                        let delta = (seg.t0 - at).to_std().unwrap_or(GAP_POLL).min(GAP_POLL);
                        if sleep_or_cancel(delta, &cancel).await {
                            break;
                        }
                        continue;
                    }
                    GapPolicy::Skip => {
                        let hole = (seg.t0 - at).to_std().unwrap_or(Duration::ZERO);
                        base = base.checked_sub(scale_to_std(hole, 1.0 / speed)).unwrap_or(base);
                        continue;
                    }
                }
            }

            let offset = at - seg.t0;
            if offset >= loop_rec.segment_duration() {
                current_seg = loop_rec.next_segment(seg.t0);
                continue;
            }

            let offset_ms = offset.num_milliseconds().max(0) as u64;
            let reader_base = tick.checked_sub(scale_to_std(offset.to_std().unwrap_or(Duration::ZERO), 1.0 / speed)).unwrap_or(tick);

            match SegmentReader::open(&seg, loop_rec.idx_interval(), loop_rec.byte_order(), speed, reader_base, offset_ms).await {
                Ok(r) => {
                    reader = Some(r);
                    current_seg = Some(seg);
                }
                Err(err) => {
                    warn!(error = %err, "failed to initialise segment reader, skipping segment");
                    current_seg = loop_rec.next_segment(seg.t0);
                }
            }
            continue;
        }

        let r = reader.as_mut().expect("checked above");
        match r.read(tick, buffer_size).await {
            Ok(ReadOutcome::AheadOfSchedule(sleep_for)) => {
                if sleep_or_cancel(sleep_for.min(Duration::from_secs(1)), &cancel).await {
                    break;
                }
            }
            Ok(ReadOutcome::EndOfStream) => {
                let exhausted = current_seg.clone().expect("reader implies current_seg");
                let next = match take_ready_prefetch(&mut prefetch, exhausted.t0).await {
                    Some(ready) => Some(ready),
                    None => loop_rec
                        .next_segment(exhausted.t0)
                        .map(|seg| (seg.clone(), None)),
                };

                match next {
                    Some((next_seg, maybe_reader)) if next_seg.continuous => {
                        let carried = r.base_time() + scale_to_std(std_duration(loop_rec.segment_duration()), 1.0 / speed);
                        if let Some(next_reader) = maybe_reader {
                            reader = Some(next_reader);
                        } else {
                            match SegmentReader::open(&next_seg, loop_rec.idx_interval(), loop_rec.byte_order(), speed, carried, 0).await {
                                Ok(nr) => reader = Some(nr),
                                Err(_) => reader = None,
                            }
                        }
                        current_seg = Some(next_seg);
                    }
                    _ => {
                        reader = None;
                        current_seg = None;
                        if gap_policy == GapPolicy::Break {
                            break;
                        }
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "segment read failed");
                reader = None;
                current_seg = None;
            }
            Ok(ReadOutcome::Data { bytes, pace, late }) => {
                if let Some(sleep_for) = pace {
                    if sleep_for > Duration::from_millis(100) {
                        warn!(millis = sleep_for.as_millis() as u64, "playback sleeping long before send");
                    }
                    if sleep_or_cancel(sleep_for.min(Duration::from_secs(2)), &cancel).await {
                        break;
                    }
                }
                if late {
                    warn!("playback late to send");
                }

                maybe_start_prefetch(&loop_rec, &current_seg, reader.as_ref(), &mut prefetch, speed);

                if bytes.is_empty() {
                    continue;
                }
                match sender.send(&bytes).await {
                    Ok(true) => continue,
                    Ok(false) | Err(_) => break,
                }
            }
        }
    }
}

fn maybe_start_prefetch(
    loop_rec: &Arc<LoopRec>,
    current_seg: &Option<Arc<Segment>>,
    reader: Option<&SegmentReader>,
    prefetch: &mut Option<(DateTime<Utc>, Prefetch)>,
    speed: f64,
) {
    if prefetch.is_some() {
        return;
    }
    let (Some(seg), Some(reader)) = (current_seg, reader) else { return };
    // The reader only exposes how many bytes remain in its *current*
    // index interval, not the whole segment. Treat running out of the
    // interval as close enough to "within `prefetch()` of the end" to
    // trigger the next segment's reader opening ahead of time.
    if reader.bytes_remaining_in_interval() > 0 {
        return;
    }
    let Some(next_seg) = loop_rec.next_segment(seg.t0) else { return };
    if !next_seg.continuous {
        return;
    }

    let base = reader.base_time() + scale_to_std(std_duration(loop_rec.segment_duration()), 1.0 / speed);
    let idx_interval = loop_rec.idx_interval();
    let byte_order = loop_rec.byte_order();
    let start_t0 = next_seg.t0;
    let handle = tokio::spawn(async move {
        SegmentReader::open(&next_seg, idx_interval, byte_order, speed, base, 0)
            .await
            .ok()
            .map(|r| (next_seg, r))
    });
    *prefetch = Some((start_t0, handle));
}

async fn take_ready_prefetch(
    prefetch: &mut Option<(DateTime<Utc>, Prefetch)>,
    exhausted_t0: DateTime<Utc>,
) -> Option<(Arc<Segment>, Option<SegmentReader>)> {
    let (expected_t0, handle) = prefetch.take()?;
    if !handle.is_finished() {
        *prefetch = Some((expected_t0, handle));
        return None;
    }
    match handle.await {
        Ok(Some((seg, reader))) if seg.t0 > exhausted_t0 => Some((seg, Some(reader))),
        _ => None,
    }
}

async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => false,
        () = cancel.cancelled() => true,
    }
}

fn scale_elapsed(elapsed: Duration, speed: f64) -> chrono::Duration {
    chrono::Duration::nanoseconds((elapsed.as_nanos() as f64 * speed) as i64)
}

fn scale_to_std(d: Duration, factor: f64) -> Duration {
    Duration::from_secs_f64((d.as_secs_f64() * factor).max(0.0))
}

fn std_duration(d: chrono::Duration) -> Duration {
    d.to_std().unwrap_or(Duration::from_secs(600))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_elapsed_respects_speed() {
        let elapsed = Duration::from_secs(10);
        let scaled = scale_elapsed(elapsed, 2.0);
        assert_eq!(scaled, chrono::Duration::seconds(20));
    }

    #[test]
    fn scale_to_std_inverts_speed() {
        let d = Duration::from_secs(10);
        let scaled = scale_to_std(d, 0.5);
        assert_eq!(scaled, Duration::from_secs(5));
    }
}
