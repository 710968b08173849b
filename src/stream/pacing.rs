//! Pacing writer for the shared WebRTC sample track
//!
//! The WebRTC stack needs every sample to carry an elapsed-time hint. The
//! writer keeps a one-slot look-ahead: the current frame is held until the
//! next one arrives, then written with the observed inter-capture gap as
//! its duration. Across an encoder restart the held frame is flushed with
//! the nominal 1/fps duration so a restart never produces a wall-clock
//! sized gap.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use super::frame::Frame;
use super::stats::StreamStats;
use crate::config::ConfigRegistry;
use crate::encoder::EpochCounter;

/// Samples must carry a strictly positive duration
const MIN_SAMPLE_DURATION: Duration = Duration::from_micros(1);

/// Spawn the writer task draining the pacing queue into the track.
pub fn spawn_pacing_writer(
    track: Arc<TrackLocalStaticSample>,
    mut rx: mpsc::Receiver<Frame>,
    epochs: Arc<EpochCounter>,
    registry: Arc<ConfigRegistry>,
    stats: Arc<StreamStats>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut state = PacingState::default();
        while let Some(frame) = rx.recv().await {
            let Some((ready, duration)) = state.on_frame(frame, epochs.current(), registry.fps())
            else {
                continue;
            };
            let sample = Sample {
                data: ready.data,
                duration,
                ..Default::default()
            };
            if let Err(e) = track.write_sample(&sample).await {
                debug!("write_sample failed: {}", e);
            } else {
                stats.record_sample();
            }
        }
        info!("pacing writer stopped");
    })
}

/// One-slot look-ahead state
#[derive(Default)]
struct PacingState {
    held: Option<Frame>,
}

impl PacingState {
    /// Accept the next frame; returns the previously held frame together
    /// with the duration it should be written with, if one is ready.
    ///
    /// Frames from a superseded encoder instance are discarded before they
    /// are ever held.
    fn on_frame(
        &mut self,
        next: Frame,
        current_epoch: u32,
        fps: u32,
    ) -> Option<(Frame, Duration)> {
        if next.epoch != current_epoch {
            return None;
        }
        match self.held.take() {
            None => {
                self.held = Some(next);
                None
            }
            Some(current) => {
                let duration = sample_duration(&current, &next, fps);
                self.held = Some(next);
                Some((current, duration))
            }
        }
    }
}

/// Duration for writing `held` once `next` has arrived.
fn sample_duration(held: &Frame, next: &Frame, fps: u32) -> Duration {
    if held.epoch == next.epoch {
        next.captured_at
            .saturating_duration_since(held.captured_at)
            .max(MIN_SAMPLE_DURATION)
    } else {
        default_frame_duration(fps)
    }
}

/// Nominal frame duration at the configured capture rate.
fn default_frame_duration(fps: u32) -> Duration {
    Duration::from_micros(1_000_000 / u64::from(fps.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Instant;

    fn frame_at(captured_at: Instant, epoch: u32) -> Frame {
        Frame {
            data: Bytes::from_static(b"frame"),
            captured_at,
            wallclock_ms: 0.0,
            epoch,
        }
    }

    #[test]
    fn duration_equals_inter_capture_gap() {
        let start = Instant::now();
        let held = frame_at(start, 1);
        let next = frame_at(start + Duration::from_millis(33), 1);

        assert_eq!(sample_duration(&held, &next, 30), Duration::from_millis(33));
    }

    #[test]
    fn duration_is_clamped_to_a_microsecond() {
        let start = Instant::now();
        let held = frame_at(start, 1);
        let next = frame_at(start, 1);

        assert_eq!(sample_duration(&held, &next, 30), MIN_SAMPLE_DURATION);
    }

    #[test]
    fn epoch_change_uses_nominal_duration() {
        let start = Instant::now();
        let held = frame_at(start, 1);
        // A restart gap would otherwise produce a multi-second duration
        let next = frame_at(start + Duration::from_secs(5), 2);

        assert_eq!(
            sample_duration(&held, &next, 30),
            default_frame_duration(30)
        );
        assert_eq!(default_frame_duration(30), Duration::from_micros(33_333));
    }

    #[test]
    fn first_frame_is_held_not_written() {
        let mut state = PacingState::default();
        assert!(state.on_frame(frame_at(Instant::now(), 1), 1, 30).is_none());
    }

    #[test]
    fn second_frame_releases_the_first() {
        let mut state = PacingState::default();
        let start = Instant::now();

        state.on_frame(frame_at(start, 1), 1, 30);
        let (written, duration) = state
            .on_frame(frame_at(start + Duration::from_millis(40), 1), 1, 30)
            .expect("held frame should be released");

        assert_eq!(written.captured_at, start);
        assert_eq!(duration, Duration::from_millis(40));
    }

    #[test]
    fn stale_epoch_frames_are_discarded() {
        let mut state = PacingState::default();
        let start = Instant::now();

        // Leftovers from epoch 1 after the supervisor moved to epoch 2
        assert!(state.on_frame(frame_at(start, 1), 2, 30).is_none());
        assert!(state.held.is_none());
    }

    #[tokio::test]
    async fn writer_keeps_a_one_slot_lookahead() {
        use webrtc::api::media_engine::MIME_TYPE_VP8;
        use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;

        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
            "video".to_owned(),
            "test".to_owned(),
        ));
        let (registry, _restart_rx) = ConfigRegistry::new(30);
        let epochs = Arc::new(EpochCounter::new());
        epochs.bump();
        let stats = Arc::new(StreamStats::default());
        let (tx, rx) = mpsc::channel(16);

        let writer = spawn_pacing_writer(track, rx, epochs, registry, stats.clone());

        let start = Instant::now();
        for i in 0..3u64 {
            tx.send(frame_at(start + Duration::from_millis(33 * i), 1))
                .await
                .unwrap();
        }
        drop(tx);
        writer.await.unwrap();

        // Three frames in, two written: the last one stays held
        assert_eq!(stats.snapshot().samples_written, 2);
    }

    #[test]
    fn held_frame_is_flushed_with_default_duration_across_epochs() {
        let mut state = PacingState::default();
        let start = Instant::now();

        state.on_frame(frame_at(start, 1), 1, 30);
        let (written, duration) = state
            .on_frame(frame_at(start + Duration::from_secs(3), 2), 2, 30)
            .expect("held frame should be flushed on epoch change");

        assert_eq!(written.epoch, 1);
        assert_eq!(duration, default_frame_duration(30));
    }
}
