//! Process-wide encoder parameters and screen geometry
//!
//! All mutations go through one lock. Any change that actually alters a
//! value raises a restart signal towards the encoder supervisor; the signal
//! channel has capacity one, so a burst of changes collapses into a single
//! restart.

use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const MIN_SCREEN_WIDTH: u32 = 320;
pub const MIN_SCREEN_HEIGHT: u32 = 240;
pub const MAX_SCREEN_WIDTH: u32 = 3840;
pub const MAX_SCREEN_HEIGHT: u32 = 2160;

const MIN_BANDWIDTH_MBPS: u32 = 1;
const MAX_BANDWIDTH_MBPS: u32 = 100;
const MIN_QUALITY: u32 = 10;
const MAX_QUALITY: u32 = 100;
const MIN_FPS: u32 = 1;
const MAX_FPS: u32 = 120;
const MAX_CPU_EFFORT: u32 = 8;
const MIN_CPU_THREADS: u32 = 1;
const MAX_CPU_THREADS: u32 = 16;

/// Rate-control strategy selected by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    Bandwidth,
    Quality,
}

/// Encoder parameters, sampled as one snapshot per encoder start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    pub target_mode: TargetMode,
    pub bandwidth_mbps: u32,
    pub quality: u32,
    pub fps: u32,
    pub vbr: bool,
    pub cpu_effort: u32,
    pub cpu_threads: u32,
    pub draw_mouse: bool,
}

impl EncoderConfig {
    fn with_fps(fps: u32) -> Self {
        Self {
            target_mode: TargetMode::Bandwidth,
            bandwidth_mbps: 5,
            quality: 80,
            fps: fps.clamp(MIN_FPS, MAX_FPS),
            vbr: false,
            cpu_effort: 6,
            cpu_threads: 4,
            draw_mouse: true,
        }
    }
}

/// Current output geometry, clamped to `[320x240, 3840x2160]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenState {
    pub width: u32,
    pub height: u32,
}

impl ScreenState {
    fn clamped(width: u32, height: u32) -> Self {
        Self {
            width: width.clamp(MIN_SCREEN_WIDTH, MAX_SCREEN_WIDTH),
            height: height.clamp(MIN_SCREEN_HEIGHT, MAX_SCREEN_HEIGHT),
        }
    }
}

/// A batch of optional field updates from one `config` control message
///
/// Field names mirror the wire protocol.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    pub bandwidth: Option<u32>,
    pub quality: Option<u32>,
    pub framerate: Option<u32>,
    pub vbr: Option<bool>,
    pub cpu_effort: Option<u32>,
    pub cpu_threads: Option<u32>,
    pub enable_desktop_mouse: Option<bool>,
}

/// Consistent view of config plus screen, taken under the registry lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub encoder: EncoderConfig,
    pub screen: ScreenState,
}

struct Inner {
    encoder: EncoderConfig,
    screen: ScreenState,
}

/// Registry for [`EncoderConfig`] and [`ScreenState`]
pub struct ConfigRegistry {
    inner: Mutex<Inner>,
    restart_tx: mpsc::Sender<()>,
}

impl ConfigRegistry {
    /// Create the registry with the initial capture framerate.
    ///
    /// Returns the restart-signal receiver the supervisor listens on.
    /// The screen starts at the hard-coded maximum; the viewer sends its
    /// real size in an initial `resize`.
    pub fn new(initial_fps: u32) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (restart_tx, restart_rx) = mpsc::channel(1);
        let registry = Arc::new(Self {
            inner: Mutex::new(Inner {
                encoder: EncoderConfig::with_fps(initial_fps),
                screen: ScreenState::clamped(MAX_SCREEN_WIDTH, MAX_SCREEN_HEIGHT),
            }),
            restart_tx,
        });
        (registry, restart_rx)
    }

    /// Sample a consistent snapshot of config and screen geometry.
    pub fn snapshot(&self) -> ConfigSnapshot {
        let inner = self.inner.lock().unwrap();
        ConfigSnapshot {
            encoder: inner.encoder.clone(),
            screen: inner.screen,
        }
    }

    /// Current capture framerate (used for default sample durations).
    pub fn fps(&self) -> u32 {
        self.inner.lock().unwrap().encoder.fps
    }

    /// Current screen geometry.
    pub fn screen_size(&self) -> (u32, u32) {
        let inner = self.inner.lock().unwrap();
        (inner.screen.width, inner.screen.height)
    }

    /// Apply a batch update under one lock section.
    ///
    /// Framerate is applied before the rate-control selection so a combined
    /// message lands as one coherent config. Returns whether anything
    /// changed; a change raises exactly one restart signal.
    pub fn apply(&self, update: &ConfigUpdate) -> bool {
        let changed = {
            let mut inner = self.inner.lock().unwrap();
            let before = inner.encoder.clone();
            let cfg = &mut inner.encoder;

            if let Some(fps) = update.framerate {
                cfg.fps = fps.clamp(MIN_FPS, MAX_FPS);
            }
            if let Some(bw) = update.bandwidth {
                cfg.target_mode = TargetMode::Bandwidth;
                cfg.bandwidth_mbps = bw.clamp(MIN_BANDWIDTH_MBPS, MAX_BANDWIDTH_MBPS);
            } else if let Some(q) = update.quality {
                cfg.target_mode = TargetMode::Quality;
                cfg.quality = q.clamp(MIN_QUALITY, MAX_QUALITY);
            }
            if let Some(vbr) = update.vbr {
                cfg.vbr = vbr;
            }
            if let Some(effort) = update.cpu_effort {
                cfg.cpu_effort = effort.min(MAX_CPU_EFFORT);
            }
            if let Some(threads) = update.cpu_threads {
                cfg.cpu_threads = threads.clamp(MIN_CPU_THREADS, MAX_CPU_THREADS);
            }
            if let Some(draw) = update.enable_desktop_mouse {
                cfg.draw_mouse = draw;
            }

            *cfg != before
        };

        if changed {
            self.signal_restart();
        }
        changed
    }

    /// Update the screen geometry from a client resize request.
    ///
    /// Zero or negative dimensions are rejected. The accepted size is
    /// clamped; `Some(clamped)` is returned only when the clamped size
    /// differs from the current one, in which case a restart is signalled.
    pub fn set_screen_size(&self, width: i64, height: i64) -> Option<(u32, u32)> {
        if width <= 0 || height <= 0 {
            return None;
        }
        let requested = ScreenState::clamped(width as u32, height as u32);

        let changed = {
            let mut inner = self.inner.lock().unwrap();
            if inner.screen == requested {
                false
            } else {
                inner.screen = requested;
                true
            }
        };

        if changed {
            self.signal_restart();
            Some((requested.width, requested.height))
        } else {
            None
        }
    }

    /// Raise a restart signal towards the supervisor.
    ///
    /// A full channel means a restart is already pending; dropping the
    /// extra signal is the coalescing behavior we want.
    fn signal_restart(&self) {
        let _ = self.restart_tx.try_send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_update_raises_no_signal() {
        let (registry, mut rx) = ConfigRegistry::new(30);

        let noop = ConfigUpdate {
            bandwidth: Some(5),
            framerate: Some(30),
            vbr: Some(false),
            ..Default::default()
        };
        assert!(!registry.apply(&noop));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn change_raises_one_signal() {
        let (registry, mut rx) = ConfigRegistry::new(30);

        assert!(registry.apply(&ConfigUpdate {
            bandwidth: Some(1),
            ..Default::default()
        }));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn rapid_changes_collapse_into_one_pending_signal() {
        let (registry, mut rx) = ConfigRegistry::new(30);

        for q in 10..30 {
            registry.apply(&ConfigUpdate {
                quality: Some(q),
                ..Default::default()
            });
        }
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.encoder.target_mode, TargetMode::Quality);
        assert_eq!(snapshot.encoder.quality, 29);
    }

    #[test]
    fn batch_update_applies_all_fields_with_one_signal() {
        let (registry, mut rx) = ConfigRegistry::new(30);

        let changed = registry.apply(&ConfigUpdate {
            bandwidth: Some(8),
            framerate: Some(15),
            cpu_effort: Some(3),
            enable_desktop_mouse: Some(false),
            ..Default::default()
        });
        assert!(changed);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.encoder.bandwidth_mbps, 8);
        assert_eq!(snapshot.encoder.fps, 15);
        assert_eq!(snapshot.encoder.cpu_effort, 3);
        assert!(!snapshot.encoder.draw_mouse);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn bandwidth_wins_over_quality_in_one_message() {
        let (registry, _rx) = ConfigRegistry::new(30);

        registry.apply(&ConfigUpdate {
            bandwidth: Some(3),
            quality: Some(50),
            ..Default::default()
        });
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.encoder.target_mode, TargetMode::Bandwidth);
        assert_eq!(snapshot.encoder.bandwidth_mbps, 3);
        // The quality knob keeps its previous value
        assert_eq!(snapshot.encoder.quality, 80);
    }

    #[test]
    fn values_are_clamped() {
        let (registry, _rx) = ConfigRegistry::new(500);
        assert_eq!(registry.fps(), MAX_FPS);

        registry.apply(&ConfigUpdate {
            quality: Some(7),
            cpu_threads: Some(64),
            ..Default::default()
        });
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.encoder.quality, MIN_QUALITY);
        assert_eq!(snapshot.encoder.cpu_threads, MAX_CPU_THREADS);
    }

    #[test]
    fn screen_starts_at_hardcoded_maximum() {
        let (registry, _rx) = ConfigRegistry::new(30);
        assert_eq!(
            registry.screen_size(),
            (MAX_SCREEN_WIDTH, MAX_SCREEN_HEIGHT)
        );
    }

    #[test]
    fn resize_rejects_zero_and_clamps_to_minimum() {
        let (registry, mut rx) = ConfigRegistry::new(30);

        assert_eq!(registry.set_screen_size(0, 0), None);
        assert!(rx.try_recv().is_err());

        assert_eq!(
            registry.set_screen_size(10, 10),
            Some((MIN_SCREEN_WIDTH, MIN_SCREEN_HEIGHT))
        );
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn resize_to_current_size_is_a_noop() {
        let (registry, mut rx) = ConfigRegistry::new(30);

        assert!(registry.set_screen_size(1920, 1080).is_some());
        let _ = rx.try_recv();

        assert_eq!(registry.set_screen_size(1920, 1080), None);
        assert!(rx.try_recv().is_err());
    }
}
