//! ffmpeg argument synthesis from a config snapshot

use crate::config::{ConfigSnapshot, TargetMode};

/// Emit at least one frame out of every N when VBR decimation is active,
/// so an idle screen still produces keep-alive frames
const VBR_DECIMATE_MAX: u32 = 15;

/// Map the client quality knob `[10, 100]` onto a VP8 quantizer.
///
/// quality 10 hits q=50, quality 100 hits q=4.
pub fn quantizer(quality: u32) -> u32 {
    let q = 50.0 - (quality as f64 - 10.0) * 46.0 / 90.0;
    q.round().clamp(4.0, 63.0) as u32
}

/// Maxrate ceiling in kbps for quality mode: 2000 kbps at quality 10,
/// scaling linearly to 20000 kbps at quality 100.
pub fn quality_maxrate_kbps(quality: u32) -> u32 {
    2000 + quality.saturating_sub(10) * 200
}

/// Compose the full argument vector for one encoder run.
///
/// `grab_input` is the x11grab input spec (display plus screen suffix);
/// when `test_pattern` is set a synthetic lavfi source replaces screen
/// capture entirely.
pub fn build_args(snapshot: &ConfigSnapshot, grab_input: &str, test_pattern: bool) -> Vec<String> {
    let cfg = &snapshot.encoder;
    let (width, height) = (snapshot.screen.width, snapshot.screen.height);

    let mut args: Vec<String> = [
        "-probesize",
        "32",
        "-analyzeduration",
        "0",
        "-fflags",
        "nobuffer",
        "-threads",
        "2",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if test_pattern {
        args.extend([
            "-re".into(),
            "-f".into(),
            "lavfi".into(),
            "-i".into(),
            format!("testsrc=size={}x{}:rate={}", width, height, cfg.fps),
        ]);
    } else {
        args.extend([
            "-f".into(),
            "x11grab".into(),
            "-draw_mouse".into(),
            if cfg.draw_mouse { "1" } else { "0" }.into(),
            "-video_size".into(),
            format!("{}x{}", width, height),
            "-framerate".into(),
            cfg.fps.to_string(),
            "-i".into(),
            grab_input.to_string(),
        ]);
    }

    let mut filter = format!("fps={}", cfg.fps);
    if cfg.vbr {
        filter.push_str(&format!(",mpdecimate=max={}", VBR_DECIMATE_MAX));
    }
    filter.push_str(",format=yuv420p");
    args.extend(["-vf".into(), filter, "-c:v".into(), "libvpx".into()]);

    match cfg.target_mode {
        TargetMode::Bandwidth => {
            let kbps = cfg.bandwidth_mbps * 1000;
            // ~0.2 s of target rate keeps latency down
            let bufsize = cfg.bandwidth_mbps * 200;
            args.extend([
                "-b:v".into(),
                format!("{}k", kbps),
                "-minrate".into(),
                format!("{}k", kbps),
                "-maxrate".into(),
                format!("{}k", kbps),
                "-bufsize".into(),
                format!("{}k", bufsize),
                "-crf".into(),
                "10".into(),
            ]);
        }
        TargetMode::Quality => {
            let q = quantizer(cfg.quality);
            let maxrate = quality_maxrate_kbps(cfg.quality);
            let bufsize = maxrate / 5;
            args.extend([
                "-crf".into(),
                q.to_string(),
                "-qmin".into(),
                "4".into(),
                "-qmax".into(),
                "63".into(),
                "-b:v".into(),
                format!("{}k", maxrate),
                "-maxrate".into(),
                format!("{}k", maxrate),
                "-bufsize".into(),
                format!("{}k", bufsize),
            ]);
        }
    }

    args.extend([
        "-g".into(),
        cfg.fps.to_string(),
        "-deadline".into(),
        "realtime".into(),
        "-cpu-used".into(),
        cfg.cpu_effort.to_string(),
        "-threads".into(),
        cfg.cpu_threads.to_string(),
        "-f".into(),
        "ivf".into(),
        "pipe:1".into(),
    ]);

    args
}
