use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webdesk::config::ConfigRegistry;
use webdesk::encoder::supervisor::CaptureTarget;
use webdesk::encoder::{EncoderSupervisor, EpochCounter};
use webdesk::input::{InputCoalescer, XdotoolExecutor};
use webdesk::session::x11::X11Session;
use webdesk::state::{AppState, ServerOpts};
use webdesk::stream::{spawn_pacing_writer, FrameFanout};
use webdesk::web;
use webdesk::webrtc::PeerFactory;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// webdesk command line arguments
#[derive(Parser, Debug)]
#[command(name = "webdesk")]
#[command(version, about = "Single-port browser remote desktop", long_about = None)]
struct CliArgs {
    /// HTTP port; ICE UDP is pinned to the same port
    #[arg(short = 'p', long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Initial capture framerate
    #[arg(long, env = "FPS", default_value_t = 30)]
    fps: u32,

    /// X display number for the graphical session
    #[arg(long, env = "DISPLAY_NUM", default_value = "99")]
    display_num: String,

    /// IP to advertise in ICE host candidates (defaults to the Host header)
    #[arg(long, env = "WEBRTC_PUBLIC_IP")]
    public_ip: Option<String>,

    /// Replace screen capture with a synthetic test source
    #[arg(long, env = "TEST_PATTERN")]
    test_pattern: Option<String>,

    /// Directory the viewer assets are served from
    #[arg(long, value_name = "DIR", default_value = "public")]
    public_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level);

    tracing::info!("starting webdesk v{}", env!("CARGO_PKG_VERSION"));

    let test_pattern = args.test_pattern.as_deref().is_some_and(|v| !v.is_empty());
    let display = format!(":{}", args.display_num);

    // Bring up the graphical session first; the encoder captures it
    let mut x11_session = if test_pattern {
        tracing::info!("TEST_PATTERN mode: skipping X11 setup");
        None
    } else {
        Some(X11Session::start(&args.display_num).await?)
    };

    let (registry, restart_rx) = ConfigRegistry::new(args.fps);
    let epochs = Arc::new(EpochCounter::new());

    // The shared video track outlives every peer connection
    let peers = PeerFactory::new(args.port);
    let (fanout, pacing_rx) = FrameFanout::new();
    spawn_pacing_writer(
        peers.video_track(),
        pacing_rx,
        epochs.clone(),
        registry.clone(),
        fanout.stats(),
    );
    spawn_stats_logger(fanout.stats());

    let input = InputCoalescer::spawn(
        Box::new(XdotoolExecutor::new(display.clone())),
        registry.clone(),
    );

    let supervisor = EncoderSupervisor::new(
        registry.clone(),
        fanout.clone(),
        epochs,
        CaptureTarget {
            display: display.clone(),
            // ffmpeg's grab input names a screen, not just a display
            grab_input: format!("{}.0", display),
            test_pattern,
        },
    );
    supervisor.clone().spawn(restart_rx);

    let (shutdown_tx, _) = broadcast::channel(1);
    let state = Arc::new(AppState {
        registry,
        fanout,
        input,
        peers,
        opts: ServerOpts {
            display,
            test_pattern,
            public_dir: args.public_dir,
            public_ip: args.public_ip,
        },
        shutdown_tx: shutdown_tx.clone(),
    });

    let app = web::create_router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("server listening on http://{}", addr);

    let shutdown_signal = async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        tracing::info!("shutdown signal received");
    };

    tokio::select! {
        _ = shutdown_signal => {}
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                tracing::error!("HTTP server error: {}", e);
            }
        }
    }

    // Cleanup in reverse start order: connections, encoder, X session
    let _ = shutdown_tx.send(());
    supervisor.shutdown().await;
    if let Some(ref mut session) = x11_session {
        session.shutdown().await;
    }

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Spawn a background task that logs pipeline counters once a minute,
/// skipping quiet periods.
fn spawn_stats_logger(stats: std::sync::Arc<webdesk::stream::StreamStats>) {
    use webdesk::stream::StreamStatsSnapshot;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        interval.tick().await;
        let mut last = StreamStatsSnapshot::default();
        loop {
            interval.tick().await;
            let now = stats.snapshot();
            if now != last {
                tracing::info!(
                    frames = now.frames,
                    bytes = now.bytes,
                    samples = now.samples_written,
                    pacing_dropped = now.pacing_dropped,
                    fallback_dropped = now.fallback_dropped,
                    "stream stats"
                );
                last = now;
            }
        }
    });
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel) {
    let filter = match level {
        LogLevel::Error => "webdesk=error,tower_http=error",
        LogLevel::Warn => "webdesk=warn,tower_http=warn",
        LogLevel::Info => "webdesk=info,tower_http=info",
        LogLevel::Debug => "webdesk=debug,tower_http=debug",
        LogLevel::Trace => "webdesk=trace,tower_http=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
