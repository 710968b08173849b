use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::ConfigRegistry;
use crate::input::InputCoalescer;
use crate::stream::FrameFanout;
use crate::webrtc::PeerFactory;

/// Runtime options resolved once at startup
#[derive(Debug, Clone)]
pub struct ServerOpts {
    /// X display the session runs on, e.g. `:99`
    pub display: String,
    /// Synthetic test source instead of screen capture
    pub test_pattern: bool,
    /// Directory the viewer assets are served from
    pub public_dir: PathBuf,
    /// ICE host address override
    pub public_ip: Option<String>,
}

/// Application-wide state shared across connection handlers
pub struct AppState {
    /// Encoder parameters and screen geometry
    pub registry: Arc<ConfigRegistry>,
    /// Frame distribution and the connected-clients registry
    pub fanout: Arc<FrameFanout>,
    /// Input queue handle
    pub input: InputCoalescer,
    /// Peer connection factory holding the shared video track
    pub peers: PeerFactory,
    /// Runtime options
    pub opts: ServerOpts,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}
