//! WebSocket control protocol
//!
//! Every JSON message carries a `type` tag. Client messages multiplex
//! input, configuration, and WebRTC signaling over one channel; the
//! server side is limited to pong and signaling replies. Video frames for
//! the fallback path use the binary framing defined in the fan-out.

use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::config::ConfigUpdate;

/// Client-to-server control message
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping { timestamp: f64 },
    Keydown { key: String },
    Keyup { key: String },
    Mousemove { x: f64, y: f64 },
    Mousedown { button: u8 },
    Mouseup { button: u8 },
    Spawn { command: String },
    Config(ConfigUpdate),
    Resize { width: i64, height: i64 },
    WebrtcOffer { sdp: RTCSessionDescription },
    WebrtcIce { candidate: RTCIceCandidateInit },
    WebrtcReady,
}

/// Server-to-client control message
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Pong { timestamp: f64 },
    WebrtcAnswer { sdp: RTCSessionDescription },
    WebrtcIce { candidate: RTCIceCandidateInit },
}
