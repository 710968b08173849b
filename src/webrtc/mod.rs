//! WebRTC peer connections and the shared VP8 video track
//!
//! One sample track is shared by every peer; the pacing writer is its sole
//! writer. Signaling rides the WebSocket control channel.

pub mod peer;
pub mod sdp;

pub use peer::{PeerFactory, STUN_SERVER};
