//! Per-client peer connection setup

use std::sync::Arc;
use tracing::info;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_VP8};
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::ice::udp_network::{EphemeralUDP, UDPNetwork};
use webrtc::ice_transport::ice_candidate_type::RTCIceCandidateType;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use super::sdp::strip_receiver_feedback;
use crate::error::{AppError, Result};

pub const STUN_SERVER: &str = "stun:stun.l.google.com:19302";

const VP8_PAYLOAD_TYPE: u8 = 96;

/// Builds per-client peer connections around the process-wide video track
pub struct PeerFactory {
    track: Arc<TrackLocalStaticSample>,
    udp_port: u16,
}

impl PeerFactory {
    /// Create the factory and the shared VP8 sample track.
    ///
    /// `udp_port` is the HTTP port; ICE is pinned to it so the deployment
    /// stays single-port.
    pub fn new(udp_port: u16) -> Self {
        let track = Arc::new(TrackLocalStaticSample::new(
            vp8_capability(),
            "video".to_owned(),
            "webdesk".to_owned(),
        ));
        Self { track, udp_port }
    }

    /// The process-wide video track written by the pacing writer.
    pub fn video_track(&self) -> Arc<TrackLocalStaticSample> {
        self.track.clone()
    }

    /// Create a peer connection with the shared track attached sendonly.
    ///
    /// `advertise_ip` becomes a 1-to-1 NAT mapping so host candidates
    /// carry the address the browser actually reached us on.
    pub async fn create_peer(&self, advertise_ip: Option<String>) -> Result<Arc<RTCPeerConnection>> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_codec(
                RTCRtpCodecParameters {
                    capability: vp8_capability(),
                    payload_type: VP8_PAYLOAD_TYPE,
                    ..Default::default()
                },
                RTPCodecType::Video,
            )
            .map_err(|e| AppError::WebRtc(format!("failed to register VP8: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| AppError::WebRtc(format!("failed to register interceptors: {}", e)))?;

        let mut setting_engine = SettingEngine::default();
        let udp = EphemeralUDP::new(self.udp_port, self.udp_port)
            .map_err(|e| AppError::WebRtc(format!("failed to pin UDP port: {}", e)))?;
        setting_engine.set_udp_network(UDPNetwork::Ephemeral(udp));
        if let Some(ip) = advertise_ip {
            info!("advertising ICE host address {}", ip);
            setting_engine.set_nat_1to1_ips(vec![ip], RTCIceCandidateType::Host);
        }

        let api = APIBuilder::new()
            .with_setting_engine(setting_engine)
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: vec![STUN_SERVER.to_owned()],
                ..Default::default()
            }],
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(|e| AppError::WebRtc(format!("failed to create peer connection: {}", e)))?,
        );

        pc.add_transceiver_from_track(
            self.track.clone() as Arc<dyn TrackLocal + Send + Sync>,
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Sendonly,
                send_encodings: vec![],
            }),
        )
        .await
        .map_err(|e| AppError::WebRtc(format!("failed to add video track: {}", e)))?;

        Ok(pc)
    }

    /// Negotiate: munge the offer, set descriptions, return the answer.
    pub async fn answer_offer(
        &self,
        pc: &RTCPeerConnection,
        offer: RTCSessionDescription,
    ) -> Result<RTCSessionDescription> {
        let munged = RTCSessionDescription::offer(strip_receiver_feedback(&offer.sdp))
            .map_err(|e| AppError::WebRtc(format!("invalid SDP offer: {}", e)))?;

        pc.set_remote_description(munged)
            .await
            .map_err(|e| AppError::WebRtc(format!("failed to set remote description: {}", e)))?;

        let answer = pc
            .create_answer(None)
            .await
            .map_err(|e| AppError::WebRtc(format!("failed to create answer: {}", e)))?;

        pc.set_local_description(answer)
            .await
            .map_err(|e| AppError::WebRtc(format!("failed to set local description: {}", e)))?;

        pc.local_description()
            .await
            .ok_or_else(|| AppError::WebRtc("no local description after answer".into()))
    }
}

fn vp8_capability() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_VP8.to_owned(),
        clock_rate: 90000,
        channels: 0,
        sdp_fmtp_line: String::new(),
        rtcp_feedback: vec![],
    }
}
