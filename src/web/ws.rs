//! Per-client WebSocket session
//!
//! One session per upgraded connection. Reads are single-threaded here;
//! JSON writes are serialized through a mutex on the sink and binary
//! frames go through the client's bounded queue, drained by a background
//! writer that shares the same mutex. The router below dispatches on the
//! JSON `type` tag and may own at most one peer connection per session.

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use super::protocol::{ClientMessage, ServerMessage};
use crate::input::InputTask;
use crate::session;
use crate::state::AppState;
use crate::stream::ClientSink;
use crate::utils::resolve_advertise_ip;

type SharedSink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Handle one upgraded connection until it closes.
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>, host_header: Option<String>) {
    let (sink, mut stream) = socket.split();
    let sink: SharedSink = Arc::new(Mutex::new(sink));

    let (client_id, client, mut binary_rx) = state.fanout.register_client();
    info!(client_id, "client connected");

    // Background writer for non-blocking binary frame delivery
    let writer_sink = sink.clone();
    tokio::spawn(async move {
        while let Some(packet) = binary_rx.recv().await {
            let mut sink = writer_sink.lock().await;
            if sink.send(Message::Binary(packet)).await.is_err() {
                break;
            }
        }
    });

    let advertise_ip =
        resolve_advertise_ip(state.opts.public_ip.as_deref(), host_header.as_deref()).await;

    let mut session = WsSession {
        state: state.clone(),
        sink,
        client,
        peer: None,
        advertise_ip,
    };

    let mut shutdown_rx = state.shutdown_tx.subscribe();
    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        // Malformed JSON drops the message, not the session
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => session.handle(msg).await,
                            Err(e) => debug!(client_id, "unparseable message: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(client_id, "websocket receive error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }

    state.fanout.unregister_client(client_id);
    if let Some(pc) = session.peer.take() {
        let _ = pc.close().await;
    }
    // Dropping the session releases the binary queue sender; the writer
    // drains and exits on its own.
    info!(client_id, "client disconnected");
}

struct WsSession {
    state: Arc<AppState>,
    sink: SharedSink,
    client: Arc<ClientSink>,
    peer: Option<Arc<RTCPeerConnection>>,
    advertise_ip: Option<String>,
}

impl WsSession {
    async fn handle(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::Ping { timestamp } => {
                self.send(&ServerMessage::Pong { timestamp }).await;
            }
            ClientMessage::Keydown { key } => {
                self.state.input.submit(InputTask::Key { key, down: true });
            }
            ClientMessage::Keyup { key } => {
                self.state.input.submit(InputTask::Key { key, down: false });
            }
            ClientMessage::Mousemove { x, y } => {
                if (0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y) {
                    self.state.input.submit(InputTask::Move { nx: x, ny: y });
                }
            }
            ClientMessage::Mousedown { button } => {
                self.state.input.submit(InputTask::Button { button, down: true });
            }
            ClientMessage::Mouseup { button } => {
                self.state.input.submit(InputTask::Button {
                    button,
                    down: false,
                });
            }
            ClientMessage::Spawn { command } => {
                // The allow-list check rejects everything else silently
                session::spawn_app(&command, &self.state.opts.display);
            }
            ClientMessage::Config(update) => {
                if self.state.registry.apply(&update) {
                    info!("configuration updated: {:?}", update);
                }
            }
            ClientMessage::Resize { width, height } => {
                self.handle_resize(width, height).await;
            }
            ClientMessage::WebrtcOffer { sdp } => {
                self.handle_offer(sdp).await;
            }
            ClientMessage::WebrtcIce { candidate } => {
                if let Some(pc) = &self.peer {
                    if let Err(e) = pc.add_ice_candidate(candidate).await {
                        warn!("failed to add ICE candidate: {}", e);
                    }
                }
            }
            ClientMessage::WebrtcReady => {
                info!("client WebRTC ready, stopping fallback frames");
                self.client.set_webrtc_ready();
            }
        }
    }

    async fn handle_resize(&self, width: i64, height: i64) {
        let Some((w, h)) = self.state.registry.set_screen_size(width, height) else {
            return;
        };
        info!("resize to {}x{} (clamped to {}x{})", width, height, w, h);
        if !self.state.opts.test_pattern {
            if let Err(e) = session::resize_display(&self.state.opts.display, w, h).await {
                warn!("display resize failed: {}", e);
            }
        }
    }

    /// Run the signaling exchange for a (new) offer.
    ///
    /// Any failure logs and drops the exchange; the client may retry with
    /// a fresh offer.
    async fn handle_offer(&mut self, offer: RTCSessionDescription) {
        if let Some(old) = self.peer.take() {
            let _ = old.close().await;
        }

        let pc = match self
            .state
            .peers
            .create_peer(self.advertise_ip.clone())
            .await
        {
            Ok(pc) => pc,
            Err(e) => {
                warn!("failed to create peer connection: {}", e);
                return;
            }
        };

        // Trickle gathered candidates to the client as they appear
        let ice_sink = self.sink.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let ice_sink = ice_sink.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => {
                        send_json(&ice_sink, &ServerMessage::WebrtcIce { candidate: init }).await;
                    }
                    Err(e) => debug!("failed to serialize ICE candidate: {}", e),
                }
            })
        }));

        match self.state.peers.answer_offer(&pc, offer).await {
            Ok(answer) => {
                self.send(&ServerMessage::WebrtcAnswer { sdp: answer }).await;
                self.peer = Some(pc);
            }
            Err(e) => {
                warn!("signaling failed: {}", e);
                let _ = pc.close().await;
            }
        }
    }

    async fn send(&self, msg: &ServerMessage) {
        send_json(&self.sink, msg).await;
    }
}

async fn send_json(sink: &SharedSink, msg: &ServerMessage) {
    match serde_json::to_string(msg) {
        Ok(json) => {
            let _ = sink.lock().await.send(Message::Text(json.into())).await;
        }
        Err(e) => warn!("failed to serialize message: {}", e),
    }
}
