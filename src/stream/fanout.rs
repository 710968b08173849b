//! Per-frame distribution to all active sinks
//!
//! Frames are ephemeral: every sink sits behind a bounded queue and a full
//! queue drops the frame rather than blocking the producer, because the
//! de-muxer must keep reading encoder stdout.

use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::warn;

use super::frame::Frame;
use super::stats::StreamStats;
use crate::utils::LogThrottler;

/// Capacity of the pacing queue and of each client's binary queue
pub const SINK_QUEUE_CAPACITY: usize = 300;

/// Binary packet type tag for video frames
pub const FRAME_PACKET_TYPE: u8 = 1;

/// Per-client WebSocket binary sink
pub struct ClientSink {
    binary_tx: mpsc::Sender<Bytes>,
    webrtc_ready: AtomicBool,
}

impl ClientSink {
    /// Mark the client as promoted to WebRTC; no further binary frames
    /// will be queued for it.
    pub fn set_webrtc_ready(&self) {
        self.webrtc_ready.store(true, Ordering::Relaxed);
    }

    pub fn webrtc_ready(&self) -> bool {
        self.webrtc_ready.load(Ordering::Relaxed)
    }
}

/// Fan-out from the de-muxer to the pacing writer and all client queues
pub struct FrameFanout {
    clients: Mutex<HashMap<u64, Arc<ClientSink>>>,
    next_client_id: AtomicU64,
    pacing_tx: mpsc::Sender<Frame>,
    throttle: LogThrottler,
    stats: Arc<StreamStats>,
}

impl FrameFanout {
    /// Create the fan-out; the returned receiver feeds the pacing writer.
    pub fn new() -> (Arc<Self>, mpsc::Receiver<Frame>) {
        let (pacing_tx, pacing_rx) = mpsc::channel(SINK_QUEUE_CAPACITY);
        let fanout = Arc::new(Self {
            clients: Mutex::new(HashMap::new()),
            next_client_id: AtomicU64::new(1),
            pacing_tx,
            throttle: LogThrottler::default(),
            stats: Arc::new(StreamStats::default()),
        });
        (fanout, pacing_rx)
    }

    /// Counters shared with the pacing writer and the stats logger.
    pub fn stats(&self) -> Arc<StreamStats> {
        self.stats.clone()
    }

    /// Register a connected client.
    ///
    /// Returns the client id, the sink handle shared with the WebSocket
    /// session, and the receiver its binary writer drains.
    pub fn register_client(&self) -> (u64, Arc<ClientSink>, mpsc::Receiver<Bytes>) {
        let (binary_tx, binary_rx) = mpsc::channel(SINK_QUEUE_CAPACITY);
        let sink = Arc::new(ClientSink {
            binary_tx,
            webrtc_ready: AtomicBool::new(false),
        });
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        self.clients.lock().unwrap().insert(id, sink.clone());
        (id, sink, binary_rx)
    }

    /// Remove a client on disconnect.
    pub fn unregister_client(&self, id: u64) {
        self.clients.lock().unwrap().remove(&id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    /// Distribute one frame to every active sink.
    pub fn broadcast(&self, frame: Frame) {
        self.stats.record_frame(frame.data.len());
        let packet = encode_frame_packet(frame.wallclock_ms, &frame.data);

        if self.pacing_tx.try_send(frame).is_err() {
            self.stats.record_pacing_drop();
            if self.throttle.should_log("pacing_full") {
                warn!("pacing queue full, dropping frame for the WebRTC track");
            }
        }

        let clients = self.clients.lock().unwrap();
        for sink in clients.values() {
            if sink.webrtc_ready() {
                continue;
            }
            if sink.binary_tx.try_send(packet.clone()).is_err() {
                self.stats.record_fallback_drop();
                if self.throttle.should_log("client_queue_full") {
                    warn!("client binary queue full, dropping frame");
                }
            }
        }
    }
}

/// Pack a frame into the WebSocket fallback framing:
/// `type:u8=1 || wallclock_ms:f64 big-endian || frame bytes`.
pub fn encode_frame_packet(wallclock_ms: f64, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(9 + payload.len());
    buf.put_u8(FRAME_PACKET_TYPE);
    buf.put_f64(wallclock_ms);
    buf.put_slice(payload);
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_packet_layout() {
        let packet = encode_frame_packet(1234.5, &[0xAA, 0xBB]);

        assert_eq!(packet.len(), 11);
        assert_eq!(packet[0], FRAME_PACKET_TYPE);
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&packet[1..9]);
        assert_eq!(f64::from_be_bytes(ts), 1234.5);
        assert_eq!(&packet[9..], &[0xAA, 0xBB]);
    }

    #[tokio::test]
    async fn broadcast_reaches_registered_clients() {
        let (fanout, mut pacing_rx) = FrameFanout::new();
        let (_id, _sink, mut binary_rx) = fanout.register_client();

        fanout.broadcast(Frame::new(Bytes::from_static(b"frame"), 1));

        let packet = binary_rx.try_recv().expect("client should receive a packet");
        assert_eq!(&packet[9..], b"frame");

        let paced = pacing_rx.try_recv().expect("pacing queue should receive the frame");
        assert_eq!(&paced.data[..], b"frame");
    }

    #[tokio::test]
    async fn webrtc_ready_client_receives_no_binary_frames() {
        let (fanout, _pacing_rx) = FrameFanout::new();
        let (_id, sink, mut binary_rx) = fanout.register_client();

        sink.set_webrtc_ready();
        fanout.broadcast(Frame::new(Bytes::from_static(b"frame"), 1));

        assert!(binary_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_client_queue_drops_without_blocking() {
        let (fanout, _pacing_rx) = FrameFanout::new();
        let (_id, _sink, mut binary_rx) = fanout.register_client();

        for _ in 0..SINK_QUEUE_CAPACITY + 50 {
            fanout.broadcast(Frame::new(Bytes::from_static(b"x"), 1));
        }

        let mut received = 0;
        while binary_rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SINK_QUEUE_CAPACITY);

        let stats = fanout.stats().snapshot();
        assert_eq!(stats.frames, (SINK_QUEUE_CAPACITY + 50) as u64);
        assert_eq!(stats.fallback_dropped, 50);
        assert_eq!(stats.pacing_dropped, 50);
    }

    #[tokio::test]
    async fn unregister_removes_the_client() {
        let (fanout, _pacing_rx) = FrameFanout::new();
        let (id, _sink, mut binary_rx) = fanout.register_client();
        assert_eq!(fanout.client_count(), 1);

        fanout.unregister_client(id);
        assert_eq!(fanout.client_count(), 0);

        fanout.broadcast(Frame::new(Bytes::from_static(b"frame"), 1));
        assert!(binary_rx.try_recv().is_err());
    }
}
