//! IVF container de-muxing
//!
//! The encoder emits an IVF byte stream on stdout: a 32-byte file header
//! opening with the ASCII magic `DKIF`, then frames prefixed by a 12-byte
//! header whose first four bytes are the little-endian payload size. The
//! remaining header bytes carry a stream timestamp we ignore; the local
//! clock is substituted when the frame is emitted.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::error::{AppError, Result};
use crate::stream::{Frame, FrameFanout};

pub const IVF_MAGIC: &[u8; 4] = b"DKIF";
pub const IVF_HEADER_LEN: usize = 32;
pub const IVF_FRAME_HEADER_LEN: usize = 12;

/// Drain one encoder instance's stdout into the fan-out.
///
/// Runs until end-of-stream (`Ok`) or a malformed/truncated container
/// (`Err`). Either way the stream is finished and the caller may start the
/// next encoder; within one call, emitted frames carry strictly
/// non-decreasing capture times in production order.
pub async fn demux<R: AsyncRead + Unpin>(
    mut reader: R,
    epoch: u32,
    fanout: &FrameFanout,
) -> Result<()> {
    let mut header = [0u8; IVF_HEADER_LEN];
    reader
        .read_exact(&mut header)
        .await
        .map_err(|e| AppError::Demux(format!("reading stream header: {}", e)))?;

    if &header[..4] != IVF_MAGIC {
        return Err(AppError::Demux(format!(
            "invalid stream signature: {:02x?}",
            &header[..4]
        )));
    }

    let mut frames = 0u64;
    loop {
        let mut frame_header = [0u8; IVF_FRAME_HEADER_LEN];
        match reader.read_exact(&mut frame_header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!(epoch, frames, "encoder stream ended");
                return Ok(());
            }
            Err(e) => return Err(AppError::Demux(format!("reading frame header: {}", e))),
        }

        let size = u32::from_le_bytes([
            frame_header[0],
            frame_header[1],
            frame_header[2],
            frame_header[3],
        ]) as usize;

        let mut payload = vec![0u8; size];
        reader
            .read_exact(&mut payload)
            .await
            .map_err(|e| AppError::Demux(format!("reading frame payload: {}", e)))?;

        fanout.broadcast(Frame::new(Bytes::from(payload), epoch));
        frames += 1;
    }
}
