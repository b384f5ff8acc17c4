use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: magic (2) + length (4) + route (4) = 10 bytes.
pub const HEADER_SIZE: usize = 10;

/// Magic bytes: "SB" (0x53 0x42).
pub const MAGIC: [u8; 2] = [0x53, 0x42];

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// One routed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Endpoint on the receiving side this frame is addressed to.
    pub route: u32,
    /// Encoded packet.
    pub payload: Bytes,
}

impl Frame {
    pub fn new(route: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            route,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// ```text
/// ┌────────────┬────────────┬────────────┬──────────────────┐
/// │ Magic (2B) │ Length     │ Route      │ Payload          │
/// │ 0x53 0x42  │ (4B LE)    │ (4B LE)    │ (Length bytes)   │
/// └────────────┴────────────┴────────────┴──────────────────┘
/// ```
pub fn encode_frame(route: u32, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(len);
    dst.put_u32_le(route);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from the front of `src`.
///
/// Returns `Ok(None)` while the buffer holds less than one complete frame;
/// the buffer is left untouched in that case.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let mut header = &src[2..HEADER_SIZE];
    let payload_len = header.get_u32_le() as usize;
    let route = header.get_u32_le();

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();
    Ok(Some(Frame { route, payload }))
}

/// Limits applied by frame readers and writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
