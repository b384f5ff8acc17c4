/// Errors from reading, writing or decoding routed frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header does not start with the "SB" magic.
    #[error("invalid frame magic (expected 0x5342 \"SB\")")]
    InvalidMagic,

    /// The payload is larger than [`FrameConfig::max_payload_size`](crate::FrameConfig).
    #[error("frame payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// End of stream, either between frames or in the middle of one.
    #[error("peer closed the stream")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
