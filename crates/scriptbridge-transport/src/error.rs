use std::path::PathBuf;

/// Errors that can occur while opening or running a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The channel name cannot be used to derive an endpoint address.
    #[error("invalid channel name '{0}'")]
    InvalidName(String),

    /// The server end could not create its socket.
    #[error("cannot listen on {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The client end gave up waiting for the server.
    #[error("no server reachable at {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The server end was listening but the peer never attached.
    #[error("peer did not attach: {0}")]
    Accept(std::io::Error),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport was closed or the peer went away.
    #[error("transport is closed")]
    Closed,

    /// `sun_path` cannot hold the endpoint address.
    #[error("channel socket path {path} is {len} bytes, limit is {max}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// Framing failed on the underlying stream.
    #[error("frame error: {0}")]
    Frame(#[from] scriptbridge_frame::FrameError),
}

impl TransportError {
    /// The frame was turned down before any of it was written; the
    /// transport itself is still usable.
    pub fn is_frame_refused(&self) -> bool {
        matches!(
            self,
            TransportError::Frame(scriptbridge_frame::FrameError::PayloadTooLarge { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
