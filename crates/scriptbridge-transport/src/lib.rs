//! Message transports for scriptbridge channels.
//!
//! A transport moves whole [`Frame`](scriptbridge_frame::Frame)s between
//! exactly two processes, reliably and in order. Inbound traffic and
//! connection events are delivered on a crossbeam queue so the owning
//! channel thread can block on it, including while it waits for the reply
//! to a synchronous call.
//!
//! - [`MemoryTransport`]: an in-process pair, for tests and same-process bridges
//! - [`SocketTransport`]: Unix domain sockets (Linux/macOS)

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use memory::MemoryTransport;
pub use traits::{ChannelMode, Transport, TransportEvent};

#[cfg(unix)]
pub use uds::{SocketConfig, SocketTransport};
