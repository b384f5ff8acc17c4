//! Length-prefixed framing with route multiplexing.
//!
//! Every message exchanged over a scriptbridge channel is framed with:
//! - A 2-byte magic number ("SB") for stream synchronization
//! - A 4-byte little-endian payload length
//! - A 4-byte little-endian route id naming the endpoint it is addressed to
//!
//! Route 0 is the CONTROL route owned by the channel itself. Every other
//! route belongs to exactly one proxy or stub on the receiving side.

pub mod codec;
pub mod error;
pub mod reader;
pub mod route;
pub mod writer;

pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use route::{CONTROL_ROUTE, FIRST_OBJECT_ROUTE};
pub use writer::FrameWriter;
