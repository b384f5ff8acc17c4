use std::fmt;

use crossbeam_channel::Receiver;
use scriptbridge_frame::Frame;

use crate::error::Result;

/// Which end of a named channel this process opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelMode {
    /// Creates the endpoint and waits for the peer.
    Server,
    /// Connects to an endpoint created by the peer.
    Client,
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelMode::Server => f.write_str("server"),
            ChannelMode::Client => f.write_str("client"),
        }
    }
}

/// Something that happened on the transport, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The peer is attached.
    Connected,
    /// A frame arrived from the peer.
    Frame(Frame),
    /// The transport failed or the peer went away. No further frames follow.
    Error(String),
}

/// A reliable, ordered, bidirectional frame pipe to exactly one peer.
///
/// `send` is called from the channel's owning thread only. Inbound events
/// may be produced on any thread; the channel drains [`events`](Self::events)
/// on its own thread, which is also where it blocks during synchronous calls.
pub trait Transport {
    /// Queue a frame for the peer.
    ///
    /// An error for which [`is_frame_refused`](crate::TransportError::is_frame_refused)
    /// holds drops only this frame. Any other error means the transport is
    /// broken.
    fn send(&self, frame: Frame) -> Result<()>;

    /// Inbound frames and connection events.
    fn events(&self) -> &Receiver<TransportEvent>;

    /// Stop sending and signal the peer. Idempotent.
    fn close(&self);

    /// Process id of the peer, when the transport can tell.
    fn peer_pid(&self) -> Option<u32> {
        None
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, frame: Frame) -> Result<()> {
        (**self).send(frame)
    }

    fn events(&self) -> &Receiver<TransportEvent> {
        (**self).events()
    }

    fn close(&self) {
        (**self).close()
    }

    fn peer_pid(&self) -> Option<u32> {
        (**self).peer_pid()
    }
}
