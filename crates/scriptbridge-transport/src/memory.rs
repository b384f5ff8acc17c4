use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{unbounded, Receiver, Sender};
use scriptbridge_frame::{Frame, FrameConfig, FrameError};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{Transport, TransportEvent};

/// One end of an in-process transport pair.
///
/// Both ends are `Send`, so each can be moved to the thread that owns its
/// channel. Closing or dropping one end delivers a single
/// [`TransportEvent::Error`] to the other.
#[derive(Debug)]
pub struct MemoryTransport {
    outbound: Sender<TransportEvent>,
    inbound: Receiver<TransportEvent>,
    closed: AtomicBool,
    frame: FrameConfig,
}

impl MemoryTransport {
    /// Create two connected ends.
    pub fn pair() -> (Self, Self) {
        Self::pair_with_config(FrameConfig::default())
    }

    /// Create two connected ends that refuse payloads over the configured
    /// size, like a socket transport would.
    pub fn pair_with_config(frame: FrameConfig) -> (Self, Self) {
        let (to_left, left_events) = unbounded();
        let (to_right, right_events) = unbounded();
        let _ = to_left.send(TransportEvent::Connected);
        let _ = to_right.send(TransportEvent::Connected);

        let left = Self {
            outbound: to_right,
            inbound: left_events,
            closed: AtomicBool::new(false),
            frame,
        };
        let right = Self {
            outbound: to_left,
            inbound: right_events,
            closed: AtomicBool::new(false),
            frame,
        };
        (left, right)
    }

    /// Whether [`close`](Transport::close) has been called on this end.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Transport for MemoryTransport {
    fn send(&self, frame: Frame) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let size = frame.payload.len();
        if size > self.frame.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size,
                max: self.frame.max_payload_size,
            }
            .into());
        }
        self.outbound
            .send(TransportEvent::Frame(frame))
            .map_err(|_| TransportError::Closed)
    }

    fn events(&self) -> &Receiver<TransportEvent> {
        &self.inbound
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("memory transport closed");
            let _ = self
                .outbound
                .send(TransportEvent::Error("peer closed the channel".to_string()));
        }
    }

    fn peer_pid(&self) -> Option<u32> {
        Some(std::process::id())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn frames_flow_both_ways_after_connected() {
        let (left, right) = MemoryTransport::pair();
        assert_eq!(left.events().recv().unwrap(), TransportEvent::Connected);
        assert_eq!(right.events().recv().unwrap(), TransportEvent::Connected);

        assert!(left.send(Frame::new(3, Bytes::from_static(b"ping"))).is_ok());
        assert!(right.send(Frame::new(0, Bytes::from_static(b"pong"))).is_ok());

        assert_eq!(
            right.events().recv().unwrap(),
            TransportEvent::Frame(Frame::new(3, Bytes::from_static(b"ping")))
        );
        assert_eq!(
            left.events().recv().unwrap(),
            TransportEvent::Frame(Frame::new(0, Bytes::from_static(b"pong")))
        );
    }

    #[test]
    fn close_notifies_peer_once_and_stops_sending() {
        let (left, right) = MemoryTransport::pair();
        let _ = right.events().recv();

        left.close();
        left.close();
        assert!(matches!(
            left.send(Frame::new(1, Bytes::new())),
            Err(TransportError::Closed)
        ));

        assert!(matches!(
            right.events().recv().unwrap(),
            TransportEvent::Error(_)
        ));
        assert!(right.events().try_recv().is_err());
    }

    #[test]
    fn dropping_an_end_breaks_the_other() {
        let (left, right) = MemoryTransport::pair();
        let _ = right.events().recv();
        drop(left);

        assert!(matches!(
            right.events().recv().unwrap(),
            TransportEvent::Error(_)
        ));
        assert!(right.send(Frame::new(1, Bytes::new())).is_err());
    }

    #[test]
    fn oversized_frame_is_refused_without_breaking_the_pair() {
        let (left, right) = MemoryTransport::pair_with_config(FrameConfig { max_payload_size: 4 });
        let _ = right.events().recv();

        let err = left.send(Frame::new(1, Bytes::from_static(b"too long"))).unwrap_err();
        assert!(err.is_frame_refused());
        assert!(left.send(Frame::new(2, Bytes::from_static(b"ok"))).is_ok());
        assert_eq!(
            right.events().recv().unwrap(),
            TransportEvent::Frame(Frame::new(2, Bytes::from_static(b"ok")))
        );
    }

    #[test]
    fn ends_move_across_threads() {
        let (left, right) = MemoryTransport::pair();
        let handle = std::thread::spawn(move || {
            let _ = right.events().recv();
            match right.events().recv().unwrap() {
                TransportEvent::Frame(frame) => frame.route,
                other => panic!("unexpected event {other:?}"),
            }
        });
        assert!(left.send(Frame::new(99, Bytes::new())).is_ok());
        assert_eq!(handle.join().unwrap(), 99);
    }
}
