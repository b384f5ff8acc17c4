use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from a byte stream.
///
/// Partial reads are buffered internally; callers only ever see whole frames.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    config: FrameConfig,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: R, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            config,
        }
    }

    /// Block until the next complete frame is available.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` on EOF, whether or not a
    /// frame was partially buffered.
    pub fn read_frame(&mut self) -> Result<Frame> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                trace!(route = frame.route, len = frame.payload.len(), "frame read");
                return Ok(frame);
            }

            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BufMut;

    use super::*;
    use crate::codec::{encode_frame, MAGIC};

    fn wire(frames: &[(u32, &[u8])]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (route, payload) in frames {
            encode_frame(*route, payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn reads_frames_in_order() {
        let bytes = wire(&[(0, b"hello"), (12, b"invoke"), (12, b"release")]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        let routes: Vec<u32> = (0..3).map(|_| reader.read_frame().unwrap().route).collect();
        assert_eq!(routes, vec![0, 12, 12]);
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    struct Trickle {
        bytes: Vec<u8>,
        pos: usize,
        interrupt_next: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.interrupt_next {
                self.interrupt_next = false;
                return Err(ErrorKind::Interrupted.into());
            }
            self.interrupt_next = true;
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn reassembles_byte_by_byte_reads_across_interrupts() {
        let mut reader = FrameReader::new(Trickle {
            bytes: wire(&[(5, b"get_property")]),
            pos: 0,
            interrupt_next: false,
        });

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.route, 5);
        assert_eq!(frame.payload.as_ref(), b"get_property");
    }

    #[test]
    fn eof_mid_frame_is_connection_closed() {
        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_u32_le(32);
        partial.put_u32_le(9);
        partial.put_slice(b"truncated");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn respects_configured_payload_limit() {
        let bytes = wire(&[(1, &[0u8; 64])]);
        let mut reader = FrameReader::with_config(
            Cursor::new(bytes),
            FrameConfig {
                max_payload_size: 16,
            },
        );
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::PayloadTooLarge { size: 64, max: 16 })
        ));
    }

    #[test]
    #[cfg(unix)]
    fn frames_cross_a_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let writer_thread = std::thread::spawn(move || {
            let mut writer = crate::writer::FrameWriter::new(left);
            for route in 1..=32u32 {
                writer.send(route, format!("msg-{route}").as_bytes()).unwrap();
            }
        });

        let mut reader = FrameReader::new(right);
        for route in 1..=32u32 {
            let frame = reader.read_frame().unwrap();
            assert_eq!(frame.route, route);
            assert_eq!(frame.payload.as_ref(), format!("msg-{route}").as_bytes());
        }
        writer_thread.join().unwrap();
    }
}
