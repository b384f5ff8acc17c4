use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_frame, Frame, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Writes complete frames to a byte stream.
pub struct FrameWriter<W> {
    inner: W,
    buf: BytesMut,
    config: FrameConfig,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: W, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(HEADER_SIZE),
            config,
        }
    }

    /// Write a complete frame and flush.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.route, frame.payload.as_ref())
    }

    /// Encode `payload` for `route`, write it out whole, then flush.
    pub fn send(&mut self, route: u32, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        self.buf.clear();
        encode_frame(route, payload, &mut self.buf)?;

        let mut written = 0;
        while written < self.buf.len() {
            match self.inner.write(&self.buf[written..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => written += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        trace!(route, len = payload.len(), "frame written");

        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::decode_frame;

    #[test]
    fn written_bytes_decode_back() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        writer.send(4, b"has_method").unwrap();
        writer
            .write_frame(&Frame::new(0, &b"generate_route_id"[..]))
            .unwrap();

        let mut wire = BytesMut::from(writer.into_inner().into_inner().as_slice());
        let first = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        let second = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        assert_eq!((first.route, first.payload.as_ref()), (4, &b"has_method"[..]));
        assert_eq!(second.route, 0);
        assert!(wire.is_empty());
    }

    #[test]
    fn oversized_payload_is_rejected_before_writing() {
        let mut writer = FrameWriter::with_config(
            Cursor::new(Vec::new()),
            FrameConfig {
                max_payload_size: 4,
            },
        );
        assert!(matches!(
            writer.send(1, b"too long"),
            Err(FrameError::PayloadTooLarge { size: 8, max: 4 })
        ));
        assert!(writer.get_ref().get_ref().is_empty());
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn zero_length_write_means_closed() {
        let mut writer = FrameWriter::new(ZeroWriter);
        assert!(matches!(
            writer.send(1, b"x"),
            Err(FrameError::ConnectionClosed)
        ));
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(ErrorKind::BrokenPipe.into())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn io_errors_propagate() {
        let mut writer = FrameWriter::new(BrokenPipe);
        assert!(matches!(
            writer.send(1, b"x"),
            Err(FrameError::Io(err)) if err.kind() == ErrorKind::BrokenPipe
        ));
    }
}
