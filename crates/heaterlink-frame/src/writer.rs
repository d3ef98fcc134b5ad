use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::debug;

use crate::codec::{encode_frame, DutyCommand, Frame};
use crate::error::{FrameError, Result};
use crate::header::FRAME_LEN;

/// Writes complete frames to any `Write` stream.
///
/// Frames are eight bytes, so a write blocks for at most the link's write
/// timeout.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    sent: u64,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(FRAME_LEN),
            sent: 0,
        }
    }

    /// Write one frame and flush it.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.buf.clear();
        encode_frame(frame, &mut self.buf);

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()?;
        self.sent += 1;
        Ok(())
    }

    /// Encode and send a duty-cycle command.
    pub fn send(&mut self, command: &DutyCommand) -> Result<()> {
        let frame = command.to_frame()?;
        self.write_frame(&frame)
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Flush and release the underlying stream.
    pub fn close(mut self) -> Result<()> {
        let flushed = self.flush();
        debug!(frames = self.sent, "closing frame writer");
        drop(self.inner);
        flushed
    }

    /// Frames written so far.
    pub fn frames_sent(&self) -> u64 {
        self.sent
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::codec::try_decode;
    use crate::header::Header;

    #[test]
    fn writes_single_command() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        writer.send(&DutyCommand::Heater0(25.0)).unwrap();

        let bytes = writer.into_inner().into_inner();
        assert_eq!(bytes, vec![0x01, 0x00, 0x61, 0xA8, 0x00, 0x00, 0x00, 0xFF]);
    }

    #[test]
    fn written_bytes_decode() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        let command = DutyCommand::Both {
            heater0: 1.5,
            heater1: 99.999,
        };
        writer.send(&command).unwrap();
        writer.send(&DutyCommand::ZERO).unwrap();
        assert_eq!(writer.frames_sent(), 2);

        let bytes = writer.into_inner().into_inner();
        let first = try_decode(&bytes[..FRAME_LEN]).unwrap();
        let second = try_decode(&bytes[FRAME_LEN..]).unwrap();
        assert_eq!(first.header(), Header::DutyBoth);
        assert_eq!(DutyCommand::from_frame(&first), Some(command));
        assert_eq!(DutyCommand::from_frame(&second), Some(DutyCommand::ZERO));
    }

    #[test]
    fn out_of_range_command_writes_nothing() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::new()));
        let err = writer.send(&DutyCommand::Heater1(120.0)).unwrap_err();
        assert!(matches!(err, FrameError::DutyOutOfRange { heater: 1, .. }));
        assert_eq!(writer.frames_sent(), 0);
        assert!(writer.get_ref().get_ref().is_empty());
    }

    struct Trickle {
        written: Vec<u8>,
        interrupted_once: bool,
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.interrupted_once {
                self.interrupted_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.written.push(buf[0]);
            Ok(1)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn retries_interrupted_and_short_writes() {
        let mut writer = FrameWriter::new(Trickle {
            written: Vec::new(),
            interrupted_once: false,
        });
        writer.send(&DutyCommand::ZERO).unwrap();
        assert_eq!(writer.get_ref().written.len(), FRAME_LEN);
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
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send(&DutyCommand::ZERO).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn io_error_propagates() {
        let mut writer = FrameWriter::new(Broken);
        let err = writer.send(&DutyCommand::ZERO).unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    struct DropFlag(Arc<Mutex<bool>>);

    impl Write for DropFlag {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Drop for DropFlag {
        fn drop(&mut self) {
            *self.0.lock().unwrap() = true;
        }
    }

    #[test]
    fn close_releases_stream() {
        let dropped = Arc::new(Mutex::new(false));
        let writer = FrameWriter::new(DropFlag(Arc::clone(&dropped)));
        writer.close().unwrap();
        assert!(*dropped.lock().unwrap());
    }
}
