use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

use crate::codec::{decode_body, Frame, FrameConfig, ETX, STX};
use crate::error::{FrameError, Result, END_MARKER_NOT_FOUND, START_MARKER_NOT_FOUND};

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 256;

/// Reads complete frames from any `Read` stream.
///
/// Bytes read past an ETX stay buffered for the next call, so consecutive calls walk
/// the stream frame by frame. After any error the next call resynchronizes on the
/// next STX.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    exhausted: bool,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            exhausted: false,
        }
    }

    /// Read and decode the next frame (blocking).
    ///
    /// Skips everything up to the next STX, collects bytes up to ETX and decodes
    /// them. Returns `Err(FrameError::Framing(..))` when the stream ends first.
    pub fn read_frame(&mut self) -> Result<Frame> {
        self.skip_to_start()?;

        let mut scanned = 0usize;
        loop {
            if let Some(pos) = self.buf[scanned..].iter().position(|b| *b == ETX) {
                let end = scanned + pos;
                let segment = self.buf.split_to(end + 1);
                if end == 0 {
                    return Err(FrameError::EmptyFrame);
                }
                if end > self.config.max_frame_size {
                    return Err(FrameError::FrameTooLong {
                        size: end,
                        max: self.config.max_frame_size,
                    });
                }
                trace!(len = end, "frame segment complete");
                return decode_body(&segment);
            }

            scanned = self.buf.len();
            if scanned > self.config.max_frame_size {
                let size = scanned;
                self.buf.clear();
                return Err(FrameError::FrameTooLong {
                    size,
                    max: self.config.max_frame_size,
                });
            }

            if !self.fill()? {
                return Err(FrameError::Framing(END_MARKER_NOT_FOUND));
            }
        }
    }

    /// Whether the underlying stream has reported end-of-stream.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Discard bytes up to and including the next STX.
    fn skip_to_start(&mut self) -> Result<()> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == STX) {
                if pos > 0 {
                    debug!(discarded = pos, "skipped bytes before start marker");
                }
                self.buf.advance(pos + 1);
                return Ok(());
            }

            if !self.buf.is_empty() {
                debug!(
                    discarded = self.buf.len(),
                    "skipped bytes before start marker"
                );
                self.buf.clear();
            }

            if !self.fill()? {
                return Err(FrameError::Framing(START_MARKER_NOT_FOUND));
            }
        }
    }

    /// Append one read to the buffer. Returns `false` at end of stream.
    fn fill(&mut self) -> Result<bool> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => {
                    self.exhausted = true;
                    return Ok(false);
                }
                Ok(n) => {
                    self.exhausted = false;
                    self.buf.extend_from_slice(&chunk[..n]);
                    return Ok(true);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }
}

impl<T> std::fmt::Debug for FrameReader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReader")
            .field("buffered", &self.buf.len())
            .field("config", &self.config)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::encode_frame;

    fn wire(frames: &[&[(&str, &str)]]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for fields in frames {
            let frame: Frame = fields.iter().copied().collect();
            encode_frame(&frame, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn read_well_formed_sample() {
        let bytes = b"\x02HCHC 001234 @\r\n\x03".to_vec();
        let mut reader = FrameReader::new(Cursor::new(bytes));

        let frame = reader.read_frame().unwrap();
        let expected: Frame = [("HCHC", "001234")].into_iter().collect();
        assert_eq!(frame, expected);
    }

    #[test]
    fn read_multiple_frames() {
        let bytes = wire(&[
            &[("HCHC", "001234"), ("PAPP", "00420")],
            &[("HCHC", "001235"), ("PAPP", "00430")],
        ]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        let f1 = reader.read_frame().unwrap();
        let f2 = reader.read_frame().unwrap();
        assert_eq!(f1.get("HCHC"), Some("001234"));
        assert_eq!(f2.get("HCHC"), Some("001235"));
        assert_eq!(f2.get("PAPP"), Some("00430"));
    }

    #[test]
    fn leading_garbage_is_skipped() {
        let mut bytes = b"PP 00420 (\r\n\x03\nIINST 002 Y\r".to_vec();
        bytes.extend(wire(&[&[("IINST", "002")]]));
        let mut reader = FrameReader::new(Cursor::new(bytes));

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.get("IINST"), Some("002"));
    }

    #[test]
    fn no_start_marker_is_framing_error() {
        let mut reader = FrameReader::new(Cursor::new(b"HCHC 001234 @\r\n".to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Framing(msg) if msg == START_MARKER_NOT_FOUND));
        assert!(reader.is_exhausted());
    }

    #[test]
    fn empty_stream_is_framing_error() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Framing(msg) if msg == START_MARKER_NOT_FOUND));
    }

    #[test]
    fn start_marker_then_eof_is_framing_error() {
        let mut reader = FrameReader::new(Cursor::new(vec![STX]));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Framing(msg) if msg == END_MARKER_NOT_FOUND));
    }

    #[test]
    fn truncated_frame_is_framing_error() {
        let mut reader = FrameReader::new(Cursor::new(b"\x02\nHCHC 001234 @\r".to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Framing(msg) if msg == END_MARKER_NOT_FOUND));
    }

    #[test]
    fn empty_frame_is_rejected() {
        let mut reader = FrameReader::new(Cursor::new(vec![STX, ETX]));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::EmptyFrame));
    }

    #[test]
    fn resynchronizes_after_bad_frame() {
        let mut bytes = b"\x02\nHCHC 001234 A\r\x03".to_vec();
        bytes.extend(wire(&[&[("HCHC", "001234")]]));
        let mut reader = FrameReader::new(Cursor::new(bytes));

        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::ChecksumMismatch { .. }));

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.get("HCHC"), Some("001234"));
    }

    #[test]
    fn resynchronizes_after_empty_frame() {
        let mut bytes = vec![STX, ETX];
        bytes.extend(wire(&[&[("PAPP", "00420")]]));
        let mut reader = FrameReader::new(Cursor::new(bytes));

        assert!(matches!(reader.read_frame(), Err(FrameError::EmptyFrame)));
        assert_eq!(reader.read_frame().unwrap().get("PAPP"), Some("00420"));
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let mut bytes = vec![STX];
        bytes.extend(std::iter::repeat(b'A').take(64));
        bytes.push(ETX);

        let cfg = FrameConfig { max_frame_size: 16 };
        let mut reader = FrameReader::with_config(Cursor::new(bytes), cfg);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLong { max: 16, .. }));
    }

    #[test]
    fn identical_frames_decode_equal() {
        let fields: &[(&str, &str)] = &[("ISOUSC", "45"), ("PTEC", "HC..")];
        let bytes = wire(&[fields, fields]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        assert_eq!(reader.read_frame().unwrap(), reader.read_frame().unwrap());
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn partial_read_handling() {
        let byte_reader = ByteByByteReader {
            bytes: wire(&[&[("ADCO", "021728123456"), ("IMAX", "060")]]),
            pos: 0,
        };
        let mut reader = FrameReader::new(byte_reader);

        let frame = reader.read_frame().unwrap();
        assert_eq!(frame.get("ADCO"), Some("021728123456"));
        assert_eq!(frame.get("IMAX"), Some("060"));
    }

    struct InterruptedThenData {
        interrupted: bool,
        bytes: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.bytes.read(buf)
        }
    }

    #[test]
    fn interrupted_read_retries() {
        let source = InterruptedThenData {
            interrupted: false,
            bytes: Cursor::new(wire(&[&[("PAPP", "00420")]])),
        };
        let mut reader = FrameReader::new(source);
        assert_eq!(reader.read_frame().unwrap().get("PAPP"), Some("00420"));
    }

    struct BrokenLine;

    impl Read for BrokenLine {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn io_error_propagates() {
        let mut reader = FrameReader::new(BrokenLine);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
        assert!(!reader.is_exhausted());
    }
}
