use bytes::{BufMut, BytesMut};

use crate::checksum::{checksum, FIELD_SEPARATOR};
use crate::error::{FrameError, Result, INVALID_CHECKSUM_TOKEN, WRONG_FIELD_ARITY};

/// Start of text: opens a frame.
pub const STX: u8 = 0x02;

/// End of text: closes a frame.
pub const ETX: u8 = 0x03;

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// Default upper bound on the bytes between STX and ETX.
///
/// Historical frames are a few hundred bytes; anything far larger is line noise.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024;

/// One decoded frame: labeled readings in the order the meter sent them.
///
/// Names are unique. Inserting an existing name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    fields: Vec<(String, String)>,
}

impl Frame {
    /// Create an empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, returning the previous value if the name was already present.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        let name = name.into();
        let value = value.into();
        let existing = self.fields.iter_mut().find(|(key, _)| *key == name);
        match existing {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((name, value));
                None
            }
        }
    }

    /// Value of the field `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate `(name, value)` pairs in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Frame {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut frame = Frame::new();
        for (name, value) in iter {
            frame.insert(name, value);
        }
        frame
    }
}

/// Decode the body of one frame.
///
/// `segment` is everything after STX, with or without the trailing ETX. Leading and
/// trailing CR/LF bytes are ignored, lines are split on CR LF and each line must be
/// `NAME SP VALUE SP CHECKSUM` with a valid checksum.
pub fn decode_body(segment: &[u8]) -> Result<Frame> {
    let body = segment.strip_suffix(&[ETX]).unwrap_or(segment);
    let body = trim_line_breaks(body);

    let mut frame = Frame::new();
    for line in split_lines(body) {
        let (name, value) = parse_field(line)?;
        frame.insert(name, value);
    }
    Ok(frame)
}

/// Encode a frame the way a meter emits it.
///
/// Wire format:
/// ```text
/// STX ( LF name SP value SP checksum CR )* ETX
/// ```
///
/// A field whose checksum is a space is written as is, the way a meter writes it;
/// [`decode_body`] rejects such a line for its arity.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    for (name, value) in frame.iter() {
        if name.is_empty() || !is_valid_token(name.as_bytes()) {
            return Err(FrameError::InvalidToken(name.to_string()));
        }
        if !is_valid_token(value.as_bytes()) {
            return Err(FrameError::InvalidToken(value.to_string()));
        }
    }

    let size: usize = frame
        .iter()
        .map(|(name, value)| name.len() + value.len() + 5)
        .sum();
    dst.reserve(size + 2);

    dst.put_u8(STX);
    for (name, value) in frame.iter() {
        dst.put_u8(LF);
        dst.put_slice(name.as_bytes());
        dst.put_u8(FIELD_SEPARATOR);
        dst.put_slice(value.as_bytes());
        dst.put_u8(FIELD_SEPARATOR);
        dst.put_u8(checksum(name.as_bytes(), value.as_bytes()));
        dst.put_u8(CR);
    }
    dst.put_u8(ETX);
    Ok(())
}

/// Configuration for the frame reader.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum bytes between STX and ETX. Default: 4 KiB.
    pub max_frame_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

fn parse_field(line: &[u8]) -> Result<(String, String)> {
    let tokens: Vec<&[u8]> = line.split(|b| *b == FIELD_SEPARATOR).collect();

    // A checksum that is itself a space splits into four tokens and lands here too.
    let [name, value, token] = *tokens.as_slice() else {
        return Err(malformed(WRONG_FIELD_ARITY, line));
    };
    let actual = match *token {
        [byte] => byte,
        _ => return Err(malformed(INVALID_CHECKSUM_TOKEN, line)),
    };

    let expected = checksum(name, value);
    let name = String::from_utf8_lossy(name).into_owned();
    let value = String::from_utf8_lossy(value).into_owned();
    if actual != expected {
        return Err(FrameError::ChecksumMismatch {
            name,
            value,
            expected,
            actual,
        });
    }
    Ok((name, value))
}

fn malformed(reason: &'static str, line: &[u8]) -> FrameError {
    FrameError::MalformedField {
        reason,
        line: String::from_utf8_lossy(line).into_owned(),
    }
}

fn trim_line_breaks(mut bytes: &[u8]) -> &[u8] {
    while let [CR | LF, rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., CR | LF] = bytes {
        bytes = rest;
    }
    bytes
}

fn split_lines(body: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = Some(body);
    std::iter::from_fn(move || {
        let current = rest?;
        match current.windows(2).position(|pair| pair == [CR, LF]) {
            Some(pos) => {
                rest = Some(&current[pos + 2..]);
                Some(&current[..pos])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

fn is_valid_token(token: &[u8]) -> bool {
    !token
        .iter()
        .any(|b| matches!(*b, FIELD_SEPARATOR | CR | LF | STX | ETX))
}
