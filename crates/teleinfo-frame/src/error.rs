/// Framing failure: the stream ended before an STX was seen.
pub const START_MARKER_NOT_FOUND: &str = "start marker not found";

/// Framing failure: the stream ended between STX and ETX.
pub const END_MARKER_NOT_FOUND: &str = "end marker not found";

/// A field line did not split into name, value and checksum.
pub const WRONG_FIELD_ARITY: &str = "wrong field arity";

/// The checksum token of a field line was not exactly one byte.
pub const INVALID_CHECKSUM_TOKEN: &str = "invalid checksum token";

/// Errors that can occur during frame decoding/encoding.
///
/// Every decode variant is local to one frame: the reader can be called again to
/// resynchronize on the next STX.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A frame delimiter was missing before the stream ended.
    #[error("framing error: {0}")]
    Framing(&'static str),

    /// STX was immediately followed by ETX.
    #[error("read empty frame")]
    EmptyFrame,

    /// A field line is not a `NAME VALUE CHECKSUM` triple.
    #[error("malformed field ({reason}): {line:?}")]
    MalformedField { reason: &'static str, line: String },

    /// The declared checksum of a field does not match its content.
    #[error(
        "invalid checksum for ({name}, {value}): expected {:?}, got {:?}",
        as_char(.expected),
        as_char(.actual)
    )]
    ChecksumMismatch {
        name: String,
        value: String,
        expected: u8,
        actual: u8,
    },

    /// No ETX within the configured frame size limit.
    #[error("frame too long ({size} bytes, max {max})")]
    FrameTooLong { size: usize, max: usize },

    /// A name or value cannot be encoded because it contains a delimiter.
    #[error("invalid token {0:?}: contains a separator or control byte")]
    InvalidToken(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Whether this error is a `MalformedField` or `ChecksumMismatch`, i.e. the frame
    /// was delimited correctly but one of its fields was bad.
    pub fn is_field_error(&self) -> bool {
        matches!(
            self,
            FrameError::MalformedField { .. } | FrameError::ChecksumMismatch { .. }
        )
    }
}

fn as_char(byte: &u8) -> char {
    char::from(*byte)
}

pub type Result<T> = std::result::Result<T, FrameError>;
