/// Errors that can occur while talking to the message bus.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The broker address could not be parsed or resolved.
    #[error("invalid broker address {0:?}")]
    InvalidAddress(String),

    /// Failed to open the TCP connection to the broker.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    /// The broker answered CONNECT with a non-zero return code.
    #[error("connection refused by broker: {}", refusal_reason(.0))]
    Refused(u8),

    /// The broker sent something other than the expected packet.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A string field does not fit in an MQTT packet.
    #[error("{field} too long ({len} bytes, max {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// The topic is empty or contains a wildcard.
    #[error("invalid topic {0:?}")]
    InvalidTopic(String),

    /// The client was disconnected.
    #[error("client disconnected")]
    Disconnected,

    /// An I/O error occurred on the broker connection.
    #[error("bus I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn refusal_reason(code: &u8) -> &'static str {
    match *code {
        1 => "unacceptable protocol version",
        2 => "identifier rejected",
        3 => "server unavailable",
        4 => "bad user name or password",
        5 => "not authorized",
        _ => "unknown return code",
    }
}

pub type Result<T> = std::result::Result<T, BusError>;
