//! MQTT 3.1.1 control packets used by the publisher.
//!
//! Only what a QoS 0 publisher needs: CONNECT, CONNACK, PUBLISH and DISCONNECT.

use bytes::{BufMut, BytesMut};

use crate::error::{BusError, Result};

pub const PROTOCOL_NAME: &str = "MQTT";
pub const PROTOCOL_LEVEL: u8 = 4;

/// Largest value the variable-length "remaining length" field can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// CONNACK is always exactly four bytes on the wire.
pub const CONNACK_LEN: usize = 4;

const CONNECT: u8 = 0x10;
const CONNACK: u8 = 0x20;
const PUBLISH: u8 = 0x30;
const DISCONNECT: u8 = 0xE0;

const FLAG_USERNAME: u8 = 0x80;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_CLEAN_SESSION: u8 = 0x02;

/// Fields of a CONNECT packet.
#[derive(Debug, Clone)]
pub struct Connect<'a> {
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    /// Ignored unless `username` is set (MQTT 3.1.1 §3.1.2.9).
    pub password: Option<&'a str>,
    pub keep_alive_secs: u16,
    pub clean_session: bool,
}

pub fn encode_connect(packet: &Connect<'_>, dst: &mut BytesMut) -> Result<()> {
    let password = packet.username.and(packet.password);

    let mut flags = 0u8;
    if packet.clean_session {
        flags |= FLAG_CLEAN_SESSION;
    }
    if packet.username.is_some() {
        flags |= FLAG_USERNAME;
    }
    if password.is_some() {
        flags |= FLAG_PASSWORD;
    }

    let mut remaining = 2 + PROTOCOL_NAME.len() + 1 + 1 + 2 + 2 + packet.client_id.len();
    if let Some(username) = packet.username {
        remaining += 2 + username.len();
    }
    if let Some(password) = password {
        remaining += 2 + password.len();
    }

    dst.put_u8(CONNECT);
    encode_remaining_length(remaining, dst)?;
    put_string("protocol name", PROTOCOL_NAME, dst)?;
    dst.put_u8(PROTOCOL_LEVEL);
    dst.put_u8(flags);
    dst.put_u16(packet.keep_alive_secs);
    put_string("client id", packet.client_id, dst)?;
    if let Some(username) = packet.username {
        put_string("username", username, dst)?;
    }
    if let Some(password) = password {
        put_string("password", password, dst)?;
    }
    Ok(())
}

/// Encode a QoS 0, non-retained PUBLISH.
pub fn encode_publish(topic: &str, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if topic.is_empty() || topic.contains(['+', '#']) {
        return Err(BusError::InvalidTopic(topic.to_string()));
    }

    let remaining = 2 + topic.len() + payload.len();
    dst.reserve(1 + 4 + remaining);
    dst.put_u8(PUBLISH);
    encode_remaining_length(remaining, dst)?;
    put_string("topic", topic, dst)?;
    dst.put_slice(payload);
    Ok(())
}

pub fn encode_disconnect(dst: &mut BytesMut) {
    dst.put_u8(DISCONNECT);
    dst.put_u8(0);
}

/// Check a CONNACK: `Ok(())` only for return code 0.
pub fn decode_connack(bytes: &[u8; CONNACK_LEN]) -> Result<()> {
    if bytes[0] != CONNACK || bytes[1] != 2 {
        return Err(BusError::Protocol(format!(
            "expected CONNACK, got header {:#04x} {:#04x}",
            bytes[0], bytes[1]
        )));
    }
    match bytes[3] {
        0 => Ok(()),
        code => Err(BusError::Refused(code)),
    }
}

fn encode_remaining_length(mut len: usize, dst: &mut BytesMut) -> Result<()> {
    if len > MAX_REMAINING_LENGTH {
        return Err(BusError::TooLong {
            field: "packet",
            len,
            max: MAX_REMAINING_LENGTH,
        });
    }
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        dst.put_u8(byte);
        if len == 0 {
            return Ok(());
        }
    }
}

fn put_string(field: &'static str, value: &str, dst: &mut BytesMut) -> Result<()> {
    let len = u16::try_from(value.len()).map_err(|_| BusError::TooLong {
        field,
        len: value.len(),
        max: u16::MAX as usize,
    })?;
    dst.put_u16(len);
    dst.put_slice(value.as_bytes());
    Ok(())
}
