use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bytes::BytesMut;
use tracing::{debug, info, warn};

use crate::error::{BusError, Result};
use crate::packet::{
    decode_connack, encode_connect, encode_disconnect, encode_publish, Connect, CONNACK_LEN,
};
use crate::traits::Publish;

pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_CLIENT_ID: &str = "mqtt-teleinfo";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Broker connection settings.
#[derive(Clone)]
pub struct MqttOptions {
    /// `host:port` of the broker.
    pub address: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Zero disables the keep-alive mechanism.
    pub keep_alive: Duration,
    /// Bound on TCP connect, the CONNACK wait and every later write.
    pub connect_timeout: Duration,
}

impl MqttOptions {
    /// Options for the broker at `url`.
    ///
    /// Accepts `host`, `host:port`, `[v6]:port`, optionally prefixed by `tcp://` or
    /// `mqtt://`. The port defaults to 1883.
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            address: normalize_address(url)?,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            username: None,
            password: None,
            keep_alive: Duration::ZERO,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    /// Set credentials. Empty strings count as absent.
    pub fn with_credentials(mut self, username: Option<String>, password: Option<String>) -> Self {
        self.username = username.filter(|u| !u.is_empty());
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }
}

impl std::fmt::Debug for MqttOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttOptions")
            .field("address", &self.address)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("keep_alive", &self.keep_alive)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// A connected MQTT 3.1.1 publisher.
///
/// Publishes at QoS 0 and never reads from the broker after CONNACK. The socket is
/// behind a mutex so that one thread can publish while another disconnects.
pub struct MqttClient {
    stream: Mutex<Option<TcpStream>>,
    address: String,
    client_id: String,
}

impl MqttClient {
    /// Open a TCP connection, send CONNECT and wait for a successful CONNACK.
    pub fn connect(options: &MqttOptions) -> Result<Self> {
        let mut stream = open_stream(&options.address, options.connect_timeout)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(options.connect_timeout))?;
        stream.set_write_timeout(Some(options.connect_timeout))?;

        let keep_alive_secs = u16::try_from(options.keep_alive.as_secs()).unwrap_or(u16::MAX);
        let mut buf = BytesMut::with_capacity(64);
        encode_connect(
            &Connect {
                client_id: &options.client_id,
                username: options.username.as_deref(),
                password: options.password.as_deref(),
                keep_alive_secs,
                clean_session: true,
            },
            &mut buf,
        )?;
        stream.write_all(&buf)?;

        let mut connack = [0u8; CONNACK_LEN];
        stream.read_exact(&mut connack)?;
        decode_connack(&connack)?;
        stream.set_read_timeout(None)?;

        info!(
            address = %options.address,
            client_id = %options.client_id,
            "connected to broker"
        );

        Ok(Self {
            stream: Mutex::new(Some(stream)),
            address: options.address.clone(),
            client_id: options.client_id.clone(),
        })
    }

    /// Send DISCONNECT and close the socket. Calling it again is a no-op.
    pub fn disconnect(&self) -> Result<()> {
        let mut guard = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(mut stream) = guard.take() else {
            return Ok(());
        };

        let mut buf = BytesMut::with_capacity(2);
        encode_disconnect(&mut buf);
        let result = stream.write_all(&buf);
        let _ = stream.shutdown(Shutdown::Both);
        info!(address = %self.address, "disconnected from broker");
        result.map_err(BusError::from)
    }

    pub fn is_connected(&self) -> bool {
        self.stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Publish for MqttClient {
    fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        let mut buf = BytesMut::with_capacity(topic.len() + payload.len() + 8);
        encode_publish(topic, payload.as_bytes(), &mut buf)?;

        let mut guard = self.stream.lock().unwrap_or_else(PoisonError::into_inner);
        let stream = guard.as_mut().ok_or(BusError::Disconnected)?;
        if let Err(err) = stream.write_all(&buf) {
            // Part of the packet may be on the wire; the broker would read the next
            // one as its tail.
            if let Some(stream) = guard.take() {
                let _ = stream.shutdown(Shutdown::Both);
            }
            warn!(address = %self.address, %err, "publish failed, dropping broker connection");
            return Err(BusError::Io(err));
        }
        debug!(topic, payload, "published");
        Ok(())
    }
}

impl std::fmt::Debug for MqttClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttClient")
            .field("address", &self.address)
            .field("client_id", &self.client_id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

fn open_stream(address: &str, timeout: Duration) -> Result<TcpStream> {
    let addrs = address
        .to_socket_addrs()
        .map_err(|_| BusError::InvalidAddress(address.to_string()))?;

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                debug!(%addr, %err, "broker address unreachable");
                last_err = Some(err);
            }
        }
    }

    Err(BusError::Connect {
        address: address.to_string(),
        source: last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "address resolved to nothing")
        }),
    })
}

fn normalize_address(url: &str) -> Result<String> {
    let trimmed = url.trim();
    let without_scheme = trimmed
        .strip_prefix("tcp://")
        .or_else(|| trimmed.strip_prefix("mqtt://"))
        .unwrap_or(trimmed)
        .trim_end_matches('/');

    if without_scheme.is_empty() || without_scheme.contains("://") {
        return Err(BusError::InvalidAddress(url.to_string()));
    }

    let port = if without_scheme.starts_with('[') {
        match without_scheme.split_once("]:") {
            Some((_, port)) => Some(port),
            None if without_scheme.ends_with(']') => None,
            None => return Err(BusError::InvalidAddress(url.to_string())),
        }
    } else {
        without_scheme.rsplit_once(':').map(|(_, port)| port)
    };

    match port {
        Some(port) => {
            port.parse::<u16>()
                .map_err(|_| BusError::InvalidAddress(url.to_string()))?;
            Ok(without_scheme.to_string())
        }
        None => Ok(format!("{without_scheme}:{DEFAULT_MQTT_PORT}")),
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    fn read_packet(stream: &mut TcpStream) -> (u8, Vec<u8>) {
        let mut header = [0u8; 1];
        stream.read_exact(&mut header).unwrap();

        let mut len = 0usize;
        let mut shift = 0;
        loop {
            let mut byte = [0u8; 1];
            stream.read_exact(&mut byte).unwrap();
            len |= ((byte[0] & 0x7F) as usize) << shift;
            if byte[0] & 0x80 == 0 {
                break;
            }
            shift += 7;
        }

        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).unwrap();
        (header[0], body)
    }

    fn publish_topic_and_payload(body: &[u8]) -> (String, String) {
        let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
        let topic = String::from_utf8(body[2..2 + topic_len].to_vec()).unwrap();
        let payload = String::from_utf8(body[2 + topic_len..].to_vec()).unwrap();
        (topic, payload)
    }

    fn broker(return_code: u8) -> (String, thread::JoinHandle<Vec<(u8, Vec<u8>)>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut packets = vec![read_packet(&mut stream)];
            stream.write_all(&[0x20, 0x02, 0x00, return_code]).unwrap();
            if return_code != 0 {
                return packets;
            }
            loop {
                let packet = read_packet(&mut stream);
                let done = packet.0 == 0xE0;
                packets.push(packet);
                if done {
                    return packets;
                }
            }
        });
        (address, handle)
    }

    #[test]
    fn connect_publish_disconnect() {
        let (address, broker) = broker(0);
        let options = MqttOptions::new(&address)
            .unwrap()
            .with_credentials(Some("meter".to_string()), Some("secret".to_string()));

        let client = MqttClient::connect(&options).unwrap();
        assert!(client.is_connected());
        client.publish("teleinfo/HCHC", "001234").unwrap();
        client.publish("teleinfo/PAPP", "00420").unwrap();
        client.disconnect().unwrap();
        assert!(!client.is_connected());

        let packets = broker.join().unwrap();
        assert_eq!(packets.len(), 4);

        let (connect_header, connect_body) = &packets[0];
        assert_eq!(*connect_header, 0x10);
        assert_eq!(&connect_body[2..6], b"MQTT");
        assert!(connect_body.windows(13).any(|w| w == b"mqtt-teleinfo"));
        assert!(connect_body.windows(5).any(|w| w == b"meter"));

        assert_eq!(packets[1].0, 0x30);
        assert_eq!(
            publish_topic_and_payload(&packets[1].1),
            ("teleinfo/HCHC".to_string(), "001234".to_string())
        );
        assert_eq!(
            publish_topic_and_payload(&packets[2].1),
            ("teleinfo/PAPP".to_string(), "00420".to_string())
        );
        assert_eq!(packets[3], (0xE0, Vec::new()));
    }

    #[test]
    fn refused_connection_is_an_error() {
        let (address, broker) = broker(5);
        let err = MqttClient::connect(&MqttOptions::new(&address).unwrap()).unwrap_err();
        assert!(matches!(err, BusError::Refused(5)));
        broker.join().unwrap();
    }

    #[test]
    fn unreachable_broker_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let options = MqttOptions::new(&address)
            .unwrap()
            .with_connect_timeout(Duration::from_millis(500));
        let err = MqttClient::connect(&options).unwrap_err();
        assert!(matches!(err, BusError::Connect { .. }));
    }

    #[test]
    fn publish_after_disconnect_fails() {
        let (address, broker) = broker(0);
        let client = MqttClient::connect(&MqttOptions::new(&address).unwrap()).unwrap();
        client.disconnect().unwrap();
        client.disconnect().unwrap();
        broker.join().unwrap();

        let err = client.publish("teleinfo/PAPP", "00420").unwrap_err();
        assert!(matches!(err, BusError::Disconnected));
    }

    #[test]
    fn failed_write_drops_the_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let broker = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_packet(&mut stream);
            stream.write_all(&[0x20, 0x02, 0x00, 0x00]).unwrap();
        });

        let client = MqttClient::connect(&MqttOptions::new(&address).unwrap()).unwrap();
        broker.join().unwrap();

        let payload = "0".repeat(16 * 1024);
        let mut first_error = None;
        for _ in 0..500 {
            if let Err(err) = client.publish("teleinfo/PAPP", &payload) {
                first_error = Some(err);
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        assert!(
            matches!(first_error, Some(BusError::Io(_))),
            "{first_error:?}"
        );
        assert!(!client.is_connected());
        let err = client.publish("teleinfo/PAPP", "00420").unwrap_err();
        assert!(matches!(err, BusError::Disconnected));
    }

    #[test]
    fn normalize_address_variants() {
        assert_eq!(normalize_address("broker").unwrap(), "broker:1883");
        assert_eq!(normalize_address("broker:1884").unwrap(), "broker:1884");
        assert_eq!(
            normalize_address("tcp://broker:1884").unwrap(),
            "broker:1884"
        );
        assert_eq!(normalize_address("mqtt://broker/").unwrap(), "broker:1883");
        assert_eq!(normalize_address("[::1]").unwrap(), "[::1]:1883");
        assert_eq!(normalize_address("[::1]:8883").unwrap(), "[::1]:8883");
        assert_eq!(
            normalize_address(" 10.0.0.2:1883 ").unwrap(),
            "10.0.0.2:1883"
        );
    }

    #[test]
    fn normalize_address_rejects_garbage() {
        for url in ["", "tcp://", "ws://broker", "broker:port", "broker:70000", "[::1"] {
            assert!(
                matches!(normalize_address(url), Err(BusError::InvalidAddress(_))),
                "{url:?}"
            );
        }
    }

    #[test]
    fn empty_credentials_are_ignored() {
        let options = MqttOptions::new("broker")
            .unwrap()
            .with_credentials(Some(String::new()), Some(String::new()));
        assert_eq!(options.username, None);
        assert_eq!(options.password, None);
    }

    #[test]
    fn debug_redacts_password() {
        let options = MqttOptions::new("broker")
            .unwrap()
            .with_credentials(Some("meter".to_string()), Some("hunter2".to_string()));
        let rendered = format!("{options:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("hunter2"));
    }
}
