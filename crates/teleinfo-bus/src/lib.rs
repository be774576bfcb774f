//! Message bus publishing for Teleinfo readings.
//!
//! The pipeline only needs one operation from the bus: publish a payload on a
//! topic, without waiting for any acknowledgement. [`Publish`] is that seam;
//! [`MqttClient`] implements it with a minimal MQTT 3.1.1 client (QoS 0 only).

pub mod client;
pub mod error;
pub mod packet;
pub mod traits;

pub use client::{MqttClient, MqttOptions, DEFAULT_CLIENT_ID, DEFAULT_MQTT_PORT};
pub use error::{BusError, Result};
pub use traits::Publish;
