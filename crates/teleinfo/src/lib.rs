//! Teleinfo meter to MQTT bridge.
//!
//! Reads the historical Teleinfo frames a French electricity meter emits on its
//! serial output, validates every field checksum, and republishes each reading on an
//! MQTT topic `teleinfo/<NAME>`.
//!
//! # Crate Structure
//!
//! - [`transport`]: serial line at 1200 baud 7E1 in raw mode
//! - [`frame`]: checksum, frame decoding and encoding
//! - [`bus`]: publish seam and a minimal MQTT client
//! - [`pipeline`]: reader and publisher threads joined by a handoff channel

/// Re-export transport types.
pub mod transport {
    pub use teleinfo_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use teleinfo_frame::*;
}

/// Re-export bus types.
pub mod bus {
    pub use teleinfo_bus::*;
}

/// Re-export pipeline types.
pub mod pipeline {
    pub use teleinfo_pipeline::*;
}
