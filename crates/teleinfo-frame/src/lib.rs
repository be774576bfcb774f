//! Teleinfo historical frame decoding.
//!
//! A meter emits frames continuously on its serial line. Every frame is delimited by
//! control bytes and carries one labeled reading per line:
//! - STX (0x02) opens the frame, ETX (0x03) closes it
//! - each line is `NAME SP VALUE SP CHECKSUM`, lines separated by CR LF
//! - every line has its own one-character checksum, so a corrupted reading is
//!   pinpointed to its field
//!
//! Decoding is atomic per frame: one bad field rejects the whole frame.

pub mod checksum;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use checksum::checksum;
pub use codec::{decode_body, encode_frame, Frame, FrameConfig, DEFAULT_MAX_FRAME_SIZE, ETX, STX};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
