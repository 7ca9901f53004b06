//! Serial Protocol Communication
//!
//! Implements the MagPro service-port protocol: flagged, length-prefixed,
//! CRC-8 checksummed frames over a point-to-point serial link.

pub mod commands;
mod connection;
pub mod crc;
pub mod encoder;
mod error;
mod frame;
pub mod message;
pub mod serial;
pub mod stream;
pub mod tables;

pub use commands::{Command, CurrentDirection, Mode, Page, QueryKind, Waveform, WaveformOptions};
pub use connection::{Connection, ConnectionConfig, ConnectionState};
pub use encoder::{encode, frame_body};
pub use error::ProtocolError;
pub use frame::{FrameReassembler, Reassembled};
pub use message::{
    AmplitudeUpdate, CoilTemperature, DecodedMessage, LongStatus, PulseEvent, ShortStatus,
    WaveformConfig,
};
pub use serial::{clear_buffers, list_ports, open_port, PortInfo};
pub use stream::{SerialChannel, Transport};

/// First byte of every frame.
pub const START_FLAG: u8 = 0xFE;

/// Last byte of every frame.
pub const END_FLAG: u8 = 0xFF;

/// Default baud rate of the stimulator service port.
pub const DEFAULT_BAUD_RATE: u32 = 38400;

/// Deadline for synchronous queries in milliseconds.
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 1000;

/// Idle polling interval of the listener in milliseconds.
pub const POLL_INTERVAL_MS: u64 = 20;

/// Highest settable amplitude in % MSO.
pub const MAX_AMPLITUDE: u8 = 199;
