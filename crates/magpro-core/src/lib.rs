//! # MagPro Core Library
//!
//! Protocol driver for MagVenture MagPro magnetic stimulators over their
//! RS-232 service port.
//!
//! This library provides:
//! - Frame assembly and reassembly with CRC-8 validation
//! - Typed decoding of every documented device message
//! - A last-known device state store with an append-only pulse log,
//!   including the twin/dual pulse disambiguation heuristic
//! - Command encoding with parameter quantization against the device's
//!   allowed-value tables
//! - A synchronous query façade over the asynchronous byte stream
//!
//! ## Example
//!
//! ```rust,ignore
//! use magpro_core::protocol::{Connection, ConnectionConfig};
//!
//! let mut conn = Connection::new(ConnectionConfig {
//!     port_name: "/dev/ttyUSB0".to_string(),
//!     ..Default::default()
//! });
//! conn.connect()?;
//!
//! let status = conn.get_short_status()?;
//! println!("coil at {} degC", status.temperature);
//!
//! conn.set_amplitude(55, None)?;
//! conn.enable()?;
//! conn.trigger()?;
//! ```

#![warn(missing_docs)]

pub mod demo;
pub mod device;
pub mod framelog;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::demo::DemoStimulator;
    pub use crate::device::{DeviceState, PulseRecord};
    pub use crate::framelog::{FrameLog, LogEntry};
    pub use crate::protocol::{
        Command, Connection, ConnectionConfig, ConnectionState, DecodedMessage, Mode, Page,
        ProtocolError, QueryKind, Waveform, WaveformOptions,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
