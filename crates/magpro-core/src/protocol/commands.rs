//! Protocol commands
//!
//! Typed representations of everything the controller can ask of the
//! stimulator, plus the small wire enums (mode, waveform, page) shared
//! with the decoder.

use serde::{Deserialize, Serialize};

/// Pulse mode of the stimulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// One pulse per trigger.
    Standard,
    /// One pulse per trigger at boosted output.
    Power,
    /// Two pulses per trigger with independent amplitudes.
    Twin,
    /// Two pulses per trigger, second amplitude expressed relative to A.
    Dual,
}

impl Mode {
    /// Decode a wire mode number (0-3).
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Mode::Standard),
            1 => Some(Mode::Power),
            2 => Some(Mode::Twin),
            3 => Some(Mode::Dual),
            _ => None,
        }
    }

    /// Wire number of this mode.
    pub fn wire(self) -> u8 {
        match self {
            Mode::Standard => 0,
            Mode::Power => 1,
            Mode::Twin => 2,
            Mode::Dual => 3,
        }
    }

    /// Whether this mode emits two pulses per trigger.
    pub fn is_paired(self) -> bool {
        matches!(self, Mode::Twin | Mode::Dual)
    }
}

/// Pulse waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Waveform {
    /// Monophasic pulse.
    Monophasic,
    /// Biphasic pulse.
    Biphasic,
    /// Half-sine pulse.
    Halfsine,
    /// Burst of biphasic pulses.
    BiphasicBurst,
}

impl Waveform {
    /// Decode a wire waveform number (0-3).
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Waveform::Monophasic),
            1 => Some(Waveform::Biphasic),
            2 => Some(Waveform::Halfsine),
            3 => Some(Waveform::BiphasicBurst),
            _ => None,
        }
    }

    /// Wire number of this waveform.
    pub fn wire(self) -> u8 {
        match self {
            Waveform::Monophasic => 0,
            Waveform::Biphasic => 1,
            Waveform::Halfsine => 2,
            Waveform::BiphasicBurst => 3,
        }
    }
}

/// Coil current direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurrentDirection {
    /// Default current direction.
    Normal,
    /// Reversed current direction.
    Reverse,
}

impl CurrentDirection {
    /// Decode a wire direction number.
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(CurrentDirection::Normal),
            1 => Some(CurrentDirection::Reverse),
            _ => None,
        }
    }

    /// Wire number of this direction.
    pub fn wire(self) -> u8 {
        match self {
            CurrentDirection::Normal => 0,
            CurrentDirection::Reverse => 1,
        }
    }
}

/// Front-panel page selectable over the wire.
///
/// `Service` and `Service2` exist on the device but are read-only; the
/// encoder refuses to navigate to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Page {
    /// Main operating page.
    Main,
    /// Train timing page.
    Timing,
    /// External trigger page.
    Trigger,
    /// Configuration page.
    Configure,
    /// Protocol sequence page.
    Protocol,
    /// Service page (read-only).
    Service,
    /// Second service page (read-only).
    Service2,
}

impl Page {
    /// Wire number of this page.
    pub fn wire(self) -> u8 {
        match self {
            Page::Main => 1,
            Page::Timing => 2,
            Page::Trigger => 3,
            Page::Configure => 4,
            Page::Protocol => 7,
            Page::Service => 13,
            Page::Service2 => 17,
        }
    }

    /// Whether the controller may navigate to this page.
    pub fn is_writable(self) -> bool {
        !matches!(self, Page::Service | Page::Service2)
    }
}

/// The queries that have a matching response message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryKind {
    /// Short status (message type 0).
    ShortStatus,
    /// Long status with protocol-page fields (message type 5).
    LongStatus,
    /// Current waveform configuration (message type 9).
    Waveform,
}

/// Waveform configuration for [`Command::SetWaveform`].
///
/// Numeric fields are quantized against the device tables by the encoder;
/// `burst_pulses` must be 2-5 and only applies to [`Waveform::BiphasicBurst`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveformOptions {
    /// Pulse mode.
    pub mode: Mode,
    /// Coil current direction.
    pub current_direction: CurrentDirection,
    /// Pulse waveform.
    pub waveform: Waveform,
    /// Pulses per burst (2-5).
    pub burst_pulses: u8,
    /// Inter-pulse interval in ms.
    pub inter_pulse_interval_ms: f64,
    /// Ratio of the B pulse amplitude to the A pulse amplitude.
    pub pulse_b_ratio: f64,
}

/// A command to the stimulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Ask the device for a status or configuration message.
    Query(QueryKind),
    /// Set pulse amplitudes in % MSO (0-199 each).
    SetAmplitude {
        /// Amplitude of the A pulse.
        a: u8,
        /// Amplitude of the B pulse (twin/dual modes).
        b: u8,
    },
    /// Enable or disable the stimulator output.
    SetStatus {
        /// True to arm the device.
        enabled: bool,
    },
    /// Fire a single pulse (or pulse pair, depending on mode).
    Trigger,
    /// Start the configured train sequence.
    Start,
    /// Configure train timing.
    SetTiming {
        /// Repetition rate in Hz.
        rate_hz: f64,
        /// Pulses per train.
        pulses_in_train: u32,
        /// Number of trains.
        number_of_trains: u32,
        /// Inter-train interval in seconds.
        iti_s: f64,
    },
    /// Switch the front-panel page.
    SetPage {
        /// Target page.
        page: Page,
    },
    /// Configure external trigger and charge delays.
    SetTrigger {
        /// Trigger input delay in ms.
        in_delay_ms: f64,
        /// Trigger output delay in ms; negative values lead the pulse.
        out_delay_ms: f64,
        /// Recharge delay in ms.
        charge_delay_ms: f64,
    },
    /// Configure the pulse waveform.
    SetWaveform(WaveformOptions),
}

impl Command {
    /// Wire command identifier (first body byte).
    pub fn id(&self) -> u8 {
        match self {
            Command::Query(QueryKind::ShortStatus) => 0,
            Command::SetAmplitude { .. } => 1,
            Command::SetStatus { .. } => 2,
            Command::Trigger => 3,
            Command::Start => 4,
            Command::Query(QueryKind::LongStatus) => 5,
            Command::SetTiming { .. } => 6,
            Command::SetPage { .. } => 7,
            Command::SetTrigger { .. } => 8,
            Command::Query(QueryKind::Waveform) | Command::SetWaveform(_) => 9,
        }
    }

    /// Whether the device answers this command with a message the caller
    /// waits for.
    pub fn expects_response(&self) -> bool {
        matches!(self, Command::Query(_))
    }
}
