//! Message decoding
//!
//! Turns a validated frame body into a typed device message. Dispatch is
//! on the first body byte; anything that does not parse as a known
//! message type is preserved as [`DecodedMessage::Unrecognized`] so the
//! frame log never loses traffic.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::commands::{CurrentDirection, Mode, Waveform};
use super::tables;

/// Short status message (type 0), also the prefix of the long status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortStatus {
    /// Pulse mode.
    pub mode: Mode,
    /// Pulse waveform.
    pub waveform: Waveform,
    /// Whether the output stage is armed.
    pub enabled: bool,
    /// Device model number.
    pub model: u8,
    /// Device serial number.
    pub serial_number: u32,
    /// Coil temperature in degrees Celsius.
    pub temperature: u8,
    /// Connected coil type number.
    pub coil_type: u8,
    /// Amplitude of the A pulse in % MSO.
    pub amplitude_a: u8,
    /// Amplitude of the B pulse in % MSO.
    pub amplitude_b: u8,
}

/// Long status message (type 5): short status plus protocol-page fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongStatus {
    /// The short-status prefix.
    pub status: ShortStatus,
    /// Amplitude setting of the A pulse in % MSO.
    pub amplitude_setting_a: u8,
    /// Amplitude setting of the B pulse in % MSO.
    pub amplitude_setting_b: u8,
    /// Scaling factor applied to the A amplitude (0.00-1.00 and above).
    pub amplitude_factor_a: f64,
    /// Scaling factor applied to the B amplitude.
    pub amplitude_factor_b: f64,
    /// Currently displayed page number.
    pub page_number: u8,
    /// Non-zero while a protocol sequence is running.
    pub ongoing_sequence: u8,
}

/// Amplitude update message (type 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmplitudeUpdate {
    /// Amplitude of the A pulse in % MSO.
    pub a: u8,
    /// Amplitude of the B pulse in % MSO.
    pub b: u8,
    /// Pulse mode, when the device included it.
    pub mode: Option<Mode>,
    /// Pulse waveform, when the device included it.
    pub waveform: Option<Waveform>,
}

/// Pulse event message (type 2), one per discharge report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseEvent {
    /// Rate of current change of the first reported pulse, in A/µs.
    pub didt_a: u8,
    /// Rate of current change of the second pulse; zero when the device
    /// defers it to a follow-up event.
    pub didt_b: u8,
    /// Pulse mode, when the device included it.
    pub mode: Option<Mode>,
    /// Pulse waveform, when the device included it.
    pub waveform: Option<Waveform>,
}

/// Coil temperature message (type 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoilTemperature {
    /// Coil temperature in degrees Celsius.
    pub temperature: u8,
    /// Connected coil type number.
    pub coil_type: u8,
    /// Pulse mode, when the device included it.
    pub mode: Option<Mode>,
    /// Pulse waveform, when the device included it.
    pub waveform: Option<Waveform>,
}

/// Waveform configuration message (type 9).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveformConfig {
    /// Device model number.
    pub model: u8,
    /// Pulse mode.
    pub mode: Option<Mode>,
    /// Coil current direction.
    pub current_direction: Option<CurrentDirection>,
    /// Pulse waveform.
    pub waveform: Option<Waveform>,
    /// Pulses per burst, when the wire value maps to one.
    pub burst_pulses: Option<u8>,
    /// Inter-pulse interval in ms; NaN when not applicable.
    pub inter_pulse_interval_ms: f64,
    /// B/A amplitude ratio (twin mode); NaN when not applicable.
    pub pulse_b_ratio: f64,
    /// Absolute B amplitude in % MSO (dual mode); NaN when not applicable.
    pub pulse_b_amplitude: f64,
}

/// A decoded device message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DecodedMessage {
    /// Short status response.
    ShortStatus(ShortStatus),
    /// Amplitude update, solicited or not.
    AmplitudeUpdate(AmplitudeUpdate),
    /// Pulse discharge report.
    PulseEvent(PulseEvent),
    /// Coil temperature report.
    CoilTemperature(CoilTemperature),
    /// Long status response.
    LongStatus(LongStatus),
    /// Waveform configuration response.
    WaveformConfig(WaveformConfig),
    /// Anything that did not parse as a known message.
    Unrecognized {
        /// The raw bytes as received.
        raw: Vec<u8>,
    },
}

fn mode_bits(byte: u8) -> Mode {
    match byte & 0b11 {
        0 => Mode::Standard,
        1 => Mode::Power,
        2 => Mode::Twin,
        _ => Mode::Dual,
    }
}

fn waveform_bits(byte: u8) -> Waveform {
    match (byte & 0b1100) >> 2 {
        0 => Waveform::Monophasic,
        1 => Waveform::Biphasic,
        2 => Waveform::Halfsine,
        _ => Waveform::BiphasicBurst,
    }
}

fn decode_short_status(body: &[u8]) -> ShortStatus {
    let flags = body[2];
    ShortStatus {
        mode: mode_bits(flags),
        waveform: waveform_bits(flags),
        enabled: flags & 0b1_0000 != 0,
        model: (flags & 0b1110_0000) >> 5,
        serial_number: BigEndian::read_u24(&body[3..6]),
        temperature: body[6],
        coil_type: body[7],
        amplitude_a: body[8],
        amplitude_b: body[9],
    }
}

fn decode_waveform_config(body: &[u8]) -> WaveformConfig {
    let waveform = Waveform::from_wire(body[6]);
    // Burst trains index the short table with one byte; everything else
    // uses a 16-bit index into the wide table.
    let ipi = if waveform == Some(Waveform::BiphasicBurst) {
        tables::burst_ipi_from_index(u16::from(body[8]))
    } else {
        tables::wide_ipi_from_index(LittleEndian::read_u16(&body[8..10]))
    };
    let mode = Mode::from_wire(body[4]);
    let (ratio, b_amplitude) = match mode {
        Some(Mode::Twin) => (tables::pulse_ratio_from_index(body[10]), f64::NAN),
        Some(Mode::Dual) => (f64::NAN, f64::from(100 - i16::from(body[10]))),
        _ => (f64::NAN, f64::NAN),
    };
    WaveformConfig {
        model: body[3],
        mode,
        current_direction: CurrentDirection::from_wire(body[5]),
        waveform,
        burst_pulses: match body[7] {
            0 => Some(5),
            1 => Some(4),
            2 => Some(3),
            3 => Some(2),
            _ => None,
        },
        inter_pulse_interval_ms: ipi,
        pulse_b_ratio: ratio,
        pulse_b_amplitude: b_amplitude,
    }
}

/// Decode a frame body into a typed message.
///
/// Never fails: bodies that do not match a known layout come back as
/// [`DecodedMessage::Unrecognized`].
pub fn decode(body: &[u8]) -> DecodedMessage {
    let unrecognized = || DecodedMessage::Unrecognized { raw: body.to_vec() };
    let Some(&message_type) = body.first() else {
        return unrecognized();
    };
    match message_type {
        0 if body.len() >= 10 => DecodedMessage::ShortStatus(decode_short_status(body)),
        1 | 2 | 3 if body.len() >= 4 => {
            let mode = body.get(4).map(|&b| mode_bits(b));
            let waveform = body.get(4).map(|&b| waveform_bits(b));
            match message_type {
                1 => DecodedMessage::AmplitudeUpdate(AmplitudeUpdate {
                    a: body[2],
                    b: body[3],
                    mode,
                    waveform,
                }),
                2 => DecodedMessage::PulseEvent(PulseEvent {
                    didt_a: body[2],
                    didt_b: body[3],
                    mode,
                    waveform,
                }),
                _ => DecodedMessage::CoilTemperature(CoilTemperature {
                    temperature: body[2],
                    coil_type: body[3],
                    mode,
                    waveform,
                }),
            }
        }
        5 if body.len() >= 16 => DecodedMessage::LongStatus(LongStatus {
            status: decode_short_status(body),
            amplitude_setting_a: body[10],
            amplitude_setting_b: body[11],
            amplitude_factor_a: f64::from(body[12]) / 100.0,
            amplitude_factor_b: f64::from(body[13]) / 100.0,
            page_number: body[14],
            ongoing_sequence: body[15],
        }),
        9 if body.len() >= 11 => DecodedMessage::WaveformConfig(decode_waveform_config(body)),
        _ => unrecognized(),
    }
}

/// Render an optional wire enum with the device's `-1` sentinel.
fn sentinel(value: Option<u8>) -> i16 {
    value.map(i16::from).unwrap_or(-1)
}

fn fmt_opt(value: f64) -> String {
    if value.is_nan() {
        "n/a".to_string()
    } else {
        format!("{value:.2}")
    }
}

impl PulseEvent {
    /// One-line field list for this pulse event, matching the frame-log form.
    pub fn summary(&self) -> String {
        DecodedMessage::PulseEvent(*self).summary()
    }
}

impl DecodedMessage {
    /// One-line field list for the frame log.
    pub fn summary(&self) -> String {
        match self {
            DecodedMessage::ShortStatus(s) => format!(
                "short_status mode={} waveform={} enabled={} model={} serial={} temperature={} coil_type={} amplitude_a={} amplitude_b={}",
                s.mode.wire(),
                s.waveform.wire(),
                u8::from(s.enabled),
                s.model,
                s.serial_number,
                s.temperature,
                s.coil_type,
                s.amplitude_a,
                s.amplitude_b,
            ),
            DecodedMessage::LongStatus(l) => format!(
                "long_status mode={} waveform={} enabled={} model={} serial={} temperature={} coil_type={} amplitude_a={} amplitude_b={} setting_a={} setting_b={} factor_a={:.2} factor_b={:.2} page={} ongoing={}",
                l.status.mode.wire(),
                l.status.waveform.wire(),
                u8::from(l.status.enabled),
                l.status.model,
                l.status.serial_number,
                l.status.temperature,
                l.status.coil_type,
                l.status.amplitude_a,
                l.status.amplitude_b,
                l.amplitude_setting_a,
                l.amplitude_setting_b,
                l.amplitude_factor_a,
                l.amplitude_factor_b,
                l.page_number,
                l.ongoing_sequence,
            ),
            DecodedMessage::AmplitudeUpdate(a) => format!(
                "amplitude_update a={} b={} mode={} waveform={}",
                a.a,
                a.b,
                sentinel(a.mode.map(Mode::wire)),
                sentinel(a.waveform.map(Waveform::wire)),
            ),
            DecodedMessage::PulseEvent(p) => format!(
                "pulse_event didt_a={} didt_b={} mode={} waveform={}",
                p.didt_a,
                p.didt_b,
                sentinel(p.mode.map(Mode::wire)),
                sentinel(p.waveform.map(Waveform::wire)),
            ),
            DecodedMessage::CoilTemperature(c) => format!(
                "coil_temperature temperature={} coil_type={} mode={} waveform={}",
                c.temperature,
                c.coil_type,
                sentinel(c.mode.map(Mode::wire)),
                sentinel(c.waveform.map(Waveform::wire)),
            ),
            DecodedMessage::WaveformConfig(w) => format!(
                "waveform_config model={} mode={} current_direction={} waveform={} burst_pulses={} ipi_ms={} ratio={} b_amplitude={}",
                w.model,
                sentinel(w.mode.map(Mode::wire)),
                sentinel(w.current_direction.map(CurrentDirection::wire)),
                sentinel(w.waveform.map(Waveform::wire)),
                w.burst_pulses.map(i16::from).unwrap_or(-1),
                fmt_opt(w.inter_pulse_interval_ms),
                fmt_opt(w.pulse_b_ratio),
                fmt_opt(w.pulse_b_amplitude),
            ),
            DecodedMessage::Unrecognized { raw } => format!("unrecognized len={}", raw.len()),
        }
    }
}
