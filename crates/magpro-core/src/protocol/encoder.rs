//! Command encoding
//!
//! Validates and quantizes caller-supplied parameters, then assembles the
//! outbound frame: `startFlag | length | body | crc8 | endFlag`. Every
//! multi-byte field goes out big-endian, the device reads the high byte
//! first. Validation happens before a single byte is written to the
//! transport.

use byteorder::{BigEndian, ByteOrder};

use super::commands::{Command, QueryKind, Waveform, WaveformOptions};
use super::crc;
use super::error::ProtocolError;
use super::tables;
use super::{END_FLAG, MAX_AMPLITUDE, START_FLAG};

/// Wrap a body in the wire framing.
///
/// Public so tooling (the demo stimulator, tests, packet inspectors) can
/// produce device-shaped frames for arbitrary bodies.
pub fn frame_body(body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(body.len() + 4);
    frame.push(START_FLAG);
    frame.push(body.len() as u8);
    frame.extend_from_slice(body);
    frame.push(crc::checksum(body));
    frame.push(END_FLAG);
    frame
}

fn push_u16_be(body: &mut Vec<u8>, value: u16) {
    let mut buf = [0u8; 2];
    BigEndian::write_u16(&mut buf, value);
    body.extend_from_slice(&buf);
}

fn push_i16_be(body: &mut Vec<u8>, value: i16) {
    let mut buf = [0u8; 2];
    BigEndian::write_i16(&mut buf, value);
    body.extend_from_slice(&buf);
}

fn require_finite(name: &str, value: f64) -> Result<(), ProtocolError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ProtocolError::Validation(format!(
            "{name} must be a finite number, got {value}"
        )))
    }
}

fn check_amplitude(name: &str, value: u8) -> Result<(), ProtocolError> {
    if value > MAX_AMPLITUDE {
        return Err(ProtocolError::Validation(format!(
            "{name} amplitude {value} exceeds maximum {MAX_AMPLITUDE}% MSO"
        )));
    }
    Ok(())
}

fn encode_waveform(opts: &WaveformOptions) -> Result<Vec<u8>, ProtocolError> {
    if !(2..=5).contains(&opts.burst_pulses) {
        return Err(ProtocolError::Validation(format!(
            "burst pulse count must be 2-5, got {}",
            opts.burst_pulses
        )));
    }
    require_finite("inter-pulse interval", opts.inter_pulse_interval_ms)?;
    require_finite("pulse B/A ratio", opts.pulse_b_ratio)?;

    let ipi_index = if opts.waveform == Waveform::BiphasicBurst {
        tables::burst_ipi_index(opts.inter_pulse_interval_ms)
    } else {
        tables::wide_ipi_index(opts.inter_pulse_interval_ms)
    };
    let mut body = vec![
        9,
        1,
        opts.mode.wire(),
        opts.current_direction.wire(),
        opts.waveform.wire(),
        5 - opts.burst_pulses,
    ];
    push_u16_be(&mut body, ipi_index);
    body.push(tables::pulse_ratio_index(opts.pulse_b_ratio));
    Ok(body)
}

/// Encode a command body, validating and quantizing every parameter.
pub fn encode_body(command: &Command) -> Result<Vec<u8>, ProtocolError> {
    match command {
        Command::Query(QueryKind::ShortStatus) => Ok(vec![0]),
        Command::Query(QueryKind::LongStatus) => Ok(vec![5]),
        Command::Query(QueryKind::Waveform) => Ok(vec![9, 0]),
        Command::SetAmplitude { a, b } => {
            check_amplitude("A", *a)?;
            check_amplitude("B", *b)?;
            Ok(vec![1, *a, *b])
        }
        Command::SetStatus { enabled } => Ok(vec![2, u8::from(*enabled)]),
        Command::Trigger => Ok(vec![3]),
        Command::Start => Ok(vec![4]),
        Command::SetTiming {
            rate_hz,
            pulses_in_train,
            number_of_trains,
            iti_s,
        } => {
            require_finite("repetition rate", *rate_hz)?;
            require_finite("inter-train interval", *iti_s)?;
            let rate = tables::nearest_allowed_value(rate_hz * 10.0, &tables::REPETITION_RATE);
            let pulses = tables::nearest_allowed_value(
                f64::from(*pulses_in_train),
                &tables::PULSES_IN_TRAIN,
            );
            let trains = tables::nearest_allowed_value(
                f64::from(*number_of_trains),
                &tables::NUMBER_OF_TRAINS,
            );
            let iti = tables::nearest_allowed_value(iti_s * 10.0, &tables::INTER_TRAIN_INTERVAL);
            let mut body = vec![6];
            push_u16_be(&mut body, rate as u16);
            push_u16_be(&mut body, pulses as u16);
            push_u16_be(&mut body, trains as u16);
            push_u16_be(&mut body, iti as u16);
            Ok(body)
        }
        Command::SetPage { page } => {
            if !page.is_writable() {
                return Err(ProtocolError::Validation(format!(
                    "page {page:?} is read-only"
                )));
            }
            Ok(vec![7, page.wire()])
        }
        Command::SetTrigger {
            in_delay_ms,
            out_delay_ms,
            charge_delay_ms,
        } => {
            require_finite("trigger input delay", *in_delay_ms)?;
            require_finite("trigger output delay", *out_delay_ms)?;
            require_finite("charge delay", *charge_delay_ms)?;
            let in_delay =
                tables::nearest_allowed_value(in_delay_ms * 10.0, &tables::TRIGGER_IN_DELAY);
            let out_delay =
                tables::nearest_allowed_value(out_delay_ms * 10.0, &tables::TRIGGER_OUT_DELAY);
            let charge =
                tables::nearest_allowed_value(*charge_delay_ms, &tables::CHARGE_DELAY);
            let mut body = vec![8];
            push_u16_be(&mut body, in_delay as u16);
            push_i16_be(&mut body, out_delay as i16);
            push_u16_be(&mut body, charge as u16);
            Ok(body)
        }
        Command::SetWaveform(opts) => encode_waveform(opts),
    }
}

/// Encode a command into a complete wire frame.
pub fn encode(command: &Command) -> Result<Vec<u8>, ProtocolError> {
    Ok(frame_body(&encode_body(command)?))
}
