//! Device state store
//!
//! Last-known stimulator state plus the append-only pulse log. Mutated
//! only by the decode path; the façade and external consumers read
//! snapshots.
//!
//! # Twin/dual pulse disambiguation
//!
//! In twin and dual modes the device fires two pulses per trigger but
//! reports them nondeterministically: either one event carrying both
//! di/dt values, or two events where the first carries a zero second
//! slot. A two-state machine interprets the stream. The heuristic cannot
//! tell "the second pulse genuinely had zero di/dt" from "the device will
//! report it separately" — that ambiguity is inherent to the wire
//! protocol and is preserved here rather than second-guessed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::commands::{Mode, Waveform};
use crate::protocol::message::DecodedMessage;

/// One recorded pulse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseRecord {
    /// Arrival time of the frame that produced this record.
    pub timestamp: DateTime<Utc>,
    /// Cached amplitude of the channel that fired, in % MSO.
    pub amplitude: u8,
    /// Reported rate of current change, in A/µs.
    pub didt: u8,
    /// Pulse mode, when the event carried it.
    pub mode: Option<Mode>,
    /// Pulse waveform, when the event carried it.
    pub waveform: Option<Waveform>,
}

/// Last-known device state for one controller session.
#[derive(Debug, Default)]
pub struct DeviceState {
    amplitudes: [u8; 2],
    coil_temperature: u8,
    coil_type: u8,
    pending_second_pulse: bool,
    pulse_log: Vec<PulseRecord>,
}

impl DeviceState {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached amplitudes `[A, B]` in % MSO.
    pub fn amplitudes(&self) -> [u8; 2] {
        self.amplitudes
    }

    /// Cached coil temperature and coil type.
    pub fn coil_temperature(&self) -> (u8, u8) {
        (self.coil_temperature, self.coil_type)
    }

    /// Whether the store is waiting for the second pulse of a twin/dual
    /// pair to arrive in a follow-up event.
    pub fn pending_second_pulse(&self) -> bool {
        self.pending_second_pulse
    }

    /// The append-only pulse log. Indices are stable once appended.
    pub fn pulse_log(&self) -> &[PulseRecord] {
        &self.pulse_log
    }

    /// Fold a decoded message into the cached state.
    pub fn apply(&mut self, message: &DecodedMessage, timestamp: DateTime<Utc>) {
        match message {
            DecodedMessage::AmplitudeUpdate(update) => {
                // Last write wins; these annotate subsequent pulses.
                self.amplitudes = [update.a, update.b];
            }
            DecodedMessage::CoilTemperature(coil) => {
                self.coil_temperature = coil.temperature;
                self.coil_type = coil.coil_type;
            }
            DecodedMessage::PulseEvent(event) => {
                let paired = event.mode.is_some_and(Mode::is_paired);
                if !paired {
                    self.push_pulse(timestamp, 0, event.didt_a, event);
                } else if self.pending_second_pulse {
                    // The deferred second pulse arrives in the first di/dt
                    // slot of its own event.
                    self.push_pulse(timestamp, 1, event.didt_a, event);
                    self.pending_second_pulse = false;
                } else {
                    self.push_pulse(timestamp, 0, event.didt_a, event);
                    if event.didt_b == 0 {
                        self.pending_second_pulse = true;
                    } else {
                        self.push_pulse(timestamp, 1, event.didt_b, event);
                    }
                }
            }
            _ => {}
        }
    }

    fn push_pulse(
        &mut self,
        timestamp: DateTime<Utc>,
        channel: usize,
        didt: u8,
        event: &crate::protocol::message::PulseEvent,
    ) {
        self.pulse_log.push(PulseRecord {
            timestamp,
            amplitude: self.amplitudes[channel],
            didt,
            mode: event.mode,
            waveform: event.waveform,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{AmplitudeUpdate, PulseEvent};

    fn amplitude(a: u8, b: u8) -> DecodedMessage {
        DecodedMessage::AmplitudeUpdate(AmplitudeUpdate {
            a,
            b,
            mode: None,
            waveform: None,
        })
    }

    fn pulse(didt_a: u8, didt_b: u8, mode: Mode) -> DecodedMessage {
        DecodedMessage::PulseEvent(PulseEvent {
            didt_a,
            didt_b,
            mode: Some(mode),
            waveform: Some(Waveform::Biphasic),
        })
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_single_pulse_modes_record_one_pulse() {
        let mut state = DeviceState::new();
        state.apply(&amplitude(55, 0), now());
        state.apply(&pulse(90, 0, Mode::Standard), now());
        assert_eq!(state.pulse_log().len(), 1);
        assert_eq!(state.pulse_log()[0].amplitude, 55);
        assert_eq!(state.pulse_log()[0].didt, 90);
        assert!(!state.pending_second_pulse());
    }

    #[test]
    fn test_twin_event_with_both_didts() {
        let mut state = DeviceState::new();
        state.apply(&amplitude(60, 45), now());
        state.apply(&pulse(88, 72, Mode::Twin), now());
        let log = state.pulse_log();
        assert_eq!(log.len(), 2);
        assert_eq!((log[0].amplitude, log[0].didt), (60, 88));
        assert_eq!((log[1].amplitude, log[1].didt), (45, 72));
        assert!(!state.pending_second_pulse());
    }

    #[test]
    fn test_twin_event_split_across_two_events() {
        let mut state = DeviceState::new();
        state.apply(&amplitude(60, 45), now());
        state.apply(&pulse(88, 0, Mode::Twin), now());
        assert_eq!(state.pulse_log().len(), 1);
        assert!(state.pending_second_pulse());

        // The follow-up event carries the B pulse's di/dt in its first
        // slot.
        state.apply(&pulse(71, 0, Mode::Twin), now());
        let log = state.pulse_log();
        assert_eq!(log.len(), 2);
        assert_eq!((log[1].amplitude, log[1].didt), (45, 71));
        assert!(!state.pending_second_pulse());
    }

    #[test]
    fn test_dual_mode_uses_same_machine() {
        let mut state = DeviceState::new();
        state.apply(&amplitude(80, 40), now());
        state.apply(&pulse(95, 0, Mode::Dual), now());
        state.apply(&pulse(50, 0, Mode::Dual), now());
        assert_eq!(state.pulse_log().len(), 2);
        assert_eq!(state.pulse_log()[1].amplitude, 40);
    }

    #[test]
    fn test_amplitude_update_annotates_later_pulses_only() {
        let mut state = DeviceState::new();
        state.apply(&amplitude(30, 0), now());
        state.apply(&pulse(10, 0, Mode::Standard), now());
        state.apply(&amplitude(70, 0), now());
        state.apply(&pulse(20, 0, Mode::Standard), now());
        let log = state.pulse_log();
        assert_eq!(log[0].amplitude, 30);
        assert_eq!(log[1].amplitude, 70);
    }

    #[test]
    fn test_pulse_without_mode_is_single() {
        let mut state = DeviceState::new();
        let event = DecodedMessage::PulseEvent(PulseEvent {
            didt_a: 42,
            didt_b: 17,
            mode: None,
            waveform: None,
        });
        state.apply(&event, now());
        assert_eq!(state.pulse_log().len(), 1);
        assert!(!state.pending_second_pulse());
    }

    #[test]
    fn test_coil_temperature_caching() {
        let mut state = DeviceState::new();
        state.apply(
            &DecodedMessage::CoilTemperature(crate::protocol::message::CoilTemperature {
                temperature: 28,
                coil_type: 72,
                mode: None,
                waveform: None,
            }),
            now(),
        );
        assert_eq!(state.coil_temperature(), (28, 72));
    }
}
