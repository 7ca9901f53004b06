//! State store and disambiguation tests against the public API.

use chrono::Utc;

use magpro_core::device::DeviceState;
use magpro_core::framelog::export_pulse_log;
use magpro_core::protocol::message::decode;
use magpro_core::protocol::{frame_body, DecodedMessage, FrameReassembler, Mode, Reassembled};

/// Decode the bodies of a byte stream as the listener would.
fn replay(state: &mut DeviceState, stream: &[u8]) {
    let mut reassembler = FrameReassembler::new();
    for item in reassembler.extend(stream) {
        if let Reassembled::Frame { body, .. } = item {
            state.apply(&decode(&body), Utc::now());
        }
    }
}

const TWIN_BITS: u8 = 0b0110; // mode=Twin, waveform=Biphasic

#[test]
fn test_split_twin_report_produces_two_records() {
    let mut state = DeviceState::new();
    let mut stream = frame_body(&[1, 0, 60, 45, TWIN_BITS]);
    stream.extend_from_slice(&frame_body(&[2, 0, 88, 0, TWIN_BITS]));
    stream.extend_from_slice(&frame_body(&[2, 0, 71, 0, TWIN_BITS]));
    replay(&mut state, &stream);

    let log = state.pulse_log();
    assert_eq!(log.len(), 2);
    assert_eq!((log[0].amplitude, log[0].didt), (60, 88));
    // The second record uses the B amplitude and the follow-up event's
    // first di/dt slot.
    assert_eq!((log[1].amplitude, log[1].didt), (45, 71));
    assert!(!state.pending_second_pulse());
}

#[test]
fn test_combined_twin_report_produces_two_records() {
    let mut state = DeviceState::new();
    let mut stream = frame_body(&[1, 0, 60, 45, TWIN_BITS]);
    stream.extend_from_slice(&frame_body(&[2, 0, 88, 72, TWIN_BITS]));
    replay(&mut state, &stream);

    let log = state.pulse_log();
    assert_eq!(log.len(), 2);
    assert_eq!((log[0].amplitude, log[0].didt), (60, 88));
    assert_eq!((log[1].amplitude, log[1].didt), (45, 72));
}

#[test]
fn test_zero_didt_second_pulse_arms_pending_state() {
    // The documented ambiguity: a genuine zero-di/dt B pulse is
    // indistinguishable from a deferred report, so the store waits.
    let mut state = DeviceState::new();
    replay(&mut state, &frame_body(&[2, 0, 88, 0, TWIN_BITS]));
    assert_eq!(state.pulse_log().len(), 1);
    assert!(state.pending_second_pulse());
}

#[test]
fn test_standard_mode_is_unaffected_by_second_slot() {
    let mut state = DeviceState::new();
    let standard_bits = 0b0100; // mode=Standard, waveform=Biphasic
    let mut stream = frame_body(&[1, 0, 55, 0, standard_bits]);
    stream.extend_from_slice(&frame_body(&[2, 0, 90, 64, standard_bits]));
    replay(&mut state, &stream);

    let log = state.pulse_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].didt, 90);
    assert_eq!(log[0].mode, Some(Mode::Standard));
    assert!(!state.pending_second_pulse());
}

#[test]
fn test_log_indices_are_stable() {
    let mut state = DeviceState::new();
    let bits = 0b0100;
    let mut stream = frame_body(&[1, 0, 30, 0, bits]);
    stream.extend_from_slice(&frame_body(&[2, 0, 10, 0, bits]));
    replay(&mut state, &stream);
    let first = state.pulse_log()[0].clone();

    let mut more = frame_body(&[1, 0, 70, 0, bits]);
    more.extend_from_slice(&frame_body(&[2, 0, 20, 0, bits]));
    replay(&mut state, &more);

    // Appending never rewrites earlier entries.
    assert_eq!(state.pulse_log().len(), 2);
    assert_eq!(state.pulse_log()[0], first);
    assert_eq!(state.pulse_log()[1].amplitude, 70);
}

#[test]
fn test_coil_and_amplitude_updates_overwrite_unconditionally() {
    let mut state = DeviceState::new();
    let mut stream = frame_body(&[3, 0, 24, 72]);
    stream.extend_from_slice(&frame_body(&[3, 0, 31, 72]));
    stream.extend_from_slice(&frame_body(&[1, 0, 40, 20]));
    stream.extend_from_slice(&frame_body(&[1, 0, 80, 10]));
    replay(&mut state, &stream);
    assert_eq!(state.coil_temperature(), (31, 72));
    assert_eq!(state.amplitudes(), [80, 10]);
}

#[test]
fn test_status_frames_do_not_touch_the_pulse_path() {
    let mut state = DeviceState::new();
    let stream = frame_body(&[0, 0, 0b0001_0110, 0, 0, 1, 24, 72, 50, 40]);
    replay(&mut state, &stream);
    assert!(state.pulse_log().is_empty());
    assert_eq!(state.amplitudes(), [0, 0]);
}

#[test]
fn test_pulse_log_json_export() {
    let mut state = DeviceState::new();
    let mut stream = frame_body(&[1, 0, 42, 0, 0b0100]);
    stream.extend_from_slice(&frame_body(&[2, 0, 63, 0, 0b0100]));
    replay(&mut state, &stream);

    let mut out = Vec::new();
    export_pulse_log(state.pulse_log(), &mut out).expect("export");
    let json: serde_json::Value = serde_json::from_slice(&out).expect("valid json");
    assert_eq!(json[0]["amplitude"], 42);
    assert_eq!(json[0]["didt"], 63);
}

#[test]
fn test_unrecognized_traffic_is_surfaced_not_dropped() {
    let mut reassembler = FrameReassembler::new();
    let mut stream = vec![0x10, 0x20];
    stream.extend_from_slice(&frame_body(&[3, 0, 24, 72]));
    let items = reassembler.extend(&stream);
    assert!(matches!(
        items[0],
        Reassembled::Garbage { ref raw } if raw == &vec![0x10, 0x20]
    ));
    let Reassembled::Frame { body, .. } = &items[1] else {
        panic!("expected frame");
    };
    assert!(matches!(
        decode(body),
        DecodedMessage::CoilTemperature(_)
    ));
}
