//! Demo mode - simulated stimulator for testing
//!
//! Implements [`Transport`] with a fake MagPro on the far end: commands
//! written to it are parsed with the real reassembler, and plausible
//! device traffic (status responses, amplitude echoes, pulse events with
//! jittered di/dt) is queued for the read side. Lets a front end or an
//! integration test run the full driver stack without hardware.
//!
//! The simulated device reports pulse pairs the way the real one does:
//! sometimes as a single event carrying both di/dt values, sometimes
//! split across two events with a zero second slot.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::protocol::encoder::frame_body;
use crate::protocol::stream::Transport;
use crate::protocol::{FrameReassembler, Reassembled};

/// Pause before reporting an empty read, so a polling listener does not
/// spin.
const IDLE_READ_DELAY: Duration = Duration::from_millis(5);

struct DemoInner {
    rng: StdRng,
    commands: FrameReassembler,
    outbound: VecDeque<u8>,

    // Simulated device state, kept in wire representation.
    enabled: bool,
    amplitudes: [u8; 2],
    mode: u8,
    waveform: u8,
    current_direction: u8,
    burst_key: u8,
    ipi_index: u16,
    ratio_index: u8,
    page: u8,
    temperature: u8,
    coil_type: u8,
    model: u8,
    serial_number: u32,
    pulses_in_train: u16,
    pulses_fired: u32,
}

/// Simulated stimulator implementing [`Transport`].
///
/// Clones share the same simulated device, so the listener half and the
/// writer half see one instrument.
pub struct DemoStimulator {
    inner: Arc<Mutex<DemoInner>>,
}

impl DemoStimulator {
    /// Create a simulator with a random seed.
    pub fn new() -> Self {
        Self::with_seed(rand::random())
    }

    /// Create a simulator with a fixed seed, for reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DemoInner {
                rng: StdRng::seed_from_u64(seed),
                commands: FrameReassembler::new(),
                outbound: VecDeque::new(),
                enabled: false,
                amplitudes: [0, 0],
                mode: 0,
                waveform: 1,
                current_direction: 0,
                burst_key: 3,
                ipi_index: 29900,
                ratio_index: 16,
                page: 1,
                temperature: 21,
                coil_type: 72,
                model: 4,
                serial_number: 0x030A51,
                pulses_in_train: 5,
                pulses_fired: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DemoInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for DemoStimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoInner {
    fn queue(&mut self, body: &[u8]) {
        self.outbound.extend(frame_body(body));
    }

    fn mode_bits(&self) -> u8 {
        self.mode | (self.waveform << 2)
    }

    fn status_flags(&self) -> u8 {
        self.mode_bits() | (u8::from(self.enabled) << 4) | (self.model << 5)
    }

    fn queue_short_status(&mut self) {
        let sn = self.serial_number;
        let body = [
            0,
            0,
            self.status_flags(),
            (sn >> 16) as u8,
            (sn >> 8) as u8,
            sn as u8,
            self.temperature,
            self.coil_type,
            self.amplitudes[0],
            self.amplitudes[1],
        ];
        self.queue(&body);
    }

    fn queue_long_status(&mut self) {
        let sn = self.serial_number;
        let body = [
            5,
            0,
            self.status_flags(),
            (sn >> 16) as u8,
            (sn >> 8) as u8,
            sn as u8,
            self.temperature,
            self.coil_type,
            self.amplitudes[0],
            self.amplitudes[1],
            self.amplitudes[0],
            self.amplitudes[1],
            100,
            100,
            self.page,
            0,
        ];
        self.queue(&body);
    }

    fn queue_waveform_config(&mut self) {
        let body = [
            9,
            0,
            0,
            self.model,
            self.mode,
            self.current_direction,
            self.waveform,
            self.burst_key,
            // Inbound IPI index goes out little-endian, as on the device.
            (self.ipi_index & 0xFF) as u8,
            (self.ipi_index >> 8) as u8,
            self.ratio_index,
        ];
        self.queue(&body);
    }

    fn queue_coil_temperature(&mut self) {
        let body = [3, 0, self.temperature, self.coil_type, self.mode_bits()];
        self.queue(&body);
    }

    fn fire_pulse(&mut self) {
        // di/dt tracks amplitude with a little shot noise.
        let didt_for = |rng: &mut StdRng, amplitude: u8| -> u8 {
            let base = u32::from(amplitude).saturating_mul(3) / 2;
            (base + rng.gen_range(0..8)).min(199) as u8
        };
        let didt_a = didt_for(&mut self.rng, self.amplitudes[0]);
        let bits = self.mode_bits();
        if self.mode == 2 || self.mode == 3 {
            let didt_b = didt_for(&mut self.rng, self.amplitudes[1]).max(1);
            if self.rng.gen_bool(0.5) {
                // Both pulses in one event.
                self.queue(&[2, 0, didt_a, didt_b, bits]);
            } else {
                // Split report: the second event carries the B value in
                // the first slot.
                self.queue(&[2, 0, didt_a, 0, bits]);
                self.queue(&[2, 0, didt_b, 0, bits]);
            }
        } else {
            self.queue(&[2, 0, didt_a, 0, bits]);
        }
        self.pulses_fired += 1;
        // Coils warm up as they work.
        if self.pulses_fired % 10 == 0 {
            self.temperature = self.temperature.saturating_add(1);
            self.queue_coil_temperature();
        }
    }

    fn handle_command(&mut self, body: &[u8]) {
        match body {
            [0] => self.queue_short_status(),
            [5] => self.queue_long_status(),
            [9, 0] => self.queue_waveform_config(),
            [9, 1, mode, direction, waveform, burst_key, ipi_hi, ipi_lo, ratio] => {
                self.mode = mode & 0b11;
                self.current_direction = direction & 1;
                self.waveform = waveform & 0b11;
                self.burst_key = *burst_key;
                self.ipi_index = u16::from_be_bytes([*ipi_hi, *ipi_lo]);
                self.ratio_index = *ratio;
                self.queue_waveform_config();
            }
            [1, a, b] => {
                self.amplitudes = [*a, *b];
                let body = [1, 0, *a, *b, self.mode_bits()];
                self.queue(&body);
            }
            [2, status] => {
                self.enabled = *status != 0;
                self.queue_short_status();
            }
            [3] => {
                if self.enabled {
                    self.fire_pulse();
                }
            }
            [4] => {
                if self.enabled {
                    // A real train paces itself; the demo reports a short
                    // burst immediately.
                    for _ in 0..self.pulses_in_train.min(10) {
                        self.fire_pulse();
                    }
                }
            }
            [6, _, _, pir_hi, pir_lo, ..] => {
                self.pulses_in_train = u16::from_be_bytes([*pir_hi, *pir_lo]);
            }
            [7, page] => {
                self.page = *page;
            }
            [8, ..] => {}
            _ => {}
        }
    }
}

impl Read for DemoStimulator {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        {
            let mut inner = self.lock();
            if !inner.outbound.is_empty() {
                let n = buf.len().min(inner.outbound.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = inner.outbound.pop_front().unwrap_or_default();
                }
                return Ok(n);
            }
        }
        std::thread::sleep(IDLE_READ_DELAY);
        Err(io::Error::new(io::ErrorKind::WouldBlock, "no data"))
    }
}

impl Write for DemoStimulator {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.lock();
        let items = inner.commands.extend(buf);
        for item in items {
            if let Reassembled::Frame { body, .. } = item {
                inner.handle_command(&body);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for DemoStimulator {
    fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.lock().outbound.clear();
        Ok(())
    }

    fn try_clone(&self) -> io::Result<Box<dyn Transport>> {
        Ok(Box::new(DemoStimulator {
            inner: Arc::clone(&self.inner),
        }))
    }
}
