//! Connection management
//!
//! Owns the transport for one controller session. A dedicated listener
//! thread drives reassembly and decoding for everything the device sends,
//! solicited or not; the caller's thread issues commands and, for
//! queries, blocks on the façade until the matching response lands or the
//! deadline passes.

use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, warn};

use super::commands::{Command, Page, QueryKind, WaveformOptions};
use super::encoder;
use super::frame::{FrameReassembler, Reassembled};
use super::message::{self, DecodedMessage, LongStatus, ShortStatus, WaveformConfig};
use super::serial::{clear_buffers, open_port};
use super::stream::{SerialChannel, Transport};
use super::{ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_QUERY_TIMEOUT_MS, POLL_INTERVAL_MS};
use crate::device::{DeviceState, PulseRecord};
use crate::framelog::FrameLog;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Connecting (port being opened)
    Connecting,
    /// Connected and ready
    Connected,
    /// Connection error
    Error,
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Serial port name
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Deadline for synchronous queries in milliseconds
    pub query_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
        }
    }
}

/// Shared state between the listener thread and the caller.
struct SessionInner {
    device: DeviceState,
    short_status: Option<ShortStatus>,
    long_status: Option<LongStatus>,
    waveform: Option<WaveformConfig>,
    log: FrameLog,
    rx_bytes: u64,
    rx_frames: u64,
}

struct Session {
    inner: Mutex<SessionInner>,
    wakeup: Condvar,
    shutdown: AtomicBool,
}

impl Session {
    fn new() -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                device: DeviceState::new(),
                short_status: None,
                long_status: None,
                waveform: None,
                log: FrameLog::new(),
                rx_bytes: 0,
                rx_frames: 0,
            }),
            wakeup: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    // A poisoned mutex only means another thread panicked mid-update;
    // the protocol state is still the best information available.
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Stimulator connection: command encoder, listener, and query façade in
/// one handle.
pub struct Connection {
    config: ConnectionConfig,
    state: ConnectionState,
    transport: Option<Box<dyn Transport>>,
    listener: Option<JoinHandle<()>>,
    session: Arc<Session>,
    tx_bytes: u64,
    tx_frames: u64,
}

impl Connection {
    /// Create a new connection (not yet connected)
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            transport: None,
            listener: None,
            session: Arc::new(Session::new()),
            tx_bytes: 0,
            tx_frames: 0,
        }
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The configuration this connection was created with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Cumulative tx/rx byte and frame counters.
    pub fn counters(&self) -> (u64, u64, u64, u64) {
        let inner = self.session.lock();
        (self.tx_bytes, inner.rx_bytes, self.tx_frames, inner.rx_frames)
    }

    /// Route frame-log lines to `sink` (or stop logging with `None`).
    pub fn set_log_sink(&mut self, sink: Option<Box<dyn Write + Send>>) {
        self.session.lock().log.set_sink(sink);
    }

    /// Open the configured serial port and start the listener.
    pub fn connect(&mut self) -> Result<(), ProtocolError> {
        if self.listener.is_some() {
            return Err(ProtocolError::AlreadyConnected);
        }
        self.state = ConnectionState::Connecting;
        let result = open_port(&self.config.port_name, Some(self.config.baud_rate))
            .and_then(|mut port| {
                clear_buffers(port.as_mut())?;
                Ok(Box::new(SerialChannel::new(port)) as Box<dyn Transport>)
            })
            .and_then(|transport| self.attach(transport));
        if let Err(e) = result {
            // A failure anywhere in setup drops the half-open port; no
            // handle survives past this point.
            self.state = ConnectionState::Error;
            self.transport = None;
            return Err(e);
        }
        Ok(())
    }

    /// Start a session over an already-open transport.
    ///
    /// This is the seam the demo stimulator and the tests plug into; the
    /// serial path goes through [`Connection::connect`].
    pub fn attach(&mut self, transport: Box<dyn Transport>) -> Result<(), ProtocolError> {
        if self.listener.is_some() {
            return Err(ProtocolError::AlreadyConnected);
        }
        let reader = transport.try_clone()?;
        self.session.shutdown.store(false, Ordering::Release);
        let session = Arc::clone(&self.session);
        let handle = thread::Builder::new()
            .name("magpro-listener".to_string())
            .spawn(move || listener_loop(reader, session))?;
        self.transport = Some(transport);
        self.listener = Some(handle);
        self.state = ConnectionState::Connected;
        debug!(port = %self.config.port_name, "connection established");
        Ok(())
    }

    /// Shut down the listener and release the transport.
    ///
    /// Any query blocked on a response is released with a terminal error.
    /// Idempotent; also called from `Drop`.
    pub fn disconnect(&mut self) {
        self.session.shutdown.store(true, Ordering::Release);
        self.session.wakeup.notify_all();
        if let Some(handle) = self.listener.take() {
            let _ = handle.join();
        }
        self.transport = None;
        let _ = self.session.lock().log.flush();
        self.state = ConnectionState::Disconnected;
    }

    /// Encode and transmit a command without waiting for any response.
    pub fn send_command(&mut self, command: &Command) -> Result<(), ProtocolError> {
        // Validation and quantization happen before any byte leaves.
        let frame = encoder::encode(command)?;
        let transport = self.transport.as_mut().ok_or(ProtocolError::NotConnected)?;
        transport.write_all(&frame)?;
        transport.flush()?;
        self.tx_bytes = self.tx_bytes.saturating_add(frame.len() as u64);
        self.tx_frames = self.tx_frames.saturating_add(1);
        debug!(id = command.id(), len = frame.len(), "command sent");
        Ok(())
    }

    /// Query the short status, blocking up to the configured deadline.
    pub fn get_short_status(&mut self) -> Result<ShortStatus, ProtocolError> {
        self.session.lock().short_status = None;
        self.send_command(&Command::Query(QueryKind::ShortStatus))?;
        self.wait_for(|inner| inner.short_status.clone())
    }

    /// Query the long status, blocking up to the configured deadline.
    pub fn get_long_status(&mut self) -> Result<LongStatus, ProtocolError> {
        self.session.lock().long_status = None;
        self.send_command(&Command::Query(QueryKind::LongStatus))?;
        self.wait_for(|inner| inner.long_status.clone())
    }

    /// Query the waveform configuration, blocking up to the configured
    /// deadline.
    pub fn get_waveform(&mut self) -> Result<WaveformConfig, ProtocolError> {
        self.session.lock().waveform = None;
        self.send_command(&Command::Query(QueryKind::Waveform))?;
        self.wait_for(|inner| inner.waveform)
    }

    /// Set pulse amplitudes in % MSO; `b` only matters in twin/dual modes.
    pub fn set_amplitude(&mut self, a: u8, b: Option<u8>) -> Result<(), ProtocolError> {
        self.send_command(&Command::SetAmplitude {
            a,
            b: b.unwrap_or(0),
        })
    }

    /// Arm the stimulator output.
    pub fn enable(&mut self) -> Result<(), ProtocolError> {
        self.send_command(&Command::SetStatus { enabled: true })
    }

    /// Disarm the stimulator output.
    pub fn disable(&mut self) -> Result<(), ProtocolError> {
        self.send_command(&Command::SetStatus { enabled: false })
    }

    /// Fire a single pulse (or pair, depending on mode).
    pub fn trigger(&mut self) -> Result<(), ProtocolError> {
        self.send_command(&Command::Trigger)
    }

    /// Start the configured train sequence.
    pub fn start(&mut self) -> Result<(), ProtocolError> {
        self.send_command(&Command::Start)
    }

    /// Configure train timing. Inputs are quantized to the device tables.
    pub fn set_timing(
        &mut self,
        rate_hz: f64,
        pulses_in_train: u32,
        number_of_trains: u32,
        iti_s: f64,
    ) -> Result<(), ProtocolError> {
        self.send_command(&Command::SetTiming {
            rate_hz,
            pulses_in_train,
            number_of_trains,
            iti_s,
        })
    }

    /// Switch the front-panel page.
    pub fn set_page(&mut self, page: Page) -> Result<(), ProtocolError> {
        self.send_command(&Command::SetPage { page })
    }

    /// Configure external trigger and charge delays, in ms.
    pub fn set_trigger_delays(
        &mut self,
        in_delay_ms: f64,
        out_delay_ms: f64,
        charge_delay_ms: f64,
    ) -> Result<(), ProtocolError> {
        self.send_command(&Command::SetTrigger {
            in_delay_ms,
            out_delay_ms,
            charge_delay_ms,
        })
    }

    /// Configure the pulse waveform.
    pub fn set_waveform(&mut self, options: WaveformOptions) -> Result<(), ProtocolError> {
        self.send_command(&Command::SetWaveform(options))
    }

    /// Cached amplitudes `[A, B]` in % MSO.
    pub fn amplitudes(&self) -> [u8; 2] {
        self.session.lock().device.amplitudes()
    }

    /// Cached coil temperature and coil type.
    pub fn coil_temperature(&self) -> (u8, u8) {
        self.session.lock().device.coil_temperature()
    }

    /// Snapshot of the append-only pulse log.
    pub fn pulse_log(&self) -> Vec<PulseRecord> {
        self.session.lock().device.pulse_log().to_vec()
    }

    /// Block until `extract` yields a response, the deadline passes, or
    /// the session shuts down.
    fn wait_for<T>(
        &self,
        extract: impl Fn(&SessionInner) -> Option<T>,
    ) -> Result<T, ProtocolError> {
        let deadline = Instant::now() + Duration::from_millis(self.config.query_timeout_ms);
        let mut inner = self.session.lock();
        loop {
            if let Some(value) = extract(&inner) {
                return Ok(value);
            }
            if self.session.shutdown.load(Ordering::Acquire) {
                return Err(ProtocolError::Shutdown);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ProtocolError::Timeout);
            }
            let (guard, _timeout) = self
                .session
                .wakeup
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            inner = guard;
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// The inbound half of the session: transport bytes in, decoded state
/// out, waiters notified.
fn listener_loop(mut transport: Box<dyn Transport>, session: Arc<Session>) {
    let mut reassembler = FrameReassembler::new();
    let mut buf = [0u8; 512];
    while !session.shutdown.load(Ordering::Acquire) {
        match transport.read(&mut buf) {
            Ok(0) => thread::sleep(Duration::from_millis(POLL_INTERVAL_MS)),
            Ok(n) => {
                let timestamp = Utc::now();
                let items = reassembler.extend(&buf[..n]);
                let mut inner = session.lock();
                inner.rx_bytes = inner.rx_bytes.saturating_add(n as u64);
                for item in items {
                    match item {
                        Reassembled::Frame { raw, body } => {
                            let decoded = message::decode(&body);
                            inner.rx_frames = inner.rx_frames.saturating_add(1);
                            inner.log.record(timestamp, &raw, &decoded.summary());
                            inner.device.apply(&decoded, timestamp);
                            match decoded {
                                DecodedMessage::ShortStatus(s) => inner.short_status = Some(s),
                                DecodedMessage::LongStatus(s) => inner.long_status = Some(s),
                                DecodedMessage::WaveformConfig(w) => inner.waveform = Some(w),
                                _ => {}
                            }
                        }
                        Reassembled::Garbage { raw } => {
                            let decoded = DecodedMessage::Unrecognized { raw: raw.clone() };
                            inner.log.record(timestamp, &raw, &decoded.summary());
                        }
                    }
                }
                drop(inner);
                session.wakeup.notify_all();
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => {
                // The link is gone; release any waiter with a terminal
                // error instead of letting it ride out the deadline.
                warn!("listener read failed, shutting session down: {e}");
                session.shutdown.store(true, Ordering::Release);
                session.wakeup.notify_all();
                break;
            }
        }
    }
}
