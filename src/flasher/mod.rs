//! Write a set of binaries to a target device
//!
//! The [Flasher] struct owns the lifecycle of a device connection: it
//! requests a transport handle from a [TransportProvider], runs the
//! engine handshake, executes a [WritePlan] entry by entry, hard-resets
//! the device and releases the transport again. At most one session is
//! live at a time; the transport handle is owned exclusively by the
//! session and released on every failure path.

use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use strum::Display;

use crate::error::Error;
use crate::plan::WritePlan;
use crate::progress::{FlashProgress, PlanTracker, ProgressCallbacks};

/// Baud rate used for flashing. The S3's USB-serial converters handle
/// 921600 reliably and it keeps multi-megabyte flashes short.
pub const DEFAULT_BAUD: u32 = 921_600;

/// Bound on waiting for the port to report released after a disconnect,
/// so an immediate reconnect does not observe the port as still busy.
pub const PORT_RELEASE_TIMEOUT: Duration = Duration::from_millis(1500);

/// A serial transport handle, as negotiated by the embedding platform.
pub trait Transport {
    /// Open the port at the given baud rate.
    fn open(&mut self, baud_rate: u32) -> Result<(), Error>;
    /// Close the port.
    fn close(&mut self) -> Result<(), Error>;
    /// Wait (bounded) until the underlying port reports released.
    fn wait_for_release(&mut self, timeout: Duration) -> Result<(), Error>;
}

/// Source of transport handles, typically backed by a user-facing port
/// chooser. May fail with [Error::NoPortSelected] or
/// [Error::PortPermissionDenied] when the user cancels the prompt.
pub trait TransportProvider {
    fn request_handle(&mut self) -> Result<Box<dyn Transport>, Error>;
}

/// Identity of the connected chip, as reported by the engine handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChipDescriptor {
    /// Chip type, e.g. `ESP32-S3`.
    pub chip: String,
    /// MAC address in colon-separated hex.
    pub mac: String,
    /// Feature strings reported by the chip (WiFi, BLE, ...).
    pub features: Vec<String>,
}

/// Supported flash modes
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FlashMode {
    /// Quad I/O (4 pins used for address & data)
    Qio,
    /// Quad Output (4 pins used for data)
    Qout,
    /// Dual I/O (2 pins used for address & data)
    Dio,
    /// Dual Output (2 pins used for data)
    Dout,
}

/// Parameters passed to the engine for every write in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlashParams {
    pub mode: FlashMode,
    /// SPI frequency in MHz.
    pub frequency: u32,
    /// Flash size in bytes, `None` to let the engine auto-detect it.
    pub size: Option<u32>,
    /// Compress data in transit to the stub.
    pub compress: bool,
    /// Erase the entire flash before writing.
    pub erase_all: bool,
}

impl Default for FlashParams {
    /// The fixed parameters used for plan execution: DIO at 80 MHz,
    /// auto-detected size, compression on, no full-chip erase.
    fn default() -> Self {
        FlashParams {
            mode: FlashMode::Dio,
            frequency: 80,
            size: None,
            compress: true,
            erase_all: false,
        }
    }
}

/// The chip-programming engine the session drives.
///
/// Framing, sync, stub upload, compression and checksumming all live
/// behind this boundary; the session only sequences calls to it.
pub trait FlashEngine {
    /// Run the handshake against an opened transport and identify the chip.
    fn connect(&mut self, transport: &mut dyn Transport) -> Result<ChipDescriptor, Error>;

    /// Write one binary at the given offset, reporting per-byte progress.
    fn write_file(
        &mut self,
        transport: &mut dyn Transport,
        offset: u32,
        data: &[u8],
        params: &FlashParams,
        progress: &mut dyn ProgressCallbacks,
    ) -> Result<(), Error>;

    /// Request a hard reset so the device boots the new firmware.
    fn hard_reset(&mut self, transport: &mut dyn Transport) -> Result<(), Error>;
}

/// Lifecycle state of a device session.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Flashing,
    Resetting,
}

/// A device flashing session wrapping an external [FlashEngine].
pub struct Flasher<E: FlashEngine> {
    engine: E,
    transport: Option<Box<dyn Transport>>,
    chip: Option<ChipDescriptor>,
    state: SessionState,
}

impl<E: FlashEngine> Flasher<E> {
    pub fn new(engine: E) -> Self {
        Flasher {
            engine,
            transport: None,
            chip: None,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The chip identified during [Flasher::connect], while connected.
    pub fn chip(&self) -> Option<&ChipDescriptor> {
        self.chip.as_ref()
    }

    /// Request a transport handle, open it and run the engine handshake.
    ///
    /// Any live session is disconnected first, keeping the session count at
    /// one. On any failure the transport is released and the session
    /// returns to [SessionState::Disconnected]; no state leaks a half-open
    /// port.
    pub fn connect(&mut self, provider: &mut dyn TransportProvider) -> Result<ChipDescriptor, Error> {
        if self.state != SessionState::Disconnected {
            self.disconnect();
        }
        self.state = SessionState::Connecting;

        let mut transport = match provider.request_handle() {
            Ok(transport) => transport,
            Err(err) => {
                self.state = SessionState::Disconnected;
                return Err(err);
            }
        };

        if let Err(err) = transport.open(DEFAULT_BAUD) {
            self.release(transport);
            return Err(err);
        }
        debug!("transport opened at {} baud", DEFAULT_BAUD);

        match self.engine.connect(transport.as_mut()) {
            Ok(chip) => {
                info!("connected to {} ({})", chip.chip, chip.mac);
                self.transport = Some(transport);
                self.chip = Some(chip.clone());
                self.state = SessionState::Connected;
                Ok(chip)
            }
            Err(err) => {
                self.release(transport);
                Err(err)
            }
        }
    }

    /// Release the transport and return to [SessionState::Disconnected].
    ///
    /// Idempotent and best-effort: close and release failures are logged
    /// but never surfaced, since the user's next connect attempt will
    /// request a fresh handle regardless.
    pub fn disconnect(&mut self) {
        if let Some(transport) = self.transport.take() {
            self.release(transport);
        } else {
            self.chip = None;
            self.state = SessionState::Disconnected;
        }
    }

    fn release(&mut self, mut transport: Box<dyn Transport>) {
        if let Err(err) = transport.close() {
            warn!("failed to close transport: {err}");
        }
        if let Err(err) = transport.wait_for_release(PORT_RELEASE_TIMEOUT) {
            warn!("port did not report released within {:?}: {err}", PORT_RELEASE_TIMEOUT);
        }
        self.chip = None;
        self.state = SessionState::Disconnected;
    }

    /// Execute a [WritePlan] entry by entry, in plan order.
    ///
    /// The plan's ordering is the caller's contract and is not re-sorted
    /// here. A failing write aborts the remaining entries immediately and
    /// surfaces [Error::FlashWrite]; whatever was already written stays on
    /// the device, which may leave it non-booting until a full flash
    /// succeeds. After the last entry a hard reset is requested; an
    /// unacknowledged reset is logged, not surfaced, since many devices
    /// begin rebooting before the acknowledgment can be observed.
    pub fn execute_write_plan(
        &mut self,
        plan: &WritePlan,
        on_progress: &mut dyn FnMut(FlashProgress),
    ) -> Result<(), Error> {
        if self.state != SessionState::Connected {
            return Err(Error::NotConnected);
        }
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;

        self.state = SessionState::Flashing;
        let params = FlashParams::default();
        let mut tracker = PlanTracker::new(plan.total_bytes(), plan.len(), on_progress);

        info!(
            "flashing {} file(s), {} bytes total",
            plan.len(),
            plan.total_bytes()
        );

        for (index, entry) in plan.entries().iter().enumerate() {
            info!(
                "writing '{}' at {:#x} ({} bytes)",
                entry.filename,
                entry.offset,
                entry.data.len()
            );
            tracker.start_file(index, &entry.filename);

            if let Err(err) = self.engine.write_file(
                transport.as_mut(),
                entry.offset,
                &entry.data,
                &params,
                &mut tracker,
            ) {
                self.state = SessionState::Connected;
                return Err(Error::FlashWrite {
                    filename: entry.filename.clone(),
                    source: Box::new(err),
                });
            }
        }

        self.state = SessionState::Resetting;
        match self.engine.hard_reset(transport.as_mut()) {
            Ok(()) => info!("device reset, booting new firmware"),
            Err(err) => warn!("reset not acknowledged ({err}), device is likely rebooting already"),
        }
        self.state = SessionState::Connected;

        Ok(())
    }
}
