//! Valve control facade.
//!
//! [`VtemControl`] owns one transport and one topology and exposes the
//! domain operations: switching motion apps, and reading and writing
//! pressures. It never retries and never reconnects on its own; every
//! failure is returned to the caller as-is.

use crate::codec::MotionAppStatus;
use crate::guard;
use crate::topology::TerminalTopology;
use tracing::{debug, info, warn};
use vtem_common::{IndexKind, VtemError, VtemResult};
use vtem_fieldbus::RegisterTransport;

/// Slot selection for motion app commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Slots {
    /// Every slot, in increasing order.
    #[default]
    All,
    /// One slot.
    Single(usize),
}

impl From<usize> for Slots {
    fn from(slot: usize) -> Self {
        Self::Single(slot)
    }
}

impl From<Option<usize>> for Slots {
    fn from(slot: Option<usize>) -> Self {
        slot.map_or(Self::All, Self::Single)
    }
}

/// Driver for one valve terminal.
///
/// Not internally synchronized: share it between threads behind a mutex.
pub struct VtemControl<T: RegisterTransport> {
    transport: T,
    topology: TerminalTopology,
    connected: bool,
    /// Scratch space for bulk pressure reads, one register per valve.
    pressure_buffer: Vec<u16>,
}

impl<T: RegisterTransport> VtemControl<T> {
    /// Create a disconnected driver.
    pub fn new(transport: T, topology: TerminalTopology) -> Self {
        let pressure_buffer = vec![0; topology.valve_count()];
        Self {
            transport,
            topology,
            connected: false,
            pressure_buffer,
        }
    }

    /// Terminal layout.
    pub fn topology(&self) -> &TerminalTopology {
        &self.topology
    }

    /// Total number of valves.
    pub fn valve_count(&self) -> usize {
        self.topology.valve_count()
    }

    /// Whether [`connect`](Self::connect) succeeded and no disconnect followed.
    ///
    /// This is the driver's own flag, not a liveness check: a transport that
    /// dropped its link leaves it set until [`disconnect`](Self::disconnect).
    /// Use `transport().is_open()` to see whether the link is still up.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Open the connection. Does nothing if already connected.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the connection cannot be opened; the
    /// driver stays disconnected.
    pub fn connect(&mut self) -> VtemResult<()> {
        if self.connected {
            return Ok(());
        }
        match self.transport.connect() {
            Ok(()) => {
                self.connected = true;
                info!(
                    slots = self.topology.slot_count(),
                    valves = self.topology.valve_count(),
                    "Connected to valve terminal"
                );
                Ok(())
            }
            Err(e) => {
                self.connected = false;
                warn!(error = %e, "Connection to valve terminal failed");
                Err(e)
            }
        }
    }

    /// Close the connection.
    ///
    /// Returns `false` if the driver was already disconnected.
    pub fn disconnect(&mut self) -> bool {
        if !self.connected {
            return false;
        }
        self.transport.close();
        self.connected = false;
        info!("Disconnected from valve terminal");
        true
    }

    /// Fail with [`VtemError::NotConnected`] unless connected.
    ///
    /// # Errors
    ///
    /// Returns [`VtemError::NotConnected`] while disconnected.
    pub fn ensure_connection(&self) -> VtemResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(VtemError::NotConnected)
        }
    }

    /// Read the motion app currently running in `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`VtemError::NotConnected`], [`VtemError::InvalidIndex`] for an
    /// unknown slot, or the transport error of the status read.
    pub fn get_motion_app(&mut self, slot: usize) -> VtemResult<MotionAppStatus> {
        self.ensure_connection()?;
        guard::read_status(&mut self.transport, &self.topology, slot)
    }

    /// Fail with [`VtemError::PreconditionFailed`] unless `slot` runs
    /// `motion_app_id` (and, where the topology tracks it, `valve_state`).
    ///
    /// # Errors
    ///
    /// Returns [`VtemError::PreconditionFailed`] on a mismatch,
    /// [`VtemError::InvalidMotionApp`] for out-of-range fields, and the errors
    /// of [`get_motion_app`](Self::get_motion_app).
    pub fn ensure_motion_app(
        &mut self,
        slot: usize,
        motion_app_id: u8,
        valve_state: u8,
    ) -> VtemResult<()> {
        self.ensure_connection()?;
        let required = MotionAppStatus::new(motion_app_id, valve_state)?;
        guard::ensure_motion_app(&mut self.transport, &self.topology, slot, required)
    }

    /// Write a motion app command to one or all slots.
    ///
    /// With [`Slots::All`] the slots are written in increasing order and the
    /// first failure stops the loop. Slots already written stay written.
    ///
    /// # Errors
    ///
    /// Returns [`VtemError::NotConnected`], [`VtemError::InvalidMotionApp`] or
    /// [`VtemError::InvalidIndex`] before any write, the transport error of a
    /// single-slot write, or [`VtemError::BulkAborted`] naming the failing slot.
    pub fn set_motion_app(
        &mut self,
        slots: Slots,
        motion_app_id: u8,
        valve_state: u8,
    ) -> VtemResult<()> {
        self.ensure_connection()?;
        let command = MotionAppStatus::new(motion_app_id, valve_state)?;

        match slots {
            Slots::Single(slot) => self.write_command(slot, command),
            Slots::All => {
                for slot in 0..self.topology.slot_count() {
                    self.write_command(slot, command)
                        .map_err(|e| VtemError::bulk(IndexKind::Slot, slot, e))?;
                }
                Ok(())
            }
        }
    }

    /// Switch to pressure regulation (motion app 3, both valves active).
    ///
    /// # Errors
    ///
    /// Same as [`set_motion_app`](Self::set_motion_app).
    pub fn activate_pressure_regulation(&mut self, slots: Slots) -> VtemResult<()> {
        let target = MotionAppStatus::PRESSURE_REGULATION;
        self.set_motion_app(slots, target.motion_app_id(), target.valve_state())?;
        info!(?slots, "Pressure regulation activated");
        Ok(())
    }

    /// Return to the idle motion app (61, valves inactive).
    ///
    /// # Errors
    ///
    /// Same as [`set_motion_app`](Self::set_motion_app).
    pub fn deactivate_pressure_regulation(&mut self, slots: Slots) -> VtemResult<()> {
        let target = MotionAppStatus::IDLE;
        self.set_motion_app(slots, target.motion_app_id(), target.valve_state())?;
        info!(?slots, "Pressure regulation deactivated");
        Ok(())
    }

    /// Read the actual pressure of `valve`.
    ///
    /// # Errors
    ///
    /// Returns [`VtemError::NotConnected`], [`VtemError::InvalidIndex`],
    /// [`VtemError::PreconditionFailed`] when the valve's slot is not regulating,
    /// or the transport error of either read.
    pub fn get_pressure(&mut self, valve: usize) -> VtemResult<i32> {
        self.ensure_connection()?;
        self.read_pressure(valve).map(i32::from)
    }

    /// Write the pressure setpoint of `valve`.
    ///
    /// # Errors
    ///
    /// Returns [`VtemError::PressureOutOfRange`] before any I/O, otherwise the
    /// errors of [`get_pressure`](Self::get_pressure) for the guard and write.
    pub fn set_pressure(&mut self, valve: usize, value: i32) -> VtemResult<()> {
        self.ensure_connection()?;
        let register = Self::setpoint_register(value)?;
        self.write_pressure(valve, register)
    }

    /// Read the actual pressure of every valve, in valve order.
    ///
    /// Each valve is guarded and read in its own transaction; the first
    /// failure aborts the whole read.
    ///
    /// # Errors
    ///
    /// Returns [`VtemError::NotConnected`], or [`VtemError::BulkAborted`]
    /// naming the first valve whose guard or read failed.
    pub fn get_all_pressures(&mut self) -> VtemResult<Vec<i32>> {
        self.ensure_connection()?;
        for valve in 0..self.topology.valve_count() {
            let register = self
                .read_pressure(valve)
                .map_err(|e| VtemError::bulk(IndexKind::Valve, valve, e))?;
            self.pressure_buffer[valve] = register;
        }
        Ok(self.pressure_buffer.iter().map(|&r| i32::from(r)).collect())
    }

    /// Write a setpoint to every valve, in valve order.
    ///
    /// `pressures` must hold exactly one value per valve and every value
    /// must fit a setpoint register; otherwise nothing is written. Once
    /// writing starts, the first failure stops it without rolling back.
    ///
    /// # Errors
    ///
    /// Returns [`VtemError::NotConnected`], [`VtemError::SizeMismatch`] or
    /// [`VtemError::PressureOutOfRange`] with nothing written, or
    /// [`VtemError::BulkAborted`] naming the first valve that failed.
    pub fn set_all_pressures(&mut self, pressures: &[i32]) -> VtemResult<()> {
        self.ensure_connection()?;
        let expected = self.topology.valve_count();
        if pressures.len() != expected {
            return Err(VtemError::SizeMismatch {
                expected,
                actual: pressures.len(),
            });
        }
        let registers = pressures
            .iter()
            .map(|&p| Self::setpoint_register(p))
            .collect::<VtemResult<Vec<u16>>>()?;

        for (valve, register) in registers.into_iter().enumerate() {
            self.write_pressure(valve, register)
                .map_err(|e| VtemError::bulk(IndexKind::Valve, valve, e))?;
        }
        Ok(())
    }

    fn write_command(&mut self, slot: usize, command: MotionAppStatus) -> VtemResult<()> {
        let address = self.topology.command_address(slot)?;
        let word = command.encode();
        debug!(slot, address, word, %command, "Writing motion app command");
        self.transport.write_register(address, word)
    }

    fn read_pressure(&mut self, valve: usize) -> VtemResult<u16> {
        let location = self.topology.locate(valve)?;
        guard::ensure_pressure_ready(&mut self.transport, &self.topology, location.slot)?;

        let address = self.topology.pressure_input_address(valve)?;
        let mut register = [0u16; 1];
        self.transport.read_registers(address, &mut register)?;
        debug!(valve, address, pressure = register[0], "Read actual pressure");
        Ok(register[0])
    }

    fn write_pressure(&mut self, valve: usize, register: u16) -> VtemResult<()> {
        let location = self.topology.locate(valve)?;
        guard::ensure_pressure_ready(&mut self.transport, &self.topology, location.slot)?;

        let address = self.topology.pressure_output_address(valve)?;
        debug!(valve, address, pressure = register, "Writing pressure setpoint");
        self.transport.write_register(address, register)
    }

    fn setpoint_register(value: i32) -> VtemResult<u16> {
        u16::try_from(value).map_err(|_| VtemError::PressureOutOfRange(value))
    }
}

impl<T: RegisterTransport> Drop for VtemControl<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
