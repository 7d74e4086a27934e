//! Slot/valve index to register address mapping.
//!
//! All functions are pure: the same index and topology always give the
//! same address. Out-of-range indices are rejected, never clamped.

use crate::topology::TerminalTopology;
use vtem_common::{IndexKind, VtemError, VtemResult};

/// Position of a valve on the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValveLocation {
    /// Slot holding the valve.
    pub slot: usize,
    /// Valve position within the slot.
    pub remainder: usize,
}

impl TerminalTopology {
    /// Fail with [`VtemError::InvalidIndex`] unless `slot` exists.
    ///
    /// # Errors
    ///
    /// Returns [`VtemError::InvalidIndex`] if `slot` is not below the slot count.
    pub fn check_slot(&self, slot: usize) -> VtemResult<()> {
        if slot < self.slot_count() {
            Ok(())
        } else {
            Err(VtemError::InvalidIndex {
                kind: IndexKind::Slot,
                index: slot,
                limit: self.slot_count(),
            })
        }
    }

    /// Split a terminal-wide valve index into slot and position in slot.
    ///
    /// # Errors
    ///
    /// Returns [`VtemError::InvalidIndex`] if `valve` is not below the valve count.
    pub fn locate(&self, valve: usize) -> VtemResult<ValveLocation> {
        if valve >= self.valve_count() {
            return Err(VtemError::InvalidIndex {
                kind: IndexKind::Valve,
                index: valve,
                limit: self.valve_count(),
            });
        }
        Ok(ValveLocation {
            slot: valve / self.valves_per_slot(),
            remainder: valve % self.valves_per_slot(),
        })
    }

    /// Valve indices belonging to `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`VtemError::InvalidIndex`] if `slot` does not exist.
    pub fn valves_of(&self, slot: usize) -> VtemResult<std::ops::Range<usize>> {
        self.check_slot(slot)?;
        let first = slot * self.valves_per_slot();
        Ok(first..first + self.valves_per_slot())
    }

    /// Status word of `slot` in the input map.
    ///
    /// # Errors
    ///
    /// Returns [`VtemError::InvalidIndex`] if `slot` does not exist.
    pub fn status_address(&self, slot: usize) -> VtemResult<u16> {
        self.check_slot(slot)?;
        Self::map_address(
            self.input_base_address(),
            self.status_register_offset(),
            self.input_slot_stride(),
            slot,
            0,
        )
    }

    /// Command word of `slot` in the output map.
    ///
    /// # Errors
    ///
    /// Returns [`VtemError::InvalidIndex`] if `slot` does not exist.
    pub fn command_address(&self, slot: usize) -> VtemResult<u16> {
        self.check_slot(slot)?;
        Self::map_address(
            self.output_base_address(),
            self.command_register_offset(),
            self.output_slot_stride(),
            slot,
            0,
        )
    }

    /// Actual-pressure word of `valve` in the input map.
    ///
    /// # Errors
    ///
    /// Returns [`VtemError::InvalidIndex`] if `valve` does not exist.
    pub fn pressure_input_address(&self, valve: usize) -> VtemResult<u16> {
        let location = self.locate(valve)?;
        Self::map_address(
            self.input_base_address(),
            self.status_register_offset(),
            self.input_slot_stride(),
            location.slot,
            self.pressure_register_offsets()[location.remainder],
        )
    }

    /// Setpoint word of `valve` in the output map.
    ///
    /// # Errors
    ///
    /// Returns [`VtemError::InvalidIndex`] if `valve` does not exist.
    pub fn pressure_output_address(&self, valve: usize) -> VtemResult<u16> {
        let location = self.locate(valve)?;
        Self::map_address(
            self.output_base_address(),
            self.command_register_offset(),
            self.output_slot_stride(),
            location.slot,
            self.pressure_register_offsets()[location.remainder],
        )
    }

    fn map_address(
        base: u16,
        offset: u16,
        stride: u16,
        slot: usize,
        register: u16,
    ) -> VtemResult<u16> {
        let address = u64::from(base)
            + u64::from(offset)
            + u64::from(stride) * slot as u64
            + u64::from(register);
        // Validation at construction keeps every in-range index addressable
        u16::try_from(address).map_err(|_| {
            VtemError::InvalidTopology(format!("register {address} beyond 65535"))
        })
    }
}
