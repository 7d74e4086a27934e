//! Simulated valve terminal.
//!
//! Wires a [`SimulatedTransport`] so it behaves like an idle terminal of the
//! given topology: every slot starts in the idle motion app, command words
//! show up in the slot's status word, and setpoints show up as the valve's
//! actual pressure.

use crate::codec::MotionAppStatus;
use crate::topology::TerminalTopology;
use tracing::debug;
use vtem_common::VtemResult;
use vtem_fieldbus::SimulatedTransport;

/// Build a simulated terminal laid out as `topology`.
///
/// # Errors
///
/// Returns [`vtem_common::VtemError::InvalidTopology`] if a register of
/// `topology` cannot be addressed.
pub fn simulated_terminal(topology: &TerminalTopology) -> VtemResult<SimulatedTransport> {
    let terminal = SimulatedTransport::new();
    let idle = MotionAppStatus::IDLE.encode();

    for slot in 0..topology.slot_count() {
        let status = topology.status_address(slot)?;
        terminal.mirror(topology.command_address(slot)?, status);
        terminal.set_register(status, idle);

        for valve in topology.valves_of(slot)? {
            terminal.mirror(
                topology.pressure_output_address(valve)?,
                topology.pressure_input_address(valve)?,
            );
        }
    }

    debug!(
        slots = topology.slot_count(),
        valves = topology.valve_count(),
        "Simulated terminal ready"
    );
    Ok(terminal)
}
