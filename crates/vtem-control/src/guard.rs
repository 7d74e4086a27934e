//! Motion-app guard.
//!
//! Every check performs a fresh status read. The terminal's motion app can
//! be changed by another controller or dropped by a terminal-side fault at
//! any time, so a status word is never reused across calls.

use crate::codec::MotionAppStatus;
use crate::topology::TerminalTopology;
use tracing::{trace, warn};
use vtem_common::{GuardPolicy, VtemError, VtemResult};
use vtem_fieldbus::RegisterTransport;

/// Read and decode the status word of `slot`.
///
/// # Errors
///
/// Returns [`VtemError::InvalidIndex`] for an unknown slot or the transport
/// error of the read.
pub fn read_status<T: RegisterTransport + ?Sized>(
    transport: &mut T,
    topology: &TerminalTopology,
    slot: usize,
) -> VtemResult<MotionAppStatus> {
    let address = topology.status_address(slot)?;
    let mut word = [0u16; 1];
    transport.read_registers(address, &mut word)?;
    let status = MotionAppStatus::decode(word[0]);
    trace!(slot, address, word = word[0], %status, "Read slot status");
    Ok(status)
}

/// Compare a status read from the terminal against the required one.
///
/// The motion app id must always match; the valve state only matters under
/// [`GuardPolicy::MotionAppAndValveState`].
///
/// # Errors
///
/// Returns [`VtemError::PreconditionFailed`] when the policy's fields differ.
pub fn check_status(
    policy: GuardPolicy,
    slot: usize,
    required: MotionAppStatus,
    actual: MotionAppStatus,
) -> VtemResult<()> {
    let id_matches = actual.motion_app_id() == required.motion_app_id();
    let state_matches = policy != GuardPolicy::MotionAppAndValveState
        || actual.valve_state() == required.valve_state();

    if id_matches && state_matches {
        return Ok(());
    }

    warn!(slot, %required, %actual, "Motion app precondition failed");
    Err(VtemError::PreconditionFailed {
        slot,
        expected_id: required.motion_app_id(),
        expected_state: required.valve_state(),
        actual_id: actual.motion_app_id(),
        actual_state: actual.valve_state(),
    })
}

/// Read the status of `slot` and check it against `required`.
///
/// # Errors
///
/// Returns the errors of [`read_status`] and [`check_status`].
pub fn ensure_motion_app<T: RegisterTransport + ?Sized>(
    transport: &mut T,
    topology: &TerminalTopology,
    slot: usize,
    required: MotionAppStatus,
) -> VtemResult<()> {
    let actual = read_status(transport, topology, slot)?;
    check_status(topology.guard_policy(), slot, required, actual)
}

/// Run whatever check the topology's policy requires before pressure I/O
/// on a valve in `slot`.
///
/// # Errors
///
/// Returns the errors of [`ensure_motion_app`] unless the policy is
/// [`GuardPolicy::ConnectionOnly`].
pub fn ensure_pressure_ready<T: RegisterTransport + ?Sized>(
    transport: &mut T,
    topology: &TerminalTopology,
    slot: usize,
) -> VtemResult<()> {
    match topology.guard_policy() {
        GuardPolicy::ConnectionOnly => Ok(()),
        GuardPolicy::MotionApp | GuardPolicy::MotionAppAndValveState => {
            ensure_motion_app(transport, topology, slot, MotionAppStatus::PRESSURE_REGULATION)
        }
    }
}
