//! Pressure regulation workflows over a simulated terminal.
//!
//! # Acceptance Criteria
//!
//! - Activating a slot writes command word 195 to its command register
//! - Pressure I/O on a slot outside motion app 03 never reaches the bus
//! - Bulk commands stop at the first failing slot without rollback
//! - A disconnected driver makes no transport calls at all

use super::common::{command_addresses, simulated_driver};
use vtem_common::{IndexKind, VtemError};
use vtem_control::{MotionAppStatus, Slots, TerminalTopology};
use vtem_fieldbus::TransportCall;

#[test]
fn test_activate_single_slot() {
    let (mut vtem, terminal) = simulated_driver(TerminalTopology::motion_app_8x2());

    vtem.activate_pressure_regulation(Slots::Single(2)).unwrap();

    assert_eq!(
        terminal.writes(),
        vec![TransportCall::Write {
            address: 40009,
            value: 195
        }]
    );
    assert_eq!(
        vtem.get_motion_app(2).unwrap(),
        MotionAppStatus::PRESSURE_REGULATION
    );
}

#[test]
fn test_get_pressure_reads_status_then_pressure() {
    let (mut vtem, terminal) = simulated_driver(TerminalTopology::motion_app_8x2());
    terminal.set_register(45407, 195);
    terminal.set_register(45409, 1800);

    assert_eq!(vtem.get_pressure(5).unwrap(), 1800);
    assert_eq!(
        terminal.calls(),
        vec![
            TransportCall::Read {
                address: 45407,
                count: 1
            },
            TransportCall::Read {
                address: 45409,
                count: 1
            },
        ]
    );
}

#[test]
fn test_full_regulation_cycle() {
    let topology = TerminalTopology::motion_app_8x2();
    let (mut vtem, terminal) = simulated_driver(topology.clone());

    vtem.activate_pressure_regulation(Slots::All).unwrap();
    let setpoints: Vec<i32> = (0..16).map(|v| 500 + 250 * v).collect();
    vtem.set_all_pressures(&setpoints).unwrap();
    assert_eq!(vtem.get_all_pressures().unwrap(), setpoints);

    vtem.deactivate_pressure_regulation(Slots::All).unwrap();
    for slot in 0..8 {
        assert_eq!(vtem.get_motion_app(slot).unwrap(), MotionAppStatus::IDLE);
    }

    // Idle slots reject pressure I/O before any write
    terminal.clear_calls();
    assert!(matches!(
        vtem.set_pressure(0, 100),
        Err(VtemError::PreconditionFailed { slot: 0, .. })
    ));
    assert!(terminal.writes().is_empty());
    assert_eq!(
        terminal.register(topology.pressure_output_address(0).unwrap()),
        500
    );
}

#[test]
fn test_deactivate_all_aborts_at_failing_slot() {
    let topology = TerminalTopology::motion_app_8x2();
    let (mut vtem, terminal) = simulated_driver(topology.clone());
    vtem.activate_pressure_regulation(Slots::All).unwrap();
    terminal.clear_calls();

    let commands = command_addresses(&topology);
    terminal.fail_at(commands[4]);

    let err = vtem
        .deactivate_pressure_regulation(Slots::All)
        .unwrap_err();
    assert!(matches!(
        err,
        VtemError::BulkAborted {
            kind: IndexKind::Slot,
            index: 4,
            ..
        }
    ));

    let attempted: Vec<u16> = terminal
        .writes()
        .into_iter()
        .map(|call| match call {
            TransportCall::Write { address, value } => {
                assert_eq!(value, 61);
                address
            }
            other => panic!("unexpected call {other:?}"),
        })
        .collect();
    assert_eq!(attempted, commands[..5]);

    for (slot, &address) in commands.iter().enumerate() {
        let expected = if slot < 4 { 61 } else { 195 };
        assert_eq!(terminal.register(address), expected, "slot {slot}");
    }
}

#[test]
fn test_disconnected_driver_touches_nothing() {
    let (mut vtem, terminal) = simulated_driver(TerminalTopology::motion_app_8x2());
    assert!(vtem.disconnect());
    terminal.clear_calls();

    assert_eq!(
        vtem.activate_pressure_regulation(Slots::All),
        Err(VtemError::NotConnected)
    );
    assert_eq!(vtem.get_all_pressures(), Err(VtemError::NotConnected));
    assert_eq!(vtem.set_pressure(3, 10), Err(VtemError::NotConnected));
    assert!(terminal.calls().is_empty());

    vtem.connect().unwrap();
    vtem.activate_pressure_regulation(Slots::Single(1)).unwrap();
}

#[test]
fn test_bulk_size_mismatch_writes_nothing() {
    let (mut vtem, terminal) = simulated_driver(TerminalTopology::motion_app_8x2());
    vtem.activate_pressure_regulation(Slots::All).unwrap();
    terminal.clear_calls();

    for len in [0, 1, 15, 17] {
        assert_eq!(
            vtem.set_all_pressures(&vec![100; len]),
            Err(VtemError::SizeMismatch {
                expected: 16,
                actual: len
            })
        );
    }
    assert!(terminal.calls().is_empty());
}

#[test]
fn test_independent_terminal_workflow() {
    let topology = TerminalTopology::independent_16();
    let (mut vtem, terminal) = simulated_driver(topology.clone());

    // No motion app switch needed before pressure I/O
    vtem.set_pressure(9, 3300).unwrap();
    assert_eq!(vtem.get_pressure(9).unwrap(), 3300);
    assert_eq!(
        terminal.calls(),
        vec![
            TransportCall::Write {
                address: topology.pressure_output_address(9).unwrap(),
                value: 3300
            },
            TransportCall::Read {
                address: topology.pressure_input_address(9).unwrap(),
                count: 1
            },
        ]
    );

    // Motion app commands still work per slot
    vtem.activate_pressure_regulation(Slots::Single(15)).unwrap();
    assert_eq!(
        vtem.get_motion_app(15).unwrap(),
        MotionAppStatus::PRESSURE_REGULATION
    );
}
