//! End-to-end tests over Modbus TCP.
//!
//! The driver talks to `MockModbusServer` on 127.0.0.1, laid out like a
//! real terminal: commands are reflected into status words and setpoints
//! into actual-pressure registers.

use super::common::{command_addresses, mock_terminal, tcp_driver};
use super::mock_modbus_server::MockBehavior;
use vtem_common::{IndexKind, VtemError};
use vtem_control::{MotionAppStatus, Slots, TerminalTopology};

#[test]
fn test_activate_writes_command_word_over_tcp() {
    let topology = TerminalTopology::motion_app_8x2();
    let server = mock_terminal(&topology);
    let mut vtem = tcp_driver(&server, topology);

    vtem.activate_pressure_regulation(Slots::Single(2)).unwrap();

    assert_eq!(server.writes(), vec![(40009, 195)]);
    assert_eq!(server.register(45407), 195);
    assert_eq!(
        vtem.get_motion_app(2).unwrap(),
        MotionAppStatus::PRESSURE_REGULATION
    );

    drop(vtem);
    server.stop();
}

#[test]
fn test_pressure_round_trip_over_tcp() {
    let topology = TerminalTopology::motion_app_8x2();
    let server = mock_terminal(&topology);
    let mut vtem = tcp_driver(&server, topology);

    vtem.activate_pressure_regulation(Slots::All).unwrap();
    vtem.set_pressure(5, 2500).unwrap();
    assert_eq!(server.register(40011), 2500);
    assert_eq!(vtem.get_pressure(5).unwrap(), 2500);

    let setpoints: Vec<i32> = (0..16).map(|v| 64_000 + v).collect();
    vtem.set_all_pressures(&setpoints).unwrap();
    assert_eq!(vtem.get_all_pressures().unwrap(), setpoints);

    drop(vtem);
    server.stop();
}

#[test]
fn test_deactivate_all_writes_in_slot_order() {
    let topology = TerminalTopology::motion_app_8x2();
    let server = mock_terminal(&topology);
    let commands = command_addresses(&topology);
    let mut vtem = tcp_driver(&server, topology);

    vtem.deactivate_pressure_regulation(Slots::All).unwrap();

    let expected: Vec<(u16, u16)> = commands.iter().map(|&a| (a, 61)).collect();
    assert_eq!(server.writes(), expected);

    drop(vtem);
    server.stop();
}

#[test]
fn test_guard_blocks_setpoint_over_tcp() {
    let topology = TerminalTopology::motion_app_8x2();
    let server = mock_terminal(&topology);
    let mut vtem = tcp_driver(&server, topology);

    assert!(matches!(
        vtem.set_pressure(7, 900),
        Err(VtemError::PreconditionFailed {
            slot: 3,
            actual_id: 61,
            ..
        })
    ));
    assert!(server.writes().is_empty());

    drop(vtem);
    server.stop();
}

#[test]
fn test_server_exception_aborts_bulk_read() {
    let topology = TerminalTopology::motion_app_8x2();
    let server = mock_terminal(&topology);
    let mut vtem = tcp_driver(&server, topology);
    vtem.activate_pressure_regulation(Slots::All).unwrap();

    server.set_behavior(MockBehavior::Exception(0x04));
    let err = vtem.get_all_pressures().unwrap_err();
    assert!(matches!(
        err,
        VtemError::BulkAborted {
            kind: IndexKind::Valve,
            index: 0,
            ..
        }
    ));
    match err.root_cause() {
        VtemError::Transport(message) => assert!(message.contains("exception")),
        other => panic!("unexpected root cause {other:?}"),
    }

    server.set_behavior(MockBehavior::Normal);
    assert_eq!(vtem.get_all_pressures().unwrap().len(), 16);

    drop(vtem);
    server.stop();
}

#[test]
fn test_reconnect_after_dropped_connection() {
    let topology = TerminalTopology::motion_app_8x2();
    let server = mock_terminal(&topology);
    let mut vtem = tcp_driver(&server, topology);

    server.set_behavior(MockBehavior::DropConnection);
    assert!(matches!(
        vtem.get_motion_app(0),
        Err(VtemError::Transport(_))
    ));

    // No automatic reconnect: the caller cycles the connection
    server.set_behavior(MockBehavior::Normal);
    assert!(matches!(
        vtem.get_motion_app(0),
        Err(VtemError::Transport(_))
    ));
    assert!(vtem.disconnect());
    vtem.connect().unwrap();
    assert_eq!(vtem.get_motion_app(0).unwrap(), MotionAppStatus::IDLE);

    drop(vtem);
    server.stop();
}
