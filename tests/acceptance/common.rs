//! Common utilities for acceptance tests.
//!
//! Provides helpers for:
//! - Building drivers over a simulated terminal
//! - Wiring a mock Modbus TCP server to behave like a terminal

#![allow(dead_code)]

use super::mock_modbus_server::{MockBehavior, MockModbusServer};
use std::time::Duration;
use vtem_control::{simulated_terminal, MotionAppStatus, TerminalTopology, VtemControl};
use vtem_fieldbus::{ModbusTcpConfig, ModbusTcpTransport, SimulatedTransport};

/// Connected driver over a simulated terminal, plus a handle to the terminal.
pub fn simulated_driver(
    topology: TerminalTopology,
) -> (VtemControl<SimulatedTransport>, SimulatedTransport) {
    let terminal = simulated_terminal(&topology).unwrap();
    let mut vtem = VtemControl::new(terminal.clone(), topology);
    vtem.connect().unwrap();
    terminal.clear_calls();
    (vtem, terminal)
}

/// Start a mock server laid out like an idle terminal of `topology`.
pub fn mock_terminal(topology: &TerminalTopology) -> MockModbusServer {
    let server = MockModbusServer::start(MockBehavior::Normal).unwrap();
    for slot in 0..topology.slot_count() {
        let status = topology.status_address(slot).unwrap();
        server.mirror(topology.command_address(slot).unwrap(), status);
        server.set_register(status, MotionAppStatus::IDLE.encode());
        for valve in topology.valves_of(slot).unwrap() {
            server.mirror(
                topology.pressure_output_address(valve).unwrap(),
                topology.pressure_input_address(valve).unwrap(),
            );
        }
    }
    server
}

/// Connected driver talking Modbus TCP to `server`.
pub fn tcp_driver(
    server: &MockModbusServer,
    topology: TerminalTopology,
) -> VtemControl<ModbusTcpTransport> {
    let transport = ModbusTcpTransport::new(ModbusTcpConfig {
        server_addr: server.local_addr().to_string(),
        unit_id: 1,
        connect_timeout: Duration::from_secs(2),
        io_timeout: Duration::from_millis(500),
    });
    let mut vtem = VtemControl::new(transport, topology);
    vtem.connect().unwrap();
    vtem
}

/// Command addresses of every slot, in slot order.
pub fn command_addresses(topology: &TerminalTopology) -> Vec<u16> {
    (0..topology.slot_count())
        .map(|slot| topology.command_address(slot).unwrap())
        .collect()
}
