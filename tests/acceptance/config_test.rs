//! Configuration-driven driver construction.
//!
//! A TOML file selects the transport and the terminal layout; the driver
//! built from it must address registers exactly as the file describes.

use super::common::simulated_driver;
use std::time::Duration;
use vtem_common::{DriverConfig, GuardPolicy, TransportKind, VtemError};
use vtem_control::{Slots, TerminalTopology};
use vtem_fieldbus::{ModbusTcpConfig, TransportCall};

#[test]
fn test_config_file_selects_independent_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vtem.toml");
    std::fs::write(
        &path,
        r#"
[transport]
kind = "simulated"
io_timeout = "250ms"

[topology]
preset = "independent_16"
"#,
    )
    .unwrap();

    let config = DriverConfig::from_file(&path).unwrap();
    assert_eq!(config.transport.kind, TransportKind::Simulated);
    assert_eq!(config.transport.io_timeout, Duration::from_millis(250));

    let topology = TerminalTopology::from_config(&config.topology).unwrap();
    assert_eq!(topology, TerminalTopology::independent_16());
}

#[test]
fn test_custom_layout_from_toml() {
    let config = DriverConfig::from_toml(
        r#"
[topology]
preset = "motion_app_8x2"
slot_count = 4
guard_policy = "motion_app"
"#,
    )
    .unwrap();
    let topology = TerminalTopology::from_config(&config.topology).unwrap();
    assert_eq!(topology.valve_count(), 8);
    assert_eq!(topology.guard_policy(), GuardPolicy::MotionApp);

    let (mut vtem, terminal) = simulated_driver(topology);
    vtem.deactivate_pressure_regulation(Slots::All).unwrap();
    assert_eq!(terminal.writes().len(), 4);

    // Valve state is not checked under this policy
    terminal.set_register(45395, 0b01_000011);
    terminal.clear_calls();
    vtem.set_pressure(1, 42).unwrap();
    assert_eq!(
        terminal.writes(),
        vec![TransportCall::Write {
            address: 40005,
            value: 42
        }]
    );
    assert!(matches!(
        vtem.get_pressure(8),
        Err(VtemError::InvalidIndex { limit: 8, .. })
    ));
}

#[test]
fn test_invalid_layout_rejected() {
    let config = DriverConfig::from_toml(
        r#"
[topology]
valves_per_slot = 3
"#,
    )
    .unwrap();
    assert!(matches!(
        TerminalTopology::from_config(&config.topology),
        Err(VtemError::InvalidTopology(_))
    ));
}

#[test]
fn test_transport_settings_flow_into_modbus_config() {
    let config = DriverConfig::from_toml(
        r#"
[transport]
host = "vtem.local"
port = 5020
unit_id = 7
connect_timeout = "2s"
"#,
    )
    .unwrap();

    let modbus = ModbusTcpConfig::from(&config.transport);
    assert_eq!(modbus.server_addr, "vtem.local:5020");
    assert_eq!(modbus.unit_id, 7);
    assert_eq!(modbus.connect_timeout, Duration::from_secs(2));
    assert_eq!(modbus.io_timeout, Duration::from_secs(1));
}
