//! Workspace-level acceptance tests for the VTEM driver.

#[path = "../../crates/vtem-fieldbus/tests/mock_modbus_server.rs"]
mod mock_modbus_server;

mod common;
mod config_test;
mod modbus_tcp_test;
mod workflow_test;
