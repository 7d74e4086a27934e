//! Register transports for the valve terminal.
//!
//! This crate provides:
//! - [`RegisterTransport`] trait, the only surface the control core talks to
//! - [`modbus`] module with a blocking Modbus TCP client
//! - [`simulated`] module with an in-memory register map for tests and dry runs

pub mod modbus;
pub mod simulated;

pub use modbus::*;
pub use simulated::*;

use vtem_common::VtemResult;

/// Raw register access to a terminal.
///
/// Implementations perform exactly one request/response exchange per call
/// and report any failure as [`vtem_common::VtemError::Transport`]. They
/// never retry. Timeouts are the implementation's concern.
pub trait RegisterTransport: Send {
    /// Open the connection.
    fn connect(&mut self) -> VtemResult<()>;

    /// Close the connection. Closing a closed transport does nothing.
    fn close(&mut self);

    /// Whether a connection is currently open.
    fn is_open(&self) -> bool;

    /// Read `out.len()` consecutive registers starting at `address`.
    fn read_registers(&mut self, address: u16, out: &mut [u16]) -> VtemResult<()>;

    /// Write one register.
    fn write_register(&mut self, address: u16, value: u16) -> VtemResult<()>;

    /// Write consecutive registers starting at `address` in one transaction.
    fn write_registers(&mut self, address: u16, values: &[u16]) -> VtemResult<()>;
}

impl<T: RegisterTransport + ?Sized> RegisterTransport for Box<T> {
    fn connect(&mut self) -> VtemResult<()> {
        (**self).connect()
    }

    fn close(&mut self) {
        (**self).close();
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn read_registers(&mut self, address: u16, out: &mut [u16]) -> VtemResult<()> {
        (**self).read_registers(address, out)
    }

    fn write_register(&mut self, address: u16, value: u16) -> VtemResult<()> {
        (**self).write_register(address, value)
    }

    fn write_registers(&mut self, address: u16, values: &[u16]) -> VtemResult<()> {
        (**self).write_registers(address, values)
    }
}
