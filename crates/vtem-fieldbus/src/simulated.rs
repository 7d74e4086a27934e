//! In-memory register transport.
//!
//! [`SimulatedTransport`] keeps a sparse register map behind a shared handle,
//! so a test can hand one clone to the driver and keep another to inspect
//! the recorded calls, change registers behind the driver's back, or inject
//! faults at specific addresses.

use crate::RegisterTransport;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;
use vtem_common::{VtemError, VtemResult};

/// One call made through the transport, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    /// `connect()`.
    Connect,
    /// `close()`.
    Close,
    /// `read_registers()`.
    Read {
        /// First register.
        address: u16,
        /// Number of registers.
        count: usize,
    },
    /// `write_register()`.
    Write {
        /// Register written.
        address: u16,
        /// Value written.
        value: u16,
    },
    /// `write_registers()`.
    WriteMany {
        /// First register.
        address: u16,
        /// Values written.
        values: Vec<u16>,
    },
}

impl TransportCall {
    /// Whether this call writes registers.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Write { .. } | Self::WriteMany { .. })
    }
}

#[derive(Debug, Default)]
struct SimulatedState {
    open: bool,
    registers: BTreeMap<u16, u16>,
    /// Output register -> input register that mirrors it.
    mirrors: BTreeMap<u16, u16>,
    faulty: BTreeSet<u16>,
    fail_connect: bool,
    calls: Vec<TransportCall>,
}

impl SimulatedState {
    fn check(&self, first: u16, count: usize) -> VtemResult<()> {
        if !self.open {
            return Err(VtemError::Transport("simulated transport is closed".into()));
        }
        let last = usize::from(first) + count;
        if last > usize::from(u16::MAX) + 1 {
            return Err(VtemError::Transport(format!(
                "{count} registers at {first} exceed the address space"
            )));
        }
        if let Some(address) = self.faulty.range(first..).next().filter(|&&a| usize::from(a) < last) {
            return Err(VtemError::Transport(format!(
                "injected fault at register {address}"
            )));
        }
        Ok(())
    }

    fn store(&mut self, address: u16, value: u16) {
        self.registers.insert(address, value);
        if let Some(&input) = self.mirrors.get(&address) {
            self.registers.insert(input, value);
        }
    }
}

/// Shared-handle, in-memory register transport.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTransport {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedTransport {
    /// Create an empty simulated terminal; all registers read as zero.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make writes to `output` also appear at `input`, as the terminal
    /// reflects commands and setpoints into its status image.
    pub fn mirror(&self, output: u16, input: u16) {
        self.lock().mirrors.insert(output, input);
    }

    /// Set a register directly, bypassing the call log and mirrors.
    pub fn set_register(&self, address: u16, value: u16) {
        self.lock().registers.insert(address, value);
    }

    /// Current value of a register.
    pub fn register(&self, address: u16) -> u16 {
        self.lock().registers.get(&address).copied().unwrap_or(0)
    }

    /// Make every read or write touching `address` fail.
    pub fn fail_at(&self, address: u16) {
        self.lock().faulty.insert(address);
    }

    /// Make `connect()` fail (or succeed again).
    pub fn fail_connect(&self, fail: bool) {
        self.lock().fail_connect = fail;
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        let mut state = self.lock();
        state.faulty.clear();
        state.fail_connect = false;
    }

    /// Calls recorded so far.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.lock().calls.clone()
    }

    /// Recorded write calls only.
    pub fn writes(&self) -> Vec<TransportCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_write())
            .cloned()
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

impl RegisterTransport for SimulatedTransport {
    fn connect(&mut self) -> VtemResult<()> {
        let mut state = self.lock();
        state.calls.push(TransportCall::Connect);
        if state.fail_connect {
            return Err(VtemError::Transport("injected connection failure".into()));
        }
        state.open = true;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.lock();
        state.calls.push(TransportCall::Close);
        state.open = false;
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }

    fn read_registers(&mut self, address: u16, out: &mut [u16]) -> VtemResult<()> {
        let mut state = self.lock();
        state.calls.push(TransportCall::Read {
            address,
            count: out.len(),
        });
        state.check(address, out.len())?;
        for (register, offset) in out.iter_mut().zip(0u16..) {
            *register = state
                .registers
                .get(&(address + offset))
                .copied()
                .unwrap_or(0);
        }
        trace!(address, count = out.len(), "Simulated read");
        Ok(())
    }

    fn write_register(&mut self, address: u16, value: u16) -> VtemResult<()> {
        let mut state = self.lock();
        state.calls.push(TransportCall::Write { address, value });
        state.check(address, 1)?;
        state.store(address, value);
        trace!(address, value, "Simulated write");
        Ok(())
    }

    fn write_registers(&mut self, address: u16, values: &[u16]) -> VtemResult<()> {
        let mut state = self.lock();
        state.calls.push(TransportCall::WriteMany {
            address,
            values: values.to_vec(),
        });
        state.check(address, values.len())?;
        for (&value, offset) in values.iter().zip(0u16..) {
            state.store(address + offset, value);
        }
        trace!(address, count = values.len(), "Simulated write");
        Ok(())
    }
}
