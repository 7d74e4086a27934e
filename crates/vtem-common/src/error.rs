use std::fmt;
use thiserror::Error;

/// Which kind of index an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// A slot (module position) on the terminal.
    Slot,
    /// A valve, counted across the whole terminal.
    Valve,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slot => write!(f, "slot"),
            Self::Valve => write!(f, "valve"),
        }
    }
}

/// Driver error types covering connection gating, transport faults,
/// motion-app preconditions and caller contract violations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VtemError {
    /// Operation attempted while the driver is disconnected.
    #[error("operation requires a connection")]
    NotConnected,

    /// Underlying register read or write failed.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The slot is not running the motion app / valve state required.
    #[error(
        "slot {slot} requires motion app {expected_id} with valve state {expected_state}, \
         found motion app {actual_id} with valve state {actual_state}"
    )]
    PreconditionFailed {
        /// Slot whose status was checked.
        slot: usize,
        /// Required motion app id.
        expected_id: u8,
        /// Required valve state.
        expected_state: u8,
        /// Motion app id read from the terminal.
        actual_id: u8,
        /// Valve state read from the terminal.
        actual_state: u8,
    },

    /// Slot or valve index outside the configured range.
    #[error("{kind} index {index} out of range (limit {limit})")]
    InvalidIndex {
        /// Slot or valve.
        kind: IndexKind,
        /// Offending index.
        index: usize,
        /// Number of configured slots or valves.
        limit: usize,
    },

    /// Bulk buffer length does not match the valve count.
    #[error("expected {expected} values, got {actual}")]
    SizeMismatch {
        /// Total valve count.
        expected: usize,
        /// Length supplied by the caller.
        actual: usize,
    },

    /// Pressure value does not fit a 16-bit setpoint register.
    #[error("pressure {0} does not fit in a setpoint register (0..=65535)")]
    PressureOutOfRange(i32),

    /// Motion app id or valve state outside its bit field.
    #[error("motion app {motion_app_id} / valve state {valve_state} out of range (0..=63 / 0..=3)")]
    InvalidMotionApp {
        /// Requested motion app id.
        motion_app_id: u8,
        /// Requested valve state.
        valve_state: u8,
    },

    /// Terminal topology failed validation.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// A bulk operation stopped at the first failing slot or valve.
    #[error("{kind} {index} failed: {source}")]
    BulkAborted {
        /// Whether the iteration was over slots or valves.
        kind: IndexKind,
        /// First index that failed; earlier indices were already applied.
        index: usize,
        /// Failure of that index.
        #[source]
        source: Box<VtemError>,
    },
}

impl VtemError {
    /// Returns the innermost error, looking through [`VtemError::BulkAborted`].
    #[must_use]
    pub fn root_cause(&self) -> &VtemError {
        match self {
            Self::BulkAborted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Wrap a per-index failure of a bulk operation.
    #[must_use]
    pub fn bulk(kind: IndexKind, index: usize, source: VtemError) -> Self {
        Self::BulkAborted {
            kind,
            index,
            source: Box::new(source),
        }
    }
}

/// Convenience type alias for driver operations.
pub type VtemResult<T> = Result<T, VtemError>;
