//! Host-side control of a VTEM pneumatic valve terminal.
//!
//! This crate provides:
//! - [`TerminalTopology`] describing the terminal's register layout
//! - address mapping from slot/valve indices to register addresses
//! - [`MotionAppStatus`] packing and unpacking of command/status words
//! - the motion-app guard run before pressure I/O
//! - [`VtemControl`], the facade tying these to a [`RegisterTransport`]
//!
//! ```
//! use vtem_control::{simulated_terminal, Slots, TerminalTopology, VtemControl};
//!
//! let topology = TerminalTopology::motion_app_8x2();
//! let transport = simulated_terminal(&topology).unwrap();
//! let mut vtem = VtemControl::new(transport, topology);
//!
//! vtem.connect().unwrap();
//! vtem.activate_pressure_regulation(Slots::All).unwrap();
//! vtem.set_pressure(5, 2500).unwrap();
//! assert_eq!(vtem.get_pressure(5).unwrap(), 2500);
//! ```
//!
//! [`RegisterTransport`]: vtem_fieldbus::RegisterTransport

pub mod address;
pub mod codec;
pub mod control;
pub mod guard;
pub mod simulator;
pub mod topology;

pub use address::*;
pub use codec::*;
pub use control::*;
pub use simulator::*;
pub use topology::*;
