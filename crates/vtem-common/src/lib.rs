#![doc = "Common types shared across the VTEM driver workspace."]

pub mod config;
pub mod error;

pub use config::*;
pub use error::*;
