//! Command and status word codec.
//!
//! The low byte of a slot's command (output) and status (input) register
//! carries the motion app id in bits 0-5 and the valve state in bits 6-7.
//! The high byte is written as zero and ignored on read.

use std::fmt;
use vtem_common::{VtemError, VtemResult};

/// Motion app the terminal runs when no application is active.
pub const IDLE_MOTION_APP: u8 = 61;

/// Proportional pressure regulation motion app ("motion app 03").
pub const PRESSURE_MOTION_APP: u8 = 3;

/// Valve state with both valves of the slot inactive.
pub const VALVES_INACTIVE: u8 = 0;

/// Valve state with both valves of the slot active.
pub const BOTH_VALVES_ACTIVE: u8 = 3;

const MOTION_APP_MASK: u16 = 0x3F;
const VALVE_STATE_MASK: u16 = 0x03;
const VALVE_STATE_SHIFT: u16 = 6;

/// Decoded command/status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MotionAppStatus {
    motion_app_id: u8,
    valve_state: u8,
}

impl MotionAppStatus {
    /// Pressure regulation with both valves active.
    pub const PRESSURE_REGULATION: Self = Self {
        motion_app_id: PRESSURE_MOTION_APP,
        valve_state: BOTH_VALVES_ACTIVE,
    };

    /// Idle motion app, valves inactive.
    pub const IDLE: Self = Self {
        motion_app_id: IDLE_MOTION_APP,
        valve_state: VALVES_INACTIVE,
    };

    /// Build a status from its fields.
    ///
    /// # Errors
    ///
    /// Returns [`VtemError::InvalidMotionApp`] if `motion_app_id` exceeds 63
    /// or `valve_state` exceeds 3.
    pub fn new(motion_app_id: u8, valve_state: u8) -> VtemResult<Self> {
        if u16::from(motion_app_id) > MOTION_APP_MASK || u16::from(valve_state) > VALVE_STATE_MASK
        {
            return Err(VtemError::InvalidMotionApp {
                motion_app_id,
                valve_state,
            });
        }
        Ok(Self {
            motion_app_id,
            valve_state,
        })
    }

    /// Motion app id (0-63).
    pub fn motion_app_id(&self) -> u8 {
        self.motion_app_id
    }

    /// Valve state (0-3).
    pub fn valve_state(&self) -> u8 {
        self.valve_state
    }

    /// Pack into a 16-bit command word.
    #[must_use]
    pub fn encode(&self) -> u16 {
        ((u16::from(self.valve_state) & VALVE_STATE_MASK) << VALVE_STATE_SHIFT)
            | (u16::from(self.motion_app_id) & MOTION_APP_MASK)
    }

    /// Unpack a 16-bit status word.
    #[must_use]
    pub fn decode(word: u16) -> Self {
        Self {
            motion_app_id: (word & MOTION_APP_MASK) as u8,
            valve_state: ((word >> VALVE_STATE_SHIFT) & VALVE_STATE_MASK) as u8,
        }
    }

    /// Which valves are active, as reported for the pressure motion app.
    #[must_use]
    pub fn activation(&self) -> ValveActivation {
        ValveActivation::from_state(self.valve_state)
    }
}

impl fmt::Display for MotionAppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "motion app {:02} ({})",
            self.motion_app_id,
            self.activation()
        )
    }
}

/// Valve activation encoded in the valve state bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValveActivation {
    /// Both valves inactive (0).
    BothInactive,
    /// Second valve active (1).
    SecondActive,
    /// First valve active (2).
    FirstActive,
    /// Both valves active (3).
    BothActive,
}

impl ValveActivation {
    fn from_state(state: u8) -> Self {
        match state & 0x03 {
            0 => Self::BothInactive,
            1 => Self::SecondActive,
            2 => Self::FirstActive,
            _ => Self::BothActive,
        }
    }
}

impl fmt::Display for ValveActivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BothInactive => write!(f, "both valves inactive"),
            Self::SecondActive => write!(f, "second valve active"),
            Self::FirstActive => write!(f, "first valve active"),
            Self::BothActive => write!(f, "both valves active"),
        }
    }
}
