//! Terminal register layout.
//!
//! A [`TerminalTopology`] is fixed when the driver is built and never
//! inferred from the device. Both supported terminal models are presets of
//! the same layout description; anything else is a custom topology built
//! with [`TopologyBuilder`] or loaded from a [`TopologyConfig`].

use vtem_common::{GuardPolicy, TopologyConfig, TopologyPreset, VtemError, VtemResult};

/// First register of the terminal's input map.
pub const INPUT_BASE_ADDRESS: u16 = 45392;

/// First register of the terminal's output map.
pub const OUTPUT_BASE_ADDRESS: u16 = 40001;

/// Offset of slot 0's status word inside the input map.
pub const INPUT_OFFSET: u16 = 3;

/// Offset of slot 0's command word inside the output map.
pub const OUTPUT_OFFSET: u16 = 2;

/// Validated, immutable register layout of a valve terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalTopology {
    slot_count: usize,
    valves_per_slot: usize,
    input_base_address: u16,
    output_base_address: u16,
    input_slot_stride: u16,
    output_slot_stride: u16,
    status_register_offset: u16,
    command_register_offset: u16,
    pressure_register_offsets: Vec<u16>,
    guard_policy: GuardPolicy,
}

impl TerminalTopology {
    /// 8 slots × 2 valves driven through motion app 03.
    ///
    /// Each slot occupies 6 input registers (status word followed by an
    /// actual/setpoint/diagnostic group per valve) and 3 output registers
    /// (command word followed by one setpoint per valve). Pressure I/O
    /// requires motion app 3 with both valves active.
    #[must_use]
    pub fn motion_app_8x2() -> Self {
        Self {
            slot_count: 8,
            valves_per_slot: 2,
            input_base_address: INPUT_BASE_ADDRESS,
            output_base_address: OUTPUT_BASE_ADDRESS,
            input_slot_stride: 6,
            output_slot_stride: 3,
            status_register_offset: INPUT_OFFSET,
            command_register_offset: OUTPUT_OFFSET,
            pressure_register_offsets: vec![1, 2],
            guard_policy: GuardPolicy::MotionAppAndValveState,
        }
    }

    /// 16 independently addressed valves, one per slot.
    ///
    /// Each valve has a status word followed by actual pressure and a
    /// diagnostic word on the input side, and a command word followed by its
    /// setpoint on the output side. Valve activation is not tracked, so only
    /// the connection gates pressure I/O.
    #[must_use]
    pub fn independent_16() -> Self {
        Self {
            slot_count: 16,
            valves_per_slot: 1,
            input_base_address: INPUT_BASE_ADDRESS,
            output_base_address: OUTPUT_BASE_ADDRESS,
            input_slot_stride: 3,
            output_slot_stride: 2,
            status_register_offset: INPUT_OFFSET,
            command_register_offset: OUTPUT_OFFSET,
            pressure_register_offsets: vec![1],
            guard_policy: GuardPolicy::ConnectionOnly,
        }
    }

    /// Layout of a built-in preset.
    #[must_use]
    pub fn preset(preset: TopologyPreset) -> Self {
        match preset {
            TopologyPreset::MotionApp8x2 => Self::motion_app_8x2(),
            TopologyPreset::Independent16 => Self::independent_16(),
        }
    }

    /// Start a custom topology from a preset.
    #[must_use]
    pub fn builder(preset: TopologyPreset) -> TopologyBuilder {
        TopologyBuilder {
            topology: Self::preset(preset),
        }
    }

    /// Build a topology from configuration: the preset with every
    /// configured override applied.
    ///
    /// # Errors
    ///
    /// Returns [`VtemError::InvalidTopology`] if the result fails validation.
    pub fn from_config(config: &TopologyConfig) -> VtemResult<Self> {
        let mut builder = Self::builder(config.preset);
        if let Some(n) = config.slot_count {
            builder = builder.slot_count(n);
        }
        if let Some(n) = config.valves_per_slot {
            builder = builder.valves_per_slot(n);
        }
        if let Some(a) = config.input_base_address {
            builder = builder.input_base_address(a);
        }
        if let Some(a) = config.output_base_address {
            builder = builder.output_base_address(a);
        }
        if let Some(s) = config.input_slot_stride {
            builder = builder.input_slot_stride(s);
        }
        if let Some(s) = config.output_slot_stride {
            builder = builder.output_slot_stride(s);
        }
        if let Some(o) = config.status_register_offset {
            builder = builder.status_register_offset(o);
        }
        if let Some(o) = config.command_register_offset {
            builder = builder.command_register_offset(o);
        }
        if let Some(offsets) = &config.pressure_register_offsets {
            builder = builder.pressure_register_offsets(offsets.clone());
        }
        if let Some(policy) = config.guard_policy {
            builder = builder.guard_policy(policy);
        }
        builder.build()
    }

    /// Number of slots.
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Valves per slot.
    pub fn valves_per_slot(&self) -> usize {
        self.valves_per_slot
    }

    /// Total number of valves on the terminal.
    pub fn valve_count(&self) -> usize {
        self.slot_count * self.valves_per_slot
    }

    /// First register of the input map.
    pub fn input_base_address(&self) -> u16 {
        self.input_base_address
    }

    /// First register of the output map.
    pub fn output_base_address(&self) -> u16 {
        self.output_base_address
    }

    /// Input registers per slot.
    pub fn input_slot_stride(&self) -> u16 {
        self.input_slot_stride
    }

    /// Output registers per slot.
    pub fn output_slot_stride(&self) -> u16 {
        self.output_slot_stride
    }

    /// Offset of slot 0's status word from the input base.
    pub fn status_register_offset(&self) -> u16 {
        self.status_register_offset
    }

    /// Offset of slot 0's command word from the output base.
    pub fn command_register_offset(&self) -> u16 {
        self.command_register_offset
    }

    /// Offset of each valve's pressure word from its slot's status/command word.
    pub fn pressure_register_offsets(&self) -> &[u16] {
        &self.pressure_register_offsets
    }

    /// Checks required before pressure I/O.
    pub fn guard_policy(&self) -> GuardPolicy {
        self.guard_policy
    }

    fn validate(&self) -> VtemResult<()> {
        if self.slot_count == 0 {
            return Err(VtemError::InvalidTopology("slot_count must be at least 1".into()));
        }
        if self.valves_per_slot == 0 {
            return Err(VtemError::InvalidTopology(
                "valves_per_slot must be at least 1".into(),
            ));
        }
        if self.pressure_register_offsets.len() != self.valves_per_slot {
            return Err(VtemError::InvalidTopology(format!(
                "{} pressure register offsets for {} valves per slot",
                self.pressure_register_offsets.len(),
                self.valves_per_slot
            )));
        }

        if self.slot_count.checked_mul(self.valves_per_slot).is_none() {
            return Err(VtemError::InvalidTopology(format!(
                "{} slots of {} valves overflow the valve count",
                self.slot_count, self.valves_per_slot
            )));
        }

        // The last slot's highest register must still be addressable
        let last_slot = u64::try_from(self.slot_count - 1).unwrap_or(u64::MAX);
        let max_offset = u64::from(
            self.pressure_register_offsets
                .iter()
                .copied()
                .max()
                .unwrap_or(0),
        );
        let maps = [
            (
                "input",
                self.input_base_address,
                self.status_register_offset,
                self.input_slot_stride,
            ),
            (
                "output",
                self.output_base_address,
                self.command_register_offset,
                self.output_slot_stride,
            ),
        ];
        for (name, base, offset, stride) in maps {
            let highest = u64::from(stride)
                .checked_mul(last_slot)
                .and_then(|span| span.checked_add(u64::from(base) + u64::from(offset)))
                .and_then(|top| top.checked_add(max_offset));
            match highest {
                Some(highest) if highest <= u64::from(u16::MAX) => {}
                Some(highest) => {
                    return Err(VtemError::InvalidTopology(format!(
                        "{name} map reaches register {highest}, beyond 65535"
                    )));
                }
                None => {
                    return Err(VtemError::InvalidTopology(format!(
                        "{name} map of {} slots overflows the address space",
                        self.slot_count
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for TerminalTopology {
    fn default() -> Self {
        Self::motion_app_8x2()
    }
}

/// Builder for custom terminal layouts.
#[derive(Debug, Clone)]
pub struct TopologyBuilder {
    topology: TerminalTopology,
}

impl TopologyBuilder {
    /// Set the number of slots.
    pub fn slot_count(mut self, n: usize) -> Self {
        self.topology.slot_count = n;
        self
    }

    /// Set the number of valves per slot.
    pub fn valves_per_slot(mut self, n: usize) -> Self {
        self.topology.valves_per_slot = n;
        self
    }

    /// Set the first register of the input map.
    pub fn input_base_address(mut self, address: u16) -> Self {
        self.topology.input_base_address = address;
        self
    }

    /// Set the first register of the output map.
    pub fn output_base_address(mut self, address: u16) -> Self {
        self.topology.output_base_address = address;
        self
    }

    /// Set the input registers per slot.
    pub fn input_slot_stride(mut self, stride: u16) -> Self {
        self.topology.input_slot_stride = stride;
        self
    }

    /// Set the output registers per slot.
    pub fn output_slot_stride(mut self, stride: u16) -> Self {
        self.topology.output_slot_stride = stride;
        self
    }

    /// Set the status word offset.
    pub fn status_register_offset(mut self, offset: u16) -> Self {
        self.topology.status_register_offset = offset;
        self
    }

    /// Set the command word offset.
    pub fn command_register_offset(mut self, offset: u16) -> Self {
        self.topology.command_register_offset = offset;
        self
    }

    /// Set the per-valve pressure register offsets.
    pub fn pressure_register_offsets(mut self, offsets: Vec<u16>) -> Self {
        self.topology.pressure_register_offsets = offsets;
        self
    }

    /// Set the guard policy.
    pub fn guard_policy(mut self, policy: GuardPolicy) -> Self {
        self.topology.guard_policy = policy;
        self
    }

    /// Validate and build the topology.
    ///
    /// # Errors
    ///
    /// Returns [`VtemError::InvalidTopology`] if a count is zero, the
    /// pressure offsets do not match the valves per slot, or the layout
    /// runs past register 65535.
    pub fn build(self) -> VtemResult<TerminalTopology> {
        self.topology.validate()?;
        Ok(self.topology)
    }
}
