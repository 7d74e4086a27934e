//! `vtem` command-line tool.
//!
//! Runs one command against a valve terminal and exits: read slot status,
//! switch pressure regulation on or off, and read or write pressures.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use vtem_common::{DriverConfig, TransportKind};
use vtem_control::{simulated_terminal, Slots, TerminalTopology, VtemControl};
use vtem_fieldbus::{ModbusTcpConfig, ModbusTcpTransport, RegisterTransport};

/// VTEM command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "vtem",
    about = "Control a VTEM valve terminal over Modbus TCP",
    version,
    long_about = None
)]
struct Args {
    /// Path to a driver configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Terminal host (overrides config file).
    #[arg(long, global = true)]
    host: Option<String>,

    /// Terminal Modbus TCP port (overrides config file).
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Use an in-memory terminal instead of the network.
    #[arg(long, short = 's', global = true)]
    simulated: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Show the motion app of one slot, or of every slot.
    Status {
        /// Slot index; all slots when omitted.
        #[arg(long)]
        slot: Option<usize>,
    },
    /// Switch slots to pressure regulation (motion app 03, both valves).
    Activate {
        /// Slot index; all slots when omitted.
        #[arg(long)]
        slot: Option<usize>,
    },
    /// Return slots to the idle motion app.
    Deactivate {
        /// Slot index; all slots when omitted.
        #[arg(long)]
        slot: Option<usize>,
    },
    /// Read actual pressure of one valve, or of every valve.
    Get {
        /// Valve index; all valves when omitted.
        #[arg(long)]
        valve: Option<usize>,
    },
    /// Write a pressure setpoint to one valve, or to every valve.
    Set {
        /// Valve index; all valves when omitted.
        #[arg(long)]
        valve: Option<usize>,
        /// Setpoint (0-65535).
        #[arg(allow_negative_numbers = true)]
        value: i32,
    },
    /// Write one setpoint per valve, in valve order.
    SetAll {
        /// Setpoints, one per valve.
        #[arg(required = true, allow_negative_numbers = true)]
        values: Vec<i32>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);

    let topology = TerminalTopology::from_config(&config.topology)
        .context("Invalid terminal topology")?;
    info!(
        kind = ?config.transport.kind,
        slots = topology.slot_count(),
        valves = topology.valve_count(),
        "Configuration loaded"
    );

    let transport = create_transport(&config, &topology)?;
    let mut vtem = VtemControl::new(transport, topology);
    vtem.connect()
        .with_context(|| format!("Failed to connect to {}", config.transport.address()))?;

    let mut stdout = std::io::stdout().lock();
    let result = run(&mut vtem, &args.command, &mut stdout);
    vtem.disconnect();
    result
}

/// Initialize logging on stderr with the specified log level.
fn init_logging(level: &str) {
    let filter = format!(
        "vtem={level},vtem_control={level},vtem_fieldbus={level},vtem_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `VTEM_CONFIG_PATH` environment variable
/// 3. `/etc/vtem/config.toml` (system path)
/// 4. `config/default.toml` (local development)
/// 5. Built-in defaults
fn load_config(explicit: Option<&Path>) -> Result<DriverConfig> {
    if let Some(config_path) = explicit {
        info!(?config_path, "Loading config from command-line argument");
        return DriverConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()));
    }

    if let Ok(env_path) = std::env::var("VTEM_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from VTEM_CONFIG_PATH");
            return DriverConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from VTEM_CONFIG_PATH={env_path}")
            });
        }
        warn!(
            path = %env_path,
            "VTEM_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    for candidate in ["/etc/vtem/config.toml", "config/default.toml"] {
        let config_path = Path::new(candidate);
        if config_path.exists() {
            info!(?config_path, "Loading config");
            return DriverConfig::from_file(config_path)
                .with_context(|| format!("Failed to load config from {candidate}"));
        }
    }

    info!("No config file found, using built-in defaults");
    Ok(DriverConfig::default())
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_overrides(config: &mut DriverConfig, args: &Args) {
    if let Some(host) = &args.host {
        config.transport.host.clone_from(host);
    }
    if let Some(port) = args.port {
        config.transport.port = port;
    }
    if args.simulated {
        config.transport.kind = TransportKind::Simulated;
    }
}

/// Create the register transport selected by the configuration.
fn create_transport(
    config: &DriverConfig,
    topology: &TerminalTopology,
) -> Result<Box<dyn RegisterTransport>> {
    match config.transport.kind {
        TransportKind::ModbusTcp => {
            info!(address = %config.transport.address(), "Using Modbus TCP transport");
            Ok(Box::new(ModbusTcpTransport::new(ModbusTcpConfig::from(
                &config.transport,
            ))))
        }
        TransportKind::Simulated => {
            info!("Using simulated terminal");
            let terminal =
                simulated_terminal(topology).context("Failed to build simulated terminal")?;
            Ok(Box::new(terminal))
        }
    }
}

/// Execute one command and print its result.
fn run<T: RegisterTransport, W: Write>(
    vtem: &mut VtemControl<T>,
    command: &Command,
    out: &mut W,
) -> Result<()> {
    match *command {
        Command::Status { slot: Some(slot) } => {
            let status = vtem
                .get_motion_app(slot)
                .with_context(|| format!("Failed to read status of slot {slot}"))?;
            writeln!(out, "slot {slot}: {status}")?;
        }
        Command::Status { slot: None } => {
            for slot in 0..vtem.topology().slot_count() {
                let status = vtem
                    .get_motion_app(slot)
                    .with_context(|| format!("Failed to read status of slot {slot}"))?;
                writeln!(out, "slot {slot}: {status}")?;
            }
        }
        Command::Activate { slot } => {
            vtem.activate_pressure_regulation(Slots::from(slot))
                .context("Failed to activate pressure regulation")?;
            writeln!(out, "pressure regulation activated on {}", describe(slot))?;
        }
        Command::Deactivate { slot } => {
            vtem.deactivate_pressure_regulation(Slots::from(slot))
                .context("Failed to deactivate pressure regulation")?;
            writeln!(out, "pressure regulation deactivated on {}", describe(slot))?;
        }
        Command::Get { valve: Some(valve) } => {
            let pressure = vtem
                .get_pressure(valve)
                .with_context(|| format!("Failed to read pressure of valve {valve}"))?;
            writeln!(out, "valve {valve}: {pressure}")?;
        }
        Command::Get { valve: None } => {
            let pressures = vtem.get_all_pressures().context("Failed to read pressures")?;
            for (valve, pressure) in pressures.iter().enumerate() {
                writeln!(out, "valve {valve}: {pressure}")?;
            }
        }
        Command::Set {
            valve: Some(valve),
            value,
        } => {
            vtem.set_pressure(valve, value)
                .with_context(|| format!("Failed to set pressure of valve {valve}"))?;
            writeln!(out, "valve {valve} set to {value}")?;
        }
        Command::Set { valve: None, value } => {
            let pressures = vec![value; vtem.valve_count()];
            vtem.set_all_pressures(&pressures)
                .context("Failed to set pressures")?;
            writeln!(out, "all {} valves set to {value}", pressures.len())?;
        }
        Command::SetAll { ref values } => {
            vtem.set_all_pressures(values)
                .context("Failed to set pressures")?;
            writeln!(out, "{} setpoints written", values.len())?;
        }
    }
    Ok(())
}

fn describe(slot: Option<usize>) -> String {
    slot.map_or_else(|| String::from("all slots"), |slot| format!("slot {slot}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vtem_common::VtemError;
    use vtem_fieldbus::SimulatedTransport;

    fn simulated() -> VtemControl<SimulatedTransport> {
        let topology = TerminalTopology::motion_app_8x2();
        let terminal = simulated_terminal(&topology).unwrap();
        let mut vtem = VtemControl::new(terminal, topology);
        vtem.connect().unwrap();
        vtem
    }

    fn run_to_string(vtem: &mut VtemControl<SimulatedTransport>, command: &Command) -> String {
        let mut out = Vec::new();
        run(vtem, command, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["vtem", "--simulated", "status"]);
        assert!(args.simulated);
        assert!(args.config.is_none());
        assert_eq!(args.command, Command::Status { slot: None });
    }

    #[test]
    fn test_args_with_overrides() {
        let args = Args::parse_from([
            "vtem", "-c", "test.toml", "--host", "10.0.0.5", "--port", "5020", "activate",
            "--slot", "2",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("test.toml")));
        assert_eq!(args.command, Command::Activate { slot: Some(2) });

        let mut config = DriverConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.transport.address(), "10.0.0.5:5020");
        assert_eq!(config.transport.kind, TransportKind::ModbusTcp);
    }

    #[test]
    fn test_set_arguments() {
        let args = Args::parse_from(["vtem", "set", "--valve", "5", "2500"]);
        assert_eq!(
            args.command,
            Command::Set {
                valve: Some(5),
                value: 2500
            }
        );

        let args = Args::parse_from(["vtem", "set", "-5"]);
        assert_eq!(args.command, Command::Set { valve: None, value: -5 });

        let args = Args::parse_from(["vtem", "set-all", "1", "2", "3"]);
        assert_eq!(
            args.command,
            Command::SetAll {
                values: vec![1, 2, 3]
            }
        );

        assert!(Args::try_parse_from(["vtem", "set-all"]).is_err());
    }

    #[test]
    fn test_explicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vtem.toml");
        std::fs::write(
            &path,
            "[transport]\nkind = \"simulated\"\n\n[topology]\npreset = \"independent_16\"\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.transport.kind, TransportKind::Simulated);

        let missing = dir.path().join("missing.toml");
        let err = load_config(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }

    #[test]
    fn test_status_command() {
        let mut vtem = simulated();
        let output = run_to_string(&mut vtem, &Command::Status { slot: Some(1) });
        assert_eq!(output, "slot 1: motion app 61 (both valves inactive)\n");

        let output = run_to_string(&mut vtem, &Command::Status { slot: None });
        assert_eq!(output.lines().count(), 8);
    }

    #[test]
    fn test_status_of_missing_slot_fails() {
        let mut vtem = simulated();
        for slot in [8, usize::MAX] {
            let mut out = Vec::new();
            let err = run(&mut vtem, &Command::Status { slot: Some(slot) }, &mut out).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<VtemError>(),
                Some(VtemError::InvalidIndex { index, limit: 8, .. }) if *index == slot
            ));
            assert!(out.is_empty());
        }
    }

    #[test]
    fn test_activate_set_get() {
        let mut vtem = simulated();
        run_to_string(&mut vtem, &Command::Activate { slot: None });

        let output = run_to_string(
            &mut vtem,
            &Command::Set {
                valve: Some(5),
                value: 2500,
            },
        );
        assert_eq!(output, "valve 5 set to 2500\n");

        let output = run_to_string(&mut vtem, &Command::Get { valve: Some(5) });
        assert_eq!(output, "valve 5: 2500\n");

        run_to_string(&mut vtem, &Command::Set { valve: None, value: 700 });
        let output = run_to_string(&mut vtem, &Command::Get { valve: None });
        assert_eq!(output.lines().count(), 16);
        assert!(output.lines().all(|line| line.ends_with(": 700")));
    }

    #[test]
    fn test_errors_carry_context() {
        let mut vtem = simulated();
        let mut out = Vec::new();
        let err = run(&mut vtem, &Command::Get { valve: Some(3) }, &mut out).unwrap_err();

        assert!(err.to_string().contains("valve 3"));
        assert!(matches!(
            err.downcast_ref::<VtemError>(),
            Some(VtemError::PreconditionFailed { slot: 1, .. })
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn test_set_all_size_mismatch() {
        let mut vtem = simulated();
        let mut out = Vec::new();
        let err = run(
            &mut vtem,
            &Command::SetAll {
                values: vec![1, 2, 3],
            },
            &mut out,
        )
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<VtemError>(),
            Some(&VtemError::SizeMismatch {
                expected: 16,
                actual: 3
            })
        );
    }
}
