//! Rig Diagnostics Shell
//!
//! This binary runs on the rig itself and provides an interactive shell
//! for poking at the buses and sensors without starting the daemon.
//!
//! ## Usage
//!
//! ```bash
//! # Open the default buses and drop into the shell
//! cargo run --bin rigctl
//!
//! # Use a config file / the mock rig
//! cargo run --bin rigctl -- --config /etc/muxdash.toml
//! cargo run --bin rigctl -- --mock
//!
//! # List available serial ports
//! cargo run --bin rigctl -- --list-ports
//! ```
//!
//! ## Commands
//!
//! - `scan` - Enumerate muxes and sensors
//! - `sensors` - Show the current registry
//! - `read <kind>` - One fresh reading (e.g. `read temp_humidity`)
//! - `snapshot` - Read every registered sensor once
//! - `monitor [secs]` - Repeat snapshots for a while (default: 10)
//! - `buses` - Show the opened I2C buses
//! - `probe <bus> <addr>` - Check whether an address acks (e.g. `probe 1 0x44`)
//! - `channels <bus> <mux>` - Walk all 8 channels of a multiplexer
//! - `sps30 [port]` - One-shot particulate reading over UART
//! - `crc <hex bytes>` - Sensirion CRC-8 of the given bytes
//! - `reset` - Clear the registry and quiesce the muxes
//! - `help` - Show help
//! - `exit` - Exit shell

use std::io::{self, Write as _};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use embedded_hal::i2c::I2c;
use linux_embedded_hal::I2cdev;

use muxdash::adapters::{shared, MockRig, MuxChannel, SharedBus, Sps30, Tca9548a};
use muxdash::config::{RigConfig, RigMode};
use muxdash::domain::{crc, SensorKind};
use muxdash::ports::RigPort;
use muxdash::scanner::{HardwareRig, CANDIDATE_ADDRESSES};

enum Shell {
    Hardware {
        buses: Vec<(u8, SharedBus<I2cdev>)>,
        rig: Arc<HardwareRig<I2cdev>>,
    },
    Mock(Arc<MockRig>),
}

impl Shell {
    fn rig(&self) -> &dyn RigPort {
        match self {
            Shell::Hardware { rig, .. } => rig.as_ref(),
            Shell::Mock(rig) => rig.as_ref(),
        }
    }

    fn buses(&self) -> Option<&[(u8, SharedBus<I2cdev>)]> {
        match self {
            Shell::Hardware { buses, .. } => Some(buses),
            Shell::Mock(_) => None,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--list-ports") {
        list_ports();
        return Ok(());
    }
    if args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return Ok(());
    }

    let mut config = if let Some(idx) = args.iter().position(|a| a == "--config" || a == "-c") {
        let path = args.get(idx + 1).context("--config needs a path")?;
        RigConfig::load(path).with_context(|| format!("loading {path}"))?
    } else {
        RigConfig::from_env()?
    };
    if args.iter().any(|a| a == "--mock") {
        config.mode = RigMode::Mock;
    }

    let shell = match config.mode {
        RigMode::Mock => {
            println!("Using the mock rig (no hardware access)");
            Shell::Mock(Arc::new(match config.mock_seed {
                Some(seed) => MockRig::with_seed(seed),
                None => MockRig::default(),
            }))
        }
        RigMode::Hardware => {
            let mut buses = Vec::new();
            for (index, path) in config.i2c.buses.iter().enumerate() {
                match I2cdev::new(path) {
                    Ok(dev) => {
                        let number = trailing_number(path).unwrap_or(index as u8);
                        println!("Opened {path} as i2c{number}");
                        buses.push((number, shared(dev)));
                    }
                    Err(e) => eprintln!("Warning: cannot open {path}: {e}"),
                }
            }
            anyhow::ensure!(!buses.is_empty(), "no I2C bus could be opened");
            let rig = Arc::new(HardwareRig::new(buses.clone()).with_retry(config.retry.policy()));
            Shell::Hardware { buses, rig }
        }
    };

    println!("\nSensor Rig Diagnostics Shell");
    println!("Type 'help' for commands, 'exit' to quit\n");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }
        if input == "help" {
            print_help();
            continue;
        }

        if let Err(e) = execute(&shell, input, &config) {
            eprintln!("Error: {e}");
        }
    }

    println!("Goodbye!");
    Ok(())
}

fn execute(shell: &Shell, input: &str, config: &RigConfig) -> anyhow::Result<()> {
    let parts: Vec<&str> = input.split_whitespace().collect();

    match parts[0] {
        "scan" => {
            let summary = shell.rig().scan()?;
            println!("Buses scanned: {:?}", summary.buses_scanned);
            for mux in &summary.muxes_found {
                println!("Mux at i2c{}:0x{:02x}", mux.bus, mux.address);
            }
            if summary.sensors.is_empty() {
                println!("No sensors found");
            }
            for sensor in &summary.sensors {
                println!("  {} ({})", sensor.label, sensor.kind);
            }
        }

        "sensors" => {
            let sensors = shell.rig().sensors();
            if sensors.is_empty() {
                println!("Registry is empty; run 'scan' first");
            }
            for sensor in sensors {
                println!("  {:28} {:22} {:?}", sensor.label, sensor.kind.to_string(), sensor.status);
            }
        }

        "read" => {
            let raw = parts.get(1).context("Usage: read <kind>")?;
            let kind: SensorKind = raw.parse().map_err(|e| anyhow::anyhow!("{e}"))?;
            let snapshot = shell.rig().read_kind(kind)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }

        "snapshot" => print_snapshots(shell.rig()),

        "monitor" => {
            let secs: u64 = match parts.get(1) {
                Some(raw) => raw.parse().context("Usage: monitor [secs]")?,
                None => 10,
            };
            let deadline = std::time::Instant::now() + Duration::from_secs(secs);
            while std::time::Instant::now() < deadline {
                print_snapshots(shell.rig());
                println!("---");
                std::thread::sleep(Duration::from_secs(2));
            }
        }

        "buses" => match shell.buses() {
            Some(buses) => {
                for (number, _) in buses {
                    println!("  i2c{number}");
                }
            }
            None => println!("(mock rig has no buses)"),
        },

        "probe" => {
            let buses = shell.buses().context("probe needs hardware mode")?;
            let bus = parse_number(parts.get(1).context("Usage: probe <bus> <addr>")?)?;
            let addr = parse_number(parts.get(2).context("Usage: probe <bus> <addr>")?)?;
            let handle = find_bus(buses, bus)?;
            let mut channel = MuxChannel::direct(handle.clone());
            let mut scratch = [0u8; 1];
            match channel.read(addr, &mut scratch) {
                Ok(()) => println!("0x{addr:02x} acks on i2c{bus}"),
                Err(e) => println!("0x{addr:02x} does not answer on i2c{bus} ({e:?})"),
            }
        }

        "channels" => {
            let buses = shell.buses().context("channels needs hardware mode")?;
            let bus = parse_number(parts.get(1).context("Usage: channels <bus> <mux>")?)?;
            let mux = parse_number(parts.get(2).context("Usage: channels <bus> <mux>")?)?;
            let handle = find_bus(buses, bus)?;
            for ch in 0..8u8 {
                let mut slot = MuxChannel::muxed(handle.clone(), mux, ch);
                let mut scratch = [0u8; 1];
                let acks: Vec<String> = CANDIDATE_ADDRESSES
                    .iter()
                    .filter(|&&addr| slot.read(addr, &mut scratch).is_ok())
                    .map(|addr| format!("0x{addr:02x}"))
                    .collect();
                if acks.is_empty() {
                    println!("  ch{ch}: -");
                } else {
                    println!("  ch{ch}: {}", acks.join(", "));
                }
            }
            if let Err(e) = Tca9548a::deselect(handle, mux) {
                eprintln!("Warning: could not deselect mux: {e}");
            }
        }

        "sps30" => {
            anyhow::ensure!(shell.buses().is_some(), "sps30 needs hardware mode");
            let port = parts.get(1).copied().unwrap_or(config.sps30.port.as_str());
            let mut sensor = Sps30::open(port, config.sps30.baud)?;
            match sensor.serial_number() {
                Ok(serial) => println!("SPS30 serial: {serial}"),
                Err(e) => println!("Serial query failed: {e}"),
            }
            sensor.start_measurement()?;
            println!("Spinning up the fan...");
            std::thread::sleep(Duration::from_millis(1500));
            let values = sensor.read_measured()?;
            println!(
                "PM1.0 {:.1}  PM2.5 {:.1}  PM4.0 {:.1}  PM10 {:.1} ug/m3, typical size {:.2} um",
                values.pm1_0, values.pm2_5, values.pm4_0, values.pm10_0, values.typical_size
            );
            sensor.stop_measurement()?;
        }

        "crc" => {
            anyhow::ensure!(parts.len() > 1, "Usage: crc <hex bytes>");
            let mut bytes = Vec::new();
            for raw in &parts[1..] {
                bytes.push(parse_number(raw)?);
            }
            println!("0x{:02x}", crc::crc8(&bytes));
        }

        "reset" => {
            shell.rig().reset();
            println!("Registry cleared");
        }

        other => anyhow::bail!("Unknown command {other:?} (try 'help')"),
    }

    Ok(())
}

fn print_snapshots(rig: &dyn RigPort) {
    let snapshots = rig.snapshot();
    if snapshots.is_empty() {
        println!("Nothing registered; run 'scan' first");
    }
    for snap in snapshots {
        match snap.measurement {
            Some(m) => println!("  {:28} {}", snap.sensor.label, format_measurement(&m)),
            None => println!("  {:28} <read failed>", snap.sensor.label),
        }
    }
}

fn format_measurement(m: &muxdash::domain::Measurement) -> String {
    use muxdash::domain::Measurement::*;
    match m {
        TempHumidity {
            temperature_c,
            humidity_rh,
        } => format!("{temperature_c:.2} C, {humidity_rh:.1} %RH"),
        DifferentialPressure { pascal } => format!("{pascal:.2} Pa"),
        Illuminance { lux } => format!("{lux:.1} lx"),
        Particulates {
            pm1_0,
            pm2_5,
            pm4_0,
            pm10_0,
        } => format!("PM1.0 {pm1_0:.1} / PM2.5 {pm2_5:.1} / PM4.0 {pm4_0:.1} / PM10 {pm10_0:.1} ug/m3"),
        Acceleration { x_g, y_g, z_g } => format!("{x_g:+.3} {y_g:+.3} {z_g:+.3} g"),
    }
}

fn find_bus(buses: &[(u8, SharedBus<I2cdev>)], number: u8) -> anyhow::Result<&SharedBus<I2cdev>> {
    buses
        .iter()
        .find(|(n, _)| *n == number)
        .map(|(_, handle)| handle)
        .with_context(|| format!("no opened bus i2c{number} (see 'buses')"))
}

/// Accepts decimal or 0x-prefixed hex.
fn parse_number(raw: &str) -> anyhow::Result<u8> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.with_context(|| format!("invalid number {raw:?}"))
}

fn trailing_number(path: &str) -> Option<u8> {
    path.rsplit(|c: char| !c.is_ascii_digit())
        .next()
        .and_then(|digits| digits.parse().ok())
}

fn list_ports() {
    println!("Available serial ports:");
    match serialport::available_ports() {
        Ok(ports) => {
            if ports.is_empty() {
                println!("  (none)");
            }
            for port in ports {
                print!("  {}", port.port_name);
                match &port.port_type {
                    serialport::SerialPortType::UsbPort(info) => {
                        println!(" - USB (VID: 0x{:04x}, PID: 0x{:04x})", info.vid, info.pid);
                    }
                    serialport::SerialPortType::BluetoothPort => println!(" - Bluetooth"),
                    serialport::SerialPortType::PciPort => println!(" - PCI"),
                    serialport::SerialPortType::Unknown => println!(" - Unknown"),
                }
            }
        }
        Err(e) => eprintln!("Error listing ports: {e}"),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  scan                 - Enumerate muxes and sensors");
    println!("  sensors              - Show the current registry");
    println!("  read <kind>          - One fresh reading; kinds:");
    for kind in SensorKind::ALL {
        println!("                           {kind}");
    }
    println!("  snapshot             - Read every registered sensor once");
    println!("  monitor [secs]       - Repeat snapshots for a while (default 10)");
    println!("  buses                - Show the opened I2C buses");
    println!("  probe <bus> <addr>   - Check whether an address acks");
    println!("  channels <bus> <mux> - Walk all 8 channels of a multiplexer");
    println!("  sps30 [port]         - One-shot particulate reading over UART");
    println!("  crc <hex bytes>      - Sensirion CRC-8 of the given bytes");
    println!("  reset                - Clear the registry and quiesce the muxes");
    println!("  exit                 - Exit shell");
}
