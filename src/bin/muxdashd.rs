//! muxdashd - sensor rig dashboard daemon
//!
//! Opens the configured buses, runs an initial scan, starts the SPS30
//! poller and the WebSocket sampler, then serves the REST API and `/ws`.

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
use linux_embedded_hal::{I2cdev, SpidevDevice};
use log::{info, warn};

use muxdash::adapters::{shared, Lis3dh, MockRig, Sps30};
use muxdash::config::{RigConfig, RigMode};
use muxdash::domain::{BusLocation, SensorDescriptor, SensorKind};
use muxdash::poller::{pm_cache, Sps30Poller};
use muxdash::ports::RigPort;
use muxdash::scanner::HardwareRig;
use muxdash::web::{routes, spawn_sampler, ws, AppState};

const USAGE: &str = "\
muxdashd - sensor rig dashboard daemon

USAGE:
    muxdashd [OPTIONS]

OPTIONS:
    -c, --config <PATH>    TOML configuration file
        --mock             Run against the mock rig (overrides config)
        --bind <ADDR>      HTTP bind address (overrides config)
    -h, --help             Print this help
";

struct Args {
    config: Option<String>,
    mock: bool,
    bind: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config: None,
        mock: false,
        bind: None,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                args.config = Some(it.next().context("--config needs a path")?);
            }
            "--mock" => args.mock = true,
            "--bind" => {
                args.bind = Some(it.next().context("--bind needs an address")?);
            }
            "-h" | "--help" => {
                print!("{USAGE}");
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument {other:?} (try --help)"),
        }
    }
    Ok(args)
}

/// Trailing number of a device path, e.g. 1 for "/dev/i2c-1".
fn bus_number(path: &str, fallback: u8) -> u8 {
    path.rsplit(|c: char| !c.is_ascii_digit())
        .next()
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(fallback)
}

fn build_hardware_rig(
    config: &RigConfig,
) -> anyhow::Result<(Arc<dyn RigPort>, Option<Sps30Poller>)> {
    let mut buses = Vec::new();
    for (index, path) in config.i2c.buses.iter().enumerate() {
        match I2cdev::new(path) {
            Ok(dev) => {
                let number = bus_number(path, index as u8);
                info!("opened {path} as i2c{number}");
                buses.push((number, shared(dev)));
            }
            Err(e) => warn!("skipping {path}: {e}"),
        }
    }
    anyhow::ensure!(!buses.is_empty(), "no I2C bus could be opened");

    let mut rig = HardwareRig::new(buses).with_retry(config.retry.policy());
    let mut poller = None;

    if config.sps30.enabled {
        match Sps30::open(&config.sps30.port, config.sps30.baud) {
            Ok(sensor) => {
                let cache = pm_cache();
                // the poller owns the serial port; readings arrive via the cache
                poller = Some(Sps30Poller::spawn(sensor, cache.clone(), config.sps30_interval()));
                rig = rig.with_pm_cache(cache);
            }
            Err(e) => warn!("SPS30 on {} unavailable: {e}", config.sps30.port),
        }
    }

    let rig = Arc::new(rig);

    if config.spi.enabled {
        match open_accelerometer(config) {
            Ok(driver) => rig.add_fixed_sensor(
                SensorDescriptor::new(SensorKind::Acceleration, BusLocation::Spi),
                driver,
            ),
            Err(e) => warn!("accelerometer on {} unavailable: {e}", config.spi.device),
        }
    }

    Ok((rig, poller))
}

fn open_accelerometer(
    config: &RigConfig,
) -> anyhow::Result<Box<dyn muxdash::ports::SensorPort>> {
    let mut spi = SpidevDevice::open(&config.spi.device)
        .with_context(|| format!("open {}", config.spi.device))?;
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(config.spi.speed_hz)
        .mode(SpiModeFlags::SPI_MODE_3)
        .build();
    spi.0
        .configure(&options)
        .with_context(|| format!("configure {}", config.spi.device))?;
    Ok(Box::new(Lis3dh::new(spi)))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args()?;
    let mut config = match &args.config {
        Some(path) => RigConfig::load(path).with_context(|| format!("loading {path}"))?,
        None => RigConfig::from_env()?,
    };
    if args.mock {
        config.mode = RigMode::Mock;
    }
    if let Some(bind) = args.bind {
        config.http.bind = bind;
    }

    // the poller handle must outlive the server; dropping it joins the thread
    let (rig, _poller): (Arc<dyn RigPort>, Option<Sps30Poller>) = match config.mode {
        RigMode::Mock => {
            info!("running against the mock rig");
            let rig: Arc<dyn RigPort> = match config.mock_seed {
                Some(seed) => Arc::new(MockRig::with_seed(seed)),
                None => Arc::new(MockRig::default()),
            };
            (rig, None)
        }
        RigMode::Hardware => build_hardware_rig(&config)?,
    };

    match rig.scan() {
        Ok(summary) => info!(
            "initial scan: {} sensor(s), {} mux(es) on bus(es) {:?}",
            summary.sensors.len(),
            summary.muxes_found.len(),
            summary.buses_scanned
        ),
        Err(e) => warn!("initial scan failed: {e}"),
    }

    let state = web::Data::new(AppState::new(rig));
    spawn_sampler(
        state.clone().into_inner(),
        config.broadcast_interval().max(Duration::from_millis(100)),
    );

    let bind = config.http.bind.clone();
    info!("serving on http://{bind}");
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(Cors::permissive())
            .app_data(state.clone())
            .configure(routes::configure)
            .route("/ws", web::get().to(ws::ws_route))
    })
    .bind(&bind)
    .with_context(|| format!("binding {bind}"))?
    .run()
    .await?;

    Ok(())
}
