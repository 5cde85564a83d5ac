//! # WS23xx Command Line Tool
//!
//! Reads live values, history records and raw memory from a WS23xx console,
//! and writes memory cells. With `--simulate` every command runs against the
//! built-in simulated console instead of a serial port, which is handy for
//! trying the tool out without hardware.

#[cfg(test)]
mod tests;

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use ws23xx_lib::config::Config;
use ws23xx_lib::memory_map::{self, Measure, MEASURES};
use ws23xx_lib::nybble::{self, Radix};
use ws23xx_lib::protocol::{Station, WriteOp};
use ws23xx_lib::report;
use ws23xx_lib::simulator::SimulatedStation;
use ws23xx_lib::transport::Transport;

/// Fallback sampling period when the console's link state is unknown
const DEFAULT_POLL: Duration = Duration::from_secs(128);

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial device the console is attached to (overrides the config file)
    #[arg(short, long, global = true)]
    device: Option<String>,

    /// Configuration file
    #[arg(short, long, global = true, default_value = ws23xx_lib::config::CONFIG_FILE)]
    config: PathBuf,

    /// Talk to a simulated console instead of a serial port
    #[arg(long, global = true)]
    simulate: bool,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (no logging)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List known memory cells
    Measures {
        /// Sort by address instead of id
        #[arg(short = 'A')]
        by_address: bool,
    },
    /// Read and decode memory cells (all when none are named)
    Fetch {
        /// Print values on one line joined by SEP
        #[arg(short, long = "separator", value_name = "SEP")]
        separator: Option<String>,
        /// Print a JSON object keyed by measure id
        #[arg(long, conflicts_with = "separator")]
        json: bool,
        /// Measure ids, see `measures`
        measures: Vec<String>,
    },
    /// Dump history records, oldest first
    History {
        /// Number of most recent records to fetch (0 for all)
        #[arg(short = 'l', long = "limit")]
        limit: Option<usize>,
        /// Field separator
        #[arg(short, long = "separator", default_value_t = ',')]
        separator: char,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Hexdump a raw memory range
    Hex {
        /// Show whole bytes instead of nybbles
        #[arg(short = 'x')]
        bytes: bool,
        /// Start address (hex)
        #[arg(value_parser = parse_address)]
        address: u16,
        /// Number of nybbles
        count: usize,
    },
    /// Write a hexadecimal value into memory
    Set {
        /// Start address (hex)
        #[arg(value_parser = parse_address)]
        address: u16,
        /// Number of nybbles to write
        count: usize,
        /// Value (hex), stored least-significant nybble first
        #[arg(value_parser = parse_hex)]
        value: u64,
    },
    /// Set the history save interval and clear the archive
    Interval {
        /// Minutes between history records (1-4096)
        minutes: u32,
        /// Minutes until the next record (defaults to the interval)
        #[arg(long)]
        next: Option<u32>,
    },
    /// Write the effective configuration (file plus overrides) to the
    /// config file
    WriteConfig,
    /// Sample live values periodically and log each observation
    Poll {
        /// Seconds between samples (overrides the config file; 0 follows
        /// the console's link cadence)
        #[arg(long)]
        interval: Option<u64>,
        /// Take one sample and exit
        #[arg(long)]
        once: bool,
    },
}

fn parse_hex(s: &str) -> Result<u64, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(digits, 16).map_err(|e| format!("'{s}' is not a hex number: {e}"))
}

fn parse_address(s: &str) -> Result<u16, String> {
    let value = parse_hex(s)?;
    u16::try_from(value).map_err(|_| format!("address {s} does not fit in 16 bits"))
}

type ConsoleStation = Station<Box<dyn Transport>>;

#[cfg(feature = "hardware")]
fn open_serial(device: &str, config: &Config) -> anyhow::Result<Box<dyn Transport>> {
    use ws23xx_lib::serial::SerialTransport;

    let port = SerialTransport::open(device, config.station.io_delay())
        .with_context(|| format!("opening serial device {device}"))?;
    Ok(Box::new(port))
}

#[cfg(not(feature = "hardware"))]
fn open_serial(_device: &str, _config: &Config) -> anyhow::Result<Box<dyn Transport>> {
    anyhow::bail!("built without the `hardware` feature; use --simulate")
}

fn open_station(args: &Args, config: &Config) -> anyhow::Result<ConsoleStation> {
    let transport: Box<dyn Transport> = if args.simulate {
        info!("Using simulated console");
        Box::new(SimulatedStation::with_sample_data())
    } else {
        let device = args.device.as_deref().unwrap_or(&config.station.device);
        open_serial(device, config)?
    };

    Ok(Station::new(transport).with_read_timeout(config.station.read_timeout()))
}

fn resolve_measures(ids: &[String]) -> anyhow::Result<Vec<Measure>> {
    if ids.is_empty() {
        return Ok(MEASURES.to_vec());
    }

    ids.iter()
        .map(|id| {
            memory_map::by_id(id)
                .copied()
                .with_context(|| format!("unknown measure: {id}"))
        })
        .collect()
}

fn list_measures(by_address: bool) {
    let mut measures = MEASURES.to_vec();
    if !by_address {
        measures.sort_by_key(|m| m.id);
    }
    for line in report::measure_table(&measures) {
        println!("{line}");
    }
}

fn fetch(
    station: &mut ConsoleStation,
    ids: &[String],
    separator: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let measures = resolve_measures(ids)?;
    let reading = station
        .acquire(&measures)
        .context("reading measures from the console")?;

    if json {
        let value = report::reading_json(&measures, &reading);
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if let Some(sep) = separator {
        println!("{}", report::measure_row(&measures, &reading, sep));
    } else {
        for line in report::measure_lines(&measures, &reading) {
            println!("{line}");
        }
    }

    Ok(())
}

fn history(
    station: &mut ConsoleStation,
    limit: usize,
    separator: char,
    json: bool,
) -> anyhow::Result<()> {
    let records = station
        .fetch_history(limit)
        .context("reading the history archive")?;
    info!("Fetched {} history records", records.len());

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        for record in &records {
            println!("{}", report::history_row(record, separator));
        }
    }

    Ok(())
}

fn hex(station: &mut ConsoleStation, address: u16, count: usize, bytes: bool) -> anyhow::Result<()> {
    let data = station
        .read(address, count)
        .with_context(|| format!("reading {count} nybbles at {address:#05x}"))?;

    for line in report::hexdump(address, &data, count, bytes) {
        println!("{line}");
    }
    Ok(())
}

fn set(station: &mut ConsoleStation, address: u16, count: usize, value: u64) -> anyhow::Result<()> {
    let mut data = vec![0u8; nybble::byte_len(count)];
    nybble::int_to_nybbles(value, count, 0, Radix::Hex, &mut data)
        .with_context(|| format!("value {value:#x} does not fit in {count} nybbles"))?;

    station
        .write(address, &data, count, WriteOp::Nybbles)
        .with_context(|| format!("writing {count} nybbles at {address:#05x}"))?;

    info!("Wrote {value:#x} to {address:#05x}");
    Ok(())
}

fn poll(station: &mut ConsoleStation, interval_secs: u64, once: bool) -> anyhow::Result<()> {
    let mut period = Duration::from_secs(interval_secs);

    if interval_secs == 0 {
        match station.poll_schedule() {
            Ok(Some(schedule)) => {
                info!(
                    "Sampling every {:?}, first sample in {:?}",
                    schedule.interval, schedule.first
                );
                period = schedule.interval;
                if !once {
                    thread::sleep(schedule.first);
                }
            }
            Ok(None) => {
                warn!("Outdoor link is down, sampling every {DEFAULT_POLL:?}");
                period = DEFAULT_POLL;
            }
            Err(e) => {
                warn!("Could not read link state ({e}), sampling every {DEFAULT_POLL:?}");
                period = DEFAULT_POLL;
            }
        }
    }

    loop {
        match station.observe() {
            Ok(observation) => println!("{}", serde_json::to_string(&observation)?),
            Err(e) => warn!("Acquisition failed, skipping cycle: {e}"),
        }

        if once {
            return Ok(());
        }
        thread::sleep(period);
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Command::Measures { by_address } = args.command {
        list_measures(by_address);
        return Ok(());
    }

    let mut config = Config::load_from_path(&args.config);

    if let Command::WriteConfig = args.command {
        if let Some(device) = &args.device {
            config.station.device = device.clone();
        }
        config
            .save_to_path(&args.config)
            .with_context(|| format!("writing {}", args.config.display()))?;
        println!("Configuration written to {}", args.config.display());
        return Ok(());
    }

    let mut station = open_station(&args, &config)?;

    match &args.command {
        Command::Measures { .. } | Command::WriteConfig => Ok(()),
        Command::Fetch {
            separator,
            json,
            measures,
        } => fetch(&mut station, measures, separator.as_deref(), *json),
        Command::History {
            limit,
            separator,
            json,
        } => history(
            &mut station,
            limit.unwrap_or(config.poll.history_records),
            *separator,
            *json,
        ),
        Command::Hex {
            bytes,
            address,
            count,
        } => hex(&mut station, *address, *count, *bytes),
        Command::Set {
            address,
            count,
            value,
        } => set(&mut station, *address, *count, *value),
        Command::Interval { minutes, next } => {
            station
                .set_history_interval(*minutes, next.unwrap_or(*minutes))
                .context("setting the history interval")?;
            println!("History interval set to {minutes} min");
            Ok(())
        }
        Command::Poll { interval, once } => poll(
            &mut station,
            interval.unwrap_or(config.poll.interval_secs),
            *once,
        ),
    }
}
