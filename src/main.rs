//! Paging Simulator - Main Entry Point
//!
//! Usage: paging-sim [OPTIONS] <WORKLOAD> [OUTPUT]
//!
//! Arguments:
//!   WORKLOAD - File with one `size burst [arrival]` process per line
//!   OUTPUT   - Optional file to write the per-tick execution trace to
//!
//! Runs the round-robin scheduler over the workload until every process has
//! ended (or the tick limit is hit) and prints the final process and frame
//! tables.

use std::process;
use std::thread;
use std::time::Duration;

use clap::{App, Arg, ArgMatches};
use log::{error, info};

use paging_sim::constants::*;
use paging_sim::io::{write_trace, Workload};
use paging_sim::{Scheduler, SimulationConfig};

/// Command-line configuration
struct Config {
    sim: SimulationConfig,
    workload_file: String,
    output_file: Option<String>,
    max_ticks: u64,
    speed: f64,
    seed: Option<u64>,
    os_reserve: Option<u64>,
    realtime: bool,
}

fn main() {
    let matches = App::new("paging-sim")
        .about("Round-robin scheduling over demand-paged memory")
        .arg(Arg::with_name("WORKLOAD").required(true).help("Workload file, one `size burst [arrival]` per line"))
        .arg(Arg::with_name("OUTPUT").help("Write the per-tick execution trace here"))
        .arg(number_arg("physical", "Physical memory size in bytes"))
        .arg(number_arg("virtual", "Virtual address space size in bytes"))
        .arg(number_arg("page", "Page and frame size in bytes"))
        .arg(number_arg("quantum", "Ticks a process may run before preemption"))
        .arg(number_arg("ticks", "Stop after this many ticks"))
        .arg(number_arg("seed", "Seed for the page residency coin"))
        .arg(number_arg("os", "Bytes of physical memory reserved for the OS"))
        .arg(
            Arg::with_name("speed")
                .long("speed")
                .takes_value(true)
                .help("Speed multiplier for the tick period"),
        )
        .arg(
            Arg::with_name("realtime")
                .long("realtime")
                .help("Sleep the tick period between ticks"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Log every scheduling and mapping decision"),
        )
        .get_matches();

    let default_level = if matches.is_present("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = match parse_args(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    };

    if let Err(e) = run(&config) {
        error!("{}", e);
        process::exit(1);
    }
}

fn number_arg(name: &'static str, help: &'static str) -> Arg<'static, 'static> {
    Arg::with_name(name).long(name).takes_value(true).help(help)
}

fn parse_number(matches: &ArgMatches, name: &str) -> Result<Option<u64>, String> {
    matches
        .value_of(name)
        .map(|v| v.parse::<u64>().map_err(|_| format!("--{} expects a number, got {}", name, v)))
        .transpose()
}

fn parse_args(matches: &ArgMatches) -> Result<Config, String> {
    let defaults = SimulationConfig::default();
    let quantum = parse_number(matches, "quantum")?.unwrap_or(defaults.quantum as u64);
    let quantum = u32::try_from(quantum).map_err(|_| format!("--quantum {} is too large", quantum))?;

    let sim = SimulationConfig {
        physical_size: parse_number(matches, "physical")?.unwrap_or(defaults.physical_size),
        virtual_size: parse_number(matches, "virtual")?.unwrap_or(defaults.virtual_size),
        page_size: parse_number(matches, "page")?.unwrap_or(defaults.page_size),
        quantum,
        ..defaults
    };

    let speed = match matches.value_of("speed") {
        Some(v) => v.parse::<f64>().map_err(|_| format!("--speed expects a number, got {}", v))?,
        None => DEFAULT_SPEED,
    };

    Ok(Config {
        sim,
        workload_file: matches.value_of("WORKLOAD").unwrap_or_default().to_string(),
        output_file: matches.value_of("OUTPUT").map(str::to_string),
        max_ticks: parse_number(matches, "ticks")?.unwrap_or(DEFAULT_TICK_LIMIT),
        speed,
        seed: parse_number(matches, "seed")?,
        os_reserve: parse_number(matches, "os")?,
        realtime: matches.is_present("realtime"),
    })
}

/// Main logic separated from main() for cleaner error handling
fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let workload = Workload::from_file(&config.workload_file)?;

    let mut scheduler = match config.seed {
        Some(seed) => Scheduler::seeded(&config.sim, seed)?,
        None => Scheduler::new(&config.sim)?,
    };
    scheduler.set_system_speed(config.speed)?;

    let geometry = scheduler.physical_memory().geometry();
    info!(
        "physical {} bytes ({} frames of {} bytes, {}-bit addresses), quantum {}",
        geometry.total_size(),
        geometry.frame_count(),
        geometry.page_size(),
        geometry.address_bits(),
        scheduler.quantum()
    );

    if let Some(size) = config.os_reserve {
        scheduler.reserve_os_memory(size)?;
    }

    for spec in &workload.processes {
        // an oversized process is skipped, the rest still run
        if let Err(e) = scheduler.generate_process(spec.size, spec.burst_time, spec.arrival) {
            error!("skipping process (size={}, burst={}): {}", spec.size, spec.burst_time, e);
        }
    }

    // resuming runs the first tick itself
    if config.max_ticks > 0 {
        scheduler.resume_system();
        if config.realtime {
            scheduler.run(config.max_ticks - 1, thread::sleep);
        } else {
            scheduler.run(config.max_ticks - 1, |_: Duration| {});
        }
        scheduler.pause_system();
    }

    print_summary(&scheduler);

    if let Some(path) = &config.output_file {
        write_trace(path, scheduler.timeline())?;
        info!("trace written to {}", path);
    }

    Ok(())
}

fn print_summary<R: rand::Rng>(scheduler: &Scheduler<R>) {
    println!("=== After {} ticks ===", scheduler.time_passed());
    println!();
    println!("{:<6} {:>8} {:>6} {:>10} {:>9}  {}", "pid", "size", "burst", "remaining", "resident", "state");
    for p in scheduler.processes().iter() {
        println!(
            "{:<6} {:>8} {:>6} {:>10} {:>5}/{:<3}  {}",
            p.pid.to_string(),
            p.size,
            p.burst_time,
            p.remaining_time,
            p.virtual_memory.resident_pages(),
            p.virtual_memory.page_table().len(),
            p.state
        );
    }

    println!();
    println!("Frames:");
    for frame in scheduler.frames() {
        match frame.occupant() {
            Some(occupant) => println!("  {:>3} {}", frame.id, occupant),
            None => println!("  {:>3} free", frame.id),
        }
    }

    if let Some(e) = scheduler.last_error() {
        println!();
        println!("Last error: {}", e);
    }
}
