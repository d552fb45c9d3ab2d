use std::time::Duration;

// sizes are in bytes and must be powers of two
pub const DEFAULT_PHYSICAL_SIZE: u64 = 1024;
pub const DEFAULT_VIRTUAL_SIZE: u64 = 2048;
pub const DEFAULT_PAGE_SIZE: u64 = 256;

pub const DEFAULT_QUANTUM: u32 = 2;

/// Tick period at a speed multiplier of 1.
pub const BASE_TICK_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_SPEED: f64 = 1.0;

/// Chance that a non-first page is loaded on a process's first dispatch.
pub const PARTIAL_RESIDENCY_PROBABILITY: f64 = 1.0 / 3.0;

pub const DEFAULT_TICK_LIMIT: u64 = 1000;

pub const OS_TAG: &str = "OS";
