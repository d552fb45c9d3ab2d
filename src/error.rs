use thiserror::Error;

use crate::process::Pid;

/// Failures surfaced by the simulation engine.
///
/// Nothing here ever escapes a tick; the scheduler records tick-time failures
/// in its `last_error` slot and keeps running.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("{name} size must be non-zero")]
    ZeroSize { name: &'static str },

    #[error("{name} size {value} is not a power of two")]
    NotPowerOfTwo { name: &'static str, value: u64 },

    #[error("page size {page_size} exceeds total size {total_size}")]
    PageLargerThanMemory { page_size: u64, total_size: u64 },

    #[error("quantum must be at least one tick")]
    ZeroQuantum,

    #[error("speed multiplier {0} must be finite and positive")]
    InvalidSpeed(f64),

    #[error("process size {size} exceeds memory capacity {capacity}")]
    CapacityExceeded { size: u64, capacity: u64 },

    #[error("burst time must be at least one tick")]
    ZeroBurstTime,

    #[error("process {0} not found")]
    UnknownProcess(Pid),

    #[error("{0} holds reserved OS memory and cannot be killed")]
    ReservedProcess(Pid),

    #[error("scheduler tried to dispatch from an empty ready queue")]
    EmptyReadyQueue,

    #[error("no free frame for page {page} of {pid}")]
    NoFreeFrame { pid: Pid, page: usize },
}

/// Failures reading or writing workload and trace files.
#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}
