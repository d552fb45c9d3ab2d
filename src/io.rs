use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::error::WorkloadError;
use crate::scheduler::TickRecord;

/// One line of a workload file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSpec {
    pub size: u64,
    pub burst_time: u64,
    pub arrival: Option<u64>,
}

/// Processes to feed the scheduler, in file order
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Workload {
    pub processes: Vec<ProcessSpec>,
}

impl Workload {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, WorkloadError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| WorkloadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// `size burst [arrival]` per line; blank lines and `#` comments skipped
    pub fn parse(content: &str) -> Result<Self, WorkloadError> {
        let mut processes = Vec::new();

        for (number, raw) in content.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            processes.push(Self::parse_line(number + 1, line)?);
        }

        Ok(Workload { processes })
    }

    fn parse_line(line: usize, text: &str) -> Result<ProcessSpec, WorkloadError> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if !(2..=3).contains(&tokens.len()) {
            return Err(WorkloadError::Parse {
                line,
                message: format!("expected `size burst [arrival]`, got {} fields", tokens.len()),
            });
        }

        let number = |name: &str, token: &str| {
            token.parse::<u64>().map_err(|_| WorkloadError::Parse {
                line,
                message: format!("invalid {}: {}", name, token),
            })
        };

        Ok(ProcessSpec {
            size: number("size", tokens[0])?,
            burst_time: number("burst time", tokens[1])?,
            arrival: tokens.get(2).map(|t| number("arrival", *t)).transpose()?,
        })
    }
}

/// One line per tick: the tick number and the pid on the CPU, or `-`
pub fn format_trace(timeline: &[TickRecord]) -> String {
    let mut out = String::new();
    for record in timeline {
        let _ = match record.executing {
            Some(pid) => writeln!(out, "{} {}", record.tick, pid),
            None => writeln!(out, "{} -", record.tick),
        };
    }
    out
}

pub fn write_trace<P: AsRef<Path>>(path: P, timeline: &[TickRecord]) -> Result<(), WorkloadError> {
    let path = path.as_ref();
    fs::write(path, format_trace(timeline)).map_err(|source| WorkloadError::Io {
        path: path.display().to_string(),
        source,
    })
}
