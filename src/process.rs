use std::fmt;

use crate::constants::OS_TAG;
use crate::translation::VirtualAddressSpace;

/// Process identifier; doubles as the index into the process table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u32);

impl Pid {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Who owns a byte of a physical frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occupant {
    Process(Pid),
    Os,
}

impl fmt::Display for Occupant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Occupant::Process(pid) => pid.fmt(f),
            Occupant::Os => f.write_str(OS_TAG),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Waiting,
    Executing,
    Finished,
    Killed,
    /// Memory held on behalf of the OS; never scheduled
    Reserved,
}

impl ProcessState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessState::Finished | ProcessState::Killed)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Waiting => "waiting",
            ProcessState::Executing => "executing",
            ProcessState::Finished => "finished",
            ProcessState::Killed => "killed",
            ProcessState::Reserved => "reserved",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessEntry {
    pub pid: Pid,
    pub size: u64,
    pub burst_time: u64,
    /// Tick at which the process becomes eligible for the ready queue
    pub allocation_time: u64,
    pub remaining_time: u64,
    /// Not yet admitted to the ready queue
    pub fresh: bool,
    pub state: ProcessState,
    pub reserved: bool,
    pub virtual_memory: VirtualAddressSpace,
}

impl ProcessEntry {
    pub fn occupant(&self) -> Occupant {
        if self.reserved { Occupant::Os } else { Occupant::Process(self.pid) }
    }

    /// Has been dispatched at least once
    #[inline]
    pub fn has_run(&self) -> bool {
        self.remaining_time != self.burst_time
    }

    /// Candidate for having its frames taken by another process
    pub fn is_evictable(&self) -> bool {
        !self.reserved && !self.state.is_terminal() && self.has_run()
    }
}

/// Arena of every process ever created, indexed by pid
#[derive(Debug, Default)]
pub struct ProcessTable {
    entries: Vec<ProcessEntry>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_pid(&self) -> Pid {
        Pid(self.entries.len() as u32)
    }

    /// Build an entry with the next pid and store it
    pub fn insert_with(&mut self, build: impl FnOnce(Pid) -> ProcessEntry) -> Pid {
        let pid = self.next_pid();
        let entry = build(pid);
        debug_assert_eq!(entry.pid, pid);
        self.entries.push(entry);
        pid
    }

    #[inline]
    pub fn get(&self, pid: Pid) -> Option<&ProcessEntry> {
        self.entries.get(pid.index())
    }

    #[inline]
    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut ProcessEntry> {
        self.entries.get_mut(pid.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A process's stay in the ready queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEntry {
    pub pid: Pid,
    pub arrived_at: u64,
    pub left_at: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueHistoryEntry {
    pub entry: QueueEntry,
    /// Remaining burst when the process joined the queue
    pub remaining_time: u64,
}
