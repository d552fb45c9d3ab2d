//! Round-robin scheduler driving the frame pool on a discrete tick.

use std::collections::VecDeque;
use std::time::Duration;

use log::{error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SimulationConfig;
use crate::error::SimError;
use crate::memory::{AllocationType, DeallocationType, PhysicalFrame, PhysicalFramePool};
use crate::process::{Pid, ProcessEntry, ProcessState, ProcessTable, QueueEntry, QueueHistoryEntry};
use crate::ticker::Ticker;
use crate::translation::{PageTableEntry, TranslationResult, VirtualAddressSpace};

/// The process currently holding the CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execution {
    pub pid: Pid,
    /// Ticks run since the last dispatch
    pub processed_time: u32,
}

/// Who held the CPU at the end of a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRecord {
    pub tick: u64,
    pub executing: Option<Pid>,
}

pub struct Scheduler<R = StdRng> {
    quantum: u32,
    physical: PhysicalFramePool,
    virtual_template: VirtualAddressSpace,
    processes: ProcessTable,
    ready_queue: VecDeque<QueueEntry>,
    queue_history: Vec<QueueHistoryEntry>,
    executing: Option<Execution>,
    time_passed: u64,
    timeline: Vec<TickRecord>,
    last_error: Option<SimError>,
    ticker: Ticker,
    rng: R,
}

impl Scheduler<StdRng> {
    /// Scheduler whose residency coin is seeded from the OS
    pub fn new(config: &SimulationConfig) -> Result<Self, SimError> {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Scheduler with a reproducible residency coin
    pub fn seeded(config: &SimulationConfig, seed: u64) -> Result<Self, SimError> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Scheduler<R> {
    pub fn with_rng(config: &SimulationConfig, rng: R) -> Result<Self, SimError> {
        let (physical, virtual_) = config.geometries()?;
        Ok(Scheduler {
            quantum: config.quantum,
            physical: PhysicalFramePool::new(physical),
            virtual_template: VirtualAddressSpace::template(virtual_),
            processes: ProcessTable::new(),
            ready_queue: VecDeque::new(),
            queue_history: Vec::new(),
            executing: None,
            time_passed: 0,
            timeline: Vec::new(),
            last_error: None,
            ticker: Ticker::new(config.base_interval),
            rng,
        })
    }

    // ---------------------------------------------------------------------
    // Readable state
    // ---------------------------------------------------------------------

    pub fn processes(&self) -> &ProcessTable {
        &self.processes
    }

    pub fn process(&self, pid: Pid) -> Option<&ProcessEntry> {
        self.processes.get(pid)
    }

    pub fn ready_queue(&self) -> &VecDeque<QueueEntry> {
        &self.ready_queue
    }

    pub fn queue_history(&self) -> &[QueueHistoryEntry] {
        &self.queue_history
    }

    pub fn frames(&self) -> &[PhysicalFrame] {
        self.physical.frames()
    }

    pub fn physical_memory(&self) -> &PhysicalFramePool {
        &self.physical
    }

    pub fn page_table(&self, pid: Pid) -> Option<&[PageTableEntry]> {
        self.processes.get(pid).map(|p| p.virtual_memory.page_table())
    }

    pub fn executing(&self) -> Option<Execution> {
        self.executing
    }

    pub fn time_passed(&self) -> u64 {
        self.time_passed
    }

    pub fn timeline(&self) -> &[TickRecord] {
        &self.timeline
    }

    pub fn last_error(&self) -> Option<&SimError> {
        self.last_error.as_ref()
    }

    pub fn ticker(&self) -> &Ticker {
        &self.ticker
    }

    pub fn quantum(&self) -> u32 {
        self.quantum
    }

    /// Nothing left that could ever run
    pub fn is_drained(&self) -> bool {
        self.executing.is_none()
            && self.ready_queue.is_empty()
            && self.processes.iter().all(|p| p.reserved || p.state.is_terminal())
    }

    pub fn translate(&self, pid: Pid, address: u64) -> Result<TranslationResult, SimError> {
        self.processes
            .get(pid)
            .map(|p| p.virtual_memory.translate(address))
            .ok_or(SimError::UnknownProcess(pid))
    }

    // ---------------------------------------------------------------------
    // Management operations
    // ---------------------------------------------------------------------

    /// Create a process that joins the ready queue once `arrival` (default:
    /// now) has passed.
    pub fn generate_process(&mut self, size: u64, burst_time: u64, arrival: Option<u64>) -> Result<Pid, SimError> {
        let capacity = self.virtual_template.capacity();
        if size > capacity {
            return Err(self.record(SimError::CapacityExceeded { size, capacity }));
        }
        if burst_time == 0 {
            return Err(self.record(SimError::ZeroBurstTime));
        }

        let allocation_time = arrival.unwrap_or(self.time_passed);
        let virtual_memory = self.virtual_template.clone_for(size);
        let pid = self.processes.insert_with(|pid| ProcessEntry {
            pid,
            size,
            burst_time,
            allocation_time,
            remaining_time: burst_time,
            fresh: true,
            state: ProcessState::Waiting,
            reserved: false,
            virtual_memory,
        });

        info!("{}: created (size={}, burst={}, arrival={})", pid, size, burst_time, allocation_time);
        Ok(pid)
    }

    /// Pin `size` bytes of physical memory on behalf of the OS. The entry is
    /// never queued or evicted.
    pub fn reserve_os_memory(&mut self, size: u64) -> Result<Pid, SimError> {
        let capacity = self.physical.geometry().total_size();
        if size > capacity {
            return Err(self.record(SimError::CapacityExceeded { size, capacity }));
        }

        let virtual_memory = self.virtual_template.clone_for(size);
        let pid = self.processes.insert_with(|pid| ProcessEntry {
            pid,
            size,
            burst_time: 0,
            allocation_time: 0,
            remaining_time: 0,
            fresh: false,
            state: ProcessState::Reserved,
            reserved: true,
            virtual_memory,
        });

        if let Some(entry) = self.processes.get_mut(pid) {
            let report = self.physical.allocate_os_memory(entry);
            if let Some(&page) = report.failed.first() {
                self.record(SimError::NoFreeFrame { pid, page });
            }
        }
        info!("{}: reserved {} bytes for the OS", pid, size);
        Ok(pid)
    }

    /// Terminate `pid`. Reserved OS memory cannot be killed.
    pub fn kill_process(&mut self, pid: Pid) -> Result<(), SimError> {
        if self.processes.get(pid).is_some_and(|p| p.reserved) {
            return Err(self.record(SimError::ReservedProcess(pid)));
        }
        self.terminate_process(pid).map_err(|e| self.record(e))
    }

    /// Terminate every process that has not already ended. Returns the pids
    /// that were terminated.
    pub fn kill_all(&mut self) -> Vec<Pid> {
        let pids: Vec<Pid> = self
            .processes
            .iter()
            .filter(|p| !p.reserved && !p.state.is_terminal())
            .map(|p| p.pid)
            .collect();

        for &pid in &pids {
            // every pid came from the table
            let _ = self.terminate_process(pid);
        }
        pids
    }

    pub fn pause_system(&mut self) {
        self.ticker.pause();
    }

    /// Unpause and run a tick straight away
    pub fn resume_system(&mut self) {
        self.ticker.resume();
        self.tick();
    }

    pub fn set_system_speed(&mut self, multiplier: f64) -> Result<(), SimError> {
        self.ticker.set_speed(multiplier).map_err(|e| self.record(e))
    }

    /// Drive ticks until paused, drained or `max_ticks` have run, calling
    /// `sleep` with the ticker period before each one. Returns the number of
    /// ticks run.
    pub fn run<F: FnMut(Duration)>(&mut self, max_ticks: u64, mut sleep: F) -> u64 {
        let mut ran = 0;
        while ran < max_ticks && !self.is_drained() {
            let Some(delay) = self.ticker.next_delay() else {
                break;
            };
            sleep(delay);
            self.tick();
            ran += 1;
        }
        ran
    }

    // ---------------------------------------------------------------------
    // Tick
    // ---------------------------------------------------------------------

    /// Advance the simulation by one time unit
    pub fn tick(&mut self) {
        self.admit_arrivals();

        if let Some(execution) = self.executing.as_mut() {
            execution.processed_time += 1;
            let Execution { pid, processed_time } = *execution;

            match self.processes.get_mut(pid) {
                Some(process) => {
                    process.remaining_time = process.remaining_time.saturating_sub(1);
                    if process.remaining_time == 0 {
                        self.terminate_current();
                    } else if processed_time >= self.quantum && !self.ready_queue.is_empty() {
                        self.preempt_current();
                    }
                }
                None => {
                    self.executing = None;
                    self.soft_error(SimError::UnknownProcess(pid));
                }
            }
        }

        if self.executing.is_none() && !self.ready_queue.is_empty() {
            self.dispatch_next();
        }

        self.timeline.push(TickRecord {
            tick: self.time_passed,
            executing: self.executing.map(|e| e.pid),
        });
        self.time_passed += 1;
    }

    fn admit_arrivals(&mut self) {
        let arrived: Vec<Pid> = self
            .processes
            .iter()
            .filter(|p| p.fresh && p.allocation_time <= self.time_passed)
            .map(|p| p.pid)
            .collect();

        for pid in arrived {
            self.enqueue(pid);
        }
    }

    fn enqueue(&mut self, pid: Pid) {
        let Some(process) = self.processes.get_mut(pid) else {
            return;
        };
        let entry = QueueEntry { pid, arrived_at: self.time_passed, left_at: None };
        self.ready_queue.push_back(entry);
        self.queue_history.push(QueueHistoryEntry { entry, remaining_time: process.remaining_time });
        process.fresh = false;
    }

    fn close_history(&mut self, pid: Pid) {
        let now = self.time_passed;
        if let Some(h) = self
            .queue_history
            .iter_mut()
            .find(|h| h.entry.pid == pid && h.entry.left_at.is_none())
        {
            h.entry.left_at = Some(now);
        }
    }

    fn dispatch_next(&mut self) {
        let Some(entry) = self.ready_queue.pop_front() else {
            self.soft_error(SimError::EmptyReadyQueue);
            return;
        };
        let pid = entry.pid;

        let kind = match self.processes.get_mut(pid) {
            Some(process) => {
                process.state = ProcessState::Executing;
                if process.has_run() { AllocationType::Full } else { AllocationType::Partial }
            }
            None => {
                self.soft_error(SimError::UnknownProcess(pid));
                return;
            }
        };

        self.close_history(pid);
        self.executing = Some(Execution { pid, processed_time: 0 });
        info!("{}: dispatched at tick {} ({:?} allocation)", pid, self.time_passed, kind);

        let evictable: Vec<Pid> = self
            .processes
            .iter()
            .filter(|p| p.pid != pid && p.is_evictable())
            .map(|p| p.pid)
            .collect();
        let report = self
            .physical
            .allocate_memory(&mut self.processes, pid, &evictable, kind, &mut self.rng);

        for victim in report.evicted {
            // frames are already gone; this settles queue and state
            let _ = self.terminate_process(victim);
        }
        if let Some(&page) = report.failed.first() {
            self.record(SimError::NoFreeFrame { pid, page });
        }
    }

    fn terminate_current(&mut self) {
        if let Some(Execution { pid, .. }) = self.executing.take() {
            let _ = self.terminate_process(pid);
        }
    }

    fn preempt_current(&mut self) {
        let Some(Execution { pid, .. }) = self.executing.take() else {
            return;
        };
        if let Some(process) = self.processes.get_mut(pid) {
            process.state = ProcessState::Waiting;
            self.physical.deallocate_memory(process, DeallocationType::Partial);
            info!("{}: preempted at tick {} ({} left)", pid, self.time_passed, process.remaining_time);
        }
        self.enqueue(pid);
    }

    /// Take `pid` off the CPU and the ready queue, release all of its frames
    /// and mark it finished or killed depending on whether it completed.
    fn terminate_process(&mut self, pid: Pid) -> Result<(), SimError> {
        if self.processes.get(pid).is_none() {
            return Err(SimError::UnknownProcess(pid));
        }

        if self.executing.is_some_and(|e| e.pid == pid) {
            self.executing = None;
        }
        self.ready_queue.retain(|e| e.pid != pid);
        self.close_history(pid);

        if let Some(process) = self.processes.get_mut(pid) {
            process.fresh = false;
            process.state = if process.remaining_time == 0 {
                ProcessState::Finished
            } else {
                ProcessState::Killed
            };
            self.physical.deallocate_memory(process, DeallocationType::Full);
            info!("{}: {} at tick {}", pid, process.state, self.time_passed);
        }
        Ok(())
    }

    fn record(&mut self, error: SimError) -> SimError {
        self.last_error = Some(error.clone());
        error
    }

    fn soft_error(&mut self, error: SimError) {
        error!("{}", error);
        self.record(error);
    }
}
