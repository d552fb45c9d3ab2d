use log::{debug, info, warn};
use rand::Rng;

use crate::constants::PARTIAL_RESIDENCY_PROBABILITY;
use crate::geometry::{Address, AddressGeometry};
use crate::process::{Occupant, Pid, ProcessEntry, ProcessTable};
use crate::translation::VirtualAddressSpace;

pub type FrameId = usize;

/// One byte of physical memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCell {
    pub address: Address,
    pub occupant: Option<Occupant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalFrame {
    pub id: FrameId,
    pub size: u64,
    pub active: bool,
    pub cells: Vec<FrameCell>,
}

impl PhysicalFrame {
    /// Occupant of the first byte, which is tagged whenever the frame is in use
    pub fn occupant(&self) -> Option<Occupant> {
        self.cells.first().and_then(|c| c.occupant)
    }

    fn release(&mut self) {
        for cell in &mut self.cells {
            cell.occupant = None;
        }
        self.active = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationType {
    /// Load the first page, and each later page with probability 1/3
    Partial,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeallocationType {
    /// Keep page 0 resident
    Partial,
    Full,
}

/// What an allocation pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationReport {
    /// (page index, frame) pairs mapped by this call
    pub mapped: Vec<(usize, FrameId)>,
    /// Pages that wanted a frame and got none
    pub failed: Vec<usize>,
    /// Processes whose frames were all taken
    pub evicted: Vec<Pid>,
}

/// The machine's physical memory, split into page-sized frames
#[derive(Debug, Clone)]
pub struct PhysicalFramePool {
    geometry: AddressGeometry,
    frames: Vec<PhysicalFrame>,
}

impl PhysicalFramePool {
    pub fn new(geometry: AddressGeometry) -> Self {
        let frames = (0..geometry.frame_count())
            .map(|id| PhysicalFrame {
                id,
                size: geometry.page_size(),
                active: false,
                cells: (0..geometry.page_size())
                    .map(|offset| FrameCell { address: geometry.address(id, offset), occupant: None })
                    .collect(),
            })
            .collect();

        PhysicalFramePool { geometry, frames }
    }

    #[inline]
    pub fn geometry(&self) -> &AddressGeometry {
        &self.geometry
    }

    #[inline]
    pub fn frames(&self) -> &[PhysicalFrame] {
        &self.frames
    }

    #[inline]
    pub fn frame(&self, id: FrameId) -> Option<&PhysicalFrame> {
        self.frames.get(id)
    }

    pub fn free_frame_count(&self) -> usize {
        self.frames.iter().filter(|f| !f.active).count()
    }

    /// First inactive frame in table order
    pub fn find_free_frame(&self) -> Option<FrameId> {
        self.frames.iter().position(|f| !f.active)
    }

    /// Map the unmapped pages of `target`.
    ///
    /// Page 0 is always requested; later pages are requested always under
    /// [`AllocationType::Full`] and on a 1-in-3 coin from `rng` under
    /// [`AllocationType::Partial`]. When the pool runs dry the processes in
    /// `evictable` are fully deallocated, in order, until enough frames are
    /// free for the rest of the pages. This happens at most once per call.
    pub fn allocate_memory<R: Rng + ?Sized>(
        &mut self,
        table: &mut ProcessTable,
        target: Pid,
        evictable: &[Pid],
        kind: AllocationType,
        rng: &mut R,
    ) -> AllocationReport {
        let mut report = AllocationReport::default();
        let Some(process) = table.get(target) else {
            return report;
        };
        let occupant = process.occupant();
        let page_count = process.virtual_memory.page_table().len();
        let mut evicted_once = false;

        for index in 0..page_count {
            let Some(process) = table.get(target) else {
                break;
            };
            if process.virtual_memory.page_table()[index].is_mapped() {
                continue;
            }

            let wanted = index == 0
                || kind == AllocationType::Full
                || rng.gen_bool(PARTIAL_RESIDENCY_PROBABILITY);
            if !wanted {
                debug!("{}: page {} left on disk", target, index);
                continue;
            }

            let mut frame = self.find_free_frame();
            if frame.is_none() && !evicted_once {
                evicted_once = true;
                let needed = process.virtual_memory.unmapped_from(index);
                report.evicted = self.evict(table, target, evictable, needed);
                frame = self.find_free_frame();
            }

            match (frame, table.get_mut(target)) {
                (Some(id), Some(process)) => {
                    self.map_block(id, &mut process.virtual_memory, index, occupant);
                    debug!("{}: page {} -> frame {}", target, index, id);
                    report.mapped.push((index, id));
                }
                _ => {
                    warn!("{}: no free frame for page {}", target, index);
                    report.failed.push(index);
                }
            }
        }

        report
    }

    /// Map every page of a reserved process. Never evicts.
    pub fn allocate_os_memory(&mut self, process: &mut ProcessEntry) -> AllocationReport {
        let mut report = AllocationReport::default();
        let occupant = process.occupant();

        for index in 0..process.virtual_memory.page_table().len() {
            if process.virtual_memory.page_table()[index].is_mapped() {
                continue;
            }
            match self.find_free_frame() {
                Some(id) => {
                    self.map_block(id, &mut process.virtual_memory, index, occupant);
                    report.mapped.push((index, id));
                }
                None => {
                    warn!("{}: no free frame for reserved page {}", occupant, index);
                    report.failed.push(index);
                }
            }
        }

        report
    }

    /// Unmap the pages of `process` and return the number of frames released
    pub fn deallocate_memory(&mut self, process: &mut ProcessEntry, kind: DeallocationType) -> usize {
        let skip = match kind {
            DeallocationType::Partial => 1,
            DeallocationType::Full => 0,
        };
        let mut released = 0;

        for entry in process.virtual_memory.page_table_mut().iter_mut().skip(skip) {
            let Some(id) = entry.mapped_frame.take() else {
                continue;
            };
            if let Some(frame) = self.frames.get_mut(id) {
                frame.release();
            }
            for cell in &mut entry.cells {
                cell.valid = false;
            }
            released += 1;
        }

        if released > 0 {
            debug!("{}: released {} frame(s)", process.pid, released);
        }
        released
    }

    fn evict(&mut self, table: &mut ProcessTable, target: Pid, evictable: &[Pid], needed: usize) -> Vec<Pid> {
        let mut freed = 0;
        let mut evicted = Vec::new();

        for &pid in evictable {
            if freed >= needed {
                break;
            }
            if pid == target {
                continue;
            }
            let Some(victim) = table.get_mut(pid) else {
                continue;
            };
            if victim.reserved {
                continue;
            }
            let released = self.deallocate_memory(victim, DeallocationType::Full);
            if released == 0 {
                continue;
            }
            info!("{}: evicted {} frame(s) for {}", pid, released, target);
            freed += released;
            evicted.push(pid);
        }

        evicted
    }

    /// Bind frame `id` to block `index`, tagging only the bytes the process uses
    fn map_block(&mut self, id: FrameId, space: &mut VirtualAddressSpace, index: usize, occupant: Occupant) {
        let used = space.used_bytes(index) as usize;
        let frame = &mut self.frames[id];
        for cell in frame.cells.iter_mut().take(used) {
            cell.occupant = Some(occupant);
        }
        frame.active = true;

        let entry = &mut space.page_table_mut()[index];
        for cell in entry.cells.iter_mut().take(used) {
            cell.valid = true;
        }
        entry.mapped_frame = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessState;
    use rand::rngs::mock::StepRng;

    fn always() -> StepRng {
        StepRng::new(0, 0)
    }

    fn never() -> StepRng {
        StepRng::new(u64::MAX, 0)
    }

    fn pool() -> PhysicalFramePool {
        PhysicalFramePool::new(AddressGeometry::new(1024, 256).unwrap())
    }

    fn spawn(table: &mut ProcessTable, size: u64, ran: bool) -> Pid {
        let template = VirtualAddressSpace::template(AddressGeometry::new(2048, 256).unwrap());
        table.insert_with(|pid| ProcessEntry {
            pid,
            size,
            burst_time: 10,
            allocation_time: 0,
            remaining_time: if ran { 8 } else { 10 },
            fresh: false,
            state: ProcessState::Waiting,
            reserved: false,
            virtual_memory: template.clone_for(size),
        })
    }

    fn owned_by(pool: &PhysicalFramePool, pid: Pid) -> usize {
        pool.frames()
            .iter()
            .filter(|f| f.cells.iter().any(|c| c.occupant == Some(Occupant::Process(pid))))
            .count()
    }

    #[test]
    fn test_pool_layout() {
        let pool = pool();
        assert_eq!(pool.frames().len(), 4);
        assert_eq!(pool.free_frame_count(), 4);
        let frame = pool.frame(2).unwrap();
        assert_eq!(frame.cells.len(), 256);
        assert_eq!(frame.cells[0].address.value, 512);
        assert_eq!(frame.cells[255].address.value, 767);
        assert!(pool.frames().iter().all(|f| !f.active && f.occupant().is_none()));
    }

    #[test]
    fn test_find_free_frame_is_first_fit() {
        let mut pool = pool();
        pool.frames[0].active = true;
        pool.frames[2].active = true;
        assert_eq!(pool.find_free_frame(), Some(1));
        pool.frames[1].active = true;
        pool.frames[3].active = true;
        assert_eq!(pool.find_free_frame(), None);
    }

    #[test]
    fn test_full_allocation_tags_only_used_bytes() {
        let mut pool = pool();
        let mut table = ProcessTable::new();
        let pid = spawn(&mut table, 300, false);

        let report = pool.allocate_memory(&mut table, pid, &[], AllocationType::Full, &mut never());
        assert_eq!(report.mapped, vec![(0, 0), (1, 1)]);
        assert!(report.failed.is_empty());

        let last = &pool.frames()[1];
        assert!(last.active);
        assert_eq!(last.cells.iter().filter(|c| c.occupant.is_some()).count(), 44);

        let space = &table.get(pid).unwrap().virtual_memory;
        assert_eq!(space.page_table()[1].cells.iter().filter(|c| c.valid).count(), 44);
        assert!(space.page_table()[0].cells.iter().all(|c| c.valid));
    }

    #[test]
    fn test_partial_allocation_follows_coin() {
        let mut pool = pool();
        let mut table = ProcessTable::new();
        let pid = spawn(&mut table, 768, false);

        let report = pool.allocate_memory(&mut table, pid, &[], AllocationType::Partial, &mut never());
        assert_eq!(report.mapped, vec![(0, 0)]);
        assert_eq!(table.get(pid).unwrap().virtual_memory.resident_pages(), 1);

        let other = spawn(&mut table, 768, false);
        let report = pool.allocate_memory(&mut table, other, &[], AllocationType::Partial, &mut always());
        assert_eq!(report.mapped, vec![(0, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn test_resume_keeps_resident_pages() {
        let mut pool = pool();
        let mut table = ProcessTable::new();
        let pid = spawn(&mut table, 768, false);

        pool.allocate_memory(&mut table, pid, &[], AllocationType::Full, &mut never());
        pool.deallocate_memory(table.get_mut(pid).unwrap(), DeallocationType::Partial);
        assert_eq!(pool.free_frame_count(), 3);

        let report = pool.allocate_memory(&mut table, pid, &[], AllocationType::Full, &mut never());
        assert_eq!(report.mapped, vec![(1, 1), (2, 2)]);
        assert_eq!(table.get(pid).unwrap().virtual_memory.page_table()[0].mapped_frame, Some(0));
    }

    #[test]
    fn test_full_deallocation_clears_everything() {
        let mut pool = pool();
        let mut table = ProcessTable::new();
        let pid = spawn(&mut table, 700, false);
        pool.allocate_memory(&mut table, pid, &[], AllocationType::Full, &mut never());

        let released = pool.deallocate_memory(table.get_mut(pid).unwrap(), DeallocationType::Full);
        assert_eq!(released, 3);
        assert_eq!(owned_by(&pool, pid), 0);
        assert_eq!(pool.free_frame_count(), 4);
        let space = &table.get(pid).unwrap().virtual_memory;
        assert!(space.page_table().iter().all(|p| p.mapped_frame.is_none()));
        assert!(space.page_table().iter().all(|p| p.cells.iter().all(|c| !c.valid)));
    }

    #[test]
    fn test_partial_deallocation_keeps_first_page() {
        let mut pool = pool();
        let mut table = ProcessTable::new();
        let pid = spawn(&mut table, 700, false);
        pool.allocate_memory(&mut table, pid, &[], AllocationType::Full, &mut never());

        let released = pool.deallocate_memory(table.get_mut(pid).unwrap(), DeallocationType::Partial);
        assert_eq!(released, 2);
        let space = &table.get(pid).unwrap().virtual_memory;
        assert_eq!(space.page_table()[0].mapped_frame, Some(0));
        assert!(space.page_table()[1..].iter().all(|p| p.mapped_frame.is_none()));
        assert_eq!(owned_by(&pool, pid), 1);

        // a process whose first page was never mapped keeps nothing
        let other = spawn(&mut table, 300, false);
        let released = pool.deallocate_memory(table.get_mut(other).unwrap(), DeallocationType::Partial);
        assert_eq!(released, 0);
        assert!(table.get(other).unwrap().virtual_memory.page_table()[0].mapped_frame.is_none());
    }

    #[test]
    fn test_eviction_frees_needed_frames_in_order() {
        let mut pool = pool();
        let mut table = ProcessTable::new();
        let a = spawn(&mut table, 512, true);
        let b = spawn(&mut table, 512, true);
        pool.allocate_memory(&mut table, a, &[], AllocationType::Full, &mut never());
        pool.allocate_memory(&mut table, b, &[], AllocationType::Full, &mut never());
        assert_eq!(pool.free_frame_count(), 0);

        let c = spawn(&mut table, 512, false);
        let report = pool.allocate_memory(&mut table, c, &[a, b], AllocationType::Full, &mut never());

        // two frames needed, the first candidate alone covers it
        assert_eq!(report.evicted, vec![a]);
        assert_eq!(report.mapped, vec![(0, 0), (1, 1)]);
        assert_eq!(owned_by(&pool, a), 0);
        assert_eq!(owned_by(&pool, b), 2);
        assert_eq!(owned_by(&pool, c), 2);
    }

    #[test]
    fn test_eviction_happens_once_and_failures_are_partial() {
        let mut pool = pool();
        let mut table = ProcessTable::new();
        let a = spawn(&mut table, 256, true);
        let b = spawn(&mut table, 768, true);
        pool.allocate_memory(&mut table, a, &[], AllocationType::Full, &mut never());
        pool.allocate_memory(&mut table, b, &[], AllocationType::Full, &mut never());

        // b is not offered for eviction, so only a's single frame comes back
        let c = spawn(&mut table, 768, false);
        let report = pool.allocate_memory(&mut table, c, &[a], AllocationType::Full, &mut never());
        assert_eq!(report.evicted, vec![a]);
        assert_eq!(report.mapped, vec![(0, 0)]);
        assert_eq!(report.failed, vec![1, 2]);
        assert_eq!(owned_by(&pool, b), 3);
    }

    #[test]
    fn test_eviction_skips_target_and_empty_processes() {
        let mut pool = pool();
        let mut table = ProcessTable::new();
        let idle = spawn(&mut table, 256, true);
        let hog = spawn(&mut table, 1024, true);
        pool.allocate_memory(&mut table, hog, &[], AllocationType::Full, &mut never());

        let report = pool.allocate_memory(&mut table, idle, &[idle, hog], AllocationType::Full, &mut never());
        assert_eq!(report.evicted, vec![hog]);
        assert_eq!(report.mapped, vec![(0, 0)]);
    }

    #[test]
    fn test_os_memory_never_evicts() {
        let mut pool = pool();
        let mut table = ProcessTable::new();
        let a = spawn(&mut table, 768, true);
        pool.allocate_memory(&mut table, a, &[], AllocationType::Full, &mut never());

        let os = spawn(&mut table, 512, false);
        let entry = table.get_mut(os).unwrap();
        entry.reserved = true;
        let report = pool.allocate_os_memory(entry);
        assert_eq!(report.mapped, vec![(0, 3)]);
        assert_eq!(report.failed, vec![1]);
        assert!(report.evicted.is_empty());
        assert_eq!(pool.frames()[3].occupant(), Some(Occupant::Os));
        assert_eq!(owned_by(&pool, a), 3);
    }
}
