use crate::geometry::{Address, AddressGeometry};
use crate::memory::FrameId;

/// One byte of a virtual page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualCell {
    pub address: Address,
    pub valid: bool,
}

impl VirtualCell {
    #[inline]
    pub fn valid_bit(&self) -> u8 {
        self.valid as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTableEntry {
    pub id: usize,
    pub size: u64,
    pub cells: Vec<VirtualCell>,
    pub mapped_frame: Option<FrameId>,
}

impl PageTableEntry {
    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.mapped_frame.is_some()
    }
}

/// A process's view of memory.
///
/// The scheduler keeps one empty template describing the virtual geometry and
/// calls [`clone_for`](Self::clone_for) to give each process its own page
/// table. The page table length is fixed at that point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualAddressSpace {
    geometry: AddressGeometry,
    process_size: u64,
    page_table: Vec<PageTableEntry>,
}

impl VirtualAddressSpace {
    pub fn template(geometry: AddressGeometry) -> Self {
        VirtualAddressSpace { geometry, process_size: 0, page_table: Vec::new() }
    }

    /// Fresh instance with `ceil(process_size / page_size)` unmapped blocks
    pub fn clone_for(&self, process_size: u64) -> Self {
        let geometry = self.geometry;
        let page_table = (0..geometry.pages_for(process_size))
            .map(|id| PageTableEntry {
                id,
                size: geometry.page_size(),
                cells: (0..geometry.page_size())
                    .map(|offset| VirtualCell { address: geometry.address(id, offset), valid: false })
                    .collect(),
                mapped_frame: None,
            })
            .collect();

        VirtualAddressSpace { geometry, process_size, page_table }
    }

    #[inline]
    pub fn geometry(&self) -> &AddressGeometry {
        &self.geometry
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.geometry.total_size()
    }

    #[inline]
    pub fn process_size(&self) -> u64 {
        self.process_size
    }

    #[inline]
    pub fn page_table(&self) -> &[PageTableEntry] {
        &self.page_table
    }

    #[inline]
    pub(crate) fn page_table_mut(&mut self) -> &mut [PageTableEntry] {
        &mut self.page_table
    }

    /// Bytes of the process that live in block `index`
    pub fn used_bytes(&self, index: usize) -> u64 {
        if index + 1 == self.page_table.len() {
            self.last_page_size()
        } else {
            self.geometry.page_size()
        }
    }

    /// Bytes of the process held by its final page
    pub fn last_page_size(&self) -> u64 {
        let page_size = self.geometry.page_size();
        page_size - (self.page_table.len() as u64 * page_size - self.process_size)
    }

    pub fn resident_pages(&self) -> usize {
        self.page_table.iter().filter(|p| p.is_mapped()).count()
    }

    /// Unmapped blocks at or after `index`
    pub fn unmapped_from(&self, index: usize) -> usize {
        self.page_table.iter().skip(index).filter(|p| !p.is_mapped()).count()
    }

    pub fn is_fully_resident(&self) -> bool {
        self.page_table.iter().all(PageTableEntry::is_mapped)
    }

    /// Resolve a virtual address through the page table
    pub fn translate(&self, address: u64) -> TranslationResult {
        if address >= self.process_size {
            return TranslationResult::OutOfBounds;
        }

        let page = self.geometry.page_of(address) as usize;
        let offset = self.geometry.offset_of(address);
        let entry = &self.page_table[page];

        match entry.mapped_frame {
            Some(frame) if entry.cells[offset as usize].valid => {
                TranslationResult::Success(frame as u64 * self.geometry.page_size() + offset)
            }
            _ => TranslationResult::PageNotResident,
        }
    }
}

/// Result of an address translation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationResult {
    Success(u64),
    OutOfBounds,
    PageNotResident,
}

impl TranslationResult {
    pub fn physical(&self) -> Option<u64> {
        match self {
            TranslationResult::Success(pa) => Some(*pa),
            _ => None,
        }
    }
}
