use std::fmt;

use crate::error::SimError;

/// Bit-width facts derived from a memory size and its page size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressGeometry {
    total_size: u64,
    page_size: u64,
    offset_bits: u32,
    address_bits: u32,
}

impl AddressGeometry {
    /// Both sizes must be non-zero powers of two with `page_size <= total_size`.
    pub fn new(total_size: u64, page_size: u64) -> Result<Self, SimError> {
        check_size("total", total_size)?;
        check_size("page", page_size)?;
        if page_size > total_size {
            return Err(SimError::PageLargerThanMemory { page_size, total_size });
        }

        Ok(AddressGeometry {
            total_size,
            page_size,
            offset_bits: page_size.trailing_zeros(),
            address_bits: total_size.trailing_zeros(),
        })
    }

    #[inline]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    #[inline]
    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    #[inline]
    pub fn offset_bits(&self) -> u32 {
        self.offset_bits
    }

    #[inline]
    pub fn address_bits(&self) -> u32 {
        self.address_bits
    }

    #[inline]
    pub fn page_address_bits(&self) -> u32 {
        self.address_bits - self.offset_bits
    }

    /// Number of page-sized blocks the memory holds
    #[inline]
    pub fn frame_count(&self) -> usize {
        1usize << self.page_address_bits()
    }

    #[inline]
    pub fn offset_mask(&self) -> u64 {
        self.page_size - 1
    }

    /// Page index an address falls into
    #[inline]
    pub fn page_of(&self, address: u64) -> u64 {
        address >> self.offset_bits
    }

    #[inline]
    pub fn offset_of(&self, address: u64) -> u64 {
        address & self.offset_mask()
    }

    /// Pages needed to hold `size` bytes (rounded up)
    pub fn pages_for(&self, size: u64) -> usize {
        size.div_ceil(self.page_size) as usize
    }

    /// Address of byte `offset` within page `page`, sized to this memory
    pub fn address(&self, page: usize, offset: u64) -> Address {
        Address {
            value: page as u64 * self.page_size + offset,
            width: self.address_bits,
        }
    }
}

fn check_size(name: &'static str, value: u64) -> Result<(), SimError> {
    if value == 0 {
        return Err(SimError::ZeroSize { name });
    }
    if !value.is_power_of_two() {
        return Err(SimError::NotPowerOfTwo { name, value });
    }
    Ok(())
}

/// A byte address printed as fixed-width binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Address {
    pub value: u64,
    pub width: u32,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$b}", self.value, width = self.width as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_geometry() {
        let g = AddressGeometry::new(1024, 256).unwrap();
        assert_eq!(g.address_bits(), 10);
        assert_eq!(g.offset_bits(), 8);
        assert_eq!(g.page_address_bits(), 2);
        assert_eq!(g.frame_count(), 4);
    }

    #[test]
    fn test_frame_count_matches_bit_widths() {
        for &(total, page) in &[(1024, 1), (4096, 512), (1 << 20, 4096), (64, 64)] {
            let g = AddressGeometry::new(total, page).unwrap();
            assert_eq!(g.frame_count(), 1usize << (g.address_bits() - g.offset_bits()));
            assert_eq!(g.frame_count() as u64 * g.page_size(), g.total_size());
        }
    }

    #[test]
    fn test_rejects_bad_sizes() {
        assert_eq!(
            AddressGeometry::new(0, 256),
            Err(SimError::ZeroSize { name: "total" })
        );
        assert_eq!(
            AddressGeometry::new(1000, 8),
            Err(SimError::NotPowerOfTwo { name: "total", value: 1000 })
        );
        assert_eq!(
            AddressGeometry::new(1024, 100),
            Err(SimError::NotPowerOfTwo { name: "page", value: 100 })
        );
        assert_eq!(
            AddressGeometry::new(256, 512),
            Err(SimError::PageLargerThanMemory { page_size: 512, total_size: 256 })
        );
    }

    #[test]
    fn test_page_and_offset_split() {
        let g = AddressGeometry::new(1024, 256).unwrap();
        assert_eq!(g.page_of(300), 1);
        assert_eq!(g.offset_of(300), 44);
        assert_eq!(g.page_of(255), 0);
        assert_eq!(g.offset_of(256), 0);
    }

    #[test]
    fn test_pages_for_rounds_up() {
        let g = AddressGeometry::new(1024, 256).unwrap();
        assert_eq!(g.pages_for(0), 0);
        assert_eq!(g.pages_for(1), 1);
        assert_eq!(g.pages_for(256), 1);
        assert_eq!(g.pages_for(300), 2);
        assert_eq!(g.pages_for(1024), 4);
    }

    #[test]
    fn test_address_display_is_fixed_width_binary() {
        let g = AddressGeometry::new(1024, 256).unwrap();
        assert_eq!(g.address(0, 0).to_string(), "0000000000");
        assert_eq!(g.address(1, 3).to_string(), "0100000011");
        assert_eq!(g.address(3, 255).to_string(), "1111111111");
    }
}
