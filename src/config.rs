use std::time::Duration;

use crate::constants::*;
use crate::error::SimError;
use crate::geometry::AddressGeometry;

/// Everything fixed when a simulation is built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    pub physical_size: u64,
    pub virtual_size: u64,
    pub page_size: u64,
    pub quantum: u32,
    pub base_interval: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            physical_size: DEFAULT_PHYSICAL_SIZE,
            virtual_size: DEFAULT_VIRTUAL_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            quantum: DEFAULT_QUANTUM,
            base_interval: BASE_TICK_INTERVAL,
        }
    }
}

impl SimulationConfig {
    /// Same-sized physical and virtual memory
    pub fn new(total_size: u64, page_size: u64, quantum: u32) -> Self {
        SimulationConfig {
            physical_size: total_size,
            virtual_size: total_size,
            page_size,
            quantum,
            ..Self::default()
        }
    }

    /// Validate and derive the (physical, virtual) geometries
    pub fn geometries(&self) -> Result<(AddressGeometry, AddressGeometry), SimError> {
        if self.quantum == 0 {
            return Err(SimError::ZeroQuantum);
        }
        let physical = AddressGeometry::new(self.physical_size, self.page_size)?;
        let virtual_ = AddressGeometry::new(self.virtual_size, self.page_size)?;
        Ok((physical, virtual_))
    }
}
