pub mod config;
pub mod constants;
pub mod error;
pub mod geometry;
pub mod io;
pub mod memory;
pub mod process;
pub mod scheduler;
pub mod ticker;
pub mod translation;

// Re-export commonly used items for convenience
pub use config::SimulationConfig;
pub use error::{SimError, WorkloadError};
pub use geometry::AddressGeometry;
pub use memory::{AllocationType, DeallocationType, PhysicalFramePool};
pub use process::{Occupant, Pid, ProcessState};
pub use scheduler::{Scheduler, TickRecord};
pub use translation::{TranslationResult, VirtualAddressSpace};
