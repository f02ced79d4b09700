pub mod error;
pub mod prelude;
pub mod slot;
pub mod slot_map;

pub use error::ContainerErrors;
pub use slot::Slot;
pub use slot_map::SlotMap;
