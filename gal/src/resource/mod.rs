pub mod acceleration_structure;
pub mod buffer;
pub mod dedicated_buffer;
pub mod image;

pub use acceleration_structure::{AccelerationStructure, AccelerationStructureCreateInfo};
pub use buffer::{Buffer, BufferCreateInfo};
pub use dedicated_buffer::DedicatedBuffer;
