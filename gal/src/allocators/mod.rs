/// Implements [`gpu_allocator`] as the primary allocator
pub mod gpu_allocator_impl;
pub mod memory_type;

pub use gpu_allocator_impl::*;
pub use memory_type::*;
