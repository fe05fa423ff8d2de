//! Bundled engine implementations.

mod in_memory;

pub use in_memory::InMemory;
