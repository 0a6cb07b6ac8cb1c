//! Parameter store collaborators
mod mem;


pub use mem::MemParamStore;
