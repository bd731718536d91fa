pub mod memory;

pub use memory::MemoryCli;
pub use memory::run;
