pub mod allocation;
pub mod compressor;

pub use allocation::*;
pub use compressor::*;
