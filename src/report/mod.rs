//! Report rendering and output files.

pub mod generator;
pub mod writer;

pub use generator::*;
pub use writer::*;
