//! Owned model of the JVM class file format
//!
//! Parsing and serializing are exact inverses: a class that is read and written back without
//! modification comes out byte-identical. Only the pieces needed to patch methods get structured
//! representations, everything else stays as raw attribute bytes.

mod access_flags;
mod binary_format;
pub mod bytecode;
mod class_file;
mod code;
mod constants;
mod errors;
mod offset_vec;
mod pool;
mod version;

pub use access_flags::*;
pub use binary_format::*;
pub use class_file::*;
pub use code::*;
pub use constants::*;
pub use errors::*;
pub use offset_vec::*;
pub use pool::*;
pub use version::*;
