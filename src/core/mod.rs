//! Foundational pieces shared by every other module: the error taxonomy,
//! engine configuration, byte devices, and the low-level lexer.

mod config;
mod device;
mod error;
pub mod lexer;

pub use config::*;
pub use device::*;
pub use error::*;
