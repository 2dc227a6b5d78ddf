//! An assembler and emulator for the LC-3, the 16-bit educational
//! computer.
//!
//! The [`assembler`] module turns assembly source into a [`Program`]; the
//! [`runtime`] module executes one on a [`Computer`], complete with the
//! memory-mapped console devices and the trap routines of the boot image.

pub mod assembler;
mod boot;
pub mod constants;
pub mod runtime;
mod util;

pub use assembler::{compile, compile_source, Program};
pub use runtime::Computer;
