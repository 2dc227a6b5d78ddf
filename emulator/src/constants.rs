//! Various constants for the LC-3 architecture.

/// A machine word. Everything in the LC-3 is 16 bits wide: memory cells,
/// registers and instructions.
pub type Word = u16;

/// An address in memory.
///
/// This is wider than a [`Word`] on purpose: effective address arithmetic is
/// done before bounds checking, so intermediate values may fall outside the
/// 16-bit range.
pub type Address = u32;

/// Number of addressable words.
pub const MEMORY_SIZE: Address = 0x1_0000;

/// Program counter value after a reset, and default origin for user programs.
pub const DEFAULT_PC: Word = 0x3000;

/// Parking address of the HALT trap routine. The processor stops fetching
/// when the program counter reaches this address.
pub const HALT_ADDRESS: Word = 0xFD79;

/// Keyboard status register.
pub const KBSR: Address = 0xFE00;

/// Keyboard data register.
pub const KBDR: Address = 0xFE02;

/// Display status register.
pub const DSR: Address = 0xFE04;

/// Display data register.
pub const DDR: Address = 0xFE06;

/// Ready bit of the two status registers.
pub const DEVICE_READY: Word = 0x8000;

/// Number of register file slots: R0 to R7, then PC and CC.
pub const REGISTER_COUNT: u8 = 10;

/// Register file index of the program counter.
pub const PC_INDEX: u8 = 8;

/// Register file index of the condition code.
pub const CC_INDEX: u8 = 9;
