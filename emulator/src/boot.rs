//! The boot image: trap vector table, trap service routines and device
//! register defaults.
//!
//! The routines are hand-assembled and placed high in memory, below the
//! device registers. They are written into memory silently, without going
//! through the observation hooks, both at startup and after a
//! [`clear`][crate::runtime::Memory::clear].

use crate::constants::{Address, Word};

/// Words the boot image pins into memory.
pub(crate) const IMAGE: &[(Address, Word)] = &[
    // Trap vector table
    (0x0020, 0xFD00), // GETC
    (0x0021, 0xFD10), // OUT
    (0x0022, 0xFD20), // PUTS
    (0x0023, 0xFD40), // IN
    (0x0024, 0xFD50), // PUTSP
    (0x0025, 0xFD79), // HALT
    //
    // GETC: wait for a key, read it into R0
    (0xFD00, 0xA203), // LDI R1, KBSR
    (0xFD01, 0x07FE), // BRzp xFD00
    (0xFD02, 0xA002), // LDI R0, KBDR
    (0xFD03, 0xC1C0), // RET
    (0xFD04, 0xFE00), // KBSR
    (0xFD05, 0xFE02), // KBDR
    //
    // OUT: wait for the display, write R0 to it
    (0xFD10, 0xA403), // LDI R2, DSR
    (0xFD11, 0x07FE), // BRzp xFD10
    (0xFD12, 0xB002), // STI R0, DDR
    (0xFD13, 0xC1C0), // RET
    (0xFD14, 0xFE04), // DSR
    (0xFD15, 0xFE06), // DDR
    //
    // PUTS: write the zero-terminated string at R0, one char per word
    (0xFD20, 0x6200), // LDR R1, R0, #0
    (0xFD21, 0x0405), // BRz xFD27
    (0xFD22, 0xA405), // LDI R2, DSR
    (0xFD23, 0x07FE), // BRzp xFD22
    (0xFD24, 0xB204), // STI R1, DDR
    (0xFD25, 0x1021), // ADD R0, R0, #1
    (0xFD26, 0x0FF9), // BRnzp xFD20
    (0xFD27, 0xC1C0), // RET
    (0xFD28, 0xFE04), // DSR
    (0xFD29, 0xFE06), // DDR
    //
    // IN: like GETC, but echo the character back to the display
    (0xFD40, 0xA209), // LDI R1, KBSR
    (0xFD41, 0x07FE), // BRzp xFD40
    (0xFD42, 0xA008), // LDI R0, KBDR
    (0xFD43, 0xA408), // LDI R2, DSR
    (0xFD44, 0x07FE), // BRzp xFD43
    (0xFD45, 0xB007), // STI R0, DDR
    (0xFD46, 0xC1C0), // RET
    (0xFD4A, 0xFE00), // KBSR
    (0xFD4B, 0xFE02), // KBDR
    (0xFD4C, 0xFE04), // DSR
    (0xFD4D, 0xFE06), // DDR
    //
    // PUTSP: write the packed string at R0, two chars per word, low byte
    // first. The high byte is recovered with a bit-serial shift since the
    // LC-3 has no shift instruction.
    (0xFD50, 0x6200), // LDR R1, R0, #0
    (0xFD51, 0x0417), // BRz xFD69
    (0xFD52, 0x2617), // LD R3, xFD6A (low byte mask)
    (0xFD53, 0x5443), // AND R2, R1, R3
    (0xFD54, 0x0414), // BRz xFD69
    (0xFD55, 0xA815), // LDI R4, DSR
    (0xFD56, 0x07FE), // BRzp xFD55
    (0xFD57, 0xB414), // STI R2, DDR
    (0xFD58, 0x54A0), // AND R2, R2, #0
    (0xFD59, 0x5920), // AND R4, R4, #0
    (0xFD5A, 0x1928), // ADD R4, R4, #8
    (0xFD5B, 0x1482), // ADD R2, R2, R2
    (0xFD5C, 0x1260), // ADD R1, R1, #0
    (0xFD5D, 0x0601), // BRzp xFD5F
    (0xFD5E, 0x14A1), // ADD R2, R2, #1
    (0xFD5F, 0x1241), // ADD R1, R1, R1
    (0xFD60, 0x193F), // ADD R4, R4, #-1
    (0xFD61, 0x03F9), // BRp xFD5B
    (0xFD62, 0x14A0), // ADD R2, R2, #0 (CC from the high byte)
    (0xFD63, 0x0405), // BRz xFD69
    (0xFD64, 0xA806), // LDI R4, DSR
    (0xFD65, 0x07FE), // BRzp xFD64
    (0xFD66, 0xB405), // STI R2, DDR
    (0xFD67, 0x1021), // ADD R0, R0, #1
    (0xFD68, 0x0FE7), // BRnzp xFD50
    (0xFD69, 0xC1C0), // RET
    (0xFD6A, 0x00FF), // low byte mask
    (0xFD6B, 0xFE04), // DSR
    (0xFD6C, 0xFE06), // DDR
    //
    // HALT parks the machine: the fetch loop stops before executing this
    // word, and the branch-to-self keeps single-stepping harmless.
    (0xFD79, 0x0FFF), // BRnzp xFD79
    //
    // The display starts out ready. Without this the output poller would
    // emit a stray NUL on the first cycle.
    (0xFE04, 0x8000),
];

/// Symbols exported by the boot image, merged into every loaded program's
/// symbol table.
pub(crate) const SYMBOLS: &[(&str, Word)] = &[
    ("GETC", 0xFD00),
    ("OUT", 0xFD10),
    ("PUTS", 0xFD20),
    ("IN", 0xFD40),
    ("PUTSP", 0xFD50),
    ("HALT", 0xFD79),
    ("KBSR", 0xFE00),
    ("KBDR", 0xFE02),
    ("DSR", 0xFE04),
    ("DDR", 0xFE06),
];
