//! Instruction decoding and execution.

use parse_display::Display;

use super::memory::MemoryError;
use super::registers::{Cc, Condition, Reg};
use super::{Computer, ProcessorError};
use crate::constants::{Address, Word};
use crate::util::sext;

/// The second ALU operand: a register or a sign-extended immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Source {
    #[display("{0}")]
    Register(Reg),
    #[display("#{0}")]
    Immediate(i16),
}

impl Source {
    fn value(self, computer: &Computer) -> Word {
        match self {
            Source::Register(reg) => computer.registers.general(reg),
            Source::Immediate(value) => value as Word,
        }
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Instruction {
    #[display("ADD {dr}, {sr1}, {src}")]
    Add { dr: Reg, sr1: Reg, src: Source },

    #[display("AND {dr}, {sr1}, {src}")]
    And { dr: Reg, sr1: Reg, src: Source },

    #[display("NOT {dr}, {sr}")]
    Not { dr: Reg, sr: Reg },

    #[display("BR{cond} #{offset}")]
    Br { cond: Condition, offset: i16 },

    #[display("JMP {base}")]
    Jmp { base: Reg },

    #[display("JSR #{offset}")]
    Jsr { offset: i16 },

    #[display("JSRR {base}")]
    Jsrr { base: Reg },

    #[display("LD {dr}, #{offset}")]
    Ld { dr: Reg, offset: i16 },

    #[display("LDI {dr}, #{offset}")]
    Ldi { dr: Reg, offset: i16 },

    #[display("LDR {dr}, {base}, #{offset}")]
    Ldr { dr: Reg, base: Reg, offset: i16 },

    #[display("LEA {dr}, #{offset}")]
    Lea { dr: Reg, offset: i16 },

    #[display("ST {sr}, #{offset}")]
    St { sr: Reg, offset: i16 },

    #[display("STI {sr}, #{offset}")]
    Sti { sr: Reg, offset: i16 },

    #[display("STR {sr}, {base}, #{offset}")]
    Str { sr: Reg, base: Reg, offset: i16 },

    #[display("TRAP x{vector:02X}")]
    Trap { vector: u8 },

    #[display("RTI")]
    Rti,
}

/// Effective address arithmetic is done wide: a base plus a negative
/// offset must not wrap around, it must fail.
fn effective_address(base: Word, offset: i16) -> Result<Address, MemoryError> {
    let address = i64::from(base) + i64::from(offset);
    Address::try_from(address).map_err(|_| MemoryError::OutOfBounds { address })
}

impl Instruction {
    /// Decode a machine word.
    ///
    /// Opcode `0xD` is unused in this architecture and fails to decode.
    pub fn decode(word: Word) -> Result<Self, ProcessorError> {
        let dr = Reg::from_bits(word >> 9);
        let sr1 = Reg::from_bits(word >> 6);
        let src = if word & 0x0020 == 0 {
            Source::Register(Reg::from_bits(word))
        } else {
            Source::Immediate(sext(word, 5))
        };

        let instruction = match word >> 12 {
            0x0 => Instruction::Br {
                cond: Condition::from_bits_truncate(word),
                offset: sext(word, 9),
            },
            0x1 => Instruction::Add { dr, sr1, src },
            0x2 => Instruction::Ld {
                dr,
                offset: sext(word, 9),
            },
            0x3 => Instruction::St {
                sr: dr,
                offset: sext(word, 9),
            },
            0x4 => {
                if word & 0x0800 == 0 {
                    Instruction::Jsrr { base: sr1 }
                } else {
                    Instruction::Jsr {
                        offset: sext(word, 11),
                    }
                }
            }
            0x5 => Instruction::And { dr, sr1, src },
            0x6 => Instruction::Ldr {
                dr,
                base: sr1,
                offset: sext(word, 6),
            },
            0x7 => Instruction::Str {
                sr: dr,
                base: sr1,
                offset: sext(word, 6),
            },
            0x8 => Instruction::Rti,
            0x9 => Instruction::Not { dr, sr: sr1 },
            0xA => Instruction::Ldi {
                dr,
                offset: sext(word, 9),
            },
            0xB => Instruction::Sti {
                sr: dr,
                offset: sext(word, 9),
            },
            0xC => Instruction::Jmp { base: sr1 },
            0xE => Instruction::Lea {
                dr,
                offset: sext(word, 9),
            },
            0xF => Instruction::Trap {
                vector: (word & 0xFF) as u8,
            },
            _ => return Err(ProcessorError::InvalidOpcode(word)),
        };

        Ok(instruction)
    }

    /// Execute the instruction. The program counter was already advanced
    /// past it by the fetch.
    pub(crate) fn execute(self, computer: &mut Computer) -> Result<(), ProcessorError> {
        use Instruction as I;

        match self {
            I::Add { dr, sr1, src } => {
                let value = computer
                    .registers
                    .general(sr1)
                    .wrapping_add(src.value(computer));
                computer.registers.set_general(dr, value);
                computer.registers.set_cc(Cc::of(value));
            }

            I::And { dr, sr1, src } => {
                let value = computer.registers.general(sr1) & src.value(computer);
                computer.registers.set_general(dr, value);
                computer.registers.set_cc(Cc::of(value));
            }

            I::Not { dr, sr } => {
                let value = !computer.registers.general(sr);
                computer.registers.set_general(dr, value);
                computer.registers.set_cc(Cc::of(value));
            }

            I::Br { cond, offset } => {
                if cond.matches(computer.registers.cc()) {
                    let pc = computer.registers.pc().wrapping_add(offset as Word);
                    computer.registers.set_pc(pc);
                }
            }

            I::Jmp { base } => {
                let target = computer.registers.general(base);
                computer.registers.set_pc(target);
            }

            I::Jsr { offset } => {
                let pc = computer.registers.pc();
                computer.registers.set_general(Reg::R7, pc);
                computer.registers.set_pc(pc.wrapping_add(offset as Word));
            }

            I::Jsrr { base } => {
                // Read the base first: JSRR R7 must jump to the old value
                let target = computer.registers.general(base);
                let pc = computer.registers.pc();
                computer.registers.set_general(Reg::R7, pc);
                computer.registers.set_pc(target);
            }

            I::Ld { dr, offset } => {
                let address = effective_address(computer.registers.pc(), offset)?;
                let value = computer.memory.read(address)?;
                computer.registers.set_general(dr, value);
                computer.registers.set_cc(Cc::of(value));
            }

            I::Ldi { dr, offset } => {
                let address = effective_address(computer.registers.pc(), offset)?;
                let pointer = computer.memory.read(address)?;
                let value = computer.memory.read(Address::from(pointer))?;
                computer.registers.set_general(dr, value);
                computer.registers.set_cc(Cc::of(value));
            }

            I::Ldr { dr, base, offset } => {
                let address = effective_address(computer.registers.general(base), offset)?;
                let value = computer.memory.read(address)?;
                computer.registers.set_general(dr, value);
                computer.registers.set_cc(Cc::of(value));
            }

            I::Lea { dr, offset } => {
                let value = computer.registers.pc().wrapping_add(offset as Word);
                computer.registers.set_general(dr, value);
                computer.registers.set_cc(Cc::of(value));
            }

            I::St { sr, offset } => {
                let address = effective_address(computer.registers.pc(), offset)?;
                computer
                    .memory
                    .write(address, computer.registers.general(sr))?;
            }

            I::Sti { sr, offset } => {
                let address = effective_address(computer.registers.pc(), offset)?;
                let pointer = computer.memory.read(address)?;
                computer
                    .memory
                    .write(Address::from(pointer), computer.registers.general(sr))?;
            }

            I::Str { sr, base, offset } => {
                let address = effective_address(computer.registers.general(base), offset)?;
                computer
                    .memory
                    .write(address, computer.registers.general(sr))?;
            }

            I::Trap { vector } => {
                let pc = computer.registers.pc();
                computer.registers.set_general(Reg::R7, pc);
                let target = computer.memory.read(Address::from(vector))?;
                computer.registers.set_pc(target);
            }

            I::Rti => return Err(ProcessorError::NotImplemented("RTI")),
        }

        Ok(())
    }
}
