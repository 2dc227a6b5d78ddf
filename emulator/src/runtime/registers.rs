//! The register file: R0 to R7, the program counter and the condition
//! code.
//!
//! The slots are addressable by index for the host control surface (R0-R7
//! are 0-7, PC is 8, CC is 9), and by typed accessors for the execution
//! engine. Writes can be observed per slot or globally.

use std::collections::HashMap;
use std::fmt;

use bitflags::bitflags;
use parse_display::{Display, FromStr};
use thiserror::Error;

use crate::constants::{Word, CC_INDEX, DEFAULT_PC, PC_INDEX, REGISTER_COUNT};

/// A register file index outside the ten valid slots.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid register index {0}")]
pub struct RegisterError(pub u8);

/// A general purpose register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, FromStr)]
pub enum Reg {
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
}

impl Reg {
    /// The register number, for instruction encoding.
    pub(crate) fn bits(self) -> Word {
        self as Word
    }

    /// Decode a register from the low three bits of a word.
    pub(crate) fn from_bits(word: Word) -> Self {
        match word & 0x7 {
            0 => Reg::R0,
            1 => Reg::R1,
            2 => Reg::R2,
            3 => Reg::R3,
            4 => Reg::R4,
            5 => Reg::R5,
            6 => Reg::R6,
            _ => Reg::R7,
        }
    }
}

/// The condition code, set by every instruction that writes a general
/// purpose register through the ALU or a load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[display(style = "lowercase")]
pub enum Cc {
    Negative,
    #[default]
    Zero,
    Positive,
}

impl Cc {
    /// Condition code for a freshly written value.
    pub(crate) fn of(value: Word) -> Self {
        match (value as i16).signum() {
            -1 => Cc::Negative,
            0 => Cc::Zero,
            _ => Cc::Positive,
        }
    }

    /// The value stored in the CC slot of the register file.
    pub(crate) fn as_word(self) -> Word {
        match self {
            Cc::Negative => 0xFFFF,
            Cc::Zero => 0,
            Cc::Positive => 1,
        }
    }
}

bitflags! {
    /// Condition mask of a `BR` instruction, stored in the position the
    /// bits occupy in the instruction word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Condition: u16 {
        const P = 0x0200;
        const Z = 0x0400;
        const N = 0x0800;
    }
}

impl Condition {
    /// Does the current condition code satisfy this mask?
    pub(crate) fn matches(self, cc: Cc) -> bool {
        match cc {
            Cc::Negative => self.contains(Condition::N),
            Cc::Zero => self.contains(Condition::Z),
            Cc::Positive => self.contains(Condition::P),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.contains(Condition::N) {
            write!(f, "n")?;
        }
        if self.contains(Condition::Z) {
            write!(f, "z")?;
        }
        if self.contains(Condition::P) {
            write!(f, "p")?;
        }
        Ok(())
    }
}

type WriteHook = Box<dyn FnMut(Word)>;
type Observer = Box<dyn FnMut(u8, Word)>;

/// The register file.
pub struct Registers {
    general: [Word; 8],
    pc: Word,
    cc: Cc,
    write_hooks: HashMap<u8, Vec<WriteHook>>,
    observers: Vec<Observer>,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            general: [0; 8],
            pc: DEFAULT_PC,
            cc: Cc::default(),
            write_hooks: HashMap::new(),
            observers: Vec::new(),
        }
    }
}

impl Registers {
    pub fn general(&self, reg: Reg) -> Word {
        self.general[reg as usize]
    }

    pub fn set_general(&mut self, reg: Reg, value: Word) {
        self.general[reg as usize] = value;
        self.notify(reg as u8, value);
    }

    pub fn pc(&self) -> Word {
        self.pc
    }

    pub fn set_pc(&mut self, value: Word) {
        self.pc = value;
        self.notify(PC_INDEX, value);
    }

    pub fn cc(&self) -> Cc {
        self.cc
    }

    pub fn set_cc(&mut self, cc: Cc) {
        self.cc = cc;
        self.notify(CC_INDEX, cc.as_word());
    }

    /// Read a slot by index.
    pub fn get(&self, index: u8) -> Result<Word, RegisterError> {
        match index {
            0..=7 => Ok(self.general[index as usize]),
            _ if index == PC_INDEX => Ok(self.pc),
            _ if index == CC_INDEX => Ok(self.cc.as_word()),
            _ => Err(RegisterError(index)),
        }
    }

    /// Write a slot by index. Writing the CC slot derives the condition
    /// code from the sign of the value.
    pub fn set(&mut self, index: u8, value: Word) -> Result<(), RegisterError> {
        match index {
            0..=7 => self.set_general(Reg::from_bits(Word::from(index)), value),
            _ if index == PC_INDEX => self.set_pc(value),
            _ if index == CC_INDEX => self.set_cc(Cc::of(value)),
            _ => return Err(RegisterError(index)),
        }
        Ok(())
    }

    /// Zero every slot, silently. Hooks and observers are kept but not
    /// notified.
    pub fn reset(&mut self) {
        self.general = [0; 8];
        self.pc = 0;
        self.cc = Cc::of(0);
    }

    /// Attach a write hook to one slot.
    pub fn on_write(
        &mut self,
        index: u8,
        hook: impl FnMut(Word) + 'static,
    ) -> Result<(), RegisterError> {
        if index >= REGISTER_COUNT {
            return Err(RegisterError(index));
        }
        self.write_hooks
            .entry(index)
            .or_default()
            .push(Box::new(hook));
        Ok(())
    }

    /// Attach a global observer, notified of every register write.
    pub fn observe(&mut self, observer: impl FnMut(u8, Word) + 'static) {
        self.observers.push(Box::new(observer));
    }

    fn notify(&mut self, index: u8, value: Word) {
        if let Some(hooks) = self.write_hooks.get_mut(&index) {
            for hook in hooks {
                hook(value);
            }
        }
        for observer in &mut self.observers {
            observer(index, value);
        }
    }
}

impl fmt::Debug for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registers")
            .field("general", &self.general)
            .field("pc", &self.pc)
            .field("cc", &self.cc)
            .finish_non_exhaustive()
    }
}
