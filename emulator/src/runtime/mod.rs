//! The LC-3 runtime: memory, registers, the execution engine and the
//! console devices.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace};

mod console;
mod instructions;
mod memory;
mod registers;

pub use console::Console;
pub use instructions::{Instruction, Source};
pub use memory::{Memory, MemoryError};
pub use registers::{Cc, Condition, Reg, RegisterError, Registers};

use crate::assembler::Program;
use crate::boot;
use crate::constants as C;
use crate::constants::{Address, Word};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProcessorError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Register(#[from] RegisterError),

    /// The reserved opcode `0xD` was fetched
    #[error("invalid opcode in word {0:#06x}")]
    InvalidOpcode(Word),

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    /// `run` or `step_over` exceeded the configured cycle budget
    #[error("cycle limit of {0} reached")]
    CycleLimit(usize),
}

/// The whole machine: memory, registers, console and the fetch-decode-
/// execute engine.
///
/// The devices are wired in [`Computer::new`]: reading the keyboard data
/// register clears the keyboard ready bit, and writing the display data
/// register clears the display ready bit until the console picks the
/// character up at the end of the cycle.
pub struct Computer {
    pub memory: Memory,
    pub registers: Registers,
    program: Program,
    symbols: HashMap<String, Word>,
    console: Console,
    halt: Arc<AtomicBool>,
    cycle_limit: Option<usize>,
}

impl Default for Computer {
    fn default() -> Self {
        Self::new()
    }
}

impl Computer {
    pub fn new() -> Self {
        let mut memory = Memory::new();

        memory.on_read(C::KBDR, |cells| {
            // The program consumed the pending key
            let status = cells.get(C::KBSR);
            cells.set(C::KBSR, status & !C::DEVICE_READY);
        });

        memory.on_write(C::DDR, |cells, _value| {
            // Busy until the console picks the character up
            cells.set(C::DSR, 0);
        });

        Self {
            memory,
            registers: Registers::default(),
            program: Program::default(),
            symbols: boot_symbols(),
            console: Console::default(),
            halt: Arc::new(AtomicBool::new(false)),
            cycle_limit: None,
        }
    }

    /// Load an assembled program: clear memory, write the image and point
    /// the program counter at its origin.
    pub fn load(&mut self, program: Program) -> Result<(), ProcessorError> {
        debug!(
            origin = format_args!("{:#06x}", program.origin),
            words = program.image.len(),
            "loading program"
        );
        self.memory.clear();
        self.memory.load(&program.image, program.origin)?;
        self.registers.set_pc(program.origin);

        self.symbols = boot_symbols();
        self.symbols.extend(program.symbols.clone());
        self.program = program;
        Ok(())
    }

    /// Zero the registers, wipe memory and reload the last program.
    pub fn reset(&mut self) -> Result<(), ProcessorError> {
        self.registers.reset();
        self.memory.clear();
        self.memory
            .load(&self.program.image, self.program.origin)?;
        self.registers.set_pc(self.program.origin);
        self.halt.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// Execute one instruction cycle: fetch, advance the program counter,
    /// execute, then poll the console devices.
    pub fn step(&mut self) -> Result<(), ProcessorError> {
        let pc = self.registers.pc();
        let word = self.memory.read(Address::from(pc))?;
        self.registers.set_pc(pc.wrapping_add(1));

        let instruction = Instruction::decode(word)?;
        trace!(pc = format_args!("{pc:#06x}"), %instruction, "executing");
        instruction.execute(self)?;

        self.poll_input()?;
        self.poll_output()?;
        Ok(())
    }

    /// Run until the machine halts, the halt flag is raised from outside,
    /// or the cycle limit is exhausted.
    pub fn run(&mut self) -> Result<(), ProcessorError> {
        self.halt.store(false, Ordering::Relaxed);
        let mut cycles: usize = 0;

        let result = loop {
            if self.halt.load(Ordering::Relaxed) || self.halted() {
                break Ok(());
            }
            if let Some(limit) = self.cycle_limit {
                if cycles >= limit {
                    break Err(ProcessorError::CycleLimit(limit));
                }
            }
            if let Err(err) = self.step() {
                break Err(err);
            }
            cycles += 1;
        };

        self.halt.store(true, Ordering::Relaxed);
        debug!(cycles, "run finished");
        result
    }

    /// Like [`step`][Computer::step], but a subroutine call (`JSR` or
    /// `JSRR`) is run to completion: execution continues until control
    /// comes back to the instruction after the call.
    pub fn step_over(&mut self) -> Result<(), ProcessorError> {
        let pc = self.registers.pc();
        let is_call = self
            .memory
            .peek(Address::from(pc))
            .ok()
            .and_then(|word| Instruction::decode(word).ok())
            .is_some_and(|instruction| {
                matches!(
                    instruction,
                    Instruction::Jsr { .. } | Instruction::Jsrr { .. }
                )
            });
        let resume = pc.wrapping_add(1);

        self.step()?;
        if !is_call {
            return Ok(());
        }

        self.halt.store(false, Ordering::Relaxed);
        let mut cycles: usize = 1;
        while self.registers.pc() != resume {
            if self.halt.load(Ordering::Relaxed) || self.halted() {
                break;
            }
            if let Some(limit) = self.cycle_limit {
                if cycles >= limit {
                    return Err(ProcessorError::CycleLimit(limit));
                }
            }
            self.step()?;
            cycles += 1;
        }
        Ok(())
    }

    /// Has the program counter reached the halt parking address?
    pub fn halted(&self) -> bool {
        self.registers.pc() == C::HALT_ADDRESS
    }

    /// Raise the halt flag; a concurrent or subsequent [`run`][Computer::run]
    /// stops before its next cycle.
    pub fn pause(&self) {
        self.halt.store(true, Ordering::Relaxed);
    }

    /// A handle on the halt flag, usable from another thread.
    pub fn halt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.halt)
    }

    /// Cap the number of cycles a single `run` or `step_over` may take.
    pub fn set_cycle_limit(&mut self, limit: Option<usize>) {
        self.cycle_limit = limit;
    }

    /// A clone of the console handle, for typing input and collecting
    /// output.
    pub fn console(&self) -> Console {
        self.console.clone()
    }

    /// Inspect a memory cell without disturbing the devices.
    pub fn read_memory(&self, address: Address) -> Result<Word, ProcessorError> {
        Ok(self.memory.peek(address)?)
    }

    /// Write a memory cell through the regular write path, so hooks and
    /// observers fire.
    pub fn write_memory(&mut self, address: Address, value: Word) -> Result<(), ProcessorError> {
        Ok(self.memory.write(address, value)?)
    }

    /// Read a register file slot by index.
    pub fn read_register(&self, index: u8) -> Result<Word, ProcessorError> {
        Ok(self.registers.get(index)?)
    }

    /// Write a register file slot by index.
    pub fn write_register(&mut self, index: u8, value: Word) -> Result<(), ProcessorError> {
        Ok(self.registers.set(index, value)?)
    }

    /// Observe committed memory writes.
    pub fn on_memory_write(&mut self, observer: impl FnMut(Address, Word) + 'static) {
        self.memory.observe(observer);
    }

    /// Observe register writes.
    pub fn on_register_write(&mut self, observer: impl FnMut(u8, Word) + 'static) {
        self.registers.observe(observer);
    }

    /// Address of a label, from the loaded program or the boot image.
    pub fn symbol(&self, name: &str) -> Option<Word> {
        self.symbols.get(name).copied()
    }

    pub fn symbols(&self) -> &HashMap<String, Word> {
        &self.symbols
    }

    /// Move pending console input into the keyboard device, one byte at a
    /// time.
    fn poll_input(&mut self) -> Result<(), ProcessorError> {
        if !self.console.has_input() {
            return Ok(());
        }
        // Do not overrun a key the program has not consumed yet
        if self.memory.peek(C::KBSR)? & C::DEVICE_READY != 0 {
            return Ok(());
        }

        if let Some(byte) = self.console.pop_input() {
            trace!(byte, "delivering key");
            self.memory.update(C::KBSR, |status| status | C::DEVICE_READY)?;
            self.memory
                .update(C::KBDR, |data| (data & 0xFF00) | Word::from(byte))?;
        }
        Ok(())
    }

    /// Pick up a character the program wrote to the display.
    fn poll_output(&mut self) -> Result<(), ProcessorError> {
        if self.memory.peek(C::DSR)? & C::DEVICE_READY != 0 {
            return Ok(());
        }

        let byte = (self.memory.peek(C::DDR)? & 0x00FF) as u8;
        trace!(byte, "printing character");
        self.console.push_output(byte);
        self.memory.update(C::DSR, |status| status | C::DEVICE_READY)?;
        Ok(())
    }
}

impl fmt::Debug for Computer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computer")
            .field("registers", &self.registers)
            .field("halted", &self.halted())
            .finish_non_exhaustive()
    }
}

fn boot_symbols() -> HashMap<String, Word> {
    boot::SYMBOLS
        .iter()
        .map(|&(name, address)| (name.to_owned(), address))
        .collect()
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::assembler::compile_source;

    fn loaded(source: &str) -> Computer {
        let program = compile_source(source).unwrap();
        let mut computer = Computer::new();
        computer.load(program).unwrap();
        computer
    }

    #[test]
    fn counting_program_test() {
        let mut computer = loaded(indoc! {"
            .ORIG x3000
            AND R1, R1, #0
            ADD R1, R1, #1
            ADD R1, R1, #1
            HALT
            .END
        "});

        computer.run().unwrap();
        assert!(computer.halted());
        assert_eq!(computer.registers.general(Reg::R1), 2);
        assert_eq!(computer.registers.cc(), Cc::Positive);
    }

    #[test]
    fn hello_world_test() {
        let mut computer = loaded(indoc! {r#"
            .ORIG x3000
            LEA R0, msg
            PUTS
            HALT
            msg
            .STRINGZ "hi"
            .END
        "#});

        let console = computer.console();
        computer.run().unwrap();
        assert_eq!(console.take_output(), "hi");
        assert!(computer.halted());
    }

    #[test]
    fn putsp_packed_string_test() {
        let mut computer = loaded(indoc! {"
            .ORIG x3000
            LEA R0, msg
            PUTSP
            HALT
            msg
            .FILL x6968
            .FILL x0021
            .END
        "});

        let console = computer.console();
        computer.run().unwrap();
        // x6968 packs 'h' low and 'i' high; x0021 ends the string with a
        // lone '!' and a NUL high byte
        assert_eq!(console.take_output(), "hi!");
        assert!(computer.halted());
    }

    #[test]
    fn getc_test() {
        let mut computer = loaded(indoc! {"
            .ORIG x3000
            GETC
            HALT
            .END
        "});

        let console = computer.console();
        console.push_input("A");
        computer.run().unwrap();
        assert_eq!(computer.registers.general(Reg::R0), Word::from(b'A'));
        // The key was consumed: the keyboard is no longer ready
        assert_eq!(computer.read_memory(C::KBSR).unwrap() & C::DEVICE_READY, 0);
    }

    #[test]
    fn in_trap_echoes_test() {
        let mut computer = loaded(indoc! {"
            .ORIG x3000
            IN
            HALT
            .END
        "});

        let console = computer.console();
        console.push_input("k");
        computer.run().unwrap();
        assert_eq!(computer.registers.general(Reg::R0), Word::from(b'k'));
        // The key is echoed back to the display
        assert_eq!(console.take_output(), "k");
    }

    #[test]
    fn out_trap_test() {
        let mut computer = loaded(indoc! {"
            .ORIG x3000
            AND R0, R0, #0
            ADD R0, R0, #15
            ADD R0, R0, #15
            ADD R0, R0, #15
            ADD R0, R0, #15
            ADD R0, R0, #6
            OUT
            HALT
            .END
        "});

        let console = computer.console();
        computer.run().unwrap();
        // 15 * 4 + 6 = 66 = 'B'
        assert_eq!(console.take_output(), "B");
    }

    #[test]
    fn branch_does_not_touch_cc_test() {
        let mut computer = loaded(indoc! {"
            .ORIG x3000
            AND R1, R1, #0
            ADD R1, R1, #-1
            BRn skip
            ADD R1, R1, #1
            skip
            HALT
            .END
        "});

        computer.run().unwrap();
        assert_eq!(computer.registers.general(Reg::R1), 0xFFFF);
        assert_eq!(computer.registers.cc(), Cc::Negative);
    }

    #[test]
    fn loads_and_stores_test() {
        let mut computer = loaded(indoc! {"
            .ORIG x3000
            LD R1, value
            ST R1, copy
            LDI R2, pointer
            STR R2, R1, #0
            LDR R3, R1, #0
            HALT
            value
            .FILL x13
            copy
            .FILL #0
            pointer
            .FILL value
            .END
        "});

        computer.run().unwrap();
        let value_at = computer.symbol("value").unwrap();
        let copy_at = computer.symbol("copy").unwrap();
        assert_eq!(computer.registers.general(Reg::R1), 0x13);
        assert_eq!(computer.read_memory(Address::from(copy_at)).unwrap(), 0x13);
        // LDI read through the pointer cell
        assert_eq!(computer.registers.general(Reg::R2), 0x13);
        // STR wrote R2 at address R1 + 0 = 0x13
        assert_eq!(computer.read_memory(0x13).unwrap(), 0x13);
        assert_eq!(computer.registers.general(Reg::R3), 0x13);
        assert_eq!(value_at + 1, copy_at);
    }

    #[test]
    fn subroutine_test() {
        let mut computer = loaded(indoc! {"
            .ORIG x3000
            JSR sub
            ADD R1, R0, #0
            HALT
            sub
            AND R0, R0, #0
            ADD R0, R0, #7
            RET
            .END
        "});

        computer.run().unwrap();
        assert_eq!(computer.registers.general(Reg::R0), 7);
        assert_eq!(computer.registers.general(Reg::R1), 7);
        // HALT is itself a trap, so R7 ends up holding its return address
        assert_eq!(computer.registers.general(Reg::R7), 0x3003);
    }

    #[test]
    fn step_over_test() {
        let mut computer = loaded(indoc! {"
            .ORIG x3000
            JSR sub
            HALT
            sub
            AND R0, R0, #0
            ADD R0, R0, #5
            RET
            .END
        "});

        computer.step_over().unwrap();
        // The whole subroutine ran, and control is back after the call
        assert_eq!(computer.registers.pc(), 0x3001);
        assert_eq!(computer.registers.general(Reg::R0), 5);

        // Stepping over a plain instruction is a single step
        computer.step_over().unwrap();
        assert!(computer.halted());
    }

    #[test]
    fn step_test() {
        let mut computer = loaded(indoc! {"
            .ORIG x3000
            AND R1, R1, #0
            ADD R1, R1, #1
            HALT
            .END
        "});

        computer.step().unwrap();
        assert_eq!(computer.registers.pc(), 0x3001);
        computer.step().unwrap();
        assert_eq!(computer.registers.general(Reg::R1), 1);
    }

    #[test]
    fn cycle_limit_test() {
        let mut computer = loaded(indoc! {"
            .ORIG x3000
            loop
            BRnzp loop
            .END
        "});

        computer.set_cycle_limit(Some(100));
        assert_eq!(computer.run(), Err(ProcessorError::CycleLimit(100)));
    }

    #[test]
    fn pause_test() {
        let mut computer = loaded(indoc! {"
            .ORIG x3000
            loop
            BRnzp loop
            .END
        "});

        // Raise the halt flag from an observer, as a frontend would from
        // another thread
        let halt = computer.halt_handle();
        computer.on_register_write(move |index, _value| {
            if index == C::PC_INDEX {
                halt.store(true, Ordering::Relaxed);
            }
        });
        computer.run().unwrap();
        assert!(!computer.halted());
    }

    #[test]
    fn reset_test() {
        let mut computer = loaded(indoc! {"
            .ORIG x3000
            ADD R1, R1, #5
            ST R1, scratch
            HALT
            scratch
            .FILL #0
            .END
        "});

        computer.run().unwrap();
        assert_eq!(computer.registers.general(Reg::R1), 5);

        computer.reset().unwrap();
        assert_eq!(computer.registers.pc(), 0x3000);
        assert_eq!(computer.registers.general(Reg::R1), 0);
        let scratch = Address::from(computer.symbol("scratch").unwrap());
        assert_eq!(computer.read_memory(scratch).unwrap(), 0);

        // The program is still loaded and runs again
        computer.run().unwrap();
        assert_eq!(computer.registers.general(Reg::R1), 5);
    }

    #[test]
    fn out_of_bounds_is_fatal_test() {
        let mut computer = loaded(indoc! {"
            .ORIG x3000
            AND R1, R1, #0
            LDR R0, R1, #-2
            HALT
            .END
        "});

        assert_eq!(
            computer.run(),
            Err(ProcessorError::Memory(MemoryError::OutOfBounds {
                address: -2
            }))
        );
    }

    #[test]
    fn reserved_opcode_is_fatal_test() {
        let mut computer = loaded(indoc! {"
            .ORIG x3000
            .FILL xD000
            .END
        "});

        assert_eq!(
            computer.run(),
            Err(ProcessorError::InvalidOpcode(0xD000))
        );
    }

    #[test]
    fn rti_not_implemented_test() {
        let mut computer = loaded(indoc! {"
            .ORIG x3000
            RTI
            .END
        "});

        assert_eq!(
            computer.run(),
            Err(ProcessorError::NotImplemented("RTI"))
        );
    }

    #[test]
    fn symbols_include_boot_test() {
        let computer = Computer::new();
        assert_eq!(computer.symbol("HALT"), Some(C::HALT_ADDRESS));
        assert_eq!(computer.symbol("KBSR"), Some(0xFE00));
        assert_eq!(computer.symbol("missing"), None);
    }

    #[test]
    fn observers_test() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut computer = loaded(indoc! {"
            .ORIG x3000
            AND R1, R1, #0
            ADD R1, R1, #3
            ST R1, scratch
            HALT
            scratch
            .FILL #0
            .END
        "});

        let writes = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&writes);
        computer.on_memory_write(move |address, value| sink.borrow_mut().push((address, value)));

        computer.run().unwrap();
        let scratch = computer.symbol("scratch").unwrap();
        assert!(writes
            .borrow()
            .contains(&(Address::from(scratch), 3)));
    }
}
