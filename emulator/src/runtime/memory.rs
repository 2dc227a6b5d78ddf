//! The LC-3 memory: 65536 words, with per-address observation hooks.
//!
//! Device behavior is implemented with hooks. A *read hook* runs whenever
//! its address is read through [`Memory::read`]; a *write hook* runs after
//! a value is committed through [`Memory::write`]. Hooks receive the raw
//! [`Cells`] so they can flip status bits without recursing through the
//! hook machinery.
//!
//! Committed writes, including the ones performed by hooks, are recorded in
//! a journal and reported to global observers once the triggering operation
//! finishes. Observers see every change exactly once, in commit order.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::trace;

use crate::boot;
use crate::constants::{Address, Word, MEMORY_SIZE};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// The effective address fell outside the addressable range. The field
    /// is wider than an address so that negative intermediate values can be
    /// reported as-is.
    #[error("memory address {address} out of bounds")]
    OutOfBounds { address: i64 },
}

/// A single memory cell. Cells start out empty and read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Cell {
    #[default]
    Empty,
    Word(Word),
}

/// The raw cell array, plus the journal of committed writes.
///
/// This is the view hooks operate on: writing through it is recorded in
/// the journal but triggers no further hooks.
pub(crate) struct Cells {
    cells: Box<[Cell]>,
    journal: Vec<(Address, Word)>,
}

impl Default for Cells {
    fn default() -> Self {
        Self {
            cells: vec![Cell::Empty; MEMORY_SIZE as usize].into_boxed_slice(),
            journal: Vec::new(),
        }
    }
}

impl Cells {
    /// Value of a cell. The address must already be bounds-checked.
    pub(crate) fn get(&self, address: Address) -> Word {
        match self.cells[address as usize] {
            Cell::Empty => 0,
            Cell::Word(word) => word,
        }
    }

    /// Commit a value and record it in the journal.
    pub(crate) fn set(&mut self, address: Address, value: Word) {
        self.cells[address as usize] = Cell::Word(value);
        self.journal.push((address, value));
    }

    /// Commit a value without journaling it. Used for the boot image.
    fn poke(&mut self, address: Address, value: Word) {
        self.cells[address as usize] = Cell::Word(value);
    }
}

type ReadHook = Box<dyn FnMut(&mut Cells)>;
type WriteHook = Box<dyn FnMut(&mut Cells, Word)>;
type Observer = Box<dyn FnMut(Address, Word)>;

/// The memory subsystem.
#[derive(Default)]
pub struct Memory {
    cells: Cells,
    read_hooks: HashMap<Address, Vec<ReadHook>>,
    write_hooks: HashMap<Address, Vec<WriteHook>>,
    observers: Vec<Observer>,
}

impl Memory {
    /// A memory with the boot image loaded and no hooks.
    pub fn new() -> Self {
        let mut memory = Self::default();
        memory.load_boot();
        memory
    }

    fn check(address: Address) -> Result<(), MemoryError> {
        if address < MEMORY_SIZE {
            Ok(())
        } else {
            Err(MemoryError::OutOfBounds {
                address: i64::from(address),
            })
        }
    }

    /// Read a cell, running its read hooks first.
    pub fn read(&mut self, address: Address) -> Result<Word, MemoryError> {
        Self::check(address)?;
        if let Some(hooks) = self.read_hooks.get_mut(&address) {
            for hook in hooks {
                hook(&mut self.cells);
            }
        }
        self.notify_observers();
        Ok(self.cells.get(address))
    }

    /// Read a cell without triggering hooks or observers.
    pub fn peek(&self, address: Address) -> Result<Word, MemoryError> {
        Self::check(address)?;
        Ok(self.cells.get(address))
    }

    /// Write a cell, then run its write hooks.
    pub fn write(&mut self, address: Address, value: Word) -> Result<(), MemoryError> {
        Self::check(address)?;
        trace!(
            address = format_args!("{address:#06x}"),
            value = format_args!("{value:#06x}"),
            "memory write"
        );
        self.cells.set(address, value);
        if let Some(hooks) = self.write_hooks.get_mut(&address) {
            for hook in hooks {
                hook(&mut self.cells, value);
            }
        }
        self.notify_observers();
        Ok(())
    }

    /// Read-modify-write without triggering read hooks.
    pub fn update(
        &mut self,
        address: Address,
        f: impl FnOnce(Word) -> Word,
    ) -> Result<(), MemoryError> {
        let value = self.peek(address)?;
        self.write(address, f(value))
    }

    /// Write a program image starting at `origin`. Each word goes through
    /// the regular write path, so hooks and observers fire. The boot image
    /// is reapplied afterwards in case the program overlapped it.
    pub fn load(&mut self, image: &[Word], origin: Word) -> Result<(), MemoryError> {
        for (index, &word) in image.iter().enumerate() {
            self.write(Address::from(origin) + index as Address, word)?;
        }
        self.load_boot();
        Ok(())
    }

    /// Empty every cell and restore the boot image. Hooks and observers
    /// are kept.
    pub fn clear(&mut self) {
        self.cells = Cells::default();
        self.load_boot();
    }

    fn load_boot(&mut self) {
        for &(address, value) in boot::IMAGE {
            self.cells.poke(address, value);
        }
    }

    /// Attach a read hook to an address.
    pub(crate) fn on_read(&mut self, address: Address, hook: impl FnMut(&mut Cells) + 'static) {
        self.read_hooks
            .entry(address)
            .or_default()
            .push(Box::new(hook));
    }

    /// Attach a write hook to an address. The hook runs after the write is
    /// committed and receives the written value.
    pub(crate) fn on_write(
        &mut self,
        address: Address,
        hook: impl FnMut(&mut Cells, Word) + 'static,
    ) {
        self.write_hooks
            .entry(address)
            .or_default()
            .push(Box::new(hook));
    }

    /// Attach a global observer, notified of every committed write.
    pub fn observe(&mut self, observer: impl FnMut(Address, Word) + 'static) {
        self.observers.push(Box::new(observer));
    }

    fn notify_observers(&mut self) {
        if self.cells.journal.is_empty() {
            return;
        }
        let changes: Vec<(Address, Word)> = self.cells.journal.drain(..).collect();
        for (address, value) in changes {
            for observer in &mut self.observers {
                observer(address, value);
            }
        }
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("read_hooks", &self.read_hooks.len())
            .field("write_hooks", &self.write_hooks.len())
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}
