//! Memory image construction.
//!
//! The [`ImageBuilder`] accumulates encoded words, keeps the symbol table
//! and resolves forward references. Operands that name a label which is not
//! known yet are committed as a placeholder word plus a patch record; the
//! patch is applied the moment the label is defined.

use std::collections::HashMap;

use tracing::{debug, trace};

use super::{AssemblyError, Program};
use crate::constants::Word;
use crate::util::fit;

/// How a patched operand field is computed once its label resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PatchKind {
    /// The field receives the label address itself (`.FILL`, `TRAP`).
    Value,
    /// The field receives the distance from the word after the patched one
    /// to the label (branches, PC-relative loads and stores).
    PcRelative,
}

/// A word waiting for a label to be defined.
#[derive(Debug)]
struct Patch {
    /// Index of the placeholder word in the image.
    index: usize,
    kind: PatchKind,
    /// Width of the operand field, in bits.
    width: u32,
    /// The already-encoded part of the instruction word.
    bits: Word,
}

/// Builds the memory image of a single program.
#[derive(Debug, Default)]
pub(crate) struct ImageBuilder {
    origin: Option<Word>,
    image: Vec<Word>,
    end_seen: bool,
    symbols: HashMap<String, Word>,
    pending: HashMap<String, Vec<Patch>>,
}

impl ImageBuilder {
    /// Set the load address of the program. Exactly one `.ORIG` is allowed.
    pub fn set_origin(&mut self, origin: Word) -> Result<(), AssemblyError> {
        if self.origin.is_some() {
            return Err(AssemblyError::OriginRedefined);
        }
        self.origin = Some(origin);
        Ok(())
    }

    /// Record that `.END` was seen; any word emitted afterwards is an error.
    pub fn mark_end(&mut self) {
        self.end_seen = true;
    }

    fn origin(&self) -> Result<Word, AssemblyError> {
        self.origin.ok_or(AssemblyError::OriginNotSet)
    }

    /// Address of the next word to be emitted.
    fn cursor(&self) -> Result<Word, AssemblyError> {
        let origin = self.origin()?;
        Ok(origin.wrapping_add(self.image.len() as Word))
    }

    /// Append one word to the image.
    pub fn push_word(&mut self, word: Word) -> Result<(), AssemblyError> {
        self.origin()?;
        if self.end_seen {
            return Err(AssemblyError::AfterEnd);
        }
        self.image.push(word);
        Ok(())
    }

    /// Define a label at the current position.
    ///
    /// Labels point one word past the image cursor, except labels that sit
    /// alone on an otherwise empty line, which point at the cursor itself.
    pub fn define_label(&mut self, name: &str, on_empty_line: bool) -> Result<(), AssemblyError> {
        let mut address = self.cursor()?;
        if !on_empty_line {
            address = address.wrapping_add(1);
        }

        trace!(name, address = format_args!("{address:#06x}"), "defining label");
        self.symbols.insert(name.to_owned(), address);

        if let Some(patches) = self.pending.remove(name) {
            let origin = self.origin()?;
            for patch in patches {
                let value = match patch.kind {
                    PatchKind::Value => i32::from(address),
                    PatchKind::PcRelative => {
                        let patch_address = i32::from(origin) + patch.index as i32;
                        i32::from(address) - (patch_address + 1)
                    }
                };
                debug!(
                    name,
                    index = patch.index,
                    value,
                    "resolving forward reference"
                );
                self.image[patch.index] = patch.bits | fit(value, patch.width);
            }
        }

        Ok(())
    }

    fn push_patched(
        &mut self,
        bits: Word,
        label: &str,
        width: u32,
        kind: PatchKind,
    ) -> Result<(), AssemblyError> {
        let index = self.image.len();
        self.push_word(bits)?;
        self.pending.entry(label.to_owned()).or_default().push(Patch {
            index,
            kind,
            width,
            bits,
        });
        Ok(())
    }

    /// Emit a word whose low `width` bits hold an absolute value: either a
    /// numeric operand or the address of a label.
    pub fn push_immediate(
        &mut self,
        bits: Word,
        operand: &str,
        value: Option<i32>,
        width: u32,
    ) -> Result<(), AssemblyError> {
        if let Some(value) = value {
            self.push_word(bits | fit(value, width))
        } else if let Some(&address) = self.symbols.get(operand) {
            self.push_word(bits | fit(i32::from(address), width))
        } else {
            self.push_patched(bits, operand, width, PatchKind::Value)
        }
    }

    /// Emit a word whose low `width` bits hold a PC-relative offset: either
    /// a numeric operand used verbatim, or the distance to a label.
    pub fn push_offset(
        &mut self,
        bits: Word,
        operand: &str,
        value: Option<i32>,
        width: u32,
    ) -> Result<(), AssemblyError> {
        if let Some(value) = value {
            self.push_word(bits | fit(value, width))
        } else if let Some(&address) = self.symbols.get(operand) {
            let offset = i32::from(address) - i32::from(self.cursor()?) - 1;
            self.push_word(bits | fit(offset, width))
        } else {
            self.push_patched(bits, operand, width, PatchKind::PcRelative)
        }
    }

    /// Labels that were referenced but never defined, sorted for stable
    /// error messages.
    fn unresolved(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.pending.keys().cloned().collect();
        labels.sort();
        labels
    }

    pub fn finish(self) -> Result<Program, AssemblyError> {
        let origin = self.origin()?;
        let unresolved = self.unresolved();
        if !unresolved.is_empty() {
            return Err(AssemblyError::UnresolvedLabels(unresolved));
        }

        Ok(Program {
            origin,
            image: self.image,
            symbols: self.symbols,
        })
    }
}
