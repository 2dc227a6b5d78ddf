//! The console attached to the memory-mapped keyboard and display.
//!
//! A [`Console`] is a cheap cloneable handle over shared buffers: the host
//! keeps one clone to type input and collect output while the computer
//! owns another. Input is delivered to the keyboard device one byte at a
//! time, as the program consumes it.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, Default)]
struct Inner {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

/// A handle on the console buffers.
#[derive(Debug, Default, Clone)]
pub struct Console {
    inner: Rc<RefCell<Inner>>,
}

impl Console {
    /// Queue text for the keyboard.
    pub fn push_input(&self, text: &str) {
        self.inner.borrow_mut().input.extend(text.bytes());
    }

    pub(crate) fn has_input(&self) -> bool {
        !self.inner.borrow().input.is_empty()
    }

    pub(crate) fn pop_input(&self) -> Option<u8> {
        self.inner.borrow_mut().input.pop_front()
    }

    pub(crate) fn push_output(&self, byte: u8) {
        self.inner.borrow_mut().output.push(byte);
    }

    /// Everything the display has printed so far.
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.inner.borrow().output).into_owned()
    }

    /// Drain the display buffer.
    pub fn take_output(&self) -> String {
        let bytes = std::mem::take(&mut self.inner.borrow_mut().output);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
