//! LC-3 memory subsystem.
//!
//! A flat array of 65,536 words. Two addresses are not plain storage:
//! the keyboard status and keyboard data registers, which behave as live
//! device registers on read. The illusion is maintained entirely inside
//! [`Memory::read`]; writes always store, and the address space wraps by
//! construction because addresses are `u16`.

use crate::console::Console;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of addressable words.
pub const MEMORY_SIZE: usize = 1 << 16;

/// Keyboard status register. Reading it polls the keyboard: bit 15 is
/// set when a key is pending, and the key is latched into [`MR_KBDR`].
pub const MR_KBSR: u16 = 0xFE00;

/// Keyboard data register: the key most recently latched by a status
/// poll.
pub const MR_KBDR: u16 = 0xFE02;

/// LC-3 memory: 65,536 sixteen-bit cells, zero-initialized.
#[derive(Clone, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<u16>,
}

impl Memory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![0; MEMORY_SIZE],
        }
    }

    /// Read a word, with device interception.
    ///
    /// A read of the keyboard status register polls the console without
    /// blocking: if a key is pending, the status cell is latched to
    /// 0x8000 and the key lands in the data register; otherwise the
    /// status cell is cleared. Every other address (the data register
    /// included) returns whatever the cell holds.
    pub fn read(&mut self, addr: u16, console: &mut dyn Console) -> u16 {
        if addr == MR_KBSR {
            match console.poll_key() {
                Some(key) => {
                    self.cells[MR_KBSR as usize] = 1 << 15;
                    self.cells[MR_KBDR as usize] = u16::from(key);
                }
                None => {
                    self.cells[MR_KBSR as usize] = 0;
                }
            }
        }
        self.cells[addr as usize]
    }

    /// Store a word. Stores are unconditional; the device registers are
    /// overridden at the next status read, not protected here.
    #[inline]
    pub fn write(&mut self, addr: u16, value: u16) {
        self.cells[addr as usize] = value;
    }

    /// Raw cell access with no device interception.
    ///
    /// For the loader, the disassembler, the debugger's memory pane, and
    /// the string traps, none of which should disturb the keyboard latch.
    #[inline]
    pub fn peek(&self, addr: u16) -> u16 {
        self.cells[addr as usize]
    }

    /// Clear all cells to zero.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Bulk-store a program image starting at `origin`.
    pub fn load_words(&mut self, origin: u16, words: &[u16]) -> Result<(), MemoryError> {
        let available = MEMORY_SIZE - origin as usize;
        if words.len() > available {
            return Err(MemoryError::ImageTooLarge {
                words: words.len(),
                available,
            });
        }
        self.cells[origin as usize..origin as usize + words.len()].copy_from_slice(words);
        Ok(())
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();
        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}

/// Errors that can occur when populating memory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("image of {words} words does not fit in the {available} words above its origin")]
    ImageTooLarge { words: usize, available: usize },
}
