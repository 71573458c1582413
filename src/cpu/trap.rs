//! Trap services.
//!
//! The TRAP instruction names one of six built-in I/O routines by an
//! 8-bit vector. On entry R7 receives the return address (the PC is
//! already past the TRAP when the routine runs); only HALT changes the
//! run state, every other routine returns control to the instruction
//! after the TRAP.

use crate::cpu::decode::DecodeError;
use crate::cpu::execute::{Cpu, CpuError, CpuState};
use serde::{Deserialize, Serialize};

/// The six trap service routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrapVector {
    /// 0x20: read one key into R0, no echo.
    Getc,
    /// 0x21: write R0's low byte.
    Out,
    /// 0x22: write a word-per-character, zero-terminated string at [R0].
    Puts,
    /// 0x23: prompt, read one key into R0, echo it.
    In,
    /// 0x24: write a byte-packed, zero-terminated string at [R0].
    Putsp,
    /// 0x25: flush output and stop the machine.
    Halt,
}

impl TrapVector {
    /// Decode the vector field of a TRAP instruction word.
    pub fn decode(word: u16) -> Result<Self, DecodeError> {
        let vector = (word & 0xFF) as u8;
        match vector {
            0x20 => Ok(TrapVector::Getc),
            0x21 => Ok(TrapVector::Out),
            0x22 => Ok(TrapVector::Puts),
            0x23 => Ok(TrapVector::In),
            0x24 => Ok(TrapVector::Putsp),
            0x25 => Ok(TrapVector::Halt),
            _ => Err(DecodeError::UnknownTrap { vector }),
        }
    }

    /// The vector's numeric value.
    pub const fn code(self) -> u8 {
        match self {
            TrapVector::Getc => 0x20,
            TrapVector::Out => 0x21,
            TrapVector::Puts => 0x22,
            TrapVector::In => 0x23,
            TrapVector::Putsp => 0x24,
            TrapVector::Halt => 0x25,
        }
    }
}

impl Cpu {
    /// Dispatch a trap service routine.
    ///
    /// Trap routines never touch the condition flags; the flag-updating
    /// instructions are exactly ADD, AND, NOT, LD, LDI, LDR, and LEA.
    pub(crate) fn trap(&mut self, vector: TrapVector) -> Result<(), CpuError> {
        self.regs.write(7, self.regs.pc);

        match vector {
            TrapVector::Getc => self.trap_getc(),
            TrapVector::Out => self.trap_out(),
            TrapVector::Puts => self.trap_puts(),
            TrapVector::In => self.trap_in(),
            TrapVector::Putsp => self.trap_putsp(),
            TrapVector::Halt => self.trap_halt(),
        }
    }

    /// One key into R0, upper byte cleared, no echo. This is the one
    /// place (besides IN) where the machine is allowed to block.
    fn trap_getc(&mut self) -> Result<(), CpuError> {
        let key = self.console.read_key()?;
        self.regs.write(0, u16::from(key));
        Ok(())
    }

    fn trap_out(&mut self) -> Result<(), CpuError> {
        let byte = (self.regs.read(0) & 0xFF) as u8;
        self.console.write_byte(byte)?;
        Ok(())
    }

    /// One character per word, low byte, until a zero word.
    ///
    /// The walk uses raw cell access: printing a string must not
    /// disturb the keyboard latch even if it strays across the device
    /// registers.
    fn trap_puts(&mut self) -> Result<(), CpuError> {
        let mut addr = self.regs.read(0);
        loop {
            let word = self.mem.peek(addr);
            if word == 0 {
                break;
            }
            self.console.write_byte((word & 0xFF) as u8)?;
            addr = addr.wrapping_add(1);
        }
        self.console.flush()?;
        Ok(())
    }

    fn trap_in(&mut self) -> Result<(), CpuError> {
        for &byte in b"Enter a character: " {
            self.console.write_byte(byte)?;
        }
        self.console.flush()?;

        let key = self.console.read_key()?;
        self.console.write_byte(key)?;
        self.console.flush()?;
        self.regs.write(0, u16::from(key));
        Ok(())
    }

    /// Two characters per word, low byte first, until a zero word. An
    /// odd-length string pads the final high byte with zero, which is
    /// skipped rather than written.
    fn trap_putsp(&mut self) -> Result<(), CpuError> {
        let mut addr = self.regs.read(0);
        loop {
            let word = self.mem.peek(addr);
            if word == 0 {
                break;
            }
            self.console.write_byte((word & 0xFF) as u8)?;
            let high = (word >> 8) as u8;
            if high != 0 {
                self.console.write_byte(high)?;
            }
            addr = addr.wrapping_add(1);
        }
        self.console.flush()?;
        Ok(())
    }

    fn trap_halt(&mut self) -> Result<(), CpuError> {
        self.console.flush()?;
        self.state = CpuState::Halted;
        Ok(())
    }
}
