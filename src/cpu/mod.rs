//! CPU emulation for the LC-3.
//!
//! This module implements the complete LC-3 architecture:
//! - 65,536 sixteen-bit memory cells, two of them device registers
//! - 10 registers: R0–R7, PC, COND
//! - 15 opcodes (13 implemented; RTI and the reserved code are fatal)
//! - 6 trap service routines

pub mod decode;
pub mod execute;
pub mod memory;
pub mod registers;
pub mod trap;

pub use decode::{decode, encode, DecodeError, Instruction, JsrTarget, Operand};
pub use execute::{Cpu, CpuError, CpuState, Snapshot};
pub use memory::{Memory, MemoryError, MEMORY_SIZE, MR_KBDR, MR_KBSR};
pub use registers::{CondFlag, Registers, PC_START};
pub use trap::TrapVector;
