//! # LC-3 Emulator
//!
//! An instruction-level emulator of the LC-3, the 16-bit von-Neumann
//! computer used to teach computer architecture. It runs standard `.obj`
//! program images: fetch, decode, execute, condition flags, memory-mapped
//! keyboard I/O, and the six trap service routines.

pub mod bits;
pub mod console;
pub mod cpu;
pub mod disasm;
pub mod image;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types
pub use console::{Console, QueueConsole, TermConsole};
pub use cpu::{
    CondFlag, Cpu, CpuError, CpuState, Instruction, Memory, Registers, Snapshot, TrapVector,
    PC_START,
};
pub use disasm::{disassemble, disassemble_instruction};
pub use image::{load_image, read_image, save_image, Image, ImageError};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
