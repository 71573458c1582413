//! TUI debugger for the LC-3 emulator.
//!
//! Provides an interactive terminal-based debugger with:
//! - Disassembly view around the PC
//! - Register and flag visualization
//! - Scrollable memory view
//! - A console pane showing the program's output
//! - Step/run/breakpoint controls; unbound keys feed the program's
//!   keyboard

mod app;
mod ui;

pub use app::{run_debugger, DebuggerApp};
