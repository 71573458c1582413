//! Debugger application state and logic.

use crate::console::QueueConsole;
use crate::cpu::{decode, Cpu, Instruction, TrapVector};
use crate::disasm::disassemble_instruction;
use crate::image::Image;
use std::collections::HashSet;

/// Instructions executed per UI frame while free-running. Large enough
/// to feel instant, small enough to keep the interface responsive.
const INSTRUCTIONS_PER_TICK: u32 = 2048;

/// Debugger application state.
pub struct DebuggerApp {
    /// The machine being debugged.
    pub cpu: Cpu,
    /// Handle onto the machine's console queues.
    console: QueueConsole,
    /// Original image, kept for reset.
    image: Image,
    /// Breakpoints, by address.
    pub breakpoints: HashSet<u16>,
    /// Is the machine free-running?
    pub running: bool,
    /// Should the debugger exit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Top address of the memory pane.
    pub mem_scroll: u16,
    /// Accumulated program output for the console pane.
    console_log: String,
}

impl DebuggerApp {
    /// Create a debugger with a loaded program image.
    pub fn new(image: Image) -> Self {
        let console = QueueConsole::new();
        let mut cpu = Cpu::new(Box::new(console.clone()));
        let _ = cpu.load_program(image.origin, &image.words);

        Self {
            cpu,
            console,
            mem_scroll: image.origin,
            image,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: "Ready. s: step, r: run, q: quit.".into(),
            console_log: String::new(),
        }
    }

    /// Whether the program is blocked on keyboard input: the next
    /// instruction is GETC or IN and the key queue is empty. Detected
    /// by peeking rather than stepping so the UI thread never blocks.
    pub fn waiting_for_input(&self) -> bool {
        if !self.cpu.is_running() || self.console.has_input() {
            return false;
        }
        matches!(
            decode::decode(self.cpu.mem.peek(self.cpu.regs.pc)),
            Ok(Instruction::Trap {
                vector: TrapVector::Getc | TrapVector::In
            })
        )
    }

    /// Queue a key for the program's keyboard.
    pub fn feed_key(&mut self, byte: u8) {
        self.console.push_input(&[byte]);
        if !self.running {
            self.status = format!("Fed key {:?} to the program.", byte as char);
        }
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.cpu.is_running() {
            self.status = format!("Machine stopped: {:?}", self.cpu.state);
            self.running = false;
            return;
        }
        if self.waiting_for_input() {
            self.status = "Program is waiting for a key; type one to feed it.".into();
            return;
        }

        let pc = self.cpu.regs.pc;
        match self.cpu.step() {
            Ok(instruction) => {
                let word = decode::encode(&instruction);
                self.status = format!("x{pc:04X}: {}", disassemble_instruction(word));
            }
            Err(e) => {
                self.status = format!("Error: {e}");
                self.running = false;
            }
        }
        self.drain_output();
    }

    /// Start free-running.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running... (Esc pauses; typed keys go to the program)".into();
    }

    /// Execute one frame's worth of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        for _ in 0..INSTRUCTIONS_PER_TICK {
            if !self.cpu.is_running() {
                self.running = false;
                self.status = format!(
                    "Stopped after {} cycles ({:?})",
                    self.cpu.cycles, self.cpu.state
                );
                break;
            }
            if self.waiting_for_input() {
                self.status = "Program is waiting for a key; type one to feed it.".into();
                break;
            }
            if let Err(e) = self.cpu.step() {
                self.status = format!("Error: {e}");
                self.running = false;
                break;
            }
            if self.breakpoints.contains(&self.cpu.regs.pc) {
                self.running = false;
                self.status = format!("Breakpoint at x{:04X}", self.cpu.regs.pc);
                break;
            }
        }
        self.drain_output();
    }

    /// Toggle a breakpoint at the current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.cpu.regs.pc;
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at x{pc:04X}");
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at x{pc:04X}");
        }
    }

    /// Reset the machine and reload the program.
    pub fn reset(&mut self) {
        self.cpu.reset();
        let _ = self.cpu.load_program(self.image.origin, &self.image.words);
        self.running = false;
        self.console_log.clear();
        self.status = "Reset. Ready.".into();
    }

    /// Program output accumulated so far.
    pub fn console_log(&self) -> &str {
        &self.console_log
    }

    /// Pull freshly written program output into the console pane.
    fn drain_output(&mut self) {
        let bytes = self.console.take_output();
        if !bytes.is_empty() {
            self.console_log.push_str(&String::from_utf8_lossy(&bytes));
        }
    }

    /// Disassembly rows centered on the PC: (address, text, is_current).
    pub fn disassembly(&self, lines: usize) -> Vec<(u16, String, bool)> {
        let pc = self.cpu.regs.pc;
        let start = pc.saturating_sub(lines as u16 / 2);

        (0..lines as u16)
            .filter_map(|i| {
                let addr = start.checked_add(i)?;
                let word = self.cpu.mem.peek(addr);
                Some((addr, disassemble_instruction(word), addr == pc))
            })
            .collect()
    }
}

/// Run the debugger with a program image.
#[allow(clippy::missing_errors_doc)]
pub fn run_debugger(image: Image) -> std::io::Result<()> {
    use crate::console::key_to_byte;
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut app = DebuggerApp::new(image);

    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if app.running {
                        // While free-running the program owns the
                        // keyboard; only Esc is reserved.
                        match key.code {
                            KeyCode::Esc => {
                                app.running = false;
                                app.status = "Paused.".into();
                            }
                            _ => {
                                if let Some(byte) = key_to_byte(&key) {
                                    app.feed_key(byte);
                                }
                            }
                        }
                    } else if app.waiting_for_input() {
                        if let Some(byte) = key_to_byte(&key) {
                            app.feed_key(byte);
                        }
                    } else {
                        match key.code {
                            KeyCode::Char('q') => app.should_quit = true,
                            KeyCode::Char('s') => app.step(),
                            KeyCode::Char('r') => app.run(),
                            KeyCode::Char('b') => app.toggle_breakpoint(),
                            KeyCode::Char('x') => app.reset(),
                            KeyCode::Up => {
                                app.mem_scroll = app.mem_scroll.saturating_sub(1);
                            }
                            KeyCode::Down => {
                                app.mem_scroll = app.mem_scroll.saturating_add(1);
                            }
                            KeyCode::PageUp => {
                                app.mem_scroll = app.mem_scroll.saturating_sub(16);
                            }
                            KeyCode::PageDown => {
                                app.mem_scroll = app.mem_scroll.saturating_add(16);
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        app.tick();

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
