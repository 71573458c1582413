//! Console device for the emulated machine.
//!
//! The LC-3 talks to its keyboard two ways: a non-blocking poll behind the
//! memory-mapped status register, and a blocking read inside the GETC/IN
//! traps. Both are expressed through the [`Console`] trait so the CPU core
//! never touches the host terminal directly.
//!
//! Two implementations:
//! - [`TermConsole`]: the real terminal, switched to raw mode so keystrokes
//!   arrive unbuffered and unechoed.
//! - [`QueueConsole`]: in-memory queues for tests, the self-test, and the
//!   debugger's console pane.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;

/// Keyboard and display access for the emulated machine.
pub trait Console {
    /// Non-blocking keyboard poll, used by the memory-mapped status
    /// register. Must return immediately whether or not a key is pending.
    fn poll_key(&mut self) -> Option<u8>;

    /// Blocking keyboard read, used only by the GETC and IN traps.
    fn read_key(&mut self) -> io::Result<u8>;

    /// Write one byte of program output.
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;

    /// Flush any buffered output.
    fn flush(&mut self) -> io::Result<()>;

    /// Whether the user has asked the machine to stop (Ctrl-C).
    fn poll_interrupt(&mut self) -> bool {
        false
    }
}

/// The host terminal in raw mode.
///
/// Raw mode is enabled on construction and restored when the console is
/// dropped, so a crashed program never leaves the shell unusable. With raw
/// mode active the terminal stops turning Ctrl-C into a signal; it arrives
/// as an ordinary key event instead and is surfaced through
/// [`Console::poll_interrupt`].
pub struct TermConsole {
    /// Keys decoded from events but not yet consumed by the machine.
    pending: VecDeque<u8>,
    interrupted: bool,
    raw: bool,
}

impl TermConsole {
    /// Switch the terminal to raw mode and wrap it.
    pub fn new() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self {
            pending: VecDeque::new(),
            interrupted: false,
            raw: true,
        })
    }

    /// Drain every event the terminal has queued, without blocking.
    fn drain_events(&mut self) -> io::Result<()> {
        while event::poll(Duration::ZERO)? {
            let ev = event::read()?;
            self.absorb_event(ev);
        }
        Ok(())
    }

    fn absorb_event(&mut self, ev: Event) {
        let Event::Key(key) = ev else { return };
        if key.kind != KeyEventKind::Press {
            return;
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.interrupted = true;
            return;
        }
        if let Some(byte) = key_to_byte(&key) {
            self.pending.push_back(byte);
        }
    }
}

impl Console for TermConsole {
    fn poll_key(&mut self) -> Option<u8> {
        // A poll failure reads as "no key pending"; the status register
        // simply stays clear.
        if self.drain_events().is_err() {
            return None;
        }
        self.pending.pop_front()
    }

    fn read_key(&mut self) -> io::Result<u8> {
        loop {
            if let Some(byte) = self.pending.pop_front() {
                return Ok(byte);
            }
            if self.interrupted {
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    "interrupted while waiting for a key",
                ));
            }
            let ev = event::read()?;
            self.absorb_event(ev);
        }
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        let mut out = io::stdout();
        // Raw mode stops the terminal translating \n to \r\n.
        if byte == b'\n' && self.raw {
            out.write_all(b"\r\n")
        } else {
            out.write_all(&[byte])
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }

    fn poll_interrupt(&mut self) -> bool {
        let _ = self.drain_events();
        self.interrupted
    }
}

impl Drop for TermConsole {
    fn drop(&mut self) {
        if self.raw {
            let _ = terminal::disable_raw_mode();
        }
    }
}

/// Map a key event to the byte the LC-3 keyboard register would carry.
/// Shared with the debugger, which feeds its own key events to the
/// program's queue.
pub(crate) fn key_to_byte(key: &KeyEvent) -> Option<u8> {
    match key.code {
        KeyCode::Char(c) if c.is_ascii() => {
            if key.modifiers.contains(KeyModifiers::CONTROL) && c.is_ascii_alphabetic() {
                // Ctrl-letter arrives as a modifier; the machine expects
                // the control byte (Ctrl-A = 0x01 .. Ctrl-Z = 0x1A).
                Some(c.to_ascii_uppercase() as u8 & 0x1F)
            } else {
                Some(c as u8)
            }
        }
        KeyCode::Enter => Some(b'\n'),
        KeyCode::Tab => Some(b'\t'),
        KeyCode::Backspace => Some(0x08),
        KeyCode::Esc => Some(0x1B),
        _ => None,
    }
}

/// In-memory console over shared queues.
///
/// Cloning yields a handle onto the same queues, so a test (or the
/// debugger) can keep one handle while the CPU owns the other: push input
/// before or during the run, read output after.
#[derive(Clone, Default)]
pub struct QueueConsole {
    input: Rc<RefCell<VecDeque<u8>>>,
    output: Rc<RefCell<Vec<u8>>>,
}

impl QueueConsole {
    /// Create a console with empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a console preloaded with keyboard input.
    pub fn with_input(bytes: &[u8]) -> Self {
        let console = Self::new();
        console.push_input(bytes);
        console
    }

    /// Queue bytes for the machine's keyboard.
    pub fn push_input(&self, bytes: &[u8]) {
        self.input.borrow_mut().extend(bytes.iter().copied());
    }

    /// Whether any keyboard input is still queued.
    pub fn has_input(&self) -> bool {
        !self.input.borrow().is_empty()
    }

    /// Everything the program has written so far.
    pub fn output(&self) -> Vec<u8> {
        self.output.borrow().clone()
    }

    /// Program output, lossily decoded for display.
    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output.borrow()).into_owned()
    }

    /// Drain the output buffer.
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut *self.output.borrow_mut())
    }
}

impl Console for QueueConsole {
    fn poll_key(&mut self) -> Option<u8> {
        self.input.borrow_mut().pop_front()
    }

    fn read_key(&mut self) -> io::Result<u8> {
        self.input.borrow_mut().pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::WouldBlock, "keyboard queue is empty")
        })
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.output.borrow_mut().push(byte);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
