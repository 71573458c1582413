//! CPU execution engine for the LC-3.
//!
//! Implements the fetch-decode-execute cycle and all instruction
//! behaviors. The machine state (registers, memory, console, run state)
//! lives in one [`Cpu`] value; nothing here is global.

use crate::console::Console;
use crate::cpu::decode::{self, DecodeError, Instruction, JsrTarget, Operand};
use crate::cpu::memory::{Memory, MemoryError};
use crate::cpu::registers::Registers;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// Executing instructions.
    Running,
    /// Stopped by the HALT trap or an explicit halt request.
    Halted,
    /// Stopped by a user interrupt between instructions.
    Interrupted,
}

/// The LC-3 CPU.
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Instructions executed so far.
    pub cycles: u64,
    /// The machine's keyboard and display.
    pub(crate) console: Box<dyn Console>,
    /// Last executed instruction (for the trace and the debugger).
    last_instruction: Option<Instruction>,
}

impl Cpu {
    /// Create a CPU at power-on state, wired to the given console.
    pub fn new(console: Box<dyn Console>) -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            state: CpuState::Running,
            cycles: 0,
            console,
            last_instruction: None,
        }
    }

    /// Reset registers, memory, and run state; the console is kept.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.clear();
        self.state = CpuState::Running;
        self.cycles = 0;
        self.last_instruction = None;
    }

    /// Place a program in memory starting at `origin`.
    pub fn load_program(&mut self, origin: u16, words: &[u16]) -> Result<(), MemoryError> {
        self.mem.load_words(origin, words)
    }

    /// Execute a single instruction.
    ///
    /// Fetches the word at PC, advances PC (so every handler sees the
    /// address of the *next* instruction), decodes, and executes.
    /// Returns the instruction that ran, or the error that stops the
    /// machine — a decode failure is fatal and must not be retried.
    pub fn step(&mut self) -> Result<Instruction, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        let pc = self.regs.advance_pc();
        let word = self.mem.read(pc, self.console.as_mut());

        let instruction =
            decode::decode(word).map_err(|source| CpuError::IllegalInstruction { addr: pc, source })?;

        self.execute(instruction)?;

        self.cycles += 1;
        self.last_instruction = Some(instruction);

        Ok(instruction)
    }

    /// Run until halt, interrupt, or error.
    ///
    /// Returns the number of instructions executed.
    pub fn run(&mut self) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.state == CpuState::Running {
            self.step()?;
            self.check_interrupt();
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while self.state == CpuState::Running && self.cycles < limit {
            self.step()?;
            self.check_interrupt();
        }

        Ok(self.cycles - start_cycles)
    }

    /// Poll the console for a user interrupt every 4096 instructions.
    /// The poll is cheap but not free; a tight emulated loop should not
    /// pay for it on every cycle.
    fn check_interrupt(&mut self) {
        if self.cycles & 0xFFF == 0 && self.console.poll_interrupt() {
            self.interrupt();
        }
    }

    /// Stop the machine between instructions.
    pub fn halt(&mut self) {
        self.state = CpuState::Halted;
    }

    /// Orderly shutdown on user request: flush output, stop the loop.
    pub fn interrupt(&mut self) {
        let _ = self.console.flush();
        self.state = CpuState::Interrupted;
    }

    /// Whether the console has seen a user interrupt request.
    pub fn interrupt_requested(&mut self) -> bool {
        self.console.poll_interrupt()
    }

    /// Execute a decoded instruction.
    fn execute(&mut self, instruction: Instruction) -> Result<(), CpuError> {
        match instruction {
            Instruction::Add { dr, sr1, src } => {
                let result = self.regs.read(sr1).wrapping_add(self.operand(src));
                self.regs.write(dr, result);
                self.regs.update_flags(dr);
            }

            Instruction::And { dr, sr1, src } => {
                let result = self.regs.read(sr1) & self.operand(src);
                self.regs.write(dr, result);
                self.regs.update_flags(dr);
            }

            Instruction::Not { dr, sr } => {
                let result = !self.regs.read(sr);
                self.regs.write(dr, result);
                self.regs.update_flags(dr);
            }

            Instruction::Br { cond, pc_offset } => {
                if cond & self.regs.cond.mask() != 0 {
                    let target = self.regs.pc.wrapping_add(pc_offset);
                    self.regs.jump(target);
                }
            }

            Instruction::Jmp { base } => {
                let target = self.regs.read(base);
                self.regs.jump(target);
            }

            Instruction::Jsr { target } => {
                // PC is already past the JSR; that is the return address.
                self.regs.write(7, self.regs.pc);
                match target {
                    JsrTarget::Offset(offset) => {
                        let dest = self.regs.pc.wrapping_add(offset);
                        self.regs.jump(dest);
                    }
                    JsrTarget::Register(base) => {
                        let dest = self.regs.read(base);
                        self.regs.jump(dest);
                    }
                }
            }

            Instruction::Ld { dr, pc_offset } => {
                let addr = self.regs.pc.wrapping_add(pc_offset);
                let value = self.mem_read(addr);
                self.regs.write(dr, value);
                self.regs.update_flags(dr);
            }

            Instruction::Ldi { dr, pc_offset } => {
                // One extra indirection over LD: the PC-relative cell
                // holds the address of the value.
                let addr = self.regs.pc.wrapping_add(pc_offset);
                let indirect = self.mem_read(addr);
                let value = self.mem_read(indirect);
                self.regs.write(dr, value);
                self.regs.update_flags(dr);
            }

            Instruction::Ldr { dr, base, offset } => {
                let addr = self.regs.read(base).wrapping_add(offset);
                let value = self.mem_read(addr);
                self.regs.write(dr, value);
                self.regs.update_flags(dr);
            }

            Instruction::Lea { dr, pc_offset } => {
                let addr = self.regs.pc.wrapping_add(pc_offset);
                self.regs.write(dr, addr);
                self.regs.update_flags(dr);
            }

            Instruction::St { sr, pc_offset } => {
                let addr = self.regs.pc.wrapping_add(pc_offset);
                self.mem.write(addr, self.regs.read(sr));
            }

            Instruction::Sti { sr, pc_offset } => {
                let addr = self.regs.pc.wrapping_add(pc_offset);
                let target = self.mem_read(addr);
                self.mem.write(target, self.regs.read(sr));
            }

            Instruction::Str { sr, base, offset } => {
                let addr = self.regs.read(base).wrapping_add(offset);
                self.mem.write(addr, self.regs.read(sr));
            }

            Instruction::Trap { vector } => {
                self.trap(vector)?;
            }
        }

        Ok(())
    }

    /// Resolve the second operand of ADD/AND.
    fn operand(&self, src: Operand) -> u16 {
        match src {
            Operand::Register(sr2) => self.regs.read(sr2),
            Operand::Immediate(imm) => imm,
        }
    }

    /// Device-intercepting memory read.
    fn mem_read(&mut self, addr: u16) -> u16 {
        self.mem.read(addr, self.console.as_mut())
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instruction
    }

    /// Check if the machine has stopped for any reason.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }

    /// Check if the machine executed a HALT.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// A serializable summary of the machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            regs: self.regs.clone(),
            state: self.state,
            cycles: self.cycles,
        }
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .field("mem", &self.mem)
            .finish()
    }
}

/// Registers, run state, and cycle count at a point in time. What the
/// CLI writes for `--dump-state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub regs: Registers,
    pub state: CpuState,
    pub cycles: u64,
}

/// Errors that stop execution.
#[derive(Debug, Error)]
pub enum CpuError {
    #[error("CPU not running ({0:?})")]
    NotRunning(CpuState),

    /// RTI, the reserved opcode, or an unknown trap vector. Fatal: the
    /// emulated program has lost its way and resuming would execute
    /// garbage.
    #[error("illegal instruction at {addr:#06x}: {source}")]
    IllegalInstruction { addr: u16, source: DecodeError },

    #[error("console I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::QueueConsole;
    use crate::cpu::decode::encode;
    use crate::cpu::memory::{MR_KBDR, MR_KBSR};
    use crate::cpu::registers::{CondFlag, PC_START};
    use crate::cpu::trap::TrapVector;

    const HALT: Instruction = Instruction::Trap {
        vector: TrapVector::Halt,
    };

    fn make_cpu(program: &[Instruction]) -> (Cpu, QueueConsole) {
        let console = QueueConsole::new();
        let mut cpu = Cpu::new(Box::new(console.clone()));
        let words: Vec<u16> = program.iter().map(encode).collect();
        cpu.load_program(PC_START, &words).unwrap();
        (cpu, console)
    }

    #[test]
    fn halt_stops_the_run() {
        let (mut cpu, _console) = make_cpu(&[HALT]);

        let executed = cpu.run().unwrap();

        assert_eq!(executed, 1);
        assert!(cpu.is_halted());
    }

    #[test]
    fn step_after_halt_mutates_nothing() {
        let (mut cpu, _console) = make_cpu(&[HALT]);
        cpu.run().unwrap();

        let pc = cpu.regs.pc;
        let cycles = cpu.cycles;
        let err = cpu.step().unwrap_err();

        assert!(matches!(err, CpuError::NotRunning(CpuState::Halted)));
        assert_eq!(cpu.regs.pc, pc);
        assert_eq!(cpu.cycles, cycles);
    }

    #[test]
    fn add_immediate_negative_one() {
        // ADD R2, R0, #-1 with R0 = 5 leaves R2 = 4, flags positive.
        let (mut cpu, _console) = make_cpu(&[
            Instruction::Add {
                dr: 2,
                sr1: 0,
                src: Operand::Immediate(0xFFFF),
            },
            HALT,
        ]);
        cpu.regs.write(0, 5);

        cpu.run().unwrap();

        assert_eq!(cpu.regs.read(2), 4);
        assert_eq!(cpu.regs.cond, CondFlag::Positive);
    }

    #[test]
    fn add_register_mode_wraps() {
        let (mut cpu, _console) = make_cpu(&[
            Instruction::Add {
                dr: 2,
                sr1: 0,
                src: Operand::Register(1),
            },
            HALT,
        ]);
        cpu.regs.write(0, 0xFFFF);
        cpu.regs.write(1, 1);

        cpu.run().unwrap();

        assert_eq!(cpu.regs.read(2), 0);
        assert_eq!(cpu.regs.cond, CondFlag::Zero);
    }

    #[test]
    fn and_masks_bits() {
        let (mut cpu, _console) = make_cpu(&[
            Instruction::And {
                dr: 3,
                sr1: 0,
                src: Operand::Immediate(0x000F),
            },
            HALT,
        ]);
        cpu.regs.write(0, 0xABCD);

        cpu.run().unwrap();

        assert_eq!(cpu.regs.read(3), 0x000D);
        assert_eq!(cpu.regs.cond, CondFlag::Positive);
    }

    #[test]
    fn not_complements_and_sets_negative() {
        let (mut cpu, _console) = make_cpu(&[Instruction::Not { dr: 1, sr: 0 }, HALT]);
        cpu.regs.write(0, 0x0F0F);

        cpu.run().unwrap();

        assert_eq!(cpu.regs.read(1), 0xF0F0);
        assert_eq!(cpu.regs.cond, CondFlag::Negative);
    }

    #[test]
    fn br_taken_on_matching_flag() {
        // COND starts at Zero. BRz over the next instruction.
        let (mut cpu, _console) = make_cpu(&[
            Instruction::Br {
                cond: 0b010,
                pc_offset: 1,
            },
            Instruction::Add {
                dr: 0,
                sr1: 0,
                src: Operand::Immediate(1),
            },
            HALT,
        ]);

        cpu.run().unwrap();

        // The ADD was skipped.
        assert_eq!(cpu.regs.read(0), 0);
    }

    #[test]
    fn br_not_taken_on_disjoint_flags() {
        // COND is Zero; BRnp must fall through.
        let (mut cpu, _console) = make_cpu(&[
            Instruction::Br {
                cond: 0b101,
                pc_offset: 1,
            },
            Instruction::Add {
                dr: 0,
                sr1: 0,
                src: Operand::Immediate(1),
            },
            HALT,
        ]);

        cpu.run().unwrap();

        // The ADD ran.
        assert_eq!(cpu.regs.read(0), 1);
    }

    #[test]
    fn br_offset_is_from_incremented_pc() {
        // A branch with offset -1 lands on the instruction after the
        // branch's own address + 0, i.e. loops onto the next cell.
        let (mut cpu, _console) = make_cpu(&[
            Instruction::Br {
                cond: 0b111,
                pc_offset: 0xFFFF,
            },
            HALT,
        ]);

        cpu.step().unwrap();
        assert_eq!(cpu.regs.pc, PC_START);
    }

    #[test]
    fn jmp_sets_pc_from_base() {
        let (mut cpu, _console) = make_cpu(&[Instruction::Jmp { base: 3 }]);
        cpu.mem.write(0x4000, encode(&HALT));
        cpu.regs.write(3, 0x4000);

        cpu.run().unwrap();

        assert!(cpu.is_halted());
        assert_eq!(cpu.regs.pc, 0x4001);
    }

    #[test]
    fn jsr_saves_return_address() {
        // JSR to a subroutine that returns via RET (JMP R7).
        let (mut cpu, _console) = make_cpu(&[
            Instruction::Jsr {
                target: JsrTarget::Offset(2),
            },
            HALT,
            // unreachable filler
            Instruction::Br {
                cond: 0,
                pc_offset: 0,
            },
            // subroutine at PC_START + 3
            Instruction::Add {
                dr: 0,
                sr1: 0,
                src: Operand::Immediate(7),
            },
            Instruction::Jmp { base: 7 },
        ]);

        cpu.run().unwrap();

        assert_eq!(cpu.regs.read(0), 7);
        assert_eq!(cpu.regs.read(7), PC_START + 1);
        assert!(cpu.is_halted());
    }

    #[test]
    fn jsrr_jumps_through_register() {
        let (mut cpu, _console) = make_cpu(&[Instruction::Jsr {
            target: JsrTarget::Register(2),
        }]);
        cpu.regs.write(2, 0x5000);
        cpu.mem.write(0x5000, encode(&HALT));

        cpu.run().unwrap();

        assert_eq!(cpu.regs.read(7), PC_START + 1);
        assert!(cpu.is_halted());
    }

    #[test]
    fn ld_is_pc_relative() {
        let (mut cpu, _console) = make_cpu(&[
            Instruction::Ld {
                dr: 4,
                pc_offset: 0x10,
            },
            HALT,
        ]);
        cpu.mem.write(PC_START + 1 + 0x10, 0x1234);

        cpu.run().unwrap();

        assert_eq!(cpu.regs.read(4), 0x1234);
        assert_eq!(cpu.regs.cond, CondFlag::Positive);
    }

    #[test]
    fn ldi_follows_pointer_chain() {
        let (mut cpu, _console) = make_cpu(&[
            Instruction::Ldi {
                dr: 0,
                pc_offset: 0x10,
            },
            HALT,
        ]);
        cpu.mem.write(PC_START + 1 + 0x10, 0x4000);
        cpu.mem.write(0x4000, 0x0041);

        cpu.run().unwrap();

        assert_eq!(cpu.regs.read(0), 0x0041);
        assert_eq!(cpu.regs.cond, CondFlag::Positive);
    }

    #[test]
    fn ldr_is_base_relative() {
        let (mut cpu, _console) = make_cpu(&[
            Instruction::Ldr {
                dr: 1,
                base: 2,
                offset: 0xFFFF,
            },
            HALT,
        ]);
        cpu.regs.write(2, 0x4001);
        cpu.mem.write(0x4000, 0x8001);

        cpu.run().unwrap();

        assert_eq!(cpu.regs.read(1), 0x8001);
        assert_eq!(cpu.regs.cond, CondFlag::Negative);
    }

    #[test]
    fn lea_loads_address_not_value() {
        let (mut cpu, _console) = make_cpu(&[
            Instruction::Lea {
                dr: 5,
                pc_offset: 0xFFFE,
            },
            HALT,
        ]);

        cpu.run().unwrap();

        assert_eq!(cpu.regs.read(5), PC_START - 1);
        assert_eq!(cpu.regs.cond, CondFlag::Positive);
    }

    #[test]
    fn lea_wraps_across_address_space() {
        let (mut cpu, _console) = make_cpu(&[]);
        cpu.mem.write(0xFFFF, encode(&Instruction::Lea { dr: 0, pc_offset: 2 }));
        cpu.mem.write(0x0000, encode(&HALT));
        cpu.regs.pc = 0xFFFF;

        cpu.run().unwrap();

        // PC wrapped to 0x0000 after the fetch; 0x0000 + 2 = 0x0002.
        assert_eq!(cpu.regs.read(0), 0x0002);
        assert!(cpu.is_halted());
    }

    #[test]
    fn st_stores_pc_relative() {
        let (mut cpu, _console) = make_cpu(&[
            Instruction::St {
                sr: 6,
                pc_offset: 0x20,
            },
            HALT,
        ]);
        cpu.regs.write(6, 0xCAFE);

        cpu.run().unwrap();

        assert_eq!(cpu.mem.peek(PC_START + 1 + 0x20), 0xCAFE);
    }

    #[test]
    fn sti_stores_through_pointer() {
        let (mut cpu, _console) = make_cpu(&[
            Instruction::Sti {
                sr: 6,
                pc_offset: 0x20,
            },
            HALT,
        ]);
        cpu.regs.write(6, 0xCAFE);
        cpu.mem.write(PC_START + 1 + 0x20, 0x7000);

        cpu.run().unwrap();

        assert_eq!(cpu.mem.peek(0x7000), 0xCAFE);
    }

    #[test]
    fn str_stores_base_relative() {
        let (mut cpu, _console) = make_cpu(&[
            Instruction::Str {
                sr: 1,
                base: 2,
                offset: 2,
            },
            HALT,
        ]);
        cpu.regs.write(1, 0xBEEF);
        cpu.regs.write(2, 0x6000);

        cpu.run().unwrap();

        assert_eq!(cpu.mem.peek(0x6002), 0xBEEF);
    }

    #[test]
    fn rti_is_fatal() {
        let (mut cpu, _console) = make_cpu(&[]);
        cpu.mem.write(PC_START, 0x8000);

        let err = cpu.run().unwrap_err();

        assert!(matches!(
            err,
            CpuError::IllegalInstruction {
                addr: 0x3000,
                source: DecodeError::Unimplemented { opcode: 0x8 }
            }
        ));
    }

    #[test]
    fn reserved_opcode_is_fatal() {
        let (mut cpu, _console) = make_cpu(&[]);
        cpu.mem.write(PC_START, 0xD000);

        let err = cpu.step().unwrap_err();

        assert!(matches!(
            err,
            CpuError::IllegalInstruction {
                source: DecodeError::Unimplemented { opcode: 0xD },
                ..
            }
        ));
    }

    #[test]
    fn keyboard_polling_program() {
        // Poll KBSR until ready, then load the key from KBDR.
        //   LDI R0, kbsr_ptr   ; read status
        //   BRzp #-2           ; loop until bit 15 set (negative)
        //   LDI R0, kbdr_ptr   ; read the key
        //   HALT
        let (mut cpu, console) = make_cpu(&[
            Instruction::Ldi {
                dr: 0,
                pc_offset: 3,
            },
            Instruction::Br {
                cond: 0b011,
                pc_offset: 0xFFFE,
            },
            Instruction::Ldi {
                dr: 0,
                pc_offset: 2,
            },
            HALT,
            // kbsr_ptr at PC_START + 4, kbdr_ptr at PC_START + 5
        ]);
        cpu.mem.write(PC_START + 4, MR_KBSR);
        cpu.mem.write(PC_START + 5, MR_KBDR);
        console.push_input(b"A");

        cpu.run().unwrap();

        assert_eq!(cpu.regs.read(0), 0x0041);
    }

    #[test]
    fn hello_world_program() {
        //   LEA R0, #2   ; address of the string
        //   PUTS
        //   HALT
        let string_addr = PC_START + 3;
        let (mut cpu, console) = make_cpu(&[
            Instruction::Lea {
                dr: 0,
                pc_offset: 2,
            },
            Instruction::Trap {
                vector: TrapVector::Puts,
            },
            HALT,
        ]);
        for (i, &ch) in b"Hello".iter().enumerate() {
            cpu.mem.write(string_addr + i as u16, u16::from(ch));
        }

        cpu.run().unwrap();

        assert_eq!(console.output(), b"Hello");
        assert!(cpu.is_halted());
    }

    #[test]
    fn run_limited_stops_at_the_limit() {
        // An infinite loop: BRnzp #-1.
        let (mut cpu, _console) = make_cpu(&[Instruction::Br {
            cond: 0b111,
            pc_offset: 0xFFFF,
        }]);

        let executed = cpu.run_limited(100).unwrap();

        assert_eq!(executed, 100);
        assert!(cpu.is_running());
    }

    #[test]
    fn snapshot_reflects_machine_state() {
        let (mut cpu, _console) = make_cpu(&[HALT]);
        cpu.run().unwrap();

        let snapshot = cpu.snapshot();
        assert_eq!(snapshot.state, CpuState::Halted);
        assert_eq!(snapshot.cycles, 1);
        assert_eq!(snapshot.regs.pc, PC_START + 1);

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"Halted\""));
    }
}
