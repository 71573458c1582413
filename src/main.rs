//! LC-3 Emulator - CLI Entry Point
//!
//! Commands:
//! - `lc3-emu run <image>` - Run a .obj program image
//! - `lc3-emu disasm <image>` - Disassemble an image
//! - `lc3-emu debug <image>` - Interactive TUI debugger
//! - `lc3-emu test` - Built-in self-test
//!
//! The emulated program owns stdout; all emulator diagnostics go to
//! stderr.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "lc3-emu")]
#[command(version = "0.1.0")]
#[command(about = "An instruction-level emulator of the LC-3 teaching computer")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program image until it halts
    Run {
        /// Path to the .obj image to execute
        image: PathBuf,
        /// Maximum number of instructions to execute (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        max_cycles: u64,
        /// Disassemble each instruction to stderr as it executes
        #[arg(short, long)]
        trace: bool,
        /// Write a JSON snapshot of the machine state after the run
        #[arg(long, value_name = "FILE")]
        dump_state: Option<PathBuf>,
    },
    /// Disassemble an image to readable text
    Disasm {
        /// Path to the .obj image
        image: PathBuf,
    },
    /// Interactive debugger
    #[cfg(feature = "tui")]
    Debug {
        /// Path to the .obj image to debug
        image: PathBuf,
    },
    /// Run the built-in self-test
    Test,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            image,
            max_cycles,
            trace,
            dump_state,
        }) => {
            run_program(&image, max_cycles, trace, dump_state.as_deref());
        }
        Some(Commands::Disasm { image }) => {
            disassemble_file(&image);
        }
        #[cfg(feature = "tui")]
        Some(Commands::Debug { image }) => {
            debug_program(&image);
        }
        Some(Commands::Test) => {
            run_self_test();
        }
        None => {
            eprintln!("LC-3 Emulator v0.1.0");
            eprintln!("Runs .obj program images for the LC-3 teaching computer");
            eprintln!();
            eprintln!("Use --help for available commands");
        }
    }
}

fn load_image_file(path: &Path) -> lc3::Image {
    match lc3::read_image(path) {
        Ok(image) => {
            eprintln!(
                "📂 Loaded {} words at x{:04X} from {}",
                image.len(),
                image.origin,
                path.display()
            );
            image
        }
        Err(e) => {
            eprintln!("❌ Failed to load image: {e}");
            std::process::exit(1);
        }
    }
}

fn run_program(path: &Path, max_cycles: u64, trace: bool, dump_state: Option<&Path>) {
    use lc3::Snapshot;

    let image = load_image_file(path);

    // The console holds the terminal in raw mode for the duration of the
    // run; `execute_image` drops it (restoring the terminal) before we
    // print the result block.
    let snapshot: Snapshot = match execute_image(&image, max_cycles, trace) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("❌ {e}");
            std::process::exit(1);
        }
    };

    eprintln!();
    eprintln!("━━━ Result ━━━");
    eprintln!("Cycles: {}", snapshot.cycles);
    eprintln!("State:  {:?}", snapshot.state);
    eprintln!("PC:     x{:04X}   COND: {:?}", snapshot.regs.pc, snapshot.regs.cond);
    for row in [0u16, 4] {
        let line: Vec<String> = (row..row + 4)
            .map(|r| format!("R{r}: x{:04X}", snapshot.regs.read(r)))
            .collect();
        eprintln!("{}", line.join("  "));
    }

    if max_cycles != 0 && snapshot.cycles >= max_cycles {
        eprintln!();
        eprintln!("⚠️  Reached max cycles limit ({max_cycles}). Use --max-cycles to increase.");
    }

    if let Some(out_path) = dump_state {
        if let Err(e) = write_snapshot(out_path, &snapshot) {
            eprintln!("❌ Failed to write state snapshot: {e}");
            std::process::exit(1);
        }
        eprintln!("✓ State snapshot written to {}", out_path.display());
    }
}

/// Run an image to completion on the real terminal.
///
/// The `TermConsole` is created here and owned by the CPU, so the
/// terminal leaves raw mode when this function returns, on success and
/// on error alike.
fn execute_image(
    image: &lc3::Image,
    max_cycles: u64,
    trace: bool,
) -> Result<lc3::Snapshot, Box<dyn std::error::Error>> {
    use lc3::{Cpu, CpuError, TermConsole};

    let console = TermConsole::new()?;
    let mut cpu = Cpu::new(Box::new(console));
    cpu.load_program(image.origin, &image.words)?;

    let outcome = if trace {
        trace_loop(&mut cpu, max_cycles)
    } else if max_cycles == 0 {
        cpu.run().map(|_| ())
    } else {
        cpu.run_limited(max_cycles).map(|_| ())
    };

    match outcome {
        Ok(()) => Ok(cpu.snapshot()),
        // Ctrl-C while the program is blocked in GETC/IN surfaces as an
        // Interrupted I/O error; that is an orderly stop, not a failure.
        Err(CpuError::Io(e)) if e.kind() == std::io::ErrorKind::Interrupted => {
            cpu.interrupt();
            Ok(cpu.snapshot())
        }
        Err(e) => Err(e.into()),
    }
}

/// Step-by-step loop that logs each instruction to stderr. Raw mode
/// needs an explicit carriage return there too.
fn trace_loop(cpu: &mut lc3::Cpu, max_cycles: u64) -> Result<(), lc3::CpuError> {
    use lc3::cpu::encode;
    use lc3::disassemble_instruction;

    while cpu.is_running() && (max_cycles == 0 || cpu.cycles < max_cycles) {
        let pc = cpu.regs.pc;
        let instruction = cpu.step()?;
        eprint!(
            "x{pc:04X}: {}\r\n",
            disassemble_instruction(encode(&instruction))
        );
        if cpu.interrupt_requested() {
            cpu.interrupt();
        }
    }
    Ok(())
}

fn write_snapshot(path: &Path, snapshot: &lc3::Snapshot) -> Result<(), Box<dyn std::error::Error>> {
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, snapshot)?;
    Ok(())
}

fn disassemble_file(path: &Path) {
    use lc3::disassemble;

    let image = load_image_file(path);
    print!("{}", disassemble(image.origin, &image.words));
}

#[cfg(feature = "tui")]
fn debug_program(path: &Path) {
    use lc3::run_debugger;

    let image = load_image_file(path);

    eprintln!("🚀 Launching debugger...");
    if let Err(e) = run_debugger(image) {
        eprintln!("❌ Debugger error: {e}");
        std::process::exit(1);
    }
}

fn run_self_test() {
    use lc3::bits::{sign_extend, swap16};
    use lc3::cpu::{encode, Instruction, Operand};
    use lc3::{CondFlag, Cpu, QueueConsole, TrapVector, PC_START};

    eprintln!("━━━ LC-3 Emulator Self-Test ━━━");
    eprintln!();

    let mut passed = 0;
    let mut failed = 0;
    let mut check = |name: &str, ok: bool| {
        if ok {
            eprintln!("{name}... ✓");
            passed += 1;
        } else {
            eprintln!("{name}... ✗");
            failed += 1;
        }
    };

    // Test 1: sign extension of every field width
    check(
        "Sign extension",
        sign_extend(0x1F, 5) == 0xFFFF
            && sign_extend(0x0F, 5) == 0x000F
            && sign_extend(0x1FF, 9) == 0xFFFF
            && sign_extend(0x7FD, 11) == 0xFFFD,
    );

    // Test 2: byte swap involution
    check(
        "Byte swap",
        swap16(0x1234) == 0x3412 && swap16(swap16(0xABCD)) == 0xABCD,
    );

    // Test 3: condition flag classification
    check(
        "Condition flags",
        CondFlag::from_value(0) == CondFlag::Zero
            && CondFlag::from_value(1) == CondFlag::Positive
            && CondFlag::from_value(0x8000) == CondFlag::Negative,
    );

    // Test 4: HALT stops the machine
    let halt = Instruction::Trap {
        vector: TrapVector::Halt,
    };
    {
        let mut cpu = Cpu::new(Box::new(QueueConsole::new()));
        cpu.load_program(PC_START, &[encode(&halt)]).unwrap();
        let result = cpu.run();
        check("CPU halt", result.is_ok() && cpu.is_halted());
    }

    // Test 5: immediate-mode arithmetic end to end
    {
        let mut cpu = Cpu::new(Box::new(QueueConsole::new()));
        let program = [
            encode(&Instruction::Add {
                dr: 2,
                sr1: 0,
                src: Operand::Immediate(0xFFFF),
            }),
            encode(&halt),
        ];
        cpu.load_program(PC_START, &program).unwrap();
        cpu.regs.write(0, 5);
        cpu.run().unwrap();
        check(
            "CPU add immediate",
            cpu.regs.read(2) == 4 && cpu.regs.cond == CondFlag::Positive,
        );
    }

    // Test 6: scripted console I/O (GETC then OUT echoes one key)
    {
        let console = QueueConsole::with_input(b"A");
        let mut cpu = Cpu::new(Box::new(console.clone()));
        let program = [
            encode(&Instruction::Trap {
                vector: TrapVector::Getc,
            }),
            encode(&Instruction::Trap {
                vector: TrapVector::Out,
            }),
            encode(&halt),
        ];
        cpu.load_program(PC_START, &program).unwrap();
        cpu.run().unwrap();
        check(
            "Console traps",
            cpu.regs.read(0) == 0x0041 && console.output() == b"A",
        );
    }

    eprintln!();
    eprintln!("Results: {passed} passed, {failed} failed");

    if failed == 0 {
        eprintln!("✓ All tests passed!");
    } else {
        std::process::exit(1);
    }
}
