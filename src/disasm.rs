//! Disassembler for LC-3 programs.
//!
//! Converts instruction words back to readable assembly, for the
//! execution trace, the `disasm` subcommand, and the debugger's code
//! pane.

use crate::cpu::decode::{decode, Instruction, JsrTarget, Operand};

/// Disassemble a single instruction word.
///
/// Words that do not decode (RTI, the reserved opcode, unknown trap
/// vectors) are almost always data in disguise and are formatted as
/// `.FILL` rather than reported as errors.
pub fn disassemble_instruction(word: u16) -> String {
    match decode(word) {
        Ok(instruction) => format_instruction(&instruction),
        Err(_) => format!(".FILL x{word:04X}"),
    }
}

/// Disassemble a whole image into an addressed listing.
pub fn disassemble(origin: u16, words: &[u16]) -> String {
    let mut output = String::new();
    for (i, &word) in words.iter().enumerate() {
        let addr = origin.wrapping_add(i as u16);
        output.push_str(&format!(
            "x{addr:04X}: {:<20} ; x{word:04X}\n",
            disassemble_instruction(word)
        ));
    }
    output
}

/// Format a decoded instruction as assembly text.
fn format_instruction(instruction: &Instruction) -> String {
    match *instruction {
        Instruction::Br { cond, pc_offset } => {
            if cond == 0 {
                // A never-taken branch; assemblers emit 0x0000 as NOP.
                return "NOP".to_string();
            }
            let mut mnemonic = String::from("BR");
            if cond & 0b100 != 0 {
                mnemonic.push('n');
            }
            if cond & 0b010 != 0 {
                mnemonic.push('z');
            }
            if cond & 0b001 != 0 {
                mnemonic.push('p');
            }
            format!("{mnemonic} {}", fmt_imm(pc_offset))
        }
        Instruction::Add { dr, sr1, src } => {
            format!("ADD R{dr}, R{sr1}, {}", fmt_operand(src))
        }
        Instruction::And { dr, sr1, src } => {
            format!("AND R{dr}, R{sr1}, {}", fmt_operand(src))
        }
        Instruction::Not { dr, sr } => format!("NOT R{dr}, R{sr}"),
        Instruction::Ld { dr, pc_offset } => format!("LD R{dr}, {}", fmt_imm(pc_offset)),
        Instruction::Ldi { dr, pc_offset } => format!("LDI R{dr}, {}", fmt_imm(pc_offset)),
        Instruction::Ldr { dr, base, offset } => {
            format!("LDR R{dr}, R{base}, {}", fmt_imm(offset))
        }
        Instruction::Lea { dr, pc_offset } => format!("LEA R{dr}, {}", fmt_imm(pc_offset)),
        Instruction::St { sr, pc_offset } => format!("ST R{sr}, {}", fmt_imm(pc_offset)),
        Instruction::Sti { sr, pc_offset } => format!("STI R{sr}, {}", fmt_imm(pc_offset)),
        Instruction::Str { sr, base, offset } => {
            format!("STR R{sr}, R{base}, {}", fmt_imm(offset))
        }
        Instruction::Jmp { base } => {
            if base == 7 {
                "RET".to_string()
            } else {
                format!("JMP R{base}")
            }
        }
        Instruction::Jsr { target } => match target {
            JsrTarget::Offset(offset) => format!("JSR {}", fmt_imm(offset)),
            JsrTarget::Register(base) => format!("JSRR R{base}"),
        },
        Instruction::Trap { vector } => {
            let alias = match vector.code() {
                0x20 => "GETC",
                0x21 => "OUT",
                0x22 => "PUTS",
                0x23 => "IN",
                0x24 => "PUTSP",
                0x25 => "HALT",
                _ => unreachable!("vector came from a decoded instruction"),
            };
            alias.to_string()
        }
    }
}

/// Immediates and offsets print as signed decimal, LC-3 style.
fn fmt_imm(value: u16) -> String {
    format!("#{}", value as i16)
}

fn fmt_operand(src: Operand) -> String {
    match src {
        Operand::Register(sr2) => format!("R{sr2}"),
        Operand::Immediate(imm) => fmt_imm(imm),
    }
}
