/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use super::{run_tool, Architecture, OutputFormat, ToolRunner};
use crate::lir::{InstrFlags, Instruction, LirOp, Operand, OperandSize, RegId};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

const POINTER_SIZE: u32 = 8;

// Abstract register file mapping. R5 lands on rcx so its byte view is cl,
// the mandatory variable shift-count register.
fn register_name(id: RegId, size: OperandSize) -> &'static str {
    match (id, size) {
        (RegId::R0, OperandSize::Qword) => "rbx",
        (RegId::R0, OperandSize::Dword) => "ebx",
        (RegId::R0, OperandSize::Word) => "bx",
        (RegId::R0, OperandSize::Byte) => "bl",
        (RegId::R1, OperandSize::Qword) => "rax",
        (RegId::R1, OperandSize::Dword) => "eax",
        (RegId::R1, OperandSize::Word) => "ax",
        (RegId::R1, OperandSize::Byte) => "al",
        (RegId::R2, OperandSize::Qword) => "rdx",
        (RegId::R2, OperandSize::Dword) => "edx",
        (RegId::R2, OperandSize::Word) => "dx",
        (RegId::R2, OperandSize::Byte) => "dl",
        (RegId::R3, OperandSize::Qword) => "rsi",
        (RegId::R3, OperandSize::Dword) => "esi",
        (RegId::R3, OperandSize::Word) => "si",
        (RegId::R3, OperandSize::Byte) => "sil",
        (RegId::R4, OperandSize::Qword) => "rdi",
        (RegId::R4, OperandSize::Dword) => "edi",
        (RegId::R4, OperandSize::Word) => "di",
        (RegId::R4, OperandSize::Byte) => "dil",
        (RegId::R5, OperandSize::Qword) => "rcx",
        (RegId::R5, OperandSize::Dword) => "ecx",
        (RegId::R5, OperandSize::Word) => "cx",
        (RegId::R5, OperandSize::Byte) => "cl",
    }
}

fn size_keyword(size: OperandSize) -> &'static str {
    match size {
        OperandSize::Byte => "byte",
        OperandSize::Word => "word",
        OperandSize::Dword => "dword",
        OperandSize::Qword => "qword",
    }
}

fn data_directive(size: OperandSize) -> &'static str {
    match size {
        OperandSize::Byte => "db",
        OperandSize::Word => "dw",
        OperandSize::Dword => "dd",
        OperandSize::Qword => "dq",
    }
}

pub struct Amd64Architecture {
    format: OutputFormat,
    text: Vec<String>,
    data: Vec<String>,
}

impl Amd64Architecture {
    pub fn new(format: OutputFormat) -> Self {
        Amd64Architecture {
            format,
            text: Vec::new(),
            data: Vec::new(),
        }
    }

    fn mnemonic(&self, instruction: &Instruction) -> Result<&'static str> {
        let condition = instruction.flags.condition();
        Ok(match instruction.op {
            LirOp::Nop => "nop",
            LirOp::Ret => "ret",
            LirOp::Call => "call",
            LirOp::Mov => "mov",
            LirOp::Add => "add",
            LirOp::Sub => "sub",
            LirOp::Mul => "imul",
            LirOp::And => "and",
            LirOp::Or => "or",
            LirOp::Xor => "xor",
            LirOp::Shl => "shl",
            LirOp::Shr => "shr",
            LirOp::Cmp => "cmp",
            LirOp::Jmp => match condition {
                None => "jmp",
                Some(c) if c == InstrFlags::ZERO => "jz",
                Some(c) if c == InstrFlags::NOT_ZERO => "jnz",
                Some(c) if c == InstrFlags::EQUAL => "je",
                Some(c) if c == InstrFlags::NOT_EQUAL => "jne",
                Some(c) if c == InstrFlags::LESS => "jl",
                Some(c) if c == InstrFlags::LESS_OR_EQUAL => "jle",
                Some(c) if c == InstrFlags::GREATER => "jg",
                Some(c) if c == InstrFlags::GREATER_OR_EQUAL => "jge",
                Some(other) => bail!("invalid jump condition flags: {:?}", other),
            },
            LirOp::Set => match condition {
                Some(c) if c == InstrFlags::ZERO => "setz",
                Some(c) if c == InstrFlags::NOT_ZERO => "setnz",
                Some(c) if c == InstrFlags::EQUAL => "sete",
                Some(c) if c == InstrFlags::NOT_EQUAL => "setne",
                Some(c) if c == InstrFlags::LESS => "setl",
                Some(c) if c == InstrFlags::LESS_OR_EQUAL => "setle",
                Some(c) if c == InstrFlags::GREATER => "setg",
                Some(c) if c == InstrFlags::GREATER_OR_EQUAL => "setge",
                _ => bail!("set instruction without a condition flag"),
            },
            LirOp::Label | LirOp::Comment | LirOp::Store => {
                bail!("{:?} has no mnemonic", instruction.op)
            }
        })
    }

    /// Formats one operand slot. Pointer indirection and the size
    /// override come from the flag set; a register's own size view picks
    /// the register name for direct references.
    fn format_operand(&self, operand: &Operand, flags: InstrFlags, dest: bool) -> Result<String> {
        let pointer = if dest {
            flags.contains(InstrFlags::DEST_POINTER)
        } else {
            flags.contains(InstrFlags::SRC_POINTER)
        };

        Ok(match operand {
            Operand::Reg(reg) => {
                if pointer {
                    // the base address is always the full-width register
                    let base = register_name(reg.id, OperandSize::Qword);
                    let address = if reg.displacement == 0 {
                        base.to_string()
                    } else if reg.displacement > 0 {
                        format!("{} + {}", base, reg.displacement)
                    } else {
                        format!("{} - {}", base, -i64::from(reg.displacement))
                    };
                    match flags.size() {
                        Some(size) => format!("{} [{}]", size_keyword(size), address),
                        None => format!("[{}]", address),
                    }
                } else {
                    register_name(reg.id, reg.size).to_string()
                }
            }
            Operand::Imm(value) => value.to_string(),
            Operand::Label(name) => {
                if pointer {
                    match flags.size() {
                        Some(size) => format!("{} [{}]", size_keyword(size), name),
                        None => format!("[{}]", name),
                    }
                } else {
                    name.clone()
                }
            }
            Operand::Raw(_) => bail!("raw operand outside Comment/Store"),
        })
    }

    fn emit_instruction(&mut self, instruction: &Instruction) -> Result<()> {
        match instruction.op {
            LirOp::Label => {
                let name = match &instruction.operand1 {
                    Some(Operand::Label(name)) => name,
                    other => bail!("label instruction without a name: {:?}", other),
                };
                if let Some(size) = instruction.flags.size() {
                    let init = match instruction.operand2 {
                        Some(Operand::Imm(value)) => value,
                        _ => 0,
                    };
                    // data slots live in the writable section
                    self.data
                        .push(format!("{}: {} {}", name, data_directive(size), init));
                } else {
                    self.text.push(format!("{}:", name));
                }
            }
            LirOp::Comment => {
                if let Some(Operand::Raw(text)) = &instruction.operand1 {
                    self.text.push(format!("    ; {}", text));
                }
            }
            LirOp::Store => {
                let payload = match &instruction.operand1 {
                    Some(Operand::Raw(bytes)) => bytes,
                    other => bail!("store instruction without a byte list: {:?}", other),
                };
                if !payload.is_empty() {
                    self.text.push(format!("    db {}", payload));
                }
            }
            _ => {
                let mnemonic = self.mnemonic(instruction)?;
                let line = match (&instruction.operand1, &instruction.operand2) {
                    (Some(op1), Some(op2)) => format!(
                        "    {} {}, {}",
                        mnemonic,
                        self.format_operand(op1, instruction.flags, true)?,
                        self.format_operand(op2, instruction.flags, false)?
                    ),
                    (Some(op1), None) => format!(
                        "    {} {}",
                        mnemonic,
                        self.format_operand(op1, instruction.flags, true)?
                    ),
                    (None, _) => format!("    {}", mnemonic),
                };
                self.text.push(line);
            }
        }
        Ok(())
    }
}

impl Architecture for Amd64Architecture {
    fn pointer_size(&self) -> u32 {
        POINTER_SIZE
    }

    fn initialize(&mut self) {
        self.data.clear();
        self.text.clear();
        for line in [
            "bits 64",
            "",
            "section .boot",
            "align 8",
            "multiboot2_header:",
            "    dd 0xE85250D6",
            "    dd 0",
            "    dd multiboot2_header_end - multiboot2_header",
            "    dd 0x100000000 - (0xE85250D6 + (multiboot2_header_end - multiboot2_header))",
            "    dw 0",
            "    dw 0",
            "    dd 8",
            "multiboot2_header_end:",
            "",
            "section .text",
            "global _start",
            "_start:",
            "    mov rbx, eval_stack",
            "    mov rsi, local_frame",
            "    mov rdi, arg_frame",
        ] {
            self.text.push(line.to_string());
        }
    }

    fn compile(&mut self, instructions: &[Instruction]) -> Result<String> {
        for instruction in instructions {
            self.emit_instruction(instruction)
                .with_context(|| format!("Failed to emit {:?}", instruction.op))?;
        }

        let mut output = self.text.join("\n");
        output.push('\n');
        if !self.data.is_empty() {
            output.push_str("\nsection .data\n");
            output.push_str(&self.data.join("\n"));
            output.push('\n');
        }
        output.push_str("\nsection .bss\n");
        output.push_str("eval_stack: resb 65536\n");
        output.push_str("local_frame: resb 4096\n");
        output.push_str("arg_frame: resb 4096\n");
        Ok(output)
    }

    fn assemble(&self, source: &Path, object: &Path, tools: &dyn ToolRunner) -> Result<()> {
        let format = match self.format {
            OutputFormat::Bin => "bin",
            OutputFormat::Elf => "elf64",
        };
        run_tool(
            tools,
            "nasm",
            &[
                "-f".to_string(),
                format.to_string(),
                source.display().to_string(),
                "-o".to_string(),
                object.display().to_string(),
            ],
        )
    }

    fn link(&self, object: &Path, output: &Path, tools: &dyn ToolRunner) -> Result<()> {
        let script = output.with_extension("ld");
        fs::write(&script, LINKER_SCRIPT)
            .with_context(|| format!("Failed to write linker script {}", script.display()))?;
        run_tool(
            tools,
            "ld",
            &[
                "-n".to_string(),
                "-T".to_string(),
                script.display().to_string(),
                "-o".to_string(),
                output.display().to_string(),
                object.display().to_string(),
            ],
        )
    }
}

// The kernel loads at 1 MiB with the boot header first so the multiboot2
// magic stays inside the loader's search window.
const LINKER_SCRIPT: &str = "\
ENTRY(_start)

SECTIONS
{
    . = 1M;

    .boot : ALIGN(8) { *(.boot) }
    .text : { *(.text) }
    .data : { *(.data) }
    .bss  : { *(.bss) }
}
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockToolRunner;
    use crate::lir::Register;

    fn compile(instructions: &[Instruction]) -> String {
        let mut arch = Amd64Architecture::new(OutputFormat::Elf);
        arch.initialize();
        arch.compile(instructions).unwrap()
    }

    fn reg(id: RegId) -> Register {
        Register::new(id)
    }

    #[test]
    fn test_prologue_establishes_frames() {
        let output = compile(&[]);
        assert!(output.contains("dd 0xE85250D6"));
        assert!(output.contains("    mov rbx, eval_stack"));
        assert!(output.contains("    mov rsi, local_frame"));
        assert!(output.contains("    mov rdi, arg_frame"));
        assert!(output.contains("eval_stack: resb 65536"));
    }

    #[test]
    fn test_register_indirect_with_displacement() {
        let output = compile(&[Instruction::with2(
            LirOp::Mov,
            InstrFlags::QWORD
                | InstrFlags::DEST_REGISTER
                | InstrFlags::DEST_POINTER
                | InstrFlags::SRC_REGISTER,
            Operand::Reg(reg(RegId::R3).offset(16)),
            Operand::Reg(reg(RegId::R1)),
        )]);
        assert!(output.contains("    mov qword [rsi + 16], rax"));
    }

    #[test]
    fn test_push_sequence_text() {
        let output = compile(&[
            Instruction::with2(
                LirOp::Add,
                InstrFlags::QWORD | InstrFlags::DEST_REGISTER | InstrFlags::IMMEDIATE,
                Operand::Reg(reg(RegId::R0)),
                Operand::Imm(8),
            ),
            Instruction::with2(
                LirOp::Mov,
                InstrFlags::QWORD
                    | InstrFlags::DEST_REGISTER
                    | InstrFlags::DEST_POINTER
                    | InstrFlags::IMMEDIATE,
                Operand::Reg(reg(RegId::R0)),
                Operand::Imm(5),
            ),
        ]);
        assert!(output.contains("    add rbx, 8"));
        assert!(output.contains("    mov qword [rbx], 5"));
    }

    #[test]
    fn test_conditional_jump_and_set_mnemonics() {
        let output = compile(&[
            Instruction::with1(
                LirOp::Jmp,
                InstrFlags::LABEL | InstrFlags::NOT_ZERO,
                Operand::Label("LB_12340004".to_string()),
            ),
            Instruction::with1(
                LirOp::Set,
                InstrFlags::BYTE | InstrFlags::DEST_REGISTER | InstrFlags::LESS,
                Operand::Reg(reg(RegId::R2).sized(OperandSize::Byte)),
            ),
        ]);
        assert!(output.contains("    jnz LB_12340004"));
        assert!(output.contains("    setl dl"));
    }

    #[test]
    fn test_label_through_symbol_memory_operand() {
        let output = compile(&[Instruction::with2(
            LirOp::Mov,
            InstrFlags::QWORD
                | InstrFlags::DEST_REGISTER
                | InstrFlags::LABEL
                | InstrFlags::SRC_POINTER,
            Operand::Reg(reg(RegId::R1)),
            Operand::Label("ns_Class_X".to_string()),
        )]);
        assert!(output.contains("    mov rax, qword [ns_Class_X]"));
    }

    #[test]
    fn test_data_label_routed_to_data_section() {
        let output = compile(&[
            Instruction::code_label("ns_Class_Main"),
            Instruction::data_label("ns_Class_X", OperandSize::Qword, 7),
        ]);
        assert!(output.contains("\nns_Class_Main:\n"));
        let data_pos = output.find("section .data").unwrap();
        let slot_pos = output.find("ns_Class_X: dq 7").unwrap();
        assert!(slot_pos > data_pos);
        // code must come before the data section
        assert!(output.find("ns_Class_Main:").unwrap() < data_pos);
    }

    #[test]
    fn test_store_and_comment_lines() {
        let output = compile(&[
            Instruction::comment("ldstr"),
            Instruction::with1(
                LirOp::Store,
                InstrFlags::empty(),
                Operand::Raw("72, 0, 105, 0".to_string()),
            ),
        ]);
        assert!(output.contains("    ; ldstr"));
        assert!(output.contains("    db 72, 0, 105, 0"));
    }

    #[test]
    fn test_assemble_invokes_nasm_with_format() {
        let arch = Amd64Architecture::new(OutputFormat::Elf);
        let tools = MockToolRunner::default();
        arch.assemble(Path::new("k.asm"), Path::new("k.o"), &tools)
            .unwrap();

        let calls = tools.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "nasm");
        assert_eq!(
            calls[0].1,
            vec!["-f", "elf64", "k.asm", "-o", "k.o"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_failed_assembler_is_a_tool_error() {
        let arch = Amd64Architecture::new(OutputFormat::Elf);
        let tools = MockToolRunner::failing(1);
        let err = arch
            .assemble(Path::new("k.asm"), Path::new("k.o"), &tools)
            .unwrap_err();
        let tool_err = err.downcast_ref::<crate::errors::CompileError>().unwrap();
        assert_eq!(
            *tool_err,
            crate::errors::CompileError::ToolError {
                tool: "nasm".to_string(),
                code: 1
            }
        );
    }
}
