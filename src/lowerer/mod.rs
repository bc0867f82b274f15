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

mod arithmetic;
mod control_flow;
pub mod labels;
mod memory;
mod stack_ops;

use crate::errors::CompileError;
use crate::lir::{InstrFlags, Instruction, LirOp, Operand, OperandSize, RegId, Register};
use crate::metadata::{BodyInstruction, CilOp, Method, Module, TypeDef};
use labels::{branch_label, method_hash, safe_name};
use std::collections::HashSet;

pub(crate) const R0: Register = Register::new(RegId::R0);
pub(crate) const R1: Register = Register::new(RegId::R1);
pub(crate) const R2: Register = Register::new(RegId::R2);
pub(crate) const R3: Register = Register::new(RegId::R3);
pub(crate) const R4: Register = Register::new(RegId::R4);
pub(crate) const R5: Register = Register::new(RegId::R5);

/// The label the prologue parks execution at once the entry point returns.
pub const HALT_LABEL: &str = "halt";

/// Lowered output for one module: the sanitized assembly name and the
/// ordered LIR sequence. Static-field slots, string blobs and the entry
/// call are all elements of the sequence.
#[derive(Debug, PartialEq)]
pub struct CompilationUnit {
    pub name: String,
    pub instructions: Vec<Instruction>,
}

pub struct Lowerer {
    instructions: Vec<Instruction>,
    pointer_size: u32,
}

/// Lowers a loaded module into a flat LIR sequence: startup prologue,
/// method bodies, then static-field data slots.
pub fn lower_module(module: &Module, pointer_size: u32) -> Result<CompilationUnit, CompileError> {
    let mut lowerer = Lowerer::new(pointer_size);

    lowerer.emit_prologue(module)?;

    for type_def in &module.types {
        for method in &type_def.methods {
            lowerer.lower_method(type_def, method);
        }
    }

    lowerer.emit_static_fields(module);

    log::debug!(
        "lowered {} into {} LIR instructions",
        module.name,
        lowerer.instructions.len()
    );

    Ok(CompilationUnit {
        name: safe_name(&module.name),
        instructions: lowerer.instructions,
    })
}

impl Lowerer {
    pub fn new(pointer_size: u32) -> Self {
        Lowerer {
            instructions: Vec::new(),
            pointer_size,
        }
    }

    pub(crate) fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    pub(crate) fn pointer_size(&self) -> u32 {
        self.pointer_size
    }

    #[cfg(test)]
    pub(crate) fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }

    fn pointer_size_class(&self) -> OperandSize {
        if self.pointer_size == 8 {
            OperandSize::Qword
        } else {
            OperandSize::Dword
        }
    }

    /// Pass 1: startup prologue. The generated kernel has no runtime, so
    /// static initialization is staged as direct calls at the top of
    /// execution: every constructor and static constructor in source
    /// order, then the entry point, then a self-loop.
    fn emit_prologue(&mut self, module: &Module) -> Result<(), CompileError> {
        for type_def in &module.types {
            for method in &type_def.methods {
                if method.is_constructor || method.is_static_constructor {
                    let name = safe_name(&type_def.full_method_name(method));
                    self.emit(Instruction::with1(
                        LirOp::Call,
                        InstrFlags::LABEL,
                        Operand::Label(name),
                    ));
                }
            }
        }

        let entry = module
            .types
            .iter()
            .find_map(|t| {
                t.methods
                    .iter()
                    .find(|m| m.is_entry_point)
                    .map(|m| t.full_method_name(m))
            })
            .ok_or_else(|| CompileError::InputError {
                reason: format!("Module {} has no entry point method", module.name),
            })?;

        self.emit(Instruction::with1(
            LirOp::Call,
            InstrFlags::LABEL,
            Operand::Label(safe_name(&entry)),
        ));

        self.emit(Instruction::code_label(HALT_LABEL));
        self.emit(Instruction::with1(
            LirOp::Jmp,
            InstrFlags::LABEL,
            Operand::Label(HALT_LABEL.to_string()),
        ));

        Ok(())
    }

    /// Pass 2: per-method lowering. One code label per method, branch
    /// labels synthesized ahead of every targeted offset, one comment per
    /// source instruction.
    fn lower_method(&mut self, type_def: &TypeDef, method: &Method) {
        let full_name = safe_name(&type_def.full_method_name(method));
        let hash = method_hash(&full_name);

        self.emit(Instruction::code_label(&full_name));

        // branch-target prescan
        let targets: HashSet<u32> = method
            .body
            .iter()
            .filter_map(|instr| instr.op.branch_target())
            .collect();

        for instr in &method.body {
            if targets.contains(&instr.offset) {
                self.emit(Instruction::code_label(&branch_label(hash, instr.offset)));
            }
            self.emit(Instruction::comment(instr.op.mnemonic()));
            self.lower_instruction(instr, hash);
        }
    }

    /// Pass 3: one pointer-sized data slot per static field, placed after
    /// all code so a slot is never reachable by straight-line execution.
    fn emit_static_fields(&mut self, module: &Module) {
        let size = self.pointer_size_class();
        for type_def in &module.types {
            for field in &type_def.fields {
                if field.is_static {
                    let name = safe_name(&type_def.full_field_name(field));
                    self.emit(Instruction::data_label(&name, size, field.init.unwrap_or(0)));
                }
            }
        }
    }

    fn lower_instruction(&mut self, instr: &BodyInstruction, hash: u16) {
        match &instr.op {
            CilOp::Nop => self.emit(Instruction::new(LirOp::Nop)),
            CilOp::Ret => self.emit(Instruction::new(LirOp::Ret)),
            CilOp::Pop => self.drop_slot(),
            CilOp::Dup => self.lower_dup(),

            CilOp::LdcI4 { value } => self.push_imm(*value as i64),
            CilOp::LdcI8 { value } => self.push_imm(*value),
            CilOp::Ldstr { value } => self.lower_ldstr(value),

            CilOp::Ldloc { index } => self.lower_frame_load(R3, *index),
            CilOp::Stloc { index } => self.lower_frame_store(R3, *index),
            CilOp::Ldarg { index } => self.lower_frame_load(R4, *index),
            CilOp::Starg { index } => self.lower_frame_store(R4, *index),

            CilOp::Ldsfld { field } => self.lower_ldsfld(field),
            CilOp::Stsfld { field } => self.lower_stsfld(field),

            CilOp::Call { method, args } => self.lower_call(method, *args),

            CilOp::Br { target } => self.lower_br(hash, *target),
            CilOp::Brtrue { target } => {
                self.lower_branch_unary(InstrFlags::NOT_ZERO, hash, *target)
            }
            CilOp::Brfalse { target } => self.lower_branch_unary(InstrFlags::ZERO, hash, *target),
            CilOp::Beq { target } => self.lower_branch_cmp(InstrFlags::EQUAL, hash, *target),
            CilOp::BneUn { target } => self.lower_branch_cmp(InstrFlags::NOT_EQUAL, hash, *target),
            CilOp::Blt { target } | CilOp::BltUn { target } => {
                self.lower_branch_cmp(InstrFlags::LESS, hash, *target)
            }
            CilOp::Ble { target } | CilOp::BleUn { target } => {
                self.lower_branch_cmp(InstrFlags::LESS_OR_EQUAL, hash, *target)
            }
            CilOp::Bgt { target } | CilOp::BgtUn { target } => {
                self.lower_branch_cmp(InstrFlags::GREATER, hash, *target)
            }
            CilOp::Bge { target } | CilOp::BgeUn { target } => {
                self.lower_branch_cmp(InstrFlags::GREATER_OR_EQUAL, hash, *target)
            }

            CilOp::Add => self.lower_binary(LirOp::Add),
            CilOp::Sub => self.lower_binary(LirOp::Sub),
            CilOp::Mul => self.lower_binary(LirOp::Mul),
            CilOp::And => self.lower_binary(LirOp::And),
            CilOp::Or => self.lower_binary(LirOp::Or),
            CilOp::Xor => self.lower_binary(LirOp::Xor),
            CilOp::Shl => self.lower_shift(LirOp::Shl),
            CilOp::Shr | CilOp::ShrUn => self.lower_shift(LirOp::Shr),

            CilOp::Ceq => self.lower_compare(InstrFlags::EQUAL),
            CilOp::Clt | CilOp::CltUn => self.lower_compare(InstrFlags::LESS),
            CilOp::Cgt | CilOp::CgtUn => self.lower_compare(InstrFlags::GREATER),

            CilOp::ConvI1 | CilOp::ConvU1 => self.lower_conv(Some(0xFF)),
            CilOp::ConvI2 | CilOp::ConvU2 => self.lower_conv(Some(0xFFFF)),
            CilOp::ConvI4 | CilOp::ConvU4 | CilOp::ConvI | CilOp::ConvU => {
                let mask = if self.pointer_size == 8 {
                    Some(0xFFFF_FFFF)
                } else {
                    None
                };
                self.lower_conv(mask);
            }
            CilOp::ConvI8 | CilOp::ConvU8 => self.lower_conv(Some(u64::MAX)),

            CilOp::LdindI1 | CilOp::LdindU1 => self.lower_ldind(OperandSize::Byte, Some(0xFF)),
            CilOp::LdindI2 | CilOp::LdindU2 => self.lower_ldind(OperandSize::Word, Some(0xFFFF)),
            CilOp::LdindI4 | CilOp::LdindU4 => {
                self.lower_ldind(OperandSize::Dword, Some(0xFFFF_FFFF))
            }
            CilOp::LdindI8 => self.lower_ldind(OperandSize::Qword, None),
            CilOp::StindI1 => self.lower_stind(OperandSize::Byte),
            CilOp::StindI2 => self.lower_stind(OperandSize::Word),
            CilOp::StindI4 => self.lower_stind(OperandSize::Dword),
            CilOp::StindI8 => self.lower_stind(OperandSize::Qword),

            unsupported => {
                log::warn!(
                    "No lowering rule for opcode {}, skipping",
                    unsupported.mnemonic()
                );
            }
        }
    }
}
