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

use super::labels::{branch_label, safe_name};
use super::{Lowerer, R1, R2, R4};
use crate::lir::{InstrFlags, Instruction, LirOp, Operand, OperandSize};

impl Lowerer {
    /// call: pop the N arguments off the caller's stack into the callee's
    /// argument frame, slot N-1 first down to slot 0, then call. The
    /// observed bytecode subset never consumes return values, so none is
    /// synthesized.
    pub(crate) fn lower_call(&mut self, method: &str, args: u32) {
        for slot in (0..args).rev() {
            self.pop_into(R1);
            self.emit(Instruction::with2(
                LirOp::Mov,
                InstrFlags::QWORD
                    | InstrFlags::DEST_REGISTER
                    | InstrFlags::DEST_POINTER
                    | InstrFlags::SRC_REGISTER,
                Operand::Reg(R4.offset((slot * self.pointer_size()) as i32)),
                Operand::Reg(R1),
            ));
        }
        self.emit(Instruction::with1(
            LirOp::Call,
            InstrFlags::LABEL,
            Operand::Label(safe_name(method)),
        ));
    }

    /// br: unconditional jump to the branch label at `target`.
    pub(crate) fn lower_br(&mut self, method_hash: u16, target: u32) {
        self.emit(Instruction::with1(
            LirOp::Jmp,
            InstrFlags::LABEL,
            Operand::Label(branch_label(method_hash, target)),
        ));
    }

    /// brtrue/brfalse: compare the popped value against zero, then jump
    /// on the given condition.
    pub(crate) fn lower_branch_unary(
        &mut self,
        condition: InstrFlags,
        method_hash: u16,
        target: u32,
    ) {
        self.pop_into(R1);
        self.emit(Instruction::with2(
            LirOp::Cmp,
            InstrFlags::QWORD | InstrFlags::DEST_REGISTER | InstrFlags::IMMEDIATE,
            Operand::Reg(R1),
            Operand::Imm(0),
        ));
        self.emit(Instruction::with1(
            LirOp::Jmp,
            InstrFlags::LABEL | condition,
            Operand::Label(branch_label(method_hash, target)),
        ));
    }

    /// Two-operand conditional branches: Cmp R2, R1 then a conditional
    /// jump. The unsigned variants share the signed condition codes.
    pub(crate) fn lower_branch_cmp(
        &mut self,
        condition: InstrFlags,
        method_hash: u16,
        target: u32,
    ) {
        self.pop_into(R1);
        self.pop_into(R2);
        self.emit(Instruction::with2(
            LirOp::Cmp,
            InstrFlags::QWORD | InstrFlags::DEST_REGISTER | InstrFlags::SRC_REGISTER,
            Operand::Reg(R2),
            Operand::Reg(R1),
        ));
        self.emit(Instruction::with1(
            LirOp::Jmp,
            InstrFlags::LABEL | condition,
            Operand::Label(branch_label(method_hash, target)),
        ));
    }

    /// ceq/clt/cgt: Cmp R2, R1; byte-sized Set into R2; push.
    pub(crate) fn lower_compare(&mut self, condition: InstrFlags) {
        self.pop_into(R1);
        self.pop_into(R2);
        self.emit(Instruction::with2(
            LirOp::Cmp,
            InstrFlags::QWORD | InstrFlags::DEST_REGISTER | InstrFlags::SRC_REGISTER,
            Operand::Reg(R2),
            Operand::Reg(R1),
        ));
        self.emit(Instruction::with1(
            LirOp::Set,
            InstrFlags::BYTE | InstrFlags::DEST_REGISTER | condition,
            Operand::Reg(R2.sized(OperandSize::Byte)),
        ));
        self.push_from(R2);
    }
}
