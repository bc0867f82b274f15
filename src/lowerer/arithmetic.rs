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

use super::{Lowerer, R1, R2, R5};
use crate::lir::{InstrFlags, Instruction, LirOp, Operand, OperandSize};

impl Lowerer {
    /// Binary operators: the right operand is on top. Pop(R1); Pop(R2);
    /// R2 op= R1; Push(R2). Signed and unsigned bytecode variants collapse
    /// to the same LIR.
    pub(crate) fn lower_binary(&mut self, op: LirOp) {
        self.pop_into(R1);
        self.pop_into(R2);
        self.emit(Instruction::with2(
            op,
            InstrFlags::QWORD | InstrFlags::DEST_REGISTER | InstrFlags::SRC_REGISTER,
            Operand::Reg(R2),
            Operand::Reg(R1),
        ));
        self.push_from(R2);
    }

    /// Shifts route the count through R5 and use only its byte view; the
    /// target requires the variable shift count in its count register.
    pub(crate) fn lower_shift(&mut self, op: LirOp) {
        self.pop_into(R5);
        self.pop_into(R2);
        self.emit(Instruction::with2(
            op,
            InstrFlags::QWORD | InstrFlags::DEST_REGISTER | InstrFlags::SRC_REGISTER,
            Operand::Reg(R2),
            Operand::Reg(R5.sized(OperandSize::Byte)),
        ));
        self.push_from(R2);
    }

    /// Conversions narrow by masking the top of the stack; a `None` mask
    /// is a no-op conversion.
    pub(crate) fn lower_conv(&mut self, mask: Option<u64>) {
        let Some(mask) = mask else {
            return;
        };
        self.pop_into(R1);
        self.emit(Instruction::with2(
            LirOp::And,
            InstrFlags::QWORD | InstrFlags::DEST_REGISTER | InstrFlags::IMMEDIATE,
            Operand::Reg(R1),
            Operand::Imm(mask as i64),
        ));
        self.push_from(R1);
    }
}
