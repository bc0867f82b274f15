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

use super::{Lowerer, R0, R1};
use crate::lir::{InstrFlags, Instruction, LirOp, Operand, Register};

// Abstract stack discipline: R0 points at the current top-of-stack slot.
// Push grows R0 by one pointer-sized slot before the write, pop reads the
// slot then shrinks R0. Slots are pointer-sized regardless of the logical
// value width.

impl Lowerer {
    pub(crate) fn grow_stack(&mut self) {
        self.emit(Instruction::with2(
            LirOp::Add,
            InstrFlags::QWORD | InstrFlags::DEST_REGISTER | InstrFlags::IMMEDIATE,
            Operand::Reg(R0),
            Operand::Imm(self.pointer_size() as i64),
        ));
    }

    pub(crate) fn shrink_stack(&mut self) {
        self.emit(Instruction::with2(
            LirOp::Sub,
            InstrFlags::QWORD | InstrFlags::DEST_REGISTER | InstrFlags::IMMEDIATE,
            Operand::Reg(R0),
            Operand::Imm(self.pointer_size() as i64),
        ));
    }

    /// Push(reg): R0 += PointerSize; [R0] <- reg.
    pub(crate) fn push_from(&mut self, reg: Register) {
        self.grow_stack();
        self.emit(Instruction::with2(
            LirOp::Mov,
            InstrFlags::QWORD
                | InstrFlags::DEST_REGISTER
                | InstrFlags::DEST_POINTER
                | InstrFlags::SRC_REGISTER,
            Operand::Reg(R0),
            Operand::Reg(reg),
        ));
    }

    /// Push(imm): R0 += PointerSize; [R0] <- imm.
    pub(crate) fn push_imm(&mut self, value: i64) {
        self.grow_stack();
        self.emit(Instruction::with2(
            LirOp::Mov,
            InstrFlags::QWORD
                | InstrFlags::DEST_REGISTER
                | InstrFlags::DEST_POINTER
                | InstrFlags::IMMEDIATE,
            Operand::Reg(R0),
            Operand::Imm(value),
        ));
    }

    /// Pop(reg): reg <- [R0]; R0 -= PointerSize.
    pub(crate) fn pop_into(&mut self, reg: Register) {
        self.peek_into(reg);
        self.shrink_stack();
    }

    /// Peek(reg): reg <- [R0], stack pointer untouched.
    pub(crate) fn peek_into(&mut self, reg: Register) {
        self.emit(Instruction::with2(
            LirOp::Mov,
            InstrFlags::QWORD
                | InstrFlags::DEST_REGISTER
                | InstrFlags::SRC_REGISTER
                | InstrFlags::SRC_POINTER,
            Operand::Reg(reg),
            Operand::Reg(R0),
        ));
    }

    /// pop: discard the top slot.
    pub(crate) fn drop_slot(&mut self) {
        self.shrink_stack();
    }

    /// dup: duplicate the top slot.
    pub(crate) fn lower_dup(&mut self) {
        self.peek_into(R1);
        self.push_from(R1);
    }

    /// ldloc/ldarg: read slot `index` of the frame based at `base`
    /// (R3 for locals, R4 for arguments) and push it.
    pub(crate) fn lower_frame_load(&mut self, base: Register, index: u32) {
        let slot = base.offset((index * self.pointer_size()) as i32);
        self.emit(Instruction::with2(
            LirOp::Mov,
            InstrFlags::QWORD
                | InstrFlags::DEST_REGISTER
                | InstrFlags::SRC_REGISTER
                | InstrFlags::SRC_POINTER,
            Operand::Reg(R1),
            Operand::Reg(slot),
        ));
        self.push_from(R1);
    }

    /// stloc/starg: pop into R1 and write slot `index` of the frame.
    pub(crate) fn lower_frame_store(&mut self, base: Register, index: u32) {
        self.pop_into(R1);
        let slot = base.offset((index * self.pointer_size()) as i32);
        self.emit(Instruction::with2(
            LirOp::Mov,
            InstrFlags::QWORD
                | InstrFlags::DEST_REGISTER
                | InstrFlags::DEST_POINTER
                | InstrFlags::SRC_REGISTER,
            Operand::Reg(slot),
            Operand::Reg(R1),
        ));
    }
}
