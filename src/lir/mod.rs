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

use bitflags::bitflags;

/// Linear IR opcodes. The LIR is a flat, non-SSA form; each instruction
/// maps to exactly one target mnemonic and the flag set carries everything
/// the backend needs to reconstruct the addressing form.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LirOp {
    Nop,
    Ret,
    Call,
    Jmp,
    Label,
    Comment,
    Store,
    Mov,
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Cmp,
    Set,
}

bitflags! {
    /// Orthogonal instruction flags: one size class, operand roles for
    /// each slot, and a condition code for Jmp/Set. Empty means "no flags"
    /// (a bare code label, a comment).
    pub struct InstrFlags: u32 {
        const BYTE             = 1 << 0;
        const WORD             = 1 << 1;
        const DWORD            = 1 << 2;
        const QWORD            = 1 << 3;

        const DEST_REGISTER    = 1 << 4;
        const SRC_REGISTER     = 1 << 5;
        const DEST_POINTER     = 1 << 6;
        const SRC_POINTER      = 1 << 7;
        const IMMEDIATE        = 1 << 8;
        const LABEL            = 1 << 9;

        const ZERO             = 1 << 10;
        const NOT_ZERO         = 1 << 11;
        const EQUAL            = 1 << 12;
        const NOT_EQUAL        = 1 << 13;
        const LESS             = 1 << 14;
        const LESS_OR_EQUAL    = 1 << 15;
        const GREATER          = 1 << 16;
        const GREATER_OR_EQUAL = 1 << 17;
    }
}

impl InstrFlags {
    pub fn size(self) -> Option<OperandSize> {
        if self.contains(InstrFlags::BYTE) {
            Some(OperandSize::Byte)
        } else if self.contains(InstrFlags::WORD) {
            Some(OperandSize::Word)
        } else if self.contains(InstrFlags::DWORD) {
            Some(OperandSize::Dword)
        } else if self.contains(InstrFlags::QWORD) {
            Some(OperandSize::Qword)
        } else {
            None
        }
    }

    pub fn condition(self) -> Option<InstrFlags> {
        const CONDITIONS: [InstrFlags; 8] = [
            InstrFlags::ZERO,
            InstrFlags::NOT_ZERO,
            InstrFlags::EQUAL,
            InstrFlags::NOT_EQUAL,
            InstrFlags::LESS,
            InstrFlags::LESS_OR_EQUAL,
            InstrFlags::GREATER,
            InstrFlags::GREATER_OR_EQUAL,
        ];
        CONDITIONS.iter().copied().find(|c| self.contains(*c))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OperandSize {
    Byte,
    Word,
    Dword,
    Qword,
}

impl OperandSize {
    pub fn bytes(self) -> u32 {
        match self {
            OperandSize::Byte => 1,
            OperandSize::Word => 2,
            OperandSize::Dword => 4,
            OperandSize::Qword => 8,
        }
    }

    pub fn flag(self) -> InstrFlags {
        match self {
            OperandSize::Byte => InstrFlags::BYTE,
            OperandSize::Word => InstrFlags::WORD,
            OperandSize::Dword => InstrFlags::DWORD,
            OperandSize::Qword => InstrFlags::QWORD,
        }
    }
}

/// The abstract register file. R0 holds the abstract evaluation stack
/// pointer, R3/R4 are the local and argument frame bases, R1/R2/R5 are
/// scratch. R5 is also the shift-count register.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegId {
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
}

/// A register reference: an id, the size view it is used at, and an
/// optional byte displacement for indirect forms ([reg + k]).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Register {
    pub id: RegId,
    pub size: OperandSize,
    pub displacement: i32,
}

impl Register {
    pub const fn new(id: RegId) -> Self {
        Register {
            id,
            size: OperandSize::Qword,
            displacement: 0,
        }
    }

    pub const fn sized(self, size: OperandSize) -> Self {
        Register { size, ..self }
    }

    pub const fn offset(self, displacement: i32) -> Self {
        Register {
            displacement,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Reg(Register),
    Imm(i64),
    Label(String),
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: LirOp,
    pub flags: InstrFlags,
    pub operand1: Option<Operand>,
    pub operand2: Option<Operand>,
}

impl Instruction {
    pub fn new(op: LirOp) -> Self {
        Instruction {
            op,
            flags: InstrFlags::empty(),
            operand1: None,
            operand2: None,
        }
    }

    pub fn with1(op: LirOp, flags: InstrFlags, operand1: Operand) -> Self {
        Instruction {
            op,
            flags,
            operand1: Some(operand1),
            operand2: None,
        }
    }

    pub fn with2(op: LirOp, flags: InstrFlags, operand1: Operand, operand2: Operand) -> Self {
        Instruction {
            op,
            flags,
            operand1: Some(operand1),
            operand2: Some(operand2),
        }
    }

    /// A bare code label definition.
    pub fn code_label(name: &str) -> Self {
        Instruction::with1(LirOp::Label, InstrFlags::empty(), Operand::Label(name.into()))
    }

    /// A data slot definition: a label with a size class and an
    /// initializer value.
    pub fn data_label(name: &str, size: OperandSize, init: i64) -> Self {
        Instruction::with2(
            LirOp::Label,
            size.flag(),
            Operand::Label(name.into()),
            Operand::Imm(init),
        )
    }

    pub fn comment(text: &str) -> Self {
        Instruction::with1(LirOp::Comment, InstrFlags::empty(), Operand::Raw(text.into()))
    }

    /// True for `Label` instructions that declare a data slot rather than
    /// a code position.
    pub fn is_data_label(&self) -> bool {
        self.op == LirOp::Label && self.flags.size().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_views_are_pure() {
        let r = Register::new(RegId::R3);
        assert_eq!(r.size, OperandSize::Qword);
        assert_eq!(r.displacement, 0);

        let byte_view = r.sized(OperandSize::Byte);
        let displaced = r.offset(16);

        // the original value is untouched
        assert_eq!(r.size, OperandSize::Qword);
        assert_eq!(r.displacement, 0);
        assert_eq!(byte_view.size, OperandSize::Byte);
        assert_eq!(displaced.displacement, 16);
        assert_eq!(displaced.id, RegId::R3);
    }

    #[test]
    fn test_flag_axes() {
        let flags = InstrFlags::QWORD | InstrFlags::DEST_REGISTER | InstrFlags::IMMEDIATE;
        assert_eq!(flags.size(), Some(OperandSize::Qword));
        assert_eq!(flags.condition(), None);

        let jcc = InstrFlags::LABEL | InstrFlags::NOT_ZERO;
        assert_eq!(jcc.condition(), Some(InstrFlags::NOT_ZERO));
        assert_eq!(jcc.size(), None);
    }

    #[test]
    fn test_data_label_detection() {
        let code = Instruction::code_label("TestOS_Program_Main");
        let data = Instruction::data_label("TestOS_Program_X", OperandSize::Qword, 7);
        assert!(!code.is_data_label());
        assert!(data.is_data_label());
    }
}
