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

use super::labels::{blob_labels, safe_name};
use super::{Lowerer, R1, R2};
use crate::lir::{InstrFlags, Instruction, LirOp, Operand, OperandSize};

impl Lowerer {
    /// ldstr: place the UTF-16LE bytes inline behind a jump. The blob
    /// label's address is pushed; execution skips over the raw bytes to
    /// the continuation label.
    pub(crate) fn lower_ldstr(&mut self, text: &str) {
        let bytes: Vec<u8> = text
            .encode_utf16()
            .flat_map(|unit| unit.to_le_bytes())
            .collect();
        let (blob, continuation) = blob_labels(&bytes, text);

        self.emit(Instruction::with2(
            LirOp::Mov,
            InstrFlags::QWORD | InstrFlags::DEST_REGISTER | InstrFlags::LABEL,
            Operand::Reg(R1),
            Operand::Label(blob.clone()),
        ));
        self.push_from(R1);
        self.emit(Instruction::with1(
            LirOp::Jmp,
            InstrFlags::LABEL,
            Operand::Label(continuation.clone()),
        ));
        self.emit(Instruction::code_label(&blob));

        let byte_list = bytes
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        self.emit(Instruction::with1(
            LirOp::Store,
            InstrFlags::empty(),
            Operand::Raw(byte_list),
        ));
        self.emit(Instruction::code_label(&continuation));
    }

    /// ldsfld: load through the field's data slot symbol and push.
    pub(crate) fn lower_ldsfld(&mut self, field: &str) {
        self.emit(Instruction::with2(
            LirOp::Mov,
            InstrFlags::QWORD
                | InstrFlags::DEST_REGISTER
                | InstrFlags::LABEL
                | InstrFlags::SRC_POINTER,
            Operand::Reg(R1),
            Operand::Label(safe_name(field)),
        ));
        self.push_from(R1);
    }

    /// stsfld: pop and store through the field's data slot symbol.
    pub(crate) fn lower_stsfld(&mut self, field: &str) {
        self.pop_into(R1);
        self.emit(Instruction::with2(
            LirOp::Mov,
            InstrFlags::QWORD
                | InstrFlags::LABEL
                | InstrFlags::DEST_POINTER
                | InstrFlags::SRC_REGISTER,
            Operand::Label(safe_name(field)),
            Operand::Reg(R1),
        ));
    }

    /// ldind: pop the address, load the sized view from it, push the full
    /// slot, then re-mask to the loaded width. Eight-byte loads push
    /// without narrowing.
    pub(crate) fn lower_ldind(&mut self, size: OperandSize, mask: Option<u64>) {
        self.pop_into(R1);
        self.emit(Instruction::with2(
            LirOp::Mov,
            size.flag()
                | InstrFlags::DEST_REGISTER
                | InstrFlags::SRC_REGISTER
                | InstrFlags::SRC_POINTER,
            Operand::Reg(R2.sized(size)),
            Operand::Reg(R1),
        ));
        self.push_from(R2);
        self.lower_conv(mask);
    }

    /// stind: pop the value, pop the address, store the value's sized
    /// view through the address.
    pub(crate) fn lower_stind(&mut self, size: OperandSize) {
        self.pop_into(R1);
        self.pop_into(R2);
        self.emit(Instruction::with2(
            LirOp::Mov,
            size.flag()
                | InstrFlags::DEST_REGISTER
                | InstrFlags::DEST_POINTER
                | InstrFlags::SRC_REGISTER,
            Operand::Reg(R2),
            Operand::Reg(R1.sized(size)),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lir::RegId;

    fn lowered(f: impl FnOnce(&mut Lowerer)) -> Vec<Instruction> {
        let mut lowerer = Lowerer::new(8);
        f(&mut lowerer);
        lowerer.into_instructions()
    }

    #[test]
    fn test_ldstr_encodes_utf16_and_skips_the_blob() {
        let instructions = lowered(|l| l.lower_ldstr("Hi"));

        let store_pos = instructions
            .iter()
            .position(|i| i.op == LirOp::Store)
            .expect("store");
        assert_eq!(
            instructions[store_pos].operand1,
            Some(Operand::Raw("72, 0, 105, 0".to_string()))
        );

        // the store is immediately preceded by its defining label, and
        // the jump right before that targets the label right after it
        let blob_label = match &instructions[store_pos - 1].operand1 {
            Some(Operand::Label(name)) => name.clone(),
            _ => panic!("store not preceded by a label"),
        };
        assert_eq!(instructions[store_pos - 1].op, LirOp::Label);

        let jmp = &instructions[store_pos - 2];
        assert_eq!(jmp.op, LirOp::Jmp);
        let continuation = match &instructions[store_pos + 1].operand1 {
            Some(Operand::Label(name)) => name.clone(),
            _ => panic!("store not followed by the continuation label"),
        };
        assert_eq!(jmp.operand1, Some(Operand::Label(continuation)));

        // the pushed address is the blob label
        let addr_load = instructions
            .iter()
            .find(|i| i.op == LirOp::Mov && i.flags.contains(InstrFlags::LABEL))
            .expect("address load");
        assert_eq!(addr_load.operand2, Some(Operand::Label(blob_label)));
        assert!(!addr_load.flags.contains(InstrFlags::SRC_POINTER));
    }

    #[test]
    fn test_ldstr_empty_string_emits_empty_blob() {
        let instructions = lowered(|l| l.lower_ldstr(""));
        let store = instructions
            .iter()
            .find(|i| i.op == LirOp::Store)
            .expect("store");
        assert_eq!(store.operand1, Some(Operand::Raw(String::new())));
    }

    #[test]
    fn test_stind_narrows_the_source_view() {
        let instructions = lowered(|l| l.lower_stind(OperandSize::Byte));
        let store = instructions
            .iter()
            .find(|i| i.op == LirOp::Mov && i.flags.contains(InstrFlags::DEST_POINTER))
            .expect("indirect store");
        assert_eq!(store.flags.size(), Some(OperandSize::Byte));
        match store.operand2 {
            Some(Operand::Reg(reg)) => {
                assert_eq!(reg.id, RegId::R1);
                assert_eq!(reg.size, OperandSize::Byte);
            }
            _ => panic!("source must be the narrowed value register"),
        }
    }

    #[test]
    fn test_ldind_remasks_narrow_loads() {
        let instructions = lowered(|l| l.lower_ldind(OperandSize::Word, Some(0xFFFF)));
        let and = instructions
            .iter()
            .find(|i| i.op == LirOp::And)
            .expect("masking and");
        assert_eq!(and.operand2, Some(Operand::Imm(0xFFFF)));

        let qword_load = lowered(|l| l.lower_ldind(OperandSize::Qword, None));
        assert!(qword_load.iter().all(|i| i.op != LirOp::And));
    }
}
