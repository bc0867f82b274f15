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

use crate::errors::CompileError;
use crate::file_reader::FileReader;
use serde::Deserialize;
use std::path::Path;

// The metadata reader presents a loaded managed module as a JSON document.
// These structs are its object model; the container format itself (tables,
// heaps, signatures) is the reader's problem, not ours.

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Module {
    pub name: String,
    pub types: Vec<TypeDef>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TypeDef {
    /// Full dotted name, e.g. "TestOS.Program".
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub methods: Vec<Method>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Field {
    pub name: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub init: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Method {
    pub name: String,
    #[serde(default)]
    pub is_entry_point: bool,
    #[serde(default)]
    pub is_constructor: bool,
    #[serde(default)]
    pub is_static_constructor: bool,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub locals: Vec<String>,
    #[serde(default)]
    pub body: Vec<BodyInstruction>,
}

impl TypeDef {
    pub fn full_method_name(&self, method: &Method) -> String {
        format!("{}.{}", self.name, method.name)
    }

    pub fn full_field_name(&self, field: &Field) -> String {
        format!("{}.{}", self.name, field.name)
    }
}

/// One bytecode instruction together with its byte offset in the method
/// body. Offsets are the branch-target coordinate space.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BodyInstruction {
    pub offset: u32,
    #[serde(flatten)]
    pub op: CilOp,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CilOp {
    Nop,
    Ret,
    Pop,
    Dup,
    LdcI4 { value: i32 },
    LdcI8 { value: i64 },
    Ldstr { value: String },
    Ldloc { index: u32 },
    Stloc { index: u32 },
    Ldarg { index: u32 },
    Starg { index: u32 },
    Ldsfld { field: String },
    Stsfld { field: String },
    Call { method: String, args: u32 },
    Br { target: u32 },
    Brtrue { target: u32 },
    Brfalse { target: u32 },
    Beq { target: u32 },
    BneUn { target: u32 },
    Blt { target: u32 },
    BltUn { target: u32 },
    Ble { target: u32 },
    BleUn { target: u32 },
    Bgt { target: u32 },
    BgtUn { target: u32 },
    Bge { target: u32 },
    BgeUn { target: u32 },
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    Not,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    ShrUn,
    Ceq,
    Clt,
    CltUn,
    Cgt,
    CgtUn,
    ConvI1,
    ConvU1,
    ConvI2,
    ConvU2,
    ConvI4,
    ConvU4,
    ConvI8,
    ConvU8,
    ConvI,
    ConvU,
    LdindI1,
    LdindU1,
    LdindI2,
    LdindU2,
    LdindI4,
    LdindU4,
    LdindI8,
    StindI1,
    StindI2,
    StindI4,
    StindI8,
}

impl CilOp {
    /// Source mnemonic, used for the Comment instruction the lowerer emits
    /// ahead of every lowered bytecode.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            CilOp::Nop => "nop",
            CilOp::Ret => "ret",
            CilOp::Pop => "pop",
            CilOp::Dup => "dup",
            CilOp::LdcI4 { .. } => "ldc.i4",
            CilOp::LdcI8 { .. } => "ldc.i8",
            CilOp::Ldstr { .. } => "ldstr",
            CilOp::Ldloc { .. } => "ldloc",
            CilOp::Stloc { .. } => "stloc",
            CilOp::Ldarg { .. } => "ldarg",
            CilOp::Starg { .. } => "starg",
            CilOp::Ldsfld { .. } => "ldsfld",
            CilOp::Stsfld { .. } => "stsfld",
            CilOp::Call { .. } => "call",
            CilOp::Br { .. } => "br",
            CilOp::Brtrue { .. } => "brtrue",
            CilOp::Brfalse { .. } => "brfalse",
            CilOp::Beq { .. } => "beq",
            CilOp::BneUn { .. } => "bne.un",
            CilOp::Blt { .. } => "blt",
            CilOp::BltUn { .. } => "blt.un",
            CilOp::Ble { .. } => "ble",
            CilOp::BleUn { .. } => "ble.un",
            CilOp::Bgt { .. } => "bgt",
            CilOp::BgtUn { .. } => "bgt.un",
            CilOp::Bge { .. } => "bge",
            CilOp::BgeUn { .. } => "bge.un",
            CilOp::Add => "add",
            CilOp::Sub => "sub",
            CilOp::Mul => "mul",
            CilOp::Div => "div",
            CilOp::Rem => "rem",
            CilOp::Neg => "neg",
            CilOp::Not => "not",
            CilOp::And => "and",
            CilOp::Or => "or",
            CilOp::Xor => "xor",
            CilOp::Shl => "shl",
            CilOp::Shr => "shr",
            CilOp::ShrUn => "shr.un",
            CilOp::Ceq => "ceq",
            CilOp::Clt => "clt",
            CilOp::CltUn => "clt.un",
            CilOp::Cgt => "cgt",
            CilOp::CgtUn => "cgt.un",
            CilOp::ConvI1 => "conv.i1",
            CilOp::ConvU1 => "conv.u1",
            CilOp::ConvI2 => "conv.i2",
            CilOp::ConvU2 => "conv.u2",
            CilOp::ConvI4 => "conv.i4",
            CilOp::ConvU4 => "conv.u4",
            CilOp::ConvI8 => "conv.i8",
            CilOp::ConvU8 => "conv.u8",
            CilOp::ConvI => "conv.i",
            CilOp::ConvU => "conv.u",
            CilOp::LdindI1 => "ldind.i1",
            CilOp::LdindU1 => "ldind.u1",
            CilOp::LdindI2 => "ldind.i2",
            CilOp::LdindU2 => "ldind.u2",
            CilOp::LdindI4 => "ldind.i4",
            CilOp::LdindU4 => "ldind.u4",
            CilOp::LdindI8 => "ldind.i8",
            CilOp::StindI1 => "stind.i1",
            CilOp::StindI2 => "stind.i2",
            CilOp::StindI4 => "stind.i4",
            CilOp::StindI8 => "stind.i8",
        }
    }

    /// The offset this instruction branches to, if it is a branch.
    pub fn branch_target(&self) -> Option<u32> {
        match self {
            CilOp::Br { target }
            | CilOp::Brtrue { target }
            | CilOp::Brfalse { target }
            | CilOp::Beq { target }
            | CilOp::BneUn { target }
            | CilOp::Blt { target }
            | CilOp::BltUn { target }
            | CilOp::Ble { target }
            | CilOp::BleUn { target }
            | CilOp::Bgt { target }
            | CilOp::BgtUn { target }
            | CilOp::Bge { target }
            | CilOp::BgeUn { target } => Some(*target),
            _ => None,
        }
    }
}

/// Loads a module document produced by the metadata reader.
pub fn read_module<F: FileReader>(path: &Path, reader: &F) -> Result<Module, CompileError> {
    let text = reader
        .read_to_string(path)
        .map_err(|e| CompileError::InputError {
            reason: format!("Failed to read module file {}: {}", path.display(), e),
        })?;

    serde_json::from_str(&text).map_err(|e| CompileError::InputError {
        reason: format!("Malformed module document: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_reader::MockFileReader;

    #[test]
    fn test_read_minimal_module() {
        let mut reader = MockFileReader::default();
        reader.add_file(
            "os.json",
            r#"{
                "name": "TestOS",
                "types": [{
                    "name": "TestOS.Program",
                    "methods": [{
                        "name": "Main",
                        "is_entry_point": true,
                        "body": [
                            {"offset": 0, "op": "ldc_i4", "value": 5},
                            {"offset": 2, "op": "pop"},
                            {"offset": 3, "op": "ret"}
                        ]
                    }]
                }]
            }"#,
        );

        let module = read_module(Path::new("os.json"), &reader).unwrap();
        assert_eq!(module.name, "TestOS");
        assert_eq!(module.types.len(), 1);

        let method = &module.types[0].methods[0];
        assert!(method.is_entry_point);
        assert_eq!(method.body.len(), 3);
        assert_eq!(method.body[0].op, CilOp::LdcI4 { value: 5 });
        assert_eq!(method.body[2].op, CilOp::Ret);
        assert_eq!(method.body[2].offset, 3);
    }

    #[test]
    fn test_malformed_module_is_an_input_error() {
        let mut reader = MockFileReader::default();
        reader.add_file("bad.json", "{ not json");

        let err = read_module(Path::new("bad.json"), &reader).unwrap_err();
        match err {
            CompileError::InputError { .. } => {}
            other => panic!("expected InputError, got {:?}", other),
        }
    }

    #[test]
    fn test_branch_target_extraction() {
        assert_eq!(CilOp::Br { target: 7 }.branch_target(), Some(7));
        assert_eq!(CilOp::BltUn { target: 12 }.branch_target(), Some(12));
        assert_eq!(CilOp::Ret.branch_target(), None);
        assert_eq!(CilOp::Add.branch_target(), None);
    }
}
