//! Opcode table for the CIL-style instruction set.
//!
//! Each opcode has a fixed operand layout and a control-flow kind. Encodings
//! follow the classic CIL single-byte forms where one exists, so dumps of
//! woven bodies read naturally next to real disassembly.

use strum::{EnumCount, EnumIter};

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Falls through to the next instruction
    Next,
    /// Unconditionally transfers to the branch target
    Branch,
    /// Transfers to the branch target or falls through
    CondBranch,
    /// Calls a member and continues
    Call,
    /// Leaves the method
    Return,
}

/// The operand layout an opcode expects, both in memory and in the encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand
    None,
    /// Argument or local slot index (`u16`)
    VarIndex,
    /// 32-bit integer constant
    I4,
    /// 64-bit integer constant
    I8,
    /// 64-bit float constant
    R8,
    /// User-string heap index (`u32`)
    StringIndex,
    /// Metadata token (`u32`)
    Token,
    /// Branch target, encoded as a signed offset from the next instruction
    Target,
}

/// The instruction set understood by the weaver.
///
/// This is the subset of CIL that compiled bodies in the container format use;
/// it is closed; the decoder rejects anything else as malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
#[repr(u8)]
pub enum OpCode {
    /// No operation
    Nop = 0x00,
    /// Load argument by slot index
    LdArg = 0x0E,
    /// Load local variable by slot index
    LdLoc = 0x11,
    /// Store into local variable by slot index
    StLoc = 0x13,
    /// Push a null reference
    LdNull = 0x14,
    /// Push a 32-bit integer constant
    LdcI4 = 0x20,
    /// Push a 64-bit integer constant
    LdcI8 = 0x21,
    /// Push a 64-bit float constant
    LdcR8 = 0x23,
    /// Duplicate the top of the stack
    Dup = 0x25,
    /// Discard the top of the stack
    Pop = 0x26,
    /// Call a static or instance method
    Call = 0x28,
    /// Return from the method
    Ret = 0x2A,
    /// Unconditional branch
    Br = 0x38,
    /// Branch if the top of the stack is false/null/zero
    BrFalse = 0x39,
    /// Branch if the top of the stack is true/non-null/non-zero
    BrTrue = 0x3A,
    /// Branch if the two top stack values are equal
    Beq = 0x3B,
    /// Branch if the two top stack values are unequal (unordered)
    BneUn = 0x40,
    /// Add the two top stack values
    Add = 0x58,
    /// Subtract the top stack value from the one beneath it
    Sub = 0x59,
    /// Call a method with virtual dispatch
    CallVirt = 0x6F,
    /// Push a string literal from the user-string heap
    LdStr = 0x72,
    /// Allocate an object and call its constructor
    NewObj = 0x73,
    /// Load an instance field
    LdFld = 0x7B,
    /// Store into an instance field
    StFld = 0x7D,
    /// Load a static field
    LdsFld = 0x7E,
    /// Store into a static field
    StsFld = 0x80,
    /// Push 1 if the two top stack values are equal, else 0
    Ceq = 0x92,
}

impl OpCode {
    /// Decodes an opcode from its encoded byte.
    #[must_use]
    pub fn from_byte(value: u8) -> Option<OpCode> {
        use strum::IntoEnumIterator;
        OpCode::iter().find(|op| *op as u8 == value)
    }

    /// The operand layout this opcode carries.
    #[must_use]
    pub fn operand_type(&self) -> OperandType {
        match self {
            OpCode::Nop
            | OpCode::LdNull
            | OpCode::Dup
            | OpCode::Pop
            | OpCode::Ret
            | OpCode::Add
            | OpCode::Sub
            | OpCode::Ceq => OperandType::None,
            OpCode::LdArg | OpCode::LdLoc | OpCode::StLoc => OperandType::VarIndex,
            OpCode::LdcI4 => OperandType::I4,
            OpCode::LdcI8 => OperandType::I8,
            OpCode::LdcR8 => OperandType::R8,
            OpCode::LdStr => OperandType::StringIndex,
            OpCode::Call
            | OpCode::CallVirt
            | OpCode::NewObj
            | OpCode::LdFld
            | OpCode::StFld
            | OpCode::LdsFld
            | OpCode::StsFld => OperandType::Token,
            OpCode::Br | OpCode::BrFalse | OpCode::BrTrue | OpCode::Beq | OpCode::BneUn => {
                OperandType::Target
            }
        }
    }

    /// The control-flow kind of this opcode.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        match self {
            OpCode::Ret => FlowType::Return,
            OpCode::Br => FlowType::Branch,
            OpCode::BrFalse | OpCode::BrTrue | OpCode::Beq | OpCode::BneUn => FlowType::CondBranch,
            OpCode::Call | OpCode::CallVirt | OpCode::NewObj => FlowType::Call,
            _ => FlowType::Next,
        }
    }

    /// The assembler mnemonic, for diagnostics and dumps.
    #[must_use]
    pub fn mnemonic(&self) -> &'static str {
        match self {
            OpCode::Nop => "nop",
            OpCode::LdArg => "ldarg",
            OpCode::LdLoc => "ldloc",
            OpCode::StLoc => "stloc",
            OpCode::LdNull => "ldnull",
            OpCode::LdcI4 => "ldc.i4",
            OpCode::LdcI8 => "ldc.i8",
            OpCode::LdcR8 => "ldc.r8",
            OpCode::Dup => "dup",
            OpCode::Pop => "pop",
            OpCode::Call => "call",
            OpCode::Ret => "ret",
            OpCode::Br => "br",
            OpCode::BrFalse => "brfalse",
            OpCode::BrTrue => "brtrue",
            OpCode::Beq => "beq",
            OpCode::BneUn => "bne.un",
            OpCode::Add => "add",
            OpCode::Sub => "sub",
            OpCode::CallVirt => "callvirt",
            OpCode::LdStr => "ldstr",
            OpCode::NewObj => "newobj",
            OpCode::LdFld => "ldfld",
            OpCode::StFld => "stfld",
            OpCode::LdsFld => "ldsfld",
            OpCode::StsFld => "stsfld",
            OpCode::Ceq => "ceq",
        }
    }

    /// Encoded size of this instruction in bytes, opcode byte included.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        1 + match self.operand_type() {
            OperandType::None => 0,
            OperandType::VarIndex => 2,
            OperandType::I4 | OperandType::StringIndex | OperandType::Token | OperandType::Target => 4,
            OperandType::I8 | OperandType::R8 => 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_byte_roundtrip() {
        for op in OpCode::iter() {
            assert_eq!(OpCode::from_byte(op as u8), Some(op));
        }
    }

    #[test]
    fn test_unknown_byte() {
        assert_eq!(OpCode::from_byte(0xFF), None);
    }

    #[test]
    fn test_operand_layouts() {
        assert_eq!(OpCode::Ret.operand_type(), OperandType::None);
        assert_eq!(OpCode::LdLoc.operand_type(), OperandType::VarIndex);
        assert_eq!(OpCode::Call.operand_type(), OperandType::Token);
        assert_eq!(OpCode::Br.operand_type(), OperandType::Target);
    }

    #[test]
    fn test_encoded_sizes() {
        assert_eq!(OpCode::Nop.encoded_size(), 1);
        assert_eq!(OpCode::LdArg.encoded_size(), 3);
        assert_eq!(OpCode::LdcI8.encoded_size(), 9);
        assert_eq!(OpCode::BrFalse.encoded_size(), 5);
    }

    #[test]
    fn test_flow_types() {
        assert_eq!(OpCode::Ret.flow_type(), FlowType::Return);
        assert_eq!(OpCode::Beq.flow_type(), FlowType::CondBranch);
        assert_eq!(OpCode::CallVirt.flow_type(), FlowType::Call);
        assert_eq!(OpCode::StFld.flow_type(), FlowType::Next);
    }
}
