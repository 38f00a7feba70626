//! Decoded instruction representation.
//!
//! In memory, branch operands refer to other instructions through stable
//! [`InstrId`]s instead of byte offsets. Ids are allocated per body and never
//! reused, so inserting or moving instructions cannot invalidate a target that
//! is referenced from elsewhere in the same body. Offsets only exist in the
//! encoded form and are recomputed on write.

use std::fmt;

use crate::metadata::token::Token;

use super::opcode::{OpCode, OperandType};

/// Stable identity of an instruction within one method body.
///
/// Ids are meaningful only inside the body that allocated them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub u32);

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04}", self.0)
    }
}

/// An instruction operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// Argument or local slot index
    Var(u16),
    /// 32-bit integer constant
    I4(i32),
    /// 64-bit integer constant
    I8(i64),
    /// 64-bit float constant
    R8(f64),
    /// Index into the module's user-string heap
    String(u32),
    /// Type or member token
    Member(Token),
    /// Branch target instruction
    Target(InstrId),
}

impl Operand {
    /// Whether this operand shape matches the layout `expected`.
    #[must_use]
    pub fn matches(&self, expected: OperandType) -> bool {
        matches!(
            (self, expected),
            (Operand::None, OperandType::None)
                | (Operand::Var(_), OperandType::VarIndex)
                | (Operand::I4(_), OperandType::I4)
                | (Operand::I8(_), OperandType::I8)
                | (Operand::R8(_), OperandType::R8)
                | (Operand::String(_), OperandType::StringIndex)
                | (Operand::Member(_), OperandType::Token)
                | (Operand::Target(_), OperandType::Target)
        )
    }
}

/// One unit of bytecode: an opcode plus zero or one operand.
///
/// Instructions are exclusively owned by their body's ordered sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Stable body-local identity
    pub id: InstrId,
    /// The operation
    pub opcode: OpCode,
    /// The operand, matching [`OpCode::operand_type`]
    pub operand: Operand,
}

impl Instruction {
    /// Creates an instruction; the operand shape must match the opcode.
    #[must_use]
    pub fn new(id: InstrId, opcode: OpCode, operand: Operand) -> Self {
        debug_assert!(operand.matches(opcode.operand_type()));
        Instruction {
            id,
            opcode,
            operand,
        }
    }

    /// The branch target, if this instruction is a branch.
    #[must_use]
    pub fn branch_target(&self) -> Option<InstrId> {
        match self.operand {
            Operand::Target(target) => Some(target),
            _ => None,
        }
    }

    /// Whether this instruction leaves the method.
    #[must_use]
    pub fn is_return(&self) -> bool {
        self.opcode == OpCode::Ret
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.opcode.mnemonic())?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Var(slot) => write!(f, " {slot}"),
            Operand::I4(value) => write!(f, " {value}"),
            Operand::I8(value) => write!(f, " {value}"),
            Operand::R8(value) => write!(f, " {value}"),
            Operand::String(index) => write!(f, " us:{index}"),
            Operand::Member(token) => write!(f, " {token}"),
            Operand::Target(target) => write!(f, " -> {target}"),
        }
    }
}
