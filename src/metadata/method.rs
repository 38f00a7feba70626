//! Method definitions and method bodies.
//!
//! A [`MethodBody`] owns the ordered instruction sequence and the local
//! variable declarations. It is also the allocator for [`InstrId`]s: every
//! instruction added to a body gets a fresh id, so branch operands stay valid
//! across arbitrary insertions.

use bitflags::bitflags;

use crate::{
    bytecode::{InstrId, Instruction, OpCode, Operand},
    metadata::{attributes::CustomAttribute, token::Token, typesystem::TypeName},
};

bitflags! {
    /// Visibility and semantic modifiers of a method.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodModifiers: u16 {
        /// Visible outside the declaring type
        const PUBLIC = 0x0001;
        /// Visible only inside the declaring type
        const PRIVATE = 0x0002;
        /// No `this` argument
        const STATIC = 0x0010;
        /// Dispatched through the virtual method table
        const VIRTUAL = 0x0020;
        /// Compiler-generated accessor or operator (`get_X`, `set_X`, `.ctor`)
        const SPECIAL_NAME = 0x0080;
    }
}

/// A parameter declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    /// Parameter name
    pub name: String,
    /// Declared type
    pub param_type: TypeName,
}

/// A local variable declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVar {
    /// Declared type
    pub var_type: TypeName,
}

/// An ordered instruction sequence plus local variable declarations.
#[derive(Debug, Clone, Default)]
pub struct MethodBody {
    /// Local variable declarations, indexed by slot
    pub locals: Vec<LocalVar>,
    /// The instruction sequence, in execution order
    pub instructions: Vec<Instruction>,
    next_id: u32,
}

impl MethodBody {
    /// Creates an empty body.
    #[must_use]
    pub fn new() -> Self {
        MethodBody::default()
    }

    /// Rebuilds a body from decoded instructions, continuing id allocation
    /// past the highest id in use.
    #[must_use]
    pub fn from_parts(locals: Vec<LocalVar>, instructions: Vec<Instruction>) -> Self {
        let next_id = instructions
            .iter()
            .map(|instr| instr.id.0 + 1)
            .max()
            .unwrap_or(0);
        MethodBody {
            locals,
            instructions,
            next_id,
        }
    }

    /// Allocates a fresh instruction id. Ids are never reused within a body.
    pub fn alloc_id(&mut self) -> InstrId {
        let id = InstrId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Appends an instruction built from `opcode` and `operand`.
    pub fn push(&mut self, opcode: OpCode, operand: Operand) -> InstrId {
        let id = self.alloc_id();
        self.instructions.push(Instruction::new(id, opcode, operand));
        id
    }

    /// Position of the instruction with the given id.
    #[must_use]
    pub fn position_of(&self, id: InstrId) -> Option<usize> {
        self.instructions.iter().position(|instr| instr.id == id)
    }

    /// The instruction with the given id.
    #[must_use]
    pub fn instruction(&self, id: InstrId) -> Option<&Instruction> {
        self.instructions.iter().find(|instr| instr.id == id)
    }

    /// Whether any instruction in the body branches to `id`.
    #[must_use]
    pub fn is_branch_target(&self, id: InstrId) -> bool {
        self.instructions
            .iter()
            .any(|instr| instr.branch_target() == Some(id))
    }

    /// Ids of all return instructions, in execution order.
    ///
    /// A method may return from several points; epilogue injection has to
    /// handle every one of them, not just the final instruction.
    #[must_use]
    pub fn return_points(&self) -> Vec<InstrId> {
        self.instructions
            .iter()
            .filter(|instr| instr.is_return())
            .map(|instr| instr.id)
            .collect()
    }
}

/// A method definition.
#[derive(Debug, Clone)]
pub struct MethodDef {
    /// Token assigned by the owning module
    pub token: Token,
    /// Modifier flags
    pub flags: MethodModifiers,
    /// Method name
    pub name: String,
    /// Parameter declarations, excluding the implicit `this`
    pub params: Vec<ParamDef>,
    /// Return type
    pub return_type: TypeName,
    /// Custom attributes attached to this method
    pub attributes: Vec<CustomAttribute>,
    /// The body; absent for abstract and interface methods
    pub body: Option<MethodBody>,
}

impl MethodDef {
    /// Whether the method has an implicit `this` argument.
    #[must_use]
    pub fn is_instance(&self) -> bool {
        !self.flags.contains(MethodModifiers::STATIC)
    }

    /// Whether this method has an attribute of the given type name.
    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|attr| attr.is(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_allocation_never_reuses() {
        let mut body = MethodBody::new();
        let a = body.push(OpCode::Nop, Operand::None);
        let b = body.push(OpCode::Ret, Operand::None);
        assert_ne!(a, b);

        body.instructions.clear();
        let c = body.push(OpCode::Ret, Operand::None);
        assert!(c > b);
    }

    #[test]
    fn test_from_parts_continues_ids() {
        let instructions = vec![
            Instruction::new(InstrId(0), OpCode::Nop, Operand::None),
            Instruction::new(InstrId(4), OpCode::Ret, Operand::None),
        ];
        let mut body = MethodBody::from_parts(Vec::new(), instructions);
        assert_eq!(body.alloc_id(), InstrId(5));
    }

    #[test]
    fn test_return_points_finds_all() {
        let mut body = MethodBody::new();
        let first_ret = body.push(OpCode::Ret, Operand::None);
        body.push(OpCode::Nop, Operand::None);
        let second_ret = body.push(OpCode::Ret, Operand::None);

        assert_eq!(body.return_points(), vec![first_ret, second_ret]);
    }

    #[test]
    fn test_branch_target_detection() {
        let mut body = MethodBody::new();
        let target = body.push(OpCode::Nop, Operand::None);
        body.push(OpCode::Br, Operand::Target(target));

        assert!(body.is_branch_target(target));
        assert!(!body.is_branch_target(InstrId(99)));
    }
}
