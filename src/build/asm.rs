//! Body assembler used by the method builders.
//!
//! Instructions are appended through mnemonic-named helpers; branches use
//! [`Label`]s that may be marked before or after the branch that names them.
//! Unresolved labels are an error at finish time, not a silent dangling
//! target.

use crate::{
    bytecode::{InstrId, Instruction, OpCode, Operand},
    metadata::{
        method::{LocalVar, MethodBody},
        module::ModuleDef,
        token::Token,
        typesystem::TypeName,
    },
    Error, Result,
};

/// A forward- or backward-referencing branch label.
#[derive(Debug, Clone, Copy)]
pub struct Label(usize);

/// Appends instructions to a method body under construction.
///
/// The assembler borrows the module so string literals can be interned into
/// the user-string heap as they are referenced.
pub struct MethodAsm<'m> {
    module: &'m mut ModuleDef,
    body: MethodBody,
    labels: Vec<Option<InstrId>>,
    pending_marks: Vec<usize>,
    fixups: Vec<(usize, usize)>,
}

impl<'m> MethodAsm<'m> {
    pub(crate) fn new(module: &'m mut ModuleDef) -> Self {
        MethodAsm {
            module,
            body: MethodBody::new(),
            labels: Vec::new(),
            pending_marks: Vec::new(),
            fixups: Vec::new(),
        }
    }

    /// Declares a local variable and returns its slot.
    pub fn local(&mut self, var_type: TypeName) -> u16 {
        self.body.locals.push(LocalVar { var_type });
        (self.body.locals.len() - 1) as u16
    }

    /// Creates an unbound label.
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds `label` to the next appended instruction.
    pub fn mark(&mut self, label: Label) -> &mut Self {
        self.pending_marks.push(label.0);
        self
    }

    fn push(&mut self, opcode: OpCode, operand: Operand) -> &mut Self {
        let id = self.body.push(opcode, operand);
        for label in self.pending_marks.drain(..) {
            self.labels[label] = Some(id);
        }
        self
    }

    fn push_branch(&mut self, opcode: OpCode, label: Label) -> &mut Self {
        match self.labels[label.0] {
            Some(target) => self.push(opcode, Operand::Target(target)),
            None => {
                self.fixups.push((self.body.instructions.len(), label.0));
                self.push(opcode, Operand::Target(InstrId(u32::MAX)))
            }
        }
    }

    /// `nop`
    pub fn nop(&mut self) -> &mut Self {
        self.push(OpCode::Nop, Operand::None)
    }

    /// `ldarg <slot>`
    pub fn ldarg(&mut self, slot: u16) -> &mut Self {
        self.push(OpCode::LdArg, Operand::Var(slot))
    }

    /// `ldloc <slot>`
    pub fn ldloc(&mut self, slot: u16) -> &mut Self {
        self.push(OpCode::LdLoc, Operand::Var(slot))
    }

    /// `stloc <slot>`
    pub fn stloc(&mut self, slot: u16) -> &mut Self {
        self.push(OpCode::StLoc, Operand::Var(slot))
    }

    /// `ldnull`
    pub fn ldnull(&mut self) -> &mut Self {
        self.push(OpCode::LdNull, Operand::None)
    }

    /// `ldc.i4 <value>`
    pub fn ldc_i4(&mut self, value: i32) -> &mut Self {
        self.push(OpCode::LdcI4, Operand::I4(value))
    }

    /// `ldc.i8 <value>`
    pub fn ldc_i8(&mut self, value: i64) -> &mut Self {
        self.push(OpCode::LdcI8, Operand::I8(value))
    }

    /// `ldc.r8 <value>`
    pub fn ldc_r8(&mut self, value: f64) -> &mut Self {
        self.push(OpCode::LdcR8, Operand::R8(value))
    }

    /// `ldstr "<text>"`, interning the literal in the user-string heap.
    pub fn ldstr(&mut self, text: &str) -> &mut Self {
        let index = self.module.user_string(text);
        self.push(OpCode::LdStr, Operand::String(index))
    }

    /// `dup`
    pub fn dup(&mut self) -> &mut Self {
        self.push(OpCode::Dup, Operand::None)
    }

    /// `pop`
    pub fn pop(&mut self) -> &mut Self {
        self.push(OpCode::Pop, Operand::None)
    }

    /// `add`
    pub fn add(&mut self) -> &mut Self {
        self.push(OpCode::Add, Operand::None)
    }

    /// `sub`
    pub fn sub(&mut self) -> &mut Self {
        self.push(OpCode::Sub, Operand::None)
    }

    /// `ceq`
    pub fn ceq(&mut self) -> &mut Self {
        self.push(OpCode::Ceq, Operand::None)
    }

    /// `call <member>`
    pub fn call(&mut self, member: Token) -> &mut Self {
        self.push(OpCode::Call, Operand::Member(member))
    }

    /// `callvirt <member>`
    pub fn callvirt(&mut self, member: Token) -> &mut Self {
        self.push(OpCode::CallVirt, Operand::Member(member))
    }

    /// `newobj <member>`
    pub fn newobj(&mut self, member: Token) -> &mut Self {
        self.push(OpCode::NewObj, Operand::Member(member))
    }

    /// `ldfld <field>`
    pub fn ldfld(&mut self, field: Token) -> &mut Self {
        self.push(OpCode::LdFld, Operand::Member(field))
    }

    /// `stfld <field>`
    pub fn stfld(&mut self, field: Token) -> &mut Self {
        self.push(OpCode::StFld, Operand::Member(field))
    }

    /// `ldsfld <field>`
    pub fn ldsfld(&mut self, field: Token) -> &mut Self {
        self.push(OpCode::LdsFld, Operand::Member(field))
    }

    /// `stsfld <field>`
    pub fn stsfld(&mut self, field: Token) -> &mut Self {
        self.push(OpCode::StsFld, Operand::Member(field))
    }

    /// `br <label>`
    pub fn br(&mut self, label: Label) -> &mut Self {
        self.push_branch(OpCode::Br, label)
    }

    /// `brtrue <label>`
    pub fn brtrue(&mut self, label: Label) -> &mut Self {
        self.push_branch(OpCode::BrTrue, label)
    }

    /// `brfalse <label>`
    pub fn brfalse(&mut self, label: Label) -> &mut Self {
        self.push_branch(OpCode::BrFalse, label)
    }

    /// `beq <label>`
    pub fn beq(&mut self, label: Label) -> &mut Self {
        self.push_branch(OpCode::Beq, label)
    }

    /// `bne.un <label>`
    pub fn bne_un(&mut self, label: Label) -> &mut Self {
        self.push_branch(OpCode::BneUn, label)
    }

    /// `ret`
    pub fn ret(&mut self) -> &mut Self {
        self.push(OpCode::Ret, Operand::None)
    }

    /// Resolves label fixups and hands the finished body back.
    pub(crate) fn finish(mut self) -> Result<MethodBody> {
        let fixups = std::mem::take(&mut self.fixups);
        for (position, label) in fixups {
            let target = self.labels[label].ok_or_else(|| {
                Error::Error(format!("Label {label} was branched to but never marked"))
            })?;
            let instr = &mut self.body.instructions[position];
            *instr = Instruction::new(instr.id, instr.opcode, Operand::Target(target));
        }

        if !self.pending_marks.is_empty() {
            return Err(Error::Error(
                "A label was marked past the last instruction of the body".into(),
            ));
        }

        Ok(self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uguid::Guid;

    fn module() -> ModuleDef {
        ModuleDef::new("Test.dll", Guid::from_bytes([2; 16]))
    }

    #[test]
    fn test_forward_label_resolution() {
        let mut module = module();
        let mut asm = MethodAsm::new(&mut module);

        let done = asm.label();
        asm.ldarg(0);
        asm.brfalse(done);
        asm.nop();
        asm.mark(done);
        asm.ret();

        let body = asm.finish().unwrap();
        let branch = &body.instructions[1];
        let ret = &body.instructions[3];
        assert_eq!(branch.branch_target(), Some(ret.id));
    }

    #[test]
    fn test_backward_label_resolution() {
        let mut module = module();
        let mut asm = MethodAsm::new(&mut module);

        let top = asm.label();
        asm.mark(top);
        asm.nop();
        asm.ldarg(0);
        asm.brtrue(top);
        asm.ret();

        let body = asm.finish().unwrap();
        let branch = &body.instructions[2];
        assert_eq!(branch.branch_target(), Some(body.instructions[0].id));
    }

    #[test]
    fn test_unmarked_label_rejected() {
        let mut module = module();
        let mut asm = MethodAsm::new(&mut module);

        let nowhere = asm.label();
        asm.br(nowhere);
        asm.ret();

        assert!(asm.finish().is_err());
    }

    #[test]
    fn test_ldstr_interns_in_module_heap() {
        let mut module = module();
        {
            let mut asm = MethodAsm::new(&mut module);
            asm.ldstr("Name").ldstr("Name").ret();
            asm.finish().unwrap();
        }
        assert_eq!(module.user_strings().len(), 1);
    }
}
