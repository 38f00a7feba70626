//! Typed editing interface over a method body.
//!
//! The editor is how addins splice new instructions into existing bodies
//! without breaking control flow: anchors are [`InstrId`]s, insertion
//! re-threads the sequence but never moves a target out from under a branch,
//! and removal of an instruction that is still a branch target is rejected
//! outright instead of silently corrupting the body.
//!
//! Prologue injection goes before the body's first instruction. Epilogue
//! injection locates every return point and duplicates the injected sequence
//! before each one, since a method with N return statements needs N copies.

use crate::{
    metadata::method::{LocalVar, MethodBody},
    metadata::typesystem::TypeName,
    Error, Result,
};

use super::{
    instruction::{InstrId, Instruction, Operand},
    opcode::OpCode,
};

/// A borrowed editing session over one method body.
pub struct BodyEditor<'a> {
    body: &'a mut MethodBody,
}

impl<'a> BodyEditor<'a> {
    /// Opens an editor over `body`.
    pub fn new(body: &'a mut MethodBody) -> Self {
        BodyEditor { body }
    }

    /// Appends a local variable declaration and returns its slot index.
    pub fn append_local(&mut self, var_type: TypeName) -> u16 {
        self.body.locals.push(LocalVar { var_type });
        (self.body.locals.len() - 1) as u16
    }

    /// Ids of all return instructions, in execution order.
    #[must_use]
    pub fn return_points(&self) -> Vec<InstrId> {
        self.body.return_points()
    }

    /// Id of the first instruction, if the body is not empty.
    #[must_use]
    pub fn entry_point(&self) -> Option<InstrId> {
        self.body.instructions.first().map(|instr| instr.id)
    }

    /// Inserts a single instruction before `anchor`.
    ///
    /// # Errors
    ///
    /// Fails if `anchor` is not part of this body.
    pub fn insert_before(&mut self, anchor: InstrId, opcode: OpCode, operand: Operand) -> Result<InstrId> {
        let position = self.position_of(anchor)?;
        let id = self.body.alloc_id();
        self.body
            .instructions
            .insert(position, Instruction::new(id, opcode, operand));
        Ok(id)
    }

    /// Inserts a single instruction after `anchor`.
    ///
    /// # Errors
    ///
    /// Fails if `anchor` is not part of this body.
    pub fn insert_after(&mut self, anchor: InstrId, opcode: OpCode, operand: Operand) -> Result<InstrId> {
        let position = self.position_of(anchor)?;
        let id = self.body.alloc_id();
        self.body
            .instructions
            .insert(position + 1, Instruction::new(id, opcode, operand));
        Ok(id)
    }

    /// Inserts a sequence before `anchor`, preserving its order.
    ///
    /// Returns the ids of the inserted instructions.
    ///
    /// # Errors
    ///
    /// Fails if `anchor` is not part of this body.
    pub fn insert_range_before(
        &mut self,
        anchor: InstrId,
        sequence: &[(OpCode, Operand)],
    ) -> Result<Vec<InstrId>> {
        let position = self.position_of(anchor)?;
        let mut ids = Vec::with_capacity(sequence.len());
        for (offset, (opcode, operand)) in sequence.iter().enumerate() {
            let id = self.body.alloc_id();
            self.body
                .instructions
                .insert(position + offset, Instruction::new(id, *opcode, *operand));
            ids.push(id);
        }
        Ok(ids)
    }

    /// Appends an instruction at the end of the body.
    pub fn append(&mut self, opcode: OpCode, operand: Operand) -> InstrId {
        self.body.push(opcode, operand)
    }

    /// Injects a prologue sequence before the body's first instruction.
    ///
    /// # Errors
    ///
    /// Fails on an empty body; a valid compiled body always ends in a return,
    /// so an empty one is a caller bug.
    pub fn inject_prologue(&mut self, sequence: &[(OpCode, Operand)]) -> Result<Vec<InstrId>> {
        let entry = self
            .entry_point()
            .ok_or_else(|| Error::Error("Cannot inject a prologue into an empty body".into()))?;
        self.insert_range_before(entry, sequence)
    }

    /// Injects an epilogue sequence before **every** return point.
    ///
    /// The sequence is duplicated per return: a method with N returns gets N
    /// copies, each immediately preceding its return instruction.
    ///
    /// # Errors
    ///
    /// Fails if the body has no return instruction.
    pub fn inject_epilogue(&mut self, sequence: &[(OpCode, Operand)]) -> Result<()> {
        let returns = self.return_points();
        if returns.is_empty() {
            return Err(Error::Error(
                "Cannot inject an epilogue into a body without return points".into(),
            ));
        }
        for ret in returns {
            self.insert_range_before(ret, sequence)?;
        }
        Ok(())
    }

    /// Removes the instruction with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DanglingBranchTarget`] if another instruction still
    /// branches to `id`: removing a live target is a programming error the
    /// editor refuses. Fails if `id` is not part of this body.
    pub fn remove(&mut self, id: InstrId) -> Result<Instruction> {
        let position = self.position_of(id)?;
        if self.body.is_branch_target(id) {
            return Err(Error::DanglingBranchTarget(id.0));
        }
        Ok(self.body.instructions.remove(position))
    }

    fn position_of(&self, id: InstrId) -> Result<usize> {
        self.body
            .position_of(id)
            .ok_or_else(|| Error::Error(format!("Instruction {id} is not part of this body")))
    }
}
