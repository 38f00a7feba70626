//! Instruction stream encoding.
//!
//! The encoder lays the sequence out, assigns byte offsets, then emits branch
//! operands as signed offsets relative to the following instruction. A branch
//! whose target id is no longer part of the sequence means an editing pass
//! corrupted the body; that is rejected here rather than written to disk.

use std::collections::HashMap;

use crate::{Error, Result};

use super::{
    instruction::{InstrId, Instruction, Operand},
    opcode::OperandType,
};

/// Encodes `instructions` into their byte representation.
///
/// # Errors
///
/// Returns [`Error::DanglingBranchTarget`] if a branch names an id that is
/// not in the sequence, and [`Error::Error`] if an operand shape does not
/// match its opcode.
pub fn encode_stream(instructions: &[Instruction]) -> Result<Vec<u8>> {
    // First pass: lay out offsets.
    let mut offsets: HashMap<InstrId, usize> = HashMap::with_capacity(instructions.len());
    let mut offset = 0usize;
    for instr in instructions {
        offsets.insert(instr.id, offset);
        offset += instr.opcode.encoded_size();
    }
    let total = offset;

    let mut bytes = Vec::with_capacity(total);
    for instr in instructions {
        if !instr.operand.matches(instr.opcode.operand_type()) {
            return Err(Error::Error(format!(
                "Operand shape mismatch on '{}' at {}",
                instr.opcode.mnemonic(),
                instr.id
            )));
        }

        bytes.push(instr.opcode as u8);
        match instr.operand {
            Operand::None => {}
            Operand::Var(slot) => bytes.extend_from_slice(&slot.to_le_bytes()),
            Operand::I4(value) => bytes.extend_from_slice(&value.to_le_bytes()),
            Operand::I8(value) => bytes.extend_from_slice(&value.to_le_bytes()),
            Operand::R8(value) => bytes.extend_from_slice(&value.to_le_bytes()),
            Operand::String(index) => bytes.extend_from_slice(&index.to_le_bytes()),
            Operand::Member(token) => bytes.extend_from_slice(&token.value().to_le_bytes()),
            Operand::Target(target) => {
                let target_offset = *offsets
                    .get(&target)
                    .ok_or(Error::DanglingBranchTarget(target.0))?;
                let next = offsets[&instr.id] + instr.opcode.encoded_size();
                let rel = target_offset as i64 - next as i64;
                bytes.extend_from_slice(&(rel as i32).to_le_bytes());
            }
        }
    }

    debug_assert_eq!(bytes.len(), total);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{decoder::decode_stream, opcode::OpCode},
        file::parser::Parser,
        metadata::method::MethodBody,
    };

    #[test]
    fn test_encode_decode_roundtrip_with_branches() {
        let mut body = MethodBody::new();
        let entry = body.push(OpCode::LdArg, Operand::Var(0));
        body.push(OpCode::Ret, Operand::None);
        let tail = body.push(OpCode::Nop, Operand::None);
        body.push(OpCode::Br, Operand::Target(entry));
        body.push(OpCode::Ret, Operand::None);
        // Thread a conditional branch to the tail through the middle.
        let cond = body.alloc_id();
        body.instructions.insert(
            1,
            Instruction::new(cond, OpCode::BrTrue, Operand::Target(tail)),
        );

        let bytes = encode_stream(&body.instructions).unwrap();
        let mut parser = Parser::new(&bytes);
        let decoded = decode_stream(&mut parser, bytes.len()).unwrap();

        assert_eq!(decoded.len(), body.instructions.len());
        for (original, reloaded) in body.instructions.iter().zip(&decoded) {
            assert_eq!(original.opcode, reloaded.opcode);
        }
        // Branch structure survives: position of targets matches.
        let cond_pos = decoded
            .iter()
            .position(|instr| instr.opcode == OpCode::BrTrue)
            .unwrap();
        let tail_pos = decoded
            .iter()
            .position(|instr| instr.opcode == OpCode::Nop)
            .unwrap();
        assert_eq!(
            decoded[cond_pos].branch_target(),
            Some(decoded[tail_pos].id)
        );
    }

    #[test]
    fn test_encode_dangling_target_rejected() {
        let mut body = MethodBody::new();
        body.push(OpCode::Br, Operand::Target(InstrId(42)));
        body.push(OpCode::Ret, Operand::None);

        assert!(matches!(
            encode_stream(&body.instructions),
            Err(Error::DanglingBranchTarget(42))
        ));
    }

    #[test]
    fn test_encode_empty_stream() {
        assert!(encode_stream(&[]).unwrap().is_empty());
    }
}
