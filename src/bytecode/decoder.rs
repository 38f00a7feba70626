//! Instruction stream decoding.
//!
//! Branch operands are encoded as signed byte offsets relative to the start
//! of the following instruction. The decoder resolves them to [`InstrId`]s in
//! a second pass, so the in-memory form carries no byte offsets at all. A
//! branch that lands anywhere other than the start of a decoded instruction
//! is malformed input.

use std::collections::HashMap;

use crate::{file::parser::Parser, metadata::token::Token, Result};

use super::{
    instruction::{InstrId, Instruction, Operand},
    opcode::{OpCode, OperandType},
};

/// Decodes `code_len` bytes of instruction stream from `parser`.
///
/// Ids are assigned in decode order starting at zero.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] for unknown opcodes or branch targets
/// that do not land on an instruction boundary, and
/// [`crate::Error::OutOfBounds`] for truncated streams.
pub fn decode_stream(parser: &mut Parser<'_>, code_len: usize) -> Result<Vec<Instruction>> {
    let start = parser.pos();
    let end = start + code_len;
    parser.ensure_remaining(code_len)?;

    let mut instructions = Vec::new();
    let mut offset_to_id: HashMap<usize, InstrId> = HashMap::new();
    // Branch operands hold absolute target offsets until the second pass.
    let mut pending_branches: Vec<(usize, usize)> = Vec::new();

    while parser.pos() < end {
        let instr_offset = parser.pos() - start;
        let id = InstrId(instructions.len() as u32);

        let raw = parser.read_le::<u8>()?;
        let opcode = OpCode::from_byte(raw)
            .ok_or_else(|| malformed_error!("Unknown opcode 0x{raw:02X} at offset {instr_offset}"))?;

        let operand = match opcode.operand_type() {
            OperandType::None => Operand::None,
            OperandType::VarIndex => Operand::Var(parser.read_le::<u16>()?),
            OperandType::I4 => Operand::I4(parser.read_le::<i32>()?),
            OperandType::I8 => Operand::I8(parser.read_le::<i64>()?),
            OperandType::R8 => Operand::R8(parser.read_le::<f64>()?),
            OperandType::StringIndex => Operand::String(parser.read_le::<u32>()?),
            OperandType::Token => Operand::Member(Token::from_raw(parser.read_le::<u32>()?)),
            OperandType::Target => {
                let rel = parser.read_le::<i32>()?;
                let next = parser.pos() - start;
                let target = next as i64 + i64::from(rel);
                if target < 0 || target as usize > code_len {
                    return Err(malformed_error!(
                        "Branch at offset {instr_offset} targets {target}, outside the body"
                    ));
                }
                pending_branches.push((instructions.len(), target as usize));
                // Placeholder, patched below.
                Operand::Target(InstrId(u32::MAX))
            }
        };

        offset_to_id.insert(instr_offset, id);
        instructions.push(Instruction::new(id, opcode, operand));
    }

    if parser.pos() != end {
        return Err(malformed_error!(
            "Instruction stream overran its declared length of {code_len} bytes"
        ));
    }

    for (index, target_offset) in pending_branches {
        let target = offset_to_id.get(&target_offset).copied().ok_or_else(|| {
            malformed_error!("Branch target offset {target_offset} is not an instruction boundary")
        })?;
        instructions[index].operand = Operand::Target(target);
    }

    Ok(instructions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_decode_simple_stream() {
        // nop; ret
        let code = [0x00, 0x2A];
        let mut parser = Parser::new(&code);
        let instructions = decode_stream(&mut parser, code.len()).unwrap();

        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].opcode, OpCode::Nop);
        assert_eq!(instructions[1].opcode, OpCode::Ret);
    }

    #[test]
    fn test_decode_forward_branch() {
        // br +1 (over the nop); nop; ret
        let mut code = vec![0x38];
        code.extend_from_slice(&1i32.to_le_bytes());
        code.push(0x00);
        code.push(0x2A);

        let mut parser = Parser::new(&code);
        let instructions = decode_stream(&mut parser, code.len()).unwrap();

        assert_eq!(instructions[0].branch_target(), Some(instructions[2].id));
    }

    #[test]
    fn test_decode_backward_branch() {
        // nop; br -6 (back to the nop); ret
        let mut code = vec![0x00, 0x38];
        code.extend_from_slice(&(-6i32).to_le_bytes());
        code.push(0x2A);

        let mut parser = Parser::new(&code);
        let instructions = decode_stream(&mut parser, code.len()).unwrap();

        assert_eq!(instructions[1].branch_target(), Some(instructions[0].id));
    }

    #[test]
    fn test_decode_unknown_opcode() {
        let code = [0xFF];
        let mut parser = Parser::new(&code);
        assert!(matches!(
            decode_stream(&mut parser, 1),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn test_decode_misaligned_branch_target() {
        // br +2 lands inside the ldc.i4 operand bytes
        let mut code = vec![0x38];
        code.extend_from_slice(&2i32.to_le_bytes());
        code.push(0x20);
        code.extend_from_slice(&7i32.to_le_bytes());
        code.push(0x2A);

        let mut parser = Parser::new(&code);
        assert!(matches!(
            decode_stream(&mut parser, code.len()),
            Err(Error::Malformed { .. })
        ));
    }
}
