//! Evaluation-stack balance checking.
//!
//! Insertions must leave each body in a state where every path reaches its
//! return instructions with exactly the depth the method's return type
//! requires. The check propagates depths across fall-through and branch edges
//! with a small worklist; bodies are tiny, so this is cheap enough to run on
//! every body before serialization.

use crate::{
    bytecode::{FlowType, OpCode, Operand},
    metadata::{
        method::MethodDef,
        module::{MemberRefKind, ModuleDef},
        token::{TableId, Token},
        typesystem::TypeName,
    },
    Result,
};

/// Verifies stack balance for every path through `method`'s body.
///
/// Methods without a body pass trivially.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] for underflow, depth conflicts at join
/// points, a wrong depth at a return, or call operands that do not resolve.
pub fn check_method_stack(module: &ModuleDef, method: &MethodDef) -> Result<()> {
    let Some(body) = &method.body else {
        return Ok(());
    };
    if body.instructions.is_empty() {
        return Ok(());
    }

    let expected_at_return = i32::from(method.return_type != TypeName::Void);

    let count = body.instructions.len();
    let mut depth_at: Vec<Option<i32>> = vec![None; count];
    depth_at[0] = Some(0);
    let mut worklist = vec![0usize];

    while let Some(index) = worklist.pop() {
        let instr = &body.instructions[index];
        let depth_in = depth_at[index].unwrap_or(0);

        let (pops, pushes) = stack_transition(module, instr.opcode, &instr.operand)?;
        let depth_out = depth_in - pops + pushes;
        if depth_in - pops < 0 {
            return Err(malformed_error!(
                "Stack underflow at {} in '{}'",
                instr.id,
                method.name
            ));
        }

        if instr.opcode.flow_type() == FlowType::Return {
            if depth_in != expected_at_return {
                return Err(malformed_error!(
                    "Return in '{}' reached with stack depth {depth_in}, expected {expected_at_return}",
                    method.name
                ));
            }
            continue;
        }

        let mut successors: Vec<usize> = Vec::with_capacity(2);
        match instr.opcode.flow_type() {
            FlowType::Branch | FlowType::CondBranch => {
                let target = instr
                    .branch_target()
                    .and_then(|id| body.position_of(id))
                    .ok_or_else(|| {
                        malformed_error!("Unthreaded branch target at {} in '{}'", instr.id, method.name)
                    })?;
                successors.push(target);
                if instr.opcode.flow_type() == FlowType::CondBranch {
                    successors.push(index + 1);
                }
            }
            _ => successors.push(index + 1),
        }

        for succ in successors {
            if succ >= count {
                return Err(malformed_error!(
                    "Execution falls off the end of '{}'",
                    method.name
                ));
            }
            match depth_at[succ] {
                None => {
                    depth_at[succ] = Some(depth_out);
                    worklist.push(succ);
                }
                Some(existing) if existing != depth_out => {
                    return Err(malformed_error!(
                        "Stack depth mismatch at join in '{}': {existing} vs {depth_out}",
                        method.name
                    ));
                }
                Some(_) => {}
            }
        }
    }

    Ok(())
}

/// The `(pops, pushes)` transition of one instruction.
///
/// Call transitions resolve the callee through the module: intra-module
/// method tokens carry their exact signature; member references assume
/// `callvirt` targets are instance methods and `call` targets are static,
/// which holds for everything the weaver emits.
fn stack_transition(module: &ModuleDef, opcode: OpCode, operand: &Operand) -> Result<(i32, i32)> {
    Ok(match opcode {
        OpCode::Nop => (0, 0),
        OpCode::LdArg | OpCode::LdLoc | OpCode::LdNull => (0, 1),
        OpCode::LdcI4 | OpCode::LdcI8 | OpCode::LdcR8 | OpCode::LdStr => (0, 1),
        OpCode::StLoc | OpCode::Pop => (1, 0),
        OpCode::Dup => (1, 2),
        OpCode::Add | OpCode::Sub | OpCode::Ceq => (2, 1),
        OpCode::Ret => (0, 0),
        OpCode::Br => (0, 0),
        OpCode::BrFalse | OpCode::BrTrue => (1, 0),
        OpCode::Beq | OpCode::BneUn => (2, 0),
        OpCode::LdFld => (1, 1),
        OpCode::StFld => (2, 0),
        OpCode::LdsFld => (0, 1),
        OpCode::StsFld => (1, 0),
        OpCode::Call | OpCode::CallVirt | OpCode::NewObj => {
            let Operand::Member(token) = *operand else {
                return Err(malformed_error!("Call without a member operand"));
            };
            call_transition(module, opcode, token)?
        }
    })
}

fn call_transition(module: &ModuleDef, opcode: OpCode, token: Token) -> Result<(i32, i32)> {
    match token.table() {
        Some(TableId::Method) => {
            let (type_idx, method_idx) = module
                .method_location(token)
                .ok_or(crate::Error::TypeNotFound(token))?;
            let callee = &module.types[type_idx].methods[method_idx];
            let mut pops = callee.params.len() as i32;
            if callee.is_instance() && opcode != OpCode::NewObj {
                pops += 1;
            }
            let pushes = if opcode == OpCode::NewObj {
                1
            } else {
                i32::from(callee.return_type != TypeName::Void)
            };
            Ok((pops, pushes))
        }
        Some(TableId::MemberRef) => {
            let member = module
                .member_ref(token)
                .ok_or(crate::Error::TypeNotFound(token))?;
            if member.kind != MemberRefKind::Method {
                return Err(malformed_error!("Call targets field reference {token}"));
            }
            let mut pops = member.params.len() as i32;
            if opcode == OpCode::CallVirt {
                pops += 1;
            }
            let pushes = if opcode == OpCode::NewObj {
                1
            } else {
                i32::from(member.member_type != TypeName::Void)
            };
            Ok((pops, pushes))
        }
        _ => Err(crate::Error::TypeNotFound(token)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        method::{MethodBody, MethodModifiers},
        module::ModuleDef,
    };
    use uguid::Guid;

    fn method_with_body(return_type: TypeName, body: MethodBody) -> MethodDef {
        MethodDef {
            token: Token::new(TableId::Method, 1),
            flags: MethodModifiers::PUBLIC | MethodModifiers::STATIC,
            name: "probe".into(),
            params: Vec::new(),
            return_type,
            attributes: Vec::new(),
            body: Some(body),
        }
    }

    fn empty_module() -> ModuleDef {
        ModuleDef::new("Test.dll", Guid::from_bytes([1; 16]))
    }

    #[test]
    fn test_balanced_void_body() {
        let mut body = MethodBody::new();
        body.push(OpCode::LdcI4, Operand::I4(1));
        body.push(OpCode::Pop, Operand::None);
        body.push(OpCode::Ret, Operand::None);

        check_method_stack(&empty_module(), &method_with_body(TypeName::Void, body)).unwrap();
    }

    #[test]
    fn test_value_return_requires_depth_one() {
        let mut body = MethodBody::new();
        body.push(OpCode::LdcI4, Operand::I4(42));
        body.push(OpCode::Ret, Operand::None);

        check_method_stack(&empty_module(), &method_with_body(TypeName::I4, body)).unwrap();
    }

    #[test]
    fn test_void_return_with_leftover_value_rejected() {
        let mut body = MethodBody::new();
        body.push(OpCode::LdcI4, Operand::I4(42));
        body.push(OpCode::Ret, Operand::None);

        assert!(
            check_method_stack(&empty_module(), &method_with_body(TypeName::Void, body)).is_err()
        );
    }

    #[test]
    fn test_underflow_rejected() {
        let mut body = MethodBody::new();
        body.push(OpCode::Pop, Operand::None);
        body.push(OpCode::Ret, Operand::None);

        assert!(
            check_method_stack(&empty_module(), &method_with_body(TypeName::Void, body)).is_err()
        );
    }

    #[test]
    fn test_branch_paths_checked() {
        // ldc.i4 1; brtrue -> ret; ldc.i4 2; pop; ret
        let mut body = MethodBody::new();
        body.push(OpCode::LdcI4, Operand::I4(1));
        let cond = body.alloc_id();
        body.push(OpCode::LdcI4, Operand::I4(2));
        body.push(OpCode::Pop, Operand::None);
        let ret = body.push(OpCode::Ret, Operand::None);
        body.instructions.insert(
            1,
            crate::bytecode::Instruction::new(cond, OpCode::BrTrue, Operand::Target(ret)),
        );

        check_method_stack(&empty_module(), &method_with_body(TypeName::Void, body)).unwrap();
    }
}
