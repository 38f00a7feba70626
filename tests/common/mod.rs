//! Shared fixtures and a small bytecode evaluator for integration tests.
//!
//! The evaluator executes method bodies against an in-memory object model so
//! tests can assert on the observable behavior of woven code (callback
//! invocations, returned values, skipped notifications) instead of only on
//! instruction shapes. Member-reference calls leave the module; the evaluator
//! records them and returns canned values, which is all the runtime support
//! assembly needs to behave like during a test.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;

use cilweave::prelude::*;

/// A runtime value in the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    I32(i32),
    I64(i64),
    F64(f64),
    Str(String),
    Obj(usize),
}

impl Value {
    fn is_false_or_null(&self) -> bool {
        matches!(self, Value::Null | Value::I32(0) | Value::I64(0))
    }

    fn equals(&self, other: &Value) -> bool {
        self == other
    }
}

/// Executes method bodies of one module against an in-memory heap.
pub struct Evaluator<'m> {
    module: &'m ModuleDef,
    /// Static field storage, keyed by Field or MemberRef token
    pub statics: HashMap<Token, Value>,
    /// Instance field storage per object
    objects: Vec<HashMap<Token, Value>>,
    /// Recorded member-reference calls: (member name, popped arguments)
    pub extern_calls: Vec<(String, Vec<Value>)>,
    /// Canned results for member-reference calls, by member name
    pub extern_results: HashMap<String, Value>,
}

impl<'m> Evaluator<'m> {
    pub fn new(module: &'m ModuleDef) -> Self {
        Evaluator {
            module,
            statics: HashMap::new(),
            objects: Vec::new(),
            extern_calls: Vec::new(),
            extern_results: HashMap::new(),
        }
    }

    /// Allocates a fresh object.
    pub fn new_object(&mut self) -> Value {
        self.objects.push(HashMap::new());
        Value::Obj(self.objects.len() - 1)
    }

    /// Number of recorded member-reference calls to `name`.
    pub fn extern_call_count(&self, name: &str) -> usize {
        self.extern_calls
            .iter()
            .filter(|(called, _)| called == name)
            .count()
    }

    /// Runs the method named `method` on the type named `type_name`.
    ///
    /// `args` must include the receiver for instance methods.
    pub fn call(&mut self, type_name: &str, method: &str, args: Vec<Value>) -> Option<Value> {
        let ty = self
            .module
            .type_by_name(type_name)
            .unwrap_or_else(|| panic!("type '{type_name}' not found"));
        let def = ty
            .method(method)
            .unwrap_or_else(|| panic!("method '{method}' not found on '{type_name}'"));
        self.run(def, args)
    }

    fn run(&mut self, method: &MethodDef, args: Vec<Value>) -> Option<Value> {
        let body = method
            .body
            .as_ref()
            .unwrap_or_else(|| panic!("method '{}' has no body", method.name));

        let mut locals = vec![Value::Null; body.locals.len()];
        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0usize;

        loop {
            let instr = &body.instructions[pc];
            match (instr.opcode, &instr.operand) {
                (OpCode::Nop, _) => pc += 1,
                (OpCode::LdArg, Operand::Var(slot)) => {
                    stack.push(args[*slot as usize].clone());
                    pc += 1;
                }
                (OpCode::LdLoc, Operand::Var(slot)) => {
                    stack.push(locals[*slot as usize].clone());
                    pc += 1;
                }
                (OpCode::StLoc, Operand::Var(slot)) => {
                    locals[*slot as usize] = stack.pop().expect("stack underflow");
                    pc += 1;
                }
                (OpCode::LdNull, _) => {
                    stack.push(Value::Null);
                    pc += 1;
                }
                (OpCode::LdcI4, Operand::I4(value)) => {
                    stack.push(Value::I32(*value));
                    pc += 1;
                }
                (OpCode::LdcI8, Operand::I8(value)) => {
                    stack.push(Value::I64(*value));
                    pc += 1;
                }
                (OpCode::LdcR8, Operand::R8(value)) => {
                    stack.push(Value::F64(*value));
                    pc += 1;
                }
                (OpCode::LdStr, Operand::String(index)) => {
                    let text = self
                        .module
                        .user_string_at(*index)
                        .expect("user string missing");
                    stack.push(Value::Str(text.to_string()));
                    pc += 1;
                }
                (OpCode::Dup, _) => {
                    let top = stack.last().expect("stack underflow").clone();
                    stack.push(top);
                    pc += 1;
                }
                (OpCode::Pop, _) => {
                    stack.pop().expect("stack underflow");
                    pc += 1;
                }
                (OpCode::Add, _) => {
                    let b = stack.pop().expect("stack underflow");
                    let a = stack.pop().expect("stack underflow");
                    stack.push(arith(a, b, false));
                    pc += 1;
                }
                (OpCode::Sub, _) => {
                    let b = stack.pop().expect("stack underflow");
                    let a = stack.pop().expect("stack underflow");
                    stack.push(arith(a, b, true));
                    pc += 1;
                }
                (OpCode::Ceq, _) => {
                    let b = stack.pop().expect("stack underflow");
                    let a = stack.pop().expect("stack underflow");
                    stack.push(Value::I32(i32::from(a.equals(&b))));
                    pc += 1;
                }
                (OpCode::LdFld, Operand::Member(token)) => {
                    let receiver = stack.pop().expect("stack underflow");
                    let Value::Obj(index) = receiver else {
                        panic!("ldfld on non-object {receiver:?}");
                    };
                    let value = self.objects[index]
                        .get(token)
                        .cloned()
                        .unwrap_or(Value::Null);
                    stack.push(value);
                    pc += 1;
                }
                (OpCode::StFld, Operand::Member(token)) => {
                    let value = stack.pop().expect("stack underflow");
                    let receiver = stack.pop().expect("stack underflow");
                    let Value::Obj(index) = receiver else {
                        panic!("stfld on non-object {receiver:?}");
                    };
                    self.objects[index].insert(*token, value);
                    pc += 1;
                }
                (OpCode::LdsFld, Operand::Member(token)) => {
                    let value = self.statics.get(token).cloned().unwrap_or(Value::Null);
                    stack.push(value);
                    pc += 1;
                }
                (OpCode::StsFld, Operand::Member(token)) => {
                    let value = stack.pop().expect("stack underflow");
                    self.statics.insert(*token, value);
                    pc += 1;
                }
                (OpCode::Br, Operand::Target(target)) => {
                    pc = body.position_of(*target).expect("branch target missing");
                }
                (OpCode::BrFalse, Operand::Target(target)) => {
                    let top = stack.pop().expect("stack underflow");
                    if top.is_false_or_null() {
                        pc = body.position_of(*target).expect("branch target missing");
                    } else {
                        pc += 1;
                    }
                }
                (OpCode::BrTrue, Operand::Target(target)) => {
                    let top = stack.pop().expect("stack underflow");
                    if top.is_false_or_null() {
                        pc += 1;
                    } else {
                        pc = body.position_of(*target).expect("branch target missing");
                    }
                }
                (OpCode::Beq, Operand::Target(target)) => {
                    let b = stack.pop().expect("stack underflow");
                    let a = stack.pop().expect("stack underflow");
                    if a.equals(&b) {
                        pc = body.position_of(*target).expect("branch target missing");
                    } else {
                        pc += 1;
                    }
                }
                (OpCode::BneUn, Operand::Target(target)) => {
                    let b = stack.pop().expect("stack underflow");
                    let a = stack.pop().expect("stack underflow");
                    if a.equals(&b) {
                        pc += 1;
                    } else {
                        pc = body.position_of(*target).expect("branch target missing");
                    }
                }
                (OpCode::Call | OpCode::CallVirt, Operand::Member(token)) => {
                    let result = self.dispatch_call(*token, &mut stack);
                    if let Some(value) = result {
                        stack.push(value);
                    }
                    pc += 1;
                }
                (OpCode::Ret, _) => {
                    return if method.return_type == TypeName::Void {
                        None
                    } else {
                        Some(stack.pop().expect("missing return value"))
                    };
                }
                (opcode, operand) => {
                    panic!("evaluator does not handle {opcode:?} {operand:?}")
                }
            }
        }
    }

    fn dispatch_call(&mut self, token: Token, stack: &mut Vec<Value>) -> Option<Value> {
        if let Some((type_idx, method_idx)) = self.module.method_location(token) {
            let callee = self.module.types[type_idx].methods[method_idx].clone();
            let mut arg_count = callee.params.len();
            if callee.is_instance() {
                arg_count += 1;
            }
            let split = stack.len() - arg_count;
            let args: Vec<Value> = stack.split_off(split);
            return self.run(&callee, args);
        }

        let member = self
            .module
            .member_ref(token)
            .unwrap_or_else(|| panic!("call to unknown token {token}"));
        let arg_count = member.params.len();
        let split = stack.len() - arg_count;
        let args: Vec<Value> = stack.split_off(split);
        self.extern_calls.push((member.name.clone(), args));

        if member.member_type == TypeName::Void {
            None
        } else {
            Some(
                self.extern_results
                    .get(&member.name)
                    .cloned()
                    .unwrap_or(Value::I64(0)),
            )
        }
    }
}

fn arith(a: Value, b: Value, subtract: bool) -> Value {
    match (a, b) {
        (Value::I32(x), Value::I32(y)) => Value::I32(if subtract { x - y } else { x + y }),
        (Value::I64(x), Value::I64(y)) => Value::I64(if subtract { x - y } else { x + y }),
        (Value::F64(x), Value::F64(y)) => Value::F64(if subtract { x - y } else { x + y }),
        (a, b) => panic!("arith on {a:?} and {b:?}"),
    }
}

/// Builds the runtime support assembly the method-timer addin calls into and
/// writes it as `Cilweave.Runtime.cwa` under `dir`.
pub fn write_timer_runtime(dir: &Path) -> std::path::PathBuf {
    let assembly = AssemblyBuilder::new("Cilweave.Runtime")
        .module("Cilweave.Runtime.dll", |module| {
            module.class("Cilweave", "MethodTimer", |class| {
                class
                    .public()
                    .static_field("Callback", TypeName::Object)
                    .static_method("Now", TypeName::I8, &[], |asm| {
                        asm.ldc_i8(0).ret();
                    })
                    .static_method(
                        "Report",
                        TypeName::Void,
                        &[
                            ("declaringType", TypeName::String),
                            ("method", TypeName::String),
                            ("elapsed", TypeName::I8),
                        ],
                        |asm| {
                            asm.ret();
                        },
                    );
            })
        })
        .build()
        .expect("runtime assembly builds");

    let path = dir.join("Cilweave.Runtime.cwa");
    write_assembly(&assembly, &path).expect("runtime assembly writes");
    path
}

/// Loads the single module of the container at `path`.
pub fn load_single_module(path: &Path) -> ModuleDef {
    let assembly = read_assembly(path).expect("container loads");
    assert_eq!(assembly.modules.len(), 1);
    assembly.modules.into_iter().next().expect("one module")
}

/// Encoded instruction bytes of the named method, for byte-for-byte
/// comparisons across a weave.
pub fn method_bytes(module: &ModuleDef, type_name: &str, method: &str) -> Vec<u8> {
    let ty = module.type_by_name(type_name).expect("type exists");
    let def = ty.method(method).expect("method exists");
    let body = def.body.as_ref().expect("method has body");
    cilweave::bytecode::encode_stream(&body.instructions).expect("body encodes")
}
