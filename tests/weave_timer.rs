//! End-to-end timing instrumentation weave.
//!
//! Builds an application assembly with a tagged two-return method and an
//! untagged sibling, weaves it on disk against a generated runtime support
//! assembly, then verifies the structural properties (one prologue, one
//! guarded epilogue per return, untouched sibling) and the observable
//! behavior of the woven code under the test evaluator.

mod common;

use std::path::PathBuf;

use cilweave::addins::injected;
use cilweave::prelude::*;
use common::{load_single_module, method_bytes, write_timer_runtime, Evaluator, Value};

fn build_app(dir: &std::path::Path) -> PathBuf {
    let assembly = AssemblyBuilder::new("App")
        .module("App.dll", |module| {
            module.class("Demo", "Worker", |class| {
                class
                    .public()
                    .at("Worker.cs", 10, 1)
                    // Two return points: early-out when the argument is zero.
                    .method("Tagged", TypeName::I4, &[("input", TypeName::I4)], |asm| {
                        let tail = asm.label();
                        asm.ldarg(1);
                        asm.brfalse(tail);
                        asm.ldarg(1);
                        asm.ldc_i4(1);
                        asm.add();
                        asm.ret();
                        asm.mark(tail);
                        asm.ldc_i4(-1);
                        asm.ret();
                    })
                    .method("Untagged", TypeName::I4, &[], |asm| {
                        asm.ldc_i4(7).ret();
                    })
                    .method_attribute("Tagged", CustomAttribute::marker("Cilweave.Timed"));
            })
        })
        .build()
        .expect("app assembly builds");

    let path = dir.join("App.cwa");
    write_assembly(&assembly, &path).expect("app assembly writes");
    path
}

fn weave_app(dir: &std::path::Path, app: &PathBuf) -> (WeaveReport, CollectingLogger) {
    let mut logger = CollectingLogger::new();
    let config = WeaveConfig {
        search_paths: vec![dir.to_path_buf()],
        ..WeaveConfig::default()
    };
    let report = Weaver::new(config)
        .with_addin(Box::new(MethodTimerAddin::new()))
        .weave(std::slice::from_ref(app), &mut logger)
        .expect("weave runs");
    (report, logger)
}

#[test]
fn test_timer_weave_structure() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_timer_runtime(dir.path());
    let app = build_app(dir.path());

    let before = load_single_module(&app);
    let tagged_before = before
        .type_by_name("Demo.Worker")
        .and_then(|ty| ty.method("Tagged"))
        .and_then(|m| m.body.as_ref())
        .map(|b| b.instructions.len())
        .expect("tagged body");
    let untagged_before = method_bytes(&before, "Demo.Worker", "Untagged");

    let (report, logger) = weave_app(dir.path(), &app);
    assert!(report.success, "entries: {:?}", logger.entries);

    let after = load_single_module(&app);
    let ty = after.type_by_name("Demo.Worker").expect("type survives");
    let tagged = ty.method("Tagged").expect("tagged survives");
    let body = tagged.body.as_ref().expect("body survives");

    // One prologue plus one epilogue per return point.
    assert_eq!(
        body.instructions.len(),
        tagged_before + injected::PROLOGUE_LEN + 2 * injected::EPILOGUE_LEN
    );

    // Prologue sits at method entry: call Now, store the start stamp.
    assert_eq!(body.instructions[0].opcode, OpCode::Call);
    assert_eq!(body.instructions[1].opcode, OpCode::StLoc);

    // Every return is preceded by the guarded report sequence, and the guard
    // branches over the report straight to its own return.
    let returns = body.return_points();
    assert_eq!(returns.len(), 2);
    for ret in &returns {
        let pos = body.position_of(*ret).expect("ret present");
        let epilogue = &body.instructions[pos - injected::EPILOGUE_LEN..pos];
        assert_eq!(epilogue[0].opcode, OpCode::LdsFld);
        assert_eq!(epilogue[1].opcode, OpCode::BrFalse);
        assert_eq!(epilogue[1].branch_target(), Some(*ret));
        assert_eq!(epilogue[7].opcode, OpCode::Call);
    }

    // A start-stamp local was appended.
    assert_eq!(body.locals.last().map(|l| l.var_type.clone()), Some(TypeName::I8));

    // The marker was consumed.
    assert!(!tagged.has_attribute("Cilweave.Timed"));

    // The untagged method is byte-for-byte unchanged.
    assert_eq!(method_bytes(&after, "Demo.Worker", "Untagged"), untagged_before);

    // Stats counted the module pass.
    assert_eq!(report.stats.modules, 1);
    assert_eq!(report.stats.methods, 2);
}

#[test]
fn test_timer_weave_behavior() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_timer_runtime(dir.path());
    let app = build_app(dir.path());

    let unwoven = load_single_module(&app);
    let mut plain = Evaluator::new(&unwoven);
    let plain_result = plain.call("Demo.Worker", "Tagged", vec![Value::Null, Value::I32(4)]);

    let (report, _) = weave_app(dir.path(), &app);
    assert!(report.success);
    let woven = load_single_module(&app);

    // No callback registered: identical observable behavior, no report call.
    let mut quiet = Evaluator::new(&woven);
    let result = quiet.call("Demo.Worker", "Tagged", vec![Value::Null, Value::I32(4)]);
    assert_eq!(result, plain_result);
    assert_eq!(quiet.extern_call_count("Report"), 0);

    // Callback registered: exactly one report per invocation, same result.
    let callback_token = woven
        .member_refs
        .iter()
        .position(|m| m.name == "Callback")
        .map(|index| Token::new(TableId::MemberRef, index as u32 + 1))
        .expect("callback slot imported");

    let mut observed = Evaluator::new(&woven);
    observed.statics.insert(callback_token, Value::Obj(0));
    let result = observed.call("Demo.Worker", "Tagged", vec![Value::Null, Value::I32(4)]);
    assert_eq!(result, Some(Value::I32(5)));
    assert_eq!(observed.extern_call_count("Report"), 1);

    // The other return path reports exactly once too.
    observed.extern_calls.clear();
    let result = observed.call("Demo.Worker", "Tagged", vec![Value::Null, Value::I32(0)]);
    assert_eq!(result, Some(Value::I32(-1)));
    assert_eq!(observed.extern_call_count("Report"), 1);
}

#[test]
fn test_timer_weave_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_timer_runtime(dir.path());
    let app = build_app(dir.path());

    let (first, _) = weave_app(dir.path(), &app);
    assert!(first.success);
    let after_first = method_bytes(&load_single_module(&app), "Demo.Worker", "Tagged");

    // The marker was stripped on the first pass, so a second weave finds
    // nothing to instrument.
    let (second, _) = weave_app(dir.path(), &app);
    assert!(second.success);
    let after_second = method_bytes(&load_single_module(&app), "Demo.Worker", "Tagged");

    assert_eq!(after_first, after_second);
}

#[test]
fn test_timer_weave_unresolvable_runtime() {
    let dir = tempfile::tempdir().expect("tempdir");
    // No runtime assembly written: the import cannot resolve.
    let app = build_app(dir.path());
    let before = method_bytes(&load_single_module(&app), "Demo.Worker", "Tagged");

    let (report, logger) = weave_app(dir.path(), &app);

    // The failure is isolated to the addin and logged as an exception with
    // its identity; the batch itself still completes.
    assert!(report.success);
    assert_eq!(report.stats.addin_errors, 1);
    let exceptions = logger.with_severity(Severity::Exception);
    assert_eq!(exceptions.len(), 1);
    assert!(exceptions[0].message.contains("method-timer"));

    // The tagged method was left untouched.
    assert_eq!(
        method_bytes(&load_single_module(&app), "Demo.Worker", "Tagged"),
        before
    );
}
