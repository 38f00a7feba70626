//! Timing instrumentation addin.
//!
//! Consumes the timing marker attribute on methods and injects a start-timer
//! prologue plus, immediately before every return instruction, a guarded
//! stop-and-report epilogue. The report call goes through a callback slot on
//! a runtime support type; when no callback is registered the woven code
//! skips the report with a single null-check branch, so unobserved methods
//! pay one static field load and one branch.
//!
//! Generated shape, for a method with N returns:
//!
//! ```text
//!         call    MethodTimer::Now          // prologue, once
//!         stloc   <start>
//!         ...
//!         ldsfld  MethodTimer::Callback     // epilogue, once per return
//!         brfalse -> ret
//!         ldstr   "<DeclaringType>"
//!         ldstr   "<MethodName>"
//!         call    MethodTimer::Now
//!         ldloc   <start>
//!         sub
//!         call    MethodTimer::Report
//!         ret
//! ```
//!
//! The marker is stripped after a successful rewrite, which is what makes a
//! second weave of the same assembly a no-op.

use crate::{
    bytecode::{BodyEditor, OpCode, Operand},
    metadata::{
        module::{MemberRefKind, ModuleDef},
        queries,
        token::Token,
        typesystem::TypeName,
    },
    weave::{AffectedDefinitions, WeaveContext, WeaverAddin},
    Result,
};

/// Default marker attribute consumed by this addin.
pub const TIMED_MARKER: &str = "Cilweave.Timed";

/// Imported runtime member tokens, cached per module.
struct RuntimeRefs {
    callback: Token,
    now: Token,
    report: Token,
}

/// The timing instrumentation pass.
pub struct MethodTimerAddin {
    marker: String,
    runtime_assembly: String,
    runtime_namespace: String,
    runtime_type: String,
    refs: Option<RuntimeRefs>,
    verified: bool,
}

impl MethodTimerAddin {
    /// Creates the addin with its default marker and runtime identity.
    #[must_use]
    pub fn new() -> Self {
        MethodTimerAddin {
            marker: TIMED_MARKER.to_string(),
            runtime_assembly: "Cilweave.Runtime".to_string(),
            runtime_namespace: "Cilweave".to_string(),
            runtime_type: "MethodTimer".to_string(),
            refs: None,
            verified: false,
        }
    }

    /// Overrides the marker attribute type name.
    #[must_use]
    pub fn with_marker(mut self, marker: &str) -> Self {
        self.marker = marker.to_string();
        self
    }

    /// Overrides the runtime support type the woven code calls into.
    ///
    /// The callback slot lives on this type as a static `Callback` field next
    /// to `Now` and `Report`; threading it through the session configuration
    /// here is what stands in for a process-wide mutable registry.
    #[must_use]
    pub fn with_runtime(mut self, assembly: &str, namespace: &str, type_name: &str) -> Self {
        self.runtime_assembly = assembly.to_string();
        self.runtime_namespace = namespace.to_string();
        self.runtime_type = type_name.to_string();
        self
    }

    /// Imports (or reuses) the runtime member references in `module` and,
    /// once per module, verifies they resolve to real definitions.
    fn ensure_refs(
        &mut self,
        module: &mut ModuleDef,
        ctx: &mut WeaveContext<'_>,
    ) -> Result<(Token, Token, Token)> {
        let (callback, now, report) = match &self.refs {
            Some(refs) => (refs.callback, refs.now, refs.report),
            None => {
                let declaring = module.import_type_ref(
                    &self.runtime_assembly,
                    &self.runtime_namespace,
                    &self.runtime_type,
                );
                let callback = module.import_member_ref(
                    declaring,
                    MemberRefKind::Field,
                    "Callback",
                    Vec::new(),
                    TypeName::Object,
                )?;
                let now = module.import_member_ref(
                    declaring,
                    MemberRefKind::Method,
                    "Now",
                    Vec::new(),
                    TypeName::I8,
                )?;
                let report = module.import_member_ref(
                    declaring,
                    MemberRefKind::Method,
                    "Report",
                    vec![TypeName::String, TypeName::String, TypeName::I8],
                    TypeName::Void,
                )?;
                self.refs = Some(RuntimeRefs {
                    callback,
                    now,
                    report,
                });
                (callback, now, report)
            }
        };

        if !self.verified {
            ctx.resolver.resolve_member_ref(ctx.cache, module, callback)?;
            ctx.resolver.resolve_member_ref(ctx.cache, module, now)?;
            ctx.resolver.resolve_member_ref(ctx.cache, module, report)?;
            self.verified = true;
        }

        Ok((callback, now, report))
    }
}

impl Default for MethodTimerAddin {
    fn default() -> Self {
        MethodTimerAddin::new()
    }
}

impl WeaverAddin for MethodTimerAddin {
    fn name(&self) -> &'static str {
        "method-timer"
    }

    fn affected(&self) -> AffectedDefinitions {
        AffectedDefinitions::MODULE | AffectedDefinitions::METHOD
    }

    fn visit_module(&mut self, module: &mut ModuleDef, _ctx: &mut WeaveContext<'_>) -> Result<()> {
        // Imported tokens belong to the previous module; drop them.
        self.refs = None;
        self.verified = false;
        tracing::debug!(module = %module.name, "method-timer entering module");
        Ok(())
    }

    fn visit_method(
        &mut self,
        module: &mut ModuleDef,
        type_idx: usize,
        method_idx: usize,
        ctx: &mut WeaveContext<'_>,
    ) -> Result<()> {
        {
            let method = &module.types[type_idx].methods[method_idx];
            if !method.has_attribute(&self.marker) {
                return Ok(());
            }
            if method.body.is_none() {
                let name = method.name.clone();
                ctx.warning(
                    self.name(),
                    format!("'{name}' carries the timing marker but has no body"),
                );
                queries::take_attribute(
                    &mut module.types[type_idx].methods[method_idx].attributes,
                    &self.marker,
                );
                return Ok(());
            }
        }

        // Resolution failures propagate; the dispatch boundary wraps them
        // with this addin's identity.
        let (callback, now, report) = self.ensure_refs(module, ctx)?;

        let type_name = module.types[type_idx].full_name();
        let method_name = module.types[type_idx].methods[method_idx].name.clone();
        let type_name_idx = module.user_string(&type_name);
        let method_name_idx = module.user_string(&method_name);

        let method = &mut module.types[type_idx].methods[method_idx];
        if let Some(attr) = queries::get_attribute(&method.attributes, &self.marker) {
            // The `recursive` flag is reserved; accept and ignore it.
            if attr.named_arg("recursive").and_then(|arg| arg.as_bool()) == Some(true) {
                tracing::debug!(method = %method_name, "recursive timing requested, not yet supported");
            }
        }

        let Some(body) = method.body.as_mut() else {
            return Ok(());
        };
        let mut editor = BodyEditor::new(body);

        let start = editor.append_local(TypeName::I8);
        editor.inject_prologue(&[
            (OpCode::Call, Operand::Member(now)),
            (OpCode::StLoc, Operand::Var(start)),
        ])?;

        for ret in editor.return_points() {
            editor.insert_range_before(
                ret,
                &[
                    (OpCode::LdsFld, Operand::Member(callback)),
                    (OpCode::BrFalse, Operand::Target(ret)),
                    (OpCode::LdStr, Operand::String(type_name_idx)),
                    (OpCode::LdStr, Operand::String(method_name_idx)),
                    (OpCode::Call, Operand::Member(now)),
                    (OpCode::LdLoc, Operand::Var(start)),
                    (OpCode::Sub, Operand::None),
                    (OpCode::Call, Operand::Member(report)),
                ],
            )?;
        }

        queries::take_attribute(&mut method.attributes, &self.marker);
        ctx.info(
            self.name(),
            format!("instrumented {type_name}::{method_name}"),
        );
        Ok(())
    }
}

/// Instruction counts of the injected sequences, for callers asserting on
/// woven bodies.
pub mod injected {
    /// Instructions in the start-timer prologue.
    pub const PROLOGUE_LEN: usize = 2;
    /// Instructions in each guarded stop-and-report epilogue.
    pub const EPILOGUE_LEN: usize = 8;
}
