//! The visitor/dispatch engine.
//!
//! Walks one module's type/member graph exactly once, invoking only the
//! relevant visit callback on only the addins whose declared mask covers the
//! member kind. Traversal order is fixed: declaration order from the metadata
//! tables, because generated code and instruction offsets must be reproducible
//! across runs. Within one member, addins run in reverse registration order,
//! and the same order applies to every visit kind of the module pass.
//!
//! A failing addin is isolated at this boundary: the error is wrapped with
//! the addin's identity, logged, and traversal continues; one broken addin
//! must not corrupt or abort the work of the others.

use crate::{
    cache::{AssemblyCache, AssemblyResolver},
    diagnostics::{LogEntry, Severity, WeaveLogger},
    metadata::{module::ModuleDef, types::MemberLocation},
    Result,
};

use super::{
    addin::{AffectedDefinitions, WeaverAddin},
    config::WeaveConfig,
};

/// Running counters of one weave session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeaveStats {
    /// Modules entered
    pub modules: usize,
    /// Types iterated
    pub types: usize,
    /// Methods iterated
    pub methods: usize,
    /// Fields iterated
    pub fields: usize,
    /// Properties iterated
    pub properties: usize,
    /// Events iterated
    pub events: usize,
    /// Addin visit failures that were isolated and logged
    pub addin_errors: usize,
}

/// Services available to addins during a visit.
pub struct WeaveContext<'a> {
    /// The session's assembly cache
    pub cache: &'a AssemblyCache,
    /// The session's reference resolver
    pub resolver: &'a AssemblyResolver,
    /// The session configuration
    pub config: &'a WeaveConfig,
    logger: &'a mut dyn WeaveLogger,
}

impl<'a> WeaveContext<'a> {
    /// Creates a context over the session's services.
    pub fn new(
        cache: &'a AssemblyCache,
        resolver: &'a AssemblyResolver,
        config: &'a WeaveConfig,
        logger: &'a mut dyn WeaveLogger,
    ) -> Self {
        WeaveContext {
            cache,
            resolver,
            config,
            logger,
        }
    }

    /// Emits a structured diagnostic entry.
    pub fn log(&mut self, entry: LogEntry) {
        self.logger.log(entry);
    }

    /// Emits an info entry on `channel`.
    pub fn info(&mut self, channel: &str, message: String) {
        self.log(LogEntry::new(Severity::Info, channel, message));
    }

    /// Emits a warning entry on `channel`.
    pub fn warning(&mut self, channel: &str, message: String) {
        self.log(LogEntry::new(Severity::Warning, channel, message));
    }

    /// Emits an error entry on `channel`, optionally placed at a member.
    pub fn error(&mut self, channel: &str, message: String, location: Option<MemberLocation>) {
        self.log(LogEntry::new(Severity::Error, channel, message).at(location));
    }
}

/// Runs all active addins over one module.
///
/// `masks` are the addins' declared masks, read once at session start;
/// `active` is their union. The caller must not invoke this with an empty
/// `active` mask; an empty union means the whole weave is a no-op.
///
/// # Errors
///
/// Fails only when the session treats addin errors as fatal; isolated addin
/// failures are logged and counted instead.
pub(crate) fn weave_module(
    module: &mut ModuleDef,
    addins: &mut [Box<dyn WeaverAddin>],
    masks: &[AffectedDefinitions],
    active: AffectedDefinitions,
    ctx: &mut WeaveContext<'_>,
    stats: &mut WeaveStats,
) -> Result<()> {
    stats.modules += 1;
    tracing::debug!(module = %module.name, "weaving module");

    if active.contains(AffectedDefinitions::MODULE) {
        for index in (0..addins.len()).rev() {
            if masks[index].contains(AffectedDefinitions::MODULE) {
                invoke(&mut addins[index], module, ctx, stats, None, |addin, module, ctx| {
                    addin.visit_module(module, ctx)
                })?;
            }
        }
    }

    let member_mask = AffectedDefinitions::TYPE
        | AffectedDefinitions::METHOD
        | AffectedDefinitions::FIELD
        | AffectedDefinitions::PROPERTY
        | AffectedDefinitions::EVENT;

    if active.intersects(member_mask) {
        let mut type_idx = 0;
        while type_idx < module.types.len() {
            let location = module.types[type_idx].location.clone();
            stats.types += 1;

            if active.contains(AffectedDefinitions::TYPE) {
                for index in (0..addins.len()).rev() {
                    if masks[index].contains(AffectedDefinitions::TYPE) {
                        invoke(
                            &mut addins[index],
                            module,
                            ctx,
                            stats,
                            location.clone(),
                            |addin, module, ctx| addin.visit_type(module, type_idx, ctx),
                        )?;
                    }
                }
            }

            if active.contains(AffectedDefinitions::METHOD) {
                let mut method_idx = 0;
                while method_idx < module.types[type_idx].methods.len() {
                    stats.methods += 1;
                    for index in (0..addins.len()).rev() {
                        if masks[index].contains(AffectedDefinitions::METHOD) {
                            invoke(
                                &mut addins[index],
                                module,
                                ctx,
                                stats,
                                location.clone(),
                                |addin, module, ctx| {
                                    addin.visit_method(module, type_idx, method_idx, ctx)
                                },
                            )?;
                        }
                    }
                    method_idx += 1;
                }
            }

            if active.contains(AffectedDefinitions::FIELD) {
                let mut field_idx = 0;
                while field_idx < module.types[type_idx].fields.len() {
                    stats.fields += 1;
                    for index in (0..addins.len()).rev() {
                        if masks[index].contains(AffectedDefinitions::FIELD) {
                            invoke(
                                &mut addins[index],
                                module,
                                ctx,
                                stats,
                                location.clone(),
                                |addin, module, ctx| {
                                    addin.visit_field(module, type_idx, field_idx, ctx)
                                },
                            )?;
                        }
                    }
                    field_idx += 1;
                }
            }

            if active.contains(AffectedDefinitions::PROPERTY) {
                let mut property_idx = 0;
                while property_idx < module.types[type_idx].properties.len() {
                    stats.properties += 1;
                    for index in (0..addins.len()).rev() {
                        if masks[index].contains(AffectedDefinitions::PROPERTY) {
                            invoke(
                                &mut addins[index],
                                module,
                                ctx,
                                stats,
                                location.clone(),
                                |addin, module, ctx| {
                                    addin.visit_property(module, type_idx, property_idx, ctx)
                                },
                            )?;
                        }
                    }
                    property_idx += 1;
                }
            }

            if active.contains(AffectedDefinitions::EVENT) {
                let mut event_idx = 0;
                while event_idx < module.types[type_idx].events.len() {
                    stats.events += 1;
                    for index in (0..addins.len()).rev() {
                        if masks[index].contains(AffectedDefinitions::EVENT) {
                            invoke(
                                &mut addins[index],
                                module,
                                ctx,
                                stats,
                                location.clone(),
                                |addin, module, ctx| {
                                    addin.visit_event(module, type_idx, event_idx, ctx)
                                },
                            )?;
                        }
                    }
                    event_idx += 1;
                }
            }

            type_idx += 1;
        }
    }

    for index in (0..addins.len()).rev() {
        invoke(&mut addins[index], module, ctx, stats, None, |addin, module, ctx| {
            addin.module_edit_complete(module, ctx)
        })?;
    }

    Ok(())
}

/// Invokes one visit callback with failure isolation.
fn invoke(
    addin: &mut Box<dyn WeaverAddin>,
    module: &mut ModuleDef,
    ctx: &mut WeaveContext<'_>,
    stats: &mut WeaveStats,
    location: Option<MemberLocation>,
    call: impl FnOnce(&mut dyn WeaverAddin, &mut ModuleDef, &mut WeaveContext<'_>) -> Result<()>,
) -> Result<()> {
    match call(addin.as_mut(), module, ctx) {
        Ok(()) => Ok(()),
        Err(error) => {
            let wrapped = error.in_addin(addin.name());
            stats.addin_errors += 1;
            tracing::warn!(addin = addin.name(), module = %module.name, "{wrapped}");
            ctx.log(LogEntry::new(Severity::Exception, addin.name(), wrapped.to_string()).at(location));
            if ctx.config.fatal_addin_errors {
                Err(wrapped)
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{diagnostics::CollectingLogger, Error};
    use uguid::Guid;

    #[derive(Default)]
    struct CountingAddin {
        mask: AffectedDefinitions,
        modules: usize,
        types: usize,
        methods: usize,
        properties: usize,
        completions: usize,
        fail_on_method: bool,
    }

    impl CountingAddin {
        fn with_mask(mask: AffectedDefinitions) -> Self {
            CountingAddin {
                mask,
                ..CountingAddin::default()
            }
        }
    }

    impl WeaverAddin for CountingAddin {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn affected(&self) -> AffectedDefinitions {
            self.mask
        }

        fn visit_module(&mut self, _: &mut ModuleDef, _: &mut WeaveContext<'_>) -> Result<()> {
            self.modules += 1;
            Ok(())
        }

        fn visit_type(&mut self, _: &mut ModuleDef, _: usize, _: &mut WeaveContext<'_>) -> Result<()> {
            self.types += 1;
            Ok(())
        }

        fn visit_method(
            &mut self,
            _: &mut ModuleDef,
            _: usize,
            _: usize,
            _: &mut WeaveContext<'_>,
        ) -> Result<()> {
            self.methods += 1;
            if self.fail_on_method {
                return Err(Error::Error("boom".into()));
            }
            Ok(())
        }

        fn visit_property(
            &mut self,
            _: &mut ModuleDef,
            _: usize,
            _: usize,
            _: &mut WeaveContext<'_>,
        ) -> Result<()> {
            self.properties += 1;
            Ok(())
        }

        fn module_edit_complete(
            &mut self,
            _: &mut ModuleDef,
            _: &mut WeaveContext<'_>,
        ) -> Result<()> {
            self.completions += 1;
            Ok(())
        }
    }

    fn module_with_members() -> ModuleDef {
        use crate::build::AssemblyBuilder;
        use crate::metadata::typesystem::TypeName;

        let assembly = AssemblyBuilder::new("Test")
            .module("Test.dll", |module| {
                module.class("Demo", "Person", |class| {
                    class
                        .auto_property("Name", TypeName::String)
                        .method("Tick", TypeName::Void, &[], |asm| {
                            asm.ret();
                        });
                })
            })
            .build()
            .unwrap();
        assembly.modules.into_iter().next().unwrap()
    }

    fn run_dispatch(
        module: &mut ModuleDef,
        addins: &mut [Box<dyn WeaverAddin>],
        config: &WeaveConfig,
    ) -> (WeaveStats, CollectingLogger) {
        let cache = AssemblyCache::new();
        let resolver = AssemblyResolver::default();
        let mut logger = CollectingLogger::new();
        let mut stats = WeaveStats::default();

        let masks: Vec<AffectedDefinitions> = addins.iter().map(|addin| addin.affected()).collect();
        let active = masks
            .iter()
            .fold(AffectedDefinitions::empty(), |acc, mask| acc | *mask);

        let mut ctx = WeaveContext::new(&cache, &resolver, config, &mut logger);
        let result = weave_module(module, addins, &masks, active, &mut ctx, &mut stats);
        assert!(result.is_ok() || config.fatal_addin_errors);
        (stats, logger)
    }

    #[test]
    fn test_mask_gates_member_iteration() {
        let mut module = module_with_members();
        // Method-only addin and property-only addin.
        let mut addins: Vec<Box<dyn WeaverAddin>> = vec![
            Box::new(CountingAddin::with_mask(AffectedDefinitions::METHOD)),
            Box::new(CountingAddin::with_mask(AffectedDefinitions::PROPERTY)),
        ];
        let config = WeaveConfig::default();
        let (stats, _) = run_dispatch(&mut module, &mut addins, &config);

        // Person has three methods (getter, setter, Tick) and one property.
        assert_eq!(stats.methods, 3);
        assert_eq!(stats.properties, 1);
        // No addin declared TYPE, FIELD or EVENT interest; the engine still
        // iterates types to reach members, but fields/events are skipped.
        assert_eq!(stats.fields, 0);
        assert_eq!(stats.events, 0);
    }

    #[test]
    fn test_addin_failure_is_isolated() {
        let mut module = module_with_members();
        let mut failing = CountingAddin::with_mask(AffectedDefinitions::METHOD);
        failing.fail_on_method = true;
        let mut addins: Vec<Box<dyn WeaverAddin>> = vec![
            Box::new(failing),
            Box::new(CountingAddin::with_mask(AffectedDefinitions::METHOD)),
        ];
        let config = WeaveConfig::default();
        let (stats, logger) = run_dispatch(&mut module, &mut addins, &config);

        // Every method still visited by both addins despite the failures.
        assert_eq!(stats.methods, 3);
        assert_eq!(stats.addin_errors, 3);
        assert_eq!(
            logger.with_severity(Severity::Exception).len(),
            3
        );
    }

    #[test]
    fn test_empty_module_list_only_lifecycle() {
        let mut module = ModuleDef::new("Empty.dll", Guid::from_bytes([3; 16]));
        let mut addins: Vec<Box<dyn WeaverAddin>> = vec![Box::new(CountingAddin::with_mask(
            AffectedDefinitions::MODULE,
        ))];
        let config = WeaveConfig::default();
        let (stats, _) = run_dispatch(&mut module, &mut addins, &config);

        assert_eq!(stats.modules, 1);
        assert_eq!(stats.types, 0);
    }
}
