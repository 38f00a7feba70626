//! The weave session: load → visit → write for a batch of assemblies.
//!
//! A [`Weaver`] owns the registered addins and drives the whole pass: the
//! assembly cache loads each input, the dispatch engine walks every module
//! with the active addins, and modified assemblies are serialized back in
//! place. Everything runs synchronously on the calling thread; addins are
//! invoked strictly sequentially, never in parallel, because instruction
//! streams are not safe under concurrent writers.
//!
//! A failed assembly never prevents the other, independent assemblies of the
//! batch from being woven and written.

mod addin;
mod config;
mod dispatch;

pub use addin::{AffectedDefinitions, WeaverAddin};
pub use config::WeaveConfig;
pub use dispatch::{WeaveContext, WeaveStats};

use std::{collections::HashSet, path::PathBuf, time::Instant};

use crate::{
    cache::{AssemblyCache, AssemblyResolver},
    diagnostics::WeaveLogger,
    format::write_assembly,
    metadata::module::ModuleDef,
    Error, Result,
};

/// Host callback invoked around each module's edit pass.
pub type ModuleHook = Box<dyn FnMut(&ModuleDef)>;

/// Outcome of one weave call.
#[derive(Debug, Clone, Copy)]
pub struct WeaveReport {
    /// Whether every input assembly was woven and written successfully
    pub success: bool,
    /// Visit counters for telemetry
    pub stats: WeaveStats,
}

/// What happened to one assembly of the batch.
enum AssemblyOutcome {
    /// All modules woven, file written
    Written,
    /// Deadline hit; modules woven so far were written, batch stops
    DeadlineReached,
}

/// A weave session over a set of addins.
pub struct Weaver {
    config: WeaveConfig,
    addins: Vec<Box<dyn WeaverAddin>>,
    before_module: Option<ModuleHook>,
    after_module: Option<ModuleHook>,
}

impl Weaver {
    /// Creates a session with the given configuration and no addins.
    #[must_use]
    pub fn new(config: WeaveConfig) -> Self {
        Weaver {
            config,
            addins: Vec::new(),
            before_module: None,
            after_module: None,
        }
    }

    /// Installs a host callback invoked before each module is edited.
    ///
    /// Hosts use this for editor integration (asset pipeline bookkeeping);
    /// the engine itself attaches no meaning to it.
    #[must_use]
    pub fn on_before_module_edited(mut self, hook: impl FnMut(&ModuleDef) + 'static) -> Self {
        self.before_module = Some(Box::new(hook));
        self
    }

    /// Installs a host callback invoked after each module's edit completes.
    #[must_use]
    pub fn on_module_edit_complete(mut self, hook: impl FnMut(&ModuleDef) + 'static) -> Self {
        self.after_module = Some(Box::new(hook));
        self
    }

    /// Registers an addin instance. Later-registered addins visit first.
    #[must_use]
    pub fn with_addin(mut self, addin: Box<dyn WeaverAddin>) -> Self {
        self.addins.push(addin);
        self
    }

    /// Registers an addin type through its zero-argument constructor.
    #[must_use]
    pub fn with_addin_default<A: WeaverAddin + Default + 'static>(self) -> Self {
        self.with_addin(Box::new(A::default()))
    }

    /// Weaves the assemblies at `paths`, writing results back in place.
    ///
    /// Configuration problems (no addins, duplicate addin names) abort before
    /// any I/O. An addin set whose union mask is empty makes the whole weave
    /// a successful no-op. Per-assembly failures are logged and reported
    /// through [`WeaveReport::success`] without stopping the rest of the
    /// batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddin`] for configuration problems, and the
    /// first addin error if the session treats addin errors as fatal.
    pub fn weave(
        &mut self,
        paths: &[PathBuf],
        logger: &mut dyn WeaveLogger,
    ) -> Result<WeaveReport> {
        self.validate_addins()?;

        let masks: Vec<AffectedDefinitions> =
            self.addins.iter().map(|addin| addin.affected()).collect();
        let active = masks
            .iter()
            .fold(AffectedDefinitions::empty(), |acc, mask| acc | *mask);

        let mut stats = WeaveStats::default();
        if active.is_empty() {
            tracing::debug!("no addin declares any member kind, skipping weave");
            return Ok(WeaveReport {
                success: true,
                stats,
            });
        }

        let cache = AssemblyCache::new();
        let resolver = AssemblyResolver::new(self.config.search_paths.clone());
        let started = Instant::now();
        let mut success = true;

        for path in paths {
            match self.weave_assembly(path, &cache, &resolver, &masks, active, started, logger, &mut stats)
            {
                Ok(AssemblyOutcome::Written) => {
                    tracing::info!(path = %path.display(), "assembly woven and written");
                }
                Ok(AssemblyOutcome::DeadlineReached) => {
                    let mut ctx = WeaveContext::new(&cache, &resolver, &self.config, logger);
                    ctx.warning(
                        "weaver",
                        "session deadline reached, aborting before next module".into(),
                    );
                    success = false;
                    break;
                }
                Err(error) => {
                    if self.config.fatal_addin_errors && matches!(error, Error::Addin { .. }) {
                        return Err(error);
                    }
                    tracing::warn!(path = %path.display(), "{error}");
                    let mut ctx = WeaveContext::new(&cache, &resolver, &self.config, logger);
                    ctx.error("weaver", format!("{}: {error}", path.display()), None);
                    success = false;
                }
            }
        }

        Ok(WeaveReport { success, stats })
    }

    /// Loads, weaves and writes back one assembly.
    #[allow(clippy::too_many_arguments)]
    fn weave_assembly(
        &mut self,
        path: &PathBuf,
        cache: &AssemblyCache,
        resolver: &AssemblyResolver,
        masks: &[AffectedDefinitions],
        active: AffectedDefinitions,
        started: Instant,
        logger: &mut dyn WeaveLogger,
        stats: &mut WeaveStats,
    ) -> Result<AssemblyOutcome> {
        let handle = cache.load(path)?;
        let mut assembly = handle.write().map_err(|_| Error::LockError)?;

        let mut deadline_hit = false;
        for module in &mut assembly.modules {
            if let Some(deadline) = self.config.module_deadline {
                if started.elapsed() >= deadline {
                    deadline_hit = true;
                    break;
                }
            }

            if let Some(hook) = self.before_module.as_mut() {
                hook(module);
            }

            let mut ctx = WeaveContext::new(cache, resolver, &self.config, logger);
            dispatch::weave_module(module, &mut self.addins, masks, active, &mut ctx, stats)?;

            if let Some(hook) = self.after_module.as_mut() {
                hook(module);
            }
        }

        // A serialization failure is fatal for this assembly; the original
        // file keeps its bytes. Earlier assemblies of the batch stay written.
        write_assembly(&assembly, path)?;

        if deadline_hit {
            Ok(AssemblyOutcome::DeadlineReached)
        } else {
            Ok(AssemblyOutcome::Written)
        }
    }

    fn validate_addins(&self) -> Result<()> {
        if self.addins.is_empty() {
            return Err(Error::InvalidAddin("no addins registered".into()));
        }

        let mut seen = HashSet::new();
        for addin in &self.addins {
            if !seen.insert(addin.name()) {
                return Err(Error::InvalidAddin(format!(
                    "duplicate addin name '{}'",
                    addin.name()
                )));
            }
        }
        Ok(())
    }
}
