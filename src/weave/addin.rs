//! The addin contract: the polymorphic interface every rewriting pass
//! implements.
//!
//! An addin declares up front which member kinds it affects; the dispatch
//! engine uses the declared mask to skip whole traversal levels no active
//! addin cares about. Addins are stateless between modules but may keep
//! state within one: anything cached during [`WeaverAddin::visit_module`]
//! must be reset there on the next module, never leaked across.
//!
//! Visit callbacks receive the module plus indices instead of member
//! references, so a pass can edit the member and still reach module-level
//! services (user strings, reference imports) on the same borrow.

use bitflags::bitflags;

use crate::{metadata::module::ModuleDef, Result};

use super::WeaveContext;

bitflags! {
    /// Member kinds an addin's visit callbacks cover.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AffectedDefinitions: u8 {
        /// Wants [`WeaverAddin::visit_module`]
        const MODULE = 0x01;
        /// Wants [`WeaverAddin::visit_type`]
        const TYPE = 0x02;
        /// Wants [`WeaverAddin::visit_method`]
        const METHOD = 0x04;
        /// Wants [`WeaverAddin::visit_field`]
        const FIELD = 0x08;
        /// Wants [`WeaverAddin::visit_property`]
        const PROPERTY = 0x10;
        /// Wants [`WeaverAddin::visit_event`]
        const EVENT = 0x20;
    }
}

impl Default for AffectedDefinitions {
    fn default() -> Self {
        AffectedDefinitions::empty()
    }
}

/// An independently-authored bytecode-rewriting pass.
///
/// # Lifecycle
///
/// Constructed once per weave session, then per module:
/// `visit_module` (setup) → per-type/member visits in the engine's fixed
/// traversal order → `module_edit_complete` (teardown). Callbacks default to
/// no-ops; the declared [`WeaverAddin::affected`] mask decides which ones the
/// engine invokes, and it is read once at session start.
pub trait WeaverAddin {
    /// Unique addin name, used for diagnostics and error wrapping.
    fn name(&self) -> &'static str;

    /// Which member kinds this addin's callbacks cover.
    ///
    /// The engine never invokes a callback whose bit is missing here, so an
    /// overridden callback without its bit is dead code.
    fn affected(&self) -> AffectedDefinitions;

    /// Called once when the engine enters a module, before any member visit.
    ///
    /// Module-scoped caches from the previous module must be reset here.
    ///
    /// # Errors
    ///
    /// A failure is isolated to this addin unless the session is configured
    /// to treat addin errors as fatal.
    fn visit_module(&mut self, module: &mut ModuleDef, ctx: &mut WeaveContext<'_>) -> Result<()> {
        let _ = (module, ctx);
        Ok(())
    }

    /// Called for each type in the module.
    ///
    /// # Errors
    ///
    /// See [`WeaverAddin::visit_module`].
    fn visit_type(
        &mut self,
        module: &mut ModuleDef,
        type_idx: usize,
        ctx: &mut WeaveContext<'_>,
    ) -> Result<()> {
        let _ = (module, type_idx, ctx);
        Ok(())
    }

    /// Called for each method of each type.
    ///
    /// # Errors
    ///
    /// See [`WeaverAddin::visit_module`].
    fn visit_method(
        &mut self,
        module: &mut ModuleDef,
        type_idx: usize,
        method_idx: usize,
        ctx: &mut WeaveContext<'_>,
    ) -> Result<()> {
        let _ = (module, type_idx, method_idx, ctx);
        Ok(())
    }

    /// Called for each field of each type.
    ///
    /// # Errors
    ///
    /// See [`WeaverAddin::visit_module`].
    fn visit_field(
        &mut self,
        module: &mut ModuleDef,
        type_idx: usize,
        field_idx: usize,
        ctx: &mut WeaveContext<'_>,
    ) -> Result<()> {
        let _ = (module, type_idx, field_idx, ctx);
        Ok(())
    }

    /// Called for each property of each type.
    ///
    /// # Errors
    ///
    /// See [`WeaverAddin::visit_module`].
    fn visit_property(
        &mut self,
        module: &mut ModuleDef,
        type_idx: usize,
        property_idx: usize,
        ctx: &mut WeaveContext<'_>,
    ) -> Result<()> {
        let _ = (module, type_idx, property_idx, ctx);
        Ok(())
    }

    /// Called for each event of each type.
    ///
    /// # Errors
    ///
    /// See [`WeaverAddin::visit_module`].
    fn visit_event(
        &mut self,
        module: &mut ModuleDef,
        type_idx: usize,
        event_idx: usize,
        ctx: &mut WeaveContext<'_>,
    ) -> Result<()> {
        let _ = (module, type_idx, event_idx, ctx);
        Ok(())
    }

    /// Called once after all types of a module have been visited.
    ///
    /// # Errors
    ///
    /// See [`WeaverAddin::visit_module`].
    fn module_edit_complete(
        &mut self,
        module: &mut ModuleDef,
        ctx: &mut WeaveContext<'_>,
    ) -> Result<()> {
        let _ = (module, ctx);
        Ok(())
    }
}
