//! # cilweave Prelude
//!
//! Convenient re-exports of the most commonly used types and traits. Import
//! this module to get quick access to everything a typical weave needs.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use cilweave::prelude::*;
//!
//! let mut logger = CollectingLogger::new();
//! let report = Weaver::new(WeaveConfig::default())
//!     .with_addin_default::<MethodTimerAddin>()
//!     .weave(&[PathBuf::from("App.cwa")], &mut logger)?;
//! assert!(report.success);
//! # Ok::<(), cilweave::Error>(())
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilweave operations
pub use crate::Error;

/// The result type used throughout cilweave
pub use crate::Result;

// ================================================================================================
// Weave Session
// ================================================================================================

pub use crate::weave::{
    AffectedDefinitions, ModuleHook, WeaveConfig, WeaveContext, WeaveReport, WeaveStats, Weaver,
    WeaverAddin,
};

// ================================================================================================
// Built-in Addins
// ================================================================================================

pub use crate::addins::{MethodTimerAddin, PropertyChangedAddin};

// ================================================================================================
// Metadata Graph
// ================================================================================================

pub use crate::metadata::{
    attributes::{AttrArgument, AttrNamedArgument, CustomAttribute},
    method::{LocalVar, MethodBody, MethodDef, MethodModifiers, ParamDef},
    module::{AssemblyDef, MemberRefKind, MemberRefRow, ModuleDef, TypeRefRow, Version},
    token::{TableId, Token},
    types::{EventDef, FieldDef, FieldModifiers, MemberLocation, PropertyDef, TypeDef, TypeModifiers},
    typesystem::TypeName,
};

// ================================================================================================
// Bytecode
// ================================================================================================

pub use crate::bytecode::{BodyEditor, FlowType, InstrId, Instruction, OpCode, Operand};

// ================================================================================================
// Format, Cache and Diagnostics
// ================================================================================================

pub use crate::cache::{AssemblyCache, AssemblyHandle, AssemblyResolver};
pub use crate::diagnostics::{CollectingLogger, LogEntry, Severity, TracingLogger, WeaveLogger};
pub use crate::format::{read_assembly, write_assembly};

// ================================================================================================
// Builders
// ================================================================================================

pub use crate::build::{AssemblyBuilder, ClassBuilder, MethodAsm, ModuleBuilder};
