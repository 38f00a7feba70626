#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]

//! # cilweave
//!
//! An offline bytecode weaver for managed CIL-style module containers.
//! `cilweave` loads already-compiled assemblies, walks their type and member
//! metadata exactly once per pass, and lets independently-authored addin
//! components inject or rewrite instruction sequences declared through marker
//! attributes (timing instrumentation, change-notification callbacks), then
//! writes the modified containers back atomically. It runs at build/editor
//! time, never inside the target process.
//!
//! ## Features
//!
//! - **Mutable metadata graph** - Assemblies, modules, types, methods,
//!   fields, properties, events and custom attributes as an owned tree
//! - **Safe instruction splicing** - Stable instruction ids keep branch
//!   targets valid across arbitrary insertions; dangling targets are rejected
//! - **Mask-driven dispatch** - Addins declare the member kinds they affect;
//!   untouched traversal levels are skipped entirely
//! - **Failure isolation** - One broken addin is logged and contained, the
//!   rest of the weave continues
//! - **Session-scoped caching** - Each assembly is parsed once and shared
//!   through the resolver across the whole weave
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use cilweave::prelude::*;
//!
//! let mut logger = CollectingLogger::new();
//! let report = Weaver::new(WeaveConfig::default())
//!     .with_addin_default::<PropertyChangedAddin>()
//!     .with_addin(Box::new(MethodTimerAddin::new()))
//!     .weave(&[PathBuf::from("App.cwa")], &mut logger)?;
//!
//! assert!(report.success);
//! println!("visited {} methods", report.stats.methods);
//! # Ok::<(), cilweave::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - The mutable object graph and the attribute/signature
//!   query layer
//! - [`bytecode`] - Opcode table, instruction codec and the body editor
//! - [`format`] - Container reader/writer with digest verification and
//!   atomic write-back
//! - [`cache`] - Per-session assembly cache and foreign-reference resolver
//! - [`weave`] - The addin contract, dispatch engine and weave session
//! - [`addins`] - Built-in timing and change-notification passes
//! - [`build`] - Fluent builders for constructing fixture and runtime
//!   assemblies
//! - [`diagnostics`] - The structured logging surface consumed by hosts

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

pub mod addins;
pub mod build;
pub mod bytecode;
pub mod cache;
pub mod diagnostics;
pub mod format;
pub mod metadata;
pub mod prelude;
pub mod weave;

pub use error::Error;
pub use file::{
    parser::{LeValue, Parser},
    MappedFile,
};

/// The result type used throughout cilweave.
pub type Result<T> = std::result::Result<T, Error>;
