//! The mutable metadata object graph.
//!
//! Assemblies, modules, types, methods, fields, properties, events and custom
//! attributes form an owned tree that addins edit in place during a weave.
//! Tokens (see [`token`]) connect instructions and reference tables to
//! definitions without borrowing into the tree.

pub mod attributes;
pub mod method;
pub mod module;
pub mod queries;
pub mod token;
pub mod types;
pub mod typesystem;
