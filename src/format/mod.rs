//! The on-disk module container format.
//!
//! A container starts with the `CWAS` magic, a format version, and a SHA-1
//! digest over the remaining payload, followed by the assembly identity and
//! its modules: user-string heap, reference tables, and type definitions with
//! nested members and encoded method bodies.
//!
//! [`read_assembly`] materializes the mutable object graph from a file;
//! [`write_assembly`] validates every body, re-encodes the graph and replaces
//! the file atomically: either the new bytes land completely or the original
//! file is untouched.

mod reader;
mod writer;

pub use reader::read_assembly;
pub use writer::{encode_assembly, write_assembly};

/// Container magic, first four bytes of every managed module container.
pub const CONTAINER_MAGIC: [u8; 4] = *b"CWAS";

/// Current container format version.
pub const FORMAT_VERSION: u16 = 1;

/// Attribute argument tags used in the container encoding.
pub(crate) mod arg_tag {
    pub const BOOL: u8 = 0x02;
    pub const I4: u8 = 0x08;
    pub const I8: u8 = 0x0A;
    pub const R8: u8 = 0x0D;
    pub const STRING: u8 = 0x0E;
}

/// Member reference kind tags.
pub(crate) mod ref_kind {
    pub const METHOD: u8 = 0x00;
    pub const FIELD: u8 = 0x01;
}
