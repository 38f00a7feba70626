//! Built-in type representation and resolution table.
//!
//! The weaver does not model the full managed type system; members carry a
//! [`TypeName`] that is rich enough for signature matching, local-variable
//! declarations and container serialization. Signature comparisons are ordinal
//! on the canonical display name, never culture-aware.

use std::fmt;

/// Element type tags used in the container encoding, mirroring the classic
/// ECMA-335 `ELEMENT_TYPE_*` constants.
#[allow(non_snake_case, missing_docs)]
pub mod ELEMENT_TYPE {
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0A;
    pub const U8: u8 = 0x0B;
    pub const R4: u8 = 0x0C;
    pub const R8: u8 = 0x0D;
    pub const STRING: u8 = 0x0E;
    pub const CLASS: u8 = 0x12;
    pub const OBJECT: u8 = 0x1C;
}

/// A type as it appears in signatures, locals and field declarations.
///
/// Primitives are structural; anything else is a named class reference. The
/// canonical display name (see [`TypeName::display_name`]) is the identity
/// used for positional signature matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeName {
    /// No value (method return position only)
    Void,
    /// Boolean
    Bool,
    /// 16-bit Unicode character
    Char,
    /// Signed 8-bit integer
    I1,
    /// Unsigned 8-bit integer
    U1,
    /// Signed 16-bit integer
    I2,
    /// Unsigned 16-bit integer
    U2,
    /// Signed 32-bit integer
    I4,
    /// Unsigned 32-bit integer
    U4,
    /// Signed 64-bit integer
    I8,
    /// Unsigned 64-bit integer
    U8,
    /// 32-bit floating point
    R4,
    /// 64-bit floating point
    R8,
    /// Immutable string
    String,
    /// Root object type
    Object,
    /// A named class or interface, stored as its namespace-qualified name
    Class(std::string::String),
}

impl TypeName {
    /// The canonical name used for ordinal signature matching.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            TypeName::Void => "void",
            TypeName::Bool => "bool",
            TypeName::Char => "char",
            TypeName::I1 => "int8",
            TypeName::U1 => "uint8",
            TypeName::I2 => "int16",
            TypeName::U2 => "uint16",
            TypeName::I4 => "int32",
            TypeName::U4 => "uint32",
            TypeName::I8 => "int64",
            TypeName::U8 => "uint64",
            TypeName::R4 => "float32",
            TypeName::R8 => "float64",
            TypeName::String => "string",
            TypeName::Object => "object",
            TypeName::Class(name) => name,
        }
    }

    /// The element tag written into the container encoding.
    #[must_use]
    pub fn element_tag(&self) -> u8 {
        match self {
            TypeName::Void => ELEMENT_TYPE::VOID,
            TypeName::Bool => ELEMENT_TYPE::BOOLEAN,
            TypeName::Char => ELEMENT_TYPE::CHAR,
            TypeName::I1 => ELEMENT_TYPE::I1,
            TypeName::U1 => ELEMENT_TYPE::U1,
            TypeName::I2 => ELEMENT_TYPE::I2,
            TypeName::U2 => ELEMENT_TYPE::U2,
            TypeName::I4 => ELEMENT_TYPE::I4,
            TypeName::U4 => ELEMENT_TYPE::U4,
            TypeName::I8 => ELEMENT_TYPE::I8,
            TypeName::U8 => ELEMENT_TYPE::U8,
            TypeName::R4 => ELEMENT_TYPE::R4,
            TypeName::R8 => ELEMENT_TYPE::R8,
            TypeName::String => ELEMENT_TYPE::STRING,
            TypeName::Object => ELEMENT_TYPE::OBJECT,
            TypeName::Class(_) => ELEMENT_TYPE::CLASS,
        }
    }

    /// Rebuilds a type from its element tag and optional class name.
    #[must_use]
    pub fn from_element_tag(tag: u8, class_name: Option<std::string::String>) -> Option<TypeName> {
        match tag {
            ELEMENT_TYPE::VOID => Some(TypeName::Void),
            ELEMENT_TYPE::BOOLEAN => Some(TypeName::Bool),
            ELEMENT_TYPE::CHAR => Some(TypeName::Char),
            ELEMENT_TYPE::I1 => Some(TypeName::I1),
            ELEMENT_TYPE::U1 => Some(TypeName::U1),
            ELEMENT_TYPE::I2 => Some(TypeName::I2),
            ELEMENT_TYPE::U2 => Some(TypeName::U2),
            ELEMENT_TYPE::I4 => Some(TypeName::I4),
            ELEMENT_TYPE::U4 => Some(TypeName::U4),
            ELEMENT_TYPE::I8 => Some(TypeName::I8),
            ELEMENT_TYPE::U8 => Some(TypeName::U8),
            ELEMENT_TYPE::R4 => Some(TypeName::R4),
            ELEMENT_TYPE::R8 => Some(TypeName::R8),
            ELEMENT_TYPE::STRING => Some(TypeName::String),
            ELEMENT_TYPE::OBJECT => Some(TypeName::Object),
            ELEMENT_TYPE::CLASS => Some(TypeName::Class(class_name?)),
            _ => None,
        }
    }

    /// Ordinal comparison against another type's canonical name.
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.display_name() == name
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
