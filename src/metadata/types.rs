//! Type and member definitions of the mutable metadata graph.
//!
//! A [`TypeDef`] owns its methods, fields, properties, events and custom
//! attributes. Every definition carries the [`Token`] assigned when it was
//! added to its module; tokens are ids, not positions, so adding members never
//! renumbers existing ones.

use bitflags::bitflags;

use crate::metadata::{
    attributes::CustomAttribute,
    method::MethodDef,
    token::Token,
    typesystem::TypeName,
};

bitflags! {
    /// Visibility and semantic modifiers of a type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeModifiers: u16 {
        /// Visible outside the assembly
        const PUBLIC = 0x0001;
        /// Cannot be instantiated directly
        const ABSTRACT = 0x0002;
        /// Cannot be derived from
        const SEALED = 0x0004;
        /// Interface definition
        const INTERFACE = 0x0008;
    }
}

bitflags! {
    /// Visibility and semantic modifiers of a field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FieldModifiers: u16 {
        /// Visible outside the declaring type
        const PUBLIC = 0x0001;
        /// Visible only inside the declaring type
        const PRIVATE = 0x0002;
        /// Per-type storage rather than per-instance
        const STATIC = 0x0010;
    }
}

/// Source location derived from debug symbols.
///
/// Used only for diagnostics; correctness never depends on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberLocation {
    /// Source file path
    pub file: String,
    /// 1-based line number
    pub line: u32,
    /// Column or byte offset within the line
    pub offset: u32,
}

impl std::fmt::Display for MemberLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.offset)
    }
}

/// A field definition.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Token assigned by the owning module
    pub token: Token,
    /// Modifier flags
    pub flags: FieldModifiers,
    /// Field name
    pub name: String,
    /// Declared type
    pub field_type: TypeName,
    /// Custom attributes attached to this field
    pub attributes: Vec<CustomAttribute>,
}

/// A property definition.
///
/// Accessors are linked by method name within the declaring type, following
/// the `get_X`/`set_X` convention of compiled property accessors.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    /// Token assigned by the owning module
    pub token: Token,
    /// Property name
    pub name: String,
    /// Declared value type
    pub property_type: TypeName,
    /// Name of the getter method on the declaring type, if any
    pub getter: Option<String>,
    /// Name of the setter method on the declaring type, if any
    pub setter: Option<String>,
    /// Custom attributes attached to this property
    pub attributes: Vec<CustomAttribute>,
}

/// An event definition.
#[derive(Debug, Clone)]
pub struct EventDef {
    /// Token assigned by the owning module
    pub token: Token,
    /// Event name
    pub name: String,
    /// Delegate type of the event
    pub event_type: TypeName,
    /// Custom attributes attached to this event
    pub attributes: Vec<CustomAttribute>,
}

/// A type definition: the unit that owns members and attributes.
#[derive(Debug, Clone)]
pub struct TypeDef {
    /// Token assigned by the owning module
    pub token: Token,
    /// Modifier flags
    pub flags: TypeModifiers,
    /// Namespace, empty for the global namespace
    pub namespace: String,
    /// Simple type name
    pub name: String,
    /// Tokens of implemented interfaces (TypeDef or TypeRef)
    pub interfaces: Vec<Token>,
    /// Field definitions, in declaration order
    pub fields: Vec<FieldDef>,
    /// Method definitions, in declaration order
    pub methods: Vec<MethodDef>,
    /// Property definitions, in declaration order
    pub properties: Vec<PropertyDef>,
    /// Event definitions, in declaration order
    pub events: Vec<EventDef>,
    /// Custom attributes attached to this type
    pub attributes: Vec<CustomAttribute>,
    /// Source location from debug symbols, when present
    pub location: Option<MemberLocation>,
}

impl TypeDef {
    /// The namespace-qualified name, e.g. `Demo.Person`.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Finds a method by name (ordinal comparison). First match wins.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|method| method.name == name)
    }

    /// Index of the first method with the given name.
    #[must_use]
    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|method| method.name == name)
    }

    /// Finds a field by name (ordinal comparison).
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Finds a property by name (ordinal comparison).
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|prop| prop.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::token::TableId;

    fn empty_type(namespace: &str, name: &str) -> TypeDef {
        TypeDef {
            token: Token::new(TableId::TypeDef, 1),
            flags: TypeModifiers::PUBLIC,
            namespace: namespace.into(),
            name: name.into(),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            attributes: Vec::new(),
            location: None,
        }
    }

    #[test]
    fn test_full_name() {
        assert_eq!(empty_type("Demo", "Person").full_name(), "Demo.Person");
        assert_eq!(empty_type("", "Person").full_name(), "Person");
    }

    #[test]
    fn test_member_lookup_is_ordinal() {
        let mut ty = empty_type("Demo", "Person");
        ty.fields.push(FieldDef {
            token: Token::new(TableId::Field, 1),
            flags: FieldModifiers::PRIVATE,
            name: "age".into(),
            field_type: TypeName::I4,
            attributes: Vec::new(),
        });

        assert!(ty.field("age").is_some());
        assert!(ty.field("Age").is_none());
    }
}
