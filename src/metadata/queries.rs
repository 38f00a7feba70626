//! Attribute and signature queries over the metadata graph.
//!
//! Lookup is by name plus positional parameter-type-name matching. Member
//! names are binary identifiers, so every comparison here is ordinal and
//! culture-invariant; there is no generic-arity or full-signature matching,
//! which is a documented limitation of this layer.

use crate::metadata::{
    attributes::CustomAttribute,
    method::MethodDef,
    module::ModuleDef,
    token::TableId,
    types::{PropertyDef, TypeDef},
};

/// Whether an attribute of the given type name is attached.
#[must_use]
pub fn has_attribute(attributes: &[CustomAttribute], name: &str) -> bool {
    attributes.iter().any(|attr| attr.is(name))
}

/// The first attached attribute of the given type name.
#[must_use]
pub fn get_attribute<'a>(attributes: &'a [CustomAttribute], name: &str) -> Option<&'a CustomAttribute> {
    attributes.iter().find(|attr| attr.is(name))
}

/// Removes and returns the first attribute of the given type name.
///
/// Marker attributes are consumed at most once: the addin that recognizes a
/// marker strips it after a successful rewrite, which is what makes a repeat
/// weave of the same module a no-op.
pub fn take_attribute(attributes: &mut Vec<CustomAttribute>, name: &str) -> Option<CustomAttribute> {
    let index = attributes.iter().position(|attr| attr.is(name))?;
    Some(attributes.remove(index))
}

/// Finds a method by name and exact positional parameter type names.
///
/// `arg_types` are canonical display names (see
/// [`crate::metadata::typesystem::TypeName::display_name`]).
#[must_use]
pub fn find_method<'a>(ty: &'a TypeDef, name: &str, arg_types: &[&str]) -> Option<&'a MethodDef> {
    ty.methods.iter().find(|method| {
        method.name == name
            && method.params.len() == arg_types.len()
            && method
                .params
                .iter()
                .zip(arg_types)
                .all(|(param, expected)| param.param_type.matches_name(expected))
    })
}

/// Finds a property by name.
#[must_use]
pub fn find_property<'a>(ty: &'a TypeDef, name: &str) -> Option<&'a PropertyDef> {
    ty.properties.iter().find(|prop| prop.name == name)
}

/// Whether `ty` implements the interface with the given namespace-qualified
/// name, through either a local definition or a type reference.
#[must_use]
pub fn implements_interface(module: &ModuleDef, ty: &TypeDef, full_name: &str) -> bool {
    ty.interfaces.iter().any(|token| match token.table() {
        Some(TableId::TypeDef) => module
            .type_by_token(*token)
            .is_some_and(|def| def.full_name() == full_name),
        Some(TableId::TypeRef) => module
            .type_ref(*token)
            .is_some_and(|row| row.full_name() == full_name),
        _ => false,
    })
}
