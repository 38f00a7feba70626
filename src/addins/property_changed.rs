//! Change-notification addin.
//!
//! Consumes the notify marker attribute on properties and rewrites the
//! setter: the incoming value is compared against the current getter value,
//! an equal assignment becomes a no-op (early return, the original setter
//! body never runs), and an unequal one invokes the configured callback with
//! the new value before the original body stores it.
//!
//! Generated setter shape, for a property `Name`:
//!
//! ```text
//!         ldarg   0
//!         call    get_Name
//!         ldarg   1
//!         beq     -> done          // unchanged: no-op
//!         ldarg   0
//!         ldarg   1                // named callback gets the new value...
//!         call    OnNameChanged
//!         <original setter body>
//! done:   ret
//! ```
//!
//! When the marker carries no callback name, the declaring type must
//! implement the standard notify interface; the injected call then passes
//! the property name instead of the value:
//!
//! ```text
//!         ldarg    0
//!         ldstr    "Name"
//!         callvirt OnPropertyChanged
//! ```
//!
//! A property satisfying neither form gets an error-severity diagnostic and
//! is left untouched.

use crate::{
    bytecode::{BodyEditor, OpCode, Operand},
    metadata::{module::ModuleDef, queries, token::Token},
    weave::{AffectedDefinitions, WeaveContext, WeaverAddin},
    Result,
};

/// Default marker attribute consumed by this addin.
pub const NOTIFY_MARKER: &str = "Cilweave.NotifyChanged";

/// Namespace-qualified name of the standard notify interface.
pub const NOTIFY_INTERFACE: &str = "Cilweave.INotifyChanged";

/// Method of the standard notify interface, receiving the property name.
pub const NOTIFY_INTERFACE_METHOD: &str = "OnPropertyChanged";

/// How the injected notification reaches user code.
enum CallbackShape {
    /// Named instance method on the declaring type, receiving the new value
    Named(Token),
    /// Standard interface method, receiving the property name
    Interface { method: Token, name_index: u32 },
}

/// The change-notification pass.
pub struct PropertyChangedAddin {
    marker: String,
}

impl PropertyChangedAddin {
    /// Creates the addin with its default marker.
    #[must_use]
    pub fn new() -> Self {
        PropertyChangedAddin {
            marker: NOTIFY_MARKER.to_string(),
        }
    }

    /// Overrides the marker attribute type name.
    #[must_use]
    pub fn with_marker(mut self, marker: &str) -> Self {
        self.marker = marker.to_string();
        self
    }
}

impl Default for PropertyChangedAddin {
    fn default() -> Self {
        PropertyChangedAddin::new()
    }
}

impl WeaverAddin for PropertyChangedAddin {
    fn name(&self) -> &'static str {
        "property-changed"
    }

    fn affected(&self) -> AffectedDefinitions {
        AffectedDefinitions::PROPERTY
    }

    fn visit_property(
        &mut self,
        module: &mut ModuleDef,
        type_idx: usize,
        property_idx: usize,
        ctx: &mut WeaveContext<'_>,
    ) -> Result<()> {
        let location = module.types[type_idx].location.clone();

        // Gather everything needed before borrowing the setter mutably.
        let (property_name, property_type, callback_name) = {
            let property = &module.types[type_idx].properties[property_idx];
            let Some(attr) = queries::get_attribute(&property.attributes, &self.marker) else {
                return Ok(());
            };
            let callback_name = attr
                .fixed_arg(0)
                .and_then(|arg| arg.as_string())
                .map(str::to_string);
            (
                property.name.clone(),
                property.property_type.clone(),
                callback_name,
            )
        };

        let (getter_name, setter_name) = {
            let property = &module.types[type_idx].properties[property_idx];
            match (&property.getter, &property.setter) {
                (Some(getter), Some(setter)) => (getter.clone(), setter.clone()),
                _ => {
                    ctx.error(
                        self.name(),
                        format!("property '{property_name}' needs both accessors for change notification"),
                        location,
                    );
                    return Ok(());
                }
            }
        };

        let shape = {
            let ty = &module.types[type_idx];
            match &callback_name {
                Some(callback) => {
                    match queries::find_method(ty, callback, &[property_type.display_name()]) {
                        Some(method) => Some(CallbackShape::Named(method.token)),
                        None => None,
                    }
                }
                None => {
                    if queries::implements_interface(module, ty, NOTIFY_INTERFACE) {
                        queries::find_method(ty, NOTIFY_INTERFACE_METHOD, &["string"]).map(|method| {
                            CallbackShape::Interface {
                                method: method.token,
                                // Patched with the interned index below.
                                name_index: 0,
                            }
                        })
                    } else {
                        None
                    }
                }
            }
        };

        let mut shape = match shape {
            Some(shape) => shape,
            None => {
                let detail = match &callback_name {
                    Some(callback) => format!(
                        "callback '{callback}({})' not found on the declaring type",
                        property_type.display_name()
                    ),
                    None => format!(
                        "no callback name given and the declaring type does not satisfy {NOTIFY_INTERFACE}"
                    ),
                };
                ctx.error(
                    self.name(),
                    format!("property '{property_name}': {detail}"),
                    location,
                );
                return Ok(());
            }
        };

        if let CallbackShape::Interface { name_index, .. } = &mut shape {
            *name_index = module.user_string(&property_name);
        }

        let getter_token = {
            let ty = &module.types[type_idx];
            match ty.method(&getter_name) {
                Some(getter) => getter.token,
                None => {
                    ctx.error(
                        self.name(),
                        format!("property '{property_name}' names a missing getter '{getter_name}'"),
                        location,
                    );
                    return Ok(());
                }
            }
        };

        let Some(setter_idx) = module.types[type_idx].method_index(&setter_name) else {
            ctx.error(
                self.name(),
                format!("property '{property_name}' names a missing setter '{setter_name}'"),
                location,
            );
            return Ok(());
        };

        let setter = &mut module.types[type_idx].methods[setter_idx];
        let Some(body) = setter.body.as_mut() else {
            ctx.error(
                self.name(),
                format!("setter '{setter_name}' has no body to rewrite"),
                location,
            );
            return Ok(());
        };

        let mut editor = BodyEditor::new(body);
        let done = editor.append(OpCode::Ret, Operand::None);

        let mut prologue = vec![
            (OpCode::LdArg, Operand::Var(0)),
            (OpCode::Call, Operand::Member(getter_token)),
            (OpCode::LdArg, Operand::Var(1)),
            (OpCode::Beq, Operand::Target(done)),
            (OpCode::LdArg, Operand::Var(0)),
        ];
        match shape {
            CallbackShape::Named(callback) => {
                prologue.push((OpCode::LdArg, Operand::Var(1)));
                prologue.push((OpCode::Call, Operand::Member(callback)));
            }
            CallbackShape::Interface { method, name_index } => {
                prologue.push((OpCode::LdStr, Operand::String(name_index)));
                prologue.push((OpCode::CallVirt, Operand::Member(method)));
            }
        }
        editor.inject_prologue(&prologue)?;

        queries::take_attribute(
            &mut module.types[type_idx].properties[property_idx].attributes,
            &self.marker,
        );
        ctx.info(
            self.name(),
            format!("change notification woven into '{property_name}' setter"),
        );
        Ok(())
    }
}
