//! Fluent construction of assemblies, modules and types.
//!
//! The builders exist for hosts that generate fixture or runtime-support
//! assemblies, and for tests: build a type graph, write it with the format
//! writer, and the result is a container the weaver loads like any compiled
//! input. Assembly and module builders chain by value; the class builder
//! chains by mutable reference inside its closure.
//!
//! # Examples
//!
//! ```rust
//! use cilweave::build::AssemblyBuilder;
//! use cilweave::metadata::typesystem::TypeName;
//!
//! let assembly = AssemblyBuilder::new("App")
//!     .module("App.dll", |module| {
//!         module.class("Demo", "Person", |class| {
//!             class
//!                 .public()
//!                 .auto_property("Name", TypeName::String)
//!                 .method("Tick", TypeName::Void, &[], |asm| {
//!                     asm.ret();
//!                 });
//!         })
//!     })
//!     .build()?;
//! assert_eq!(assembly.modules.len(), 1);
//! # Ok::<(), cilweave::Error>(())
//! ```

mod asm;

pub use asm::{Label, MethodAsm};

use sha1::{Digest, Sha1};
use uguid::Guid;

use crate::{
    metadata::{
        attributes::CustomAttribute,
        method::{MethodDef, MethodModifiers, ParamDef},
        module::{AssemblyDef, ModuleDef, Version},
        token::TableId,
        types::{EventDef, FieldDef, FieldModifiers, MemberLocation, PropertyDef, TypeDef, TypeModifiers},
        typesystem::TypeName,
    },
    Error, Result,
};

/// Builds an [`AssemblyDef`] from scratch.
pub struct AssemblyBuilder {
    name: String,
    version: Version,
    modules: Vec<ModuleDef>,
    error: Option<Error>,
}

impl AssemblyBuilder {
    /// Starts an assembly named `name` with version `1.0.0.0`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        AssemblyBuilder {
            name: name.to_string(),
            version: Version {
                major: 1,
                ..Version::default()
            },
            modules: Vec::new(),
            error: None,
        }
    }

    /// Sets the assembly version.
    #[must_use]
    pub fn version(mut self, major: u16, minor: u16, build: u16, revision: u16) -> Self {
        self.version = Version {
            major,
            minor,
            build,
            revision,
        };
        self
    }

    /// Adds a module, configured through `configure`.
    #[must_use]
    pub fn module(mut self, name: &str, configure: impl FnOnce(ModuleBuilder) -> ModuleBuilder) -> Self {
        let builder = configure(ModuleBuilder::new(name));
        match builder.build() {
            Ok(module) => self.modules.push(module),
            Err(error) => self.error = self.error.take().or(Some(error)),
        }
        self
    }

    /// Finishes the assembly.
    ///
    /// # Errors
    ///
    /// Surfaces the first construction error, such as an unresolved branch
    /// label in a method body.
    pub fn build(self) -> Result<AssemblyDef> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let mut assembly = AssemblyDef::new(&self.name, self.version);
        assembly.modules = self.modules;
        Ok(assembly)
    }
}

/// Builds one [`ModuleDef`].
pub struct ModuleBuilder {
    module: ModuleDef,
    error: Option<Error>,
}

impl ModuleBuilder {
    /// Starts a module with a deterministic MVID derived from its name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let digest = Sha1::digest(name.as_bytes());
        let mut mvid = [0u8; 16];
        mvid.copy_from_slice(&digest[..16]);
        ModuleBuilder {
            module: ModuleDef::new(name, Guid::from_bytes(mvid)),
            error: None,
        }
    }

    /// Adds a class, configured through `configure`.
    #[must_use]
    pub fn class(mut self, namespace: &str, name: &str, configure: impl FnOnce(&mut ClassBuilder<'_>)) -> Self {
        let mut builder = ClassBuilder::new(&mut self.module, namespace, name);
        configure(&mut builder);
        match builder.finish() {
            Ok(ty) => self.module.types.push(ty),
            Err(error) => self.error = self.error.take().or(Some(error)),
        }
        self
    }

    /// Adds an interface definition with the given method signatures.
    ///
    /// Interface methods carry no bodies.
    #[must_use]
    pub fn interface(mut self, namespace: &str, name: &str, methods: &[(&str, TypeName, &[(&str, TypeName)])]) -> Self {
        let token = self.module.alloc_token(TableId::TypeDef);
        let mut ty = TypeDef {
            token,
            flags: TypeModifiers::PUBLIC | TypeModifiers::ABSTRACT | TypeModifiers::INTERFACE,
            namespace: namespace.to_string(),
            name: name.to_string(),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            attributes: Vec::new(),
            location: None,
        };
        for (method_name, return_type, params) in methods {
            let method_token = self.module.alloc_token(TableId::Method);
            ty.methods.push(MethodDef {
                token: method_token,
                flags: MethodModifiers::PUBLIC | MethodModifiers::VIRTUAL,
                name: (*method_name).to_string(),
                params: params
                    .iter()
                    .map(|(param_name, param_type)| ParamDef {
                        name: (*param_name).to_string(),
                        param_type: param_type.clone(),
                    })
                    .collect(),
                return_type: return_type.clone(),
                attributes: Vec::new(),
                body: None,
            });
        }
        self.module.types.push(ty);
        self
    }

    /// Finishes the module.
    ///
    /// # Errors
    ///
    /// Surfaces the first construction error from any class.
    pub fn build(self) -> Result<ModuleDef> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.module),
        }
    }
}

/// Builds one [`TypeDef`] inside a module.
pub struct ClassBuilder<'m> {
    module: &'m mut ModuleDef,
    ty: TypeDef,
    error: Option<Error>,
}

impl<'m> ClassBuilder<'m> {
    fn new(module: &'m mut ModuleDef, namespace: &str, name: &str) -> Self {
        let token = module.alloc_token(TableId::TypeDef);
        ClassBuilder {
            module,
            ty: TypeDef {
                token,
                flags: TypeModifiers::empty(),
                namespace: namespace.to_string(),
                name: name.to_string(),
                interfaces: Vec::new(),
                fields: Vec::new(),
                methods: Vec::new(),
                properties: Vec::new(),
                events: Vec::new(),
                attributes: Vec::new(),
                location: None,
            },
            error: None,
        }
    }

    /// Marks the type public.
    pub fn public(&mut self) -> &mut Self {
        self.ty.flags |= TypeModifiers::PUBLIC;
        self
    }

    /// Attaches a source location for diagnostics.
    pub fn at(&mut self, file: &str, line: u32, offset: u32) -> &mut Self {
        self.ty.location = Some(MemberLocation {
            file: file.to_string(),
            line,
            offset,
        });
        self
    }

    /// Attaches a custom attribute to the type.
    pub fn attribute(&mut self, attribute: CustomAttribute) -> &mut Self {
        self.ty.attributes.push(attribute);
        self
    }

    /// Declares that the type implements an interface from another assembly.
    pub fn implements(&mut self, assembly: &str, namespace: &str, name: &str) -> &mut Self {
        let token = self.module.import_type_ref(assembly, namespace, name);
        self.ty.interfaces.push(token);
        self
    }

    /// Declares that the type implements an interface defined earlier in
    /// this module.
    pub fn implements_local(&mut self, full_name: &str) -> &mut Self {
        match self.module.type_by_name(full_name) {
            Some(interface) => self.ty.interfaces.push(interface.token),
            None => {
                self.error = self
                    .error
                    .take()
                    .or(Some(Error::Error(format!("Unknown local interface '{full_name}'"))));
            }
        }
        self
    }

    /// Adds a private instance field.
    pub fn field(&mut self, name: &str, field_type: TypeName) -> &mut Self {
        self.push_field(name, field_type, FieldModifiers::PRIVATE)
    }

    /// Adds a static field.
    pub fn static_field(&mut self, name: &str, field_type: TypeName) -> &mut Self {
        self.push_field(name, field_type, FieldModifiers::PUBLIC | FieldModifiers::STATIC)
    }

    fn push_field(&mut self, name: &str, field_type: TypeName, flags: FieldModifiers) -> &mut Self {
        let token = self.module.alloc_token(TableId::Field);
        self.ty.fields.push(FieldDef {
            token,
            flags,
            name: name.to_string(),
            field_type,
            attributes: Vec::new(),
        });
        self
    }

    /// Token of a previously added field, for use inside method bodies.
    #[must_use]
    pub fn field_token(&self, name: &str) -> Option<crate::metadata::token::Token> {
        self.ty.field(name).map(|field| field.token)
    }

    /// Adds a public instance method with a body built by `body`.
    pub fn method(
        &mut self,
        name: &str,
        return_type: TypeName,
        params: &[(&str, TypeName)],
        body: impl FnOnce(&mut MethodAsm<'_>),
    ) -> &mut Self {
        self.push_method(name, return_type, params, MethodModifiers::PUBLIC, body)
    }

    /// Adds a public static method with a body built by `body`.
    pub fn static_method(
        &mut self,
        name: &str,
        return_type: TypeName,
        params: &[(&str, TypeName)],
        body: impl FnOnce(&mut MethodAsm<'_>),
    ) -> &mut Self {
        self.push_method(
            name,
            return_type,
            params,
            MethodModifiers::PUBLIC | MethodModifiers::STATIC,
            body,
        )
    }

    fn push_method(
        &mut self,
        name: &str,
        return_type: TypeName,
        params: &[(&str, TypeName)],
        flags: MethodModifiers,
        body: impl FnOnce(&mut MethodAsm<'_>),
    ) -> &mut Self {
        let token = self.module.alloc_token(TableId::Method);

        let mut asm = MethodAsm::new(self.module);
        body(&mut asm);
        let finished = match asm.finish() {
            Ok(finished) => finished,
            Err(error) => {
                self.error = self.error.take().or(Some(error));
                return self;
            }
        };

        self.ty.methods.push(MethodDef {
            token,
            flags,
            name: name.to_string(),
            params: params
                .iter()
                .map(|(param_name, param_type)| ParamDef {
                    name: (*param_name).to_string(),
                    param_type: param_type.clone(),
                })
                .collect(),
            return_type,
            attributes: Vec::new(),
            body: Some(finished),
        });
        self
    }

    /// Attaches a custom attribute to a previously added method.
    pub fn method_attribute(&mut self, method_name: &str, attribute: CustomAttribute) -> &mut Self {
        match self.ty.methods.iter_mut().find(|m| m.name == method_name) {
            Some(method) => method.attributes.push(attribute),
            None => {
                self.error = self
                    .error
                    .take()
                    .or(Some(Error::Error(format!("Unknown method '{method_name}'"))));
            }
        }
        self
    }

    /// Attaches a custom attribute to a previously added property.
    pub fn property_attribute(&mut self, property_name: &str, attribute: CustomAttribute) -> &mut Self {
        match self.ty.properties.iter_mut().find(|p| p.name == property_name) {
            Some(property) => property.attributes.push(attribute),
            None => {
                self.error = self
                    .error
                    .take()
                    .or(Some(Error::Error(format!("Unknown property '{property_name}'"))));
            }
        }
        self
    }

    /// Adds a property with a compiler-shaped backing field and accessors.
    ///
    /// Produces `<Name>k__BackingField`, `get_Name` returning the field and
    /// `set_Name` storing the incoming value, following the standard layout
    /// of compiled auto-properties.
    pub fn auto_property(&mut self, name: &str, property_type: TypeName) -> &mut Self {
        let backing = format!("<{name}>k__BackingField");
        let backing_token = self.module.alloc_token(TableId::Field);
        self.ty.fields.push(FieldDef {
            token: backing_token,
            flags: FieldModifiers::PRIVATE,
            name: backing,
            field_type: property_type.clone(),
            attributes: Vec::new(),
        });

        let getter = format!("get_{name}");
        let setter = format!("set_{name}");

        let getter_token = self.module.alloc_token(TableId::Method);
        let mut asm = MethodAsm::new(self.module);
        asm.ldarg(0).ldfld(backing_token).ret();
        match asm.finish() {
            Ok(body) => self.ty.methods.push(MethodDef {
                token: getter_token,
                flags: MethodModifiers::PUBLIC | MethodModifiers::SPECIAL_NAME,
                name: getter.clone(),
                params: Vec::new(),
                return_type: property_type.clone(),
                attributes: Vec::new(),
                body: Some(body),
            }),
            Err(error) => {
                self.error = self.error.take().or(Some(error));
                return self;
            }
        }

        let setter_token = self.module.alloc_token(TableId::Method);
        let mut asm = MethodAsm::new(self.module);
        asm.ldarg(0).ldarg(1).stfld(backing_token).ret();
        match asm.finish() {
            Ok(body) => self.ty.methods.push(MethodDef {
                token: setter_token,
                flags: MethodModifiers::PUBLIC | MethodModifiers::SPECIAL_NAME,
                name: setter.clone(),
                params: vec![ParamDef {
                    name: "value".to_string(),
                    param_type: property_type.clone(),
                }],
                return_type: TypeName::Void,
                attributes: Vec::new(),
                body: Some(body),
            }),
            Err(error) => {
                self.error = self.error.take().or(Some(error));
                return self;
            }
        }

        let property_token = self.module.alloc_token(TableId::Property);
        self.ty.properties.push(PropertyDef {
            token: property_token,
            name: name.to_string(),
            property_type,
            getter: Some(getter),
            setter: Some(setter),
            attributes: Vec::new(),
        });
        self
    }

    /// Adds an event declaration.
    pub fn event(&mut self, name: &str, event_type: TypeName) -> &mut Self {
        let token = self.module.alloc_token(TableId::Event);
        self.ty.events.push(EventDef {
            token,
            name: name.to_string(),
            event_type,
            attributes: Vec::new(),
        });
        self
    }

    fn finish(self) -> Result<TypeDef> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.ty),
        }
    }
}
