//! Container writing: object graph to bytes, atomically.
//!
//! Serialization is the last stage of a weave and the one place where a
//! corrupted body must not slip through: every method body is checked for
//! branch integrity and stack balance before a single byte goes to disk.
//! The new container is written to a temp file in the destination directory
//! and renamed over the original, so a failed write leaves the original
//! untouched.

use std::path::Path;

use sha1::{Digest, Sha1};

use crate::{
    bytecode::{check_method_stack, encode_stream},
    metadata::{
        attributes::{AttrArgument, CustomAttribute},
        method::MethodDef,
        module::{AssemblyDef, MemberRefKind, ModuleDef},
        types::TypeDef,
        typesystem::{TypeName, ELEMENT_TYPE},
    },
    Result,
};

use super::{arg_tag, ref_kind, CONTAINER_MAGIC, FORMAT_VERSION};

/// Serializes `assembly` and atomically replaces the file at `path`.
///
/// # Errors
///
/// Returns the first body validation failure, or [`crate::Error::FileError`]
/// if the temp file cannot be written or renamed into place. On any failure
/// the original file keeps its previous content.
pub fn write_assembly(assembly: &AssemblyDef, path: &Path) -> Result<()> {
    let bytes = encode_assembly(assembly)?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("assembly");
    let temp_path = path.with_file_name(format!(".{file_name}.weave-tmp"));

    if let Err(error) = std::fs::write(&temp_path, &bytes) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(error.into());
    }
    if let Err(error) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(error.into());
    }

    Ok(())
}

/// Serializes `assembly` into container bytes without touching disk.
///
/// # Errors
///
/// Returns body validation failures; see [`write_assembly`].
pub fn encode_assembly(assembly: &AssemblyDef) -> Result<Vec<u8>> {
    let mut payload = Buffer::new();
    payload.put_pstr(&assembly.name);
    payload.put_u16(assembly.version.major);
    payload.put_u16(assembly.version.minor);
    payload.put_u16(assembly.version.build);
    payload.put_u16(assembly.version.revision);

    payload.put_u32(assembly.modules.len() as u32);
    for module in &assembly.modules {
        encode_module(&mut payload, module)?;
    }

    let digest: [u8; 20] = Sha1::digest(&payload.bytes).into();

    let mut out = Buffer::new();
    out.bytes.extend_from_slice(&CONTAINER_MAGIC);
    out.put_u16(FORMAT_VERSION);
    out.put_u16(0); // header flags, reserved
    out.bytes.extend_from_slice(&digest);
    out.bytes.extend_from_slice(&payload.bytes);
    Ok(out.bytes)
}

fn encode_module(out: &mut Buffer, module: &ModuleDef) -> Result<()> {
    out.put_pstr(&module.name);
    out.bytes.extend_from_slice(&module.mvid.to_bytes());

    let strings = module.user_strings();
    out.put_u32(strings.len() as u32);
    for value in strings {
        out.put_pstr_utf16(value);
    }

    out.put_u32(module.type_refs.len() as u32);
    for type_ref in &module.type_refs {
        out.put_pstr(&type_ref.assembly);
        out.put_pstr(&type_ref.namespace);
        out.put_pstr(&type_ref.name);
    }

    out.put_u32(module.member_refs.len() as u32);
    for member_ref in &module.member_refs {
        out.put_u32(member_ref.declaring.value());
        out.put_u8(match member_ref.kind {
            MemberRefKind::Method => ref_kind::METHOD,
            MemberRefKind::Field => ref_kind::FIELD,
        });
        out.put_pstr(&member_ref.name);
        out.put_u32(member_ref.params.len() as u32);
        for param in &member_ref.params {
            put_type_name(out, param);
        }
        put_type_name(out, &member_ref.member_type);
    }

    out.put_u32(module.types.len() as u32);
    for ty in &module.types {
        encode_type(out, module, ty)?;
    }

    Ok(())
}

fn encode_type(out: &mut Buffer, module: &ModuleDef, ty: &TypeDef) -> Result<()> {
    out.put_u32(ty.token.value());
    out.put_u16(ty.flags.bits());
    out.put_pstr(&ty.namespace);
    out.put_pstr(&ty.name);

    match &ty.location {
        Some(location) => {
            out.put_u8(1);
            out.put_pstr(&location.file);
            out.put_u32(location.line);
            out.put_u32(location.offset);
        }
        None => out.put_u8(0),
    }

    out.put_u32(ty.interfaces.len() as u32);
    for interface in &ty.interfaces {
        out.put_u32(interface.value());
    }

    put_attributes(out, &ty.attributes);

    out.put_u32(ty.fields.len() as u32);
    for field in &ty.fields {
        out.put_u32(field.token.value());
        out.put_u16(field.flags.bits());
        out.put_pstr(&field.name);
        put_type_name(out, &field.field_type);
        put_attributes(out, &field.attributes);
    }

    out.put_u32(ty.methods.len() as u32);
    for method in &ty.methods {
        encode_method(out, module, method)?;
    }

    out.put_u32(ty.properties.len() as u32);
    for property in &ty.properties {
        out.put_u32(property.token.value());
        out.put_pstr(&property.name);
        put_type_name(out, &property.property_type);
        put_optional_string(out, property.getter.as_deref());
        put_optional_string(out, property.setter.as_deref());
        put_attributes(out, &property.attributes);
    }

    out.put_u32(ty.events.len() as u32);
    for event in &ty.events {
        out.put_u32(event.token.value());
        out.put_pstr(&event.name);
        put_type_name(out, &event.event_type);
        put_attributes(out, &event.attributes);
    }

    Ok(())
}

fn encode_method(out: &mut Buffer, module: &ModuleDef, method: &MethodDef) -> Result<()> {
    out.put_u32(method.token.value());
    out.put_u16(method.flags.bits());
    out.put_pstr(&method.name);
    put_type_name(out, &method.return_type);

    out.put_u32(method.params.len() as u32);
    for param in &method.params {
        out.put_pstr(&param.name);
        put_type_name(out, &param.param_type);
    }

    put_attributes(out, &method.attributes);

    match &method.body {
        Some(body) => {
            check_method_stack(module, method)?;
            let code = encode_stream(&body.instructions)?;

            out.put_u8(1);
            out.put_u32(body.locals.len() as u32);
            for local in &body.locals {
                put_type_name(out, &local.var_type);
            }
            out.put_u32(code.len() as u32);
            out.bytes.extend_from_slice(&code);
        }
        None => out.put_u8(0),
    }

    Ok(())
}

fn put_type_name(out: &mut Buffer, ty: &TypeName) {
    out.put_u8(ty.element_tag());
    if ty.element_tag() == ELEMENT_TYPE::CLASS {
        out.put_pstr(ty.display_name());
    }
}

fn put_optional_string(out: &mut Buffer, value: Option<&str>) {
    match value {
        Some(value) => {
            out.put_u8(1);
            out.put_pstr(value);
        }
        None => out.put_u8(0),
    }
}

fn put_attributes(out: &mut Buffer, attributes: &[CustomAttribute]) {
    out.put_u32(attributes.len() as u32);
    for attr in attributes {
        out.put_pstr(&attr.attribute_type);
        out.put_u32(attr.fixed_args.len() as u32);
        for arg in &attr.fixed_args {
            put_attr_argument(out, arg);
        }
        out.put_u32(attr.named_args.len() as u32);
        for named in &attr.named_args {
            out.put_pstr(&named.name);
            put_attr_argument(out, &named.value);
        }
    }
}

fn put_attr_argument(out: &mut Buffer, arg: &AttrArgument) {
    match arg {
        AttrArgument::Bool(value) => {
            out.put_u8(arg_tag::BOOL);
            out.put_u8(u8::from(*value));
        }
        AttrArgument::I4(value) => {
            out.put_u8(arg_tag::I4);
            out.bytes.extend_from_slice(&value.to_le_bytes());
        }
        AttrArgument::I8(value) => {
            out.put_u8(arg_tag::I8);
            out.bytes.extend_from_slice(&value.to_le_bytes());
        }
        AttrArgument::R8(value) => {
            out.put_u8(arg_tag::R8);
            out.bytes.extend_from_slice(&value.to_le_bytes());
        }
        AttrArgument::String(value) => {
            out.put_u8(arg_tag::STRING);
            out.put_pstr(value);
        }
    }
}

/// Growable little-endian output buffer.
struct Buffer {
    bytes: Vec<u8>,
}

impl Buffer {
    fn new() -> Self {
        Buffer { bytes: Vec::new() }
    }

    fn put_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    fn put_u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn put_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn put_pstr(&mut self, value: &str) {
        self.put_u32(value.len() as u32);
        self.bytes.extend_from_slice(value.as_bytes());
    }

    fn put_pstr_utf16(&mut self, value: &str) {
        let units: Vec<u8> = value.encode_utf16().flat_map(u16::to_le_bytes).collect();
        self.put_u32(units.len() as u32);
        self.bytes.extend_from_slice(&units);
    }
}
