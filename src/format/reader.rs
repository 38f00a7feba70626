//! Container reading: bytes to mutable object graph.

use std::path::Path;

use sha1::{Digest, Sha1};
use uguid::Guid;

use crate::{
    bytecode::decode_stream,
    file::{parser::Parser, MappedFile},
    metadata::{
        attributes::{AttrArgument, AttrNamedArgument, CustomAttribute},
        method::{LocalVar, MethodBody, MethodDef, MethodModifiers, ParamDef},
        module::{AssemblyDef, MemberRefKind, MemberRefRow, ModuleDef, TypeRefRow, Version},
        token::Token,
        types::{EventDef, FieldDef, FieldModifiers, MemberLocation, PropertyDef, TypeDef, TypeModifiers},
        typesystem::TypeName,
    },
    Error, Result,
};

use super::{arg_tag, ref_kind, CONTAINER_MAGIC, FORMAT_VERSION};

/// Reads the container at `path` into a fresh [`AssemblyDef`].
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the path does not exist,
/// [`Error::NotManaged`] if the magic does not match, and
/// [`Error::Malformed`] for version, digest or structural violations.
pub fn read_assembly(path: &Path) -> Result<AssemblyDef> {
    let file = MappedFile::open(path)?;
    let data = file.data();

    if data.len() < CONTAINER_MAGIC.len() || data[..CONTAINER_MAGIC.len()] != CONTAINER_MAGIC {
        return Err(Error::NotManaged(path.to_path_buf()));
    }

    let mut parser = Parser::new(data);
    parser.seek(CONTAINER_MAGIC.len())?;

    let version = parser.read_le::<u16>()?;
    if version != FORMAT_VERSION {
        return Err(malformed_error!(
            "Unsupported container format version {version}"
        ));
    }
    let _flags = parser.read_le::<u16>()?;

    let stored_digest: [u8; 20] = parser
        .read_bytes(20)?
        .try_into()
        .map_err(|_| Error::OutOfBounds)?;
    let payload = &data[parser.pos()..];
    let actual_digest: [u8; 20] = Sha1::digest(payload).into();
    if stored_digest != actual_digest {
        return Err(malformed_error!(
            "Container digest mismatch, file is corrupted"
        ));
    }

    let name = parser.read_prefixed_string_utf8()?;
    let assembly_version = Version {
        major: parser.read_le::<u16>()?,
        minor: parser.read_le::<u16>()?,
        build: parser.read_le::<u16>()?,
        revision: parser.read_le::<u16>()?,
    };

    let mut assembly = AssemblyDef::new(&name, assembly_version);
    let module_count = parser.read_le::<u32>()?;
    for _ in 0..module_count {
        assembly.modules.push(read_module(&mut parser)?);
    }

    if parser.remaining() != 0 {
        return Err(malformed_error!(
            "{} trailing bytes after the last module",
            parser.remaining()
        ));
    }

    Ok(assembly)
}

fn read_module(parser: &mut Parser<'_>) -> Result<ModuleDef> {
    let name = parser.read_prefixed_string_utf8()?;
    let mvid_bytes: [u8; 16] = parser
        .read_bytes(16)?
        .try_into()
        .map_err(|_| Error::OutOfBounds)?;
    let mut module = ModuleDef::new(&name, Guid::from_bytes(mvid_bytes));

    let string_count = parser.read_le::<u32>()?;
    let mut strings = Vec::with_capacity(string_count as usize);
    for _ in 0..string_count {
        strings.push(parser.read_prefixed_string_utf16()?);
    }
    module.set_user_strings(strings);

    let type_ref_count = parser.read_le::<u32>()?;
    for _ in 0..type_ref_count {
        module.type_refs.push(TypeRefRow {
            assembly: parser.read_prefixed_string_utf8()?,
            namespace: parser.read_prefixed_string_utf8()?,
            name: parser.read_prefixed_string_utf8()?,
        });
    }

    let member_ref_count = parser.read_le::<u32>()?;
    for _ in 0..member_ref_count {
        let declaring = Token::from_raw(parser.read_le::<u32>()?);
        let kind = match parser.read_le::<u8>()? {
            ref_kind::METHOD => MemberRefKind::Method,
            ref_kind::FIELD => MemberRefKind::Field,
            other => return Err(malformed_error!("Unknown member reference kind {other}")),
        };
        let name = parser.read_prefixed_string_utf8()?;
        let param_count = parser.read_le::<u32>()?;
        let mut params = Vec::with_capacity(param_count as usize);
        for _ in 0..param_count {
            params.push(read_type_name(parser)?);
        }
        let member_type = read_type_name(parser)?;
        module.member_refs.push(MemberRefRow {
            declaring,
            kind,
            name,
            params,
            member_type,
        });
    }

    let type_count = parser.read_le::<u32>()?;
    for _ in 0..type_count {
        let ty = read_type(parser)?;
        module.reserve_token(ty.token);
        for field in &ty.fields {
            module.reserve_token(field.token);
        }
        for method in &ty.methods {
            module.reserve_token(method.token);
        }
        for property in &ty.properties {
            module.reserve_token(property.token);
        }
        for event in &ty.events {
            module.reserve_token(event.token);
        }
        module.types.push(ty);
    }

    Ok(module)
}

fn read_type(parser: &mut Parser<'_>) -> Result<TypeDef> {
    let token = Token::from_raw(parser.read_le::<u32>()?);
    let flags = TypeModifiers::from_bits_truncate(parser.read_le::<u16>()?);
    let namespace = parser.read_prefixed_string_utf8()?;
    let name = parser.read_prefixed_string_utf8()?;

    let location = if parser.read_le::<u8>()? != 0 {
        Some(MemberLocation {
            file: parser.read_prefixed_string_utf8()?,
            line: parser.read_le::<u32>()?,
            offset: parser.read_le::<u32>()?,
        })
    } else {
        None
    };

    let interface_count = parser.read_le::<u32>()?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        interfaces.push(Token::from_raw(parser.read_le::<u32>()?));
    }

    let attributes = read_attributes(parser)?;

    let field_count = parser.read_le::<u32>()?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        fields.push(FieldDef {
            token: Token::from_raw(parser.read_le::<u32>()?),
            flags: FieldModifiers::from_bits_truncate(parser.read_le::<u16>()?),
            name: parser.read_prefixed_string_utf8()?,
            field_type: read_type_name(parser)?,
            attributes: read_attributes(parser)?,
        });
    }

    let method_count = parser.read_le::<u32>()?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        methods.push(read_method(parser)?);
    }

    let property_count = parser.read_le::<u32>()?;
    let mut properties = Vec::with_capacity(property_count as usize);
    for _ in 0..property_count {
        properties.push(PropertyDef {
            token: Token::from_raw(parser.read_le::<u32>()?),
            name: parser.read_prefixed_string_utf8()?,
            property_type: read_type_name(parser)?,
            getter: read_optional_string(parser)?,
            setter: read_optional_string(parser)?,
            attributes: read_attributes(parser)?,
        });
    }

    let event_count = parser.read_le::<u32>()?;
    let mut events = Vec::with_capacity(event_count as usize);
    for _ in 0..event_count {
        events.push(EventDef {
            token: Token::from_raw(parser.read_le::<u32>()?),
            name: parser.read_prefixed_string_utf8()?,
            event_type: read_type_name(parser)?,
            attributes: read_attributes(parser)?,
        });
    }

    Ok(TypeDef {
        token,
        flags,
        namespace,
        name,
        interfaces,
        fields,
        methods,
        properties,
        events,
        attributes,
        location,
    })
}

fn read_method(parser: &mut Parser<'_>) -> Result<MethodDef> {
    let token = Token::from_raw(parser.read_le::<u32>()?);
    let flags = MethodModifiers::from_bits_truncate(parser.read_le::<u16>()?);
    let name = parser.read_prefixed_string_utf8()?;
    let return_type = read_type_name(parser)?;

    let param_count = parser.read_le::<u32>()?;
    let mut params = Vec::with_capacity(param_count as usize);
    for _ in 0..param_count {
        params.push(ParamDef {
            name: parser.read_prefixed_string_utf8()?,
            param_type: read_type_name(parser)?,
        });
    }

    let attributes = read_attributes(parser)?;

    let body = if parser.read_le::<u8>()? != 0 {
        let local_count = parser.read_le::<u32>()?;
        let mut locals = Vec::with_capacity(local_count as usize);
        for _ in 0..local_count {
            locals.push(LocalVar {
                var_type: read_type_name(parser)?,
            });
        }
        let code_len = parser.read_le::<u32>()? as usize;
        let instructions = decode_stream(parser, code_len)?;
        Some(MethodBody::from_parts(locals, instructions))
    } else {
        None
    };

    Ok(MethodDef {
        token,
        flags,
        name,
        params,
        return_type,
        attributes,
        body,
    })
}

fn read_type_name(parser: &mut Parser<'_>) -> Result<TypeName> {
    let tag = parser.read_le::<u8>()?;
    let class_name = if tag == crate::metadata::typesystem::ELEMENT_TYPE::CLASS {
        Some(parser.read_prefixed_string_utf8()?)
    } else {
        None
    };
    TypeName::from_element_tag(tag, class_name)
        .ok_or_else(|| malformed_error!("Unknown element type tag 0x{tag:02X}"))
}

fn read_optional_string(parser: &mut Parser<'_>) -> Result<Option<String>> {
    if parser.read_le::<u8>()? != 0 {
        Ok(Some(parser.read_prefixed_string_utf8()?))
    } else {
        Ok(None)
    }
}

fn read_attributes(parser: &mut Parser<'_>) -> Result<Vec<CustomAttribute>> {
    let count = parser.read_le::<u32>()?;
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let attribute_type = parser.read_prefixed_string_utf8()?;
        let fixed_count = parser.read_le::<u32>()?;
        let mut fixed_args = Vec::with_capacity(fixed_count as usize);
        for _ in 0..fixed_count {
            fixed_args.push(read_attr_argument(parser)?);
        }
        let named_count = parser.read_le::<u32>()?;
        let mut named_args = Vec::with_capacity(named_count as usize);
        for _ in 0..named_count {
            named_args.push(AttrNamedArgument {
                name: parser.read_prefixed_string_utf8()?,
                value: read_attr_argument(parser)?,
            });
        }
        attributes.push(CustomAttribute {
            attribute_type,
            fixed_args,
            named_args,
        });
    }
    Ok(attributes)
}

fn read_attr_argument(parser: &mut Parser<'_>) -> Result<AttrArgument> {
    match parser.read_le::<u8>()? {
        arg_tag::BOOL => Ok(AttrArgument::Bool(parser.read_le::<u8>()? != 0)),
        arg_tag::I4 => Ok(AttrArgument::I4(parser.read_le::<i32>()?)),
        arg_tag::I8 => Ok(AttrArgument::I8(parser.read_le::<i64>()?)),
        arg_tag::R8 => Ok(AttrArgument::R8(parser.read_le::<f64>()?)),
        arg_tag::STRING => Ok(AttrArgument::String(parser.read_prefixed_string_utf8()?)),
        other => Err(malformed_error!("Unknown attribute argument tag 0x{other:02X}")),
    }
}
