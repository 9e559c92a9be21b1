//! Standalone `method_info` structures, decoded against some constant pool
//!
//! Patched method bytes don't come inside a class, so the constant pool they are interpreted
//! against is chosen by the caller. Decoding is best-effort past the fixed header: attributes that
//! can't be understood are logged and skipped rather than failing the whole method.

use super::PatchError;
use crate::jvm::{
    self, read_bytes, Attribute, ConstantPool, Deserialize, ExceptionHandler, IndexResolutionError,
    Method, MethodAccessFlags, Serialize, Utf8ConstantIndex, CODE,
};
use byteorder::WriteBytesExt;
use std::fmt;
use std::io::Cursor;

/// Placeholder used when a lenient parse can't resolve the name
pub const UNKNOWN_NAME: &str = "UnknownName";

/// Placeholder used when a lenient parse can't resolve the descriptor
pub const UNKNOWN_DESCRIPTOR: &str = "UnknownDesc";

/// What to do when the name or descriptor index doesn't resolve
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Strictness {
    /// Fail with [`PatchError::UnresolvableOriginalMethod`]
    Strict,

    /// Substitute [`UNKNOWN_NAME`] or [`UNKNOWN_DESCRIPTOR`]
    Lenient,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodStructure {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub name: String,
    pub descriptor: String,
    pub attributes: Vec<ParsedAttribute>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAttribute {
    pub name_index: Utf8ConstantIndex,
    pub name: String,

    /// Length as declared in the input
    pub raw_length: u32,
    pub body: AttributeBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeBody {
    Opaque(Vec<u8>),
    Code(CodeAttribute),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<ParsedAttribute>,
}

/// Attribute that couldn't be decoded
#[derive(Debug)]
pub struct AttributeDecodeError {
    /// Offset of the attribute record in the buffer it was read from
    pub offset: usize,
    pub kind: AttributeDecodeErrorKind,
}

#[derive(Debug)]
pub enum AttributeDecodeErrorKind {
    /// Record header or payload runs past the end of the input (parsing can't continue)
    Truncated,

    /// Name index doesn't point to a UTF-8 constant (the attribute is skipped)
    UnresolvedName(IndexResolutionError),

    /// `Code` payload is inconsistent with its own lengths (the attribute is skipped)
    MalformedCode(jvm::Error),
}

impl AttributeDecodeError {
    /// Whether the following attributes can still be read
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.kind, AttributeDecodeErrorKind::Truncated)
    }
}

impl fmt::Display for AttributeDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AttributeDecodeErrorKind::Truncated => {
                write!(f, "attribute at offset {} is truncated", self.offset)
            }
            AttributeDecodeErrorKind::UnresolvedName(err) => {
                write!(f, "attribute at offset {} has no usable name: {}", self.offset, err)
            }
            AttributeDecodeErrorKind::MalformedCode(err) => {
                write!(f, "Code attribute at offset {} is malformed: {}", self.offset, err)
            }
        }
    }
}

impl std::error::Error for AttributeDecodeError {}

impl MethodStructure {
    /// Decode a standalone `method_info`
    ///
    /// The header (flags, name, descriptor, attribute count) must be complete. Past that, decoding
    /// is best-effort.
    pub fn parse(
        bytes: &[u8],
        pool: &ConstantPool,
        strictness: Strictness,
    ) -> Result<MethodStructure, PatchError> {
        let mut reader = Cursor::new(bytes);

        let access_flags: MethodAccessFlags = header_field(&mut reader, "access_flags")?;
        let name_index: Utf8ConstantIndex = header_field(&mut reader, "name_index")?;
        let descriptor_index: Utf8ConstantIndex = header_field(&mut reader, "descriptor_index")?;
        let attribute_count: u16 = header_field(&mut reader, "attributes_count")?;

        let name = resolve_header(pool, name_index, strictness, UNKNOWN_NAME)?;
        let descriptor = resolve_header(pool, descriptor_index, strictness, UNKNOWN_DESCRIPTOR)?;
        log::debug!("Parsing method {}{} ({:?})", name, descriptor, strictness);

        let attributes = parse_attributes(&mut reader, attribute_count, pool);

        let remaining = bytes.len() - reader.position() as usize;
        if remaining > 0 {
            log::warn!(
                "Ignoring {} trailing bytes after method {}{}",
                remaining,
                name,
                descriptor
            );
        }

        Ok(MethodStructure {
            access_flags,
            name_index,
            descriptor_index,
            name,
            descriptor,
            attributes,
        })
    }

    /// The `Code` attribute (the first one, if there are several)
    pub fn code_attribute(&self) -> Option<&ParsedAttribute> {
        self.attributes
            .iter()
            .find(|attribute| matches!(attribute.body, AttributeBody::Code(_)))
    }

    pub fn code(&self) -> Option<&CodeAttribute> {
        self.code_attribute().and_then(|attribute| match &attribute.body {
            AttributeBody::Code(code) => Some(code),
            AttributeBody::Opaque(_) => None,
        })
    }

    /// Re-encode using the indices exactly as they were read
    ///
    /// Skipped attributes are not part of the output.
    pub fn to_method(&self) -> Result<Method, jvm::Error> {
        Ok(Method {
            access_flags: self.access_flags,
            name_index: self.name_index,
            descriptor_index: self.descriptor_index,
            attributes: self
                .attributes
                .iter()
                .map(ParsedAttribute::to_attribute)
                .collect::<Result<_, _>>()?,
        })
    }
}

impl ParsedAttribute {
    fn info(&self) -> std::io::Result<Vec<u8>> {
        match &self.body {
            AttributeBody::Opaque(bytes) => Ok(bytes.clone()),
            AttributeBody::Code(code) => {
                let mut bytes = vec![];
                code.serialize(&mut bytes)?;
                Ok(bytes)
            }
        }
    }

    /// Encode back into a raw attribute
    pub fn to_attribute(&self) -> Result<Attribute, jvm::Error> {
        Ok(Attribute {
            name_index: self.name_index,
            info: self.info().map_err(jvm::Error::IoError)?,
        })
    }
}

impl Serialize for ParsedAttribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        Attribute {
            name_index: self.name_index,
            info: self.info()?,
        }
        .serialize(writer)
    }
}

impl Serialize for CodeAttribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        (self.code.len() as u32).serialize(writer)?;
        writer.write_all(&self.code)?;
        self.exception_table.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

fn header_field<T: Deserialize>(
    reader: &mut Cursor<&[u8]>,
    field: &'static str,
) -> Result<T, PatchError> {
    let offset = reader.position() as usize;
    T::deserialize(reader).map_err(|_| PatchError::TruncatedMethodBytes { field, offset })
}

fn resolve_header(
    pool: &ConstantPool,
    index: Utf8ConstantIndex,
    strictness: Strictness,
    placeholder: &str,
) -> Result<String, PatchError> {
    match pool.resolve_utf8(index) {
        Ok(text) => Ok(text.to_owned()),
        Err(err) => match strictness {
            Strictness::Strict => Err(PatchError::UnresolvableOriginalMethod(err)),
            Strictness::Lenient => {
                log::warn!("Using {} in place of unresolvable {}", placeholder, err);
                Ok(placeholder.to_owned())
            }
        },
    }
}

/// Decode up to `count` attributes, dropping the ones that fail
fn parse_attributes(
    reader: &mut Cursor<&[u8]>,
    count: u16,
    pool: &ConstantPool,
) -> Vec<ParsedAttribute> {
    let mut attributes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        match parse_attribute(reader, pool) {
            Ok(attribute) => attributes.push(attribute),
            Err(err) if err.is_recoverable() => log::warn!("Skipping attribute: {}", err),
            Err(err) => {
                log::warn!("Stopping attribute parsing: {}", err);
                break;
            }
        }
    }
    attributes
}

fn parse_attribute(
    reader: &mut Cursor<&[u8]>,
    pool: &ConstantPool,
) -> Result<ParsedAttribute, AttributeDecodeError> {
    let offset = reader.position() as usize;
    let truncated = |_| AttributeDecodeError {
        offset,
        kind: AttributeDecodeErrorKind::Truncated,
    };

    let name_index = Utf8ConstantIndex::deserialize(reader).map_err(truncated)?;
    let raw_length = u32::deserialize(reader).map_err(truncated)?;
    let payload = read_bytes(reader, raw_length as usize).map_err(truncated)?;

    // The whole record has been consumed, so the failures below leave the stream in sync
    let name = pool
        .resolve_utf8(name_index)
        .map_err(|err| AttributeDecodeError {
            offset,
            kind: AttributeDecodeErrorKind::UnresolvedName(err),
        })?
        .to_owned();
    log::debug!("Attribute {} ({} bytes) at offset {}", name, raw_length, offset);

    let body = if name == CODE {
        let code = parse_code(&payload, pool).map_err(|err| AttributeDecodeError {
            offset,
            kind: AttributeDecodeErrorKind::MalformedCode(err),
        })?;
        AttributeBody::Code(code)
    } else {
        AttributeBody::Opaque(payload)
    };

    Ok(ParsedAttribute {
        name_index,
        name,
        raw_length,
        body,
    })
}

fn parse_code(payload: &[u8], pool: &ConstantPool) -> Result<CodeAttribute, jvm::Error> {
    let mut reader = Cursor::new(payload);
    let max_stack = u16::deserialize(&mut reader)?;
    let max_locals = u16::deserialize(&mut reader)?;
    let code_length = u32::deserialize(&mut reader)?;
    let code = read_bytes(&mut reader, code_length as usize)?;
    let exception_table = Vec::<ExceptionHandler>::deserialize(&mut reader)?;
    let attribute_count = u16::deserialize(&mut reader)?;
    let attributes = parse_attributes(&mut reader, attribute_count, pool);

    let remaining = payload.len() - reader.position() as usize;
    if remaining > 0 {
        log::warn!("Code attribute has {} unused trailing bytes", remaining);
    }

    Ok(CodeAttribute {
        max_stack,
        max_locals,
        code,
        exception_table,
        attributes,
    })
}
