use super::{read_bytes, Attribute, ClassConstantIndex, Deserialize, Error, Serialize};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Contents of a `Code` attribute
///
/// Nested attributes (`StackMapTable`, `LineNumberTable`, ...) stay raw.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl Code {
    /// Decode the `info` of a `Code` attribute
    pub fn parse(info: &[u8]) -> Result<Code, Error> {
        let mut reader = Cursor::new(info);
        let code = Code::deserialize(&mut reader)?;
        let remaining = info.len() - reader.position() as usize;
        if remaining > 0 {
            log::warn!("Code attribute has {} unused trailing bytes", remaining);
        }
        Ok(code)
    }

    /// Encode back into the `info` of a `Code` attribute
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.serialize(&mut bytes).map_err(Error::IoError)?;
        Ok(bytes)
    }
}

impl Serialize for Code {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;

        // Code length is 4 bytes
        (self.code.len() as u32).serialize(writer)?;
        writer.write_all(&self.code)?;

        self.exception_table.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Code {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let max_stack = u16::deserialize(reader)?;
        let max_locals = u16::deserialize(reader)?;
        let code_length = u32::deserialize(reader)?;
        let code = read_bytes(reader, code_length as usize)?;
        Ok(Code {
            max_stack,
            max_locals,
            code,
            exception_table: Vec::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}

/// Entry in the exception table of a `Code` attribute
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: u16,

    /// End of exception handler range (exclusive)
    pub end_pc: u16,

    /// Start of the exception handler
    pub handler_pc: u16,

    /// Zero means "any exception" (used for `finally`)
    pub catch_type: ClassConstantIndex,
}

impl ExceptionHandler {
    /// Each entry is four `u16` fields
    pub const SIZE: usize = 8;
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        self.catch_type.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for ExceptionHandler {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ExceptionHandler {
            start_pc: u16::deserialize(reader)?,
            end_pc: u16::deserialize(reader)?,
            handler_pc: u16::deserialize(reader)?,
            catch_type: ClassConstantIndex::deserialize(reader)?,
        })
    }
}
