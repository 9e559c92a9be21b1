use super::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Result};

/// Utility trait for serializing data inside class files
///
/// Java class files have some peculiarities that make it useful to define an extra trait (instead
/// of just using `serde`):
///
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is usually `u16`
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

/// Counterpart of [`Serialize`] for reading class file constructs back
pub trait Deserialize: Sized {
    /// Deserialize construct from a binary input stream
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error>;
}

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Serialize for u16 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u16::<BigEndian>(*self)
    }
}

impl Serialize for u32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<BigEndian>(*self)
    }
}

impl Serialize for i32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i32::<BigEndian>(*self)
    }
}

impl Serialize for i64 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_i64::<BigEndian>(*self)
    }
}

impl Serialize for f32 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_f32::<BigEndian>(*self)
    }
}

impl Serialize for f64 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_f64::<BigEndian>(*self)
    }
}

/// Size in `u16` is the first thing serialized/deserialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u16).serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for u8 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        reader.read_u8().map_err(Error::IoError)
    }
}

impl Deserialize for u16 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        reader.read_u16::<BigEndian>().map_err(Error::IoError)
    }
}

impl Deserialize for u32 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        reader.read_u32::<BigEndian>().map_err(Error::IoError)
    }
}

impl<A: Deserialize> Deserialize for Vec<A> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        let len = u16::deserialize(reader)?;
        let mut elems = Vec::with_capacity(len as usize);
        for _ in 0..len {
            elems.push(A::deserialize(reader)?);
        }
        Ok(elems)
    }
}

/// Read exactly `len` bytes into a fresh buffer
///
/// Allocation follows the bytes actually read, not `len`.
pub fn read_bytes<R: ReadBytesExt>(
    reader: &mut R,
    len: usize,
) -> std::result::Result<Vec<u8>, Error> {
    let mut buffer = Vec::new();
    reader
        .by_ref()
        .take(len as u64)
        .read_to_end(&mut buffer)
        .map_err(Error::IoError)?;
    if buffer.len() != len {
        return Err(Error::IoError(std::io::Error::from(
            std::io::ErrorKind::UnexpectedEof,
        )));
    }
    Ok(buffer)
}
