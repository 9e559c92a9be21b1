use super::{
    read_bytes, ClassAccessFlags, ClassConstantIndex, ConstantPool, Deserialize, Error,
    FieldAccessFlags, IndexResolutionError, MethodAccessFlags, Serialize, Utf8ConstantIndex,
    Version,
};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Name of the attribute holding a method's bytecode
pub const CODE: &str = "Code";

/// Representation of the [`class` file format of the JVM][0]
///
/// Attributes are kept as raw bytes, so parsing and then serializing a class reproduces it exactly.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,
    pub super_class: ClassConstantIndex,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Parse a complete class file
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
        let mut reader = Cursor::new(bytes);
        let class = ClassFile::deserialize(&mut reader)?;

        let remaining = bytes.len() - reader.position() as usize;
        if remaining > 0 {
            log::warn!(
                "Not all bytes were consumed when parsing class file, {} bytes remaining",
                remaining
            );
        }
        Ok(class)
    }

    /// Encode the class file into bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.serialize(&mut bytes).map_err(Error::IoError)?;
        Ok(bytes)
    }

    /// Internal name of this class (eg. `java/lang/Object`)
    pub fn name(&self) -> Result<&str, IndexResolutionError> {
        self.constants.resolve_class(self.this_class)
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        self.super_class.serialize(writer)?;
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for ClassFile {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let magic = u32::deserialize(reader)?;
        if magic.to_be_bytes() != ClassFile::MAGIC {
            return Err(Error::BadMagic(magic));
        }
        Ok(ClassFile {
            version: Version::deserialize(reader)?,
            constants: ConstantPool::deserialize(reader)?,
            access_flags: ClassAccessFlags::deserialize(reader)?,
            this_class: ClassConstantIndex::deserialize(reader)?,
            super_class: ClassConstantIndex::deserialize(reader)?,
            interfaces: Vec::deserialize(reader)?,
            fields: Vec::deserialize(reader)?,
            methods: Vec::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}

/// Field declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.5
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub access_flags: FieldAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Field {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Field {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Field {
            access_flags: FieldAccessFlags::deserialize(reader)?,
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            descriptor_index: Utf8ConstantIndex::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6
#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Method {
    pub fn name<'p>(&self, pool: &'p ConstantPool) -> Result<&'p str, IndexResolutionError> {
        pool.resolve_utf8(self.name_index)
    }

    pub fn descriptor<'p>(&self, pool: &'p ConstantPool) -> Result<&'p str, IndexResolutionError> {
        pool.resolve_utf8(self.descriptor_index)
    }

    /// Position of the `Code` attribute, if the method has one
    pub fn code_attribute_position(&self, pool: &ConstantPool) -> Option<usize> {
        self.attributes
            .iter()
            .position(|attribute| attribute.is_named(pool, CODE))
    }

    /// Encode just this `method_info` structure
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.serialize(&mut bytes).map_err(Error::IoError)?;
        Ok(bytes)
    }
}

impl Serialize for Method {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Method {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Method {
            access_flags: MethodAccessFlags::deserialize(reader)?,
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            descriptor_index: Utf8ConstantIndex::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// Only the name is interpreted here. Anything that needs the contents (eg. the code attribute)
/// decodes `info` itself.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Attribute {
    /// Whether the attribute name resolves to `name` (unresolvable names never match)
    pub fn is_named(&self, pool: &ConstantPool, name: &str) -> bool {
        pool.resolve_utf8(self.name_index)
            .map_or(false, |found| found == name)
    }
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)?;

        Ok(())
    }
}

impl Deserialize for Attribute {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let name_index = Utf8ConstantIndex::deserialize(reader)?;
        let len = u32::deserialize(reader)?;
        let info = read_bytes(reader, len as usize)?;
        Ok(Attribute { name_index, info })
    }
}
