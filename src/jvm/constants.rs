use super::{read_bytes, Deserialize, Error, Serialize, Width};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Constants as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Method (this combines `Methodref` and `InterfaceMethodref`)
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(Utf8Text),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,

        /// Depending on the method kind, this points to different things:
        ///
        ///   - `FieldRef` for `GetField`, `GetStatic`, `PutField`, `PutStatic`
        ///   - `MethodRef` for the rest
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    },

    Module(Utf8ConstantIndex),

    Package(Utf8ConstantIndex),
}

impl Constant {
    /// Name of the constant's kind, as used in diagnostics
    pub fn tag_name(&self) -> &'static str {
        match self {
            Constant::Class(_) => "Class",
            Constant::FieldRef { .. } => "Fieldref",
            Constant::MethodRef {
                is_interface: false,
                ..
            } => "Methodref",
            Constant::MethodRef {
                is_interface: true, ..
            } => "InterfaceMethodref",
            Constant::String(_) => "String",
            Constant::Integer(_) => "Integer",
            Constant::Float(_) => "Float",
            Constant::Long(_) => "Long",
            Constant::Double(_) => "Double",
            Constant::NameAndType { .. } => "NameAndType",
            Constant::Utf8(_) => "Utf8",
            Constant::MethodHandle { .. } => "MethodHandle",
            Constant::MethodType { .. } => "MethodType",
            Constant::Dynamic { .. } => "Dynamic",
            Constant::InvokeDynamic { .. } => "InvokeDynamic",
            Constant::Module(_) => "Module",
            Constant::Package(_) => "Package",
        }
    }

    /// Read one constant pool entry (`index` is only used for error reporting)
    pub fn read<R: ReadBytesExt>(reader: &mut R, index: ConstantIndex) -> Result<Constant, Error> {
        let tag = u8::deserialize(reader)?;
        let constant = match tag {
            1 => {
                let len = u16::deserialize(reader)?;
                let bytes = read_bytes(reader, len as usize)?;
                let text = Utf8Text::decode(bytes).ok_or(Error::MalformedUtf8(index))?;
                Constant::Utf8(text)
            }
            3 => Constant::Integer(reader.read_i32::<BigEndian>().map_err(Error::IoError)?),
            4 => Constant::Float(reader.read_f32::<BigEndian>().map_err(Error::IoError)?),
            5 => Constant::Long(reader.read_i64::<BigEndian>().map_err(Error::IoError)?),
            6 => Constant::Double(reader.read_f64::<BigEndian>().map_err(Error::IoError)?),
            7 => Constant::Class(Utf8ConstantIndex::deserialize(reader)?),
            8 => Constant::String(Utf8ConstantIndex::deserialize(reader)?),
            9 => Constant::FieldRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            10 | 11 => Constant::MethodRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex::deserialize(reader)?,
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            15 => {
                let kind = u8::deserialize(reader)?;
                let handle_kind =
                    HandleKind::from_u8(kind).ok_or(Error::UnknownHandleKind { kind, index })?;
                Constant::MethodHandle {
                    handle_kind,
                    member: ConstantIndex::deserialize(reader)?,
                }
            }
            16 => Constant::MethodType {
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                method_descriptor: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            19 => Constant::Module(Utf8ConstantIndex::deserialize(reader)?),
            20 => Constant::Package(Utf8ConstantIndex::deserialize(reader)?),
            tag => return Err(Error::UnknownConstantTag { tag, index }),
        };
        Ok(constant)
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(text) => {
                1u8.serialize(writer)?;
                (text.encoded().len() as u16).serialize(writer)?;
                writer.write_all(text.encoded())?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                8u8.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef {
                class,
                name_and_type,
            } => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                15u8.serialize(writer)?;
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                method_descriptor.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    let mut units = [0u16; 2];
    for c in string.chars() {
        // Each UTF-16 code unit (surrogates included) gets its own 1-3 byte encoding
        for unit in c.encode_utf16(&mut units).iter() {
            let code = *unit as u32;
            if code != 0 && code < 0x80 {
                buffer.push(code as u8);
            } else if code < 0x800 {
                buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            } else {
                buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((code & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`], stopping at UTF-16 code units
///
/// Returns `None` for malformed input. Unpaired surrogates are not malformed: Java strings are
/// sequences of code units, and `javac` happily emits literals like `"\uD800"`.
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<Vec<u16>> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i] as u16;
        let continuation = |at: usize| -> Option<u16> {
            match bytes.get(at) {
                Some(b) if b & 0b1100_0000 == 0b1000_0000 => Some((b & 0x3F) as u16),
                _ => None,
            }
        };
        if b0 != 0 && b0 < 0x80 {
            units.push(b0);
            i += 1;
        } else if b0 & 0b1110_0000 == 0b1100_0000 {
            units.push((b0 & 0x1F) << 6 | continuation(i + 1)?);
            i += 2;
        } else if b0 & 0b1111_0000 == 0b1110_0000 {
            units.push((b0 & 0x0F) << 12 | continuation(i + 1)? << 6 | continuation(i + 2)?);
            i += 3;
        } else {
            return None;
        }
    }
    Some(units)
}

/// Text of a `CONSTANT_Utf8_info` entry
///
/// The encoded bytes are what gets written back, so entries round-trip exactly. The `&str` view
/// shows unpaired surrogates as `U+FFFD`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utf8Text {
    text: String,
    encoded: Vec<u8>,
}

impl Utf8Text {
    /// Decode modified UTF-8 bytes
    pub fn decode(encoded: Vec<u8>) -> Option<Utf8Text> {
        let units = decode_modified_utf8(&encoded)?;
        Some(Utf8Text {
            text: String::from_utf16_lossy(&units),
            encoded,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    /// Whether the `&str` view differs from the encoded bytes (eg. unpaired surrogates)
    pub fn is_lossy(&self) -> bool {
        encode_modified_utf8(&self.text) != self.encoded
    }
}

impl From<&str> for Utf8Text {
    fn from(text: &str) -> Utf8Text {
        Utf8Text {
            text: text.to_owned(),
            encoded: encode_modified_utf8(text),
        }
    }
}


/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. From
/// JVMS §4.4.5:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(pub ConstantIndex);

impl From<Utf8ConstantIndex> for ConstantIndex {
    fn from(index: Utf8ConstantIndex) -> ConstantIndex {
        index.0
    }
}

impl From<ClassConstantIndex> for ConstantIndex {
    fn from(index: ClassConstantIndex) -> ConstantIndex {
        index.0
    }
}

impl From<NameAndTypeConstantIndex> for ConstantIndex {
    fn from(index: NameAndTypeConstantIndex) -> ConstantIndex {
        index.0
    }
}

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Serialize for Utf8ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Serialize for ClassConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Serialize for NameAndTypeConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ConstantIndex(u16::deserialize(reader)?))
    }
}

impl Deserialize for Utf8ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Utf8ConstantIndex(ConstantIndex::deserialize(reader)?))
    }
}

impl Deserialize for ClassConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ClassConstantIndex(ConstantIndex::deserialize(reader)?))
    }
}

impl Deserialize for NameAndTypeConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(NameAndTypeConstantIndex(ConstantIndex::deserialize(reader)?))
    }
}

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl HandleKind {
    pub fn from_u8(kind: u8) -> Option<HandleKind> {
        Some(match kind {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            _ => return None,
        })
    }
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let byte: u8 = match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        };
        byte.serialize(writer)
    }
}
