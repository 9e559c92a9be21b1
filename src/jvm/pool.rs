use super::{
    Constant, ConstantIndex, ConstantPoolOverflow, Deserialize, Error, IndexResolutionError,
    IndexResolutionErrorKind, Offset, OffsetVec, Serialize, Utf8ConstantIndex, Utf8Text, Width,
};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;

/// Constant pool of a parsed class
///
/// Lookups never modify the pool. The only way to add entries is through a
/// [`ConstantPoolBuilder`], which is append-only, so indices stay stable for the lifetime of the
/// pool.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantPool {
    constants: OffsetVec<Constant>,
}

impl ConstantPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantPool {
        ConstantPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
        }
    }

    /// Number of entries (long and double constants count once)
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Value of `constant_pool_count` in the class file (one more than the largest index)
    pub fn count(&self) -> usize {
        self.constants.offset_len().0
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConstantIndex, &Constant)> + '_ {
        self.constants
            .iter()
            .map(|(offset, constant)| (ConstantIndex(offset.0 as u16), constant))
    }

    /// Get the constant at an index
    pub fn get<I: Into<ConstantIndex>>(&self, index: I) -> Result<&Constant, IndexResolutionError> {
        let index = index.into();
        self.constants
            .get_offset(Offset(index.0 as usize))
            .ok_or(IndexResolutionError {
                index,
                kind: IndexResolutionErrorKind::OutOfRange,
            })
    }

    /// Get the text of a `CONSTANT_Utf8_info` entry
    pub fn resolve_utf8<I: Into<ConstantIndex>>(
        &self,
        index: I,
    ) -> Result<&str, IndexResolutionError> {
        let index = index.into();
        match self.get(index)? {
            Constant::Utf8(text) => Ok(text.as_str()),
            other => Err(IndexResolutionError {
                index,
                kind: IndexResolutionErrorKind::WrongTag {
                    expected: "Utf8",
                    found: other.tag_name(),
                },
            }),
        }
    }

    /// Get the internal name behind a `CONSTANT_Class_info` entry
    pub fn resolve_class<I: Into<ConstantIndex>>(
        &self,
        index: I,
    ) -> Result<&str, IndexResolutionError> {
        let index = index.into();
        match self.get(index)? {
            Constant::Class(name) => self.resolve_utf8(*name),
            other => Err(IndexResolutionError {
                index,
                kind: IndexResolutionErrorKind::WrongTag {
                    expected: "Class",
                    found: other.tag_name(),
                },
            }),
        }
    }

    /// Get the name and descriptor behind a `CONSTANT_NameAndType_info` entry
    pub fn resolve_name_and_type<I: Into<ConstantIndex>>(
        &self,
        index: I,
    ) -> Result<(&str, &str), IndexResolutionError> {
        let index = index.into();
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.resolve_utf8(*name)?, self.resolve_utf8(*descriptor)?))
            }
            other => Err(IndexResolutionError {
                index,
                kind: IndexResolutionErrorKind::WrongTag {
                    expected: "NameAndType",
                    found: other.tag_name(),
                },
            }),
        }
    }

    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, ConstantPoolOverflow> {
        // Compute the offset at which this constant will be inserted
        let offset = self.constants.offset_len().0;

        // The count is written as a `u16`, so the last slot must end at or before 65535
        if offset + constant.width() > u16::MAX as usize {
            return Err(ConstantPoolOverflow { constant, offset });
        }

        self.constants.push(constant);
        Ok(ConstantIndex(offset as u16))
    }
}

impl Default for ConstantPool {
    fn default() -> Self {
        ConstantPool::new()
    }
}

/// Count is `constant_pool_count` (so one more than the number of used slots)
impl Serialize for ConstantPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.count() as u16).serialize(writer)?;
        for (_, constant) in self.constants.iter() {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for ConstantPool {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let count = u16::deserialize(reader)? as usize;
        let mut pool = ConstantPool::new();
        while pool.count() < count {
            let index = ConstantIndex(pool.count() as u16);
            let constant = Constant::read(reader, index)?;
            pool.push_constant(constant)?;
        }
        Ok(pool)
    }
}

/// Get-or-insert access to a [`ConstantPool`]
///
/// Existing entries are reused whenever a structurally identical constant is requested, so copying
/// a method into a class only grows the pool by what is genuinely missing.
pub struct ConstantPoolBuilder<'p> {
    pool: &'p mut ConstantPool,

    /// Serialized form of every constant in the pool, mapped to the first index holding it
    existing: HashMap<Vec<u8>, ConstantIndex>,

    /// Number of constants appended through this builder
    added: usize,
}

impl<'p> ConstantPoolBuilder<'p> {
    pub fn new(pool: &'p mut ConstantPool) -> ConstantPoolBuilder<'p> {
        let mut existing = HashMap::new();
        for (index, constant) in pool.iter() {
            existing.entry(constant_key(constant)).or_insert(index);
        }
        ConstantPoolBuilder {
            pool,
            existing,
            added: 0,
        }
    }

    /// Read-only view of the pool being built
    pub fn pool(&self) -> &ConstantPool {
        self.pool
    }

    /// How many constants had to be appended so far
    pub fn added(&self) -> usize {
        self.added
    }

    /// Get or insert a constant
    pub fn get_or_insert(&mut self, constant: Constant) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let key = constant_key(&constant);
        if let Some(idx) = self.existing.get(&key) {
            return Ok(*idx);
        }
        let idx = self.pool.push_constant(constant)?;
        self.existing.insert(key, idx);
        self.added += 1;
        Ok(idx)
    }

    /// Get or insert a utf8 constant
    pub fn get_utf8(&mut self, utf8: &str) -> Result<Utf8ConstantIndex, ConstantPoolOverflow> {
        self.get_or_insert(Constant::Utf8(Utf8Text::from(utf8)))
            .map(Utf8ConstantIndex)
    }
}

/// Constants are compared by their encoding, which makes floats compare bitwise
fn constant_key(constant: &Constant) -> Vec<u8> {
    let mut key = vec![];
    constant
        .serialize(&mut key)
        .expect("serializing into a Vec cannot fail");
    key
}
