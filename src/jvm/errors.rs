use super::{Constant, ConstantIndex};
use std::fmt;

/// Failures reading or writing the class file format
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// First four bytes were not `0xCAFEBABE`
    BadMagic(u32),

    /// Constant pool entry with a tag this reader doesn't know
    UnknownConstantTag { tag: u8, index: ConstantIndex },

    /// `CONSTANT_Utf8_info` whose bytes are not valid modified UTF-8
    MalformedUtf8(ConstantIndex),

    /// `CONSTANT_MethodHandle_info` with a reference kind outside `1..=9`
    UnknownHandleKind { kind: u8, index: ConstantIndex },

    ConstantPoolOverflow(ConstantPoolOverflow),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IoError(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                write!(f, "class file is truncated")
            }
            Error::IoError(err) => write!(f, "i/o error: {}", err),
            Error::BadMagic(magic) => write!(f, "bad magic number 0x{:08X}", magic),
            Error::UnknownConstantTag { tag, index } => {
                write!(f, "unknown constant pool tag {} at #{}", tag, index.0)
            }
            Error::MalformedUtf8(index) => {
                write!(f, "constant #{} is not valid modified UTF-8", index.0)
            }
            Error::UnknownHandleKind { kind, index } => {
                write!(f, "unknown method handle kind {} at #{}", kind, index.0)
            }
            Error::ConstantPoolOverflow(overflow) => write!(f, "{}", overflow),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConstantPoolOverflow> for Error {
    fn from(err: ConstantPoolOverflow) -> Error {
        Error::ConstantPoolOverflow(err)
    }
}

/// Constant pool is full (the largest valid index is 65535)
#[derive(Debug)]
pub struct ConstantPoolOverflow {
    pub constant: Constant,
    pub offset: usize,
}

impl fmt::Display for ConstantPoolOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "constant pool overflow inserting {:?} at #{}",
            self.constant, self.offset
        )
    }
}

/// A constant pool index that doesn't point at the expected kind of entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexResolutionError {
    pub index: ConstantIndex,
    pub kind: IndexResolutionErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexResolutionErrorKind {
    /// Index is zero, past the end of the pool, or the unusable slot after a long/double
    OutOfRange,

    /// Entry exists but has a different tag
    WrongTag {
        expected: &'static str,
        found: &'static str,
    },
}

impl fmt::Display for IndexResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IndexResolutionErrorKind::OutOfRange => {
                write!(f, "constant pool index #{} is out of range", self.index.0)
            }
            IndexResolutionErrorKind::WrongTag { expected, found } => write!(
                f,
                "constant pool index #{} is {} (expected {})",
                self.index.0, found, expected
            ),
        }
    }
}

impl std::error::Error for IndexResolutionError {}
