//! Differential alignment of a patched method against the original it was derived from
//!
//! Both encodings are walked in lock-step. Every constant pool index that names something (the
//! method name and descriptor, and attribute names) is copied from the original into the patched
//! buffer. Everything else, most importantly the instruction bytes and the exception table, is
//! skipped over using each side's own lengths and never touched.

use crate::jvm::{ConstantIndex, ConstantPool, IndexResolutionError, CODE};
use byteorder::{BigEndian, ReadBytesExt};
use std::fmt;
use std::io::Cursor;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Side {
    Original,
    Patched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlignmentError {
    /// A length or index field points past the end of one of the buffers
    Overrun {
        side: Side,
        offset: usize,
        needed: usize,
    },

    /// An attribute name in the original doesn't resolve
    UnresolvedName {
        offset: usize,
        error: IndexResolutionError,
    },
}

impl fmt::Display for AlignmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlignmentError::Overrun {
                side,
                offset,
                needed,
            } => write!(
                f,
                "{:?} method bytes end before the {} bytes needed at offset {}",
                side, needed, offset
            ),
            AlignmentError::UnresolvedName { offset, error } => {
                write!(f, "attribute name at offset {} of original: {}", offset, error)
            }
        }
    }
}

impl std::error::Error for AlignmentError {}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentReport {
    /// Index fields that were compared
    pub visited: usize,

    /// Index fields whose value in the patched buffer was changed
    pub corrected: usize,

    /// Attributes walked (at every nesting level)
    pub attributes: usize,
}

/// Overwrite the index fields of `patched` with the ones from `original`
///
/// On error, the corrections made so far stay in `patched`.
pub fn align(
    patched: &mut [u8],
    original: &[u8],
    pool: &ConstantPool,
) -> Result<AlignmentReport, AlignmentError> {
    let mut aligner = Aligner {
        patched: Cursor::new(patched),
        original: Cursor::new(original),
        pool,
        report: AlignmentReport::default(),
    };
    aligner.align_method()?;
    Ok(aligner.report)
}

struct Aligner<'a> {
    patched: Cursor<&'a mut [u8]>,
    original: Cursor<&'a [u8]>,
    pool: &'a ConstantPool,
    report: AlignmentReport,
}

impl<'a> Aligner<'a> {
    fn align_method(&mut self) -> Result<(), AlignmentError> {
        // access_flags
        self.skip_both(2, 2)?;

        // name_index, descriptor_index
        self.copy_index()?;
        self.copy_index()?;

        let patched_count = read_u16(&mut self.patched, Side::Patched)?;
        let original_count = read_u16(&mut self.original, Side::Original)?;
        self.align_attributes(patched_count, original_count)
    }

    fn align_attributes(
        &mut self,
        patched_count: u16,
        original_count: u16,
    ) -> Result<(), AlignmentError> {
        if patched_count != original_count {
            log::debug!(
                "Attribute counts differ (patched {}, original {}), aligning the first {}",
                patched_count,
                original_count,
                patched_count.min(original_count)
            );
        }
        for _ in 0..patched_count.min(original_count) {
            self.align_attribute()?;
        }
        Ok(())
    }

    fn align_attribute(&mut self) -> Result<(), AlignmentError> {
        let name_offset = self.original.position() as usize;
        let name_index = self.copy_index()?;
        self.report.attributes += 1;

        let patched_length = read_u32(&mut self.patched, Side::Patched)? as usize;
        let original_length = read_u32(&mut self.original, Side::Original)? as usize;
        let patched_end = end_of(&self.patched, Side::Patched, patched_length)?;
        let original_end = end_of(&self.original, Side::Original, original_length)?;

        let name = self
            .pool
            .resolve_utf8(ConstantIndex(name_index))
            .map_err(|error| AlignmentError::UnresolvedName {
                offset: name_offset,
                error,
            })?;

        if name == CODE {
            // max_stack, max_locals
            self.skip_both(4, 4)?;

            // Instructions
            let patched_code = read_u32(&mut self.patched, Side::Patched)? as usize;
            let original_code = read_u32(&mut self.original, Side::Original)? as usize;
            self.skip_both(patched_code, original_code)?;

            // Exception table
            let patched_handlers = read_u16(&mut self.patched, Side::Patched)? as usize;
            let original_handlers = read_u16(&mut self.original, Side::Original)? as usize;
            self.skip_both(patched_handlers * 8, original_handlers * 8)?;

            let patched_count = read_u16(&mut self.patched, Side::Patched)?;
            let original_count = read_u16(&mut self.original, Side::Original)?;
            self.align_attributes(patched_count, original_count)?;
        }

        self.patched.set_position(patched_end as u64);
        self.original.set_position(original_end as u64);
        Ok(())
    }

    /// Copy one `u16` index from the original into the patched buffer, returning it
    fn copy_index(&mut self) -> Result<u16, AlignmentError> {
        let value = read_u16(&mut self.original, Side::Original)?;
        let at = self.patched.position() as usize;
        let current = read_u16(&mut self.patched, Side::Patched)?;
        self.report.visited += 1;
        if current != value {
            log::debug!("Correcting index at offset {}: #{} -> #{}", at, current, value);
            self.patched.get_mut()[at..at + 2].copy_from_slice(&value.to_be_bytes());
            self.report.corrected += 1;
        }
        Ok(value)
    }

    fn skip_both(&mut self, patched: usize, original: usize) -> Result<(), AlignmentError> {
        let patched_end = end_of(&self.patched, Side::Patched, patched)?;
        let original_end = end_of(&self.original, Side::Original, original)?;
        self.patched.set_position(patched_end as u64);
        self.original.set_position(original_end as u64);
        Ok(())
    }
}

/// Position `len` bytes further, if that is still inside the buffer
fn end_of<T: AsRef<[u8]>>(
    cursor: &Cursor<T>,
    side: Side,
    len: usize,
) -> Result<usize, AlignmentError> {
    let offset = cursor.position() as usize;
    match offset.checked_add(len) {
        Some(end) if end <= cursor.get_ref().as_ref().len() => Ok(end),
        _ => Err(AlignmentError::Overrun {
            side,
            offset,
            needed: len,
        }),
    }
}

fn read_u16<T: AsRef<[u8]>>(cursor: &mut Cursor<T>, side: Side) -> Result<u16, AlignmentError> {
    let offset = cursor.position() as usize;
    cursor
        .read_u16::<BigEndian>()
        .map_err(|_| AlignmentError::Overrun {
            side,
            offset,
            needed: 2,
        })
}

fn read_u32<T: AsRef<[u8]>>(cursor: &mut Cursor<T>, side: Side) -> Result<u32, AlignmentError> {
    let offset = cursor.position() as usize;
    cursor
        .read_u32::<BigEndian>()
        .map_err(|_| AlignmentError::Overrun {
            side,
            offset,
            needed: 4,
        })
}
