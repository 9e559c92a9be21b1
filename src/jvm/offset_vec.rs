use std::fmt::{Debug, Error, Formatter};
use std::result::Result;

/// Elements with a width (eg. when used in an `OffsetVec`)
pub trait Width {
    fn width(&self) -> usize;
}

/// A vector of elements of different logical "widths", where offsets into the vector are given in
/// terms of the sum of the widths of the previous elements (as opposed to the number of preceding
/// elements).
///
/// The constant pool is the motivating case: indexing starts at 1, most entries have width 1, but
/// `long` and `double` entries take two slots and the slot after them is unusable.
#[derive(Clone)]
pub struct OffsetVec<T: Sized> {
    /// Entries, along with their offset (sorted by offset)
    entries: Vec<(Offset, T)>,

    /// Offset of the next element to be added
    offset_len: Offset,
}

/// Offset into an `OffsetVec`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

impl<T: Sized + Width> OffsetVec<T> {
    /// New empty offset vector, with a custom starting offset
    pub fn new_starting_at(initial_offset: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            offset_len: initial_offset,
        }
    }

    /// Length of the `OffsetVec` (aka. number of entries)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current offset size of the `OffsetVec` (aka. offset of the next element to be added)
    pub fn offset_len(&self) -> Offset {
        self.offset_len
    }

    /// Add an entry to the back
    pub fn push(&mut self, slot: T) -> Offset {
        let offset = self.offset_len;
        self.offset_len.0 += slot.width();
        self.entries.push((offset, slot));
        offset
    }

    /// Get an entry by its offset in the vector
    ///
    /// Offsets that fall inside a wide entry (or past the end) return `None`.
    pub fn get_offset(&self, offset: Offset) -> Option<&T> {
        self.entries
            .binary_search_by_key(&offset, |(off, _)| *off)
            .ok()
            .map(|found_idx| &self.entries[found_idx].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Offset, &T)> + '_ {
        self.entries.iter().map(|(offset, elem)| (*offset, elem))
    }
}

impl<A: PartialEq> PartialEq for OffsetVec<A> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<T: Debug> Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let mut list = f.debug_list();
        for (off, elem) in &self.entries {
            list.entry(&format_args!("#{} = {:?}", off.0, elem));
        }
        list.finish()
    }
}
