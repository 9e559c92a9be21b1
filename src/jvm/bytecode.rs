//! Just enough knowledge of JVM instructions to walk a `code` array
//!
//! Instructions are never decoded into a richer form. Walking only needs the length of every
//! instruction and whether (and how wide) its constant pool operand is.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-6.html

use std::fmt;

pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;
pub const GETSTATIC: u8 = 0xb2;
pub const PUTSTATIC: u8 = 0xb3;
pub const GETFIELD: u8 = 0xb4;
pub const PUTFIELD: u8 = 0xb5;
pub const INVOKEVIRTUAL: u8 = 0xb6;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const INVOKESTATIC: u8 = 0xb8;
pub const INVOKEINTERFACE: u8 = 0xb9;
pub const INVOKEDYNAMIC: u8 = 0xba;
pub const NEW: u8 = 0xbb;
pub const ANEWARRAY: u8 = 0xbd;
pub const CHECKCAST: u8 = 0xc0;
pub const INSTANCEOF: u8 = 0xc1;
pub const WIDE: u8 = 0xc4;
pub const MULTIANEWARRAY: u8 = 0xc5;
pub const TABLESWITCH: u8 = 0xaa;
pub const LOOKUPSWITCH: u8 = 0xab;
pub const IINC: u8 = 0x84;

/// Width of a constant pool index operand, which always starts right after the opcode
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConstantOperand {
    /// One byte (only `ldc`)
    Narrow,

    /// Two bytes
    Wide,
}

impl ConstantOperand {
    /// Constant pool operand of the instruction with this opcode, if any
    pub fn of(opcode: u8) -> Option<ConstantOperand> {
        match opcode {
            LDC => Some(ConstantOperand::Narrow),
            LDC_W | LDC2_W => Some(ConstantOperand::Wide),
            GETSTATIC..=INVOKEDYNAMIC => Some(ConstantOperand::Wide),
            NEW | ANEWARRAY | CHECKCAST | INSTANCEOF | MULTIANEWARRAY => {
                Some(ConstantOperand::Wide)
            }
            _ => None,
        }
    }
}

/// One instruction located inside a `code` array
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub opcode: u8,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BytecodeError {
    UnknownOpcode { opcode: u8, offset: usize },

    /// Instruction (or switch table) runs past the end of the code
    Truncated { offset: usize },

    /// `tableswitch` with `high < low`
    BadSwitchRange { offset: usize },
}

impl fmt::Display for BytecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BytecodeError::UnknownOpcode { opcode, offset } => {
                write!(f, "unknown opcode 0x{:02x} at offset {}", opcode, offset)
            }
            BytecodeError::Truncated { offset } => {
                write!(f, "instruction at offset {} is truncated", offset)
            }
            BytecodeError::BadSwitchRange { offset } => {
                write!(f, "tableswitch at offset {} has an invalid range", offset)
            }
        }
    }
}

impl std::error::Error for BytecodeError {}

/// Length in bytes of the instruction starting at `offset`
///
/// Switch padding depends on `offset` being relative to the start of the method's code.
pub fn instruction_length(code: &[u8], offset: usize) -> Result<usize, BytecodeError> {
    let opcode = *code.get(offset).ok_or(BytecodeError::Truncated { offset })?;
    let length = match opcode {
        0x00..=0x0f => 1,
        0x10 => 2,
        0x11 => 3,
        LDC => 2,
        LDC_W | LDC2_W => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        IINC => 3,
        0x85..=0x98 => 1,
        0x99..=0xa8 => 3,
        0xa9 => 2,
        TABLESWITCH => tableswitch_length(code, offset)?,
        LOOKUPSWITCH => lookupswitch_length(code, offset)?,
        0xac..=0xb1 => 1,
        GETSTATIC..=INVOKESTATIC => 3,
        INVOKEINTERFACE | INVOKEDYNAMIC => 5,
        NEW => 3,
        0xbc => 2,
        ANEWARRAY => 3,
        0xbe | 0xbf => 1,
        CHECKCAST | INSTANCEOF => 3,
        0xc2 | 0xc3 => 1,
        WIDE => match code.get(offset + 1) {
            Some(&IINC) => 6,
            Some(_) => 4,
            None => return Err(BytecodeError::Truncated { offset }),
        },
        MULTIANEWARRAY => 4,
        0xc6 | 0xc7 => 3,
        0xc8 | 0xc9 => 5,
        0xca | 0xfe | 0xff => 1,
        _ => return Err(BytecodeError::UnknownOpcode { opcode, offset }),
    };
    if offset + length > code.len() {
        return Err(BytecodeError::Truncated { offset });
    }
    Ok(length)
}

/// Bytes between the opcode of a switch and its 4-byte aligned operands
fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

fn read_i32(code: &[u8], at: usize, offset: usize) -> Result<i32, BytecodeError> {
    code.get(at..at + 4)
        .map(|bytes| i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .ok_or(BytecodeError::Truncated { offset })
}

fn tableswitch_length(code: &[u8], offset: usize) -> Result<usize, BytecodeError> {
    let padding = switch_padding(offset);
    let base = offset + 1 + padding;
    let low = read_i32(code, base + 4, offset)? as i64;
    let high = read_i32(code, base + 8, offset)? as i64;
    if high < low {
        return Err(BytecodeError::BadSwitchRange { offset });
    }
    Ok(1 + padding + 12 + (high - low + 1) as usize * 4)
}

fn lookupswitch_length(code: &[u8], offset: usize) -> Result<usize, BytecodeError> {
    let padding = switch_padding(offset);
    let base = offset + 1 + padding;
    let pairs = read_i32(code, base + 4, offset)?;
    if pairs < 0 {
        return Err(BytecodeError::Truncated { offset });
    }
    Ok(1 + padding + 8 + pairs as usize * 8)
}

/// Iterate over the instructions in a `code` array
///
/// Iteration stops after the first error.
pub fn instructions(code: &[u8]) -> Instructions<'_> {
    Instructions {
        code,
        offset: 0,
        failed: false,
    }
}

pub struct Instructions<'c> {
    code: &'c [u8],
    offset: usize,
    failed: bool,
}

impl<'c> Iterator for Instructions<'c> {
    type Item = Result<Instruction, BytecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.code.len() {
            return None;
        }
        let offset = self.offset;
        match instruction_length(self.code, offset) {
            Ok(length) => {
                self.offset += length;
                Some(Ok(Instruction {
                    offset,
                    opcode: self.code[offset],
                    length,
                }))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn simple_instructions() {
        // aload_0, iconst_1, bipush 7, invokevirtual #3, return
        let code = [0x2a, 0x04, 0x10, 0x07, 0xb6, 0x00, 0x03, 0xb1];
        let found: Vec<(usize, u8)> = instructions(&code)
            .map(|insn| insn.map(|insn| (insn.offset, insn.opcode)))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            found,
            vec![(0, 0x2a), (1, 0x04), (2, 0x10), (4, 0xb6), (7, 0xb1)]
        );
    }

    #[test]
    fn switch_padding_depends_on_offset() {
        // nop, tableswitch (2 bytes pad) default=0 low=1 high=2 + 2 targets, return
        let mut code = vec![0x00, TABLESWITCH, 0, 0];
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&2i32.to_be_bytes());
        code.extend_from_slice(&[0; 8]);
        code.push(0xb1);
        assert_eq!(instruction_length(&code, 1), Ok(1 + 2 + 12 + 8));

        // lookupswitch at offset 0 (3 bytes pad) with one pair
        let mut code = vec![LOOKUPSWITCH, 0, 0, 0];
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&1i32.to_be_bytes());
        code.extend_from_slice(&[0; 8]);
        assert_eq!(instruction_length(&code, 0), Ok(1 + 3 + 8 + 8));
    }

    #[test]
    fn wide_variants() {
        assert_eq!(instruction_length(&[WIDE, 0x15, 0x01, 0x00], 0), Ok(4));
        assert_eq!(
            instruction_length(&[WIDE, IINC, 0x01, 0x00, 0x00, 0x01], 0),
            Ok(6)
        );
    }

    #[test]
    fn errors() {
        assert_eq!(
            instruction_length(&[0xcb], 0),
            Err(BytecodeError::UnknownOpcode {
                opcode: 0xcb,
                offset: 0
            })
        );
        assert_eq!(
            instruction_length(&[GETSTATIC, 0x00], 0),
            Err(BytecodeError::Truncated { offset: 0 })
        );
        let results: Vec<_> = instructions(&[0x2a, 0xcb, 0xb1]).collect();
        assert_eq!(results.len(), 2);
        assert!(results[1].is_err());
    }

    #[test]
    fn constant_operands() {
        assert_eq!(ConstantOperand::of(LDC), Some(ConstantOperand::Narrow));
        assert_eq!(ConstantOperand::of(INVOKEDYNAMIC), Some(ConstantOperand::Wide));
        assert_eq!(ConstantOperand::of(MULTIANEWARRAY), Some(ConstantOperand::Wide));
        assert_eq!(ConstantOperand::of(0xbc), None);
        assert_eq!(ConstantOperand::of(0xb1), None);
    }
}
