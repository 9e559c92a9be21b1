//! Copying a method from one class's constant pool numbering into another's
//!
//! Every constant the method refers to is copied (deeply) into the target pool, reusing entries
//! that already exist there. Instruction operands and attribute fields holding constant pool
//! indices are then rewritten in place. Instructions are never resized.

use super::method::{AttributeBody, CodeAttribute, MethodStructure, ParsedAttribute};
use crate::jvm::bytecode::{self, BytecodeError, ConstantOperand};
use crate::jvm::{
    self, Attribute, ClassConstantIndex, Constant, ConstantIndex, ConstantPool,
    ConstantPoolBuilder, ConstantPoolOverflow, Deserialize, ExceptionHandler,
    IndexResolutionError, IndexResolutionErrorKind, Method, NameAndTypeConstantIndex, Serialize,
    Utf8ConstantIndex,
};
use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;

#[derive(Debug)]
pub enum RemapError {
    /// Reference to a constant that doesn't exist (or has the wrong type) in the source pool
    Resolution(IndexResolutionError),

    /// Target pool ran out of indices
    PoolOverflow(ConstantPoolOverflow),

    /// An `ldc` would need an index above 255
    NarrowOperandOverflow { offset: usize, index: ConstantIndex },

    /// Instructions couldn't be walked
    Bytecode(BytecodeError),

    /// Attribute contents didn't match the layout expected for its name
    MalformedAttribute { name: String, error: jvm::Error },
}

impl fmt::Display for RemapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemapError::Resolution(err) => write!(f, "{}", err),
            RemapError::PoolOverflow(err) => write!(f, "{}", err),
            RemapError::NarrowOperandOverflow { offset, index } => write!(
                f,
                "ldc at offset {} would need constant #{}, which doesn't fit in one byte",
                offset, index.0
            ),
            RemapError::Bytecode(err) => write!(f, "{}", err),
            RemapError::MalformedAttribute { name, error } => {
                write!(f, "malformed {} attribute: {}", name, error)
            }
        }
    }
}

impl std::error::Error for RemapError {}

impl From<IndexResolutionError> for RemapError {
    fn from(err: IndexResolutionError) -> RemapError {
        RemapError::Resolution(err)
    }
}

impl From<ConstantPoolOverflow> for RemapError {
    fn from(err: ConstantPoolOverflow) -> RemapError {
        RemapError::PoolOverflow(err)
    }
}

impl From<BytecodeError> for RemapError {
    fn from(err: BytecodeError) -> RemapError {
        RemapError::Bytecode(err)
    }
}

/// Translates constant pool indices from a source pool into a target pool
pub struct Remapper<'s, 't> {
    source: &'s ConstantPool,
    target: ConstantPoolBuilder<'t>,

    /// Source indices already translated
    translated: HashMap<ConstantIndex, ConstantIndex>,
}

impl<'s, 't> Remapper<'s, 't> {
    pub fn new(source: &'s ConstantPool, target: &'t mut ConstantPool) -> Remapper<'s, 't> {
        Remapper {
            source,
            target: ConstantPoolBuilder::new(target),
            translated: HashMap::new(),
        }
    }

    /// Number of constants added to the target pool so far
    pub fn added(&self) -> usize {
        self.target.added()
    }

    /// Copy a method parsed against the source pool, producing one valid in the target pool
    pub fn copy_method(&mut self, method: &MethodStructure) -> Result<Method, RemapError> {
        let name_index = self.utf8(method.name_index)?;
        let descriptor_index = self.utf8(method.descriptor_index)?;

        let mut attributes = vec![];
        for attribute in &method.attributes {
            if let Some(attribute) = self.method_attribute(attribute)? {
                attributes.push(attribute);
            }
        }
        log::info!(
            "Copied method {}{} ({} constants added to target pool)",
            method.name,
            method.descriptor,
            self.added()
        );

        Ok(Method {
            access_flags: method.access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }

    /// Translate one constant (and everything it refers to)
    pub fn constant(&mut self, index: ConstantIndex) -> Result<ConstantIndex, RemapError> {
        if let Some(translated) = self.translated.get(&index) {
            return Ok(*translated);
        }
        let constant = self.source.get(index)?.clone();
        let copied = match constant {
            constant @ (Constant::Utf8(_)
            | Constant::Integer(_)
            | Constant::Float(_)
            | Constant::Long(_)
            | Constant::Double(_)) => constant,
            Constant::Class(name) => Constant::Class(self.utf8(name)?),
            Constant::String(text) => Constant::String(self.utf8(text)?),
            Constant::FieldRef {
                class,
                name_and_type,
            } => Constant::FieldRef {
                class: self.class(class)?,
                name_and_type: self.name_and_type(name_and_type)?,
            },
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => Constant::MethodRef {
                class: self.class(class)?,
                name_and_type: self.name_and_type(name_and_type)?,
                is_interface,
            },
            Constant::NameAndType { name, descriptor } => Constant::NameAndType {
                name: self.utf8(name)?,
                descriptor: self.utf8(descriptor)?,
            },
            Constant::MethodHandle {
                handle_kind,
                member,
            } => Constant::MethodHandle {
                handle_kind,
                member: self.member(member)?,
            },
            Constant::MethodType { descriptor } => Constant::MethodType {
                descriptor: self.utf8(descriptor)?,
            },
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                log::warn!(
                    "Keeping bootstrap method index {} of dynamic constant #{} as is",
                    bootstrap_method,
                    index.0
                );
                Constant::Dynamic {
                    bootstrap_method,
                    name_and_type: self.name_and_type(name_and_type)?,
                }
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => {
                log::warn!(
                    "Keeping bootstrap method index {} of invokedynamic constant #{} as is",
                    bootstrap_method,
                    index.0
                );
                Constant::InvokeDynamic {
                    bootstrap_method,
                    method_descriptor: self.name_and_type(method_descriptor)?,
                }
            }
            Constant::Module(name) => Constant::Module(self.utf8(name)?),
            Constant::Package(name) => Constant::Package(self.utf8(name)?),
        };
        let translated = self.target.get_or_insert(copied)?;
        self.translated.insert(index, translated);
        Ok(translated)
    }

    /// Translate an index where zero means "none"
    fn optional(&mut self, index: ConstantIndex) -> Result<ConstantIndex, RemapError> {
        if index.0 == 0 {
            Ok(index)
        } else {
            self.constant(index)
        }
    }

    fn utf8(&mut self, index: Utf8ConstantIndex) -> Result<Utf8ConstantIndex, RemapError> {
        self.source.resolve_utf8(index)?;
        Ok(Utf8ConstantIndex(self.constant(index.0)?))
    }

    fn class(&mut self, index: ClassConstantIndex) -> Result<ClassConstantIndex, RemapError> {
        self.source.resolve_class(index)?;
        Ok(ClassConstantIndex(self.constant(index.0)?))
    }

    fn name_and_type(
        &mut self,
        index: NameAndTypeConstantIndex,
    ) -> Result<NameAndTypeConstantIndex, RemapError> {
        self.source.resolve_name_and_type(index)?;
        Ok(NameAndTypeConstantIndex(self.constant(index.0)?))
    }

    /// Field or method behind a method handle
    fn member(&mut self, index: ConstantIndex) -> Result<ConstantIndex, RemapError> {
        match self.source.get(index)? {
            Constant::FieldRef { .. } | Constant::MethodRef { .. } => self.constant(index),
            other => Err(RemapError::Resolution(IndexResolutionError {
                index,
                kind: IndexResolutionErrorKind::WrongTag {
                    expected: "Fieldref or Methodref",
                    found: other.tag_name(),
                },
            })),
        }
    }

    fn method_attribute(
        &mut self,
        attribute: &ParsedAttribute,
    ) -> Result<Option<Attribute>, RemapError> {
        let info = match &attribute.body {
            AttributeBody::Code(code) => self.code(code)?,
            AttributeBody::Opaque(info) => match attribute.name.as_str() {
                "Deprecated" | "Synthetic" => info.clone(),
                name => match Layout::of_method_attribute(name) {
                    Some(layout) => self.rewrite(attribute, info, layout)?,
                    None => {
                        log::warn!("Dropping method attribute {} that can't be remapped", name);
                        return Ok(None);
                    }
                },
            },
        };
        self.finish_attribute(attribute, info).map(Some)
    }

    fn code_attribute(
        &mut self,
        attribute: &ParsedAttribute,
    ) -> Result<Option<Attribute>, RemapError> {
        let info = match &attribute.body {
            AttributeBody::Opaque(info) => match attribute.name.as_str() {
                "LineNumberTable" => info.clone(),
                name => match Layout::of_code_attribute(name) {
                    Some(layout) => self.rewrite(attribute, info, layout)?,
                    None => {
                        log::warn!("Dropping code attribute {} that can't be remapped", name);
                        return Ok(None);
                    }
                },
            },
            AttributeBody::Code(_) => {
                log::warn!("Dropping Code attribute nested inside Code");
                return Ok(None);
            }
        };
        self.finish_attribute(attribute, info).map(Some)
    }

    fn finish_attribute(
        &mut self,
        attribute: &ParsedAttribute,
        info: Vec<u8>,
    ) -> Result<Attribute, RemapError> {
        Ok(Attribute {
            name_index: self.target.get_utf8(&attribute.name)?,
            info,
        })
    }

    fn code(&mut self, code: &CodeAttribute) -> Result<Vec<u8>, RemapError> {
        let instructions = self.instructions(&code.code)?;

        let mut exception_table = Vec::with_capacity(code.exception_table.len());
        for handler in &code.exception_table {
            exception_table.push(ExceptionHandler {
                catch_type: ClassConstantIndex(self.optional(handler.catch_type.0)?),
                ..*handler
            });
        }

        let mut attributes = vec![];
        for attribute in &code.attributes {
            if let Some(attribute) = self.code_attribute(attribute)? {
                attributes.push(attribute);
            }
        }

        let code = jvm::Code {
            max_stack: code.max_stack,
            max_locals: code.max_locals,
            code: instructions,
            exception_table,
            attributes,
        };
        code.to_bytes().map_err(|error| RemapError::MalformedAttribute {
            name: jvm::CODE.to_owned(),
            error,
        })
    }

    /// Rewrite the constant pool operands of every instruction
    fn instructions(&mut self, code: &[u8]) -> Result<Vec<u8>, RemapError> {
        let mut rewritten = code.to_vec();
        for instruction in bytecode::instructions(code) {
            let instruction = instruction?;
            let operand = instruction.offset + 1;
            match ConstantOperand::of(instruction.opcode) {
                Some(ConstantOperand::Narrow) => {
                    let index = self.constant(ConstantIndex(code[operand] as u16))?;
                    if index.0 > u8::MAX as u16 {
                        return Err(RemapError::NarrowOperandOverflow {
                            offset: instruction.offset,
                            index,
                        });
                    }
                    rewritten[operand] = index.0 as u8;
                }
                Some(ConstantOperand::Wide) => {
                    let old = u16::from_be_bytes([code[operand], code[operand + 1]]);
                    let index = self.constant(ConstantIndex(old))?;
                    rewritten[operand..operand + 2].copy_from_slice(&index.0.to_be_bytes());
                }
                None => (),
            }
        }
        Ok(rewritten)
    }

    fn rewrite(
        &mut self,
        attribute: &ParsedAttribute,
        info: &[u8],
        layout: Layout,
    ) -> Result<Vec<u8>, RemapError> {
        let mut rewriter = AttributeRewriter {
            remapper: self,
            input: Cursor::new(info),
            output: Vec::with_capacity(info.len()),
        };
        rewriter.rewrite(layout).map_err(|err| match err {
            RemapError::MalformedAttribute { error, .. } => RemapError::MalformedAttribute {
                name: attribute.name.clone(),
                error,
            },
            other => other,
        })?;
        let remaining = info.len() - rewriter.input.position() as usize;
        if remaining > 0 {
            log::warn!(
                "{} attribute has {} unused trailing bytes",
                attribute.name,
                remaining
            );
        }
        Ok(rewriter.output)
    }
}

/// Attributes whose contents hold constant pool indices
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Layout {
    Exceptions,
    Signature,
    MethodParameters,
    Annotations,
    ParameterAnnotations,
    AnnotationDefault,
    StackMapTable,

    /// `LocalVariableTable` and `LocalVariableTypeTable`
    LocalVariables,
}

impl Layout {
    fn of_method_attribute(name: &str) -> Option<Layout> {
        match name {
            "Exceptions" => Some(Layout::Exceptions),
            "Signature" => Some(Layout::Signature),
            "MethodParameters" => Some(Layout::MethodParameters),
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                Some(Layout::Annotations)
            }
            "RuntimeVisibleParameterAnnotations" | "RuntimeInvisibleParameterAnnotations" => {
                Some(Layout::ParameterAnnotations)
            }
            "AnnotationDefault" => Some(Layout::AnnotationDefault),
            _ => None,
        }
    }

    fn of_code_attribute(name: &str) -> Option<Layout> {
        match name {
            "StackMapTable" => Some(Layout::StackMapTable),
            "LocalVariableTable" | "LocalVariableTypeTable" => Some(Layout::LocalVariables),
            _ => None,
        }
    }
}

/// Copies an attribute's contents field by field, translating the fields that are indices
struct AttributeRewriter<'r, 's, 't> {
    remapper: &'r mut Remapper<'s, 't>,
    input: Cursor<&'r [u8]>,
    output: Vec<u8>,
}

impl<'r, 's, 't> AttributeRewriter<'r, 's, 't> {
    fn rewrite(&mut self, layout: Layout) -> Result<(), RemapError> {
        match layout {
            Layout::Exceptions => self.exceptions(),
            Layout::Signature => self.constant(),
            Layout::MethodParameters => self.method_parameters(),
            Layout::Annotations => self.annotations(),
            Layout::ParameterAnnotations => self.parameter_annotations(),
            Layout::AnnotationDefault => self.element_value(),
            Layout::StackMapTable => self.stack_map(),
            Layout::LocalVariables => self.local_variables(),
        }
    }

    fn read<T: Deserialize>(&mut self) -> Result<T, RemapError> {
        T::deserialize(&mut self.input).map_err(|error| RemapError::MalformedAttribute {
            name: String::new(),
            error,
        })
    }

    fn write<T: Serialize>(&mut self, value: T) -> Result<(), RemapError> {
        value
            .serialize(&mut self.output)
            .map_err(|error| RemapError::MalformedAttribute {
                name: String::new(),
                error: jvm::Error::IoError(error),
            })
    }

    fn copy_u8(&mut self) -> Result<u8, RemapError> {
        let value: u8 = self.read()?;
        self.write(value)?;
        Ok(value)
    }

    fn copy_u16(&mut self) -> Result<u16, RemapError> {
        let value: u16 = self.read()?;
        self.write(value)?;
        Ok(value)
    }

    fn constant(&mut self) -> Result<(), RemapError> {
        let index: ConstantIndex = self.read()?;
        let translated = self.remapper.constant(index)?;
        self.write(translated)?;
        Ok(())
    }

    fn optional_constant(&mut self) -> Result<(), RemapError> {
        let index: ConstantIndex = self.read()?;
        let translated = self.remapper.optional(index)?;
        self.write(translated)?;
        Ok(())
    }

    fn exceptions(&mut self) -> Result<(), RemapError> {
        for _ in 0..self.copy_u16()? {
            self.constant()?;
        }
        Ok(())
    }

    fn method_parameters(&mut self) -> Result<(), RemapError> {
        for _ in 0..self.copy_u8()? {
            self.optional_constant()?;
            self.copy_u16()?;
        }
        Ok(())
    }

    fn annotations(&mut self) -> Result<(), RemapError> {
        for _ in 0..self.copy_u16()? {
            self.annotation()?;
        }
        Ok(())
    }

    fn parameter_annotations(&mut self) -> Result<(), RemapError> {
        for _ in 0..self.copy_u8()? {
            self.annotations()?;
        }
        Ok(())
    }

    fn annotation(&mut self) -> Result<(), RemapError> {
        // type_index, then (element_name_index, element_value) pairs
        self.constant()?;
        for _ in 0..self.copy_u16()? {
            self.constant()?;
            self.element_value()?;
        }
        Ok(())
    }

    fn element_value(&mut self) -> Result<(), RemapError> {
        match self.copy_u8()? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => self.constant(),
            b'e' => {
                self.constant()?;
                self.constant()
            }
            b'@' => self.annotation(),
            b'[' => {
                for _ in 0..self.copy_u16()? {
                    self.element_value()?;
                }
                Ok(())
            }
            tag => Err(self.malformed(format!("unknown element value tag {:?}", tag as char))),
        }
    }

    fn local_variables(&mut self) -> Result<(), RemapError> {
        for _ in 0..self.copy_u16()? {
            self.copy_u16()?; // start_pc
            self.copy_u16()?; // length
            self.constant()?; // name
            self.constant()?; // descriptor or signature
            self.copy_u16()?; // slot
        }
        Ok(())
    }

    fn stack_map(&mut self) -> Result<(), RemapError> {
        for _ in 0..self.copy_u16()? {
            let frame_type = self.copy_u8()?;
            match frame_type {
                0..=63 => (),
                64..=127 => self.verification_type()?,
                247 => {
                    self.copy_u16()?;
                    self.verification_type()?;
                }
                248..=251 => {
                    self.copy_u16()?;
                }
                252..=254 => {
                    self.copy_u16()?;
                    for _ in 0..(frame_type - 251) {
                        self.verification_type()?;
                    }
                }
                255 => {
                    self.copy_u16()?;
                    for _ in 0..self.copy_u16()? {
                        self.verification_type()?;
                    }
                    for _ in 0..self.copy_u16()? {
                        self.verification_type()?;
                    }
                }
                reserved => {
                    return Err(self.malformed(format!("reserved frame type {}", reserved)))
                }
            }
        }
        Ok(())
    }

    fn verification_type(&mut self) -> Result<(), RemapError> {
        match self.copy_u8()? {
            0..=6 => Ok(()),
            // Object
            7 => self.constant(),
            // Uninitialized (holds an offset, not an index)
            8 => self.copy_u16().map(|_| ()),
            tag => Err(self.malformed(format!("unknown verification type {}", tag))),
        }
    }

    fn malformed(&self, message: String) -> RemapError {
        RemapError::MalformedAttribute {
            name: String::new(),
            error: jvm::Error::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                message,
            )),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::patch::method::Strictness;

    /// `#1 = "greet"`, `#2 = "()Ljava/lang/String;"`, `#3 = "Code"`, `#4 = "hello"`,
    /// `#5 = String #4`, `#6 = "Deprecated"`, `#7 = "Custom"`
    fn source_pool() -> ConstantPool {
        let mut pool = ConstantPool::new();
        let mut builder = ConstantPoolBuilder::new(&mut pool);
        for text in ["greet", "()Ljava/lang/String;", "Code", "hello"] {
            builder.get_utf8(text).unwrap();
        }
        builder
            .get_or_insert(Constant::String(Utf8ConstantIndex(ConstantIndex(4))))
            .unwrap();
        builder.get_utf8("Deprecated").unwrap();
        builder.get_utf8("Custom").unwrap();
        pool
    }

    /// `greet()Ljava/lang/String; { ldc #5; areturn }`, plus `Deprecated` and `Custom` attributes
    fn method_bytes(ldc: &[u8]) -> Vec<u8> {
        let mut code = ldc.to_vec();
        code.push(0xb0);
        let mut info = vec![0x00, 0x01, 0x00, 0x01];
        info.extend_from_slice(&(code.len() as u32).to_be_bytes());
        info.extend_from_slice(&code);
        info.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        let mut bytes = vec![0x00, 0x09, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03];
        bytes.extend_from_slice(&[0x00, 0x03]);
        bytes.extend_from_slice(&(info.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&info);
        bytes.extend_from_slice(&[0x00, 0x06, 0x00, 0x00, 0x00, 0x00]);
        bytes.extend_from_slice(&[0x00, 0x07, 0x00, 0x00, 0x00, 0x01, 0x2a]);
        bytes
    }

    fn remap(target: &mut ConstantPool, ldc: &[u8]) -> Result<Method, RemapError> {
        let source = source_pool();
        let method = MethodStructure::parse(&method_bytes(ldc), &source, Strictness::Lenient)
            .expect("method parses");
        Remapper::new(&source, target).copy_method(&method)
    }

    #[test]
    fn copies_constants_into_target() {
        let mut target = ConstantPool::new();
        let mut builder = ConstantPoolBuilder::new(&mut target);
        builder.get_utf8("Code").unwrap();
        builder.get_or_insert(Constant::Integer(42)).unwrap();

        let method = remap(&mut target, &[0x12, 0x05]).unwrap();
        assert_eq!(target.resolve_utf8(method.name_index), Ok("greet"));
        assert_eq!(
            target.resolve_utf8(method.descriptor_index),
            Ok("()Ljava/lang/String;")
        );

        // Custom is dropped, Code and Deprecated survive
        assert_eq!(method.attributes.len(), 2);
        assert_eq!(method.attributes[0].name_index, Utf8ConstantIndex(ConstantIndex(1)));
        assert!(method.attributes[1].is_named(&target, "Deprecated"));

        let code = jvm::Code::parse(&method.attributes[0].info).unwrap();
        assert_eq!(code.code[0], 0x12);
        match target.get(ConstantIndex(code.code[1] as u16)).unwrap() {
            Constant::String(text) => assert_eq!(target.resolve_utf8(*text), Ok("hello")),
            other => panic!("expected a string constant, got {:?}", other),
        }
        assert_eq!(code.code[2], 0xb0);
    }

    #[test]
    fn existing_constants_are_reused() {
        let mut target = source_pool();
        let before = target.clone();
        let method = remap(&mut target, &[0x13, 0x00, 0x05]).unwrap();
        assert_eq!(target, before);
        let code = jvm::Code::parse(&method.attributes[0].info).unwrap();
        assert_eq!(code.code, vec![0x13, 0x00, 0x05, 0xb0]);
    }

    #[test]
    fn ldc_operand_must_stay_narrow() {
        let mut target = ConstantPool::new();
        let mut builder = ConstantPoolBuilder::new(&mut target);
        for value in 0..300 {
            builder.get_or_insert(Constant::Integer(value)).unwrap();
        }
        match remap(&mut target, &[0x12, 0x05]) {
            Err(RemapError::NarrowOperandOverflow { offset, index }) => {
                assert_eq!(offset, 0);
                assert!(index.0 > 255);
            }
            other => panic!("expected narrow operand overflow, got {:?}", other),
        }
    }

    #[test]
    fn dangling_references_fail() {
        let mut target = ConstantPool::new();
        match remap(&mut target, &[0x13, 0x00, 0x63]) {
            Err(RemapError::Resolution(err)) => assert_eq!(err.index, ConstantIndex(0x63)),
            other => panic!("expected a resolution failure, got {:?}", other),
        }
    }

    #[test]
    fn stack_map_object_types_are_remapped() {
        let mut source = ConstantPool::new();
        let mut builder = ConstantPoolBuilder::new(&mut source);
        let name = builder.get_utf8("java/lang/Object").unwrap();
        let class = builder.get_or_insert(Constant::Class(name)).unwrap();
        builder.get_utf8("StackMapTable").unwrap();

        let attribute = ParsedAttribute {
            name_index: Utf8ConstantIndex(ConstantIndex(3)),
            name: "StackMapTable".to_owned(),
            raw_length: 12,
            // one full frame at offset 4 with one Object local and nothing on the stack
            body: AttributeBody::Opaque(vec![0, 1, 255, 0, 4, 0, 1, 7, 0, class.0 as u8, 0, 0]),
        };

        let mut target = ConstantPool::new();
        ConstantPoolBuilder::new(&mut target)
            .get_utf8("padding")
            .unwrap();
        let remapped = Remapper::new(&source, &mut target)
            .code_attribute(&attribute)
            .unwrap()
            .unwrap();
        let object = u16::from_be_bytes([remapped.info[8], remapped.info[9]]);
        assert_eq!(target.resolve_class(ConstantIndex(object)), Ok("java/lang/Object"));
        assert_eq!(&remapped.info[..8], &[0, 1, 255, 0, 4, 0, 1, 7]);
    }

    #[test]
    fn cyclic_references_fail() {
        // `#1 = MethodHandle invokestatic #1`, `#2 = "Owner"`, `#3 = Class #2`,
        // `#4 = Fieldref #3.#4`
        let mut source = ConstantPool::new();
        let mut builder = ConstantPoolBuilder::new(&mut source);
        builder
            .get_or_insert(Constant::MethodHandle {
                handle_kind: jvm::HandleKind::InvokeStatic,
                member: ConstantIndex(1),
            })
            .unwrap();
        let owner = builder.get_utf8("Owner").unwrap();
        let class = builder.get_or_insert(Constant::Class(owner)).unwrap();
        builder
            .get_or_insert(Constant::FieldRef {
                class: ClassConstantIndex(class),
                name_and_type: NameAndTypeConstantIndex(ConstantIndex(4)),
            })
            .unwrap();

        let mut target = ConstantPool::new();
        let mut remapper = Remapper::new(&source, &mut target);
        match remapper.constant(ConstantIndex(1)) {
            Err(RemapError::Resolution(err)) => assert_eq!(
                err.kind,
                IndexResolutionErrorKind::WrongTag {
                    expected: "Fieldref or Methodref",
                    found: "MethodHandle"
                }
            ),
            other => panic!("expected a resolution failure, got {:?}", other),
        }
        match remapper.constant(ConstantIndex(4)) {
            Err(RemapError::Resolution(err)) => assert_eq!(
                err.kind,
                IndexResolutionErrorKind::WrongTag {
                    expected: "NameAndType",
                    found: "Fieldref"
                }
            ),
            other => panic!("expected a resolution failure, got {:?}", other),
        }
    }
}
