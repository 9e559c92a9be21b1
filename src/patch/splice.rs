//! Removing, adding, and surgically editing methods of a class

use super::method::{AttributeBody, MethodStructure};
use super::PatchError;
use crate::jvm::{ClassFile, ConstantPool, Method};

/// Methods with special names are matched differently
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MethodKind {
    /// `<init>`, matched by descriptor
    Constructor,

    /// `<clinit>`, matched by name alone (there is at most one)
    ClassInitializer,

    /// Matched by name and descriptor
    Method,
}

impl MethodKind {
    pub const CONSTRUCTOR_NAME: &'static str = "<init>";
    pub const CLASS_INITIALIZER_NAME: &'static str = "<clinit>";

    pub fn of(name: &str) -> MethodKind {
        match name {
            MethodKind::CONSTRUCTOR_NAME => MethodKind::Constructor,
            MethodKind::CLASS_INITIALIZER_NAME => MethodKind::ClassInitializer,
            _ => MethodKind::Method,
        }
    }
}

/// Position of the method in `class.methods`
///
/// Methods whose name or descriptor don't resolve never match.
pub fn find_method(class: &ClassFile, name: &str, descriptor: &str) -> Option<usize> {
    let pool = &class.constants;
    let kind = MethodKind::of(name);
    class.methods.iter().position(|method| {
        let found_name = match method.name(pool) {
            Ok(found) => found,
            Err(_) => return false,
        };
        let same_descriptor = || method.descriptor(pool).map_or(false, |d| d == descriptor);
        match kind {
            MethodKind::Constructor => found_name == name && same_descriptor(),
            MethodKind::ClassInitializer => found_name == name,
            MethodKind::Method => found_name == name && same_descriptor(),
        }
    })
}

/// Remove a method, returning it
///
/// Not finding the method isn't an error: it means the patch introduces a new method.
pub fn remove_method(class: &mut ClassFile, name: &str, descriptor: &str) -> Option<Method> {
    match find_method(class, name, descriptor) {
        Some(position) => {
            log::info!("Removing existing method {}{}", name, descriptor);
            Some(class.methods.remove(position))
        }
        None => {
            log::info!("No existing method {}{} (new method?)", name, descriptor);
            None
        }
    }
}

/// Swap only the `Code` attribute of `target` for the one in `patch`
///
/// Flags, name, descriptor, and every other attribute of `target` are left as they are. The
/// patch's `Code` attribute name was resolved against the same pool as `target`, so its name index
/// is reused as is.
pub fn replace_code_only(
    target: &mut Method,
    pool: &ConstantPool,
    patch: &MethodStructure,
) -> Result<(), PatchError> {
    let attribute = patch
        .code_attribute()
        .ok_or_else(|| PatchError::MissingCodeAttribute {
            method: format!("{}{}", patch.name, patch.descriptor),
        })?;
    if let AttributeBody::Code(body) = &attribute.body {
        log::info!(
            "Replacing code ({} bytes, max stack {}, max locals {})",
            body.code.len(),
            body.max_stack,
            body.max_locals
        );
    }
    let code = attribute.to_attribute()?;

    match target.code_attribute_position(pool) {
        Some(position) => target.attributes[position] = code,
        None => {
            log::warn!("Target method had no Code attribute, adding one");
            target.attributes.push(code);
        }
    }
    Ok(())
}

/// Remove any method with the same signature, then append `method`
///
/// Returns whether a method was replaced.
pub fn add_or_replace(class: &mut ClassFile, name: &str, descriptor: &str, method: Method) -> bool {
    let replaced = remove_method(class, name, descriptor).is_some();
    class.methods.push(method);
    replaced
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{
        Attribute, ClassAccessFlags, ClassConstantIndex, ConstantIndex, ConstantPoolBuilder,
        MethodAccessFlags, Utf8ConstantIndex, Version,
    };
    use crate::patch::method::Strictness;

    fn utf8(index: u16) -> Utf8ConstantIndex {
        Utf8ConstantIndex(ConstantIndex(index))
    }

    /// `#1 <init>`, `#2 ()V`, `#3 (I)V`, `#4 <clinit>`, `#5 foo`, `#6 Code`, `#7 Signature`
    fn class() -> ClassFile {
        let mut constants = ConstantPool::new();
        let mut builder = ConstantPoolBuilder::new(&mut constants);
        for text in ["<init>", "()V", "(I)V", "<clinit>", "foo", "Code", "Signature"] {
            builder.get_utf8(text).unwrap();
        }
        let method = |name, descriptor, attributes| Method {
            access_flags: MethodAccessFlags::PUBLIC,
            name_index: utf8(name),
            descriptor_index: utf8(descriptor),
            attributes,
        };
        let code = Attribute {
            name_index: utf8(6),
            info: vec![0, 1, 0, 1, 0, 0, 0, 1, 0xb1, 0, 0, 0, 0],
        };
        let signature = Attribute {
            name_index: utf8(7),
            info: vec![0, 2],
        };
        ClassFile {
            version: Version::JAVA8,
            constants,
            access_flags: ClassAccessFlags::PUBLIC,
            this_class: ClassConstantIndex(ConstantIndex(0)),
            super_class: ClassConstantIndex(ConstantIndex(0)),
            interfaces: vec![],
            fields: vec![],
            methods: vec![
                method(1, 2, vec![code.clone()]),
                method(1, 3, vec![code.clone()]),
                method(4, 2, vec![code.clone()]),
                method(5, 3, vec![signature, code]),
            ],
            attributes: vec![],
        }
    }

    #[test]
    fn constructors_match_by_descriptor() {
        let class = class();
        assert_eq!(find_method(&class, "<init>", "()V"), Some(0));
        assert_eq!(find_method(&class, "<init>", "(I)V"), Some(1));
        assert_eq!(find_method(&class, "<init>", "(J)V"), None);
    }

    #[test]
    fn class_initializer_matches_by_name() {
        let class = class();
        assert_eq!(find_method(&class, "<clinit>", "(I)V"), Some(2));
    }

    #[test]
    fn methods_match_by_name_and_descriptor() {
        let mut class = class();
        assert_eq!(find_method(&class, "foo", "(I)V"), Some(3));
        assert_eq!(find_method(&class, "foo", "()V"), None);
        assert!(remove_method(&mut class, "foo", "()V").is_none());
        assert_eq!(class.methods.len(), 4);
        assert!(remove_method(&mut class, "foo", "(I)V").is_some());
        assert_eq!(class.methods.len(), 3);
    }

    #[test]
    fn add_or_replace_swaps_the_whole_method() {
        let mut class = class();
        let replacement = Method {
            access_flags: MethodAccessFlags::PRIVATE,
            name_index: utf8(5),
            descriptor_index: utf8(3),
            attributes: vec![],
        };
        assert!(add_or_replace(&mut class, "foo", "(I)V", replacement.clone()));
        assert_eq!(class.methods.len(), 4);
        assert_eq!(class.methods[3], replacement);

        let new_method = Method {
            descriptor_index: utf8(2),
            ..replacement
        };
        assert!(!add_or_replace(&mut class, "foo", "()V", new_method));
        assert_eq!(class.methods.len(), 5);
    }

    #[test]
    fn replace_code_only_keeps_metadata() {
        let mut class = class();
        let patch_bytes = vec![
            0x00, 0x0a, 0x00, 0x09, 0x00, 0x09, 0x00, 0x01, // junk flags and names
            0x00, 0x06, 0x00, 0x00, 0x00, 0x0e, // Code
            0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x04, 0xb1, 0x00, 0x00, 0x00, 0x00,
        ];
        let patch =
            MethodStructure::parse(&patch_bytes, &class.constants, Strictness::Lenient).unwrap();

        let before = class.methods[3].clone();
        replace_code_only(&mut class.methods[3], &class.constants, &patch).unwrap();
        let after = &class.methods[3];

        assert_eq!(after.access_flags, before.access_flags);
        assert_eq!(after.name_index, before.name_index);
        assert_eq!(after.descriptor_index, before.descriptor_index);
        assert_eq!(after.attributes[0], before.attributes[0]);
        assert_eq!(after.attributes[1].info, patch_bytes[14..].to_vec());
    }

    #[test]
    fn replace_code_only_needs_code() {
        let mut class = class();
        let patch_bytes = vec![0x00, 0x01, 0x00, 0x05, 0x00, 0x03, 0x00, 0x00];
        let patch =
            MethodStructure::parse(&patch_bytes, &class.constants, Strictness::Lenient).unwrap();
        match replace_code_only(&mut class.methods[3], &class.constants, &patch) {
            Err(PatchError::MissingCodeAttribute { method }) => assert_eq!(method, "foo(I)V"),
            other => panic!("expected missing code, got {:?}", other),
        }
    }
}
