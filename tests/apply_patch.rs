use classpatch::hex;
use classpatch::jvm::{
    bytecode, Attribute, ClassAccessFlags, ClassConstantIndex, ClassFile, Code, Constant,
    ConstantIndex, ConstantPool, ConstantPoolBuilder, HandleKind, Method, MethodAccessFlags,
    Utf8ConstantIndex, Version,
};
use classpatch::patch::{
    apply_patch, extract_method, FrameComputationError, MethodSelector, PatchError, PatchMode,
    PatchRequest, Settings,
};

fn utf8(index: u16) -> Utf8ConstantIndex {
    Utf8ConstantIndex(ConstantIndex(index))
}

fn code_attribute(code_name: u16, max_stack: u16, max_locals: u16, code: &[u8]) -> Attribute {
    let code = Code {
        max_stack,
        max_locals,
        code: code.to_vec(),
        exception_table: vec![],
        attributes: vec![],
    };
    Attribute {
        name_index: utf8(code_name),
        info: code.to_bytes().unwrap(),
    }
}

/// ```text
/// public class Target {
///     public void foo() { aload_0; return }
///     public static int bar(int) { iload_0; ireturn }
/// }
/// ```
///
/// Pool: `#1 Target`, `#2 Class #1`, `#3 java/lang/Object`, `#4 Class #3`, `#5 foo`, `#6 ()V`,
/// `#7 Code`, `#8 bar`, `#9 (I)I`
fn target_class() -> ClassFile {
    let mut constants = ConstantPool::new();
    let mut builder = ConstantPoolBuilder::new(&mut constants);
    let this = builder.get_utf8("Target").unwrap();
    builder.get_or_insert(Constant::Class(this)).unwrap();
    let object = builder.get_utf8("java/lang/Object").unwrap();
    builder.get_or_insert(Constant::Class(object)).unwrap();
    for text in ["foo", "()V", "Code", "bar", "(I)I"] {
        builder.get_utf8(text).unwrap();
    }

    ClassFile {
        version: Version::JAVA8,
        constants,
        access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        this_class: ClassConstantIndex(ConstantIndex(2)),
        super_class: ClassConstantIndex(ConstantIndex(4)),
        interfaces: vec![],
        fields: vec![],
        methods: vec![
            Method {
                access_flags: MethodAccessFlags::PUBLIC,
                name_index: utf8(5),
                descriptor_index: utf8(6),
                attributes: vec![code_attribute(7, 1, 1, &[0x2a, 0xb1])],
            },
            Method {
                access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
                name_index: utf8(8),
                descriptor_index: utf8(9),
                attributes: vec![code_attribute(7, 1, 1, &[0x1a, 0xac])],
            },
        ],
        attributes: vec![],
    }
}

fn method_hex(method: &Method) -> String {
    hex::encode(&method.to_bytes().unwrap())
}

fn code_of(class: &ClassFile, name: &str) -> (Method, Code) {
    let method = class
        .methods
        .iter()
        .find(|method| method.name(&class.constants) == Ok(name))
        .unwrap_or_else(|| panic!("no method {}", name))
        .clone();
    let position = method.code_attribute_position(&class.constants).unwrap();
    let code = Code::parse(&method.attributes[position].info).unwrap();
    (method, code)
}

/// Stack effect of the handful of opcodes used in these tests
fn stack_effect(opcode: u8) -> i32 {
    match opcode {
        0x04 | 0x1a | 0x2a | 0x12 => 1,
        0x57 | 0xac | 0xb0 => -1,
        _ => 0,
    }
}

/// Stand-in for a real frame recomputer: rejects straight-line code that overflows `max_stack`
fn checking_recomputer(bytes: Vec<u8>) -> Result<Vec<u8>, FrameComputationError> {
    let class = ClassFile::parse(&bytes).map_err(FrameComputationError::Malformed)?;
    for method in &class.methods {
        let name = method.name(&class.constants).unwrap_or("?").to_owned();
        let position = match method.code_attribute_position(&class.constants) {
            Some(position) => position,
            None => continue,
        };
        let code = Code::parse(&method.attributes[position].info)
            .map_err(FrameComputationError::Malformed)?;
        let mut depth = 0;
        for instruction in bytecode::instructions(&code.code) {
            let instruction = instruction.map_err(|err| FrameComputationError::Rejected {
                status: None,
                message: err.to_string(),
            })?;
            depth += stack_effect(instruction.opcode);
            if depth > code.max_stack as i32 {
                return Err(FrameComputationError::Rejected {
                    status: None,
                    message: format!("{}: stack overflows max_stack {}", name, code.max_stack),
                });
            }
        }
    }
    Ok(bytes)
}

fn request(target: &ClassFile, patched_hex: String, mode: PatchMode) -> PatchRequest {
    PatchRequest {
        target_class: target.to_bytes().unwrap(),
        patched_method_hex: patched_hex,
        mode,
    }
}

#[test]
fn class_files_round_trip_exactly() {
    let bytes = target_class().to_bytes().unwrap();
    assert_eq!(&bytes[..4], &[0xca, 0xfe, 0xba, 0xbe]);
    let parsed = ClassFile::parse(&bytes).unwrap();
    assert_eq!(parsed.to_bytes().unwrap(), bytes);
    assert_eq!(parsed.name(), Ok("Target"));
}

#[test]
fn direct_mode_with_the_original_bytes() {
    let target = target_class();
    let foo_hex = method_hex(&target.methods[0]);
    let outcome = apply_patch(
        &request(&target, foo_hex, PatchMode::Direct),
        &Settings::default(),
        &checking_recomputer,
    )
    .unwrap();

    assert_eq!(outcome.method.name, "foo");
    assert_eq!(outcome.method.descriptor, "()V");
    assert!(outcome.method.replaced_existing);

    let output = ClassFile::parse(&outcome.bytes).unwrap();
    assert_eq!(output.methods.len(), 2);
    let (method, code) = code_of(&output, "foo");
    assert_eq!(method.descriptor(&output.constants), Ok("()V"));
    assert_eq!(code.code, vec![0x2a, 0xb1]);
}

#[test]
fn differential_mode_inserts_an_instruction() {
    let target = target_class();
    let original_hex = method_hex(&target.methods[0]);

    // Machine-generated patch: wrong flags, drifted name/descriptor/attribute-name indices, and
    // one more instruction
    let patched = Method {
        access_flags: MethodAccessFlags::PRIVATE,
        name_index: utf8(0x41),
        descriptor_index: utf8(0x42),
        attributes: vec![code_attribute(0x43, 2, 1, &[0x2a, 0x04, 0xb1])],
    };

    let outcome = apply_patch(
        &request(
            &target,
            method_hex(&patched),
            PatchMode::Differential(original_hex),
        ),
        &Settings::default(),
        &checking_recomputer,
    )
    .unwrap();
    assert_eq!(outcome.method.name, "foo");
    assert!(outcome.method.replaced_existing);

    let output = ClassFile::parse(&outcome.bytes).unwrap();
    let (method, code) = code_of(&output, "foo");
    assert_eq!(code.code, vec![0x2a, 0x04, 0xb1]);
    assert_eq!(code.max_stack, 2);
    assert_eq!(method.access_flags, MethodAccessFlags::PUBLIC);
    assert_eq!(method.name_index, target.methods[0].name_index);
    assert_eq!(method.descriptor_index, target.methods[0].descriptor_index);

    // Nothing else moved
    assert_eq!(output.constants, target.constants);
    assert_eq!(output.methods[1], target.methods[1]);
}

#[test]
fn differential_mode_needs_the_original_method() {
    let target = target_class();
    let missing = Method {
        name_index: utf8(8),
        descriptor_index: utf8(6),
        ..target.methods[0].clone()
    };
    let result = apply_patch(
        &request(
            &target,
            method_hex(&target.methods[0]),
            PatchMode::Differential(method_hex(&missing)),
        ),
        &Settings::default(),
        &checking_recomputer,
    );
    match result {
        Err(PatchError::MethodNotFound { method }) => assert_eq!(method, "bar()V"),
        other => panic!("expected a missing method, got {:?}", other.map(|o| o.method)),
    }
}

#[test]
fn differential_mode_needs_a_resolvable_original() {
    let target = target_class();
    let unresolvable = Method {
        name_index: utf8(0x99),
        ..target.methods[0].clone()
    };
    let result = apply_patch(
        &request(
            &target,
            method_hex(&target.methods[0]),
            PatchMode::Differential(method_hex(&unresolvable)),
        ),
        &Settings::default(),
        &checking_recomputer,
    );
    let err = result.map(|o| o.method).unwrap_err();
    assert_eq!(err.kind(), "UnresolvableOriginalMethodError");
}

#[test]
fn reference_mode_adds_a_new_method() {
    let target = target_class();

    // Reference pool: `#1 Reference`, `#2 Class #1`, `#3 greet`, `#4 ()Ljava/lang/String;`,
    // `#5 Code`, `#6 hello`, `#7 String #6`
    let mut reference_pool = ConstantPool::new();
    let mut builder = ConstantPoolBuilder::new(&mut reference_pool);
    let this = builder.get_utf8("Reference").unwrap();
    builder.get_or_insert(Constant::Class(this)).unwrap();
    for text in ["greet", "()Ljava/lang/String;", "Code", "hello"] {
        builder.get_utf8(text).unwrap();
    }
    builder.get_or_insert(Constant::String(utf8(6))).unwrap();
    let reference = ClassFile {
        constants: reference_pool,
        this_class: ClassConstantIndex(ConstantIndex(2)),
        super_class: ClassConstantIndex(ConstantIndex(0)),
        methods: vec![],
        ..target_class()
    };

    let greet = Method {
        access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        name_index: utf8(3),
        descriptor_index: utf8(4),
        attributes: vec![code_attribute(5, 1, 0, &[0x12, 0x07, 0xb0])],
    };

    let outcome = apply_patch(
        &request(
            &target,
            method_hex(&greet),
            PatchMode::Reference(reference.to_bytes().unwrap()),
        ),
        &Settings::default(),
        &checking_recomputer,
    )
    .unwrap();
    assert!(!outcome.method.replaced_existing);
    assert_eq!(outcome.method.descriptor, "()Ljava/lang/String;");

    let output = ClassFile::parse(&outcome.bytes).unwrap();
    assert_eq!(output.methods.len(), 3);
    let (method, code) = code_of(&output, "greet");
    assert_eq!(
        method.descriptor(&output.constants),
        Ok("()Ljava/lang/String;")
    );
    assert_eq!(code.code[0], 0x12);
    match output.constants.get(ConstantIndex(code.code[1] as u16)).unwrap() {
        Constant::String(text) => assert_eq!(output.constants.resolve_utf8(*text), Ok("hello")),
        other => panic!("expected a string constant, got {:?}", other),
    }
}

#[test]
fn reference_mode_rejects_cyclic_constants() {
    let target = target_class();

    // Reference pool: `#1 MethodHandle invokestatic #1`, `#2 m`, `#3 ()V`, `#4 Code`
    let mut reference_pool = ConstantPool::new();
    let mut builder = ConstantPoolBuilder::new(&mut reference_pool);
    builder
        .get_or_insert(Constant::MethodHandle {
            handle_kind: HandleKind::InvokeStatic,
            member: ConstantIndex(1),
        })
        .unwrap();
    for text in ["m", "()V", "Code"] {
        builder.get_utf8(text).unwrap();
    }
    let reference = ClassFile {
        constants: reference_pool,
        methods: vec![],
        ..target_class()
    };

    // `static void m() { ldc #1; pop; return }`
    let m = Method {
        access_flags: MethodAccessFlags::STATIC,
        name_index: utf8(2),
        descriptor_index: utf8(3),
        attributes: vec![code_attribute(4, 1, 0, &[0x12, 0x01, 0x57, 0xb1])],
    };
    let result = apply_patch(
        &request(
            &target,
            method_hex(&m),
            PatchMode::Reference(reference.to_bytes().unwrap()),
        ),
        &Settings::default(),
        &checking_recomputer,
    );
    assert_eq!(result.map(|o| o.method).unwrap_err().kind(), "RemapError");
}

#[test]
fn frame_rejection_produces_no_output() {
    let target = target_class();
    // Pushes two values with max_stack 1
    let patched = Method {
        attributes: vec![code_attribute(7, 1, 1, &[0x2a, 0x04, 0x57, 0xb1])],
        ..target.methods[0].clone()
    };
    let result = apply_patch(
        &request(
            &target,
            method_hex(&patched),
            PatchMode::Differential(method_hex(&target.methods[0])),
        ),
        &Settings::default(),
        &checking_recomputer,
    );
    match result {
        Err(PatchError::FrameComputation(FrameComputationError::Rejected { message, .. })) => {
            assert!(message.contains("foo"))
        }
        other => panic!("expected rejected frames, got {:?}", other.map(|o| o.method)),
    }
}

#[test]
fn empty_output_is_a_failure() {
    let target = target_class();
    let empty = |_: Vec<u8>| -> Result<Vec<u8>, FrameComputationError> { Ok(vec![]) };
    let result = apply_patch(
        &request(&target, method_hex(&target.methods[0]), PatchMode::Direct),
        &Settings::default(),
        &empty,
    );
    assert!(matches!(result, Err(PatchError::EmptyOutput)));
}

#[test]
fn concrete_methods_need_code() {
    let target = target_class();
    let no_code = Method {
        attributes: vec![],
        ..target.methods[0].clone()
    };
    let result = apply_patch(
        &request(&target, method_hex(&no_code), PatchMode::Direct),
        &Settings::default(),
        &checking_recomputer,
    );
    assert!(matches!(
        result,
        Err(PatchError::MissingCodeAttribute { .. })
    ));

    // Abstract methods are fine without
    let abstract_method = Method {
        access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
        ..no_code
    };
    let outcome = apply_patch(
        &request(&target, method_hex(&abstract_method), PatchMode::Direct),
        &Settings::default(),
        &checking_recomputer,
    )
    .unwrap();
    let output = ClassFile::parse(&outcome.bytes).unwrap();
    assert_eq!(output.methods.last(), Some(&abstract_method));
}

#[test]
fn strict_hex_rejects_malformed_input() {
    let target = target_class();
    let mut hex_text = method_hex(&target.methods[0]);
    hex_text.replace_range(0..1, "g");

    let strict = Settings::new(hex::HexDecoding::Strict);
    let result = apply_patch(
        &request(&target, hex_text.clone(), PatchMode::Direct),
        &strict,
        &checking_recomputer,
    );
    assert_eq!(result.map(|o| o.method).unwrap_err().kind(), "InputDecodingError");

    // Lenient decoding zero-fills the pair, which happens to be the same flags byte
    let outcome = apply_patch(
        &request(&target, hex_text, PatchMode::Direct),
        &Settings::default(),
        &checking_recomputer,
    )
    .unwrap();
    assert_eq!(outcome.method.name, "foo");
}

#[test]
fn extracted_methods_feed_differential_mode() {
    let target = target_class();
    let by_index = extract_method(&target, &MethodSelector::Index(1)).unwrap();
    let by_signature = extract_method(
        &target,
        &MethodSelector::parse_signature("bar(I)I").unwrap(),
    )
    .unwrap();
    assert_eq!(by_index, by_signature);
    assert_eq!(by_index, target.methods[1].to_bytes().unwrap());

    assert!(matches!(
        extract_method(&target, &MethodSelector::Index(7)),
        Err(PatchError::MethodNotFound { .. })
    ));

    // Using the extracted method as both original and patch leaves the class untouched
    let original_hex = hex::encode(&by_index);
    let outcome = apply_patch(
        &request(
            &target,
            original_hex.clone(),
            PatchMode::Differential(original_hex),
        ),
        &Settings::default(),
        &checking_recomputer,
    )
    .unwrap();
    assert_eq!(outcome.bytes, target.to_bytes().unwrap());
}
