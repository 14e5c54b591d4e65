mod common;

use common::*;
use retroclass::backport::{convert_all, ApiConverter, InstructionSite, MethodInvocation, MethodReplacement, ReplacementTable};
use retroclass::classfile::attribute::*;
use retroclass::classfile::flag::access_flags::*;
use retroclass::classfile::opcodes::*;
use retroclass::classfile::verify::verify;
use retroclass::classfile::{read_class, ClassFile, ClassFormatError, ClassfileWritable, Constant};

fn threeten() -> ReplacementTable {
    ReplacementTable::threeten_backport().unwrap()
}

/// Convert with both listeners attached; returns (changed, class events, instruction sites)
fn convert_counting(table: &ReplacementTable, class: &mut ClassFile) -> (bool, usize, Vec<InstructionSite>) {
    let mut modified = 0;
    let mut sites = Vec::new();
    let mut on_class = |_: &ClassFile| modified += 1;
    let mut on_instruction = |_: &ClassFile, site: &InstructionSite| sites.push(*site);
    let changed = ApiConverter::new(table)
        .with_class_listener(&mut on_class)
        .with_instruction_listener(&mut on_instruction)
        .convert(class)
        .unwrap();
    (changed, modified, sites)
}

fn utf8(class: &ClassFile, index: u16) -> &str {
    class.constant_pool.utf8(index).unwrap()
}

#[test]
fn untouched_class_fires_no_callbacks() {
    let mut class = class_named("demo/Plain");
    add_field(&mut class, ACC_PRIVATE, "name", "Ljava/lang/String;");
    add_method(&mut class, ACC_PUBLIC, "run", "()V", Some(vec![RETURN]));
    let before = class.clone();

    let (changed, modified, sites) = convert_counting(&threeten(), &mut class);
    assert!(!changed);
    assert_eq!(modified, 0);
    assert!(sites.is_empty());
    assert_eq!(class, before);
}

#[test]
fn class_modified_fires_once_for_many_changes() {
    let mut class = class_named("demo/Schedule");
    add_field(&mut class, ACC_PRIVATE, "start", "Ljava/time/LocalDate;");
    add_field(&mut class, ACC_PRIVATE, "end", "Ljava/time/LocalDate;");
    add_method(&mut class, ACC_PUBLIC, "zone", "()Ljava/time/ZoneId;", None);

    let (changed, modified, sites) = convert_counting(&threeten(), &mut class);
    assert!(changed);
    assert_eq!(modified, 1);
    assert!(sites.is_empty());
    assert_eq!(utf8(&class, class.fields[0].descriptor_index), "Lorg/threeten/bp/LocalDate;");
    assert_eq!(class.fields[0].descriptor_index, class.fields[1].descriptor_index);
    assert_eq!(utf8(&class, class.methods[0].descriptor_index), "()Lorg/threeten/bp/ZoneId;");
    verify(&class).unwrap();
}

#[test]
fn one_callback_per_affected_instruction() {
    let mut class = class_named("demo/Clock");
    let now = class
        .constant_pool
        .add_method_ref("java/time/Instant", "now", "()Ljava/time/Instant;")
        .unwrap();
    let to_string = class
        .constant_pool
        .add_method_ref("java/lang/Object", "toString", "()Ljava/lang/String;")
        .unwrap();
    let instant_class = class.constant_pool.find_or_add_class("java/time/Instant").unwrap();
    let [n0, n1] = u2(now);
    let [t0, t1] = u2(to_string);
    let [c0, c1] = u2(instant_class);
    let code = vec![
        INVOKESTATIC, n0, n1, // 0
        CHECKCAST, c0, c1, // 3
        INVOKEVIRTUAL, t0, t1, // 6
        INVOKESTATIC, n0, n1, // 9
        ARETURN, // 12
    ];
    add_method(&mut class, ACC_PUBLIC | ACC_STATIC, "stamp", "()Ljava/lang/String;", Some(code));

    let (changed, modified, sites) = convert_counting(&threeten(), &mut class);
    assert!(changed);
    assert_eq!(modified, 1);
    let offsets: Vec<usize> = sites.iter().map(|s| s.offset).collect();
    assert_eq!(offsets, vec![0, 3, 9]);
    assert_eq!(sites[1].opcode, CHECKCAST);
    assert_eq!(sites[1].constant_index, instant_class);
    assert_eq!(class.constant_pool.class_name(instant_class).unwrap(), "org/threeten/bp/Instant");
}

#[test]
fn failure_leaves_the_class_untouched() {
    let mut class = class_named("demo/Broken");
    add_field(&mut class, ACC_PRIVATE, "when", "Ljava/time/Instant;");
    // Rewritten before the bad signature is reached
    add_method(&mut class, ACC_PUBLIC, "bad", "()Ljava/time/Instant;", None);
    let signature = class.constant_pool.add_utf8("Ljava/util/List<").unwrap();
    let attr = attribute(&mut class, "Signature", AttributeInfo::Signature(SignatureAttribute { signature_index: signature }));
    class.methods[0].attributes.push(attr);
    let before = class.clone();

    let mut modified = 0;
    let mut on_class = |_: &ClassFile| modified += 1;
    let result = ApiConverter::new(&threeten()).with_class_listener(&mut on_class).convert(&mut class);
    assert!(matches!(result, Err(retroclass::Error::MalformedDescriptor { .. })));
    assert_eq!(modified, 0);
    assert_eq!(class, before);
}

#[test]
fn annotations_signatures_and_local_variables_are_rewritten() {
    let mut class = class_named("demo/Annotated");
    let table = threeten();

    // @Zoned(value = ZoneId.class, unit = ChronoUnit.DAYS, nested = @Zoned, all = {Instant.class})
    let pool = &mut class.constant_pool;
    let zoned = pool.add_utf8("Ljava/time/Zoned;").unwrap();
    let value = pool.add_utf8("value").unwrap();
    let class_value = pool.add_utf8("Ljava/time/ZoneId;").unwrap();
    let unit_type = pool.add_utf8("Ljava/time/temporal/ChronoUnit;").unwrap();
    let days = pool.add_utf8("DAYS").unwrap();
    let instant = pool.add_utf8("Ljava/time/Instant;").unwrap();
    let void = pool.add_utf8("V").unwrap();
    let annotation = Annotation {
        type_index: zoned,
        elements: vec![
            ElementValuePair { name_index: value, value: ElementValue::Class { class_info_index: class_value } },
            ElementValuePair {
                name_index: value,
                value: ElementValue::Enum { type_name_index: unit_type, const_name_index: days },
            },
            ElementValuePair {
                name_index: value,
                value: ElementValue::Annotation(Annotation { type_index: zoned, elements: vec![] }),
            },
            ElementValuePair {
                name_index: value,
                value: ElementValue::Array(vec![
                    ElementValue::Class { class_info_index: instant },
                    ElementValue::Class { class_info_index: void },
                ]),
            },
        ],
    };
    let class_annotations = attribute(
        &mut class,
        "RuntimeVisibleAnnotations",
        AttributeInfo::RuntimeVisibleAnnotations(AnnotationsAttribute { annotations: vec![annotation.clone()] }),
    );
    class.attributes.push(class_annotations);
    let class_signature = class
        .constant_pool
        .add_utf8("Ljava/lang/Object;Ljava/lang/Comparable<Ljava/time/Instant;>;")
        .unwrap();
    let attr = attribute(&mut class, "Signature", AttributeInfo::Signature(SignatureAttribute { signature_index: class_signature }));
    class.attributes.push(attr);

    let method = add_method(&mut class, ACC_PUBLIC, "apply", "(Ljava/lang/Object;)V", Some(vec![RETURN]));
    let parameter_annotations = attribute(
        &mut class,
        "RuntimeInvisibleParameterAnnotations",
        AttributeInfo::RuntimeInvisibleParameterAnnotations(ParameterAnnotationsAttribute {
            parameters: vec![vec![annotation.clone()]],
        }),
    );
    class.methods[method].attributes.push(parameter_annotations);
    let default = attribute(
        &mut class,
        "AnnotationDefault",
        AttributeInfo::AnnotationDefault(ElementValue::Class { class_info_index: class_value }),
    );
    class.methods[method].attributes.push(default);

    let local_name = class.constant_pool.add_utf8("when").unwrap();
    let local_signature = class.constant_pool.add_utf8("Ljava/util/List<Ljava/time/Instant;>;").unwrap();
    let lvt = attribute(
        &mut class,
        "LocalVariableTable",
        AttributeInfo::LocalVariableTable(LocalVariableTableAttribute {
            entries: vec![LocalVariableEntry { start_pc: 0, length: 1, name_index: local_name, descriptor_index: instant, index: 1 }],
        }),
    );
    let lvtt = attribute(
        &mut class,
        "LocalVariableTypeTable",
        AttributeInfo::LocalVariableTypeTable(LocalVariableTypeTableAttribute {
            entries: vec![LocalVariableTypeEntry {
                start_pc: 0,
                length: 1,
                name_index: local_name,
                signature_index: local_signature,
                index: 1,
            }],
        }),
    );
    let code = class.methods[method].code_mut().unwrap();
    code.attributes.push(lvt);
    code.attributes.push(lvtt);

    assert!(ApiConverter::new(&table).convert(&mut class).unwrap());
    verify(&class).unwrap();

    let AttributeInfo::RuntimeVisibleAnnotations(annotations) = &class.attributes[0].info else {
        panic!("annotations moved");
    };
    let converted = &annotations.annotations[0];
    assert_eq!(utf8(&class, converted.type_index), "Lorg/threeten/bp/Zoned;");
    let ElementValue::Class { class_info_index } = converted.elements[0].value else { panic!() };
    assert_eq!(utf8(&class, class_info_index), "Lorg/threeten/bp/ZoneId;");
    let ElementValue::Enum { type_name_index, const_name_index } = converted.elements[1].value else { panic!() };
    assert_eq!(utf8(&class, type_name_index), "Lorg/threeten/bp/temporal/ChronoUnit;");
    assert_eq!(const_name_index, days);
    let ElementValue::Annotation(nested) = &converted.elements[2].value else { panic!() };
    assert_eq!(utf8(&class, nested.type_index), "Lorg/threeten/bp/Zoned;");
    let ElementValue::Array(values) = &converted.elements[3].value else { panic!() };
    assert_eq!(values[1], ElementValue::Class { class_info_index: void });

    let AttributeInfo::Signature(signature) = &class.attributes[1].info else { panic!() };
    assert_eq!(
        utf8(&class, signature.signature_index),
        "Ljava/lang/Object;Ljava/lang/Comparable<Lorg/threeten/bp/Instant;>;"
    );

    let method = &class.methods[method];
    let AttributeInfo::RuntimeInvisibleParameterAnnotations(parameters) = &method.attributes[1].info else {
        panic!()
    };
    assert_eq!(utf8(&class, parameters.parameters[0][0].type_index), "Lorg/threeten/bp/Zoned;");
    let AttributeInfo::AnnotationDefault(ElementValue::Class { class_info_index }) = method.attributes[2].info else {
        panic!()
    };
    assert_eq!(utf8(&class, class_info_index), "Lorg/threeten/bp/ZoneId;");

    let code = method.code().unwrap();
    let AttributeInfo::LocalVariableTable(lvt) = &code.attributes[0].info else { panic!() };
    assert_eq!(utf8(&class, lvt.entries[0].descriptor_index), "Lorg/threeten/bp/Instant;");
    assert_eq!(lvt.entries[0].name_index, local_name);
    let AttributeInfo::LocalVariableTypeTable(lvtt) = &code.attributes[1].info else { panic!() };
    assert_eq!(utf8(&class, lvtt.entries[0].signature_index), "Ljava/util/List<Lorg/threeten/bp/Instant;>;");

    // Old strings stay in the pool for anything else that shares them
    assert_eq!(utf8(&class, instant), "Ljava/time/Instant;");
}

#[test]
fn method_type_constants_follow_type_replacements() {
    let mut class = class_named("demo/Handles");
    let method_type = class.constant_pool.add_method_type("(Ljava/time/Instant;)J").unwrap();
    assert!(ApiConverter::new(&threeten()).convert(&mut class).unwrap());
    match class.constant_pool.get(method_type) {
        Some(Constant::MethodType(descriptor)) => {
            assert_eq!(utf8(&class, *descriptor), "(Lorg/threeten/bp/Instant;)J")
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn method_replacement_keeps_offsets_and_reports_sites() {
    let mut class = class_named("demo/Streams");
    let stream = class
        .constant_pool
        .add_interface_method_ref("java/util/List", "stream", "()Ljava/util/stream/Stream;")
        .unwrap();
    let [s0, s1] = u2(stream);
    let code = vec![ALOAD_0, INVOKEINTERFACE, s0, s1, 1, 0, ARETURN];
    let method = add_method(&mut class, ACC_PUBLIC, "items", "()Ljava/util/stream/Stream;", Some(code));

    let types = vec![retroclass::backport::TypeReplacement::new("java/util/stream/**", "j8/util/stream/<1>").unwrap()];
    let methods = vec![MethodReplacement::new(
        ("java/util/*", "j8/util/stream/StreamSupport"),
        ("stream", None),
        ("()Ljava/util/stream/Stream;", Some("()Ljava/util/stream/Stream;")),
    )
    .unwrap()
    .with_invocation(MethodInvocation::Static)];
    let table = ReplacementTable::new(types, methods).unwrap();

    let (changed, modified, sites) = convert_counting(&table, &mut class);
    assert!(changed);
    assert_eq!(modified, 1);
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].offset, 1);
    assert_eq!(sites[0].opcode, INVOKESTATIC);

    let code = &class.methods[method].code().unwrap().code;
    assert_eq!(code.len(), 7);
    assert_eq!(code[6], ARETURN);
    let target = class.constant_pool.member_ref(sites[0].constant_index).unwrap();
    assert_eq!(target.class_name, "j8/util/stream/StreamSupport");
    assert_eq!(target.name, "stream");
    // Receiver prepended, then the return type renamed by the type table
    assert_eq!(target.descriptor, "(Ljava/util/List;)Lj8/util/stream/Stream;");
    assert_eq!(utf8(&class, class.methods[method].descriptor_index), "()Lj8/util/stream/Stream;");
    verify(&class).unwrap();
}

#[test]
fn keep_mode_interface_call_updates_argument_count() {
    let mut class = class_named("demo/Maps");
    let put = class
        .constant_pool
        .add_interface_method_ref("java/util/Map", "put", "(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;")
        .unwrap();
    let [p0, p1] = u2(put);
    let code = vec![INVOKEINTERFACE, p0, p1, 3, 0, ARETURN];
    add_method(&mut class, ACC_PUBLIC, "put", "()Ljava/lang/Object;", Some(code));

    let methods = vec![MethodReplacement::new(
        ("java/util/Map", "j8/util/LongMap"),
        ("put", Some("putLong")),
        ("(Ljava/lang/Object;Ljava/lang/Object;)Ljava/lang/Object;", Some("(JLjava/lang/Object;)Ljava/lang/Object;")),
    )
    .unwrap()];
    let table = ReplacementTable::new(Vec::new(), methods).unwrap();
    assert!(ApiConverter::new(&table).convert(&mut class).unwrap());

    let code = &class.methods[0].code().unwrap().code;
    assert_eq!(code[0], INVOKEINTERFACE);
    assert_eq!(code[3], 4);
    let index = u16::from_be_bytes([code[1], code[2]]);
    assert!(matches!(class.constant_pool.get(index), Some(Constant::InterfaceMethodRef(..))));
}

#[test]
fn interface_call_with_too_many_argument_slots_is_rejected() {
    let mut class = class_named("demo/Wide");
    let run = class.constant_pool.add_interface_method_ref("demo/Task", "run", "()V").unwrap();
    let [r0, r1] = u2(run);
    let code = vec![ALOAD_0, INVOKEINTERFACE, r0, r1, 1, 0, RETURN];
    add_method(&mut class, ACC_PUBLIC, "run", "()V", Some(code));
    let before = class.clone();

    // 128 longs take 256 slots, one more than the count byte holds with the receiver
    let wide = format!("({})V", "J".repeat(128));
    let methods = vec![MethodReplacement::new(("demo/Task", "demo/WideTask"), ("run", None), ("()V", Some(wide.as_str()))).unwrap()];
    let table = ReplacementTable::new(Vec::new(), methods).unwrap();

    let result = ApiConverter::new(&table).convert(&mut class);
    assert!(matches!(result, Err(retroclass::Error::MalformedClass { .. })));
    assert_eq!(class, before);
}

#[test]
fn record_components_are_copied_through_unchanged() {
    let mut class = class_named("demo/Stamp");
    add_field(&mut class, ACC_PRIVATE | ACC_FINAL, "at", "Ljava/time/Instant;");
    let name = class.constant_pool.find_or_add_utf8("at").unwrap();
    let descriptor = class.constant_pool.find_or_add_utf8("Ljava/time/Instant;").unwrap();
    let mut component = vec![0, 1];
    component.extend(u2(name));
    component.extend(u2(descriptor));
    component.extend([0, 0]);
    let record = attribute(&mut class, "Record", AttributeInfo::Raw(component.clone()));
    class.attributes.push(record);

    assert!(ApiConverter::new(&threeten()).convert(&mut class).unwrap());
    assert_eq!(utf8(&class, class.fields[0].descriptor_index), "Lorg/threeten/bp/Instant;");
    assert_eq!(class.attributes[0].info, AttributeInfo::Raw(component));
    assert_eq!(utf8(&class, descriptor), "Ljava/time/Instant;");
}

#[test]
fn converted_class_survives_a_binary_round_trip() {
    let mut class = class_named("demo/Persisted");
    add_field(&mut class, ACC_PRIVATE, "at", "Ljava/time/OffsetDateTime;");
    let bytes = class.to_classfile_bytes().unwrap();

    let converted = retroclass::convert_bytes(&bytes, &threeten()).unwrap().unwrap();
    let read = read_class(&converted).unwrap();
    assert_eq!(utf8(&read, read.fields[0].descriptor_index), "Lorg/threeten/bp/OffsetDateTime;");
    assert!(retroclass::convert_bytes(&converted, &threeten()).unwrap().is_none());
}

#[test]
fn rewrite_past_the_utf8_length_limit_fails_and_keeps_the_class() {
    let descriptor = format!("Ljava/time/{};", "X".repeat(65_520));
    let mut class = class_named("demo/Huge");
    add_field(&mut class, ACC_PRIVATE, "huge", &descriptor);
    let bytes = class.to_classfile_bytes().unwrap();
    let before = class.clone();

    let result = ApiConverter::new(&threeten()).convert(&mut class);
    assert!(matches!(
        result,
        Err(retroclass::Error::ClassFormat(ClassFormatError::Utf8TooLong(65_538)))
    ));
    assert_eq!(class, before);
    assert!(retroclass::convert_bytes(&bytes, &threeten()).is_err());
}

#[test]
fn convert_all_reports_each_class_in_order() {
    let mut plain = class_named("demo/A");
    add_field(&mut plain, 0, "x", "I");
    let mut dated = class_named("demo/B");
    add_field(&mut dated, 0, "d", "Ljava/time/Year;");
    let mut classes = vec![plain, dated];

    let results = convert_all(&threeten(), &mut classes);
    let flags: Vec<bool> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(flags, vec![false, true]);
    assert_eq!(utf8(&classes[1], classes[1].fields[0].descriptor_index), "Lorg/threeten/bp/Year;");
}
