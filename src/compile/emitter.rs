//! Class emission: [`ClassOutput`] to class-file bytes.
//!
//! Each class gets its own constant pool. Method bodies go through
//! [`codegen::generate`] and are wrapped in `Code` attributes; annotations
//! are written as `RuntimeVisible*` attributes.

use std::io::Cursor;

use binrw::BinWrite;
use tracing::debug;

use crate::attribute_info::{
    to_attribute, AnnotationDefaultAttribute, AttributeInfo, CodeAttribute, ElementArrayValue, ElementValue,
    ElementValuePair, EnumConstValue, ParameterAnnotations, RuntimeAnnotation, RuntimeVisibleAnnotationsAttribute,
    RuntimeVisibleParameterAnnotationsAttribute, SourceFileAttribute,
};
use crate::constant_info::ConstantPool;
use crate::descriptor::OBJECT;
use crate::field_info::FieldInfo;
use crate::method_info::MethodInfo;
use crate::types::ClassFile;

use super::codegen;
use super::semantic::ir::{AnnotationValue, ClassOutput, ElementVal, FieldOutput, MethodOutput};
use super::util::encode_instructions;
use super::{CompileError, CompileOptions};

const MAX_CODE_LENGTH: usize = 65535;

/// Serialize one class.
#[tracing::instrument(skip_all, fields(class = %class.name))]
pub fn emit_class(class: &ClassOutput, options: &CompileOptions) -> Result<Vec<u8>, CompileError> {
    let file = build_class_file(class, options)?;
    let mut cursor = Cursor::new(Vec::new());
    file.write_be(&mut cursor)?;
    let bytes = cursor.into_inner();
    debug!(bytes = bytes.len(), pool = file.const_pool_size, "class emitted");
    Ok(bytes)
}

/// Build the class-file model for `class` without serializing it.
pub fn build_class_file(class: &ClassOutput, options: &CompileOptions) -> Result<ClassFile, CompileError> {
    let mut pool = ConstantPool::new();
    let this_class = pool.class(&class.name);
    let super_class = pool.class(class.super_name.as_deref().unwrap_or(OBJECT));
    let interfaces: Vec<u16> = class.interfaces.iter().map(|i| pool.class(i)).collect();

    let fields = class
        .fields
        .iter()
        .map(|f| field_info(&mut pool, f))
        .collect::<Result<Vec<_>, _>>()?;
    let methods = class
        .methods
        .iter()
        .map(|m| method_info(&mut pool, m))
        .collect::<Result<Vec<_>, _>>()?;

    let mut attributes = Vec::new();
    if options.emit_source_file {
        if let Some(source) = &class.source_file {
            let payload = SourceFileAttribute {
                sourcefile_index: pool.utf8(source),
            };
            attributes.push(to_attribute(pool.utf8("SourceFile"), &payload)?);
        }
    }
    if let Some(attr) = annotations_attribute(&mut pool, &class.annotations)? {
        attributes.push(attr);
    }

    if pool.overflowed() {
        return Err(CompileError::encoding(format!(
            "constant pool of {} exceeds 65535 entries",
            class.name
        )));
    }

    let (major_version, minor_version) = options.class_version;
    Ok(ClassFile {
        minor_version,
        major_version,
        const_pool_size: pool.count(),
        const_pool: pool.into_entries(),
        access_flags: class.access,
        this_class,
        super_class,
        interfaces_count: count(interfaces.len(), "interfaces")?,
        interfaces,
        fields_count: count(fields.len(), "fields")?,
        fields,
        methods_count: count(methods.len(), "methods")?,
        methods,
        attributes_count: count(attributes.len(), "attributes")?,
        attributes,
    })
}

fn count(len: usize, what: &str) -> Result<u16, CompileError> {
    u16::try_from(len).map_err(|_| CompileError::encoding(format!("too many {}", what)))
}

fn field_info(pool: &mut ConstantPool, field: &FieldOutput) -> Result<FieldInfo, CompileError> {
    let name_index = pool.utf8(&field.name);
    let descriptor_index = pool.utf8(&field.ty.to_descriptor());
    let attributes: Vec<AttributeInfo> = annotations_attribute(pool, &field.annotations)?.into_iter().collect();
    Ok(FieldInfo {
        access_flags: field.access,
        name_index,
        descriptor_index,
        attributes_count: count(attributes.len(), "field attributes")?,
        attributes,
    })
}

fn method_info(pool: &mut ConstantPool, method: &MethodOutput) -> Result<MethodInfo, CompileError> {
    let name_index = pool.utf8(&method.name);
    let descriptor_index = pool.utf8(&method.descriptor());
    let mut attributes = Vec::new();

    if let Some(body) = &method.body {
        let generated = codegen::generate(body, pool)?;
        let code = encode_instructions(&generated.instructions)?;
        if code.is_empty() || code.len() > MAX_CODE_LENGTH {
            return Err(CompileError::encoding(format!(
                "code of {}{} is {} bytes",
                method.name,
                method.descriptor(),
                code.len()
            )));
        }
        let payload = CodeAttribute {
            max_stack: generated.max_stack,
            max_locals: generated.max_locals,
            code_length: code.len() as u32,
            code,
            exception_table_length: count(generated.exception_table.len(), "exception handlers")?,
            exception_table: generated.exception_table,
            attributes_count: 0,
            attributes: Vec::new(),
        };
        attributes.push(to_attribute(pool.utf8("Code"), &payload)?);
    }

    if let Some(attr) = annotations_attribute(pool, &method.annotations)? {
        attributes.push(attr);
    }
    if method.param_annotations.iter().any(|p| !p.is_empty()) {
        let parameter_annotations = method
            .param_annotations
            .iter()
            .map(|annos| {
                let annotations = annos
                    .iter()
                    .map(|a| runtime_annotation(pool, a))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ParameterAnnotations {
                    num_annotations: count(annotations.len(), "annotations")?,
                    annotations,
                })
            })
            .collect::<Result<Vec<_>, CompileError>>()?;
        let payload = RuntimeVisibleParameterAnnotationsAttribute {
            num_parameters: u8::try_from(parameter_annotations.len())
                .map_err(|_| CompileError::encoding("too many annotated parameters"))?,
            parameter_annotations,
        };
        attributes.push(to_attribute(pool.utf8("RuntimeVisibleParameterAnnotations"), &payload)?);
    }
    if let Some(default) = &method.annotation_default {
        let payload = AnnotationDefaultAttribute {
            default_value: element_value(pool, default)?,
        };
        attributes.push(to_attribute(pool.utf8("AnnotationDefault"), &payload)?);
    }

    Ok(MethodInfo {
        access_flags: method.access,
        name_index,
        descriptor_index,
        attributes_count: count(attributes.len(), "method attributes")?,
        attributes,
    })
}

fn annotations_attribute(
    pool: &mut ConstantPool,
    annotations: &[AnnotationValue],
) -> Result<Option<AttributeInfo>, CompileError> {
    if annotations.is_empty() {
        return Ok(None);
    }
    let annotations = annotations
        .iter()
        .map(|a| runtime_annotation(pool, a))
        .collect::<Result<Vec<_>, _>>()?;
    let payload = RuntimeVisibleAnnotationsAttribute {
        num_annotations: count(annotations.len(), "annotations")?,
        annotations,
    };
    Ok(Some(to_attribute(pool.utf8("RuntimeVisibleAnnotations"), &payload)?))
}

fn runtime_annotation(pool: &mut ConstantPool, anno: &AnnotationValue) -> Result<RuntimeAnnotation, CompileError> {
    let type_index = pool.utf8(&format!("L{};", anno.ty));
    let element_value_pairs = anno
        .values
        .iter()
        .map(|(name, value)| {
            Ok(ElementValuePair {
                element_name_index: pool.utf8(name),
                value: element_value(pool, value)?,
            })
        })
        .collect::<Result<Vec<_>, CompileError>>()?;
    Ok(RuntimeAnnotation {
        type_index,
        num_element_value_pairs: count(element_value_pairs.len(), "annotation elements")?,
        element_value_pairs,
    })
}

fn element_value(pool: &mut ConstantPool, value: &ElementVal) -> Result<ElementValue, CompileError> {
    Ok(match value {
        ElementVal::Int(v) => ElementValue::Int(pool.integer(*v)),
        ElementVal::Long(v) => ElementValue::Long(pool.long(*v)),
        ElementVal::Float(v) => ElementValue::Float(pool.float(*v)),
        ElementVal::Double(v) => ElementValue::Double(pool.double(*v)),
        ElementVal::Bool(v) => ElementValue::Boolean(pool.integer(i32::from(*v))),
        ElementVal::Char(v) => ElementValue::Char(pool.integer(i32::from(*v))),
        ElementVal::Byte(v) => ElementValue::Byte(pool.integer(i32::from(*v))),
        ElementVal::Short(v) => ElementValue::Short(pool.integer(i32::from(*v))),
        ElementVal::Str(s) => ElementValue::String(pool.utf8(s)),
        ElementVal::Class(ty) => ElementValue::ClassInfo(pool.utf8(&ty.to_descriptor())),
        ElementVal::Enum { ty, name } => ElementValue::EnumConst(EnumConstValue {
            type_name_index: pool.utf8(&format!("L{};", ty)),
            const_name_index: pool.utf8(name),
        }),
        ElementVal::Annotation(inner) => ElementValue::Annotation(runtime_annotation(pool, inner)?),
        ElementVal::Array(items) => {
            let values = items
                .iter()
                .map(|item| element_value(pool, item))
                .collect::<Result<Vec<_>, _>>()?;
            ElementValue::Array(ElementArrayValue {
                num_values: count(values.len(), "array elements")?,
                values,
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use binrw::BinRead;

    use super::*;
    use crate::compile::semantic::ir::{Ins, MethodBody, Value};
    use crate::constant_info::utf8_at;
    use crate::descriptor::JvmType;
    use crate::method_info::MethodAccessFlags;
    use crate::types::ClassAccessFlags;

    fn class(methods: Vec<MethodOutput>, annotations: Vec<AnnotationValue>) -> ClassOutput {
        ClassOutput {
            name: "demo/A".into(),
            access: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            super_name: None,
            interfaces: vec!["java/io/Serializable".into()],
            fields: Vec::new(),
            methods,
            annotations,
            source_file: Some("a.mo".into()),
        }
    }

    fn answer() -> MethodOutput {
        MethodOutput {
            name: "answer".into(),
            params: Vec::new(),
            ret: JvmType::Int,
            access: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            body: Some(MethodBody {
                ins: vec![Ins::Return(Some(Value::int(42)))],
                exceptions: Vec::new(),
                max_locals: 0,
                labels: 0,
            }),
            annotations: Vec::new(),
            param_annotations: Vec::new(),
            annotation_default: None,
        }
    }

    fn reparse(bytes: &[u8]) -> ClassFile {
        ClassFile::read(&mut Cursor::new(bytes)).unwrap()
    }

    #[test]
    fn emitted_classes_read_back() {
        let bytes = emit_class(&class(vec![answer()], Vec::new()), &CompileOptions::default()).unwrap();
        assert_eq!(&bytes[..4], &[0xca, 0xfe, 0xba, 0xbe]);
        let file = reparse(&bytes);
        assert_eq!((file.major_version, file.minor_version), (49, 0));
        assert_eq!(file.this_class_name().as_deref(), Some("demo/A"));
        assert_eq!(file.super_class_name().as_deref(), Some("java/lang/Object"));
        assert_eq!(file.interface_names(), vec!["java/io/Serializable".to_string()]);
        assert!(file.attribute("SourceFile").is_some());

        let method = &file.methods[0];
        assert_eq!(file.utf8(method.name_index).as_deref(), Some("answer"));
        let code = &method.attributes[0];
        assert_eq!(file.utf8(code.attribute_name_index).as_deref(), Some("Code"));
        let code = CodeAttribute::read_be(&mut Cursor::new(&code.info)).unwrap();
        // bipush 42; ireturn
        assert_eq!(code.code, vec![0x10, 42, 0xac]);
        assert_eq!(code.max_stack, 1);
    }

    #[test]
    fn annotations_are_runtime_visible() {
        let anno = AnnotationValue {
            ty: "demo/Tag".into(),
            values: vec![
                ("level".into(), ElementVal::Int(3)),
                ("kind".into(), ElementVal::Class(JvmType::string())),
            ],
        };
        let bytes = emit_class(&class(Vec::new(), vec![anno]), &CompileOptions::default()).unwrap();
        let file = reparse(&bytes);
        let attr = file.attribute("RuntimeVisibleAnnotations").unwrap();
        let parsed = RuntimeVisibleAnnotationsAttribute::read_be(&mut Cursor::new(&attr.info)).unwrap();
        let tag = &parsed.annotations[0];
        assert_eq!(utf8_at(&file.const_pool, tag.type_index).as_deref(), Some("Ldemo/Tag;"));
        assert_eq!(tag.num_element_value_pairs, 2);
        match &tag.element_value_pairs[1].value {
            ElementValue::ClassInfo(idx) => {
                assert_eq!(utf8_at(&file.const_pool, *idx).as_deref(), Some("Ljava/lang/String;"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn source_file_can_be_omitted() {
        let options = CompileOptions {
            emit_source_file: false,
            ..CompileOptions::default()
        };
        let file = reparse(&emit_class(&class(Vec::new(), Vec::new()), &options).unwrap());
        assert!(file.attribute("SourceFile").is_none());
    }

    #[test]
    fn abstract_methods_have_no_code() {
        let mut method = answer();
        method.body = None;
        method.access = MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT;
        let file = build_class_file(&class(vec![method], Vec::new()), &CompileOptions::default()).unwrap();
        assert!(file.methods[0].attributes.is_empty());
    }
}
