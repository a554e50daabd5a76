use binrw::binrw;

/// Raw attribute as it appears in a class file; typed payloads below are
/// serialized into `info`.
#[derive(Clone, Debug)]
#[binrw]
#[brw(big)]
pub struct AttributeInfo {
    pub attribute_name_index: u16,
    pub attribute_length: u32,
    #[br(count = attribute_length)]
    pub info: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[binrw]
#[brw(big)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

#[derive(Clone, Debug)]
#[binrw]
#[brw(big)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_length: u32,
    #[br(count = code_length)]
    pub code: Vec<u8>,
    pub exception_table_length: u16,
    #[br(count = exception_table_length)]
    pub exception_table: Vec<ExceptionEntry>,
    pub attributes_count: u16,
    #[br(count = attributes_count)]
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Clone, Debug)]
#[binrw]
#[brw(big)]
pub struct SourceFileAttribute {
    pub sourcefile_index: u16,
}

#[derive(Clone, Debug)]
#[binrw]
#[brw(big)]
pub struct ConstantValueAttribute {
    pub constant_value_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct RuntimeVisibleAnnotationsAttribute {
    pub num_annotations: u16,
    #[br(count = num_annotations)]
    pub annotations: Vec<RuntimeAnnotation>,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct RuntimeVisibleParameterAnnotationsAttribute {
    pub num_parameters: u8,
    #[br(count = num_parameters)]
    pub parameter_annotations: Vec<ParameterAnnotations>,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct ParameterAnnotations {
    pub num_annotations: u16,
    #[br(count = num_annotations)]
    pub annotations: Vec<RuntimeAnnotation>,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct RuntimeAnnotation {
    pub type_index: u16,
    pub num_element_value_pairs: u16,
    #[br(count = num_element_value_pairs)]
    pub element_value_pairs: Vec<ElementValuePair>,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct ElementValuePair {
    pub element_name_index: u16,
    pub value: ElementValue,
}

/// `element_value` union, keyed by its one-byte tag.
#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub enum ElementValue {
    #[brw(magic = 0x42u8)] // 'B'
    Byte(u16),
    #[brw(magic = 0x43u8)] // 'C'
    Char(u16),
    #[brw(magic = 0x44u8)] // 'D'
    Double(u16),
    #[brw(magic = 0x46u8)] // 'F'
    Float(u16),
    #[brw(magic = 0x49u8)] // 'I'
    Int(u16),
    #[brw(magic = 0x4au8)] // 'J'
    Long(u16),
    #[brw(magic = 0x53u8)] // 'S'
    Short(u16),
    #[brw(magic = 0x5au8)] // 'Z'
    Boolean(u16),
    #[brw(magic = 0x73u8)] // 's'
    String(u16),
    #[brw(magic = 0x65u8)] // 'e'
    EnumConst(EnumConstValue),
    #[brw(magic = 0x63u8)] // 'c'
    ClassInfo(u16),
    #[brw(magic = 0x40u8)] // '@'
    Annotation(RuntimeAnnotation),
    #[brw(magic = 0x5bu8)] // '['
    Array(ElementArrayValue),
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct EnumConstValue {
    pub type_name_index: u16,
    pub const_name_index: u16,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct ElementArrayValue {
    pub num_values: u16,
    #[br(count = num_values)]
    pub values: Vec<ElementValue>,
}

#[derive(Clone, Debug, PartialEq)]
#[binrw]
#[brw(big)]
pub struct AnnotationDefaultAttribute {
    pub default_value: ElementValue,
}
