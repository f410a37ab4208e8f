//! Abstract Syntax Tree for protobuf IDL source files.
//!
//! The tree is purely syntactic: type references are kept as written and are
//! linked into descriptors by [`crate::descriptor::SchemaRegistry::link`].

/// One parsed `.proto` file.
#[derive(Debug, Clone, Default)]
pub struct ProtoFile {
    pub syntax: Syntax,
    pub package: Option<String>,
    pub imports: Vec<Import>,
    pub options: Vec<OptionDecl>,
    pub messages: Vec<MessageDef>,
    pub enums: Vec<EnumDef>,
    pub services: Vec<ServiceDef>,
}

/// Declared syntax level. Files without a `syntax` statement are proto2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Syntax {
    #[default]
    Proto2,
    Proto3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub path: String,
    pub kind: ImportKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Default,
    Public,
    Weak,
}

#[derive(Debug, Clone, Default)]
pub struct MessageDef {
    pub name: String,
    /// Fields in declaration order, oneof members included.
    pub fields: Vec<FieldDef>,
    pub oneofs: Vec<String>,
    pub messages: Vec<MessageDef>,
    pub enums: Vec<EnumDef>,
    pub reserved: Vec<Reserved>,
    pub options: Vec<OptionDecl>,
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub number: i64,
    pub label: Option<Label>,
    pub type_spec: TypeSpec,
    pub options: Vec<OptionDecl>,
    /// Index into the owning message's `oneofs`.
    pub oneof: Option<usize>,
}

impl FieldDef {
    /// Value of a `[name = value]` field option, if present.
    pub fn option(&self, name: &str) -> Option<&Literal> {
        self.options
            .iter()
            .find(|o| o.name == name)
            .map(|o| &o.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Optional,
    Required,
    Repeated,
}

/// Field type as written in source.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    /// Scalar keyword (`int32`, `string`, ...) or a message/enum reference.
    Named(String),
    /// `map<key, value>`.
    Map { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reserved {
    /// Inclusive number range; `max` is stored as `i64::MAX`.
    Range { start: i64, end: i64 },
    Name(String),
}

#[derive(Debug, Clone, Default)]
pub struct EnumDef {
    pub name: String,
    pub values: Vec<EnumValueDef>,
    pub options: Vec<OptionDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValueDef {
    pub name: String,
    pub number: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionDecl {
    pub name: String,
    pub value: Literal,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceDef {
    pub name: String,
    pub methods: Vec<MethodDef>,
}

#[derive(Debug, Clone)]
pub struct MethodDef {
    pub name: String,
    pub input: String,
    pub output: String,
    pub client_streaming: bool,
    pub server_streaming: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Ident(String),
    /// `{ ... }` aggregate option value, kept verbatim.
    Aggregate(String),
}

impl Literal {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Literal::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(s) | Literal::Ident(s) => Some(s),
            _ => None,
        }
    }
}
