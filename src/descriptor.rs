//! Linked descriptors: messages, fields and enums with type references resolved.
//!
//! A [`SchemaRegistry`] is built once per opened IDL file by [`SchemaRegistry::link`]
//! and never mutated afterwards. Messages, enums and fields are addressed by
//! copyable ids that index into the registry, so recursive message types need no
//! reference counting and a field keeps its identity even when another message
//! declares a field of the same name.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use crate::ast::{self, Label, MessageDef, ProtoFile, Reserved, Syntax, TypeSpec};
use crate::error::SchemaError;

const MAX_FIELD_NUMBER: i64 = 536_870_911;
const RESERVED_IMPL_RANGE: std::ops::RangeInclusive<i64> = 19_000..=19_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnumId(usize);

/// Identity of a field: the declaring message plus the declaration index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId {
    message: MessageId,
    index: usize,
}

impl FieldId {
    pub fn message(&self) -> MessageId {
        self.message
    }

    /// Position in the declaring message's field list (declaration order).
    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
}

impl ScalarType {
    pub fn from_keyword(s: &str) -> Option<Self> {
        Some(match s {
            "double" => ScalarType::Double,
            "float" => ScalarType::Float,
            "int32" => ScalarType::Int32,
            "int64" => ScalarType::Int64,
            "uint32" => ScalarType::Uint32,
            "uint64" => ScalarType::Uint64,
            "sint32" => ScalarType::Sint32,
            "sint64" => ScalarType::Sint64,
            "fixed32" => ScalarType::Fixed32,
            "fixed64" => ScalarType::Fixed64,
            "sfixed32" => ScalarType::Sfixed32,
            "sfixed64" => ScalarType::Sfixed64,
            "bool" => ScalarType::Bool,
            "string" => ScalarType::String,
            "bytes" => ScalarType::Bytes,
            _ => return None,
        })
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            ScalarType::Double => "double",
            ScalarType::Float => "float",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Uint32 => "uint32",
            ScalarType::Uint64 => "uint64",
            ScalarType::Sint32 => "sint32",
            ScalarType::Sint64 => "sint64",
            ScalarType::Fixed32 => "fixed32",
            ScalarType::Fixed64 => "fixed64",
            ScalarType::Sfixed32 => "sfixed32",
            ScalarType::Sfixed64 => "sfixed64",
            ScalarType::Bool => "bool",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
        }
    }

    /// Length-delimited types cannot be packed.
    pub fn is_packable(&self) -> bool {
        !matches!(self, ScalarType::String | ScalarType::Bytes)
    }

    /// Types allowed as `map<K, V>` keys.
    pub fn is_valid_map_key(&self) -> bool {
        !matches!(
            self,
            ScalarType::Double | ScalarType::Float | ScalarType::Bytes
        )
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// What a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar(ScalarType),
    Enum(EnumId),
    Message(MessageId),
}

impl FieldKind {
    pub fn is_message(&self) -> bool {
        matches!(self, FieldKind::Message(_))
    }

    fn is_packable(&self) -> bool {
        match self {
            FieldKind::Scalar(s) => s.is_packable(),
            FieldKind::Enum(_) => true,
            FieldKind::Message(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Singular,
    Repeated,
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    id: FieldId,
    name: String,
    number: u32,
    kind: FieldKind,
    cardinality: Cardinality,
    label: Option<Label>,
    explicit_presence: bool,
    packed: bool,
    oneof: Option<usize>,
}

impl FieldDescriptor {
    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    /// Whether a set-but-zero singular value is still written on the wire.
    pub fn has_explicit_presence(&self) -> bool {
        self.explicit_presence
    }

    pub fn is_packed(&self) -> bool {
        self.packed
    }

    pub fn oneof(&self) -> Option<usize> {
        self.oneof
    }

    /// `optional`, `required` or `repeated`, as shown next to a form field.
    pub fn label_name(&self) -> &'static str {
        match (self.cardinality, self.label) {
            (Cardinality::Repeated, _) => "repeated",
            (_, Some(Label::Required)) => "required",
            _ => "optional",
        }
    }

    /// Declared type: scalar keyword, or the fully-qualified message/enum name.
    pub fn type_name<'a>(&self, registry: &'a SchemaRegistry) -> &'a str {
        match self.kind {
            FieldKind::Scalar(s) => s.keyword(),
            FieldKind::Enum(id) => registry
                .enum_type(id)
                .map(|e| e.full_name())
                .unwrap_or("<enum>"),
            FieldKind::Message(id) => registry
                .message(id)
                .map(|m| m.full_name())
                .unwrap_or("<message>"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageDescriptor {
    id: MessageId,
    name: String,
    full_name: String,
    file: usize,
    fields: Vec<FieldDescriptor>,
    oneofs: Vec<String>,
    map_entry: bool,
}

impl MessageDescriptor {
    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully-qualified message name, `<package>.<Name>` (no leading dot).
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&FieldDescriptor> {
        self.fields.get(index)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.number == number)
    }

    pub fn oneofs(&self) -> &[String] {
        &self.oneofs
    }

    /// Synthesised `XxxEntry` message backing a `map<K, V>` field.
    pub fn is_map_entry(&self) -> bool {
        self.map_entry
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub name: String,
    pub number: i32,
}

#[derive(Debug, Clone)]
pub struct EnumDescriptor {
    id: EnumId,
    full_name: String,
    values: Vec<EnumValue>,
}

impl EnumDescriptor {
    pub fn id(&self) -> EnumId {
        self.id
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn values(&self) -> &[EnumValue] {
        &self.values
    }

    pub fn value_by_name(&self, name: &str) -> Option<&EnumValue> {
        self.values.iter().find(|v| v.name == name)
    }

    pub fn value_by_number(&self, number: i32) -> Option<&EnumValue> {
        self.values.iter().find(|v| v.number == number)
    }

    /// The first declared value is the default.
    pub fn default_number(&self) -> i32 {
        self.values.first().map(|v| v.number).unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct FileDescriptor {
    name: String,
    path: PathBuf,
    package: Option<String>,
    syntax: Syntax,
    imports: Vec<String>,
    messages: Vec<MessageId>,
}

impl FileDescriptor {
    /// Name the file was imported under (the entry file uses its path).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    /// Top-level messages in declaration order.
    pub fn messages(&self) -> &[MessageId] {
        &self.messages
    }
}

/// A parsed file waiting to be linked.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub path: PathBuf,
    pub ast: ProtoFile,
}

/// Fully-qualified message name → descriptor, for one entry file and all of its imports.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    files: Vec<FileDescriptor>,
    messages: Vec<MessageDescriptor>,
    enums: Vec<EnumDescriptor>,
    messages_by_name: HashMap<String, MessageId>,
    enums_by_name: HashMap<String, EnumId>,
    entry: Option<usize>,
}

enum Pending<'a> {
    Message {
        id: MessageId,
        file: usize,
        def: &'a MessageDef,
    },
    MapEntry {
        id: MessageId,
        file: usize,
        owner: String,
        field: String,
        key: &'a str,
        value: &'a str,
    },
}

impl SchemaRegistry {
    /// Link parsed files into a registry. Files must be ordered so that the entry
    /// file comes last; type references may point into any linked file.
    pub fn link(sources: &[SourceFile]) -> Result<Self, SchemaError> {
        let mut reg = SchemaRegistry::default();
        let mut pending = Vec::new();

        for (file_idx, source) in sources.iter().enumerate() {
            let package = source.ast.package.clone().filter(|p| !p.is_empty());
            let scope = package.clone().unwrap_or_default();
            reg.files.push(FileDescriptor {
                name: source.name.clone(),
                path: source.path.clone(),
                package,
                syntax: source.ast.syntax,
                imports: source.ast.imports.iter().map(|i| i.path.clone()).collect(),
                messages: Vec::new(),
            });
            for e in &source.ast.enums {
                reg.declare_enum(&scope, e)?;
            }
            for m in &source.ast.messages {
                let id = reg.declare_message(file_idx, &scope, m, &mut pending)?;
                reg.files[file_idx].messages.push(id);
            }
        }

        for p in pending {
            match p {
                Pending::Message { id, file, def } => reg.link_message(id, file, def)?,
                Pending::MapEntry {
                    id,
                    file,
                    owner,
                    field,
                    key,
                    value,
                } => reg.link_map_entry(id, file, &owner, &field, key, value)?,
            }
        }

        reg.entry = sources.len().checked_sub(1);
        Ok(reg)
    }

    fn declare_message<'a>(
        &mut self,
        file: usize,
        scope: &str,
        def: &'a MessageDef,
        pending: &mut Vec<Pending<'a>>,
    ) -> Result<MessageId, SchemaError> {
        let full_name = qualify(scope, &def.name);
        let id = self.push_message(file, &def.name, &full_name, def.oneofs.clone(), false)?;

        for e in &def.enums {
            self.declare_enum(&full_name, e)?;
        }
        for nested in &def.messages {
            self.declare_message(file, &full_name, nested, pending)?;
        }
        for field in &def.fields {
            if let TypeSpec::Map { key, value } = &field.type_spec {
                let entry_name = map_entry_name(&field.name);
                let entry_full = qualify(&full_name, &entry_name);
                let entry_id = self.push_message(file, &entry_name, &entry_full, Vec::new(), true)?;
                pending.push(Pending::MapEntry {
                    id: entry_id,
                    file,
                    owner: full_name.clone(),
                    field: field.name.clone(),
                    key,
                    value,
                });
            }
        }

        pending.push(Pending::Message { id, file, def });
        Ok(id)
    }

    fn push_message(
        &mut self,
        file: usize,
        name: &str,
        full_name: &str,
        oneofs: Vec<String>,
        map_entry: bool,
    ) -> Result<MessageId, SchemaError> {
        self.claim_name(full_name)?;
        let id = MessageId(self.messages.len());
        self.messages.push(MessageDescriptor {
            id,
            name: name.to_string(),
            full_name: full_name.to_string(),
            file,
            fields: Vec::new(),
            oneofs,
            map_entry,
        });
        self.messages_by_name.insert(full_name.to_string(), id);
        Ok(id)
    }

    fn declare_enum(&mut self, scope: &str, def: &ast::EnumDef) -> Result<EnumId, SchemaError> {
        let full_name = qualify(scope, &def.name);
        self.claim_name(&full_name)?;
        let mut values = Vec::with_capacity(def.values.len());
        for v in &def.values {
            let number = i32::try_from(v.number).map_err(|_| SchemaError::InvalidField {
                message: full_name.clone(),
                field: v.name.clone(),
                reason: format!("enum value {} does not fit in int32", v.number),
            })?;
            values.push(EnumValue {
                name: v.name.clone(),
                number,
            });
        }
        let id = EnumId(self.enums.len());
        self.enums.push(EnumDescriptor {
            id,
            full_name: full_name.clone(),
            values,
        });
        self.enums_by_name.insert(full_name, id);
        Ok(id)
    }

    fn claim_name(&self, full_name: &str) -> Result<(), SchemaError> {
        if self.messages_by_name.contains_key(full_name) || self.enums_by_name.contains_key(full_name) {
            return Err(SchemaError::DuplicateName(full_name.to_string()));
        }
        Ok(())
    }

    fn link_message(&mut self, id: MessageId, file: usize, def: &MessageDef) -> Result<(), SchemaError> {
        let syntax = self.files[file].syntax;
        let scope = self.messages[id.0].full_name.clone();
        let mut numbers = HashSet::new();
        let mut names = HashSet::new();
        let mut fields = Vec::with_capacity(def.fields.len());

        for (index, f) in def.fields.iter().enumerate() {
            let invalid = |reason: String| SchemaError::InvalidField {
                message: scope.clone(),
                field: f.name.clone(),
                reason,
            };

            let number = check_field_number(f.number).map_err(invalid)?;
            if !numbers.insert(number) {
                return Err(invalid(format!("field number {} is used twice", number)));
            }
            if !names.insert(f.name.as_str()) {
                return Err(invalid("field name is declared twice".to_string()));
            }
            if is_reserved(&def.reserved, &f.name, number) {
                return Err(invalid(format!("field {} ({}) is reserved", f.name, number)));
            }
            if syntax == Syntax::Proto3 && f.label == Some(Label::Required) {
                return Err(invalid("required fields are not allowed in proto3".to_string()));
            }

            let (kind, cardinality) = match &f.type_spec {
                TypeSpec::Named(type_name) => {
                    let kind = self.resolve_type(file, &scope, type_name)?;
                    let cardinality = if f.label == Some(Label::Repeated) {
                        Cardinality::Repeated
                    } else {
                        Cardinality::Singular
                    };
                    (kind, cardinality)
                }
                TypeSpec::Map { .. } => {
                    let entry = qualify(&scope, &map_entry_name(&f.name));
                    let entry_id = self
                        .messages_by_name
                        .get(&entry)
                        .copied()
                        .ok_or_else(|| invalid(format!("missing map entry {}", entry)))?;
                    (FieldKind::Message(entry_id), Cardinality::Repeated)
                }
            };

            let explicit_presence = match syntax {
                Syntax::Proto2 => true,
                Syntax::Proto3 => {
                    f.label == Some(Label::Optional) || kind.is_message() || f.oneof.is_some()
                }
            };
            let packed = cardinality == Cardinality::Repeated
                && kind.is_packable()
                && f.option("packed")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(syntax == Syntax::Proto3);

            fields.push(FieldDescriptor {
                id: FieldId { message: id, index },
                name: f.name.clone(),
                number,
                kind,
                cardinality,
                label: f.label,
                explicit_presence,
                packed,
                oneof: f.oneof,
            });
        }

        self.messages[id.0].fields = fields;
        Ok(())
    }

    /// Map entry types resolve their value type from the owning message's scope.
    fn link_map_entry(
        &mut self,
        id: MessageId,
        file: usize,
        owner: &str,
        field: &str,
        key: &str,
        value: &str,
    ) -> Result<(), SchemaError> {
        let key_type = ScalarType::from_keyword(key)
            .filter(ScalarType::is_valid_map_key)
            .ok_or_else(|| SchemaError::InvalidField {
                message: owner.to_string(),
                field: field.to_string(),
                reason: format!("{} is not a valid map key type", key),
            })?;
        let value_kind = self.resolve_type(file, owner, value)?;
        let entry_field = |index: usize, name: &str, kind: FieldKind| FieldDescriptor {
            id: FieldId { message: id, index },
            name: name.to_string(),
            number: index as u32 + 1,
            kind,
            cardinality: Cardinality::Singular,
            label: None,
            explicit_presence: true,
            packed: false,
            oneof: None,
        };
        self.messages[id.0].fields = vec![
            entry_field(0, "key", FieldKind::Scalar(key_type)),
            entry_field(1, "value", value_kind),
        ];
        Ok(())
    }

    /// Resolve a type reference the way protobuf scopes names: innermost scope
    /// first, then each enclosing scope; a leading `.` means fully qualified.
    fn resolve_type(&self, file: usize, scope: &str, type_name: &str) -> Result<FieldKind, SchemaError> {
        if let Some(scalar) = ScalarType::from_keyword(type_name) {
            return Ok(FieldKind::Scalar(scalar));
        }
        let found = if let Some(absolute) = type_name.strip_prefix('.') {
            self.lookup_kind(absolute)
        } else {
            let mut scope = scope;
            loop {
                let candidate = qualify(scope, type_name);
                if let Some(kind) = self.lookup_kind(&candidate) {
                    break Some(kind);
                }
                if scope.is_empty() {
                    break None;
                }
                scope = scope.rsplit_once('.').map(|(parent, _)| parent).unwrap_or("");
            }
        };
        found.ok_or_else(|| SchemaError::UnknownType {
            file: self.files[file].name.clone(),
            scope: scope.to_string(),
            type_name: type_name.to_string(),
        })
    }

    fn lookup_kind(&self, full_name: &str) -> Option<FieldKind> {
        self.messages_by_name
            .get(full_name)
            .map(|&id| FieldKind::Message(id))
            .or_else(|| self.enums_by_name.get(full_name).map(|&id| FieldKind::Enum(id)))
    }

    pub fn get_message(&self, full_name: &str) -> Option<&MessageDescriptor> {
        self.messages_by_name
            .get(full_name.trim_start_matches('.'))
            .map(|&id| &self.messages[id.0])
    }

    pub fn message(&self, id: MessageId) -> Option<&MessageDescriptor> {
        self.messages.get(id.0)
    }

    pub fn get_enum(&self, full_name: &str) -> Option<&EnumDescriptor> {
        self.enums_by_name
            .get(full_name.trim_start_matches('.'))
            .map(|&id| &self.enums[id.0])
    }

    pub fn enum_type(&self, id: EnumId) -> Option<&EnumDescriptor> {
        self.enums.get(id.0)
    }

    pub fn field(&self, id: FieldId) -> Option<&FieldDescriptor> {
        self.message(id.message)?.fields.get(id.index)
    }

    /// Every registered message, nested ones and map entries included.
    pub fn messages(&self) -> impl Iterator<Item = &MessageDescriptor> {
        self.messages.iter()
    }

    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    /// File that was opened; the others were pulled in through imports.
    pub fn entry_file(&self) -> Option<&FileDescriptor> {
        self.entry.and_then(|i| self.files.get(i))
    }

    /// Top-level messages of the entry file, in declaration order.
    pub fn entry_messages(&self) -> impl Iterator<Item = &MessageDescriptor> {
        self.entry_file()
            .into_iter()
            .flat_map(|f| f.messages.iter())
            .map(|id| &self.messages[id.0])
    }

    pub fn file_of(&self, message: MessageId) -> Option<&FileDescriptor> {
        self.message(message).and_then(|m| self.files.get(m.file))
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    }
}

/// `my_map` → `MyMapEntry`.
fn map_entry_name(field: &str) -> String {
    let mut out = String::with_capacity(field.len() + 5);
    let mut upper = true;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out.push_str("Entry");
    out
}

fn check_field_number(number: i64) -> Result<u32, String> {
    if !(1..=MAX_FIELD_NUMBER).contains(&number) {
        return Err(format!("field number {} out of range 1..={}", number, MAX_FIELD_NUMBER));
    }
    if RESERVED_IMPL_RANGE.contains(&number) {
        return Err(format!("field number {} is reserved for the protobuf implementation", number));
    }
    Ok(number as u32)
}

fn is_reserved(reserved: &[Reserved], name: &str, number: u32) -> bool {
    reserved.iter().any(|r| match r {
        Reserved::Range { start, end } => (*start..=*end).contains(&(number as i64)),
        Reserved::Name(n) => n == name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn link_one(src: &str) -> Result<SchemaRegistry, SchemaError> {
        let ast = parse(src).expect("parse");
        SchemaRegistry::link(&[SourceFile {
            name: "test.proto".into(),
            path: "test.proto".into(),
            ast,
        }])
    }

    #[test]
    fn nested_types_resolve_from_inner_scope() {
        let reg = link_one(
            r#"
syntax = "proto3";
package shop;
message Order {
  message Item { string sku = 1; }
  enum State { NEW = 0; PAID = 1; }
  repeated Item items = 1;
  State state = 2;
  .shop.Order.Item featured = 3;
}
"#,
        )
        .expect("link");
        let order = reg.get_message("shop.Order").expect("Order");
        let item = reg.get_message("shop.Order.Item").expect("Item");
        assert_eq!(order.fields()[0].kind(), FieldKind::Message(item.id()));
        assert!(order.fields()[0].is_repeated());
        assert!(matches!(order.fields()[1].kind(), FieldKind::Enum(_)));
        assert_eq!(order.fields()[2].kind(), FieldKind::Message(item.id()));
        assert_eq!(reg.entry_messages().count(), 1);
    }

    #[test]
    fn proto3_presence_and_packing() {
        let reg = link_one(
            r#"
syntax = "proto3";
message M {
  int32 a = 1;
  optional int32 b = 2;
  repeated int32 c = 3;
  repeated int32 d = 4 [packed = false];
  repeated string e = 5;
}
"#,
        )
        .expect("link");
        let m = reg.get_message("M").unwrap();
        let f = m.fields();
        assert!(!f[0].has_explicit_presence());
        assert!(f[1].has_explicit_presence());
        assert!(f[2].is_packed());
        assert!(!f[3].is_packed());
        assert!(!f[4].is_packed());
    }

    #[test]
    fn map_fields_synthesise_entry_messages() {
        let reg = link_one(
            r#"
syntax = "proto3";
package p;
message Inventory { map<string, int64> stock_levels = 1; }
"#,
        )
        .expect("link");
        let entry = reg.get_message("p.Inventory.StockLevelsEntry").expect("entry");
        assert!(entry.is_map_entry());
        assert_eq!(entry.fields()[0].name(), "key");
        assert_eq!(entry.fields()[1].kind(), FieldKind::Scalar(ScalarType::Int64));
        let inv = reg.get_message("p.Inventory").unwrap();
        assert!(inv.fields()[0].is_repeated());
    }

    #[test]
    fn unknown_type_is_an_error() {
        let err = link_one("syntax = \"proto3\"; message M { Missing m = 1; }").unwrap_err();
        assert!(matches!(err, SchemaError::UnknownType { .. }));
    }

    #[test]
    fn duplicate_and_reserved_numbers_are_rejected() {
        let dup = link_one("syntax = \"proto3\"; message M { int32 a = 1; int32 b = 1; }").unwrap_err();
        assert!(matches!(dup, SchemaError::InvalidField { .. }));
        let reserved =
            link_one("syntax = \"proto3\"; message M { reserved 2 to 4; int32 a = 3; }").unwrap_err();
        assert!(matches!(reserved, SchemaError::InvalidField { .. }));
        let dup_msg = link_one("message M {} message M {}").unwrap_err();
        assert!(matches!(dup_msg, SchemaError::DuplicateName(_)));
    }

    #[test]
    fn same_field_name_in_different_messages_has_distinct_ids() {
        let reg = link_one(
            "syntax = \"proto3\"; message A { int64 id = 1; B b = 2; } message B { int64 id = 1; }",
        )
        .unwrap();
        let a_id = reg.get_message("A").unwrap().field_by_name("id").unwrap().id();
        let b_id = reg.get_message("B").unwrap().field_by_name("id").unwrap().id();
        assert_ne!(a_id, b_id);
    }

    #[test]
    fn map_entry_names() {
        assert_eq!(map_entry_name("tags"), "TagsEntry");
        assert_eq!(map_entry_name("stock_levels"), "StockLevelsEntry");
    }
}
