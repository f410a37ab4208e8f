//! Protobuf binary wire encoding and decoding of [`MessageInstance`] trees.
//!
//! Encoding is deterministic: fields are written in ascending field number,
//! repeated items in index order. Implicit-presence (proto3 non-`optional`)
//! scalars equal to their zero value are omitted; everything else that is set
//! is written. Repeated numeric fields use the packed form when the descriptor
//! says so. Decoding accepts both packed and unpacked input and skips unknown
//! fields.

use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::descriptor::{FieldDescriptor, FieldKind, MessageId, ScalarType, SchemaRegistry};
use crate::instance::{Element, FieldSlot, MessageInstance};
use crate::value::Value;

const MAX_DEPTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WireType {
    Varint = 0,
    Fixed64 = 1,
    Len = 2,
    Fixed32 = 5,
}

impl WireType {
    fn from_tag(tag: u64) -> Result<Self, CodecError> {
        Ok(match tag & 7 {
            0 => WireType::Varint,
            1 => WireType::Fixed64,
            2 => WireType::Len,
            5 => WireType::Fixed32,
            other => return Err(CodecError::UnsupportedWireType(other as u8)),
        })
    }

    fn of(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Enum(_) => WireType::Varint,
            FieldKind::Message(_) => WireType::Len,
            FieldKind::Scalar(s) => match s {
                ScalarType::Double | ScalarType::Fixed64 | ScalarType::Sfixed64 => WireType::Fixed64,
                ScalarType::Float | ScalarType::Fixed32 | ScalarType::Sfixed32 => WireType::Fixed32,
                ScalarType::String | ScalarType::Bytes => WireType::Len,
                _ => WireType::Varint,
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown message: {0}")]
    UnknownMessage(String),
    #[error("field {field}: value {value} does not fit the declared type")]
    ValueMismatch { field: String, value: String },
    #[error("field {field}: wire type {actual} where {expected} was expected")]
    WireTypeMismatch { field: String, expected: u8, actual: u8 },
    #[error("unsupported wire type {0}")]
    UnsupportedWireType(u8),
    #[error("malformed input: {0}")]
    Malformed(String),
}

/// Wire codec bound to one schema registry.
#[derive(Debug, Clone)]
pub struct Codec {
    registry: Arc<SchemaRegistry>,
}

impl Codec {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Codec { registry }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Encode an instance tree to bytes.
    pub fn encode_message(&self, instance: &MessageInstance) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        self.encode_into(&mut out, instance, 0)?;
        Ok(out)
    }

    /// Decode bytes as the message named `full_name`.
    pub fn decode_message(&self, full_name: &str, bytes: &[u8]) -> Result<MessageInstance, CodecError> {
        let msg = self
            .registry
            .get_message(full_name)
            .ok_or_else(|| CodecError::UnknownMessage(full_name.to_string()))?;
        self.decode_as(msg.id(), bytes, 0)
    }

    fn encode_into(&self, w: &mut Vec<u8>, instance: &MessageInstance, depth: usize) -> Result<(), CodecError> {
        if depth > MAX_DEPTH {
            return Err(CodecError::Malformed("message nesting too deep".into()));
        }
        let msg = self
            .registry
            .message(instance.message())
            .ok_or_else(|| CodecError::UnknownMessage(format!("{:?}", instance.message())))?;

        let mut fields: Vec<&FieldDescriptor> = msg.fields().iter().collect();
        fields.sort_by_key(|f| f.number());

        for field in fields {
            let Some(slot) = instance.get(field.id()) else {
                continue;
            };
            match slot {
                FieldSlot::Single(element) => {
                    if !field.has_explicit_presence() {
                        if let Element::Scalar(v) = element {
                            if v.is_zero() {
                                continue;
                            }
                        }
                    }
                    self.encode_element(w, field, element, depth)?;
                }
                FieldSlot::Repeated(items) if items.is_empty() => {}
                FieldSlot::Repeated(items) if field.is_packed() => {
                    let mut packed = Vec::new();
                    for item in items {
                        let v = self.scalar_of(field, item)?;
                        write_scalar(&mut packed, field.kind(), v).map_err(|e| mismatch(field, v, e))?;
                    }
                    write_tag(w, field.number(), WireType::Len)?;
                    write_len_delimited(w, &packed)?;
                }
                FieldSlot::Repeated(items) => {
                    for item in items {
                        self.encode_element(w, field, item, depth)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn encode_element(
        &self,
        w: &mut Vec<u8>,
        field: &FieldDescriptor,
        element: &Element,
        depth: usize,
    ) -> Result<(), CodecError> {
        write_tag(w, field.number(), WireType::of(field.kind()))?;
        match (field.kind(), element) {
            (FieldKind::Message(expected), Element::Message(sub)) if sub.message() == expected => {
                let mut body = Vec::new();
                self.encode_into(&mut body, sub, depth + 1)?;
                write_len_delimited(w, &body)?;
                Ok(())
            }
            (kind, Element::Scalar(v)) if !kind.is_message() => {
                write_scalar(w, kind, v).map_err(|e| mismatch(field, v, e))
            }
            _ => Err(CodecError::ValueMismatch {
                field: field.name().to_string(),
                value: describe(element),
            }),
        }
    }

    fn scalar_of<'v>(&self, field: &FieldDescriptor, element: &'v Element) -> Result<&'v Value, CodecError> {
        element.as_value().ok_or_else(|| CodecError::ValueMismatch {
            field: field.name().to_string(),
            value: describe(element),
        })
    }

    fn decode_as(&self, message: MessageId, bytes: &[u8], depth: usize) -> Result<MessageInstance, CodecError> {
        if depth > MAX_DEPTH {
            return Err(CodecError::Malformed("message nesting too deep".into()));
        }
        let msg = self
            .registry
            .message(message)
            .ok_or_else(|| CodecError::UnknownMessage(format!("{:?}", message)))?;
        let mut instance = MessageInstance::new(message);
        let mut r = Cursor::new(bytes);

        while (r.position() as usize) < bytes.len() {
            let tag = read_varint(&mut r)?;
            let number = (tag >> 3) as u32;
            let wire = WireType::from_tag(tag)?;
            if number == 0 {
                return Err(CodecError::Malformed("field number 0".into()));
            }
            let Some(field) = msg.field_by_number(number) else {
                skip_field(&mut r, wire)?;
                continue;
            };
            let expected = WireType::of(field.kind());

            if field.is_repeated() && wire == WireType::Len && expected != WireType::Len {
                let body = read_len_delimited(&mut r)?;
                let mut inner = Cursor::new(body.as_slice());
                while (inner.position() as usize) < body.len() {
                    let v = read_scalar(&mut inner, field.kind())?;
                    push(&mut instance, field, Element::Scalar(v))?;
                }
                continue;
            }
            if wire != expected {
                return Err(CodecError::WireTypeMismatch {
                    field: field.name().to_string(),
                    expected: expected as u8,
                    actual: wire as u8,
                });
            }

            let element = match field.kind() {
                FieldKind::Message(sub) => {
                    let body = read_len_delimited(&mut r)?;
                    Element::Message(self.decode_as(sub, &body, depth + 1)?)
                }
                kind => Element::Scalar(read_scalar(&mut r, kind)?),
            };
            if field.is_repeated() {
                push(&mut instance, field, element)?;
            } else {
                // Last value wins; a repeated occurrence of a oneof member clears its siblings.
                if let Some(group) = field.oneof() {
                    for sibling in msg.fields().iter().filter(|f| f.oneof() == Some(group)) {
                        instance.clear(sibling.id());
                    }
                }
                instance.set(field.id(), element);
            }
        }
        Ok(instance)
    }
}

fn push(instance: &mut MessageInstance, field: &FieldDescriptor, element: Element) -> Result<(), CodecError> {
    instance
        .push(field.id(), element)
        .map(|_| ())
        .ok_or_else(|| CodecError::Malformed(format!("field {} is both singular and repeated", field.name())))
}

fn mismatch(field: &FieldDescriptor, v: &Value, e: CodecError) -> CodecError {
    match e {
        CodecError::ValueMismatch { .. } => CodecError::ValueMismatch {
            field: field.name().to_string(),
            value: format!("{} ({})", v, v.type_name()),
        },
        other => other,
    }
}

fn describe(element: &Element) -> String {
    match element {
        Element::Scalar(v) => format!("{} ({})", v, v.type_name()),
        Element::Message(_) => "<message>".to_string(),
    }
}

fn write_tag(w: &mut Vec<u8>, number: u32, wire: WireType) -> Result<(), CodecError> {
    write_varint(w, ((number as u64) << 3) | wire as u64)
}

fn write_varint(w: &mut Vec<u8>, mut v: u64) -> Result<(), CodecError> {
    while v >= 0x80 {
        w.write_u8((v as u8 & 0x7f) | 0x80)?;
        v >>= 7;
    }
    w.write_u8(v as u8)?;
    Ok(())
}

fn write_len_delimited(w: &mut Vec<u8>, body: &[u8]) -> Result<(), CodecError> {
    write_varint(w, body.len() as u64)?;
    w.write_all(body)?;
    Ok(())
}

fn zigzag32(n: i32) -> u64 {
    ((n << 1) ^ (n >> 31)) as u32 as u64
}

fn zigzag64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// Write one scalar without its tag. `ValueMismatch` carries no detail; the caller fills it in.
fn write_scalar(w: &mut Vec<u8>, kind: FieldKind, v: &Value) -> Result<(), CodecError> {
    let mismatch = || CodecError::ValueMismatch {
        field: String::new(),
        value: String::new(),
    };
    match (kind, v) {
        (FieldKind::Enum(_), Value::Enum(n)) => write_varint(w, *n as i64 as u64)?,
        (FieldKind::Scalar(s), v) => match (s, v) {
            (ScalarType::Int32, Value::I32(n)) => write_varint(w, *n as i64 as u64)?,
            (ScalarType::Int64, Value::I64(n)) => write_varint(w, *n as u64)?,
            (ScalarType::Uint32, Value::U32(n)) => write_varint(w, *n as u64)?,
            (ScalarType::Uint64, Value::U64(n)) => write_varint(w, *n)?,
            (ScalarType::Sint32, Value::I32(n)) => write_varint(w, zigzag32(*n))?,
            (ScalarType::Sint64, Value::I64(n)) => write_varint(w, zigzag64(*n))?,
            (ScalarType::Bool, Value::Bool(b)) => write_varint(w, *b as u64)?,
            (ScalarType::Fixed32, Value::U32(n)) => w.write_u32::<LittleEndian>(*n)?,
            (ScalarType::Sfixed32, Value::I32(n)) => w.write_i32::<LittleEndian>(*n)?,
            (ScalarType::Float, Value::Float(x)) => w.write_f32::<LittleEndian>(*x)?,
            (ScalarType::Fixed64, Value::U64(n)) => w.write_u64::<LittleEndian>(*n)?,
            (ScalarType::Sfixed64, Value::I64(n)) => w.write_i64::<LittleEndian>(*n)?,
            (ScalarType::Double, Value::Double(x)) => w.write_f64::<LittleEndian>(*x)?,
            (ScalarType::String, Value::String(s)) => write_len_delimited(w, s.as_bytes())?,
            (ScalarType::Bytes, Value::Bytes(b)) => write_len_delimited(w, b)?,
            _ => return Err(mismatch()),
        },
        _ => return Err(mismatch()),
    }
    Ok(())
}

fn read_varint(r: &mut Cursor<&[u8]>) -> Result<u64, CodecError> {
    let mut out = 0u64;
    for shift in (0..64).step_by(7) {
        let byte = r.read_u8()?;
        out |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(out);
        }
    }
    Err(CodecError::Malformed("varint longer than 10 bytes".into()))
}

fn read_len_delimited(r: &mut Cursor<&[u8]>) -> Result<Vec<u8>, CodecError> {
    let len = read_varint(r)?;
    let remaining = r.get_ref().len() as u64 - r.position();
    if len > remaining {
        return Err(CodecError::Malformed(format!(
            "length {} exceeds remaining {} bytes",
            len, remaining
        )));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn skip_field(r: &mut Cursor<&[u8]>, wire: WireType) -> Result<(), CodecError> {
    match wire {
        WireType::Varint => {
            read_varint(r)?;
        }
        WireType::Fixed64 => {
            r.read_u64::<LittleEndian>()?;
        }
        WireType::Fixed32 => {
            r.read_u32::<LittleEndian>()?;
        }
        WireType::Len => {
            read_len_delimited(r)?;
        }
    }
    Ok(())
}

fn read_scalar(r: &mut Cursor<&[u8]>, kind: FieldKind) -> Result<Value, CodecError> {
    let scalar = match kind {
        FieldKind::Enum(_) => return Ok(Value::Enum(read_varint(r)? as i32)),
        FieldKind::Message(_) => return Err(CodecError::Malformed("message read as scalar".into())),
        FieldKind::Scalar(s) => s,
    };
    Ok(match scalar {
        ScalarType::Int32 => Value::I32(read_varint(r)? as i32),
        ScalarType::Int64 => Value::I64(read_varint(r)? as i64),
        ScalarType::Uint32 => Value::U32(read_varint(r)? as u32),
        ScalarType::Uint64 => Value::U64(read_varint(r)?),
        ScalarType::Sint32 => Value::I32(unzigzag(read_varint(r)?) as i32),
        ScalarType::Sint64 => Value::I64(unzigzag(read_varint(r)?)),
        ScalarType::Bool => Value::Bool(read_varint(r)? != 0),
        ScalarType::Fixed32 => Value::U32(r.read_u32::<LittleEndian>()?),
        ScalarType::Sfixed32 => Value::I32(r.read_i32::<LittleEndian>()?),
        ScalarType::Float => Value::Float(r.read_f32::<LittleEndian>()?),
        ScalarType::Fixed64 => Value::U64(r.read_u64::<LittleEndian>()?),
        ScalarType::Sfixed64 => Value::I64(r.read_i64::<LittleEndian>()?),
        ScalarType::Double => Value::Double(r.read_f64::<LittleEndian>()?),
        ScalarType::String => {
            let bytes = read_len_delimited(r)?;
            Value::String(
                String::from_utf8(bytes).map_err(|e| CodecError::Malformed(format!("invalid UTF-8: {}", e)))?,
            )
        }
        ScalarType::Bytes => Value::Bytes(read_len_delimited(r)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SourceFile;
    use crate::parser::parse;

    fn registry(src: &str) -> Arc<SchemaRegistry> {
        let ast = parse(src).expect("parse");
        Arc::new(
            SchemaRegistry::link(&[SourceFile {
                name: "t.proto".into(),
                path: "t.proto".into(),
                ast,
            }])
            .expect("link"),
        )
    }

    fn set(instance: &mut MessageInstance, reg: &SchemaRegistry, msg: &str, field: &str, v: Value) {
        let id = reg.get_message(msg).unwrap().field_by_name(field).unwrap().id();
        instance.set(id, Element::Scalar(v));
    }

    #[test]
    fn varint_and_zigzag_bytes() {
        let mut w = Vec::new();
        write_varint(&mut w, 300).unwrap();
        assert_eq!(w, vec![0xac, 0x02]);
        assert_eq!(zigzag32(-1), 1);
        assert_eq!(zigzag32(1), 2);
        assert_eq!(zigzag64(-2), 3);
        assert_eq!(unzigzag(3), -2);
        let mut r = Cursor::new(&w[..]);
        assert_eq!(read_varint(&mut r).unwrap(), 300);
    }

    #[test]
    fn known_encoding_of_simple_message() {
        let reg = registry("syntax = \"proto3\"; message Test1 { int32 a = 1; string b = 2; }");
        let mut m = MessageInstance::new(reg.get_message("Test1").unwrap().id());
        set(&mut m, &reg, "Test1", "a", Value::I32(150));
        set(&mut m, &reg, "Test1", "b", Value::String("testing".into()));
        let bytes = Codec::new(reg).encode_message(&m).unwrap();
        assert_eq!(
            bytes,
            vec![0x08, 0x96, 0x01, 0x12, 0x07, b't', b'e', b's', b't', b'i', b'n', b'g']
        );
    }

    #[test]
    fn implicit_zero_is_omitted_but_optional_zero_is_written() {
        let reg = registry("syntax = \"proto3\"; message M { int32 a = 1; optional int32 b = 2; }");
        let mut m = MessageInstance::new(reg.get_message("M").unwrap().id());
        set(&mut m, &reg, "M", "a", Value::I32(0));
        set(&mut m, &reg, "M", "b", Value::I32(0));
        let bytes = Codec::new(reg).encode_message(&m).unwrap();
        assert_eq!(bytes, vec![0x10, 0x00]);
    }

    #[test]
    fn negative_int32_uses_ten_bytes() {
        let reg = registry("syntax = \"proto3\"; message M { int32 a = 1; }");
        let mut m = MessageInstance::new(reg.get_message("M").unwrap().id());
        set(&mut m, &reg, "M", "a", Value::I32(-1));
        let codec = Codec::new(reg);
        let bytes = codec.encode_message(&m).unwrap();
        assert_eq!(bytes.len(), 11);
        let back = codec.decode_message("M", &bytes).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn packed_repeated_round_trip() {
        let reg = registry("syntax = \"proto3\"; message M { repeated sint32 xs = 4; }");
        let field = reg.get_message("M").unwrap().field_by_name("xs").unwrap().id();
        let mut m = MessageInstance::new(reg.get_message("M").unwrap().id());
        for x in [3, -270, 86942] {
            m.push(field, Element::Scalar(Value::I32(x)));
        }
        let codec = Codec::new(reg);
        let bytes = codec.encode_message(&m).unwrap();
        assert_eq!(bytes[0], 0x22);
        let back = codec.decode_message("M", &bytes).unwrap();
        assert_eq!(back.repeated(field).len(), 3);
        assert_eq!(back, m);
    }

    #[test]
    fn unpacked_input_is_accepted_for_packed_fields() {
        let reg = registry("syntax = \"proto3\"; message M { repeated int32 xs = 1; }");
        let field = reg.get_message("M").unwrap().field_by_name("xs").unwrap().id();
        let back = Codec::new(reg).decode_message("M", &[0x08, 0x01, 0x08, 0x02]).unwrap();
        assert_eq!(
            back.repeated(field),
            &[Element::Scalar(Value::I32(1)), Element::Scalar(Value::I32(2))]
        );
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let reg = registry("syntax = \"proto3\"; message M { int32 a = 1; }");
        // field 9 (fixed32) then field 1 = 5
        let back = Codec::new(reg.clone())
            .decode_message("M", &[0x4d, 1, 2, 3, 4, 0x08, 0x05])
            .unwrap();
        let a = reg.get_message("M").unwrap().field_by_name("a").unwrap().id();
        assert_eq!(back.scalar(a), Some(&Value::I32(5)));
    }

    #[test]
    fn truncated_input_is_an_error() {
        let reg = registry("syntax = \"proto3\"; message M { string s = 1; }");
        let err = Codec::new(reg).decode_message("M", &[0x0a, 0x05, b'a']).unwrap_err();
        assert!(matches!(err, CodecError::Malformed(_)));
    }

    #[test]
    fn mismatched_value_is_rejected() {
        let reg = registry("syntax = \"proto3\"; message M { int64 a = 1; }");
        let mut m = MessageInstance::new(reg.get_message("M").unwrap().id());
        set(&mut m, &reg, "M", "a", Value::String("x".into()));
        let err = Codec::new(reg).encode_message(&m).unwrap_err();
        assert!(matches!(err, CodecError::ValueMismatch { ref field, .. } if field == "a"));
    }
}
