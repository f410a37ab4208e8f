//! Runtime field values and text coercion.

use std::fmt;

use crate::descriptor::{EnumDescriptor, FieldKind, ScalarType, SchemaRegistry};

/// A single scalar or enum value held by a message instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Enum value by number; unknown numbers are kept as-is.
    Enum(i32),
}

impl Value {
    /// Zero value of a scalar type.
    pub fn zero(scalar: ScalarType) -> Value {
        match scalar {
            ScalarType::Double => Value::Double(0.0),
            ScalarType::Float => Value::Float(0.0),
            ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32 => Value::I32(0),
            ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64 => Value::I64(0),
            ScalarType::Uint32 | ScalarType::Fixed32 => Value::U32(0),
            ScalarType::Uint64 | ScalarType::Fixed64 => Value::U64(0),
            ScalarType::Bool => Value::Bool(false),
            ScalarType::String => Value::String(String::new()),
            ScalarType::Bytes => Value::Bytes(Vec::new()),
        }
    }

    /// Default value for a non-message field kind; `None` for message fields.
    pub fn default_for(kind: FieldKind, registry: &SchemaRegistry) -> Option<Value> {
        match kind {
            FieldKind::Scalar(s) => Some(Value::zero(s)),
            FieldKind::Enum(id) => Some(Value::Enum(
                registry.enum_type(id).map(|e| e.default_number()).unwrap_or(0),
            )),
            FieldKind::Message(_) => None,
        }
    }

    /// Parse operator text for a scalar type. The error is a human-readable reason.
    pub fn parse_scalar(scalar: ScalarType, text: &str) -> Result<Value, String> {
        let t = text.trim();
        Ok(match scalar {
            ScalarType::String => return Ok(Value::String(text.to_string())),
            ScalarType::Bytes => return Ok(Value::Bytes(text.as_bytes().to_vec())),
            ScalarType::Bool => Value::Bool(parse_bool(t).ok_or_else(|| {
                format!("{:?} is not a valid bool", t)
            })?),
            ScalarType::Double => Value::Double(t.parse::<f64>().map_err(|e| invalid(t, scalar, e))?),
            ScalarType::Float => Value::Float(t.parse::<f32>().map_err(|e| invalid(t, scalar, e))?),
            ScalarType::Int32 | ScalarType::Sint32 | ScalarType::Sfixed32 => {
                Value::I32(t.parse::<i32>().map_err(|e| invalid(t, scalar, e))?)
            }
            ScalarType::Int64 | ScalarType::Sint64 | ScalarType::Sfixed64 => {
                Value::I64(t.parse::<i64>().map_err(|e| invalid(t, scalar, e))?)
            }
            ScalarType::Uint32 | ScalarType::Fixed32 => Value::U32(t.parse::<u32>().map_err(|e| invalid(t, scalar, e))?),
            ScalarType::Uint64 | ScalarType::Fixed64 => Value::U64(t.parse::<u64>().map_err(|e| invalid(t, scalar, e))?),
        })
    }

    /// Parse an enum value given either its name or its number.
    pub fn parse_enum(descriptor: &EnumDescriptor, text: &str) -> Result<Value, String> {
        let t = text.trim();
        if let Some(v) = descriptor.value_by_name(t) {
            return Ok(Value::Enum(v.number));
        }
        match t.parse::<i32>() {
            Ok(n) if descriptor.value_by_number(n).is_some() => Ok(Value::Enum(n)),
            _ => Err(format!("{:?} is not a value of {}", t, descriptor.full_name())),
        }
    }

    /// Whether this value is acceptable for a field of `kind`.
    pub fn fits(&self, kind: FieldKind) -> bool {
        match (kind, self) {
            (FieldKind::Enum(_), Value::Enum(_)) => true,
            (FieldKind::Scalar(s), v) => std::mem::discriminant(v) == std::mem::discriminant(&Value::zero(s)),
            _ => false,
        }
    }

    /// True for the proto3 default: zero numbers, `false`, empty text or bytes, enum 0.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Bool(b) => !b,
            Value::I32(x) => *x == 0,
            Value::I64(x) => *x == 0,
            Value::U32(x) => *x == 0,
            Value::U64(x) => *x == 0,
            Value::Float(x) => *x == 0.0 && x.is_sign_positive(),
            Value::Double(x) => *x == 0.0 && x.is_sign_positive(),
            Value::String(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Enum(n) => *n == 0,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "enum",
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U32(x) => Some(*x as u64),
            Value::U64(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I32(x) => Some(*x as i64),
            Value::I64(x) => Some(*x),
            Value::U32(x) => Some(*x as i64),
            Value::U64(x) => i64::try_from(*x).ok(),
            Value::Enum(x) => Some(*x as i64),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(x) => Some(*x),
            Value::Float(x) => Some(*x as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::I32(x) => write!(f, "{}", x),
            Value::I64(x) => write!(f, "{}", x),
            Value::U32(x) => write!(f, "{}", x),
            Value::U64(x) => write!(f, "{}", x),
            Value::Float(x) => write!(f, "{}", x),
            Value::Double(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => {
                f.write_str("0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::Enum(n) => write!(f, "#{}", n),
        }
    }
}

fn invalid(text: &str, scalar: ScalarType, e: impl fmt::Display) -> String {
    format!("{:?} is not a valid {}: {}", text, scalar, e)
}

fn parse_bool(t: &str) -> Option<bool> {
    match t.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_text_is_coerced_to_the_declared_width() {
        assert_eq!(Value::parse_scalar(ScalarType::Int32, " 42 "), Ok(Value::I32(42)));
        assert_eq!(Value::parse_scalar(ScalarType::Sint64, "-7"), Ok(Value::I64(-7)));
        assert_eq!(Value::parse_scalar(ScalarType::Fixed32, "7"), Ok(Value::U32(7)));
        assert!(Value::parse_scalar(ScalarType::Int32, "4000000000").is_err());
        assert!(Value::parse_scalar(ScalarType::Uint64, "-1").is_err());
        assert!(Value::parse_scalar(ScalarType::Int64, "").is_err());
        assert!(Value::parse_scalar(ScalarType::Int64, "abc").is_err());
    }

    #[test]
    fn text_and_bytes_are_taken_verbatim() {
        assert_eq!(
            Value::parse_scalar(ScalarType::String, " padded "),
            Ok(Value::String(" padded ".into()))
        );
        assert_eq!(
            Value::parse_scalar(ScalarType::Bytes, "ab"),
            Ok(Value::Bytes(vec![b'a', b'b']))
        );
    }

    #[test]
    fn bool_spellings() {
        for t in ["true", "TRUE", "1", "yes", "on"] {
            assert_eq!(Value::parse_scalar(ScalarType::Bool, t), Ok(Value::Bool(true)), "{}", t);
        }
        for t in ["false", "0", "No", "off"] {
            assert_eq!(Value::parse_scalar(ScalarType::Bool, t), Ok(Value::Bool(false)), "{}", t);
        }
        assert!(Value::parse_scalar(ScalarType::Bool, "maybe").is_err());
    }

    #[test]
    fn fits_checks_the_storage_variant() {
        assert!(Value::I32(1).fits(FieldKind::Scalar(ScalarType::Sfixed32)));
        assert!(!Value::I64(1).fits(FieldKind::Scalar(ScalarType::Int32)));
        assert!(!Value::String("x".into()).fits(FieldKind::Scalar(ScalarType::Bytes)));
    }

    #[test]
    fn zero_detection() {
        assert!(Value::zero(ScalarType::Double).is_zero());
        assert!(!Value::Double(-0.0).is_zero());
        assert!(!Value::String("a".into()).is_zero());
        assert!(Value::Enum(0).is_zero());
    }
}
