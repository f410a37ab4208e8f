//! Parse protobuf IDL source into AST using PEST.

use crate::ast::*;
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct ProtoParser;

type Pair<'a> = pest::iterators::Pair<'a, Rule>;

/// Parse `.proto` source into AST.
pub fn parse(source: &str) -> Result<ProtoFile, String> {
    let pairs = ProtoParser::parse(Rule::proto_file, source)
        .map_err(|e| format!("Parse error: {}", e))?;
    let pair = pairs.into_iter().next().ok_or("Empty parse")?;
    build_file(pair)
}

fn build_file(pair: Pair) -> Result<ProtoFile, String> {
    let mut file = ProtoFile::default();
    let mut seen_package = false;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::syntax_decl => file.syntax = build_syntax(inner)?,
            Rule::import_decl => file.imports.push(build_import(inner)?),
            Rule::package_decl => {
                if seen_package {
                    return Err("multiple package declarations".to_string());
                }
                seen_package = true;
                let name = inner
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::full_ident)
                    .ok_or("package: missing name")?;
                file.package = Some(name.as_str().to_string());
            }
            Rule::option_decl => file.options.push(build_option(inner)?),
            Rule::message_def => file.messages.push(build_message(inner)?),
            Rule::enum_def => file.enums.push(build_enum(inner)?),
            Rule::service_def => file.services.push(build_service(inner)?),
            _ => {}
        }
    }

    Ok(file)
}

fn build_syntax(pair: Pair) -> Result<Syntax, String> {
    let lit = pair
        .into_inner()
        .find(|p| p.as_rule() == Rule::string_lit)
        .ok_or("syntax: missing value")?;
    match unquote(lit.as_str())?.as_str() {
        "proto2" => Ok(Syntax::Proto2),
        "proto3" => Ok(Syntax::Proto3),
        other => Err(format!("Unsupported syntax: {}", other)),
    }
}

fn build_import(pair: Pair) -> Result<Import, String> {
    let mut kind = ImportKind::Default;
    let mut path = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::import_modifier => {
                kind = match inner.as_str() {
                    "public" => ImportKind::Public,
                    _ => ImportKind::Weak,
                }
            }
            Rule::string_lit => path = Some(unquote(inner.as_str())?),
            _ => {}
        }
    }
    Ok(Import {
        path: path.ok_or("import: missing path")?,
        kind,
    })
}

fn build_option(pair: Pair) -> Result<OptionDecl, String> {
    let mut name = None;
    let mut value = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::option_name => name = Some(inner.as_str().to_string()),
            Rule::constant => value = Some(build_constant(inner)?),
            _ => {}
        }
    }
    Ok(OptionDecl {
        name: name.ok_or("option: missing name")?,
        value: value.ok_or("option: missing value")?,
    })
}

fn build_field_options(pair: Pair) -> Result<Vec<OptionDecl>, String> {
    pair.into_inner()
        .filter(|p| p.as_rule() == Rule::field_option)
        .map(build_option)
        .collect()
}

fn build_constant(pair: Pair) -> Result<Literal, String> {
    let inner = pair.into_inner().next().ok_or("Empty constant")?;
    match inner.as_rule() {
        Rule::bool_lit => Ok(Literal::Bool(inner.as_str() == "true")),
        Rule::int_lit => Ok(Literal::Int(parse_int(inner.as_str())?)),
        Rule::float_lit => parse_float(inner.as_str()).map(Literal::Float),
        Rule::string_lit => Ok(Literal::String(unquote(inner.as_str())?)),
        Rule::full_ident => Ok(Literal::Ident(inner.as_str().to_string())),
        Rule::aggregate => Ok(Literal::Aggregate(inner.as_str().to_string())),
        _ => Err(format!("Unhandled constant rule: {:?}", inner.as_rule())),
    }
}

// ==================== Messages ====================

fn build_message(pair: Pair) -> Result<MessageDef, String> {
    let mut msg = MessageDef::default();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => msg.name = inner.as_str().to_string(),
            Rule::field_def => msg.fields.push(build_field(inner)?),
            Rule::map_field => msg.fields.push(build_map_field(inner)?),
            Rule::oneof_def => {
                let index = msg.oneofs.len();
                let (name, fields) = build_oneof(inner, index)?;
                msg.oneofs.push(name);
                msg.fields.extend(fields);
            }
            Rule::message_def => msg.messages.push(build_message(inner)?),
            Rule::enum_def => msg.enums.push(build_enum(inner)?),
            Rule::reserved_decl => msg.reserved.extend(build_reserved(inner)?),
            Rule::option_decl => msg.options.push(build_option(inner)?),
            _ => {}
        }
    }
    if msg.name.is_empty() {
        return Err("message: missing name".to_string());
    }
    Ok(msg)
}

fn build_field(pair: Pair) -> Result<FieldDef, String> {
    let mut label = None;
    let mut type_name = None;
    let mut name = None;
    let mut number = None;
    let mut options = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::label => {
                label = Some(match inner.as_str() {
                    "optional" => Label::Optional,
                    "required" => Label::Required,
                    _ => Label::Repeated,
                })
            }
            Rule::type_ref => type_name = Some(inner.as_str().to_string()),
            Rule::ident => name = Some(inner.as_str().to_string()),
            Rule::int_lit => number = Some(parse_int(inner.as_str())?),
            Rule::field_options => options = build_field_options(inner)?,
            _ => {}
        }
    }
    Ok(FieldDef {
        name: name.ok_or("field: missing name")?,
        number: number.ok_or("field: missing number")?,
        label,
        type_spec: TypeSpec::Named(type_name.ok_or("field: missing type")?),
        options,
        oneof: None,
    })
}

fn build_map_field(pair: Pair) -> Result<FieldDef, String> {
    let mut types = Vec::with_capacity(2);
    let mut name = None;
    let mut number = None;
    let mut options = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::type_ref => types.push(inner.as_str().to_string()),
            Rule::ident => name = Some(inner.as_str().to_string()),
            Rule::int_lit => number = Some(parse_int(inner.as_str())?),
            Rule::field_options => options = build_field_options(inner)?,
            _ => {}
        }
    }
    let mut types = types.into_iter();
    let key = types.next().ok_or("map<K, V>: missing key type")?;
    let value = types.next().ok_or("map<K, V>: missing value type")?;
    Ok(FieldDef {
        name: name.ok_or("map field: missing name")?,
        number: number.ok_or("map field: missing number")?,
        label: None,
        type_spec: TypeSpec::Map { key, value },
        options,
        oneof: None,
    })
}

fn build_oneof(pair: Pair, index: usize) -> Result<(String, Vec<FieldDef>), String> {
    let mut name = String::new();
    let mut fields = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => name = inner.as_str().to_string(),
            Rule::oneof_field => {
                let mut field = build_field(inner)?;
                field.oneof = Some(index);
                fields.push(field);
            }
            _ => {}
        }
    }
    if name.is_empty() {
        return Err("oneof: missing name".to_string());
    }
    Ok((name, fields))
}

fn build_reserved(pair: Pair) -> Result<Vec<Reserved>, String> {
    let mut out = Vec::new();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::reserved_ranges => {
                for range in inner.into_inner() {
                    out.push(build_reserved_range(range)?);
                }
            }
            Rule::reserved_names => {
                for name in inner.into_inner() {
                    let s = match name.as_rule() {
                        Rule::string_lit => unquote(name.as_str())?,
                        _ => name.as_str().to_string(),
                    };
                    out.push(Reserved::Name(s));
                }
            }
            _ => {}
        }
    }
    Ok(out)
}

fn build_reserved_range(pair: Pair) -> Result<Reserved, String> {
    let mut start = None;
    let mut end = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::int_lit if start.is_none() => start = Some(parse_int(inner.as_str())?),
            Rule::int_lit => end = Some(parse_int(inner.as_str())?),
            Rule::kw_max => end = Some(i64::MAX),
            _ => {}
        }
    }
    let start = start.ok_or("reserved range: missing start")?;
    let end = end.unwrap_or(start);
    if end < start {
        return Err(format!("reserved range {} to {} is empty", start, end));
    }
    Ok(Reserved::Range { start, end })
}

// ==================== Enums and services ====================

fn build_enum(pair: Pair) -> Result<EnumDef, String> {
    let mut def = EnumDef::default();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => def.name = inner.as_str().to_string(),
            Rule::enum_value => {
                let mut it = inner.into_inner();
                let name = it.next().ok_or("enum value: name")?.as_str().to_string();
                let number = parse_int(it.next().ok_or("enum value: number")?.as_str())?;
                def.values.push(EnumValueDef { name, number });
            }
            Rule::option_decl => def.options.push(build_option(inner)?),
            _ => {}
        }
    }
    if def.name.is_empty() {
        return Err("enum: missing name".to_string());
    }
    if def.values.is_empty() {
        return Err(format!("enum {} has no values", def.name));
    }
    Ok(def)
}

fn build_service(pair: Pair) -> Result<ServiceDef, String> {
    let mut def = ServiceDef::default();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => def.name = inner.as_str().to_string(),
            Rule::rpc_def => {
                let mut name = String::new();
                let mut types = Vec::with_capacity(2);
                let mut streams = [false, false];
                for part in inner.into_inner() {
                    match part.as_rule() {
                        Rule::ident => name = part.as_str().to_string(),
                        // `stream` always precedes the type it applies to.
                        Rule::stream => streams[types.len().min(1)] = true,
                        Rule::type_ref => types.push(part.as_str().to_string()),
                        _ => {}
                    }
                }
                let mut types = types.into_iter();
                def.methods.push(MethodDef {
                    name,
                    input: types.next().ok_or("rpc: missing input type")?,
                    output: types.next().ok_or("rpc: missing output type")?,
                    client_streaming: streams[0],
                    server_streaming: streams[1],
                });
            }
            _ => {}
        }
    }
    Ok(def)
}

// ==================== Literal helpers ====================

fn parse_int(s: &str) -> Result<i64, String> {
    let s = s.trim();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let parsed = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if digits.len() > 1 && digits.starts_with('0') {
        u64::from_str_radix(&digits[1..], 8)
    } else {
        digits.parse::<u64>()
    };
    let magnitude = parsed.map_err(|_| format!("Invalid integer literal: {}", s))?;
    if negative {
        if magnitude > i64::MAX as u64 + 1 {
            return Err(format!("Integer literal out of range: {}", s));
        }
        Ok((magnitude as i64).wrapping_neg())
    } else {
        i64::try_from(magnitude).map_err(|_| format!("Integer literal out of range: {}", s))
    }
}

fn parse_float(s: &str) -> Result<f64, String> {
    let s = s.trim();
    let (sign, body) = match s.as_bytes().first() {
        Some(b'-') => (-1.0, &s[1..]),
        Some(b'+') => (1.0, &s[1..]),
        _ => (1.0, s),
    };
    match body {
        "inf" => Ok(sign * f64::INFINITY),
        "nan" => Ok(f64::NAN),
        _ => body
            .parse::<f64>()
            .map(|v| sign * v)
            .map_err(|_| format!("Invalid float literal: {}", s)),
    }
}

/// Strip quotes from a string literal and resolve escapes.
fn unquote(s: &str) -> Result<String, String> {
    let s = s.trim();
    if s.len() < 2 {
        return Err(format!("Invalid string literal: {}", s));
    }
    let inner = &s[1..s.len() - 1];
    let mut out = Vec::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let esc = chars.next().ok_or("dangling escape in string literal")?;
        match esc {
            'n' => out.push(b'\n'),
            't' => out.push(b'\t'),
            'r' => out.push(b'\r'),
            'a' => out.push(0x07),
            'b' => out.push(0x08),
            'f' => out.push(0x0c),
            'v' => out.push(0x0b),
            '\\' => out.push(b'\\'),
            '\'' => out.push(b'\''),
            '"' => out.push(b'"'),
            '?' => out.push(b'?'),
            'x' | 'X' => {
                let mut value = 0u32;
                let mut n = 0;
                while n < 2 {
                    match chars.peek().and_then(|c| c.to_digit(16)) {
                        Some(d) => {
                            value = value * 16 + d;
                            chars.next();
                            n += 1;
                        }
                        None => break,
                    }
                }
                if n == 0 {
                    return Err("\\x escape without hex digits".to_string());
                }
                out.push(value as u8);
            }
            '0'..='7' => {
                let mut value = esc.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(value as u8);
            }
            other => return Err(format!("unknown escape \\{} in string literal", other)),
        }
    }
    String::from_utf8(out).map_err(|_| "string literal is not valid UTF-8".to_string())
}
