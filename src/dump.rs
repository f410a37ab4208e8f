//! Format message instances for display (dump text, one-line summaries).
//! Enum values are shown by name when the registry knows the number.

use crate::descriptor::{FieldDescriptor, FieldKind, SchemaRegistry};
use crate::instance::{Element, FieldSlot, MessageInstance};
use crate::value::Value;

/// Scalar text for a field, with enum numbers replaced by their value names.
pub fn format_scalar(registry: &SchemaRegistry, field: &FieldDescriptor, v: &Value) -> String {
    if let (FieldKind::Enum(id), Value::Enum(n)) = (field.kind(), v) {
        if let Some(value) = registry.enum_type(id).and_then(|e| e.value_by_number(*n)) {
            return value.name.clone();
        }
    }
    v.to_string()
}

/// Multi-line dump of `instance`; unset fields are omitted, fields in declaration order.
pub fn instance_to_dump(registry: &SchemaRegistry, instance: &MessageInstance, indent: usize) -> String {
    let pad = "  ".repeat(indent);
    let name = registry
        .message(instance.message())
        .map(|m| m.full_name())
        .unwrap_or("?");
    let mut lines = vec![format!("{}{} {{", pad, name)];
    for (id, slot) in instance.fields() {
        let Some(field) = registry.field(id) else { continue };
        match slot {
            FieldSlot::Single(element) => {
                let text = element_to_dump(registry, field, element, indent + 1);
                lines.push(format!("{}  {}: {}", pad, field.name(), text.trim_start()));
            }
            FieldSlot::Repeated(items) => {
                if items.is_empty() {
                    continue;
                }
                lines.push(format!("{}  {}: [", pad, field.name()));
                for (i, item) in items.iter().enumerate() {
                    let text = element_to_dump(registry, field, item, indent + 2);
                    lines.push(format!("{}    [{}] {}", pad, i, text.trim_start()));
                }
                lines.push(format!("{}  ]", pad));
            }
        }
    }
    lines.push(format!("{}}}", pad));
    lines.join("\n")
}

fn element_to_dump(registry: &SchemaRegistry, field: &FieldDescriptor, element: &Element, indent: usize) -> String {
    match element {
        Element::Scalar(v) => format_scalar(registry, field, v),
        Element::Message(m) => instance_to_dump(registry, m, indent),
    }
}

/// First line of the dump plus the number of set fields, for list views.
pub fn instance_summary_line(registry: &SchemaRegistry, instance: &MessageInstance) -> String {
    let full = instance_to_dump(registry, instance, 0);
    let head = full.lines().next().map(|s| s.trim_end_matches(" {").to_string()).unwrap_or_default();
    format!("{} ({} fields set)", head, instance.len())
}
