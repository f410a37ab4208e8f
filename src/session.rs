//! One editing session: a form tree and an assembler for a single message type.
//!
//! Edits address form paths. Text that cannot be coerced to the field's type
//! resets the field to its zero value (the first declared value for enums) and
//! reports [`EditOutcome::Reset`]; the session itself never fails on bad input.

use std::sync::Arc;

use crate::assembler::{Assembler, FinalizedMessage};
use crate::descriptor::{FieldKind, SchemaRegistry};
use crate::error::{EditError, StructuralError, SubmitError};
use crate::form::{FormNode, FormTree, NodeInfo};
use crate::instance::{Element, MessageInstance};
use crate::publish::Publisher;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    Applied(Value),
    /// The text was rejected and the field now holds `value`.
    Reset { value: Value, reason: String },
}

impl EditOutcome {
    pub fn value(&self) -> &Value {
        match self {
            EditOutcome::Applied(v) => v,
            EditOutcome::Reset { value, .. } => value,
        }
    }
}

pub struct EditSession {
    registry: Arc<SchemaRegistry>,
    tree: FormTree,
    assembler: Assembler,
    event_type: String,
}

impl EditSession {
    /// Start editing a fresh instance of `full_name`.
    pub fn new(registry: Arc<SchemaRegistry>, full_name: &str) -> Result<Self, StructuralError> {
        let assembler = Assembler::for_message(Arc::clone(&registry), full_name)?;
        let tree = FormTree::build(&registry, assembler.instance().message());
        tracing::info!(message = full_name, fields = tree.leaves().len(), "editing session started");
        Ok(Self {
            registry,
            tree,
            assembler,
            event_type: String::new(),
        })
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    pub fn full_name(&self) -> &str {
        self.assembler.full_name()
    }

    pub fn tree(&self) -> &FormTree {
        &self.tree
    }

    pub fn instance(&self) -> &MessageInstance {
        self.assembler.instance()
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn set_event_type(&mut self, event_type: impl Into<String>) {
        self.event_type = event_type.into();
    }

    /// Apply operator text to the scalar leaf at `path`.
    pub fn edit(&mut self, path: &str, text: &str) -> Result<EditOutcome, EditError> {
        let info = match self.tree.find(path) {
            Some(FormNode::Scalar(info)) => info.clone(),
            Some(_) => return Err(EditError::NotScalar(path.to_string())),
            None => return Err(EditError::UnknownPath(path.to_string())),
        };
        let desc = self
            .registry
            .field(info.field)
            .ok_or_else(|| EditError::UnknownPath(path.to_string()))?;

        let parsed = match desc.kind() {
            FieldKind::Scalar(s) => Value::parse_scalar(s, text),
            FieldKind::Enum(id) => match self.registry.enum_type(id) {
                Some(e) => Value::parse_enum(e, text),
                None => Err(format!("unknown enum for {}", desc.name())),
            },
            FieldKind::Message(_) => return Err(EditError::NotScalar(path.to_string())),
        };
        let outcome = match parsed {
            Ok(v) => EditOutcome::Applied(v),
            Err(reason) => {
                let value = Value::default_for(desc.kind(), &self.registry)
                    .ok_or_else(|| EditError::NotScalar(path.to_string()))?;
                tracing::warn!(path, %reason, "input rejected, field reset");
                EditOutcome::Reset { value, reason }
            }
        };

        self.store(&info, outcome.value().clone())?;
        self.sync_cleared();
        tracing::debug!(path, value = %outcome.value(), "edit applied");
        Ok(outcome)
    }

    fn store(&mut self, info: &NodeInfo, value: Value) -> Result<(), StructuralError> {
        match info.index {
            Some(index) => self
                .assembler
                .set_repeated_at(&info.owner, info.field, index, Element::Scalar(value)),
            None => self.assembler.set_scalar_at(&info.owner, info.field, value),
        }
    }

    /// Drop the form items of oneof members the last write displaced.
    fn sync_cleared(&mut self) {
        for (owner, field) in self.assembler.take_cleared() {
            if let Some(path) = self.tree.reset(&owner, field) {
                tracing::debug!(path, "oneof member cleared");
            }
        }
    }

    /// Append one item to the repeated field at `path` and return the item's path.
    /// Scalar items start at their zero value, message items empty.
    pub fn append(&mut self, path: &str) -> Result<String, EditError> {
        let (info, listed) = match self.tree.find(path) {
            Some(FormNode::Repeated { info, items }) => (info.clone(), items.len()),
            Some(_) => return Err(EditError::NotRepeated(path.to_string())),
            None => return Err(EditError::UnknownPath(path.to_string())),
        };
        let desc = self
            .registry
            .field(info.field)
            .ok_or_else(|| EditError::UnknownPath(path.to_string()))?;
        let element = match desc.kind() {
            FieldKind::Message(sub) => Element::Message(MessageInstance::new(sub)),
            kind => Element::Scalar(
                Value::default_for(kind, &self.registry).ok_or_else(|| EditError::NotRepeated(path.to_string()))?,
            ),
        };

        // The form and the instance must agree on the item count before either grows.
        let len = self.assembler.repeated_len(&info.owner, info.field)?;
        if len != listed {
            return Err(StructuralError::IndexOutOfRange {
                field: desc.name().to_string(),
                index: listed,
                len,
            }
            .into());
        }
        let index = self.assembler.append_repeated_at(&info.owner, info.field, element)?;
        self.sync_cleared();
        let item_path = self.tree.append(&self.registry, path)?.path().to_string();
        tracing::debug!(path = %item_path, index, "item appended");
        Ok(item_path)
    }

    /// Build the children of a collapsed recursive message node.
    pub fn expand(&mut self, path: &str) -> Result<(), EditError> {
        self.tree.expand(&self.registry, path)?;
        Ok(())
    }

    pub fn finalize(&self) -> Result<FinalizedMessage, StructuralError> {
        self.assembler.finalize()
    }

    /// Finalize and hand the message to `publisher`. On failure every value stays
    /// in place so the caller can retry.
    pub fn submit(&self, publisher: &dyn Publisher) -> Result<FinalizedMessage, SubmitError> {
        let message = self.finalize()?;
        match publisher.publish(&self.event_type, &message) {
            Ok(()) => {
                tracing::info!(message = %message, event_type = %self.event_type, "submitted");
                Ok(message)
            }
            Err(e) => {
                tracing::warn!(error = %e, "publish failed, values kept");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SourceFile;
    use crate::error::PublishError;
    use crate::parser::parse;
    use std::cell::RefCell;

    fn session(src: &str, message: &str) -> EditSession {
        let reg = SchemaRegistry::link(&[SourceFile {
            name: "t.proto".into(),
            path: "t.proto".into(),
            ast: parse(src).expect("parse"),
        }])
        .expect("link");
        EditSession::new(Arc::new(reg), message).expect("session")
    }

    const SCHEMA: &str = r#"
syntax = "proto3";
message Reading {
  enum Unit { UNIT_UNSPECIFIED = 0; CELSIUS = 1; KELVIN = 2; }
  int32 sensor = 1;
  double value = 2;
  Unit unit = 3;
  repeated int64 samples = 4;
  bool ok = 5;
}
"#;

    #[test]
    fn bad_numeric_text_resets_to_zero() {
        let mut s = session(SCHEMA, "Reading");
        assert_eq!(s.edit("sensor", "12").unwrap(), EditOutcome::Applied(Value::I32(12)));
        let outcome = s.edit("sensor", "twelve").unwrap();
        assert!(matches!(outcome, EditOutcome::Reset { value: Value::I32(0), .. }));
        let field = s.tree().find("sensor").unwrap().info().field;
        assert_eq!(s.instance().scalar(field), Some(&Value::I32(0)));
    }

    #[test]
    fn enum_accepts_names_and_numbers() {
        let mut s = session(SCHEMA, "Reading");
        assert_eq!(s.edit("unit", "KELVIN").unwrap(), EditOutcome::Applied(Value::Enum(2)));
        assert_eq!(s.edit("unit", "1").unwrap(), EditOutcome::Applied(Value::Enum(1)));
        assert!(matches!(
            s.edit("unit", "FAHRENHEIT").unwrap(),
            EditOutcome::Reset { value: Value::Enum(0), .. }
        ));
    }

    #[test]
    fn repeated_items_are_edited_by_index() {
        let mut s = session(SCHEMA, "Reading");
        assert_eq!(s.append("samples").unwrap(), "samples[0]");
        assert_eq!(s.append("samples").unwrap(), "samples[1]");
        s.edit("samples[1]", "99").unwrap();
        let field = s.tree().find("samples").unwrap().info().field;
        let values: Vec<_> = s.instance().repeated(field).iter().filter_map(Element::as_value).cloned().collect();
        assert_eq!(values, vec![Value::I64(0), Value::I64(99)]);
    }

    #[test]
    fn addressing_errors() {
        let mut s = session(SCHEMA, "Reading");
        assert!(matches!(s.edit("nope", "1"), Err(EditError::UnknownPath(_))));
        assert!(matches!(s.edit("samples", "1"), Err(EditError::NotScalar(_))));
        assert!(matches!(s.append("sensor"), Err(EditError::NotRepeated(_))));
    }

    const PAYMENT: &str = r#"
syntax = "proto3";
message Payment {
  oneof method { string card = 1; Plan plan = 2; }
}
message Plan { repeated int32 dates = 1; }
"#;

    #[test]
    fn switching_oneof_member_drops_its_items_from_the_form() {
        let mut s = session(PAYMENT, "Payment");
        assert_eq!(s.append("plan.dates").unwrap(), "plan.dates[0]");
        assert_eq!(s.append("plan.dates").unwrap(), "plan.dates[1]");
        s.edit("plan.dates[1]", "5").unwrap();

        s.edit("card", "4111").unwrap();
        let card = s.tree().find("card").unwrap().info().field;
        let plan = s.tree().find("plan").unwrap().info().field;
        let dates = s.tree().find("plan.dates").unwrap().info().field;
        assert!(s.instance().is_set(card));
        assert!(!s.instance().is_set(plan));
        assert!(s.tree().find("plan.dates[0]").is_none());
        assert!(matches!(s.edit("plan.dates[1]", "6"), Err(EditError::UnknownPath(_))));

        // Back to the plan: numbering restarts and the card goes away.
        assert_eq!(s.append("plan.dates").unwrap(), "plan.dates[0]");
        assert!(!s.instance().is_set(card));
        assert_eq!(s.instance().sub_message(plan).unwrap().repeated(dates).len(), 1);
        s.edit("plan.dates[0]", "9").unwrap();

        let sent = s.finalize().unwrap();
        let decoded = crate::codec::Codec::new(Arc::clone(s.registry()))
            .decode_message("Payment", sent.bytes())
            .unwrap();
        assert_eq!(&decoded, s.instance());
    }

    struct Recorder {
        fail: bool,
        seen: RefCell<Vec<(String, Vec<u8>)>>,
    }

    impl Publisher for Recorder {
        fn publish(&self, event_type: &str, message: &FinalizedMessage) -> Result<(), PublishError> {
            if self.fail {
                return Err(PublishError::Failed("broker unavailable".into()));
            }
            self.seen
                .borrow_mut()
                .push((event_type.to_string(), message.bytes().to_vec()));
            Ok(())
        }
    }

    #[test]
    fn failed_publish_keeps_values_for_retry() {
        let mut s = session(SCHEMA, "Reading").with_event_type("sensor.reading");
        s.edit("sensor", "3").unwrap();
        s.edit("ok", "yes").unwrap();

        let broken = Recorder {
            fail: true,
            seen: RefCell::new(Vec::new()),
        };
        assert!(matches!(s.submit(&broken), Err(SubmitError::Publish(_))));

        let working = Recorder {
            fail: false,
            seen: RefCell::new(Vec::new()),
        };
        let sent = s.submit(&working).unwrap();
        let seen = working.seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "sensor.reading");
        assert_eq!(seen[0].1, sent.bytes());
        assert_eq!(sent.bytes(), &[0x08, 0x03, 0x28, 0x01]);
    }
}
