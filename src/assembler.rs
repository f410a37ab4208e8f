//! Dynamic message assembly: descriptor-checked edits on one root instance, and
//! finalisation into encoded bytes.
//!
//! Every operation takes the target field's [`FieldId`]. Operations with an `_at`
//! suffix first walk an [`InstancePath`] from the root to a nested instance,
//! creating empty singular sub-messages on the way.

use std::fmt;
use std::sync::Arc;

use crate::codec::Codec;
use crate::descriptor::{FieldDescriptor, FieldId, FieldKind, MessageId, SchemaRegistry};
use crate::error::StructuralError;
use crate::instance::{Element, FieldSlot, MessageInstance};
use crate::value::Value;

/// One step from a message instance to a nested one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathStep {
    /// Singular message field.
    Field(FieldId),
    /// Item `index` of a repeated message field.
    Item(FieldId, usize),
}

/// Address of a nested instance relative to the root. Empty means the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct InstancePath(Vec<PathStep>);

impl InstancePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, step: PathStep) -> Self {
        let mut steps = self.0.clone();
        steps.push(step);
        Self(steps)
    }
}

impl From<Vec<PathStep>> for InstancePath {
    fn from(steps: Vec<PathStep>) -> Self {
        Self(steps)
    }
}

/// Immutable result of [`Assembler::finalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedMessage {
    full_name: String,
    bytes: Vec<u8>,
    instance: MessageInstance,
}

impl FinalizedMessage {
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn instance(&self) -> &MessageInstance {
        &self.instance
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl fmt::Display for FinalizedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.full_name, self.bytes.len())
    }
}

pub struct Assembler {
    codec: Codec,
    root: MessageInstance,
    cleared: Vec<(InstancePath, FieldId)>,
}

impl Assembler {
    pub fn new(registry: Arc<SchemaRegistry>, message: MessageId) -> Result<Self, StructuralError> {
        if registry.message(message).is_none() {
            return Err(StructuralError::UnknownMessage(format!("{:?}", message)));
        }
        Ok(Self {
            codec: Codec::new(registry),
            root: MessageInstance::new(message),
            cleared: Vec::new(),
        })
    }

    /// Start an instance of the message named `full_name`.
    pub fn for_message(registry: Arc<SchemaRegistry>, full_name: &str) -> Result<Self, StructuralError> {
        let id = registry
            .get_message(full_name)
            .map(|m| m.id())
            .ok_or_else(|| StructuralError::UnknownMessage(full_name.to_string()))?;
        Self::new(registry, id)
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        self.codec.registry()
    }

    pub fn instance(&self) -> &MessageInstance {
        &self.root
    }

    pub fn into_instance(self) -> MessageInstance {
        self.root
    }

    pub fn full_name(&self) -> &str {
        self.registry()
            .message(self.root.message())
            .map(|m| m.full_name())
            .unwrap_or_default()
    }

    /// Oneof members removed by edits since the last call, as `(owner, field)`.
    /// A removed message member takes everything nested in it along.
    pub fn take_cleared(&mut self) -> Vec<(InstancePath, FieldId)> {
        std::mem::take(&mut self.cleared)
    }

    /// Set a singular scalar or enum field on the root. Last write wins.
    pub fn set_scalar(&mut self, field: FieldId, value: Value) -> Result<(), StructuralError> {
        self.set_scalar_at(&InstancePath::root(), field, value)
    }

    /// Attach a nested instance to a singular message field on the root.
    pub fn set_message(&mut self, field: FieldId, sub: MessageInstance) -> Result<(), StructuralError> {
        self.set_message_at(&InstancePath::root(), field, sub)
    }

    /// Append to a repeated field on the root; returns the new item's index.
    pub fn append_repeated(&mut self, field: FieldId, element: Element) -> Result<usize, StructuralError> {
        self.append_repeated_at(&InstancePath::root(), field, element)
    }

    /// Replace item `index` of a repeated field on the root.
    pub fn set_repeated(&mut self, field: FieldId, index: usize, element: Element) -> Result<(), StructuralError> {
        self.set_repeated_at(&InstancePath::root(), field, index, element)
    }

    pub fn set_scalar_at(&mut self, path: &InstancePath, field: FieldId, value: Value) -> Result<(), StructuralError> {
        let registry = Arc::clone(self.codec.registry());
        let desc = singular(&registry, field)?;
        check_value(desc, &value)?;
        check_owner_id(&registry, message_at(&registry, &self.root, path)?, desc)?;
        let target = instance_at_mut(&registry, &mut self.root, path, &mut self.cleared)?;
        for sibling in clear_oneof_siblings(&registry, target, desc) {
            self.cleared.push((path.clone(), sibling));
        }
        target.set(field, Element::Scalar(value));
        tracing::debug!(field = desc.name(), "set scalar");
        Ok(())
    }

    pub fn set_message_at(
        &mut self,
        path: &InstancePath,
        field: FieldId,
        sub: MessageInstance,
    ) -> Result<(), StructuralError> {
        let registry = Arc::clone(self.codec.registry());
        let desc = singular(&registry, field)?;
        let element = Element::Message(sub);
        check_element(&registry, desc, &element)?;
        check_owner_id(&registry, message_at(&registry, &self.root, path)?, desc)?;
        let target = instance_at_mut(&registry, &mut self.root, path, &mut self.cleared)?;
        for sibling in clear_oneof_siblings(&registry, target, desc) {
            self.cleared.push((path.clone(), sibling));
        }
        target.set(field, element);
        tracing::debug!(field = desc.name(), "set message");
        Ok(())
    }

    pub fn append_repeated_at(
        &mut self,
        path: &InstancePath,
        field: FieldId,
        element: Element,
    ) -> Result<usize, StructuralError> {
        let registry = Arc::clone(self.codec.registry());
        let desc = repeated(&registry, field)?;
        check_element(&registry, desc, &element)?;
        check_owner_id(&registry, message_at(&registry, &self.root, path)?, desc)?;
        let target = instance_at_mut(&registry, &mut self.root, path, &mut self.cleared)?;
        let index = target.push(field, element).ok_or_else(|| kind_mismatch(desc, "repeated", "singular"))?;
        tracing::info!(field = desc.name(), index, "appended item");
        Ok(index)
    }

    pub fn set_repeated_at(
        &mut self,
        path: &InstancePath,
        field: FieldId,
        index: usize,
        element: Element,
    ) -> Result<(), StructuralError> {
        let registry = Arc::clone(self.codec.registry());
        let desc = repeated(&registry, field)?;
        check_element(&registry, desc, &element)?;
        let len = self.repeated_len(path, field)?;
        if index >= len {
            return Err(StructuralError::IndexOutOfRange {
                field: desc.name().to_string(),
                index,
                len,
            });
        }
        let target = instance_at_mut(&registry, &mut self.root, path, &mut self.cleared)?;
        let slot = target
            .item_mut(field, index)
            .ok_or_else(|| StructuralError::IndexOutOfRange {
                field: desc.name().to_string(),
                index,
                len,
            })?;
        *slot = element;
        tracing::debug!(field = desc.name(), index, "set item");
        Ok(())
    }

    /// Number of items currently in a repeated field of the instance at `path`.
    pub fn repeated_len(&self, path: &InstancePath, field: FieldId) -> Result<usize, StructuralError> {
        let registry = self.codec.registry();
        let desc = repeated(registry, field)?;
        check_owner_id(registry, message_at(registry, &self.root, path)?, desc)?;
        let mut current = &self.root;
        for step in path.steps() {
            let next = match *step {
                PathStep::Field(f) => current.sub_message(f),
                PathStep::Item(f, i) => current.repeated(f).get(i).and_then(Element::as_message),
            };
            match next {
                Some(m) => current = m,
                None => return Ok(0),
            }
        }
        Ok(current.repeated(field).len())
    }

    /// Validate the whole tree and encode it. No field is required; repeated
    /// calls without intervening edits return identical bytes.
    pub fn finalize(&self) -> Result<FinalizedMessage, StructuralError> {
        let registry = self.codec.registry();
        validate(registry, &self.root)?;
        let bytes = self.codec.encode_message(&self.root)?;
        let full_name = self.full_name().to_string();
        tracing::debug!(message = %full_name, bytes = bytes.len(), "finalized");
        Ok(FinalizedMessage {
            full_name,
            bytes,
            instance: self.root.clone(),
        })
    }
}

fn field_desc(registry: &SchemaRegistry, field: FieldId) -> Result<&FieldDescriptor, StructuralError> {
    registry.field(field).ok_or_else(|| StructuralError::ForeignField {
        message: registry
            .message(field.message())
            .map(|m| m.full_name().to_string())
            .unwrap_or_else(|| format!("{:?}", field.message())),
        field: format!("#{}", field.index()),
    })
}

fn singular(registry: &SchemaRegistry, field: FieldId) -> Result<&FieldDescriptor, StructuralError> {
    let desc = field_desc(registry, field)?;
    if desc.is_repeated() {
        return Err(kind_mismatch(desc, "singular", "repeated"));
    }
    Ok(desc)
}

fn repeated(registry: &SchemaRegistry, field: FieldId) -> Result<&FieldDescriptor, StructuralError> {
    let desc = field_desc(registry, field)?;
    if !desc.is_repeated() {
        return Err(kind_mismatch(desc, "repeated", "singular"));
    }
    Ok(desc)
}

fn kind_mismatch(desc: &FieldDescriptor, expected: &str, actual: &str) -> StructuralError {
    StructuralError::KindMismatch {
        field: desc.name().to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

fn check_value(desc: &FieldDescriptor, value: &Value) -> Result<(), StructuralError> {
    if value.fits(desc.kind()) {
        Ok(())
    } else {
        let expected = match desc.kind() {
            FieldKind::Scalar(s) => s.keyword().to_string(),
            FieldKind::Enum(_) => "enum".to_string(),
            FieldKind::Message(_) => "message".to_string(),
        };
        Err(kind_mismatch(desc, &expected, value.type_name()))
    }
}

fn check_element(registry: &SchemaRegistry, desc: &FieldDescriptor, element: &Element) -> Result<(), StructuralError> {
    match (desc.kind(), element) {
        (FieldKind::Message(expected), Element::Message(sub)) => {
            if sub.message() == expected {
                Ok(())
            } else {
                let actual = registry
                    .message(sub.message())
                    .map(|m| m.full_name().to_string())
                    .unwrap_or_default();
                Err(kind_mismatch(desc, desc.type_name(registry), &actual))
            }
        }
        (FieldKind::Message(_), Element::Scalar(v)) => Err(kind_mismatch(desc, desc.type_name(registry), v.type_name())),
        (_, Element::Scalar(v)) => check_value(desc, v),
        (_, Element::Message(_)) => Err(kind_mismatch(desc, desc.type_name(registry), "message")),
    }
}

fn check_owner(registry: &SchemaRegistry, target: &MessageInstance, desc: &FieldDescriptor) -> Result<(), StructuralError> {
    check_owner_id(registry, target.message(), desc)
}

fn check_owner_id(registry: &SchemaRegistry, owner: MessageId, desc: &FieldDescriptor) -> Result<(), StructuralError> {
    if desc.id().message() == owner {
        return Ok(());
    }
    Err(StructuralError::ForeignField {
        message: registry
            .message(owner)
            .map(|m| m.full_name().to_string())
            .unwrap_or_default(),
        field: desc.name().to_string(),
    })
}

/// Remove the set members of `desc`'s oneof other than `desc` itself and return them.
fn clear_oneof_siblings(registry: &SchemaRegistry, target: &mut MessageInstance, desc: &FieldDescriptor) -> Vec<FieldId> {
    let mut cleared = Vec::new();
    let Some(group) = desc.oneof() else {
        return cleared;
    };
    let Some(msg) = registry.message(desc.id().message()) else {
        return cleared;
    };
    for sibling in msg.fields() {
        if sibling.oneof() == Some(group) && sibling.id() != desc.id() && target.is_set(sibling.id()) {
            target.clear(sibling.id());
            tracing::debug!(field = sibling.name(), replaced_by = desc.name(), "oneof member cleared");
            cleared.push(sibling.id());
        }
    }
    cleared
}

/// Message type addressed by `path`, checked against the instance without
/// modifying it. Unset singular messages on the way count as empty.
fn message_at(registry: &SchemaRegistry, root: &MessageInstance, path: &InstancePath) -> Result<MessageId, StructuralError> {
    let mut current = Some(root);
    let mut message = root.message();
    for step in path.steps() {
        let (field, index) = match *step {
            PathStep::Field(field) => (field, None),
            PathStep::Item(field, index) => (field, Some(index)),
        };
        let desc = match index {
            Some(_) => repeated(registry, field)?,
            None => singular(registry, field)?,
        };
        check_owner_id(registry, message, desc)?;
        let FieldKind::Message(sub) = desc.kind() else {
            return Err(kind_mismatch(desc, "message", desc.type_name(registry)));
        };
        current = match index {
            None => current.and_then(|c| c.sub_message(field)),
            Some(index) => {
                let items = current.map(|c| c.repeated(field)).unwrap_or(&[]);
                match items.get(index) {
                    Some(Element::Message(m)) => Some(m),
                    Some(Element::Scalar(_)) => return Err(kind_mismatch(desc, "message", "scalar")),
                    None => {
                        return Err(StructuralError::IndexOutOfRange {
                            field: desc.name().to_string(),
                            index,
                            len: items.len(),
                        })
                    }
                }
            }
        };
        message = sub;
    }
    Ok(message)
}

/// Walk to the instance at `path`, creating unset singular sub-messages. Oneof
/// members displaced by a created sub-message are recorded in `cleared`.
fn instance_at_mut<'a>(
    registry: &SchemaRegistry,
    root: &'a mut MessageInstance,
    path: &InstancePath,
    cleared: &mut Vec<(InstancePath, FieldId)>,
) -> Result<&'a mut MessageInstance, StructuralError> {
    let mut current = root;
    let mut at = InstancePath::root();
    for step in path.steps() {
        current = match *step {
            PathStep::Field(field) => {
                let desc = singular(registry, field)?;
                check_owner(registry, current, desc)?;
                let FieldKind::Message(sub) = desc.kind() else {
                    return Err(kind_mismatch(desc, "message", desc.type_name(registry)));
                };
                if !current.is_set(field) {
                    for sibling in clear_oneof_siblings(registry, current, desc) {
                        cleared.push((at.clone(), sibling));
                    }
                }
                current
                    .sub_message_mut(field, sub)
                    .ok_or_else(|| kind_mismatch(desc, "message", "scalar"))?
            }
            PathStep::Item(field, index) => {
                let desc = repeated(registry, field)?;
                check_owner(registry, current, desc)?;
                let len = current.repeated(field).len();
                match current.item_mut(field, index) {
                    Some(Element::Message(m)) => m,
                    Some(Element::Scalar(_)) => return Err(kind_mismatch(desc, "message", "scalar")),
                    None => {
                        return Err(StructuralError::IndexOutOfRange {
                            field: desc.name().to_string(),
                            index,
                            len,
                        })
                    }
                }
            }
        };
        at = at.child(*step);
    }
    Ok(current)
}

/// Every set field must belong to its instance's message and hold a value of
/// the declared kind and cardinality.
fn validate(registry: &SchemaRegistry, instance: &MessageInstance) -> Result<(), StructuralError> {
    if registry.message(instance.message()).is_none() {
        return Err(StructuralError::UnknownMessage(format!("{:?}", instance.message())));
    }
    for (field, slot) in instance.fields() {
        let desc = field_desc(registry, field)?;
        check_owner(registry, instance, desc)?;
        match (slot, desc.is_repeated()) {
            (FieldSlot::Single(_), true) => return Err(kind_mismatch(desc, "repeated", "singular")),
            (FieldSlot::Repeated(_), false) => return Err(kind_mismatch(desc, "singular", "repeated")),
            _ => {}
        }
        for element in slot.items() {
            check_element(registry, desc, element)?;
            if let Element::Message(sub) = element {
                validate(registry, sub)?;
            }
        }
    }
    Ok(())
}
