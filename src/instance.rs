//! Message instances: the mutable value tree built during one editing session.
//!
//! Fields are keyed by [`FieldId`], never by name. Mutation is crate-private and
//! goes through [`crate::assembler::Assembler`], which checks every write against
//! the descriptors first.

use std::collections::BTreeMap;

use crate::descriptor::{FieldId, MessageId};
use crate::value::Value;

/// One value slot: a scalar/enum or a nested message.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Scalar(Value),
    Message(MessageInstance),
}

impl Element {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Element::Scalar(v) => Some(v),
            Element::Message(_) => None,
        }
    }

    pub fn as_message(&self) -> Option<&MessageInstance> {
        match self {
            Element::Message(m) => Some(m),
            Element::Scalar(_) => None,
        }
    }
}

impl From<Value> for Element {
    fn from(v: Value) -> Self {
        Element::Scalar(v)
    }
}

impl From<MessageInstance> for Element {
    fn from(m: MessageInstance) -> Self {
        Element::Message(m)
    }
}

/// Contents of one field. Repeated slots are append-only and index-addressed.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSlot {
    Single(Element),
    Repeated(Vec<Element>),
}

impl FieldSlot {
    pub fn items(&self) -> &[Element] {
        match self {
            FieldSlot::Single(e) => std::slice::from_ref(e),
            FieldSlot::Repeated(items) => items,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageInstance {
    message: MessageId,
    fields: BTreeMap<FieldId, FieldSlot>,
}

impl MessageInstance {
    /// Empty instance: every field at its default.
    pub fn new(message: MessageId) -> Self {
        Self {
            message,
            fields: BTreeMap::new(),
        }
    }

    pub fn message(&self) -> MessageId {
        self.message
    }

    pub fn get(&self, field: FieldId) -> Option<&FieldSlot> {
        self.fields.get(&field)
    }

    pub fn is_set(&self, field: FieldId) -> bool {
        self.fields.contains_key(&field)
    }

    /// Value of a singular scalar field, if it was set.
    pub fn scalar(&self, field: FieldId) -> Option<&Value> {
        match self.fields.get(&field)? {
            FieldSlot::Single(e) => e.as_value(),
            FieldSlot::Repeated(_) => None,
        }
    }

    /// Singular nested message, if it was set.
    pub fn sub_message(&self, field: FieldId) -> Option<&MessageInstance> {
        match self.fields.get(&field)? {
            FieldSlot::Single(e) => e.as_message(),
            FieldSlot::Repeated(_) => None,
        }
    }

    /// Items of a repeated field; empty if none were appended.
    pub fn repeated(&self, field: FieldId) -> &[Element] {
        match self.fields.get(&field) {
            Some(FieldSlot::Repeated(items)) => items,
            _ => &[],
        }
    }

    /// Set fields in ascending `FieldId` order.
    pub fn fields(&self) -> impl Iterator<Item = (FieldId, &FieldSlot)> {
        self.fields.iter().map(|(id, slot)| (*id, slot))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub(crate) fn set(&mut self, field: FieldId, element: Element) {
        self.fields.insert(field, FieldSlot::Single(element));
    }

    pub(crate) fn clear(&mut self, field: FieldId) {
        self.fields.remove(&field);
    }

    /// Append and return the new item's index; `None` if the field holds a singular value.
    pub(crate) fn push(&mut self, field: FieldId, element: Element) -> Option<usize> {
        let slot = self
            .fields
            .entry(field)
            .or_insert_with(|| FieldSlot::Repeated(Vec::new()));
        match slot {
            FieldSlot::Repeated(items) => {
                items.push(element);
                Some(items.len() - 1)
            }
            FieldSlot::Single(_) => None,
        }
    }

    pub(crate) fn item_mut(&mut self, field: FieldId, index: usize) -> Option<&mut Element> {
        match self.fields.get_mut(&field)? {
            FieldSlot::Repeated(items) => items.get_mut(index),
            FieldSlot::Single(_) => None,
        }
    }

    /// Singular nested instance, created empty on first access.
    pub(crate) fn sub_message_mut(&mut self, field: FieldId, message: MessageId) -> Option<&mut MessageInstance> {
        let slot = self
            .fields
            .entry(field)
            .or_insert_with(|| FieldSlot::Single(Element::Message(MessageInstance::new(message))));
        match slot {
            FieldSlot::Single(Element::Message(m)) => Some(m),
            _ => None,
        }
    }
}
