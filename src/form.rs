//! Field path trees: the editable structure derived from any message descriptor.
//!
//! Paths join field names with `.`; repeated items append `[k]`, so item 1 of
//! `order.items` is `order.items[1]` and its `sku` is `order.items[1].sku`.
//! A singular message field whose type already occurs among its ancestors is
//! built collapsed and expanded on request, which keeps recursive schemas finite.

use crate::assembler::{InstancePath, PathStep};
use crate::descriptor::{FieldDescriptor, FieldId, FieldKind, MessageId, SchemaRegistry};
use crate::error::EditError;

/// Location and presentation data shared by every node kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub path: String,
    pub field: FieldId,
    /// Instance holding this field.
    pub owner: InstancePath,
    /// Item index when this node is an element of a repeated field.
    pub index: Option<usize>,
    /// `path (label type)`.
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormNode {
    /// Editable scalar or enum.
    Scalar(NodeInfo),
    /// Singular message field, or one message item of a repeated field.
    /// `children` is `None` while collapsed.
    Message {
        info: NodeInfo,
        message: MessageId,
        children: Option<Vec<FormNode>>,
    },
    /// Repeated field; `items` grows through [`FormTree::append`].
    Repeated { info: NodeInfo, items: Vec<FormNode> },
}

impl FormNode {
    pub fn info(&self) -> &NodeInfo {
        match self {
            FormNode::Scalar(info) => info,
            FormNode::Message { info, .. } => info,
            FormNode::Repeated { info, .. } => info,
        }
    }

    pub fn path(&self) -> &str {
        &self.info().path
    }

    pub fn children(&self) -> &[FormNode] {
        match self {
            FormNode::Scalar(_) => &[],
            FormNode::Message { children, .. } => children.as_deref().unwrap_or(&[]),
            FormNode::Repeated { items, .. } => items,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        matches!(self, FormNode::Message { children: None, .. })
    }
}

#[derive(Debug, Clone)]
pub struct FormTree {
    message: MessageId,
    nodes: Vec<FormNode>,
}

impl FormTree {
    /// Build the tree for `message`, one node per field in declaration order.
    pub fn build(registry: &SchemaRegistry, message: MessageId) -> Self {
        let nodes = build_fields(registry, message, "", &InstancePath::root(), &mut vec![message]);
        FormTree { message, nodes }
    }

    pub fn message(&self) -> MessageId {
        self.message
    }

    pub fn nodes(&self) -> &[FormNode] {
        &self.nodes
    }

    pub fn find(&self, path: &str) -> Option<&FormNode> {
        find_in(&self.nodes, path)
    }

    /// Editable leaves in depth-first order.
    pub fn leaves(&self) -> Vec<&NodeInfo> {
        let mut out = Vec::new();
        collect_leaves(&self.nodes, &mut out);
        out
    }

    /// Every node path in depth-first order.
    pub fn paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_paths(&self.nodes, &mut out);
        out
    }

    /// Allocate the next item of the repeated field at `path` and return the
    /// new item's node. The caller appends the matching element to the instance.
    pub fn append(&mut self, registry: &SchemaRegistry, path: &str) -> Result<&FormNode, EditError> {
        let node = find_in_mut(&mut self.nodes, path).ok_or_else(|| EditError::UnknownPath(path.to_string()))?;
        let FormNode::Repeated { info, items } = node else {
            return Err(EditError::NotRepeated(path.to_string()));
        };
        let desc = registry
            .field(info.field)
            .ok_or_else(|| EditError::UnknownPath(path.to_string()))?;
        let index = items.len();
        let item = item_node(registry, desc, info, index);
        items.push(item);
        Ok(&items[index])
    }

    /// Drop every repeated item below the node for `field` of the instance at
    /// `owner`, once that field has been cleared in the instance. Returns the
    /// node's path, or `None` when no node matches.
    pub fn reset(&mut self, owner: &InstancePath, field: FieldId) -> Option<&str> {
        let node = find_field_mut(&mut self.nodes, owner, field)?;
        clear_items(node);
        Some(node.path())
    }

    /// Build the children of a collapsed message node at `path`.
    pub fn expand(&mut self, registry: &SchemaRegistry, path: &str) -> Result<&FormNode, EditError> {
        let node = find_in_mut(&mut self.nodes, path).ok_or_else(|| EditError::UnknownPath(path.to_string()))?;
        match &mut *node {
            FormNode::Message {
                info,
                message,
                children: children @ None,
            } => {
                let owner = message_owner(info);
                *children = Some(build_fields(registry, *message, &info.path, &owner, &mut vec![*message]));
            }
            _ => return Err(EditError::NotExpandable(path.to_string())),
        }
        Ok(node)
    }
}

/// Instance path addressing the message a `Message` node stands for.
fn message_owner(info: &NodeInfo) -> InstancePath {
    match info.index {
        Some(index) => info.owner.child(PathStep::Item(info.field, index)),
        None => info.owner.child(PathStep::Field(info.field)),
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn build_fields(
    registry: &SchemaRegistry,
    message: MessageId,
    prefix: &str,
    owner: &InstancePath,
    ancestors: &mut Vec<MessageId>,
) -> Vec<FormNode> {
    let Some(msg) = registry.message(message) else {
        return Vec::new();
    };
    msg.fields()
        .iter()
        .map(|field| field_node(registry, field, prefix, owner, ancestors))
        .collect()
}

fn field_node(
    registry: &SchemaRegistry,
    field: &FieldDescriptor,
    prefix: &str,
    owner: &InstancePath,
    ancestors: &mut Vec<MessageId>,
) -> FormNode {
    let path = join(prefix, field.name());
    let info = NodeInfo {
        label: format!("{} ({} {})", path, field.label_name(), field.type_name(registry)),
        path,
        field: field.id(),
        owner: owner.clone(),
        index: None,
    };

    if field.is_repeated() {
        return FormNode::Repeated {
            info,
            items: Vec::new(),
        };
    }
    let FieldKind::Message(sub) = field.kind() else {
        return FormNode::Scalar(info);
    };
    if ancestors.contains(&sub) {
        return FormNode::Message {
            info,
            message: sub,
            children: None,
        };
    }
    ancestors.push(sub);
    let children = build_fields(registry, sub, &info.path, &owner.child(PathStep::Field(field.id())), ancestors);
    ancestors.pop();
    FormNode::Message {
        info,
        message: sub,
        children: Some(children),
    }
}

fn item_node(registry: &SchemaRegistry, field: &FieldDescriptor, parent: &NodeInfo, index: usize) -> FormNode {
    let path = format!("{}[{}]", parent.path, index);
    let info = NodeInfo {
        label: format!("{} ({})", path, field.type_name(registry)),
        path,
        field: parent.field,
        owner: parent.owner.clone(),
        index: Some(index),
    };
    match field.kind() {
        FieldKind::Message(sub) => {
            let owner = parent.owner.child(PathStep::Item(parent.field, index));
            let children = build_fields(registry, sub, &info.path, &owner, &mut vec![sub]);
            FormNode::Message {
                info,
                message: sub,
                children: Some(children),
            }
        }
        _ => FormNode::Scalar(info),
    }
}

fn find_in<'a>(nodes: &'a [FormNode], path: &str) -> Option<&'a FormNode> {
    for node in nodes {
        let p = node.path();
        if p == path {
            return Some(node);
        }
        if is_prefix(p, path) {
            return find_in(node.children(), path);
        }
    }
    None
}

fn find_in_mut<'a>(nodes: &'a mut [FormNode], path: &str) -> Option<&'a mut FormNode> {
    let pos = nodes
        .iter()
        .position(|n| n.path() == path || is_prefix(n.path(), path))?;
    let node = &mut nodes[pos];
    if node.path() == path {
        return Some(node);
    }
    match node {
        FormNode::Scalar(_) => None,
        FormNode::Message { children, .. } => find_in_mut(children.as_deref_mut()?, path),
        FormNode::Repeated { items, .. } => find_in_mut(items, path),
    }
}

fn find_field_mut<'a>(nodes: &'a mut [FormNode], owner: &InstancePath, field: FieldId) -> Option<&'a mut FormNode> {
    for node in nodes {
        let info = node.info();
        if info.field == field && info.index.is_none() && info.owner == *owner {
            return Some(node);
        }
        let below = match node {
            FormNode::Scalar(_) => None,
            FormNode::Message { children, .. } => children
                .as_deref_mut()
                .and_then(|c| find_field_mut(c, owner, field)),
            FormNode::Repeated { items, .. } => find_field_mut(items, owner, field),
        };
        if below.is_some() {
            return below;
        }
    }
    None
}

fn clear_items(node: &mut FormNode) {
    match node {
        FormNode::Scalar(_) => {}
        FormNode::Message { children, .. } => {
            for child in children.iter_mut().flatten() {
                clear_items(child);
            }
        }
        FormNode::Repeated { items, .. } => items.clear(),
    }
}

/// Whether `path` lies strictly below the node at `prefix`.
fn is_prefix(prefix: &str, path: &str) -> bool {
    path.len() > prefix.len()
        && path.starts_with(prefix)
        && matches!(path.as_bytes()[prefix.len()], b'.' | b'[')
}

fn collect_leaves<'a>(nodes: &'a [FormNode], out: &mut Vec<&'a NodeInfo>) {
    for node in nodes {
        match node {
            FormNode::Scalar(info) => out.push(info),
            other => collect_leaves(other.children(), out),
        }
    }
}

fn collect_paths<'a>(nodes: &'a [FormNode], out: &mut Vec<&'a str>) {
    for node in nodes {
        out.push(node.path());
        collect_paths(node.children(), out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SourceFile;
    use crate::parser::parse;
    use std::collections::HashSet;

    fn registry(src: &str) -> SchemaRegistry {
        SchemaRegistry::link(&[SourceFile {
            name: "t.proto".into(),
            path: "t.proto".into(),
            ast: parse(src).expect("parse"),
        }])
        .expect("link")
    }

    const SCHEMA: &str = r#"
syntax = "proto3";
package shop;
message Address { string city = 1; string zip = 2; }
message Customer { int64 id = 1; Address address = 2; }
message Item { string sku = 1; int64 id = 2; }
message Order {
  int64 id = 1;
  Customer customer = 2;
  repeated Item items = 3;
  repeated string tags = 4;
}
"#;

    #[test]
    fn one_node_per_field_with_dotted_paths() {
        let reg = registry(SCHEMA);
        let order = reg.get_message("shop.Order").unwrap().id();
        let tree = FormTree::build(&reg, order);
        assert_eq!(
            tree.paths(),
            vec![
                "id",
                "customer",
                "customer.id",
                "customer.address",
                "customer.address.city",
                "customer.address.zip",
                "items",
                "tags",
            ]
        );
        let leaves: Vec<_> = tree.leaves().iter().map(|l| l.path.as_str()).collect();
        assert_eq!(leaves, vec!["id", "customer.id", "customer.address.city", "customer.address.zip"]);
        assert_eq!(tree.find("customer.address.city").unwrap().info().label, "customer.address.city (optional string)");
        assert_eq!(tree.find("items").unwrap().info().label, "items (repeated shop.Item)");
    }

    #[test]
    fn leaves_carry_distinct_field_ids_for_reused_names() {
        let reg = registry(SCHEMA);
        let tree = FormTree::build(&reg, reg.get_message("shop.Order").unwrap().id());
        let root_id = tree.find("id").unwrap().info().field;
        let customer_id = tree.find("customer.id").unwrap().info().field;
        assert_ne!(root_id, customer_id);
        let owner = &tree.find("customer.address.city").unwrap().info().owner;
        assert_eq!(owner.steps().len(), 2);
    }

    #[test]
    fn append_allocates_indexed_items() {
        let reg = registry(SCHEMA);
        let mut tree = FormTree::build(&reg, reg.get_message("shop.Order").unwrap().id());
        assert_eq!(tree.append(&reg, "items").unwrap().path(), "items[0]");
        assert_eq!(tree.append(&reg, "items").unwrap().path(), "items[1]");
        assert_eq!(tree.append(&reg, "tags").unwrap().path(), "tags[0]");

        let sku = tree.find("items[1].sku").expect("item sub-field");
        assert_eq!(sku.info().owner.steps(), &[PathStep::Item(tree.find("items").unwrap().info().field, 1)]);
        assert_eq!(tree.find("tags[0]").unwrap().info().index, Some(0));
        assert!(matches!(tree.append(&reg, "id"), Err(EditError::NotRepeated(_))));
        assert!(matches!(tree.append(&reg, "nope"), Err(EditError::UnknownPath(_))));

        let all: Vec<_> = tree.paths();
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), unique.len());
    }

    #[test]
    fn recursive_types_start_collapsed() {
        let reg = registry("syntax = \"proto3\"; message Node { int32 v = 1; Node next = 2; }");
        let mut tree = FormTree::build(&reg, reg.get_message("Node").unwrap().id());
        assert!(tree.find("next").unwrap().is_collapsed());
        assert!(tree.find("next.v").is_none());

        tree.expand(&reg, "next").unwrap();
        assert!(tree.find("next.v").is_some());
        assert!(tree.find("next.next").unwrap().is_collapsed());
        assert_eq!(tree.find("next.next").unwrap().info().owner.steps().len(), 1);
        assert!(matches!(tree.expand(&reg, "next"), Err(EditError::NotExpandable(_))));
    }
}
