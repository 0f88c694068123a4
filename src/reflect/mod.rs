//! Reflection model: the namespace tree of messages, fields, enums and
//! services.
//!
//! Nodes live in an arena owned by [`Schema`] and refer to each other by
//! [`NodeId`]. Parent links are plain ids, so they never own the parent.

use std::fmt;

use crate::codec::wire::WireType;
use crate::error::BuildError;
use crate::parser::ast::Options;
use crate::types::{FieldRule, ScalarType};
use crate::value::ProtoValue;

/// Index of a node in a [`Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The global root namespace.
    pub const ROOT: NodeId = NodeId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// The declared type of a field. Starts as `Unresolved` for anything that is
/// not a scalar keyword and is rewritten by `Builder::resolve_all`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Unresolved(String),
    Scalar(ScalarType),
    Message(NodeId),
    Enum(NodeId),
}

impl FieldType {
    pub fn from_name(name: &str) -> FieldType {
        match ScalarType::from_keyword(name) {
            Some(scalar) => FieldType::Scalar(scalar),
            None => FieldType::Unresolved(name.to_string()),
        }
    }

    /// The wire type of a single value, `None` while unresolved.
    pub fn wire_type(&self) -> Option<WireType> {
        match self {
            FieldType::Unresolved(_) => None,
            FieldType::Scalar(s) => Some(s.wire_type()),
            FieldType::Enum(_) => Some(WireType::Varint),
            FieldType::Message(_) => Some(WireType::LengthDelimited),
        }
    }

    /// Whether repeated values of this type may use packed encoding.
    pub fn is_packable(&self) -> bool {
        matches!(
            self.wire_type(),
            Some(WireType::Varint) | Some(WireType::Fixed32) | Some(WireType::Fixed64)
        )
    }
}

/// A request or response type of a service method.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Unresolved(String),
    Resolved(NodeId),
}

#[derive(Debug, Clone, Default)]
pub struct NamespaceData {
    pub children: Vec<NodeId>,
    pub options: Options,
}

#[derive(Debug, Clone, Default)]
pub struct MessageData {
    /// Every child: fields, nested messages, enums.
    pub children: Vec<NodeId>,
    /// The field descriptor table in declaration order.
    pub fields: Vec<NodeId>,
    /// Inclusive extension id range.
    pub extensions: Option<(i32, i32)>,
    pub options: Options,
}

#[derive(Debug, Clone)]
pub struct FieldData {
    pub rule: FieldRule,
    pub field_type: FieldType,
    pub id: i32,
    pub options: Options,
    /// Spelling before camel-case conversion.
    pub original_name: String,
    /// Namespace the type reference is resolved from. Differs from the
    /// parent for fields added through `extend`.
    pub scope: NodeId,
    pub packed: bool,
    /// Verified `default` option, filled in by resolution.
    pub default: Option<ProtoValue>,
}

impl FieldData {
    pub fn is_required(&self) -> bool {
        self.rule == FieldRule::Required
    }

    pub fn is_repeated(&self) -> bool {
        self.rule == FieldRule::Repeated
    }

    /// Packed encoding applies only to repeated packable types.
    pub fn encodes_packed(&self) -> bool {
        self.packed && self.is_repeated() && self.field_type.is_packable()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnumData {
    pub children: Vec<NodeId>,
    pub options: Options,
}

#[derive(Debug, Clone)]
pub struct EnumValueData {
    pub id: i32,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceData {
    pub children: Vec<NodeId>,
    pub options: Options,
}

#[derive(Debug, Clone)]
pub struct MethodData {
    pub request: TypeRef,
    pub response: TypeRef,
    pub options: Options,
}

/// The node variants of the reflection tree.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Namespace(NamespaceData),
    Message(MessageData),
    Field(FieldData),
    Enum(EnumData),
    EnumValue(EnumValueData),
    Service(ServiceData),
    Method(MethodData),
}

impl NodeKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeKind::Namespace(_) => "namespace",
            NodeKind::Message(_) => "message",
            NodeKind::Field(_) => "field",
            NodeKind::Enum(_) => "enum",
            NodeKind::EnumValue(_) => "enum value",
            NodeKind::Service(_) => "service",
            NodeKind::Method(_) => "method",
        }
    }

    fn accepts(&self, child: &NodeKind) -> bool {
        match self {
            NodeKind::Namespace(_) => matches!(
                child,
                NodeKind::Namespace(_)
                    | NodeKind::Message(_)
                    | NodeKind::Enum(_)
                    | NodeKind::Service(_)
            ),
            NodeKind::Message(_) => matches!(
                child,
                NodeKind::Field(_)
                    | NodeKind::Message(_)
                    | NodeKind::Enum(_)
                    | NodeKind::Namespace(_)
            ),
            NodeKind::Enum(_) => matches!(child, NodeKind::EnumValue(_)),
            NodeKind::Service(_) => matches!(child, NodeKind::Method(_)),
            _ => false,
        }
    }

    fn children(&self) -> &[NodeId] {
        match self {
            NodeKind::Namespace(d) => &d.children,
            NodeKind::Message(d) => &d.children,
            NodeKind::Enum(d) => &d.children,
            NodeKind::Service(d) => &d.children,
            _ => &[],
        }
    }

    fn children_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match self {
            NodeKind::Namespace(d) => Some(&mut d.children),
            NodeKind::Message(d) => Some(&mut d.children),
            NodeKind::Enum(d) => Some(&mut d.children),
            NodeKind::Service(d) => Some(&mut d.children),
            _ => None,
        }
    }

    /// The numeric id of fields and enum values.
    fn id(&self) -> Option<i32> {
        match self {
            NodeKind::Field(f) => Some(f.id),
            NodeKind::EnumValue(v) => Some(v.id),
            _ => None,
        }
    }
}

/// A node of the reflection tree.
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    parent: Option<NodeId>,
    kind: NodeKind,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The enclosing node; `None` only for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }
}

/// Key for child lookup: by name, or by field / enum value id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKey<'a> {
    Name(&'a str),
    Id(i32),
}

impl<'a> From<&'a str> for ChildKey<'a> {
    fn from(name: &'a str) -> Self {
        ChildKey::Name(name)
    }
}

impl From<i32> for ChildKey<'_> {
    fn from(id: i32) -> Self {
        ChildKey::Id(id)
    }
}

/// The reflection tree: an arena of nodes under a single root namespace.
#[derive(Debug, Clone)]
pub struct Schema {
    nodes: Vec<Node>,
}

impl Schema {
    /// Create a tree holding only the (unnamed) root namespace.
    pub fn new() -> Self {
        Schema {
            nodes: vec![Node {
                name: String::new(),
                parent: None,
                kind: NodeKind::Namespace(NamespaceData::default()),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.0].kind
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// All node ids in creation order, root first.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Ordered children of a namespace-like node.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).kind.children()
    }

    /// Insert a new node under `parent`.
    ///
    /// Name collisions fail unless one side is a field whose camel-cased name
    /// can fall back to its still-free original spelling. Field ids within a
    /// message and value ids within an enum must be unique.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: String,
        kind: NodeKind,
    ) -> Result<NodeId, BuildError> {
        if !self.node(parent).kind.accepts(&kind) {
            return Err(BuildError::InvalidDefinition {
                kind: kind.kind_name(),
                name,
                reason: format!(
                    "cannot be declared inside {} '{}'",
                    self.node(parent).kind.kind_name(),
                    self.fqn(parent)
                ),
            });
        }

        if let Some(id) = kind.id() {
            if self.get_child(parent, id).is_some() {
                return Err(BuildError::DuplicateId {
                    scope: self.fqn(parent),
                    id,
                });
            }
        }

        let mut name = name;
        if let Some(other) = self.get_child(parent, name.as_str()) {
            let other_original = match &self.node(other).kind {
                NodeKind::Field(f) if f.original_name != self.node(other).name => {
                    Some(f.original_name.clone())
                }
                _ => None,
            };
            let own_original = match &kind {
                NodeKind::Field(f) if f.original_name != name => Some(f.original_name.clone()),
                _ => None,
            };
            match (other_original, own_original) {
                (Some(orig), _) if self.get_child(parent, orig.as_str()).is_none() => {
                    self.nodes[other.0].name = orig;
                }
                (_, Some(orig)) if self.get_child(parent, orig.as_str()).is_none() => {
                    name = orig;
                }
                _ => {
                    return Err(BuildError::DuplicateName {
                        namespace: self.fqn(parent),
                        name,
                    });
                }
            }
        }

        let id = NodeId(self.nodes.len());
        let is_field = matches!(kind, NodeKind::Field(_));
        self.nodes.push(Node {
            name,
            parent: Some(parent),
            kind,
        });
        let parent_kind = &mut self.nodes[parent.0].kind;
        if let Some(children) = parent_kind.children_mut() {
            children.push(id);
        }
        if let (true, NodeKind::Message(msg)) = (is_field, parent_kind) {
            msg.fields.push(id);
        }
        Ok(id)
    }

    /// Find a direct child by name, or a field / enum value by id.
    pub fn get_child<'k>(&self, parent: NodeId, key: impl Into<ChildKey<'k>>) -> Option<NodeId> {
        let key = key.into();
        self.children(parent).iter().copied().find(|&child| {
            let node = self.node(child);
            match key {
                ChildKey::Name(name) => node.name == name,
                ChildKey::Id(id) => node.kind.id() == Some(id),
            }
        })
    }

    pub fn has_child<'k>(&self, parent: NodeId, key: impl Into<ChildKey<'k>>) -> bool {
        self.get_child(parent, key).is_some()
    }

    /// Resolve a dotted name starting at `from`.
    ///
    /// A leading dot anchors the lookup at the root. Otherwise the path is
    /// tried from `from` and then from each enclosing scope in turn. With
    /// `exclude_fields`, paths that would land on or pass through a field
    /// do not match.
    pub fn resolve(&self, from: NodeId, qualified: &str, exclude_fields: bool) -> Option<NodeId> {
        let (absolute, path) = match qualified.strip_prefix('.') {
            Some(rest) => (true, rest),
            None => (false, qualified),
        };
        if path.is_empty() {
            return None;
        }
        let parts: Vec<&str> = path.split('.').collect();

        let mut scope = Some(if absolute { self.root() } else { from });
        while let Some(current) = scope {
            if let Some(found) = self.walk(current, &parts, exclude_fields) {
                return Some(found);
            }
            if absolute {
                break;
            }
            scope = self.node(current).parent;
        }
        None
    }

    fn walk(&self, start: NodeId, parts: &[&str], exclude_fields: bool) -> Option<NodeId> {
        let mut ptr = start;
        for part in parts {
            let child = self.get_child(ptr, *part)?;
            if exclude_fields && matches!(self.node(child).kind, NodeKind::Field(_)) {
                return None;
            }
            ptr = child;
        }
        Some(ptr)
    }

    /// Resolve a dotted name from the root, e.g. `pkg.Msg` or `.pkg.Msg`.
    pub fn lookup(&self, qualified: &str) -> Option<NodeId> {
        let path = qualified.strip_prefix('.').unwrap_or(qualified);
        self.walk(self.root(), &path.split('.').collect::<Vec<_>>(), false)
    }

    /// Fully qualified name with a leading dot, e.g. `.pkg.Msg.field`.
    /// The root's name is the empty string.
    pub fn fqn(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut ptr = Some(id);
        while let Some(current) = ptr {
            let node = self.node(current);
            if node.parent.is_some() {
                parts.push(node.name.as_str());
            }
            ptr = node.parent;
        }
        parts.iter().rev().fold(String::new(), |mut acc, part| {
            acc.push('.');
            acc.push_str(part);
            acc
        })
    }

    pub fn message(&self, id: NodeId) -> Option<&MessageData> {
        match &self.node(id).kind {
            NodeKind::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn field(&self, id: NodeId) -> Option<&FieldData> {
        match &self.node(id).kind {
            NodeKind::Field(f) => Some(f),
            _ => None,
        }
    }

    pub fn enum_data(&self, id: NodeId) -> Option<&EnumData> {
        match &self.node(id).kind {
            NodeKind::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn method(&self, id: NodeId) -> Option<&MethodData> {
        match &self.node(id).kind {
            NodeKind::Method(m) => Some(m),
            _ => None,
        }
    }

    /// The field table of a message; empty for other nodes.
    pub fn message_fields(&self, id: NodeId) -> &[NodeId] {
        self.message(id).map_or(&[], |m| m.fields.as_slice())
    }

    /// Enum values as `(name, id)` pairs in declaration order.
    pub fn enum_values(&self, id: NodeId) -> impl Iterator<Item = (&str, i32)> + '_ {
        self.children(id).iter().filter_map(move |&child| {
            let node = self.node(child);
            match &node.kind {
                NodeKind::EnumValue(v) => Some((node.name.as_str(), v.id)),
                _ => None,
            }
        })
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Schema {
    /// Indented outline of the tree, one node per line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = vec![(self.root(), 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let node = self.node(id);
            if node.parent.is_some() {
                write!(
                    f,
                    "{:indent$}{} {}",
                    "",
                    node.kind.kind_name(),
                    node.name,
                    indent = depth * 2
                )?;
                if let Some(n) = node.kind.id() {
                    write!(f, " = {}", n)?;
                }
                writeln!(f)?;
            }
            let depth = if node.parent.is_some() { depth + 1 } else { depth };
            for &child in node.kind.children().iter().rev() {
                stack.push((child, depth));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, id: i32, scope: NodeId) -> NodeKind {
        NodeKind::Field(FieldData {
            rule: FieldRule::Optional,
            field_type: FieldType::Scalar(ScalarType::Int32),
            id,
            options: Options::new(),
            original_name: name.to_string(),
            scope,
            packed: false,
            default: None,
        })
    }

    fn message() -> NodeKind {
        NodeKind::Message(MessageData::default())
    }

    fn namespace() -> NodeKind {
        NodeKind::Namespace(NamespaceData::default())
    }

    #[test]
    fn test_fqn_and_lookup() {
        let mut schema = Schema::new();
        let a = schema.add_child(NodeId::ROOT, "a".into(), namespace()).unwrap();
        let m = schema.add_child(a, "M".into(), message()).unwrap();
        assert_eq!(schema.fqn(m), ".a.M");
        assert_eq!(schema.fqn(NodeId::ROOT), "");
        assert_eq!(schema.lookup("a.M"), Some(m));
        assert_eq!(schema.lookup(".a.M"), Some(m));
        assert_eq!(schema.lookup("a.X"), None);
    }

    #[test]
    fn test_duplicate_name_and_id() {
        let mut schema = Schema::new();
        let m = schema.add_child(NodeId::ROOT, "M".into(), message()).unwrap();
        schema.add_child(m, "a".into(), field("a", 1, m)).unwrap();
        assert!(matches!(
            schema.add_child(m, "a".into(), field("a", 2, m)),
            Err(BuildError::DuplicateName { .. })
        ));
        assert!(matches!(
            schema.add_child(m, "b".into(), field("b", 1, m)),
            Err(BuildError::DuplicateId { id: 1, .. })
        ));
    }

    #[test]
    fn test_camel_case_collision_reverts_to_original() {
        let mut schema = Schema::new();
        let m = schema.add_child(NodeId::ROOT, "M".into(), message()).unwrap();
        // `foo_bar` was camel-cased to `fooBar`; a literal `fooBar` arrives later.
        let first = schema.add_child(m, "fooBar".into(), field("foo_bar", 1, m)).unwrap();
        let second = schema.add_child(m, "fooBar".into(), field("fooBar", 2, m)).unwrap();
        assert_eq!(schema.node(first).name(), "foo_bar");
        assert_eq!(schema.node(second).name(), "fooBar");
    }

    #[test]
    fn test_get_child_by_id() {
        let mut schema = Schema::new();
        let m = schema.add_child(NodeId::ROOT, "M".into(), message()).unwrap();
        let f = schema.add_child(m, "x".into(), field("x", 7, m)).unwrap();
        assert_eq!(schema.get_child(m, 7), Some(f));
        assert!(schema.has_child(m, "x"));
        assert!(!schema.has_child(m, 8));
        assert_eq!(schema.message_fields(m), &[f]);
    }

    #[test]
    fn test_resolve_walks_outward() {
        let mut schema = Schema::new();
        let a = schema.add_child(NodeId::ROOT, "A".into(), namespace()).unwrap();
        let b = schema.add_child(a, "B".into(), namespace()).unwrap();
        let c = schema.add_child(b, "C".into(), message()).unwrap();
        let other = schema.add_child(b, "Other".into(), message()).unwrap();
        let top = schema.add_child(NodeId::ROOT, "Other".into(), message()).unwrap();

        assert_eq!(schema.resolve(c, "Other", true), Some(other));
        assert_eq!(schema.resolve(c, ".Other", true), Some(top));
        assert_eq!(schema.resolve(c, "B.Other", true), Some(other));
        assert_eq!(schema.resolve(c, "Missing", true), None);
    }

    #[test]
    fn test_resolve_excludes_fields() {
        let mut schema = Schema::new();
        let m = schema.add_child(NodeId::ROOT, "M".into(), message()).unwrap();
        let f = schema.add_child(m, "Inner".into(), field("Inner", 1, m)).unwrap();
        assert_eq!(schema.resolve(m, "Inner", false), Some(f));
        assert_eq!(schema.resolve(m, "Inner", true), None);
    }

    #[test]
    fn test_rejects_misplaced_children() {
        let mut schema = Schema::new();
        assert!(matches!(
            schema.add_child(NodeId::ROOT, "x".into(), field("x", 1, NodeId::ROOT)),
            Err(BuildError::InvalidDefinition { .. })
        ));
    }
}
