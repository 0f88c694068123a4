//! Runtime objects produced by `Builder::build`: message factories,
//! message instances, enums and services.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use base64::Engine;

use crate::codec::{decoder, encoder, verify, wire};
use crate::error::{DecodeError, EncodeError, ValueError};
use crate::parser::ast::Options;
use crate::reflect::{FieldData, FieldType, NodeId, NodeKind, Schema, TypeRef};
use crate::types::FieldRule;
use crate::value::ProtoValue;

/// A message type of a built schema. Acts as the factory for [`Message`]
/// instances and as the entry point for decoding.
#[derive(Clone)]
pub struct MessageType {
    schema: Arc<Schema>,
    id: NodeId,
}

/// One row of a message's field table.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub id: i32,
    pub rule: FieldRule,
    /// Scalar keyword, or the fully qualified name of a message or enum.
    pub type_name: String,
    pub packed: bool,
}

impl MessageType {
    pub(crate) fn new(schema: Arc<Schema>, id: NodeId) -> Self {
        MessageType { schema, id }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn node_id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.schema.node(self.id).name()
    }

    /// Fully qualified name, e.g. `.pkg.Msg`.
    pub fn full_name(&self) -> String {
        self.schema.fqn(self.id)
    }

    pub(crate) fn field_ids(&self) -> &[NodeId] {
        self.schema.message_fields(self.id)
    }

    /// Position of a field in the field table.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_ids()
            .iter()
            .position(|&id| self.schema.node(id).name() == name)
    }

    /// Position of the field with the given wire id.
    pub fn field_index_by_id(&self, field_id: i32) -> Option<usize> {
        self.field_ids()
            .iter()
            .position(|&id| self.schema.field(id).is_some_and(|f| f.id == field_id))
    }

    /// The field table in declaration order.
    pub fn fields(&self) -> Vec<FieldDescriptor> {
        self.field_ids()
            .iter()
            .filter_map(|&id| {
                let data = self.schema.field(id)?;
                Some(FieldDescriptor {
                    name: self.schema.node(id).name().to_string(),
                    id: data.id,
                    rule: data.rule,
                    type_name: self.type_name_of(&data.field_type),
                    packed: data.encodes_packed(),
                })
            })
            .collect()
    }

    fn type_name_of(&self, field_type: &FieldType) -> String {
        match field_type {
            FieldType::Unresolved(name) => name.clone(),
            FieldType::Scalar(s) => s.keyword().to_string(),
            FieldType::Message(id) | FieldType::Enum(id) => self.schema.fqn(*id),
        }
    }

    pub fn options(&self) -> Option<&Options> {
        self.schema.message(self.id).map(|m| &m.options)
    }

    /// A message type declared inside this one.
    pub fn nested_type(&self, name: &str) -> Option<MessageType> {
        let child = self.schema.get_child(self.id, name)?;
        self.schema
            .message(child)
            .map(|_| MessageType::new(self.schema.clone(), child))
    }

    /// A new instance: `[]` for repeated fields, the declared default or
    /// null otherwise.
    pub fn new_message(&self) -> Message {
        let values = self
            .field_ids()
            .iter()
            .map(|&id| match self.schema.field(id) {
                Some(f) if f.is_repeated() => ProtoValue::List(Vec::new()),
                Some(f) => f.default.clone().unwrap_or_default(),
                None => ProtoValue::Null,
            })
            .collect();
        Message {
            ty: self.clone(),
            values,
        }
    }

    /// Build an instance from an `Object`, assigning every entry with `set`.
    /// An instance of this type is returned unchanged.
    pub fn from_value(&self, value: ProtoValue) -> Result<Message, ValueError> {
        match value {
            ProtoValue::Object(map) => {
                let mut msg = self.new_message();
                for (key, val) in map {
                    msg.set(&key, val)?;
                }
                Ok(msg)
            }
            ProtoValue::Message(m) if &m.ty == self => Ok(m),
            other => Err(ValueError::TypeMismatch {
                field: self.full_name(),
                expected: "object".into(),
                actual: other.type_name().into(),
            }),
        }
    }

    /// Shorthand for `from_value` over key-value pairs.
    pub fn from_fields<'a, I>(&self, fields: I) -> Result<Message, ValueError>
    where
        I: IntoIterator<Item = (&'a str, ProtoValue)>,
    {
        self.from_value(ProtoValue::from_fields(fields))
    }

    /// Assign arguments to fields in declaration order.
    pub fn from_positional(&self, args: Vec<ProtoValue>) -> Result<Message, ValueError> {
        let mut msg = self.new_message();
        for (index, arg) in args.into_iter().enumerate() {
            if index >= msg.values.len() {
                return Err(ValueError::UnknownField {
                    message: self.full_name(),
                    field: format!("#{}", index),
                });
            }
            msg.set_at(index, arg)?;
        }
        Ok(msg)
    }

    /// Construct from constructor-style arguments: none gives defaults, a
    /// single `Object` is applied by key, anything else is positional.
    pub fn construct(&self, args: Vec<ProtoValue>) -> Result<Message, ValueError> {
        match args.as_slice() {
            [] => Ok(self.new_message()),
            [ProtoValue::Object(_)] => {
                let mut args = args;
                self.from_value(args.remove(0))
            }
            _ => self.from_positional(args),
        }
    }

    pub fn decode(&self, buf: &[u8]) -> Result<Message, DecodeError> {
        decoder::decode(self, buf)
    }

    pub fn decode_hex(&self, text: &str) -> Result<Message, DecodeError> {
        self.decode(&hex::decode(text)?)
    }

    pub fn decode_base64(&self, text: &str) -> Result<Message, DecodeError> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(text)?;
        self.decode(&bytes)
    }

    /// Decode a varint length-prefixed message. Returns the message and the
    /// number of bytes consumed.
    pub fn decode_delimited(&self, buf: &[u8]) -> Result<(Message, usize), DecodeError> {
        let mut reader = wire::Reader::new(buf);
        let body = reader.read_bytes()?;
        let msg = self.decode(body)?;
        Ok((msg, reader.position()))
    }
}

impl PartialEq for MessageType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.schema, &other.schema)
    }
}

impl fmt::Debug for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageType({})", self.full_name())
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// An instance of a [`MessageType`]. Field values are stored in field table
/// order and always hold verified values.
#[derive(Clone)]
pub struct Message {
    ty: MessageType,
    values: Vec<ProtoValue>,
}

impl Message {
    pub fn message_type(&self) -> &MessageType {
        &self.ty
    }

    fn index_of(&self, name: &str) -> Result<usize, ValueError> {
        self.ty
            .field_index(name)
            .ok_or_else(|| ValueError::UnknownField {
                message: self.ty.full_name(),
                field: name.to_string(),
            })
    }

    /// The value of a field. Fails if `name` is not a declared field.
    pub fn get(&self, name: &str) -> Result<&ProtoValue, ValueError> {
        let index = self.index_of(name)?;
        Ok(&self.values[index])
    }

    /// Verify and store a field value.
    pub fn set(&mut self, name: &str, value: impl Into<ProtoValue>) -> Result<(), ValueError> {
        let index = self.index_of(name)?;
        self.set_at(index, value.into())
    }

    fn set_at(&mut self, index: usize, value: ProtoValue) -> Result<(), ValueError> {
        let field = self.ty.field_ids()[index];
        self.values[index] = verify::verify_value(&self.ty.schema, field, value, false)?;
        Ok(())
    }

    /// Verify and append one element to a repeated field.
    pub fn add(&mut self, name: &str, value: impl Into<ProtoValue>) -> Result<(), ValueError> {
        let index = self.index_of(name)?;
        let field = self.ty.field_ids()[index];
        if !self.ty.schema.field(field).is_some_and(FieldData::is_repeated) {
            return Err(ValueError::NotRepeated {
                field: self.ty.schema.fqn(field),
            });
        }
        let element = verify::verify_value(&self.ty.schema, field, value.into(), true)?;
        match &mut self.values[index] {
            ProtoValue::List(items) => items.push(element),
            slot => *slot = ProtoValue::List(vec![element]),
        }
        Ok(())
    }

    /// Field values in field table order.
    pub fn values(&self) -> &[ProtoValue] {
        &self.values
    }

    /// Store an already decoded value, bypassing verification.
    pub(crate) fn put_raw(&mut self, index: usize, value: ProtoValue, repeated: bool) {
        if repeated {
            match &mut self.values[index] {
                ProtoValue::List(items) => items.push(value),
                slot => *slot = ProtoValue::List(vec![value]),
            }
        } else {
            self.values[index] = value;
        }
    }

    pub(crate) fn extend_raw(&mut self, index: usize, items: Vec<ProtoValue>) {
        match &mut self.values[index] {
            ProtoValue::List(existing) => existing.extend(items),
            slot => *slot = ProtoValue::List(items),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        encoder::encode(self)
    }

    pub fn encode_hex(&self) -> Result<String, EncodeError> {
        Ok(hex::encode(self.encode()?))
    }

    pub fn encode_base64(&self) -> Result<String, EncodeError> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.encode()?))
    }

    /// Encode with a varint byte length prefix.
    pub fn encode_delimited(&self) -> Result<Vec<u8>, EncodeError> {
        let body = self.encode()?;
        let mut out = Vec::with_capacity(body.len() + wire::varint_len(body.len() as u64));
        wire::write_varint(&mut out, body.len() as u64);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Convert into a plain `Object`, recursively. Null fields are left out.
    pub fn to_value(&self) -> ProtoValue {
        let mut map = BTreeMap::new();
        for (&id, value) in self.ty.field_ids().iter().zip(&self.values) {
            if value.is_null() {
                continue;
            }
            map.insert(self.ty.schema.node(id).name().to_string(), plain(value));
        }
        ProtoValue::Object(map)
    }
}

fn plain(value: &ProtoValue) -> ProtoValue {
    match value {
        ProtoValue::Message(m) => m.to_value(),
        ProtoValue::List(items) => ProtoValue::List(items.iter().map(plain).collect()),
        other => other.clone(),
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && self.values == other.values
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.ty.name());
        for (&id, value) in self.ty.field_ids().iter().zip(&self.values) {
            s.field(self.ty.schema.node(id).name(), value);
        }
        s.finish()
    }
}

/// A service of a built schema.
#[derive(Clone)]
pub struct ServiceType {
    schema: Arc<Schema>,
    id: NodeId,
}

/// A resolved service method.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub request: MessageType,
    pub response: MessageType,
    pub options: Options,
}

impl ServiceType {
    pub fn name(&self) -> &str {
        self.schema.node(self.id).name()
    }

    pub fn full_name(&self) -> String {
        self.schema.fqn(self.id)
    }

    /// Methods in declaration order.
    pub fn methods(&self) -> Vec<MethodDescriptor> {
        self.schema
            .children(self.id)
            .iter()
            .filter_map(|&child| {
                let method = self.schema.method(child)?;
                let (TypeRef::Resolved(req), TypeRef::Resolved(resp)) =
                    (&method.request, &method.response)
                else {
                    return None;
                };
                Some(MethodDescriptor {
                    name: self.schema.node(child).name().to_string(),
                    request: MessageType::new(self.schema.clone(), *req),
                    response: MessageType::new(self.schema.clone(), *resp),
                    options: method.options.clone(),
                })
            })
            .collect()
    }

    pub fn method(&self, name: &str) -> Option<MethodDescriptor> {
        self.methods().into_iter().find(|m| m.name == name)
    }
}

impl fmt::Debug for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceType({})", self.full_name())
    }
}

/// The built runtime namespace tree.
#[derive(Debug, Clone)]
pub enum Built {
    Namespace(BTreeMap<String, Built>),
    /// A message factory plus the types declared inside it.
    Message {
        ty: MessageType,
        nested: BTreeMap<String, Built>,
    },
    /// Value name to id.
    Enum(BTreeMap<String, i32>),
    Service(ServiceType),
}

impl Built {
    /// Build the runtime object for a node. Fields, enum values and methods
    /// have no runtime object of their own.
    pub(crate) fn from_node(schema: &Arc<Schema>, id: NodeId) -> Option<Built> {
        match schema.node(id).kind() {
            NodeKind::Namespace(_) => Some(Built::Namespace(Self::build_children(schema, id))),
            NodeKind::Message(_) => Some(Built::Message {
                ty: MessageType::new(schema.clone(), id),
                nested: Self::build_children(schema, id),
            }),
            NodeKind::Enum(_) => Some(Built::Enum(
                schema
                    .enum_values(id)
                    .map(|(name, value)| (name.to_string(), value))
                    .collect(),
            )),
            NodeKind::Service(_) => Some(Built::Service(ServiceType {
                schema: schema.clone(),
                id,
            })),
            NodeKind::Field(_) | NodeKind::EnumValue(_) | NodeKind::Method(_) => None,
        }
    }

    fn build_children(schema: &Arc<Schema>, id: NodeId) -> BTreeMap<String, Built> {
        schema
            .children(id)
            .iter()
            .filter_map(|&child| {
                Self::from_node(schema, child)
                    .map(|built| (schema.node(child).name().to_string(), built))
            })
            .collect()
    }

    /// A direct child of a namespace or message.
    pub fn get(&self, name: &str) -> Option<&Built> {
        match self {
            Built::Namespace(map) | Built::Message { nested: map, .. } => map.get(name),
            _ => None,
        }
    }

    /// Walk a dotted path such as `pkg.Outer.Inner`.
    pub fn path(&self, dotted: &str) -> Option<&Built> {
        dotted
            .split('.')
            .filter(|part| !part.is_empty())
            .try_fold(self, |node, part| node.get(part))
    }

    pub fn as_message_type(&self) -> Option<&MessageType> {
        match self {
            Built::Message { ty, .. } => Some(ty),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&BTreeMap<String, i32>> {
        match self {
            Built::Enum(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_service(&self) -> Option<&ServiceType> {
        match self {
            Built::Service(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_namespace(&self) -> Option<&BTreeMap<String, Built>> {
        match self {
            Built::Namespace(map) => Some(map),
            _ => None,
        }
    }

    /// Shorthand for `path(dotted)?.as_message_type()`, cloned.
    pub fn message_type(&self, dotted: &str) -> Option<MessageType> {
        self.path(dotted)?.as_message_type().cloned()
    }
}
