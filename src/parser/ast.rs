//! Definition tree produced by the parser.
//!
//! With the `serde` feature these types also define the JSON schema format
//! accepted by `Builder::import_json`.

use std::collections::BTreeMap;

use crate::types::FieldRule;

/// Option name to value, e.g. `packed` -> `true`, `(my.opt)` -> `"x"`.
pub type Options = BTreeMap<String, OptionValue>;

/// The value of an option.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(::serde::Serialize, ::serde::Deserialize),
    serde(untagged)
)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    /// String literals and bare identifiers (enum constants).
    Str(String),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            OptionValue::Str(s) if s == "true" => Some(true),
            OptionValue::Str(s) if s == "false" => Some(false),
            _ => None,
        }
    }
}

/// A parsed schema file.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(::serde::Serialize, ::serde::Deserialize),
    serde(default)
)]
pub struct ProtoDef {
    pub syntax: Option<String>,
    pub package: Option<String>,
    pub imports: Vec<ImportDef>,
    pub options: Options,
    pub messages: Vec<MessageDef>,
    pub enums: Vec<EnumDef>,
    pub services: Vec<ServiceDef>,
    pub extends: Vec<ExtendDef>,
}

/// An import: a file path, or (JSON only) an inlined schema.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(::serde::Serialize, ::serde::Deserialize),
    serde(untagged)
)]
pub enum ImportDef {
    Path(String),
    Schema(Box<ProtoDef>),
}

/// A message definition.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct MessageDef {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub fields: Vec<FieldDef>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub enums: Vec<EnumDef>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub messages: Vec<MessageDef>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub extends: Vec<ExtendDef>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub options: Options,
    /// Inclusive extension id range.
    #[cfg_attr(feature = "serde", serde(default))]
    pub extensions: Option<[i32; 2]>,
}

/// A field definition within a message or extend block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct FieldDef {
    pub rule: FieldRule,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub type_name: String,
    pub name: String,
    pub id: i32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub options: Options,
}

/// An enum definition.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct EnumDef {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub values: Vec<EnumValueDef>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub options: Options,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct EnumValueDef {
    pub name: String,
    pub id: i32,
}

/// A service definition.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct ServiceDef {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub methods: Vec<MethodDef>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub options: Options,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct MethodDef {
    pub name: String,
    pub request: String,
    pub response: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub options: Options,
}

/// An `extend Target { ... }` block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct ExtendDef {
    #[cfg_attr(feature = "serde", serde(rename = "ref"))]
    pub target: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub fields: Vec<FieldDef>,
}

/// One definition handed to `Builder::create`.
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    Message(MessageDef),
    Enum(EnumDef),
    Service(ServiceDef),
    Extend(ExtendDef),
}

impl Definition {
    pub fn name(&self) -> &str {
        match self {
            Definition::Message(m) => &m.name,
            Definition::Enum(e) => &e.name,
            Definition::Service(s) => &s.name,
            Definition::Extend(x) => &x.target,
        }
    }
}

impl From<MessageDef> for Definition {
    fn from(def: MessageDef) -> Self {
        Definition::Message(def)
    }
}

impl From<EnumDef> for Definition {
    fn from(def: EnumDef) -> Self {
        Definition::Enum(def)
    }
}

impl From<ServiceDef> for Definition {
    fn from(def: ServiceDef) -> Self {
        Definition::Service(def)
    }
}

impl From<ExtendDef> for Definition {
    fn from(def: ExtendDef) -> Self {
        Definition::Extend(def)
    }
}

impl ProtoDef {
    /// All top-level definitions, extends last so their targets exist.
    pub fn definitions(&self) -> Vec<Definition> {
        let mut defs: Vec<Definition> = Vec::new();
        defs.extend(self.messages.iter().cloned().map(Definition::Message));
        defs.extend(self.enums.iter().cloned().map(Definition::Enum));
        defs.extend(self.services.iter().cloned().map(Definition::Service));
        defs.extend(self.extends.iter().cloned().map(Definition::Extend));
        defs
    }
}
