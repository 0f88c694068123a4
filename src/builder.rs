//! Materializes definition trees into the reflection tree, resolves type
//! references and builds the runtime namespace.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::codec::verify;
use crate::error::{BuildError, ProtoError, ResolveError, ValueError};
use crate::parser::ast::{
    Definition, EnumDef, ExtendDef, FieldDef, ImportDef, MessageDef, OptionValue, ProtoDef,
    ServiceDef,
};
use crate::reflect::{
    EnumData, EnumValueData, FieldData, FieldType, MessageData, MethodData, NamespaceData, NodeId,
    NodeKind, Schema, ServiceData, TypeRef,
};
use crate::runtime::{Built, MessageType};
use crate::types::{is_name, is_package_name, is_type_ref, to_camel_case, ID_MAX, ID_MIN};
use crate::value::ProtoValue;

/// Prefix of the descriptor schemas shipped with protoc.
const DESCRIPTOR_PREFIX: &str = "google/protobuf/";

/// Builder settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(::serde::Serialize, ::serde::Deserialize),
    serde(default)
)]
pub struct BuilderOptions {
    /// Store `snake_case` field names as `camelCase`.
    pub convert_field_names_to_camel_case: bool,
    /// Resolve relative import paths against this directory instead of the
    /// importing file's directory.
    pub import_root: Option<PathBuf>,
    /// Skip imports of `google/protobuf/*` and extends of
    /// `google.protobuf.*` messages.
    pub skip_descriptor_imports: bool,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        BuilderOptions {
            convert_field_names_to_camel_case: false,
            import_root: None,
            skip_descriptor_imports: true,
        }
    }
}

/// Builds a [`Schema`] from parsed definitions.
///
/// Mutation (`define`, `create`, `import*`) and use (`build`) are separate
/// phases: every mutation invalidates the previous resolution, and the next
/// `build` resolves again and hands out a fresh frozen snapshot.
#[derive(Debug)]
pub struct Builder {
    schema: Schema,
    cursor: NodeId,
    options: BuilderOptions,
    resolved: bool,
    imported: HashSet<PathBuf>,
    frozen: Option<Arc<Schema>>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self::with_options(BuilderOptions::default())
    }

    pub fn with_options(options: BuilderOptions) -> Self {
        Builder {
            schema: Schema::new(),
            cursor: NodeId::ROOT,
            options,
            resolved: false,
            imported: HashSet::new(),
            frozen: None,
        }
    }

    pub fn options(&self) -> &BuilderOptions {
        &self.options
    }

    /// The reflection tree under construction.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The namespace new definitions are created in.
    pub fn cursor(&self) -> NodeId {
        self.cursor
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Move the cursor back to the root namespace.
    pub fn reset(&mut self) -> &mut Self {
        self.cursor = NodeId::ROOT;
        self
    }

    fn touch(&mut self) {
        self.resolved = false;
        self.frozen = None;
    }

    /// Create (or reuse) the namespaces of a dotted package path and move the
    /// cursor into the innermost one.
    pub fn define(&mut self, package: &str) -> Result<&mut Self, BuildError> {
        if !is_package_name(package) {
            return Err(BuildError::IllegalPackage(package.to_string()));
        }
        self.touch();
        let mut ptr = self.cursor;
        for part in package.split('.') {
            ptr = match self.schema.get_child(ptr, part) {
                Some(existing) => match self.schema.node(existing).kind() {
                    NodeKind::Namespace(_) | NodeKind::Message(_) => existing,
                    other => {
                        return Err(BuildError::InvalidDefinition {
                            kind: "package",
                            name: package.to_string(),
                            reason: format!("'{}' is already a {}", part, other.kind_name()),
                        })
                    }
                },
                None => self.schema.add_child(
                    ptr,
                    part.to_string(),
                    NodeKind::Namespace(NamespaceData::default()),
                )?,
            };
        }
        debug!("Defined package {}", self.schema.fqn(ptr));
        self.cursor = ptr;
        Ok(self)
    }

    /// Materialize definitions into the namespace at the cursor.
    ///
    /// Nested definitions are processed from an explicit work list, so the
    /// nesting depth of a schema is not bounded by the call stack.
    pub fn create<I>(&mut self, defs: I) -> Result<&mut Self, BuildError>
    where
        I: IntoIterator<Item = Definition>,
    {
        self.touch();
        let defs: Vec<Definition> = defs.into_iter().collect();
        let mut stack: Vec<(NodeId, std::vec::IntoIter<Definition>)> =
            vec![(self.cursor, defs.into_iter())];

        loop {
            let Some((scope, pending)) = stack.last_mut() else {
                break;
            };
            let scope = *scope;
            let Some(def) = pending.next() else {
                stack.pop();
                continue;
            };

            match def {
                Definition::Message(msg) => {
                    let (id, nested) = self.create_message(scope, msg)?;
                    if !nested.is_empty() {
                        stack.push((id, nested.into_iter()));
                    }
                }
                Definition::Enum(e) => self.create_enum(scope, e)?,
                Definition::Service(s) => self.create_service(scope, s)?,
                Definition::Extend(x) => self.create_extend(scope, x)?,
            }
        }
        Ok(self)
    }

    fn create_message(
        &mut self,
        scope: NodeId,
        def: MessageDef,
    ) -> Result<(NodeId, Vec<Definition>), BuildError> {
        validate_message(&def)?;
        trace!("Creating message {} in {}", def.name, self.schema.fqn(scope));
        let id = self.schema.add_child(
            scope,
            def.name,
            NodeKind::Message(MessageData {
                extensions: def.extensions.map(|[lo, hi]| (lo, hi)),
                options: def.options,
                ..MessageData::default()
            }),
        )?;
        for field in &def.fields {
            self.add_field(id, id, field)?;
        }

        let mut nested: Vec<Definition> = Vec::new();
        nested.extend(def.enums.into_iter().map(Definition::Enum));
        nested.extend(def.messages.into_iter().map(Definition::Message));
        nested.extend(def.extends.into_iter().map(Definition::Extend));
        Ok((id, nested))
    }

    fn add_field(
        &mut self,
        parent: NodeId,
        scope: NodeId,
        def: &FieldDef,
    ) -> Result<NodeId, BuildError> {
        validate_field(def)?;
        let name = if self.options.convert_field_names_to_camel_case {
            to_camel_case(&def.name)
        } else {
            def.name.clone()
        };
        let packed = def
            .options
            .get("packed")
            .and_then(OptionValue::as_bool)
            .unwrap_or(false);
        self.schema.add_child(
            parent,
            name,
            NodeKind::Field(FieldData {
                rule: def.rule,
                field_type: FieldType::from_name(&def.type_name),
                id: def.id,
                options: def.options.clone(),
                original_name: def.name.clone(),
                scope,
                packed,
                default: None,
            }),
        )
    }

    fn create_enum(&mut self, scope: NodeId, def: EnumDef) -> Result<(), BuildError> {
        validate_enum(&def)?;
        trace!("Creating enum {} in {}", def.name, self.schema.fqn(scope));
        let id = self.schema.add_child(
            scope,
            def.name,
            NodeKind::Enum(EnumData {
                children: Vec::new(),
                options: def.options,
            }),
        )?;
        for value in def.values {
            self.schema.add_child(
                id,
                value.name,
                NodeKind::EnumValue(EnumValueData { id: value.id }),
            )?;
        }
        Ok(())
    }

    fn create_service(&mut self, scope: NodeId, def: ServiceDef) -> Result<(), BuildError> {
        validate_service(&def)?;
        trace!("Creating service {} in {}", def.name, self.schema.fqn(scope));
        let id = self.schema.add_child(
            scope,
            def.name,
            NodeKind::Service(ServiceData {
                children: Vec::new(),
                options: def.options,
            }),
        )?;
        for method in def.methods {
            self.schema.add_child(
                id,
                method.name,
                NodeKind::Method(MethodData {
                    request: TypeRef::Unresolved(method.request),
                    response: TypeRef::Unresolved(method.response),
                    options: method.options,
                }),
            )?;
        }
        Ok(())
    }

    fn create_extend(&mut self, scope: NodeId, def: ExtendDef) -> Result<(), BuildError> {
        validate_extend(&def)?;
        let target = self
            .schema
            .resolve(scope, &def.target, true)
            .filter(|&id| self.schema.message(id).is_some());
        let Some(target) = target else {
            let bare = def.target.strip_prefix('.').unwrap_or(&def.target);
            if self.options.skip_descriptor_imports && bare.starts_with("google.protobuf.") {
                trace!("Skipping extend of descriptor message {}", def.target);
                return Ok(());
            }
            return Err(BuildError::UndefinedExtendTarget(def.target));
        };

        let range = self.schema.message(target).and_then(|m| m.extensions);
        for field in &def.fields {
            let in_range = range.is_some_and(|(lo, hi)| field.id >= lo && field.id <= hi);
            if !in_range {
                return Err(BuildError::ExtensionRange {
                    message: self.schema.fqn(target),
                    field: field.name.clone(),
                    id: field.id,
                });
            }
            self.add_field(target, scope, field)?;
        }
        trace!(
            "Extended {} with {} field(s)",
            self.schema.fqn(target),
            def.fields.len()
        );
        Ok(())
    }

    /// Merge a parsed schema into the tree: its imports first, then its
    /// package, options and definitions. A file that was already imported
    /// is skipped.
    pub fn import(
        &mut self,
        def: ProtoDef,
        filename: Option<&Path>,
    ) -> Result<&mut Self, BuildError> {
        if let Some(path) = filename {
            if !self.imported.insert(import_key(path)) {
                trace!("Skipping already imported {}", path.display());
                return Ok(self);
            }
            debug!("Importing {}", path.display());
        }

        let ProtoDef {
            package,
            imports,
            options,
            ..
        } = &def;

        for import in imports {
            match import {
                ImportDef::Path(target) => {
                    if self.options.skip_descriptor_imports
                        && target.starts_with(DESCRIPTOR_PREFIX)
                    {
                        trace!("Skipping descriptor import {}", target);
                        continue;
                    }
                    let path = self.import_path(target, filename);
                    self.import_file(&path)?;
                }
                ImportDef::Schema(nested) => {
                    self.import((**nested).clone(), None)?;
                }
            }
        }

        self.reset();
        if let Some(package) = package {
            self.define(package)?;
        }
        if !options.is_empty() {
            if let NodeKind::Namespace(ns) = self.schema.kind_mut(self.cursor) {
                ns.options
                    .extend(options.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        self.create(def.definitions())?;
        self.reset();
        Ok(self)
    }

    fn import_path(&self, target: &str, importing: Option<&Path>) -> PathBuf {
        let target = Path::new(target);
        if target.is_absolute() {
            return target.to_path_buf();
        }
        if let Some(root) = &self.options.import_root {
            return root.join(target);
        }
        match importing.and_then(Path::parent) {
            Some(dir) => dir.join(target),
            None => target.to_path_buf(),
        }
    }

    /// Parse `.proto` text and import it.
    pub fn import_proto(
        &mut self,
        text: &str,
        filename: Option<&Path>,
    ) -> Result<&mut Self, ProtoError> {
        let def = crate::parser::parse(text)?;
        Ok(self.import(def, filename)?)
    }

    /// Import a schema in the JSON interchange format.
    #[cfg(feature = "serde")]
    pub fn import_json(
        &mut self,
        text: &str,
        filename: Option<&Path>,
    ) -> Result<&mut Self, BuildError> {
        let def: ProtoDef = serde_json::from_str(text)?;
        self.import(def, filename)
    }

    /// Load a `.proto` (or, with the `serde` feature, `.json`) schema file.
    pub fn import_file(&mut self, path: impl AsRef<Path>) -> Result<&mut Self, BuildError> {
        let path = path.as_ref();
        if self.imported.contains(&import_key(path)) {
            trace!("Skipping already imported {}", path.display());
            return Ok(self);
        }
        let text = fs::read_to_string(path).map_err(|source| BuildError::Import {
            path: path.to_path_buf(),
            source,
        })?;

        let def = parse_file(path, &text)?;
        self.import(def, Some(path))
    }

    /// Resolve every field and method type reference in the tree and verify
    /// field defaults. Does nothing if the tree is already resolved.
    pub fn resolve_all(&mut self) -> Result<&mut Self, ResolveError> {
        if self.resolved {
            return Ok(self);
        }
        let ids: Vec<NodeId> = self.schema.ids().collect();
        let mut fields = 0usize;
        let mut methods = 0usize;
        for id in ids {
            match self.schema.node(id).kind() {
                NodeKind::Field(_) => {
                    self.resolve_field(id)?;
                    fields += 1;
                }
                NodeKind::Method(_) => {
                    self.resolve_method(id)?;
                    methods += 1;
                }
                _ => {}
            }
        }
        debug!("Resolved {} field(s) and {} method(s)", fields, methods);
        self.resolved = true;
        Ok(self)
    }

    fn resolve_field(&mut self, id: NodeId) -> Result<(), ResolveError> {
        let Some(field) = self.schema.field(id) else {
            return Ok(());
        };
        if let FieldType::Unresolved(type_name) = &field.field_type {
            let resolved = self
                .schema
                .resolve(field.scope, type_name, true)
                .and_then(|target| match self.schema.node(target).kind() {
                    NodeKind::Message(_) => Some(FieldType::Message(target)),
                    NodeKind::Enum(_) => Some(FieldType::Enum(target)),
                    _ => None,
                })
                .ok_or_else(|| ResolveError::UnresolvableType {
                    type_name: type_name.clone(),
                    referenced_by: self.schema.fqn(id),
                })?;
            if let NodeKind::Field(f) = self.schema.kind_mut(id) {
                f.field_type = resolved;
            }
        }

        let default = self.verified_default(id)?;
        if let NodeKind::Field(f) = self.schema.kind_mut(id) {
            f.default = default;
        }
        Ok(())
    }

    fn verified_default(&self, id: NodeId) -> Result<Option<ProtoValue>, ResolveError> {
        let Some(field) = self.schema.field(id) else {
            return Ok(None);
        };
        let Some(raw) = field.options.get("default") else {
            return Ok(None);
        };
        let name = self.schema.fqn(id);
        let invalid = |reason: &str| ResolveError::InvalidDefault {
            field: name.clone(),
            source: ValueError::InvalidDefault {
                field: name.clone(),
                reason: reason.to_string(),
            },
        };
        if field.is_repeated() {
            return Err(invalid("repeated fields cannot have a default"));
        }
        let value = match raw {
            OptionValue::Bool(b) => ProtoValue::Bool(*b),
            OptionValue::Int(n) => ProtoValue::Int64(*n),
            OptionValue::Float(f) => ProtoValue::Double(*f),
            OptionValue::Str(s) => ProtoValue::Str(s.clone()),
        };
        let verified = match &field.field_type {
            FieldType::Scalar(scalar) => verify::coerce_scalar(&name, *scalar, value),
            FieldType::Enum(enum_id) => verify::coerce_enum(&self.schema, *enum_id, &name, value),
            FieldType::Message(_) => return Err(invalid("message fields cannot have a default")),
            FieldType::Unresolved(_) => return Err(invalid("type is not resolved")),
        };
        verified.map(Some).map_err(|source| ResolveError::InvalidDefault {
            field: name.clone(),
            source,
        })
    }

    fn resolve_method(&mut self, id: NodeId) -> Result<(), ResolveError> {
        let Some(scope) = self.schema.node(id).parent() else {
            return Ok(());
        };
        let Some(method) = self.schema.method(id) else {
            return Ok(());
        };
        let request = self.resolve_message_ref(scope, id, &method.request)?;
        let response = self.resolve_message_ref(scope, id, &method.response)?;
        if let NodeKind::Method(m) = self.schema.kind_mut(id) {
            m.request = request;
            m.response = response;
        }
        Ok(())
    }

    fn resolve_message_ref(
        &self,
        scope: NodeId,
        method: NodeId,
        type_ref: &TypeRef,
    ) -> Result<TypeRef, ResolveError> {
        let type_name = match type_ref {
            TypeRef::Resolved(_) => return Ok(type_ref.clone()),
            TypeRef::Unresolved(name) => name,
        };
        let target = self
            .schema
            .resolve(scope, type_name, true)
            .ok_or_else(|| ResolveError::UnresolvableType {
                type_name: type_name.clone(),
                referenced_by: self.schema.fqn(method),
            })?;
        if self.schema.message(target).is_none() {
            return Err(ResolveError::NotAMessage {
                type_name: type_name.clone(),
                referenced_by: self.schema.fqn(method),
            });
        }
        Ok(TypeRef::Resolved(target))
    }

    /// A frozen, shareable copy of the resolved tree.
    pub fn snapshot(&mut self) -> Result<Arc<Schema>, ResolveError> {
        self.resolve_all()?;
        if let Some(frozen) = &self.frozen {
            return Ok(frozen.clone());
        }
        let frozen = Arc::new(self.schema.clone());
        self.frozen = Some(frozen.clone());
        Ok(frozen)
    }

    /// Resolve (once) and build the runtime namespace, or the sub-object at
    /// a dotted path.
    pub fn build(&mut self, path: Option<&str>) -> Result<Built, BuildError> {
        let schema = self.snapshot()?;
        let root = Built::from_node(&schema, schema.root())
            .unwrap_or_else(|| Built::Namespace(BTreeMap::new()));
        debug!("Built namespace with {} node(s)", schema.len());
        match path {
            None => Ok(root),
            Some(path) => root
                .path(path)
                .cloned()
                .ok_or_else(|| BuildError::UnknownPath(path.to_string())),
        }
    }

    /// Build and return the message type at a dotted path.
    pub fn message_type(&mut self, path: &str) -> Result<MessageType, BuildError> {
        match self.build(Some(path))? {
            Built::Message { ty, .. } => Ok(ty),
            _ => Err(BuildError::UnknownPath(path.to_string())),
        }
    }
}

fn parse_proto_file(path: &Path, text: &str) -> Result<ProtoDef, BuildError> {
    crate::parser::parse(text).map_err(|source| BuildError::ImportParse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(feature = "serde")]
fn parse_file(path: &Path, text: &str) -> Result<ProtoDef, BuildError> {
    if path.extension().is_some_and(|ext| ext == "json") {
        return Ok(serde_json::from_str(text)?);
    }
    parse_proto_file(path, text)
}

#[cfg(not(feature = "serde"))]
fn parse_file(path: &Path, text: &str) -> Result<ProtoDef, BuildError> {
    parse_proto_file(path, text)
}

fn import_key(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn invalid(kind: &'static str, name: &str, reason: impl Into<String>) -> BuildError {
    BuildError::InvalidDefinition {
        kind,
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn validate_message(def: &MessageDef) -> Result<(), BuildError> {
    if !is_name(&def.name) {
        return Err(invalid("message", &def.name, "illegal name"));
    }
    if let Some([lo, hi]) = def.extensions {
        if lo < ID_MIN || hi > ID_MAX || lo > hi {
            return Err(invalid(
                "message",
                &def.name,
                format!("illegal extension range {} to {}", lo, hi),
            ));
        }
    }
    Ok(())
}

fn validate_field(def: &FieldDef) -> Result<(), BuildError> {
    if !is_name(&def.name) {
        return Err(invalid("field", &def.name, "illegal name"));
    }
    if !is_type_ref(&def.type_name) {
        return Err(invalid(
            "field",
            &def.name,
            format!("illegal type '{}'", def.type_name),
        ));
    }
    if def.id < ID_MIN || def.id > ID_MAX {
        return Err(invalid("field", &def.name, format!("illegal id {}", def.id)));
    }
    Ok(())
}

fn validate_enum(def: &EnumDef) -> Result<(), BuildError> {
    if !is_name(&def.name) {
        return Err(invalid("enum", &def.name, "illegal name"));
    }
    if def.values.is_empty() {
        return Err(invalid("enum", &def.name, "must have at least one value"));
    }
    if let Some(value) = def.values.iter().find(|v| !is_name(&v.name)) {
        return Err(invalid(
            "enum",
            &def.name,
            format!("illegal value name '{}'", value.name),
        ));
    }
    Ok(())
}

fn validate_service(def: &ServiceDef) -> Result<(), BuildError> {
    if !is_name(&def.name) {
        return Err(invalid("service", &def.name, "illegal name"));
    }
    for method in &def.methods {
        if !is_name(&method.name) {
            return Err(invalid(
                "service",
                &def.name,
                format!("illegal method name '{}'", method.name),
            ));
        }
        for type_name in [&method.request, &method.response] {
            if !is_type_ref(type_name) {
                return Err(invalid(
                    "service",
                    &def.name,
                    format!("illegal type '{}' in method '{}'", type_name, method.name),
                ));
            }
        }
    }
    Ok(())
}

fn validate_extend(def: &ExtendDef) -> Result<(), BuildError> {
    if !is_type_ref(&def.target) {
        return Err(invalid("extend", &def.target, "illegal reference"));
    }
    Ok(())
}
