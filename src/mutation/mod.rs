//! # Node/Edge Synthesizer
//!
//! Appends the statements of one mutation field to the request's
//! [`TransactionContext`]. Nested input recurses with `is_root == false`;
//! only root calls extract `@export` variables. Every operation returns the
//! name of the document variable holding its result.
//!
//! ```text
//! create Person { name, friends: [{connect: "Person/1"}, {create: {…}}] }
//!   INSERT Person                → _x0
//!   INSERT FriendsEdgeFromPerson → _x1   (target validated)
//!   INSERT Person                → _x2   (nested create)
//!   INSERT FriendsEdgeFromPerson → _x3   (no validation)
//!   key check, deferred directive checks
//! ```

mod edge;

use tracing::trace;

use crate::config::DriverConfig;
use crate::constraints;
use crate::model::{fields, format_fix_value, now_millis, Document, InputObject, InputValue, Selection, SelectionItem, Value};
use crate::schema::{FieldDef, TypeDef, TypeGraph, TypeKind};
use crate::script::{Check, EdgeMatch, Message, Ref, Statement};
use crate::tx::TransactionContext;
use crate::{Error, Result};

/// Names an export may not take: they would shadow script globals.
const RESERVED_NAMES: [&str; 4] = ["db", "aql", "params", "result"];

/// Synthesis over one transaction context.
pub struct Synthesizer<'a> {
    tx: &'a mut TransactionContext,
    graph: TypeGraph<'a>,
    config: &'a DriverConfig,
}

impl<'a> Synthesizer<'a> {
    pub fn new(tx: &'a mut TransactionContext, graph: TypeGraph<'a>, config: &'a DriverConfig) -> Self {
        Self { tx, graph, config }
    }

    pub fn context(&self) -> &TransactionContext {
        self.tx
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Create an object with its nested edges and objects.
    pub fn create(
        &mut self,
        is_root: bool,
        data: &InputObject,
        type_name: &str,
        exports: Option<&Selection>,
        res_var: Option<String>,
    ) -> Result<String> {
        self.tx.ensure_open()?;
        let t = self.object_type(type_name)?;
        self.tx.comment(format!("create {type_name}"));

        let (literal, imports) = self.tx.substitute_exports(data);
        let (mut doc, edges) = self.split_fields(t, &literal)?;
        doc.insert(fields::CREATION_DATE.into(), Value::from(now_millis()));
        doc.insert(fields::TYPENAME.into(), Value::from(type_name));
        let doc = self.tx.fresh_param(Value::Object(doc))?;

        let var = res_var.unwrap_or_else(|| self.tx.fresh_var(true));
        self.tx.lock_write(type_name);
        self.tx.push(Statement::Insert {
            var: var.clone(),
            collection: type_name.to_string(),
            doc,
            imports,
            endpoints: None,
        });

        for (field, value) in edges {
            self.add_edges(&var, type_name, field, value, true)?;
        }

        if is_root {
            if let Some(selection) = exports {
                self.export_selection(&var, selection)?;
            }
        }
        self.validate_key(&var, type_name)?;
        constraints::defer_checks(self.tx, self.graph, self.config, type_name, &Ref::Doc(var.clone()).id(), None)?;
        Ok(var)
    }

    /// Merge `data` into an existing object. Edge fields present in `data`
    /// replace every outbound edge of that field.
    pub fn update(
        &mut self,
        is_root: bool,
        id: &InputValue,
        data: &InputObject,
        type_name: &str,
        exports: Option<&Selection>,
        res_var: Option<String>,
    ) -> Result<String> {
        self.tx.ensure_open()?;
        let t = self.object_type(type_name)?;
        self.tx.comment(format!("update {type_name}"));

        let id = self.tx.resolve_id(id)?;
        let (literal, imports) = self.tx.substitute_exports(data);
        let (mut doc, edges) = self.split_fields(t, &literal)?;
        doc.insert(fields::LAST_UPDATE_DATE.into(), Value::from(now_millis()));
        doc.insert(fields::TYPENAME.into(), Value::from(type_name));
        let doc = self.tx.fresh_param(Value::Object(doc))?;

        let var = res_var.unwrap_or_else(|| self.tx.fresh_var(true));
        self.tx.lock_write(type_name);
        self.tx.push(Statement::Update {
            var: var.clone(),
            collection: type_name.to_string(),
            id: id.clone(),
            doc,
            imports,
        });

        for (field, value) in edges {
            let collection = self.graph.edge_collection_name(type_name, &field.name);
            self.tx.lock_write(&collection);
            self.tx.comment(format!("drop edges from {collection}"));
            self.tx.push(Statement::RemoveEdges {
                collection,
                endpoint: id.clone(),
                matching: EdgeMatch::Outbound,
            });
            self.add_edges(&var, type_name, field, value, false)?;
        }

        if is_root {
            if let Some(selection) = exports {
                self.export_selection(&var, selection)?;
            }
        }
        self.validate_key(&var, type_name)?;
        constraints::defer_checks(self.tx, self.graph, self.config, type_name, &Ref::Doc(var.clone()).id(), None)?;
        Ok(var)
    }

    /// Remove an object and every edge touching it. A missing object is not
    /// an error: the result is null and nothing else runs.
    pub fn delete_object(
        &mut self,
        _is_root: bool,
        id: &InputValue,
        type_name: &str,
        res_var: Option<String>,
    ) -> Result<String> {
        self.tx.ensure_open()?;
        let t = self.object_type(type_name)?;
        self.tx.comment(format!("delete {type_name}"));

        let id = self.tx.resolve_id(id)?;
        let var = res_var.unwrap_or_else(|| self.tx.fresh_var(true));
        self.tx.lock_write(type_name);
        self.tx.push(Statement::Remove {
            var: var.clone(),
            collection: type_name.to_string(),
            id: id.clone(),
        });

        let removed = Ref::Doc(var.clone());
        let mut body = Vec::new();
        for collection in self.touching_edge_collections(t)? {
            self.tx.lock_write(&collection);
            body.push(Statement::RemoveEdges {
                collection,
                endpoint: removed.clone().id(),
                matching: EdgeMatch::Any,
            });
        }
        self.tx.push(Statement::Guard { condition: removed.clone(), body });

        constraints::defer_checks(self.tx, self.graph, self.config, type_name, &removed.clone().id(), Some(&removed))?;
        self.tx.invalidate(&id);
        Ok(var)
    }

    /// Edge collections holding edges that must go with a deleted `t`.
    fn touching_edge_collections(&self, t: &TypeDef) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for field in &t.fields {
            if field.name.starts_with("_incoming") || field.name.starts_with("_outgoing") {
                continue;
            }
            if !self.graph.is_edge_field(field)? {
                continue;
            }
            let reverse = field.name.starts_with('_');
            if reverse && self.graph.classify(field.ty.named_type())? == TypeKind::Interface {
                continue;
            }
            let collection = if reverse {
                match self.graph.reverse_edge(field) {
                    Some(r) => self.graph.edge_collection_name(&r.source_type, &r.forward_field),
                    None => continue,
                }
            } else {
                self.graph.edge_collection_name(&t.name, &field.name)
            };
            if !out.contains(&collection) {
                out.push(collection);
            }
        }
        Ok(out)
    }

    // ========================================================================
    // Edge fields of object input
    // ========================================================================

    fn add_edges(
        &mut self,
        source_var: &str,
        type_name: &str,
        field: &FieldDef,
        value: &InputValue,
        allow_union_create: bool,
    ) -> Result<()> {
        let f = field.name.as_str();
        let target_type = field.ty.named_type();
        let source = Ref::Doc(source_var.to_string()).id();

        for item in value.values() {
            if item.is_null() {
                continue;
            }
            let item = item.as_object().ok_or_else(|| {
                Error::Input(format!("edge input for {type_name}.{f} must be an object"))
            })?;
            let annotations = item
                .get("annotations")
                .and_then(InputValue::as_object)
                .cloned()
                .unwrap_or_default();

            if let Some(connect) = item.get("connect") {
                if connect.is_null() {
                    self.tx.throw("Value to connect is not defined");
                    continue;
                }
                let target = self.tx.resolve_id(connect)?;
                self.edge(false, source.clone(), type_name, f, target, target_type, &annotations, None, None, false, true)?;
                continue;
            }

            let (create_type, create_data) = match self.graph.classify(target_type)? {
                TypeKind::Union if !allow_union_create => {
                    return Err(Error::Input(format!(
                        "Inline updates of fields of union type is not supported! (Occurred for {type_name}.{f})"
                    )));
                }
                TypeKind::Interface | TypeKind::Union => {
                    let mut chosen = None;
                    let mut count = 0;
                    for p in self.graph.possible_types(target_type)? {
                        if let Some(data) = item.get(&format!("create{}", p.name)).and_then(InputValue::as_object) {
                            count += 1;
                            chosen = Some((p.name.clone(), data));
                        }
                    }
                    match (count, chosen) {
                        (1, Some(c)) => c,
                        (0, _) | (_, None) => {
                            self.tx.throw(format!("No create field defined for {type_name}.{f}"));
                            continue;
                        }
                        _ => {
                            self.tx.throw(format!("Multiple create fields defined for {type_name}.{f}"));
                            continue;
                        }
                    }
                }
                _ => match item.get("create").and_then(InputValue::as_object) {
                    Some(data) => (target_type.to_string(), data),
                    None => {
                        self.tx.throw(format!("No create field defined for {type_name}.{f}"));
                        continue;
                    }
                },
            };

            let target_var = self.tx.fresh_var(true);
            self.create(false, create_data, &create_type, None, Some(target_var.clone()))?;
            let target = Ref::Doc(target_var).id();
            self.edge(false, source.clone(), type_name, f, target, &create_type, &annotations, None, None, false, false)?;
        }
        Ok(())
    }

    // ========================================================================
    // Keys and exports
    // ========================================================================

    /// Fail the transaction if another `type_name` document shares the key
    /// fields of the document in `var`.
    pub fn validate_key(&mut self, var: &str, type_name: &str) -> Result<()> {
        let Some(key_type) = self.graph.key_constraint_type(type_name) else {
            return Ok(());
        };
        let key_fields: Vec<String> = key_type.fields.iter().map(|f| f.name.clone()).collect();
        self.tx.lock_read(type_name);
        self.tx.comment("check key constraint");
        self.tx.push(Statement::Assert {
            check: Check::DuplicateKey {
                candidate: Ref::Doc(var.to_string()),
                collection: type_name.to_string(),
                fields: key_fields,
            },
            message: Message::text(format!("Duplicate key for {type_name}")),
        });
        Ok(())
    }

    /// Bind every `@export` of a root selection to its field of `var`.
    pub fn export_selection(&mut self, var: &str, selection: &Selection) -> Result<()> {
        self.export_items(var, &selection.items, true)
    }

    fn export_items(&mut self, var: &str, items: &[SelectionItem], root_level: bool) -> Result<()> {
        for item in items {
            let SelectionItem::Field(field) = item else {
                continue;
            };
            if !field.items.is_empty() {
                self.export_items(var, &field.items, false)?;
            }
            let Some(name) = &field.export_as else {
                continue;
            };
            if !root_level {
                self.tx.throw(format!("Cannot export non-root field for variable ${name}"));
                continue;
            }
            if !is_export_name(name) {
                return Err(Error::Input(format!("'{name}' cannot be used as an exported variable name")));
            }
            let source = if field.name == "id" { fields::ID } else { field.name.as_str() };
            trace!(variable = %name, field = source, "export");
            self.tx.export_var(name, Ref::Exported(name.clone()))?;
            self.tx.push(Statement::Bind { name: name.clone(), value: Ref::Doc(var.to_string()).field(source) });
        }
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn object_type(&self, name: &str) -> Result<&'a TypeDef> {
        let t = self.graph.type_def(name)?;
        if t.kind != TypeKind::Object {
            return Err(Error::Schema(format!("'{name}' is not an object type")));
        }
        Ok(t)
    }

    /// Stored document fields (coerced) and the edge fields of `input`.
    fn split_fields<'i>(
        &self,
        t: &'a TypeDef,
        input: &'i InputObject,
    ) -> Result<(Document, Vec<(&'a FieldDef, &'i InputValue)>)> {
        let mut doc = Document::new();
        let mut edges = Vec::new();
        for (name, value) in input.iter() {
            let field = t
                .get_field(name)
                .ok_or_else(|| Error::Input(format!("field '{name}' is not defined on '{}'", t.name)))?;
            if self.graph.is_document_field(field)? {
                doc.insert(name.to_string(), format_fix_value(field.ty.named_type(), &value.to_json()?)?);
            } else {
                edges.push((field, value));
            }
        }
        Ok((doc, edges))
    }
}

fn is_export_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !RESERVED_NAMES.contains(&name)
}
