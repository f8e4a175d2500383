//! Type Graph Adapter.
//!
//! Pure lookups over a [`Schema`]: type classification, document vs. edge
//! fields, possible types of interfaces and unions, and the naming rules for
//! edge collections and key types. A missing type is a configuration defect
//! and surfaces as [`Error::Schema`].

use smallvec::SmallVec;

use super::{Directive, FieldDef, Schema, TypeDef, TypeKind};
use crate::{Error, Result};

/// Read-only view of a schema used by every synthesis step.
#[derive(Debug, Clone, Copy)]
pub struct TypeGraph<'s> {
    schema: &'s Schema,
}

/// A reverse edge field resolved back to its forward definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseEdge {
    /// Name of the forward field on the source type.
    pub forward_field: String,
    /// Type (or interface) that owns the forward field.
    pub source_type: String,
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `Capitalize(field) + "EdgeFrom" + Capitalize(type)`.
pub fn edge_collection_name(source_type: &str, field: &str) -> String {
    format!("{}EdgeFrom{}", capitalize(field), capitalize(source_type))
}

/// Name of the synthetic type listing the key fields of `type_name`.
pub fn key_type_name(type_name: &str) -> String {
    format!("_KeyFor{type_name}")
}

impl<'s> TypeGraph<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    pub fn type_def(&self, name: &str) -> Result<&'s TypeDef> {
        self.schema
            .get_type(name)
            .ok_or_else(|| Error::Schema(format!("type '{name}' not found in schema")))
    }

    pub fn classify(&self, name: &str) -> Result<TypeKind> {
        Ok(self.type_def(name)?.kind)
    }

    pub fn field(&self, type_name: &str, field: &str) -> Result<&'s FieldDef> {
        self.type_def(type_name)?
            .get_field(field)
            .ok_or_else(|| Error::Schema(format!("field '{field}' not found on type '{type_name}'")))
    }

    /// True if values of `field` live in the document itself (scalar or enum).
    pub fn is_document_field(&self, field: &FieldDef) -> Result<bool> {
        Ok(matches!(self.classify(field.ty.named_type())?, TypeKind::Scalar | TypeKind::Enum))
    }

    /// True if `field` is realized as edge records (object, interface or union).
    pub fn is_edge_field(&self, field: &FieldDef) -> Result<bool> {
        Ok(matches!(
            self.classify(field.ty.named_type())?,
            TypeKind::Object | TypeKind::Interface | TypeKind::Union
        ))
    }

    pub fn document_fields(&self, type_name: &str) -> Result<Vec<&'s FieldDef>> {
        let mut out = Vec::new();
        for f in &self.type_def(type_name)?.fields {
            if self.is_document_field(f)? {
                out.push(f);
            }
        }
        Ok(out)
    }

    pub fn edge_fields(&self, type_name: &str) -> Result<Vec<&'s FieldDef>> {
        let mut out = Vec::new();
        for f in &self.type_def(type_name)?.fields {
            if self.is_edge_field(f)? {
                out.push(f);
            }
        }
        Ok(out)
    }

    /// Itself for an object; implementers for an interface; members for a union.
    pub fn possible_types(&self, name: &str) -> Result<SmallVec<[&'s TypeDef; 4]>> {
        let t = self.type_def(name)?;
        Ok(match t.kind {
            TypeKind::Interface => self.schema.implementers(name).collect(),
            TypeKind::Union => t
                .members
                .iter()
                .map(|m| self.type_def(m))
                .collect::<Result<_>>()?,
            _ => smallvec::smallvec![t],
        })
    }

    pub fn is_abstract(&self, name: &str) -> Result<bool> {
        Ok(matches!(self.classify(name)?, TypeKind::Interface | TypeKind::Union))
    }

    pub fn edge_collection_name(&self, source_type: &str, field: &str) -> String {
        edge_collection_name(source_type, field)
    }

    /// Edge collections of `field` for every possible type of `type_name`.
    pub fn possible_edge_collections(&self, type_name: &str, field: &str) -> Result<Vec<String>> {
        Ok(self
            .possible_types(type_name)?
            .iter()
            .map(|t| edge_collection_name(&t.name, field))
            .collect())
    }

    /// Document collections of every possible type of `type_name`.
    pub fn possible_collections(&self, type_name: &str) -> Result<Vec<String>> {
        Ok(self.possible_types(type_name)?.iter().map(|t| t.name.clone()).collect())
    }

    /// The `_KeyFor<T>` type, if the schema constrains keys of `type_name`.
    pub fn key_constraint_type(&self, type_name: &str) -> Option<&'s TypeDef> {
        self.schema.get_type(&key_type_name(type_name))
    }

    /// Typed directives of a field.
    pub fn directives(&self, field: &FieldDef) -> Result<Vec<Directive>> {
        let mut out = Vec::new();
        for d in &field.directives {
            if let Some(dir) = Directive::from_use(d)? {
                out.push(dir);
            }
        }
        Ok(out)
    }

    /// Resolve a reverse field `_<field>From<Type>` to its forward definition.
    ///
    /// `Type` is the named type of the reverse field itself.
    pub fn reverse_edge(&self, field: &FieldDef) -> Option<ReverseEdge> {
        let source_type = field.ty.named_type();
        let forward = field
            .name
            .strip_prefix('_')?
            .strip_suffix(&format!("From{source_type}"))?;
        if forward.is_empty() {
            return None;
        }
        Some(ReverseEdge {
            forward_field: forward.to_string(),
            source_type: source_type.to_string(),
        })
    }

    /// Every interface edge field carrying directives must exist on `type_name`.
    pub fn check_interface_fields(&self, type_name: &str) -> Result<()> {
        let t = self.type_def(type_name)?;
        for iface in &t.interfaces {
            for f in &self.type_def(iface)?.fields {
                if f.directives.is_empty() || !self.is_edge_field(f)? {
                    continue;
                }
                if t.get_field(&f.name).is_none() {
                    return Err(Error::Schema(format!(
                        "type '{type_name}' implements '{iface}' but lacks its field '{}'",
                        f.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn is_storage_type(t: &TypeDef) -> bool {
        t.kind == TypeKind::Object
            && !t.name.starts_with('_')
            && !t.name.contains("EdgeFrom")
            && t.name != "Query"
            && t.name != "Mutation"
    }

    /// Collections the setup phase creates for object types.
    pub fn document_collections(&self) -> Vec<String> {
        self.schema
            .types()
            .filter(|t| Self::is_storage_type(t))
            .map(|t| t.name.clone())
            .collect()
    }

    /// Edge collections the setup phase creates for object-type edge fields.
    pub fn edge_collections(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for t in self.schema.types().filter(|t| Self::is_storage_type(t)) {
            for f in &t.fields {
                if !f.name.starts_with('_') && self.is_edge_field(f)? {
                    out.push(edge_collection_name(&t.name, &f.name));
                }
            }
        }
        Ok(out)
    }
}
