//! # Schema Model
//!
//! The introspectable schema the synthesizer is driven by: named types,
//! their fields (with list/non-null wrappers and directives), interface
//! implementations and union members.
//!
//! A `Schema` can be parsed from SDL (`crate::sdl::parse_schema`), built
//! programmatically, or deserialized. `TypeGraph` wraps it with the
//! classification queries the synthesizer needs.

pub mod directive;
pub mod graph;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

pub use directive::Directive;
pub use graph::{edge_collection_name, key_type_name, ReverseEdge, TypeGraph};

use crate::model::Value;

/// Scalars every schema knows without declaring them.
pub const BUILTIN_SCALARS: [&str; 5] = ["String", "Int", "Float", "Boolean", "ID"];

// ============================================================================
// Types
// ============================================================================

/// Kind of a named type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Scalar,
    Enum,
    Object,
    Interface,
    Union,
    InputObject,
}

/// Declared type of a field, possibly wrapped in list/non-null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    pub fn list(inner: TypeRef) -> Self {
        TypeRef::List(Box::new(inner))
    }

    pub fn non_null(inner: TypeRef) -> Self {
        TypeRef::NonNull(Box::new(inner))
    }

    /// Name of the innermost named type.
    pub fn named_type(&self) -> &str {
        match self {
            TypeRef::Named(n) => n,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.named_type(),
        }
    }

    /// True if the nullable form of this type is a list.
    pub fn is_list(&self) -> bool {
        match self {
            TypeRef::NonNull(inner) => matches!(**inner, TypeRef::List(_)),
            TypeRef::List(_) => true,
            TypeRef::Named(_) => false,
        }
    }
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeRef::Named(n) => write!(f, "{n}"),
            TypeRef::List(inner) => write!(f, "[{inner}]"),
            TypeRef::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

/// A directive as written in the schema: name plus literal arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectiveUse {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<(String, Value)>,
}

impl DirectiveUse {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), arguments: Vec::new() }
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.push((name.into(), value.into()));
        self
    }
}

/// A field of an object, interface or input type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRef,
    #[serde(default)]
    pub directives: Vec<DirectiveUse>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self { name: name.into(), ty, directives: Vec::new() }
    }

    pub fn directive(mut self, d: DirectiveUse) -> Self {
        self.directives.push(d);
        self
    }
}

/// A named type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeKind,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Interfaces implemented by an object or interface type.
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// Members of a union.
    #[serde(default)]
    pub members: Vec<String>,
    /// Values of an enum.
    #[serde(default)]
    pub values: Vec<String>,
}

impl TypeDef {
    fn of_kind(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            fields: Vec::new(),
            interfaces: Vec::new(),
            members: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn scalar(name: impl Into<String>) -> Self { Self::of_kind(name, TypeKind::Scalar) }
    pub fn object(name: impl Into<String>) -> Self { Self::of_kind(name, TypeKind::Object) }
    pub fn interface(name: impl Into<String>) -> Self { Self::of_kind(name, TypeKind::Interface) }
    pub fn input(name: impl Into<String>) -> Self { Self::of_kind(name, TypeKind::InputObject) }

    pub fn enumeration(name: impl Into<String>, values: &[&str]) -> Self {
        let mut t = Self::of_kind(name, TypeKind::Enum);
        t.values = values.iter().map(|v| v.to_string()).collect();
        t
    }

    pub fn union(name: impl Into<String>, members: &[&str]) -> Self {
        let mut t = Self::of_kind(name, TypeKind::Union);
        t.members = members.iter().map(|v| v.to_string()).collect();
        t
    }

    pub fn field(mut self, f: FieldDef) -> Self {
        self.fields.push(f);
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

// ============================================================================
// Schema
// ============================================================================

/// All named types of an API schema, in declaration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<TypeDef>", into = "Vec<TypeDef>")]
pub struct Schema {
    types: Vec<TypeDef>,
    index: HashMap<String, usize>,
}

impl Schema {
    /// Build a schema; built-in scalars are added when not declared.
    pub fn new(types: Vec<TypeDef>) -> Self {
        let mut schema = Schema { types: Vec::new(), index: HashMap::new() };
        for builtin in BUILTIN_SCALARS {
            schema.add(TypeDef::scalar(builtin));
        }
        for t in types {
            schema.add(t);
        }
        schema
    }

    /// Add or replace a type.
    pub fn add(&mut self, t: TypeDef) {
        match self.index.get(&t.name) {
            Some(&pos) => self.types[pos] = t,
            None => {
                self.index.insert(t.name.clone(), self.types.len());
                self.types.push(t);
            }
        }
    }

    pub fn get_type(&self, name: &str) -> Option<&TypeDef> {
        self.index.get(name).map(|&i| &self.types[i])
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.iter()
    }

    /// Object types implementing an interface, in declaration order.
    pub fn implementers(&self, interface: &str) -> impl Iterator<Item = &TypeDef> {
        self.types
            .iter()
            .filter(move |t| t.kind == TypeKind::Object && t.interfaces.iter().any(|i| i == interface))
    }
}

impl From<Vec<TypeDef>> for Schema {
    fn from(types: Vec<TypeDef>) -> Self {
        Schema::new(types)
    }
}

impl From<Schema> for Vec<TypeDef> {
    fn from(schema: Schema) -> Self {
        schema.types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_ref_list_detection() {
        let list = TypeRef::non_null(TypeRef::list(TypeRef::named("Person")));
        assert!(list.is_list());
        assert_eq!(list.named_type(), "Person");
        assert_eq!(list.to_string(), "[Person]!");

        let single = TypeRef::non_null(TypeRef::named("Person"));
        assert!(!single.is_list());
    }

    #[test]
    fn test_builtin_scalars_present() {
        let schema = Schema::new(vec![TypeDef::object("Person")]);
        assert!(schema.get_type("String").is_some());
        assert!(schema.get_type("ID").is_some());
        assert_eq!(schema.get_type("Person").map(|t| t.kind), Some(TypeKind::Object));
    }

    #[test]
    fn test_implementers_in_declaration_order() {
        let schema = Schema::new(vec![
            TypeDef::interface("Character"),
            TypeDef::object("Human").implements("Character"),
            TypeDef::object("Starship"),
            TypeDef::object("Droid").implements("Character"),
        ]);
        let names: Vec<_> = schema.implementers("Character").map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Human", "Droid"]);
    }

    #[test]
    fn test_serde_roundtrip_rebuilds_index() {
        let schema = Schema::new(vec![TypeDef::object("Person")]);
        let json = serde_json::to_string(&schema).unwrap();
        let back: Schema = serde_json::from_str(&json).unwrap();
        assert!(back.get_type("Person").is_some());
    }
}
