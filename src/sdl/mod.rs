//! # Schema Definition Language
//!
//! Builds a [`Schema`] from the type-system subset of GraphQL SDL:
//!
//! ```text
//! SDL text → async-graphql parser → ServiceDocument → TypeDefs → Schema
//! ```
//!
//! `directive @...` definitions and `schema { ... }` blocks are dropped, as
//! are field arguments and input default values.

use async_graphql::parser::types::{
    BaseType, ConstDirective, ServiceDocument, Type, TypeDefinition, TypeKind as SdlKind, TypeSystemDefinition,
};
use async_graphql::parser::{self, Positioned};
use tracing::debug;

use crate::schema::{DirectiveUse, FieldDef, Schema, TypeDef, TypeKind, TypeRef};
use crate::{Error, Result};

/// Parse an SDL document into a schema.
///
/// Extensions are merged into the definition they extend, which must
/// appear earlier in the document. Redefining a type is an error.
pub fn parse_schema(sdl: &str) -> Result<Schema> {
    let document = parser::parse_schema(sdl).map_err(syntax_error)?;
    let types = collect_types(document)?;
    debug!(types = types.len(), "parsed schema");
    Ok(Schema::new(types))
}

fn syntax_error(err: parser::Error) -> Error {
    let (line, column) = err.positions().next().map_or((0, 0), |pos| (pos.line, pos.column));
    Error::SyntaxError {
        line,
        column,
        message: err.to_string(),
    }
}

fn collect_types(document: ServiceDocument) -> Result<Vec<TypeDef>> {
    let mut types: Vec<TypeDef> = Vec::new();
    for definition in document.definitions {
        let TypeSystemDefinition::Type(def) = definition else {
            continue;
        };
        let extend = def.node.extend;
        let t = type_def(def.node)?;
        if extend {
            let Some(base) = types.iter_mut().find(|existing| existing.name == t.name) else {
                return Err(Error::Schema(format!("cannot extend undefined type {}", t.name)));
            };
            apply_extension(base, t)?;
        } else {
            if types.iter().any(|existing| existing.name == t.name) {
                return Err(Error::Schema(format!("type {} is defined more than once", t.name)));
            }
            types.push(t);
        }
    }
    Ok(types)
}

// ============================================================================
// Conversion
// ============================================================================

fn type_def(def: TypeDefinition) -> Result<TypeDef> {
    let name = def.name.node.as_str();
    let t = match def.kind {
        SdlKind::Scalar => TypeDef::scalar(name),
        SdlKind::Object(object) => {
            let mut t = TypeDef::object(name);
            t.interfaces = object.implements.iter().map(|i| i.node.to_string()).collect();
            for field in object.fields {
                let field = field.node;
                t.fields.push(field_def(field.name.node.as_str(), &field.ty.node, &field.directives)?);
            }
            t
        }
        SdlKind::Interface(interface) => {
            let mut t = TypeDef::interface(name);
            t.interfaces = interface.implements.iter().map(|i| i.node.to_string()).collect();
            for field in interface.fields {
                let field = field.node;
                t.fields.push(field_def(field.name.node.as_str(), &field.ty.node, &field.directives)?);
            }
            t
        }
        SdlKind::InputObject(input) => {
            let mut t = TypeDef::input(name);
            for field in input.fields {
                let field = field.node;
                t.fields.push(field_def(field.name.node.as_str(), &field.ty.node, &field.directives)?);
            }
            t
        }
        SdlKind::Union(union) => {
            let mut t = TypeDef::union(name, &[]);
            t.members = union.members.iter().map(|m| m.node.to_string()).collect();
            t
        }
        SdlKind::Enum(enumeration) => {
            let mut t = TypeDef::enumeration(name, &[]);
            t.values = enumeration.values.iter().map(|v| v.node.value.node.to_string()).collect();
            t
        }
    };
    Ok(t)
}

fn field_def(name: &str, ty: &Type, directives: &[Positioned<ConstDirective>]) -> Result<FieldDef> {
    let mut field = FieldDef::new(name, type_ref(ty));
    for d in directives {
        field.directives.push(directive_use(&d.node)?);
    }
    Ok(field)
}

fn type_ref(ty: &Type) -> TypeRef {
    let inner = match &ty.base {
        BaseType::Named(name) => TypeRef::named(name.as_str()),
        BaseType::List(item) => TypeRef::list(type_ref(item)),
    };
    if ty.nullable { inner } else { TypeRef::non_null(inner) }
}

/// Argument values become JSON; enum values become strings.
fn directive_use(d: &ConstDirective) -> Result<DirectiveUse> {
    let mut used = DirectiveUse::new(d.name.node.as_str());
    for (name, value) in &d.arguments {
        let value = value.node.clone().into_json().map_err(|e| {
            Error::Schema(format!("argument {} of @{} is not a JSON value: {e}", name.node, d.name.node))
        })?;
        used.arguments.push((name.node.to_string(), value));
    }
    Ok(used)
}

/// Merge an extension into its base definition.
fn apply_extension(base: &mut TypeDef, ext: TypeDef) -> Result<()> {
    if base.kind != ext.kind {
        return Err(Error::Schema(format!(
            "cannot extend {:?} {} as {:?}",
            base.kind, base.name, ext.kind
        )));
    }
    match ext.kind {
        TypeKind::Object | TypeKind::Interface | TypeKind::InputObject => {
            for f in ext.fields {
                if base.get_field(&f.name).is_some() {
                    return Err(Error::Schema(format!("field {}.{} is already defined", base.name, f.name)));
                }
                base.fields.push(f);
            }
            base.interfaces.extend(ext.interfaces);
        }
        TypeKind::Union => base.members.extend(ext.members),
        TypeKind::Enum => base.values.extend(ext.values),
        TypeKind::Scalar => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_schema() {
        let schema = parse_schema(
            r#"
            # people and their pets
            scalar DateTime
            interface Pet { name: String }
            type Dog implements Pet { name: String }
            type Person {
                name: String!
                born: DateTime
                pets: [Pet] @distinct
            }
            "#,
        )
        .unwrap();
        assert_eq!(schema.get_type("Dog").unwrap().interfaces, vec!["Pet"]);
        assert_eq!(schema.get_type("Pet").unwrap().kind, TypeKind::Interface);
        let pets = schema.get_type("Person").unwrap().get_field("pets").unwrap();
        assert_eq!(pets.ty, TypeRef::list(TypeRef::named("Pet")));
        // built-ins are always present
        assert!(schema.get_type("String").is_some());
    }

    #[test]
    fn test_object_with_fields() {
        let schema =
            parse_schema("type Person implements Node & Named { name: String! friends: [Person!] @distinct }").unwrap();
        let person = schema.get_type("Person").unwrap();
        assert_eq!(person.kind, TypeKind::Object);
        assert_eq!(person.interfaces, vec!["Node", "Named"]);
        assert_eq!(person.fields[0].ty, TypeRef::non_null(TypeRef::named("String")));
        assert_eq!(
            person.fields[1].ty,
            TypeRef::list(TypeRef::non_null(TypeRef::named("Person")))
        );
        assert_eq!(person.fields[1].directives[0].name, "distinct");
    }

    #[test]
    fn test_directive_arguments() {
        let schema = parse_schema(
            r#"type Car { owner: Person @_requiredForTarget_AccordingToInterface(interfaceName: "Vehicle") }"#,
        )
        .unwrap();
        let d = &schema.get_type("Car").unwrap().fields[0].directives[0];
        assert_eq!(d.name, "_requiredForTarget_AccordingToInterface");
        assert_eq!(d.arguments, vec![("interfaceName".to_string(), json!("Vehicle"))]);
    }

    #[test]
    fn test_union_enum_scalar_input() {
        let schema = parse_schema(
            r#"
            "A point in time"
            scalar DateTime
            enum Color { RED GREEN }
            union Media = Book | Film
            input _KeyForPerson { name: String = "x" }
            "#,
        )
        .unwrap();
        assert_eq!(schema.get_type("DateTime").unwrap().kind, TypeKind::Scalar);
        assert_eq!(schema.get_type("Color").unwrap().values, vec!["RED", "GREEN"]);
        assert_eq!(schema.get_type("Media").unwrap().members, vec!["Book", "Film"]);
        let key = schema.get_type("_KeyForPerson").unwrap();
        assert_eq!(key.kind, TypeKind::InputObject);
        assert_eq!(key.fields[0].name, "name");
    }

    #[test]
    fn test_field_arguments_dropped() {
        let schema = parse_schema("type Query { people(first: Int = 10, filter: _FilterForPerson): [Person] }").unwrap();
        let people = &schema.get_type("Query").unwrap().fields[0];
        assert_eq!(people.name, "people");
        assert!(people.ty.is_list());
    }

    #[test]
    fn test_directive_and_schema_definitions_ignored() {
        let schema = parse_schema(
            "directive @distinct on FIELD_DEFINITION | ARGUMENT_DEFINITION\n\
             schema { query: Query mutation: Mutation }\n\
             type Query { a: Int }\n\
             type Mutation { b: Int }",
        )
        .unwrap();
        assert!(schema.get_type("Query").is_some());
        assert!(schema.get_type("distinct").is_none());
    }

    #[test]
    fn test_extension_merged() {
        let schema = parse_schema("type A { x: Int } extend type A implements B { y: Int } interface B { y: Int }").unwrap();
        let a = schema.get_type("A").unwrap();
        assert_eq!(a.fields.len(), 2);
        assert_eq!(a.interfaces, vec!["B"]);
    }

    #[test]
    fn test_enum_extension_merged() {
        let schema = parse_schema("enum Color { RED } extend enum Color { BLUE }").unwrap();
        assert_eq!(schema.get_type("Color").unwrap().values, vec!["RED", "BLUE"]);
    }

    #[test]
    fn test_extension_of_undefined_type() {
        let err = parse_schema("extend type A { y: Int }").unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_extension_kind_mismatch() {
        let err = parse_schema("type A { x: Int } extend interface A { y: Int }").unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_duplicate_field_in_extension() {
        let err = parse_schema("type A { x: Int } extend type A { x: Int }").unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_duplicate_type() {
        let err = parse_schema("type A { x: Int } type A { y: Int }").unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_syntax_error_location() {
        let err = parse_schema("scalar X\ntype A { x Int }").unwrap_err();
        assert!(matches!(err, Error::SyntaxError { line: 2, .. }), "{err:?}");
    }

    #[test]
    fn test_variable_rejected() {
        let err = parse_schema("type A { x: Int @d(a: $v) }").unwrap_err();
        assert!(matches!(err, Error::SyntaxError { .. }));
    }
}
