//! # Query Synthesizer
//!
//! Read-path queries as a small IR. Every read the resolvers need fits one
//! shape: iterate a source, filter, optionally page by `_id`, then return
//! the rows or their count.
//!
//! ```text
//! getList(Person, first: 3, after: "Person/2", filter: {name: {_ilike: "%Doe"}})
//!   FOR x IN @@value0
//!     FILTER LIKE(x.name, @value1, true)
//!     FILTER x._id > @value2 SORT x._id LIMIT @value3
//!     RETURN x
//! ```
//!
//! The same [`ReadQuery`] renders to AQL ([`ReadQuery::to_aql`]) and is
//! evaluated directly by `MemoryEngine`.

use serde::{Deserialize, Serialize};

use crate::aql::{AqlQuery, BindVars};
use crate::filter::{self, CompareOp, Condition, FieldRef};
use crate::model::{fields, format_fix_value, Document, Value};
use crate::schema::TypeGraph;
use crate::{Error, Result};

/// Row alias of document and vertex queries.
pub const ROW: &str = "x";
/// Row alias of edge queries.
pub const EDGE_ROW: &str = "e";

// ============================================================================
// IR
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Outbound,
    Inbound,
}

impl Direction {
    fn as_aql(self) -> &'static str {
        match self {
            Direction::Outbound => "OUTBOUND",
            Direction::Inbound => "INBOUND",
        }
    }
}

/// What a one-step traversal produces per hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Yields {
    Vertex,
    Edge,
}

/// Where the rows come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Source {
    /// Every document of the listed collections.
    Collections(Vec<String>),
    /// One hop from `start` over any of `edges`.
    Traversal { start: String, direction: Direction, edges: Vec<String>, yields: Yields },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    Documents,
    Count,
}

/// A read query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadQuery {
    pub source: Source,
    pub alias: String,
    pub filters: Vec<Condition>,
    /// Keep rows with `_id` strictly greater.
    pub after: Option<String>,
    pub sort_by_id: bool,
    pub limit: Option<usize>,
    pub projection: Projection,
}

impl ReadQuery {
    fn new(source: Source, alias: &str) -> Self {
        Self {
            source,
            alias: alias.to_string(),
            filters: Vec::new(),
            after: None,
            sort_by_id: false,
            limit: None,
            projection: Projection::Documents,
        }
    }

    /// Collections the query reads.
    pub fn collections(&self) -> &[String] {
        match &self.source {
            Source::Collections(c) => c,
            Source::Traversal { edges, .. } => edges,
        }
    }

    pub fn to_aql(&self) -> AqlQuery {
        let mut binds = BindVars::new();
        let a = &self.alias;
        let mut q = match &self.source {
            Source::Collections(colls) if colls.len() == 1 => {
                format!("FOR {a} IN {}", binds.bind_collection(&colls[0]))
            }
            Source::Collections(colls) => {
                let list: Vec<_> = colls.iter().map(|c| binds.bind_collection(c)).collect();
                format!("FOR {a} IN FLATTEN(FOR i IN [{}] RETURN i)", list.join(", "))
            }
            Source::Traversal { start, direction, edges, yields } => {
                let vars = match yields {
                    Yields::Vertex => a.clone(),
                    Yields::Edge => format!("v, {a}"),
                };
                let start = binds.bind(Value::from(start.as_str()));
                let edges: Vec<_> = edges.iter().map(|c| binds.bind_collection(c)).collect();
                format!("FOR {vars} IN 1..1 {} {start} {}", direction.as_aql(), edges.join(", "))
            }
        };
        q.push_str(&filter::filters_to_aql(&self.filters, &mut binds));
        if let Some(after) = &self.after {
            q.push_str(&format!(" FILTER {a}._id > {}", binds.bind(Value::from(after.as_str()))));
        }
        if self.sort_by_id {
            q.push_str(&format!(" SORT {a}._id"));
        }
        if let Some(limit) = self.limit {
            q.push_str(&format!(" LIMIT {}", binds.bind(Value::from(limit))));
        }
        match self.projection {
            Projection::Documents => q.push_str(&format!(" RETURN {a}")),
            Projection::Count => q.push_str(" COLLECT WITH COUNT INTO length RETURN length"),
        }
        binds.finish(q)
    }
}

// ============================================================================
// Results
// ============================================================================

/// Paging arguments of a list field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListArgs {
    pub filter: Option<Value>,
    pub first: Option<usize>,
    pub after: Option<String>,
}

impl ListArgs {
    pub fn first(mut self, n: usize) -> Self {
        self.first = Some(n);
        self
    }

    pub fn after(mut self, id: impl Into<String>) -> Self {
        self.after = Some(id.into());
        self
    }

    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// One page of a list plus what is needed to count the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub content: Vec<Document>,
    #[serde(skip)]
    pub filter: Vec<Condition>,
    #[serde(skip)]
    pub collections: Vec<String>,
}

impl Page {
    /// Count of every row matching the page's filter.
    pub fn total_count_query(&self) -> ReadQuery {
        let mut q = ReadQuery::new(Source::Collections(self.collections.clone()), ROW);
        q.filters = self.filter.clone();
        q.projection = Projection::Count;
        q
    }

    /// Count of matching rows past the last one on this page. The list
    /// has ended when it is zero.
    pub fn end_of_list_query(&self) -> ReadQuery {
        let mut q = self.total_count_query();
        q.after = self
            .content
            .last()
            .and_then(|d| d.get(fields::ID))
            .and_then(Value::as_str)
            .map(str::to_string);
        q
    }
}

/// Result of an edge or endpoint traversal, shaped by the field's cardinality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Endpoint {
    One(Option<Document>),
    Many(Vec<Document>),
}

impl Endpoint {
    pub fn from_rows(rows: Vec<Document>, is_list: bool) -> Self {
        if is_list {
            Endpoint::Many(rows)
        } else {
            Endpoint::One(rows.into_iter().next())
        }
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Fetch by `_id`, over every possible type of `type_name`.
pub fn get(graph: TypeGraph<'_>, id: &str, type_name: &str) -> Result<ReadQuery> {
    let mut q = ReadQuery::new(Source::Collections(graph.possible_collections(type_name)?), ROW);
    q.filters.push(eq(ROW, fields::ID, Value::from(id)));
    q.limit = Some(1);
    Ok(q)
}

/// Fetch the `type_name` document matching every field of `key`.
pub fn get_by_key(graph: TypeGraph<'_>, key: &Document, type_name: &str) -> Result<ReadQuery> {
    let t = graph.type_def(type_name)?;
    if key.is_empty() {
        return Err(Error::Input(format!("empty key for {type_name}")));
    }
    let mut q = ReadQuery::new(Source::Collections(vec![type_name.to_string()]), ROW);
    for (field, value) in key {
        let value = match t.get_field(field) {
            Some(f) => format_fix_value(f.ty.named_type(), value)?,
            None => return Err(Error::Schema(format!("key field '{field}' is not defined on '{type_name}'"))),
        };
        q.filters.push(eq(ROW, field, value));
    }
    q.limit = Some(1);
    Ok(q)
}

/// A page of `type_name` rows ordered by `_id`. `after` defaults to the
/// empty string, which every id sorts after.
pub fn get_list(graph: TypeGraph<'_>, args: &ListArgs, type_name: &str) -> Result<(ReadQuery, Page)> {
    let collections = graph.possible_collections(type_name)?;
    let filter = match &args.filter {
        Some(f) => filter::translate(f, Some(graph.type_def(type_name)?), ROW)?,
        None => Vec::new(),
    };
    let mut q = ReadQuery::new(Source::Collections(collections.clone()), ROW);
    q.filters = filter.clone();
    q.after = Some(args.after.clone().unwrap_or_default());
    q.sort_by_id = true;
    q.limit = args.first;
    Ok((q, Page { content: Vec::new(), filter, collections }))
}

/// Documents at the other end of `parent_type.field` from `parent_id`.
///
/// A reverse field `_<f>From<T>` walks inbound over the `f` edges of every
/// possible type of `T`; a forward field walks outbound over its own edges.
pub fn get_edge_endpoint(
    graph: TypeGraph<'_>,
    parent_type: &str,
    parent_id: &str,
    field: &str,
    filter: Option<&Value>,
) -> Result<(ReadQuery, bool)> {
    let f = graph.field(parent_type, field)?;
    let return_type = f.ty.named_type();
    let (direction, edges) = match graph.reverse_edge(f) {
        Some(reverse) => (
            Direction::Inbound,
            graph.possible_edge_collections(&reverse.source_type, &reverse.forward_field)?,
        ),
        _ => (Direction::Outbound, vec![graph.edge_collection_name(parent_type, field)]),
    };
    let mut q = ReadQuery::new(
        Source::Traversal { start: parent_id.to_string(), direction, edges, yields: Yields::Vertex },
        ROW,
    );
    if let Some(filter) = filter {
        q.filters = filter::translate(filter, Some(graph.type_def(return_type)?), ROW)?;
    }
    Ok((q, f.ty.is_list()))
}

/// Edge documents of an `_outgoing…`/`_incoming…` field. The field's type
/// is the edge type `_<Collection>`, or an interface over several.
pub fn get_edge(
    graph: TypeGraph<'_>,
    parent_type: &str,
    parent_id: &str,
    field: &str,
    filter: Option<&Value>,
) -> Result<(ReadQuery, bool)> {
    let f = graph.field(parent_type, field)?;
    let edge_type = f.ty.named_type();
    let direction = if field.starts_with("_outgoing") { Direction::Outbound } else { Direction::Inbound };
    let edges = graph
        .possible_types(edge_type)?
        .iter()
        .map(|t| t.name.strip_prefix('_').unwrap_or(&t.name).to_string())
        .collect();
    let mut q = ReadQuery::new(
        Source::Traversal { start: parent_id.to_string(), direction, edges, yields: Yields::Edge },
        EDGE_ROW,
    );
    if let Some(filter) = filter {
        q.filters = filter::translate(filter, Some(graph.type_def(edge_type)?), EDGE_ROW)?;
    }
    Ok((q, f.ty.is_list()))
}

fn eq(alias: &str, field: &str, value: Value) -> Condition {
    Condition::Compare {
        target: FieldRef { alias: alias.to_string(), field: field.to_string() },
        op: CompareOp::Eq,
        value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, Schema, TypeDef, TypeRef};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(vec![
            TypeDef::scalar("DateTime"),
            TypeDef::interface("Character")
                .field(FieldDef::new("name", TypeRef::named("String")))
                .field(FieldDef::new("friends", TypeRef::list(TypeRef::named("Character")))),
            TypeDef::object("Human")
                .implements("Character")
                .field(FieldDef::new("name", TypeRef::named("String")))
                .field(FieldDef::new("born", TypeRef::named("DateTime")))
                .field(FieldDef::new("friends", TypeRef::list(TypeRef::named("Character"))))
                .field(FieldDef::new("mentor", TypeRef::named("Human")))
                .field(FieldDef::new("_friendsFromCharacter", TypeRef::list(TypeRef::named("Character"))))
                .field(FieldDef::new(
                    "_outgoingFriendsEdgesFromHuman",
                    TypeRef::list(TypeRef::named("_FriendsEdgeFromHuman")),
                ))
                .field(FieldDef::new(
                    "_incomingFriendsEdgesFromCharacter",
                    TypeRef::list(TypeRef::named("_FriendsEdgeFromCharacter")),
                )),
            TypeDef::object("Droid")
                .implements("Character")
                .field(FieldDef::new("name", TypeRef::named("String")))
                .field(FieldDef::new("friends", TypeRef::list(TypeRef::named("Character")))),
            TypeDef::interface("_FriendsEdgeFromCharacter").field(FieldDef::new("since", TypeRef::named("Int"))),
            TypeDef::object("_FriendsEdgeFromHuman")
                .implements("_FriendsEdgeFromCharacter")
                .field(FieldDef::new("since", TypeRef::named("Int"))),
            TypeDef::object("_FriendsEdgeFromDroid")
                .implements("_FriendsEdgeFromCharacter")
                .field(FieldDef::new("since", TypeRef::named("Int"))),
        ])
    }

    #[test]
    fn test_get_fans_out_over_implementers() {
        let s = schema();
        let q = get(TypeGraph::new(&s), "Droid/7", "Character").unwrap();
        let aql = q.to_aql();
        assert_eq!(
            aql.query,
            "FOR x IN FLATTEN(FOR i IN [@@value0, @@value1] RETURN i) FILTER x._id == @value2 LIMIT @value3 RETURN x"
        );
        assert_eq!(aql.bind_vars["@value0"], json!("Human"));
        assert_eq!(aql.bind_vars["@value1"], json!("Droid"));
        assert_eq!(aql.bind_vars["value2"], json!("Droid/7"));
    }

    #[test]
    fn test_get_list_pages_by_id() {
        let s = schema();
        let args = ListArgs::default().first(3).filter(json!({"name": {"_ilike": "%Doe"}}));
        let (q, page) = get_list(TypeGraph::new(&s), &args, "Human").unwrap();
        let aql = q.to_aql();
        assert_eq!(
            aql.query,
            "FOR x IN @@value0 FILTER LIKE(x.name, @value1, true) FILTER x._id > @value2 SORT x._id LIMIT @value3 RETURN x"
        );
        assert_eq!(aql.bind_vars["value2"], json!(""));
        assert_eq!(aql.bind_vars["value3"], json!(3));
        assert_eq!(page.filter.len(), 1);
        assert_eq!(page.collections, vec!["Human".to_string()]);
    }

    #[test]
    fn test_list_counts_reuse_page_filter() {
        let s = schema();
        let args = ListArgs::default().filter(json!({"name": {"_eq": "Luke"}}));
        let (_, mut page) = get_list(TypeGraph::new(&s), &args, "Human").unwrap();

        let total = page.total_count_query().to_aql();
        assert_eq!(total.query, "FOR x IN @@value0 FILTER x.name == @value1 COLLECT WITH COUNT INTO length RETURN length");

        assert_eq!(page.end_of_list_query().after, None);
        let mut last = Document::new();
        last.insert("_id".into(), json!("Human/9"));
        page.content.push(last);
        let end = page.end_of_list_query();
        assert_eq!(end.after.as_deref(), Some("Human/9"));
        assert!(!end.sort_by_id);
        assert_eq!(end.limit, None);
    }

    #[test]
    fn test_get_by_key_coerces_dates() {
        let s = schema();
        let mut key = Document::new();
        key.insert("name".into(), json!("Leia"));
        key.insert("born".into(), json!("1970-01-02"));
        let q = get_by_key(TypeGraph::new(&s), &key, "Human").unwrap();
        assert_eq!(q.filters[1], eq(ROW, "born", json!(86_400_000)));
        assert!(get_by_key(TypeGraph::new(&s), &Document::new(), "Human").is_err());
    }

    #[test]
    fn test_forward_endpoint_walks_outbound() {
        let s = schema();
        let (q, many) = get_edge_endpoint(TypeGraph::new(&s), "Human", "Human/1", "mentor", None).unwrap();
        assert!(!many);
        assert_eq!(
            q.source,
            Source::Traversal {
                start: "Human/1".into(),
                direction: Direction::Outbound,
                edges: vec!["MentorEdgeFromHuman".into()],
                yields: Yields::Vertex,
            }
        );
        assert_eq!(q.to_aql().query, "FOR x IN 1..1 OUTBOUND @value0 @@value1 RETURN x");
    }

    #[test]
    fn test_reverse_endpoint_walks_inbound_over_implementers() {
        let s = schema();
        let (q, many) =
            get_edge_endpoint(TypeGraph::new(&s), "Human", "Human/1", "_friendsFromCharacter", None).unwrap();
        assert!(many);
        assert_eq!(
            q.to_aql().query,
            "FOR x IN 1..1 INBOUND @value0 @@value1, @@value2 RETURN x"
        );
        assert_eq!(q.collections(), ["FriendsEdgeFromHuman".to_string(), "FriendsEdgeFromDroid".to_string()]);
    }

    #[test]
    fn test_edge_fields_yield_edges() {
        let s = schema();
        let g = TypeGraph::new(&s);
        let (q, _) = get_edge(g, "Human", "Human/1", "_outgoingFriendsEdgesFromHuman", Some(&json!({"since": {"_gt": 2000}})))
            .unwrap();
        assert_eq!(
            q.to_aql().query,
            "FOR v, e IN 1..1 OUTBOUND @value0 @@value1 FILTER e.since > @value2 RETURN e"
        );

        let (q, _) = get_edge(g, "Human", "Human/1", "_incomingFriendsEdgesFromCharacter", None).unwrap();
        assert_eq!(
            q.source,
            Source::Traversal {
                start: "Human/1".into(),
                direction: Direction::Inbound,
                edges: vec!["FriendsEdgeFromHuman".into(), "FriendsEdgeFromDroid".into()],
                yields: Yields::Edge,
            }
        );
    }

    #[test]
    fn test_endpoint_shape() {
        let mut d = Document::new();
        d.insert("_id".into(), json!("Human/1"));
        assert_eq!(Endpoint::from_rows(vec![], false), Endpoint::One(None));
        assert_eq!(Endpoint::from_rows(vec![d.clone()], true), Endpoint::Many(vec![d]));
    }
}
