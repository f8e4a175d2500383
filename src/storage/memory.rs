//! In-memory transaction engine.
//!
//! This is the reference implementation of `TransactionEngine`. It
//! interprets the statement IR directly instead of the rendered script.
//!
//! ## Semantics
//!
//! - **Atomic**: a request runs against a snapshot of the store that is
//!   swapped in only when every statement succeeded.
//! - **Serialized**: requests take the store's write lock for their whole
//!   run, so concurrent requests never interleave.
//! - **Locked writes**: writing a collection missing from the request's
//!   write set is a storage error, as it is for the server.
//!
//! Use this engine for:
//! - Testing synthesis end to end without a database
//! - Embedding the driver in applications that don't need persistence

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{CollectionKind, EngineCapabilities, TransactionEngine};
use crate::filter;
use crate::model::{compare_values, fields, Document, DocumentId, Value};
use crate::query::{Direction, Projection, ReadQuery, Source, Yields};
use crate::script::{Check, EdgeMatch, Message, MessagePart, Ref, ResultMap, Statement, TransactionRequest};
use crate::{Error, Result};

// ============================================================================
// MemoryEngine
// ============================================================================

/// In-memory document/edge store.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    store: RwLock<Store>,
    next_key: AtomicU64,
}

#[derive(Debug, Clone, Default)]
struct Store {
    collections: HashMap<String, Collection>,
}

#[derive(Debug, Clone)]
struct Collection {
    kind: CollectionKind,
    docs: BTreeMap<String, Document>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stored document by id.
    pub fn document(&self, id: &str) -> Option<Document> {
        let id = DocumentId::parse(id).ok()?;
        let store = self.inner.store.read();
        store.collections.get(id.collection())?.docs.get(id.key()).cloned()
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> Option<usize> {
        self.inner.store.read().collections.get(collection).map(|c| c.docs.len())
    }

    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.store.read().collections.keys().cloned().collect();
        names.sort();
        names
    }

    fn run(&self, request: &TransactionRequest) -> Result<ResultMap> {
        let mut store = self.inner.store.write();
        let mut snapshot = store.clone();
        let result = Interpreter {
            store: &mut snapshot,
            request,
            keys: &self.inner.next_key,
            vars: HashMap::new(),
            result: ResultMap::new(),
        }
        .run()?;
        *store = snapshot;
        Ok(result)
    }

    fn read(&self, query: &ReadQuery) -> Result<Vec<Value>> {
        let store = self.inner.store.read();
        let mut rows = match &query.source {
            Source::Collections(names) => {
                let mut rows = Vec::new();
                for name in names {
                    rows.extend(store.collection(name)?.docs.values().cloned());
                }
                rows
            }
            Source::Traversal { start, direction, edges, yields } => {
                let mut rows = Vec::new();
                for name in edges {
                    for edge in store.collection(name)?.docs.values() {
                        let (near, far) = match direction {
                            Direction::Outbound => (fields::FROM, fields::TO),
                            Direction::Inbound => (fields::TO, fields::FROM),
                        };
                        if edge.get(near).and_then(Value::as_str) != Some(start.as_str()) {
                            continue;
                        }
                        match yields {
                            Yields::Edge => rows.push(edge.clone()),
                            Yields::Vertex => {
                                let vertex = edge.get(far).and_then(Value::as_str).and_then(|id| store.lookup(id));
                                if let Some(v) = vertex {
                                    rows.push(v.clone());
                                }
                            }
                        }
                    }
                }
                rows
            }
        };

        rows.retain(|d| filter::matches_all(&query.filters, d));
        if let Some(after) = &query.after {
            let after = Value::from(after.as_str());
            rows.retain(|d| compare_values(&id_of(d), &after) == CmpOrdering::Greater);
        }
        if query.sort_by_id {
            rows.sort_by(|a, b| compare_values(&id_of(a), &id_of(b)));
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(match query.projection {
            Projection::Documents => rows.into_iter().map(Value::Object).collect(),
            Projection::Count => vec![Value::from(rows.len())],
        })
    }
}

fn id_of(doc: &Document) -> Value {
    doc.get(fields::ID).cloned().unwrap_or(Value::Null)
}

impl Store {
    fn collection(&self, name: &str) -> Result<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| Error::Storage(format!("collection or view not found: {name}")))
    }

    fn collection_mut(&mut self, name: &str) -> Result<&mut Collection> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| Error::Storage(format!("collection or view not found: {name}")))
    }

    fn lookup(&self, id: &str) -> Option<&Document> {
        let id = DocumentId::parse(id).ok()?;
        self.collections.get(id.collection())?.docs.get(id.key())
    }

    /// Edges of `collections` whose `end` field equals `id`.
    fn edges_at<'s>(
        &'s self,
        collections: &'s [String],
        end: &'static str,
        id: &'s str,
    ) -> Result<impl Iterator<Item = &'s Document> + 's> {
        let mut colls = Vec::with_capacity(collections.len());
        for name in collections {
            colls.push(self.collection(name)?);
        }
        Ok(colls
            .into_iter()
            .flat_map(|c| c.docs.values())
            .filter(move |e| e.get(end).and_then(Value::as_str) == Some(id)))
    }
}

// ============================================================================
// TransactionEngine impl
// ============================================================================

#[async_trait]
impl TransactionEngine for MemoryEngine {
    async fn execute(&self, request: TransactionRequest) -> Result<ResultMap> {
        self.run(&request)
    }

    async fn query(&self, query: &ReadQuery) -> Result<Vec<Value>> {
        self.read(query)
    }

    async fn create_collection(&self, name: &str, kind: CollectionKind) -> Result<bool> {
        let mut store = self.inner.store.write();
        if store.collections.contains_key(name) {
            return Ok(false);
        }
        store.collections.insert(name.to_string(), Collection { kind, docs: BTreeMap::new() });
        Ok(true)
    }

    async fn drop_all(&self) -> Result<()> {
        self.inner.store.write().collections.clear();
        Ok(())
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities { atomic_transactions: true, executes_rendered_scripts: false, traversals: true }
    }
}

// ============================================================================
// Interpreter
// ============================================================================

struct Interpreter<'a> {
    store: &'a mut Store,
    request: &'a TransactionRequest,
    keys: &'a AtomicU64,
    /// Script variables: document variables and exports.
    vars: HashMap<String, Value>,
    result: ResultMap,
}

impl Interpreter<'_> {
    fn run(mut self) -> Result<ResultMap> {
        let request = self.request;
        self.exec_all(&request.statements)?;
        Ok(self.result)
    }

    fn exec_all(&mut self, statements: &[Statement]) -> Result<()> {
        for s in statements {
            self.exec(s)?;
        }
        Ok(())
    }

    fn exec(&mut self, statement: &Statement) -> Result<()> {
        match statement {
            Statement::Comment(_) => {}
            Statement::Insert { var, collection, doc, imports, endpoints } => {
                let mut body = self.object(doc)?;
                for (field, r) in imports {
                    body.insert(field.clone(), self.eval(r)?);
                }
                if let Some((from, to)) = endpoints {
                    body.insert(fields::FROM.into(), self.eval(from)?);
                    body.insert(fields::TO.into(), self.eval(to)?);
                }
                let new = self.insert(collection, body)?;
                self.vars.insert(var.clone(), Value::Object(new));
            }
            Statement::Update { var, collection, id, doc, imports } => {
                let mut patch = self.object(doc)?;
                for (field, r) in imports {
                    patch.insert(field.clone(), self.eval(r)?);
                }
                let id = self.eval(id)?;
                let new = self.update(collection, &id, patch)?;
                self.vars.insert(var.clone(), Value::Object(new));
            }
            Statement::Remove { var, collection, id } => {
                let id = self.eval(id)?;
                let old = self.remove(collection, &id)?;
                self.vars.insert(var.clone(), old.map_or(Value::Null, Value::Object));
            }
            Statement::RemoveEdges { collection, endpoint, matching } => {
                let endpoint = self.eval(endpoint)?;
                self.check_writable(collection)?;
                let touches = |e: &Document, f: &str| e.get(f) == Some(&endpoint);
                self.store.collection_mut(collection)?.docs.retain(|_, e| match matching {
                    EdgeMatch::Outbound => !touches(&*e, fields::FROM),
                    EdgeMatch::Any => !touches(&*e, fields::FROM) && !touches(&*e, fields::TO),
                });
            }
            Statement::Bind { name, value } => {
                let v = self.eval(value)?;
                self.vars.insert(name.clone(), v);
            }
            Statement::SetResult { alias, value } => {
                let v = self.eval(value)?;
                self.result.insert(alias.clone(), v);
            }
            Statement::Guard { condition, body } => {
                if truthy(&self.eval(condition)?) {
                    self.exec_all(body)?;
                }
            }
            Statement::Assert { check, message } => {
                if self.violated(check)? {
                    return Err(Error::Transaction(self.message(message)?));
                }
            }
            Statement::Throw { message } => {
                return Err(Error::Transaction(self.message(message)?));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Values
    // ========================================================================

    fn eval(&self, r: &Ref) -> Result<Value> {
        match r {
            Ref::Param(name) => Ok(self.request.params.get(name).cloned().unwrap_or(Value::Null)),
            Ref::Doc(name) | Ref::Exported(name) => self
                .vars
                .get(name)
                .cloned()
                .ok_or_else(|| Error::Transaction(format!("{name} is not defined"))),
            Ref::Field(base, field) => match self.eval(base)? {
                Value::Object(o) => Ok(o.get(field).cloned().unwrap_or(Value::Null)),
                Value::Null => Err(Error::Transaction(format!("Cannot read property '{field}' of null"))),
                _ => Ok(Value::Null),
            },
        }
    }

    fn object(&self, r: &Ref) -> Result<Document> {
        match self.eval(r)? {
            Value::Object(o) => Ok(o),
            other => Err(Error::Transaction(format!("expected a document, got {other}"))),
        }
    }

    fn id_str(&self, r: &Ref) -> Result<Option<String>> {
        Ok(self.eval(r)?.as_str().map(str::to_string))
    }

    fn message(&self, message: &Message) -> Result<String> {
        let mut out = String::new();
        for part in &message.parts {
            match part {
                MessagePart::Text(t) => out.push_str(t),
                MessagePart::Value(r) => out.push_str(&js_string(&self.eval(r)?)),
            }
        }
        Ok(out)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    fn check_writable(&self, collection: &str) -> Result<()> {
        if self.request.write.contains(collection) {
            Ok(())
        } else {
            Err(Error::Storage(format!(
                "collection '{collection}' not registered for write in the transaction"
            )))
        }
    }

    fn insert(&mut self, collection: &str, mut body: Document) -> Result<Document> {
        self.check_writable(collection)?;
        let coll = self.store.collection_mut(collection)?;
        if coll.kind == CollectionKind::Edge {
            for end in [fields::FROM, fields::TO] {
                if !matches!(body.get(end), Some(Value::String(s)) if DocumentId::parse(s).is_ok()) {
                    return Err(Error::Storage(format!("edge attribute missing or invalid: {end}")));
                }
            }
        }
        let key = (self.keys.fetch_add(1, Ordering::Relaxed) + 1).to_string();
        body.insert(fields::KEY.into(), Value::from(key.as_str()));
        body.insert(fields::ID.into(), Value::from(DocumentId::new(collection, &key).as_str()));
        coll.docs.insert(key, body.clone());
        Ok(body)
    }

    fn update(&mut self, collection: &str, id: &Value, patch: Document) -> Result<Document> {
        self.check_writable(collection)?;
        let key = key_of(id)?;
        let doc = self
            .store
            .collection_mut(collection)?
            .docs
            .get_mut(&key)
            .ok_or_else(|| Error::Transaction(format!("document not found: {collection}/{key}")))?;
        for (field, value) in patch {
            if field != fields::ID && field != fields::KEY {
                doc.insert(field, value);
            }
        }
        Ok(doc.clone())
    }

    /// Remove by key, ignoring a missing document.
    fn remove(&mut self, collection: &str, id: &Value) -> Result<Option<Document>> {
        self.check_writable(collection)?;
        let coll = self.store.collection_mut(collection)?;
        Ok(match key_of(id) {
            Ok(key) => coll.docs.remove(&key),
            Err(_) => None,
        })
    }

    // ========================================================================
    // Checks
    // ========================================================================

    fn violated(&self, check: &Check) -> Result<bool> {
        let store = &*self.store;
        Ok(match check {
            Check::Missing { id, collections } => {
                let Some(id) = self.id_str(id)? else {
                    return Ok(true);
                };
                let mut found = false;
                for c in collections {
                    found |= store.collection(c)?.docs.values().any(|d| d.get(fields::ID).and_then(Value::as_str) == Some(id.as_str()));
                }
                !found
            }
            Check::EdgeExists { source, collection } => match self.id_str(source)? {
                Some(s) => store.edges_at(std::slice::from_ref(collection), fields::FROM, &s)?.next().is_some(),
                None => false,
            },
            Check::DuplicateKey { candidate, collection, fields: key_fields } => {
                let cand = self.object(candidate)?;
                let cand_id = id_of(&cand);
                store.collection(collection)?.docs.values().any(|doc| {
                    compare_values(&id_of(doc), &cand_id) != CmpOrdering::Equal
                        && key_fields.iter().all(|f| {
                            let a = doc.get(f).unwrap_or(&Value::Null);
                            let b = cand.get(f).unwrap_or(&Value::Null);
                            compare_values(a, b) == CmpOrdering::Equal
                        })
                })
            }
            Check::SelfLoop { source, collection } => match self.id_str(source)? {
                Some(s) => store
                    .edges_at(std::slice::from_ref(collection), fields::FROM, &s)?
                    .any(|e| e.get(fields::TO).and_then(Value::as_str) == Some(s.as_str())),
                None => false,
            },
            Check::DuplicateTarget { source, collection } => match self.id_str(source)? {
                Some(s) => {
                    let mut targets: Vec<&str> = store
                        .edges_at(std::slice::from_ref(collection), fields::FROM, &s)?
                        .filter_map(|e| e.get(fields::TO).and_then(Value::as_str))
                        .filter(|target| store.lookup(target).is_some())
                        .collect();
                    let total = targets.len();
                    targets.sort_unstable();
                    targets.dedup();
                    targets.len() != total
                }
                None => false,
            },
            Check::SharedTarget { source, outbound, inbound } => match self.id_str(source)? {
                Some(s) => {
                    let mut shared = false;
                    for edge in store.edges_at(outbound, fields::FROM, &s)? {
                        let Some(target) = edge.get(fields::TO).and_then(Value::as_str) else {
                            continue;
                        };
                        if store.lookup(target).is_none() {
                            continue;
                        }
                        let edge_id = id_of(edge);
                        shared |= store.edges_at(inbound, fields::TO, target)?.any(|e2| id_of(e2) != edge_id);
                    }
                    shared
                }
                None => false,
            },
            Check::OrphanTarget { targets, inbound } => {
                let mut orphan = false;
                for c in targets {
                    for doc in store.collection(c)?.docs.values() {
                        let Some(id) = doc.get(fields::ID).and_then(Value::as_str) else {
                            continue;
                        };
                        orphan |= store.edges_at(inbound, fields::TO, id)?.next().is_none();
                    }
                }
                orphan
            }
            Check::MissingInbound { id, collection, inbound } => match self.id_str(id)? {
                Some(id) => {
                    let exists = store
                        .collection(collection)?
                        .docs
                        .values()
                        .any(|d| d.get(fields::ID).and_then(Value::as_str) == Some(id.as_str()));
                    exists && store.edges_at(inbound, fields::TO, &id)?.next().is_none()
                }
                None => false,
            },
        })
    }
}

/// `PARSE_IDENTIFIER(id).key`
fn key_of(id: &Value) -> Result<String> {
    match id {
        Value::String(s) => Ok(DocumentId::parse(s)?.key().to_string()),
        other => Err(Error::Transaction(format!("invalid document handle: {other}"))),
    }
}

/// JavaScript truthiness.
fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Template-literal interpolation of a value.
fn js_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Object(_) => "[object Object]".into(),
        Value::Array(items) => items.iter().map(js_string).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}
