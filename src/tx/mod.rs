//! # Transaction Context
//!
//! One per request. Every mutation field of the request appends to the same
//! context; the last root field finalizes it into a [`TransactionRequest`].
//!
//! Naming: document variables are `_x0, _x1, …`, parameters `_0, _1, …`.
//! Exported variables keep the name given in `@export(as: …)`.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use tracing::warn;

use crate::model::{InputObject, InputValue, Value};
use crate::script::{Message, Ref, Statement, TransactionRequest};
use crate::{Error, Result};

/// Opaque transaction identifier, used in log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

static NEXT_TX_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an id reference for existence memoization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdKey {
    /// A literal id bound as a parameter.
    Literal(String),
    /// An id only known at run time (document variable or export).
    Var(String),
}

/// Statements, parameters and bookkeeping for one request's transaction.
#[derive(Debug)]
pub struct TransactionContext {
    id: TxId,
    statements: Vec<Statement>,
    pending_constraints: Vec<Statement>,
    params: Map<String, Value>,
    write: BTreeSet<String>,
    read: BTreeSet<String>,
    var_counter: usize,
    param_counter: usize,
    exported: HashMap<String, Ref>,
    exists_cache: HashSet<(IdKey, String)>,
    cache_enabled: bool,
    open: bool,
}

impl TransactionContext {
    pub fn new(cache_enabled: bool) -> Self {
        Self {
            id: TxId(NEXT_TX_ID.fetch_add(1, Ordering::Relaxed)),
            statements: Vec::new(),
            pending_constraints: Vec::new(),
            params: Map::new(),
            write: BTreeSet::new(),
            read: BTreeSet::new(),
            var_counter: 0,
            param_counter: 0,
            exported: HashMap::new(),
            exists_cache: HashSet::new(),
            cache_enabled,
            open: true,
        }
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            warn!(tx = %self.id, "attempted to extend a closed transaction");
            Err(Error::Synthesis(format!("transaction {} has already been submitted", self.id)))
        }
    }

    // ========================================================================
    // Names
    // ========================================================================

    /// Next document variable. With `increment == false` the name is only
    /// peeked, and the next incrementing call returns the same name.
    pub fn fresh_var(&mut self, increment: bool) -> String {
        let name = format!("_x{}", self.var_counter);
        if increment {
            self.var_counter += 1;
        }
        name
    }

    /// Bind `value` under the next parameter name.
    pub fn fresh_param(&mut self, value: Value) -> Result<Ref> {
        let name = format!("_{}", self.param_counter);
        self.param_counter += 1;
        self.add_param(name, value)
    }

    /// Bind `value` under `name`. Names are allocated once.
    pub fn add_param(&mut self, name: impl Into<String>, value: Value) -> Result<Ref> {
        let name = name.into();
        if self.params.contains_key(&name) {
            return Err(Error::Synthesis(format!(
                "Parameter name '{name}' has already been allocated"
            )));
        }
        self.params.insert(name.clone(), value);
        Ok(Ref::Param(name))
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    // ========================================================================
    // Collections
    // ========================================================================

    pub fn lock_write(&mut self, collection: &str) {
        self.read.remove(collection);
        if !self.write.contains(collection) {
            self.write.insert(collection.to_string());
        }
    }

    pub fn lock_read(&mut self, collection: &str) {
        if !self.write.contains(collection) && !self.read.contains(collection) {
            self.read.insert(collection.to_string());
        }
    }

    pub fn write_set(&self) -> &BTreeSet<String> {
        &self.write
    }

    // ========================================================================
    // Statements
    // ========================================================================

    pub fn push(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn comment(&mut self, text: impl Into<String>) {
        self.statements.push(Statement::Comment(text.into()));
    }

    pub fn throw(&mut self, message: impl Into<String>) {
        self.statements.push(Statement::Throw { message: Message::text(message) });
    }

    /// Queue a statement to run after every field's statements.
    pub fn defer_constraint(&mut self, statement: Statement) {
        self.pending_constraints.push(statement);
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn pending_constraints(&self) -> &[Statement] {
        &self.pending_constraints
    }

    // ========================================================================
    // Exports
    // ========================================================================

    /// Record that `name` now holds `value` inside the script.
    pub fn export_var(&mut self, name: &str, value: Ref) -> Result<()> {
        if self.exported.contains_key(name) {
            return Err(Error::Input(format!("variable ${name} is exported more than once")));
        }
        self.exported.insert(name.to_string(), value);
        Ok(())
    }

    pub fn exported(&self, name: &str) -> Option<&Ref> {
        self.exported.get(name)
    }

    /// Split `input` into literal fields and fields imported from exported
    /// variables. A reference to an unexported variable becomes a script
    /// throw and the field is dropped.
    pub fn substitute_exports(&mut self, input: &InputObject) -> (InputObject, Vec<(String, Ref)>) {
        let mut literal = InputObject::new();
        let mut imports = Vec::new();
        for (field, value) in input.iter() {
            match value.as_variable() {
                Some(name) => match self.exported.get(name) {
                    Some(r) => imports.push((field.to_string(), r.clone())),
                    None => self.throw(format!("Variable ${name} has not been exported")),
                },
                None => literal.insert(field, value.clone()),
            }
        }
        (literal, imports)
    }

    /// Reference for an id argument: literal ids become parameters, variable
    /// references resolve to their export.
    pub fn resolve_id(&mut self, value: &InputValue) -> Result<Ref> {
        match value {
            InputValue::String(id) => self.fresh_param(Value::from(id.as_str())),
            InputValue::Variable(name) => match self.exported.get(name) {
                Some(r) => Ok(r.clone()),
                None => {
                    self.throw(format!("Variable ${name} has not been exported"));
                    self.fresh_param(Value::Null)
                }
            },
            other => Err(Error::Input(format!("expected a document id, got {other:?}"))),
        }
    }

    // ========================================================================
    // Existence memo
    // ========================================================================

    pub fn id_key(&self, r: &Ref) -> IdKey {
        match r {
            Ref::Param(name) => match self.params.get(name) {
                Some(Value::String(id)) => IdKey::Literal(id.clone()),
                _ => IdKey::Var(r.to_string()),
            },
            other => IdKey::Var(other.to_string()),
        }
    }

    /// True if an existence check of `id` as `type_name` must be emitted.
    /// Records the check so later identical ones are skipped.
    pub fn needs_exists_check(&mut self, id: &Ref, type_name: &str) -> bool {
        if !self.cache_enabled {
            return true;
        }
        let key = (self.id_key(id), type_name.to_string());
        self.exists_cache.insert(key)
    }

    /// Forget memoized existence of a deleted id. Run-time ids may alias
    /// anything, so they clear the whole memo.
    pub fn invalidate(&mut self, id: &Ref) {
        match self.id_key(id) {
            IdKey::Literal(lit) => self.exists_cache.retain(|(k, _)| *k != IdKey::Literal(lit.clone())),
            IdKey::Var(_) => self.exists_cache.clear(),
        }
    }

    // ========================================================================
    // Finalization
    // ========================================================================

    pub fn bind_result(&mut self, alias: &str, var: &str) {
        self.comment("bind result for mutation field");
        self.push(Statement::SetResult { alias: alias.to_string(), value: Ref::Doc(var.to_string()) });
    }

    /// Close the context and produce the request. Pending constraints are
    /// appended after every field's statements, in the order they were queued.
    pub fn finalize(&mut self) -> Result<TransactionRequest> {
        self.ensure_open()?;
        self.open = false;
        let mut statements = std::mem::take(&mut self.statements);
        if !self.pending_constraints.is_empty() {
            statements.push(Statement::Comment("final constraint checks".into()));
            statements.append(&mut self.pending_constraints);
        }
        Ok(TransactionRequest {
            write: std::mem::take(&mut self.write),
            read: std::mem::take(&mut self.read),
            statements,
            params: std::mem::take(&mut self.params),
        })
    }
}
