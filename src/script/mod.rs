//! # Transaction Script IR
//!
//! Typed statements produced by synthesis. Nothing here knows about the
//! engine's concrete syntax; `render` turns a finished [`TransactionRequest`]
//! into an ArangoDB JavaScript transaction function, and `MemoryEngine`
//! interprets the same statements directly.
//!
//! ```text
//! Insert  _x0 ← INSERT MERGE(params._0, {imports}) IN Person RETURN NEW
//! Bind    planet = _x0._id
//! Guard   if (_x1) { RemoveEdges … }
//! Assert  if (<violation>) throw "<message>"
//! ```

pub mod render;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::model::{fields, Value};

// ============================================================================
// References
// ============================================================================

/// A value reachable from inside the script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ref {
    /// Bound parameter, `params._N`.
    Param(String),
    /// Document returned by a write statement, `_xN`.
    Doc(String),
    /// Variable bound by an `@export`, holding a plain value.
    Exported(String),
    /// Field access on another reference.
    Field(Box<Ref>, String),
}

impl Ref {
    pub fn field(self, name: impl Into<String>) -> Ref {
        Ref::Field(Box::new(self), name.into())
    }

    /// Reference to the `_id` this ref denotes. Documents are projected to
    /// their `_id`; parameters, exports and field accesses already hold one.
    pub fn id(self) -> Ref {
        match self {
            Ref::Doc(_) => self.field(fields::ID),
            other => other,
        }
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ref::Param(name) => write!(f, "params.{name}"),
            Ref::Doc(name) | Ref::Exported(name) => f.write_str(name),
            Ref::Field(base, field) => write!(f, "{base}.{field}"),
        }
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Part of a thrown message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessagePart {
    Text(String),
    /// Interpolated at run time.
    Value(Ref),
}

/// Text of a script-level error, optionally interpolating script values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Message {
    pub parts: Vec<MessagePart>,
}

impl Message {
    pub fn text(s: impl Into<String>) -> Self {
        Self { parts: vec![MessagePart::Text(s.into())] }
    }

    pub fn then_text(mut self, s: impl Into<String>) -> Self {
        self.parts.push(MessagePart::Text(s.into()));
        self
    }

    pub fn then_value(mut self, r: Ref) -> Self {
        self.parts.push(MessagePart::Value(r));
        self
    }
}

// ============================================================================
// Checks
// ============================================================================

/// A violation query. An `Assert` throws when its check finds a violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Check {
    /// `id` is not a document of any of `collections`.
    Missing { id: Ref, collections: Vec<String> },
    /// `source` already has an outbound edge in `collection`.
    EdgeExists { source: Ref, collection: String },
    /// Another document of `collection` agrees with `candidate` on every key field.
    DuplicateKey { candidate: Ref, collection: String, fields: Vec<String> },
    /// An outbound edge of `source` points back at `source`.
    SelfLoop { source: Ref, collection: String },
    /// Two outbound edges of `source` share a target that still exists.
    DuplicateTarget { source: Ref, collection: String },
    /// A target reached from `source` over `outbound` has a second inbound edge in `inbound`.
    SharedTarget { source: Ref, outbound: Vec<String>, inbound: Vec<String> },
    /// Some document of `targets` has no inbound edge in `inbound`.
    OrphanTarget { targets: Vec<String>, inbound: Vec<String> },
    /// `id` still exists in `collection` but has no inbound edge in `inbound`.
    MissingInbound { id: Ref, collection: String, inbound: Vec<String> },
}

impl Check {
    /// Every collection the check reads.
    pub fn collections(&self) -> Vec<&str> {
        match self {
            Check::Missing { collections, .. } => collections.iter().map(String::as_str).collect(),
            Check::EdgeExists { collection, .. }
            | Check::DuplicateKey { collection, .. }
            | Check::SelfLoop { collection, .. }
            | Check::DuplicateTarget { collection, .. } => vec![collection.as_str()],
            Check::SharedTarget { outbound, inbound, .. } => {
                outbound.iter().chain(inbound).map(String::as_str).collect()
            }
            Check::OrphanTarget { targets, inbound } => {
                targets.iter().chain(inbound).map(String::as_str).collect()
            }
            Check::MissingInbound { collection, inbound, .. } => std::iter::once(collection)
                .chain(inbound)
                .map(String::as_str)
                .collect(),
        }
    }
}

// ============================================================================
// Statements
// ============================================================================

/// Which edges `RemoveEdges` drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeMatch {
    /// `_from == endpoint`
    Outbound,
    /// `_from == endpoint OR _to == endpoint`
    Any,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Comment(String),
    /// Insert `MERGE(doc, imports[, {_from, _to}])` and bind `NEW` to `var`.
    Insert {
        var: String,
        collection: String,
        doc: Ref,
        imports: Vec<(String, Ref)>,
        endpoints: Option<(Ref, Ref)>,
    },
    /// Merge `MERGE(doc, imports)` into the document `id` and bind `NEW` to `var`.
    Update {
        var: String,
        collection: String,
        id: Ref,
        doc: Ref,
        imports: Vec<(String, Ref)>,
    },
    /// Remove `id` ignoring a missing document; binds `OLD` or null to `var`.
    Remove { var: String, collection: String, id: Ref },
    RemoveEdges { collection: String, endpoint: Ref, matching: EdgeMatch },
    /// `let name = value`
    Bind { name: String, value: Ref },
    /// `result[alias] = value`
    SetResult { alias: String, value: Ref },
    /// Run `body` only if `condition` is truthy.
    Guard { condition: Ref, body: Vec<Statement> },
    Assert { check: Check, message: Message },
    Throw { message: Message },
}

// ============================================================================
// Transaction request
// ============================================================================

/// Map from root-field alias to that field's result.
pub type ResultMap = Map<String, Value>;

/// Everything the engine needs to run one request atomically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub write: BTreeSet<String>,
    pub read: BTreeSet<String>,
    pub statements: Vec<Statement>,
    pub params: Map<String, Value>,
}

impl TransactionRequest {
    /// Concrete transaction function text.
    pub fn render(&self) -> String {
        render::transaction(&self.statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_display() {
        let r = Ref::Doc("_x0".into()).id();
        assert_eq!(r.to_string(), "_x0._id");
        assert_eq!(Ref::Param("_3".into()).id().to_string(), "params._3");
        assert_eq!(Ref::Exported("planet".into()).id().to_string(), "planet");
    }

    #[test]
    fn test_id_of_field_is_unchanged() {
        let from = Ref::Doc("_x2".into()).field("_from");
        assert_eq!(from.clone().id(), from);
    }
}
