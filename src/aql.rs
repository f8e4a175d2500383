//! AQL text helpers shared by the read-path and script renderers.
//!
//! Read queries bind every literal through `@name` bind variables; script
//! statements are written into `aql` template strings, where values are
//! interpolated as `${…}` JavaScript expressions instead.

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::model::Value;

/// A rendered read query: text plus bind variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AqlQuery {
    pub query: String,
    #[serde(rename = "bindVars")]
    pub bind_vars: Map<String, Value>,
}

/// Bind-variable allocator for one query.
#[derive(Debug, Default)]
pub struct BindVars {
    vars: Map<String, Value>,
}

impl BindVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value, returning its `@valueN` placeholder.
    pub fn bind(&mut self, value: Value) -> String {
        let name = format!("value{}", self.vars.len());
        self.vars.insert(name.clone(), value);
        format!("@{name}")
    }

    /// Bind a collection name, returning its `@@valueN` placeholder.
    pub fn bind_collection(&mut self, collection: &str) -> String {
        let name = format!("@value{}", self.vars.len());
        self.vars.insert(name.clone(), Value::from(collection));
        format!("@{name}")
    }

    pub fn finish(self, query: String) -> AqlQuery {
        AqlQuery { query, bind_vars: self.vars }
    }
}

/// Quote a string as a JavaScript/AQL double-quoted literal.
pub fn quote(s: &str) -> String {
    // serde_json's string escaping is valid in both languages
    Value::from(s).to_string()
}
