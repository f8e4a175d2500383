//! Stored documents and their identifiers.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A stored document (vertex or edge record). Field order is preserved.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Reserved document fields written and read by the synthesizer.
pub mod fields {
    pub const ID: &str = "_id";
    pub const KEY: &str = "_key";
    pub const FROM: &str = "_from";
    pub const TO: &str = "_to";
    pub const CREATION_DATE: &str = "_creationDate";
    pub const LAST_UPDATE_DATE: &str = "_lastUpdateDate";
    pub const TYPENAME: &str = "__typename";
}

/// Document identifier of the form `<Collection>/<key>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(collection: &str, key: &str) -> Self {
        Self(format!("{collection}/{key}"))
    }

    /// Parse an id string, rejecting anything without a `collection/key` shape.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.split_once('/') {
            Some((c, k)) if !c.is_empty() && !k.is_empty() => Ok(Self(raw.to_string())),
            _ => Err(Error::Input(format!("'{raw}' is not a document id"))),
        }
    }

    pub fn collection(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(c, _)| c)
    }

    pub fn key(&self) -> &str {
        self.0.split_once('/').map_or("", |(_, k)| k)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        let id = DocumentId::parse("Person/42").unwrap();
        assert_eq!(id.collection(), "Person");
        assert_eq!(id.key(), "42");
        assert_eq!(id.to_string(), "Person/42");
    }

    #[test]
    fn test_parse_rejects_bare_key() {
        assert!(DocumentId::parse("42").is_err());
        assert!(DocumentId::parse("Person/").is_err());
    }
}
