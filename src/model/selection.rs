//! Selection sets of mutation fields.
//!
//! Only what the synthesizer needs: the response key of the root field and
//! the nested fields carrying `@export` directives.

use serde::{Deserialize, Serialize};

/// The selection of one mutation field, keyed by its response alias.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Response key (`alias` if given, otherwise the field name).
    pub alias: String,
    pub items: Vec<SelectionItem>,
}

/// One entry in a selection set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectionItem {
    Field(FieldSelection),
    /// `... on Type { … }`; never exported from.
    InlineFragment { type_condition: Option<String>, items: Vec<SelectionItem> },
}

/// A selected field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSelection {
    pub name: String,
    /// `@export(as: "…")` target, if present.
    pub export_as: Option<String>,
    pub items: Vec<SelectionItem>,
}

impl Selection {
    pub fn new(alias: impl Into<String>) -> Self {
        Self { alias: alias.into(), items: Vec::new() }
    }

    pub fn field(mut self, field: FieldSelection) -> Self {
        self.items.push(SelectionItem::Field(field));
        self
    }

    /// Select a field and export it under `var`.
    pub fn export(self, name: impl Into<String>, var: impl Into<String>) -> Self {
        self.field(FieldSelection::new(name).export_as(var))
    }
}

impl FieldSelection {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn export_as(mut self, var: impl Into<String>) -> Self {
        self.export_as = Some(var.into());
        self
    }

    pub fn with(mut self, child: FieldSelection) -> Self {
        self.items.push(SelectionItem::Field(child));
        self
    }
}
