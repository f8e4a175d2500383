//! # Document Graph Model
//!
//! Clean DTOs that cross every boundary: input ↔ synthesizer ↔ engine ↔ caller.
//!
//! Design rule: NO script IR, NO schema types here.
//! This module is pure data: no I/O, no state, no async.

pub mod document;
pub mod value;
pub mod input;
pub mod selection;

pub use document::{Document, DocumentId, fields};
pub use value::{Value, compare_values, format_fix_value, now_millis, DATE_TIME_SCALAR};
pub use input::{InputObject, InputValue};
pub use selection::{Selection, SelectionItem, FieldSelection};
