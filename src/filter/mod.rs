//! # Filter Translator
//!
//! Turns a structured filter argument into typed condition fragments.
//!
//! ```text
//! { name: { _ilike: "%Doe" }, _or: [ { age: { _gt: 30 } }, { age: { _lt: 5 } } ] }
//!   → [ LIKE(x.name, "%Doe", true), ( (x.age > 30) OR (x.age < 5) ) ]
//! ```
//!
//! Fragments are ANDed by the caller in the order returned (which is the
//! order of appearance in the input). The same fragments render to AQL
//! (`to_aql`) and evaluate against documents (`matches`).

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::aql::BindVars;
use crate::model::{compare_values, fields, format_fix_value, Document, Value};
use crate::schema::TypeDef;
use crate::{Error, Result};

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    fn as_aql(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Neq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Neq => ord != Ordering::Equal,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Gte => ord != Ordering::Less,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Lte => ord != Ordering::Greater,
        }
    }
}

/// A field of the row being filtered, e.g. `x.name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRef {
    pub alias: String,
    pub field: String,
}

impl FieldRef {
    fn to_aql(&self) -> String {
        format!("{}.{}", self.alias, self.field)
    }
}

/// One filter fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Compare { target: FieldRef, op: CompareOp, value: Value },
    In { target: FieldRef, values: Vec<Value>, negated: bool },
    Like { target: FieldRef, pattern: String, case_insensitive: bool, negated: bool },
    /// Parenthesized conjunction.
    And(Vec<Condition>),
    /// Parenthesized disjunction.
    Or(Vec<Condition>),
    /// Negated conjunction.
    Not(Vec<Condition>),
}

// ============================================================================
// Translation
// ============================================================================

/// Translate a filter object. An empty (or null) filter yields no fragments.
///
/// `type_to_filter` supplies field types for scalar coercion; when `None`
/// values pass through unchanged.
pub fn translate(filter: &Value, type_to_filter: Option<&TypeDef>, alias: &str) -> Result<Vec<Condition>> {
    let obj = match filter {
        Value::Null => return Ok(Vec::new()),
        Value::Object(o) => o,
        other => return Err(Error::Input(format!("filter must be an object, got {other}"))),
    };

    let mut out = Vec::new();
    for (key, arg) in obj {
        match key.as_str() {
            "_and" => out.push(Condition::And(translate_group(arg, type_to_filter, alias)?)),
            "_or" => out.push(Condition::Or(translate_group(arg, type_to_filter, alias)?)),
            "_not" => out.push(Condition::Not(translate(arg, type_to_filter, alias)?)),
            field => translate_field(field, arg, type_to_filter, alias, &mut out)?,
        }
    }
    Ok(out)
}

/// Each member of an `_and`/`_or` list is itself a conjunction of fragments.
fn translate_group(arg: &Value, t: Option<&TypeDef>, alias: &str) -> Result<Vec<Condition>> {
    let members = match arg {
        Value::Array(items) => items.as_slice(),
        other => return Err(Error::Input(format!("boolean filter group must be a list, got {other}"))),
    };
    let mut out = Vec::with_capacity(members.len());
    for m in members {
        let mut frags = translate(m, t, alias)?;
        match frags.len() {
            0 => {}
            1 => out.extend(frags.pop()),
            _ => out.push(Condition::And(frags)),
        }
    }
    Ok(out)
}

fn translate_field(
    name: &str,
    ops: &Value,
    t: Option<&TypeDef>,
    alias: &str,
    out: &mut Vec<Condition>,
) -> Result<()> {
    let field = if name == "id" { fields::ID } else { name };
    let scalar = scalar_of(field, t)?;
    let target = FieldRef { alias: alias.to_string(), field: field.to_string() };

    let ops = match ops {
        Value::Object(o) => o,
        other => return Err(Error::Input(format!("filter for '{name}' must be an object, got {other}"))),
    };

    for (op, raw) in ops {
        if raw.is_null() {
            continue;
        }
        let value = match scalar.as_deref() {
            Some(s) => format_fix_value(s, raw)?,
            None => raw.clone(),
        };
        let target = target.clone();
        let cond = match op.as_str() {
            "_eq" => Condition::Compare { target, op: CompareOp::Eq, value },
            "_neq" => Condition::Compare { target, op: CompareOp::Neq, value },
            "_gt" => Condition::Compare { target, op: CompareOp::Gt, value },
            "_egt" => Condition::Compare { target, op: CompareOp::Gte, value },
            "_lt" => Condition::Compare { target, op: CompareOp::Lt, value },
            "_elt" => Condition::Compare { target, op: CompareOp::Lte, value },
            "_in" => Condition::In { target, values: as_list(op, value)?, negated: false },
            "_nin" => Condition::In { target, values: as_list(op, value)?, negated: true },
            "_like" => like(target, op, value, false, false)?,
            "_ilike" => like(target, op, value, true, false)?,
            "_nlike" => like(target, op, value, false, true)?,
            "_nilike" => like(target, op, value, true, true)?,
            other => return Err(Error::Input(format!("unknown filter operator '{other}' on '{name}'"))),
        };
        out.push(cond);
    }
    Ok(())
}

/// Named scalar type of a filtered field; `_id` and untyped filters skip coercion.
fn scalar_of(field: &str, t: Option<&TypeDef>) -> Result<Option<String>> {
    if field.starts_with('_') {
        return Ok(None);
    }
    match t {
        None => Ok(None),
        Some(t) => t
            .get_field(field)
            .map(|f| Some(f.ty.named_type().to_string()))
            .ok_or_else(|| Error::Schema(format!("cannot filter on unknown field '{field}' of '{}'", t.name))),
    }
}

fn as_list(op: &str, value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(Error::Input(format!("{op} expects a list, got {other}"))),
    }
}

fn like(target: FieldRef, op: &str, value: Value, case_insensitive: bool, negated: bool) -> Result<Condition> {
    match value {
        Value::String(pattern) => Ok(Condition::Like { target, pattern, case_insensitive, negated }),
        other => Err(Error::Input(format!("{op} expects a string pattern, got {other}"))),
    }
}

// ============================================================================
// Rendering
// ============================================================================

impl Condition {
    /// Render to AQL, binding literal values.
    pub fn to_aql(&self, binds: &mut BindVars) -> String {
        match self {
            Condition::Compare { target, op, value } => {
                format!("{} {} {}", target.to_aql(), op.as_aql(), binds.bind(value.clone()))
            }
            Condition::In { target, values, negated } => format!(
                "{} {}IN {}",
                target.to_aql(),
                if *negated { "NOT " } else { "" },
                binds.bind(Value::Array(values.clone()))
            ),
            Condition::Like { target, pattern, case_insensitive, negated } => format!(
                "{}LIKE({}, {}, {})",
                if *negated { "NOT " } else { "" },
                target.to_aql(),
                binds.bind(Value::from(pattern.as_str())),
                case_insensitive
            ),
            Condition::And(parts) => format!("({})", join(parts, " AND ", binds)),
            Condition::Or(parts) => format!("({})", join(parts, " OR ", binds)),
            Condition::Not(parts) => format!("NOT ({})", join(parts, " AND ", binds)),
        }
    }
}

fn join(parts: &[Condition], sep: &str, binds: &mut BindVars) -> String {
    if parts.is_empty() {
        return "true".into();
    }
    parts.iter().map(|p| p.to_aql(binds)).collect::<Vec<_>>().join(sep)
}

/// Render a fragment list as consecutive `FILTER … AND …` text.
pub fn filters_to_aql(conditions: &[Condition], binds: &mut BindVars) -> String {
    if conditions.is_empty() {
        return String::new();
    }
    format!(" FILTER {}", join(conditions, " AND ", binds))
}

// ============================================================================
// Evaluation
// ============================================================================

impl Condition {
    /// Evaluate against a document; a missing field reads as `null`.
    pub fn matches(&self, doc: &Document) -> bool {
        let read = |t: &FieldRef| doc.get(&t.field).cloned().unwrap_or(Value::Null);
        match self {
            Condition::Compare { target, op, value } => op.holds(compare_values(&read(target), value)),
            Condition::In { target, values, negated } => {
                let v = read(target);
                values.iter().any(|c| compare_values(&v, c) == Ordering::Equal) != *negated
            }
            Condition::Like { target, pattern, case_insensitive, negated } => {
                let hit = match read(target) {
                    Value::String(s) => like_match(&s, pattern, *case_insensitive),
                    Value::Number(n) => like_match(&n.to_string(), pattern, *case_insensitive),
                    Value::Bool(b) => like_match(&b.to_string(), pattern, *case_insensitive),
                    _ => false,
                };
                hit != *negated
            }
            Condition::And(parts) => parts.iter().all(|p| p.matches(doc)),
            Condition::Or(parts) => parts.is_empty() || parts.iter().any(|p| p.matches(doc)),
            Condition::Not(parts) => !parts.iter().all(|p| p.matches(doc)),
        }
    }
}

/// True if every fragment matches.
pub fn matches_all(conditions: &[Condition], doc: &Document) -> bool {
    conditions.iter().all(|c| c.matches(doc))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LikeToken {
    Any,
    One,
    Char(char),
}

fn like_tokens(pattern: &str, case_insensitive: bool) -> Vec<LikeToken> {
    let mut out = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        out.push(match c {
            '%' => LikeToken::Any,
            '_' => LikeToken::One,
            '\\' => match chars.next() {
                Some(escaped) => LikeToken::Char(escaped),
                None => LikeToken::Char('\\'),
            },
            c => LikeToken::Char(c),
        });
    }
    if case_insensitive {
        out.iter_mut().for_each(|t| {
            if let LikeToken::Char(c) = t {
                *c = c.to_lowercase().next().unwrap_or(*c);
            }
        });
    }
    out
}

/// SQL-style LIKE: `%` matches any sequence, `_` one character, `\` escapes.
pub fn like_match(value: &str, pattern: &str, case_insensitive: bool) -> bool {
    let tokens = like_tokens(pattern, case_insensitive);
    let text: Vec<char> = if case_insensitive {
        value.chars().map(|c| c.to_lowercase().next().unwrap_or(c)).collect()
    } else {
        value.chars().collect()
    };

    // dp[j] == pattern[..i] matches text[..j]
    let mut dp = vec![false; text.len() + 1];
    dp[0] = true;
    for tok in &tokens {
        let mut next = vec![false; text.len() + 1];
        match tok {
            LikeToken::Any => {
                let mut seen = false;
                for j in 0..=text.len() {
                    seen |= dp[j];
                    next[j] = seen;
                }
            }
            LikeToken::One => {
                for j in 1..=text.len() {
                    next[j] = dp[j - 1];
                }
            }
            LikeToken::Char(c) => {
                for j in 1..=text.len() {
                    next[j] = dp[j - 1] && text[j - 1] == *c;
                }
            }
        }
        dp = next;
    }
    dp[text.len()]
}
