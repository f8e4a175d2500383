//! Script IR → ArangoDB JavaScript transaction function.
//!
//! Every query is an `aql` template; references are interpolated as
//! `${…}` so they reach the server as bind values, never as query text.

use std::fmt::Write;

use super::{Check, EdgeMatch, Message, MessagePart, Ref, Statement};
use crate::aql::quote;

const PRELUDE: [&str; 3] = [
    r#"const db = require("@arangodb").db;"#,
    r#"const {aql} = require("@arangodb");"#,
    "let result = Object.create(null);",
];

/// Render a complete `function(params){ … return result; }` body.
pub fn transaction(statements: &[Statement]) -> String {
    let mut out = String::from("function(params){\n");
    for line in PRELUDE {
        push_line(&mut out, 1, line);
    }
    block(&mut out, statements, 1);
    push_line(&mut out, 1, "return result;");
    out.push('}');
    out
}

fn push_line(out: &mut String, depth: usize, line: &str) {
    for _ in 0..depth {
        out.push('\t');
    }
    out.push_str(line);
    out.push('\n');
}

fn block(out: &mut String, statements: &[Statement], depth: usize) {
    for s in statements {
        statement(out, s, depth);
    }
}

fn statement(out: &mut String, s: &Statement, depth: usize) {
    match s {
        Statement::Comment(text) => {
            push_line(out, depth, &format!("/* {} */", text.replace("*/", "* /")));
        }
        Statement::Insert { var, collection, doc, imports, endpoints } => {
            let mut merged = format!("{}, {}", interp(doc), object(imports));
            if let Some((from, to)) = endpoints {
                let _ = write!(merged, r#", {{"_from": {}, "_to": {}}}"#, interp(from), interp(to));
            }
            push_line(
                out,
                depth,
                &format!(
                    "let {var} = db._query(aql`INSERT MERGE({merged}) IN {} RETURN NEW`).next();",
                    coll(collection)
                ),
            );
        }
        Statement::Update { var, collection, id, doc, imports } => push_line(
            out,
            depth,
            &format!(
                "let {var} = db._query(aql`UPDATE PARSE_IDENTIFIER({}).key WITH MERGE({}, {}) IN {} RETURN NEW`).next();",
                interp(id),
                interp(doc),
                object(imports),
                coll(collection)
            ),
        ),
        Statement::Remove { var, collection, id } => push_line(
            out,
            depth,
            &format!(
                "let {var} = db._query(aql`REMOVE PARSE_IDENTIFIER({}).key IN {} OPTIONS {{ ignoreErrors: true }} RETURN OLD`).next();",
                interp(id),
                coll(collection)
            ),
        ),
        Statement::RemoveEdges { collection, endpoint, matching } => {
            let e = interp(endpoint);
            let filter = match matching {
                EdgeMatch::Outbound => format!("x._from == {e}"),
                EdgeMatch::Any => format!("x._from == {e} OR x._to == {e}"),
            };
            let c = coll(collection);
            push_line(
                out,
                depth,
                &format!("db._query(aql`FOR x IN {c} FILTER {filter} REMOVE x IN {c}`);"),
            );
        }
        Statement::Bind { name, value } => push_line(out, depth, &format!("let {name} = {value};")),
        Statement::SetResult { alias, value } => {
            push_line(out, depth, &format!("result[{}] = {value};", quote(alias)));
        }
        Statement::Guard { condition, body } => {
            push_line(out, depth, &format!("if ({condition}) {{"));
            block(out, body, depth + 1);
            push_line(out, depth, "}");
        }
        Statement::Assert { check: c, message } => {
            push_line(out, depth, &format!("if ({}) {{", check(c)));
            push_line(out, depth + 1, &format!("throw {};", message_literal(message)));
            push_line(out, depth, "}");
        }
        Statement::Throw { message } => {
            push_line(out, depth, &format!("throw {};", message_literal(message)));
        }
    }
}

fn interp(r: &Ref) -> String {
    format!("${{{r}}}")
}

fn coll(name: &str) -> String {
    format!("${{db.{name}}}")
}

fn colls(names: &[String]) -> String {
    names.iter().map(|n| coll(n)).collect::<Vec<_>>().join(", ")
}

fn object(entries: &[(String, Ref)]) -> String {
    let body = entries
        .iter()
        .map(|(k, v)| format!("{}: {}", quote(k), interp(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{body}}}")
}

fn query(q: &str) -> String {
    format!("db._query(aql`{q}`).next()")
}

/// JavaScript expression that is truthy when `c` finds a violation.
fn check(c: &Check) -> String {
    match c {
        Check::Missing { id, collections } => {
            let id = interp(id);
            let any = collections
                .iter()
                .map(|c| format!("LENGTH(FOR d IN {} FILTER d._id == {id} LIMIT 1 RETURN true) > 0", coll(c)))
                .collect::<Vec<_>>()
                .join(" || ");
            format!("!{}", query(&format!("RETURN {any}")))
        }
        Check::EdgeExists { source, collection } => query(&format!(
            "FOR x IN 1..1 OUTBOUND {} {} RETURN x",
            interp(source),
            coll(collection)
        )),
        Check::DuplicateKey { candidate, collection, fields } => {
            let cand = interp(candidate);
            let mut q = format!("FOR doc IN {} FILTER doc._id != {cand}._id", coll(collection));
            for f in fields {
                let _ = write!(q, " FILTER doc.{f} == {cand}.{f}");
            }
            q.push_str(" RETURN doc");
            query(&q)
        }
        Check::SelfLoop { source, collection } => query(&format!(
            "FOR v, e, p IN 1..1 OUTBOUND {} {} FILTER p.vertices[0]._id == v._id RETURN v",
            interp(source),
            coll(collection)
        )),
        Check::DuplicateTarget { source, collection } => {
            let (s, c) = (interp(source), coll(collection));
            query(&format!(
                "FOR v, e IN 1..1 OUTBOUND {s} {c} FOR v2, e2 IN 1..1 OUTBOUND {s} {c} FILTER v._id == v2._id AND e._id != e2._id RETURN v"
            ))
        }
        Check::SharedTarget { source, outbound, inbound } => query(&format!(
            "FOR v, e IN 1..1 OUTBOUND {} {} FOR v2, e2 IN 1..1 INBOUND v._id {} FILTER e._id != e2._id RETURN v",
            interp(source),
            colls(outbound),
            colls(inbound)
        )),
        Check::OrphanTarget { targets, inbound } => query(&format!(
            "FOR x IN FLATTEN(FOR i IN [{}] RETURN i) LET endpoints = (FOR v IN 1..1 INBOUND x {} RETURN v) FILTER LENGTH(endpoints) == 0 RETURN x",
            colls(targets),
            colls(inbound)
        )),
        Check::MissingInbound { id, collection, inbound } => {
            let id = interp(id);
            format!(
                "{} && !{}",
                query(&format!("FOR x IN {} FILTER x._id == {id} RETURN x", coll(collection))),
                query(&format!("FOR x IN 1..1 INBOUND {id} {} RETURN x", colls(inbound)))
            )
        }
    }
}

/// A JavaScript template literal for a thrown message.
fn message_literal(m: &Message) -> String {
    let mut out = String::from("`");
    for part in &m.parts {
        match part {
            MessagePart::Text(t) => {
                out.push_str(&t.replace('\\', "\\\\").replace('`', "\\`").replace("${", "\\${"));
            }
            MessagePart::Value(r) => out.push_str(&interp(r)),
        }
    }
    out.push('`');
    out
}
