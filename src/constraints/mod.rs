//! # Constraint Checker
//!
//! Turns the directives on a type's fields into deferred assertions. Each
//! directive occurrence yields one `if (<violation>) throw <message>` that
//! runs after every field of the request has written its data.
//!
//! | Directive | Violation |
//! |---|---|
//! | `@noloops` | an edge of the field from `id` points back at `id` |
//! | `@distinct` | two edges of the field from `id` share a target |
//! | `@uniqueForTarget` | a target of `id` has another inbound edge of the field |
//! | `@_uniqueForTarget_AccordingToInterface` | same, over every implementer's collection |
//! | `@requiredForTarget` | some target instance has no inbound edge of the field |
//! | `@_requiredForTarget_AccordingToInterface` | same, over every implementer's collection |
//! | `@required` on `_<field>From<Type>` | `id` still exists but has no inbound edge |

use tracing::debug;

use crate::config::DriverConfig;
use crate::schema::{Directive, FieldDef, TypeGraph};
use crate::script::{Check, Message, Ref, Statement};
use crate::tx::TransactionContext;
use crate::Result;

/// Queue the directive checks of `type_name` for the document `id`.
///
/// With a `guard`, the checks only run if the guard is truthy at run time
/// (used after removals that may not have found anything).
pub fn defer_checks(
    tx: &mut TransactionContext,
    graph: TypeGraph<'_>,
    config: &DriverConfig,
    type_name: &str,
    id: &Ref,
    guard: Option<&Ref>,
) -> Result<()> {
    if config.disable_directives_checking {
        debug!("directives checking disabled");
        return Ok(());
    }
    graph.check_interface_fields(type_name)?;

    let mut asserts = Vec::new();
    for field in &graph.type_def(type_name)?.fields {
        for directive in graph.directives(field)? {
            if let Some((check, message)) = check_for(graph, type_name, field, &directive, id)? {
                for c in check.collections() {
                    tx.lock_read(c);
                }
                asserts.push(Statement::Assert { check, message: Message::text(message) });
            }
        }
    }
    if asserts.is_empty() {
        return Ok(());
    }

    match guard {
        Some(condition) => tx.defer_constraint(Statement::Guard { condition: condition.clone(), body: asserts }),
        None => asserts.into_iter().for_each(|a| tx.defer_constraint(a)),
    }
    Ok(())
}

/// The check and message for one directive on one field, if it constrains anything.
fn check_for(
    graph: TypeGraph<'_>,
    type_name: &str,
    field: &FieldDef,
    directive: &Directive,
    id: &Ref,
) -> Result<Option<(Check, String)>> {
    let f = &field.name;
    let own = graph.edge_collection_name(type_name, f);
    let target_type = field.ty.named_type();

    Ok(Some(match directive {
        Directive::NoLoops => (
            Check::SelfLoop { source: id.clone(), collection: own },
            format!("Field {f} in {type_name} is breaking a @noloops directive!"),
        ),
        Directive::Distinct => (
            Check::DuplicateTarget { source: id.clone(), collection: own },
            format!("Field {f} in {type_name} is breaking a @distinct directive!"),
        ),
        Directive::UniqueForTarget => (
            Check::SharedTarget { source: id.clone(), outbound: vec![own.clone()], inbound: vec![own] },
            format!("Field {f} in {type_name} is breaking a @uniqueForTarget directive!"),
        ),
        Directive::UniqueForTargetAccordingToInterface { interface } => {
            let all = graph.possible_edge_collections(interface, f)?;
            (
                Check::SharedTarget { source: id.clone(), outbound: all.clone(), inbound: all },
                format!("Field {f} in {type_name} is breaking a @_uniqueForTarget_AccordingToInterface directive!"),
            )
        }
        Directive::RequiredForTarget => (
            Check::OrphanTarget { targets: graph.possible_collections(target_type)?, inbound: vec![own] },
            format!("There are object(s) breaking the @requiredForTarget directive of Field {f} in {type_name}!"),
        ),
        Directive::RequiredForTargetAccordingToInterface { interface } => (
            Check::OrphanTarget {
                targets: graph.possible_collections(target_type)?,
                inbound: graph.possible_edge_collections(interface, f)?,
            },
            format!(
                "There are object(s) breaking the inherited @_requiredForTarget_AccordingToInterface directive of Field {f} in {type_name}!"
            ),
        ),
        Directive::Required => {
            let Some(reverse) = graph.reverse_edge(field) else {
                return Ok(None);
            };
            (
                Check::MissingInbound {
                    id: id.clone(),
                    collection: type_name.to_string(),
                    inbound: graph.possible_edge_collections(&reverse.source_type, &reverse.forward_field)?,
                },
                format!("Field {f} in {type_name} is breaking a @requiredForTarget directive (in reverse)!"),
            )
        }
        Directive::Export { .. } => return Ok(None),
    }))
}
