//! Edge synthesis and edge validation.

use tracing::debug;

use super::Synthesizer;
use crate::constraints;
use crate::model::{fields, now_millis, InputObject, InputValue, Selection, Value};
use crate::script::{Check, Message, Ref, Statement};
use crate::Result;

impl Synthesizer<'_> {
    /// Create an edge of `source_type.field` between two existing documents.
    #[allow(clippy::too_many_arguments)]
    pub fn create_edge(
        &mut self,
        is_root: bool,
        source_type: &str,
        source: &InputValue,
        field: &str,
        target: &InputValue,
        annotations: &InputObject,
        exports: Option<&Selection>,
        res_var: Option<String>,
    ) -> Result<String> {
        self.tx.ensure_open()?;
        let target_type = self.graph.field(source_type, field)?.ty.named_type();
        let source = self.tx.resolve_id(source)?;
        let target = self.tx.resolve_id(target)?;
        self.edge(is_root, source, source_type, field, target, target_type, annotations, exports, res_var, true, true)
    }

    /// Insert one edge. `source` and `target` are id references.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn edge(
        &mut self,
        is_root: bool,
        source: Ref,
        source_type: &str,
        field: &str,
        target: Ref,
        target_type: &str,
        annotations: &InputObject,
        exports: Option<&Selection>,
        res_var: Option<String>,
        validate_source: bool,
        validate_target: bool,
    ) -> Result<String> {
        let collection = self.graph.edge_collection_name(source_type, field);
        self.tx.lock_write(&collection);
        self.tx.comment(format!("createEdge {collection}"));

        let (literal, imports) = self.tx.substitute_exports(annotations);
        let var = res_var.unwrap_or_else(|| self.tx.fresh_var(true));

        let mut doc = literal.to_json()?;
        doc.insert(fields::CREATION_DATE.into(), Value::from(now_millis()));
        doc.insert(fields::TYPENAME.into(), Value::from(format!("_{collection}")));
        let doc = self.tx.fresh_param(Value::Object(doc))?;

        self.validate_edge(&source, source_type, field, &target, target_type, validate_source, validate_target)?;

        self.tx.push(Statement::Insert {
            var: var.clone(),
            collection,
            doc,
            imports,
            endpoints: Some((source.clone(), target)),
        });

        if is_root {
            if let Some(selection) = exports {
                self.export_selection(&var, selection)?;
            }
        }
        constraints::defer_checks(self.tx, self.graph, self.config, source_type, &source, None)?;
        Ok(var)
    }

    /// Existence of the endpoints and, for single-valued fields, absence of
    /// an existing outbound edge.
    #[allow(clippy::too_many_arguments)]
    pub fn validate_edge(
        &mut self,
        source: &Ref,
        source_type: &str,
        field: &str,
        target: &Ref,
        target_type: &str,
        validate_source: bool,
        validate_target: bool,
    ) -> Result<()> {
        if self.config.disable_edge_validation {
            debug!("edge validation disabled");
            return Ok(());
        }
        if validate_source {
            self.exists(source, source_type, "source exists?")?;
        }
        if validate_target {
            self.exists(target, target_type, "target exists?")?;
        }

        if !self.graph.field(source_type, field)?.ty.is_list() {
            let collection = self.graph.edge_collection_name(source_type, field);
            self.tx.lock_read(&collection);
            self.tx.push(Statement::Assert {
                check: Check::EdgeExists { source: source.clone(), collection },
                message: Message::text(format!("Edge already exists for {field} from '"))
                    .then_value(source.clone())
                    .then_text("'"),
            });
        }
        Ok(())
    }

    /// Assert that `id` is a document of `type_name` (or one of its
    /// possible types). Skipped when already asserted in this request.
    fn exists(&mut self, id: &Ref, type_name: &str, label: &str) -> Result<()> {
        if !self.tx.needs_exists_check(id, type_name) {
            return Ok(());
        }
        let collections = self.graph.possible_collections(type_name)?;
        for c in &collections {
            self.tx.lock_read(c);
        }
        self.tx.comment(label);
        self.tx.push(Statement::Assert {
            check: Check::Missing { id: id.clone(), collections },
            message: Message::text("Object '")
                .then_value(id.clone())
                .then_text(format!("' does not exist as instance of {type_name}")),
        });
        Ok(())
    }

    /// Merge `data` into an edge. Directive checks are not re-run: the
    /// endpoints of an edge never change here.
    #[allow(clippy::too_many_arguments)]
    pub fn update_edge(
        &mut self,
        is_root: bool,
        id: &InputValue,
        data: &InputObject,
        source_type: &str,
        field: &str,
        exports: Option<&Selection>,
        res_var: Option<String>,
    ) -> Result<String> {
        self.tx.ensure_open()?;
        let collection = self.graph.edge_collection_name(source_type, field);
        let var = res_var.unwrap_or_else(|| self.tx.fresh_var(true));
        self.tx.lock_write(&collection);
        self.tx.comment(format!("update edge {collection}"));

        let (literal, imports) = self.tx.substitute_exports(data);
        let mut doc = literal.to_json()?;
        doc.remove(fields::FROM);
        doc.remove(fields::TO);
        doc.insert(fields::LAST_UPDATE_DATE.into(), Value::from(now_millis()));
        let doc = self.tx.fresh_param(Value::Object(doc))?;
        let id = self.tx.resolve_id(id)?;

        self.tx.push(Statement::Update { var: var.clone(), collection, id, doc, imports });

        if is_root {
            if let Some(selection) = exports {
                self.export_selection(&var, selection)?;
            }
        }
        Ok(var)
    }

    /// Remove an edge. A missing edge yields null; otherwise the directive
    /// checks of the source type run against the removed edge's `_from`.
    pub fn delete_edge(
        &mut self,
        _is_root: bool,
        id: &InputValue,
        source_type: &str,
        field: &str,
        res_var: Option<String>,
    ) -> Result<String> {
        self.tx.ensure_open()?;
        let collection = self.graph.edge_collection_name(source_type, field);
        self.tx.comment(format!("delete edge {collection}"));
        let id = self.tx.resolve_id(id)?;

        let var = res_var.unwrap_or_else(|| self.tx.fresh_var(true));
        self.tx.lock_write(&collection);
        self.tx.push(Statement::Remove { var: var.clone(), collection, id });

        let removed = Ref::Doc(var.clone());
        let source = removed.clone().field(fields::FROM);
        constraints::defer_checks(self.tx, self.graph, self.config, source_type, &source, Some(&removed))?;
        Ok(var)
    }
}
