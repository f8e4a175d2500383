//! Request execution.
//!
//! Every root mutation field of one request appends to a shared
//! [`RequestContext`]. The last root field to contribute finalizes the
//! transaction and submits it; every root field then awaits the same
//! one-shot outcome through its [`PendingField`].
//!
//! ```text
//! request(["a", "b"])
//!   create(a) → statements…  result["a"] = _x0     pending {b}
//!   create(b) → statements…  result["b"] = _x3     pending {}  → submit
//!   a.resolve().await, b.resolve().await           ← same outcome
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::model::{InputObject, InputValue, Selection, Value};
use crate::mutation::Synthesizer;
use crate::schema::TypeGraph;
use crate::script::ResultMap;
use crate::storage::TransactionEngine;
use crate::tx::{TransactionContext, TxId};
use crate::{Driver, Error, Result};

/// Terminal state of a request, shared by every root field.
pub type Outcome = std::result::Result<Arc<ResultMap>, Error>;

// ============================================================================
// RequestContext
// ============================================================================

/// Shared state of one mutation request.
pub struct RequestContext {
    id: TxId,
    state: Mutex<RequestState>,
    done: watch::Sender<Option<Outcome>>,
}

struct RequestState {
    /// `None` once submitted or failed.
    tx: Option<TransactionContext>,
    /// Root aliases that have not contributed yet.
    pending: Vec<String>,
}

impl RequestContext {
    pub fn new<S: Into<String>>(root_aliases: impl IntoIterator<Item = S>, exists_cache: bool) -> Self {
        let tx = TransactionContext::new(exists_cache);
        let (done, _) = watch::channel(None);
        Self {
            id: tx.id(),
            state: Mutex::new(RequestState {
                tx: Some(tx),
                pending: root_aliases.into_iter().map(Into::into).collect(),
            }),
            done,
        }
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    /// Root aliases still expected to contribute.
    pub fn pending(&self) -> Vec<String> {
        self.state.lock().pending.clone()
    }

    /// The terminal state, once reached.
    pub fn outcome(&self) -> Option<Outcome> {
        self.done.borrow().clone()
    }

    fn pending_field(&self, alias: &str) -> PendingField {
        PendingField { alias: alias.to_string(), rx: self.done.subscribe() }
    }

    /// Record the terminal state. Only the first call has an effect.
    fn finish(&self, outcome: Outcome) {
        self.done.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        });
    }

    /// Fail the request: close the context and deliver `error` to every field.
    fn fail(&self, state: &mut RequestState, error: Error) {
        state.tx = None;
        state.pending.clear();
        warn!(tx = %self.id, error = %error, "request failed during synthesis");
        self.finish(Err(error));
    }
}

// ============================================================================
// PendingField
// ============================================================================

/// The result of one root field, available once the request completes.
#[derive(Debug)]
pub struct PendingField {
    alias: String,
    rx: watch::Receiver<Option<Outcome>>,
}

impl PendingField {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Wait for the request to complete and take this field's slice of the
    /// result map. A failed request yields its error to every field.
    pub async fn resolve(mut self) -> Result<Value> {
        let outcome = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::Transaction("request dropped before completion".into()))?
            .clone();
        match outcome {
            Some(Ok(results)) => results
                .get(&self.alias)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("result for '{}'", self.alias))),
            Some(Err(e)) => Err(e),
            None => Err(Error::Transaction("request completed without an outcome".into())),
        }
    }
}

// ============================================================================
// Mutation dispatch
// ============================================================================

impl<E: TransactionEngine> Driver<E> {
    /// Open a request whose root mutation fields are `root_aliases`.
    pub fn request<S: Into<String>>(&self, root_aliases: impl IntoIterator<Item = S>) -> RequestContext {
        RequestContext::new(root_aliases, self.config().exists_cache)
    }

    pub async fn create(
        &self,
        is_root: bool,
        ctx: &RequestContext,
        data: &InputObject,
        type_name: &str,
        selection: &Selection,
    ) -> Result<Option<PendingField>> {
        self.mutate(is_root, ctx, selection, |s, exports| s.create(is_root, data, type_name, exports, None))
            .await
    }

    pub async fn update(
        &self,
        is_root: bool,
        ctx: &RequestContext,
        id: &InputValue,
        data: &InputObject,
        type_name: &str,
        selection: &Selection,
    ) -> Result<Option<PendingField>> {
        self.mutate(is_root, ctx, selection, |s, exports| s.update(is_root, id, data, type_name, exports, None))
            .await
    }

    pub async fn delete_object(
        &self,
        is_root: bool,
        ctx: &RequestContext,
        id: &InputValue,
        type_name: &str,
        selection: &Selection,
    ) -> Result<Option<PendingField>> {
        self.mutate(is_root, ctx, selection, |s, _| s.delete_object(is_root, id, type_name, None)).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_edge(
        &self,
        is_root: bool,
        ctx: &RequestContext,
        source_type: &str,
        source: &InputValue,
        field: &str,
        target: &InputValue,
        annotations: &InputObject,
        selection: &Selection,
    ) -> Result<Option<PendingField>> {
        self.mutate(is_root, ctx, selection, |s, exports| {
            s.create_edge(is_root, source_type, source, field, target, annotations, exports, None)
        })
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn update_edge(
        &self,
        is_root: bool,
        ctx: &RequestContext,
        id: &InputValue,
        data: &InputObject,
        source_type: &str,
        field: &str,
        selection: &Selection,
    ) -> Result<Option<PendingField>> {
        self.mutate(is_root, ctx, selection, |s, exports| {
            s.update_edge(is_root, id, data, source_type, field, exports, None)
        })
        .await
    }

    pub async fn delete_edge(
        &self,
        is_root: bool,
        ctx: &RequestContext,
        id: &InputValue,
        source_type: &str,
        field: &str,
        selection: &Selection,
    ) -> Result<Option<PendingField>> {
        self.mutate(is_root, ctx, selection, |s, _| s.delete_edge(is_root, id, source_type, field, None))
            .await
    }

    /// Run one field's synthesis against the shared context, then, for a
    /// root field, finalize and submit if it was the last one.
    async fn mutate<F>(
        &self,
        is_root: bool,
        ctx: &RequestContext,
        selection: &Selection,
        synthesize: F,
    ) -> Result<Option<PendingField>>
    where
        F: FnOnce(&mut Synthesizer<'_>, Option<&Selection>) -> Result<String>,
    {
        let alias = selection.alias.as_str();
        let request = {
            let mut guard = ctx.state.lock();
            let state = &mut *guard;
            if ctx.outcome().is_some() {
                // the request already reached its terminal state
                return if is_root { Ok(Some(ctx.pending_field(alias))) } else { Ok(None) };
            }
            let Some(tx) = state.tx.as_mut() else {
                warn!(tx = %ctx.id, "field arrived after submission");
                return Err(Error::Synthesis("transaction has already been submitted".into()));
            };
            if is_root && !state.pending.iter().any(|a| a == alias) {
                return Err(Error::Synthesis(format!("'{alias}' is not a pending root field of {}", ctx.id)));
            }

            let graph = TypeGraph::new(self.schema());
            let exports = is_root.then_some(selection);
            let outcome = synthesize(&mut Synthesizer::new(tx, graph, self.config()), exports);
            let var = match outcome {
                Ok(var) => var,
                Err(e) => {
                    ctx.fail(state, e.clone());
                    return Err(e);
                }
            };
            if !is_root {
                return Ok(None);
            }

            tx.bind_result(alias, &var);
            state.pending.retain(|a| a != alias);
            if !state.pending.is_empty() {
                return Ok(Some(ctx.pending_field(alias)));
            }
            let finalized = state.tx.take().map(|mut tx| tx.finalize());
            match finalized {
                Some(Ok(request)) => request,
                Some(Err(e)) => {
                    ctx.fail(state, e.clone());
                    return Err(e);
                }
                None => return Err(Error::Synthesis("transaction context missing".into())),
            }
        };

        let field = ctx.pending_field(alias);
        debug!(
            tx = %ctx.id,
            write = ?request.write,
            read = ?request.read,
            script = %request.render(),
            params = %serde_json::Value::Object(request.params.clone()),
            "submitting transaction"
        );
        let outcome = match self.engine().execute(request).await {
            Ok(results) => {
                debug!(tx = %ctx.id, "transaction committed");
                Ok(Arc::new(results))
            }
            Err(e) => {
                warn!(tx = %ctx.id, error = %e, "transaction failed");
                Err(e)
            }
        };
        ctx.finish(outcome);
        Ok(Some(field))
    }
}
