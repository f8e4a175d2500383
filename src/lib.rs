//! # gql-tx: schema-driven GraphQL mutations over a document/edge store
//!
//! Compiles nested GraphQL mutations into one atomic transaction script per
//! request, with referential and directive constraints checked inside the
//! transaction, and answers the read side (get, lists, edges) with
//! single-query lookups.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `TransactionEngine` is the contract between the driver and storage
//! 2. **Script as data**: synthesis builds a typed statement IR; rendering it is a pure function
//! 3. **One request, one transaction**: every root field of a request shares a context
//! 4. **Schema-driven**: collections, edges and checks are derived from the API schema
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gql_tx::{Driver, DriverConfig, InputObject, Selection, sdl};
//!
//! # async fn example() -> gql_tx::Result<()> {
//! let schema = sdl::parse_schema("type Person { name: String friends: [Person] @distinct }")?;
//! let driver = Driver::open_memory(schema, DriverConfig::default()).await?;
//!
//! let ctx = driver.request(["ada"]);
//! let data = InputObject::new().with("name", "Ada");
//! let field = driver.create(true, &ctx, &data, "Person", &Selection::new("ada")).await?;
//! if let Some(field) = field {
//!     println!("{}", field.resolve().await?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Transaction Engines
//!
//! | Engine | Feature | Description |
//! |---------|---------|-------------|
//! | Memory | (default) | In-memory interpreter of the statement IR for testing/embedding |

use std::sync::Arc;

use tracing::debug;

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod schema;
pub mod sdl;
pub mod aql;
pub mod filter;
pub mod script;
pub mod tx;
pub mod constraints;
pub mod mutation;
pub mod query;
pub mod storage;
pub mod execution;
pub mod config;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Document, DocumentId, Value,
    InputObject, InputValue,
    Selection, FieldSelection,
};

// ============================================================================
// Re-exports: Schema
// ============================================================================

pub use schema::{Schema, TypeDef, FieldDef, TypeRef, TypeKind, DirectiveUse, Directive, TypeGraph};

// ============================================================================
// Re-exports: Storage
// ============================================================================

pub use storage::{TransactionEngine, MemoryEngine, EngineCapabilities, CollectionKind};

// ============================================================================
// Re-exports: Scripts, reads and execution
// ============================================================================

pub use script::{TransactionRequest, ResultMap};
pub use query::{ReadQuery, ListArgs, Page, Endpoint};
pub use tx::TxId;
pub use execution::{RequestContext, PendingField, Outcome};
pub use config::DriverConfig;

// ============================================================================
// Top-level Driver handle
// ============================================================================

/// The primary entry point. A `Driver` wraps a transaction engine and the
/// API schema, and provides the mutation and read operations.
pub struct Driver<E: TransactionEngine> {
    engine: Arc<E>,
    schema: Arc<Schema>,
    config: Arc<DriverConfig>,
}

impl<E: TransactionEngine> Clone for Driver<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            schema: Arc::clone(&self.schema),
            config: Arc::clone(&self.config),
        }
    }
}

impl<E: TransactionEngine> Driver<E> {
    /// Create a Driver over an engine. Collections are not touched; call
    /// [`Driver::setup`] to create them.
    pub fn new(engine: E, schema: Schema, config: DriverConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            schema: Arc::new(schema),
            config: Arc::new(config),
        }
    }

    /// Access the underlying engine (for advanced use).
    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn graph(&self) -> TypeGraph<'_> {
        TypeGraph::new(&self.schema)
    }

    /// Create every document and edge collection the schema needs,
    /// dropping existing ones first when the config says so.
    pub async fn setup(&self) -> Result<()> {
        self.engine.setup(self.graph(), self.config.drop).await
    }

    /// Fetch one document by `_id`. `type_name` may be abstract.
    pub async fn get(&self, id: &str, type_name: &str) -> Result<Option<Document>> {
        let q = query::get(self.graph(), id, type_name)?;
        Ok(self.documents(&q).await?.into_iter().next())
    }

    /// Fetch one document by the fields of its key input type.
    pub async fn get_by_key(&self, key: &Document, type_name: &str) -> Result<Option<Document>> {
        let q = query::get_by_key(self.graph(), key, type_name)?;
        Ok(self.documents(&q).await?.into_iter().next())
    }

    /// One page of `type_name` documents, ordered by `_id`.
    pub async fn get_list(&self, args: &ListArgs, type_name: &str) -> Result<Page> {
        let (q, mut page) = query::get_list(self.graph(), args, type_name)?;
        page.content = self.documents(&q).await?;
        Ok(page)
    }

    /// Number of documents matching the page's filter, on any page.
    pub async fn total_count(&self, page: &Page) -> Result<usize> {
        self.count(&page.total_count_query()).await
    }

    /// Whether no matching document follows the page's last one.
    pub async fn is_end_of_list(&self, page: &Page) -> Result<bool> {
        Ok(self.count(&page.end_of_list_query()).await? == 0)
    }

    /// Documents at the other end of `parent_type.field`.
    pub async fn get_edge_endpoint(
        &self,
        parent: &Document,
        parent_type: &str,
        field: &str,
        filter: Option<&Value>,
    ) -> Result<Endpoint> {
        let (q, is_list) = query::get_edge_endpoint(self.graph(), parent_type, parent_id(parent)?, field, filter)?;
        Ok(Endpoint::from_rows(self.documents(&q).await?, is_list))
    }

    /// Edge documents of an `_outgoing…`/`_incoming…` field.
    pub async fn get_edge(
        &self,
        parent: &Document,
        parent_type: &str,
        field: &str,
        filter: Option<&Value>,
    ) -> Result<Endpoint> {
        let (q, is_list) = query::get_edge(self.graph(), parent_type, parent_id(parent)?, field, filter)?;
        Ok(Endpoint::from_rows(self.documents(&q).await?, is_list))
    }

    async fn documents(&self, q: &ReadQuery) -> Result<Vec<Document>> {
        let aql = q.to_aql();
        debug!(query = %aql.query, bind_vars = %serde_json::Value::Object(aql.bind_vars.clone()), "read");
        self.engine
            .query(q)
            .await?
            .into_iter()
            .map(|row| match row {
                Value::Object(doc) => Ok(doc),
                other => Err(Error::Storage(format!("expected a document row, got {other}"))),
            })
            .collect()
    }

    async fn count(&self, q: &ReadQuery) -> Result<usize> {
        let aql = q.to_aql();
        debug!(query = %aql.query, bind_vars = %serde_json::Value::Object(aql.bind_vars.clone()), "count");
        let rows = self.engine.query(q).await?;
        rows.first()
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Error::Storage("count query returned no number".into()))
    }
}

/// In-memory engine for testing and embedding. Collections are created
/// before this returns.
impl Driver<MemoryEngine> {
    pub async fn open_memory(schema: Schema, config: DriverConfig) -> Result<Self> {
        let driver = Self::new(MemoryEngine::new(), schema, config);
        driver.setup().await?;
        Ok(driver)
    }
}

fn parent_id(parent: &Document) -> Result<&str> {
    parent
        .get(model::fields::ID)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Input("parent document has no _id".into()))
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("SDL syntax error at {line}:{column}: {message}")]
    SyntaxError { line: usize, column: usize, message: String },

    /// The schema is inconsistent or does not define what was asked for.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Mutation input that does not fit the schema.
    #[error("Input error: {0}")]
    Input(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// The transaction threw; carries the thrown message.
    #[error("{0}")]
    Transaction(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
