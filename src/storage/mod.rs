//! # Transaction Engine Trait
//!
//! The contract between the driver and a document/edge store. The driver
//! never touches documents itself: every mutation request becomes one
//! [`TransactionRequest`] run atomically, and every read becomes one
//! [`ReadQuery`].
//!
//! ## Implementations
//!
//! | Engine | Module | Description |
//! |---------|--------|-------------|
//! | `MemoryEngine` | `memory` | In-memory reference engine for testing/embedding |

pub mod memory;

use async_trait::async_trait;
use tracing::info;

use crate::model::Value;
use crate::query::ReadQuery;
use crate::schema::TypeGraph;
use crate::script::{ResultMap, TransactionRequest};
use crate::Result;

pub use memory::MemoryEngine;

// ============================================================================
// Collections
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Document,
    /// Documents carry `_from` and `_to`.
    Edge,
}

// ============================================================================
// Engine capabilities
// ============================================================================

/// What an engine can do.
///
/// All fields default to false. Engines override via `capabilities()`.
#[derive(Debug, Clone, Default)]
pub struct EngineCapabilities {
    /// A failed request leaves no trace.
    pub atomic_transactions: bool,
    /// Executes the rendered script text rather than the statement IR.
    pub executes_rendered_scripts: bool,
    /// Understands `Source::Traversal` reads.
    pub traversals: bool,
}

// ============================================================================
// TransactionEngine Trait
// ============================================================================

#[async_trait]
pub trait TransactionEngine: Send + Sync + 'static {
    /// Run every statement of `request` as one transaction and return the
    /// result map. A script-level throw is `Error::Transaction` carrying the
    /// thrown text, and nothing the request wrote survives it.
    async fn execute(&self, request: TransactionRequest) -> Result<ResultMap>;

    /// Run a read query. Count projections return one number.
    async fn query(&self, query: &ReadQuery) -> Result<Vec<Value>>;

    /// Create a collection if absent. Returns true if it was created.
    async fn create_collection(&self, name: &str, kind: CollectionKind) -> Result<bool>;

    /// Remove every collection.
    async fn drop_all(&self) -> Result<()>;

    /// Create the collections the schema needs: one per stored object type
    /// and one per forward edge field. Existing collections are kept unless
    /// `drop` is set.
    async fn setup(&self, graph: TypeGraph<'_>, drop: bool) -> Result<()> {
        let documents = graph.document_collections();
        let edges = graph.edge_collections()?;
        if drop {
            self.drop_all().await?;
        }
        for name in &documents {
            if self.create_collection(name, CollectionKind::Document).await? {
                info!(collection = %name, "created document collection");
            }
        }
        for name in &edges {
            if self.create_collection(name, CollectionKind::Edge).await? {
                info!(collection = %name, "created edge collection");
            }
        }
        Ok(())
    }

    /// Report what this engine can do.
    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities::default()
    }
}
