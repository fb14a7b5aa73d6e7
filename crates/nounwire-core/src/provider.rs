//! # Provider Contract
//!
//! The boundary between the transport and whatever materializes noun
//! instances. A provider runs a validated `NounQuery` and reports through a
//! `QueryListener`; only completion drives marshalling.

use crate::catalog::NounCatalog;
use crate::query::NounQuery;
use crate::store::InstanceSource;
use crate::{NounId, NounwireError};
use std::fmt;
use std::sync::Arc;

/// Roots of a completed query plus the graph they live in.
#[derive(Clone)]
pub struct ResultSet {
    pub noun_type: String,
    pub item_ids: Vec<NounId>,
    pub source: Arc<dyn InstanceSource + Send + Sync>,
}

impl ResultSet {
    pub fn new(
        noun_type: impl Into<String>,
        item_ids: Vec<NounId>,
        source: Arc<dyn InstanceSource + Send + Sync>,
    ) -> Self {
        Self {
            noun_type: noun_type.into(),
            item_ids,
            source,
        }
    }
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("noun_type", &self.noun_type)
            .field("item_ids", &self.item_ids)
            .finish_non_exhaustive()
    }
}

/// Opaque identifier of a running query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryHandle(pub u64);

/// Receives the events of one running query.
///
/// Incremental events are ignored by default. `on_query_completed` consumes
/// the listener, so a query completes at most once.
pub trait QueryListener: Send {
    fn on_items_added(&mut self, _ids: &[NounId]) {}

    fn on_items_modified(&mut self, _ids: &[NounId]) {}

    fn on_items_removed(&mut self, _ids: &[NounId]) {}

    fn on_query_completed(self: Box<Self>, result: Result<ResultSet, NounwireError>);
}

/// Something that can answer noun queries.
pub trait NounProvider: Send + Sync {
    /// The noun universe this provider materializes.
    fn catalog(&self) -> &NounCatalog;

    /// Start a query. Completion may be reported before this returns, later
    /// from another thread, or never.
    fn run_query(
        &self,
        query: NounQuery,
        listener: Box<dyn QueryListener>,
    ) -> Result<QueryHandle, NounwireError>;

    /// Abandon a running query. Providers without cancellation ignore it.
    fn cancel(&self, _handle: QueryHandle) {}
}

// =============================================================================
// TESTS
// =============================================================================
