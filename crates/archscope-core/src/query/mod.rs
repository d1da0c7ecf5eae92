//! Read-only queries the visualizer issues while expanding the hierarchy.

mod aggregate;

pub use aggregate::{aggregate, aggregated_edge_id, AggregatedEdge, ResolutionIndex, AGGREGATED_LABEL};

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::{Edge, Node};
use crate::ontology::NodeRole;
use crate::store::{EdgeFilter, HierarchyStore, NodeFilter, StoreError};

/// A slice of the hierarchy: some nodes and the relation edges among them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphView {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Answers hierarchy and aggregation queries against a store.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn HierarchyStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn HierarchyStore>) -> Self {
        Self { store }
    }

    /// Top-level nodes, Variables excluded.
    pub async fn roots(&self, project_id: &str) -> Result<GraphView, StoreError> {
        self.view(project_id, NodeFilter::roots().excluding(NodeRole::Variable))
            .await
    }

    /// Direct children of `parent_id`, Variables excluded. Unknown parents
    /// yield an empty view.
    pub async fn children(&self, project_id: &str, parent_id: &str) -> Result<GraphView, StoreError> {
        self.view(
            project_id,
            NodeFilter::children_of(parent_id).excluding(NodeRole::Variable),
        )
        .await
    }

    async fn view(&self, project_id: &str, filter: NodeFilter) -> Result<GraphView, StoreError> {
        let nodes = self.store.scan_nodes(project_id, &filter).await?;
        if nodes.is_empty() {
            return Ok(GraphView::default());
        }
        let ids = nodes.iter().map(|n| n.id.clone());
        let edges = self
            .store
            .scan_edges(project_id, &EdgeFilter::within(ids))
            .await?;
        Ok(GraphView { nodes, edges })
    }

    /// Lifts every relation edge of the project onto the visible node set.
    pub async fn aggregate_edges(
        &self,
        project_id: &str,
        visible_ids: &[String],
    ) -> Result<Vec<AggregatedEdge>, StoreError> {
        if visible_ids.is_empty() {
            return Ok(Vec::new());
        }

        let visible: HashSet<String> = visible_ids.iter().cloned().collect();
        let members = self
            .store
            .scan_nodes(project_id, &NodeFilter::with_ancestor_in(visible.iter().cloned()))
            .await?;
        let index = ResolutionIndex::build(&visible, &members);
        if index.is_empty() {
            return Ok(Vec::new());
        }

        let edges = self
            .store
            .scan_edges(project_id, &EdgeFilter::within(index.node_ids().cloned()))
            .await?;
        let result = aggregate(&index, &edges);

        debug!(
            project = project_id,
            visible = visible.len(),
            resolved = index.len(),
            raw_edges = edges.len(),
            aggregated = result.len(),
            "Aggregated edges"
        );
        Ok(result)
    }
}
