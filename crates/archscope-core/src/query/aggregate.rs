//! Edge aggregation over the visible node set.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::graph::{Edge, Node};
use crate::ontology::EdgeLabel;

/// Label of a group that merges edges between non-visible descendants.
pub const AGGREGATED_LABEL: &str = "aggregated";

/// One edge of the aggregated view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    /// Number of raw edges in the group.
    pub weight: usize,
    /// Raw relation label -> count.
    pub breakdown: BTreeMap<EdgeLabel, usize>,
    pub label: String,
    pub is_aggregated: bool,
}

/// Deterministic id for an aggregated edge.
pub fn aggregated_edge_id(source: &str, target: &str, label: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(target.as_bytes());
    hasher.update([0u8]);
    hasher.update(label.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("agg_{}", &digest[..16])
}

/// Maps nodes to their nearest visible ancestor-or-self.
#[derive(Debug, Default)]
pub struct ResolutionIndex {
    resolved: HashMap<String, String>,
}

impl ResolutionIndex {
    /// Builds the index from the visible set and the nodes whose ancestor
    /// chain intersects it. Other nodes are ignored.
    pub fn build<'a, I>(visible: &HashSet<String>, nodes: I) -> Self
    where
        I: IntoIterator<Item = &'a Node>,
    {
        let resolved = nodes
            .into_iter()
            .filter_map(|node| {
                node.ancestors
                    .iter()
                    .find(|ancestor| visible.contains(*ancestor))
                    .map(|owner| (node.id.clone(), owner.clone()))
            })
            .collect();
        Self { resolved }
    }

    pub fn resolve(&self, id: &str) -> Option<&str> {
        self.resolved.get(id).map(String::as_str)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &String> {
        self.resolved.keys()
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

#[derive(Default)]
struct Group {
    weight: usize,
    breakdown: BTreeMap<EdgeLabel, usize>,
    direct: bool,
}

/// Lifts raw edges onto the visible set.
///
/// Edges with an unresolvable endpoint, or whose endpoints resolve to the
/// same visible node, are dropped. Edges that already connect two visible
/// nodes keep their own label; the rest are merged per visible pair under
/// [`AGGREGATED_LABEL`]. Output is sorted by `(source, target, label)`.
pub fn aggregate<'a, I>(index: &ResolutionIndex, edges: I) -> Vec<AggregatedEdge>
where
    I: IntoIterator<Item = &'a Edge>,
{
    let mut groups: BTreeMap<(String, String, String), Group> = BTreeMap::new();

    for edge in edges {
        let (Some(source), Some(target)) = (index.resolve(&edge.source), index.resolve(&edge.target))
        else {
            continue;
        };
        if source == target {
            continue;
        }

        let direct = source == edge.source && target == edge.target;
        let label = if direct {
            edge.label.as_str()
        } else {
            AGGREGATED_LABEL
        };

        let group = groups
            .entry((source.to_string(), target.to_string(), label.to_string()))
            .or_default();
        group.weight += 1;
        group.direct = direct;
        *group.breakdown.entry(edge.label).or_insert(0) += 1;
    }

    groups
        .into_iter()
        .map(|((source, target, label), group)| AggregatedEdge {
            id: aggregated_edge_id(&source, &target, &label),
            source,
            target,
            weight: group.weight,
            breakdown: group.breakdown,
            label,
            is_aggregated: !group.direct,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn node(ancestors: &[&str]) -> Node {
        Node {
            id: ancestors[0].to_string(),
            labels: vec![],
            properties: Map::new(),
            parent: ancestors.get(1).map(|s| s.to_string()),
            ancestors: ancestors.iter().map(|s| s.to_string()).collect(),
            has_children: false,
        }
    }

    fn visible(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolves_nearest_visible_ancestor() {
        let nodes = vec![node(&["f", "file", "dir", "root"])];
        let index = ResolutionIndex::build(&visible(&["root", "file"]), &nodes);
        assert_eq!(index.resolve("f"), Some("file"));
    }

    #[test]
    fn test_visible_node_resolves_to_itself() {
        let nodes = vec![node(&["f", "file", "root"])];
        let index = ResolutionIndex::build(&visible(&["f", "root"]), &nodes);
        assert_eq!(index.resolve("f"), Some("f"));
    }

    #[test]
    fn test_unresolvable_nodes_are_absent() {
        let nodes = vec![node(&["f", "file"])];
        let index = ResolutionIndex::build(&visible(&["other"]), &nodes);
        assert!(index.is_empty());
        assert_eq!(index.resolve("f"), None);
    }

    #[test]
    fn test_aggregates_hidden_edges() {
        let nodes = vec![
            node(&["a1", "A"]),
            node(&["a2", "A"]),
            node(&["b1", "B"]),
            node(&["A"]),
            node(&["B"]),
        ];
        let index = ResolutionIndex::build(&visible(&["A", "B"]), &nodes);
        let edges = vec![
            Edge::new("a1", "b1", EdgeLabel::Invokes),
            Edge::new("a2", "b1", EdgeLabel::Invokes),
            Edge::new("a2", "b1", EdgeLabel::Uses),
            Edge::new("a1", "a2", EdgeLabel::Invokes),
        ];

        let result = aggregate(&index, &edges);
        assert_eq!(result.len(), 1);
        let agg = &result[0];
        assert_eq!((agg.source.as_str(), agg.target.as_str()), ("A", "B"));
        assert_eq!(agg.weight, 3);
        assert_eq!(agg.label, AGGREGATED_LABEL);
        assert!(agg.is_aggregated);
        assert_eq!(agg.breakdown[&EdgeLabel::Invokes], 2);
        assert_eq!(agg.breakdown[&EdgeLabel::Uses], 1);
    }

    #[test]
    fn test_direct_edge_keeps_label() {
        let nodes = vec![node(&["A"]), node(&["B"]), node(&["b1", "B"])];
        let index = ResolutionIndex::build(&visible(&["A", "B"]), &nodes);
        let edges = vec![
            Edge::new("A", "B", EdgeLabel::Uses),
            Edge::new("A", "b1", EdgeLabel::Invokes),
        ];

        let result = aggregate(&index, &edges);
        assert_eq!(result.len(), 2);
        let direct = result.iter().find(|e| !e.is_aggregated).unwrap();
        assert_eq!(direct.label, "uses");
        assert_eq!(direct.weight, 1);
        let merged = result.iter().find(|e| e.is_aggregated).unwrap();
        assert_eq!(merged.label, AGGREGATED_LABEL);
    }

    #[test]
    fn test_ids_are_stable() {
        let a = aggregated_edge_id("A", "B", "uses");
        assert_eq!(a, aggregated_edge_id("A", "B", "uses"));
        assert_ne!(a, aggregated_edge_id("A", "B", "invokes"));
        assert!(a.starts_with("agg_"));
        assert_eq!(a.len(), 20);
    }

    #[test]
    fn test_serializes_camel_case() {
        let nodes = vec![node(&["A"]), node(&["B"])];
        let index = ResolutionIndex::build(&visible(&["A", "B"]), &nodes);
        let edges = vec![Edge::new("A", "B", EdgeLabel::Requires)];
        let value = serde_json::to_value(&aggregate(&index, &edges)[0]).unwrap();
        assert_eq!(value["isAggregated"], false);
        assert_eq!(value["breakdown"]["requires"], 1);
    }
}
