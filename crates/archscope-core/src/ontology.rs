//! Node roles and edge labels of the architecture graph.
//!
//! The graph mixes three layers:
//! - **Development**: Project, Folder, File (the physical tree)
//! - **Functional**: Scope, Type, Operation, Variable (the logical tree)
//! - **Dynamic**: Trace, Action (produced by external trace tooling)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// =============================================================================
// Node roles
// =============================================================================

/// Primary role tag of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeRole {
    Project,
    Folder,
    File,
    Scope,
    Type,
    Operation,
    Variable,
    Trace,
    Action,
}

/// Layer a node role belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCategory {
    Development,
    Functional,
    Dynamic,
}

/// Analyzer schemes and the role each one maps to. Anything not listed is
/// dropped by the builder.
const SCHEME_TABLE: &[(&str, NodeRole)] = &[
    ("cpp+namespace", NodeRole::Scope),
    ("cpp+class", NodeRole::Type),
    ("cpp+struct", NodeRole::Type),
    ("cpp+union", NodeRole::Type),
    ("cpp+template", NodeRole::Type),
    ("cpp+enum", NodeRole::Type),
    ("cpp+function", NodeRole::Operation),
    ("cpp+method", NodeRole::Operation),
    ("cpp+constructor", NodeRole::Operation),
    ("cpp+destructor", NodeRole::Operation),
    ("cpp+variable", NodeRole::Variable),
    ("cpp+field", NodeRole::Variable),
    ("cpp+parameter", NodeRole::Variable),
];

impl NodeRole {
    /// All roles, in hierarchy order.
    pub const ALL: [NodeRole; 9] = [
        NodeRole::Project,
        NodeRole::Folder,
        NodeRole::File,
        NodeRole::Scope,
        NodeRole::Type,
        NodeRole::Operation,
        NodeRole::Variable,
        NodeRole::Trace,
        NodeRole::Action,
    ];

    /// Maps a logical-location scheme (e.g. `cpp+method`) to a role.
    pub fn from_scheme(scheme: &str) -> Option<NodeRole> {
        SCHEME_TABLE
            .iter()
            .find(|(s, _)| *s == scheme)
            .map(|(_, role)| *role)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Project => "Project",
            NodeRole::Folder => "Folder",
            NodeRole::File => "File",
            NodeRole::Scope => "Scope",
            NodeRole::Type => "Type",
            NodeRole::Operation => "Operation",
            NodeRole::Variable => "Variable",
            NodeRole::Trace => "Trace",
            NodeRole::Action => "Action",
        }
    }

    pub fn category(&self) -> NodeCategory {
        match self {
            NodeRole::Project | NodeRole::Folder | NodeRole::File => NodeCategory::Development,
            NodeRole::Scope | NodeRole::Type | NodeRole::Operation | NodeRole::Variable => {
                NodeCategory::Functional
            }
            NodeRole::Trace | NodeRole::Action => NodeCategory::Dynamic,
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeRole::ALL
            .iter()
            .copied()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| format!("unknown node role: {}", s))
    }
}

// =============================================================================
// Edge labels
// =============================================================================

/// Relation kind of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeLabel {
    Contains,
    Includes,
    Declares,
    Requires,
    Encloses,
    Encapsulates,
    Invokes,
    Uses,
    Specializes,
    Returns,
    Typed,
    Instantiates,
    Parameterizes,
    Precedes,
    Executes,
}

/// Family an edge label belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeCategory {
    Structural,
    Behavioral,
    TypeSystem,
    Dynamic,
}

impl EdgeLabel {
    pub const ALL: [EdgeLabel; 15] = [
        EdgeLabel::Contains,
        EdgeLabel::Includes,
        EdgeLabel::Declares,
        EdgeLabel::Requires,
        EdgeLabel::Encloses,
        EdgeLabel::Encapsulates,
        EdgeLabel::Invokes,
        EdgeLabel::Uses,
        EdgeLabel::Specializes,
        EdgeLabel::Returns,
        EdgeLabel::Typed,
        EdgeLabel::Instantiates,
        EdgeLabel::Parameterizes,
        EdgeLabel::Precedes,
        EdgeLabel::Executes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeLabel::Contains => "contains",
            EdgeLabel::Includes => "includes",
            EdgeLabel::Declares => "declares",
            EdgeLabel::Requires => "requires",
            EdgeLabel::Encloses => "encloses",
            EdgeLabel::Encapsulates => "encapsulates",
            EdgeLabel::Invokes => "invokes",
            EdgeLabel::Uses => "uses",
            EdgeLabel::Specializes => "specializes",
            EdgeLabel::Returns => "returns",
            EdgeLabel::Typed => "typed",
            EdgeLabel::Instantiates => "instantiates",
            EdgeLabel::Parameterizes => "parameterizes",
            EdgeLabel::Precedes => "precedes",
            EdgeLabel::Executes => "executes",
        }
    }

    pub fn category(&self) -> EdgeCategory {
        match self {
            EdgeLabel::Contains
            | EdgeLabel::Includes
            | EdgeLabel::Declares
            | EdgeLabel::Encloses
            | EdgeLabel::Encapsulates => EdgeCategory::Structural,
            EdgeLabel::Requires | EdgeLabel::Invokes | EdgeLabel::Uses => EdgeCategory::Behavioral,
            EdgeLabel::Specializes
            | EdgeLabel::Returns
            | EdgeLabel::Typed
            | EdgeLabel::Instantiates
            | EdgeLabel::Parameterizes => EdgeCategory::TypeSystem,
            EdgeLabel::Precedes | EdgeLabel::Executes => EdgeCategory::Dynamic,
        }
    }

    /// Hierarchy edges. They are folded into `parentId`/`ancestors` and never
    /// exported as relation edges.
    pub fn is_structural(&self) -> bool {
        self.category() == EdgeCategory::Structural
    }

    /// Edges that place a node in the file tree.
    pub fn is_physical_parent(&self) -> bool {
        matches!(
            self,
            EdgeLabel::Contains | EdgeLabel::Declares | EdgeLabel::Includes
        )
    }

    /// Edges that place a node in the logical tree.
    pub fn is_logical_parent(&self) -> bool {
        matches!(self, EdgeLabel::Encapsulates | EdgeLabel::Encloses)
    }

    /// The structural relation implied by a resolved parent/child pair.
    pub fn hierarchy_between(parent: NodeRole, child: NodeRole) -> EdgeLabel {
        match (parent, child) {
            (NodeRole::Project, NodeRole::Folder) => EdgeLabel::Includes,
            (NodeRole::Project | NodeRole::Folder, _) => EdgeLabel::Contains,
            (NodeRole::File, _) => EdgeLabel::Declares,
            (NodeRole::Type, _) => EdgeLabel::Encapsulates,
            _ => EdgeLabel::Encloses,
        }
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EdgeLabel::ALL
            .iter()
            .copied()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| format!("unknown edge label: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_table() {
        assert_eq!(NodeRole::from_scheme("cpp+namespace"), Some(NodeRole::Scope));
        assert_eq!(NodeRole::from_scheme("cpp+template"), Some(NodeRole::Type));
        assert_eq!(NodeRole::from_scheme("cpp+destructor"), Some(NodeRole::Operation));
        assert_eq!(NodeRole::from_scheme("cpp+parameter"), Some(NodeRole::Variable));
        assert_eq!(NodeRole::from_scheme("cpp+macro"), None);
        assert_eq!(NodeRole::from_scheme("file"), None);
        // no prefix matching
        assert_eq!(NodeRole::from_scheme("cpp+classTemplate"), None);
    }

    #[test]
    fn test_structural_labels() {
        let structural: Vec<_> = EdgeLabel::ALL
            .iter()
            .filter(|l| l.is_structural())
            .map(|l| l.as_str())
            .collect();
        assert_eq!(
            structural,
            vec!["contains", "includes", "declares", "encloses", "encapsulates"]
        );
        assert!(EdgeLabel::Contains.is_physical_parent());
        assert!(EdgeLabel::Encloses.is_logical_parent());
        assert!(!EdgeLabel::Requires.is_structural());
    }

    #[test]
    fn test_label_round_trips_through_str() {
        for label in EdgeLabel::ALL {
            assert_eq!(label.as_str().parse::<EdgeLabel>(), Ok(label));
        }
        for role in NodeRole::ALL {
            assert_eq!(role.as_str().parse::<NodeRole>(), Ok(role));
        }
        assert!("aggregated".parse::<EdgeLabel>().is_err());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&EdgeLabel::Encapsulates).unwrap(), "\"encapsulates\"");
        assert_eq!(serde_json::to_string(&NodeRole::Operation).unwrap(), "\"Operation\"");
    }

    #[test]
    fn test_hierarchy_between() {
        use NodeRole::*;
        assert_eq!(EdgeLabel::hierarchy_between(Project, Folder), EdgeLabel::Includes);
        assert_eq!(EdgeLabel::hierarchy_between(Project, File), EdgeLabel::Contains);
        assert_eq!(EdgeLabel::hierarchy_between(Folder, File), EdgeLabel::Contains);
        assert_eq!(EdgeLabel::hierarchy_between(File, Operation), EdgeLabel::Declares);
        assert_eq!(EdgeLabel::hierarchy_between(Type, Operation), EdgeLabel::Encapsulates);
        assert_eq!(EdgeLabel::hierarchy_between(Scope, Type), EdgeLabel::Encloses);
    }
}
