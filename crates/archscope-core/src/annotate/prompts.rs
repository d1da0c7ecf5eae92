use std::collections::BTreeMap;
use std::fmt::Write;

use crate::ontology::{EdgeLabel, NodeRole};

/// `"name: description"` lines of already-annotated collaborators, grouped
/// by the relation that reached them.
pub type ChildSummaries = BTreeMap<EdgeLabel, Vec<String>>;

/// Placeholder used when an operation has no recorded source text.
pub const MISSING_SOURCE: &str = "Source code not available.";

struct RoleTemplate {
    kind: &'static str,
    sections: &'static [(EdgeLabel, &'static str)],
    empty: &'static str,
    shape: &'static str,
}

fn template(role: NodeRole) -> Option<RoleTemplate> {
    let template = match role {
        NodeRole::Operation => RoleTemplate {
            kind: "Operation (Method/Function)",
            sections: &[
                (EdgeLabel::Invokes, "It invokes the following operations"),
                (EdgeLabel::Instantiates, "It instantiates the following types"),
                (EdgeLabel::Returns, "It returns the following types"),
                (EdgeLabel::Encloses, "It encloses the following elements"),
            ],
            empty: "",
            shape: r#"{"description": "One sentence on the core functionality", "howItWorks": "Implementation details in less than three sentences"}"#,
        },
        NodeRole::Type => RoleTemplate {
            kind: "Type (Class/Struct)",
            sections: &[
                (EdgeLabel::Encapsulates, "It encapsulates the following operations (methods)"),
                (EdgeLabel::Specializes, "It inherits (specializes) from"),
                (EdgeLabel::Uses, "It uses"),
            ],
            empty: "No enclosed operations found. Describe it based on its name.",
            shape: r#"{"description": "Up to three sentences on the key purpose", "responsibilities": ["2 to 4 primary responsibilities"]}"#,
        },
        NodeRole::Scope => RoleTemplate {
            kind: "Scope (Namespace/Package)",
            sections: &[(EdgeLabel::Encloses, "It encloses the following scopes, types or operations")],
            empty: "This scope is empty. Describe it based on its name.",
            shape: r#"{"description": "Overarching purpose of the scope", "keywords": ["3 to 5 domain keywords"]}"#,
        },
        NodeRole::File => RoleTemplate {
            kind: "File",
            sections: &[
                (EdgeLabel::Declares, "It declares the following functional elements"),
                (EdgeLabel::Requires, "It requires the following files"),
            ],
            empty: "This file is empty. Describe it based on its name.",
            shape: r#"{"description": "Purpose of the file", "main_components": ["most critical classes or functions"]}"#,
        },
        NodeRole::Folder => RoleTemplate {
            kind: "Folder",
            sections: &[(EdgeLabel::Contains, "It contains the following files and folders")],
            empty: "This folder is empty. Describe it based on its name.",
            shape: r#"{"description": "Architectural role of the folder", "architectural_layer": "e.g. UI, Business Logic, Data Access, Utility"}"#,
        },
        NodeRole::Project => RoleTemplate {
            kind: "Project",
            sections: &[
                (EdgeLabel::Includes, "It includes the following folders"),
                (EdgeLabel::Contains, "It contains the following files"),
            ],
            empty: "This project is empty. Describe it based on its name.",
            shape: r#"{"description": "Executive summary of the project", "domain": "likely application domain", "key_features": ["3 to 5 major features"]}"#,
        },
        NodeRole::Variable | NodeRole::Trace | NodeRole::Action => return None,
    };
    Some(template)
}

/// Builds the user prompt for one node. `None` for roles without a prompt.
pub fn build_annotation_prompt(
    role: NodeRole,
    name: &str,
    children: &ChildSummaries,
    snippet: Option<&str>,
) -> Option<String> {
    let RoleTemplate {
        kind,
        sections,
        empty,
        shape,
    } = template(role)?;

    let mut prompt = format!("Analyze the following {kind} named '{name}'.\n");

    if role == NodeRole::Operation {
        let source = snippet.unwrap_or(MISSING_SOURCE);
        let _ = write!(prompt, "\n### Source Code:\n```cpp\n{source}\n```\n");
    }

    let mut listed = false;
    for (label, heading) in sections {
        if let Some(items) = children.get(label) {
            push_section(&mut prompt, heading, items);
            listed = true;
        }
    }
    for (label, items) in children {
        if !sections.iter().any(|(l, _)| l == label) {
            push_section(&mut prompt, &format!("Related through '{label}'"), items);
            listed = true;
        }
    }

    if !listed && !empty.is_empty() {
        let _ = write!(prompt, "\n{empty}\n");
    }

    let _ = write!(prompt, "\nRespond with JSON of this shape:\n{shape}\n");
    Some(prompt)
}

fn push_section(prompt: &mut String, heading: &str, items: &[String]) {
    let _ = write!(prompt, "\n### {heading}:\n");
    for item in items {
        let _ = writeln!(prompt, "- {item}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_prompt_includes_source() {
        let prompt =
            build_annotation_prompt(NodeRole::Operation, "foo", &ChildSummaries::new(), Some("int foo();"))
                .unwrap();
        assert!(prompt.contains("named 'foo'"));
        assert!(prompt.contains("int foo();"));
        assert!(prompt.contains("howItWorks"));
    }

    #[test]
    fn test_operation_prompt_without_snippet() {
        let prompt =
            build_annotation_prompt(NodeRole::Operation, "foo", &ChildSummaries::new(), None).unwrap();
        assert!(prompt.contains(MISSING_SOURCE));
    }

    #[test]
    fn test_sections_follow_relations() {
        let mut children = ChildSummaries::new();
        children.insert(EdgeLabel::Declares, vec!["foo: Does foo".to_string()]);
        children.insert(EdgeLabel::Uses, vec!["Bar: A bar".to_string()]);

        let prompt = build_annotation_prompt(NodeRole::File, "a.cpp", &children, None).unwrap();
        assert!(prompt.contains("It declares the following functional elements:\n- foo: Does foo"));
        assert!(prompt.contains("Related through 'uses':\n- Bar: A bar"));
        assert!(!prompt.contains("This file is empty"));
    }

    #[test]
    fn test_empty_composite_mentions_name_only() {
        let prompt =
            build_annotation_prompt(NodeRole::Folder, "src", &ChildSummaries::new(), None).unwrap();
        assert!(prompt.contains("This folder is empty"));
        assert!(prompt.contains("architectural_layer"));
    }

    #[test]
    fn test_unsupported_roles() {
        for role in [NodeRole::Variable, NodeRole::Trace, NodeRole::Action] {
            assert!(build_annotation_prompt(role, "x", &ChildSummaries::new(), None).is_none());
        }
    }
}
