#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map};

use archscope_core::graph::{BuiltGraph, PROP_SIMPLE_NAME};
use archscope_core::llm::{LLMError, LLM};
use archscope_core::{Edge, EdgeLabel, FactSet, Node, NodeRole};

pub const ENGINE_H: &str = "/src/engine/engine.h";
pub const ENGINE_CPP: &str = "/src/engine/engine.cpp";
pub const WINDOW_H: &str = "/src/ui/window.h";
pub const WINDOW_CPP: &str = "/src/ui/window.cpp";
pub const MAIN_CPP: &str = "/src/main.cpp";

pub const SRC: &str = "folder::/src";
pub const ENGINE_DIR: &str = "folder::/src/engine";
pub const UI_DIR: &str = "folder::/src/ui";

pub const ENGINE: &str = "cpp+class:///engine/Engine";
pub const START: &str = "cpp+method:///engine/Engine/start()";
pub const STOP: &str = "cpp+method:///engine/Engine/stop()";
pub const WINDOW: &str = "cpp+class:///ui/Window";
pub const DRAW: &str = "cpp+method:///ui/Window/draw()";
pub const MAIN: &str = "cpp+function:///main()";

/// A small two-subsystem codebase: an engine, a UI and a main file.
pub fn demo_facts() -> FactSet {
    FactSet::from_json(
        &json!({
            "declarations": [
                [ENGINE, "file:///src/engine/engine.h"],
                [START, "file:///src/engine/engine.cpp"],
                [STOP, "file:///src/engine/engine.cpp"],
                [WINDOW, "file:///src/ui/window.h"],
                [DRAW, "file:///src/ui/window.cpp"],
                [MAIN, "file:///src/main.cpp"]
            ],
            "containment": [[ENGINE, START], [ENGINE, STOP], [WINDOW, DRAW]],
            "callGraph": [[MAIN, START], [MAIN, DRAW]],
            "methodInvocations": [[START, STOP]],
            "uses": [[WINDOW, ENGINE]],
            "requires": [["file:///src/main.cpp", "file:///src/engine/engine.h"]]
        })
        .to_string(),
    )
    .unwrap()
}

pub fn node(id: &str, role: NodeRole, parent: Option<&Node>) -> Node {
    let mut properties = Map::new();
    properties.insert(PROP_SIMPLE_NAME.to_string(), json!(id));
    let mut ancestors = vec![id.to_string()];
    if let Some(parent) = parent {
        ancestors.extend(parent.ancestors.iter().cloned());
    }
    Node {
        id: id.to_string(),
        labels: vec![role],
        properties,
        parent: parent.map(|p| p.id.clone()),
        ancestors,
        has_children: false,
    }
}

/// Three operations calling each other in a ring: A -> B -> C -> A.
pub fn cycle_graph() -> BuiltGraph {
    BuiltGraph {
        nodes: vec![
            node("A", NodeRole::Operation, None),
            node("B", NodeRole::Operation, None),
            node("C", NodeRole::Operation, None),
        ],
        edges: vec![
            Edge::new("A", "B", EdgeLabel::Invokes),
            Edge::new("B", "C", EdgeLabel::Invokes),
            Edge::new("C", "A", EdgeLabel::Invokes),
        ],
    }
}

/// Deterministic collaborator: describes every node as `Summary of <name>`.
#[derive(Default)]
pub struct ScriptedLLM {
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    failing: HashSet<String>,
}

impl ScriptedLLM {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every prompt about the named node.
    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Prompts that were about the named node.
    pub fn prompts_for(&self, name: &str) -> Vec<String> {
        let marker = format!("named '{name}'");
        self.prompts()
            .into_iter()
            .filter(|p| p.contains(&marker))
            .collect()
    }
}

fn subject(prompt: &str) -> String {
    prompt
        .split_once("named '")
        .and_then(|(_, rest)| rest.split_once('\''))
        .map(|(name, _)| name.to_string())
        .unwrap_or_default()
}

#[async_trait]
impl LLM for ScriptedLLM {
    async fn complete(&self, prompt: &str) -> Result<String, LLMError> {
        self.complete_with_system("", prompt).await
    }

    async fn complete_with_system(&self, _system: &str, prompt: &str) -> Result<String, LLMError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        let name = subject(prompt);
        if self.failing.contains(&name) {
            return Err(LLMError::RequestFailed(format!("scripted failure for {name}")));
        }
        Ok(json!({ "description": format!("Summary of {name}") }).to_string())
    }
}
