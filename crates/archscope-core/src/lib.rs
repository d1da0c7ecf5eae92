//! ArchScope core: hierarchical labeled property graphs from static-analysis
//! facts, with zoom-level edge aggregation and LLM annotations.

pub mod analysis;
pub mod annotate;
pub mod config;
pub mod facts;
pub mod graph;
pub mod ingest;
pub mod jobs;
pub mod llm;
pub mod ontology;
pub mod project;
pub mod query;
pub mod store;
pub mod workspace;

pub use annotate::{Annotation, AnnotationReport, Annotator};
pub use config::{Config, LLMConfig};
pub use facts::FactSet;
pub use graph::{BuiltGraph, Edge, GraphBuilder, GraphElements, Node};
pub use ingest::{IngestError, IngestOutcome, IngestService};
pub use jobs::{IngestSource, JobError, JobRunner};
pub use ontology::{EdgeLabel, NodeRole};
pub use project::{Project, ProjectStatus};
pub use query::{AggregatedEdge, GraphView, QueryEngine};
pub use store::{HierarchyStore, MemoryStore, StoreError, SurrealStore};
pub use workspace::Workspace;
