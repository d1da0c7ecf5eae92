//! SurrealDB-backed hierarchy store.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use surrealdb::engine::local::{Db, Mem, RocksDb};
use surrealdb::Surreal;
use tokio::sync::Mutex;
use tracing::debug;

use super::{apply_status, check_generation, EdgeFilter, HierarchyStore, NodeFilter, ParentFilter, StoreError};
use crate::annotate::Annotation;
use crate::graph::{BuiltGraph, Edge, Node, PROP_AI_SUMMARY};
use crate::ontology::{EdgeLabel, NodeRole};
use crate::project::{Project, ProjectStatus};

const PROJECT_FIELDS: &str = "project_id, name, status, description, generation, created_at";
const NODE_FIELDS: &str =
    "project_id, node_id, labels, properties, parent_id, is_root, ancestors, has_children, summary";
const EDGE_FIELDS: &str = "project_id, source, target, label";

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProjectRow {
    project_id: String,
    name: String,
    status: ProjectStatus,
    description: Option<String>,
    generation: i64,
    created_at: String,
}

impl ProjectRow {
    fn from_project(project: &Project) -> Self {
        Self {
            project_id: project.id.clone(),
            name: project.name.clone(),
            status: project.status,
            description: project.description.clone(),
            generation: project.generation as i64,
            created_at: project.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }

    fn into_project(self) -> Result<Project, StoreError> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| StoreError::Database(format!("bad created_at on {}: {e}", self.project_id)))?
            .with_timezone(&Utc);
        Ok(Project {
            id: self.project_id,
            name: self.name,
            status: self.status,
            description: self.description,
            generation: self.generation.max(0) as u64,
            created_at,
        })
    }
}

/// Node record. Properties and the annotation are stored as JSON text so
/// arbitrary fact payloads round-trip unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeRow {
    project_id: String,
    node_id: String,
    labels: Vec<NodeRole>,
    properties: String,
    parent_id: Option<String>,
    is_root: bool,
    ancestors: Vec<String>,
    has_children: bool,
    summary: Option<String>,
}

impl NodeRow {
    fn from_node(project_id: &str, node: &Node) -> Result<Self, StoreError> {
        Ok(Self {
            project_id: project_id.to_string(),
            node_id: node.id.clone(),
            labels: node.labels.clone(),
            properties: serde_json::to_string(&node.properties)?,
            parent_id: node.parent.clone(),
            is_root: node.parent.is_none(),
            ancestors: node.ancestors.clone(),
            has_children: node.has_children,
            summary: None,
        })
    }

    fn into_node(self) -> Result<Node, StoreError> {
        let mut properties: Map<String, Value> = serde_json::from_str(&self.properties)?;
        if let Some(summary) = self.summary {
            properties.insert(PROP_AI_SUMMARY.to_string(), serde_json::from_str(&summary)?);
        }
        Ok(Node {
            id: self.node_id,
            labels: self.labels,
            properties,
            parent: self.parent_id,
            ancestors: self.ancestors,
            has_children: self.has_children,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EdgeRow {
    project_id: String,
    source: String,
    target: String,
    label: EdgeLabel,
}

impl EdgeRow {
    fn into_edge(self) -> Edge {
        Edge::new(self.source, self.target, self.label)
    }
}

#[derive(Debug, Deserialize)]
struct NodeIdRow {
    #[allow(dead_code)]
    node_id: String,
}

// =============================================================================
// Store
// =============================================================================

/// Hierarchy store on embedded SurrealDB.
///
/// Writes are serialized through a mutex so generation checks and the write
/// they guard cannot interleave with another writer in this process.
pub struct SurrealStore {
    db: Surreal<Db>,
    writes: Mutex<()>,
}

impl SurrealStore {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Database(format!("cannot create {}: {e}", parent.display())))?;
        }
        let db = Surreal::new::<RocksDb>(path).await?;
        Self::init(db).await
    }

    /// In-memory database, discarded on drop.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let db = Surreal::new::<Mem>(()).await?;
        Self::init(db).await
    }

    async fn init(db: Surreal<Db>) -> Result<Self, StoreError> {
        db.use_ns("archscope").use_db("graph").await?;
        let store = Self {
            db,
            writes: Mutex::new(()),
        };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<(), StoreError> {
        self.db
            .query(
                r#"
                DEFINE TABLE IF NOT EXISTS project SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS project_key ON project FIELDS project_id UNIQUE;

                DEFINE TABLE IF NOT EXISTS node SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS node_key ON node FIELDS project_id, node_id UNIQUE;
                DEFINE INDEX IF NOT EXISTS node_parent ON node FIELDS project_id, parent_id;
                DEFINE INDEX IF NOT EXISTS node_ancestors ON node FIELDS ancestors;

                DEFINE TABLE IF NOT EXISTS edge SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS edge_project ON edge FIELDS project_id;
                DEFINE INDEX IF NOT EXISTS edge_source ON edge FIELDS project_id, source;
                DEFINE INDEX IF NOT EXISTS edge_target ON edge FIELDS project_id, target;
                "#,
            )
            .await?
            .check()?;
        Ok(())
    }

    async fn fetch_project(&self, id: &str) -> Result<Project, StoreError> {
        let sql = format!("SELECT {PROJECT_FIELDS} FROM project WHERE project_id = $id LIMIT 1");
        let row: Option<ProjectRow> = self
            .db
            .query(sql)
            .bind(("id", id.to_string()))
            .await?
            .take(0)?;
        row.ok_or_else(|| StoreError::ProjectNotFound(id.to_string()))?
            .into_project()
    }

    async fn write_project(&self, project: &Project) -> Result<(), StoreError> {
        self.db
            .query(
                "UPDATE project SET status = $status, description = $description, generation = $generation \
                 WHERE project_id = $id",
            )
            .bind(("id", project.id.clone()))
            .bind(("status", project.status))
            .bind(("description", project.description.clone()))
            .bind(("generation", project.generation as i64))
            .await?
            .check()?;
        Ok(())
    }
}

#[async_trait]
impl HierarchyStore for SurrealStore {
    async fn create_project(&self, name: &str) -> Result<Project, StoreError> {
        let _guard = self.writes.lock().await;

        let existing: Vec<ProjectRow> = self
            .db
            .query(format!(
                "SELECT {PROJECT_FIELDS} FROM project WHERE name = $name AND status != 'deleting'"
            ))
            .bind(("name", name.to_string()))
            .await?
            .take(0)?;
        if !existing.is_empty() {
            return Err(StoreError::DuplicateProject(name.to_string()));
        }

        let project = Project::new(name);
        self.db
            .query("CREATE project CONTENT $row")
            .bind(("row", ProjectRow::from_project(&project)))
            .await?
            .check()?;
        Ok(project)
    }

    async fn get_project(&self, id: &str) -> Result<Project, StoreError> {
        self.fetch_project(id).await
    }

    async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let rows: Vec<ProjectRow> = self
            .db
            .query(format!(
                "SELECT {PROJECT_FIELDS} FROM project WHERE status != 'deleting'"
            ))
            .await?
            .take(0)?;

        let mut projects = rows
            .into_iter()
            .map(ProjectRow::into_project)
            .collect::<Result<Vec<_>, _>>()?;
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(projects)
    }

    async fn set_status(
        &self,
        id: &str,
        generation: u64,
        status: ProjectStatus,
        description: Option<String>,
    ) -> Result<Project, StoreError> {
        let _guard = self.writes.lock().await;
        let mut project = self.fetch_project(id).await?;
        apply_status(&mut project, generation, status, description)?;
        self.write_project(&project).await?;
        Ok(project)
    }

    async fn mark_deleting(&self, id: &str) -> Result<Project, StoreError> {
        let _guard = self.writes.lock().await;
        let mut project = self.fetch_project(id).await?;
        if project.status != ProjectStatus::Deleting {
            project.status = ProjectStatus::Deleting;
            project.description = Some("Deleting project...".to_string());
            project.generation += 1;
            self.write_project(&project).await?;
        }
        Ok(project)
    }

    async fn purge_project(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.writes.lock().await;
        self.db
            .query(
                r#"
                BEGIN TRANSACTION;
                DELETE node WHERE project_id = $id;
                DELETE edge WHERE project_id = $id;
                DELETE project WHERE project_id = $id;
                COMMIT TRANSACTION;
                "#,
            )
            .bind(("id", id.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    async fn replace_graph(
        &self,
        id: &str,
        generation: u64,
        graph: &BuiltGraph,
    ) -> Result<(), StoreError> {
        let nodes = graph
            .nodes
            .iter()
            .map(|node| NodeRow::from_node(id, node))
            .collect::<Result<Vec<_>, _>>()?;
        let edges: Vec<EdgeRow> = graph
            .edges
            .iter()
            .map(|edge| EdgeRow {
                project_id: id.to_string(),
                source: edge.source.clone(),
                target: edge.target.clone(),
                label: edge.label,
            })
            .collect();

        let _guard = self.writes.lock().await;
        check_generation(&self.fetch_project(id).await?, generation)?;

        let mut sql = String::from(
            "BEGIN TRANSACTION;\n\
             DELETE node WHERE project_id = $id;\n\
             DELETE edge WHERE project_id = $id;\n",
        );
        if !nodes.is_empty() {
            sql.push_str("INSERT INTO node $nodes;\n");
        }
        if !edges.is_empty() {
            sql.push_str("INSERT INTO edge $edges;\n");
        }
        sql.push_str("COMMIT TRANSACTION;");

        debug!(
            project = id,
            nodes = nodes.len(),
            edges = edges.len(),
            "Replacing project graph"
        );

        self.db
            .query(sql)
            .bind(("id", id.to_string()))
            .bind(("nodes", nodes))
            .bind(("edges", edges))
            .await?
            .check()?;
        Ok(())
    }

    async fn scan_nodes(
        &self,
        project_id: &str,
        filter: &NodeFilter,
    ) -> Result<Vec<Node>, StoreError> {
        self.fetch_project(project_id).await?;

        let mut clauses = vec!["project_id = $project"];
        match &filter.parent {
            ParentFilter::Any => {}
            ParentFilter::Root => clauses.push("is_root = true"),
            ParentFilter::Of(_) => clauses.push("parent_id = $parent"),
        }
        if filter.with_role.is_some() {
            clauses.push("labels CONTAINS $with_role");
        }
        if filter.without_role.is_some() {
            clauses.push("labels CONTAINSNOT $without_role");
        }
        if filter.ids.is_some() {
            clauses.push("node_id INSIDE $ids");
        }
        if filter.ancestor_in.is_some() {
            clauses.push("ancestors CONTAINSANY $visible");
        }

        let sql = format!(
            "SELECT {NODE_FIELDS} FROM node WHERE {} ORDER BY node_id",
            clauses.join(" AND ")
        );
        let mut query = self.db.query(sql).bind(("project", project_id.to_string()));
        if let ParentFilter::Of(parent) = &filter.parent {
            query = query.bind(("parent", parent.clone()));
        }
        if let Some(role) = filter.with_role {
            query = query.bind(("with_role", role));
        }
        if let Some(role) = filter.without_role {
            query = query.bind(("without_role", role));
        }
        if let Some(ids) = &filter.ids {
            query = query.bind(("ids", ids.iter().cloned().collect::<Vec<_>>()));
        }
        if let Some(visible) = &filter.ancestor_in {
            query = query.bind(("visible", visible.iter().cloned().collect::<Vec<_>>()));
        }

        let rows: Vec<NodeRow> = query.await?.take(0)?;
        rows.into_iter().map(NodeRow::into_node).collect()
    }

    async fn scan_edges(
        &self,
        project_id: &str,
        filter: &EdgeFilter,
    ) -> Result<Vec<Edge>, StoreError> {
        self.fetch_project(project_id).await?;

        let rows: Vec<EdgeRow> = match &filter.within {
            Some(ids) => {
                self.db
                    .query(format!(
                        "SELECT {EDGE_FIELDS} FROM edge \
                         WHERE project_id = $project AND source INSIDE $ids AND target INSIDE $ids"
                    ))
                    .bind(("project", project_id.to_string()))
                    .bind(("ids", ids.iter().cloned().collect::<Vec<_>>()))
                    .await?
                    .take(0)?
            }
            None => {
                self.db
                    .query(format!(
                        "SELECT {EDGE_FIELDS} FROM edge WHERE project_id = $project"
                    ))
                    .bind(("project", project_id.to_string()))
                    .await?
                    .take(0)?
            }
        };

        let mut edges: Vec<Edge> = rows.into_iter().map(EdgeRow::into_edge).collect();
        edges.sort();
        edges.dedup();
        Ok(edges)
    }

    async fn set_annotation(
        &self,
        project_id: &str,
        generation: u64,
        node_id: &str,
        annotation: &Annotation,
    ) -> Result<(), StoreError> {
        let summary = serde_json::to_string(annotation)?;

        let _guard = self.writes.lock().await;
        check_generation(&self.fetch_project(project_id).await?, generation)?;

        let updated: Vec<NodeIdRow> = self
            .db
            .query(
                "UPDATE node SET summary = $summary \
                 WHERE project_id = $project AND node_id = $node RETURN node_id",
            )
            .bind(("summary", summary))
            .bind(("project", project_id.to_string()))
            .bind(("node", node_id.to_string()))
            .await?
            .take(0)?;

        if updated.is_empty() {
            return Err(StoreError::NodeNotFound(node_id.to_string()));
        }
        Ok(())
    }
}
