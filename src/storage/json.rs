//! Single-file JSON snapshot backend.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::codec::{edge_key, node_key};
use super::{GraphSnapshot, GraphStorage, StorageBackend};
use crate::error::{GraphError, GraphResult};
use crate::graph::{CardNode, CoEdge, EdgeKey};

/// On-disk layout: `{nodes: {...}, edges: {...}, last_update, total_decks_processed}`.
#[derive(Debug, Serialize, Deserialize)]
struct JsonDocument {
    nodes: BTreeMap<String, CardNode>,
    edges: BTreeMap<String, CoEdge>,
    #[serde(default)]
    last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    total_decks_processed: u64,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    ingested_decks: BTreeSet<String>,
}

/// Graph persisted as one JSON file, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct JsonStorage {
    path: PathBuf,
}

impl JsonStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn write_document(file: File, doc: &JsonDocument) -> std::io::Result<()> {
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, doc)?;
    writer.flush()
}

impl GraphStorage for JsonStorage {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Json
    }

    fn location(&self) -> &Path {
        &self.path
    }

    fn save(&self, snapshot: &GraphSnapshot) -> GraphResult<()> {
        let doc = JsonDocument {
            nodes: snapshot
                .nodes
                .iter()
                .map(|n| (node_key(n), n.clone()))
                .collect(),
            edges: snapshot
                .edges
                .iter()
                .map(|e| (edge_key(e), e.clone()))
                .collect(),
            last_update: snapshot.last_update,
            total_decks_processed: snapshot.total_decks_processed,
            ingested_decks: snapshot.ingested_decks.clone(),
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| GraphError::io(parent, e))?;
        }

        let tmp = self.temp_path();
        let file = File::create(&tmp).map_err(|e| GraphError::io(&tmp, e))?;
        let written = write_document(file, &doc)
            .map_err(|e| GraphError::io(&tmp, e))
            .and_then(|()| fs::rename(&tmp, &self.path).map_err(|e| GraphError::io(&self.path, e)));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&tmp) {
                warn!(path = %tmp.display(), error = %cleanup, "failed to remove partial snapshot");
            }
            return Err(e);
        }

        info!(
            path = %self.path.display(),
            nodes = doc.nodes.len(),
            edges = doc.edges.len(),
            "saved graph (json)"
        );
        Ok(())
    }

    fn load(&self) -> GraphResult<Option<GraphSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let file = File::open(&self.path).map_err(|e| GraphError::io(&self.path, e))?;
        let doc: JsonDocument = serde_json::from_reader(BufReader::new(file))?;

        let mut nodes = Vec::with_capacity(doc.nodes.len());
        for (key, node) in doc.nodes {
            if key != node_key(&node) {
                return Err(GraphError::corrupt(
                    "json snapshot",
                    format!("node stored under '{key}' is {}", node.key),
                ));
            }
            nodes.push(node);
        }
        nodes.sort_by(|a, b| a.key.cmp(&b.key));

        let mut edges = Vec::with_capacity(doc.edges.len());
        for (_, mut edge) in doc.edges {
            let canonical = EdgeKey::new(edge.game, edge.card1.clone(), edge.card2.clone());
            edge.card1 = canonical.card1;
            edge.card2 = canonical.card2;
            edges.push(edge);
        }
        edges.sort_by_key(CoEdge::key);

        info!(
            path = %self.path.display(),
            nodes = nodes.len(),
            edges = edges.len(),
            "loaded graph (json)"
        );
        Ok(Some(GraphSnapshot {
            nodes,
            edges,
            last_update: doc.last_update,
            total_decks_processed: doc.total_decks_processed,
            ingested_decks: doc.ingested_decks,
        }))
    }
}
