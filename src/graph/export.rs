//! Bulk exports for downstream tooling.
//!
//! - Edge list: UTF-8, one `card1\tcard2\tweight` line per edge, no header.
//!   This is the input format embedding trainers expect.
//! - Parquet: `nodes.parquet` and `edges.parquet`, one flattened row per
//!   entity with the temporal maps carried as JSON text columns.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::info;

use super::store::CardGraph;
use crate::error::{GraphError, GraphResult};
use crate::storage::codec::{EdgeRow, NodeRow};
use crate::types::Game;

/// Files written by [`CardGraph::export_parquet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParquetExport {
    pub nodes: PathBuf,
    pub edges: PathBuf,
}

fn node_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("name", DataType::Utf8, false),
        Field::new("game", DataType::Utf8, false),
        Field::new("first_seen", DataType::Utf8, false),
        Field::new("last_seen", DataType::Utf8, false),
        Field::new("total_decks", DataType::Int64, false),
        Field::new("attributes_json", DataType::Utf8, false),
    ]))
}

fn edge_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("card1", DataType::Utf8, false),
        Field::new("card2", DataType::Utf8, false),
        Field::new("game", DataType::Utf8, false),
        Field::new("weight", DataType::Float64, false),
        Field::new("first_seen", DataType::Utf8, false),
        Field::new("last_seen", DataType::Utf8, false),
        Field::new("monthly_counts_json", DataType::Utf8, false),
        Field::new("format_periods_json", DataType::Utf8, false),
        Field::new("metadata_json", DataType::Utf8, false),
    ]))
}

fn strings<T>(rows: &[T], f: impl Fn(&T) -> &str) -> ArrayRef {
    Arc::new(StringArray::from(rows.iter().map(f).collect::<Vec<&str>>()))
}

fn ensure_dir(dir: &Path) -> GraphResult<()> {
    fs::create_dir_all(dir).map_err(|e| GraphError::io(dir, e))
}

fn write_parquet(path: &Path, batch: &RecordBatch) -> GraphResult<()> {
    let file = File::create(path).map_err(|e| GraphError::io(path, e))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}

impl CardGraph {
    /// Write edges with weight >= `min_weight` (optionally one game only) as
    /// a tab-separated edge list. Returns the number of lines written.
    pub fn export_edgelist(
        &self,
        path: impl AsRef<Path>,
        min_weight: f64,
        game: Option<Game>,
    ) -> GraphResult<usize> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }
        let file = File::create(path).map_err(|e| GraphError::io(path, e))?;
        let mut out = BufWriter::new(file);

        let edges = self.query_edges(game, min_weight);
        for edge in &edges {
            writeln!(out, "{}\t{}\t{}", edge.card1, edge.card2, edge.weight)
                .map_err(|e| GraphError::io(path, e))?;
        }
        out.flush().map_err(|e| GraphError::io(path, e))?;

        info!(path = %path.display(), edges = edges.len(), "exported edge list");
        Ok(edges.len())
    }

    /// Write `nodes.parquet` and `edges.parquet` into `output_dir`.
    pub fn export_parquet(&self, output_dir: impl AsRef<Path>) -> GraphResult<ParquetExport> {
        let dir = output_dir.as_ref();
        ensure_dir(dir)?;
        let snapshot = self.snapshot();

        let nodes = snapshot
            .nodes
            .iter()
            .map(NodeRow::from_node)
            .collect::<GraphResult<Vec<_>>>()?;
        let node_batch = RecordBatch::try_new(
            node_schema(),
            vec![
                strings(&nodes, |r| r.name.as_str()),
                strings(&nodes, |r| r.game.as_str()),
                strings(&nodes, |r| r.first_seen.as_str()),
                strings(&nodes, |r| r.last_seen.as_str()),
                Arc::new(Int64Array::from(
                    nodes.iter().map(|r| r.total_decks).collect::<Vec<_>>(),
                )) as ArrayRef,
                strings(&nodes, |r| r.attributes_json.as_str()),
            ],
        )?;

        let edges = snapshot
            .edges
            .iter()
            .map(EdgeRow::from_edge)
            .collect::<GraphResult<Vec<_>>>()?;
        let edge_batch = RecordBatch::try_new(
            edge_schema(),
            vec![
                strings(&edges, |r| r.card1.as_str()),
                strings(&edges, |r| r.card2.as_str()),
                strings(&edges, |r| r.game.as_str()),
                Arc::new(Float64Array::from(
                    edges.iter().map(|r| r.weight).collect::<Vec<_>>(),
                )) as ArrayRef,
                strings(&edges, |r| r.first_seen.as_str()),
                strings(&edges, |r| r.last_seen.as_str()),
                strings(&edges, |r| r.monthly_counts_json.as_str()),
                strings(&edges, |r| r.format_periods_json.as_str()),
                strings(&edges, |r| r.metadata_json.as_str()),
            ],
        )?;

        let export = ParquetExport {
            nodes: dir.join("nodes.parquet"),
            edges: dir.join("edges.parquet"),
        };
        write_parquet(&export.nodes, &node_batch)?;
        write_parquet(&export.edges, &edge_batch)?;

        info!(
            dir = %dir.display(),
            nodes = nodes.len(),
            edges = edges.len(),
            "exported parquet"
        );
        Ok(export)
    }
}
