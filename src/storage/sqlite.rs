//! SQLite backend.
//!
//! Schema:
//!
//! ```text
//! nodes(name, game, first_seen, last_seen, total_decks, attributes_json)
//!     PRIMARY KEY (name, game)
//! edges(card1, card2, game, weight, first_seen, last_seen,
//!       monthly_counts_json, format_periods_json, metadata_json)
//!     PRIMARY KEY (card1, card2, game)
//! graph_meta(key, value)
//! ingested_decks(deck_id)
//! ```
//!
//! The database runs in WAL mode so any number of reader connections
//! ([`SqliteStorage::open_reader`]) can query a stable snapshot while one
//! writer saves.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use super::codec::{decode_time, encode_time, EdgeRow, NodeRow};
use super::{GraphSnapshot, GraphStorage, StorageBackend};
use crate::error::{GraphError, GraphResult};
use crate::graph::{CoEdge, EdgeKey};
use crate::types::{CardKey, Game};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    name TEXT NOT NULL,
    game TEXT NOT NULL,
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    total_decks INTEGER NOT NULL DEFAULT 0,
    attributes_json TEXT,
    PRIMARY KEY (name, game)
);
CREATE TABLE IF NOT EXISTS edges (
    card1 TEXT NOT NULL,
    card2 TEXT NOT NULL,
    game TEXT NOT NULL,
    weight REAL NOT NULL,
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    monthly_counts_json TEXT,
    format_periods_json TEXT,
    metadata_json TEXT,
    PRIMARY KEY (card1, card2, game)
);
CREATE INDEX IF NOT EXISTS idx_edges_game_pair ON edges(game, card1, card2);
CREATE INDEX IF NOT EXISTS idx_edges_game_pair_rev ON edges(game, card2, card1);
CREATE INDEX IF NOT EXISTS idx_edges_card1_weight ON edges(game, card1, weight DESC);
CREATE INDEX IF NOT EXISTS idx_edges_card2_weight ON edges(game, card2, weight DESC);
CREATE TABLE IF NOT EXISTS graph_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS ingested_decks (
    deck_id TEXT PRIMARY KEY
);
";

const META_TOTAL_DECKS: &str = "total_decks_processed";
const META_LAST_UPDATE: &str = "last_update";

/// Graph persisted as SQLite tables.
pub struct SqliteStorage {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (creating if needed) a read-write database.
    pub fn open(path: impl Into<PathBuf>) -> GraphResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| GraphError::io(parent, e))?;
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )?;
        conn.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), "opened sqlite graph store");
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Open an additional read-only connection to an existing database.
    pub fn open_reader(path: impl Into<PathBuf>) -> GraphResult<Self> {
        let path = path.into();
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch("PRAGMA busy_timeout=5000;")?;
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Neighbours of a card straight from the edge indexes.
    ///
    /// Same ordering as the in-memory store: weight descending, then name.
    pub fn neighbors(&self, card: &CardKey, limit: Option<usize>) -> GraphResult<Vec<(String, f64)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT card2 AS other, weight FROM edges WHERE game = ?1 AND card1 = ?2
             UNION ALL
             SELECT card1 AS other, weight FROM edges WHERE game = ?1 AND card2 = ?2
             ORDER BY weight DESC, other ASC
             LIMIT ?3",
        )?;
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let rows = stmt.query_map(
            params![card.game.code(), card.name.as_ref(), limit],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Point lookup of one edge; the pair is canonicalized first.
    pub fn get_edge(&self, game: Game, a: &str, b: &str) -> GraphResult<Option<CoEdge>> {
        let key = EdgeKey::new(game, a, b);
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT card1, card2, game, weight, first_seen, last_seen,
                        monthly_counts_json, format_periods_json, metadata_json
                 FROM edges WHERE game = ?1 AND card1 = ?2 AND card2 = ?3",
                params![key.game.code(), key.card1.as_ref(), key.card2.as_ref()],
                read_edge_row,
            )
            .optional()?;
        row.map(EdgeRow::into_edge).transpose()
    }

    fn read_meta(conn: &Connection, key: &str) -> GraphResult<Option<String>> {
        Ok(conn
            .query_row(
                "SELECT value FROM graph_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }
}

fn read_edge_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EdgeRow> {
    Ok(EdgeRow {
        card1: row.get(0)?,
        card2: row.get(1)?,
        game: row.get(2)?,
        weight: row.get(3)?,
        first_seen: row.get(4)?,
        last_seen: row.get(5)?,
        monthly_counts_json: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        format_periods_json: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
        metadata_json: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
    })
}

impl GraphStorage for SqliteStorage {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Sqlite
    }

    fn location(&self) -> &Path {
        &self.path
    }

    fn save(&self, snapshot: &GraphSnapshot) -> GraphResult<()> {
        let node_rows = snapshot
            .nodes
            .iter()
            .map(NodeRow::from_node)
            .collect::<GraphResult<Vec<_>>>()?;
        let edge_rows = snapshot
            .edges
            .iter()
            .map(EdgeRow::from_edge)
            .collect::<GraphResult<Vec<_>>>()?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM nodes; DELETE FROM edges; DELETE FROM graph_meta; DELETE FROM ingested_decks;",
        )?;
        {
            let mut insert_node = tx.prepare(
                "INSERT INTO nodes (name, game, first_seen, last_seen, total_decks, attributes_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for row in &node_rows {
                insert_node.execute(params![
                    row.name,
                    row.game,
                    row.first_seen,
                    row.last_seen,
                    row.total_decks,
                    row.attributes_json,
                ])?;
            }

            let mut insert_edge = tx.prepare(
                "INSERT INTO edges (card1, card2, game, weight, first_seen, last_seen,
                                    monthly_counts_json, format_periods_json, metadata_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for row in &edge_rows {
                insert_edge.execute(params![
                    row.card1,
                    row.card2,
                    row.game,
                    row.weight,
                    row.first_seen,
                    row.last_seen,
                    row.monthly_counts_json,
                    row.format_periods_json,
                    row.metadata_json,
                ])?;
            }

            let mut insert_deck = tx.prepare("INSERT INTO ingested_decks (deck_id) VALUES (?1)")?;
            for deck_id in &snapshot.ingested_decks {
                insert_deck.execute(params![deck_id])?;
            }

            let mut insert_meta =
                tx.prepare("INSERT INTO graph_meta (key, value) VALUES (?1, ?2)")?;
            insert_meta.execute(params![
                META_TOTAL_DECKS,
                snapshot.total_decks_processed.to_string()
            ])?;
            if let Some(ts) = &snapshot.last_update {
                insert_meta.execute(params![META_LAST_UPDATE, encode_time(ts)])?;
            }
        }
        tx.commit()?;

        info!(
            path = %self.path.display(),
            nodes = node_rows.len(),
            edges = edge_rows.len(),
            "saved graph (sqlite)"
        );
        Ok(())
    }

    fn load(&self) -> GraphResult<Option<GraphSnapshot>> {
        let conn = self.conn.lock();

        let Some(total_raw) = Self::read_meta(&conn, META_TOTAL_DECKS)? else {
            return Ok(None);
        };
        let total_decks_processed = total_raw
            .parse::<u64>()
            .map_err(|e| GraphError::corrupt("graph_meta", format!("{META_TOTAL_DECKS}: {e}")))?;
        let last_update = Self::read_meta(&conn, META_LAST_UPDATE)?
            .map(|raw| decode_time(&raw, "graph_meta"))
            .transpose()?;

        let mut stmt = conn.prepare(
            "SELECT name, game, first_seen, last_seen, total_decks, attributes_json
             FROM nodes ORDER BY game, name",
        )?;
        let node_rows = stmt
            .query_map([], |row| {
                Ok(NodeRow {
                    name: row.get(0)?,
                    game: row.get(1)?,
                    first_seen: row.get(2)?,
                    last_seen: row.get(3)?,
                    total_decks: row.get(4)?,
                    attributes_json: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut nodes = node_rows
            .into_iter()
            .map(NodeRow::into_node)
            .collect::<GraphResult<Vec<_>>>()?;
        nodes.sort_by(|a, b| a.key.cmp(&b.key));

        let mut stmt = conn.prepare(
            "SELECT card1, card2, game, weight, first_seen, last_seen,
                    monthly_counts_json, format_periods_json, metadata_json
             FROM edges",
        )?;
        let edge_rows = stmt
            .query_map([], read_edge_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let mut edges = edge_rows
            .into_iter()
            .map(EdgeRow::into_edge)
            .collect::<GraphResult<Vec<_>>>()?;
        edges.sort_by_key(CoEdge::key);

        let mut stmt = conn.prepare("SELECT deck_id FROM ingested_decks")?;
        let ingested_decks = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<BTreeSet<String>, _>>()?;

        info!(
            path = %self.path.display(),
            nodes = nodes.len(),
            edges = edges.len(),
            "loaded graph (sqlite)"
        );
        Ok(Some(GraphSnapshot {
            nodes,
            edges,
            last_update,
            total_decks_processed,
            ingested_decks,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::CardNode;
    use crate::types::parse_timestamp;

    fn snapshot() -> GraphSnapshot {
        let ts = parse_timestamp("2024-01-15").unwrap();
        let names = ["Chain Lightning", "Lava Spike", "Lightning Bolt"];
        let nodes = names
            .iter()
            .map(|n| {
                let mut node = CardNode::new(CardKey::new(Game::Magic, *n), ts);
                node.observe(ts);
                node
            })
            .collect();
        let mut edges: Vec<CoEdge> = [
            ("Lightning Bolt", "Chain Lightning", 4.0),
            ("Lightning Bolt", "Lava Spike", 4.0),
            ("Chain Lightning", "Lava Spike", 1.0),
        ]
        .iter()
        .map(|(a, b, w)| {
            let mut edge = CoEdge::new(EdgeKey::new(Game::Magic, *a, *b), ts);
            edge.weight = *w;
            edge.monthly_counts.insert("2024-01".into(), *w);
            edge
        })
        .collect();
        edges.sort_by_key(CoEdge::key);
        GraphSnapshot {
            nodes,
            edges,
            last_update: Some(ts),
            total_decks_processed: 3,
            ingested_decks: ["a", "b", "c"].iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::open(dir.path().join("graph.db")).unwrap();
        assert!(storage.load().unwrap().is_none());

        let snap = snapshot();
        storage.save(&snap).unwrap();
        assert_eq!(storage.load().unwrap().unwrap(), snap);

        // A second save replaces rather than appends.
        storage.save(&snap).unwrap();
        assert_eq!(storage.load().unwrap().unwrap().edges.len(), 3);
    }

    #[test]
    fn test_indexed_neighbors_and_point_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        let writer = SqliteStorage::open(&path).unwrap();
        writer.save(&snapshot()).unwrap();

        let reader = SqliteStorage::open_reader(&path).unwrap();
        let bolt = CardKey::new(Game::Magic, "Lightning Bolt");
        let neighbors = reader.neighbors(&bolt, None).unwrap();
        assert_eq!(
            neighbors,
            vec![("Chain Lightning".to_string(), 4.0), ("Lava Spike".to_string(), 4.0)]
        );
        assert_eq!(reader.neighbors(&bolt, Some(1)).unwrap().len(), 1);

        let edge = reader
            .get_edge(Game::Magic, "Lava Spike", "Chain Lightning")
            .unwrap()
            .unwrap();
        assert_eq!(edge.weight, 1.0);
        assert!(reader.get_edge(Game::Pokemon, "Lava Spike", "Chain Lightning").unwrap().is_none());
    }

    #[test]
    fn test_reader_cannot_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        let writer = SqliteStorage::open(&path).unwrap();
        writer.save(&snapshot()).unwrap();
        let reader = SqliteStorage::open_reader(&path).unwrap();
        assert!(reader.save(&snapshot()).is_err());
        assert!(reader.load().unwrap().is_some());
    }

    #[test]
    fn test_corrupt_json_column_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        let storage = SqliteStorage::open(&path).unwrap();
        storage.save(&snapshot()).unwrap();
        storage
            .conn
            .lock()
            .execute("UPDATE edges SET monthly_counts_json = '{oops'", [])
            .unwrap();
        let err = storage.load().unwrap_err();
        assert!(matches!(err, GraphError::Corrupt { .. }), "got {err}");
    }
}
