//! JSON-lines reader for deck records.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::warn;

use crate::error::{GraphError, GraphResult};
use crate::types::DeckRecord;

/// Records parsed from a JSON-lines file.
#[derive(Debug, Clone, Default)]
pub struct DeckLines {
    pub records: Vec<DeckRecord>,
    /// Non-blank lines that were not a JSON object
    pub unparseable: usize,
}

/// Read one deck record per line.
///
/// Blank lines are ignored. A line that fails to parse is logged and counted
/// rather than failing the whole file; only I/O errors are fatal.
pub fn read_deck_records(path: impl AsRef<Path>) -> GraphResult<DeckLines> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| GraphError::io(path, e))?;
    let mut out = DeckLines::default();

    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| GraphError::io(path, e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<DeckRecord>(line) {
            Ok(record) => out.records.push(record),
            Err(e) => {
                warn!("{}:{}: unparseable deck record: {e}", path.display(), lineno + 1);
                out.unparseable += 1;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_lines_and_counts_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decks.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"deck_id":"a","game":"MTG","timestamp":"2024-01-01","partitions":[]}"#,
                "\n\n",
                "{truncated\n",
                r#"{"deck_id":"b","game":"PKM","timestamp":"2024-01-02","partitions":[]}"#,
                "\n",
            ),
        )
        .unwrap();

        let lines = read_deck_records(&path).unwrap();
        assert_eq!(lines.records.len(), 2);
        assert_eq!(lines.unparseable, 1);
        assert_eq!(lines.records[1].deck_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = read_deck_records("/definitely/not/here.jsonl").unwrap_err();
        assert!(matches!(err, GraphError::Io { .. }));
    }
}
