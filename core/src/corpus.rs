//! Corpus loading: resolving a named tabular resource and streaming
//! `(doc_id, text)` pairs out of it.
//!
//! The row source is an external collaborator behind the [`RowSource`]
//! trait. [`CsvDirectory`] serves CSV files from a data directory and
//! [`MemorySource`] serves tables held in memory.

use crate::error::{EngineError, Result};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use walkdir::WalkDir;

pub type Row = Vec<String>;

/// Failure of a single row as reported by a row source.
#[derive(Debug)]
pub enum RowError {
    /// The row could not be decoded; it is skipped and counted.
    Malformed(String),
    /// The underlying resource failed; ingestion stops.
    Io(io::Error),
}

pub type RowIter = Box<dyn Iterator<Item = std::result::Result<Row, RowError>> + Send>;

/// An opened table: its header row and a lazy iterator over the data rows.
pub struct Table {
    pub header: Row,
    pub rows: RowIter,
}

pub trait RowSource: Send + Sync {
    /// Resolve `source_name` and open it for streaming.
    ///
    /// Fails with `CorpusNotFound` when the name cannot be resolved.
    fn open(&self, source_name: &str) -> Result<Table>;

    /// Names this source can resolve, if it is able to enumerate them.
    fn list_sources(&self) -> Result<Vec<String>> { Ok(Vec::new()) }

    /// The corpus name `source_name` is registered under. Spellings that
    /// resolve to the same resource share one name.
    fn canonical_name(&self, source_name: &str) -> String { source_name.trim().to_string() }
}

/// CSV files under a data directory, addressed by file stem.
#[derive(Debug, Clone)]
pub struct CsvDirectory {
    root: PathBuf,
}

impl CsvDirectory {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn root(&self) -> &Path { &self.root }

    fn resolve(&self, source_name: &str) -> Option<PathBuf> {
        let name = self.canonical_name(source_name);
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return None;
        }
        let path = self.root.join(format!("{name}.csv"));
        path.is_file().then_some(path)
    }
}

impl RowSource for CsvDirectory {
    fn open(&self, source_name: &str) -> Result<Table> {
        let path = self.resolve(source_name).ok_or_else(|| EngineError::CorpusNotFound(source_name.to_string()))?;
        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => EngineError::CorpusNotFound(source_name.to_string()),
            _ => EngineError::CorpusRead { corpus: source_name.to_string(), source: e },
        })?;
        let reader = csv::ReaderBuilder::new().has_headers(false).flexible(true).from_reader(file);
        let mut records = reader.into_records();
        let header = match records.next() {
            None => Vec::new(),
            Some(Ok(rec)) => rec.iter().map(str::to_string).collect(),
            Some(Err(e)) => {
                return Err(EngineError::CorpusRead {
                    corpus: source_name.to_string(),
                    source: io::Error::new(io::ErrorKind::InvalidData, e.to_string()),
                })
            }
        };
        let rows = records.map(|rec| match rec {
            Ok(rec) => Ok(rec.iter().map(str::to_string).collect()),
            Err(e) => match e.into_kind() {
                csv::ErrorKind::Io(io) => Err(RowError::Io(io)),
                other => Err(RowError::Malformed(format!("{other:?}"))),
            },
        });
        Ok(Table { header, rows: Box::new(rows) })
    }

    fn list_sources(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| EngineError::CorpusRead {
                corpus: self.root.display().to_string(),
                source: e.into(),
            })?;
            let p = entry.path();
            if p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("csv") {
                if let Some(stem) = p.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn canonical_name(&self, source_name: &str) -> String {
        let name = source_name.trim();
        name.strip_suffix(".csv").unwrap_or(name).to_string()
    }
}

/// Tables held in memory. Used by tests and embedders that already have rows.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: HashMap<String, (Row, Vec<Row>)>,
}

impl MemorySource {
    pub fn new() -> Self { Self::default() }

    pub fn with_table<S: Into<String>>(mut self, name: S, header: Row, rows: Vec<Row>) -> Self {
        self.insert(name, header, rows);
        self
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, header: Row, rows: Vec<Row>) {
        self.tables.insert(name.into(), (header, rows));
    }
}

impl RowSource for MemorySource {
    fn open(&self, source_name: &str) -> Result<Table> {
        let (header, rows) =
            self.tables.get(source_name).cloned().ok_or_else(|| EngineError::CorpusNotFound(source_name.to_string()))?;
        Ok(Table { header, rows: Box::new(rows.into_iter().map(Ok)) })
    }

    fn list_sources(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Column positions used to pull documents out of a table.
///
/// Positions are signed so out-of-range requests from callers surface as
/// `InvalidColumnIndex` instead of a conversion failure at the edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub doc_id_col: i64,
    pub text_col: i64,
    /// Extra columns copied into `Document::fields` under their header name.
    pub field_cols: Vec<i64>,
}

impl ColumnSpec {
    pub fn new(doc_id_col: i64, text_col: i64) -> Self {
        Self { doc_id_col, text_col, field_cols: Vec::new() }
    }

    pub fn with_field(mut self, col: i64) -> Self {
        self.field_cols.push(col);
        self
    }
}

/// A document as extracted from a row, before analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub doc_id: String,
    pub text: String,
    pub fields: BTreeMap<String, String>,
}

/// Shared count of rows skipped during ingestion.
#[derive(Debug, Clone, Default)]
pub struct MalformedRows(Arc<AtomicUsize>);

impl MalformedRows {
    pub fn get(&self) -> usize { self.0.load(Ordering::Relaxed) }
    fn incr(&self) { self.0.fetch_add(1, Ordering::Relaxed); }
}

pub struct CorpusLoader<'a> {
    source: &'a dyn RowSource,
}

impl<'a> CorpusLoader<'a> {
    pub fn new(source: &'a dyn RowSource) -> Self { Self { source } }

    /// Open `source_name` and validate `columns` against its header.
    ///
    /// Nothing beyond the header is read until the returned stream is polled.
    pub fn load(&self, source_name: &str, columns: &ColumnSpec) -> Result<DocumentStream> {
        let table = self.source.open(source_name)?;
        let width = table.header.len();
        let check = |index: i64| -> Result<usize> {
            usize::try_from(index).ok().filter(|&i| i < width).ok_or_else(|| EngineError::InvalidColumnIndex {
                corpus: source_name.to_string(),
                index,
                columns: width,
            })
        };
        let doc_id_col = check(columns.doc_id_col)?;
        let text_col = check(columns.text_col)?;
        let mut field_cols = Vec::with_capacity(columns.field_cols.len());
        for &col in &columns.field_cols {
            let i = check(col)?;
            field_cols.push((table.header[i].clone(), i));
        }
        Ok(DocumentStream {
            corpus: source_name.to_string(),
            rows: table.rows,
            width,
            doc_id_col,
            text_col,
            field_cols,
            malformed: MalformedRows::default(),
            done: false,
        })
    }
}

/// Lazy stream of documents. Malformed rows are skipped and counted;
/// an I/O failure is yielded once and ends the stream.
pub struct DocumentStream {
    corpus: String,
    rows: RowIter,
    width: usize,
    doc_id_col: usize,
    text_col: usize,
    field_cols: Vec<(String, usize)>,
    malformed: MalformedRows,
    done: bool,
}

impl DocumentStream {
    /// Handle to the skipped-row counter that stays valid after the stream is consumed.
    pub fn malformed_rows(&self) -> MalformedRows { self.malformed.clone() }

    fn extract(&self, mut row: Row) -> Option<RawDocument> {
        if row.len() != self.width {
            return None;
        }
        let doc_id = row[self.doc_id_col].trim().to_string();
        if doc_id.is_empty() {
            return None;
        }
        let fields = self.field_cols.iter().map(|(name, i)| (name.clone(), row[*i].clone())).collect();
        let text = std::mem::take(&mut row[self.text_col]);
        Some(RawDocument { doc_id, text, fields })
    }
}

impl Iterator for DocumentStream {
    type Item = Result<RawDocument>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.rows.next()? {
                Ok(row) => match self.extract(row) {
                    Some(doc) => return Some(Ok(doc)),
                    None => self.malformed.incr(),
                },
                Err(RowError::Malformed(reason)) => {
                    tracing::debug!(corpus = %self.corpus, %reason, "skipping undecodable row");
                    self.malformed.incr();
                }
                Err(RowError::Io(source)) => {
                    self.done = true;
                    return Some(Err(EngineError::CorpusRead { corpus: self.corpus.clone(), source }));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Row { cells.iter().map(|s| s.to_string()).collect() }

    fn songs() -> MemorySource {
        MemorySource::new().with_table(
            "songs",
            row(&["id", "title", "artist", "lyrics"]),
            vec![
                row(&["s1", "Hello", "Adele", "hello from the other side"]),
                row(&["s2", "short row"]),
                row(&["", "No id", "Nobody", "orphan text"]),
                row(&["s3", "Yesterday", "Beatles", "all my troubles seemed so far away"]),
            ],
        )
    }

    #[test]
    fn streams_documents_and_counts_malformed_rows() {
        let source = songs();
        let stream = CorpusLoader::new(&source).load("songs", &ColumnSpec::new(0, 3).with_field(1)).unwrap();
        let malformed = stream.malformed_rows();
        let docs: Vec<RawDocument> = stream.collect::<Result<_>>().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].doc_id, "s1");
        assert_eq!(docs[1].fields.get("title").map(String::as_str), Some("Yesterday"));
        assert_eq!(malformed.get(), 2);
    }

    #[test]
    fn rejects_out_of_range_and_negative_columns() {
        let source = songs();
        let loader = CorpusLoader::new(&source);
        for spec in [ColumnSpec::new(0, 4), ColumnSpec::new(-1, 3), ColumnSpec::new(0, 3).with_field(9)] {
            match loader.load("songs", &spec) {
                Err(EngineError::InvalidColumnIndex { columns, .. }) => assert_eq!(columns, 4),
                other => panic!("expected InvalidColumnIndex, got {:?}", other.err()),
            }
        }
    }

    #[test]
    fn unknown_source_is_not_found() {
        let source = songs();
        let err = CorpusLoader::new(&source).load("missing", &ColumnSpec::new(0, 1)).err().unwrap();
        assert!(matches!(err, EngineError::CorpusNotFound(name) if name == "missing"));
    }

    #[test]
    fn csv_directory_refuses_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvDirectory::new(dir.path());
        assert!(matches!(source.open("../etc/passwd"), Err(EngineError::CorpusNotFound(_))));
    }

    #[test]
    fn csv_directory_names_corpora_by_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("songs.csv"), "id,text\n1,hi\n").unwrap();
        let source = CsvDirectory::new(dir.path());
        assert_eq!(source.canonical_name("songs.csv"), "songs");
        assert_eq!(source.canonical_name(" songs "), "songs");
        assert_eq!(source.open("songs.csv").unwrap().header, row(&["id", "text"]));
    }
}
