//! Tabular data access.
//!
//! The pipeline never talks to a data repository directly. It asks a [`DatasetSource`] for a
//! dataset by id, optionally with a filter predicate that is passed through verbatim, and gets a
//! [`RawTable`] of strings back. [`TsvDirectorySource`] serves tab-separated files from disk.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail};

/// A header plus string rows, as delivered by a source.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> anyhow::Result<Self> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != header.len() {
                bail!(
                    "row {} has {} fields, header has {}",
                    i,
                    row.len(),
                    header.len()
                );
            }
        }
        Ok(RawTable { header, rows })
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }

    /// Keep only rows satisfying every clause of `predicate`.
    pub fn filter(&self, predicate: &RowPredicate) -> anyhow::Result<RawTable> {
        let mut resolved = Vec::with_capacity(predicate.clauses.len());
        for (column, value) in &predicate.clauses {
            let idx = self
                .column_index(column)
                .ok_or_else(|| anyhow!("predicate refers to unknown attribute '{}'", column))?;
            resolved.push((idx, value.as_str()));
        }

        let rows = self
            .rows
            .iter()
            .filter(|row| resolved.iter().all(|&(idx, value)| row[idx] == value))
            .cloned()
            .collect();

        Ok(RawTable {
            header: self.header.clone(),
            rows,
        })
    }
}

/// Conjunction of `attribute == "value"` clauses.
///
/// Accepts the repository query form `select * from entity where a=="x" and b=="y"` as well as
/// the bare `a=="x" and b=="y"`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowPredicate {
    pub clauses: Vec<(String, String)>,
}

impl RowPredicate {
    pub fn parse(query: &str) -> anyhow::Result<Self> {
        let lower = query.to_ascii_lowercase();
        let body = match lower.find(" where ") {
            Some(pos) => &query[pos + " where ".len()..],
            None if lower.trim_start().starts_with("select") => "",
            None => query,
        };

        let mut clauses = Vec::new();
        for clause in split_and(body) {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }
            let (key, value) = clause
                .split_once("==")
                .ok_or_else(|| anyhow!("unsupported predicate clause '{}'", clause))?;
            let key = key.trim();
            if key.is_empty() {
                bail!("empty attribute name in clause '{}'", clause);
            }
            clauses.push((key.to_string(), unquote(value.trim()).to_string()));
        }
        Ok(RowPredicate { clauses })
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

fn split_and(body: &str) -> Vec<&str> {
    let lower = body.to_ascii_lowercase();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut search = 0;
    while let Some(pos) = lower[search..].find(" and ") {
        let at = search + pos;
        parts.push(&body[start..at]);
        start = at + " and ".len();
        search = start;
    }
    parts.push(&body[start..]);
    parts
}

fn unquote(s: &str) -> &str {
    let bytes = s.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Collaborator that resolves a dataset id to a table.
pub trait DatasetSource {
    fn fetch(&self, dataset_id: &str, query: Option<&str>) -> anyhow::Result<RawTable>;
}

/// Reads `<root>/<dataset_id>.tsv`.
#[derive(Debug, Clone)]
pub struct TsvDirectorySource {
    root: PathBuf,
}

impl TsvDirectorySource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        TsvDirectorySource {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, dataset_id: &str) -> PathBuf {
        self.root.join(format!("{}.tsv", dataset_id))
    }
}

impl DatasetSource for TsvDirectorySource {
    fn fetch(&self, dataset_id: &str, query: Option<&str>) -> anyhow::Result<RawTable> {
        let path = self.path_for(dataset_id);
        let table = read_tsv(&path)?;
        log::debug!(
            "read {} rows x {} columns from {}",
            table.n_rows(),
            table.header.len(),
            path.display()
        );

        match query {
            Some(q) => {
                let predicate = RowPredicate::parse(q)?;
                if predicate.is_empty() {
                    Ok(table)
                } else {
                    table.filter(&predicate)
                }
            }
            None => Ok(table),
        }
    }
}

pub fn read_tsv<P: AsRef<Path>>(path: P) -> anyhow::Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path.as_ref())?;

    let header: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|f| f.trim().to_string()).collect());
    }

    RawTable::new(header, rows)
}
