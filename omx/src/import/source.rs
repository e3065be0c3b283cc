//! Tabular record sources for bulk imports

use std::fs::File;
use std::io;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::error::Result;

/// A stream of `(row_id, col_id, value...)` records read in chunks
pub trait TableSource {
    /// Column names, available before any record is consumed
    fn columns(&mut self) -> Result<Vec<String>>;

    /// Up to `max` further records, or `None` once the source is exhausted
    fn next_chunk(&mut self, max: usize) -> Result<Option<Vec<StringRecord>>>;

    /// Fraction of the source consumed so far, when known
    fn progress(&self) -> Option<f64> {
        None
    }
}

/// Delimited text with a header row
pub struct CsvSource<R> {
    reader: csv::Reader<R>,
    total_bytes: Option<u64>,
}

impl CsvSource<File> {
    /// Open a comma-separated file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let total_bytes = file.metadata()?.len();
        let mut source = Self::from_reader(file);
        source.total_bytes = Some(total_bytes);
        Ok(source)
    }
}

impl<R: io::Read> CsvSource<R> {
    /// Read comma-separated records from any reader
    pub fn from_reader(reader: R) -> Self {
        Self::with_delimiter(reader, b',')
    }

    pub fn with_delimiter(reader: R, delimiter: u8) -> Self {
        let reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .trim(Trim::All)
            .from_reader(reader);
        Self {
            reader,
            total_bytes: None,
        }
    }
}

impl<R: io::Read> TableSource for CsvSource<R> {
    fn columns(&mut self) -> Result<Vec<String>> {
        Ok(self.reader.headers()?.iter().map(str::to_string).collect())
    }

    fn next_chunk(&mut self, max: usize) -> Result<Option<Vec<StringRecord>>> {
        let mut records = Vec::with_capacity(max.min(1 << 16));
        let mut record = StringRecord::new();
        while records.len() < max && self.reader.read_record(&mut record)? {
            records.push(record.clone());
        }
        Ok((!records.is_empty()).then_some(records))
    }

    fn progress(&self) -> Option<f64> {
        let total = self.total_bytes.filter(|&t| t > 0)?;
        Some((self.reader.position().byte() as f64 / total as f64).min(1.0))
    }
}

/// Records held in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    columns: Vec<String>,
    records: Vec<StringRecord>,
    cursor: usize,
}

impl MemorySource {
    pub fn new<C, S, R, V>(columns: C, rows: R) -> Self
    where
        C: IntoIterator<Item = S>,
        S: Into<String>,
        R: IntoIterator<Item = V>,
        V: IntoIterator,
        V::Item: AsRef<str>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            records: rows.into_iter().map(|row| row.into_iter().collect()).collect(),
            cursor: 0,
        }
    }

    /// Append one record
    pub fn push<V>(&mut self, row: V)
    where
        V: IntoIterator,
        V::Item: AsRef<str>,
    {
        self.records.push(row.into_iter().collect());
    }
}

impl TableSource for MemorySource {
    fn columns(&mut self) -> Result<Vec<String>> {
        Ok(self.columns.clone())
    }

    fn next_chunk(&mut self, max: usize) -> Result<Option<Vec<StringRecord>>> {
        if self.cursor >= self.records.len() {
            return Ok(None);
        }
        let end = self.cursor.saturating_add(max.max(1)).min(self.records.len());
        let chunk = self.records[self.cursor..end].to_vec();
        self.cursor = end;
        Ok(Some(chunk))
    }

    fn progress(&self) -> Option<f64> {
        if self.records.is_empty() {
            return Some(1.0);
        }
        Some(self.cursor as f64 / self.records.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_chunks() {
        let data = "o, d, time\n1,1,5\n1,2,6\n2,1,7\n";
        let mut source = CsvSource::from_reader(data.as_bytes());

        assert_eq!(source.columns().unwrap(), vec!["o", "d", "time"]);
        let first = source.next_chunk(2).unwrap().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(&first[1][2], "6");
        assert_eq!(source.next_chunk(2).unwrap().unwrap().len(), 1);
        assert!(source.next_chunk(2).unwrap().is_none());
    }

    #[test]
    fn test_csv_progress_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        std::fs::write(&path, "o,d,v\n1,1,1\n2,2,2\n").unwrap();

        let mut source = CsvSource::from_path(&path).unwrap();
        source.columns().unwrap();
        while source.next_chunk(1).unwrap().is_some() {}
        assert_eq!(source.progress(), Some(1.0));
    }

    #[test]
    fn test_memory_source() {
        let mut source = MemorySource::new(["o", "d", "v"], [["1", "1", "5"], ["2", "2", "7"]]);
        source.push(["1", "2", "3"]);

        assert_eq!(source.columns().unwrap().len(), 3);
        assert_eq!(source.progress(), Some(0.0));
        assert_eq!(source.next_chunk(2).unwrap().unwrap().len(), 2);
        assert_eq!(source.next_chunk(2).unwrap().unwrap().len(), 1);
        assert!(source.next_chunk(2).unwrap().is_none());
        assert_eq!(source.progress(), Some(1.0));
    }
}
