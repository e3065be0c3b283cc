//! Bulk import of `(row_id, col_id, value...)` tables
//!
//! Records are streamed from a [`TableSource`] in chunks of bounded size.
//! [`OpenMatrix::import_table`] scatters every chunk straight into its
//! destination matrices and makes it durable before reading the next one.
//! An undo journal makes each chunk all-or-nothing across destinations.
//! [`OpenMatrix::import_table_staged`] collects the whole stream in an
//! in-memory `rows × cols × k` cube and only writes once the source is
//! exhausted.

pub(crate) mod journal;
mod source;

pub use source::{CsvSource, MemorySource, TableSource};

use std::fmt;

use csv::StringRecord;
use omx_core::{CoreError, DataType, ElementType, EntryKind, Shape};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::ImportConfig;
use crate::container::{check_name, OpenMatrix};
use crate::error::{Error, Result};
use crate::storage::{EntryFile, EntryWriter};

use journal::{ChunkJournal, Preimage};

/// Stage of a running import, reported in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    Discovering,
    Ensuring,
    Streaming,
    Flushed,
    Staged,
    Finalized,
    Aborted,
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportPhase::Discovering => "discovering",
            ImportPhase::Ensuring => "ensuring",
            ImportPhase::Streaming => "streaming",
            ImportPhase::Flushed => "flushed",
            ImportPhase::Staged => "staged",
            ImportPhase::Finalized => "finalized",
            ImportPhase::Aborted => "aborted",
        };
        write!(f, "{name}")
    }
}

/// Outcome of a completed import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    /// Chunks applied
    pub chunks: usize,
    /// Records applied
    pub records: u64,
    /// Matrices written, in source column order
    pub destinations: Vec<String>,
}

/// Value column `column` of the source feeds matrix `destination`
#[derive(Debug, Clone, PartialEq, Eq)]
struct Mapping {
    column: usize,
    destination: String,
}

/// Resolve the destination of every imported value column
fn plan(columns: &[String], config: &ImportConfig) -> Result<Vec<Mapping>> {
    if columns.len() < 3 {
        return Err(Error::BadFormat(format!(
            "import needs row, column and at least one value column, found {columns:?}"
        )));
    }

    let mappings: Vec<Mapping> = match &config.column_map {
        None => columns
            .iter()
            .enumerate()
            .skip(2)
            .map(|(column, name)| Mapping {
                column,
                destination: name.clone(),
            })
            .collect(),
        Some(map) => map
            .iter()
            .map(|(source, destination)| {
                let column = columns
                    .iter()
                    .skip(2)
                    .position(|c| c == source)
                    .ok_or_else(|| {
                        Error::BadFormat(format!("'{source}' is not a value column of the table"))
                    })?;
                Ok(Mapping {
                    column: column + 2,
                    destination: destination.clone(),
                })
            })
            .collect::<Result<_>>()?,
    };

    if mappings.is_empty() {
        return Err(Error::BadFormat("column map selects no columns".to_string()));
    }
    for (i, mapping) in mappings.iter().enumerate() {
        check_name(&mapping.destination)?;
        if mappings[..i].iter().any(|m| m.destination == mapping.destination) {
            return Err(Error::BadFormat(format!(
                "matrix '{}' is the destination of more than one column",
                mapping.destination
            )));
        }
    }
    Ok(mappings)
}

/// Validated contents of one chunk
struct ParsedChunk {
    /// Flat `row * cols + col` offset of every record
    cells: Vec<usize>,
    /// `values[d][r]` is the value of record `r` for destination `d`
    values: Vec<Vec<f64>>,
}

fn parse_chunk(
    records: &[StringRecord],
    mappings: &[Mapping],
    shape: Shape,
    offset: u64,
    chunk: usize,
) -> Result<ParsedChunk> {
    let mut cells = Vec::with_capacity(records.len());
    let mut values = vec![Vec::with_capacity(records.len()); mappings.len()];

    for (i, record) in records.iter().enumerate() {
        let context = |reason: String| Error::aborted(chunk, format!("record {}: {reason}", i + 1));

        let row = coerce_id(record.get(0), shape.rows, offset)
            .map_err(|r| context(format!("row id {r}")))?;
        let col = coerce_id(record.get(1), shape.cols, offset)
            .map_err(|r| context(format!("column id {r}")))?;
        cells.push((row * shape.cols + col) as usize);

        for (mapping, column) in mappings.iter().zip(values.iter_mut()) {
            let value = parse_value(record.get(mapping.column)).map_err(&context)?;
            column.push(value);
        }
    }
    Ok(ParsedChunk { cells, values })
}

/// Zero-based index from an id cell: integral, finite and inside `0..limit`
fn coerce_id(raw: Option<&str>, limit: u64, offset: u64) -> std::result::Result<u64, String> {
    let raw = raw.ok_or_else(|| "is missing".to_string())?.trim();
    let id: f64 = raw.parse().map_err(|_| format!("'{raw}' is not a number"))?;
    if !id.is_finite() || id.fract() != 0.0 {
        return Err(format!("'{raw}' is not an integer"));
    }
    let index = id - offset as f64;
    if index < 0.0 || index >= limit as f64 {
        return Err(format!("'{raw}' is out of range for a dimension of {limit}"));
    }
    Ok(index as u64)
}

/// Numeric cell value; an empty cell is missing data
fn parse_value(raw: Option<&str>) -> std::result::Result<f64, String> {
    let raw = raw.ok_or_else(|| "value column is missing".to_string())?.trim();
    if raw.is_empty() {
        return Ok(f64::NAN);
    }
    raw.parse().map_err(|_| format!("value '{raw}' is not a number"))
}

/// Destination matrix open for in-place chunk writes
struct Target {
    name: String,
    data_type: DataType,
    writer: EntryWriter,
    /// The file may hold bytes of the current chunk
    dirty: bool,
}

impl Target {
    fn preimage(&self, cells: &[usize]) -> Result<Preimage> {
        Preimage::capture(&self.name, self.writer.payload(), cells, self.data_type.size_bytes())
    }

    fn scatter(&mut self, cells: &[usize], values: &[f64]) -> Result<()> {
        let data_type = self.data_type;
        let size = data_type.size_bytes();
        self.dirty = self.writer.is_mapped();
        let payload = self.writer.payload_mut();
        for (&cell, &value) in cells.iter().zip(values) {
            let start = cell * size;
            data_type.encode_f64(value, &mut payload[start..start + size]);
        }
        self.writer.flush()?;
        self.dirty = true;
        Ok(())
    }

    /// Put back the bytes the chunk overwrote
    fn undo(&mut self, cells: &[usize], preimage: &Preimage) -> Result<()> {
        preimage.restore(self.writer.payload_mut(), cells)?;
        if self.dirty {
            self.writer.flush()?;
            self.dirty = false;
        }
        Ok(())
    }
}

impl OpenMatrix {
    /// Stream a table into 2-D matrices, committing every chunk
    ///
    /// Destinations that do not exist are created blank with
    /// `config.default_type`. Every destination must have exactly the
    /// container shape. When a chunk fails, the chunks before it stay
    /// committed and nothing of the failing chunk remains in any
    /// destination, even if the process dies mid-chunk.
    pub fn import_table<S: TableSource + ?Sized>(
        &mut self,
        source: &mut S,
        config: &ImportConfig,
    ) -> Result<ImportSummary> {
        self.ensure_writable()?;
        if journal::recover(&self.root)? {
            self.reload_matrices()?;
        }
        let (shape, mappings) = self.discover(source, config)?;

        self.existing_destination_types(&mappings)?;
        let mut targets = Vec::with_capacity(mappings.len());
        for mapping in &mappings {
            let handle = self.create_blank(&mapping.destination, config.default_type, &[])?;
            let entry = EntryFile::open(self.entry_path(EntryKind::Matrix, handle.name()))?;
            targets.push(Target {
                name: mapping.destination.clone(),
                data_type: handle.data_type(),
                writer: entry.writer()?,
                dirty: false,
            });
        }
        info!(
            phase = %ImportPhase::Ensuring,
            destinations = targets.len(),
            "import destinations ready"
        );

        let mut summary = ImportSummary {
            chunks: 0,
            records: 0,
            destinations: mappings.iter().map(|m| m.destination.clone()).collect(),
        };
        let result = self.stream_chunks(source, config, shape, &mappings, &mut targets, &mut summary);
        if let Err(e) = result {
            warn!(phase = %ImportPhase::Aborted, chunks = summary.chunks, error = %e, "import aborted");
            return Err(e);
        }

        info!(
            phase = %ImportPhase::Finalized,
            chunks = summary.chunks,
            records = summary.records,
            "import finished"
        );
        Ok(summary)
    }

    fn stream_chunks<S: TableSource + ?Sized>(
        &mut self,
        source: &mut S,
        config: &ImportConfig,
        shape: Shape,
        mappings: &[Mapping],
        targets: &mut [Target],
        summary: &mut ImportSummary,
    ) -> Result<()> {
        let mut chunk = 0;
        loop {
            chunk += 1;
            if config.is_cancelled() {
                return Err(Error::aborted(chunk, "cancelled"));
            }
            let Some(records) = source
                .next_chunk(config.chunk_size)
                .map_err(|e| Error::aborted(chunk, e))?
            else {
                return Ok(());
            };
            debug!(phase = %ImportPhase::Streaming, chunk, records = records.len(), "read chunk");

            let ParsedChunk { cells, values } =
                parse_chunk(&records, mappings, shape, config.offset(), chunk)?;
            let preimages = targets
                .iter()
                .map(|target| target.preimage(&cells))
                .collect::<Result<Vec<_>>>()
                .map_err(|e| Error::aborted(chunk, e))?;
            let journal = ChunkJournal {
                chunk: chunk as u64,
                cells,
                preimages,
            };
            journal.write(&self.root).map_err(|e| Error::aborted(chunk, e))?;

            let applied = self.apply_chunk(targets, &journal, &values);
            if applied.is_err() {
                self.roll_back(targets, &journal);
            }
            for target in targets.iter() {
                self.matrices.insert(target.name.clone(), *target.writer.header());
            }
            applied.map_err(|e| Error::aborted(chunk, e))?;

            summary.chunks += 1;
            summary.records += records.len() as u64;
            debug!(
                phase = %ImportPhase::Flushed,
                chunk,
                records = summary.records,
                progress = ?source.progress(),
                "processed chunk"
            );
        }
    }

    /// Write one journaled chunk to every destination and commit it
    fn apply_chunk(
        &self,
        targets: &mut [Target],
        journal: &ChunkJournal,
        values: &[Vec<f64>],
    ) -> Result<()> {
        targets
            .par_iter_mut()
            .zip(values.par_iter())
            .try_for_each(|(target, values)| target.scatter(&journal.cells, values))?;
        self.write_attributes()?;
        journal::clear(&self.root)?;
        for target in targets.iter_mut() {
            target.dirty = false;
        }
        Ok(())
    }

    /// Undo a failed chunk in every destination it reached
    ///
    /// The journal stays on disk when a destination cannot be restored, so
    /// the next writable open finishes the rollback.
    fn roll_back(&self, targets: &mut [Target], journal: &ChunkJournal) {
        let mut restored = true;
        for (target, preimage) in targets.iter_mut().zip(&journal.preimages) {
            if let Err(e) = target.undo(&journal.cells, preimage) {
                warn!(matrix = %target.name, chunk = journal.chunk, error = %e, "chunk rollback failed");
                restored = false;
            }
        }
        if restored {
            if let Err(e) = journal::clear(&self.root) {
                warn!(chunk = journal.chunk, error = %e, "could not remove import journal");
            }
        }
    }

    /// Stream a table into an in-memory cube, then write every slice
    ///
    /// No matrix is touched until the source is exhausted, so a failure
    /// leaves the container unchanged. Existing destinations keep their
    /// element type; new ones use `config.default_type`.
    pub fn import_table_staged<S: TableSource + ?Sized>(
        &mut self,
        source: &mut S,
        config: &ImportConfig,
    ) -> Result<ImportSummary> {
        self.ensure_writable()?;
        let (shape, mappings) = self.discover(source, config)?;
        let existing = self.existing_destination_types(&mappings)?;
        let types: Vec<DataType> = existing
            .iter()
            .map(|t| t.unwrap_or(config.default_type))
            .collect();

        let staging = config.default_type;
        let size = staging.size_bytes();
        let depth = mappings.len();
        let cells = shape
            .cells()
            .and_then(|c| usize::try_from(c).ok())
            .ok_or(Error::Core(CoreError::ArraySizeOverflow))?;
        let cube_len = cells
            .checked_mul(depth)
            .and_then(|n| n.checked_mul(size))
            .ok_or(Error::Core(CoreError::ArraySizeOverflow))?;
        let mut cube = vec![0u8; cube_len];
        info!(
            phase = %ImportPhase::Ensuring,
            destinations = depth,
            staging_bytes = cube_len,
            "staging cube allocated"
        );

        let mut summary = ImportSummary {
            chunks: 0,
            records: 0,
            destinations: mappings.iter().map(|m| m.destination.clone()).collect(),
        };
        let mut chunk = 0;
        loop {
            chunk += 1;
            if config.is_cancelled() {
                warn!(phase = %ImportPhase::Aborted, chunk, "import cancelled");
                return Err(Error::aborted(chunk, "cancelled"));
            }
            let records = match source.next_chunk(config.chunk_size) {
                Ok(Some(records)) => records,
                Ok(None) => break,
                Err(e) => {
                    warn!(phase = %ImportPhase::Aborted, chunk, error = %e, "import aborted");
                    return Err(Error::aborted(chunk, e));
                }
            };

            let parsed = parse_chunk(&records, &mappings, shape, config.offset(), chunk)
                .inspect_err(|e| {
                    warn!(phase = %ImportPhase::Aborted, chunk, error = %e, "import aborted");
                })?;
            for (d, values) in parsed.values.iter().enumerate() {
                for (&cell, &value) in parsed.cells.iter().zip(values) {
                    let start = (cell * depth + d) * size;
                    staging.encode_f64(value, &mut cube[start..start + size]);
                }
            }

            summary.chunks += 1;
            summary.records += records.len() as u64;
            debug!(
                phase = %ImportPhase::Staged,
                chunk,
                records = summary.records,
                progress = ?source.progress(),
                "staged chunk"
            );
        }

        // Slice [:, :, d] of the cube, converted to the destination type
        let slices: Vec<Vec<u8>> = types
            .par_iter()
            .enumerate()
            .map(|(d, data_type)| {
                let out_size = data_type.size_bytes();
                let mut out = vec![0u8; cells * out_size];
                for (cell, slot) in out.chunks_exact_mut(out_size).enumerate() {
                    let start = (cell * depth + d) * size;
                    let value = staging.decode_f64(&cube[start..start + size]);
                    data_type.encode_f64(value, slot);
                }
                out
            })
            .collect();

        let dims = [shape.rows, shape.cols];
        for ((mapping, data_type), payload) in mappings.iter().zip(&types).zip(&slices) {
            self.write_matrix(&mapping.destination, *data_type, &dims, payload, true)?;
        }
        self.write_attributes()?;

        info!(
            phase = %ImportPhase::Finalized,
            chunks = summary.chunks,
            records = summary.records,
            "staged import written"
        );
        Ok(summary)
    }

    fn discover<S: TableSource + ?Sized>(
        &self,
        source: &mut S,
        config: &ImportConfig,
    ) -> Result<(Shape, Vec<Mapping>)> {
        if config.chunk_size == 0 {
            return Err(Error::BadFormat("chunk size must be at least 1".to_string()));
        }
        let shape = self.require_shape("importing a table")?;
        let columns = source.columns()?;
        let mappings = plan(&columns, config)?;

        info!(
            phase = %ImportPhase::Discovering,
            columns = ?columns,
            destinations = mappings.len(),
            %shape,
            "import table discovered"
        );
        Ok((shape, mappings))
    }

    /// Element types of destinations that already exist
    ///
    /// Every existing destination must be a 2-D matrix of the container shape.
    fn existing_destination_types(&self, mappings: &[Mapping]) -> Result<Vec<Option<DataType>>> {
        mappings
            .iter()
            .map(|mapping| match self.matrices.get(&mapping.destination) {
                None => Ok(None),
                Some(header) => {
                    if header.rank != 2 {
                        return Err(self.shape_mismatch(header.dims()));
                    }
                    self.check_leading_dims(header.dims())?;
                    match header.element {
                        ElementType::Numeric(data_type) => Ok(Some(data_type)),
                        ElementType::Label => Err(Error::Core(CoreError::UnsupportedFormat)),
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::DenseArray;
    use crate::config::{ContainerConfig, Mode};
    use omx_core::ErrorCategory;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn container(rows: u64, cols: u64) -> (tempfile::TempDir, OpenMatrix) {
        let dir = tempdir().unwrap();
        let mut omx = OpenMatrix::create(dir.path().join("import.omx")).unwrap();
        omx.set_shape(rows, cols).unwrap();
        (dir, omx)
    }

    fn two_by_two() -> MemorySource {
        MemorySource::new(["o", "d", "time"], [["1", "1", "5"], ["2", "2", "7"]])
    }

    /// Serves the records of `inner`, then fails on chunk `fail_at`
    struct FailingSource {
        inner: MemorySource,
        served: usize,
        fail_at: usize,
    }

    impl TableSource for FailingSource {
        fn columns(&mut self) -> Result<Vec<String>> {
            self.inner.columns()
        }

        fn next_chunk(&mut self, max: usize) -> Result<Option<Vec<StringRecord>>> {
            self.served += 1;
            if self.served == self.fail_at {
                return Err(Error::Io(std::io::Error::other("connection reset")));
            }
            self.inner.next_chunk(max)
        }
    }

    #[test]
    fn test_import_one_record_per_chunk() {
        let (_dir, mut omx) = container(2, 2);
        let config = ImportConfig::default().with_chunk_size(1);

        let summary = omx.import_table(&mut two_by_two(), &config).unwrap();
        assert_eq!(summary.chunks, 2);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.destinations, vec!["time"]);

        let time = omx.matrix::<f32>("time").unwrap();
        assert_eq!(time.as_slice(), &[5.0, 0.0, 0.0, 7.0]);
    }

    #[test]
    fn test_failure_keeps_committed_chunks() {
        let (_dir, mut omx) = container(2, 2);
        let config = ImportConfig::default().with_chunk_size(1);
        let mut source = FailingSource {
            inner: two_by_two(),
            served: 0,
            fail_at: 2,
        };

        let err = omx.import_table(&mut source, &config).unwrap_err();
        assert!(matches!(err, Error::ImportAborted { chunk: 2, .. }));
        assert_eq!(err.category(), ErrorCategory::ImportAborted);

        let time = omx.matrix::<f32>("time").unwrap();
        assert_eq!(time.as_slice(), &[5.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_failed_destination_rolls_back_whole_chunk() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("mixed.omx");
        {
            let mut omx = OpenMatrix::create(&root).unwrap();
            omx.set_shape(2, 2).unwrap();
            omx.create_blank("a", DataType::F32, &[]).unwrap();
        }
        // "a" is mapped in place, "b" is compressed and rewritten on flush
        let config = ContainerConfig::default().with_compression(3);
        let mut omx = OpenMatrix::open_with(&root, config).unwrap();
        omx.create_blank("b", DataType::F32, &[]).unwrap();
        // Rewriting "b" cannot create its temporary file
        std::fs::create_dir(root.join("data").join(".b.omxm.tmp")).unwrap();

        let mut source = MemorySource::new(["o", "d", "a", "b"], [["1", "1", "5", "50"]]);
        let err = omx
            .import_table(&mut source, &ImportConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::ImportAborted { chunk: 1, .. }));

        assert_eq!(omx.matrix::<f32>("a").unwrap().as_slice(), &[0.0; 4]);
        assert_eq!(omx.matrix::<f32>("b").unwrap().as_slice(), &[0.0; 4]);
        assert!(!root.join("import.journal").exists());
        drop(omx);

        let omx = OpenMatrix::open_read(&root).unwrap();
        assert_eq!(omx.matrix::<f32>("a").unwrap().as_slice(), &[0.0; 4]);
        assert_eq!(omx.matrix::<f32>("b").unwrap().as_slice(), &[0.0; 4]);
        drop(omx);
        // A writable open leaves the directory alone
        OpenMatrix::open(&root).unwrap();
    }

    #[test]
    fn test_attribute_write_failure_aborts_chunk() {
        let (dir, mut omx) = container(2, 2);
        let root = dir.path().join("import.omx");
        std::fs::create_dir(root.join(".attributes.json.tmp")).unwrap();

        let err = omx
            .import_table(&mut two_by_two(), &ImportConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::ImportAborted { chunk: 1, .. }));
        assert_eq!(err.category(), ErrorCategory::ImportAborted);
        assert_eq!(omx.matrix::<f32>("time").unwrap().as_slice(), &[0.0; 4]);
    }

    #[test]
    fn test_bad_record_aborts_whole_chunk() {
        let (_dir, mut omx) = container(2, 2);
        let config = ImportConfig::default().with_chunk_size(2);
        let mut source = MemorySource::new(
            ["o", "d", "time"],
            [["1", "1", "5"], ["1", "2", "6"], ["2", "1", "7"], ["2", "x", "8"]],
        );

        let err = omx.import_table(&mut source, &config).unwrap_err();
        assert!(matches!(err, Error::ImportAborted { chunk: 2, .. }));

        // The valid first record of chunk 2 was not applied either
        let time = omx.matrix::<f32>("time").unwrap();
        assert_eq!(time.as_slice(), &[5.0, 6.0, 0.0, 0.0]);
    }

    #[test]
    fn test_id_coercion() {
        assert_eq!(coerce_id(Some("2"), 3, 1), Ok(1));
        assert_eq!(coerce_id(Some(" 3.0 "), 3, 1), Ok(2));
        assert_eq!(coerce_id(Some("0"), 3, 0), Ok(0));
        assert!(coerce_id(Some("0"), 3, 1).is_err());
        assert!(coerce_id(Some("4"), 3, 1).is_err());
        assert!(coerce_id(Some("1.5"), 3, 1).is_err());
        assert!(coerce_id(Some("inf"), 3, 1).is_err());
        assert!(coerce_id(Some("zone"), 3, 1).is_err());
        assert!(coerce_id(None, 3, 1).is_err());

        assert!(parse_value(Some("")).unwrap().is_nan());
        assert_eq!(parse_value(Some("-2.5")), Ok(-2.5));
        assert!(parse_value(Some("n/a")).is_err());
    }

    #[test]
    fn test_zero_based_ids() {
        let (_dir, mut omx) = container(2, 2);
        let config = ImportConfig::default().zero_based();
        let mut source = MemorySource::new(["o", "d", "time"], [["0", "1", "3"]]);

        omx.import_table(&mut source, &config).unwrap();
        assert_eq!(omx.matrix::<f32>("time").unwrap().as_slice(), &[0.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn test_column_map_and_existing_type() {
        let (_dir, mut omx) = container(2, 2);
        omx.put("distance", &DenseArray::<i64>::zeros(vec![2, 2]).unwrap(), false)
            .unwrap();
        let config = ImportConfig::default().with_column_map([("dist", "distance")]);
        let mut source = MemorySource::new(
            ["o", "d", "time", "dist"],
            [["1", "2", "5", "12"], ["2", "1", "7", "21"]],
        );

        let summary = omx.import_table(&mut source, &config).unwrap();
        assert_eq!(summary.destinations, vec!["distance"]);
        assert!(!omx.contains_matrix("time"));
        assert_eq!(omx.matrix::<i64>("distance").unwrap().as_slice(), &[0, 12, 21, 0]);
    }

    #[test]
    fn test_plan_errors() {
        let (_dir, mut omx) = container(2, 2);
        let mut narrow = MemorySource::new(["o", "d"], [["1", "1"]]);
        assert!(matches!(
            omx.import_table(&mut narrow, &ImportConfig::default()),
            Err(Error::BadFormat(_))
        ));

        let config = ImportConfig::default().with_column_map([("o", "origin")]);
        assert!(matches!(
            omx.import_table(&mut two_by_two(), &config),
            Err(Error::BadFormat(_))
        ));

        let config = ImportConfig::default().with_column_map([("time", "m"), ("time", "m")]);
        assert!(matches!(
            omx.import_table(&mut two_by_two(), &config),
            Err(Error::BadFormat(_))
        ));
        assert!(omx.matrix_names().is_empty());
    }

    #[test]
    fn test_import_requires_shape() {
        let dir = tempdir().unwrap();
        let mut omx = OpenMatrix::create(dir.path()).unwrap();
        let err = omx
            .import_table(&mut two_by_two(), &ImportConfig::default())
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::BadFormat);
    }

    #[test]
    fn test_destination_shape_checked_before_writes() {
        let (_dir, mut omx) = container(2, 2);
        omx.create_blank("time", DataType::F32, &[3]).unwrap();
        let mut source = MemorySource::new(["o", "d", "cost", "time"], [["1", "1", "1", "2"]]);

        let err = omx
            .import_table(&mut source, &ImportConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::IncompatibleShape { .. }));
        assert!(!omx.contains_matrix("cost"));
    }

    #[test]
    fn test_cancelled_import() {
        let (_dir, mut omx) = container(2, 2);
        let flag = Arc::new(AtomicBool::new(true));
        let config = ImportConfig::default().with_cancel_flag(flag);

        let err = omx.import_table(&mut two_by_two(), &config).unwrap_err();
        assert!(matches!(err, Error::ImportAborted { chunk: 1, .. }));
        let err = omx
            .import_table_staged(&mut two_by_two(), &config)
            .unwrap_err();
        assert!(matches!(err, Error::ImportAborted { chunk: 1, .. }));
    }

    #[test]
    fn test_staged_import_two_columns() {
        let (_dir, mut omx) = container(2, 2);
        let config = ImportConfig::default().with_chunk_size(1);
        let mut source = MemorySource::new(
            ["o", "d", "time", "cost"],
            [["1", "1", "5", "50"], ["2", "2", "7", "70"]],
        );

        let summary = omx.import_table_staged(&mut source, &config).unwrap();
        assert_eq!(summary.chunks, 2);
        assert_eq!(summary.destinations, vec!["time", "cost"]);
        assert_eq!(omx.matrix::<f32>("time").unwrap().as_slice(), &[5.0, 0.0, 0.0, 7.0]);
        assert_eq!(omx.matrix::<f32>("cost").unwrap().as_slice(), &[50.0, 0.0, 0.0, 70.0]);
    }

    #[test]
    fn test_staged_failure_writes_nothing() {
        let (_dir, mut omx) = container(2, 2);
        let config = ImportConfig::default().with_chunk_size(1);
        let mut source = FailingSource {
            inner: MemorySource::new(
                ["o", "d", "time", "cost"],
                [["1", "1", "5", "50"], ["2", "2", "7", "70"]],
            ),
            served: 0,
            fail_at: 2,
        };

        let err = omx.import_table_staged(&mut source, &config).unwrap_err();
        assert!(matches!(err, Error::ImportAborted { chunk: 2, .. }));
        assert!(omx.matrix_names().is_empty());
    }

    #[test]
    fn test_staged_import_keeps_existing_type() {
        let (_dir, mut omx) = container(2, 2);
        omx.put("time", &DenseArray::from_rows(&[[9u32, 9], [9, 9]]).unwrap(), false)
            .unwrap();

        let config = ImportConfig::default().with_default_type(DataType::F64);
        omx.import_table_staged(&mut two_by_two(), &config).unwrap();

        let handle = omx.get("time").unwrap();
        assert_eq!(handle.data_type(), DataType::U32);
        // Overwritten, not merged
        assert_eq!(omx.matrix::<u32>("time").unwrap().as_slice(), &[5, 0, 0, 7]);
    }

    #[test]
    fn test_csv_import_into_compressed_container() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("skims.csv");
        std::fs::write(&csv_path, "o,d,time,cost\n1,1,5,\n2,2,7,1.25\n").unwrap();

        let config = ContainerConfig::default()
            .with_mode(Mode::Create)
            .with_compression(5);
        let mut omx = OpenMatrix::open_with(dir.path().join("skims.omx"), config).unwrap();
        omx.set_shape(2, 2).unwrap();

        let mut source = CsvSource::from_path(&csv_path).unwrap();
        let import = ImportConfig::default()
            .with_chunk_size(1)
            .with_default_type(DataType::F64);
        omx.import_table(&mut source, &import).unwrap();
        drop(omx);

        let omx = OpenMatrix::open_read(dir.path().join("skims.omx")).unwrap();
        assert_eq!(omx.matrix::<f64>("time").unwrap().as_slice(), &[5.0, 0.0, 0.0, 7.0]);
        let cost = omx.matrix::<f64>("cost").unwrap();
        assert!(cost.as_slice()[0].is_nan());
        assert_eq!(cost.as_slice()[3], 1.25);
    }
}
