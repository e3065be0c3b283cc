//! Open containers: root attributes, shape and entry registries
//!
//! A container is a directory holding `attributes.json`, one file per matrix
//! under `data/` and one file per lookup under `lookup/`. [`OpenMatrix`]
//! keeps the parsed root attributes, the [`ShapeRegistry`] and a registry of
//! entry headers for each kind. Matrix, lookup and import operations live in
//! their own modules as further `impl OpenMatrix` blocks.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hashbrown::HashMap;
use omx_core::{
    validate_entry_name, ElementType, EntryHeader, EntryKind, RootAttributes, Shape, ShapeRegistry,
};
use tracing::{debug, info, warn};

use crate::config::{ContainerConfig, Mode};
use crate::error::{Error, Result};
use crate::import::journal;
use crate::lookup::ReverseLookup;
use crate::storage::{self, EntryFile};

pub(crate) const ATTRIBUTES_FILE: &str = "attributes.json";
pub(crate) const MATRIX_DIR: &str = "data";
pub(crate) const LOOKUP_DIR: &str = "lookup";
pub(crate) const MATRIX_EXT: &str = "omxm";
pub(crate) const LOOKUP_EXT: &str = "omxl";

/// An open matrix container
#[derive(Debug)]
pub struct OpenMatrix {
    pub(crate) root: PathBuf,
    pub(crate) config: ContainerConfig,
    pub(crate) attributes: RootAttributes,
    pub(crate) shape: ShapeRegistry,
    pub(crate) matrices: BTreeMap<String, EntryHeader>,
    pub(crate) lookups: BTreeMap<String, EntryHeader>,
    pub(crate) reverse_cache: HashMap<String, Arc<ReverseLookup>>,
}

impl OpenMatrix {
    /// Open a container for appending, creating it if the directory holds none
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, ContainerConfig::default())
    }

    /// Open an existing container read-only
    pub fn open_read<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, ContainerConfig::read_only())
    }

    /// Create an empty container, discarding any container already at `path`
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, ContainerConfig::default().with_mode(Mode::Create))
    }

    /// Open with an explicit configuration
    pub fn open_with<P: AsRef<Path>>(path: P, config: ContainerConfig) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let exists = root.join(ATTRIBUTES_FILE).is_file();

        match config.mode {
            Mode::Read if !exists => Err(Error::BadFormat(format!(
                "{} is not an omx container",
                root.display()
            ))),
            Mode::Read | Mode::Append if exists => Self::load(root, config),
            _ => Self::initialize(root, config, exists),
        }
    }

    fn initialize(root: PathBuf, config: ContainerConfig, exists: bool) -> Result<Self> {
        if exists {
            for dir in [MATRIX_DIR, LOOKUP_DIR] {
                let path = root.join(dir);
                if path.exists() {
                    fs::remove_dir_all(&path)?;
                }
            }
            journal::clear(&root)?;
        } else if root.is_dir() && fs::read_dir(&root)?.next().is_some() {
            return Err(Error::BadFormat(format!(
                "{} is not empty and holds no omx container",
                root.display()
            )));
        }

        fs::create_dir_all(root.join(MATRIX_DIR))?;
        fs::create_dir_all(root.join(LOOKUP_DIR))?;

        let container = Self {
            root,
            config,
            attributes: RootAttributes::new(),
            shape: ShapeRegistry::Unset,
            matrices: BTreeMap::new(),
            lookups: BTreeMap::new(),
            reverse_cache: HashMap::new(),
        };
        container.write_attributes()?;
        storage::sync_dir(&container.root)?;

        info!(
            path = %container.root.display(),
            version = %container.attributes.version,
            codec = %container.config.codec,
            "created omx container"
        );
        Ok(container)
    }

    fn load(root: PathBuf, config: ContainerConfig) -> Result<Self> {
        let bytes = fs::read(root.join(ATTRIBUTES_FILE))?;
        let attributes: RootAttributes = serde_json::from_slice(&bytes)?;
        let shape = ShapeRegistry::from_attribute(attributes.shape).map_err(|e| {
            Error::BadFormat(format!("SHAPE {:?} is invalid: {e}", attributes.shape))
        })?;

        let writable = config.mode.is_writable();
        if writable {
            storage::remove_stale_temp_files(&root)?;
            journal::recover(&root)?;
        } else if journal::pending(&root) {
            return Err(Error::BadFormat(format!(
                "{} holds an unfinished import; open it writable to roll it back",
                root.display()
            )));
        }
        let matrices = load_registry(&root.join(MATRIX_DIR), MATRIX_EXT, EntryKind::Matrix, writable)?;
        let lookups = load_registry(&root.join(LOOKUP_DIR), LOOKUP_EXT, EntryKind::Lookup, writable)?;

        let mut container = Self {
            root,
            config,
            attributes,
            shape,
            matrices,
            lookups,
            reverse_cache: HashMap::new(),
        };
        container.repair_shape()?;

        info!(
            path = %container.root.display(),
            version = %container.attributes.version,
            shape = ?container.shape(),
            matrices = container.matrices.len(),
            lookups = container.lookups.len(),
            mode = ?container.config.mode,
            "opened omx container"
        );
        Ok(container)
    }

    /// Adopt the shape of the first matrix when the attribute was never set
    fn repair_shape(&mut self) -> Result<()> {
        if self.shape.is_set() {
            return Ok(());
        }
        let Some((name, header)) = self.matrices.iter().next() else {
            return Ok(());
        };
        let (rows, cols) = header.leading_dims().ok_or_else(|| {
            Error::BadFormat(format!("matrix '{name}' has fewer than two dimensions"))
        })?;
        let shape = Shape::new(rows, cols)
            .map_err(|e| Error::BadFormat(format!("matrix '{name}': {e}")))?;

        warn!(matrix = %name, %shape, "container shape unset; adopting shape of first matrix");
        self.shape = ShapeRegistry::Set(shape);
        if self.config.mode.is_writable() {
            self.write_attributes()?;
        }
        Ok(())
    }

    /// Container directory
    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Format version recorded in the container
    pub fn version(&self) -> &str {
        &self.attributes.version
    }

    /// Shared `(rows, cols)`, `(0, 0)` until established
    pub fn shape(&self) -> (u64, u64) {
        self.shape.dims()
    }

    pub fn shape_registry(&self) -> ShapeRegistry {
        self.shape
    }

    /// Establish the container shape
    ///
    /// Succeeds when no matrix exists yet or when the shape is unchanged.
    /// A new shape must also keep every existing lookup aligned with one of
    /// its dimensions.
    pub fn set_shape(&mut self, rows: u64, cols: u64) -> Result<()> {
        self.ensure_writable()?;
        let proposed = Shape::new(rows, cols)
            .map_err(|e| Error::BadFormat(format!("shape ({rows}, {cols}): {e}")))?;
        self.establish_shape(proposed)
    }

    /// Move the registry to `proposed` and persist it
    pub(crate) fn establish_shape(&mut self, proposed: Shape) -> Result<()> {
        let next = self
            .shape
            .propose(proposed, !self.matrices.is_empty())
            .map_err(|_| self.shape_mismatch(&[proposed.rows, proposed.cols]))?;
        if next == self.shape {
            return Ok(());
        }

        if let Some((name, header)) = self
            .lookups
            .iter()
            .find(|(_, header)| !proposed.accepts_lookup_len(header.dims()[0]))
        {
            warn!(lookup = %name, len = header.dims()[0], %proposed, "shape would orphan lookup");
            return Err(self.shape_mismatch(&[proposed.rows, proposed.cols]));
        }

        self.shape = next;
        self.write_attributes()?;
        info!(shape = %proposed, "container shape set");
        Ok(())
    }

    pub(crate) fn shape_mismatch(&self, found: &[u64]) -> Error {
        Error::IncompatibleShape {
            expected: self.shape.dims(),
            found: found.to_vec(),
        }
    }

    /// The established shape, or `BadFormat`
    pub(crate) fn require_shape(&self, operation: &str) -> Result<Shape> {
        self.shape.require().map_err(|_| {
            Error::BadFormat(format!("container shape must be set before {operation}"))
        })
    }

    /// Persist the root attributes durably
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_writable()?;
        self.write_attributes()
    }

    pub(crate) fn write_attributes(&self) -> Result<()> {
        let attributes = RootAttributes {
            version: self.attributes.version.clone(),
            shape: self.shape.to_attribute(),
        };
        let bytes = serde_json::to_vec_pretty(&attributes)?;
        storage::write_atomic(&self.root.join(ATTRIBUTES_FILE), &bytes)?;
        Ok(())
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.config.mode.is_writable() {
            Ok(())
        } else {
            Err(Error::ReadOnly)
        }
    }

    /// Names of all matrices, sorted
    pub fn matrix_names(&self) -> Vec<String> {
        self.matrices.keys().cloned().collect()
    }

    /// Names of all lookups, sorted
    pub fn lookup_names(&self) -> Vec<String> {
        self.lookups.keys().cloned().collect()
    }

    pub fn contains_matrix(&self, name: &str) -> bool {
        self.matrices.contains_key(name)
    }

    pub fn contains_lookup(&self, name: &str) -> bool {
        self.lookups.contains_key(name)
    }

    pub fn matrix_count(&self) -> usize {
        self.matrices.len()
    }

    pub(crate) fn entry_path(&self, kind: EntryKind, name: &str) -> PathBuf {
        entry_path_in(&self.root, kind, name)
    }

    /// Reread the matrix registry after entries changed behind it
    pub(crate) fn reload_matrices(&mut self) -> Result<()> {
        self.matrices = load_registry(&self.root.join(MATRIX_DIR), MATRIX_EXT, EntryKind::Matrix, true)?;
        Ok(())
    }
}

pub(crate) fn entry_path_in(root: &Path, kind: EntryKind, name: &str) -> PathBuf {
    match kind {
        EntryKind::Matrix => root.join(MATRIX_DIR).join(format!("{name}.{MATRIX_EXT}")),
        EntryKind::Lookup => root.join(LOOKUP_DIR).join(format!("{name}.{LOOKUP_EXT}")),
    }
}

/// Validate an entry name before any mutation
pub(crate) fn check_name(name: &str) -> Result<()> {
    validate_entry_name(name).map_err(|_| Error::InvalidName(name.to_string()))
}

fn load_registry(
    dir: &Path,
    extension: &str,
    kind: EntryKind,
    writable: bool,
) -> Result<BTreeMap<String, EntryHeader>> {
    let mut registry = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(registry);
    }
    if writable {
        storage::remove_stale_temp_files(dir)?;
    }

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if validate_entry_name(name).is_err() {
            debug!(file = %path.display(), "skipping file with invalid entry name");
            continue;
        }

        let entry = EntryFile::open(&path)?;
        let header = entry.header();
        let numeric_matrix = kind == EntryKind::Lookup || header.element != ElementType::Label;
        if header.kind != kind || !numeric_matrix {
            return Err(Error::BadFormat(format!(
                "{} does not hold a {kind} entry",
                path.display()
            )));
        }
        registry.insert(name.to_string(), *entry.header());
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::DenseArray;
    use omx_core::{DataType, ErrorCategory};
    use tempfile::tempdir;

    #[test]
    fn test_create_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("skims.omx");

        {
            let mut omx = OpenMatrix::create(&path).unwrap();
            assert_eq!(omx.shape(), (0, 0));
            assert_eq!(omx.version(), "0.2");
            omx.set_shape(3, 4).unwrap();
        }

        let omx = OpenMatrix::open_read(&path).unwrap();
        assert_eq!(omx.shape(), (3, 4));
        assert!(omx.matrix_names().is_empty());
    }

    #[test]
    fn test_attributes_file_layout() {
        let dir = tempdir().unwrap();
        let mut omx = OpenMatrix::create(dir.path()).unwrap();
        omx.set_shape(2, 5).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(dir.path().join(ATTRIBUTES_FILE)).unwrap()).unwrap();
        assert_eq!(raw["VERSION"], "0.2");
        assert_eq!(raw["SHAPE"], serde_json::json!([2, 5]));
    }

    #[test]
    fn test_read_mode_requires_container() {
        let dir = tempdir().unwrap();
        let err = OpenMatrix::open_read(dir.path()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::BadFormat);
    }

    #[test]
    fn test_create_refuses_foreign_directory() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        assert!(matches!(OpenMatrix::create(dir.path()), Err(Error::BadFormat(_))));
    }

    #[test]
    fn test_create_truncates_existing_container() {
        let dir = tempdir().unwrap();
        {
            let mut omx = OpenMatrix::create(dir.path()).unwrap();
            omx.put("time", &DenseArray::from_rows(&[[1.0f32, 2.0]]).unwrap(), false)
                .unwrap();
        }

        let omx = OpenMatrix::create(dir.path()).unwrap();
        assert_eq!(omx.shape(), (0, 0));
        assert!(omx.matrix_names().is_empty());
    }

    #[test]
    fn test_read_only_rejects_mutation() {
        let dir = tempdir().unwrap();
        OpenMatrix::create(dir.path()).unwrap();

        let mut omx = OpenMatrix::open_read(dir.path()).unwrap();
        assert!(matches!(omx.set_shape(2, 2), Err(Error::ReadOnly)));
        assert!(matches!(omx.flush(), Err(Error::ReadOnly)));
    }

    #[test]
    fn test_set_shape_rules() {
        let dir = tempdir().unwrap();
        let mut omx = OpenMatrix::create(dir.path()).unwrap();

        assert!(matches!(omx.set_shape(0, 5), Err(Error::BadFormat(_))));

        omx.set_shape(3, 3).unwrap();
        // No matrices yet, so the shape can still move
        omx.set_shape(2, 2).unwrap();
        omx.create_blank("zeros", DataType::F64, &[]).unwrap();

        omx.set_shape(2, 2).unwrap();
        let err = omx.set_shape(3, 3).unwrap_err();
        assert!(matches!(
            err,
            Error::IncompatibleShape { expected: (2, 2), ref found } if found == &[3, 3]
        ));
    }

    #[test]
    fn test_set_shape_keeps_lookups_aligned() {
        let dir = tempdir().unwrap();
        let mut omx = OpenMatrix::create(dir.path()).unwrap();
        omx.set_shape(3, 3).unwrap();
        omx.add_lookup("zones", vec![1i64, 2, 3]).unwrap();

        assert!(matches!(
            omx.set_shape(4, 4),
            Err(Error::IncompatibleShape { .. })
        ));
        omx.set_shape(3, 5).unwrap();
        assert_eq!(omx.shape(), (3, 5));
    }

    #[test]
    fn test_lazy_shape_repair() {
        let dir = tempdir().unwrap();
        {
            let mut omx = OpenMatrix::create(dir.path()).unwrap();
            omx.put("dist", &DenseArray::from_rows(&[[1u32, 2, 3], [4, 5, 6]]).unwrap(), false)
                .unwrap();
        }
        // Simulate a container whose SHAPE attribute was never written
        storage::write_atomic(
            &dir.path().join(ATTRIBUTES_FILE),
            br#"{"VERSION": "0.2", "SHAPE": [0, 0]}"#,
        )
        .unwrap();

        let omx = OpenMatrix::open_read(dir.path()).unwrap();
        assert_eq!(omx.shape(), (2, 3));

        // Writable opens persist the repaired shape
        OpenMatrix::open(dir.path()).unwrap();
        let raw: RootAttributes =
            serde_json::from_slice(&fs::read(dir.path().join(ATTRIBUTES_FILE)).unwrap()).unwrap();
        assert_eq!(raw.shape, [2, 3]);
    }

    #[test]
    fn test_stale_temp_files_are_ignored_and_removed() {
        let dir = tempdir().unwrap();
        OpenMatrix::create(dir.path()).unwrap();
        let stale = dir.path().join(MATRIX_DIR).join(".time.omxm.tmp");
        fs::write(&stale, b"partial").unwrap();

        let omx = OpenMatrix::open(dir.path()).unwrap();
        assert!(omx.matrix_names().is_empty());
        assert!(!stale.exists());
    }
}
