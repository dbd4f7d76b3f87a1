// ============================================================
// Layer 4 — Dataset Index
// ============================================================
// Scans the dataset root once:
//
//   root/
//     cats/           → class 0 (first directory observed)
//       a.bmp
//       nested/b.bmp  → deeper nesting is flattened into the class
//     dogs/           → class 1
//       c.bmp
//       notes.txt     → wrong extension, silently skipped
//
// Class ids follow the order the directory listing is observed.
// When a ClassTable has already been persisted for a run, it is
// passed back in so the ids never change.
//
// Files inside each class are walked with walkdir, sorted by
// file name, so the raw sample order is stable across runs.
// The raw order still means nothing on its own: the batch stream
// always shuffles before emitting.

use std::{
    fs,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

use crate::domain::error::PipelineError;
use crate::domain::sample::{ClassTable, Sample};

/// Non-fatal findings while indexing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexWarning {
    /// A class directory without a single qualifying file
    EmptyClass { class_id: usize, name: String },
}

/// Result of one scan of the dataset root
#[derive(Debug, Clone)]
pub struct IndexedDataset {
    pub classes:  ClassTable,
    pub samples:  Vec<Sample>,
    pub warnings: Vec<IndexWarning>,
}

impl IndexedDataset {
    /// Number of samples indexed for one class
    pub fn class_count(&self, class_id: usize) -> usize {
        self.samples.iter().filter(|s| s.class_id == class_id).count()
    }
}

pub struct DatasetIndex {
    root: PathBuf,

    /// File name suffix including the dot, e.g. ".bmp"
    suffix: String,
}

impl DatasetIndex {
    /// `extension` may be given with or without its leading dot
    pub fn new(root: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            root:   root.into(),
            suffix: format!(".{}", extension.trim_start_matches('.')),
        }
    }

    /// Index the dataset, assigning fresh class ids in listing order
    pub fn build(&self) -> Result<IndexedDataset, PipelineError> {
        let names = self.class_dirs()?;
        self.index(ClassTable::new(names))
    }

    /// Index the dataset against a previously persisted ClassTable.
    /// The set of class directories must be exactly the table's.
    pub fn build_with_classes(&self, classes: ClassTable) -> Result<IndexedDataset, PipelineError> {
        let found = self.class_dirs()?;
        if !classes.same_classes(&found) {
            return Err(PipelineError::ClassTableMismatch {
                root:     self.root.clone(),
                expected: classes.names().to_vec(),
                found,
            });
        }
        self.index(classes)
    }

    /// Names of the immediate subdirectories of root, in listing order.
    /// Fails with DatasetEmpty when there are none.
    fn class_dirs(&self) -> Result<Vec<String>, PipelineError> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| PipelineError::io(&self.root, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PipelineError::io(&self.root, e))?;
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        if names.is_empty() {
            return Err(PipelineError::DatasetEmpty { root: self.root.clone() });
        }
        Ok(names)
    }

    fn index(&self, classes: ClassTable) -> Result<IndexedDataset, PipelineError> {
        let mut samples  = Vec::new();
        let mut warnings = Vec::new();

        for (class_id, name) in classes.names().iter().enumerate() {
            let dir    = self.root.join(name);
            let before = samples.len();

            for path in self.walk_class(&dir)? {
                samples.push(Sample::new(path, class_id));
            }

            let found = samples.len() - before;
            if found == 0 {
                tracing::warn!("Class '{}' (id {}) has no '{}' files", name, class_id, self.suffix);
                warnings.push(IndexWarning::EmptyClass { class_id, name: name.clone() });
            } else {
                tracing::debug!("Class '{}' (id {}): {} samples", name, class_id, found);
            }
        }

        tracing::info!(
            "Indexed {} samples across {} classes under '{}'",
            samples.len(),
            classes.len(),
            self.root.display()
        );

        Ok(IndexedDataset { classes, samples, warnings })
    }

    /// Every qualifying file below `dir`, sorted by file name per directory
    fn walk_class(&self, dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        let mut paths = Vec::new();

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                PipelineError::io(path, e.into())
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let qualifies = entry
                .file_name()
                .to_str()
                .map(|name| name.ends_with(&self.suffix))
                .unwrap_or(false);

            if qualifies {
                paths.push(entry.into_path());
            }
        }

        Ok(paths)
    }
}
