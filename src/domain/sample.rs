// ============================================================
// Layer 3 — Sample and ClassTable
// ============================================================
// A Sample is one image file paired with the id of the class
// directory it was found in. The ClassTable fixes which id
// belongs to which class name.
//
// Ids are dense, in [0, num_classes), and assigned in the order
// the class directories were first observed. Once a table has
// been established for an output directory it is persisted and
// reused, so label ids never shift between runs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One indexed image file. Immutable once indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Location of the image on disk
    pub path: PathBuf,

    /// Index into the ClassTable
    pub class_id: usize,
}

impl Sample {
    pub fn new(path: impl Into<PathBuf>, class_id: usize) -> Self {
        Self { path: path.into(), class_id }
    }
}

/// Mapping from class-directory name to dense integer id.
///
/// The id of a class is its position in `names`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassTable {
    names: Vec<String>,
}

impl ClassTable {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Class name for an id, if the id is in range
    pub fn name(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    /// Id for a class name, if the class is known
    pub fn id(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// True when both tables contain the same class names,
    /// regardless of the order they were listed in.
    pub fn same_classes(&self, other_names: &[String]) -> bool {
        let mut ours: Vec<&String> = self.names.iter().collect();
        let mut theirs: Vec<&String> = other_names.iter().collect();
        ours.sort();
        theirs.sort();
        ours == theirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_follow_listing_order() {
        let table = ClassTable::new(vec!["zebra".into(), "apple".into()]);
        assert_eq!(table.id("zebra"), Some(0));
        assert_eq!(table.id("apple"), Some(1));
        assert_eq!(table.name(1), Some("apple"));
        assert_eq!(table.name(2), None);
    }

    #[test]
    fn test_same_classes_ignores_order() {
        let table = ClassTable::new(vec!["a".into(), "b".into()]);
        assert!(table.same_classes(&["b".to_string(), "a".to_string()]));
        assert!(!table.same_classes(&["a".to_string()]));
    }
}
