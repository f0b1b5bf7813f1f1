use std::fmt::Display;
use std::str::FromStr;

use indexmap::IndexMap;
use log::debug;

use crate::error::{MetadataError, Result};
use crate::path::StoragePath;

use super::image::TileIndex;

/// What a dataset represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DatasetKind {
    Mosaic,
    Stack,
    Single,
}

/// How a dataset is laid out on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StorageKind {
    /// A single file container holding the full dataset
    Single,
    /// A directory hierarchy
    Tree,
    /// A sequence of files
    Sequence,
}

impl FromStr for DatasetKind {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mosaic" => Ok(Self::Mosaic),
            "stack" => Ok(Self::Stack),
            "single" => Ok(Self::Single),
            _ => Err(MetadataError::Configuration(format!(
                "Illegal dataset type: {s}"
            ))),
        }
    }
}

impl FromStr for StorageKind {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single" => Ok(Self::Single),
            "tree" => Ok(Self::Tree),
            "sequence" => Ok(Self::Sequence),
            _ => Err(MetadataError::Configuration(format!(
                "Illegal storage type: {s}"
            ))),
        }
    }
}

impl Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Mosaic => "mosaic",
            Self::Stack => "stack",
            Self::Single => "single",
        };
        f.write_str(s)
    }
}

impl Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Single => "single",
            Self::Tree => "tree",
            Self::Sequence => "sequence",
        };
        f.write_str(s)
    }
}

/// A value stored in a dataset's or experiment's supplementary annotations
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SupplementValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Tile(TileIndex),
}

impl SupplementValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_tile(&self) -> Option<&TileIndex> {
        match self {
            Self::Tile(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for SupplementValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<usize> for SupplementValue {
    fn from(value: usize) -> Self {
        Self::Integer(value as i64)
    }
}

impl From<f64> for SupplementValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for SupplementValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for SupplementValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<TileIndex> for SupplementValue {
    fn from(value: TileIndex) -> Self {
        Self::Tile(value)
    }
}

/// Ordered auxiliary annotations, keys are unique and keep their insertion position
pub type Supplement = IndexMap<String, SupplementValue>;

/// The most generic dataset description, shared by images and mosaics.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DatasetDescriptor {
    pub kind: DatasetKind,
    pub storage_kind: StorageKind,
    pub storage: StoragePath,
    pub supplement: Supplement,
}

impl DatasetDescriptor {
    pub fn new(kind: DatasetKind, storage_kind: StorageKind, storage: StoragePath) -> Result<Self> {
        debug!("Creating a {kind} dataset with {storage_kind} storage at {storage}");
        if storage_kind == StorageKind::Single && storage.filename.is_empty() {
            return Err(MetadataError::Configuration(format!(
                "File name missing for storage type 'single': {:?}",
                storage.original
            )));
        }
        Ok(Self {
            kind,
            storage_kind,
            storage,
            supplement: Supplement::new(),
        })
    }

    /// Build a descriptor from the textual kind names used in configuration
    pub fn from_names(kind: &str, storage_kind: &str, path: &str) -> Result<Self> {
        Self::new(kind.parse()?, storage_kind.parse()?, StoragePath::parse(path))
    }

    pub fn supplement_value(&self, key: &str) -> Option<&SupplementValue> {
        self.supplement.get(key)
    }

    pub fn set_supplement<V: Into<SupplementValue>>(&mut self, key: &str, value: V) {
        self.supplement.insert(key.to_string(), value.into());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_valid_combinations() {
        let kinds = [DatasetKind::Mosaic, DatasetKind::Stack, DatasetKind::Single];
        let storages = [StorageKind::Single, StorageKind::Tree, StorageKind::Sequence];
        for kind in kinds {
            for storage_kind in storages {
                let ds = DatasetDescriptor::new(kind, storage_kind, StoragePath::parse("/d/f.oif"));
                assert!(ds.is_ok(), "{kind} / {storage_kind}");
                let ds = DatasetDescriptor::new(kind, storage_kind, StoragePath::parse("/d/"));
                if storage_kind == StorageKind::Single {
                    assert!(matches!(ds, Err(MetadataError::Configuration(_))));
                } else {
                    assert!(ds.is_ok());
                }
            }
        }
    }

    #[test]
    fn test_from_names() {
        let ds = DatasetDescriptor::from_names("stack", "tree", "/d/f.oib").unwrap();
        assert_eq!(ds.kind, DatasetKind::Stack);
        assert_eq!(ds.storage_kind, StorageKind::Tree);

        assert!(matches!(
            DatasetDescriptor::from_names("volume", "tree", "/d/f.oib"),
            Err(MetadataError::Configuration(_))
        ));
        assert!(matches!(
            DatasetDescriptor::from_names("stack", "archive", "/d/f.oib"),
            Err(MetadataError::Configuration(_))
        ));
    }

    #[test]
    fn test_supplement_order() {
        let mut ds = DatasetDescriptor::from_names("mosaic", "tree", "/d/matl.omp2info").unwrap();
        ds.set_supplement("oid", "abc");
        ds.set_supplement("index", 2usize);
        ds.set_supplement("oid", "def");
        let keys: Vec<_> = ds.supplement.keys().map(String::as_str).collect();
        assert_eq!(keys, ["oid", "index"]);
        assert_eq!(ds.supplement_value("oid").and_then(|v| v.as_str()), Some("def"));
        assert_eq!(ds.supplement_value("index").and_then(|v| v.as_integer()), Some(2));
    }
}
