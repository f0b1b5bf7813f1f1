//! Experiments: the datasets described by one project file, and the readers that
//! assemble them from FluoView project descriptions.
//!
//! FluoView writes one project file per tiled acquisition, which references the
//! individual tile images and their grid positions. Two generations of the project
//! format are supported:
//!
//! - [`FluoView3kMosaic`] reads the `matl.omp2info` files of FluoView 3000, whose
//!   tiles are OIR files
//! - [`FluoViewMosaic`] reads the older `MATL_Mosaic.log` files, whose tiles are OIF
//!   or OIB files
//!
//! Both produce a [`MosaicExperiment`]. A mosaic with a broken or missing tile is
//! dropped from the experiment and reported through [`Diagnostics`], while a project
//! file that does not match the expected schema, or references tiles of an
//! unsupported format, fails the whole read.
use std::ops::Index;
use std::path::Path;
use std::slice;

use log::debug;

use crate::dataset::{MosaicCuboidDataset, Supplement, SupplementValue};
use crate::diagnostics::Diagnostics;
use crate::error::{MetadataError, Result};
use crate::io::utils::{decode_document, read_bytes};
use crate::io::xml::{parse_document, NamespaceMap, XmlElement};
use crate::path::StoragePath;

mod fluoview;
mod fluoview3k;

pub use fluoview::FluoViewMosaic;
pub use fluoview3k::{FluoView3kMosaic, KNOWN_STAGE, SCHEMA_VERSION};

/// An ordered collection of datasets sharing one project file
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Experiment<D> {
    /// The project file the experiment was read from
    pub infile: StoragePath,
    pub datasets: Vec<D>,
    pub supplement: Supplement,
}

pub type MosaicExperiment = Experiment<MosaicCuboidDataset>;

impl<D> Experiment<D> {
    pub fn new(infile: StoragePath) -> Self {
        Self {
            infile,
            datasets: Vec::new(),
            supplement: Supplement::new(),
        }
    }

    pub fn add_dataset(&mut self, dataset: D) {
        self.datasets.push(dataset);
    }

    pub fn set_supplement<V: Into<SupplementValue>>(&mut self, key: &str, value: V) {
        self.supplement.insert(key.to_string(), value.into());
    }

    pub fn supplement_value(&self, key: &str) -> Option<&SupplementValue> {
        self.supplement.get(key)
    }

    pub fn get(&self, index: usize) -> Option<&D> {
        self.datasets.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, D> {
        self.datasets.iter()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Serialize the experiment, e.g. for a stitching configuration generator
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> serde_json::Result<String>
    where
        D: serde::Serialize,
    {
        serde_json::to_string_pretty(self)
    }
}

impl<D> Index<usize> for Experiment<D> {
    type Output = D;

    fn index(&self, index: usize) -> &Self::Output {
        &self.datasets[index]
    }
}

impl<'a, D> IntoIterator for &'a Experiment<D> {
    type Item = &'a D;
    type IntoIter = slice::Iter<'a, D>;

    fn into_iter(self) -> Self::IntoIter {
        self.datasets.iter()
    }
}

impl<D> IntoIterator for Experiment<D> {
    type Item = D;
    type IntoIter = std::vec::IntoIter<D>;

    fn into_iter(self) -> Self::IntoIter {
        self.datasets.into_iter()
    }
}

/// A reader for one kind of mosaic project file
pub trait MosaicProjectReader {
    /// Read the project at `path`, recording warnings and dropped mosaics in
    /// `diagnostics`.
    fn parse_with<P: AsRef<Path>>(
        path: P,
        diagnostics: &mut Diagnostics,
    ) -> Result<MosaicExperiment>;

    /// Read the project at `path` with a fresh diagnostics sink
    fn open<P: AsRef<Path>>(path: P) -> Result<(MosaicExperiment, Diagnostics)> {
        let mut diagnostics = Diagnostics::new();
        let experiment = Self::parse_with(path, &mut diagnostics)?;
        Ok((experiment, diagnostics))
    }
}

/// The generations of FluoView project files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectFormat {
    /// `*.omp2info`, written by FluoView 3000
    FluoView3k,
    /// `MATL_Mosaic.log`, written by older FluoView versions
    FluoView,
}

impl ProjectFormat {
    /// Guess the project generation from its file name
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("omp2info") => Ok(Self::FluoView3k),
            Some("log") => Ok(Self::FluoView),
            _ => Err(MetadataError::NotSupported(format!(
                "Unknown project file type: {}",
                path.display()
            ))),
        }
    }
}

/// Read a mosaic project, choosing the reader from the file name
pub fn open_project<P: AsRef<Path>>(path: P) -> Result<(MosaicExperiment, Diagnostics)> {
    match ProjectFormat::from_path(path.as_ref())? {
        ProjectFormat::FluoView3k => FluoView3kMosaic::open(path),
        ProjectFormat::FluoView => FluoViewMosaic::open(path),
    }
}

/// Read and parse a project description document
pub(crate) fn read_project_document(infile: &StoragePath) -> Result<XmlElement> {
    debug!("Reading project file {infile}");
    let source_name = infile.to_string();
    let bytes = read_bytes(infile)?;
    let text = decode_document(&bytes, &source_name)?;
    parse_document(&text, &source_name)
}

/// The text at `path` below `root`, where anything missing means the document is not
/// of the expected schema
pub(crate) fn schema_text<'a>(
    root: &'a XmlElement,
    path: &str,
    namespaces: &NamespaceMap,
) -> Result<&'a str> {
    root.find(path, namespaces)
        .map(XmlElement::text)
        .ok_or_else(|| MetadataError::Schema(format!("<{}> has no {path}", root.name)))
}

/// Parse a value required by the project schema
pub(crate) fn schema_value<T: std::str::FromStr>(
    root: &XmlElement,
    path: &str,
    namespaces: &NamespaceMap,
) -> Result<T> {
    let text = schema_text(root, path, namespaces)?;
    text.parse()
        .map_err(|_| MetadataError::Schema(format!("Invalid value for {path}: {text:?}")))
}
