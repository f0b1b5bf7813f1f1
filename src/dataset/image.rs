use std::fmt::Display;

use log::{debug, info};

use crate::diagnostics::Diagnostics;
use crate::error::{MetadataError, Result};
use crate::io::olympus::{ContainerHandle, OlympusFormat};
use crate::path::StoragePath;

use super::descriptor::{DatasetDescriptor, DatasetKind, StorageKind, SupplementValue};

/// The suffix FluoView drops from the file names it writes into project files
pub const FLUOVIEW_MISSING_SUFFIX: &str = "_01";

const TILE_NUMBERS_KEY: &str = "tileno";

/// The axes of an image dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Axis {
    /// Bit depth
    B,
    /// Channels
    C,
    /// Timepoints
    T,
    X,
    Y,
    Z,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dimensions {
    pub bit_depth: u32,
    pub channels: u32,
    pub timepoints: u32,
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Dimensions {
    pub fn get(&self, axis: Axis) -> u32 {
        match axis {
            Axis::B => self.bit_depth,
            Axis::C => self.channels,
            Axis::T => self.timepoints,
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

impl Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "x={} y={} z={} bit={} c={} t={}",
            self.x, self.y, self.z, self.bit_depth, self.channels, self.timepoints
        )
    }
}

/// Whether the dimensions of a dataset have been read from its container yet.
/// Once parsed, they never change.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DimensionState {
    #[default]
    Unparsed,
    Parsed(Dimensions),
}

impl DimensionState {
    pub fn as_parsed(&self) -> Option<&Dimensions> {
        match self {
            Self::Unparsed => None,
            Self::Parsed(dims) => Some(dims),
        }
    }
}

/// The grid position of a tile within its mosaic
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TileIndex {
    pub x: u32,
    pub y: u32,
    pub z: Option<u32>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    /// Raw stage coordinates as reported by the instrument, either may be unknown
    pub stage: Option<(Option<f64>, Option<f64>)>,
    /// Offset in pixels relative to the mosaic origin
    pub relative: Option<(f64, f64)>,
}

/// Compute the pixel offset of a tile assuming all tiles share the same size and
/// overlap.
pub fn relative_position(dimensions: &Dimensions, tile: &TileIndex, overlap_pct: f64) -> (f64, f64) {
    let ratio = (100.0 - overlap_pct) / 100.0;
    (
        dimensions.x as f64 * ratio * tile.x as f64,
        dimensions.y as f64 * ratio * tile.y as f64,
    )
}

/// An image dataset, 2D to 5D.
///
/// Datasets backed by one of the Olympus formats carry an open container handle and
/// read their [`Dimensions`] from it on first request. A dataset without a format
/// backend only describes its storage, and asking it for dimensions or geometry
/// fails with [`MetadataError::NotSupported`].
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageDataset {
    pub descriptor: DatasetDescriptor,
    pub position: Position,
    dimensions: DimensionState,
    #[cfg_attr(feature = "serde", serde(skip))]
    container: Option<ContainerHandle>,
}

impl ImageDataset {
    pub fn new(kind: DatasetKind, storage_kind: StorageKind, storage: StoragePath) -> Result<Self> {
        let descriptor = DatasetDescriptor::new(kind, storage_kind, storage)?;
        debug!("Creating an image dataset of kind {}", descriptor.kind);
        Ok(Self {
            descriptor,
            position: Position::default(),
            dimensions: DimensionState::Unparsed,
            container: None,
        })
    }

    /// Open an image stored in one of the Olympus formats.
    ///
    /// The storage path is checked first, falling back to the `_01` suffixed form
    /// FluoView actually writes to disk (see [`resolve_olympus_path`]).
    pub fn open_olympus<S: AsRef<str>>(
        format: OlympusFormat,
        path: S,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        Self::open_storage(format, StoragePath::parse(path), diagnostics)
    }

    /// Like [`ImageDataset::open_olympus`], for an already structured location
    pub fn open_storage(
        format: OlympusFormat,
        storage: StoragePath,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        debug!("Opening {format:?} image dataset {storage}");
        let mut this = Self::new(DatasetKind::Stack, StorageKind::Tree, storage)?;
        this.descriptor.storage = resolve_olympus_path(&this.descriptor.storage)?;
        let container = format.open(&this.descriptor.storage, diagnostics)?;
        if format.parses_eagerly() {
            let dims = container.parse_dimensions(&this.descriptor.storage, diagnostics)?;
            this.dimensions = DimensionState::Parsed(dims);
        }
        this.container = Some(container);
        Ok(this)
    }

    /// Open an image, choosing the Olympus format from the file name suffix
    pub fn open_path<S: AsRef<str>>(path: S, diagnostics: &mut Diagnostics) -> Result<Self> {
        let format = OlympusFormat::from_path(path.as_ref())?;
        Self::open_olympus(format, path, diagnostics)
    }

    pub fn format(&self) -> Option<OlympusFormat> {
        self.container.as_ref().map(|c| c.format())
    }

    pub fn storage(&self) -> &StoragePath {
        &self.descriptor.storage
    }

    pub fn set_stage_coordinates(&mut self, x: Option<f64>, y: Option<f64>) {
        debug!("Setting stage coordinates: {x:?}, {y:?}");
        self.position.stage = Some((x, y));
    }

    pub fn set_tile_numbers(&mut self, x: u32, y: u32, z: Option<u32>) {
        debug!("Tile grid indices x / y / z: {x} / {y} / {z:?}");
        self.descriptor
            .set_supplement(TILE_NUMBERS_KEY, TileIndex { x, y, z });
    }

    pub fn tile_numbers(&self) -> Option<&TileIndex> {
        self.descriptor
            .supplement
            .get(TILE_NUMBERS_KEY)
            .and_then(SupplementValue::as_tile)
    }

    pub fn dimension_state(&self) -> &DimensionState {
        &self.dimensions
    }

    /// The dimensions if they have already been read, without touching the container
    pub fn cached_dimensions(&self) -> Option<&Dimensions> {
        self.dimensions.as_parsed()
    }

    /// Get the image dimensions, parsing them from the container on first call.
    pub fn dimensions(&mut self, diagnostics: &mut Diagnostics) -> Result<Dimensions> {
        let container = self.container.as_ref().ok_or_else(|| {
            MetadataError::NotSupported(
                "Dimensions are only available for format-backed datasets".into(),
            )
        })?;
        match self.dimensions {
            DimensionState::Parsed(dims) => Ok(dims),
            DimensionState::Unparsed => {
                let dims = container.parse_dimensions(&self.descriptor.storage, diagnostics)?;
                info!("Parsed image dimensions: {dims}");
                self.dimensions = DimensionState::Parsed(dims);
                Ok(dims)
            }
        }
    }

    /// Calculate the relative position of this tile from the tile overlap, given in
    /// percent. The tile numbers must have been set beforehand.
    pub fn set_relative_position(
        &mut self,
        overlap_pct: f64,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        if self.container.is_none() {
            return Err(MetadataError::NotSupported(
                "Relative positions require a format-backed dataset".into(),
            ));
        }
        let tile = *self.tile_numbers().ok_or_else(|| {
            MetadataError::Configuration(format!(
                "Tile numbers must be set before the relative position of {}",
                self.descriptor.storage
            ))
        })?;
        let dims = self.dimensions(diagnostics)?;
        let (pos_x, pos_y) = relative_position(&dims, &tile, overlap_pct);
        info!("Setting relative coordinates: {pos_x}, {pos_y}");
        self.position.relative = Some((pos_x, pos_y));
        Ok(())
    }
}

/// Fix the broken file names FluoView stores in its experiment description files.
///
/// The project files usually reference e.g. `Slide1sec001\Slide1sec001.oib` while
/// the file on disk is `Slide1sec001\Slide1sec001_01.oib`. The literal path wins
/// when it exists.
pub fn resolve_olympus_path(path: &StoragePath) -> Result<StoragePath> {
    debug!("Validating file path: {path}");
    if path.exists() {
        return Ok(path.clone());
    }
    let fixed = path.with_suffix_before_extension(FLUOVIEW_MISSING_SUFFIX);
    debug!("Trying next path: {fixed}");
    if fixed.exists() {
        return Ok(fixed);
    }
    Err(MetadataError::NotFound {
        path: path.full.clone(),
        attempted: vec![path.full.clone(), fixed.full],
    })
}
