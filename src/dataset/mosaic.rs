use std::fmt::Display;
use std::ops::Index;
use std::slice;
use std::str::FromStr;

use log::{debug, info};

use crate::diagnostics::Diagnostics;
use crate::error::{MetadataError, Result};
use crate::path::StoragePath;

use super::descriptor::{DatasetDescriptor, DatasetKind, StorageKind};
use super::image::ImageDataset;

/// Overlaps at or below this many percent make stitching unreliable
pub const LOW_OVERLAP_PCT: f64 = 5.0;

/// A set of sub-volumes (tiles) belonging together, kept in the order they were
/// discovered, which need not be grid order.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MosaicDataset {
    pub descriptor: DatasetDescriptor,
    subvolumes: Vec<ImageDataset>,
}

impl MosaicDataset {
    pub fn new(storage_kind: StorageKind, storage: StoragePath) -> Result<Self> {
        Ok(Self {
            descriptor: DatasetDescriptor::new(DatasetKind::Mosaic, storage_kind, storage)?,
            subvolumes: Vec::new(),
        })
    }

    pub fn add_subvolume(&mut self, image: ImageDataset) {
        debug!(
            "Adding sub-volume {} ({:?})",
            image.storage(),
            image.format()
        );
        self.subvolumes.push(image);
    }

    pub fn subvolumes(&self) -> &[ImageDataset] {
        &self.subvolumes
    }

    pub fn iter(&self) -> slice::Iter<'_, ImageDataset> {
        self.subvolumes.iter()
    }

    pub fn len(&self) -> usize {
        self.subvolumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subvolumes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OverlapUnit {
    Pixel,
    Percent,
    Micrometer,
    Nanometer,
    Millimeter,
}

impl OverlapUnit {
    pub const fn abbreviation(&self) -> &'static str {
        match self {
            Self::Pixel => "px",
            Self::Percent => "pct",
            Self::Micrometer => "um",
            Self::Nanometer => "nm",
            Self::Millimeter => "mm",
        }
    }
}

impl FromStr for OverlapUnit {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "px" => Ok(Self::Pixel),
            "pct" => Ok(Self::Percent),
            "um" => Ok(Self::Micrometer),
            "nm" => Ok(Self::Nanometer),
            "mm" => Ok(Self::Millimeter),
            _ => Err(MetadataError::Configuration(format!(
                "Unknown overlap unit given: {s}"
            ))),
        }
    }
}

impl Display for OverlapUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.abbreviation())
    }
}

/// The number of sub-volumes along each spatial axis
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Grid {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Grid {
    pub fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    pub fn tile_count(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }
}

/// A mosaic covering a full cuboid, i.e. every grid position holds a tile.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MosaicCuboidDataset {
    pub mosaic: MosaicDataset,
    pub grid: Grid,
    overlap_value: f64,
    overlap_unit: OverlapUnit,
}

impl MosaicCuboidDataset {
    pub fn new(storage_kind: StorageKind, storage: StoragePath, grid: Grid) -> Result<Self> {
        info!("Mosaic: {}x{}x{}", grid.x, grid.y, grid.z);
        Ok(Self {
            mosaic: MosaicDataset::new(storage_kind, storage)?,
            grid,
            overlap_value: 0.0,
            overlap_unit: OverlapUnit::Pixel,
        })
    }

    pub fn set_overlap(&mut self, value: f64, unit: OverlapUnit, diagnostics: &mut Diagnostics) {
        debug!("Setting overlap to {value} {unit}");
        if unit == OverlapUnit::Percent && value <= LOW_OVERLAP_PCT {
            diagnostics.warn(
                &self.mosaic.descriptor.storage,
                format!("Low overlap {value:.1}%!"),
            );
        }
        self.overlap_value = value;
        self.overlap_unit = unit;
    }

    /// The overlap in `unit`. Only percent can be queried, and only when the overlap
    /// was also set in percent: there is no conversion between units.
    pub fn overlap(&self, unit: OverlapUnit) -> Result<f64> {
        if unit != OverlapUnit::Percent {
            return Err(MetadataError::NotSupported(format!(
                "Unknown overlap unit requested: {unit}"
            )));
        }
        if unit != self.overlap_unit {
            return Err(MetadataError::NotSupported(format!(
                "Unit conversion not implemented ({} to {unit})",
                self.overlap_unit
            )));
        }
        Ok(self.overlap_value)
    }

    pub fn overlap_unit(&self) -> OverlapUnit {
        self.overlap_unit
    }

    pub fn add_subvolume(&mut self, image: ImageDataset) {
        self.mosaic.add_subvolume(image)
    }

    pub fn subvolumes(&self) -> &[ImageDataset] {
        self.mosaic.subvolumes()
    }

    pub fn descriptor(&self) -> &DatasetDescriptor {
        &self.mosaic.descriptor
    }

    pub fn descriptor_mut(&mut self) -> &mut DatasetDescriptor {
        &mut self.mosaic.descriptor
    }

    pub fn len(&self) -> usize {
        self.mosaic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mosaic.is_empty()
    }
}

impl Index<usize> for MosaicCuboidDataset {
    type Output = ImageDataset;

    fn index(&self, index: usize) -> &Self::Output {
        &self.mosaic.subvolumes[index]
    }
}
