//! The dataset model: generic descriptors, image datasets with lazily parsed
//! dimensions, and mosaics built from them.
mod descriptor;
mod image;
mod mosaic;

pub use descriptor::{DatasetDescriptor, DatasetKind, StorageKind, Supplement, SupplementValue};
pub use image::{
    relative_position, resolve_olympus_path, Axis, DimensionState, Dimensions, ImageDataset,
    Position, TileIndex, FLUOVIEW_MISSING_SUFFIX,
};
pub use mosaic::{Grid, MosaicCuboidDataset, MosaicDataset, OverlapUnit, LOW_OVERLAP_PCT};
