//! `micrometa` reads the positional and dimensional metadata of tiled microscopy
//! acquisitions made with Olympus FluoView, and assembles it into a uniform
//! description of each mosaic ready for stitching.
//!
//! The tiles themselves are stored in one of three container formats, all read
//! through [`ImageDataset`]:
//!
//! ```no_run
//! use micrometa::prelude::*;
//!
//! let mut diagnostics = Diagnostics::new();
//! let mut tile = ImageDataset::open_path("Slide1sec001/Slide1sec001.oib", &mut diagnostics)?;
//! let dims = tile.dimensions(&mut diagnostics)?;
//! println!("{} x {} x {} at {} bit", dims.x, dims.y, dims.z, dims.bit_depth);
//! # Ok::<(), micrometa::MetadataError>(())
//! ```
//!
//! while the project files describing whole experiments are read by the
//! [`experiment`] module:
//!
//! ```no_run
//! use micrometa::prelude::*;
//!
//! let (experiment, diagnostics) = FluoView3kMosaic::open("project/matl.omp2info")?;
//! for mosaic in experiment.iter() {
//!     for tile in mosaic.subvolumes() {
//!         println!("{} {:?}", tile.storage(), tile.position.relative);
//!     }
//! }
//! for dropped in diagnostics.warnings() {
//!     eprintln!("{dropped}");
//! }
//! # Ok::<(), micrometa::MetadataError>(())
//! ```
pub mod dataset;
pub mod diagnostics;
pub mod error;
pub mod experiment;
pub mod io;
pub mod path;
pub mod prelude;

pub use crate::dataset::{
    Dimensions, ImageDataset, MosaicCuboidDataset, MosaicDataset, OverlapUnit, TileIndex,
};
pub use crate::diagnostics::{Diagnostic, Diagnostics};
pub use crate::error::{MetadataError, Result};
pub use crate::experiment::{
    open_project, Experiment, FluoView3kMosaic, FluoViewMosaic, MosaicExperiment,
};
pub use crate::io::OlympusFormat;
pub use crate::path::StoragePath;
