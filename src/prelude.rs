pub use crate::dataset::{DatasetDescriptor, DimensionState, ImageDataset, MosaicCuboidDataset};
pub use crate::diagnostics::Diagnostics;
pub use crate::experiment::{FluoView3kMosaic, FluoViewMosaic, MosaicProjectReader};
pub use crate::io::olympus::{FormatBackend, OlympusFormat};
