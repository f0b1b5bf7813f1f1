//! Readers for the Olympus FluoView image formats.
//!
//! - **OIF**: a UTF-16 text file of `[Section]`/`key=value` metadata next to a
//!   directory of image files
//! - **OIB**: an OLE compound file bundling the same text metadata as streams
//! - **OIR**: a binary file with the metadata embedded as XML fragments
//!
//! Each format implements [`FormatBackend`]: opening produces a container handle
//! and the dimensions are read from that handle. OIF and OIB defer the dimension
//! parsing until it is first requested, OIR parses eagerly since the XML blocks are
//! only located by scanning the file.
mod oib;
mod oif;
mod oir;

use std::fmt::Display;
use std::path::Path;

use log::{debug, info};

use crate::dataset::Dimensions;
use crate::diagnostics::Diagnostics;
use crate::error::{MetadataError, Result};
use crate::io::ini::KeyValueStore;
use crate::path::StoragePath;

pub use oib::{Oib, OIB_INFO_STREAM, OIB_KNOWN_VERSION};
pub use oif::Oif;
pub use oir::{scan_xml_blocks, Oir, OirScanOptions, OirXmlBlocks, FRAME_PROPERTIES_TAG, IMAGE_PROPERTIES_TAG};

/// The operations a container format provides to an image dataset
pub trait FormatBackend {
    type Container;

    /// Open the container at `path`, which is known to exist
    fn open(path: &StoragePath, diagnostics: &mut Diagnostics) -> Result<Self::Container>;

    /// Read the image dimensions from an opened container
    fn parse_dimensions(
        container: &Self::Container,
        path: &StoragePath,
        diagnostics: &mut Diagnostics,
    ) -> Result<Dimensions>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OlympusFormat {
    Oif,
    Oib,
    Oir,
}

impl OlympusFormat {
    /// Pick the format from the file name suffix. There is no content sniffing.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("oif") => Ok(Self::Oif),
            Some("oib") => Ok(Self::Oib),
            Some("oir") => Ok(Self::Oir),
            _ => Err(MetadataError::NotSupported(format!(
                "Unknown dataset type: {}",
                path.display()
            ))),
        }
    }

    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Oif => "oif",
            Self::Oib => "oib",
            Self::Oir => "oir",
        }
    }

    /// Whether dimensions are parsed as part of opening the container
    pub const fn parses_eagerly(&self) -> bool {
        matches!(self, Self::Oir)
    }

    pub fn open(&self, path: &StoragePath, diagnostics: &mut Diagnostics) -> Result<ContainerHandle> {
        debug!("Opening {self} container {path}");
        let handle = match self {
            Self::Oif => ContainerHandle::Oif(Oif::open(path, diagnostics)?),
            Self::Oib => ContainerHandle::Oib(Oib::open(path, diagnostics)?),
            Self::Oir => ContainerHandle::Oir(Oir::open(path, diagnostics)?),
        };
        Ok(handle)
    }
}

impl Display for OlympusFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.extension().to_ascii_uppercase())
    }
}

/// The parser state kept by an opened image dataset
#[derive(Debug, Clone)]
pub enum ContainerHandle {
    Oif(KeyValueStore),
    Oib(KeyValueStore),
    Oir(OirXmlBlocks),
}

impl ContainerHandle {
    pub fn format(&self) -> OlympusFormat {
        match self {
            Self::Oif(_) => OlympusFormat::Oif,
            Self::Oib(_) => OlympusFormat::Oib,
            Self::Oir(_) => OlympusFormat::Oir,
        }
    }

    pub fn parse_dimensions(
        &self,
        path: &StoragePath,
        diagnostics: &mut Diagnostics,
    ) -> Result<Dimensions> {
        match self {
            Self::Oif(store) => Oif::parse_dimensions(store, path, diagnostics),
            Self::Oib(store) => Oib::parse_dimensions(store, path, diagnostics),
            Self::Oir(blocks) => Oir::parse_dimensions(blocks, path, diagnostics),
        }
    }
}

const REFERENCE_IMAGE: &str = "Reference Image Parameter";
const CHANNEL_AXIS: &str = "Axis 2 Parameters Common";
const Z_AXIS: &str = "Axis 3 Parameters Common";
const TIME_AXIS: &str = "Axis 4 Parameters Common";

fn required<'a>(store: &'a KeyValueStore, section: &str, key: &str, path: &StoragePath) -> Result<&'a str> {
    store.get(section, key).ok_or_else(|| {
        MetadataError::malformed(
            path,
            format!("Error parsing dimensions: no option {key:?} in section [{section}]"),
        )
    })
}

fn required_number(store: &KeyValueStore, section: &str, key: &str, path: &StoragePath) -> Result<u32> {
    let value = required(store, section, key, path)?;
    value.trim_matches('"').parse().map_err(|e| {
        MetadataError::malformed(path, format!("invalid {key} value {value:?} in [{section}]: {e}"))
    })
}

/// Read an axis size guarded by the axis name stored in the same section. The axis
/// slots are positional and not always populated, so a mismatching name yields 0
/// and a warning instead of an error.
fn guarded_axis(
    store: &KeyValueStore,
    section: &str,
    expected_name: &str,
    label: &str,
    path: &StoragePath,
    diagnostics: &mut Diagnostics,
) -> Result<u32> {
    let size = required(store, section, "MaxSize", path)?;
    let name = required(store, section, "AxisName", path)?;
    if name.trim_matches('"') != expected_name {
        diagnostics.warn(path, format!("couldn't find {label} in metadata!"));
        return Ok(0);
    }
    size.parse().map_err(|e| {
        MetadataError::malformed(path, format!("invalid MaxSize value {size:?} in [{section}]: {e}"))
    })
}

/// Extract the dimensions from the key-value metadata shared by OIF and OIB
pub(crate) fn parse_key_value_dimensions(
    store: &KeyValueStore,
    path: &StoragePath,
    diagnostics: &mut Diagnostics,
) -> Result<Dimensions> {
    let bit_depth = required_number(store, REFERENCE_IMAGE, "ValidBitCounts", path)?;
    let x = required_number(store, REFERENCE_IMAGE, "ImageHeight", path)?;
    let y = required_number(store, REFERENCE_IMAGE, "ImageWidth", path)?;
    let z = guarded_axis(store, Z_AXIS, "Z", "Z axis", path, diagnostics)?;
    let channels = guarded_axis(store, CHANNEL_AXIS, "Ch", "channels", path, diagnostics)?;
    let timepoints = guarded_axis(store, TIME_AXIS, "T", "timepoints", path, diagnostics)?;
    let dims = Dimensions {
        bit_depth,
        channels,
        timepoints,
        x,
        y,
        z,
    };
    info!("Parsed image dimensions: {dims}");
    Ok(dims)
}
