use std::fs::File;
use std::io::Read;

use cfb::CompoundFile;
use log::{debug, info};

use crate::dataset::Dimensions;
use crate::diagnostics::Diagnostics;
use crate::error::{MetadataError, Result};
use crate::io::ini::KeyValueStore;
use crate::io::utils::{decode_utf16, open_error};
use crate::path::StoragePath;

use super::{parse_key_value_dimensions, FormatBackend};

/// The description stream every OIB container starts from
pub const OIB_INFO_STREAM: &str = "OibInfo.txt";

/// The only OIB format version the reader has been verified against
pub const OIB_KNOWN_VERSION: &str = "2.0.0.0";

const SAVE_INFO: &str = "OibSaveInfo";

/// The Olympus OIB format, an OLE compound file holding the OIF metadata as
/// UTF-16 text streams
#[derive(Debug, Clone, Copy, Default)]
pub struct Oib;

fn stream_path(name: &str) -> String {
    let name = name.trim_matches('"').replace('\\', "/");
    if name.starts_with('/') {
        name
    } else {
        format!("/{name}")
    }
}

/// Read a whole stream from the container and decode it as UTF-16 text
fn read_text_stream(
    container: &mut CompoundFile<File>,
    name: &str,
    path: &StoragePath,
) -> Result<String> {
    let source_name = format!("{path}:{name}");
    let mut stream = container.open_stream(stream_path(name)).map_err(|e| {
        MetadataError::malformed(path, format!("OIB stream {name:?} missing: {e}"))
    })?;
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).map_err(|e| {
        MetadataError::malformed(path, format!("Error reading OIB stream {name:?}: {e}"))
    })?;
    decode_utf16(&bytes, &source_name)
}

impl FormatBackend for Oib {
    type Container = KeyValueStore;

    fn open(path: &StoragePath, diagnostics: &mut Diagnostics) -> Result<KeyValueStore> {
        info!("Parsing OIB file: {path}");
        let mut container = cfb::open(&path.full).map_err(|e| open_error(path, e))?;

        info!("Parsing OIB description file {OIB_INFO_STREAM:?}.");
        let info = read_text_stream(&mut container, OIB_INFO_STREAM, path)?;
        let mut store = KeyValueStore::parse(&info, OIB_INFO_STREAM)?;
        let version = store.get(SAVE_INFO, "Version").ok_or_else(|| {
            MetadataError::malformed(path, "OIB description has no format version")
        })?;
        let main_file = store
            .get(SAVE_INFO, "MainFileName")
            .ok_or_else(|| MetadataError::malformed(path, "OIB description has no main file"))?
            .to_string();
        if version != OIB_KNOWN_VERSION {
            diagnostics.warn(path, format!("OIB has unknown format version {version}!"));
        } else {
            info!("OIB Format Version: {version}");
        }
        debug!("Main File Name: {main_file}");

        let main = read_text_stream(&mut container, &main_file, path)?;
        store.read_str(&main, &main_file)?;
        debug!("Finished parsing OIB file.");
        Ok(store)
    }

    fn parse_dimensions(
        container: &KeyValueStore,
        path: &StoragePath,
        diagnostics: &mut Diagnostics,
    ) -> Result<Dimensions> {
        parse_key_value_dimensions(container, path, diagnostics)
    }
}
