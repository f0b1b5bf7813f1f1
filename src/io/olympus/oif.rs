use log::{debug, info};

use crate::dataset::Dimensions;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::io::ini::KeyValueStore;
use crate::io::utils::{decode_utf16, read_bytes};
use crate::path::StoragePath;

use super::{parse_key_value_dimensions, FormatBackend};

/// The Olympus OIF format, a UTF-16 encoded key-value file
#[derive(Debug, Clone, Copy, Default)]
pub struct Oif;

impl FormatBackend for Oif {
    type Container = KeyValueStore;

    fn open(path: &StoragePath, _diagnostics: &mut Diagnostics) -> Result<KeyValueStore> {
        info!("Parsing OIF file: {path}");
        let bytes = read_bytes(path)?;
        let source_name = path.to_string();
        let text = decode_utf16(&bytes, &source_name)?;
        let store = KeyValueStore::parse(&text, &source_name)?;
        debug!("Finished parsing OIF file ({} sections).", store.len());
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
