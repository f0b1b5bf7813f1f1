use std::fs::File;
use std::io::{self, Read};

use indexmap::IndexMap;
use log::{debug, error, trace};
use memchr::{memmem, memrchr};

use crate::dataset::Dimensions;
use crate::diagnostics::Diagnostics;
use crate::error::{MetadataError, Result};
use crate::io::utils::open_error;
use crate::io::xml::{parse_document, NamespaceMap, XmlElement};
use crate::path::StoragePath;

use super::FormatBackend;

pub const FRAME_PROPERTIES_TAG: &str = "lsmframe:frameProperties";
pub const IMAGE_PROPERTIES_TAG: &str = "lsmimage:imageProperties";

const SEARCH_TAGS: [(&str, &[u8]); 2] = [
    (FRAME_PROPERTIES_TAG, b"<lsmframe:frameProperties"),
    (IMAGE_PROPERTIES_TAG, b"<lsmimage:imageProperties"),
];

const XML_DECLARATION: &[u8] = b"<?xml";

const NS_BASE: &str = "http://www.olympus.co.jp/hpf";

const Z_AXIS_TYPE: &str = "commonparam:ZAxisParam";
const Z_AXIS_NAME: &str = "Start End";

/// Tuning for the scan over an OIR file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OirScanOptions {
    /// How many bytes to read from the file at once
    pub chunk_size: usize,
    /// Runs of printable characters shorter than this are never XML we want
    pub min_run_length: usize,
    /// Runs growing past this are discarded up to the next non-printable byte
    pub max_run_length: usize,
}

impl Default for OirScanOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1 << 20,
            min_run_length: 100,
            max_run_length: 16 << 20,
        }
    }
}

/// The XML metadata blocks recovered from an OIR file, keyed by root tag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OirXmlBlocks {
    blocks: IndexMap<String, String>,
    /// How far into the file the scan had to read
    pub bytes_read: u64,
}

impl OirXmlBlocks {
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.blocks.get(tag).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn require(&self, tag: &str, source_name: &str) -> Result<&str> {
        self.get(tag).ok_or_else(|| {
            MetadataError::malformed(source_name, format!("no <{tag}> XML block"))
        })
    }
}

/// ASCII letters, digits, punctuation and whitespace
#[inline]
fn is_printable(byte: u8) -> bool {
    byte.is_ascii_graphic() || matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/**
Scan a binary stream for the embedded XML metadata blocks.

The file has no directory of its contents, so every run of printable characters
is collected and, once a non-printable byte ends it, checked for being an XML
document with one of the wanted root tags. Anything after the last `>` of a run
is binary data that happened to be printable and is dropped.

Runs longer than [`OirScanOptions::max_run_length`] are dropped without being
buffered further, so long printable stretches of pixel data cost no memory.

Reading stops as soon as every wanted block was seen, the rest of the stream is
never touched. Reaching the end of the stream first is an error.
*/
pub fn scan_xml_blocks<R: Read>(
    mut reader: R,
    options: &OirScanOptions,
    source_name: &str,
) -> Result<OirXmlBlocks> {
    let mut chunk = vec![0u8; options.chunk_size.max(1)];
    let mut run: Vec<u8> = Vec::new();
    let mut overlong = false;
    let mut found = OirXmlBlocks::default();
    let mut chunks = 0usize;

    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => {
                debug!("Read {} bytes in {chunks} chunks.", found.bytes_read);
                return Err(MetadataError::malformed(
                    source_name,
                    format!(
                        "Couldn't find all requested XML blocks (found {} of {})",
                        found.len(),
                        SEARCH_TAGS.len()
                    ),
                ));
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(MetadataError::malformed(
                    source_name,
                    format!("read failed after {} bytes: {e}", found.bytes_read),
                ))
            }
        };
        chunks += 1;
        found.bytes_read += n as u64;

        for &byte in &chunk[..n] {
            if is_printable(byte) {
                if overlong {
                    continue;
                }
                if run.len() >= options.max_run_length {
                    trace!("Discarding printable run longer than {} bytes", options.max_run_length);
                    run.clear();
                    overlong = true;
                    continue;
                }
                run.push(byte);
                continue;
            }
            if overlong {
                overlong = false;
                continue;
            }

            if run.len() < options.min_run_length || memmem::find(&run, XML_DECLARATION).is_none() {
                run.clear();
                continue;
            }

            for (tag, needle) in SEARCH_TAGS {
                if memmem::find(&run, needle).is_none() {
                    continue;
                }
                debug!("Found <{tag}> XML section.");
                let xml_close = memrchr(b'>', &run).map(|i| i + 1).unwrap_or(0);
                if run.len() > xml_close {
                    trace!(
                        "Stripping {} trailing chars: {:?}",
                        run.len() - xml_close,
                        String::from_utf8_lossy(&run[xml_close..])
                    );
                }
                found.blocks.insert(
                    tag.to_string(),
                    String::from_utf8_lossy(&run[..xml_close]).into_owned(),
                );
                if found.len() == SEARCH_TAGS.len() {
                    debug!("Stopping after {} bytes.", found.bytes_read);
                    return Ok(found);
                }
            }
            run.clear();
        }
    }
}

fn namespaces() -> NamespaceMap {
    NamespaceMap::new()
        .with("base", format!("{NS_BASE}/model/base"))
        .with("commonframe", format!("{NS_BASE}/model/commonframe"))
        .with("commonimage", format!("{NS_BASE}/model/commonimage"))
        .with("commonparam", format!("{NS_BASE}/model/commonparam"))
}

/// The Olympus OIR format, a binary file with embedded XML metadata
#[derive(Debug, Clone, Copy, Default)]
pub struct Oir;

impl Oir {
    pub fn open_with(path: &StoragePath, options: &OirScanOptions) -> Result<OirXmlBlocks> {
        let handle = File::open(&path.full).map_err(|e| open_error(path, e))?;
        scan_xml_blocks(handle, options, &path.to_string())
    }

    /// Read width, height and bit depth from the frame properties
    fn parse_frame_properties(
        root: &XmlElement,
        ns: &NamespaceMap,
        source_name: &str,
        dims: &mut Dimensions,
    ) -> Result<()> {
        trace!("Trying to parse frameProperties XML...");
        let image_definition = root.require("commonframe:imageDefinition", ns, source_name)?;
        dims.x = image_definition.require_value("base:width", ns, source_name)?;
        dims.y = image_definition.require_value("base:height", ns, source_name)?;
        dims.bit_depth = image_definition.require_value("base:bitCounts", ns, source_name)?;
        Ok(())
    }

    /// Find the Z size among the acquisition axes. An image without a "Start End"
    /// Z axis is not a Z-stack and gets Z = 0.
    fn parse_image_properties(
        root: &XmlElement,
        ns: &NamespaceMap,
        source_name: &str,
    ) -> Result<u32> {
        trace!("Trying to parse imageProperties XML...");
        let imaging_param = root.require(
            "commonimage:acquisition/commonimage:imagingParam",
            ns,
            source_name,
        )?;
        for axis in imaging_param.find_all("commonparam:axis", ns) {
            if axis.attribute("xsi:type", ns) != Some(Z_AXIS_TYPE) {
                continue;
            }
            trace!("Found axis of type {Z_AXIS_TYPE:?}.");
            if axis.require_text("commonparam:paramName", ns, source_name)? == Z_AXIS_NAME {
                let z = axis.require_value("commonparam:maxSize", ns, source_name)?;
                debug!("Found Z-axis size: {z}");
                return Ok(z);
            }
        }
        Ok(0)
    }
}

impl FormatBackend for Oir {
    type Container = OirXmlBlocks;

    fn open(path: &StoragePath, _diagnostics: &mut Diagnostics) -> Result<OirXmlBlocks> {
        debug!("Scanning OIR file {path} for XML metadata");
        Self::open_with(path, &OirScanOptions::default())
    }

    fn parse_dimensions(
        container: &OirXmlBlocks,
        path: &StoragePath,
        _diagnostics: &mut Diagnostics,
    ) -> Result<Dimensions> {
        let source_name = path.to_string();
        let ns = namespaces();
        let mut dims = Dimensions::default();
        let result = (|| -> Result<()> {
            let frame = parse_document(
                container.require(FRAME_PROPERTIES_TAG, &source_name)?,
                &source_name,
            )?;
            Self::parse_frame_properties(&frame, &ns, &source_name, &mut dims)?;
            let image = parse_document(
                container.require(IMAGE_PROPERTIES_TAG, &source_name)?,
                &source_name,
            )?;
            // Channels and timepoints are not read from OIR metadata yet
            dims.z = Self::parse_image_properties(&image, &ns, &source_name)?;
            Ok(())
        })();
        if let Err(err) = result {
            error!("Error parsing dimensions from {path}: {err}");
            return Err(err);
        }
        debug!("Parsed dimensions: {dims}");
        Ok(dims)
    }
}
