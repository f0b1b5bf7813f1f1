//! Reading the metadata file formats written by Olympus FluoView microscopes, and the
//! generic text and markup layers they are built on.
//!

pub mod ini;
pub mod olympus;
pub(crate) mod utils;
pub mod xml;

pub use crate::io::ini::KeyValueStore;
pub use crate::io::olympus::{
    scan_xml_blocks, ContainerHandle, FormatBackend, Oib, Oif, Oir, OirScanOptions, OirXmlBlocks,
    OlympusFormat,
};
pub use crate::io::utils::{decode_document, decode_utf16};
pub use crate::io::xml::{parse_document, NamespaceMap, XmlElement};
