//! A reader for the INI-like text grammar used by the Olympus OIF/OIB formats.
//!
//! Files consist of `[Section]` headers followed by `key=value` (or `key: value`)
//! lines. Keys are case-insensitive, values are kept verbatim apart from surrounding
//! whitespace and trailing ` ;` comments, so quoted values keep their quotes.
use indexmap::IndexMap;
use lazy_static::lazy_static;
use log::trace;
use regex::Regex;

use crate::error::{MetadataError, Result};

lazy_static! {
    static ref SECTION_HEADER: Regex = Regex::new(r"^\[(?P<header>[^\]]+)\]").unwrap();
    static ref OPTION_LINE: Regex =
        Regex::new(r"^(?P<option>[^:=\s][^:=]*)\s*(?P<sep>[:=])\s*(?P<value>.*)$").unwrap();
}

/// Sectioned key-value pairs. Reading more text into the same store merges into
/// existing sections.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KeyValueStore {
    sections: IndexMap<String, IndexMap<String, String>>,
}

fn is_comment(line: &str) -> bool {
    line.trim().is_empty()
        || line.starts_with('#')
        || line.starts_with(';')
        || (line.starts_with(['r', 'R'])
            && line
                .split_whitespace()
                .next()
                .is_some_and(|w| w.eq_ignore_ascii_case("rem")))
}

fn clean_value(raw: &str) -> String {
    let mut value = raw;
    if let Some(pos) = value.find(';') {
        if pos > 0 && value[..pos].ends_with(char::is_whitespace) {
            value = &value[..pos];
        }
    }
    let value = value.trim();
    if value == "\"\"" {
        String::new()
    } else {
        value.to_string()
    }
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str, source_name: &str) -> Result<Self> {
        let mut this = Self::new();
        this.read_str(text, source_name)?;
        Ok(this)
    }

    /// Read `text` into this store. `source_name` is only used in error messages.
    pub fn read_str(&mut self, text: &str, source_name: &str) -> Result<()> {
        let mut current_section: Option<String> = None;
        let mut current_key: Option<String> = None;

        for (line_number, line) in text.lines().enumerate() {
            let line_number = line_number + 1;
            if is_comment(line) {
                continue;
            }
            if line.starts_with(char::is_whitespace) {
                if let (Some(section), Some(key)) = (&current_section, &current_key) {
                    if let Some(value) = self
                        .sections
                        .get_mut(section)
                        .and_then(|s| s.get_mut(key))
                    {
                        value.push('\n');
                        value.push_str(line.trim());
                    }
                    continue;
                }
            }
            if let Some(caps) = SECTION_HEADER.captures(line) {
                let header = caps["header"].to_string();
                trace!("Entering section [{header}]");
                self.sections.entry(header.clone()).or_default();
                current_section = Some(header);
                current_key = None;
                continue;
            }
            let Some(section) = &current_section else {
                return Err(MetadataError::malformed(
                    source_name,
                    format!("line {line_number} appears before any section header"),
                ));
            };
            match OPTION_LINE.captures(line) {
                Some(caps) => {
                    let key = caps["option"].trim_end().to_lowercase();
                    let value = clean_value(&caps["value"]);
                    self.sections
                        .entry(section.clone())
                        .or_default()
                        .insert(key.clone(), value);
                    current_key = Some(key);
                }
                None => {
                    return Err(MetadataError::malformed(
                        source_name,
                        format!("can't parse line {line_number}: {line:?}"),
                    ))
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|s| s.get(&key.to_lowercase()))
            .map(String::as_str)
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE: &str = "[Reference Image Parameter]\r
ImageHeight=512\r
ImageWidth = 256 ; trailing comment\r
ValidBitCounts: 12\r
# a comment\r
\r
[Axis 3 Parameters Common]\r
AxisName=\"Z\"\r
Empty=\"\"\r
Notes=first\r
  second\r
";

    #[test]
    fn test_parse() {
        let store = KeyValueStore::parse(SAMPLE, "sample.oif").unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("Reference Image Parameter", "ImageHeight"), Some("512"));
        assert_eq!(store.get("Reference Image Parameter", "imagewidth"), Some("256"));
        assert_eq!(store.get("Reference Image Parameter", "ValidBitCounts"), Some("12"));
        assert_eq!(store.get("Axis 3 Parameters Common", "AxisName"), Some("\"Z\""));
        assert_eq!(store.get("Axis 3 Parameters Common", "Empty"), Some(""));
        assert_eq!(store.get("Axis 3 Parameters Common", "Notes"), Some("first\nsecond"));
        assert_eq!(store.get("Missing", "ImageHeight"), None);
    }

    #[test]
    fn test_merge() {
        let mut store = KeyValueStore::parse("[OibSaveInfo]\nVersion=2.0.0.0\n", "info").unwrap();
        store
            .read_str("[OibSaveInfo]\nExtra=1\n[Other]\nA=b\n", "main")
            .unwrap();
        assert_eq!(store.get("OibSaveInfo", "Version"), Some("2.0.0.0"));
        assert_eq!(store.get("OibSaveInfo", "Extra"), Some("1"));
        assert!(store.has_section("Other"));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            KeyValueStore::parse("Key=Value\n", "x"),
            Err(MetadataError::MalformedMetadata { .. })
        ));
        assert!(matches!(
            KeyValueStore::parse("[S]\nno separator here\n", "x"),
            Err(MetadataError::MalformedMetadata { .. })
        ));
    }
}
