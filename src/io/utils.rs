use std::fs;
use std::io;
use std::path::Path;

use encoding_rs::{DecoderResult, Encoding, UTF_16BE, UTF_16LE};

use crate::error::{MetadataError, Result};

/// Map a failure to open or read `path` onto the error taxonomy. Anything the OS
/// reports while opening counts as the file not being there for us.
pub(crate) fn open_error<P: AsRef<Path>>(path: P, err: io::Error) -> MetadataError {
    log::debug!("Failed to open {}: {err}", path.as_ref().display());
    MetadataError::not_found(path.as_ref())
}

pub(crate) fn read_bytes<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    fs::read(path.as_ref()).map_err(|e| open_error(path, e))
}

/// Decode UTF-16 text, honoring a byte order mark and assuming little endian
/// without one. Malformed input is an error rather than being replaced.
pub fn decode_utf16(bytes: &[u8], source_name: &str) -> Result<String> {
    let (encoding, bom_length) = match Encoding::for_bom(bytes) {
        Some((enc, n)) if enc == UTF_16LE || enc == UTF_16BE => (enc, n),
        _ => (UTF_16LE, 0),
    };
    let body = &bytes[bom_length..];
    let mut decoder = encoding.new_decoder_without_bom_handling();
    let capacity = decoder
        .max_utf8_buffer_length_without_replacement(body.len())
        .ok_or_else(|| MetadataError::Encoding {
            source_name: source_name.to_string(),
            description: format!("{} bytes is too large to decode", body.len()),
        })?;
    let mut text = String::with_capacity(capacity);
    let (result, read) = decoder.decode_to_string_without_replacement(body, &mut text, true);
    match result {
        DecoderResult::InputEmpty => Ok(text),
        DecoderResult::Malformed(bad, extra) => {
            let offset = bom_length + read - bad as usize - extra as usize;
            let end = (offset + bad as usize).min(bytes.len());
            Err(MetadataError::Encoding {
                source_name: source_name.to_string(),
                description: format!(
                    "invalid {} sequence {:02x?} at byte {offset}",
                    encoding.name(),
                    &bytes[offset..end]
                ),
            })
        }
        DecoderResult::OutputFull => Err(MetadataError::Encoding {
            source_name: source_name.to_string(),
            description: "decoder ran out of output space".into(),
        }),
    }
}

/// Decode the bytes of a project description file. These are UTF-8 unless a byte
/// order mark says otherwise.
pub fn decode_document(bytes: &[u8], source_name: &str) -> Result<String> {
    let (encoding, bom_length) = Encoding::for_bom(bytes).unwrap_or((encoding_rs::UTF_8, 0));
    encoding
        .decode_without_bom_handling_and_without_replacement(&bytes[bom_length..])
        .map(|text| text.into_owned())
        .ok_or_else(|| MetadataError::Encoding {
            source_name: source_name.to_string(),
            description: format!("not valid {}", encoding.name()),
        })
}

#[cfg(test)]
pub(crate) fn encode_utf16le(text: &str) -> Vec<u8> {
    let mut buf = vec![0xff, 0xfe];
    for unit in text.encode_utf16() {
        buf.extend(unit.to_le_bytes());
    }
    buf
}
