use std::io;
use std::path::PathBuf;

use thiserror::Error;

/**
All the ways that reading dataset metadata or assembling an experiment can go wrong.

Missing, malformed or undecodable data met while building a single tile or a single
mosaic group is absorbed by the experiment assemblers (see
[`MetadataError::is_contained`]). Schema mismatches, bad arguments and unsupported
formats or operations abort the whole run.
*/
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Can't find {path:?} (tried {attempted:?})")]
    NotFound {
        path: PathBuf,
        attempted: Vec<PathBuf>,
    },
    #[error("Malformed metadata in {source_name}: {reason}")]
    MalformedMetadata { source_name: String, reason: String },
    #[error("Unexpected encoding in {source_name}: {description}")]
    Encoding {
        source_name: String,
        description: String,
    },
    #[error("Unsupported experiment schema: {0}")]
    Schema(String),
    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl MetadataError {
    pub fn not_found<P: Into<PathBuf>>(path: P) -> Self {
        let path = path.into();
        Self::NotFound {
            attempted: vec![path.clone()],
            path,
        }
    }

    pub fn malformed<S: ToString, R: ToString>(source_name: S, reason: R) -> Self {
        Self::MalformedMetadata {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether an assembler may drop the affected mosaic and carry on, rather than
    /// aborting the whole experiment.
    pub fn is_contained(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::MalformedMetadata { .. } | Self::Encoding { .. } => true,
            Self::Configuration(_) | Self::Schema(_) | Self::NotSupported(_) => false,
        }
    }
}

impl From<MetadataError> for io::Error {
    fn from(value: MetadataError) -> Self {
        match value {
            MetadataError::NotFound { .. } => io::Error::new(io::ErrorKind::NotFound, value),
            MetadataError::NotSupported(_) => io::Error::new(io::ErrorKind::Unsupported, value),
            _ => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_containment() {
        assert!(MetadataError::not_found("a.oir").is_contained());
        assert!(MetadataError::malformed("a.oif", "missing key").is_contained());
        assert!(!MetadataError::Schema("bad root".into()).is_contained());
        assert!(!MetadataError::Configuration("bad kind".into()).is_contained());
        assert!(!MetadataError::NotSupported("tile.tif".into()).is_contained());
    }

    #[test]
    fn test_io_conversion() {
        let err: io::Error = MetadataError::not_found("missing.oib").into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        let err: io::Error = MetadataError::malformed("x", "y").into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
