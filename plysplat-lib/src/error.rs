use std::{fmt, io};

#[derive(Debug)]
pub enum SplatError {
    HeaderTooLargeOrMissing,
    MalformedHeader(String),
    UnsupportedEncoding(String),
    UnknownPropertyType(String),
    NoVertices,
    MissingPosition,
    MissingColor { found: Vec<String> },
    TruncatedPayload { needed: usize, available: usize },
    Decompress(String),
    Cancelled,
    ReadFailure(io::Error),
}

pub type Result<T> = std::result::Result<T, SplatError>;

impl fmt::Display for SplatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplatError::HeaderTooLargeOrMissing => {
                write!(f, "No 'end_header' marker found within the header scan window.")
            }
            SplatError::MalformedHeader(e) => {
                write!(f, "Malformed .ply header: {}", e)
            }
            SplatError::UnsupportedEncoding(e) => {
                write!(
                    f,
                    "Unsupported .ply encoding '{}' (only binary_little_endian 1.0 is supported)",
                    e
                )
            }
            SplatError::UnknownPropertyType(e) => {
                write!(f, "Unknown property type '{}'", e)
            }
            SplatError::NoVertices => {
                write!(f, "The file declares no vertices.")
            }
            SplatError::MissingPosition => {
                write!(f, "Missing required position properties x, y, z.")
            }
            SplatError::MissingColor { found } => {
                write!(
                    f,
                    "Missing color properties (need red/green/blue or f_dc_0/f_dc_1/f_dc_2), found: {}",
                    found.join(", ")
                )
            }
            SplatError::TruncatedPayload { needed, available } => {
                write!(
                    f,
                    "Binary data is too short, need {} bytes, have {}",
                    needed, available
                )
            }
            SplatError::Decompress(e) => {
                write!(f, "Zstandard decompression failed: {}", e)
            }
            SplatError::Cancelled => {
                write!(f, "The load was cancelled.")
            }
            SplatError::ReadFailure(e) => {
                write!(f, "An I/O error occurred: {}", e)
            }
        }
    }
}

impl std::error::Error for SplatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SplatError::ReadFailure(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SplatError {
    fn from(e: io::Error) -> Self {
        SplatError::ReadFailure(e)
    }
}
