//! # RSSE Error Types
//!
//! This module contains the error types used throughout the rsse library.
use thiserror::Error;

#[derive(Debug, Error)]
/// An enum representing the different types of errors that can occur in rsse
pub enum RsseError {
    /// Query range with `lo > hi`, an unparsable boundary or a value outside the code domain
    #[error("Malformed range: {0}")]
    MalformedRange(String),

    /// Cluster index outside the partition arrays
    #[error("Cluster index {index} out of bounds ({len} clusters)")]
    ClusterOutOfBounds { index: usize, len: usize },

    /// A chain walk reached a missing EDB entry. Benign: ends that chain.
    #[error("Hash chain exhausted")]
    ChainExhausted,

    /// XOR operands of different byte lengths
    #[error("XOR operand length mismatch: {left} != {right}")]
    XorLengthMismatch { left: usize, right: usize },

    /// A keyword that does not parse as a non-negative integer or breaks ordering
    #[error("Invalid keyword: {0}")]
    InvalidKeyword(String),

    /// Update of a keyword that was not part of the built index
    #[error("Unknown keyword: {0}")]
    UnknownKeyword(String),

    /// Index construction over no keywords
    #[error("Cannot build an index over an empty keyword list")]
    EmptyIndex,

    /// Document id that does not fit in the configured bitmap
    #[error("Posting {posting} does not fit in a {bits}-bit bitmap")]
    PostingOutOfRange { posting: u64, bits: usize },

    /// Cluster that outgrew its bitmap width after an update
    #[error("Cluster {cluster} would hold {size} postings, bitmap width is {width}")]
    ClusterOverflow { cluster: usize, size: usize, width: usize },

    /// Cryptographic operation errors
    #[error("Cryptographic error: {0}")]
    CryptoError(String),

    /// Token / response shape errors between client and server
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Parsing errors
    #[error("Parsing error: {0}")]
    ParseError(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO errors
    #[error("{0}")]
    IoError(std::io::Error),

    /// CSV errors
    #[error("{0}")]
    CsvError(csv::Error),
}

impl From<std::io::Error> for RsseError {
    fn from(err: std::io::Error) -> Self {
        RsseError::IoError(err)
    }
}

impl From<csv::Error> for RsseError {
    fn from(err: csv::Error) -> Self {
        RsseError::CsvError(err)
    }
}

impl From<std::num::ParseIntError> for RsseError {
    fn from(err: std::num::ParseIntError) -> Self {
        RsseError::ParseError(format!("Failed to parse integer: {}", err))
    }
}
