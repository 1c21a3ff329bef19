//! # rsse
//!
//! "rsse" is a Rust library for range-searchable symmetric encryption. A client outsources an
//! inverted index over integer keywords to an untrusted server and later asks for the union of
//! the postings of every keyword inside an inclusive range, without revealing keywords, document
//! ids or the queried bounds in the clear.
//!
//! Two constructions are provided behind the common [`protocol::RangeScheme`] trait:
//! - [`cluster::ClusterScheme`]: keywords are grouped into volume-bounded clusters whose
//!   cumulative bitmaps are one-time padded; a query touches at most two ciphertexts.
//! - [`chain::ChainScheme`]: a binary trie over keyword ranks whose nodes are stored as
//!   forward-secure hash chains of additively masked bitmaps, queried through a minimal
//!   binary range cover ([`cover::range_cover`]).

pub mod chain;
pub mod cluster;
pub mod constants;
pub mod cover;
pub mod crypto;
pub mod dataset;
pub mod dtypes;
pub mod edb;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod tree;
pub mod utils;
