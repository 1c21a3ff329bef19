//! Servers
//!
//! The server side of both range schemes. A server only stores what the
//! client uploads at build time and answers token lookups; it never holds
//! keys and never sees keywords or document ids in the clear.
//!
//! - `ClusterServer` maps keyword tags to padded cumulative bitmaps and
//!   answers with plain dictionary lookups.
//! - `ChainServer` maps chain tokens to masked node bitmaps and walks each
//!   hash chain it is handed, deleting every record it reads.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    crypto::{h1, xor_digest, Digest},
    dtypes::Bitmap,
    edb::EncryptedDatabase,
    logging::{BytesMetric, LatencyMetric},
};

/// Server half of the cluster scheme.
#[derive(Debug, Default)]
pub struct ClusterServer {
    /// Keyword tag -> cumulative bitmap XOR pad.
    pub edb: EncryptedDatabase<Vec<u8>>,
}

impl ClusterServer {
    pub fn new() -> Self {
        ClusterServer {
            edb: EncryptedDatabase::new(),
        }
    }

    /// Stores a batch of `(tag, ciphertext)` pairs, replacing older entries.
    pub fn store<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (Digest, Vec<u8>)>,
    {
        for (tag, ciphertext) in entries {
            self.edb.insert(tag, ciphertext);
        }
    }

    /// Looks up every tag in order. Tags without an entry are skipped.
    pub fn search_tokens(&self, tags: &[Digest]) -> Vec<Vec<u8>> {
        let local_latency = LatencyMetric::new("cluster_server_search");
        let ciphertexts: Vec<Vec<u8>> = tags
            .iter()
            .filter_map(|tag| {
                let found = self.edb.get(tag);
                if found.is_none() {
                    warn!("ClusterServer::search_tokens - no entry for tag {}", hex::encode(tag));
                }
                found
            })
            .collect();
        BytesMetric::new(
            "cluster_server_response",
            ciphertexts.iter().map(Vec::len).sum(),
        )
        .log();
        local_latency.finish();
        ciphertexts
    }
}

/// One version of a chain node as stored by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainRecord {
    /// Node bitmap plus the version mask, modulo `2^(8 * bytes)`.
    pub masked: Bitmap,
    /// `UT_j XOR ST_{j-1}`: links to the previous version.
    pub back: Digest,
}

/// Search material for one prefix node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTriple {
    /// Per-node key `K_w`.
    pub k_w: Digest,
    /// Chain head `ST_{c+1}`.
    pub st: Digest,
    /// Latest version `c`.
    pub counter: u64,
}

/// What the server found along one triple's chain, newest version first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChainPartial {
    pub versions: Vec<Bitmap>,
}

impl ChainPartial {
    /// Number of chain records consumed.
    pub fn steps(&self) -> usize {
        self.versions.len()
    }
}

/// Server answer to a chain token: one partial per triple, in token order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChainResponse {
    pub partials: Vec<ChainPartial>,
}

impl ChainResponse {
    /// Serialized payload size: every returned bitmap.
    pub fn byte_len(&self) -> usize {
        self.partials
            .iter()
            .flat_map(|p| p.versions.iter())
            .map(Bitmap::byte_len)
            .sum()
    }
}

/// Server half of the chain scheme.
#[derive(Debug, Default)]
pub struct ChainServer {
    /// `UT_{j+1}` -> version `j` of a node.
    pub edb: EncryptedDatabase<ChainRecord>,
}

impl ChainServer {
    pub fn new() -> Self {
        ChainServer {
            edb: EncryptedDatabase::new(),
        }
    }

    /// Stores a batch of `(UT, record)` pairs.
    pub fn store<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (Digest, ChainRecord)>,
    {
        for (token, record) in entries {
            self.edb.insert(token, record);
        }
    }

    /// Walks every triple's chain from version `c` down to 0.
    ///
    /// Every record read is removed. A missing record ends that triple's
    /// walk; a replayed token therefore returns at most what the first run
    /// left behind. Never fails.
    pub fn server_search(&self, triples: &[ChainTriple]) -> ChainResponse {
        let local_latency = LatencyMetric::new("chain_server_search");
        let partials = triples
            .iter()
            .map(|triple| self.walk_chain(triple))
            .collect();
        let response = ChainResponse { partials };
        BytesMetric::new("chain_server_response", response.byte_len()).log();
        local_latency.finish();
        response
    }

    fn walk_chain(&self, triple: &ChainTriple) -> ChainPartial {
        let mut partial = ChainPartial::default();
        let mut st = triple.st;
        for version in (0..=triple.counter).rev() {
            let ut = h1(&[&triple.k_w[..], &st[..]]);
            match self.edb.take(&ut) {
                Ok(record) => {
                    st = xor_digest(&ut, &record.back);
                    partial.versions.push(record.masked);
                }
                Err(err) => {
                    debug!(
                        "ChainServer::server_search - chain ends at version {}: {}",
                        version, err
                    );
                    break;
                }
            }
        }
        partial
    }
}
