//! Chain scheme
//!
//! The client half of the volume-hiding construction. Keyword ranks are the
//! leaves of a binary trie of height `h = ceil(log2(n))`; every trie node
//! carries the OR of its leaves' posting bitmaps. A node is uploaded as a
//! hash chain of versions: version `j` lives at `UT_{j+1} = H1(K_w || ST_{j+1})`
//! and holds the node bitmap additively masked with `mask(H1(K_w || j))`
//! together with the link `UT_{j+1} XOR ST_j` to the version before it. The
//! client keeps only the latest version counter and chain head per node.
//!
//! A range query maps its boundaries to ranks, covers the rank range with
//! [`range_cover`] and hands the server one triple per covering node. The
//! server walks and deletes the chains; the client strips the masks of the
//! versions it got back.
//!
//! Reading a version removes it from the server. A node that was queried
//! returns only what [`ChainScheme::update`] appended to it afterwards.

use std::collections::{BTreeMap, HashMap};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    constants::CHAIN_LABEL,
    cover::range_cover,
    crypto::{expand, h1, kdf, prf, random_token, xor_digest, Digest},
    dtypes::{Bitmap, DocumentIdSet, InvertedIndex, Key, PrefixCode, QueryRange, SchemeKey},
    error::RsseError,
    logging::{BytesMetric, LatencyMetric},
    server::{ChainRecord, ChainResponse, ChainServer, ChainTriple},
    utils::{ceil_log2, first_at_least, last_at_most, parse_keyword, validate_keywords},
};

/// Client state of one trie node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    /// Latest version `c`.
    pub counter: u64,
    /// Chain head `ST_{c+1}`.
    pub token: Digest,
}

/// Search token of the chain scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainToken {
    /// No keyword lies in the range, or a covering node was never issued.
    Empty,
    /// One triple per covering node, in cover order.
    Triples(Vec<ChainTriple>),
}

impl ChainToken {
    pub fn triples(&self) -> &[ChainTriple] {
        match self {
            ChainToken::Empty => &[],
            ChainToken::Triples(triples) => triples,
        }
    }
}

/// Client state of the chain scheme, owning its server.
pub struct ChainScheme {
    /// PRF key for per-node keys `K_w`.
    k_node: Key<SchemeKey>,
    /// Bitmap width in bits.
    bitmap_bits: usize,
    /// Numeric keyword values, ascending; the rank is the leaf code.
    keywords: Vec<u64>,
    /// Trie height `h`; codes are `h + 1` bits wide.
    height: u32,
    /// Counter and chain head per issued node.
    ct: HashMap<PrefixCode, ChainEntry>,
    /// Source of chain tokens.
    rng: ChaCha20Rng,
    /// The server holding the chains.
    pub server: ChainServer,
}

/// Additive mask of version `version` of the node keyed by `k_w`.
fn version_mask(k_w: &Digest, version: u64, len: usize) -> Vec<u8> {
    let sk = h1(&[&k_w[..], &version.to_be_bytes()[..]]);
    expand(&sk, CHAIN_LABEL, len)
}

impl ChainScheme {
    //////////////////////////////////////////////////////////////////////////////////////////////////
    // Setup Operations
    //////////////////////////////////////////////////////////////////////////////////////////////////

    /// Creates a scheme over `bitmap_bits`-bit bitmaps with a fresh key.
    pub fn setup(bitmap_bits: usize) -> Result<Self, RsseError> {
        Self::setup_with_rng(bitmap_bits, ChaCha20Rng::from_entropy())
    }

    /// Same as [`ChainScheme::setup`]; keys and chain tokens come from `rng`.
    pub fn setup_with_rng(bitmap_bits: usize, mut rng: ChaCha20Rng) -> Result<Self, RsseError> {
        if bitmap_bits == 0 {
            return Err(RsseError::ConfigError(
                "bitmap length must be positive".to_string(),
            ));
        }
        let local_latency = LatencyMetric::new("chain_setup");
        let key: Key<SchemeKey> = Key::random(&mut rng);
        let k_node = Key::new(kdf(&key.bytes, CHAIN_LABEL)?);
        local_latency.finish();

        Ok(ChainScheme {
            k_node,
            bitmap_bits,
            keywords: Vec::new(),
            height: 0,
            ct: HashMap::new(),
            rng,
            server: ChainServer::new(),
        })
    }

    //////////////////////////////////////////////////////////////////////////////////////////////////
    // Build Operations
    //////////////////////////////////////////////////////////////////////////////////////////////////

    /// Aggregates postings into every trie node and uploads one chain
    /// version per node.
    ///
    /// The version counter of a node is the number of keywords below it
    /// minus one.
    pub fn build_index(
        &mut self,
        index: &InvertedIndex,
        sorted_keywords: &[String],
    ) -> Result<(), RsseError> {
        let local_latency = LatencyMetric::new("chain_build_index");
        let keywords = validate_keywords(index, sorted_keywords)?;
        let height = ceil_log2(keywords.len());
        let width = height + 1;

        // Ordered so that token draws do not depend on hash iteration order.
        let mut nodes: BTreeMap<(u32, u64), (Bitmap, u64)> = BTreeMap::new();
        for (rank, keyword) in sorted_keywords.iter().enumerate() {
            let postings = index.get(keyword).map(Vec::as_slice).unwrap_or_default();
            let leaf_bitmap = self.posting_bitmap(postings)?;
            for code in PrefixCode::leaf(rank as u64, width).ancestors() {
                let (bitmap, count) = nodes
                    .entry((code.wildcards(), code.value()))
                    .or_insert_with(|| (Bitmap::new(self.bitmap_bits), 0));
                bitmap.union_with(&leaf_bitmap)?;
                *count += 1;
            }
        }

        let seeded: Vec<(PrefixCode, Bitmap, u64, [u8; 32])> = nodes
            .into_iter()
            .map(|((wildcards, value), (bitmap, count))| {
                let code = PrefixCode::new(value, width - wildcards, wildcards);
                (code, bitmap, count - 1, self.rng.gen())
            })
            .collect();

        let encrypted = seeded
            .into_par_iter()
            .map(|(code, bitmap, counter, seed)| {
                let mut node_rng = ChaCha20Rng::from_seed(seed);
                let k_w = self.node_key(&code);
                let st_prev = random_token(&mut node_rng);
                let st_head = random_token(&mut node_rng);
                let (ut, record) = self.seal_version(&k_w, counter, &bitmap, &st_prev, &st_head)?;
                Ok((
                    code,
                    ChainEntry {
                        counter,
                        token: st_head,
                    },
                    ut,
                    record,
                ))
            })
            .collect::<Result<Vec<_>, RsseError>>()?;

        self.keywords = keywords;
        self.height = height;
        self.ct.clear();
        let mut uploads = Vec::with_capacity(encrypted.len());
        for (code, entry, ut, record) in encrypted {
            self.ct.insert(code, entry);
            uploads.push((ut, record));
        }
        BytesMetric::new(
            "chain_edb_size",
            uploads
                .iter()
                .map(|(ut, record)| ut.len() + record.masked.byte_len() + record.back.len())
                .sum(),
        )
        .log();
        self.server.edb.clear();
        self.server.store(uploads);

        info!(
            "ChainScheme::build_index - {} keywords, height {}, {} nodes",
            self.keywords.len(),
            self.height,
            self.ct.len()
        );
        local_latency.finish();
        Ok(())
    }

    //////////////////////////////////////////////////////////////////////////////////////////////////
    // Search Operations
    //////////////////////////////////////////////////////////////////////////////////////////////////

    /// Derives the search token for `range`.
    ///
    /// A node of the cover that was never issued fails the whole query
    /// closed to [`ChainToken::Empty`].
    pub fn gen_token(&self, range: &QueryRange) -> Result<ChainToken, RsseError> {
        let local_latency = LatencyMetric::new("chain_gen_token");
        let ranks = (
            first_at_least(&self.keywords, range.lo),
            last_at_most(&self.keywords, range.hi),
        );
        let (lo_rank, hi_rank) = match ranks {
            (Some(lo), Some(hi)) if lo <= hi => (lo as u64, hi as u64),
            _ => {
                local_latency.finish();
                return Ok(ChainToken::Empty);
            }
        };

        let cover = range_cover(lo_rank, hi_rank, self.height)?;
        let mut triples = Vec::with_capacity(cover.len());
        for code in &cover {
            let Some(entry) = self.ct.get(code) else {
                warn!("ChainScheme::gen_token - node {} was never issued", code);
                local_latency.finish();
                return Ok(ChainToken::Empty);
            };
            triples.push(ChainTriple {
                k_w: self.node_key(code),
                st: entry.token,
                counter: entry.counter,
            });
        }
        debug!(
            "ChainScheme::gen_token - ranks [{}, {}] covered by {} nodes",
            lo_rank,
            hi_rank,
            triples.len()
        );
        BytesMetric::new("chain_token", triples.len() * (32 + 32 + 8)).log();
        local_latency.finish();
        Ok(ChainToken::Triples(triples))
    }

    /// Hands the token's triples to the server.
    pub fn server_search(&self, token: &ChainToken) -> ChainResponse {
        match token {
            ChainToken::Empty => ChainResponse::default(),
            ChainToken::Triples(triples) => self.server.server_search(triples),
        }
    }

    /// Strips the version masks and ORs the node bitmaps into document ids.
    pub fn local_parse(
        &self,
        token: &ChainToken,
        response: &ChainResponse,
    ) -> Result<DocumentIdSet, RsseError> {
        let local_latency = LatencyMetric::new("chain_local_parse");
        let triples = token.triples();
        if response.partials.len() != triples.len() {
            return Err(RsseError::ProtocolError(format!(
                "{} triples but {} partial results",
                triples.len(),
                response.partials.len()
            )));
        }

        let mut union = Bitmap::new(self.bitmap_bits);
        for (triple, partial) in triples.iter().zip(&response.partials) {
            for (step, masked) in partial.versions.iter().enumerate() {
                let version = triple.counter.checked_sub(step as u64).ok_or_else(|| {
                    RsseError::ProtocolError(format!(
                        "{} versions returned for counter {}",
                        partial.steps(),
                        triple.counter
                    ))
                })?;
                let mask = version_mask(&triple.k_w, version, masked.byte_len());
                union.union_with(&masked.wrapping_sub(&mask)?)?;
            }
        }

        local_latency.finish();
        Ok(union.ones().map(|bit| bit as u64).collect())
    }

    //////////////////////////////////////////////////////////////////////////////////////////////////
    // Update Operations
    //////////////////////////////////////////////////////////////////////////////////////////////////

    /// Appends a version holding `postings` to every node above `keyword`.
    pub fn update(&mut self, keyword: &str, postings: &[u64]) -> Result<(), RsseError> {
        let local_latency = LatencyMetric::new("chain_update");
        let unknown = || RsseError::UnknownKeyword(keyword.to_string());
        let value = parse_keyword(keyword).map_err(|_| unknown())?;
        let rank = self.keywords.binary_search(&value).map_err(|_| unknown())?;
        let delta = self.posting_bitmap(postings)?;

        // Client state and server store change together, after every node sealed.
        let mut heads = Vec::new();
        let mut uploads = Vec::new();
        for code in PrefixCode::leaf(rank as u64, self.height + 1).ancestors() {
            let entry = *self.ct.get(&code).ok_or_else(unknown)?;
            let k_w = self.node_key(&code);
            let counter = entry.counter + 1;
            let st_head = random_token(&mut self.rng);
            let (ut, record) = self.seal_version(&k_w, counter, &delta, &entry.token, &st_head)?;
            heads.push((
                code,
                ChainEntry {
                    counter,
                    token: st_head,
                },
            ));
            uploads.push((ut, record));
        }
        debug!(
            "ChainScheme::update - keyword {} appended to {} nodes",
            keyword,
            uploads.len()
        );
        self.ct.extend(heads);
        self.server.store(uploads);
        local_latency.finish();
        Ok(())
    }

    //////////////////////////////////////////////////////////////////////////////////////////////////
    // Accessors
    //////////////////////////////////////////////////////////////////////////////////////////////////

    pub fn bitmap_bits(&self) -> usize {
        self.bitmap_bits
    }

    /// Trie height `h`.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Client state of a node, if issued.
    pub fn entry(&self, code: &PrefixCode) -> Option<&ChainEntry> {
        self.ct.get(code)
    }

    pub fn node_count(&self) -> usize {
        self.ct.len()
    }

    //////////////////////////////////////////////////////////////////////////////////////////////////
    // Internals
    //////////////////////////////////////////////////////////////////////////////////////////////////

    fn node_key(&self, code: &PrefixCode) -> Digest {
        prf(&self.k_node.bytes, code.to_string().as_bytes())
    }

    fn posting_bitmap(&self, postings: &[u64]) -> Result<Bitmap, RsseError> {
        let mut bitmap = Bitmap::new(self.bitmap_bits);
        for &posting in postings {
            bitmap.set(posting)?;
        }
        Ok(bitmap)
    }

    /// Encrypts version `counter` of a node. `st_prev` is `ST_counter`,
    /// `st_head` is `ST_{counter+1}`.
    fn seal_version(
        &self,
        k_w: &Digest,
        counter: u64,
        bitmap: &Bitmap,
        st_prev: &Digest,
        st_head: &Digest,
    ) -> Result<(Digest, ChainRecord), RsseError> {
        let ut = h1(&[&k_w[..], &st_head[..]]);
        let mask = version_mask(k_w, counter, bitmap.byte_len());
        let record = ChainRecord {
            masked: bitmap.wrapping_add(&mask)?,
            back: xor_digest(&ut, st_prev),
        };
        Ok((ut, record))
    }
}
