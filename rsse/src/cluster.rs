//! Cluster scheme
//!
//! The client half of the volume-bounded cluster construction. Sorted
//! keywords are cut greedily into clusters holding fewer than `L` postings
//! each. For every keyword the client uploads the cumulative bitmap of its
//! cluster at the moment the keyword was appended, padded with a keyword
//! specific one-time pad and addressed by a keyed tag. A range query needs
//! at most two of those ciphertexts: the boundary keywords' bitmaps select
//! the partial postings of the two edge clusters, and every cluster in
//! between is returned in full from client state. Clusters are located
//! through a small [`LocalTree`] over their keyword spans.

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    constants::{OTP_LABEL, TAG_LABEL},
    crypto::{expand, kdf, prf, Digest},
    dtypes::{Bitmap, DocumentIdSet, InvertedIndex, Key, KeySpan, QueryRange, SchemeKey},
    error::RsseError,
    logging::{BytesMetric, LatencyMetric},
    server::ClusterServer,
    tree::LocalTree,
    utils::{first_at_least, last_at_most, parse_keyword, validate_keywords},
};

/// Sub-keys derived from the scheme key.
#[derive(Clone)]
pub struct Keys {
    /// Keys the tag addressing a keyword's EDB entry.
    pub k_tag: Key<SchemeKey>,
    /// Keys the seed of a keyword's one-time pad.
    pub k_otp: Key<SchemeKey>,
}

/// A boundary keyword the server has to look up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryTag {
    /// Keyword whose cumulative bitmap is requested.
    pub keyword: u64,
    /// Server-visible tag of that keyword.
    pub tag: Digest,
}

/// Search token of the cluster scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterToken {
    /// No keyword lies in the queried range.
    Empty,
    /// Both edges fall on cluster boundaries: clusters `p1..=p2` are the
    /// answer and the server is not contacted.
    Local { p1: usize, p2: usize },
    /// At least one edge splits a cluster.
    ///
    /// `left` is the keyword just before the first queried keyword of
    /// cluster `p1`; `right` is the last queried keyword of cluster `p2`.
    Remote {
        p1: usize,
        p2: usize,
        left: Option<BoundaryTag>,
        right: Option<BoundaryTag>,
    },
}

impl ClusterToken {
    /// Tags sent to the server, left boundary first.
    pub fn tags(&self) -> Vec<Digest> {
        match self {
            ClusterToken::Remote { left, right, .. } => left
                .iter()
                .chain(right.iter())
                .map(|boundary| boundary.tag)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Client state of the cluster scheme, owning its server.
pub struct ClusterScheme {
    /// Sub-keys.
    keys: Keys,
    /// Volume bound `L`.
    cluster_limit: usize,
    /// Width of every cluster bitmap, `max(L, largest cluster)`.
    bitmap_bits: usize,
    /// Numeric keyword values, ascending.
    keywords: Vec<u64>,
    /// Cluster of every keyword, by rank.
    cluster_of_rank: Vec<usize>,
    /// Postings of a keyword's cluster up to and including the keyword, by rank.
    cumulative: Vec<usize>,
    /// Rank of the first keyword of every cluster.
    cluster_start: Vec<usize>,
    /// Postings per cluster, in insertion order. Bit `i` of a cluster
    /// bitmap stands for `cluster_flist[c][i]`.
    cluster_flist: Vec<Vec<u64>>,
    /// Keywords per cluster.
    cluster_klist: Vec<Vec<String>>,
    /// Lookup tree over cluster spans.
    tree: Option<LocalTree>,
    /// The server holding the encrypted bitmaps.
    pub server: ClusterServer,
}

impl ClusterScheme {
    //////////////////////////////////////////////////////////////////////////////////////////////////
    // Setup Operations
    //////////////////////////////////////////////////////////////////////////////////////////////////

    /// Creates a scheme with volume bound `cluster_limit` and a fresh key.
    pub fn setup(cluster_limit: usize) -> Result<Self, RsseError> {
        Self::setup_with_rng(cluster_limit, &mut ChaCha20Rng::from_entropy())
    }

    /// Same as [`ClusterScheme::setup`], drawing the key from `rng`.
    pub fn setup_with_rng(cluster_limit: usize, rng: &mut ChaCha20Rng) -> Result<Self, RsseError> {
        if cluster_limit == 0 {
            return Err(RsseError::ConfigError(
                "cluster limit must be positive".to_string(),
            ));
        }
        let local_latency = LatencyMetric::new("cluster_setup");
        let key: Key<SchemeKey> = Key::random(rng);
        let keys = Keys {
            k_tag: Key::new(kdf(&key.bytes, TAG_LABEL)?),
            k_otp: Key::new(kdf(&key.bytes, OTP_LABEL)?),
        };
        local_latency.finish();

        Ok(ClusterScheme {
            keys,
            cluster_limit,
            bitmap_bits: cluster_limit,
            keywords: Vec::new(),
            cluster_of_rank: Vec::new(),
            cumulative: Vec::new(),
            cluster_start: Vec::new(),
            cluster_flist: Vec::new(),
            cluster_klist: Vec::new(),
            tree: None,
            server: ClusterServer::new(),
        })
    }

    //////////////////////////////////////////////////////////////////////////////////////////////////
    // Build Operations
    //////////////////////////////////////////////////////////////////////////////////////////////////

    /// Partitions the keywords into clusters, uploads one ciphertext per
    /// keyword and builds the local tree.
    ///
    /// A keyword joins the open cluster iff the cluster stays strictly below
    /// `L` postings; otherwise the open cluster is sealed (an empty cluster
    /// is never sealed) and the keyword starts the next one.
    pub fn build_index(
        &mut self,
        index: &InvertedIndex,
        sorted_keywords: &[String],
    ) -> Result<(), RsseError> {
        let local_latency = LatencyMetric::new("cluster_build_index");
        let keywords = validate_keywords(index, sorted_keywords)?;

        let mut cluster_flist: Vec<Vec<u64>> = vec![Vec::new()];
        let mut cluster_klist: Vec<Vec<String>> = vec![Vec::new()];
        let mut cluster_start = vec![0];
        let mut cluster_of_rank = Vec::with_capacity(keywords.len());
        let mut cumulative = Vec::with_capacity(keywords.len());

        for (rank, keyword) in sorted_keywords.iter().enumerate() {
            let postings = index.get(keyword).map(Vec::as_slice).unwrap_or_default();
            let current = cluster_flist.len() - 1;
            let open_size = cluster_flist[current].len();
            if open_size + postings.len() >= self.cluster_limit
                && !cluster_klist[current].is_empty()
            {
                cluster_flist.push(Vec::new());
                cluster_klist.push(Vec::new());
                cluster_start.push(rank);
            }
            let current = cluster_flist.len() - 1;
            cluster_flist[current].extend_from_slice(postings);
            cluster_klist[current].push(keyword.clone());
            cluster_of_rank.push(current);
            cumulative.push(cluster_flist[current].len());
        }

        let largest = cluster_flist.iter().map(Vec::len).max().unwrap_or_default();
        self.bitmap_bits = self.cluster_limit.max(largest);

        let boundaries = cluster_start
            .iter()
            .enumerate()
            .map(|(cluster, &start)| {
                let end = cluster_start
                    .get(cluster + 1)
                    .copied()
                    .unwrap_or(keywords.len());
                KeySpan::new(keywords[start], keywords[end - 1])
            })
            .collect();

        self.tree = LocalTree::from_boundaries(boundaries);
        self.keywords = keywords;
        self.cluster_of_rank = cluster_of_rank;
        self.cumulative = cumulative;
        self.cluster_start = cluster_start;
        self.cluster_flist = cluster_flist;
        self.cluster_klist = cluster_klist;

        let entries = (0..self.keywords.len())
            .into_par_iter()
            .map(|rank| self.encrypt_keyword(rank))
            .collect::<Result<Vec<_>, RsseError>>()?;
        BytesMetric::new(
            "cluster_edb_size",
            entries.iter().map(|(tag, ct)| tag.len() + ct.len()).sum(),
        )
        .log();
        self.server.edb.clear();
        self.server.store(entries);

        info!(
            "ClusterScheme::build_index - {} keywords in {} clusters, bitmap width {}",
            self.keywords.len(),
            self.cluster_flist.len(),
            self.bitmap_bits
        );
        local_latency.finish();
        Ok(())
    }

    //////////////////////////////////////////////////////////////////////////////////////////////////
    // Search Operations
    //////////////////////////////////////////////////////////////////////////////////////////////////

    /// Derives the search token for `range`.
    ///
    /// The range is clamped into the keyword span first. A boundary that
    /// falls between two keywords moves inward to the nearest keyword.
    pub fn gen_token(&self, range: &QueryRange) -> Result<ClusterToken, RsseError> {
        let local_latency = LatencyMetric::new("cluster_gen_token");
        let tree = self.tree.as_ref().ok_or(RsseError::EmptyIndex)?;
        let (first, last) = match (self.keywords.first(), self.keywords.last()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => return Err(RsseError::EmptyIndex),
        };
        if range.hi < first || range.lo > last {
            local_latency.finish();
            return Ok(ClusterToken::Empty);
        }
        let lo = range.lo.max(first);
        let hi = range.hi.min(last);

        let mut p1 = tree.cluster_of(lo).ok_or_else(|| self.out_of_bounds(usize::MAX))?;
        let mut p2 = tree.cluster_of(hi).ok_or_else(|| self.out_of_bounds(usize::MAX))?;
        self.check_cluster(p1)?;
        self.check_cluster(p2)?;

        // Left edge: the first queried keyword.
        let i = first_at_least(&self.keywords, lo).ok_or(RsseError::EmptyIndex)?;
        if i >= self.cluster_end(p1) {
            p1 += 1;
        }
        let left = if p1 < self.cluster_count() && i > self.cluster_start[p1] {
            Some(i - 1)
        } else {
            None
        };

        // Right edge: the last queried keyword.
        let j = last_at_most(&self.keywords, hi).ok_or(RsseError::EmptyIndex)?;
        if j < self.cluster_start[p2] {
            if p2 == 0 {
                local_latency.finish();
                return Ok(ClusterToken::Empty);
            }
            p2 -= 1;
        }
        let right = if j + 1 < self.cluster_end(p2) {
            Some(j)
        } else {
            None
        };

        let token = if p1 > p2 {
            ClusterToken::Empty
        } else {
            match (left, right) {
                (None, None) => ClusterToken::Local { p1, p2 },
                // Both boundaries on one keyword: the range holds no keyword.
                (Some(l), Some(r)) if p1 == p2 && l == r => ClusterToken::Empty,
                (left, right) => ClusterToken::Remote {
                    p1,
                    p2,
                    left: left.map(|rank| self.boundary(rank)),
                    right: right.map(|rank| self.boundary(rank)),
                },
            }
        };
        debug!("ClusterScheme::gen_token - [{}, {}] -> {:?}", range.lo, range.hi, token);
        BytesMetric::new("cluster_token", token.tags().len() * 32).log();
        local_latency.finish();
        Ok(token)
    }

    /// Forwards the token's tags to the server.
    pub fn search_tokens(&self, token: &ClusterToken) -> Vec<Vec<u8>> {
        self.server.search_tokens(&token.tags())
    }

    /// Resolves a token and the server's ciphertexts into document ids.
    pub fn local_search(
        &self,
        token: &ClusterToken,
        ciphertexts: &[Vec<u8>],
    ) -> Result<DocumentIdSet, RsseError> {
        let local_latency = LatencyMetric::new("cluster_local_search");
        let mut result = DocumentIdSet::new();

        match token {
            ClusterToken::Empty => {}
            ClusterToken::Local { p1, p2 } => {
                self.check_cluster(*p2)?;
                for cluster in *p1..=*p2 {
                    result.extend(self.cluster_flist[cluster].iter().copied());
                }
            }
            ClusterToken::Remote { p1, p2, left, right } => {
                let (p1, p2) = (*p1, *p2);
                self.check_cluster(p1)?;
                self.check_cluster(p2)?;
                let expected = left.is_some() as usize + right.is_some() as usize;
                if ciphertexts.len() != expected {
                    return Err(RsseError::ProtocolError(format!(
                        "expected {} ciphertexts, server returned {}",
                        expected,
                        ciphertexts.len()
                    )));
                }

                match (left, right) {
                    (Some(l), Some(r)) if p1 == p2 => {
                        let lower = self.decrypt(l.keyword, &ciphertexts[0])?;
                        let upper = self.decrypt(r.keyword, &ciphertexts[1])?;
                        self.collect_bits(p1, &lower.xor(&upper)?, &mut result)?;
                    }
                    _ => {
                        let mut middle_start = p1;
                        let mut middle_end = p2 + 1;
                        let mut next = ciphertexts.iter();
                        let mut pull = || {
                            next.next().ok_or_else(|| {
                                RsseError::ProtocolError("missing boundary ciphertext".to_string())
                            })
                        };
                        if let Some(l) = left {
                            let lower = self.decrypt(l.keyword, pull()?)?;
                            let all = Bitmap::with_prefix_ones(
                                self.cluster_flist[p1].len(),
                                self.bitmap_bits,
                            );
                            self.collect_bits(p1, &lower.xor(&all)?, &mut result)?;
                            middle_start = p1 + 1;
                        }
                        if let Some(r) = right {
                            let upper = self.decrypt(r.keyword, pull()?)?;
                            self.collect_bits(p2, &upper, &mut result)?;
                            middle_end = p2;
                        }
                        for cluster in middle_start..middle_end {
                            result.extend(self.cluster_flist[cluster].iter().copied());
                        }
                    }
                }
            }
        }

        local_latency.finish();
        Ok(result)
    }

    //////////////////////////////////////////////////////////////////////////////////////////////////
    // Update Operations
    //////////////////////////////////////////////////////////////////////////////////////////////////

    /// Adds `postings` to an indexed keyword.
    ///
    /// The postings are inserted right after the keyword's existing ones,
    /// which shifts the cumulative bitmaps of every later keyword in the
    /// cluster, so the whole cluster is re-encrypted and re-uploaded.
    pub fn update(&mut self, keyword: &str, postings: &[u64]) -> Result<(), RsseError> {
        let local_latency = LatencyMetric::new("cluster_update");
        let tree = self.tree.as_ref().ok_or(RsseError::EmptyIndex)?;
        let unknown = || RsseError::UnknownKeyword(keyword.to_string());
        let value = parse_keyword(keyword).map_err(|_| unknown())?;

        let cluster = tree.cluster_of(value).ok_or_else(unknown)?;
        let rank = self
            .keywords
            .binary_search(&value)
            .map_err(|_| unknown())?;
        if self.cluster_of_rank[rank] != cluster {
            return Err(unknown());
        }

        let size = self.cluster_flist[cluster].len() + postings.len();
        if size > self.bitmap_bits {
            return Err(RsseError::ClusterOverflow {
                cluster,
                size,
                width: self.bitmap_bits,
            });
        }

        let at = self.cumulative[rank];
        self.cluster_flist[cluster].splice(at..at, postings.iter().copied());
        let end = self.cluster_end(cluster);
        for later in rank..end {
            self.cumulative[later] += postings.len();
        }

        let entries = (self.cluster_start[cluster]..end)
            .map(|rank| self.encrypt_keyword(rank))
            .collect::<Result<Vec<_>, RsseError>>()?;
        self.server.store(entries);

        debug!(
            "ClusterScheme::update - keyword {} gained {} postings, cluster {} now holds {}",
            keyword,
            postings.len(),
            cluster,
            size
        );
        local_latency.finish();
        Ok(())
    }

    //////////////////////////////////////////////////////////////////////////////////////////////////
    // Accessors
    //////////////////////////////////////////////////////////////////////////////////////////////////

    /// Postings per cluster, in insertion order.
    pub fn cluster_flist(&self) -> &[Vec<u64>] {
        &self.cluster_flist
    }

    /// Keywords per cluster.
    pub fn cluster_klist(&self) -> &[Vec<String>] {
        &self.cluster_klist
    }

    pub fn cluster_count(&self) -> usize {
        self.cluster_flist.len()
    }

    pub fn cluster_limit(&self) -> usize {
        self.cluster_limit
    }

    pub fn bitmap_bits(&self) -> usize {
        self.bitmap_bits
    }

    pub fn tree(&self) -> Option<&LocalTree> {
        self.tree.as_ref()
    }

    /// Server-visible tag of a keyword value.
    pub fn tag(&self, keyword: u64) -> Digest {
        prf(&self.keys.k_tag.bytes, keyword.to_string().as_bytes())
    }

    //////////////////////////////////////////////////////////////////////////////////////////////////
    // Internals
    //////////////////////////////////////////////////////////////////////////////////////////////////

    fn pad(&self, keyword: u64) -> Vec<u8> {
        let seed = prf(&self.keys.k_otp.bytes, keyword.to_string().as_bytes());
        expand(&seed, OTP_LABEL, self.bitmap_bits.div_ceil(8))
    }

    fn encrypt_keyword(&self, rank: usize) -> Result<(Digest, Vec<u8>), RsseError> {
        let keyword = self.keywords[rank];
        let bitmap = Bitmap::with_prefix_ones(self.cumulative[rank], self.bitmap_bits);
        let ciphertext = bitmap.xor_bytes(&self.pad(keyword))?;
        Ok((self.tag(keyword), ciphertext.as_bytes().to_vec()))
    }

    fn decrypt(&self, keyword: u64, ciphertext: &[u8]) -> Result<Bitmap, RsseError> {
        Bitmap::from_bytes(self.bitmap_bits, ciphertext.to_vec())?.xor_bytes(&self.pad(keyword))
    }

    fn boundary(&self, rank: usize) -> BoundaryTag {
        let keyword = self.keywords[rank];
        BoundaryTag {
            keyword,
            tag: self.tag(keyword),
        }
    }

    /// Maps set bits of a cluster bitmap to postings.
    fn collect_bits(
        &self,
        cluster: usize,
        bitmap: &Bitmap,
        result: &mut DocumentIdSet,
    ) -> Result<(), RsseError> {
        let flist = &self.cluster_flist[cluster];
        for bit in bitmap.ones() {
            let posting = flist.get(bit).ok_or_else(|| {
                RsseError::ProtocolError(format!(
                    "bit {} set past the {} postings of cluster {}",
                    bit,
                    flist.len(),
                    cluster
                ))
            })?;
            result.insert(*posting);
        }
        Ok(())
    }

    /// One past the rank of the last keyword of `cluster`.
    fn cluster_end(&self, cluster: usize) -> usize {
        self.cluster_start
            .get(cluster + 1)
            .copied()
            .unwrap_or(self.keywords.len())
    }

    fn check_cluster(&self, cluster: usize) -> Result<(), RsseError> {
        if cluster >= self.cluster_count() {
            return Err(self.out_of_bounds(cluster));
        }
        Ok(())
    }

    fn out_of_bounds(&self, index: usize) -> RsseError {
        RsseError::ClusterOutOfBounds {
            index,
            len: self.cluster_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (InvertedIndex, Vec<String>) {
        let mut index = InvertedIndex::new();
        index.insert("1".to_string(), vec![1, 2]);
        index.insert("2".to_string(), vec![3, 4, 5]);
        index.insert("3".to_string(), vec![6, 7]);
        index.insert("4".to_string(), vec![8, 9, 10, 11]);
        index.insert("50".to_string(), vec![12, 13, 14, 15, 16]);
        let sorted = ["1", "2", "3", "4", "50"].iter().map(|s| s.to_string()).collect();
        (index, sorted)
    }

    fn scheme() -> ClusterScheme {
        let (index, sorted) = fixture();
        let mut scheme =
            ClusterScheme::setup_with_rng(10, &mut ChaCha20Rng::from_seed([3u8; 32])).unwrap();
        scheme.build_index(&index, &sorted).unwrap();
        scheme
    }

    #[test]
    fn test_tokens_by_edge_alignment() {
        let scheme = scheme();
        assert_eq!(
            scheme.gen_token(&QueryRange::new(1, 50).unwrap()).unwrap(),
            ClusterToken::Local { p1: 0, p2: 1 }
        );
        assert_eq!(
            scheme.gen_token(&QueryRange::new(100, 200).unwrap()).unwrap(),
            ClusterToken::Empty
        );
        // 6..=9 lies strictly between keywords "4" and "50".
        assert_eq!(
            scheme.gen_token(&QueryRange::new(6, 9).unwrap()).unwrap(),
            ClusterToken::Empty
        );
        match scheme.gen_token(&QueryRange::new(2, 4).unwrap()).unwrap() {
            ClusterToken::Remote { p1, p2, left, right } => {
                assert_eq!((p1, p2), (0, 1));
                assert_eq!(left.map(|b| b.keyword), Some(1));
                assert_eq!(right.map(|b| b.keyword), Some(4));
            }
            other => panic!("unexpected token {:?}", other),
        }
    }

    #[test]
    fn test_ciphertext_count_mismatch() {
        let scheme = scheme();
        let token = scheme.gen_token(&QueryRange::new(2, 4).unwrap()).unwrap();
        assert!(matches!(
            scheme.local_search(&token, &[]),
            Err(RsseError::ProtocolError(_))
        ));
    }
}
