//! Constants used in the rsse protocols, plus the run parameters the
//! experiment driver reads.

use serde::{Deserialize, Serialize};

/// Security parameter for keys in bits.
pub const LAMBDA: usize = 128;

/// Size of a scheme master key in bytes.
pub const LAMBDA_BYTES: usize = LAMBDA / 8;

/// Output size of H1 / the PRF (SHA-256) in bytes. Every EDB address and
/// chain token has this length.
pub const HASH_BYTES: usize = 32;

/// Default cluster volume bound `L` for the cluster scheme.
pub const DEFAULT_CLUSTER_LIMIT: usize = 6424;

/// Default bitmap length in bits for the chain scheme.
pub const DEFAULT_BITMAP_BITS: usize = 1 << 15;

/// Domain separation labels fed to the PRF.
pub const TAG_LABEL: &[u8] = b"rsse-tag";
pub const OTP_LABEL: &[u8] = b"rsse-otp";
pub const CHAIN_LABEL: &[u8] = b"rsse-chain";

/// Fixed salt for HKDF sub-key derivation.
pub const KDF_SALT: &[u8] = b"rsse-expand-salt";

/// Fixed seed used by the comparison driver so repeated runs issue the same queries.
pub const FIXED_SEED_QUERY_RNG: [u8; 32] = [7u8; 32];

/// Number of random queries issued per scheme by the comparison driver.
pub const QUERY_COUNT: usize = 500;

/// Number of most recent samples averaged separately in metric reports.
pub const LATENCY_BENCH_COUNT: usize = 10;

/// Parameters of one scheme comparison run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeParams {
    /// Cluster volume bound `L`.
    pub cluster_limit: usize,
    /// Chain scheme bitmap width in bits.
    pub bitmap_bits: usize,
    /// Number of random range queries per scheme.
    pub query_count: usize,
    /// Seed of the query generator.
    pub query_seed: [u8; 32],
}

impl Default for SchemeParams {
    fn default() -> Self {
        SchemeParams {
            cluster_limit: DEFAULT_CLUSTER_LIMIT,
            bitmap_bits: DEFAULT_BITMAP_BITS,
            query_count: QUERY_COUNT,
            query_seed: FIXED_SEED_QUERY_RNG,
        }
    }
}

impl SchemeParams {
    /// Rejects parameters no scheme can be set up with.
    pub fn validate(&self) -> Result<(), crate::error::RsseError> {
        if self.cluster_limit == 0 {
            return Err(crate::error::RsseError::ConfigError(
                "cluster limit must be positive".to_string(),
            ));
        }
        if self.bitmap_bits == 0 {
            return Err(crate::error::RsseError::ConfigError(
                "bitmap length must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
