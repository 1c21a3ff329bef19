//! Crypto helper functions

use crate::constants::{HASH_BYTES, KDF_SALT, LAMBDA_BYTES};
use crate::error::RsseError;
use rand::RngCore;
use ring::{digest, hkdf, hmac};

/// A 32-byte hash output (H1, PRF, chain tokens, EDB addresses).
pub type Digest = [u8; HASH_BYTES];

/// A custom KeyType that tells Ring's HKDF to produce a LAMBDA_BYTES output.
struct SubKey;

impl hkdf::KeyType for SubKey {
    fn len(&self) -> usize {
        LAMBDA_BYTES
    }
}

/// Key Derivation Function (KDF) that derives a 16-byte sub-key from a scheme key and a label.
///
/// Uses HKDF-SHA256 with a fixed salt; the label is the HKDF "info".
///
/// # Arguments
/// * `key` - The scheme key (must be LAMBDA_BYTES long)
/// * `label` - Domain separation label
///
/// # Returns
/// * `Ok(Vec<u8>)` - The derived key
/// * `Err(RsseError)` - If the key length is invalid or HKDF fails
pub fn kdf(key: &[u8], label: &[u8]) -> Result<Vec<u8>, RsseError> {
    if key.len() != LAMBDA_BYTES {
        return Err(RsseError::CryptoError("Invalid key length".to_string()));
    }

    let salt = digest::digest(&digest::SHA256, KDF_SALT);
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, salt.as_ref()).extract(key);

    let info = [label];
    let okm = prk
        .expand(&info, SubKey)
        .map_err(|_| RsseError::CryptoError("HKDF expansion failed".to_string()))?;

    let mut result = [0u8; LAMBDA_BYTES];
    okm.fill(&mut result)
        .map_err(|_| RsseError::CryptoError("HKDF fill failed".to_string()))?;

    Ok(result.to_vec())
}

/// H1: SHA-256 over the concatenation of `parts`.
pub fn h1(parts: &[&[u8]]) -> Digest {
    let mut ctx = digest::Context::new(&digest::SHA256);
    for part in parts {
        ctx.update(part);
    }
    let mut out = [0u8; HASH_BYTES];
    out.copy_from_slice(ctx.finish().as_ref());
    out
}

/// PRF instantiated with HMAC-SHA256, full 32-byte tag.
pub fn prf(key: &[u8], input: &[u8]) -> Digest {
    let signing_key = hmac::Key::new(hmac::HMAC_SHA256, key);
    let tag = hmac::sign(&signing_key, input);
    let mut out = [0u8; HASH_BYTES];
    out.copy_from_slice(tag.as_ref());
    out
}

/// Expands `seed` into `length` pseudorandom bytes.
///
/// Counter-mode HMAC-SHA256: block `i` is `HMAC(seed, input || i)`. Used for
/// one-time pads and additive masks that must match a bitmap's byte length.
pub fn expand(seed: &[u8], input: &[u8], length: usize) -> Vec<u8> {
    let signing_key = hmac::Key::new(hmac::HMAC_SHA256, seed);
    let mut out = Vec::with_capacity(length + HASH_BYTES);
    let mut counter: u32 = 0;
    while out.len() < length {
        let mut ctx = hmac::Context::with_key(&signing_key);
        ctx.update(input);
        ctx.update(&counter.to_be_bytes());
        out.extend_from_slice(ctx.sign().as_ref());
        counter += 1;
    }
    out.truncate(length);
    out
}

/// XOR of two equal-length byte strings.
///
/// Operands of different lengths indicate corrupted state and are rejected
/// rather than truncated.
pub fn xor(a: &[u8], b: &[u8]) -> Result<Vec<u8>, RsseError> {
    if a.len() != b.len() {
        return Err(RsseError::XorLengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(a.iter().zip(b).map(|(x, y)| x ^ y).collect())
}

/// XOR of two digests.
pub fn xor_digest(a: &Digest, b: &Digest) -> Digest {
    let mut out = [0u8; HASH_BYTES];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b)) {
        *o = x ^ y;
    }
    out
}

/// Draws a fresh random chain token.
pub fn random_token<R: RngCore>(rng: &mut R) -> Digest {
    let mut token = [0u8; HASH_BYTES];
    rng.fill_bytes(&mut token);
    token
}
