//! # RSSE Data Types
//!
//! This module contains the core data types shared by both range schemes.
//!
//! The main types defined here are:
//! - `Key`: Cryptographic keys used for PRF and pad derivation
//! - `Bitmap`: Fixed-width posting bitmaps, XOR-able and additively maskable
//! - `PrefixCode`: Wildcard-suffixed binary codes naming trie nodes
//! - `Path` / `Direction`: Root-to-node paths in the array-indexed local tree
//! - `KeySpan`: Keyword span stored at every local tree node
//! - `QueryRange`: Validated inclusive integer range
//!
//! Every type that crosses the client/server boundary derives serde so a
//! transport can be layered on without touching the schemes.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{constants::LAMBDA, error::RsseError};

/// Keyword → postings, the sole input to index construction.
pub type InvertedIndex = HashMap<String, Vec<u64>>;

/// Final answer of a range query.
pub type DocumentIdSet = BTreeSet<u64>;

/// Trait defining the behavior and size for cryptographic keys
pub trait Size {
    const SIZE: usize;
}

/// Marker for scheme master keys.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Eq, Hash)]
pub struct SchemeKey;
impl Size for SchemeKey {
    const SIZE: usize = LAMBDA / 8;
}

#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize, Default)]
/// A cryptographic key, represented as a vector of bytes
pub struct Key<S: Size> {
    pub bytes: Vec<u8>,
    _marker: PhantomData<S>,
}

impl<S: Size> Key<S> {
    /// Create a new Key instance with a given vector of bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Key {
            bytes,
            _marker: PhantomData,
        }
    }

    /// Create a new random Key instance
    pub fn random<R: RngCore + Rng>(rng: &mut R) -> Self {
        Key {
            bytes: (0..S::SIZE).map(|_| rng.gen()).collect(),
            _marker: PhantomData,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// An enum representing the direction of a path in the tree
pub enum Direction {
    /// Left direction
    Left,
    /// Right direction
    Right,
}

impl From<Direction> for u8 {
    fn from(val: Direction) -> Self {
        match val {
            Direction::Left => 0,
            Direction::Right => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
/// A path from the root of the tree, represented as a vector of directions
pub struct Path(pub Vec<Direction>);

impl Path {
    /// Create a new Path instance with a given vector of directions
    pub fn new(directions: Vec<Direction>) -> Self {
        Path(directions)
    }

    /// Get the length of the path
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the path is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add a direction to the path
    pub fn push(&mut self, direction: Direction) {
        self.0.push(direction);
    }

    /// Position of the reached node among the nodes of its level, reading
    /// the directions as a big-endian binary number.
    pub fn position(&self) -> usize {
        self.0
            .iter()
            .fold(0, |acc, &d| (acc << 1) | u8::from(d) as usize)
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Direction;
    type IntoIter = std::slice::Iter<'a, Direction>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<usize> for Path {
    /// Path to the node stored at array index `value` (root = 1).
    fn from(value: usize) -> Self {
        let mut directions = Vec::new();
        let mut value = value;
        while value > 1 {
            directions.push(if value & 1 == 1 {
                Direction::Right
            } else {
                Direction::Left
            });
            value >>= 1;
        }
        directions.reverse();
        Path(directions)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
/// The `[min, max]` keyword span of a local tree subtree
pub struct KeySpan {
    pub min: u64,
    pub max: u64,
}

impl KeySpan {
    pub fn new(min: u64, max: u64) -> Self {
        KeySpan { min, max }
    }

    /// Span covering both children.
    pub fn merge(&self, right: &KeySpan) -> Self {
        KeySpan {
            min: self.min.min(right.min),
            max: self.max.max(right.max),
        }
    }

    pub fn contains(&self, value: u64) -> bool {
        self.min <= value && value <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Inclusive integer query range with `lo <= hi`
pub struct QueryRange {
    pub lo: u64,
    pub hi: u64,
}

impl QueryRange {
    pub fn new(lo: u64, hi: u64) -> Result<Self, RsseError> {
        if lo > hi {
            return Err(RsseError::MalformedRange(format!("{} > {}", lo, hi)));
        }
        Ok(QueryRange { lo, hi })
    }

    /// Parses decimal boundaries, rejecting unparsable or inverted input.
    pub fn parse(lo: &str, hi: &str) -> Result<Self, RsseError> {
        let parse = |s: &str| {
            s.trim()
                .parse::<u64>()
                .map_err(|_| RsseError::MalformedRange(format!("unparsable boundary '{}'", s)))
        };
        QueryRange::new(parse(lo)?, parse(hi)?)
    }

    pub fn contains(&self, value: u64) -> bool {
        self.lo <= value && value <= self.hi
    }
}

/// Fixed-width bitmap. Bit `i` lives in byte `i / 8` at position `i % 8`, so
/// the byte vector doubles as a little-endian integer modulo `2^(8 * bytes)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bitmap {
    bits: usize,
    bytes: Vec<u8>,
}

impl Bitmap {
    /// All-zero bitmap of `bits` bits.
    pub fn new(bits: usize) -> Self {
        Bitmap {
            bits,
            bytes: vec![0u8; bits.div_ceil(8)],
        }
    }

    /// Wraps raw bytes, which must be exactly `bits` rounded up to bytes.
    pub fn from_bytes(bits: usize, bytes: Vec<u8>) -> Result<Self, RsseError> {
        if bytes.len() != bits.div_ceil(8) {
            return Err(RsseError::XorLengthMismatch {
                left: bytes.len(),
                right: bits.div_ceil(8),
            });
        }
        Ok(Bitmap { bits, bytes })
    }

    /// Bitmap with bits `0..count` set: a cluster's cumulative bitmap after
    /// `count` postings have been appended.
    pub fn with_prefix_ones(count: usize, bits: usize) -> Self {
        let mut bitmap = Bitmap::new(bits);
        let count = count.min(bits);
        let full = count / 8;
        bitmap.bytes[..full].fill(0xff);
        if count % 8 != 0 {
            bitmap.bytes[full] = (1u8 << (count % 8)) - 1;
        }
        bitmap
    }

    /// Width in bits.
    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Sets bit `index`.
    pub fn set(&mut self, index: u64) -> Result<(), RsseError> {
        if index >= self.bits as u64 {
            return Err(RsseError::PostingOutOfRange {
                posting: index,
                bits: self.bits,
            });
        }
        let index = index as usize;
        self.bytes[index / 8] |= 1 << (index % 8);
        Ok(())
    }

    pub fn get(&self, index: usize) -> bool {
        index < self.bits && (self.bytes[index / 8] >> (index % 8)) & 1 == 1
    }

    /// In-place OR.
    pub fn union_with(&mut self, other: &Bitmap) -> Result<(), RsseError> {
        self.check_len(other.bytes.len())?;
        for (a, b) in self.bytes.iter_mut().zip(&other.bytes) {
            *a |= b;
        }
        Ok(())
    }

    /// XOR with another bitmap of the same width.
    pub fn xor(&self, other: &Bitmap) -> Result<Bitmap, RsseError> {
        self.xor_bytes(&other.bytes)
    }

    /// XOR with a pad of the same byte length.
    pub fn xor_bytes(&self, pad: &[u8]) -> Result<Bitmap, RsseError> {
        Ok(Bitmap {
            bits: self.bits,
            bytes: crate::crypto::xor(&self.bytes, pad)?,
        })
    }

    /// Addition modulo `2^(8 * bytes)`.
    pub fn wrapping_add(&self, mask: &[u8]) -> Result<Bitmap, RsseError> {
        self.check_len(mask.len())?;
        let mut out = Vec::with_capacity(self.bytes.len());
        let mut carry = 0u16;
        for (a, b) in self.bytes.iter().zip(mask) {
            let sum = *a as u16 + *b as u16 + carry;
            out.push(sum as u8);
            carry = sum >> 8;
        }
        Ok(Bitmap {
            bits: self.bits,
            bytes: out,
        })
    }

    /// Subtraction modulo `2^(8 * bytes)`.
    pub fn wrapping_sub(&self, mask: &[u8]) -> Result<Bitmap, RsseError> {
        self.check_len(mask.len())?;
        let mut out = Vec::with_capacity(self.bytes.len());
        let mut borrow = 0i16;
        for (a, b) in self.bytes.iter().zip(mask) {
            let mut diff = *a as i16 - *b as i16 - borrow;
            if diff < 0 {
                diff += 256;
                borrow = 1;
            } else {
                borrow = 0;
            }
            out.push(diff as u8);
        }
        Ok(Bitmap {
            bits: self.bits,
            bytes: out,
        })
    }

    /// Indices of set bits, ascending. Padding bits past `bits` are ignored.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.bits).filter(move |&i| self.get(i))
    }

    pub fn count_ones(&self) -> usize {
        self.ones().count()
    }

    fn check_len(&self, other: usize) -> Result<(), RsseError> {
        if self.bytes.len() != other {
            return Err(RsseError::XorLengthMismatch {
                left: self.bytes.len(),
                right: other,
            });
        }
        Ok(())
    }
}

/// A binary prefix code: `width` binary digits of `value` followed by
/// `wildcards` `'*'` characters. Covers `2^wildcards` consecutive integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrefixCode {
    value: u64,
    width: u32,
    wildcards: u32,
}

impl PrefixCode {
    pub fn new(value: u64, width: u32, wildcards: u32) -> Self {
        PrefixCode {
            value,
            width,
            wildcards,
        }
    }

    /// Full-length code of a leaf, no wildcard.
    pub fn leaf(value: u64, width: u32) -> Self {
        PrefixCode::new(value, width, 0)
    }

    /// Code of the parent node: one digit shorter, one wildcard longer.
    pub fn parent(&self) -> Option<PrefixCode> {
        if self.width == 0 {
            return None;
        }
        Some(PrefixCode::new(
            self.value >> 1,
            self.width - 1,
            self.wildcards + 1,
        ))
    }

    /// All codes from this one up to the root, this one first.
    pub fn ancestors(&self) -> impl Iterator<Item = PrefixCode> {
        std::iter::successors(Some(*self), |code| code.parent())
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn wildcards(&self) -> u32 {
        self.wildcards
    }

    /// First covered integer.
    pub fn first(&self) -> u64 {
        self.value << self.wildcards
    }

    /// Last covered integer.
    pub fn last(&self) -> u64 {
        self.first() + ((1u64 << self.wildcards) - 1)
    }

    pub fn covers(&self, leaf: u64) -> bool {
        leaf >> self.wildcards == self.value
    }
}

impl fmt::Display for PrefixCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.width > 0 {
            write!(f, "{:0w$b}", self.value, w = self.width as usize)?;
        }
        for _ in 0..self.wildcards {
            f.write_str("*")?;
        }
        Ok(())
    }
}

impl FromStr for PrefixCode {
    type Err = RsseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim_end_matches('*');
        let wildcards = (s.len() - digits.len()) as u32;
        if !digits.chars().all(|c| c == '0' || c == '1') {
            return Err(RsseError::ParseError(format!("invalid prefix code '{}'", s)));
        }
        let value = if digits.is_empty() {
            0
        } else {
            u64::from_str_radix(digits, 2)?
        };
        Ok(PrefixCode::new(value, digits.len() as u32, wildcards))
    }
}
