//! Utility functions shared by the range schemes.

use crate::{dtypes::InvertedIndex, error::RsseError};

/// Parses a keyword string as a non-negative integer.
pub fn parse_keyword(keyword: &str) -> Result<u64, RsseError> {
    keyword
        .parse::<u64>()
        .map_err(|_| RsseError::InvalidKeyword(keyword.to_string()))
}

/// Checks the loader contract for `(index, sorted_keywords)` and returns the
/// numeric value of every keyword.
///
/// Every keyword must parse as an integer, appear in the index, and the list
/// must be strictly increasing.
pub fn validate_keywords(
    index: &InvertedIndex,
    sorted_keywords: &[String],
) -> Result<Vec<u64>, RsseError> {
    if sorted_keywords.is_empty() {
        return Err(RsseError::EmptyIndex);
    }
    let mut values = Vec::with_capacity(sorted_keywords.len());
    for keyword in sorted_keywords {
        if !index.contains_key(keyword) {
            return Err(RsseError::InvalidKeyword(format!(
                "{} is not in the inverted index",
                keyword
            )));
        }
        let value = parse_keyword(keyword)?;
        if let Some(&prev) = values.last() {
            if value <= prev {
                return Err(RsseError::InvalidKeyword(format!(
                    "{} is out of order (follows {})",
                    keyword, prev
                )));
            }
        }
        values.push(value);
    }
    Ok(values)
}

/// Index of the first value `>= target`, the nearest-larger match when
/// `target` itself is absent.
pub fn first_at_least(sorted: &[u64], target: u64) -> Option<usize> {
    let idx = sorted.partition_point(|&v| v < target);
    (idx < sorted.len()).then_some(idx)
}

/// Index of the last value `<= target`, the nearest-smaller match when
/// `target` itself is absent.
pub fn last_at_most(sorted: &[u64], target: u64) -> Option<usize> {
    sorted.partition_point(|&v| v <= target).checked_sub(1)
}

/// `ceil(log2(n))`, zero for `n <= 1`.
pub fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}
