//! Binary range cover.
//!
//! Decomposes an inclusive integer range into the minimal set of binary
//! prefix codes whose covered leaves partition the range exactly, in the
//! manner of address-block aggregation. Used by the chain scheme to select
//! which trie nodes answer a query.
//!
//! The aggregation runs bottom-up: at every round, members of the working set
//! whose sibling is also present are merged into their parent, and members
//! with a missing sibling are final. Since the working set of a contiguous
//! range stays contiguous after every round, it is tracked as an interval,
//! which keeps the whole computation O(h).

use crate::{dtypes::PrefixCode, error::RsseError};

/// Minimal prefix cover of `[lo, hi]` with codes of width `h + 1`.
///
/// The range must lie in `[0, 2^(h+1))`. The result is sorted by the first
/// covered integer, its prefixes are pairwise disjoint and there are at most
/// `2 * (h + 1)` of them.
pub fn range_cover(lo: u64, hi: u64, h: u32) -> Result<Vec<PrefixCode>, RsseError> {
    let width = h + 1;
    if lo > hi {
        return Err(RsseError::MalformedRange(format!("{} > {}", lo, hi)));
    }
    if width > 63 {
        return Err(RsseError::MalformedRange(format!(
            "code width {} exceeds 63 bits",
            width
        )));
    }
    if hi >> width != 0 {
        return Err(RsseError::MalformedRange(format!(
            "{} is outside the {}-bit code domain",
            hi, width
        )));
    }

    let mut cover = Vec::new();
    let mut working = Some((lo, hi));
    let mut round = 0u32;

    while let Some((first, last)) = working {
        if first == last || round >= width {
            for value in first..=last {
                cover.push(PrefixCode::new(value, width - round, round));
            }
            break;
        }

        let (mut start, mut end) = (first, last);
        // A left edge without its left sibling cannot merge any further.
        if start & 1 == 1 {
            cover.push(PrefixCode::new(start, width - round, round));
            start += 1;
        }
        // Same for a right edge without its right sibling.
        if end & 1 == 0 {
            cover.push(PrefixCode::new(end, width - round, round));
            end -= 1;
        }

        working = (start < end).then(|| (start >> 1, end >> 1));
        round += 1;
    }

    cover.sort_by_key(PrefixCode::first);
    Ok(cover)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(lo: u64, hi: u64, h: u32) -> Vec<String> {
        range_cover(lo, hi, h)
            .unwrap()
            .iter()
            .map(|c| c.to_string())
            .collect()
    }

    #[test]
    fn test_pinned_cover() {
        assert_eq!(rendered(5, 13, 4), vec!["00101", "0011*", "010**", "0110*"]);
    }

    #[test]
    fn test_single_value() {
        assert_eq!(rendered(6, 6, 3), vec!["0110"]);
    }

    #[test]
    fn test_full_domain() {
        assert_eq!(rendered(0, 7, 2), vec!["***"]);
    }

    #[test]
    fn test_aligned_block() {
        assert_eq!(rendered(8, 15, 3), vec!["1***"]);
    }

    #[test]
    fn test_two_unmergeable_neighbours() {
        assert_eq!(rendered(3, 4, 2), vec!["011", "100"]);
    }

    #[test]
    fn test_rejects_inverted_and_out_of_domain() {
        assert!(matches!(range_cover(4, 3, 3), Err(RsseError::MalformedRange(_))));
        assert!(matches!(range_cover(0, 16, 3), Err(RsseError::MalformedRange(_))));
    }
}
