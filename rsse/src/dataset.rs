//! # Dataset Module
//!
//! Loads inverted indexes from disk and draws benchmark query ranges.
//!
//! Two on-disk formats are understood:
//! - whitespace text: `keyword id id ...` per line
//! - CSV with a header row: keyword in the first column, row ids either in
//!   the remaining columns or as one bracketed list such as `"[1, 2, 3]"`

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use rand::Rng;
use tracing::{info, warn};

use crate::{dtypes::InvertedIndex, error::RsseError, utils::parse_keyword};

/// Loads a whitespace separated inverted index.
///
/// Blank lines are skipped. A line without at least one row id is an error;
/// row ids that do not parse are skipped with a warning.
pub fn load_inverted_index<P: AsRef<Path>>(path: P) -> Result<InvertedIndex, RsseError> {
    let file = File::open(path.as_ref())?;
    let mut index = InvertedIndex::new();

    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        let (Some(keyword), Some(_)) = (parts.next(), parts.clone().next()) else {
            return Err(RsseError::ParseError(format!("invalid line: {}", line)));
        };
        index.insert(keyword.to_string(), parse_row_ids(parts));
    }

    info!(
        "Loaded {} keywords from {}",
        index.len(),
        path.as_ref().display()
    );
    Ok(index)
}

/// Loads a CSV inverted index. The first row is a header.
pub fn load_csv_index<P: AsRef<Path>>(path: P) -> Result<InvertedIndex, RsseError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path.as_ref())?;
    let mut index = InvertedIndex::new();

    for result in rdr.records() {
        let record = result?;
        if record.len() < 2 {
            return Err(RsseError::ParseError(format!(
                "invalid CSV row: {:?}",
                record
            )));
        }
        let keyword = record[0].trim().to_string();
        let ids = record
            .iter()
            .skip(1)
            .flat_map(|field| field.trim().trim_matches(|c: char| c == '[' || c == ']').split(','))
            .map(str::trim)
            .filter(|id| !id.is_empty());
        index.insert(keyword, parse_row_ids(ids));
    }

    info!(
        "Loaded {} keywords from {}",
        index.len(),
        path.as_ref().display()
    );
    Ok(index)
}

fn parse_row_ids<'a, I: Iterator<Item = &'a str>>(ids: I) -> Vec<u64> {
    ids.filter_map(|id| match id.parse::<u64>() {
        Ok(id) => Some(id),
        Err(_) => {
            warn!("Skipping unparsable row id '{}'", id);
            None
        }
    })
    .collect()
}

/// Keywords of `index` in ascending numeric order.
pub fn sort_keywords(index: &InvertedIndex) -> Result<Vec<String>, RsseError> {
    let mut keyed = index
        .keys()
        .map(|keyword| Ok((parse_keyword(keyword)?, keyword.clone())))
        .collect::<Result<Vec<(u64, String)>, RsseError>>()?;
    keyed.sort_unstable();
    Ok(keyed.into_iter().map(|(_, keyword)| keyword).collect())
}

/// Draws `[left, left + width]` with `left` a random keyword, retrying
/// until the right end does not pass the largest keyword.
///
/// Returns `None` when no keyword admits a range of that width.
pub fn random_range<R: Rng>(keywords: &[u64], width: u64, rng: &mut R) -> Option<(u64, u64)> {
    let max = *keywords.last()?;
    let eligible = keywords.partition_point(|&k| k.saturating_add(width) <= max);
    if eligible == 0 {
        return None;
    }
    let left = keywords[rng.gen_range(0..eligible)];
    Some((left, left + width))
}
