//! Runs both range schemes over one dataset and compares their costs.
//!
//! Usage: `comparison [dataset] [cluster_limit] [bitmap_bits] [results_dir]`
//!
//! A `.csv` dataset is read with the CSV loader, anything else as a
//! whitespace inverted index. Without a dataset a synthetic corpus is used.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use tracing::{info, warn};

use rsse::{
    chain::ChainScheme,
    cluster::ClusterScheme,
    constants::SchemeParams,
    dataset::{load_csv_index, load_inverted_index, random_range, sort_keywords},
    dtypes::{DocumentIdSet, InvertedIndex, QueryRange},
    logging,
    protocol::RangeScheme,
    utils::validate_keywords,
};

/// Range widths swept per scheme.
const RANGE_WIDTHS: [u64; 8] = [600, 1200, 1800, 2400, 3000, 3600, 4200, 4800];

#[derive(Debug, Serialize)]
struct QueryRow {
    scheme: &'static str,
    iteration: usize,
    left: u64,
    right: u64,
    width: u64,
    build_ms: f64,
    gen_token_ms: f64,
    search_ms: f64,
    resolve_ms: f64,
    results: usize,
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn synthetic_index(params: &SchemeParams) -> InvertedIndex {
    let mut rng = ChaCha20Rng::from_seed(params.query_seed);
    let postings_bound = params.bitmap_bits as u64;
    (0..5000u64)
        .map(|i| {
            let keyword = i * 7 + rng.gen_range(0..7);
            let postings = (0..rng.gen_range(1..8))
                .map(|_| rng.gen_range(0..postings_bound))
                .collect();
            (keyword.to_string(), postings)
        })
        .collect()
}

fn load(path: &Path) -> Result<InvertedIndex, Box<dyn Error>> {
    let index = match path.extension().and_then(|ext| ext.to_str()) {
        Some("csv") => load_csv_index(path)?,
        _ => load_inverted_index(path)?,
    };
    Ok(index)
}

fn plaintext(index: &InvertedIndex, range: &QueryRange) -> DocumentIdSet {
    index
        .iter()
        .filter(|(keyword, _)| keyword.parse::<u64>().map_or(false, |k| range.contains(k)))
        .flat_map(|(_, postings)| postings.iter().copied())
        .collect()
}

/// Issues every query against `scheme`, rebuilding before each one when
/// `rebuild` is set, and checks each answer against the plaintext index.
fn run_scheme<S: RangeScheme>(
    scheme: &mut S,
    index: &InvertedIndex,
    sorted: &[String],
    queries: &[(u64, u64, u64)],
    rebuild: bool,
    writer: &mut csv::Writer<fs::File>,
) -> Result<usize, Box<dyn Error>> {
    let start = Instant::now();
    scheme.build_index(index, sorted)?;
    let mut build_ms = elapsed_ms(start);
    info!("{} - initial build took {:.3} ms", scheme.name(), build_ms);

    let mut mismatches = 0;
    for (iteration, &(left, right, width)) in queries.iter().enumerate() {
        // Chain records are consumed by a search.
        if rebuild && iteration > 0 {
            let start = Instant::now();
            scheme.build_index(index, sorted)?;
            build_ms = elapsed_ms(start);
        }
        let range = QueryRange::new(left, right)?;

        let start = Instant::now();
        let token = scheme.gen_token(&range)?;
        let gen_token_ms = elapsed_ms(start);

        let start = Instant::now();
        let response = scheme.search(&token);
        let search_ms = elapsed_ms(start);

        let start = Instant::now();
        let result = scheme.resolve(&token, response)?;
        let resolve_ms = elapsed_ms(start);

        if result != plaintext(index, &range) {
            warn!("{} - wrong answer for [{}, {}]", scheme.name(), left, right);
            mismatches += 1;
        }
        writer.serialize(QueryRow {
            scheme: scheme.name(),
            iteration,
            left,
            right,
            width,
            build_ms,
            gen_token_ms,
            search_ms,
            resolve_ms,
            results: result.len(),
        })?;
    }
    writer.flush()?;
    Ok(mismatches)
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    let defaults = SchemeParams::default();
    let params = SchemeParams {
        cluster_limit: match args.get(2) {
            Some(arg) => arg.parse()?,
            None => defaults.cluster_limit,
        },
        bitmap_bits: match args.get(3) {
            Some(arg) => arg.parse()?,
            None => defaults.bitmap_bits,
        },
        ..defaults
    };
    params.validate()?;
    let results_dir = PathBuf::from(args.get(4).map(String::as_str).unwrap_or("results"));
    fs::create_dir_all(&results_dir)?;

    let index = match args.get(1) {
        Some(path) => load(Path::new(path))?,
        None => {
            info!("No dataset given, using a synthetic corpus");
            synthetic_index(&params)
        }
    };
    let sorted = sort_keywords(&index)?;
    let keywords = validate_keywords(&index, &sorted)?;
    info!("{} keywords, params {:?}", keywords.len(), params);

    let mut rng = ChaCha20Rng::from_seed(params.query_seed);
    let per_width = (params.query_count / RANGE_WIDTHS.len()).max(1);
    let mut queries = Vec::with_capacity(per_width * RANGE_WIDTHS.len());
    for width in RANGE_WIDTHS {
        match (0..per_width)
            .map(|_| random_range(&keywords, width, &mut rng))
            .collect::<Option<Vec<_>>>()
        {
            Some(drawn) => queries.extend(drawn.into_iter().map(|(l, r)| (l, r, width))),
            None => warn!("Keyword domain too narrow for width {}, skipped", width),
        }
    }

    let mut writer = csv::Writer::from_path(results_dir.join(format!(
        "comparison_L_{}_cluster.csv",
        params.cluster_limit
    )))?;
    let mut cluster = ClusterScheme::setup(params.cluster_limit)?;
    let cluster_mismatches =
        run_scheme(&mut cluster, &index, &sorted, &queries, false, &mut writer)?;

    let mut writer = csv::Writer::from_path(results_dir.join(format!(
        "comparison_bits_{}_chain.csv",
        params.bitmap_bits
    )))?;
    let mut chain = ChainScheme::setup(params.bitmap_bits)?;
    let chain_mismatches = run_scheme(&mut chain, &index, &sorted, &queries, true, &mut writer)?;

    logging::write_report(
        &results_dir.join("logs").join("latency.csv"),
        &results_dir.join("logs").join("bytes.csv"),
    )?;
    info!(
        "{} queries per scheme, mismatches: cluster {}, chain {}",
        queries.len(),
        cluster_mismatches,
        chain_mismatches
    );
    if cluster_mismatches + chain_mismatches > 0 {
        return Err("a scheme returned a wrong answer".into());
    }
    Ok(())
}
