#[cfg(test)]
mod chain_tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;
    use rsse::{
        chain::{ChainScheme, ChainToken},
        dataset::sort_keywords,
        dtypes::{Bitmap, DocumentIdSet, InvertedIndex, PrefixCode, QueryRange},
        error::RsseError,
        protocol::RangeScheme,
        server::ChainResponse,
    };

    fn fixture() -> InvertedIndex {
        let mut index = InvertedIndex::new();
        index.insert("1".to_string(), vec![1, 2]);
        index.insert("2".to_string(), vec![3, 4, 5]);
        index.insert("3".to_string(), vec![6, 7]);
        index.insert("4".to_string(), vec![8, 9, 10, 11]);
        index.insert("50".to_string(), vec![12, 13, 14, 15, 16]);
        index
    }

    fn build(index: &InvertedIndex, bits: usize, seed: u8) -> ChainScheme {
        let sorted = sort_keywords(index).unwrap();
        let mut scheme =
            ChainScheme::setup_with_rng(bits, ChaCha20Rng::from_seed([seed; 32])).unwrap();
        scheme.build_index(index, &sorted).unwrap();
        scheme
    }

    fn oracle(index: &InvertedIndex, lo: u64, hi: u64) -> DocumentIdSet {
        index
            .iter()
            .filter(|(keyword, _)| {
                let value: u64 = keyword.parse().unwrap();
                lo <= value && value <= hi
            })
            .flat_map(|(_, postings)| postings.iter().copied())
            .collect()
    }

    fn ids(values: &[u64]) -> DocumentIdSet {
        values.iter().copied().collect()
    }

    fn range(lo: u64, hi: u64) -> QueryRange {
        QueryRange::new(lo, hi).unwrap()
    }

    #[test]
    fn test_trie_shape() {
        let scheme = build(&fixture(), 32, 1);
        // Five keywords: h = 3, four-bit codes.
        assert_eq!(scheme.height(), 3);
        let root: PrefixCode = "****".parse().unwrap();
        assert_eq!(scheme.entry(&root).unwrap().counter, 4);
        let left_half: PrefixCode = "0***".parse().unwrap();
        assert_eq!(scheme.entry(&left_half).unwrap().counter, 4);
        let leaf: PrefixCode = "0100".parse().unwrap();
        assert_eq!(scheme.entry(&leaf).unwrap().counter, 0);
        assert!(scheme.entry(&"1***".parse().unwrap()).is_none());
        // 5 leaves, 3 + 2 + 1 + 1 internal nodes.
        assert_eq!(scheme.node_count(), 12);
        assert_eq!(scheme.server.edb.len(), 12);
    }

    #[test]
    fn test_every_range_matches_plaintext() {
        let index = fixture();
        for lo in 0..=52 {
            for hi in lo..=52 {
                // Searching consumes chain records, so every query gets a fresh index.
                let scheme = build(&index, 32, 1);
                let got = scheme.query(&range(lo, hi)).unwrap();
                assert_eq!(got, oracle(&index, lo, hi), "range [{}, {}]", lo, hi);
            }
        }
    }

    #[test]
    fn test_random_corpora_match_plaintext() {
        let mut rng = ChaCha20Rng::from_seed([9u8; 32]);
        for keywords in [1usize, 2, 7, 33] {
            let mut index = InvertedIndex::new();
            while index.len() < keywords {
                let postings = (0..rng.gen_range(0..6)).map(|_| rng.gen_range(0..500)).collect();
                index.insert(rng.gen_range(0..300u64).to_string(), postings);
            }
            for _ in 0..60 {
                let a = rng.gen_range(0..310u64);
                let b = rng.gen_range(0..310u64);
                let (lo, hi) = (a.min(b), a.max(b));
                let scheme = build(&index, 500, 3);
                let got = scheme.query(&range(lo, hi)).unwrap();
                assert_eq!(got, oracle(&index, lo, hi), "n={} range [{}, {}]", keywords, lo, hi);
            }
        }
    }

    #[test]
    fn test_overlapping_postings_are_not_double_counted() {
        let mut index = InvertedIndex::new();
        index.insert("10".to_string(), vec![1, 2, 3]);
        index.insert("11".to_string(), vec![2, 3, 4]);
        index.insert("12".to_string(), vec![3]);
        let scheme = build(&index, 16, 1);
        assert_eq!(scheme.query(&range(10, 12)).unwrap(), ids(&[1, 2, 3, 4]));
    }

    #[test]
    fn test_empty_ranges() {
        let scheme = build(&fixture(), 32, 1);
        for (lo, hi) in [(5, 49), (51, 100), (0, 0)] {
            assert_eq!(scheme.gen_token(&range(lo, hi)).unwrap(), ChainToken::Empty);
        }
        assert!(scheme.query(&range(5, 49)).unwrap().is_empty());
    }

    #[test]
    fn test_replay_returns_nothing_new() {
        let index = fixture();
        let scheme = build(&index, 32, 1);
        let token = scheme.gen_token(&range(2, 4)).unwrap();

        let first = scheme.server_search(&token);
        let first = scheme.local_parse(&token, &first).unwrap();
        assert_eq!(first, oracle(&index, 2, 4));

        let replay = scheme.server_search(&token);
        assert!(replay.partials.iter().all(|p| p.steps() == 0));
        let replay = scheme.local_parse(&token, &replay).unwrap();
        assert!(replay.is_subset(&first));
        assert!(replay.is_empty());
    }

    #[test]
    fn test_racing_searches_consume_once() {
        let scheme = build(&fixture(), 32, 1);
        let token = scheme.gen_token(&range(1, 50)).unwrap();
        let triples = token.triples().to_vec();

        let responses: Vec<ChainResponse> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| scheme.server.server_search(&triples)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let consumed: usize = responses
            .iter()
            .flat_map(|r| r.partials.iter())
            .map(|p| p.steps())
            .sum();
        assert_eq!(consumed, triples.len());
    }

    #[test]
    fn test_server_sees_masked_bitmaps() {
        let scheme = build(&fixture(), 32, 1);
        let token = scheme.gen_token(&range(1, 50)).unwrap();
        let response = scheme.server_search(&token);

        // Cover is "00**" (keywords 1..=4) and "0100" (keyword 50).
        let mut plain = Bitmap::new(32);
        for posting in 1..=11 {
            plain.set(posting).unwrap();
        }
        assert_eq!(response.partials.len(), 2);
        assert_eq!(response.partials[0].steps(), 1);
        assert_ne!(response.partials[0].versions[0], plain);
        assert_eq!(
            scheme.local_parse(&token, &response).unwrap(),
            (1..=16).collect::<DocumentIdSet>()
        );
    }

    #[test]
    fn test_update_before_search() {
        let mut index = fixture();
        let mut scheme = build(&index, 32, 1);
        scheme.update("3", &[20, 7]).unwrap();
        index.get_mut("3").unwrap().extend([20, 7]);

        let root: PrefixCode = "****".parse().unwrap();
        assert_eq!(scheme.entry(&root).unwrap().counter, 5);
        assert_eq!(scheme.query(&range(1, 50)).unwrap(), oracle(&index, 1, 50));
    }

    #[test]
    fn test_update_after_consume_returns_only_new_postings() {
        let mut scheme = build(&fixture(), 32, 1);
        // Consumes "000*" and "0010".
        assert_eq!(scheme.query(&range(1, 3)).unwrap(), ids(&[1, 2, 3, 4, 5, 6, 7]));

        scheme.update("2", &[20]).unwrap();
        // "000*" only has the appended version left.
        assert_eq!(scheme.query(&range(1, 3)).unwrap(), ids(&[20]));
        // Leaf "0001" was never read: build version plus appended version.
        assert_eq!(scheme.query(&range(2, 2)).unwrap(), ids(&[3, 4, 5, 20]));
    }

    #[test]
    fn test_errors() {
        let index = fixture();
        let sorted = sort_keywords(&index).unwrap();

        let mut narrow = ChainScheme::setup(8).unwrap();
        assert!(matches!(
            narrow.build_index(&index, &sorted),
            Err(RsseError::PostingOutOfRange { posting: 8, bits: 8 })
        ));

        let mut scheme = build(&index, 32, 1);
        assert!(matches!(scheme.update("5", &[1]), Err(RsseError::UnknownKeyword(_))));
        assert!(matches!(
            scheme.update("4", &[40]),
            Err(RsseError::PostingOutOfRange { posting: 40, bits: 32 })
        ));

        let token = scheme.gen_token(&range(2, 4)).unwrap();
        assert!(matches!(
            scheme.local_parse(&token, &ChainResponse::default()),
            Err(RsseError::ProtocolError(_))
        ));
        assert!(matches!(ChainScheme::setup(0), Err(RsseError::ConfigError(_))));
    }
}
