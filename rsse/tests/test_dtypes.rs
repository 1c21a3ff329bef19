#[cfg(test)]
mod dtypes_tests {
    use rsse::dtypes::{Bitmap, Direction, KeySpan, Path, PrefixCode, QueryRange};
    use rsse::error::RsseError;

    #[test]
    fn test_path_position() {
        assert_eq!(Path::default().position(), 0);
        let path = Path::new(vec![Direction::Right, Direction::Left, Direction::Right]);
        assert_eq!(path.position(), 0b101);
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn test_path_from_array_index() {
        assert!(Path::from(1usize).is_empty());
        assert_eq!(Path::from(2usize), Path::new(vec![Direction::Left]));
        assert_eq!(
            Path::from(13usize),
            Path::new(vec![Direction::Right, Direction::Left, Direction::Right])
        );
    }

    #[test]
    fn test_key_span() {
        let span = KeySpan::new(4, 9).merge(&KeySpan::new(12, 20));
        assert_eq!(span, KeySpan::new(4, 20));
        assert!(span.contains(10));
        assert!(!span.contains(21));
    }

    #[test]
    fn test_query_range() {
        let range = QueryRange::new(3, 3).unwrap();
        assert!(range.contains(3));
        assert!(!range.contains(4));
        assert!(matches!(QueryRange::new(4, 3), Err(RsseError::MalformedRange(_))));
        assert_eq!(QueryRange::parse(" 6", "9 ").unwrap(), QueryRange::new(6, 9).unwrap());
        assert!(matches!(QueryRange::parse("a", "9"), Err(RsseError::MalformedRange(_))));
        assert!(matches!(QueryRange::parse("-1", "9"), Err(RsseError::MalformedRange(_))));
    }

    #[test]
    fn test_bitmap_set_get() {
        let mut bitmap = Bitmap::new(10);
        assert_eq!(bitmap.byte_len(), 2);
        bitmap.set(0).unwrap();
        bitmap.set(9).unwrap();
        assert!(bitmap.get(0));
        assert!(bitmap.get(9));
        assert!(!bitmap.get(5));
        assert!(!bitmap.get(10));
        assert_eq!(bitmap.ones().collect::<Vec<_>>(), vec![0, 9]);
        assert!(matches!(
            bitmap.set(10),
            Err(RsseError::PostingOutOfRange { posting: 10, bits: 10 })
        ));
    }

    #[test]
    fn test_bitmap_prefix_ones() {
        let bitmap = Bitmap::with_prefix_ones(10, 16);
        assert_eq!(bitmap.as_bytes(), &[0xff, 0x03]);
        assert_eq!(bitmap.count_ones(), 10);
        assert_eq!(Bitmap::with_prefix_ones(0, 8).count_ones(), 0);
        // Saturates at the width.
        assert_eq!(Bitmap::with_prefix_ones(40, 12).count_ones(), 12);
    }

    #[test]
    fn test_bitmap_xor() {
        let a = Bitmap::with_prefix_ones(7, 16);
        let b = Bitmap::with_prefix_ones(3, 16);
        // Difference of two cumulative bitmaps is the middle run.
        assert_eq!(a.xor(&b).unwrap().ones().collect::<Vec<_>>(), vec![3, 4, 5, 6]);
        assert!(matches!(
            a.xor(&Bitmap::new(8)),
            Err(RsseError::XorLengthMismatch { left: 2, right: 1 })
        ));
    }

    #[test]
    fn test_bitmap_wrapping_arithmetic() {
        let bitmap = Bitmap::from_bytes(16, vec![0xff, 0x00]).unwrap();
        let sum = bitmap.wrapping_add(&[0x01, 0x00]).unwrap();
        assert_eq!(sum.as_bytes(), &[0x00, 0x01]);
        assert_eq!(sum.wrapping_sub(&[0x01, 0x00]).unwrap(), bitmap);

        let top = Bitmap::from_bytes(16, vec![0xff, 0xff]).unwrap();
        assert_eq!(top.wrapping_add(&[0x01, 0x00]).unwrap(), Bitmap::new(16));
        assert_eq!(Bitmap::new(16).wrapping_sub(&[0x01, 0x00]).unwrap(), top);

        let mask = [0x9c, 0x41];
        assert_eq!(bitmap.wrapping_add(&mask).unwrap().wrapping_sub(&mask).unwrap(), bitmap);
        assert!(bitmap.wrapping_add(&[0x01]).is_err());
    }

    #[test]
    fn test_bitmap_from_bytes_checks_length() {
        assert!(Bitmap::from_bytes(10, vec![0, 0, 0]).is_err());
        assert_eq!(Bitmap::from_bytes(10, vec![0, 0]).unwrap(), Bitmap::new(10));
    }

    #[test]
    fn test_prefix_code_display_and_parse() {
        let code = PrefixCode::new(0b01, 2, 3);
        assert_eq!(code.to_string(), "01***");
        assert_eq!("01***".parse::<PrefixCode>().unwrap(), code);
        assert_eq!(PrefixCode::leaf(5, 4).to_string(), "0101");
        assert_eq!("**".parse::<PrefixCode>().unwrap(), PrefixCode::new(0, 0, 2));
        assert!("10*1".parse::<PrefixCode>().is_err());
        assert!("102".parse::<PrefixCode>().is_err());
    }

    #[test]
    fn test_prefix_code_coverage() {
        let code: PrefixCode = "010**".parse().unwrap();
        assert_eq!(code.first(), 8);
        assert_eq!(code.last(), 11);
        assert!(code.covers(8));
        assert!(code.covers(11));
        assert!(!code.covers(12));
    }

    #[test]
    fn test_prefix_code_ancestors() {
        let chain: Vec<String> = PrefixCode::leaf(0b0110, 4)
            .ancestors()
            .map(|code| code.to_string())
            .collect();
        assert_eq!(chain, vec!["0110", "011*", "01**", "0***", "****"]);
        assert!("****".parse::<PrefixCode>().unwrap().parent().is_none());
    }
}
