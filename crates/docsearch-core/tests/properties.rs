use std::time::Duration;

use proptest::prelude::*;

use docsearch_core::data_processor::TextSplitter;
use docsearch_core::RetryPolicy;

proptest! {
    #[test]
    fn backoff_grows_with_each_attempt(factor in 1.0f64..4.0, attempt in 0u32..8, jitter in 0.0f64..1.0) {
        let policy = RetryPolicy::new(10, factor).with_delay_unit(Duration::from_millis(100));
        let now = policy.wait_for(attempt, jitter);
        let next = policy.wait_for(attempt + 1, jitter);
        prop_assert!(next >= now);

        let base = 0.1 * factor.powi(i32::try_from(attempt).unwrap());
        prop_assert!(now.as_secs_f64() >= base - 1e-6);
        prop_assert!(now.as_secs_f64() <= base + 0.1 + 1e-6);
    }

    #[test]
    fn split_chunks_fit_the_size(text in "[a-z \n]{0,400}", size in 2usize..80, overlap in 0usize..40) {
        let splitter = TextSplitter::new(size, overlap);
        for piece in splitter.split(&text) {
            prop_assert!(!piece.is_empty());
            prop_assert_eq!(piece.trim(), piece.as_str());
            prop_assert!(piece.chars().count() <= size, "{:?} exceeds {}", piece, size);
        }
    }

    #[test]
    fn split_keeps_every_word_of_short_words(words in prop::collection::vec("[a-z]{1,8}", 0..40), size in 10usize..60) {
        let text = words.join(" ");
        let pieces = TextSplitter::new(size, 0).split(&text);
        let rejoined = pieces.join(" ");
        for w in &words {
            prop_assert!(rejoined.contains(w.as_str()));
        }
    }
}
