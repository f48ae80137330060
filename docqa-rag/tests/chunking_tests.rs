//! Property tests for sliding-window chunking.

use docqa_rag::chunking::{FixedSizeChunker, chunk_text};
use docqa_rag::document::Document;
use docqa_rag::error::RagError;
use proptest::prelude::*;

/// Valid `(max_size, overlap)` pairs with `overlap < max_size`.
fn arb_params() -> impl Strategy<Value = (usize, usize)> {
    (1usize..64).prop_flat_map(|max_size| (Just(max_size), 0..max_size))
}

/// Drop the overlap from every chunk after the first and concatenate.
fn de_overlap(chunks: &[String], overlap: usize) -> String {
    let mut text = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            text.push_str(chunk);
        } else {
            text.extend(chunk.chars().skip(overlap));
        }
    }
    text
}

/// *For any* text and valid parameters, de-overlapping and concatenating the
/// chunks reproduces the text exactly.
mod prop_chunk_reconstruction {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_reconstruct_the_text(
            text in "\\PC{0,400}",
            (max_size, overlap) in arb_params(),
        ) {
            let windows = chunk_text(&text, max_size, overlap).unwrap();
            let pieces: Vec<String> = windows.iter().map(|w| w.text.clone()).collect();
            prop_assert_eq!(de_overlap(&pieces, overlap), text);
        }

        #[test]
        fn chunks_respect_size_and_overlap(
            text in "[a-zé ]{1,300}",
            (max_size, overlap) in arb_params(),
        ) {
            let windows = chunk_text(&text, max_size, overlap).unwrap();
            let chars: Vec<char> = text.chars().collect();

            prop_assert_eq!(windows[0].offset, 0);
            for window in &windows {
                let len = window.text.chars().count();
                prop_assert!(len >= 1 && len <= max_size);
                let expected: String = chars[window.offset..window.offset + len].iter().collect();
                prop_assert_eq!(&window.text, &expected);
            }
            for pair in windows.windows(2) {
                prop_assert_eq!(pair[1].offset, pair[0].offset + max_size - overlap);
                let prev_end = pair[0].offset + pair[0].text.chars().count();
                prop_assert_eq!(prev_end - pair[1].offset, overlap);
            }
            let last = windows.last().unwrap();
            prop_assert_eq!(last.offset + last.text.chars().count(), chars.len());
        }

        #[test]
        fn chunking_is_deterministic(
            text in "\\PC{0,300}",
            (max_size, overlap) in arb_params(),
        ) {
            let document = Document::new("doc", text);
            let chunker = FixedSizeChunker::new(max_size, overlap).unwrap();
            prop_assert_eq!(chunker.chunk(&document).unwrap(), chunker.chunk(&document).unwrap());
        }

        #[test]
        fn invalid_overlap_is_rejected(max_size in 1usize..64, extra in 0usize..8) {
            let result = chunk_text("some text", max_size, max_size + extra);
            prop_assert!(matches!(result, Err(RagError::InvalidConfig(_))), "expected InvalidConfig");
        }
    }
}

#[test]
fn short_document_is_a_single_chunk() {
    let document = Document::new("memo", "The project deadline is Friday");
    let chunks = FixedSizeChunker::new(512, 100).unwrap().chunk(&document).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, document.text);
    assert_eq!(chunks[0].id, "memo_0");
}
