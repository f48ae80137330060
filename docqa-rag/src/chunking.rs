//! Sliding-window document chunking.
//!
//! Chunk boundaries are measured in characters (Unicode scalar values), so a
//! window never splits a code point. Boundaries depend only on the text, the
//! window size and the overlap, which keeps re-indexing idempotent.

use crate::document::{Chunk, ChunkingParams, Document};
use crate::error::{RagError, Result};

/// One window over a text: where it starts (in characters) and what it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWindow {
    pub offset: usize,
    pub text: String,
}

/// Split `text` into windows of at most `max_size` characters, each sharing
/// `overlap` characters with its predecessor.
///
/// The window advances by `max_size - overlap` characters per step and stops
/// once it has covered the end of the text, so the last window may be shorter
/// than `max_size`. Empty text yields no windows.
///
/// # Errors
///
/// Returns [`RagError::InvalidConfig`] if `max_size == 0` or `overlap >= max_size`.
pub fn chunk_text(text: &str, max_size: usize, overlap: usize) -> Result<Vec<TextWindow>> {
    validate(max_size, overlap)?;

    // Byte position of every char boundary, plus the end of the text.
    let boundaries: Vec<usize> =
        text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
    let char_len = boundaries.len() - 1;

    let step = max_size - overlap;
    let mut windows = Vec::new();
    let mut start = 0;

    while start < char_len {
        let end = (start + max_size).min(char_len);
        windows.push(TextWindow {
            offset: start,
            text: text[boundaries[start]..boundaries[end]].to_string(),
        });
        if end == char_len {
            break;
        }
        start += step;
    }

    Ok(windows)
}

fn validate(max_size: usize, overlap: usize) -> Result<()> {
    if max_size == 0 {
        return Err(RagError::InvalidConfig("chunk size must be greater than zero".into()));
    }
    if overlap >= max_size {
        return Err(RagError::InvalidConfig(format!(
            "chunk overlap ({overlap}) must be less than chunk size ({max_size})"
        )));
    }
    Ok(())
}

/// Splits documents into fixed-size, overlapping [`Chunk`]s.
///
/// Chunk IDs are generated as `{document_id}_{chunk_index}`. Each chunk
/// inherits the parent document's metadata.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(256, 50)?;
/// let chunks = chunker.chunk(&document)?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if `chunk_size == 0` or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }

    /// The chunker to use for `document`: its own override if it carries one, else `self`.
    pub fn for_document(&self, document: &Document) -> Result<Self> {
        match document.chunking {
            Some(ChunkingParams { max_size, overlap }) => Self::new(max_size, overlap),
            None => Ok(*self),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split a document into chunks.
    pub fn chunk(&self, document: &Document) -> Result<Vec<Chunk>> {
        let windows = chunk_text(&document.text, self.chunk_size, self.chunk_overlap)?;

        Ok(windows
            .into_iter()
            .enumerate()
            .map(|(index, window)| Chunk {
                id: format!("{}_{index}", document.id),
                document_id: document.id.clone(),
                index,
                offset: window.offset,
                text: window.text,
                metadata: document.metadata.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(windows: &[TextWindow]) -> Vec<&str> {
        windows.iter().map(|w| w.text.as_str()).collect()
    }

    #[test]
    fn short_document_is_one_chunk() {
        let windows = chunk_text("hello", 10, 3).unwrap();
        assert_eq!(windows, vec![TextWindow { offset: 0, text: "hello".into() }]);
    }

    #[test]
    fn document_of_exactly_max_size_is_one_chunk() {
        let windows = chunk_text("abcdefgh", 8, 2).unwrap();
        assert_eq!(texts(&windows), ["abcdefgh"]);
    }

    #[test]
    fn windows_overlap_their_predecessor() {
        let windows = chunk_text("abcdefghij", 4, 2).unwrap();
        assert_eq!(texts(&windows), ["abcd", "cdef", "efgh", "ghij"]);
        assert_eq!(windows.iter().map(|w| w.offset).collect::<Vec<_>>(), [0, 2, 4, 6]);
    }

    #[test]
    fn final_window_may_be_short() {
        let windows = chunk_text("abcdefghijk", 5, 1).unwrap();
        assert_eq!(texts(&windows), ["abcde", "efghi", "ijk"]);
    }

    #[test]
    fn zero_overlap_tiles_the_text() {
        let windows = chunk_text("abcdef", 2, 0).unwrap();
        assert_eq!(texts(&windows), ["ab", "cd", "ef"]);
    }

    #[test]
    fn empty_text_has_no_windows() {
        assert!(chunk_text("", 4, 1).unwrap().is_empty());
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let windows = chunk_text("héllo wörld", 4, 1).unwrap();
        assert_eq!(texts(&windows), ["héll", "lo w", "wörl", "ld"]);
    }

    #[test]
    fn overlap_not_below_size_is_rejected() {
        assert!(matches!(chunk_text("abc", 4, 4), Err(RagError::InvalidConfig(_))));
        assert!(matches!(chunk_text("abc", 4, 9), Err(RagError::InvalidConfig(_))));
        assert!(matches!(chunk_text("abc", 0, 0), Err(RagError::InvalidConfig(_))));
        assert!(FixedSizeChunker::new(10, 10).is_err());
    }

    #[test]
    fn chunks_carry_ids_offsets_and_metadata() {
        let chunker = FixedSizeChunker::new(6, 2).unwrap();
        let document = Document::new("faq.md", "0123456789").with_metadata("lang", "en");
        let chunks = chunker.chunk(&document).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, "faq.md_0");
        assert_eq!(chunks[1].id, "faq.md_1");
        assert_eq!(chunks[1].offset, 4);
        assert_eq!(chunks[1].text, "456789");
        assert_eq!(chunks[1].metadata.get("lang").map(String::as_str), Some("en"));
    }

    #[test]
    fn document_override_replaces_configured_parameters() {
        let chunker = FixedSizeChunker::new(100, 10).unwrap();
        let document = Document::new("a", "abcdef").with_chunking(2, 0);
        let chunks = chunker.for_document(&document).unwrap().chunk(&document).unwrap();
        assert_eq!(chunks.len(), 3);

        let broken = Document::new("b", "abcdef").with_chunking(2, 2);
        assert!(chunker.for_document(&broken).is_err());
    }
}
