//! Fixed-window text chunker.
//!
//! Splits a document body into overlapping windows of `chunk_size`
//! characters, with consecutive windows sharing `chunk_overlap` characters.
//! Chunk *i* always starts at offset `i * (chunk_size - chunk_overlap)`, so
//! the output is a pure function of the text and the two parameters.
//!
//! Each chunk gets a deterministic id derived from its parent document and
//! index, plus a SHA-256 hash of its text for change detection.

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::fingerprint;
use crate::models::{CanonicalDocument, Chunk};

/// Split text into overlapping character windows.
///
/// Offsets are measured in `char`s, never bytes, so multi-byte text cannot
/// split inside a code point. Empty input yields zero windows, never a
/// single empty window.
pub fn split_windows(text: &str, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<String>> {
    if chunk_size == 0 || chunk_overlap >= chunk_size {
        return Err(Error::Configuration(format!(
            "chunk_overlap ({}) must be < chunk_size ({}), and chunk_size must be > 0",
            chunk_overlap, chunk_size
        )));
    }
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size - chunk_overlap;
    let mut windows = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    Ok(windows)
}

/// Chunk a canonical document's body.
///
/// Chunk metadata inherits the parent document's metadata and adds
/// `source`, `title`, `external_id`, and `chunk_index` so every chunk is
/// attributable on its own.
pub fn chunk_document(doc: &CanonicalDocument, chunking: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let windows = split_windows(&doc.body, chunking.chunk_size, chunking.chunk_overlap)?;

    let chunks = windows
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let mut metadata = doc.metadata.clone();
            metadata.insert("source".to_string(), doc.source.to_string());
            metadata.insert("title".to_string(), doc.title.clone());
            metadata.insert("external_id".to_string(), doc.external_id.clone());
            metadata.insert("chunk_index".to_string(), index.to_string());

            let content_hash = fingerprint::digest(&text);
            Chunk {
                chunk_id: chunk_id(doc, index),
                text,
                content_hash,
                metadata,
            }
        })
        .collect();

    Ok(chunks)
}

/// Deterministic chunk id: `"{source}-{external_id}-chunk-{index}"`.
pub fn chunk_id(doc: &CanonicalDocument, index: usize) -> String {
    format!("{}-{}-chunk-{}", doc.source, doc.external_id, index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Source;
    use std::collections::BTreeMap;

    fn doc(body: &str) -> CanonicalDocument {
        CanonicalDocument {
            source: Source::Jira,
            external_id: "10001".to_string(),
            title: "Login flaky on Safari".to_string(),
            body: body.to_string(),
            metadata: BTreeMap::from([("author".to_string(), "Dana Ko".to_string())]),
            updated_at: None,
        }
    }

    #[test]
    fn windowing_law() {
        let windows = split_windows("ABCDEFGHIJ", 4, 2).unwrap();
        assert_eq!(windows, vec!["ABCD", "CDEF", "EFGH", "GHIJ"]);
    }

    #[test]
    fn short_text_is_a_single_window() {
        assert_eq!(split_windows("ABC", 4, 2).unwrap(), vec!["ABC"]);
        assert_eq!(split_windows("ABCD", 4, 2).unwrap(), vec!["ABCD"]);
    }

    #[test]
    fn empty_text_yields_zero_windows() {
        assert!(split_windows("", 4, 2).unwrap().is_empty());
    }

    #[test]
    fn overlap_equal_to_size_is_a_configuration_error() {
        let err = split_windows("ABCDEF", 4, 4).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn window_offsets_are_char_based() {
        // 10 Hangul syllables, 3 bytes each; byte-offset windowing would panic.
        let windows = split_windows("가나다라마바사아자차", 4, 2).unwrap();
        assert_eq!(windows, vec!["가나다라", "다라마바", "마바사아", "사아자차"]);
    }

    #[test]
    fn chunking_is_deterministic_and_order_stable() {
        let config = ChunkingConfig {
            chunk_size: 4,
            chunk_overlap: 2,
        };
        let d = doc("ABCDEFGHIJ");
        let a = chunk_document(&d, &config).unwrap();
        let b = chunk_document(&d, &config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].chunk_id, "jira-10001-chunk-0");
        assert_eq!(a[3].chunk_id, "jira-10001-chunk-3");
        for (i, chunk) in a.iter().enumerate() {
            assert_eq!(chunk.metadata["chunk_index"], i.to_string());
            assert_eq!(chunk.metadata["author"], "Dana Ko");
        }
    }

    #[test]
    fn empty_body_yields_zero_chunks() {
        let config = ChunkingConfig {
            chunk_size: 4,
            chunk_overlap: 2,
        };
        assert!(chunk_document(&doc(""), &config).unwrap().is_empty());
    }
}
