use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::error::{Error, Result};

/// Sentence terminator followed by whitespace.
static SENTENCE_BOUNDARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+\s+").unwrap());

/// Chunks whose trimmed length is at or below this are noise.
const MIN_CHUNK_CHARS: usize = 10;

/// At most this many trailing sentences are carried into the next chunk.
const MAX_OVERLAP_SENTENCES: usize = 2;

/// A bounded span of a document, ready for embedding.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub text: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub extra_metadata: JsonMap<String, JsonValue>,
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn is_usable(chunk: &str) -> bool {
    char_len(chunk.trim()) > MIN_CHUNK_CHARS
}

/// Splits on `.`, `!` or `?` followed by whitespace. The terminator stays
/// with its sentence; the whitespace is dropped.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for boundary in SENTENCE_BOUNDARY.find_iter(text) {
        let terminator_end = boundary.start() + boundary.as_str().trim_end().len();
        let sentence = text[start..terminator_end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = boundary.end();
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn joined_len(sentences: &[&str]) -> usize {
    let chars: usize = sentences.iter().map(|s| char_len(s)).sum();
    chars + sentences.len().saturating_sub(1)
}

/// Trailing sentences of a closed chunk that open the next one.
///
/// With a non-zero `overlap` the last sentence is always carried, whatever its
/// length. The one before it joins only when both together fit in `overlap`
/// characters. Zero overlap carries nothing.
fn overlap_seed<'a>(closed: &[&'a str], overlap: usize) -> Vec<&'a str> {
    if overlap == 0 {
        return Vec::new();
    }

    let start = closed.len().saturating_sub(MAX_OVERLAP_SENTENCES);
    let tail = &closed[start..];
    if tail.len() > 1 && joined_len(tail) <= overlap {
        tail.to_vec()
    } else {
        closed.last().map(|&s| vec![s]).unwrap_or_default()
    }
}

/// Greedily packs whole sentences into chunks joined by single spaces.
///
/// A chunk closes when the next sentence would push it past `chunk_size`.
/// The next chunk starts with [`overlap_seed`], unless seed plus the incoming
/// sentence would itself overflow, in which case it starts clean. A sentence
/// longer than `chunk_size` is never split and becomes its own chunk.
fn pack_sentences(sentences: &[&str], chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for &sentence in sentences {
        if !current.is_empty() {
            let grown = joined_len(&current) + 1 + char_len(sentence);
            if grown > chunk_size {
                chunks.push(current.join(" "));
                current = overlap_seed(&current, overlap);
                if !current.is_empty() && joined_len(&current) + 1 + char_len(sentence) > chunk_size {
                    current.clear();
                }
            }
        }
        current.push(sentence);
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }
    chunks
}

/// Character windows of `chunk_size`, each starting `chunk_size - overlap`
/// after the previous one. Stops at the first window that reaches the end.
///
/// Counts in `char`s, not bytes, so multibyte text is never cut inside a code
/// point. `overlap < chunk_size` is checked by the caller, so the step is at
/// least one.
fn fixed_windows(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size - overlap;
    let mut windows = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    windows
}

/// Splits `text` into overlapping, sentence-bounded segments of roughly
/// `chunk_size` characters.
///
/// Text with no sentence terminators (or whose sentence chunks are all
/// noise) falls back to fixed character windows.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    if overlap >= chunk_size {
        return Err(Error::InvalidInput(format!(
            "chunk_size ({}) must be greater than overlap ({})",
            chunk_size, overlap
        )));
    }

    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let mut chunks = if SENTENCE_BOUNDARY.is_match(text) {
        pack_sentences(&split_sentences(text), chunk_size, overlap)
    } else {
        Vec::new()
    };
    chunks.retain(|c| is_usable(c));

    if chunks.is_empty() {
        chunks = fixed_windows(text, chunk_size, overlap);
        chunks.retain(|c| is_usable(c));
    }

    Ok(chunks)
}

/// Chunks a document and attaches positional metadata to every segment.
pub fn chunk_document(
    document_id: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
    extra_metadata: &JsonMap<String, JsonValue>,
) -> Result<Vec<Chunk>> {
    let texts = chunk_text(text, chunk_size, overlap)?;
    let total_chunks = texts.len();

    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| Chunk {
            text,
            document_id: document_id.to_string(),
            chunk_index,
            total_chunks,
            extra_metadata: extra_metadata.clone(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_sentences(count: usize) -> Vec<String> {
        (1..=count)
            .map(|i| format!("This is sentence number {:02}.", i))
            .collect()
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", 100, 10).unwrap().is_empty());
        assert!(chunk_text("   \n\t ", 100, 10).unwrap().is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("A short paragraph without a terminator", 100, 10).unwrap();
        assert_eq!(chunks, vec!["A short paragraph without a terminator".to_string()]);
    }

    #[test]
    fn test_noise_is_discarded() {
        assert!(chunk_text("Ok. Sure.", 100, 10).unwrap().is_empty());
        assert!(chunk_text("tiny", 100, 10).unwrap().is_empty());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        assert!(matches!(chunk_text("text", 100, 100), Err(Error::InvalidInput(_))));
        assert!(matches!(chunk_text("text", 0, 0), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_next_chunk_is_seeded_with_trailing_sentence() {
        let text = numbered_sentences(10).join(" ");
        let chunks = chunk_text(&text, 100, 30).unwrap();

        assert_eq!(chunks.len(), 5);
        assert!(chunks[0].ends_with("This is sentence number 03."));
        assert!(chunks[1].starts_with("This is sentence number 03."));
        assert!(chunks[2].starts_with("This is sentence number 05."));
        assert_eq!(
            chunks[4],
            "This is sentence number 09. This is sentence number 10."
        );
    }

    #[test]
    fn test_two_sentences_carried_when_overlap_allows() {
        let text = numbered_sentences(6).join(" ");
        let chunks = chunk_text(&text, 100, 60).unwrap();

        assert!(chunks[1].starts_with("This is sentence number 02. This is sentence number 03."));
    }

    #[test]
    fn test_zero_overlap_has_no_repetition() {
        let text = numbered_sentences(10).join(" ");
        let chunks = chunk_text(&text, 100, 0).unwrap();
        let rejoined = chunks.join(" ");
        assert_eq!(rejoined, text);
    }

    #[test]
    fn test_every_sentence_is_covered() {
        let sentences = vec![
            "Physical AI combines machine learning with embodied systems.",
            "Robots must cope with uncertainty!",
            "Why is balance hard?",
            "Zero Moment Point control keeps the center of pressure inside the support polygon.",
            "Series elastic actuators make contact safer.",
            "ROS 2 uses DDS for transport.",
        ];
        let text = sentences.join("  \n");
        let chunks = chunk_text(&text, 90, 40).unwrap();

        for sentence in &sentences {
            assert!(
                chunks.iter().any(|c| c.contains(sentence)),
                "sentence missing from chunks: {}",
                sentence
            );
        }
    }

    #[test]
    fn test_chunk_size_bound() {
        let sentences: Vec<String> = (0..40)
            .map(|i| format!("Sentence {} {}.", i, "word ".repeat(i % 7 + 1).trim_end()))
            .collect();
        let longest = sentences.iter().map(|s| s.chars().count()).max().unwrap();
        let text = sentences.join(" ");

        let chunks = chunk_text(&text, 120, 40).unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 120 + longest);
        }
    }

    #[test]
    fn test_oversized_single_sentence_is_kept_whole() {
        let long_sentence = format!("{}.", "x".repeat(300));
        let text = format!("{} Short trailing sentence here.", long_sentence);
        let chunks = chunk_text(&text, 100, 20).unwrap();

        assert_eq!(chunks[0], long_sentence);
    }

    #[test]
    fn test_fixed_window_fallback() {
        let text = "abcdefghij".repeat(120);
        assert_eq!(text.len(), 1200);

        let chunks = chunk_text(&text, 500, 100).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 500);
        assert_eq!(chunks[1].len(), 500);
        assert_eq!(chunks[2].len(), 400);
        assert_eq!(&chunks[1][..100], &chunks[0][400..]);
    }

    #[test]
    fn test_multibyte_text_fallback() {
        let text = "これはテスト文章です。日本語のマルチバイト文字を含むテキストを正しくチャンクに分割できるかテストします。";
        let chunks = chunk_text(text, 20, 5).unwrap();
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20);
        }
    }

    fn long_sentences(count: usize, words: usize) -> Vec<String> {
        (1..=count)
            .map(|i| format!("Sentence {:02} {}.", i, "word ".repeat(words).trim_end()))
            .collect()
    }

    fn last_sentence(chunk: &str) -> &str {
        chunk.rsplit_once(". ").map(|(_, last)| last).unwrap_or(chunk)
    }

    fn assert_each_chunk_opens_with_previous_tail(chunks: &[String]) {
        for pair in chunks.windows(2) {
            let tail = last_sentence(&pair[0]);
            assert!(
                pair[1].starts_with(tail),
                "chunk does not start with previous last sentence: {:?}",
                tail
            );
        }
    }

    #[test]
    fn test_long_sentences_still_overlap() {
        let sentences = long_sentences(12, 20);
        assert_eq!(sentences[0].chars().count(), 112);
        let text = sentences.join(" ");

        let chunks = chunk_text(&text, 512, 100).unwrap();

        assert_eq!(chunks.len(), 4);
        assert!(chunks[1].starts_with(&sentences[3]));
        assert_each_chunk_opens_with_previous_tail(&chunks);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 512);
        }
    }

    #[test]
    fn test_overlap_at_default_settings() {
        let settings = crate::config::Settings::from_map(std::collections::HashMap::new()).unwrap();
        let text = long_sentences(30, 28).join(" ");

        let chunks = chunk_text(&text, settings.chunk_size, settings.chunk_overlap).unwrap();

        assert!(chunks.len() > 2);
        assert_each_chunk_opens_with_previous_tail(&chunks);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= settings.chunk_size);
        }
    }

    #[test]
    fn test_seed_dropped_when_it_cannot_fit() {
        let sentences = long_sentences(3, 14);
        let text = sentences.join(" ");

        // 82-char sentences: seed plus the next one would exceed 100
        let chunks = chunk_text(&text, 100, 20).unwrap();

        assert_eq!(chunks, sentences);
    }

    #[test]
    fn test_chunk_document_metadata() {
        let mut extra = JsonMap::new();
        extra.insert("title".to_string(), JsonValue::String("ROS 2 Fundamentals".to_string()));

        let text = numbered_sentences(10).join(" ");
        let chunks = chunk_document("chapter-3", &text, 100, 30, &extra).unwrap();

        assert_eq!(chunks.len(), 5);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.document_id, "chapter-3");
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.total_chunks, 5);
            assert_eq!(chunk.extra_metadata["title"], "ROS 2 Fundamentals");
        }
    }
}
