//! Sentence-bounded chunking with character overlap.
//!
//! Documents are cut into sentences on `\n`, `。`, `？` and `！`. Sentences are packed greedily
//! into chunks of at most `max_chars` characters, each sentence re-terminated with `。` so the
//! boundaries survive packing. A post-pass prefixes every chunk after the first with the last
//! `overlap` characters of its predecessor, keeping spans around a boundary visible to retrieval.
//!
//! All lengths are counted in `char`s, so CJK text is measured the same way as ASCII.

use serde::Serialize;

const SENTENCE_TERMINATORS: [char; 4] = ['\n', '。', '？', '！'];
const CHUNK_TERMINATOR: char = '。';

/// Chunker parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingSettings {
    /// Nominal upper bound on the sentence-bounded part of a chunk.
    pub max_chars: usize,
    /// Characters carried over from the previous chunk.
    pub overlap: usize,
}

impl ChunkingSettings {
    /// Split `text` using these settings. See [`split_text`].
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        split_text(text, self.max_chars, self.overlap)
    }
}

/// A bounded, overlapping text segment used as the embedding unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position of the chunk within its document.
    pub index: usize,
    /// Chunk text, including the overlap prefix.
    pub text: String,
    /// Number of leading characters copied from the previous chunk.
    pub overlap: usize,
}

impl Chunk {
    /// Chunk text without the overlap prefix.
    pub fn body(&self) -> &str {
        let offset = self
            .text
            .char_indices()
            .nth(self.overlap)
            .map(|(offset, _)| offset)
            .unwrap_or(self.text.len());
        &self.text[offset..]
    }

    /// Length of the chunk in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Split raw document text into overlapping chunks.
///
/// Returns an empty vector when the text holds no sentences. A single sentence longer than
/// `max_chars` is emitted whole as its own chunk; sentences are never cut, so such a chunk
/// exceeds the nominal bound.
pub fn split_text(text: &str, max_chars: usize, overlap: usize) -> Vec<Chunk> {
    apply_overlap(pack_sentences(text, max_chars), overlap)
}

fn sentences(text: &str) -> impl Iterator<Item = &str> {
    text.split(SENTENCE_TERMINATORS)
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
}

fn pack_sentences(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_len = 0;

    for sentence in sentences(text) {
        let sentence_len = sentence.chars().count() + 1;
        if buffer_len > 0 && buffer_len + sentence_len > max_chars {
            chunks.push(std::mem::take(&mut buffer));
            buffer_len = 0;
        }
        buffer.push_str(sentence);
        buffer.push(CHUNK_TERMINATOR);
        buffer_len += sentence_len;
    }

    if !buffer.is_empty() {
        chunks.push(buffer);
    }
    chunks
}

/// Prefix each chunk after the first with the tail of the original previous chunk.
fn apply_overlap(chunks: Vec<String>, overlap: usize) -> Vec<Chunk> {
    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;

    for (index, body) in chunks.into_iter().enumerate() {
        let chunk = match previous.as_deref() {
            Some(prev) if overlap > 0 => {
                let tail = char_tail(prev, overlap);
                let mut text = String::with_capacity(tail.len() + body.len());
                text.push_str(tail);
                text.push_str(&body);
                Chunk {
                    index,
                    text,
                    overlap: tail.chars().count(),
                }
            }
            _ => Chunk {
                index,
                text: body.clone(),
                overlap: 0,
            },
        };
        overlapped.push(chunk);
        previous = Some(body);
    }

    overlapped
}

/// Last `count` characters of `text`, or all of it when shorter.
fn char_tail(text: &str, count: usize) -> &str {
    let len = text.chars().count();
    if len <= count {
        return text;
    }
    let start = text
        .char_indices()
        .nth(len - count)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len());
    &text[start..]
}
