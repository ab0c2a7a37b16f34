//! Recursive character splitter.
//!
//! Text is cut on the coarsest separator present (paragraph, line, word,
//! character) and the pieces are merged back into chunks of at most
//! `chunk_size` characters. Consecutive chunks share up to `chunk_overlap`
//! characters. A piece that is still too long is split again with the next
//! finer separator.

use log::warn;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Clone, Debug)]
pub struct RecursiveSplitter {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for RecursiveSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Splits on `separator`, keeping it at the start of each following piece.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut parts = text.split(separator);
    let mut pieces = Vec::new();
    if let Some(first) = parts.next() {
        pieces.push(first.to_string());
    }
    for part in parts {
        pieces.push(format!("{}{}", separator, part));
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        if chunk_overlap > chunk_size {
            warn!("Chunk overlap {} exceeds chunk size {}; clamping", chunk_overlap, chunk_size);
        }
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut finer: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut short_pieces: Vec<String> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                short_pieces.push(piece);
                continue;
            }
            if !short_pieces.is_empty() {
                chunks.extend(self.merge(&short_pieces));
                short_pieces.clear();
            }
            if finer.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, finer));
            }
        }
        if !short_pieces.is_empty() {
            chunks.extend(self.merge(&short_pieces));
        }
        chunks
    }

    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                push_joined(&mut chunks, &window);
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    total -= char_len(window[0]);
                    window.remove(0);
                }
            }
            window.push(piece);
            total += len;
        }
        push_joined(&mut chunks, &window);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &[&str]) {
    let joined = window.concat();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_become_separate_chunks() {
        let splitter = RecursiveSplitter::new(20, 5);
        assert_eq!(splitter.split("alpha beta gamma\n\ndelta epsilon zeta"), [
            "alpha beta gamma",
            "delta epsilon zeta",
        ]);
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let splitter = RecursiveSplitter::new(10, 4);
        assert_eq!(splitter.split("aaa bbb ccc ddd"), ["aaa bbb", "bbb ccc", "ccc ddd"]);
    }

    #[test]
    fn chunks_never_exceed_chunk_size() {
        let text = "Asthma is a chronic disease. ".repeat(200) + "\n\n" + &"x".repeat(2500);
        let splitter = RecursiveSplitter::default();
        let chunks = splitter.split(&text);
        assert!(chunks.len() > 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1000, "{}", chunk.len());
        }
    }

    #[test]
    fn short_text_is_one_chunk_and_empty_text_none() {
        let splitter = RecursiveSplitter::default();
        assert_eq!(splitter.split("  Short summary.  "), ["Short summary."]);
        assert!(splitter.split("").is_empty());
        assert!(splitter.split("\n\n  \n").is_empty());
    }

    #[test]
    fn counts_characters_not_bytes() {
        let splitter = RecursiveSplitter::new(4, 0);
        assert_eq!(splitter.split("ééé ééé"), ["ééé", "ééé"]);
    }
}
