//! Fixed-size overlapping text splitter.
//!
//! Lengths and offsets are measured in characters, not bytes. A chunk ends at
//! the last paragraph break inside its window, else the last line break, else
//! the last sentence end, else the last space, else a hard cut at the window
//! edge. Consecutive chunks share roughly `chunk_overlap` characters, realigned
//! to a word start when the overlap contains one.

use autospec_core::error::{AutoSpecError, Result};

/// Break candidates in order of preference.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", "; ", " "];

/// A chunk of text together with the character offset it starts at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Character offset of the first non-whitespace character.
    pub start: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<Vec<char>>,
}

impl TextSplitter {
    /// Create a splitter. `chunk_overlap` must be smaller than `chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(AutoSpecError::Config(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(AutoSpecError::Config(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: SEPARATORS.iter().map(|s| s.chars().collect()).collect(),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into overlapping spans of at most `chunk_size` characters.
    ///
    /// Spans are trimmed; whitespace-only input yields no spans.
    pub fn split(&self, text: &str) -> Vec<Span> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let mut spans = Vec::new();

        let mut start = skip_whitespace(&chars, 0);
        while start < len {
            let window_end = (start + self.chunk_size).min(len);
            let end = if window_end == len {
                len
            } else {
                self.find_break(&chars, start, window_end)
            };

            let piece: String = chars[start..end].iter().collect();
            let piece = piece.trim_end();
            if !piece.is_empty() {
                spans.push(Span {
                    start,
                    text: piece.to_string(),
                });
            }

            if end >= len {
                break;
            }

            // find_break guarantees end > start + overlap, so this advances.
            let mut next = end - self.chunk_overlap;
            while next < end && !chars[next - 1].is_whitespace() {
                next += 1;
            }
            // No word start inside the overlap: keep the overlap unaligned.
            if next == end {
                next = end - self.chunk_overlap;
            }
            start = skip_whitespace(&chars, next);
        }

        spans
    }

    /// Pick the cut position for the window `chars[start..window_end]`.
    ///
    /// The cut always lies beyond `start + chunk_overlap` so the next chunk
    /// starts strictly after this one.
    fn find_break(&self, chars: &[char], start: usize, window_end: usize) -> usize {
        let min_cut = start + self.chunk_overlap + 1;
        for sep in &self.separators {
            let mut cut = window_end;
            while cut >= min_cut && cut >= sep.len() {
                if chars[cut - sep.len()..cut] == sep[..] {
                    return cut;
                }
                cut -= 1;
            }
        }
        window_end
    }
}

fn skip_whitespace(chars: &[char], mut pos: usize) -> usize {
    while pos < chars.len() && chars[pos].is_whitespace() {
        pos += 1;
    }
    pos
}
