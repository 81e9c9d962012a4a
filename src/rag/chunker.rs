//! Sentence-aware sliding-window chunker.
//!
//! Text is whitespace-normalized first, then cut into windows of `chunk_size`
//! characters. A window that ends inside the text is pulled back to just after
//! the nearest sentence terminal, looking back at most `chunk_size / 2` or
//! [`MAX_SNAP_DISTANCE`] characters, whichever is closer. Consecutive windows
//! overlap by `chunk_overlap` characters.
//!
//! All offsets are character positions in the normalized text.

use crate::types::{AppError, Result, Segment};

/// Characters that end a sentence.
pub const SENTENCE_TERMINALS: [char; 6] = ['.', '!', '?', '。', '！', '？'];

/// Furthest a window end may move back when snapping to a sentence terminal.
pub const MAX_SNAP_DISTANCE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    /// Fails with `AppError::Configuration` when `chunk_size` is zero.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(AppError::Configuration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into ordered, overlapping segments.
    pub fn split(&self, text: &str) -> Vec<Segment> {
        let normalized = normalize_whitespace(text);
        let chars: Vec<char> = normalized.chars().collect();
        let len = chars.len();

        let mut segments = Vec::new();
        let mut start = 0;

        while start < len {
            let mut end = start + self.chunk_size;

            if end < len {
                let floor = (start + self.chunk_size / 2).max(end.saturating_sub(MAX_SNAP_DISTANCE));
                if let Some(terminal) = (floor..end)
                    .rev()
                    .find(|&i| SENTENCE_TERMINALS.contains(&chars[i]))
                {
                    end = terminal + 1;
                }
            }

            let window_end = end.min(len);
            let window: String = chars[start..window_end].iter().collect();
            let trimmed = window.trim();

            if !trimmed.is_empty() {
                segments.push(Segment {
                    sequence_index: segments.len(),
                    text: trimmed.to_string(),
                    start_offset: start,
                    end_offset: window_end,
                    length: trimmed.chars().count(),
                });
            }

            // `end` may lie past the text; advancing from it ends the walk
            // instead of emitting a run of ever-shorter tail windows.
            start = (start + 1).max(end.saturating_sub(self.chunk_overlap));
        }

        segments
    }
}

/// Split with explicit parameters.
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Segment>> {
    Ok(TextChunker::new(chunk_size, overlap)?.split(text))
}

/// Collapse every whitespace run (newlines included) into one space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
