//! Sliding-window text chunker.
//!
//! Splits text into fixed-size, overlapping windows suitable for
//! embedding. Sizes and offsets are measured in characters (Unicode scalar
//! values), never bytes, so multi-byte text is never split inside a
//! character.
//!
//! # Algorithm
//!
//! 1. Text that fits in one window (`len <= size`) is a single window.
//! 2. Otherwise start at character 0 and emit `text[start .. start + size]`
//!    (clamped to the end of the text).
//! 3. Advance `start` by `size - overlap` and repeat while `start` is
//!    still inside the text.
//!
//! The final window may be shorter than `size`, and when the text length
//! is not aligned to the step it may lie entirely inside the previous
//! window's overlap region.
//!
//! # Example
//!
//! ```rust
//! use coach_rag_core::chunk::chunk_text;
//!
//! let text = "a".repeat(2500);
//! let windows = chunk_text(&text, 1000, 200);
//! assert_eq!(windows.len(), 4);
//! assert_eq!(windows[3].offset, 2400);
//! ```

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive windows in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// One window of the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextWindow {
    /// Character offset of the window's first character.
    pub offset: usize,
    /// Window text.
    pub text: String,
}

impl TextWindow {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Split `text` into windows of `size` characters advancing by
/// `size - overlap`.
///
/// Returns an empty vector for empty text and exactly one window for
/// text no longer than `size`. Longer text always emits a window at every
/// step offset below its length, even when that window lies entirely in
/// the previous window's overlap. A zero `size` is treated as 1 and an
/// `overlap >= size` degrades to a step of one character; configuration
/// validation rejects both before they reach here.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<TextWindow> {
    let size = size.max(1);
    let step = size.saturating_sub(overlap).max(1);

    // Byte offset of every char boundary, plus the end of the text.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let char_count = bounds.len();
    bounds.push(text.len());

    if char_count == 0 {
        return Vec::new();
    }
    if char_count <= size {
        return vec![TextWindow {
            offset: 0,
            text: text.to_string(),
        }];
    }

    let mut windows = Vec::new();
    let mut start = 0usize;
    while start < char_count {
        let end = (start + size).min(char_count);
        windows.push(TextWindow {
            offset: start,
            text: text[bounds[start]..bounds[end]].to_string(),
        });
        start += step;
    }
    windows
}
