//! Keeps text inside an approximate token budget before it is handed to a model.
//!
//! Token counts are estimated at four characters per token. Oversized text keeps its
//! head and tail and loses the middle, which tends to preserve the framing of a JSON
//! result (totals up front, closing structure at the end) better than a plain cut.

/// Budget used when a consumer does not configure one
pub const DEFAULT_MAX_TOKENS: usize = 128_000;

/// Inserted between the kept head and tail of condensed text
pub const CONDENSED_MARKER: &str = "\n\n[... content condensed to fit within the token budget ...]\n\n";

const CHARS_PER_TOKEN: usize = 4;

/// Approximate token count, `ceil(chars / 4)`
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

#[derive(Debug, Clone, Copy)]
pub struct Condenser {
    max_tokens: usize,
}

impl Default for Condenser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOKENS)
    }
}

impl Condenser {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Characters kept in total once text is over budget, leaving 20% headroom
    pub fn effective_char_budget(&self) -> usize {
        self.max_tokens * CHARS_PER_TOKEN * 4 / 5
    }

    /// Return `text` unchanged when it fits, otherwise its head and tail joined by
    /// [`CONDENSED_MARKER`]
    pub fn condense(&self, text: &str) -> String {
        if estimate_tokens(text) <= self.max_tokens {
            return text.to_string();
        }

        let half = self.effective_char_budget() / 2;
        let total = text.chars().count();

        // Work in char offsets so a multi-byte code point is never split.
        let head_end = byte_offset(text, half);
        let tail_start = byte_offset(text, total.saturating_sub(half));

        tracing::debug!(
            original_chars = total,
            kept_chars = half * 2,
            max_tokens = self.max_tokens,
            "condensed oversized text"
        );

        let mut condensed = String::with_capacity(head_end + CONDENSED_MARKER.len() + (text.len() - tail_start));
        condensed.push_str(&text[..head_end]);
        condensed.push_str(CONDENSED_MARKER);
        condensed.push_str(&text[tail_start..]);
        condensed
    }
}

fn byte_offset(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len())
}
