//! Splitting record texts into passages that fit the model's document length.
//!
//! Lengths are budgeted in model tokens but measured in characters, at
//! roughly four characters per token for English text.

/// Approximate characters per token for English text.
const CHARS_PER_TOKEN: usize = 4;

/// Character budget for a passage of `tokens` model tokens.
pub fn chars_for_tokens(tokens: usize) -> usize {
    tokens.saturating_mul(CHARS_PER_TOKEN).max(1)
}

/// The passages to index for one record text.
///
/// With `split` set, texts longer than `max_tokens` become several passages;
/// otherwise the text is cut at the budget and the rest is not indexed.
/// Whitespace-only windows of a long text are skipped.
pub fn split_passages(text: &str, max_tokens: usize, split: bool) -> Vec<String> {
    let budget = chars_for_tokens(max_tokens);
    if split {
        return chunk_text(text, budget);
    }

    match text.char_indices().nth(budget) {
        Some((byte_idx, _)) => vec![text[..byte_idx].to_string()],
        None => vec![text.to_string()],
    }
}

/// Split text into consecutive chunks of at most `chunk_size` characters.
///
/// If the text is shorter than `chunk_size` characters, returns a single
/// chunk. Breaks prefer whitespace near the window end, and never split a
/// multi-byte character. Chunks tile the text: concatenated, they give back
/// the input minus any whitespace-only windows.
///
/// # Examples
///
/// ```
/// use ragbert::chunking::chunk_text;
///
/// let chunks = chunk_text("Hello, world!", 1000);
/// assert_eq!(chunks, vec!["Hello, world!"]);
///
/// let text = "word ".repeat(500);
/// let chunks = chunk_text(&text, 1000);
/// assert!(chunks.len() >= 3);
/// assert_eq!(chunks.concat(), text);
/// ```
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let char_count = text.chars().count();

    if char_count <= chunk_size {
        return vec![text.to_string()];
    }

    // char index -> byte index, with a sentinel for the end of the text
    let char_to_byte: Vec<usize> = text
        .char_indices()
        .map(|(byte_idx, _)| byte_idx)
        .chain(std::iter::once(text.len()))
        .collect();

    let mut chunks = Vec::new();
    let mut start_char = 0;

    while start_char < char_count {
        let end_char = (start_char + chunk_size).min(char_count);

        let chunk_end_char = if end_char < char_count {
            find_word_boundary_char(text, &char_to_byte, start_char, end_char)
        } else {
            end_char
        };

        let chunk = &text[char_to_byte[start_char]..char_to_byte[chunk_end_char]];
        if !chunk.trim().is_empty() {
            chunks.push(chunk.to_string());
        }

        start_char = chunk_end_char;
    }

    chunks
}

/// Find a break point at or before `pos_char`, preferring the character
/// after the last whitespace in the preceding 100 characters.
fn find_word_boundary_char(
    text: &str,
    char_to_byte: &[usize],
    start_char: usize,
    pos_char: usize,
) -> usize {
    let search_start_char = pos_char.saturating_sub(100).max(start_char + 1);
    if search_start_char >= pos_char {
        return pos_char;
    }

    let start_byte = char_to_byte[search_start_char];
    let end_byte = char_to_byte[pos_char];
    let search_region = &text[start_byte..end_byte];

    if let Some(ws_byte_offset) =
        search_region.rfind(|c: char| c.is_whitespace())
    {
        let ws_byte = start_byte + ws_byte_offset;
        if let Some(char_idx) = char_to_byte[search_start_char..pos_char]
            .iter()
            .position(|&byte_idx| byte_idx > ws_byte)
        {
            return search_start_char + char_idx;
        }
    }

    pos_char
}
