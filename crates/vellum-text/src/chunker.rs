//! Splits chapter text into bounded, sentence-aligned chunks.

/// Maximum chunk length in characters, before trimming.
pub const CHUNK_CHAR_BUDGET: usize = 250;

/// Sentence terminators, searched in priority order.
const TERMINATORS: [char; 3] = ['.', '?', '!'];

/// Split `text` into non-empty trimmed chunks of at most
/// [`CHUNK_CHAR_BUDGET`] characters, each ending at a sentence terminator
/// where one falls inside the window.
pub fn chunk_text(text: &str) -> Vec<String> {
    chunk_with_budget(text, CHUNK_CHAR_BUDGET)
}

/// Same as [`chunk_text`] with an explicit character budget.
///
/// Indices are Unicode scalar values, not bytes. The cursor always advances
/// to the cut point rather than past the trimmed length, so the walk
/// terminates even when trimming drops a whole window of whitespace.
pub fn chunk_with_budget(text: &str, budget: usize) -> Vec<String> {
    let budget = budget.max(1);
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut cursor = 0;

    while cursor < chars.len() {
        let window_end = cursor + budget;
        let cut = if window_end >= chars.len() {
            chars.len()
        } else {
            sentence_cut(&chars, cursor, window_end).unwrap_or(window_end)
        };

        let piece: String = chars[cursor..cut].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        cursor = cut;
    }

    chunks
}

/// Find the cut point just after the sentence terminator nearest to
/// `window_end`, considering `.` before `?` before `!`. Only indices strictly
/// greater than `cursor` qualify, so every cut consumes at least one
/// character.
fn sentence_cut(chars: &[char], cursor: usize, window_end: usize) -> Option<usize> {
    for terminator in TERMINATORS {
        for i in (cursor + 1..window_end).rev() {
            if chars[i] == terminator {
                return Some(i + 1);
            }
        }
    }
    None
}
