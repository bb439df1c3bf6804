//! The (chapter, chunk, character) coordinate system and its seek arithmetic.

use serde::{Deserialize, Serialize};

/// Fixed speech-speed heuristic used for time-based seeking and for watchdog
/// deadlines: characters narrated per second at rate 1.0.
pub const CHARS_PER_SECOND: f64 = 15.0;

/// A reading position: character `char_offset` within chunk `chunk` of
/// chapter `chapter`. The character index is both the narration resume point
/// and the highlight cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub chapter: usize,
    pub chunk: usize,
    pub char_offset: usize,
}

impl Position {
    pub fn new(chapter: usize, chunk: usize, char_offset: usize) -> Self {
        Self {
            chapter,
            chunk,
            char_offset,
        }
    }

    /// Start of a chapter.
    pub fn chapter_start(chapter: usize) -> Self {
        Self::new(chapter, 0, 0)
    }
}

/// Estimated character distance covered by `seconds` of narration at the
/// given playback rate. Signed; negative seconds seek backward.
pub fn chars_for_seconds(seconds: i64, rate: f32) -> i64 {
    (seconds as f64 * CHARS_PER_SECOND * rate as f64).round() as i64
}

fn chunk_chars(chunk: &str) -> usize {
    chunk.chars().count()
}

fn total_chars(chapters: &[Vec<String>]) -> i64 {
    chapters
        .iter()
        .flatten()
        .map(|c| chunk_chars(c) as i64)
        .sum()
}

/// Move `position` by a signed character offset, walking across chunk and
/// chapter boundaries. Clamps at (0,0,0) going backward and at the last
/// character of the last chunk of the last chapter going forward; never
/// wraps. Chapters without chunks are skipped.
pub fn advance_offset(position: Position, chapters: &[Vec<String>], offset: i64) -> Position {
    let total = total_chars(chapters);
    if total == 0 {
        return Position::default();
    }

    let absolute = absolute_index(position, chapters);
    let target = (absolute + offset).clamp(0, total - 1);

    let mut acc = 0i64;
    for (chapter_idx, chapter) in chapters.iter().enumerate() {
        for (chunk_idx, chunk) in chapter.iter().enumerate() {
            let len = chunk_chars(chunk) as i64;
            if target < acc + len {
                return Position::new(chapter_idx, chunk_idx, (target - acc) as usize);
            }
            acc += len;
        }
    }

    last_position(chapters)
}

/// Absolute character index of `position` over the flattened book. A
/// position past the end of its chunk (char_offset == len) maps onto the
/// start of the next chunk.
fn absolute_index(position: Position, chapters: &[Vec<String>]) -> i64 {
    let mut acc = 0i64;
    for (chapter_idx, chapter) in chapters.iter().enumerate() {
        for (chunk_idx, chunk) in chapter.iter().enumerate() {
            let len = chunk_chars(chunk) as i64;
            if chapter_idx == position.chapter && chunk_idx == position.chunk {
                return acc + (position.char_offset as i64).min(len);
            }
            acc += len;
        }
        if chapter_idx == position.chapter {
            // Position addresses a chapter without chunks.
            return acc;
        }
    }
    acc
}

/// Position of the last character of the book, or the origin for an empty
/// book.
pub fn last_position(chapters: &[Vec<String>]) -> Position {
    for (chapter_idx, chapter) in chapters.iter().enumerate().rev() {
        if let Some((chunk_idx, chunk)) = chapter.iter().enumerate().next_back() {
            let len = chunk_chars(chunk);
            return Position::new(chapter_idx, chunk_idx, len.saturating_sub(1));
        }
    }
    Position::default()
}

/// Force `position` into the book's bounds. Used when seeding from persisted
/// progress that may describe an older rendition of the book.
pub fn clamp_position(position: Position, chapters: &[Vec<String>]) -> Position {
    if chapters.is_empty() {
        return Position::default();
    }
    let chapter = position.chapter.min(chapters.len() - 1);
    let chunks = &chapters[chapter];
    if chunks.is_empty() {
        return Position::chapter_start(chapter);
    }
    let chunk = position.chunk.min(chunks.len() - 1);
    let char_offset = position.char_offset.min(chunk_chars(&chunks[chunk]));
    Position::new(chapter, chunk, char_offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn book() -> Vec<Vec<String>> {
        vec![
            vec!["abcde".into(), "fgh".into()],
            vec![],
            vec!["ijklmnop".into()],
        ]
    }

    #[test]
    fn advances_within_a_chunk() {
        let pos = advance_offset(Position::new(0, 0, 1), &book(), 2);
        assert_eq!(pos, Position::new(0, 0, 3));
    }

    #[test]
    fn advances_across_chunks_and_chapters() {
        // 5 chars of chunk (0,0), then into (0,1), then chapter 1 is empty
        // and gets skipped into chapter 2.
        let pos = advance_offset(Position::new(0, 0, 0), &book(), 5);
        assert_eq!(pos, Position::new(0, 1, 0));
        let pos = advance_offset(Position::new(0, 1, 2), &book(), 3);
        assert_eq!(pos, Position::new(2, 0, 2));
    }

    #[test]
    fn walks_backward_across_boundaries() {
        let pos = advance_offset(Position::new(2, 0, 1), &book(), -3);
        assert_eq!(pos, Position::new(0, 1, 1));
    }

    #[test]
    fn clamps_at_the_origin() {
        let pos = advance_offset(Position::new(0, 0, 2), &book(), -100);
        assert_eq!(pos, Position::default());
    }

    #[test]
    fn clamps_at_the_last_character() {
        let pos = advance_offset(Position::new(0, 0, 0), &book(), 10_000);
        assert_eq!(pos, Position::new(2, 0, 7));
        assert_eq!(pos, last_position(&book()));
    }

    #[test]
    fn empty_book_stays_at_origin() {
        let chapters: Vec<Vec<String>> = vec![vec![], vec![]];
        assert_eq!(
            advance_offset(Position::new(1, 0, 0), &chapters, 42),
            Position::default()
        );
        assert_eq!(last_position(&chapters), Position::default());
    }

    #[test]
    fn seconds_to_chars_heuristic() {
        assert_eq!(chars_for_seconds(30, 1.0), 450);
        assert_eq!(chars_for_seconds(-30, 1.0), -450);
        assert_eq!(chars_for_seconds(30, 2.0), 900);
        assert_eq!(chars_for_seconds(10, 0.5), 75);
        assert_eq!(chars_for_seconds(0, 1.5), 0);
    }

    #[test]
    fn clamp_position_bounds_every_coordinate() {
        let chapters = book();
        assert_eq!(
            clamp_position(Position::new(9, 9, 9), &chapters),
            Position::new(2, 0, 8)
        );
        assert_eq!(
            clamp_position(Position::new(1, 3, 2), &chapters),
            Position::chapter_start(1)
        );
        assert_eq!(
            clamp_position(Position::new(0, 1, 1), &chapters),
            Position::new(0, 1, 1)
        );
    }

    fn arb_book() -> impl Strategy<Value = Vec<Vec<String>>> {
        prop::collection::vec(
            prop::collection::vec("[a-z]{1,12}", 0..4),
            1..4,
        )
    }

    proptest! {
        #[test]
        fn never_escapes_the_book(book in arb_book(), offset in -500i64..500) {
            let pos = advance_offset(Position::default(), &book, offset);
            let last = last_position(&book);
            prop_assert!(pos.chapter <= last.chapter);
            prop_assert_eq!(pos, clamp_position(pos, &book));
        }

        #[test]
        fn forward_then_backward_round_trips(book in arb_book(), k in 0i64..200) {
            let total: i64 = book.iter().flatten().map(|c| c.chars().count() as i64).sum();
            prop_assume!(total > 1);
            let start = advance_offset(Position::default(), &book, 0);
            let k = k.min(total - 1);
            let there = advance_offset(start, &book, k);
            let back = advance_offset(there, &book, -k);
            prop_assert_eq!(back, start);
        }
    }
}
