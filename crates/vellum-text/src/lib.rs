//! Text domain for Vellum: chapter chunking and reading-position arithmetic.
//!
//! Everything in this crate is pure and synchronous. Chunks are the unit of
//! narration requests; positions address a character within a chunk within a
//! chapter.

pub mod chunker;
pub mod position;

pub use chunker::{chunk_text, chunk_with_budget, CHUNK_CHAR_BUDGET};
pub use position::{
    advance_offset, chars_for_seconds, clamp_position, last_position, Position, CHARS_PER_SECOND,
};
