//! Book input and its chunked rendition.
//!
//! A [`Book`] is what the container-extraction collaborator hands us: a
//! title, an optional cover, ordered chapter plain-text, and a stable
//! identity for keying persisted progress. The core never parses container
//! formats itself; the plain-text loader below stands in for that
//! collaborator in the demo binary.

use std::io;
use std::path::{Path, PathBuf};

use vellum_text::{chunk_with_budget, Position};

pub struct Book {
    pub title: String,
    pub cover: Option<PathBuf>,
    pub chapters: Vec<String>,
    pub identity_key: String,
}

impl Book {
    /// Load a plain-text book, splitting chapters on blank-line runs.
    pub fn from_text_file(path: &Path) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string());
        let identity_key = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| title.clone());

        let mut chapters: Vec<String> = text
            .split("\n\n\n")
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        if chapters.is_empty() && !text.trim().is_empty() {
            chapters.push(text.trim().to_string());
        }

        Ok(Self {
            title,
            cover: None,
            chapters,
            identity_key,
        })
    }
}

/// A book with every chapter split into narration chunks. Derived once at
/// session open; never mutated afterwards.
pub struct ChunkedBook {
    title: String,
    cover: Option<PathBuf>,
    identity_key: String,
    chapters: Vec<Vec<String>>,
}

impl ChunkedBook {
    pub fn new(book: Book, chunk_budget: usize) -> Self {
        let chapters = book
            .chapters
            .iter()
            .map(|chapter| chunk_with_budget(chapter, chunk_budget))
            .collect();
        Self {
            title: book.title,
            cover: book.cover,
            identity_key: book.identity_key,
            chapters,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn cover(&self) -> Option<&Path> {
        self.cover.as_deref()
    }

    pub fn identity_key(&self) -> &str {
        &self.identity_key
    }

    pub fn chapters(&self) -> &[Vec<String>] {
        &self.chapters
    }

    pub fn chapter_count(&self) -> usize {
        self.chapters.len()
    }

    pub fn chunk_count(&self, chapter: usize) -> usize {
        self.chapters.get(chapter).map_or(0, Vec::len)
    }

    /// Text of the chunk the position addresses, if any.
    pub fn chunk_text(&self, position: Position) -> Option<&str> {
        self.chapters
            .get(position.chapter)?
            .get(position.chunk)
            .map(String::as_str)
    }

    /// First chapter at or after `from` that has narratable chunks.
    pub fn next_chapter_with_chunks(&self, from: usize) -> Option<usize> {
        (from..self.chapters.len()).find(|&idx| !self.chapters[idx].is_empty())
    }

    /// Fraction of the current chapter already narrated, by character.
    pub fn chapter_progress(&self, position: Position) -> f32 {
        let Some(chunks) = self.chapters.get(position.chapter) else {
            return 0.0;
        };
        let total: usize = chunks.iter().map(|c| c.chars().count()).sum();
        if total == 0 {
            return 0.0;
        }
        let done: usize = chunks
            .iter()
            .take(position.chunk)
            .map(|c| c.chars().count())
            .sum::<usize>()
            + position.char_offset;
        (done as f32 / total as f32).clamp(0.0, 1.0)
    }

    /// Fraction of the book already narrated, weighting every chapter
    /// equally.
    pub fn book_progress(&self, position: Position) -> f32 {
        if self.chapters.is_empty() {
            return 0.0;
        }
        let within = self.chapter_progress(position);
        ((position.chapter as f32 + within) / self.chapters.len() as f32).clamp(0.0, 1.0)
    }
}
