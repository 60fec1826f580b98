//! Recursive character splitter producing overlapping fixed-size chunks.

use std::collections::VecDeque;

use anyhow::Result;

use super::document::{Chunk, Page};

/// Separators tried in order: paragraphs, lines, words, characters.
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Splits text on the coarsest separator that works, recursing into oversized pieces.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    /// Builds a splitter. Sizes are measured in characters.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        anyhow::ensure!(chunk_size > 0, "chunk size must be positive");
        anyhow::ensure!(
            chunk_overlap < chunk_size,
            "chunk overlap {} must be smaller than chunk size {}",
            chunk_overlap,
            chunk_size
        );
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Replaces the separator list. The last separator should be `""` so any text can be split.
    pub fn with_separators(mut self, separators: &[&str]) -> Self {
        self.separators = separators.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Maximum chunk length.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Maximum carry-over between adjacent chunks.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits one text into chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let separators: Vec<&str> = self.separators.iter().map(String::as_str).collect();
        self.split_recursive(text, &separators)
    }

    /// Splits every page, numbering chunks in order across all pages.
    pub fn split_pages(&self, pages: &[Page]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in pages {
            for text in self.split_text(&page.text) {
                chunks.push(Chunk {
                    source: page.source.clone(),
                    page: page.page,
                    position: chunks.len(),
                    text,
                });
            }
        }
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, rest) = pick_separator(text, separators);
        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(idx, ch)| &text[idx..idx + ch.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|piece| !piece.is_empty()).collect()
        };

        let mut out = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                out.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if rest.is_empty() {
                out.push(piece.to_string());
            } else {
                out.extend(self.split_recursive(piece, rest));
            }
        }
        if !fitting.is_empty() {
            out.extend(self.merge(&fitting, separator));
        }
        out
    }

    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joined_len = |current: &VecDeque<&str>, total: usize| {
                total + len + if current.is_empty() { 0 } else { sep_len }
            };
            if joined_len(&current, total) > self.chunk_size && !current.is_empty() {
                push_doc(&mut docs, &current, separator);
                while total > self.chunk_overlap
                    || (joined_len(&current, total) > self.chunk_size && total > 0)
                {
                    let Some(front) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + if current.is_empty() { 0 } else { sep_len };
                }
            }
            current.push_back(piece);
            total += len + if current.len() > 1 { sep_len } else { 0 };
        }
        push_doc(&mut docs, &current, separator);
        docs
    }
}

fn pick_separator<'s>(text: &str, separators: &'s [&'s str]) -> (&'s str, &'s [&'s str]) {
    for (idx, &separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return (separator, &[]);
        }
        if text.contains(separator) {
            return (separator, &separators[idx + 1..]);
        }
    }
    ("", &[])
}

fn push_doc(docs: &mut Vec<String>, current: &VecDeque<&str>, separator: &str) {
    let joined = current
        .iter()
        .copied()
        .collect::<Vec<_>>()
        .join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
