//! Recursive character splitter.
//!
//! Text is split on the first separator that occurs in it (paragraphs, then
//! lines, then words, then characters). Pieces that still exceed the chunk
//! size are split again with the remaining separators, and small pieces are
//! merged back into chunks that overlap by up to `chunk_overlap` characters.
//! All lengths are measured in characters, never bytes.

use std::collections::VecDeque;

use super::{DocumentChunk, PageText};

const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Splits one page into chunks with deterministic ids.
    pub fn split_page(&self, page: &PageText) -> Vec<DocumentChunk> {
        let mut chunks = Vec::new();
        let mut search_from = 0usize;

        for (chunk_index, text) in self.split_text(&page.text).into_iter().enumerate() {
            let start_offset = match page.text.get(search_from..).and_then(|rest| rest.find(&text)) {
                Some(pos) => {
                    let byte_start = search_from + pos;
                    search_from = byte_start + text.chars().next().map(char::len_utf8).unwrap_or(1);
                    page.text[..byte_start].chars().count()
                }
                None => page.text[..search_from.min(page.text.len())].chars().count(),
            };

            chunks.push(DocumentChunk {
                id: DocumentChunk::chunk_id(&page.source_file, page.page, chunk_index),
                source_file: page.source_file.clone(),
                page: page.page,
                start_offset,
                chunk_index,
                text,
            });
        }

        chunks
    }

    pub fn split_pages(&self, pages: &[PageText]) -> Vec<DocumentChunk> {
        pages.iter().flat_map(|page| self.split_page(page)).collect()
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().cloned().unwrap_or_default();
        let mut remaining: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = String::new();
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate.clone();
                remaining = &separators[i + 1..];
                break;
            }
        }

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(|c| c.to_string()).collect()
        } else {
            // empty pieces from separator runs are kept so that merged
            // chunks stay verbatim slices of the page
            text.split(separator.as_str()).map(str::to_string).collect()
        };

        let mut final_chunks = Vec::new();
        let mut good_splits: Vec<String> = Vec::new();

        for split in splits {
            if char_len(&split) < self.chunk_size {
                good_splits.push(split);
                continue;
            }
            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits, &separator));
                good_splits.clear();
            }
            if remaining.is_empty() {
                final_chunks.push(split);
            } else {
                final_chunks.extend(self.split_recursive(&split, remaining));
            }
        }

        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits, &separator));
        }

        final_chunks
    }

    fn merge_splits(&self, splits: &[String], separator: &str) -> Vec<String> {
        let separator_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for split in splits {
            let len = char_len(split);
            let joined_len = |current: &VecDeque<&str>| if current.is_empty() { 0 } else { separator_len };

            if total + len + joined_len(&current) > self.chunk_size && !current.is_empty() {
                if let Some(doc) = join_trimmed(&current, separator) {
                    docs.push(doc);
                }
                while total > self.chunk_overlap
                    || (total + len + joined_len(&current) > self.chunk_size && total > 0)
                {
                    let Some(first) = current.pop_front() else {
                        break;
                    };
                    total -= char_len(first) + if current.is_empty() { 0 } else { separator_len };
                }
            }

            total += len + joined_len(&current);
            current.push_back(split);
        }

        if let Some(doc) = join_trimmed(&current, separator) {
            docs.push(doc);
        }
        docs
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn join_trimmed(parts: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = parts.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
