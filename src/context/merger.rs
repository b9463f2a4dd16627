//! Combines retrieved chunks and web results into one bounded context block.
//!
//! Items are numbered in a fixed order (document chunks by descending score,
//! then web results in provider order) and rendered with a citation header.
//! The rendered text never exceeds `max_chars` characters: items are dropped
//! from the end of that order, and when even the first item is too long its
//! body is cut.

use serde::Serialize;

use crate::rag::RetrievedChunk;
use crate::search::WebResult;

const SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergedContext {
    pub text: String,
    /// Chunks whose text made it into `text`.
    pub documents: Vec<RetrievedChunk>,
    /// Web results whose text made it into `text`.
    pub web: Vec<WebResult>,
    /// Whether anything was dropped or cut to respect the budget.
    pub truncated: bool,
}

impl MergedContext {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

enum Item {
    Document(RetrievedChunk),
    Web(WebResult),
}

impl Item {
    fn header(&self, number: usize) -> String {
        match self {
            Item::Document(doc) => format!(
                "[{}] (Source: {}, page {}, relevance: {:.2})",
                number, doc.chunk.source_file, doc.chunk.page, doc.score
            ),
            Item::Web(web) => format!("[{}] (Web: {} - {})", number, web.title, web.url),
        }
    }

    fn body(&self) -> &str {
        match self {
            Item::Document(doc) => doc.chunk.text.trim(),
            Item::Web(web) => web.snippet.trim(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextMerger {
    max_chars: usize,
}

impl ContextMerger {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn merge(&self, mut documents: Vec<RetrievedChunk>, web: Vec<WebResult>) -> MergedContext {
        documents.sort_by(|a, b| b.score.total_cmp(&a.score));
        let items: Vec<Item> = documents
            .into_iter()
            .map(Item::Document)
            .chain(web.into_iter().map(Item::Web))
            .collect();
        let total_items = items.len();

        let mut merged = MergedContext::default();
        let mut used = 0usize;

        for (i, item) in items.into_iter().enumerate() {
            let header = item.header(i + 1);
            let block = format!("{}\n{}", header, item.body());
            let block_len = block.chars().count();
            let sep_len = if i == 0 { 0 } else { SEPARATOR.chars().count() };

            if used + sep_len + block_len > self.max_chars {
                if i == 0 {
                    merged.text = cut_block(&header, item.body(), self.max_chars);
                    used = merged.text.chars().count();
                    push_item(&mut merged, item);
                }
                merged.truncated = true;
                break;
            }

            if i > 0 {
                merged.text.push_str(SEPARATOR);
            }
            merged.text.push_str(&block);
            used += sep_len + block_len;
            push_item(&mut merged, item);
        }

        if merged.truncated {
            tracing::debug!(
                "Context truncated to {} chars ({} of {} items kept)",
                used,
                merged.documents.len() + merged.web.len(),
                total_items
            );
        }
        merged
    }
}

impl Default for ContextMerger {
    fn default() -> Self {
        Self::new(6000)
    }
}

fn push_item(merged: &mut MergedContext, item: Item) {
    match item {
        Item::Document(doc) => merged.documents.push(doc),
        Item::Web(web) => merged.web.push(web),
    }
}

/// Header plus as much of the body as fits in `max_chars`.
fn cut_block(header: &str, body: &str, max_chars: usize) -> String {
    let header_len = header.chars().count();
    if header_len + 1 >= max_chars {
        return header.chars().take(max_chars).collect();
    }
    let room = max_chars - header_len - 1;
    let body: String = body.chars().take(room).collect();
    format!("{}\n{}", header, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::DocumentChunk;

    fn doc(id: &str, text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk: DocumentChunk {
                id: id.to_string(),
                source_file: format!("{}.pdf", id),
                page: 1,
                start_offset: 0,
                chunk_index: 0,
                text: text.to_string(),
            },
            score,
        }
    }

    fn web(title: &str, snippet: &str) -> WebResult {
        WebResult {
            title: title.to_string(),
            snippet: snippet.to_string(),
            url: format!("https://example.org/{}", title),
        }
    }

    #[test]
    fn documents_come_first_by_score_then_web() {
        let merger = ContextMerger::new(10_000);
        let merged = merger.merge(
            vec![doc("low", "low text", 0.2), doc("high", "high text", 0.9)],
            vec![web("w1", "first web"), web("w2", "second web")],
        );

        let high = merged.text.find("high text").unwrap();
        let low = merged.text.find("low text").unwrap();
        let w1 = merged.text.find("first web").unwrap();
        let w2 = merged.text.find("second web").unwrap();
        assert!(high < low && low < w1 && w1 < w2);
        assert!(merged.text.starts_with("[1] (Source: high.pdf, page 1, relevance: 0.90)"));
        assert!(merged.text.contains("[4] (Web: w2 - https://example.org/w2)"));
        assert!(!merged.truncated);
    }

    #[test]
    fn text_never_exceeds_budget_and_keeps_best_items() {
        let docs: Vec<RetrievedChunk> = (0..6)
            .map(|i| doc(&format!("d{}", i), &"x".repeat(300), 1.0 - i as f32 * 0.1))
            .collect();
        let webs: Vec<WebResult> = (0..3).map(|i| web(&format!("w{}", i), &"y".repeat(200))).collect();

        for max_chars in [50, 400, 800, 1500, 2500, 6000] {
            let merged = ContextMerger::new(max_chars).merge(docs.clone(), webs.clone());
            assert!(
                merged.text.chars().count() <= max_chars,
                "{} > {}",
                merged.text.chars().count(),
                max_chars
            );
            assert_eq!(merged.documents[0].chunk.id, "d0");
            // kept documents are a prefix of the ranking
            for (i, kept) in merged.documents.iter().enumerate() {
                assert_eq!(kept.chunk.id, format!("d{}", i));
            }
            if !merged.web.is_empty() {
                assert_eq!(merged.documents.len(), 6);
            }
        }
    }

    #[test]
    fn oversized_top_item_is_cut_not_dropped() {
        let merged = ContextMerger::new(120).merge(vec![doc("big", &"z".repeat(500), 0.8)], vec![]);

        assert!(merged.truncated);
        assert_eq!(merged.documents.len(), 1);
        assert_eq!(merged.text.chars().count(), 120);
        assert!(merged.text.starts_with("[1] (Source: big.pdf"));
    }

    #[test]
    fn web_only_context_when_no_documents() {
        let merged = ContextMerger::default().merge(vec![], vec![web("Aivancity", "School in Cachan")]);

        assert!(merged.documents.is_empty());
        assert_eq!(merged.web.len(), 1);
        assert!(merged.text.starts_with("[1] (Web: Aivancity"));
    }

    #[test]
    fn nothing_in_nothing_out() {
        let merged = ContextMerger::default().merge(vec![], vec![]);
        assert!(merged.is_empty());
        assert!(!merged.truncated);
    }
}
