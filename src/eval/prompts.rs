//! Judge prompts and rating extraction.

use std::sync::OnceLock;

use regex::Regex;

const RELEVANCE_TEMPLATE: &str = "You are a strict evaluator assessing the relevance of retrieved documents.
Question: {question}

Retrieved documents:
{documents}

Rate the relevance of these documents to the question on a scale of 1-5.
1: Completely irrelevant or contains no useful information
2: Mostly irrelevant, with only minor relevant points
3: Partially relevant, contains some useful information
4: Mostly relevant, with minor gaps or irrelevant parts
5: Perfectly relevant, contains all necessary information

For each document, provide:
1. A rating (1-5)
2. A brief explanation of why it received that rating
3. What information is missing or irrelevant

Be critical and specific in your assessment.";

const ANSWER_QUALITY_TEMPLATE: &str = "You are a strict evaluator assessing the quality of an answer.
Question: {question}

Answer: {answer}

Rate the answer on the following criteria (1-5):
1. Accuracy: Is the information correct and verifiable?
   - 1: Contains significant factual errors
   - 2: Has some factual errors
   - 3: Mostly accurate with minor errors
   - 4: Accurate with no significant errors
   - 5: Completely accurate and verifiable

2. Completeness: Does it fully address the question?
   - 1: Missing critical information
   - 2: Missing important details
   - 3: Covers main points but lacks depth
   - 4: Comprehensive but could be more detailed
   - 5: Fully comprehensive and detailed

3. Relevance: Is it focused on the question?
   - 1: Completely off-topic
   - 2: Mostly off-topic
   - 3: Somewhat relevant but includes tangents
   - 4: Mostly focused with minor digressions
   - 5: Completely focused on the question

4. Clarity: Is it well-explained?
   - 1: Unclear and confusing
   - 2: Difficult to understand
   - 3: Somewhat clear but could be better
   - 4: Clear with minor issues
   - 5: Exceptionally clear and well-structured

For each criterion:
1. Provide a rating (1-5)
2. Explain why it received that rating
3. Suggest specific improvements

Be critical and specific in your assessment.";

/// Documents are cut to this many characters before being shown to the judge.
const DOCUMENT_PREVIEW_CHARS: usize = 500;

pub fn relevance_prompt(question: &str, documents: &[String]) -> String {
    let documents = documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let preview: String = doc.chars().take(DOCUMENT_PREVIEW_CHARS).collect();
            format!("Document {}:\n{}...", i + 1, preview)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    RELEVANCE_TEMPLATE
        .replace("{question}", question)
        .replace("{documents}", &documents)
}

pub fn answer_quality_prompt(question: &str, answer: &str) -> String {
    ANSWER_QUALITY_TEMPLATE
        .replace("{question}", question)
        .replace("{answer}", answer)
}

fn rating_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)\b(?:rating|score)\b[^0-9\n]{0,12}([1-5])\b|\b([1-5])\s*/\s*5\b").ok()
        })
        .as_ref()
}

/// Every 1-5 rating the judge wrote, in order of appearance.
pub fn extract_ratings(assessment: &str) -> Vec<u8> {
    let Some(pattern) = rating_pattern() else {
        return Vec::new();
    };

    pattern
        .captures_iter(assessment)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

pub fn mean_rating(assessment: &str) -> Option<f64> {
    let ratings = extract_ratings(assessment);
    if ratings.is_empty() {
        return None;
    }
    let sum: u32 = ratings.iter().map(|r| u32::from(*r)).sum();
    Some(f64::from(sum) / ratings.len() as f64)
}
