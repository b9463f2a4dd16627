//! Offline evaluation: runs test questions through retrieval and answer
//! generation, then asks the LLM to grade both.

pub mod prompts;
pub mod report;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chat::{ChatService, SourceRef};
use crate::core::errors::ApiError;
use crate::llm::ChatMessage;

pub use report::{EvalReport, ReportFiles};

/// Number of chunks retrieved for each evaluated question.
pub const EVAL_TOP_K: usize = 3;

/// Judging and answering run deterministically.
const EVAL_TEMPERATURE: f64 = 0.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalCase {
    pub question: String,
    #[serde(default)]
    pub expected_answer: Option<String>,
}

impl EvalCase {
    pub fn new(question: &str, expected_answer: &str) -> Self {
        Self {
            question: question.to_string(),
            expected_answer: Some(expected_answer.to_string()),
        }
    }
}

pub fn default_cases() -> Vec<EvalCase> {
    vec![
        EvalCase::new(
            "What are the main programs offered at Aivancity?",
            "Aivancity offers various programs in technology, business, and society.",
        ),
        EvalCase::new(
            "How can I apply to Aivancity?",
            "Information about the application process at Aivancity.",
        ),
        EvalCase::new(
            "What is the campus location of Aivancity?",
            "Details about Aivancity's campus location.",
        ),
    ]
}

/// Reads a JSON array of `{"question", "expected_answer"}` objects.
pub async fn load_cases(path: &Path) -> Result<Vec<EvalCase>, ApiError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        ApiError::BadRequest(format!("Failed to read test cases {}: {}", path.display(), e))
    })?;
    let cases: Vec<EvalCase> = serde_json::from_str(&raw).map_err(|e| {
        ApiError::BadRequest(format!("Invalid test cases in {}: {}", path.display(), e))
    })?;
    if cases.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "{} contains no test cases",
            path.display()
        )));
    }
    Ok(cases)
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalEvaluation {
    pub num_docs_retrieved: usize,
    pub sources: Vec<SourceRef>,
    pub documents: Vec<String>,
    pub relevance_assessment: String,
    pub relevance_rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerEvaluation {
    pub answer: String,
    pub quality_assessment: String,
    pub quality_rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub test_case: usize,
    pub question: String,
    pub expected_answer: Option<String>,
    pub retrieval_evaluation: RetrievalEvaluation,
    pub answer_evaluation: AnswerEvaluation,
}

pub struct Evaluator {
    chat: Arc<ChatService>,
    top_k: usize,
}

impl Evaluator {
    pub fn new(chat: Arc<ChatService>) -> Self {
        Self {
            chat,
            top_k: EVAL_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub async fn evaluate_retrieval(&self, question: &str) -> Result<RetrievalEvaluation, ApiError> {
        tracing::info!("Evaluating retrieval for: {}", preview(question));
        let retrieved = self.chat.retriever().retrieve(question, self.top_k).await?;
        let documents: Vec<String> = retrieved.iter().map(|doc| doc.chunk.text.clone()).collect();

        let relevance_assessment = self
            .judge(prompts::relevance_prompt(question, &documents))
            .await?;

        Ok(RetrievalEvaluation {
            num_docs_retrieved: retrieved.len(),
            sources: retrieved.iter().map(SourceRef::from).collect(),
            relevance_rating: prompts::mean_rating(&relevance_assessment),
            relevance_assessment,
            documents,
        })
    }

    pub async fn evaluate_answer(
        &self,
        question: &str,
        answer: &str,
    ) -> Result<AnswerEvaluation, ApiError> {
        tracing::info!("Evaluating answer quality for: {}", preview(question));
        let quality_assessment = self
            .judge(prompts::answer_quality_prompt(question, answer))
            .await?;

        Ok(AnswerEvaluation {
            answer: answer.to_string(),
            quality_rating: prompts::mean_rating(&quality_assessment),
            quality_assessment,
        })
    }

    /// Answers from the retrieved documents only; web search is left out so
    /// the grade reflects the index.
    pub async fn answer(&self, question: &str) -> Result<String, ApiError> {
        let retrieved = self.chat.retriever().retrieve(question, self.top_k).await?;
        let context = self.chat.merger().merge(retrieved, Vec::new());
        let messages = self.chat.prompt().build(&context, &[], question);
        self.chat
            .generator()
            .complete(messages, EVAL_TEMPERATURE)
            .await
    }

    pub async fn evaluate_case(
        &self,
        index: usize,
        case: &EvalCase,
    ) -> Result<CaseResult, ApiError> {
        let retrieval_evaluation = self.evaluate_retrieval(&case.question).await?;
        let answer = self.answer(&case.question).await?;
        let answer_evaluation = self.evaluate_answer(&case.question, &answer).await?;

        Ok(CaseResult {
            test_case: index,
            question: case.question.clone(),
            expected_answer: case.expected_answer.clone(),
            retrieval_evaluation,
            answer_evaluation,
        })
    }

    pub async fn run(&self, cases: &[EvalCase]) -> Result<Vec<CaseResult>, ApiError> {
        tracing::info!("Starting evaluation with {} test cases", cases.len());
        let mut results = Vec::with_capacity(cases.len());
        for (i, case) in cases.iter().enumerate() {
            tracing::info!("Processing test case {}/{}", i + 1, cases.len());
            results.push(self.evaluate_case(i + 1, case).await?);
        }
        Ok(results)
    }

    async fn judge(&self, prompt: String) -> Result<String, ApiError> {
        self.chat
            .generator()
            .complete(vec![ChatMessage::user(prompt)], EVAL_TEMPERATURE)
            .await
    }
}

fn preview(question: &str) -> String {
    question.chars().take(100).collect()
}
