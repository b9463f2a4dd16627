use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;

use super::CaseResult;
use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub evaluated_at: DateTime<Local>,
    pub num_test_cases: usize,
    pub mean_relevance_rating: Option<f64>,
    pub mean_quality_rating: Option<f64>,
    pub results: Vec<CaseResult>,
}

#[derive(Debug, Clone)]
pub struct ReportFiles {
    pub text: PathBuf,
    pub json: PathBuf,
}

impl EvalReport {
    pub fn new(results: Vec<CaseResult>) -> Self {
        Self {
            evaluated_at: Local::now(),
            num_test_cases: results.len(),
            mean_relevance_rating: mean(
                results
                    .iter()
                    .filter_map(|r| r.retrieval_evaluation.relevance_rating),
            ),
            mean_quality_rating: mean(
                results
                    .iter()
                    .filter_map(|r| r.answer_evaluation.quality_rating),
            ),
            results,
        }
    }

    pub fn render_text(&self) -> String {
        let rule = "=".repeat(50);
        let mut out = String::new();

        let _ = writeln!(out, "RAG Pipeline Evaluation Results");
        let _ = writeln!(out, "{}\n", rule);
        let _ = writeln!(
            out,
            "Evaluation Date: {}",
            self.evaluated_at.format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(out, "Number of Test Cases: {}", self.num_test_cases);
        if let Some(rating) = self.mean_relevance_rating {
            let _ = writeln!(out, "Mean Relevance Rating: {:.2}", rating);
        }
        if let Some(rating) = self.mean_quality_rating {
            let _ = writeln!(out, "Mean Answer Quality Rating: {:.2}", rating);
        }
        out.push('\n');

        for case in &self.results {
            let _ = writeln!(out, "Test Case {}", case.test_case);
            let _ = writeln!(out, "{}", "-".repeat(30));
            let _ = writeln!(out, "Question: {}", case.question);
            if let Some(expected) = case.expected_answer.as_deref().filter(|e| !e.is_empty()) {
                let _ = writeln!(out, "Expected Answer: {}", expected);
            }
            out.push('\n');

            let retrieval = &case.retrieval_evaluation;
            let _ = writeln!(out, "Retrieval Evaluation:");
            let _ = writeln!(out, "{}", "-".repeat(20));
            let _ = writeln!(
                out,
                "Number of Documents Retrieved: {}",
                retrieval.num_docs_retrieved
            );
            for source in &retrieval.sources {
                let _ = writeln!(
                    out,
                    "  - {} (page {}, relevance {:.2})",
                    source.source_file, source.page, source.score
                );
            }
            let _ = writeln!(out, "\nRelevance Assessment:");
            let _ = writeln!(out, "{}\n", retrieval.relevance_assessment);

            let answer = &case.answer_evaluation;
            let _ = writeln!(out, "Answer Evaluation:");
            let _ = writeln!(out, "{}", "-".repeat(20));
            let _ = writeln!(out, "Generated Answer:\n{}\n", answer.answer);
            let _ = writeln!(out, "Quality Assessment:");
            let _ = writeln!(out, "{}\n", answer.quality_assessment);

            let _ = writeln!(out, "{}\n", rule);
        }

        out
    }

    /// Writes `evaluation_results_<timestamp>.txt` and a matching `.json`
    /// into `dir`, creating it if needed.
    pub async fn write(&self, dir: &Path) -> Result<ReportFiles, ApiError> {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            ApiError::Internal(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let stem = format!(
            "evaluation_results_{}",
            self.evaluated_at.format("%Y%m%d_%H%M%S")
        );
        let text = dir.join(format!("{}.txt", stem));
        let json = dir.join(format!("{}.json", stem));

        tokio::fs::write(&text, self.render_text())
            .await
            .map_err(ApiError::internal)?;
        let body = serde_json::to_string_pretty(self).map_err(ApiError::internal)?;
        tokio::fs::write(&json, body)
            .await
            .map_err(ApiError::internal)?;

        tracing::info!("Evaluation results saved to {}", text.display());
        Ok(ReportFiles { text, json })
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::SourceRef;
    use crate::eval::{AnswerEvaluation, RetrievalEvaluation};

    fn case(n: usize, relevance: Option<f64>, quality: Option<f64>) -> CaseResult {
        CaseResult {
            test_case: n,
            question: "What is the campus location of Aivancity?".to_string(),
            expected_answer: Some("Cachan".to_string()),
            retrieval_evaluation: RetrievalEvaluation {
                num_docs_retrieved: 1,
                sources: vec![SourceRef {
                    id: "guide.pdf#p2-0".to_string(),
                    source_file: "guide.pdf".to_string(),
                    page: 2,
                    score: 0.87,
                }],
                documents: vec!["Aivancity is located in Cachan.".to_string()],
                relevance_assessment: "Rating: 5".to_string(),
                relevance_rating: relevance,
            },
            answer_evaluation: AnswerEvaluation {
                answer: "The campus is in Cachan.".to_string(),
                quality_assessment: "Accuracy 5/5".to_string(),
                quality_rating: quality,
            },
        }
    }

    #[test]
    fn text_report_lists_every_case() {
        let report = EvalReport::new(vec![case(1, Some(5.0), Some(4.0)), case(2, None, Some(2.0))]);
        let text = report.render_text();

        assert!(text.starts_with("RAG Pipeline Evaluation Results\n"));
        assert!(text.contains("Number of Test Cases: 2"));
        assert!(text.contains("Test Case 1\n"));
        assert!(text.contains("Test Case 2\n"));
        assert!(text.contains("Expected Answer: Cachan"));
        assert!(text.contains("guide.pdf (page 2, relevance 0.87)"));
        assert!(text.contains("Generated Answer:\nThe campus is in Cachan."));
        assert_eq!(report.mean_relevance_rating, Some(5.0));
        assert_eq!(report.mean_quality_rating, Some(3.0));
    }

    #[tokio::test]
    async fn write_creates_text_and_json_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("evaluation_results");
        let report = EvalReport::new(vec![case(1, Some(4.0), Some(4.0))]);

        let files = report.write(&dir).await.unwrap();

        let name = files.text.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("evaluation_results_") && name.ends_with(".txt"));
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&files.json).unwrap()).unwrap();
        assert_eq!(json["num_test_cases"], 1);
        assert_eq!(json["results"][0]["answer_evaluation"]["answer"], "The campus is in Cachan.");
    }
}
