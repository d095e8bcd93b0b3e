use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::parser::parse_review;
use crate::error::{LlmError, Result, UpdaterError};
use crate::llm::{CompletionRequest, LlmProvider};
use crate::models::{DraftReadme, QualityScore};
use crate::prompts::{fill, ORGANIZATION_TONE, PERSONAL_TONE, README_REVIEW, SCORE_DELIMITER};

const TEMPERATURE: f32 = 0.3;

static BADGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*(?:shields\.io|badge)[^)]*\)").expect("valid badge regex"));

/// Deterministic structure checks over a README body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadmeChecks {
    pub has_title: bool,
    pub has_description: bool,
    pub has_installation: bool,
    pub has_usage: bool,
    pub has_code_blocks: bool,
    pub has_badges: bool,
    pub section_count: usize,
    /// Weighted total, 0 to 100
    pub score: u8,
}

/// Scores a README without the model
///
/// Weights: title 20, description over 200 characters 15, installation 20,
/// usage 15, code blocks 15, badges 5, two per `##` section up to 10.
pub fn readme_checks(body: &str) -> ReadmeChecks {
    let lower = body.to_lowercase();
    let has_title = body.lines().any(|line| line.starts_with("# "));
    let has_description = body.chars().count() > 200;
    let has_installation = lower.contains("install");
    let has_usage = lower.contains("usage") || lower.contains("example");
    let has_code_blocks = body.contains("```");
    let has_badges = BADGE.is_match(body);
    let section_count = body.lines().filter(|line| line.starts_with("## ")).count();

    let mut score = 0usize;
    score += if has_title { 20 } else { 0 };
    score += if has_description { 15 } else { 0 };
    score += if has_installation { 20 } else { 0 };
    score += if has_usage { 15 } else { 0 };
    score += if has_code_blocks { 15 } else { 0 };
    score += if has_badges { 5 } else { 0 };
    score += (section_count * 2).min(10);

    ReadmeChecks {
        has_title,
        has_description,
        has_installation,
        has_usage,
        has_code_blocks,
        has_badges,
        section_count,
        score: score.min(100) as u8,
    }
}

/// What the reviewer attached to a draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    /// Score parsed from the model, or the neutral default
    pub score: QualityScore,
    /// False when the model gave no readable score
    pub score_found: bool,
    /// Heuristic checks over the revised body
    pub checks: ReadmeChecks,
}

/// Third stage: revises a draft and scores it
pub struct Reviewer {
    llm: Arc<dyn LlmProvider>,
    placeholder_tokens: Vec<String>,
    min_content_length: usize,
}

impl Reviewer {
    pub fn new(llm: Arc<dyn LlmProvider>, placeholder_tokens: Vec<String>, min_content_length: usize) -> Self {
        Self {
            llm,
            placeholder_tokens,
            min_content_length,
        }
    }

    /// Builds the review prompt with the placeholder list and tone hint
    pub fn build_prompt(&self, draft: &DraftReadme, is_personal_repo: bool) -> String {
        let placeholders = self
            .placeholder_tokens
            .iter()
            .map(|token| format!("\"{}\"", token))
            .collect::<Vec<_>>()
            .join(", ");
        let repo = draft.source_analysis.repo.full_name();
        let tone = if is_personal_repo { PERSONAL_TONE } else { ORGANIZATION_TONE };

        fill(
            README_REVIEW,
            &[
                ("repo", repo.as_str()),
                ("placeholders", placeholders.as_str()),
                ("tone", tone),
                ("delimiter", SCORE_DELIMITER),
                ("draft", draft.body_text.as_str()),
            ],
        )
    }

    /// Runs the stage, replacing the body and attaching the score in place
    ///
    /// A revised body shorter than the configured minimum is rejected with
    /// [`LlmError::Truncated`] and the draft is left untouched. A missing
    /// score is not an error.
    pub async fn review(&self, draft: &mut DraftReadme, is_personal_repo: bool) -> Result<ReviewSummary> {
        let repo = draft.source_analysis.repo.full_name();
        let failed = |cause| UpdaterError::ReviewFailed {
            repo: repo.clone(),
            cause,
        };

        let prompt = self.build_prompt(draft, is_personal_repo);
        let response = self
            .llm
            .complete(&CompletionRequest::new(prompt, TEMPERATURE))
            .await
            .map_err(failed)?;

        let review = parse_review(&response);
        let length = review.body.chars().count();
        if length < self.min_content_length {
            return Err(failed(LlmError::Truncated {
                length,
                minimum: self.min_content_length,
            }));
        }
        if !review.score_found {
            warn!("Reviewer gave no score for {}, using {}", repo, review.score);
        }

        let checks = readme_checks(&review.body);
        draft.body_text = review.body;
        draft.quality_score = Some(review.score);

        info!("Reviewed {}: model {} heuristic {}/100", repo, review.score, checks.score);
        Ok(ReviewSummary {
            score: review.score,
            score_found: review.score_found,
            checks,
        })
    }
}
