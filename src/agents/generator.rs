use std::sync::Arc;

use tracing::debug;

use super::parser::strip_code_fences;
use crate::error::{LlmError, Result, UpdaterError};
use crate::llm::{CompletionRequest, LlmProvider};
use crate::models::{AnalysisResult, DraftReadme, RepositorySummary};
use crate::prompts::{fill, README_GENERATION};

const TEMPERATURE: f32 = 0.7;

/// Second stage: drafts a README from an analysis
pub struct Generator {
    llm: Arc<dyn LlmProvider>,
}

impl Generator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Builds the checklist prompt, resolving license and description from metadata
    pub fn build_prompt(&self, repo: &RepositorySummary, analysis: &AnalysisResult) -> String {
        let features = if analysis.key_features.is_empty() {
            "- (none listed)".to_string()
        } else {
            analysis
                .key_features
                .iter()
                .map(|feature| format!("- {}", feature))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let stack = analysis.detected_stack.iter().cloned().collect::<Vec<_>>().join(", ");
        let full_name = repo.full_name();

        fill(
            README_GENERATION,
            &[
                ("repo", full_name.as_str()),
                ("project_type", analysis.project_type.as_str()),
                ("audience", analysis.target_audience.as_str()),
                ("features", features.as_str()),
                ("stack", stack.as_str()),
                ("description", repo.description.as_deref().unwrap_or("not provided")),
                ("license", repo.license.as_deref().unwrap_or("not specified")),
            ],
        )
    }

    /// Runs the stage with one model call
    ///
    /// The output is not deterministic; callers must not compare drafts
    /// byte for byte.
    pub async fn generate(&self, repo: &RepositorySummary, analysis: Arc<AnalysisResult>) -> Result<DraftReadme> {
        let failed = |cause| UpdaterError::GenerationFailed {
            repo: repo.full_name(),
            cause,
        };

        let prompt = self.build_prompt(repo, &analysis);
        let response = self
            .llm
            .complete(&CompletionRequest::new(prompt, TEMPERATURE))
            .await
            .map_err(failed)?;

        let body = strip_code_fences(&response);
        if body.is_empty() {
            return Err(failed(LlmError::EmptyResponse));
        }

        debug!("Generated {} characters for {}", body.chars().count(), repo.full_name());
        Ok(DraftReadme::new(body, analysis))
    }
}
