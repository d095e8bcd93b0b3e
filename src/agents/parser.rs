//! Grammar for model responses.
//!
//! Responses are untrusted text. Anything that does not match the expected
//! shape falls back to a sentinel or a default; nothing is guessed.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{AnalysisResult, QualityScore, RepoRef, UNKNOWN};
use crate::prompts::SCORE_DELIMITER;

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s{0,3}#{1,6}\s*(.+?)\s*#*\s*$").expect("valid heading regex"));
static BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+(.+?)\s*$").expect("valid bullet regex"));
static SCORE_LINE: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!(
        r"(?i)^\W*{}(?:\W*?(-?\d+))?",
        regex::escape(SCORE_DELIMITER.trim_end_matches(':'))
    );
    Regex::new(&pattern).expect("valid score regex")
});
static OPENING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z]*\s*$").expect("valid fence regex"));

/// The four sections the analyzer prompt asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    ProjectType,
    KeyFeatures,
    TargetAudience,
    Stack,
}

impl Section {
    fn from_heading(title: &str) -> Option<Self> {
        let normalized: String = title
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        match normalized.split_whitespace().collect::<Vec<_>>().join(" ").as_str() {
            "project type" => Some(Self::ProjectType),
            "key features" | "features" => Some(Self::KeyFeatures),
            "target audience" | "audience" => Some(Self::TargetAudience),
            "stack" | "tech stack" | "technology stack" | "detected stack" => Some(Self::Stack),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Sections {
    project_type: Vec<String>,
    key_features: Vec<String>,
    target_audience: Vec<String>,
    stack: Vec<String>,
}

impl Sections {
    fn lines_mut(&mut self, section: Section) -> &mut Vec<String> {
        match section {
            Section::ProjectType => &mut self.project_type,
            Section::KeyFeatures => &mut self.key_features,
            Section::TargetAudience => &mut self.target_audience,
            Section::Stack => &mut self.stack,
        }
    }
}

fn split_sections(text: &str) -> Sections {
    let mut sections = Sections::default();
    let mut current: Option<Section> = None;

    for line in text.lines() {
        if let Some(caps) = HEADING.captures(line) {
            current = Section::from_heading(&caps[1]);
            continue;
        }
        if let Some(section) = current {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                sections.lines_mut(section).push(trimmed.to_string());
            }
        }
    }
    sections
}

fn bullets(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| BULLET.captures(line).map(|caps| clean_inline(&caps[1])))
        .filter(|item| !item.is_empty())
        .collect()
}

fn first_text(lines: &[String]) -> Option<String> {
    let joined = lines
        .iter()
        .map(|line| match BULLET.captures(line) {
            Some(caps) => clean_inline(&caps[1]),
            None => clean_inline(line),
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!joined.is_empty()).then_some(joined)
}

fn clean_inline(text: &str) -> String {
    text.replace("**", "")
        .trim()
        .trim_matches(|c| c == '*' || c == '_' || c == '`')
        .trim()
        .to_string()
}

/// Parses the analyzer response into an [`AnalysisResult`]
///
/// Missing text sections become [`UNKNOWN`], missing lists stay empty, and
/// either case sets `low_confidence`.
pub fn parse_analysis(repo: RepoRef, text: &str) -> AnalysisResult {
    let sections = split_sections(&strip_code_fences(text));

    let project_type = first_text(&sections.project_type);
    let target_audience = first_text(&sections.target_audience);
    let key_features = bullets(&sections.key_features);
    let mut stack = bullets(&sections.stack);
    if stack.is_empty() {
        // tolerate "Rust, Tokio, Axum" on a single line
        stack = sections
            .stack
            .iter()
            .flat_map(|line| line.split(','))
            .map(clean_inline)
            .filter(|item| !item.is_empty())
            .collect();
    }

    let low_confidence =
        project_type.is_none() || target_audience.is_none() || key_features.is_empty() || stack.is_empty();

    AnalysisResult {
        repo,
        project_type: project_type.unwrap_or_else(|| UNKNOWN.to_string()),
        key_features,
        target_audience: target_audience.unwrap_or_else(|| UNKNOWN.to_string()),
        detected_stack: stack.into_iter().collect::<BTreeSet<_>>(),
        low_confidence,
    }
}

/// Removes a Markdown code fence wrapped around the whole response
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let mut lines: Vec<&str> = trimmed.lines().collect();

    let wrapped = lines.len() >= 2
        && OPENING_FENCE.is_match(lines[0])
        && lines.last().map_or(false, |last| last.trim() == "```");
    if !wrapped {
        return trimmed.to_string();
    }

    lines.pop();
    lines.remove(0);
    lines.join("\n").trim().to_string()
}

/// Reviewer output split into the revised body and its score
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOutput {
    pub body: String,
    pub score: QualityScore,
    /// False when no score line was found and the neutral score was used
    pub score_found: bool,
}

/// Splits the reviewer response into body and score
///
/// The last score line wins. Every score line is removed from the body. A
/// missing or unreadable score yields [`QualityScore::NEUTRAL`].
pub fn parse_review(text: &str) -> ReviewOutput {
    let mut score = None;
    let mut body_lines = Vec::new();

    for line in text.lines() {
        match SCORE_LINE.captures(line) {
            Some(caps) => {
                if let Some(value) = caps.get(1).and_then(|m| m.as_str().parse::<i64>().ok()) {
                    score = Some(QualityScore::clamped(value));
                }
            }
            None => body_lines.push(line),
        }
    }

    ReviewOutput {
        body: strip_code_fences(&body_lines.join("\n")),
        score: score.unwrap_or(QualityScore::NEUTRAL),
        score_found: score.is_some(),
    }
}
