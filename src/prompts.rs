use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").expect("valid placeholder regex"));

/// Marker the reviewer must put in front of its score
pub const SCORE_DELIMITER: &str = "QUALITY_SCORE:";

pub const REPOSITORY_ANALYSIS: &str = r#"
You are a senior engineer reading an unfamiliar repository in order to document it.

Repository: {repo}
Description: {description}
Primary language: {language}
Languages by size: {languages}
Topics: {topics}
Detected from manifests: {detected}

Top-level files:
{listing}

File samples:
{samples}

Respond in Markdown with EXACTLY these four sections and nothing else:

## Project Type
One line naming the kind of project (for example: CLI tool, web API, library, data pipeline).

## Key Features
A bullet list with one feature per line, most important first.

## Target Audience
One or two sentences describing who would use this project.

## Stack
A bullet list of languages, frameworks and tools the project uses.
"#;

pub const README_GENERATION: &str = r#"
Write a complete README.md for the GitHub repository {repo}.

Project type: {project_type}
Target audience: {audience}
Key features:
{features}
Stack: {stack}
Description: {description}
License: {license}

Cover each of these sections in order:
1. Title and a one-paragraph overview
2. Features
3. Installation
4. Usage with at least one code example
5. License ({license})

Use only the facts above. Where a detail is not known, leave the section short instead of inventing it.
Return only the Markdown document.
"#;

pub const README_REVIEW: &str = r#"
You are reviewing a README draft for the repository {repo}.

Revise the draft so that:
- none of these placeholder tokens remain: {placeholders}
- {tone}
- headings, code blocks and lists are valid Markdown

Return the full revised README. After it, on its own final line, write
{delimiter} <integer from 0 to 100>
rating the quality of the revised README.

Draft:
{draft}
"#;

pub const PERSONAL_TONE: &str =
    "the tone is friendly and first-person, as suits a personal project";
pub const ORGANIZATION_TONE: &str =
    "the tone is neutral and professional, as suits a project maintained by an organization";

/// Replaces every `{key}` in `template` with its value
///
/// Substitution is a single pass over the template: inserted values are
/// never scanned for placeholders, and unknown keys stay as written.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template.trim_start(), |caps: &Captures<'_>| {
            values
                .iter()
                .find(|(key, _)| *key == &caps[1])
                .map_or_else(|| caps[0].to_string(), |(_, value)| value.to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_replaces_all_occurrences() {
        let text = fill(README_GENERATION, &[("repo", "acme/widgets"), ("license", "MIT")]);
        assert!(text.contains("repository acme/widgets"));
        assert!(!text.contains("{license}"));
        assert!(text.contains("{project_type}"));
    }

    #[test]
    fn test_fill_leaves_inserted_values_alone() {
        let text = fill(
            "{description} under {license}",
            &[("description", "Renders {license} badges"), ("license", "MIT")],
        );
        assert_eq!(text, "Renders {license} badges under MIT");
    }
}
