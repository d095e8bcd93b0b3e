use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::parser::parse_analysis;
use crate::error::{Result, UpdaterError};
use crate::github::{DirectoryEntry, EntryKind, RepositoryHost};
use crate::llm::{CompletionRequest, LlmProvider};
use crate::models::{AnalysisResult, GitHubSession, RepositorySummary};
use crate::prompts::{fill, REPOSITORY_ANALYSIS};

const TEMPERATURE: f32 = 0.2;
const MAX_LISTED_ENTRIES: usize = 40;

/// Files worth embedding in the prompt, in priority order
const SAMPLE_FILES: &[&str] = &[
    "README.md",
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "requirements.txt",
    "Pipfile",
    "go.mod",
    "Gemfile",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "setup.py",
    "composer.json",
    "Dockerfile",
    "main.py",
    "app.py",
    "index.js",
    "main.go",
    "main.rs",
];

const FRAMEWORKS: &[(&str, &str)] = &[
    ("flask", "Flask"),
    ("django", "Django"),
    ("fastapi", "FastAPI"),
    ("streamlit", "Streamlit"),
    ("pytest", "pytest"),
    ("numpy", "NumPy"),
    ("pandas", "Pandas"),
    ("tensorflow", "TensorFlow"),
    ("torch", "PyTorch"),
    ("scikit-learn", "scikit-learn"),
    ("sklearn", "scikit-learn"),
    ("react", "React"),
    ("vue", "Vue.js"),
    ("angular", "Angular"),
    ("next", "Next.js"),
    ("express", "Express.js"),
    ("nestjs", "NestJS"),
    ("gatsby", "Gatsby"),
    ("svelte", "Svelte"),
    ("rails", "Ruby on Rails"),
    ("sinatra", "Sinatra"),
];

static REQUIREMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9_\-\.]+)").expect("valid requirement regex"));
static GEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^gem\s+['"]([^'"]+)['"]"#).expect("valid gem regex"));

/// What the analyzer read from a repository
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositorySample {
    /// Top-level directory listing
    pub listing: Vec<DirectoryEntry>,
    /// `(path, content)` pairs, truncated to the byte budget
    pub files: Vec<(String, String)>,
    /// Bytes of code per language
    pub languages: BTreeMap<String, u64>,
}

impl RepositorySample {
    fn file(&self, name: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|(path, _)| path == name)
            .map(|(_, content)| content.as_str())
    }

    fn has_entry(&self, names: &[&str], kind: Option<EntryKind>) -> bool {
        self.listing.iter().any(|entry| {
            kind.map_or(true, |k| entry.kind == k)
                && names.iter().any(|name| entry.name.eq_ignore_ascii_case(name))
        })
    }
}

/// Facts derived from manifests and the directory layout, without the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestInsights {
    /// Declared dependencies and build tools
    pub dependencies: Vec<String>,
    /// Frameworks recognized among the dependencies
    pub frameworks: BTreeSet<String>,
    /// Share of code per language, largest first
    pub language_percentages: Vec<(String, f64)>,
    /// Language with the most bytes
    pub primary_language: Option<String>,
    pub has_tests: bool,
    pub has_ci: bool,
    pub has_docs: bool,
    pub has_docker: bool,
}

impl ManifestInsights {
    /// Stack entries contributed without consulting the model
    pub fn stack(&self) -> BTreeSet<String> {
        const BUILD_TOOLS: &[&str] = &["Cargo", "Go modules", "Maven", "Gradle", "poetry", "pipenv"];

        let mut stack = self.frameworks.clone();
        stack.extend(self.primary_language.iter().cloned());
        stack.extend(
            self.dependencies
                .iter()
                .filter(|dep| BUILD_TOOLS.contains(&dep.as_str()))
                .cloned(),
        );
        stack
    }
}

/// Inspects manifests and layout in a sample
pub fn inspect_manifests(sample: &RepositorySample) -> ManifestInsights {
    let mut dependencies = Vec::new();

    if let Some(content) = sample.file("requirements.txt") {
        dependencies.extend(parse_requirements(content));
    }
    if sample.has_entry(&["Pipfile"], Some(EntryKind::File)) {
        dependencies.push("pipenv".to_string());
    }
    if sample
        .file("pyproject.toml")
        .map_or(false, |content| content.to_lowercase().contains("poetry"))
    {
        dependencies.push("poetry".to_string());
    }
    if let Some(content) = sample.file("package.json") {
        dependencies.extend(parse_package_json(content));
    }
    if let Some(content) = sample.file("Gemfile") {
        dependencies.extend(parse_gemfile(content));
    }
    for (file, tool) in [
        ("go.mod", "Go modules"),
        ("pom.xml", "Maven"),
        ("build.gradle", "Gradle"),
        ("build.gradle.kts", "Gradle"),
        ("Cargo.toml", "Cargo"),
    ] {
        if sample.has_entry(&[file], Some(EntryKind::File)) && !dependencies.iter().any(|d| d == tool) {
            dependencies.push(tool.to_string());
        }
    }

    let mut frameworks = BTreeSet::new();
    for dep in &dependencies {
        let dep = dep.to_lowercase();
        for (key, framework) in FRAMEWORKS {
            if dep.contains(key) {
                frameworks.insert(framework.to_string());
            }
        }
    }
    let has_docker = sample.has_entry(
        &["Dockerfile", "docker-compose.yml", "docker-compose.yaml"],
        Some(EntryKind::File),
    );
    if has_docker {
        frameworks.insert("Docker".to_string());
    }

    let total: u64 = sample.languages.values().sum();
    let mut language_percentages: Vec<(String, f64)> = sample
        .languages
        .iter()
        .filter(|_| total > 0)
        .map(|(language, bytes)| {
            let share = (*bytes as f64 / total as f64) * 100.0;
            (language.clone(), (share * 10.0).round() / 10.0)
        })
        .collect();
    language_percentages.sort_by(|a, b| b.1.total_cmp(&a.1));

    ManifestInsights {
        dependencies,
        frameworks,
        primary_language: language_percentages.first().map(|(language, _)| language.clone()),
        language_percentages,
        has_tests: sample.has_entry(&["test", "tests", "spec", "specs", "__tests__"], Some(EntryKind::Dir)),
        has_ci: sample.has_entry(
            &[".github", ".gitlab-ci.yml", ".travis.yml", "azure-pipelines.yml", ".circleci", "Jenkinsfile"],
            None,
        ),
        has_docs: sample.has_entry(&["docs", "doc", "documentation"], Some(EntryKind::Dir)),
        has_docker,
    }
}

fn parse_requirements(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('-'))
        .filter_map(|line| REQUIREMENT.captures(line).map(|caps| caps[1].to_string()))
        .take(15)
        .collect()
}

fn parse_package_json(content: &str) -> Vec<String> {
    let Ok(manifest) = serde_json::from_str::<serde_json::Value>(content) else {
        return Vec::new();
    };
    let names = |key: &str, limit: usize| -> Vec<String> {
        manifest
            .get(key)
            .and_then(|deps| deps.as_object())
            .map(|deps| deps.keys().take(limit).cloned().collect())
            .unwrap_or_default()
    };

    let mut deps = names("dependencies", 10);
    deps.extend(names("devDependencies", 5));
    deps
}

fn parse_gemfile(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| GEM.captures(line.trim()).map(|caps| caps[1].to_string()))
        .take(15)
        .collect()
}

/// First stage: turns a repository sample into an [`AnalysisResult`]
pub struct Analyzer {
    llm: Arc<dyn LlmProvider>,
    sample_byte_limit: usize,
}

impl Analyzer {
    pub fn new(llm: Arc<dyn LlmProvider>, sample_byte_limit: usize) -> Self {
        Self { llm, sample_byte_limit }
    }

    /// Reads the top-level listing, language sizes and a bounded set of files
    ///
    /// Files come from [`SAMPLE_FILES`] in priority order. Content beyond the
    /// byte budget is cut at a character boundary and later files are skipped.
    #[instrument(skip(self, host, session), fields(repo = %repo.full_name()))]
    pub async fn collect_sample(
        &self,
        host: &dyn RepositoryHost,
        session: &GitHubSession,
        repo: &RepositorySummary,
    ) -> Result<RepositorySample> {
        let repo_ref = repo.repo_ref();

        let listing = match host.list_directory(session, &repo_ref, "").await {
            Ok(listing) => listing,
            // empty repositories have no contents endpoint
            Err(UpdaterError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        let languages = host.get_languages(session, &repo_ref).await?;

        let mut files = Vec::new();
        let mut remaining = self.sample_byte_limit;
        for name in SAMPLE_FILES {
            if remaining == 0 {
                break;
            }
            let listed = listing
                .iter()
                .any(|entry| entry.kind == EntryKind::File && entry.name == *name);
            if !listed {
                continue;
            }
            if let Some(content) = host.get_file(session, &repo_ref, name).await? {
                let truncated = truncate_at_char_boundary(&content, remaining);
                remaining -= truncated.len();
                files.push((name.to_string(), truncated.to_string()));
            }
        }

        debug!(
            "Sampled {} files ({} bytes) from {}",
            files.len(),
            self.sample_byte_limit - remaining,
            repo_ref
        );
        Ok(RepositorySample {
            listing,
            files,
            languages,
        })
    }

    /// Builds the analyzer prompt
    pub fn build_prompt(
        &self,
        repo: &RepositorySummary,
        sample: &RepositorySample,
        insights: &ManifestInsights,
    ) -> String {
        let listing = sample
            .listing
            .iter()
            .take(MAX_LISTED_ENTRIES)
            .map(|entry| match entry.kind {
                EntryKind::Dir => format!("- {}/", entry.name),
                _ => format!("- {}", entry.name),
            })
            .collect::<Vec<_>>()
            .join("\n");
        let samples = sample
            .files
            .iter()
            .map(|(path, content)| format!("### {}\n```\n{}\n```", path, content))
            .collect::<Vec<_>>()
            .join("\n\n");
        let languages = insights
            .language_percentages
            .iter()
            .map(|(language, share)| format!("{} {:.1}%", language, share))
            .collect::<Vec<_>>()
            .join(", ");
        let detected = insights.stack().into_iter().collect::<Vec<_>>().join(", ");
        let full_name = repo.full_name();
        let topics = repo.topics.join(", ");

        fill(
            REPOSITORY_ANALYSIS,
            &[
                ("repo", full_name.as_str()),
                ("description", or_none(repo.description.as_deref())),
                ("language", or_none(repo.language.as_deref())),
                ("languages", or_none(Some(languages.as_str()))),
                ("topics", or_none(Some(topics.as_str()))),
                ("detected", or_none(Some(detected.as_str()))),
                ("listing", or_none(Some(listing.as_str()))),
                ("samples", or_none(Some(samples.as_str()))),
            ],
        )
    }

    /// Runs the stage: one model call, parsed into an [`AnalysisResult`]
    ///
    /// Manifest findings are merged into `detected_stack`. Model failures
    /// become [`UpdaterError::AnalysisFailed`]; no retry happens here.
    pub async fn analyze(&self, repo: &RepositorySummary, sample: &RepositorySample) -> Result<AnalysisResult> {
        let insights = inspect_manifests(sample);
        let prompt = self.build_prompt(repo, sample, &insights);

        let response = self
            .llm
            .complete(&CompletionRequest::new(prompt, TEMPERATURE))
            .await
            .map_err(|cause| UpdaterError::AnalysisFailed {
                repo: repo.full_name(),
                cause,
            })?;

        let mut analysis = parse_analysis(repo.repo_ref(), &response);
        analysis.detected_stack.extend(insights.stack());
        if analysis.low_confidence {
            info!("Analysis of {} is missing sections, marked low confidence", repo.full_name());
        }
        Ok(analysis)
    }
}

fn or_none(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => "(none)",
    }
}

fn truncate_at_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
