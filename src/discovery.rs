//! Repository selection.
//!
//! [`discover`] is a pure, stable filter over the list the GitHub client
//! returned: it never reorders, never calls the network and an empty result
//! is not an error. Sorting and statistics are separate helpers.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::UpdaterError;
use crate::models::RepositorySummary;

/// Recognized filter options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Exclude repositories pushed within this many days; 0 disables the check
    pub min_age_days: u32,
    /// Drop forks
    pub exclude_forks: bool,
    /// Drop repositories smaller than this
    pub min_size_kb: u64,
    /// Exact primary language match
    pub language: Option<String>,
    /// Case-insensitive substring of the repository name
    pub name_query: Option<String>,
    /// Keep private repositories
    pub include_private: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_age_days: 0,
            exclude_forks: false,
            min_size_kb: 0,
            language: None,
            name_query: None,
            include_private: true,
        }
    }
}

impl FilterConfig {
    /// Whether `repo` passes every configured condition at time `now`
    pub fn matches(&self, repo: &RepositorySummary, now: DateTime<Utc>) -> bool {
        if self.exclude_forks && repo.is_fork {
            return false;
        }
        if !self.include_private && repo.private {
            return false;
        }
        if repo.size_kb < self.min_size_kb {
            return false;
        }
        if let Some(language) = self.language.as_deref().filter(|l| !l.is_empty()) {
            if repo.language.as_deref() != Some(language) {
                return false;
            }
        }
        if let Some(query) = self.name_query.as_deref().filter(|q| !q.is_empty()) {
            if !repo.name.to_lowercase().contains(&query.to_lowercase()) {
                return false;
            }
        }
        if self.min_age_days > 0 {
            // past the representable range every pushed repository is too recent
            let cutoff = now
                .checked_sub_signed(Duration::days(i64::from(self.min_age_days)))
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            // never-pushed repositories are as old as they get
            if repo.pushed_at.map_or(false, |pushed| pushed > cutoff) {
                return false;
            }
        }
        true
    }
}

/// Keeps the repositories that pass `filter`, in input order
pub fn discover(
    repos: impl IntoIterator<Item = RepositorySummary>,
    filter: &FilterConfig,
    now: DateTime<Utc>,
) -> Vec<RepositorySummary> {
    repos.into_iter().filter(|repo| filter.matches(repo, now)).collect()
}

/// Sort keys offered to callers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Most recently pushed first
    #[default]
    PushedAt,
    /// Alphabetical, case-insensitive
    Name,
    /// Largest first
    Size,
}

impl FromStr for SortKey {
    type Err = UpdaterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pushed_at" | "updated" | "pushed" => Ok(Self::PushedAt),
            "name" => Ok(Self::Name),
            "size" => Ok(Self::Size),
            other => Err(UpdaterError::Validation(format!("unknown sort key '{other}'"))),
        }
    }
}

/// Sorts in place by `key`
pub fn sort_repositories(repos: &mut [RepositorySummary], key: SortKey) {
    match key {
        SortKey::PushedAt => repos.sort_by(|a, b| b.pushed_at.cmp(&a.pushed_at)),
        SortKey::Name => repos.sort_by_key(|r| r.name.to_lowercase()),
        SortKey::Size => repos.sort_by(|a, b| b.size_kb.cmp(&a.size_kb)),
    }
}

/// Repository count per primary language, most common first
pub fn language_stats(repos: &[RepositorySummary]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for repo in repos {
        if let Some(language) = repo.language.as_deref() {
            *counts.entry(language).or_default() += 1;
        }
    }

    let mut stats: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(language, count)| (language.to_string(), count))
        .collect();
    stats.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    stats
}

/// Aggregate counts over a repository list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryStats {
    pub total: usize,
    pub public: usize,
    pub private: usize,
    pub forks: usize,
    pub without_readme: usize,
    pub languages: Vec<(String, usize)>,
}

/// Summarizes a repository list
pub fn summarize(repos: &[RepositorySummary]) -> RepositoryStats {
    let private = repos.iter().filter(|r| r.private).count();
    RepositoryStats {
        total: repos.len(),
        public: repos.len() - private,
        private,
        forks: repos.iter().filter(|r| r.is_fork).count(),
        without_readme: repos.iter().filter(|r| !r.has_readme).count(),
        languages: language_stats(repos),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn repo(name: &str, language: Option<&str>, fork: bool, size_kb: u64, days_ago: Option<i64>) -> RepositorySummary {
        RepositorySummary {
            owner: "acme".into(),
            name: name.into(),
            default_branch: "main".into(),
            language: language.map(str::to_string),
            is_fork: fork,
            size_kb,
            pushed_at: days_ago.map(|d| now() - Duration::days(d)),
            has_readme: true,
            description: None,
            license: None,
            topics: Vec::new(),
            private: false,
        }
    }

    fn names(repos: &[RepositorySummary]) -> Vec<&str> {
        repos.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_default_filter_keeps_everything_in_order() {
        let input = vec![
            repo("zeta", Some("Rust"), false, 10, Some(1)),
            repo("alpha", None, true, 0, None),
        ];
        let kept = discover(input.clone(), &FilterConfig::default(), now());
        assert_eq!(kept, input);
    }

    #[test]
    fn test_each_option_filters() {
        let input = vec![
            repo("widgets", Some("Rust"), false, 500, Some(30)),
            repo("widgets-fork", Some("Rust"), true, 500, Some(30)),
            repo("tiny", Some("Rust"), false, 2, Some(30)),
            repo("py-tool", Some("Python"), false, 500, Some(30)),
            repo("fresh", Some("Rust"), false, 500, Some(1)),
        ];

        let filter = FilterConfig {
            exclude_forks: true,
            min_size_kb: 10,
            language: Some("Rust".into()),
            min_age_days: 7,
            ..FilterConfig::default()
        };
        assert_eq!(names(&discover(input.clone(), &filter, now())), vec!["widgets"]);

        let by_name = FilterConfig {
            name_query: Some("WIDGET".into()),
            ..FilterConfig::default()
        };
        assert_eq!(
            names(&discover(input, &by_name, now())),
            vec!["widgets", "widgets-fork"]
        );
    }

    #[test]
    fn test_language_is_exact_match() {
        let input = vec![repo("a", Some("TypeScript"), false, 1, None), repo("b", Some("typescript"), false, 1, None)];
        let filter = FilterConfig {
            language: Some("TypeScript".into()),
            ..FilterConfig::default()
        };
        assert_eq!(names(&discover(input, &filter, now())), vec!["a"]);
    }

    #[test]
    fn test_private_repos_can_be_excluded() {
        let mut secret = repo("secret", None, false, 1, None);
        secret.private = true;
        let input = vec![secret, repo("open", None, false, 1, None)];
        let filter = FilterConfig {
            include_private: false,
            ..FilterConfig::default()
        };
        assert_eq!(names(&discover(input, &filter, now())), vec!["open"]);
    }

    #[test]
    fn test_huge_min_age_keeps_only_never_pushed() {
        let input = vec![
            repo("ancient", None, false, 1, Some(36_500)),
            repo("untouched", None, false, 1, None),
        ];
        let filter = FilterConfig {
            min_age_days: u32::MAX,
            ..FilterConfig::default()
        };
        assert_eq!(names(&discover(input, &filter, now())), vec!["untouched"]);
    }

    #[test]
    fn test_sorting_and_stats() {
        let mut input = vec![
            repo("b", Some("Go"), false, 5, Some(3)),
            repo("A", Some("Rust"), true, 50, Some(9)),
            repo("c", Some("Rust"), false, 1, Some(1)),
        ];

        sort_repositories(&mut input, SortKey::Name);
        assert_eq!(names(&input), vec!["A", "b", "c"]);
        sort_repositories(&mut input, SortKey::PushedAt);
        assert_eq!(names(&input), vec!["c", "b", "A"]);
        sort_repositories(&mut input, SortKey::Size);
        assert_eq!(names(&input), vec!["A", "b", "c"]);

        let stats = summarize(&input);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.forks, 1);
        assert_eq!(stats.languages, vec![("Rust".to_string(), 2), ("Go".to_string(), 1)]);
    }

    fn arb_repo() -> impl Strategy<Value = RepositorySummary> {
        (
            "[a-z]{1,8}",
            prop::option::of(prop::sample::select(vec!["Rust", "Go", "Python"])),
            any::<bool>(),
            0u64..1000,
            prop::option::of(0i64..400),
            any::<bool>(),
        )
            .prop_map(|(name, language, fork, size, days, private)| {
                let mut r = repo(&name, language, fork, size, days);
                r.private = private;
                r
            })
    }

    fn arb_filter() -> impl Strategy<Value = FilterConfig> {
        (
            0u32..60,
            any::<bool>(),
            0u64..500,
            prop::option::of(prop::sample::select(vec!["Rust", "Go"])),
            prop::option::of("[a-z]{0,2}"),
            any::<bool>(),
        )
            .prop_map(|(min_age_days, exclude_forks, min_size_kb, language, name_query, include_private)| {
                FilterConfig {
                    min_age_days,
                    exclude_forks,
                    min_size_kb,
                    language: language.map(str::to_string),
                    name_query,
                    include_private,
                }
            })
    }

    proptest! {
        #[test]
        fn prop_filter_is_idempotent_and_order_preserving(
            repos in prop::collection::vec(arb_repo(), 0..30),
            filter in arb_filter(),
        ) {
            let once = discover(repos.clone(), &filter, now());
            let twice = discover(once.clone(), &filter, now());
            prop_assert_eq!(&once, &twice);

            // the output is a subsequence of the input
            let mut remaining = repos.iter();
            for kept in &once {
                prop_assert!(remaining.any(|r| r == kept));
            }
        }
    }
}
