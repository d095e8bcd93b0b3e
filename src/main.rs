use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

use readme_updater::config::get_env_value;
use readme_updater::discovery::{sort_repositories, summarize, SortKey};
use readme_updater::llm::{LlmClient, LlmProvider};
use readme_updater::orchestrator::{CommitMode, Orchestrator, PipelineState, RunReport, RunRequest};
use readme_updater::{logging, Config, FilterConfig, GitHubSession, RepoRef};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// GitHub token; falls back to GITHUB_TOKEN
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List repositories after filtering
    Repos {
        #[arg(long)]
        language: Option<String>,
        /// Case-insensitive name substring
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        exclude_forks: bool,
        #[arg(long)]
        exclude_private: bool,
        #[arg(long)]
        min_age_days: Option<u32>,
        #[arg(long)]
        min_size_kb: Option<u64>,
        /// pushed_at, name or size
        #[arg(long, default_value = "pushed_at")]
        sort: SortKey,
    },
    /// Draft, review and optionally commit READMEs
    Generate {
        /// Repositories as owner/repo
        #[arg(required = true)]
        repos: Vec<String>,
        /// Commit directly
        #[arg(long, conflicts_with = "pr")]
        commit: bool,
        /// Commit to a new branch and open a pull request
        #[arg(long)]
        pr: bool,
        /// Target branch for --commit
        #[arg(long, requires = "commit")]
        branch: Option<String>,
    },
    /// List local backups
    Backups {
        /// Only backups of owner/repo
        #[arg(long)]
        repo: Option<String>,
    },
    /// Restore a backup to GitHub
    Restore {
        /// Backup id as shown by `backups`
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    config.ensure_directories_exist().await?;

    let llm: Arc<dyn LlmProvider> = Arc::new(LlmClient::new(&config.llm)?);
    let orchestrator = Orchestrator::from_config(&config, llm)?;

    let token = cli.token.clone().or_else(|| get_env_value("GITHUB_TOKEN"));
    let token = token.as_deref();

    match cli.command {
        Command::Repos {
            language,
            name,
            exclude_forks,
            exclude_private,
            min_age_days,
            min_size_kb,
            sort,
        } => {
            let mut filter = config.discovery.clone();
            filter.language = language.or(filter.language);
            filter.name_query = name.or(filter.name_query);
            filter.exclude_forks |= exclude_forks;
            filter.include_private &= !exclude_private;
            filter.min_age_days = min_age_days.unwrap_or(filter.min_age_days);
            filter.min_size_kb = min_size_kb.unwrap_or(filter.min_size_kb);
            let session = sign_in(&orchestrator, token).await?;
            list_repositories(&orchestrator, &session, &filter, sort).await?;
        }
        Command::Generate {
            repos,
            commit,
            pr,
            branch,
        } => {
            let repos = repos
                .iter()
                .map(|name| name.parse::<RepoRef>())
                .collect::<Result<Vec<_>, _>>()?;
            let mode = if pr {
                Some(CommitMode::PullRequest)
            } else if commit {
                Some(CommitMode::Direct { branch })
            } else {
                None
            };
            let request = RunRequest {
                repos,
                filter: config.discovery.clone(),
                mode,
            };
            let session = sign_in(&orchestrator, token).await?;
            generate(&orchestrator, &session, &request).await?;
        }
        Command::Backups { repo } => {
            let repo = repo.map(|r| r.parse::<RepoRef>()).transpose()?;
            let records = orchestrator
                .backups()
                .list(repo.as_ref().map(|r| r.owner.as_str()), repo.as_ref().map(|r| r.name.as_str()))
                .await?;
            if records.is_empty() {
                println!("{}", "No backups found".yellow());
            }
            for record in records {
                let kind = if record.original_content.is_some() {
                    "README".normal()
                } else {
                    "no README".dimmed()
                };
                println!(
                    "{}  {}/{}  {}  {}",
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.owner,
                    record.repo,
                    kind,
                    record.id.bright_cyan()
                );
            }
        }
        Command::Restore { id } => {
            let session = sign_in(&orchestrator, token).await?;
            let pb = spinner(format!("Restoring {}", id));
            let outcome = orchestrator.restore_backup(&session, &id).await;
            pb.finish_and_clear();

            let outcome = outcome?;
            println!(
                "{} {}/{} restored from {}",
                "[RESTORED]".bright_green(),
                outcome.restored.owner,
                outcome.restored.repo,
                outcome.restored.id
            );
            println!("{} previous README saved as {}", "[BACKUP]".bright_blue(), outcome.replaced.id);
            if outcome.commit.is_none() {
                println!("{}", "Repository already matched the backup".yellow());
            }
        }
    }

    orchestrator.metrics().report().await;
    Ok(())
}

/// Validates the token once so later calls know the login
async fn sign_in(orchestrator: &Orchestrator, token: Option<&str>) -> anyhow::Result<GitHubSession> {
    let token = match token {
        Some(token) if !token.trim().is_empty() => token,
        _ => bail!("a GitHub token is required: pass --token or set GITHUB_TOKEN"),
    };
    let (session, user) = orchestrator
        .authenticate(token)
        .await
        .context("validating the GitHub token")?;
    println!("{} {}", "Signed in as".dimmed(), user.login.bright_white());
    Ok(session)
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style.tick_strings(&["-", "\\", "|", "/", "-", "\\", "|", "/"]));
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

async fn list_repositories(
    orchestrator: &Orchestrator,
    session: &GitHubSession,
    filter: &FilterConfig,
    sort: SortKey,
) -> anyhow::Result<()> {
    let pb = spinner("Fetching repositories".to_string());
    let repos = orchestrator.discover(session, filter).await;
    pb.finish_and_clear();

    let mut repos = repos?;
    sort_repositories(&mut repos, sort);
    for repo in &repos {
        let readme = if repo.has_readme { "README".green() } else { "no README".red() };
        println!(
            "{:<40} {:<12} {:>8} KB  {}",
            repo.full_name().bright_white(),
            repo.language.as_deref().unwrap_or("-"),
            repo.size_kb,
            readme
        );
    }

    let stats = summarize(&repos);
    println!(
        "\n{} repositories ({} public, {} private, {} forks, {} without README)",
        stats.total, stats.public, stats.private, stats.forks, stats.without_readme
    );
    Ok(())
}

async fn generate(orchestrator: &Orchestrator, session: &GitHubSession, request: &RunRequest) -> anyhow::Result<()> {
    let pb = spinner(format!("Processing {} repositories", request.repos.len()));
    let report = orchestrator.run(session, request).await;
    pb.finish_and_clear();

    let report = report?;
    print_report(&report, request.mode.is_none());
    if report.failures().next().is_some() {
        bail!("{} repositories failed", report.failures().count());
    }
    Ok(())
}

fn print_report(report: &RunReport, preview: bool) {
    for outcome in &report.outcomes {
        match &outcome.state {
            PipelineState::Failed { stage, cause } => {
                println!("{} {} at {}: {}", "[FAILED]".bright_red(), outcome.repo, stage, cause);
                if cause.is_timeout() {
                    println!("     {}", "the model did not answer in time; raise LLM_TIMEOUT_SECS".yellow());
                }
            }
            PipelineState::Reached { stage } => {
                let score = outcome
                    .review
                    .as_ref()
                    .map(|r| format!("model {}, checks {}/100", r.score, r.checks.score))
                    .unwrap_or_default();
                println!("{} {} reached {} ({})", "[OK]".bright_green(), outcome.repo, stage, score);
                if let Some(backup) = &outcome.backup {
                    println!("     backup {}", backup.id.dimmed());
                }
                if let Some(commit) = &outcome.commit {
                    println!("     {} on {}", commit.commit_sha_or_pr_url.bright_cyan(), commit.branch);
                }
                if preview {
                    if let Some(draft) = &outcome.draft {
                        println!("{}\n{}\n{}", "-".repeat(60).dimmed(), draft.body_text, "-".repeat(60).dimmed());
                    }
                }
            }
        }
    }
}
