use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use extractum::models::AnalysisResult;
use extractum::{parse_repo_url, Config, ExtractionPipeline, GitHubClient, PipelineConfig, StateFilter};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
    Markdown,
}

#[derive(Parser, Debug)]
#[command(name = "extractum")]
#[command(version = "0.1.0")]
#[command(about = "Extract issues, merged pull requests and comments from a GitHub repository")]
struct Args {
    /// Repository URL (https://github.com/owner/repo or git@github.com:owner/repo.git)
    repo_url: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    output: Option<String>,

    /// Issue state to fetch (open, closed, all)
    #[arg(long, default_value = "all")]
    state: StateFilter,

    /// Also fetch the comments of every issue
    #[arg(long)]
    comments: bool,

    /// Request timeout in seconds (overrides GITHUB_TIMEOUT_SECS)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("extractum=info".parse()?)
                .add_directive("reqwest=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let (owner, repo) = parse_repo_url(&args.repo_url)?;

    let mut config = Config::from_env()?;
    if let Some(secs) = args.timeout {
        config.timeout = std::time::Duration::from_secs(secs);
    }
    if config.github_token.is_none() {
        tracing::warn!("GITHUB_TOKEN not set, using unauthenticated requests");
    }

    let github = GitHubClient::from_config(&config)?;
    let pipeline = ExtractionPipeline::new(
        github,
        PipelineConfig {
            issue_state: Some(args.state),
            include_comments: args.comments,
            show_progress: true,
        },
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling outstanding requests");
            on_interrupt.cancel();
        }
    });

    tracing::info!("Extracting {}/{}", owner, repo);
    let result = pipeline.run(&owner, &repo, &cancel).await?;

    output_result(&result, &args)?;

    Ok(())
}

fn output_result(result: &AnalysisResult, args: &Args) -> anyhow::Result<()> {
    let output = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(result)?,
        OutputFormat::Markdown => format_markdown(result),
        OutputFormat::Text => format_text(result),
    };

    if let Some(ref path) = args.output {
        std::fs::write(path, &output)?;
        tracing::info!("Output written to: {}", path);
    } else {
        println!("{}", output);
    }

    Ok(())
}

fn format_text(result: &AnalysisResult) -> String {
    let repo = &result.repository;
    let mut output = String::new();

    output.push_str(&format!("\n=== Repository: {} ===\n\n", repo.full_name));
    if !repo.description.is_empty() {
        output.push_str(&format!("Description: {}\n", repo.description));
    }
    output.push_str(&format!(
        "Stars: {}  Forks: {}  Open issues: {}\n\n",
        repo.stargazers_count, repo.forks_count, repo.open_issues_count
    ));

    output.push_str(&format!("Issues fetched: {}\n", result.stats.total_issues));
    output.push_str(&format!("Merged pull requests: {}\n", result.stats.merged_prs));
    output.push_str(&format!("Code blocks found: {}\n", result.code_block_count()));
    output.push_str(&format!(
        "Error messages found: {}\n",
        result.error_message_count()
    ));

    let with_errors: Vec<_> = result
        .issues
        .iter()
        .filter(|d| !d.issue.error_messages.is_empty())
        .collect();
    if !with_errors.is_empty() {
        output.push_str("\nIssues reporting errors:\n");
        for details in with_errors {
            output.push_str(&format!(
                "  #{} {} ({} comments)\n",
                details.issue.number,
                details.issue.title,
                details.comments.len()
            ));
            for message in &details.issue.error_messages {
                output.push_str(&format!("      {}\n", message));
            }
        }
    }

    output.push_str(&format!(
        "\nGenerated on: {}\n",
        result.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    output
}

fn format_markdown(result: &AnalysisResult) -> String {
    let repo = &result.repository;
    let mut output = String::new();

    output.push_str(&format!("# Repository: {}\n\n", repo.full_name));
    if !repo.description.is_empty() {
        output.push_str(&format!("> {}\n\n", repo.description));
    }

    output.push_str("## Summary\n\n");
    output.push_str("| Metric | Value |\n|--------|-------|\n");
    output.push_str(&format!("| Stars | {} |\n", repo.stargazers_count));
    output.push_str(&format!("| Issues | {} |\n", result.stats.total_issues));
    output.push_str(&format!("| Merged PRs | {} |\n", result.stats.merged_prs));
    output.push_str(&format!("| Code Blocks | {} |\n", result.code_block_count()));
    output.push_str(&format!(
        "| Error Messages | {} |\n",
        result.error_message_count()
    ));

    if !result.issues.is_empty() {
        output.push_str("\n## Issues\n\n");
        output.push_str("| # | Title | State | Comments | Errors |\n");
        output.push_str("|---|-------|-------|----------|--------|\n");
        for details in &result.issues {
            output.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                details.issue.number,
                details.issue.title.replace('|', "\\|"),
                details.issue.state,
                details.comments.len(),
                details.issue.error_messages.len()
            ));
        }
    }

    if !result.pull_requests.is_empty() {
        output.push_str("\n## Merged Pull Requests\n\n");
        for pr in &result.pull_requests {
            let merged = pr
                .merged_at
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            output.push_str(&format!("- **#{}** {} ({})\n", pr.number, pr.title, merged));
        }
    }

    output.push_str(&format!(
        "\n---\n*Generated on {}*\n",
        result.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    output
}
