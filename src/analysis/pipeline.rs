use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::analysis::extractor::{annotate_comment, annotate_issue};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::github::{GitHubClient, IssueOptions, PullRequestOptions};
use crate::models::{AnalysisResult, IssueDetails, Stats};

pub struct ExtractionPipeline {
    github: GitHubClient,
    config: PipelineConfig,
}

impl ExtractionPipeline {
    pub fn new(github: GitHubClient, config: PipelineConfig) -> Self {
        Self { github, config }
    }

    pub async fn run(
        &self,
        owner: &str,
        repo: &str,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult> {
        // Step 1: Repository metadata
        let repository = self.github.fetch_repository(owner, repo, cancel).await?;

        // Step 2: Issues, without the pull requests mixed into the listing
        let issue_options = IssueOptions {
            state: self.config.issue_state,
        };
        let issues = self
            .github
            .fetch_issues(owner, repo, &issue_options, cancel)
            .await?;
        tracing::info!("Found {} issues", issues.len());

        // Step 3: Merged pull requests
        let pull_requests = self
            .github
            .fetch_pull_requests(owner, repo, &PullRequestOptions::merged(), cancel)
            .await?;
        tracing::info!("Found {} merged pull requests", pull_requests.len());

        // Step 4: Comments and extracted snippets
        let pb = self.progress_bar(issues.len());
        let mut details = Vec::with_capacity(issues.len());
        for mut issue in issues {
            let mut comments = if self.config.include_comments {
                self.github
                    .fetch_issue_comments(owner, repo, issue.number, cancel)
                    .await?
            } else {
                Vec::new()
            };

            annotate_issue(&mut issue);
            comments.iter_mut().for_each(annotate_comment);

            details.push(IssueDetails { issue, comments });
            pb.inc(1);
        }
        pb.finish_and_clear();

        let stats = Stats {
            total_issues: details.len(),
            merged_prs: pull_requests.len(),
        };

        Ok(AnalysisResult {
            repository,
            stats,
            issues: details,
            pull_requests,
            generated_at: Utc::now(),
        })
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !(self.config.include_comments && self.config.show_progress) {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} issues")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}
