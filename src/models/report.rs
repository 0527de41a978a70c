use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::issue::{Comment, Issue, PullRequest};
use super::repository::Repository;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total_issues: usize,
    pub merged_prs: usize,
}

/// An issue together with its discussion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueDetails {
    pub issue: Issue,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub repository: Repository,
    pub stats: Stats,
    pub issues: Vec<IssueDetails>,
    pub pull_requests: Vec<PullRequest>,
    pub generated_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn code_block_count(&self) -> usize {
        self.issues
            .iter()
            .map(|d| {
                d.issue.code_blocks.len()
                    + d.comments.iter().map(|c| c.code_blocks.len()).sum::<usize>()
            })
            .sum()
    }

    pub fn error_message_count(&self) -> usize {
        self.issues
            .iter()
            .map(|d| {
                d.issue.error_messages.len()
                    + d.comments.iter().map(|c| c.error_messages.len()).sum::<usize>()
            })
            .sum()
    }
}
