use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::null_as_empty;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: u64,
    #[serde(alias = "username")]
    pub login: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Label {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
}

/// Present on issue listings when the entry is really a pull request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PullRequestLink {
    pub url: Option<String>,
    pub html_url: Option<String>,
    pub merged_at: Option<DateTime<Utc>>,
}

/// https://docs.github.com/en/rest/issues/issues#list-repository-issues
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Issue {
    pub id: u64,
    pub number: u64,
    pub title: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub body: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub url: String,
    pub html_url: String,
    pub labels: Vec<Label>,
    #[serde(rename = "user", alias = "author")]
    pub author: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequestLink>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub code_blocks: Vec<CodeBlock>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub error_messages: Vec<String>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

/// https://docs.github.com/en/rest/pulls/pulls#list-pull-requests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PullRequest {
    pub id: u64,
    pub number: u64,
    pub title: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub body: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub url: String,
    pub html_url: String,
    #[serde(rename = "user", alias = "author")]
    pub author: Option<User>,
    pub labels: Vec<Label>,
}

impl PullRequest {
    pub fn is_merged(&self) -> bool {
        self.merged_at.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Comment {
    pub id: u64,
    #[serde(deserialize_with = "null_as_empty")]
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "user", alias = "author")]
    pub author: Option<User>,
    pub url: String,
    pub html_url: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub code_blocks: Vec<CodeBlock>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub error_messages: Vec<String>,
}
