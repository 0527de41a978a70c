use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::null_as_empty;

/// https://docs.github.com/en/rest/repos/repos#get-a-repository
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(alias = "stars")]
    pub stargazers_count: u32,
    #[serde(alias = "forks")]
    pub forks_count: u32,
    #[serde(alias = "open_issues")]
    pub open_issues_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub url: String,
    pub html_url: String,
}
