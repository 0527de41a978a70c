pub mod analysis;
pub mod config;
pub mod error;
pub mod github;
pub mod models;

pub use analysis::ExtractionPipeline;
pub use config::{Config, PipelineConfig};
pub use error::{Error, Result};
pub use github::{parse_repo_url, GitHubClient, IssueOptions, PullRequestOptions, StateFilter};
