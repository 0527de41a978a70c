pub mod client;
pub mod options;
pub mod paginator;
pub mod rate_limiter;
pub mod url;

pub use client::{GitHubClient, GitHubClientBuilder};
pub use options::{IssueOptions, PullRequestOptions, StateFilter};
pub use paginator::{Paginator, PER_PAGE};
pub use rate_limiter::{RateLimitState, RateLimiter, LOW_WATER_MARK};
pub use url::parse_repo_url;
