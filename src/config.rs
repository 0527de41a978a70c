use crate::error::{Error, Result};
use std::env;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_USER_AGENT: &str = "extractum/1.0";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Config {
    pub github_token: Option<String>,
    pub base_url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github_token: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let github_token = lookup("GITHUB_TOKEN").filter(|t| !t.trim().is_empty());

        let base_url = lookup("GITHUB_API_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let user_agent =
            lookup("GITHUB_USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let timeout = match lookup("GITHUB_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(Error::Config(format!(
                        "GITHUB_TIMEOUT_SECS must be a positive integer, got {:?}",
                        raw
                    )))
                }
            },
            None => DEFAULT_TIMEOUT,
        };

        Ok(Self {
            github_token,
            base_url,
            user_agent,
            timeout,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub issue_state: Option<crate::github::StateFilter>,
    pub include_comments: bool,
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            issue_state: None,
            include_comments: false,
            show_progress: true,
        }
    }
}
