use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Value of the `state` query parameter on list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter {
    Open,
    Closed,
    All,
}

impl StateFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateFilter::Open => "open",
            StateFilter::Closed => "closed",
            StateFilter::All => "all",
        }
    }
}

impl fmt::Display for StateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(StateFilter::Open),
            "closed" => Ok(StateFilter::Closed),
            "all" => Ok(StateFilter::All),
            other => Err(Error::Config(format!(
                "unknown state '{}', expected open, closed or all",
                other
            ))),
        }
    }
}

/// Options for listing issues. The state defaults to `all`.
#[derive(Debug, Clone, Default)]
pub struct IssueOptions {
    pub state: Option<StateFilter>,
}

/// Options for listing pull requests. The state defaults to `closed`.
#[derive(Debug, Clone, Default)]
pub struct PullRequestOptions {
    pub state: Option<StateFilter>,
    /// Keep only pull requests that carry a merge timestamp.
    pub merged: bool,
}

impl PullRequestOptions {
    pub fn merged() -> Self {
        Self {
            state: None,
            merged: true,
        }
    }
}
