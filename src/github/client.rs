use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, DEFAULT_BASE_URL, DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};
use crate::error::{Error, Result};
use crate::github::options::{IssueOptions, PullRequestOptions, StateFilter};
use crate::github::paginator::Paginator;
use crate::github::rate_limiter::RateLimiter;
use crate::models::{Comment, Issue, PullRequest, Repository};

const ACCEPT: &str = "application/vnd.github.v3+json";

/// GitHub REST client with rate-limit awareness.
///
/// Requests are issued one at a time. The rate-limit estimate is shared by
/// every call made through this instance; see [`RateLimiter`].
pub struct GitHubClient {
    client: Client,
    rate_limiter: RateLimiter,
    base_url: String,
}

pub struct GitHubClientBuilder {
    token: Option<String>,
    base_url: String,
    user_agent: String,
    timeout: Duration,
}

impl GitHubClientBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<GitHubClient> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static(ACCEPT));
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(&self.user_agent)?,
        );
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = header::HeaderValue::from_str(&format!("Bearer {}", token))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .build()?;

        Ok(GitHubClient {
            client,
            rate_limiter: RateLimiter::new(),
            base_url: self.base_url,
        })
    }
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::builder(token).build()
    }

    pub fn builder(token: Option<String>) -> GitHubClientBuilder {
        GitHubClientBuilder {
            token,
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::builder(config.github_token.clone())
            .base_url(config.base_url.as_str())
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// GET `base_url + endpoint` and decode the JSON body into `T`.
    ///
    /// Holds the request while the remaining budget is low, and when the
    /// server answers 403 with the budget at zero, waits for the window to
    /// reset and sends the same request again. Any other status >= 400 is
    /// returned as [`Error::Api`] without retrying.
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, endpoint);

        loop {
            self.rate_limiter.wait(cancel).await?;

            tracing::debug!("GET {} {:?}", url, params);
            let request = self.client.get(&url).query(params);
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                response = request.send() => response?,
            };

            self.rate_limiter.update_from_headers(response.headers()).await;

            let status = response.status();
            if status == StatusCode::FORBIDDEN && self.rate_limiter.is_exhausted().await {
                self.rate_limiter.wait_for_reset(cancel).await?;
                continue;
            }

            if status.as_u16() >= 400 {
                let body = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    body = response.text() => body.unwrap_or_default(),
                };
                return Err(Error::Api {
                    status: status.as_u16(),
                    body,
                });
            }

            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                body = response.bytes() => body?,
            };

            return Ok(serde_json::from_slice(&body)?);
        }
    }

    pub async fn fetch_repository(
        &self,
        owner: &str,
        repo: &str,
        cancel: &CancellationToken,
    ) -> Result<Repository> {
        let endpoint = format!("/repos/{}/{}", owner, repo);
        tracing::info!("Fetching repository: {}/{}", owner, repo);
        self.get(&endpoint, &[], cancel).await
    }

    /// List issues, leaving out the pull requests GitHub mixes into the listing.
    pub async fn fetch_issues(
        &self,
        owner: &str,
        repo: &str,
        options: &IssueOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<Issue>> {
        let endpoint = format!("/repos/{}/{}/issues", owner, repo);
        let state = options.state.unwrap_or(StateFilter::All);
        tracing::info!("Fetching {} issues for {}/{}", state, owner, repo);

        let paginator = Paginator::new(self, cancel);
        paginator
            .fetch_filtered(&endpoint, &[("state", state.to_string())], |issue: &Issue| {
                !issue.is_pull_request()
            })
            .await
    }

    pub async fn fetch_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        options: &PullRequestOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<PullRequest>> {
        let endpoint = format!("/repos/{}/{}/pulls", owner, repo);
        let state = options.state.unwrap_or(StateFilter::Closed);
        let merged_only = options.merged;
        tracing::info!(
            "Fetching {} pull requests for {}/{} (merged only: {})",
            state,
            owner,
            repo,
            merged_only
        );

        let paginator = Paginator::new(self, cancel);
        paginator
            .fetch_filtered(&endpoint, &[("state", state.to_string())], |pr: &PullRequest| {
                !merged_only || pr.is_merged()
            })
            .await
    }

    pub async fn fetch_issue_comments(
        &self,
        owner: &str,
        repo: &str,
        issue_number: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Comment>> {
        let endpoint = format!("/repos/{}/{}/issues/{}/comments", owner, repo, issue_number);
        tracing::debug!("Fetching comments for {}/{}#{}", owner, repo, issue_number);

        let paginator = Paginator::new(self, cancel);
        paginator.fetch_all(&endpoint, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mockito::{Matcher, Server, ServerGuard};

    fn client_for(server: &ServerGuard, token: Option<&str>) -> GitHubClient {
        GitHubClient::builder(token.map(str::to_string))
            .base_url(server.url())
            .user_agent("extractum-test/0.1")
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    fn cancel_after(cancel: &CancellationToken, delay: Duration) {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            cancel.cancel();
        });
    }

    #[tokio::test]
    async fn test_fetch_repository_sends_headers() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/octocat/hello")
            .match_header("accept", "application/vnd.github.v3+json")
            .match_header("user-agent", "extractum-test/0.1")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("x-ratelimit-remaining", "4999")
            .with_header("x-ratelimit-reset", "1700000000")
            .with_body(r#"{"name": "hello", "full_name": "octocat/hello", "stargazers_count": 12}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, Some("secret"));
        let cancel = CancellationToken::new();
        let repo = client
            .fetch_repository("octocat", "hello", &cancel)
            .await
            .unwrap();

        assert_eq!(repo.full_name, "octocat/hello");
        assert_eq!(repo.stargazers_count, 12);
        assert_eq!(client.rate_limiter().snapshot().await.remaining, Some(4999));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_no_authorization_without_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/o/r")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let cancel = CancellationToken::new();
        client.fetch_repository("o", "r", &cancel).await.unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn test_invalid_token_rejected_at_build() {
        let result = GitHubClient::new(Some("bad\ntoken".to_string()));
        assert!(matches!(result, Err(Error::InvalidHeader(_))));
    }

    #[tokio::test]
    async fn test_api_errors_are_not_retried() {
        for (status, remaining) in [(404, "4000"), (500, "4000"), (403, "12")] {
            let mut server = Server::new_async().await;
            let mock = server
                .mock("GET", "/repos/o/r")
                .with_status(status)
                .with_header("x-ratelimit-remaining", remaining)
                .with_body(r#"{"message":"nope"}"#)
                .expect(1)
                .create_async()
                .await;

            let client = client_for(&server, None);
            let cancel = CancellationToken::new();
            let err = client.fetch_repository("o", "r", &cancel).await.unwrap_err();

            match err {
                Error::Api { status: got, body } => {
                    assert_eq!(got, status as u16);
                    assert_eq!(body, r#"{"message":"nope"}"#);
                }
                other => panic!("expected API error, got {other:?}"),
            }
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_exhausted_rate_limit_is_retried() {
        let mut server = Server::new_async().await;
        let reset = (Utc::now().timestamp() - 10).to_string();
        let limited = server
            .mock("GET", "/repos/o/r")
            .with_status(403)
            .with_header("x-ratelimit-remaining", "0")
            .with_header("x-ratelimit-reset", &reset)
            .with_body(r#"{"message":"API rate limit exceeded"}"#)
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/repos/o/r")
            .with_status(200)
            .with_header("x-ratelimit-remaining", "5000")
            .with_body(r#"{"name": "r"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let cancel = CancellationToken::new();
        let repo = client.fetch_repository("o", "r", &cancel).await.unwrap();

        assert_eq!(repo.name, "r");
        limited.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_repeated_exhaustion_keeps_retrying() {
        let mut server = Server::new_async().await;
        let reset = (Utc::now().timestamp() - 10).to_string();
        let limited = server
            .mock("GET", "/repos/o/r")
            .with_status(403)
            .with_header("x-ratelimit-remaining", "0")
            .with_header("x-ratelimit-reset", &reset)
            .with_body(r#"{"message":"API rate limit exceeded"}"#)
            .expect(2)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/repos/o/r")
            .with_status(200)
            .with_header("x-ratelimit-remaining", "5000")
            .with_body(r#"{"name": "r", "full_name": "o/r"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let cancel = CancellationToken::new();
        let repo = client.fetch_repository("o", "r", &cancel).await.unwrap();

        assert_eq!(repo.full_name, "o/r");
        assert_eq!(client.rate_limiter().snapshot().await.remaining, Some(5000));
        limited.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancel_during_exhaustion_wait() {
        let mut server = Server::new_async().await;
        let reset = (Utc::now().timestamp() + 3600).to_string();
        let limited = server
            .mock("GET", "/repos/o/r")
            .with_status(403)
            .with_header("x-ratelimit-remaining", "0")
            .with_header("x-ratelimit-reset", &reset)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let cancel = CancellationToken::new();
        cancel_after(&cancel, Duration::from_millis(100));

        let started = std::time::Instant::now();
        let err = client.fetch_repository("o", "r", &cancel).await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(5));
        limited.assert_async().await;
    }

    #[tokio::test]
    async fn test_low_budget_waits_for_reset() {
        let mut server = Server::new_async().await;
        let reset_secs = Utc::now().timestamp() + 2;
        let first = server
            .mock("GET", "/repos/o/r")
            .with_status(200)
            .with_header("x-ratelimit-remaining", "3")
            .with_header("x-ratelimit-reset", &reset_secs.to_string())
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/repos/o/r/issues/1/comments")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("x-ratelimit-remaining", "4999")
            .with_body("[]")
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let cancel = CancellationToken::new();
        client.fetch_repository("o", "r", &cancel).await.unwrap();
        client
            .fetch_issue_comments("o", "r", 1, &cancel)
            .await
            .unwrap();

        assert!(Utc::now().timestamp() >= reset_secs + 1);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_cancel_during_low_budget_wait_sends_nothing() {
        let mut server = Server::new_async().await;
        let reset = (Utc::now().timestamp() + 3600).to_string();
        let first = server
            .mock("GET", "/repos/o/r")
            .with_status(200)
            .with_header("x-ratelimit-remaining", "3")
            .with_header("x-ratelimit-reset", &reset)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;
        let never = server
            .mock("GET", "/repos/o/r/issues")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let cancel = CancellationToken::new();
        client.fetch_repository("o", "r", &cancel).await.unwrap();

        cancel_after(&cancel, Duration::from_millis(100));
        let err = client
            .fetch_issues("o", "r", &IssueOptions::default(), &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        first.assert_async().await;
        never.assert_async().await;
    }

    #[tokio::test]
    async fn test_already_cancelled_sends_nothing() {
        let mut server = Server::new_async().await;
        let never = server
            .mock("GET", "/repos/o/r")
            .expect(0)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client.fetch_repository("o", "r", &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        never.assert_async().await;
    }

    #[tokio::test]
    async fn test_decode_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/o/r")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let client = client_for(&server, None);
        let cancel = CancellationToken::new();
        let err = client.fetch_repository("o", "r", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn test_transport_error() {
        let client = GitHubClient::builder(None)
            .base_url("http://127.0.0.1:1")
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let cancel = CancellationToken::new();

        let err = client.fetch_repository("o", "r", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_fetch_issues_skips_pull_requests() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/o/r/issues")
            .match_query(Matcher::Exact("state=all&page=1&per_page=100".into()))
            .with_status(200)
            .with_body(
                r#"[
                    {"number": 1, "title": "Crash on start"},
                    {"number": 2, "title": "Fix crash", "pull_request": {"url": "https://api.github.com/repos/o/r/pulls/2"}},
                    {"number": 3, "title": "Docs typo", "pull_request": null}
                ]"#,
            )
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let cancel = CancellationToken::new();
        let issues = client
            .fetch_issues("o", "r", &IssueOptions::default(), &cancel)
            .await
            .unwrap();

        let numbers: Vec<u64> = issues.iter().map(|i| i.number).collect();
        assert_eq!(numbers, vec![1, 3]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_issues_state_override() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/o/r/issues")
            .match_query(Matcher::UrlEncoded("state".into(), "open".into()))
            .with_status(200)
            .with_body("[]")
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let cancel = CancellationToken::new();
        let options = IssueOptions {
            state: Some(StateFilter::Open),
        };
        let issues = client
            .fetch_issues("o", "r", &options, &cancel)
            .await
            .unwrap();

        assert!(issues.is_empty());
        mock.assert_async().await;
    }

    const PULLS: &str = r#"[
        {"number": 10, "state": "closed", "merged_at": "2024-02-01T00:00:00Z"},
        {"number": 11, "state": "closed", "merged_at": null},
        {"number": 12, "state": "closed"}
    ]"#;

    #[tokio::test]
    async fn test_fetch_pull_requests_defaults_to_closed() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/o/r/pulls")
            .match_query(Matcher::Exact("state=closed&page=1&per_page=100".into()))
            .with_status(200)
            .with_body(PULLS)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let cancel = CancellationToken::new();
        let prs = client
            .fetch_pull_requests("o", "r", &PullRequestOptions::default(), &cancel)
            .await
            .unwrap();

        assert_eq!(prs.len(), 3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_pull_requests_merged_only() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/o/r/pulls")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(PULLS)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let cancel = CancellationToken::new();
        let prs = client
            .fetch_pull_requests("o", "r", &PullRequestOptions::merged(), &cancel)
            .await
            .unwrap();

        let numbers: Vec<u64> = prs.iter().map(|pr| pr.number).collect();
        assert_eq!(numbers, vec![10]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_issue_comments() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/o/r/issues/42/comments")
            .match_query(Matcher::Exact("page=1&per_page=100".into()))
            .with_status(200)
            .with_body(r#"[{"id": 1, "body": "me too", "user": {"login": "a"}}]"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, None);
        let cancel = CancellationToken::new();
        let comments = client
            .fetch_issue_comments("o", "r", 42, &cancel)
            .await
            .unwrap();

        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].body, "me too");
        mock.assert_async().await;
    }
}
