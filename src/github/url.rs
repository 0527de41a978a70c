use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};

static REPO_URL: OnceLock<Regex> = OnceLock::new();

fn repo_url_pattern() -> &'static Regex {
    REPO_URL.get_or_init(|| {
        Regex::new(
            r"^(?:[a-zA-Z][a-zA-Z0-9+.-]*://)?(?:[^@/\s]+@)?[^/:\s]+[/:]([^/:\s]+)/([^/\s]+?)(?:\.git)?/?$",
        )
        .expect("repository URL pattern is valid")
    })
}

/// Parse a repository URL into `(owner, repo)`.
///
/// Supported forms:
/// - HTTPS: `https://github.com/owner/repo(.git)`
/// - SSH: `git@github.com:owner/repo(.git)`
/// - bare host: `github.com/owner/repo`
pub fn parse_repo_url(url: &str) -> Result<(String, String)> {
    let url = url.trim();
    let captures = repo_url_pattern()
        .captures(url)
        .ok_or_else(|| Error::InvalidUrl(url.to_string()))?;

    Ok((captures[1].to_string(), captures[2].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(url: &str) -> (String, String) {
        parse_repo_url(url).unwrap()
    }

    #[test]
    fn test_parse_https_url() {
        let expected = ("rust-lang".to_string(), "cargo".to_string());
        assert_eq!(parsed("https://github.com/rust-lang/cargo"), expected);
        assert_eq!(parsed("https://github.com/rust-lang/cargo.git"), expected);
        assert_eq!(parsed("https://github.com/rust-lang/cargo/"), expected);
        assert_eq!(parsed("http://github.example.com/rust-lang/cargo"), expected);
    }

    #[test]
    fn test_parse_ssh_url() {
        let expected = ("owner".to_string(), "repo".to_string());
        assert_eq!(parsed("git@github.com:owner/repo.git"), expected);
        assert_eq!(parsed("git@github.com:owner/repo"), expected);
        assert_eq!(parsed("ssh://git@github.com/owner/repo.git"), expected);
    }

    #[test]
    fn test_parse_bare_host() {
        assert_eq!(
            parsed("github.com/owner/repo"),
            ("owner".to_string(), "repo".to_string())
        );
    }

    #[test]
    fn test_repo_names_with_dots() {
        assert_eq!(
            parsed("https://github.com/serde-rs/serde.rs.git"),
            ("serde-rs".to_string(), "serde.rs".to_string())
        );
    }

    #[test]
    fn test_parse_invalid_url() {
        for url in [
            "",
            "invalid-url",
            "https://github.com/owner",
            "https://github.com/owner/repo/issues/1",
            "git@github.com:owner",
        ] {
            let err = parse_repo_url(url).unwrap_err();
            assert!(matches!(err, Error::InvalidUrl(_)), "{url} should be rejected");
        }
    }
}
