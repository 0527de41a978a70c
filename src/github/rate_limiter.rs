use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Below this many remaining requests the client holds off until the window resets.
pub const LOW_WATER_MARK: u32 = 5;

const RESET_GRACE: Duration = Duration::from_secs(1);

const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// Local estimate of the request budget, taken from the most recent response.
///
/// This is advisory only: the server may still reject a request the
/// estimate considered safe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitState {
    pub remaining: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitState {
    /// How long to hold a request before sending it, if at all.
    pub fn delay_before_send(&self, now: DateTime<Utc>) -> Option<Duration> {
        let remaining = self.remaining?;
        let reset_at = self.reset_at?;
        if remaining < LOW_WATER_MARK && now < reset_at {
            Some(until_reset(reset_at, now))
        } else {
            None
        }
    }

    /// How long to wait after the server reported the budget as spent.
    ///
    /// Never shorter than one second, so a server that keeps reporting a
    /// stale reset time is not retried in a tight loop.
    pub fn delay_after_exhaustion(&self, now: DateTime<Utc>) -> Duration {
        match self.reset_at {
            Some(reset_at) => until_reset(reset_at, now).max(RESET_GRACE),
            None => RESET_GRACE,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

/// Time from `now` until one second past `reset_at`, zero if already passed.
fn until_reset(reset_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let remaining = reset_at.signed_duration_since(now);
    match remaining.to_std() {
        Ok(ahead) => ahead.saturating_add(RESET_GRACE),
        Err(_) => remaining
            .checked_add(&chrono::Duration::seconds(RESET_GRACE.as_secs() as i64))
            .and_then(|left| left.to_std().ok())
            .unwrap_or(Duration::ZERO),
    }
}

/// Rate-limit state owned by one client.
///
/// The state sits behind a lock so that it is never torn, but the client
/// assumes a single call chain at a time: concurrent chains on one client
/// will interleave their updates and each act on whichever response landed
/// last. Use one client per chain when that matters.
pub struct RateLimiter {
    state: Mutex<RateLimitState>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RateLimitState::default()),
        }
    }

    pub fn with_state(state: RateLimitState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub async fn snapshot(&self) -> RateLimitState {
        *self.state.lock().await
    }

    pub async fn is_exhausted(&self) -> bool {
        self.state.lock().await.is_exhausted()
    }

    /// Hold the caller while the remaining budget is below the low-water mark.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let delay = {
            let state = self.state.lock().await;
            state.delay_before_send(Utc::now())
        };

        if let Some(delay) = delay {
            tracing::info!("Rate limit almost exceeded, waiting {:?}", delay);
            sleep_or_cancel(delay, cancel).await?;
        }

        Ok(())
    }

    /// Wait out an exhausted window before the request is retried.
    pub async fn wait_for_reset(&self, cancel: &CancellationToken) -> Result<()> {
        let delay = {
            let state = self.state.lock().await;
            state.delay_after_exhaustion(Utc::now())
        };

        tracing::warn!("Rate limit exceeded, waiting {:?} before retrying", delay);
        sleep_or_cancel(delay, cancel).await
    }

    /// Absent or unparsable headers leave the corresponding field untouched.
    pub async fn update_from_headers(&self, headers: &HeaderMap) {
        let remaining = headers
            .get(REMAINING_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok());

        let reset_at = headers
            .get(RESET_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        let mut state = self.state.lock().await;
        if let Some(remaining) = remaining {
            state.remaining = Some(remaining);
        }
        if let Some(reset_at) = reset_at {
            state.reset_at = Some(reset_at);
        }

        tracing::debug!(
            remaining = ?state.remaining,
            reset_at = ?state.reset_at,
            "Rate limit state updated"
        );
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = sleep(delay) => Ok(()),
    }
}
