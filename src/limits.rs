//! Request throttling backed by an external store, keyed per caller. With no
//! backend configured we fail open and say so, instead of keeping counters in
//! process memory.

use serde::Deserialize;
use std::time::Duration;

const BACKEND_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub enum RateLimiter {
    Open,
    Remote {
        client: reqwest::Client,
        base_url: String,
    },
}

#[derive(Debug, Deserialize)]
struct AllowResponse {
    allowed: bool,
}

impl RateLimiter {
    pub fn from_config(backend_url: Option<String>) -> Self {
        match backend_url {
            Some(base_url) => Self::Remote {
                client: reqwest::Client::new(),
                base_url,
            },
            None => {
                tracing::warn!(
                    "RATE_LIMIT_BACKEND_URL is not set; rate limiting disabled, failing open"
                );
                Self::Open
            }
        }
    }

    /// Backend errors fail open with a log line.
    pub async fn allow(&self, key: &str) -> bool {
        match self {
            Self::Open => true,
            Self::Remote { client, base_url } => {
                let url = format!("{base_url}/allow/{key}");
                match client.get(&url).timeout(BACKEND_TIMEOUT).send().await {
                    Ok(resp) => match resp.json::<AllowResponse>().await {
                        Ok(body) => body.allowed,
                        Err(e) => {
                            tracing::error!("rate limit backend returned malformed response: {e}");
                            true
                        }
                    },
                    Err(e) => {
                        tracing::error!("rate limit backend unreachable: {e}");
                        true
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fails_open_without_a_backend() {
        let limiter = RateLimiter::from_config(None);
        assert!(limiter.allow("some-caller").await);
    }
}
