//! Resilient Fetcher: one retry/backoff policy shared by every remote source.
//!
//! `classify` maps an HTTP status to a decision; `execute` drives a call
//! thunk until it succeeds, hits a non-transient status, or runs out of
//! attempts. Backoff starts at `base_delay`, doubles per retry and is capped
//! by the ceiling the classification picked (rate limits get a longer one).

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use metrics::counter;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PipelineError;

/// Query/body parameters passed through to the call thunk.
pub type Params = BTreeMap<String, String>;

/// Status + body of one completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Success,
    /// Transient failure; wait at most `ceiling` before the next attempt.
    Retry { ceiling: Duration },
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub rate_limit_ceiling: Duration,
    pub server_error_ceiling: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_secs(1),
            rate_limit_ceiling: Duration::from_secs(60),
            server_error_ceiling: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn classify(&self, status: u16) -> RetryDecision {
        match status {
            200..=299 => RetryDecision::Success,
            429 => RetryDecision::Retry {
                ceiling: self.rate_limit_ceiling,
            },
            500..=599 => RetryDecision::Retry {
                ceiling: self.server_error_ceiling,
            },
            _ => RetryDecision::Fail,
        }
    }

    /// Wait before retry number `retry` (0-based): `base * 2^retry`, capped.
    pub fn backoff(&self, retry: u32, ceiling: Duration) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(ceiling)
    }

    /// Upper bound on total sleep across one `execute` call.
    pub fn max_total_backoff(&self) -> Duration {
        let ceiling = self.rate_limit_ceiling.max(self.server_error_ceiling);
        (0..self.max_attempts.saturating_sub(1))
            .map(|retry| self.backoff(retry, ceiling))
            .fold(Duration::ZERO, |acc, d| acc.saturating_add(d))
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Run `call` until success or the attempt ceiling.
    ///
    /// `Err` from the thunk is a network-level failure and is retried with the
    /// server-error ceiling. Non-transient statuses fail immediately.
    pub async fn execute<'p, F, Fut>(
        &self,
        service: &str,
        params: &'p Params,
        mut call: F,
    ) -> Result<RemoteResponse, PipelineError>
    where
        F: FnMut(&'p Params) -> Fut,
        Fut: Future<Output = anyhow::Result<RemoteResponse>>,
    {
        let max = self.attempts();
        let mut last_status = None;
        let mut last_detail = String::new();

        for attempt in 1..=max {
            let ceiling = match call(params).await {
                Ok(resp) => match self.classify(resp.status) {
                    RetryDecision::Success => return Ok(resp),
                    RetryDecision::Fail => {
                        tracing::warn!(service, status = resp.status, "non-retryable response");
                        return Err(PipelineError::RemoteUnavailable {
                            service: service.to_string(),
                            attempts: attempt,
                            status: Some(resp.status),
                            detail: truncate(&resp.body),
                        });
                    }
                    RetryDecision::Retry { ceiling } => {
                        last_status = Some(resp.status);
                        last_detail = truncate(&resp.body);
                        ceiling
                    }
                },
                Err(e) => {
                    last_status = None;
                    last_detail = format!("{e:#}");
                    self.server_error_ceiling
                }
            };

            if attempt == max {
                break;
            }

            let wait = self.backoff(attempt - 1, ceiling);
            tracing::warn!(
                service,
                attempt,
                status = ?last_status,
                wait_ms = wait.as_millis() as u64,
                "transient remote failure, backing off"
            );
            counter!("fetch_retries_total", "service" => service.to_string()).increment(1);
            tokio::time::sleep(wait).await;
        }

        counter!("fetch_exhausted_total", "service" => service.to_string()).increment(1);
        Err(PipelineError::RemoteUnavailable {
            service: service.to_string(),
            attempts: max,
            status: last_status,
            detail: last_detail,
        })
    }

    /// `execute`, then decode the success body as JSON.
    pub async fn execute_json<'p, T, F, Fut>(
        &self,
        service: &str,
        params: &'p Params,
        call: F,
    ) -> Result<T, PipelineError>
    where
        T: DeserializeOwned,
        F: FnMut(&'p Params) -> Fut,
        Fut: Future<Output = anyhow::Result<RemoteResponse>>,
    {
        let resp = self.execute(service, params, call).await?;
        serde_json::from_str(&resp.body).map_err(|e| PipelineError::Decode {
            service: service.to_string(),
            detail: e.to_string(),
        })
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 512;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        body.chars().take(MAX).collect()
    }
}

/// HTTP client bound to a retry policy. Each source owns one.
#[derive(Clone)]
pub struct ResilientFetcher {
    http: reqwest::Client,
    policy: RetryPolicy,
}

impl ResilientFetcher {
    pub fn new(policy: RetryPolicy, timeout: Duration, user_agent: &str) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(4).min(timeout))
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("http client: {e}")))?;
        Ok(Self { http, policy })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET with retries; returns the raw success body.
    pub async fn get_text(
        &self,
        service: &str,
        url: &str,
        headers: &[(&str, String)],
        params: &Params,
    ) -> Result<String, PipelineError> {
        let http = &self.http;
        let resp = self
            .policy
            .execute(service, params, |p| async move {
                let mut req = http.get(url).query(p);
                for (k, v) in headers {
                    req = req.header(*k, v.as_str());
                }
                let resp = req.send().await?;
                let status = resp.status().as_u16();
                let body = resp.text().await?;
                Ok(RemoteResponse { status, body })
            })
            .await?;
        Ok(resp.body)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        service: &str,
        url: &str,
        headers: &[(&str, String)],
        params: &Params,
    ) -> Result<T, PipelineError> {
        let body = self.get_text(service, url, headers, params).await?;
        serde_json::from_str(&body).map_err(|e| PipelineError::Decode {
            service: service.to_string(),
            detail: e.to_string(),
        })
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        service: &str,
        url: &str,
        bearer: Option<&str>,
        body: &B,
    ) -> Result<T, PipelineError> {
        let http = &self.http;
        let params = Params::new();
        self.policy
            .execute_json(service, &params, |_| async move {
                let mut req = http.post(url).json(body);
                if let Some(token) = bearer {
                    req = req.bearer_auth(token);
                }
                let resp = req.send().await?;
                let status = resp.status().as_u16();
                let text = resp.text().await?;
                Ok(RemoteResponse { status, body: text })
            })
            .await
    }
}
