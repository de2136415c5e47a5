//! GitHub API client: sync HTTP via ureq, no async runtime

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::retry::RetryPolicy;
use super::{GitHubError, GitHubResult};
use crate::cancel::CancellationToken;

const USER_AGENT: &str = concat!("gitvelocity/", env!("CARGO_PKG_VERSION"));

/// Endpoint and transport settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    /// `None` disables the GraphQL strategies
    pub graphql_url: Option<String>,
    pub token: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// REST page size
    pub per_page: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            graphql_url: Some("https://api.github.com/graphql".to_string()),
            token: None,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            per_page: 100,
        }
    }
}

/// GitHub client. Every call goes through the retry policy.
pub struct GitHubClient {
    agent: ureq::Agent,
    config: ClientConfig,
    cancel: CancellationToken,
}

fn make_agent(timeout: Duration) -> ureq::Agent {
    ureq::config::Config::builder()
        .http_status_as_error(false) // Status codes are classified below
        .timeout_global(Some(timeout))
        .build()
        .new_agent()
}

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlMessage>,
}

#[derive(Deserialize)]
struct GraphQlMessage {
    message: String,
}

impl GitHubClient {
    pub fn new(config: ClientConfig, cancel: CancellationToken) -> Self {
        Self {
            agent: make_agent(config.timeout),
            config,
            cancel,
        }
    }

    /// GraphQL needs both an endpoint and a token.
    pub fn has_graphql(&self) -> bool {
        self.config.graphql_url.is_some() && self.config.token.is_some()
    }

    pub fn per_page(&self) -> u32 {
        self.config.per_page.clamp(1, 100)
    }

    /// Absolute URL for an API path (absolute URLs pass through).
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!(
                "{}/{}",
                self.config.api_url.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        }
    }

    /// GET a JSON document, returning it with the `rel="next"` link if any.
    pub fn get_json<T: DeserializeOwned>(&self, path: &str) -> GitHubResult<(T, Option<String>)> {
        let url = self.url(path);
        self.config
            .retry
            .run(&self.cancel, &format!("GET {}", url), || self.get_once(&url))
    }

    fn get_once<T: DeserializeOwned>(&self, url: &str) -> GitHubResult<(T, Option<String>)> {
        debug!("GET {}", url);
        let mut req = self
            .agent
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT);
        if let Some(token) = &self.config.token {
            req = req.header("Authorization", &format!("Bearer {}", token));
        }

        let response = req
            .call()
            .map_err(|e| GitHubError::Transport(e.to_string()))?;
        let response = check_status(response)?;
        let next = response
            .headers()
            .get("link")
            .and_then(|v| v.to_str().ok())
            .and_then(next_link);

        let body: T = response
            .into_body()
            .read_json()
            .map_err(|e| GitHubError::Decode(e.to_string()))?;
        Ok((body, next))
    }

    /// Run a GraphQL query and return its `data` payload.
    pub fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> GitHubResult<T> {
        let (Some(url), Some(token)) = (&self.config.graphql_url, &self.config.token) else {
            return Err(GitHubError::GraphQlUnavailable);
        };
        let body = GraphQlRequest { query, variables };

        self.config.retry.run(&self.cancel, "GraphQL query", || {
            debug!("POST {}", url);
            let response = self
                .agent
                .post(url)
                .header("User-Agent", USER_AGENT)
                .header("Authorization", &format!("Bearer {}", token))
                .send_json(&body)
                .map_err(|e| GitHubError::Transport(e.to_string()))?;
            let response = check_status(response)?;

            let parsed: GraphQlResponse<T> = response
                .into_body()
                .read_json()
                .map_err(|e| GitHubError::Decode(e.to_string()))?;
            if !parsed.errors.is_empty() {
                let messages: Vec<_> = parsed.errors.into_iter().map(|e| e.message).collect();
                return Err(GitHubError::GraphQl(messages.join("; ")));
            }
            parsed
                .data
                .ok_or_else(|| GitHubError::Decode("GraphQL response has no data".to_string()))
        })
    }
}

/// Map error statuses (and rate limits) to errors; pass 2xx/3xx through.
fn check_status(
    response: ureq::http::Response<ureq::Body>,
) -> GitHubResult<ureq::http::Response<ureq::Body>> {
    let status = response.status().as_u16();
    if status < 400 {
        return Ok(response);
    }

    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let exhausted = header("x-ratelimit-remaining").as_deref() == Some("0");
    if status == 429 || (status == 403 && exhausted) {
        let retry_after = rate_limit_wait(
            header("retry-after").as_deref(),
            header("x-ratelimit-reset").as_deref(),
            Utc::now().timestamp(),
        );
        return Err(GitHubError::RateLimited { retry_after });
    }

    let message = response.into_body().read_to_string().unwrap_or_default();
    Err(GitHubError::Http { status, message })
}

/// How long to wait out a rate limit, from `retry-after` seconds or the
/// `x-ratelimit-reset` epoch.
fn rate_limit_wait(retry_after: Option<&str>, reset: Option<&str>, now: i64) -> Option<Duration> {
    if let Some(secs) = retry_after.and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }
    let reset = reset.and_then(|v| v.trim().parse::<i64>().ok())?;
    Some(Duration::from_secs(reset.saturating_sub(now).max(0) as u64))
}

/// Extract the `rel="next"` target from a `Link` header.
fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| p.trim() == "rel=\"next\"");
        if is_next {
            Some(target.trim_start_matches('<').trim_end_matches('>').to_string())
        } else {
            None
        }
    })
}
