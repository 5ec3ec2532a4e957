pub mod auth;
pub mod directory;
pub mod exchange;

use crate::error::{Offboard365Error, Result};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Default retry configuration
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;
const MAX_BACKOFF_MS: u64 = 30000;
const JITTER_FACTOR: f64 = 0.3; // +/- 30% jitter

/// Calculate backoff with jitter for exponential backoff
fn calculate_backoff_with_jitter(attempt: u32) -> Duration {
    let base_backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt);
    let capped_backoff = base_backoff.min(MAX_BACKOFF_MS);

    let jitter_range = (capped_backoff as f64 * JITTER_FACTOR) as u64;
    let jitter = if jitter_range > 0 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        std::time::SystemTime::now().hash(&mut hasher);
        (hasher.finish() % (jitter_range * 2)) as i64 - jitter_range as i64
    } else {
        0
    };

    let final_backoff = (capped_backoff as i64 + jitter).max(100) as u64;
    Duration::from_millis(final_backoff)
}

/// Which failures a request may be retried on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryPolicy {
    /// Reads: 429, 5xx and connection errors
    Transient,
    /// Writes: only 429, which guarantees the request was not processed
    ThrottleOnly,
}

impl RetryPolicy {
    pub(crate) fn for_method(method: &Method) -> Self {
        if *method == Method::GET {
            RetryPolicy::Transient
        } else {
            RetryPolicy::ThrottleOnly
        }
    }
}

/// Send a request, retrying on 429 (honouring Retry-After) and, for reads,
/// on 5xx and connection errors.
///
/// Non-retryable responses are handed back untouched; callers map the status
/// onto their own error variant.
pub(crate) async fn send_with_retry<F>(build: F, label: &str, policy: RetryPolicy) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_error = None;

    for attempt in 0..MAX_RETRIES {
        match build().send().await {
            Ok(resp) => {
                let status = resp.status();

                if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RETRIES - 1 {
                    let retry_after = resp
                        .headers()
                        .get("Retry-After")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(INITIAL_BACKOFF_MS / 1000);

                    tracing::warn!(
                        "Rate limited (429) on {}. Retrying in {} seconds... (attempt {}/{})",
                        label,
                        retry_after,
                        attempt + 1,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(Duration::from_secs(retry_after)).await;
                    continue;
                }

                if status.is_server_error()
                    && policy == RetryPolicy::Transient
                    && attempt < MAX_RETRIES - 1
                {
                    let wait_time = calculate_backoff_with_jitter(attempt);
                    tracing::warn!(
                        "Server error ({}) on {}. Retrying in {:?}... (attempt {}/{})",
                        status,
                        label,
                        wait_time,
                        attempt + 1,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(wait_time).await;
                    continue;
                }

                return Ok(resp);
            }
            Err(e) => {
                if policy == RetryPolicy::Transient && attempt < MAX_RETRIES - 1 {
                    let wait_time = calculate_backoff_with_jitter(attempt);
                    tracing::warn!(
                        "Connection error: {}. Retrying in {:?}... (attempt {}/{})",
                        e,
                        wait_time,
                        attempt + 1,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(wait_time).await;
                    last_error = Some(e);
                    continue;
                }
                return Err(e.into());
            }
        }
    }

    Err(last_error.map(|e| e.into()).unwrap_or_else(|| {
        Offboard365Error::GraphApiError(format!("{} failed after {} retries", label, MAX_RETRIES))
    }))
}

/// Graph API client with retry support
pub struct GraphClient {
    client: Client,
    access_token: String,
    base_url: String,
}

impl GraphClient {
    pub fn new(access_token: String) -> Self {
        Self::with_base_url(access_token, GRAPH_API_BASE)
    }

    /// Point the client at another base URL (national clouds, mock servers)
    pub fn with_base_url(access_token: String, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            access_token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("https://") || endpoint.starts_with("http://") {
            return endpoint.to_string();
        }
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<Response> {
        let url = self.url(endpoint);
        let label = format!("{} {}", method, url);
        let policy = RetryPolicy::for_method(&method);

        let resp = send_with_retry(
            || {
                let mut builder = self
                    .client
                    .request(method.clone(), &url)
                    .bearer_auth(&self.access_token);
                if !query.is_empty() {
                    builder = builder.query(query);
                }
                match body {
                    Some(body) => builder.json(body),
                    None => builder,
                }
            },
            &label,
            policy,
        )
        .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(Offboard365Error::ResourceNotFound(format!(
                "{}: {}",
                label,
                crate::error::enhance_graph_error(&error_text)
            )));
        }

        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            return Err(Offboard365Error::GraphApiError(format!(
                "HTTP {}: {}",
                status,
                crate::error::enhance_graph_error(&error_text)
            )));
        }

        Ok(resp)
    }

    /// Make a GET request to Graph API with retry for transient failures
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let resp = self.request(Method::GET, endpoint, &[], None).await?;
        Ok(resp.json::<T>().await?)
    }

    /// GET that maps 404 onto `None`
    pub async fn get_optional<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Option<T>> {
        match self.get(endpoint).await {
            Ok(value) => Ok(Some(value)),
            Err(Offboard365Error::ResourceNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// POST and deserialize the response body
    pub async fn post<T: Serialize, R: DeserializeOwned>(&self, endpoint: &str, body: &T) -> Result<R> {
        let body = serde_json::to_value(body)?;
        let resp = self.request(Method::POST, endpoint, &[], Some(&body)).await?;
        Ok(resp.json::<R>().await?)
    }

    /// POST where the response body is irrelevant (204 or a status object)
    pub async fn post_no_content<T: Serialize>(&self, endpoint: &str, body: &T) -> Result<()> {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, endpoint, &[], Some(&body)).await?;
        Ok(())
    }

    /// PATCH; Graph answers 204 for most updates
    pub async fn patch<T: Serialize>(&self, endpoint: &str, body: &T) -> Result<()> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PATCH, endpoint, &[], Some(&body)).await?;
        Ok(())
    }

    pub async fn delete(&self, endpoint: &str) -> Result<()> {
        self.request(Method::DELETE, endpoint, &[], None).await?;
        Ok(())
    }
}

// ============================================================================
// Pagination Helpers
// ============================================================================

/// Generic paginated response from Graph API
///
/// Standard OData shape: `value` array plus `@odata.nextLink`.
#[derive(Debug, Deserialize)]
pub struct PaginatedResponse<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

impl GraphClient {
    /// Fetch all pages of a paginated Graph API endpoint
    ///
    /// Follows `@odata.nextLink` until all pages are retrieved.
    ///
    /// ```ignore
    /// let groups: Vec<GraphGroup> = client.get_all_pages("users/{id}/memberOf").await?;
    /// ```
    pub async fn get_all_pages<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>> {
        self.get_all_pages_with_query(endpoint, &[]).await
    }

    /// Like [`get_all_pages`](Self::get_all_pages), with query parameters
    /// percent-encoded onto the first request. Later pages use `@odata.nextLink` as-is.
    pub async fn get_all_pages_with_query<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let mut all_items: Vec<T> = Vec::new();
        let resp = self.request(Method::GET, endpoint, query, None).await?;
        let mut page: PaginatedResponse<T> = resp.json().await?;

        loop {
            all_items.extend(page.value);

            match page.next_link {
                Some(next) => page = self.get(&next).await?,
                None => break,
            }
        }

        Ok(all_items)
    }
}

/// Escape a value for use inside a single-quoted OData string literal
pub fn odata_quote(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_capped_and_positive() {
        for attempt in 0..8 {
            let wait = calculate_backoff_with_jitter(attempt);
            assert!(wait >= Duration::from_millis(100));
            assert!(wait <= Duration::from_millis((MAX_BACKOFF_MS as f64 * 1.3) as u64));
        }
    }

    #[test]
    fn test_only_reads_retry_server_errors() {
        assert_eq!(RetryPolicy::for_method(&Method::GET), RetryPolicy::Transient);
        for method in [Method::POST, Method::PATCH, Method::DELETE] {
            assert_eq!(RetryPolicy::for_method(&method), RetryPolicy::ThrottleOnly);
        }
    }

    #[test]
    fn test_odata_quote_doubles_apostrophes() {
        assert_eq!(odata_quote("o'brien@contoso.com"), "o''brien@contoso.com");
    }

    #[test]
    fn test_url_keeps_absolute_next_links() {
        let client = GraphClient::with_base_url("t".into(), "http://localhost:1234/v1.0/");
        assert_eq!(client.url("/users"), "http://localhost:1234/v1.0/users");
        assert_eq!(
            client.url("https://graph.microsoft.com/v1.0/users?$skiptoken=x"),
            "https://graph.microsoft.com/v1.0/users?$skiptoken=x"
        );
    }
}
