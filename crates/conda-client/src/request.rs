//! Request helper for the conda service.
//!
//! Long-running operations (creating an environment, installing packages)
//! answer `202 Accepted` with a `Location` header pointing at a task
//! resource. [`ServerConnection::request`] hides that from callers: it keeps
//! GET-ing the location every poll interval until the service returns
//! something other than 202, then hands back that final response.
//!
//! The poll loop is bounded by `max_poll_attempts` and stops early when the
//! caller's [`CancellationToken`] fires.

use std::time::Duration;

use log::{debug, warn};
use reqwest::header::{HeaderValue, LOCATION};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::ClientConfig;
use crate::error::RequestError;

/// Method, query and body of a request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::get()
    }
}

impl RequestOptions {
    fn new(method: Method) -> Self {
        Self {
            method,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post(body: serde_json::Value) -> Self {
        Self::new(Method::POST).with_json(body)
    }

    pub fn patch(body: serde_json::Value) -> Self {
        Self::new(Method::PATCH).with_json(body)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    /// Append a query parameter.
    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Attach a JSON body.
    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Connection to the conda service rooted at a base URL.
///
/// Cheap to clone; clones share the underlying HTTP connection pool.
#[derive(Debug, Clone)]
pub struct ServerConnection {
    client: reqwest::Client,
    base_url: Url,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl ServerConnection {
    /// Create a connection with default polling settings.
    pub fn new(base_url: &str) -> Result<Self, RequestError> {
        Self::from_config(&ClientConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, RequestError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: normalize_base_url(&config.base_url)?,
            poll_interval: config.poll_interval(),
            max_poll_attempts: config.max_poll_attempts,
        })
    }

    /// Set the delay between polls of an accepted operation.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set how many polls are attempted before giving up.
    pub fn with_max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = attempts;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the absolute URL for `segments` below the base URL.
    ///
    /// Each segment is percent-encoded, so environment names containing
    /// `/` or spaces stay a single path segment.
    pub fn url_for(
        &self,
        segments: &[&str],
        query: &[(String, String)],
    ) -> Result<Url, RequestError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| RequestError::InvalidUrl(url::ParseError::RelativeUrlWithoutBase))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Send a request, following 202 responses until the operation settles.
    pub async fn request(
        &self,
        segments: &[&str],
        options: RequestOptions,
    ) -> Result<Response, RequestError> {
        self.request_with_cancel(segments, options, &CancellationToken::new())
            .await
    }

    /// Like [`request`](Self::request) but abandons polling once `cancel`
    /// fires.
    pub async fn request_with_cancel(
        &self,
        segments: &[&str],
        options: RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<Response, RequestError> {
        let url = self.url_for(segments, &options.query)?;
        let mut response = self
            .send(options.method, url.clone(), options.body.as_ref(), cancel)
            .await?;

        let mut attempts = 0u32;
        let mut responded = url.clone();
        while response.status() == StatusCode::ACCEPTED {
            let location = poll_location(response.headers().get(LOCATION), &responded, &url);

            if attempts >= self.max_poll_attempts {
                warn!(
                    "[conda-poll] Giving up on {} after {} attempts",
                    location, attempts
                );
                return Err(RequestError::PollLimit {
                    attempts,
                    location: location.to_string(),
                });
            }
            attempts += 1;

            tokio::select! {
                _ = cancel.cancelled() => return Err(RequestError::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            debug!("[conda-poll] Poll #{} of {}", attempts, location);
            response = self.send(Method::GET, location.clone(), None, cancel).await?;
            responded = location;
        }

        check_status(response).await
    }

    /// Send a request and decode the JSON body of the final response.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        options: RequestOptions,
        cancel: &CancellationToken,
    ) -> Result<T, RequestError> {
        let response = self.request_with_cancel(segments, options, cancel).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| RequestError::Decode(e.to_string()))
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<Response, RequestError> {
        let mut builder = self.client.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(RequestError::Cancelled),
            result = builder.send() => Ok(result?),
        }
    }
}

/// Resolve the `Location` of a 202 response against the URL that returned
/// it, falling back to the original request URL when the header is missing
/// or unusable.
fn poll_location(header: Option<&HeaderValue>, responded: &Url, request_url: &Url) -> Url {
    header
        .and_then(|value| value.to_str().ok())
        .and_then(|location| match responded.join(location) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("[conda-poll] Ignoring bad Location {:?}: {}", location, e);
                None
            }
        })
        .unwrap_or_else(|| request_url.clone())
}

/// Turn a non-success response into [`RequestError::Response`].
async fn check_status(response: Response) -> Result<Response, RequestError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await?;
    let payload = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
    Err(RequestError::Response { status, payload })
}

/// Ensure the base URL ends with `/` so joins stay below it.
fn normalize_base_url(base_url: &str) -> Result<Url, RequestError> {
    let mut url = Url::parse(base_url)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
