//! Piazza JSON-RPC client implementation

use crate::error::{Error, Result};
use crate::models::*;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

const API_URL: &str = "https://piazza.com/logic/api";
const PIAZZA_HOST: &str = "https://piazza.com";
const SESSION_COOKIE: &str = "session_id";

const USER_AGENT_VALUE: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0.0.0 Safari/537.36";

/// Piazza client configuration
#[derive(Debug, Clone)]
pub struct PiazzaClientConfig {
    pub email: String,
    pub password: String,
    /// Request timeout (seconds)
    pub timeout_secs: u64,
    /// Attempts on a "foo fast" reply before giving up
    pub max_retries: u32,
    /// Pause between those attempts
    pub retry_delay: Duration,
}

impl Default for PiazzaClientConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            password: String::new(),
            timeout_secs: 30,
            max_retries: 5,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Piazza API client
///
/// Logs in lazily on the first call and again after the session is rejected.
pub struct PiazzaClient {
    client: reqwest::Client,
    jar: Arc<Jar>,
    config: PiazzaClientConfig,
    logged_in: Mutex<bool>,
}

impl PiazzaClient {
    pub fn new(config: PiazzaClientConfig) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_provider(jar.clone())
            .build()?;

        Ok(Self {
            client,
            jar,
            config,
            logged_in: Mutex::new(false),
        })
    }

    /// Class page of a network, `?cid=<nr>` selects a post
    pub fn network_url(nid: &str) -> String {
        format!("{}/class/{}", PIAZZA_HOST, nid)
    }

    pub fn post_url(nid: &str, nr: u64) -> String {
        format!("{}?cid={}", Self::network_url(nid), nr)
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(token) = self.csrf_token() {
            if let Ok(value) = HeaderValue::from_str(&token) {
                headers.insert("CSRF-Token", value);
            }
        }
        headers
    }

    /// Piazza expects the session cookie echoed back as `CSRF-Token`
    fn csrf_token(&self) -> Option<String> {
        let url = Url::parse(PIAZZA_HOST).ok()?;
        let cookies = self.jar.cookies(&url)?;
        extract_cookie(cookies.to_str().ok()?, SESSION_COOKIE)
    }

    /// Authenticate with email/password, storing the session cookie
    pub async fn login(&self) -> Result<()> {
        let mut logged_in = self.logged_in.lock().await;
        if *logged_in {
            return Ok(());
        }

        let params = json!({
            "email": self.config.email,
            "pass": self.config.password,
        });
        let result: Value = self
            .call("user.login", params)
            .await
            .map_err(|e| match e {
                Error::Rpc(msg) => Error::Auth(msg),
                other => other,
            })?;

        tracing::debug!("Piazza login result: {}", result);
        *logged_in = true;
        Ok(())
    }

    async fn ensure_login(&self) -> Result<()> {
        if *self.logged_in.lock().await {
            return Ok(());
        }
        self.login().await
    }

    /// Authenticated RPC call; a rejected session triggers one re-login
    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        self.ensure_login().await?;

        match self.call(method, params.clone()).await {
            Err(Error::Rpc(msg)) if is_session_error(&msg) => {
                tracing::info!("Piazza session expired, logging in again");
                *self.logged_in.lock().await = false;
                self.login().await?;
                self.call(method, params).await
            }
            other => other,
        }
    }

    /// One RPC round trip, retrying while Piazza answers "foo fast"
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let mut url = Url::parse(API_URL).map_err(|e| Error::Other(e.to_string()))?;
        url.query_pairs_mut().append_pair("method", method);
        let body = json!({ "method": method, "params": params });

        let mut last_error = String::new();
        for attempt in 0..self.config.max_retries.max(1) {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay).await;
            }

            let response = self
                .client
                .post(url.clone())
                .headers(self.build_headers())
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            let text = response.text().await?;

            if !status.is_success() {
                return Err(Error::Api {
                    message: text,
                    status: status.as_u16(),
                });
            }

            let parsed: RpcResponse<T> = serde_json::from_str(&text)?;
            match (parsed.result, parsed.error) {
                (_, Some(error)) if is_rate_limited(&error) => {
                    tracing::warn!(
                        "Piazza throttled {} (attempt {}/{})",
                        method,
                        attempt + 1,
                        self.config.max_retries
                    );
                    last_error = error;
                }
                (_, Some(error)) if is_not_found(&error) => return Err(Error::NotFound(error)),
                (_, Some(error)) => return Err(Error::Rpc(error)),
                (Some(result), None) => return Ok(result),
                (None, None) => {
                    return Err(Error::Other(format!("{} returned no result", method)));
                }
            }
        }

        Err(Error::RateLimit(last_error))
    }

    /// Networks (classes) visible to the account
    pub async fn networks(&self) -> Result<Vec<Network>> {
        let status: UserStatus = self.rpc("user.status", json!({})).await?;
        Ok(status.networks)
    }

    /// Look up one network by id
    pub async fn network(&self, nid: &str) -> Result<Network> {
        self.networks()
            .await?
            .into_iter()
            .find(|n| n.id == nid)
            .ok_or_else(|| Error::NotFound(format!("network {}", nid)))
    }

    /// Feed summaries, newest activity first
    pub async fn feed(&self, nid: &str, limit: u32, offset: u32) -> Result<Vec<FeedItem>> {
        let result: FeedResult = self
            .rpc(
                "network.get_my_feed",
                json!({ "nid": nid, "limit": limit, "offset": offset }),
            )
            .await?;
        Ok(result.feed)
    }

    /// Full post by content id or post number
    pub async fn post(&self, nid: &str, cid: &str) -> Result<Post> {
        self.rpc("content.get", json!({ "cid": cid, "nid": nid }))
            .await
    }

    /// The first `limit` feed entries expanded to full posts
    ///
    /// Entries that vanish between the two calls are skipped.
    pub async fn recent_posts(&self, nid: &str, limit: u32) -> Result<Vec<Post>> {
        let feed = self.feed(nid, limit, 0).await?;
        let mut posts = Vec::with_capacity(feed.len());

        for item in feed.into_iter().take(limit as usize) {
            match self.post(nid, &item.id).await {
                Ok(post) => posts.push(post),
                Err(Error::NotFound(_)) => {
                    tracing::debug!("Feed entry @{} disappeared", item.nr);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(posts)
    }
}

fn is_rate_limited(error: &str) -> bool {
    error.to_lowercase().contains("foo fast")
}

fn is_not_found(error: &str) -> bool {
    let lower = error.to_lowercase();
    lower.contains("cannot be found") || lower.contains("not found")
}

fn is_session_error(error: &str) -> bool {
    let lower = error.to_lowercase();
    lower.contains("not logged in") || lower.contains("not_logged_in")
}

/// Pull one cookie value out of a `Cookie` header string
fn extract_cookie(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}
