//! Canvas API client implementation

use crate::error::{Error, Result};
use crate::models::*;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

const PER_PAGE: &str = "100";
/// Upper bound on followed `rel="next"` links for a single listing
const MAX_PAGES: usize = 50;

/// Canvas client configuration
#[derive(Debug, Clone)]
pub struct CanvasClientConfig {
    /// Instance root, e.g. `https://canvas.ubc.ca`
    pub base_url: String,
    pub access_token: String,
    /// Request timeout (seconds)
    pub timeout_secs: u64,
}

/// Canvas REST API client
pub struct CanvasClient {
    client: reqwest::Client,
    base_url: Url,
    access_token: String,
}

impl CanvasClient {
    pub fn new(config: CanvasClientConfig) -> Result<Self> {
        let mut base_url = Url::parse(config.base_url.trim())?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            access_token: config.access_token.trim().to_string(),
        })
    }

    /// Human-facing course page URL
    pub fn course_url(&self, course_id: u64) -> String {
        self.base_url
            .join(&format!("courses/{}", course_id))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}courses/{}", self.base_url, course_id))
    }

    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let auth_value = format!("Bearer {}", self.access_token);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value)
                .map_err(|e| Error::Other(format!("Invalid auth header: {}", e)))?,
        );
        Ok(headers)
    }

    fn api_url(&self, path: &str, params: &[(&str, String)]) -> Result<Url> {
        let mut url = self.base_url.join("api/v1/")?.join(path)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// GET one page, returning the decoded body and the next page link
    async fn get_page<T: DeserializeOwned>(&self, url: Url) -> Result<(T, Option<Url>)> {
        let response = self
            .client
            .get(url.clone())
            .headers(self.build_headers()?)
            .send()
            .await?;

        let status = response.status();
        let next = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_next_link)
            .and_then(|link| Url::parse(&link).ok());
        let text = response.text().await?;

        if !status.is_success() {
            return Err(map_status(status, url.path(), text));
        }

        let body: T = serde_json::from_str(&text)?;
        Ok((body, next))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        let url = self.api_url(path, params)?;
        let (body, _) = self.get_page(url).await?;
        Ok(body)
    }

    /// GET every page of a listing endpoint
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let mut params = params.to_vec();
        params.push(("per_page", PER_PAGE.to_string()));

        let mut url = Some(self.api_url(path, &params)?);
        let mut all = Vec::new();
        let mut pages = 0;

        while let Some(current) = url.take() {
            let (mut page, next): (Vec<T>, Option<Url>) = self.get_page(current).await?;
            all.append(&mut page);
            pages += 1;

            if pages >= MAX_PAGES {
                tracing::warn!("Stopped paginating {} after {} pages", path, pages);
                break;
            }
            url = next;
        }

        Ok(all)
    }

    /// Course metadata
    pub async fn course(&self, course_id: u64) -> Result<Course> {
        self.get(&format!("courses/{}", course_id), &[]).await
    }

    /// Announcements of one course posted between the two dates (inclusive)
    ///
    /// Canvas defaults to the last 14 days, and to 28 days after `start_date`
    /// when `end_date` is missing.
    pub async fn announcements(
        &self,
        course_id: u64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Announcement>> {
        let params = [
            ("context_codes[]", format!("course_{}", course_id)),
            ("start_date", start_date.format("%Y-%m-%d").to_string()),
            ("end_date", end_date.format("%Y-%m-%d").to_string()),
        ];
        self.get_all("announcements", &params).await
    }

    /// Assignments of one course (published and, with enough rights, unpublished)
    pub async fn assignments(&self, course_id: u64) -> Result<Vec<Assignment>> {
        self.get_all(&format!("courses/{}/assignments", course_id), &[])
            .await
    }

    /// Modules with their items inlined
    pub async fn modules(&self, course_id: u64) -> Result<Vec<Module>> {
        let mut modules: Vec<Module> = self
            .get_all(
                &format!("courses/{}/modules", course_id),
                &[("include[]", "items".to_string())],
            )
            .await?;

        for module in modules.iter_mut().filter(|m| m.items.is_none()) {
            let items = self
                .get_all(
                    &format!("courses/{}/modules/{}/items", course_id, module.id),
                    &[],
                )
                .await?;
            module.items = Some(items);
        }

        Ok(modules)
    }
}

fn map_status(status: StatusCode, path: &str, body: String) -> Error {
    match status {
        StatusCode::NOT_FOUND => Error::NotFound(path.to_string()),
        StatusCode::UNAUTHORIZED => Error::Unauthorized(body),
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimit(body),
        // Canvas reports throttling as 403 with a fixed body
        StatusCode::FORBIDDEN if body.contains("Rate Limit Exceeded") => Error::RateLimit(body),
        _ => Error::Api {
            message: body,
            status: status.as_u16(),
        },
    }
}

/// Extract the `rel="next"` target from an RFC 8288 `Link` header
fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let target = segments.next()?.trim();
        if !segments.any(|s| s.trim() == r#"rel="next""#) {
            return None;
        }
        target
            .strip_prefix('<')?
            .strip_suffix('>')
            .map(str::to_string)
    })
}
