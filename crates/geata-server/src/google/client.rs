//! Authenticated HTTP client for the Google REST APIs
//!
//! Injects the bearer token, decodes the Google error envelope, and handles
//! `nextPageToken` pagination. Media uploads and downloads get their own
//! entry points since they do not speak the JSON envelope.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::common::{Error, Result};

/// Google API HTTP client with OAuth token injection.
pub struct GoogleClient {
    client: Client,
    access_token: String,
}

impl GoogleClient {
    pub fn new(access_token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            access_token,
        })
    }

    /// Authenticated GET returning the parsed JSON body.
    pub async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let builder = self
            .client
            .get(url)
            .query(query)
            .bearer_auth(&self.access_token);

        self.execute_request(builder).await
    }

    /// Authenticated GET returning the raw body (media downloads, exports).
    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let response = self
            .client
            .get(url)
            .query(query)
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Error bodies are JSON even on media endpoints.
            let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
            return Err(extract_api_error(&parsed, status));
        }

        Ok(body)
    }

    /// Authenticated POST with a JSON body.
    pub async fn post(&self, url: &str, body: &Value) -> Result<Value> {
        let builder = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(body);

        self.execute_request(builder).await
    }

    /// Authenticated PUT with a JSON body.
    pub async fn put(&self, url: &str, body: &Value) -> Result<Value> {
        let builder = self
            .client
            .put(url)
            .bearer_auth(&self.access_token)
            .json(body);

        self.execute_request(builder).await
    }

    /// Authenticated PATCH with a JSON body.
    pub async fn patch(&self, url: &str, body: &Value) -> Result<Value> {
        let builder = self
            .client
            .patch(url)
            .bearer_auth(&self.access_token)
            .json(body);

        self.execute_request(builder).await
    }

    /// Authenticated DELETE.
    pub async fn delete(&self, url: &str) -> Result<Value> {
        let builder = self.client.delete(url).bearer_auth(&self.access_token);

        self.execute_request(builder).await
    }

    /// Authenticated POST with a raw body and explicit content type
    /// (multipart uploads).
    pub async fn post_upload(&self, url: &str, content_type: &str, body: String) -> Result<Value> {
        let builder = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);

        self.execute_request(builder).await
    }

    /// Authenticated PATCH with a raw body (media content updates).
    pub async fn patch_upload(&self, url: &str, content_type: &str, body: String) -> Result<Value> {
        let builder = self
            .client
            .patch(url)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);

        self.execute_request(builder).await
    }

    /// Execute a request and decode Google API response conventions.
    async fn execute_request(&self, builder: RequestBuilder) -> Result<Value> {
        debug!("executing Google API request");

        let response = builder.send().await?;
        let status = response.status();
        debug!(%status, "response received");

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("rate limited by Google API");
            return Err(Error::RateLimited);
        }

        let body = response.text().await?;

        // Empty successful responses (e.g., DELETE)
        if status.is_success() && body.is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }

        let parsed: Value = match serde_json::from_str(&body) {
            Ok(v) => v,
            Err(e) if status.is_success() => {
                return Err(Error::Api {
                    status: status.as_u16(),
                    message: format!("unparseable response body: {e}"),
                })
            }
            Err(_) => Value::Null,
        };

        if !status.is_success() {
            let err = extract_api_error(&parsed, status);
            error!(error = %err, "Google API call failed");
            return Err(err);
        }

        Ok(parsed)
    }

    /// Follow `nextPageToken` pages, collecting items up to `max_results`.
    pub async fn get_paginated(
        &self,
        url: &str,
        base_query: &[(&str, String)],
        item_field: &str,
        max_results: Option<usize>,
    ) -> Result<Vec<Value>> {
        let mut all_items = Vec::new();
        let mut page_token: Option<String> = None;
        let wanted = max_results.unwrap_or(usize::MAX);

        loop {
            let mut query = base_query.to_vec();
            if let Some(ref token) = page_token {
                query.push(("pageToken", token.clone()));
            }
            if let Some(max) = max_results {
                query.push(("maxResults", max.to_string()));
            }

            let response = self.get(url, &query).await?;

            if let Some(items) = response.get(item_field).and_then(|v| v.as_array()) {
                all_items.extend(items.clone());

                if all_items.len() >= wanted {
                    all_items.truncate(wanted);
                    break;
                }
            }

            match response.get("nextPageToken").and_then(|v| v.as_str()) {
                Some(next) => page_token = Some(next.to_string()),
                None => break,
            }
        }

        Ok(all_items)
    }
}

/// Decode the Google API error envelope:
/// `{"error": {"code": 400, "message": "...", "errors": [...]}}`
fn extract_api_error(response: &Value, status: StatusCode) -> Error {
    if let Some(error_obj) = response.get("error") {
        if let Some(message) = error_obj.get("message").and_then(|v| v.as_str()) {
            let code = error_obj
                .get("code")
                .and_then(|v| v.as_i64())
                .unwrap_or(status.as_u16() as i64);

            return Error::Api {
                status: code as u16,
                message: message.to_string(),
            };
        }
    }

    Error::Api {
        status: status.as_u16(),
        message: status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_api_error_with_envelope() {
        let error_response = serde_json::json!({
            "error": {
                "code": 403,
                "message": "Insufficient permissions"
            }
        });

        let err = extract_api_error(&error_response, StatusCode::FORBIDDEN);
        match err {
            Error::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Insufficient permissions");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_extract_api_error_without_envelope() {
        let err = extract_api_error(&Value::Null, StatusCode::BAD_GATEWAY);
        match err {
            Error::Api { status, .. } => assert_eq!(status, 502),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
