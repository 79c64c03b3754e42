//! Gmail API v1 Client
//!
//! List/search messages, fetch message details, send and draft mail, manage
//! labels. Outgoing mail is assembled as RFC 2822 text and base64url-encoded
//! into the API's `raw` field.

use base64::{engine::general_purpose, Engine};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::client::GoogleClient;
use super::common::{extract_array, header_value};
use crate::common::Result;

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

/// Message body preview cap when rendering a full message.
const BODY_PREVIEW_CHARS: usize = 1500;

pub struct GmailApi {
    client: GoogleClient,
}

super::google_api_wrapper!(GmailApi);

/// Per-message summary assembled from a metadata fetch.
#[derive(Debug, Clone)]
pub struct MessageSummary {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub date: String,
    pub snippet: String,
}

impl GmailApi {
    /// List all labels.
    pub async fn list_labels(&self) -> Result<Vec<Value>> {
        info!("listing Gmail labels");

        let url = format!("{GMAIL_API_BASE}/users/me/labels");
        let response = self.client.get(&url, &[]).await?;

        let labels = extract_array(&response, "labels");
        debug!(count = labels.len(), "labels retrieved");
        Ok(labels)
    }

    /// List messages matching a query, with subject/from/date resolved via a
    /// metadata fetch per message.
    pub async fn list_messages(
        &self,
        query: Option<&str>,
        label_ids: Option<&[String]>,
        max_results: usize,
    ) -> Result<Vec<MessageSummary>> {
        info!("listing Gmail messages");

        let mut query_params = vec![("maxResults", max_results.to_string())];
        if let Some(q) = query {
            query_params.push(("q", q.to_string()));
        }
        if let Some(labels) = label_ids {
            for label in labels {
                query_params.push(("labelIds", label.clone()));
            }
        }

        let url = format!("{GMAIL_API_BASE}/users/me/messages");
        let response = self.client.get(&url, &query_params).await?;
        let ids = extract_array(&response, "messages");

        let mut summaries = Vec::with_capacity(ids.len());
        for entry in &ids {
            let Some(id) = entry.get("id").and_then(|v| v.as_str()) else {
                continue;
            };

            let detail_url = format!("{GMAIL_API_BASE}/users/me/messages/{id}");
            let detail = self
                .client
                .get(
                    &detail_url,
                    &[
                        ("format", "metadata".to_string()),
                        ("metadataHeaders", "Subject".to_string()),
                        ("metadataHeaders", "From".to_string()),
                        ("metadataHeaders", "Date".to_string()),
                    ],
                )
                .await?;

            let headers = detail
                .pointer("/payload/headers")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();

            summaries.push(MessageSummary {
                id: id.to_string(),
                subject: header_value(&headers, "Subject")
                    .unwrap_or("(No subject)")
                    .to_string(),
                from: header_value(&headers, "From").unwrap_or_default().to_string(),
                date: header_value(&headers, "Date").unwrap_or_default().to_string(),
                snippet: detail
                    .get("snippet")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            });
        }

        debug!(count = summaries.len(), "messages retrieved");
        Ok(summaries)
    }

    /// Get a message by ID. `format` is one of full/metadata/minimal/raw.
    pub async fn get_message(&self, id: &str, format: Option<&str>) -> Result<Value> {
        info!(message_id = id, "fetching Gmail message");

        let mut query_params = vec![];
        if let Some(fmt) = format {
            query_params.push(("format", fmt.to_string()));
        }

        let url = format!("{GMAIL_API_BASE}/users/me/messages/{id}");
        self.client.get(&url, &query_params).await
    }

    /// Send an email.
    pub async fn send_message(
        &self,
        to: &[String],
        subject: &str,
        body: &str,
        cc: Option<&[String]>,
        bcc: Option<&[String]>,
        is_html: bool,
    ) -> Result<Value> {
        info!(recipients = to.len(), "sending Gmail message");

        let raw = base64_url_encode(build_rfc2822(to, subject, body, cc, bcc, is_html).as_bytes());
        let request_body = json!({ "raw": raw });

        let url = format!("{GMAIL_API_BASE}/users/me/messages/send");
        let response = self.client.post(&url, &request_body).await?;

        info!("message sent");
        Ok(response)
    }

    /// Create a draft without sending it.
    pub async fn create_draft(
        &self,
        to: &[String],
        subject: &str,
        body: &str,
        cc: Option<&[String]>,
        bcc: Option<&[String]>,
        is_html: bool,
    ) -> Result<Value> {
        info!(recipients = to.len(), "creating Gmail draft");

        let raw = base64_url_encode(build_rfc2822(to, subject, body, cc, bcc, is_html).as_bytes());
        let request_body = json!({ "message": { "raw": raw } });

        let url = format!("{GMAIL_API_BASE}/users/me/drafts");
        let response = self.client.post(&url, &request_body).await?;

        info!("draft created");
        Ok(response)
    }

    /// Move a message to trash.
    pub async fn trash_message(&self, message_id: &str) -> Result<Value> {
        info!(message_id, "trashing message");

        let url = format!("{GMAIL_API_BASE}/users/me/messages/{message_id}/trash");
        self.client.post(&url, &json!({})).await
    }

    /// Permanently delete a message.
    pub async fn delete_message(&self, message_id: &str) -> Result<()> {
        info!(message_id, "deleting message permanently");

        let url = format!("{GMAIL_API_BASE}/users/me/messages/{message_id}");
        self.client.delete(&url).await?;
        Ok(())
    }

    /// Add and/or remove labels on a message.
    pub async fn modify_labels(
        &self,
        message_id: &str,
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<Value> {
        info!(message_id, "modifying message labels");

        let body = json!({
            "addLabelIds": add_label_ids,
            "removeLabelIds": remove_label_ids,
        });

        let url = format!("{GMAIL_API_BASE}/users/me/messages/{message_id}/modify");
        self.client.post(&url, &body).await
    }
}

/// Assemble an RFC 2822 message.
fn build_rfc2822(
    to: &[String],
    subject: &str,
    body: &str,
    cc: Option<&[String]>,
    bcc: Option<&[String]>,
    is_html: bool,
) -> String {
    let mut lines = vec![format!("To: {}", to.join(", "))];

    if let Some(cc_addrs) = cc {
        if !cc_addrs.is_empty() {
            lines.push(format!("Cc: {}", cc_addrs.join(", ")));
        }
    }
    if let Some(bcc_addrs) = bcc {
        if !bcc_addrs.is_empty() {
            lines.push(format!("Bcc: {}", bcc_addrs.join(", ")));
        }
    }

    lines.push(format!("Subject: {subject}"));
    lines.push(format!(
        "Content-Type: {}; charset=utf-8",
        if is_html { "text/html" } else { "text/plain" }
    ));
    lines.push(String::new()); // blank line separates headers from body
    lines.push(body.to_string());

    lines.join("\r\n")
}

/// Render a fetched message as human-readable text: common headers, labels,
/// snippet, and a capped body preview.
pub fn render_message(message: &Value) -> String {
    let headers = message
        .pointer("/payload/headers")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    let subject = header_value(&headers, "Subject").unwrap_or("(No subject)");
    let from = header_value(&headers, "From").unwrap_or_default();
    let to = header_value(&headers, "To").unwrap_or_default();
    let date = header_value(&headers, "Date").unwrap_or_default();

    let labels = message
        .get("labelIds")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    let snippet = message.get("snippet").and_then(|v| v.as_str()).unwrap_or_default();

    let body = message
        .get("payload")
        .map(extract_body)
        .unwrap_or_default();
    let truncated = body.len() > BODY_PREVIEW_CHARS;
    let preview: String = body.chars().take(BODY_PREVIEW_CHARS).collect();

    format!(
        "Subject: {subject}\nFrom: {from}\nTo: {to}\nDate: {date}\nLabels: {labels}\n\nSnippet: {snippet}\n\nBody: \n{preview}{}",
        if truncated { "... (truncated)" } else { "" }
    )
}

/// Pull a text body out of a message payload, preferring text/plain over
/// text/html in multipart messages.
pub fn extract_body(payload: &Value) -> String {
    if let Some(parts) = payload.get("parts").and_then(|v| v.as_array()) {
        let mut html_fallback = String::new();
        for part in parts {
            let mime = part.get("mimeType").and_then(|v| v.as_str()).unwrap_or("");
            let data = part.pointer("/body/data").and_then(|v| v.as_str());

            match (mime, data) {
                ("text/plain", Some(data)) => {
                    if let Some(text) = decode_body_data(data) {
                        return text;
                    }
                }
                ("text/html", Some(data)) => {
                    if let Some(text) = decode_body_data(data) {
                        html_fallback = text;
                    }
                }
                _ => {}
            }
        }
        return html_fallback;
    }

    payload
        .pointer("/body/data")
        .and_then(|v| v.as_str())
        .and_then(decode_body_data)
        .unwrap_or_default()
}

/// Gmail body data is base64url without padding, but some producers pad or
/// use the standard alphabet.
fn decode_body_data(data: &str) -> Option<String> {
    general_purpose::URL_SAFE_NO_PAD
        .decode(data)
        .or_else(|_| general_purpose::URL_SAFE.decode(data))
        .or_else(|_| general_purpose::STANDARD.decode(data))
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Base64url encode (no padding) per RFC 4648 §5
fn base64_url_encode(data: &[u8]) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_url_encode() {
        let encoded = base64_url_encode(b"Hello, World!");
        assert!(!encoded.contains('='));
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
    }

    #[test]
    fn test_build_rfc2822_plain_text() {
        let raw = build_rfc2822(
            &["a@example.com".to_string()],
            "Hi",
            "body text",
            None,
            None,
            false,
        );
        assert!(raw.starts_with("To: a@example.com\r\n"));
        assert!(raw.contains("Subject: Hi\r\n"));
        assert!(raw.contains("Content-Type: text/plain; charset=utf-8"));
        assert!(raw.ends_with("\r\n\r\nbody text"));
        assert!(!raw.contains("Cc:"));
    }

    #[test]
    fn test_build_rfc2822_html_with_cc() {
        let raw = build_rfc2822(
            &["a@example.com".to_string()],
            "Hi",
            "<b>body</b>",
            Some(&["c@example.com".to_string()]),
            None,
            true,
        );
        assert!(raw.contains("Cc: c@example.com\r\n"));
        assert!(raw.contains("Content-Type: text/html; charset=utf-8"));
    }

    #[test]
    fn test_extract_body_prefers_plain_text() {
        let payload = serde_json::json!({
            "parts": [
                { "mimeType": "text/html", "body": { "data": base64_url_encode(b"<b>html</b>") } },
                { "mimeType": "text/plain", "body": { "data": base64_url_encode(b"plain") } }
            ]
        });
        assert_eq!(extract_body(&payload), "plain");
    }

    #[test]
    fn test_extract_body_falls_back_to_html() {
        let payload = serde_json::json!({
            "parts": [
                { "mimeType": "text/html", "body": { "data": base64_url_encode(b"<b>html</b>") } }
            ]
        });
        assert_eq!(extract_body(&payload), "<b>html</b>");
    }

    #[test]
    fn test_extract_body_simple_message() {
        let payload = serde_json::json!({
            "body": { "data": base64_url_encode(b"simple body") }
        });
        assert_eq!(extract_body(&payload), "simple body");
    }

    #[test]
    fn test_render_message_truncates_long_bodies() {
        let long_body = "x".repeat(BODY_PREVIEW_CHARS + 100);
        let message = serde_json::json!({
            "snippet": "snip",
            "labelIds": ["INBOX", "UNREAD"],
            "payload": {
                "headers": [
                    { "name": "Subject", "value": "Long one" },
                    { "name": "From", "value": "a@example.com" }
                ],
                "body": { "data": base64_url_encode(long_body.as_bytes()) }
            }
        });

        let rendered = render_message(&message);
        assert!(rendered.contains("Subject: Long one"));
        assert!(rendered.contains("Labels: INBOX, UNREAD"));
        assert!(rendered.ends_with("... (truncated)"));
    }
}
