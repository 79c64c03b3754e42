//! Google Drive API v3 Client
//!
//! File listing, content retrieval (with Docs/Sheets export), creation via
//! multipart upload, content updates, trash/delete, and sharing.

use serde_json::{json, Value};
use tracing::{debug, info};

use super::client::GoogleClient;
use super::common::extract_array;
use crate::common::{Error, Result};

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Prefix shared by all native Google document types.
const GOOGLE_APPS_PREFIX: &str = "application/vnd.google-apps";

/// Boundary for multipart/related uploads.
const UPLOAD_BOUNDARY: &str = "geata_upload_boundary";

pub struct DriveApi {
    client: GoogleClient,
}

super::google_api_wrapper!(DriveApi);

impl DriveApi {
    /// List files matching a Drive query.
    pub async fn list_files(
        &self,
        query: Option<&str>,
        page_size: usize,
        order_by: Option<&str>,
        fields: Option<&str>,
    ) -> Result<Vec<Value>> {
        info!("listing Drive files");

        let query_params = vec![
            ("q", query.unwrap_or("trashed = false").to_string()),
            ("pageSize", page_size.to_string()),
            ("orderBy", order_by.unwrap_or("modifiedTime desc").to_string()),
            (
                "fields",
                fields
                    .unwrap_or("files(id, name, mimeType, modifiedTime, size, webViewLink)")
                    .to_string(),
            ),
        ];

        let url = format!("{DRIVE_API_BASE}/files");
        let response = self.client.get(&url, &query_params).await?;

        let files = extract_array(&response, "files");
        debug!(count = files.len(), "files retrieved");
        Ok(files)
    }

    /// Fetch selected metadata fields for one file.
    pub async fn get_file_metadata(&self, file_id: &str, fields: &str) -> Result<Value> {
        let url = format!("{DRIVE_API_BASE}/files/{file_id}");
        self.client
            .get(&url, &[("fields", fields.to_string())])
            .await
    }

    /// Retrieve a file's content as text: plain media download for text-like
    /// types, export for native Google documents, metadata-only description
    /// for anything opaque.
    pub async fn get_file_content(&self, file_id: &str) -> Result<String> {
        info!(file_id, "fetching Drive file content");

        let metadata = self.get_file_metadata(file_id, "name,mimeType").await?;
        let name = metadata.get("name").and_then(|v| v.as_str()).unwrap_or("");
        let mime_type = metadata
            .get("mimeType")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        if is_text_mime(mime_type) {
            let url = format!("{DRIVE_API_BASE}/files/{file_id}");
            let content = self
                .client
                .get_text(&url, &[("alt", "media".to_string())])
                .await?;
            return Ok(format!("File: {name}\nContent:\n\n{content}"));
        }

        if mime_type == "application/vnd.google-apps.document"
            || mime_type == "application/vnd.google-apps.spreadsheet"
        {
            let export_mime = if mime_type == "application/vnd.google-apps.spreadsheet" {
                "text/csv"
            } else {
                "text/plain"
            };

            let url = format!("{DRIVE_API_BASE}/files/{file_id}/export");
            let content = self
                .client
                .get_text(&url, &[("mimeType", export_mime.to_string())])
                .await?;
            return Ok(format!(
                "File: {name}\nContent (exported as {export_mime}):\n\n{content}"
            ));
        }

        Ok(format!(
            "File: {name}\nType: {mime_type}\nThis file type cannot be displayed as text. \
             You can access it via Google Drive directly."
        ))
    }

    /// Create a file. Native Google types get a bare metadata create; regular
    /// files upload metadata and content in one multipart request.
    pub async fn create_file(
        &self,
        name: &str,
        content: &str,
        mime_type: &str,
        folder_id: Option<&str>,
    ) -> Result<Value> {
        info!(name, mime_type, "creating Drive file");

        let mut metadata = json!({ "name": name });
        if let Some(folder) = folder_id {
            metadata["parents"] = json!([folder]);
        }

        if mime_type.starts_with(GOOGLE_APPS_PREFIX) {
            metadata["mimeType"] = json!(mime_type);
            let url = format!("{DRIVE_API_BASE}/files?fields=id,name,webViewLink");
            return self.client.post(&url, &metadata).await;
        }

        let body = multipart_body(&metadata, mime_type, content)?;
        let url = format!(
            "{DRIVE_UPLOAD_BASE}/files?uploadType=multipart&fields=id,name,webViewLink"
        );
        let content_type = format!("multipart/related; boundary={UPLOAD_BOUNDARY}");

        let response = self.client.post_upload(&url, &content_type, body).await?;
        info!("file created");
        Ok(response)
    }

    /// Replace a regular file's content. Native Google document types are
    /// rejected; their content is not writable through the media endpoint.
    pub async fn update_file_content(
        &self,
        file_id: &str,
        content: &str,
        mime_type: Option<&str>,
    ) -> Result<Value> {
        info!(file_id, "updating Drive file content");

        let metadata = self.get_file_metadata(file_id, "name,mimeType").await?;
        let current_mime = metadata
            .get("mimeType")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        if current_mime.starts_with(GOOGLE_APPS_PREFIX) {
            return Err(Error::InvalidArgs(format!(
                "updating {current_mime} content is not supported; use the Google Drive web interface"
            )));
        }

        let url = format!("{DRIVE_UPLOAD_BASE}/files/{file_id}?uploadType=media&fields=id,name");
        let content_type = mime_type.map(String::from).unwrap_or(current_mime);

        self.client
            .patch_upload(&url, &content_type, content.to_string())
            .await
    }

    /// Move a file to trash.
    pub async fn trash_file(&self, file_id: &str) -> Result<Value> {
        info!(file_id, "trashing Drive file");

        let url = format!("{DRIVE_API_BASE}/files/{file_id}");
        self.client.patch(&url, &json!({ "trashed": true })).await
    }

    /// Permanently delete a file.
    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        info!(file_id, "deleting Drive file permanently");

        let url = format!("{DRIVE_API_BASE}/files/{file_id}");
        self.client.delete(&url).await?;
        Ok(())
    }

    /// Share a file with one user. Returns the shared file's name.
    pub async fn share_file(
        &self,
        file_id: &str,
        email_address: &str,
        role: &str,
        send_notification: bool,
        message: Option<&str>,
    ) -> Result<String> {
        info!(file_id, role, "sharing Drive file");

        let mut url = format!(
            "{DRIVE_API_BASE}/files/{file_id}/permissions?sendNotificationEmail={send_notification}"
        );
        if let Some(msg) = message {
            url.push_str(&format!("&emailMessage={}", urlencoding::encode(msg)));
        }

        let body = json!({
            "type": "user",
            "role": role,
            "emailAddress": email_address,
        });
        self.client.post(&url, &body).await?;

        let metadata = self.get_file_metadata(file_id, "name").await?;
        Ok(metadata
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(file_id)
            .to_string())
    }
}

/// MIME types served directly as text.
fn is_text_mime(mime_type: &str) -> bool {
    mime_type == "application/json"
        || mime_type.starts_with("text/")
        || mime_type.contains("application/javascript")
}

/// Build a multipart/related body carrying metadata JSON and file content.
fn multipart_body(metadata: &Value, mime_type: &str, content: &str) -> Result<String> {
    let metadata_json = serde_json::to_string(metadata)?;
    Ok(format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata_json}\r\n\
         --{b}\r\nContent-Type: {mime_type}\r\n\r\n{content}\r\n--{b}--",
        b = UPLOAD_BOUNDARY
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_text_mime() {
        assert!(is_text_mime("text/plain"));
        assert!(is_text_mime("text/markdown"));
        assert!(is_text_mime("application/json"));
        assert!(is_text_mime("application/javascript"));
        assert!(!is_text_mime("application/pdf"));
        assert!(!is_text_mime("application/vnd.google-apps.document"));
    }

    #[test]
    fn test_multipart_body_structure() {
        let metadata = json!({ "name": "notes.txt" });
        let body = multipart_body(&metadata, "text/plain", "hello").unwrap();

        assert!(body.starts_with(&format!("--{UPLOAD_BOUNDARY}\r\n")));
        assert!(body.ends_with(&format!("--{UPLOAD_BOUNDARY}--")));
        assert!(body.contains("Content-Type: application/json; charset=UTF-8"));
        assert!(body.contains(r#"{"name":"notes.txt"}"#));
        assert!(body.contains("Content-Type: text/plain\r\n\r\nhello"));
    }
}
