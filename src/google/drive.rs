//! Google Drive access: transcript folder listing, doc text export, and
//! report creation.
//!
//! Fathom drops call transcripts as Google Docs into a known folder; the
//! post-meeting and prep engines read them from here. Reports go back out
//! the same way, as Docs created from plain text via a multipart upload.

use serde::Deserialize;

use super::{get_valid_access_token, GoogleApiError};
use crate::http::{send_with_retry, RetryPolicy};

const BASE_URL: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const DOC_MIME: &str = "application/vnd.google-apps.document";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub modified_time: Option<String>,
    #[serde(default)]
    pub web_view_link: Option<String>,
}

impl DriveFile {
    pub fn modified_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.modified_time
            .as_deref()
            .and_then(|t| chrono::DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&chrono::Utc))
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Docs in a folder, newest first, optionally limited to files modified
/// after a cutoff.
pub async fn list_folder_docs(
    folder_id: &str,
    modified_after: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<Vec<DriveFile>, GoogleApiError> {
    let token = get_valid_access_token().await?;
    let mut query = format!(
        "'{}' in parents and mimeType = '{}' and trashed = false",
        folder_id, DOC_MIME
    );
    if let Some(cutoff) = modified_after {
        query.push_str(&format!(" and modifiedTime > '{}'", cutoff.to_rfc3339()));
    }

    let client = reqwest::Client::new();
    let mut files = Vec::new();
    let mut page_token: Option<String> = None;
    loop {
        let mut request = client
            .get(format!("{}/files", BASE_URL))
            .bearer_auth(&token)
            .query(&[
                ("q", query.as_str()),
                ("orderBy", "modifiedTime desc"),
                ("fields", "nextPageToken,files(id,name,modifiedTime,webViewLink)"),
                ("pageSize", "100"),
            ]);
        if let Some(ref page) = page_token {
            request = request.query(&[("pageToken", page.as_str())]);
        }
        let resp = send_with_retry(request, &RetryPolicy::default()).await?;
        let parsed: FileListResponse = check(resp).await?.json().await?;
        files.extend(parsed.files);
        match parsed.next_page_token {
            Some(next) => page_token = Some(next),
            None => break,
        }
    }
    Ok(files)
}

/// Metadata for a single file (single-doc post-meeting runs).
pub async fn get_file(file_id: &str) -> Result<DriveFile, GoogleApiError> {
    let token = get_valid_access_token().await?;
    let client = reqwest::Client::new();
    let request = client
        .get(format!("{}/files/{}", BASE_URL, file_id))
        .bearer_auth(&token)
        .query(&[("fields", "id,name,modifiedTime,webViewLink")]);
    let resp = send_with_retry(request, &RetryPolicy::default()).await?;
    Ok(check(resp).await?.json().await?)
}

/// Plain-text contents of a Google Doc.
pub async fn export_doc_text(file_id: &str) -> Result<String, GoogleApiError> {
    let token = get_valid_access_token().await?;
    let client = reqwest::Client::new();
    let request = client
        .get(format!("{}/files/{}/export", BASE_URL, file_id))
        .bearer_auth(&token)
        .query(&[("mimeType", "text/plain")]);
    let resp = send_with_retry(request, &RetryPolicy::default()).await?;
    Ok(check(resp).await?.text().await?)
}

/// Create a Google Doc from plain text inside `folder_id`. Returns the
/// created file with its webViewLink populated.
pub async fn create_doc(
    folder_id: &str,
    title: &str,
    content: &str,
) -> Result<DriveFile, GoogleApiError> {
    let token = get_valid_access_token().await?;
    let metadata = serde_json::json!({
        "name": title,
        "mimeType": DOC_MIME,
        "parents": [folder_id]
    });

    // Multipart upload: metadata part + text part, converted to a Doc.
    let boundary = "gtmops_upload_boundary";
    let body = format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n--{b}\r\nContent-Type: text/plain; charset=UTF-8\r\n\r\n{content}\r\n--{b}--",
        b = boundary,
        meta = metadata,
        content = content
    );

    let client = reqwest::Client::new();
    let request = client
        .post(UPLOAD_URL)
        .bearer_auth(&token)
        .query(&[
            ("uploadType", "multipart"),
            ("fields", "id,name,modifiedTime,webViewLink"),
        ])
        .header(
            "Content-Type",
            format!("multipart/related; boundary={}", boundary),
        )
        .body(body);
    let resp = send_with_retry(request, &RetryPolicy::default()).await?;
    Ok(check(resp).await?.json().await?)
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, GoogleApiError> {
    let status = resp.status();
    if status.as_u16() == 401 {
        return Err(GoogleApiError::AuthExpired);
    }
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(GoogleApiError::ApiError {
            status: status.as_u16(),
            message,
        });
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_list_deserialization() {
        let json = r#"{
            "files": [
                {
                    "id": "1abcDEF",
                    "name": "Acme Staffing - Discovery Call - Aug 27",
                    "modifiedTime": "2026-08-27T16:05:12.000Z",
                    "webViewLink": "https://docs.google.com/document/d/1abcDEF/edit"
                }
            ]
        }"#;
        let parsed: FileListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.files.len(), 1);
        let file = &parsed.files[0];
        assert_eq!(file.id, "1abcDEF");
        assert!(file.modified_at().is_some());
        assert!(parsed.next_page_token.is_none());
    }

    #[test]
    fn test_file_list_carries_page_token() {
        let parsed: FileListResponse =
            serde_json::from_str(r#"{"files": [], "nextPageToken": "tok_2"}"#).unwrap();
        assert_eq!(parsed.next_page_token.as_deref(), Some("tok_2"));
    }

    #[test]
    fn test_modified_at_invalid_timestamp() {
        let file = DriveFile {
            id: "x".to_string(),
            name: "t".to_string(),
            modified_time: Some("not-a-date".to_string()),
            web_view_link: None,
        };
        assert!(file.modified_at().is_none());
    }
}
