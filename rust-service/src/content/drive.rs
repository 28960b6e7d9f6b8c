//! Content source backed by a Google Drive folder of JSON issue files.
//!
//! Files are listed oldest-first by creation time. When every file name
//! carries an embedded numeric sequence (issue-01.json, issue-02.json, ...)
//! that sequence takes precedence over listing order. Completion is a
//! substring marker checked against both the file name and the description
//! and appended to the description on mark-done.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::content::{ContentPayload, ContentSource, PendingIssue, DONE_MARKER};
use crate::google::Authenticator;

const DRIVE_API: &str = "https://www.googleapis.com/drive/v3/files";

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Clone, Deserialize)]
struct DriveFile {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
}

/// Drive-folder content source.
pub struct DriveContentSource {
    http: reqwest::Client,
    auth: Arc<Authenticator>,
    folder_id: String,
}

impl DriveContentSource {
    pub fn new(auth: Arc<Authenticator>, folder_id: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for Drive API")?;

        Ok(Self {
            http,
            auth,
            folder_id,
        })
    }

    async fn list_issue_files(&self) -> Result<Vec<DriveFile>> {
        let token = self.auth.access_token().await?;
        let query = format!(
            "'{}' in parents and mimeType='application/json' and trashed=false",
            self.folder_id
        );

        let list: FileList = self
            .http
            .get(DRIVE_API)
            .bearer_auth(&token)
            .query(&[
                ("q", query.as_str()),
                ("orderBy", "createdTime"),
                ("fields", "files(id,name,description)"),
                ("pageSize", "100"),
            ])
            .send()
            .await
            .context("Drive file list request failed")?
            .error_for_status()
            .context("Drive file list request rejected")?
            .json()
            .await
            .context("Drive file list was not valid JSON")?;

        Ok(list.files)
    }

    async fn download_payload(&self, file_id: &str) -> Result<ContentPayload> {
        let token = self.auth.access_token().await?;
        let url = format!("{}/{}", DRIVE_API, file_id);

        let body = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .query(&[("alt", "media")])
            .send()
            .await
            .context("Drive file download failed")?
            .error_for_status()
            .context("Drive file download rejected")?
            .text()
            .await
            .context("Drive file body could not be read")?;

        serde_json::from_str(&body).context("Issue file is not a valid newsletter payload")
    }
}

#[async_trait]
impl ContentSource for DriveContentSource {
    async fn fetch_next_pending(&self) -> Result<Option<PendingIssue>> {
        let files = order_files(self.list_issue_files().await?);
        debug!(total = files.len(), "drive_issue_files_listed");

        for file in files {
            if is_done(&file.name, &file.description) {
                debug!(name = %file.name, "drive_issue_skipped_done");
                continue;
            }

            let payload = self.download_payload(&file.id).await?;
            info!(name = %file.name, title = %payload.title, "drive_issue_loaded");

            return Ok(Some(PendingIssue {
                file_id: file.id,
                name: file.name,
                annotation: file.description,
                payload,
            }));
        }

        info!("drive_no_pending_issue");
        Ok(None)
    }

    async fn mark_done(&self, issue: &PendingIssue) -> Result<()> {
        let token = self.auth.access_token().await?;
        let url = format!("{}/{}", DRIVE_API, issue.file_id);
        let description = append_marker(&issue.annotation);

        let response = self
            .http
            .patch(&url)
            .bearer_auth(&token)
            .json(&json!({ "description": description }))
            .send()
            .await
            .context("Drive description update failed")?;

        if !response.status().is_success() {
            let status = response.status();
            warn!(name = %issue.name, status = %status, "drive_mark_done_rejected");
            anyhow::bail!("Drive description update rejected with {}", status);
        }

        info!(name = %issue.name, "drive_issue_marked_done");
        Ok(())
    }
}

fn is_done(name: &str, annotation: &str) -> bool {
    name.contains(DONE_MARKER) || annotation.contains(DONE_MARKER)
}

/// Append the completion marker without erasing existing annotation text.
fn append_marker(annotation: &str) -> String {
    if annotation.is_empty() {
        DONE_MARKER.to_string()
    } else {
        format!("{}\n{}", annotation, DONE_MARKER)
    }
}

/// First contiguous digit run in a file name, the issue sequence number.
fn sequence_number(name: &str) -> Option<u64> {
    let digits: String = name
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Order candidate files for selection: ascending by embedded sequence
/// number when every file has one, otherwise the incoming listing order
/// (createdTime ascending).
fn order_files(mut files: Vec<DriveFile>) -> Vec<DriveFile> {
    let sequences: Vec<Option<u64>> = files.iter().map(|f| sequence_number(&f.name)).collect();

    if !files.is_empty() && sequences.iter().all(Option::is_some) {
        files.sort_by_key(|f| sequence_number(&f.name));
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, description: &str) -> DriveFile {
        DriveFile {
            id: format!("id-{}", name),
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    #[test]
    fn test_sequence_number() {
        assert_eq!(sequence_number("issue-07.json"), Some(7));
        assert_eq!(sequence_number("12-arrays.json"), Some(12));
        assert_eq!(sequence_number("latest.json"), None);
    }

    #[test]
    fn test_order_files_by_sequence_when_consistent() {
        let ordered = order_files(vec![
            file("issue-10.json", ""),
            file("issue-2.json", ""),
            file("issue-07.json", ""),
        ]);
        let names: Vec<&str> = ordered.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["issue-2.json", "issue-07.json", "issue-10.json"]);
    }

    #[test]
    fn test_order_files_keeps_listing_order_when_inconsistent() {
        let ordered = order_files(vec![
            file("issue-10.json", ""),
            file("latest.json", ""),
            file("issue-2.json", ""),
        ]);
        let names: Vec<&str> = ordered.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["issue-10.json", "latest.json", "issue-2.json"]);
    }

    #[test]
    fn test_is_done_matches_name_and_annotation() {
        assert!(is_done(&format!("issue-1{}.json", DONE_MARKER), ""));
        assert!(is_done("issue-1.json", &format!("sent early\n{}", DONE_MARKER)));
        assert!(!is_done("issue-1.json", "fresh"));
    }

    #[test]
    fn test_append_marker_preserves_annotation() {
        assert_eq!(append_marker(""), DONE_MARKER);
        let appended = append_marker("reviewed by sam");
        assert!(appended.starts_with("reviewed by sam\n"));
        assert!(appended.ends_with(DONE_MARKER));
    }
}
