//! Subscriber list adapter backed by the Google Sheets v4 API.
//!
//! The dispatch workflow sees the narrow [`RecipientStore`] trait; the
//! concrete [`SheetsClient`] additionally carries the single-row operations
//! the adjacent subscribe/verify/unsubscribe flows need.

pub mod schema;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::google::Authenticator;
use crate::sheet::schema::{column_letter, SheetSchema};

/// Value written into the send-marker column once a recipient got this
/// cycle's email.
pub const MARKER_SENT: &str = "sent";

/// Verification statuses that make a subscriber eligible for dispatch.
pub const ALLOWED_STATUSES: [&str; 2] = ["verified", "done"];

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// One subscriber row.
#[derive(Debug, Clone)]
pub struct RecipientRecord {
    /// 1-based sheet row number, including the header row
    pub row: usize,
    pub email: String,
    /// Verification status cell, `None` when the column is absent or empty
    pub status: Option<String>,
    /// Send-marker cell, empty until this cycle's email went out
    pub marker: String,
    /// ISO subscription date, if recorded
    pub subscribed_at: Option<String>,
}

impl RecipientRecord {
    /// A recipient is eligible for one dispatch cycle iff the send marker
    /// is empty and the verification status is in the allow-set.
    pub fn is_eligible(&self) -> bool {
        if self.email.trim().is_empty() || !self.marker.trim().is_empty() {
            return false;
        }
        match self.status.as_deref().map(str::trim) {
            Some(status) => ALLOWED_STATUSES.contains(&status),
            None => false,
        }
    }
}

/// Read/update access to the subscriber list, as the Dispatcher needs it.
#[async_trait]
pub trait RecipientStore: Send + Sync {
    /// List all subscriber rows in store order.
    async fn list_recipients(&self) -> Result<Vec<RecipientRecord>>;

    /// Set the send marker for exactly one record. Writing the same value
    /// twice is a no-op, so a lost-response retry cannot double-mark.
    async fn mark_sent(&self, record: &RecipientRecord) -> Result<()>;
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    #[serde(rename = "sheetId")]
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Clone)]
struct TabInfo {
    gid: i64,
    title: String,
}

// =============================================================================
// Sheets client
// =============================================================================

/// Google Sheets client for the subscriber spreadsheet.
pub struct SheetsClient {
    http: reqwest::Client,
    auth: Arc<Authenticator>,
    spreadsheet_id: String,
    marker_column: String,
    status_column: String,
    tab: Mutex<Option<TabInfo>>,
    schema: Mutex<Option<SheetSchema>>,
}

impl SheetsClient {
    pub fn new(
        auth: Arc<Authenticator>,
        spreadsheet_id: String,
        marker_column: String,
        status_column: String,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for Sheets API")?;

        Ok(Self {
            http,
            auth,
            spreadsheet_id,
            marker_column,
            status_column,
            tab: Mutex::new(None),
            schema: Mutex::new(None),
        })
    }

    /// First tab of the spreadsheet (title + numeric grid id), cached after
    /// the first metadata fetch.
    async fn tab(&self) -> Result<TabInfo> {
        let mut cached = self.tab.lock().await;
        if let Some(tab) = cached.as_ref() {
            return Ok(tab.clone());
        }

        let token = self.auth.access_token().await?;
        let url = format!(
            "{}/{}?fields=sheets(properties(sheetId,title))",
            SHEETS_API, self.spreadsheet_id
        );

        let meta: SpreadsheetMeta = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .context("Spreadsheet metadata request failed")?
            .error_for_status()
            .context("Spreadsheet metadata request rejected")?
            .json()
            .await
            .context("Spreadsheet metadata was not valid JSON")?;

        let first = meta
            .sheets
            .into_iter()
            .next()
            .context("Spreadsheet has no sheets")?;

        let tab = TabInfo {
            gid: first.properties.sheet_id,
            title: first.properties.title,
        };
        debug!(title = %tab.title, gid = tab.gid, "sheet_tab_resolved");

        *cached = Some(tab.clone());
        Ok(tab)
    }

    /// Read the whole table: header row resolved into a schema, data rows
    /// into records. Store order is preserved.
    async fn read_table(&self) -> Result<(SheetSchema, Vec<RecipientRecord>)> {
        let tab = self.tab().await?;
        let token = self.auth.access_token().await?;
        let url = format!(
            "{}/{}/values/{}",
            SHEETS_API,
            self.spreadsheet_id,
            urlencode(&tab.title)
        );

        let range: ValueRange = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .context("Sheet values request failed")?
            .error_for_status()
            .context("Sheet values request rejected")?
            .json()
            .await
            .context("Sheet values were not valid JSON")?;

        let mut rows = range.values.into_iter();
        let headers = rows.next().context("Sheet has no header row")?;
        let schema = SheetSchema::resolve(&headers, &self.marker_column, &self.status_column)?;
        *self.schema.lock().await = Some(schema.clone());

        let records = rows
            .enumerate()
            .map(|(i, row)| RecipientRecord {
                // +2: rows are 1-based and the header occupies row 1
                row: i + 2,
                email: SheetSchema::cell(&row, schema.email).unwrap_or_default().to_string(),
                status: SheetSchema::cell(&row, schema.status.unwrap_or(usize::MAX))
                    .filter(|s| !s.trim().is_empty())
                    .map(str::to_string),
                marker: SheetSchema::cell(&row, schema.marker).unwrap_or_default().to_string(),
                subscribed_at: SheetSchema::cell(&row, schema.date.unwrap_or(usize::MAX))
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            })
            .collect();

        Ok((schema, records))
    }

    /// Resolved schema, from the last full read or a header-only fetch.
    async fn schema(&self) -> Result<SheetSchema> {
        if let Some(schema) = self.schema.lock().await.as_ref() {
            return Ok(schema.clone());
        }

        let tab = self.tab().await?;
        let token = self.auth.access_token().await?;
        let url = format!(
            "{}/{}/values/{}",
            SHEETS_API,
            self.spreadsheet_id,
            urlencode(&format!("{}!1:1", tab.title))
        );

        let range: ValueRange = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .context("Header row request failed")?
            .error_for_status()
            .context("Header row request rejected")?
            .json()
            .await
            .context("Header row was not valid JSON")?;

        let headers = range
            .values
            .into_iter()
            .next()
            .context("Sheet has no header row")?;
        let schema = SheetSchema::resolve(&headers, &self.marker_column, &self.status_column)?;

        *self.schema.lock().await = Some(schema.clone());
        Ok(schema)
    }

    /// Write a single cell in A1 notation.
    async fn write_cell(&self, column: usize, row: usize, value: &str) -> Result<()> {
        let tab = self.tab().await?;
        let token = self.auth.access_token().await?;
        let a1 = format!("{}!{}{}", tab.title, column_letter(column), row);
        let url = format!(
            "{}/{}/values/{}?valueInputOption=RAW",
            SHEETS_API,
            self.spreadsheet_id,
            urlencode(&a1)
        );

        self.http
            .put(&url)
            .bearer_auth(&token)
            .json(&json!({ "range": a1, "values": [[value]] }))
            .send()
            .await
            .context("Cell update request failed")?
            .error_for_status()
            .context("Cell update request rejected")?;

        Ok(())
    }

    /// Find a subscriber row by case-insensitive email.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<(SheetSchema, RecipientRecord)>> {
        let needle = email.trim().to_lowercase();
        let (schema, records) = self.read_table().await?;
        let found = records
            .into_iter()
            .find(|r| r.email.trim().to_lowercase() == needle);
        Ok(found.map(|r| (schema, r)))
    }

    /// Set the verification status cell for one row.
    pub async fn set_status(&self, schema: &SheetSchema, row: usize, value: &str) -> Result<()> {
        let column = schema
            .status
            .with_context(|| format!("sheet has no {:?} column", self.status_column))?;
        self.write_cell(column, row, value).await
    }

    /// Delete one subscriber row.
    pub async fn delete_row(&self, row: usize) -> Result<()> {
        let tab = self.tab().await?;
        let token = self.auth.access_token().await?;
        let url = format!("{}/{}:batchUpdate", SHEETS_API, self.spreadsheet_id);

        self.http
            .post(&url)
            .bearer_auth(&token)
            .json(&json!({
                "requests": [{
                    "deleteDimension": {
                        "range": {
                            "sheetId": tab.gid,
                            "dimension": "ROWS",
                            "startIndex": row - 1,
                            "endIndex": row
                        }
                    }
                }]
            }))
            .send()
            .await
            .context("Row delete request failed")?
            .error_for_status()
            .context("Row delete request rejected")?;

        info!(row = row, "sheet_row_deleted");
        Ok(())
    }

    /// Append a new subscriber row aligned to the live schema: email, ISO
    /// date when a date column exists, `pending` verification when a status
    /// column exists.
    pub async fn append_subscriber(&self, email: &str) -> Result<()> {
        let tab = self.tab().await?;
        let token = self.auth.access_token().await?;
        let schema = self.schema().await?;

        let mut row = vec![String::new(); schema.width];
        row[schema.email] = email.trim().to_string();
        if let Some(date) = schema.date {
            row[date] = chrono::Utc::now().to_rfc3339();
        }
        if let Some(status) = schema.status {
            row[status] = "pending".to_string();
        }

        let url = format!(
            "{}/{}/values/{}:append?valueInputOption=USER_ENTERED&insertDataOption=INSERT_ROWS",
            SHEETS_API,
            self.spreadsheet_id,
            urlencode(&tab.title)
        );

        self.http
            .post(&url)
            .bearer_auth(&token)
            .json(&json!({ "values": [row] }))
            .send()
            .await
            .context("Row append request failed")?
            .error_for_status()
            .context("Row append request rejected")?;

        info!(email = %email, "subscriber_row_appended");
        Ok(())
    }
}

#[async_trait]
impl RecipientStore for SheetsClient {
    async fn list_recipients(&self) -> Result<Vec<RecipientRecord>> {
        let (_, records) = self.read_table().await?;
        Ok(records)
    }

    async fn mark_sent(&self, record: &RecipientRecord) -> Result<()> {
        let schema = self.schema().await?;
        self.write_cell(schema.marker, record.row, MARKER_SENT).await
    }
}

/// Characters encoded in the path segment of an A1 range: everything except
/// the unreserved set plus `!` (title/range separator) and `:` (row ranges).
const A1_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'!')
    .remove(b':');

fn urlencode(segment: &str) -> String {
    utf8_percent_encode(segment, A1_SEGMENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(email: &str, status: Option<&str>, marker: &str) -> RecipientRecord {
        RecipientRecord {
            row: 2,
            email: email.to_string(),
            status: status.map(str::to_string),
            marker: marker.to_string(),
            subscribed_at: None,
        }
    }

    #[test]
    fn test_eligible_verified_unmarked() {
        assert!(record("a@example.com", Some("verified"), "").is_eligible());
        assert!(record("a@example.com", Some("done"), "").is_eligible());
    }

    #[test]
    fn test_ineligible_when_marked() {
        assert!(!record("a@example.com", Some("verified"), "sent").is_eligible());
    }

    #[test]
    fn test_ineligible_when_unverified() {
        assert!(!record("a@example.com", Some("pending"), "").is_eligible());
        assert!(!record("a@example.com", None, "").is_eligible());
    }

    #[test]
    fn test_ineligible_when_email_empty() {
        assert!(!record("", Some("verified"), "").is_eligible());
        assert!(!record("   ", Some("verified"), "").is_eligible());
    }

    #[test]
    fn test_status_is_trimmed() {
        assert!(record("a@example.com", Some(" verified "), "").is_eligible());
    }

    #[test]
    fn test_urlencode_sheet_title() {
        assert_eq!(urlencode("Sheet1"), "Sheet1");
        assert_eq!(urlencode("Sub List!A1"), "Sub%20List!A1");
        assert_eq!(urlencode("Sheet1!1:1"), "Sheet1!1:1");
    }
}
