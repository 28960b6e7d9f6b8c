//! The dispatch workflow.
//!
//! One invocation walks a fixed sequence: validate configuration, acquire
//! the next pending issue, list and filter recipients, send sequentially,
//! then finalize by marking the issue done. Failures before the sending
//! phase are fatal for the invocation; anything after that point is
//! absorbed into the returned counts, because sends already happened and
//! cannot be rolled back.
//!
//! Ordering invariant: the issue's completion marker is written only after
//! the send phase. A crash mid-batch leaves the issue unmarked, so the next
//! invocation re-fetches it and skips recipients whose send marker already
//! stuck.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use url::Url;

use crate::config::Config;
use crate::content::drive::DriveContentSource;
use crate::content::ContentSource;
use crate::google::Authenticator;
use crate::mailer::{Mailer, OutboundEmail, SmtpMailer};
use crate::render::enrich::{Enricher, HttpImageService};
use crate::render::{render_email, SUBJECT, TEXT_FALLBACK};
use crate::sheet::{RecipientStore, SheetsClient};
use crate::token;

/// Result of one dispatch invocation.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// No unprocessed issue in the content store; nothing was sent and the
    /// recipient store was never contacted. A normal outcome.
    NoContent,
    /// An issue was processed (possibly to an empty audience).
    Completed(DispatchReport),
}

/// Counters for one processed issue.
#[derive(Debug)]
pub struct DispatchReport {
    /// Human-readable name of the processed issue file
    pub issue: String,
    /// Eligible recipients selected into the batch
    pub selected: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Orchestrates one dispatch invocation over injected adapters.
pub struct Dispatcher<'a> {
    store: &'a dyn RecipientStore,
    content: &'a dyn ContentSource,
    mailer: &'a dyn Mailer,
    enricher: &'a Enricher,
    base_url: &'a Url,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        store: &'a dyn RecipientStore,
        content: &'a dyn ContentSource,
        mailer: &'a dyn Mailer,
        enricher: &'a Enricher,
        base_url: &'a Url,
    ) -> Self {
        Self {
            store,
            content,
            mailer,
            enricher,
            base_url,
        }
    }

    /// Run one dispatch cycle with the given batch cap.
    pub async fn run(&self, batch_size: usize) -> Result<DispatchOutcome> {
        info!(batch_size = batch_size, "dispatch_started");

        // Acquire content first; without an issue there is nothing to do
        // and the recipient store is not contacted at all.
        let issue = match self.content.fetch_next_pending().await? {
            Some(issue) => issue,
            None => {
                info!("dispatch_no_content");
                return Ok(DispatchOutcome::NoContent);
            }
        };

        info!(issue = %issue.name, title = %issue.payload.title, "dispatch_content_acquired");

        let recipients = self
            .store
            .list_recipients()
            .await
            .context("Failed to list recipients")?;

        let total = recipients.len();
        let batch: Vec<_> = recipients
            .into_iter()
            .filter(|r| r.is_eligible())
            .take(batch_size)
            .collect();

        info!(
            total_rows = total,
            selected = batch.len(),
            "dispatch_recipients_listed"
        );

        let mut sent = 0usize;
        let mut failed = 0usize;

        if !batch.is_empty() {
            let enrichment = self.enricher.enrich(&issue.payload).await;

            for recipient in &batch {
                let email = recipient.email.trim();
                let unsubscribe_url = match self.build_unsubscribe_url(email) {
                    Ok(url) => url,
                    Err(e) => {
                        failed += 1;
                        error!(to = %email, error = %e, "dispatch_link_build_failed");
                        continue;
                    }
                };

                let html = render_email(&issue.payload, &enrichment, email, &unsubscribe_url);
                let message = OutboundEmail {
                    to: email.to_string(),
                    subject: SUBJECT.to_string(),
                    html,
                    text: TEXT_FALLBACK.to_string(),
                    unsubscribe_url: Some(unsubscribe_url),
                };

                if let Err(e) = self.mailer.send(&message).await {
                    failed += 1;
                    error!(to = %email, error = %e, "dispatch_send_failed");
                    continue;
                }

                // The message is out; a failed marker write risks one
                // duplicate next cycle and still counts as a failure.
                match self.store.mark_sent(recipient).await {
                    Ok(()) => {
                        sent += 1;
                        info!(to = %email, "dispatch_recipient_sent");
                    }
                    Err(e) => {
                        failed += 1;
                        error!(
                            to = %email,
                            error = %e,
                            "dispatch_mark_sent_failed_after_send"
                        );
                    }
                }
            }
        } else {
            info!(issue = %issue.name, "dispatch_empty_audience");
        }

        // Finalize even on an empty audience or partial failure, otherwise
        // the same issue would be re-processed forever. A failure here is a
        // warning: the issue will be retried next cycle and already-marked
        // recipients are skipped.
        if let Err(e) = self.content.mark_done(&issue).await {
            warn!(issue = %issue.name, error = %e, "dispatch_mark_done_failed");
        }

        info!(
            issue = %issue.name,
            sent = sent,
            failed = failed,
            "dispatch_complete"
        );

        Ok(DispatchOutcome::Completed(DispatchReport {
            issue: issue.name,
            selected: batch.len(),
            sent,
            failed,
        }))
    }

    pub(crate) fn build_unsubscribe_url(&self, email: &str) -> Result<String> {
        let token = token::issue(email);
        let mut url = self
            .base_url
            .join("unsubscribe")
            .context("Base URL cannot carry an unsubscribe path")?;
        url.set_query(Some(&format!("token={}", token)));
        Ok(url.to_string())
    }
}

/// Validate configuration, build the real adapters, and run one dispatch
/// invocation. Shared by the HTTP trigger handler and the one-shot binary.
pub async fn run_with_config(config: &Config, batch_size: usize) -> Result<DispatchOutcome> {
    let validated = config.validate().context("Server configuration error")?;
    let timeout = Duration::from_millis(config.request_timeout_ms);

    let auth = Arc::new(Authenticator::new(&validated, timeout)?);

    let store = SheetsClient::new(
        auth.clone(),
        validated.sheet_id.clone(),
        config.marker_column.clone(),
        config.status_column.clone(),
        timeout,
    )?;

    let content =
        DriveContentSource::new(auth.clone(), validated.drive_folder_id.clone(), timeout)?;

    let mailer = SmtpMailer::new(config)?;

    let enricher = match &config.code_image_service_url {
        Some(endpoint) => Enricher::new(vec![Box::new(HttpImageService::new(
            endpoint.clone(),
            timeout,
        )?)]),
        None => Enricher::disabled(),
    };

    let dispatcher = Dispatcher::new(&store, &content, &mailer, &enricher, &validated.base_url);
    dispatcher.run(batch_size).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::PendingIssue;
    use crate::sheet::RecipientRecord;

    #[test]
    fn test_unsubscribe_url_shape() {
        let base = Url::parse("https://learnif.example/").unwrap();
        let store = NullStore;
        let content = NullContent;
        let mailer = NullMailer;
        let enricher = Enricher::disabled();
        let dispatcher = Dispatcher::new(&store, &content, &mailer, &enricher, &base);

        let url = dispatcher.build_unsubscribe_url("user@example.com").unwrap();
        assert!(url.starts_with("https://learnif.example/unsubscribe?token="));

        let token = url.split("token=").nth(1).unwrap();
        assert_eq!(token::decode_email(token).unwrap(), "user@example.com");
    }

    struct NullStore;

    #[async_trait::async_trait]
    impl RecipientStore for NullStore {
        async fn list_recipients(&self) -> Result<Vec<RecipientRecord>> {
            Ok(vec![])
        }
        async fn mark_sent(&self, _record: &RecipientRecord) -> Result<()> {
            Ok(())
        }
    }

    struct NullContent;

    #[async_trait::async_trait]
    impl ContentSource for NullContent {
        async fn fetch_next_pending(&self) -> Result<Option<PendingIssue>> {
            Ok(None)
        }
        async fn mark_done(&self, _issue: &PendingIssue) -> Result<()> {
            Ok(())
        }
    }

    struct NullMailer;

    #[async_trait::async_trait]
    impl Mailer for NullMailer {
        async fn send(&self, _email: &OutboundEmail) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_no_content_short_circuits() {
        let base = Url::parse("https://learnif.example/").unwrap();
        let store = NullStore;
        let content = NullContent;
        let mailer = NullMailer;
        let enricher = Enricher::disabled();
        let dispatcher = Dispatcher::new(&store, &content, &mailer, &enricher, &base);

        let outcome = dispatcher.run(45).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::NoContent));
    }
}
