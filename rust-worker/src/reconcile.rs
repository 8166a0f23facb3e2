//! Delivery-status reconciliation.
//!
//! One run:
//!
//! 1. Fetch candidate bounces from the mailbox and parse each one.
//! 2. Bounce pass: every `sent` recipient whose address matches a bounce,
//!    in any campaign, moves to `failed` with the parsed reason.
//! 3. Promotion pass: `sent` recipients older than the promotion window move
//!    to `delivered`. Absence of a bounce is a heuristic, not a receipt.
//! 4. Recount every campaign touched by either pass.
//!
//! Bounces are applied before promotion so a late bounce still lands on a
//! recipient that would otherwise cross the window in the same run.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::bounce::{parse_dsn, MailboxScanner};
use crate::error::ReconcileError;
use crate::model::{BounceRecord, RecipientStatus, Transition};
use crate::store::{recompute_campaign, CampaignStore};

/// One applied bounce in the scan response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BounceSummary {
    pub email: String,
    pub reason: String,
}

/// Outcome of one reconcile run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub promoted_delivered: usize,
    pub processed_bounces: usize,
    pub bounces: Vec<BounceSummary>,
}

pub struct Reconciler {
    store: Arc<dyn CampaignStore>,
    scanner: Arc<dyn MailboxScanner>,
    promotion_after: Duration,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        scanner: Arc<dyn MailboxScanner>,
        promotion_after: Duration,
    ) -> Self {
        Self {
            store,
            scanner,
            promotion_after,
        }
    }

    pub async fn run(&self) -> Result<ScanReport, ReconcileError> {
        self.run_at(Utc::now()).await
    }

    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<ScanReport, ReconcileError> {
        info!(promotion_after_secs = self.promotion_after.num_seconds(), "reconcile_start");

        let messages = self.scanner.fetch_bounces().await?;

        let mut records = Vec::with_capacity(messages.len());
        for message in &messages {
            match parse_dsn(&message.text) {
                Some(record) => records.push(record),
                None => warn!(subject = ?message.subject, "dsn_parse_miss"),
            }
        }

        let mut touched = BTreeSet::new();
        let mut report = ScanReport::default();

        for record in &records {
            let marked = self.apply_bounce(record, now, &mut touched).await?;
            if marked > 0 {
                report.processed_bounces += 1;
                report.bounces.push(BounceSummary {
                    email: record.failed_email.clone(),
                    reason: record.reason.clone(),
                });
            }
        }

        report.promoted_delivered = self.promote_stale(now, &mut touched).await?;

        for campaign_id in &touched {
            if let Err(e) = recompute_campaign(self.store.as_ref(), campaign_id).await {
                error!(campaign_id = %campaign_id, error = %e, "campaign_recompute_failed");
            }
        }

        info!(
            messages = messages.len(),
            parsed = records.len(),
            processed_bounces = report.processed_bounces,
            promoted_delivered = report.promoted_delivered,
            campaigns_touched = touched.len(),
            "reconcile_complete"
        );

        Ok(report)
    }

    /// Mark every `sent` recipient with the bounced address as failed.
    /// Returns how many rows changed.
    async fn apply_bounce(
        &self,
        record: &BounceRecord,
        now: DateTime<Utc>,
        touched: &mut BTreeSet<String>,
    ) -> Result<usize, ReconcileError> {
        let matches = self.store.recipients_by_email(&record.failed_email).await?;
        if matches.is_empty() {
            debug!(failed_email = %record.failed_email, "bounce_no_recipient");
            return Ok(0);
        }

        let mut marked = 0;
        for recipient in matches {
            if recipient.status != RecipientStatus::Sent {
                continue;
            }

            let transition = Transition::Bounced {
                reason: record.reason.clone(),
                at: now,
            };
            let changed = self
                .store
                .transition_recipient(&recipient.campaign_id, &recipient.recipient_id, transition)
                .await?;

            if changed {
                info!(
                    campaign_id = %recipient.campaign_id,
                    recipient_id = %recipient.recipient_id,
                    failed_email = %record.failed_email,
                    reason = %record.reason,
                    "recipient_bounced"
                );
                touched.insert(recipient.campaign_id);
                marked += 1;
            }
        }

        Ok(marked)
    }

    async fn promote_stale(
        &self,
        now: DateTime<Utc>,
        touched: &mut BTreeSet<String>,
    ) -> Result<usize, ReconcileError> {
        let cutoff = now - self.promotion_after;
        let candidates = self
            .store
            .recipients_with_status(RecipientStatus::Sent)
            .await?;

        let mut promoted = 0;
        for recipient in candidates {
            if recipient.enqueued_at() > cutoff {
                continue;
            }

            let changed = self
                .store
                .transition_recipient(
                    &recipient.campaign_id,
                    &recipient.recipient_id,
                    Transition::Delivered,
                )
                .await?;

            if changed {
                debug!(
                    campaign_id = %recipient.campaign_id,
                    recipient_id = %recipient.recipient_id,
                    "recipient_promoted_delivered"
                );
                touched.insert(recipient.campaign_id);
                promoted += 1;
            }
        }

        Ok(promoted)
    }
}
