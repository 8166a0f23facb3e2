//! Campaign dispatch.
//!
//! ## Flow
//!
//! ```text
//! load campaign → validate → load recipients → resolve credentials
//!     → connect provider (one token refresh) → status=sending
//!     → send each unsent recipient → recount → final status
//! ```
//!
//! Run-level failures (missing campaign, bad credentials) abort before any
//! recipient is touched. Per-recipient failures are recorded on the
//! recipient and the loop moves on.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::credentials::CredentialResolver;
use crate::error::DispatchError;
use crate::model::{CampaignCounters, CampaignStatus, Recipient, RecipientStatus, Transition};
use crate::provider::{OutboundMessage, ProviderFactory};
use crate::store::CampaignStore;
use crate::template::render;

/// Outcome of one dispatch run, counted from the store after the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    pub status: CampaignStatus,
}

/// Campaigns with a dispatch in flight.
#[derive(Clone, Default)]
pub struct CampaignLeases {
    active: Arc<Mutex<HashSet<String>>>,
}

impl CampaignLeases {
    /// Claim `campaign_id`; `None` if another run holds it.
    pub fn acquire(&self, campaign_id: &str) -> Option<Lease> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(campaign_id.to_string()) {
            return None;
        }
        Some(Lease {
            active: Arc::clone(&self.active),
            campaign_id: campaign_id.to_string(),
        })
    }
}

/// Released on drop.
pub struct Lease {
    active: Arc<Mutex<HashSet<String>>>,
    campaign_id: String,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.campaign_id);
    }
}

pub struct Dispatcher {
    store: Arc<dyn CampaignStore>,
    resolver: CredentialResolver,
    providers: Arc<dyn ProviderFactory>,
    leases: CampaignLeases,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        resolver: CredentialResolver,
        providers: Arc<dyn ProviderFactory>,
    ) -> Self {
        Self {
            store,
            resolver,
            providers,
            leases: CampaignLeases::default(),
        }
    }

    /// Send a campaign to every recipient not already sent.
    ///
    /// Re-running is safe: recipients in `sent` or `delivered` are skipped, so
    /// a second run only retries pending and failed recipients.
    pub async fn dispatch(&self, campaign_id: &str) -> Result<DispatchReport, DispatchError> {
        let _lease = self
            .leases
            .acquire(campaign_id)
            .ok_or_else(|| DispatchError::Busy(campaign_id.to_string()))?;

        info!(campaign_id = %campaign_id, "dispatch_start");

        let campaign = self
            .store
            .campaign(campaign_id)
            .await?
            .ok_or_else(|| DispatchError::NotFound(campaign_id.to_string()))?;

        if campaign.subject.trim().is_empty() || campaign.body.trim().is_empty() {
            warn!(campaign_id = %campaign_id, "dispatch_invalid_campaign");
            return Err(DispatchError::InvalidCampaign(campaign_id.to_string()));
        }

        let recipients = self.store.recipients(campaign_id).await?;
        if recipients.is_empty() {
            warn!(campaign_id = %campaign_id, "dispatch_no_recipients");
            return Err(DispatchError::NoRecipients(campaign_id.to_string()));
        }

        let sender = self.resolver.resolve().await;
        let adapter = match self.providers.connect(&sender).await {
            Ok(adapter) => adapter,
            Err(e) => {
                error!(
                    campaign_id = %campaign_id,
                    auth_mode = sender.auth_mode().as_str(),
                    error = %e,
                    "dispatch_auth_failed"
                );
                return Err(e.into());
            }
        };

        self.store
            .set_campaign_status(campaign_id, CampaignStatus::Sending)
            .await?;

        info!(
            campaign_id = %campaign_id,
            recipients = recipients.len(),
            transport = adapter.name(),
            "dispatch_sending"
        );

        // Final status per recipient as seen by this run, used when the
        // store cannot be re-read afterwards.
        let mut outcomes: Vec<Recipient> = recipients.clone();

        let mut attempted = 0usize;
        for (idx, recipient) in recipients.iter().enumerate() {
            if matches!(
                recipient.status,
                RecipientStatus::Sent | RecipientStatus::Delivered
            ) {
                continue;
            }
            if recipient.is_bounced() {
                info!(
                    campaign_id = %campaign_id,
                    recipient_id = %recipient.recipient_id,
                    "recipient_skipped_bounced"
                );
                continue;
            }
            attempted += 1;

            let first = recipient.first_name.as_deref();
            let last = recipient.last_name.as_deref();
            let company = recipient.company.as_deref();
            let subject = render(&campaign.subject, first, last, company);
            let html_body = render(&campaign.body, first, last, company);

            let message = OutboundMessage {
                from: sender.from_email(),
                to: &recipient.email,
                subject: &subject,
                html_body: &html_body,
                attachments: &campaign.attachments,
            };

            let transition = match adapter.send(&message).await {
                Ok(message_id) => {
                    info!(
                        campaign_id = %campaign_id,
                        recipient_id = %recipient.recipient_id,
                        message_id = %message_id,
                        "recipient_sent"
                    );
                    Transition::Sent {
                        message_id,
                        at: Utc::now(),
                    }
                }
                Err(e) => {
                    warn!(
                        campaign_id = %campaign_id,
                        recipient_id = %recipient.recipient_id,
                        error = %e,
                        "recipient_send_failed"
                    );
                    Transition::SendFailed {
                        error: e.to_string(),
                    }
                }
            };

            let target = transition.target();
            match self
                .store
                .transition_recipient(campaign_id, &recipient.recipient_id, transition)
                .await
            {
                Ok(true) => outcomes[idx].status = target,
                Ok(false) => warn!(
                    campaign_id = %campaign_id,
                    recipient_id = %recipient.recipient_id,
                    "recipient_status_changed_concurrently"
                ),
                Err(e) => error!(
                    campaign_id = %campaign_id,
                    recipient_id = %recipient.recipient_id,
                    error = %e,
                    "recipient_status_write_failed"
                ),
            }
        }

        // Recount from the store rather than trusting loop counters.
        let counters = match self.store.recipients(campaign_id).await {
            Ok(recipients) => CampaignCounters::tally(&recipients),
            Err(e) => {
                error!(campaign_id = %campaign_id, error = %e, "dispatch_recount_failed");
                CampaignCounters::tally(&outcomes)
            }
        };
        let status = CampaignStatus::from_counters(&counters);

        // Never leave the campaign in `sending`.
        if let Err(e) = self
            .store
            .write_campaign_stats(campaign_id, counters, Some(status))
            .await
        {
            error!(campaign_id = %campaign_id, error = %e, "campaign_stats_write_failed");
            self.store.set_campaign_status(campaign_id, status).await?;
        }

        let report = DispatchReport {
            sent: counters.sent + counters.delivered,
            failed: counters.failed,
            status,
        };

        info!(
            campaign_id = %campaign_id,
            attempted = attempted,
            sent = report.sent,
            failed = report.failed,
            pending = counters.pending(),
            status = status.as_str(),
            "dispatch_complete"
        );

        Ok(report)
    }
}
