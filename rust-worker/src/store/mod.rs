//! Campaign, recipient and credential persistence.
//!
//! Contact/tag CRUD lives outside this crate; the pipeline only needs the
//! reads and guarded writes declared on [`CampaignStore`].

pub mod memory;

use async_trait::async_trait;
use tracing::info;

use crate::credentials::{GlobalCredentials, SessionRecord};
use crate::error::StoreError;
use crate::model::{Campaign, CampaignCounters, CampaignStatus, Recipient, RecipientStatus, Transition};

pub use memory::{MemoryStore, Snapshot};

#[async_trait]
pub trait CampaignStore: Send + Sync {
    async fn campaign(&self, campaign_id: &str) -> Result<Option<Campaign>, StoreError>;

    async fn set_campaign_status(
        &self,
        campaign_id: &str,
        status: CampaignStatus,
    ) -> Result<(), StoreError>;

    /// Overwrite the aggregate counters, and the status when given.
    async fn write_campaign_stats(
        &self,
        campaign_id: &str,
        counters: CampaignCounters,
        status: Option<CampaignStatus>,
    ) -> Result<(), StoreError>;

    /// Recipients of one campaign, in insertion order.
    async fn recipients(&self, campaign_id: &str) -> Result<Vec<Recipient>, StoreError>;

    /// Recipients in `status` across every campaign.
    async fn recipients_with_status(
        &self,
        status: RecipientStatus,
    ) -> Result<Vec<Recipient>, StoreError>;

    /// Recipients with this address (case-insensitive) across every campaign.
    async fn recipients_by_email(&self, email: &str) -> Result<Vec<Recipient>, StoreError>;

    /// Compare-and-set status write. Returns `Ok(false)` when the recipient's
    /// current status is not in [`Transition::allowed_from`].
    async fn transition_recipient(
        &self,
        campaign_id: &str,
        recipient_id: &str,
        transition: Transition,
    ) -> Result<bool, StoreError>;

    async fn session_credentials(&self) -> Result<Option<SessionRecord>, StoreError>;

    async fn global_credentials(&self) -> Result<Option<GlobalCredentials>, StoreError>;
}

/// Recount a campaign from its recipients and persist the counters.
///
/// A campaign whose dispatch already finished also gets its status
/// re-derived; campaigns still in `draft`/`sending` keep theirs.
pub async fn recompute_campaign(
    store: &dyn CampaignStore,
    campaign_id: &str,
) -> Result<(CampaignCounters, CampaignStatus), StoreError> {
    let campaign = store
        .campaign(campaign_id)
        .await?
        .ok_or_else(|| StoreError::MissingCampaign(campaign_id.to_string()))?;

    let recipients = store.recipients(campaign_id).await?;
    let counters = CampaignCounters::tally(&recipients);

    let status = if campaign.status.is_settled() {
        CampaignStatus::from_counters(&counters)
    } else {
        campaign.status
    };

    let new_status = (status != campaign.status).then_some(status);
    store
        .write_campaign_stats(campaign_id, counters, new_status)
        .await?;

    info!(
        campaign_id = %campaign_id,
        total = counters.total,
        sent = counters.sent,
        delivered = counters.delivered,
        failed = counters.failed,
        pending = counters.pending(),
        status = status.as_str(),
        "campaign_stats_recomputed"
    );

    Ok((counters, status))
}
