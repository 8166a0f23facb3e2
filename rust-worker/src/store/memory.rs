//! In-process store.
//!
//! Backs the binaries when seeded from a JSON snapshot, and every test in
//! the crate.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use super::CampaignStore;
use crate::credentials::{GlobalCredentials, SessionRecord};
use crate::error::StoreError;
use crate::model::{Campaign, CampaignCounters, CampaignStatus, Recipient, RecipientStatus, Transition};

/// Seed data for [`MemoryStore::from_snapshot`].
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub campaigns: Vec<Campaign>,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    #[serde(default)]
    pub session: Option<SessionRecord>,
    #[serde(default)]
    pub global: Option<GlobalCredentials>,
}

#[derive(Default)]
struct Inner {
    campaigns: HashMap<String, Campaign>,
    /// Recipients per campaign id, kept in insertion order.
    recipients: HashMap<String, Vec<Recipient>>,
    session: Option<SessionRecord>,
    global: Option<GlobalCredentials>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut inner = Inner {
            session: snapshot.session,
            global: snapshot.global,
            ..Default::default()
        };

        for campaign in snapshot.campaigns {
            inner.campaigns.insert(campaign.campaign_id.clone(), campaign);
        }
        for recipient in snapshot.recipients {
            upsert(&mut inner, recipient);
        }

        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Load a JSON snapshot file.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Snapshot(format!("{}: {}", path.display(), e)))?;
        let snapshot: Snapshot = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Snapshot(format!("{}: {}", path.display(), e)))?;

        info!(
            path = %path.display(),
            campaigns = snapshot.campaigns.len(),
            recipients = snapshot.recipients.len(),
            has_session = snapshot.session.is_some(),
            has_global = snapshot.global.is_some(),
            "store_snapshot_loaded"
        );

        Ok(Self::from_snapshot(snapshot))
    }

    pub async fn insert_campaign(&self, campaign: Campaign) {
        let mut inner = self.inner.write().await;
        inner.campaigns.insert(campaign.campaign_id.clone(), campaign);
    }

    /// Insert a recipient, replacing any with the same campaign/recipient id.
    pub async fn insert_recipient(&self, recipient: Recipient) {
        let mut inner = self.inner.write().await;
        upsert(&mut inner, recipient);
    }

    pub async fn set_session(&self, session: SessionRecord) {
        self.inner.write().await.session = Some(session);
    }

    pub async fn set_global(&self, global: GlobalCredentials) {
        self.inner.write().await.global = Some(global);
    }

    pub async fn recipient(&self, campaign_id: &str, recipient_id: &str) -> Option<Recipient> {
        let inner = self.inner.read().await;
        inner
            .recipients
            .get(campaign_id)?
            .iter()
            .find(|r| r.recipient_id == recipient_id)
            .cloned()
    }
}

fn upsert(inner: &mut Inner, recipient: Recipient) {
    let list = inner
        .recipients
        .entry(recipient.campaign_id.clone())
        .or_default();

    match list.iter_mut().find(|r| r.recipient_id == recipient.recipient_id) {
        Some(existing) => *existing = recipient,
        None => list.push(recipient),
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn campaign(&self, campaign_id: &str) -> Result<Option<Campaign>, StoreError> {
        Ok(self.inner.read().await.campaigns.get(campaign_id).cloned())
    }

    async fn set_campaign_status(
        &self,
        campaign_id: &str,
        status: CampaignStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let campaign = inner
            .campaigns
            .get_mut(campaign_id)
            .ok_or_else(|| StoreError::MissingCampaign(campaign_id.to_string()))?;
        campaign.status = status;
        Ok(())
    }

    async fn write_campaign_stats(
        &self,
        campaign_id: &str,
        counters: CampaignCounters,
        status: Option<CampaignStatus>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let campaign = inner
            .campaigns
            .get_mut(campaign_id)
            .ok_or_else(|| StoreError::MissingCampaign(campaign_id.to_string()))?;
        campaign.counters = counters;
        if let Some(status) = status {
            campaign.status = status;
        }
        Ok(())
    }

    async fn recipients(&self, campaign_id: &str) -> Result<Vec<Recipient>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.recipients.get(campaign_id).cloned().unwrap_or_default())
    }

    async fn recipients_with_status(
        &self,
        status: RecipientStatus,
    ) -> Result<Vec<Recipient>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .recipients
            .values()
            .flatten()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }

    async fn recipients_by_email(&self, email: &str) -> Result<Vec<Recipient>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .recipients
            .values()
            .flatten()
            .filter(|r| r.email.eq_ignore_ascii_case(email))
            .cloned()
            .collect())
    }

    async fn transition_recipient(
        &self,
        campaign_id: &str,
        recipient_id: &str,
        transition: Transition,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let recipient = inner
            .recipients
            .get_mut(campaign_id)
            .and_then(|list| list.iter_mut().find(|r| r.recipient_id == recipient_id));

        match recipient {
            Some(recipient) => Ok(transition.apply(recipient)),
            None => Err(StoreError::Backend(format!(
                "recipient {}/{} not found",
                campaign_id, recipient_id
            ))),
        }
    }

    async fn session_credentials(&self) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.inner.read().await.session.clone())
    }

    async fn global_credentials(&self) -> Result<Option<GlobalCredentials>, StoreError> {
        Ok(self.inner.read().await.global.clone())
    }
}
