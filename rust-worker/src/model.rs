//! Campaign and recipient records shared by the dispatcher and reconciler.
//!
//! Field names serialize in camelCase so records round-trip with the
//! persisted recipient/campaign shapes used by the rest of the tool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Campaign
// =============================================================================

/// Campaign lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    #[default]
    Draft,
    Sending,
    Sent,
    Partial,
    Completed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Sending => "sending",
            CampaignStatus::Sent => "sent",
            CampaignStatus::Partial => "partial",
            CampaignStatus::Completed => "completed",
        }
    }

    /// Derive the post-dispatch status from recomputed counters.
    ///
    /// - `sent`: every recipient went out (delivered counts as sent)
    /// - `completed`: every recipient is terminal and at least one failed
    /// - `partial`: anything else
    pub fn from_counters(counters: &CampaignCounters) -> Self {
        if counters.total > 0 && counters.sent + counters.delivered == counters.total {
            CampaignStatus::Sent
        } else if counters.failed > 0 && counters.delivered + counters.failed == counters.total {
            CampaignStatus::Completed
        } else {
            CampaignStatus::Partial
        }
    }

    /// Whether a dispatch has finished at least once for this campaign.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            CampaignStatus::Sent | CampaignStatus::Partial | CampaignStatus::Completed
        )
    }
}

/// Aggregate counters, always recomputed from the recipient set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CampaignCounters {
    pub total: usize,
    pub sent: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl CampaignCounters {
    /// Count recipients by status.
    pub fn tally<'a>(recipients: impl IntoIterator<Item = &'a Recipient>) -> Self {
        let mut counters = CampaignCounters::default();
        for recipient in recipients {
            counters.total += 1;
            match recipient.status {
                RecipientStatus::Pending => {}
                RecipientStatus::Sent => counters.sent += 1,
                RecipientStatus::Delivered => counters.delivered += 1,
                RecipientStatus::Failed => counters.failed += 1,
            }
        }
        counters
    }

    pub fn pending(&self) -> usize {
        self.total - self.sent - self.delivered - self.failed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub campaign_id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    /// Publicly reachable attachment URLs (already uploaded elsewhere)
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub counters: CampaignCounters,
    #[serde(default)]
    pub status: CampaignStatus,
}

impl Campaign {
    pub fn new(campaign_id: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            subject: subject.into(),
            body: body.into(),
            attachments: Vec::new(),
            counters: CampaignCounters::default(),
            status: CampaignStatus::Draft,
        }
    }
}

// =============================================================================
// Recipient
// =============================================================================

/// Per-recipient delivery status.
///
/// Moves forward along `pending → sent → {delivered | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecipientStatus {
    #[default]
    Pending,
    Sent,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub campaign_id: String,
    pub recipient_id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub status: RecipientStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl Recipient {
    pub fn new(
        campaign_id: impl Into<String>,
        recipient_id: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            recipient_id: recipient_id.into(),
            email: email.into(),
            first_name: None,
            last_name: None,
            company: None,
            status: RecipientStatus::Pending,
            error_message: None,
            provider_message_id: None,
            added_at: Utc::now(),
            sent_at: None,
            failed_at: None,
        }
    }

    /// Instant the delivery-promotion window is measured from.
    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.sent_at.unwrap_or(self.added_at)
    }

    /// Failed because a bounce named this address. Only bounces set
    /// `failed_at`; dispatch failures leave it empty.
    pub fn is_bounced(&self) -> bool {
        self.status == RecipientStatus::Failed && self.failed_at.is_some()
    }
}

/// A guarded status write.
///
/// Stores apply a transition only when the recipient's current status is in
/// [`Transition::allowed_from`], which keeps concurrent dispatch and
/// reconcile runs from moving a recipient backward.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Provider accepted the message.
    Sent {
        message_id: String,
        at: DateTime<Utc>,
    },
    /// Provider refused the message during dispatch.
    SendFailed { error: String },
    /// No bounce seen within the promotion window.
    Delivered,
    /// A bounce notification named this recipient's address.
    Bounced { reason: String, at: DateTime<Utc> },
}

impl Transition {
    pub fn allowed_from(&self) -> &'static [RecipientStatus] {
        match self {
            Transition::Sent { .. } | Transition::SendFailed { .. } => {
                &[RecipientStatus::Pending, RecipientStatus::Failed]
            }
            Transition::Delivered | Transition::Bounced { .. } => &[RecipientStatus::Sent],
        }
    }

    pub fn target(&self) -> RecipientStatus {
        match self {
            Transition::Sent { .. } => RecipientStatus::Sent,
            Transition::SendFailed { .. } | Transition::Bounced { .. } => RecipientStatus::Failed,
            Transition::Delivered => RecipientStatus::Delivered,
        }
    }

    /// Whether `recipient` may take this transition. Send outcomes never
    /// apply to a bounced recipient: its failure is final.
    pub fn permits(&self, recipient: &Recipient) -> bool {
        if !self.allowed_from().contains(&recipient.status) {
            return false;
        }
        match self {
            Transition::Sent { .. } | Transition::SendFailed { .. } => !recipient.is_bounced(),
            Transition::Delivered | Transition::Bounced { .. } => true,
        }
    }

    /// Apply the transition if the precondition holds. Returns whether the
    /// recipient changed.
    pub fn apply(&self, recipient: &mut Recipient) -> bool {
        if !self.permits(recipient) {
            return false;
        }

        match self {
            Transition::Sent { message_id, at } => {
                recipient.provider_message_id = Some(message_id.clone());
                recipient.error_message = None;
                recipient.sent_at = Some(*at);
                recipient.failed_at = None;
            }
            Transition::SendFailed { error } => {
                recipient.error_message = Some(error.clone());
            }
            Transition::Delivered => {}
            Transition::Bounced { reason, at } => {
                recipient.error_message = Some(reason.clone());
                recipient.failed_at = Some(*at);
            }
        }
        recipient.status = self.target();
        true
    }
}

// =============================================================================
// Bounces
// =============================================================================

/// Which DSN extraction strategy produced a bounce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DsnStrategy {
    FailedRecipientsHeader,
    FinalRecipient,
    FatalErrorsBlock,
}

/// Failed address and reason extracted from one bounce message.
#[derive(Debug, Clone, PartialEq)]
pub struct BounceRecord {
    pub failed_email: String,
    pub reason: String,
    pub strategy: DsnStrategy,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient(status: RecipientStatus) -> Recipient {
        let mut r = Recipient::new("c1", "r1", "a@example.com");
        r.status = status;
        r
    }

    #[test]
    fn test_tally_and_pending() {
        let recipients = vec![
            recipient(RecipientStatus::Pending),
            recipient(RecipientStatus::Sent),
            recipient(RecipientStatus::Sent),
            recipient(RecipientStatus::Delivered),
            recipient(RecipientStatus::Failed),
        ];

        let counters = CampaignCounters::tally(&recipients);

        assert_eq!(counters.total, 5);
        assert_eq!(counters.sent, 2);
        assert_eq!(counters.delivered, 1);
        assert_eq!(counters.failed, 1);
        assert_eq!(counters.pending(), 1);
    }

    #[test]
    fn test_status_from_counters() {
        let all_sent = CampaignCounters { total: 2, sent: 1, delivered: 1, failed: 0 };
        let all_terminal = CampaignCounters { total: 2, sent: 0, delivered: 1, failed: 1 };
        let mixed = CampaignCounters { total: 3, sent: 2, delivered: 0, failed: 1 };

        assert_eq!(CampaignStatus::from_counters(&all_sent), CampaignStatus::Sent);
        assert_eq!(CampaignStatus::from_counters(&all_terminal), CampaignStatus::Completed);
        assert_eq!(CampaignStatus::from_counters(&mixed), CampaignStatus::Partial);
    }

    #[test]
    fn test_terminal_delivered_never_moves() {
        let now = Utc::now();
        let transitions = [
            Transition::Sent { message_id: "m".into(), at: now },
            Transition::SendFailed { error: "x".into() },
            Transition::Delivered,
            Transition::Bounced { reason: "x".into(), at: now },
        ];

        for transition in transitions {
            let mut r = recipient(RecipientStatus::Delivered);
            assert!(!transition.apply(&mut r));
            assert_eq!(r.status, RecipientStatus::Delivered);
        }
    }

    #[test]
    fn test_sent_clears_previous_error() {
        let mut r = recipient(RecipientStatus::Failed);
        r.error_message = Some("mailbox full".into());

        let applied = Transition::Sent { message_id: "abc".into(), at: Utc::now() }.apply(&mut r);

        assert!(applied);
        assert_eq!(r.status, RecipientStatus::Sent);
        assert_eq!(r.provider_message_id.as_deref(), Some("abc"));
        assert!(r.error_message.is_none());
    }

    #[test]
    fn test_bounced_recipient_is_not_resent() {
        let mut r = recipient(RecipientStatus::Sent);
        Transition::Bounced { reason: "550 no such user".into(), at: Utc::now() }.apply(&mut r);
        assert!(r.is_bounced());

        let resent = Transition::Sent { message_id: "again".into(), at: Utc::now() }.apply(&mut r);
        let refailed = Transition::SendFailed { error: "timeout".into() }.apply(&mut r);

        assert!(!resent);
        assert!(!refailed);
        assert_eq!(r.status, RecipientStatus::Failed);
        assert_eq!(r.error_message.as_deref(), Some("550 no such user"));
        assert!(r.provider_message_id.is_none());
    }

    #[test]
    fn test_send_failure_is_retryable() {
        let mut r = recipient(RecipientStatus::Pending);
        Transition::SendFailed { error: "timeout".into() }.apply(&mut r);

        assert!(!r.is_bounced());
        assert!(Transition::Sent { message_id: "m".into(), at: Utc::now() }.permits(&r));
    }

    #[test]
    fn test_bounce_requires_sent() {
        let mut pending = recipient(RecipientStatus::Pending);
        let bounce = Transition::Bounced { reason: "550".into(), at: Utc::now() };

        assert!(!bounce.apply(&mut pending));

        let mut sent = recipient(RecipientStatus::Sent);
        assert!(bounce.apply(&mut sent));
        assert_eq!(sent.status, RecipientStatus::Failed);
        assert_eq!(sent.error_message.as_deref(), Some("550"));
        assert!(sent.failed_at.is_some());
    }

    #[test]
    fn test_recipient_record_shape() {
        let r = Recipient::new("c1", "r1", "a@example.com");
        let json = serde_json::to_value(&r).unwrap();

        assert_eq!(json["campaignId"], "c1");
        assert_eq!(json["recipientId"], "r1");
        assert_eq!(json["status"], "pending");
        assert!(json.get("addedAt").is_some());
        assert!(json.get("failedAt").is_none());
    }
}
