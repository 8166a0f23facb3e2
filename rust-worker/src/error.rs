//! Error types for dispatch and reconciliation.
//!
//! Run-level errors ([`DispatchError`], [`ReconcileError`]) abort an
//! invocation. [`SendError`] is scoped to one recipient and is recorded on
//! that recipient instead of propagating.

use thiserror::Error;

/// Persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("campaign not found: {0}")]
    MissingCampaign(String),

    #[error("failed to load store snapshot: {0}")]
    Snapshot(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Access-token acquisition failures. Fatal for a whole dispatch run.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential field: {0}")]
    MissingField(&'static str),

    /// The provider refused the refresh credential. Carries the raw response.
    #[error("{0}")]
    Rejected(String),

    #[error("authentication transport error: {0}")]
    Transport(String),
}

/// Single-recipient transport failure.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("provider rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("provider response carried no message id")]
    MissingMessageId,

    #[error("invalid address {0}")]
    InvalidAddress(String),

    #[error("send request failed: {0}")]
    Transport(String),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

/// Mailbox polling failures.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("mailbox credentials are not configured")]
    NotConfigured,

    #[error("IMAP connection failed: {0}")]
    Connect(String),

    #[error("IMAP login failed: {0}")]
    Login(String),

    #[error("IMAP command failed: {0}")]
    Command(String),

    #[error("mailbox task aborted: {0}")]
    Join(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("campaign not found: {0}")]
    NotFound(String),

    #[error("campaign {0} is missing a subject or body")]
    InvalidCampaign(String),

    #[error("campaign {0} has no recipients")]
    NoRecipients(String),

    #[error("campaign {0} is already being dispatched")]
    Busy(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
