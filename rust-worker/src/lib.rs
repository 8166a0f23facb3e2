//! Campaign dispatch and bounce reconciliation.
//!
//! This library backs the `campaign-web` binary: an HTTP server for manual
//! sends and scans that also runs the timed bounce-mailbox reconciler.
//!
//! ## Architecture
//!
//! ```text
//! POST /send → Dispatcher → CredentialResolver → ProviderAdapter (API | SMTP) → store
//! timer/scan → MailboxScanner (IMAP) → DSN parser → Reconciler → store
//! ```

pub mod bounce;
pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod provider;
pub mod reconcile;
pub mod scheduler;
pub mod store;
pub mod template;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{DispatchReport, Dispatcher};
pub use error::{DispatchError, ReconcileError};
pub use model::{Campaign, CampaignStatus, Recipient, RecipientStatus};
pub use reconcile::{Reconciler, ScanReport};
pub use web::AppState;
