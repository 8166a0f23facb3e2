//! Bounce mailbox polling over IMAP.
//!
//! The `imap` crate is blocking, so each scan runs its whole session on the
//! blocking pool: connect → login → SELECT INBOX → SEARCH FROM mailer-daemon
//! → FETCH the newest N → LOGOUT.

use std::net::TcpStream;

use async_trait::async_trait;
use native_tls::{TlsConnector, TlsStream};
use tracing::{debug, info, warn};

use super::dsn::{flatten_bounce, BounceText};
use crate::error::ScanError;

/// Subjects that mark a mailer-daemon message as a bounce.
pub const BOUNCE_SUBJECT_PATTERNS: &[&str] = &[
    "delivery status notification",
    "undelivered mail",
    "returned",
];

/// Source of candidate bounce messages.
#[async_trait]
pub trait MailboxScanner: Send + Sync {
    /// Flattened bounce messages, newest first.
    async fn fetch_bounces(&self) -> Result<Vec<BounceText>, ScanError>;
}

/// Whether a subject line looks like a bounce.
pub fn is_bounce_subject(subject: &str) -> bool {
    let lower = subject.to_lowercase();
    BOUNCE_SUBJECT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Connection settings for the monitored mailbox.
#[derive(Clone)]
pub struct ImapScanner {
    host: String,
    port: u16,
    user: String,
    password: String,
    limit: usize,
}

impl std::fmt::Debug for ImapScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapScanner")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("limit", &self.limit)
            .finish()
    }
}

impl ImapScanner {
    pub fn new(host: String, port: u16, user: String, password: String, limit: usize) -> Self {
        Self {
            host,
            port,
            user,
            password,
            limit,
        }
    }

    fn connect(&self) -> Result<imap::Session<TlsStream<TcpStream>>, ScanError> {
        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| ScanError::Connect(format!("TLS connector: {e}")))?;

        let client = imap::connect((self.host.as_str(), self.port), &self.host, &tls)
            .map_err(|e| ScanError::Connect(e.to_string()))?;

        client
            .login(&self.user, &self.password)
            .map_err(|(e, _client)| ScanError::Login(e.to_string()))
    }

    /// Blocking scan body.
    fn scan_blocking(&self) -> Result<Vec<BounceText>, ScanError> {
        if self.user.is_empty() || self.password.is_empty() {
            return Err(ScanError::NotConfigured);
        }

        info!(host = %self.host, port = self.port, user = %self.user, "imap_connecting");
        let mut session = self.connect()?;

        session
            .select("INBOX")
            .map_err(|e| ScanError::Command(format!("SELECT INBOX: {e}")))?;

        let found = session
            .search("FROM \"mailer-daemon\"")
            .map_err(|e| ScanError::Command(format!("SEARCH: {e}")))?;

        let newest = newest_first(found.into_iter().collect(), self.limit);

        info!(candidates = newest.len(), limit = self.limit, "imap_search_complete");

        if newest.is_empty() {
            session.logout().ok();
            return Ok(Vec::new());
        }

        let seq_set = newest
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let fetches = session
            .fetch(&seq_set, "RFC822")
            .map_err(|e| ScanError::Command(format!("FETCH: {e}")))?;

        let mut bounces = Vec::new();
        for fetch in fetches.iter() {
            let Some(body) = fetch.body() else {
                warn!(seq = fetch.message, "imap_fetch_no_body");
                continue;
            };

            let flat = flatten_bounce(body);
            match flat.subject.as_deref() {
                Some(subject) if is_bounce_subject(subject) => bounces.push(flat),
                subject => debug!(seq = fetch.message, subject = ?subject, "imap_not_a_bounce"),
            }
        }

        session.logout().ok();

        // FETCH responses come back in mailbox order.
        bounces.reverse();

        info!(bounces = bounces.len(), "imap_scan_complete");

        Ok(bounces)
    }
}

/// Sort sequence numbers descending and keep the first `limit`.
fn newest_first(mut seqs: Vec<u32>, limit: usize) -> Vec<u32> {
    seqs.sort_unstable_by(|a, b| b.cmp(a));
    seqs.truncate(limit);
    seqs
}

#[async_trait]
impl MailboxScanner for ImapScanner {
    async fn fetch_bounces(&self) -> Result<Vec<BounceText>, ScanError> {
        let scanner = self.clone();
        tokio::task::spawn_blocking(move || scanner.scan_blocking())
            .await
            .map_err(|e| ScanError::Join(e.to_string()))?
    }
}
