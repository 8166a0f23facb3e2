//! Bounce intake: mailbox polling and DSN parsing.

pub mod dsn;
pub mod scanner;

pub use dsn::{flatten_bounce, parse_dsn, BounceText, UNKNOWN_REASON};
pub use scanner::{is_bounce_subject, ImapScanner, MailboxScanner};
