//! Delivery-status-notification parsing.
//!
//! MTAs format bounces inconsistently, so extraction tries several
//! strategies in order and the first hit wins:
//!
//! 1. `X-Failed-Recipients:` header
//! 2. `Final-Recipient:` field of a `message/delivery-status` part
//! 3. "addresses had fatal errors" block followed by `[address]`
//!
//! The reason comes from `Diagnostic-Code:` when present. A message that
//! matches no strategy yields `None`; callers log it and move on.

use std::sync::OnceLock;

use mailparse::{parse_mail, MailHeaderMap, ParsedMail};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::model::{BounceRecord, DsnStrategy};

/// Reason recorded when no `Diagnostic-Code:` is found.
pub const UNKNOWN_REASON: &str = "Unknown Bounce Reason";

fn failed_recipients_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^X-Failed-Recipients:\s*<?([^\s,<>;]+@[^\s,<>;]+?)>?\s*(?:[,;]|$)")
            .expect("valid regex")
    })
}

fn final_recipient_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)Final-Recipient:\s*(?:rfc822\s*;\s*)?<?([^\s<>;]+@[^\s<>;]+?)>?\s*$")
            .expect("valid regex")
    })
}

fn fatal_errors_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)addresses had fatal errors.*?[\[<]([^\s\[\]<>]+@[^\s\[\]<>]+)[\]>]")
            .expect("valid regex")
    })
}

fn diagnostic_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)Diagnostic-Code:\s*(?:smtp\s*;\s*)?(.+?)\s*$").expect("valid regex")
    })
}

/// Extract the failed address and reason from bounce text.
pub fn parse_dsn(text: &str) -> Option<BounceRecord> {
    let (failed_email, strategy) = extract_failed_email(text)?;
    let reason = extract_reason(text);

    info!(
        failed_email = %failed_email,
        strategy = ?strategy,
        reason = %reason,
        "dsn_parsed"
    );

    Some(BounceRecord {
        failed_email,
        reason,
        strategy,
    })
}

fn extract_failed_email(text: &str) -> Option<(String, DsnStrategy)> {
    let strategies = [
        (failed_recipients_re(), DsnStrategy::FailedRecipientsHeader),
        (final_recipient_re(), DsnStrategy::FinalRecipient),
        (fatal_errors_re(), DsnStrategy::FatalErrorsBlock),
    ];

    for (re, strategy) in strategies {
        if let Some(caps) = re.captures(text) {
            let email = caps[1].trim().to_lowercase();
            debug!(strategy = ?strategy, "dsn_strategy_matched");
            return Some((email, strategy));
        }
    }

    None
}

fn extract_reason(text: &str) -> String {
    diagnostic_code_re()
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| UNKNOWN_REASON.to_string())
}

// =============================================================================
// MIME flattening
// =============================================================================

/// Bounce message reduced to what the parser needs.
#[derive(Debug, Clone, PartialEq)]
pub struct BounceText {
    pub subject: Option<String>,
    /// Top-level headers followed by every text and delivery-status part
    pub text: String,
}

/// Flatten a raw RFC 5322 message into header lines plus the decoded text of
/// every `text/*`, `message/delivery-status` and `message/rfc822` part.
///
/// Input that does not parse as MIME is passed through as plain text.
pub fn flatten_bounce(raw: &[u8]) -> BounceText {
    let mail = match parse_mail(raw) {
        Ok(mail) => mail,
        Err(e) => {
            warn!(error = %e, "dsn_mime_parse_failed");
            return BounceText {
                subject: None,
                text: String::from_utf8_lossy(raw).into_owned(),
            };
        }
    };

    let subject = mail.headers.get_first_value("Subject");

    let mut text = String::new();
    for header in &mail.headers {
        text.push_str(&header.get_key());
        text.push_str(": ");
        text.push_str(&header.get_value());
        text.push('\n');
    }
    text.push('\n');

    collect_parts(&mail, &mut text);

    BounceText { subject, text }
}

/// Append the bodies of relevant parts, depth first.
fn collect_parts(part: &ParsedMail, out: &mut String) {
    let mimetype = part.ctype.mimetype.to_ascii_lowercase();

    if mimetype.starts_with("multipart/") {
        for sub in &part.subparts {
            collect_parts(sub, out);
        }
        return;
    }

    let wanted = mimetype.starts_with("text/")
        || mimetype == "message/delivery-status"
        || mimetype == "message/rfc822"
        || mimetype == "message/global-delivery-status";

    if !wanted {
        debug!(content_type = %mimetype, "dsn_part_skipped");
        return;
    }

    match part.get_body() {
        Ok(body) => {
            out.push_str(&body);
            out.push('\n');
        }
        Err(e) => warn!(content_type = %mimetype, error = %e, "dsn_part_decode_failed"),
    }
}
