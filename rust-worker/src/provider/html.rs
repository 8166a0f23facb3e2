//! HTML helpers shared by both transports.
//!
//! Attachments are hosted elsewhere; messages link them as inline images
//! instead of carrying binary parts.

use tracing::warn;
use url::Url;

/// Append one `<img>` block per attachment URL to `body`.
///
/// URLs that are not absolute http(s) URLs are skipped.
pub fn with_inline_images(body: &str, attachments: &[String]) -> String {
    let mut out = body.to_string();

    for raw in attachments {
        let url = match Url::parse(raw.trim()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            Ok(url) => {
                warn!(scheme = url.scheme(), "attachment_url_unsupported_scheme");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "attachment_url_invalid");
                continue;
            }
        };

        out.push_str(&format!(
            "<br><img src=\"{}\" alt=\"Attachment\" style=\"max-width:100%;height:auto;\">",
            escape_attr(url.as_str())
        ));
    }

    out
}

/// Escape a value for use inside a double-quoted HTML attribute.
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Crude text rendering of an HTML body for the plain-text alternative.
pub fn to_plain_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;

    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }

    out.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}
