//! Per-recipient placeholder substitution for subject and body templates.

/// Greeting used when a recipient has no first name.
pub const DEFAULT_FIRST_NAME: &str = "Friend";

/// Substitute `{{firstName}}`, `{{lastName}}` and `{{company}}` (and their
/// single-brace forms). Name fields are inserted verbatim, without HTML
/// escaping.
pub fn render(
    template: &str,
    first_name: Option<&str>,
    last_name: Option<&str>,
    company: Option<&str>,
) -> String {
    let first_name = non_blank(first_name).unwrap_or(DEFAULT_FIRST_NAME);
    let last_name = non_blank(last_name).unwrap_or("");
    let company = non_blank(company).unwrap_or("");

    let lookup = |key: &str| match key {
        "firstName" => Some(first_name),
        "lastName" => Some(last_name),
        "company" => Some(company),
        _ => None,
    };

    // One pass over the template; inserted values are never rescanned.
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];

        match placeholder(tail).and_then(|(key, len)| lookup(key).map(|v| (v, len))) {
            Some((value, len)) => {
                out.push_str(value);
                rest = &tail[len..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Parse `{{key}}` or `{key}` at the start of `s`, returning the key and the
/// placeholder's byte length.
fn placeholder(s: &str) -> Option<(&str, usize)> {
    if let Some(inner) = s.strip_prefix("{{") {
        if let Some(end) = inner.find("}}") {
            return Some((&inner[..end], end + 4));
        }
    }
    let inner = s.strip_prefix('{')?;
    let end = inner.find('}')?;
    Some((&inner[..end], end + 2))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
