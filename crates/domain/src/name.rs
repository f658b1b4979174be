//! DNS name normalization and zone matching.
//!
//! Names are handled as lowercase fully-qualified strings ("example.org.").
//! Normalization happens once at the edges (setup, admission); the trie and
//! the matcher assume already-normalized input.

/// Normalizes `name` to a lowercase FQDN. Returns `None` when the input
/// cannot be a DNS name pattern (empty, oversized label, host:port forms).
pub fn normalize(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    if name == "." {
        return Some(".".to_string());
    }
    if name
        .chars()
        .any(|c| c == ':' || c == '/' || c.is_whitespace())
    {
        return None;
    }
    let mut normalized = name.to_ascii_lowercase();
    if !normalized.ends_with('.') {
        normalized.push('.');
    }
    let body = &normalized[..normalized.len() - 1];
    if body.split('.').any(|label| label.is_empty() || label.len() > 63) {
        return None;
    }
    Some(normalized)
}

/// True when `name` equals `zone` or is a subdomain of it. Both arguments
/// must be normalized FQDNs; the root zone "." matches every name.
pub fn is_under(name: &str, zone: &str) -> bool {
    if zone == "." || name == zone {
        return true;
    }
    name.len() > zone.len()
        && name.ends_with(zone)
        && name.as_bytes()[name.len() - zone.len() - 1] == b'.'
}
