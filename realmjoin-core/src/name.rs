//! Domain name normalization and validation.
//!
//! User-entered strings are normalized into canonical domain form before a
//! provider will look at them. Invalid input is never an error: it simply
//! means the provider has no match for the string.

const ALLOWED_CHARS: &str = "abcdefghijklmnopqrstuvwxyz0123456789-.";

/// Normalize a user-entered string into a canonical domain name.
///
/// Lowercases and trims the input, then validates: non-empty, restricted
/// character set, no doubled dots, no leading dot. A single trailing dot
/// (the DNS root) is stripped. Returns `None` for anything invalid.
pub fn normalize_domain_name(input: &str) -> Option<String> {
    let mut domain = input.trim().to_ascii_lowercase();

    if domain.ends_with('.') {
        domain.pop();
    }

    if domain.is_empty()
        || !domain.chars().all(|c| ALLOWED_CHARS.contains(c))
        || domain.contains("..")
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return None;
    }

    Some(domain)
}

/// Whether `domain` is `suffix` itself or a subdomain of it.
pub fn domain_has_suffix(domain: &str, suffix: &str) -> bool {
    domain == suffix
        || (domain.len() > suffix.len() + 1
            && domain.ends_with(suffix)
            && domain.as_bytes()[domain.len() - suffix.len() - 1] == b'.')
}
