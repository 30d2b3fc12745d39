//! Domain input normalization
//!
//! Users paste URLs, mixed case and stray whitespace. Lookups work on a
//! lowercase host name that keeps an explicit trailing dot.

use crate::dns::errors::LookupError;

const MAX_DNS_LABEL_LENGTH: usize = 63;
const MAX_DNS_NAME_LENGTH: usize = 253;

/// Reduce user input to a lowercase domain name
///
/// Strips a scheme, credentials, port, path, query and fragment. A trailing
/// dot present in the input is kept. The root is returned as `"."`.
pub fn clean_domain(input: &str) -> Result<String, LookupError> {
    let mut host = input.trim();

    if let Some(idx) = host.find("://") {
        host = &host[idx + 3..];
    }
    if let Some(idx) = host.find(|c: char| c == '/' || c == '?' || c == '#') {
        host = &host[..idx];
    }
    if let Some(idx) = host.rfind('@') {
        host = &host[idx + 1..];
    }
    if let Some(idx) = host.find(':') {
        host = &host[..idx];
    }

    let host = host.trim().to_ascii_lowercase();
    if host == "." {
        return Ok(host);
    }

    let bare = host.strip_suffix('.').unwrap_or(&host);
    if bare.is_empty() || bare.len() > MAX_DNS_NAME_LENGTH {
        return Err(LookupError::InvalidDomain(input.to_string()));
    }

    let valid = bare.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_DNS_LABEL_LENGTH
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    });
    if !valid {
        return Err(LookupError::InvalidDomain(input.to_string()));
    }

    Ok(host)
}

/// Name without its trailing dot; the root stays `"."`
pub fn bare_name(domain: &str) -> &str {
    if domain == "." {
        return domain;
    }
    domain.strip_suffix('.').unwrap_or(domain)
}

/// `clean_domain` without the trailing dot, the form zone names take
pub fn bare_domain(input: &str) -> Result<String, LookupError> {
    let domain = clean_domain(input)?;
    Ok(bare_name(&domain).to_string())
}

/// Rightmost label of a name
pub fn tld_of(domain: &str) -> Option<&str> {
    let bare = bare_name(domain);
    if bare == "." || bare.is_empty() {
        return None;
    }
    bare.rsplit('.').next()
}
