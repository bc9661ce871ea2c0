//! DNS-SD service type validation (RFC 6763 section 7).

use shared::error::{Error, Result};

const TCP_SUFFIX: &str = "._tcp.local.";
const UDP_SUFFIX: &str = "._udp.local.";

// Service names are at most 15 bytes, excluding the leading underscore.
const MAX_SERVICE_NAME_LEN: usize = 15;
// Instance (or subtype) part of a full name.
const MAX_INSTANCE_NAME_LEN: usize = 63;

/// Validates a service type or full service name and returns the bare type.
///
/// Accepts `_svc._tcp.local.`, `<instance>._svc._udp.local.` and
/// `<sub>._sub._svc._tcp.local.`; the result is always `_svc._tcp.local.` or
/// `_svc._udp.local.`.
pub fn service_type_name(type_: &str) -> Result<String> {
    let suffix = if type_.ends_with(TCP_SUFFIX) {
        TCP_SUFFIX
    } else if type_.ends_with(UDP_SUFFIX) {
        UDP_SUFFIX
    } else {
        return Err(bad(format!(
            "type {type_} must end with '{TCP_SUFFIX}' or '{UDP_SUFFIX}'"
        )));
    };

    let mut remaining: Vec<&str> = type_[..type_.len() - suffix.len()].split('.').collect();
    let name = remaining.pop().unwrap_or_default();

    if name.is_empty() {
        return Err(bad("no service name found".to_owned()));
    }
    if remaining.len() == 1 && remaining[0].is_empty() {
        return Err(bad(format!("type '{type_}' must not start with '.'")));
    }

    let Some(name) = name.strip_prefix('_') else {
        return Err(bad(format!("service name ({name}) must start with '_'")));
    };
    if name.len() > MAX_SERVICE_NAME_LEN {
        return Err(bad(format!("service name ({name}) must be <= 15 bytes")));
    }
    if name.contains("--") {
        return Err(bad(format!("service name ({name}) must not contain '--'")));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(bad(format!(
            "service name ({name}) must not start or end with '-'"
        )));
    }
    if !name.chars().any(|c| c.is_ascii_alphabetic()) {
        return Err(bad(format!(
            "service name ({name}) must contain at least one letter (eg: 'A-Z')"
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(bad(format!(
            "service name ({name}) must contain only these characters: A-Z, a-z, 0-9, hyphen ('-')"
        )));
    }

    if remaining.last() == Some(&"_sub") {
        remaining.pop();
        if remaining.is_empty() || remaining.iter().all(|l| l.is_empty()) {
            return Err(bad("_sub requires a subtype name".to_owned()));
        }
    }

    if !remaining.is_empty() {
        let instance = remaining.join(".");
        if instance.len() > MAX_INSTANCE_NAME_LEN {
            return Err(bad(format!("too long: '{instance}'")));
        }
        if instance.chars().any(|c| c.is_ascii_control()) {
            return Err(bad(format!(
                "ASCII control character 0x00-0x1F and 0x7F illegal in '{instance}'"
            )));
        }
    }

    Ok(format!("_{name}{suffix}"))
}

fn bad(reason: String) -> Error {
    Error::ErrBadTypeInName(reason)
}
