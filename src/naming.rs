//! Object key derivation.

use chrono::{DateTime, Local};
use regex::Regex;
use sha1::{Digest, Sha1};
use std::time::{SystemTime, UNIX_EPOCH};

/// Anchored pattern selecting time-formatted prefixes.
const TEMPLATE_PATTERN: &str = r"^dateTimeFormat\((.*)\)$";

/// Generate a content-free unique object key: the SHA-1 of the decimal
/// current Unix time in nanoseconds, as 40 lowercase hex characters.
///
/// Uniqueness is probabilistic; with nanosecond granularity and one key per
/// invocation no collision check is needed.
pub fn generate_name_hash() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    name_hash(nanos)
}

fn name_hash(nanos: u128) -> String {
    let mut hasher = Sha1::new();
    hasher.update(nanos.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Derive the full object key for `object_id` under a mailbox key prefix.
///
/// A template of the exact form `dateTimeFormat(<layout>)` formats the
/// current local time with the Go-style reference layout; any other
/// non-empty template is a literal path prefix; an empty template yields the
/// object id alone.
pub fn object_key(template: &str, object_id: &str) -> String {
    join_key(&evaluate_prefix(template, Local::now()), object_id)
}

fn evaluate_prefix(template: &str, now: DateTime<Local>) -> String {
    if template.is_empty() {
        return String::new();
    }

    let pattern = match Regex::new(TEMPLATE_PATTERN) {
        Ok(pattern) => pattern,
        Err(e) => {
            // Non-fatal: an unusable pattern must not block delivery.
            log::warn!("key prefix template pattern failed to compile, using empty prefix: {e}");
            return String::new();
        }
    };

    match pattern.captures(template).and_then(|c| c.get(1)) {
        Some(layout) => format_layout(layout.as_str(), now),
        None => template.to_string(),
    }
}

/// Format `now` according to a Go reference-time layout
/// (`Mon Jan 2 15:04:05 2006`). Unrecognized characters pass through
/// verbatim, so a malformed layout still produces some prefix.
fn format_layout(layout: &str, now: DateTime<Local>) -> String {
    // Longer tokens first so e.g. "January" is not consumed as "Jan".
    let tokens = [
        ("January", now.format("%B").to_string()),
        ("Monday", now.format("%A").to_string()),
        ("2006", now.format("%Y").to_string()),
        ("Jan", now.format("%b").to_string()),
        ("Mon", now.format("%a").to_string()),
        ("PM", now.format("%p").to_string()),
        ("pm", now.format("%P").to_string()),
        ("15", now.format("%H").to_string()),
        ("03", now.format("%I").to_string()),
        ("04", now.format("%M").to_string()),
        ("05", now.format("%S").to_string()),
        ("06", now.format("%y").to_string()),
        ("01", now.format("%m").to_string()),
        ("02", now.format("%d").to_string()),
    ];

    let mut out = String::with_capacity(layout.len());
    let mut rest = layout;
    'scan: while !rest.is_empty() {
        for (token, value) in &tokens {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(value);
                rest = tail;
                continue 'scan;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

/// Join prefix and object id, dropping redundant separators the join would
/// otherwise introduce.
fn join_key(prefix: &str, object_id: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let object_id = object_id.trim_start_matches('/');
    if prefix.is_empty() {
        object_id.to_string()
    } else {
        format!("{prefix}/{object_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::*;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2021, 3, 7, 16, 5, 9).unwrap()
    }

    #[test]
    fn test_name_hash_is_40_lowercase_hex_chars() {
        let name = generate_name_hash();
        assert_eq!(name.len(), 40);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_name_hash_is_deterministic_per_timestamp() {
        assert_eq!(name_hash(1_600_000_000_000_000_000), name_hash(1_600_000_000_000_000_000));
    }

    #[test]
    fn test_distinct_timestamps_give_distinct_names() {
        // Uniqueness comes from the clock reading, one key per invocation.
        assert_ne!(
            name_hash(1_600_000_000_000_000_000),
            name_hash(1_600_000_000_000_000_001)
        );
    }

    #[rstest]
    #[case("", "")]
    #[case("mail/incoming", "mail/incoming")]
    #[case("dateTimeFormat(2006)", "2021")]
    #[case("dateTimeFormat(2006/01/02)", "2021/03/07")]
    #[case("dateTimeFormat(2006-01-02-15-04-05)", "2021-03-07-16-05-09")]
    #[case("dateTimeFormat(Jan 2006)", "Mar 2021")]
    // Malformed layouts still produce a prefix, character-for-character.
    #[case("dateTimeFormat(Q%@)", "Q%@")]
    // Not anchored-matching the pattern means the template is literal.
    #[case("prefix dateTimeFormat(2006)x", "prefix dateTimeFormat(2006)x")]
    fn test_evaluate_prefix(#[case] template: &str, #[case] expected: &str) {
        assert_eq!(evaluate_prefix(template, fixed_time()), expected);
    }

    #[test]
    fn test_literal_prefix_is_idempotent() {
        let first = object_key("archive/mail", "abc123");
        let second = object_key("archive/mail", "abc123");
        assert_eq!(first, second);
        assert_eq!(first, "archive/mail/abc123");
    }

    #[test]
    fn test_year_template_prefix() {
        let key = object_key("dateTimeFormat(2006)", "abc123");
        let year = Local::now().format("%Y").to_string();
        assert_eq!(key, format!("{year}/abc123"));
    }

    #[rstest]
    #[case("", "id", "id")]
    #[case("a/b", "id", "a/b/id")]
    #[case("a/b/", "id", "a/b/id")]
    #[case("/a/b/", "/id", "a/b/id")]
    #[case("///", "id", "id")]
    fn test_join_key(#[case] prefix: &str, #[case] object_id: &str, #[case] expected: &str) {
        assert_eq!(join_key(prefix, object_id), expected);
    }
}
