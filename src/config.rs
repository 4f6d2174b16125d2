//! Configuration file handling for mailbucket.

use crate::error::Error;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Candidate config file locations, searched in order.
pub const CONFIG_PATHS: [&str; 2] = ["/usr/local/bin/mailbucket/config.json", "config.json"];

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub request_config: RequestConfig,
    pub mailboxes: Vec<Mailbox>,
}

/// Settings for the request to the object-store API.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestConfig {
    pub region: String,
    /// Upload bound in seconds; 0 disables the bound.
    #[serde(default)]
    pub timeout: u64,
    /// Pin the regional endpoint instead of the SDK default.
    #[serde(default)]
    pub endpoint: bool,
}

/// Destination settings for a single recipient address.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mailbox {
    pub address: String,
    pub bucket: String,
    /// KMS master key for client-side encryption; empty stores unencrypted.
    #[serde(default)]
    pub cmk_key_arn: String,
    /// Object key prefix, literal or `dateTimeFormat(<layout>)`.
    #[serde(default)]
    pub key_prefix: String,
}

impl Config {
    /// Load configuration from the first candidate path that exists.
    pub fn load(candidates: &[&str]) -> Result<Self, Error> {
        for path in candidates {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }
        Err(Error::ConfigNotFound(candidates.join(", ")))
    }

    /// Load configuration from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    fn from_json(content: &str) -> Result<Self, Error> {
        let config: Config = serde_json::from_str(content)?;

        let dupes = duplicate_addresses(&config.mailboxes);
        if !dupes.is_empty() {
            log::warn!(
                "duplicate mailbox configuration found for user(s): {}. \
                 Only the first configured mailbox will be matched.",
                dupes.join(", ")
            );
        }

        Ok(config)
    }
}

/// Addresses configured more than once, lowercased, in first-seen order.
/// Advisory only: the resolver keeps matching the first configured entry.
fn duplicate_addresses(mailboxes: &[Mailbox]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut dupes = Vec::new();
    for mailbox in mailboxes {
        let address = mailbox.address.to_ascii_lowercase();
        if !seen.insert(address.clone()) && !dupes.contains(&address) {
            dupes.push(address);
        }
    }
    dupes
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    const EXAMPLE: &str = r#"{
        "requestConfig": {
            "region": "eu-west-1",
            "timeout": 15,
            "endpoint": true
        },
        "mailboxes": [
            {
                "address": "bob@example.org",
                "bucket": "example-mail",
                "cmkKeyArn": "arn:aws:kms:eu-west-1:123456789012:key/abc",
                "keyPrefix": "dateTimeFormat(2006/01/02)"
            },
            {
                "address": "CatchAll",
                "bucket": "example-mail-catchall"
            }
        ]
    }"#;

    #[test]
    fn test_parse_config() -> TestResult {
        let config = Config::from_json(EXAMPLE)?;

        assert_eq!(config.request_config.region, "eu-west-1");
        assert_eq!(config.request_config.timeout, 15);
        assert!(config.request_config.endpoint);

        assert_eq!(config.mailboxes.len(), 2);
        let first = config.mailboxes.first().expect("no mailboxes");
        assert_eq!(first.address, "bob@example.org");
        assert_eq!(first.bucket, "example-mail");
        assert_eq!(first.key_prefix, "dateTimeFormat(2006/01/02)");

        // Optional fields default to empty.
        let second = config.mailboxes.get(1).expect("one mailbox");
        assert_eq!(second.cmk_key_arn, "");
        assert_eq!(second.key_prefix, "");
        Ok(())
    }

    #[test]
    fn test_invalid_syntax_is_an_error() {
        assert!(Config::from_json("{not json").is_err());
    }

    #[test]
    fn test_timeout_and_endpoint_default() -> TestResult {
        let config = Config::from_json(
            r#"{"requestConfig": {"region": "us-east-1"}, "mailboxes": []}"#,
        )?;
        assert_eq!(config.request_config.timeout, 0);
        assert!(!config.request_config.endpoint);
        Ok(())
    }

    #[test]
    fn test_duplicate_addresses() {
        let mailboxes = vec![
            Mailbox {
                address: "a@x.com".to_string(),
                ..Mailbox::default()
            },
            Mailbox {
                address: "A@X.COM".to_string(),
                ..Mailbox::default()
            },
            Mailbox {
                address: "b@x.com".to_string(),
                ..Mailbox::default()
            },
            Mailbox {
                address: "a@x.com".to_string(),
                ..Mailbox::default()
            },
        ];
        assert_eq!(duplicate_addresses(&mailboxes), vec!["a@x.com".to_string()]);
    }

    #[test]
    fn test_no_candidate_found() {
        let result = Config::load(&["/nonexistent/mailbucket/config.json"]);
        assert!(matches!(result, Err(Error::ConfigNotFound(_))));
    }

    #[test]
    fn test_load_prefers_first_existing_candidate() -> TestResult {
        let dir = std::env::temp_dir().join(format!("mailbucket-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir)?;
        let first = dir.join("first.json");
        let second = dir.join("second.json");
        std::fs::write(
            &first,
            r#"{"requestConfig": {"region": "first"}, "mailboxes": []}"#,
        )?;
        std::fs::write(
            &second,
            r#"{"requestConfig": {"region": "second"}, "mailboxes": []}"#,
        )?;
        let candidates = [
            first.to_str().expect("utf-8 path"),
            second.to_str().expect("utf-8 path"),
        ];

        let config = Config::load(&candidates)?;
        assert_eq!(config.request_config.region, "first");

        // A missing first candidate falls through to the next one.
        std::fs::remove_file(&first)?;
        let config = Config::load(&candidates)?;
        assert_eq!(config.request_config.region, "second");

        std::fs::remove_file(&second)?;
        std::fs::remove_dir(&dir)?;
        Ok(())
    }
}
