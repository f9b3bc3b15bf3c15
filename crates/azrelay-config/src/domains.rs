//! Routing domain list.
//!
//! The proxied-domain list is a plain text file, one domain per line. Blank
//! lines and `#` comments are ignored; anything that fails the DNS grammar is
//! skipped with a warning instead of failing the load. The parsed list is
//! merged with a built-in baseline, lowercased, deduplicated, and sorted so
//! the generated proxy configuration is deterministic.

use crate::error::Result;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::warn;

/// Domains that are proxied even with no domain file configured.
pub const BASELINE_DOMAINS: &[&str] = &[
    "google.com",
    "youtube.com",
    "facebook.com",
    "twitter.com",
    "instagram.com",
    "github.com",
    "gmail.com",
    "blogspot.com",
    "wikipedia.org",
    "t.co",
    "bit.ly",
    "dropbox.com",
    "pinterest.com",
    "tumblr.com",
    "reddit.com",
    "vimeo.com",
    "dailymotion.com",
    "wordpress.com",
    "flickr.com",
    "imgur.com",
];

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// The set of domains routed through the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    domains: Vec<String>,
}

impl RoutingConfig {
    /// Baseline-only routing, used when no domain file is configured.
    pub fn baseline() -> Self {
        Self::from_lines(std::iter::empty::<&str>())
    }

    /// Load the domain file and merge it with the baseline.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_lines(contents.lines()))
    }

    fn from_lines<I, S>(lines: I) -> Self
    where
        I: Iterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set: BTreeSet<String> =
            BASELINE_DOMAINS.iter().map(|d| d.to_string()).collect();

        for line in lines {
            let line = line.as_ref().trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let domain = line.to_lowercase();
            if is_valid_domain(&domain) {
                set.insert(domain);
            } else {
                warn!(domain = line, "skipping invalid entry in domain file");
            }
        }

        Self {
            domains: set.into_iter().collect(),
        }
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }
}

/// DNS name grammar: labels of 1-63 alphanumeric/hyphen chars with no
/// leading/trailing hyphen, at least two labels, at most 253 chars total.
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > MAX_NAME_LEN {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}
