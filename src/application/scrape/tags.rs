//! Keyword tagging for scraped posts.

use std::collections::BTreeSet;

pub const DEFAULT_TAG: &str = "databases";

const TAG_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "distributed-systems",
        &["distributed", "multi-region", "geo-distributed", "replication"],
    ),
    ("reliability", &["reliability", "resilience", "failover", "uptime"]),
    (
        "disaster-recovery",
        &["disaster recovery", "backup", "restore", "recovery"],
    ),
    (
        "product-management",
        &["product", "pricing", "packaging", "strategy"],
    ),
    ("pricing", &["pricing", "cost", "billing"]),
    ("cloud", &["cloud", "aws", "gcp", "azure"]),
    ("security", &["security", "authentication", "encryption"]),
    ("performance", &["performance", "optimization", "latency"]),
    ("migration", &["migration", "migrate", "migrating"]),
    ("architecture", &["architecture", "design", "pattern"]),
];

/// Sorted, de-duplicated tags for a post; always contains [`DEFAULT_TAG`].
pub fn derive_tags(title: &str, excerpt_text: &str) -> Vec<String> {
    let haystack = format!("{title} {excerpt_text}").to_lowercase();

    let mut tags = BTreeSet::from([DEFAULT_TAG]);
    tags.extend(
        TAG_KEYWORDS
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|keyword| haystack.contains(keyword)))
            .map(|(tag, _)| *tag),
    );

    tags.into_iter().map(str::to_string).collect()
}
