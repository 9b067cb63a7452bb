//! Channel/source name matching
//!
//! Provider catalogs name the same channel in many shapes ("ESPN HD",
//! "ESPN FHD", "US| ESPN 4K", "Espñ"). Matching normalizes both sides —
//! case, diacritics, quality suffixes, punctuation — before scoring with a
//! pluggable similarity strategy. Only scores that exceed the configured
//! threshold produce mappings.

use deunicode::deunicode;

use crate::models::Channel;

/// Tokens that mark quality/transport variants rather than identity.
const QUALITY_TOKENS: &[&str] = &[
    "hd", "fhd", "uhd", "sd", "4k", "8k", "hevc", "h265", "raw", "backup", "vip",
];

/// Normalize a channel or source display name for comparison:
/// lowercase, diacritics folded to ASCII, punctuation collapsed to spaces,
/// quality tokens dropped, whitespace collapsed.
#[must_use]
pub fn normalize_name(raw: &str) -> String {
    let folded = deunicode(raw).to_lowercase();

    let mut cleaned = String::with_capacity(folded.len());
    for ch in folded.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch);
        } else {
            cleaned.push(' ');
        }
    }

    cleaned
        .split_whitespace()
        .filter(|token| !QUALITY_TOKENS.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity strategy over normalized names, returning a confidence in
/// [0, 1].
pub trait NameMatcher: Send + Sync {
    fn score(&self, channel_name: &str, source_name: &str) -> f64;
}

/// Default matcher: Jaro-Winkler over normalized names.
#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinklerMatcher;

impl NameMatcher for JaroWinklerMatcher {
    fn score(&self, channel_name: &str, source_name: &str) -> f64 {
        let a = normalize_name(channel_name);
        let b = normalize_name(source_name);
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        strsim::jaro_winkler(&a, &b)
    }
}

/// Best-scoring channel for a source name, or None when the lineup is
/// empty. The caller applies the threshold.
#[must_use]
pub fn best_match<'a>(
    matcher: &dyn NameMatcher,
    channels: &'a [Channel],
    source_name: &str,
) -> Option<(&'a Channel, f64)> {
    channels
        .iter()
        .map(|channel| (channel, matcher.score(&channel.name, source_name)))
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}
