//! Label similarity metrics.
//!
//! The reconciler only ever talks to the [`LabelMatcher`] trait, so the
//! metric is swappable. The default is binary: normalize (fold diacritics,
//! drop whitespace, lowercase) and compare for equality — 1.0 or 0.0,
//! nothing in between. A graded Jaro-Winkler matcher ships alongside it for
//! callers that want threshold-based resolution.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Pluggable label comparison. Scores are in [0, 1]; two labels merge when
/// the score reaches the matcher's threshold.
pub trait LabelMatcher {
    fn score(&self, a: &str, b: &str) -> f64;

    fn threshold(&self) -> f64 {
        1.0
    }

    fn matches(&self, a: &str, b: &str) -> bool {
        self.score(a, b) >= self.threshold()
    }
}

impl LabelMatcher for Box<dyn LabelMatcher> {
    fn score(&self, a: &str, b: &str) -> f64 {
        self.as_ref().score(a, b)
    }

    fn threshold(&self) -> f64 {
        self.as_ref().threshold()
    }
}

/// Fold a label for comparison: NFKD, strip combining marks, drop all
/// whitespace, lowercase.
pub fn normalize_label(label: &str) -> String {
    label
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Binary metric: 1.0 on exact match after normalization, 0.0 otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct NormalizedExactMatcher;

impl LabelMatcher for NormalizedExactMatcher {
    fn score(&self, a: &str, b: &str) -> f64 {
        if normalize_label(a) == normalize_label(b) {
            1.0
        } else {
            0.0
        }
    }
}

/// Graded metric over normalized labels, with a caller-chosen threshold.
#[derive(Debug, Clone, Copy)]
pub struct JaroWinklerMatcher {
    pub threshold: f64,
}

impl JaroWinklerMatcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for JaroWinklerMatcher {
    fn default() -> Self {
        Self { threshold: 0.92 }
    }
}

impl LabelMatcher for JaroWinklerMatcher {
    fn score(&self, a: &str, b: &str) -> f64 {
        strsim::jaro_winkler(&normalize_label(a), &normalize_label(b))
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }
}
