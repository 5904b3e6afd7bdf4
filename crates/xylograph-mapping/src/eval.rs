//! Accuracy scoring against a ground-truth type list.
//!
//! Used only by the offline evaluator: a discovered entity-type set is
//! compared against a hand-labeled list of expected type identifiers.
//! Empty inputs yield defined zeros, never a division panic.

use std::collections::BTreeSet;

/// Precision/recall/F-score over a discovered vs. ground-truth set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accuracy {
    pub precision: f64,
    pub recall: f64,
    pub f_score: f64,
    pub beta: f64,
    pub intersection: usize,
}

impl Accuracy {
    /// Score `discovered` against `ground`. `beta` weights recall in the
    /// F-score; `beta = 1.0` is the harmonic mean.
    pub fn measure(discovered: &BTreeSet<String>, ground: &BTreeSet<String>, beta: f64) -> Self {
        let intersection = discovered.intersection(ground).count();

        let precision = if discovered.is_empty() {
            0.0
        } else {
            intersection as f64 / discovered.len() as f64
        };
        let recall = if ground.is_empty() {
            0.0
        } else {
            intersection as f64 / ground.len() as f64
        };

        let b2 = beta * beta;
        let denom = b2 * precision + recall;
        let f_score = if denom == 0.0 {
            0.0
        } else {
            (1.0 + b2) * precision * recall / denom
        };

        Self {
            precision,
            recall,
            f_score,
            beta,
            intersection,
        }
    }
}

/// Parse a flat newline-separated ground-truth list. Blank lines and `#`
/// comment lines are ignored; identifiers are trimmed.
pub fn parse_ground_truth(text: &str) -> BTreeSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
