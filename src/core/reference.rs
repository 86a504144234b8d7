use crate::core::fingerprint::{validate_threshold, Fingerprint};
use crate::error::{ItemError, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceMatch {
    pub identifier: String,
    pub distance: u32,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferenceReport {
    pub reference_fingerprint: Fingerprint,
    pub threshold: u32,
    pub total_candidates: usize,
    pub matched: usize,
    pub matches: Vec<ReferenceMatch>,
    pub errors: Vec<ItemError>,
}

/// Candidates within `threshold` of `reference`, nearest first.
///
/// Ties keep candidate order.
pub fn rank_matches(
    reference: &Fingerprint,
    candidates: Vec<(String, Fingerprint)>,
    threshold: u32,
) -> Result<Vec<ReferenceMatch>> {
    validate_threshold(threshold, reference.width())?;

    let mut matches = Vec::new();
    for (identifier, fingerprint) in candidates {
        let distance = reference.distance(&fingerprint)?;
        if distance <= threshold {
            matches.push(ReferenceMatch {
                identifier,
                distance,
                fingerprint,
            });
        }
    }

    // `sort_by_key` is stable.
    matches.sort_by_key(|m| m.distance);
    Ok(matches)
}
