// Exact duplicate detection: images whose content digests are equal.

use crate::core::digest::{ContentDigest, DigestAlgorithm};
use crate::error::ItemError;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub digest: ContentDigest,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateReport {
    pub algorithm: DigestAlgorithm,
    pub total: usize,
    pub unique: usize,
    pub duplicate_groups: usize,
    /// Serialized as an object keyed by digest, in first-seen order.
    #[serde(serialize_with = "groups_as_map")]
    pub groups: Vec<DuplicateGroup>,
    pub errors: Vec<ItemError>,
}

fn groups_as_map<S: Serializer>(
    groups: &[DuplicateGroup],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(groups.len()))?;
    for group in groups {
        map.serialize_entry(group.digest.as_str(), &group.members)?;
    }
    map.end()
}

/// Every digest bucket in first-seen order, singletons included.
pub fn bucket_by_digest(
    entries: impl IntoIterator<Item = (String, ContentDigest)>,
) -> Vec<DuplicateGroup> {
    let mut index: HashMap<ContentDigest, usize> = HashMap::new();
    let mut buckets: Vec<DuplicateGroup> = Vec::new();

    for (identifier, digest) in entries {
        match index.get(&digest) {
            Some(&i) => buckets[i].members.push(identifier),
            None => {
                index.insert(digest.clone(), buckets.len());
                buckets.push(DuplicateGroup {
                    digest,
                    members: vec![identifier],
                });
            }
        }
    }

    buckets
}

/// Build the report from already-digested items and the per-item failures.
pub fn group_duplicates(
    algorithm: DigestAlgorithm,
    total: usize,
    digests: Vec<(String, ContentDigest)>,
    errors: Vec<ItemError>,
) -> DuplicateReport {
    let buckets = bucket_by_digest(digests);
    let unique = buckets.len();
    let groups: Vec<DuplicateGroup> = buckets
        .into_iter()
        .filter(|bucket| bucket.members.len() > 1)
        .collect();

    DuplicateReport {
        algorithm,
        total,
        unique,
        duplicate_groups: groups.len(),
        groups,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digested(items: &[(&str, &str)]) -> Vec<(String, ContentDigest)> {
        items
            .iter()
            .map(|(id, d)| (id.to_string(), ContentDigest(d.to_string())))
            .collect()
    }

    #[test]
    fn test_buckets_follow_first_seen_order() {
        let buckets = bucket_by_digest(digested(&[
            ("a", "22"),
            ("b", "11"),
            ("c", "22"),
            ("d", "11"),
            ("e", "33"),
        ]));

        let digests: Vec<&str> = buckets.iter().map(|b| b.digest.as_str()).collect();
        assert_eq!(digests, vec!["22", "11", "33"]);
        assert_eq!(buckets[0].members, vec!["a", "c"]);
        assert_eq!(buckets[1].members, vec!["b", "d"]);
    }

    #[test]
    fn test_every_identifier_in_exactly_one_bucket() {
        let entries = digested(&[("a", "1"), ("b", "2"), ("c", "1"), ("d", "3"), ("e", "2")]);
        let buckets = bucket_by_digest(entries.clone());

        let mut seen: Vec<String> = buckets.iter().flat_map(|b| b.members.clone()).collect();
        seen.sort();
        let mut expected: Vec<String> = entries.into_iter().map(|(id, _)| id).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_singletons_not_reported() {
        let report = group_duplicates(
            DigestAlgorithm::Md5,
            3,
            digested(&[("a", "1"), ("b", "1"), ("c", "2")]),
            Vec::new(),
        );

        assert_eq!(report.total, 3);
        assert_eq!(report.unique, 2);
        assert_eq!(report.duplicate_groups, 1);
        assert_eq!(report.groups[0].members, vec!["a", "b"]);
    }

    #[test]
    fn test_report_json_shape() {
        let report = group_duplicates(
            DigestAlgorithm::Sha1,
            4,
            digested(&[("x", "ff"), ("y", "ee"), ("z", "ff"), ("w", "ee")]),
            Vec::new(),
        );
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains(r#""algorithm":"sha1""#));
        assert!(json.contains(r#""groups":{"ff":["x","z"],"ee":["y","w"]}"#));
        assert!(json.contains(r#""errors":[]"#));
    }
}
