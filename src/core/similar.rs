// Near-duplicate detection over perceptual fingerprints.
//
// Groups are connected components of the graph whose edges join fingerprints
// at Hamming distance <= threshold. Membership is transitive: two members of a
// group may be further apart than the threshold when a chain of closer members
// links them.

use crate::core::fingerprint::{validate_threshold, Fingerprint, FingerprintMethod};
use crate::error::{ItemError, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimilarityGroup {
    pub members: Vec<String>,
    /// Fingerprint of the earliest member in input order.
    pub representative_fingerprint: Fingerprint,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarityReport {
    pub width: u32,
    pub method: FingerprintMethod,
    pub threshold: u32,
    pub total: usize,
    pub processed: usize,
    pub groups: Vec<SimilarityGroup>,
    pub errors: Vec<ItemError>,
}

/// Disjoint-set forest with path compression and union by rank.
#[derive(Debug)]
pub(crate) struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    pub(crate) fn find(&mut self, i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = i;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    /// Returns false when `i` and `j` were already joined.
    pub(crate) fn union(&mut self, i: usize, j: usize) -> bool {
        let pi = self.find(i);
        let pj = self.find(j);
        if pi == pj {
            return false;
        }
        if self.rank[pi] < self.rank[pj] {
            self.parent[pi] = pj;
        } else if self.rank[pi] > self.rank[pj] {
            self.parent[pj] = pi;
        } else {
            self.parent[pj] = pi;
            self.rank[pi] += 1;
        }
        true
    }
}

/// Partition fingerprinted items into similarity groups.
///
/// Every fingerprint must share width and method, and `threshold` must lie in
/// `0..=bit_len`. Groups are ordered by their earliest member; members keep
/// input order; singletons are dropped.
pub fn group_similar(
    entries: &[(String, Fingerprint)],
    threshold: u32,
) -> Result<Vec<SimilarityGroup>> {
    let Some((_, first)) = entries.first() else {
        return Ok(Vec::new());
    };
    validate_threshold(threshold, first.width())?;
    for (identifier, fp) in &entries[1..] {
        if let Err(e) = first.check_comparable(fp) {
            log::warn!("Rejecting batch, {} is incompatible", identifier);
            return Err(e);
        }
    }

    let n = entries.len();
    let mut sets = UnionFind::new(n);
    let mut edges = 0usize;
    for i in 0..n {
        for j in (i + 1)..n {
            let distance = entries[i].1.distance(&entries[j].1)?;
            if distance <= threshold {
                edges += 1;
                sets.union(i, j);
            }
        }
    }
    log::debug!("{} items, {} edges at threshold {}", n, edges, threshold);

    // Component order follows the lowest index seen for each root.
    let mut slot_of_root: Vec<Option<usize>> = vec![None; n];
    let mut components: Vec<Vec<usize>> = Vec::new();
    for i in 0..n {
        let root = sets.find(i);
        match slot_of_root[root] {
            Some(slot) => components[slot].push(i),
            None => {
                slot_of_root[root] = Some(components.len());
                components.push(vec![i]);
            }
        }
    }

    Ok(components
        .into_iter()
        .filter(|members| members.len() > 1)
        .map(|members| SimilarityGroup {
            representative_fingerprint: entries[members[0]].1.clone(),
            members: members.into_iter().map(|i| entries[i].0.clone()).collect(),
        })
        .collect())
}
