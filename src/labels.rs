use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

use index_vec::{Idx, IndexVec};
use rand::{seq::SliceRandom, Rng};
use serde::Deserialize;
use tracing::info;

use crate::{
    store::{BugId, TestId},
    Error, Result,
};

/// Disjoint sets over `0..n` with path halving and union by rank.
pub struct UnionFind<I: Idx> {
    parent: IndexVec<I, I>,
    rank: IndexVec<I, u32>,
}

impl<I: Idx> UnionFind<I> {
    pub fn new(len: usize) -> Self {
        UnionFind {
            parent: (0..len).map(I::from_usize).collect(),
            rank: IndexVec::from_vec(vec![0; len]),
        }
    }

    pub fn find(&mut self, mut node: I) -> I {
        while node != self.parent[node] {
            self.parent[node] = self.parent[self.parent[node]];
            node = self.parent[node];
        }
        node
    }

    /// Returns whether `p` and `q` were in different sets.
    pub fn union(&mut self, p: I, q: I) -> bool {
        let (i, j) = (self.find(p), self.find(q));
        if i == j {
            return false;
        }
        if self.rank[i] < self.rank[j] {
            self.parent[i] = j;
        } else {
            if self.rank[i] == self.rank[j] {
                self.rank[i] += 1;
            }
            self.parent[j] = i;
        }
        true
    }
}

/// Which bug a bug was closed as a duplicate of.
pub trait DuplicateGraph {
    fn duplicate_of(&self, bug_id: BugId) -> Result<Option<BugId>>;
}

/// Duplicate links exported from the bug tracker as a JSON object
/// `{ "<bug id>": <bug id it duplicates>, ... }`.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct DuplicateTable {
    duplicates: HashMap<BugId, BugId>,
}

impl DuplicateTable {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?)
    }
}

impl FromIterator<(BugId, BugId)> for DuplicateTable {
    fn from_iter<T: IntoIterator<Item = (BugId, BugId)>>(iter: T) -> Self {
        DuplicateTable {
            duplicates: iter.into_iter().collect(),
        }
    }
}

impl DuplicateGraph for DuplicateTable {
    fn duplicate_of(&self, bug_id: BugId) -> Result<Option<BugId>> {
        Ok(self.duplicates.get(&bug_id).copied())
    }
}

index_vec::define_index_type! {
    pub struct BugIndex = usize;
}

/// Test cases presumed to share a root cause.
pub type LabelGroup = Vec<TestId>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Label {
    Negative = 0,
    Positive = 1,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SamplePair {
    pub test_ids: [TestId; 2],
    pub label: Label,
}

/// Test cases per bug, in order of first appearance.
pub fn bug_map(reports: impl IntoIterator<Item = (TestId, BugId)>) -> IndexVec<BugIndex, (BugId, Vec<TestId>)> {
    let mut result: IndexVec<BugIndex, (BugId, Vec<TestId>)> = IndexVec::new();
    let mut positions: HashMap<BugId, BugIndex> = HashMap::new();
    for (test_id, bug_id) in reports {
        let position = *positions.entry(bug_id).or_insert_with(|| result.push((bug_id, vec![])));
        result[position].1.push(test_id);
    }
    result
}

/// Merges the test cases of bugs linked by duplicate relations. Groups with
/// fewer than two test cases are dropped since they cannot form a pair.
pub fn group_labels(
    reports: impl IntoIterator<Item = (TestId, BugId)>,
    duplicates: &dyn DuplicateGraph,
) -> Result<Vec<LabelGroup>> {
    let bugs = bug_map(reports);
    let positions: HashMap<BugId, BugIndex> = bugs
        .iter_enumerated()
        .map(|(index, (bug_id, _))| (*bug_id, index))
        .collect();

    let mut union_find = UnionFind::<BugIndex>::new(bugs.len());
    for (index, (bug_id, _)) in bugs.iter_enumerated() {
        if let Some(original) = duplicates.duplicate_of(*bug_id)? {
            if let Some(&original_index) = positions.get(&original) {
                union_find.union(index, original_index);
            }
        }
    }

    let mut groups: Vec<LabelGroup> = vec![];
    let mut group_of_root: HashMap<BugIndex, usize> = HashMap::new();
    for (index, (_, test_ids)) in bugs.iter_enumerated() {
        let root = union_find.find(index);
        let group = *group_of_root.entry(root).or_insert_with(|| {
            groups.push(vec![]);
            groups.len() - 1
        });
        groups[group].extend(test_ids.iter().cloned());
    }
    groups.retain(|group| group.len() > 1);
    Ok(groups)
}

/// Every pair within a group is positive. As many negatives are drawn by
/// picking two distinct groups and one test case from each, with
/// replacement across draws. Every group must hold at least two test cases.
pub fn sample_pairs(groups: &[LabelGroup], rng: &mut impl Rng) -> Result<Vec<SamplePair>> {
    if let Some(group) = groups.iter().position(|group| group.len() < 2) {
        return Err(Error::InsufficientData(format!(
            "group #{group} has {} test cases, pairs need 2",
            groups[group].len()
        )));
    }
    let mut positives = vec![];
    for group in groups {
        for (i, first) in group.iter().enumerate() {
            for second in &group[i + 1..] {
                positives.push(SamplePair {
                    test_ids: [first.clone(), second.clone()],
                    label: Label::Positive,
                });
            }
        }
    }
    if positives.is_empty() {
        return Err(Error::InsufficientData("no group holds two test cases".to_owned()));
    }
    if groups.len() < 2 {
        return Err(Error::InsufficientData(format!(
            "negative pairs need at least 2 groups, found {}",
            groups.len()
        )));
    }

    let mut negatives = Vec::with_capacity(positives.len());
    for _ in 0..positives.len() {
        let chosen = rand::seq::index::sample(&mut *rng, groups.len(), 2);
        let picks = [chosen.index(0), chosen.index(1)].map(|group| groups[group].choose(&mut *rng));
        let [Some(first), Some(second)] = picks else {
            continue;
        };
        negatives.push(SamplePair {
            test_ids: [first.clone(), second.clone()],
            label: Label::Negative,
        });
    }

    info!(pairs = positives.len(), "sampled positive and negative pairs");
    negatives.append(&mut positives);
    Ok(negatives)
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;

    fn reports(items: &[(&str, BugId)]) -> Vec<(TestId, BugId)> {
        items.iter().map(|&(test_id, bug_id)| (test_id.to_owned(), bug_id)).collect()
    }

    fn node(index: usize) -> BugIndex {
        BugIndex::new(index)
    }

    fn roots(union_find: &mut UnionFind<BugIndex>, len: usize) -> usize {
        let mut roots: Vec<BugIndex> = (0..len).map(|index| union_find.find(node(index))).collect();
        roots.sort();
        roots.dedup();
        roots.len()
    }

    #[test]
    fn union_find_merges_transitively() {
        let mut union_find = UnionFind::<BugIndex>::new(6);
        assert!(union_find.union(node(0), node(1)));
        assert!(union_find.union(node(2), node(3)));
        assert!(union_find.union(node(1), node(3)));
        assert!(!union_find.union(node(0), node(2)));
        let root = union_find.find(node(0));
        for index in 1..4 {
            assert_eq!(union_find.find(node(index)), root);
        }
        assert_ne!(union_find.find(node(4)), root);
        assert_eq!(roots(&mut union_find, 6), 3);
    }

    #[test]
    fn union_removes_at_most_one_root() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);
        let len = 50;
        let mut union_find = UnionFind::<BugIndex>::new(len);
        let mut before = roots(&mut union_find, len);
        for _ in 0..200 {
            let merged = union_find.union(node(rng.gen_range(0..len)), node(rng.gen_range(0..len)));
            let after = roots(&mut union_find, len);
            assert_eq!(before - after, usize::from(merged));
            before = after;
        }
    }

    #[test]
    fn bug_map_keeps_first_appearance_order() {
        let map = bug_map(reports(&[("t1", 7), ("t2", 3), ("t3", 7)]));
        assert_eq!(map.len(), 2);
        assert_eq!(map[BugIndex::new(0)], (7, vec!["t1".to_owned(), "t3".to_owned()]));
        assert_eq!(map[BugIndex::new(1)], (3, vec!["t2".to_owned()]));
    }

    #[test]
    fn duplicates_join_groups() {
        let duplicates: DuplicateTable = [(2, 1), (3, 2), (5, 99)].into_iter().collect();
        let groups = group_labels(
            reports(&[("a", 1), ("b", 2), ("c", 3), ("d", 4), ("e", 5), ("f", 5)]),
            &duplicates,
        )
        .unwrap();
        assert_eq!(
            groups,
            vec![
                vec!["a".to_owned(), "b".to_owned(), "c".to_owned()],
                vec!["e".to_owned(), "f".to_owned()],
            ]
        );
    }

    #[test]
    fn sampling_balances_labels() {
        let groups = vec![
            vec!["a".to_owned(), "b".to_owned(), "c".to_owned()],
            vec!["d".to_owned(), "e".to_owned()],
        ];
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);
        let pairs = sample_pairs(&groups, &mut rng).unwrap();
        let positives: Vec<_> = pairs.iter().filter(|pair| pair.label == Label::Positive).collect();
        let negatives: Vec<_> = pairs.iter().filter(|pair| pair.label == Label::Negative).collect();
        assert_eq!(positives.len(), 4);
        assert_eq!(negatives.len(), 4);
        let group_of = |test_id: &str| groups.iter().position(|group| group.iter().any(|id| id == test_id));
        for pair in negatives {
            assert_ne!(group_of(&pair.test_ids[0]), group_of(&pair.test_ids[1]));
        }
        for pair in positives {
            assert_eq!(group_of(&pair.test_ids[0]), group_of(&pair.test_ids[1]));
        }
    }

    #[test]
    fn sampling_needs_two_groups() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);
        let one_group = vec![vec!["a".to_owned(), "b".to_owned()]];
        assert!(matches!(sample_pairs(&one_group, &mut rng), Err(Error::InsufficientData(_))));
        assert!(matches!(sample_pairs(&[], &mut rng), Err(Error::InsufficientData(_))));
    }

    #[test]
    fn sampling_rejects_small_groups() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);
        let groups = vec![vec!["a".to_owned(), "b".to_owned()], vec![], vec!["c".to_owned()]];
        assert!(matches!(sample_pairs(&groups, &mut rng), Err(Error::InsufficientData(_))));
    }
}
