//! Union-Find with path compression and union-by-rank, shared by the
//! track clusterer (C6) and the album clusterer's fingerprint slow path
//! (C8). Both need the same "cluster pairs above a threshold into groups"
//! primitive; only what gets unioned, and what gets attached to the
//! resulting group, differs.

pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }

    /// Group every index `0..n` by root, in deterministic order: groups are
    /// ordered by the smallest member index in each root, and each group's
    /// members are in ascending index order.
    pub fn groups(&mut self) -> Vec<Vec<usize>> {
        let n = self.parent.len();
        let mut by_root: std::collections::BTreeMap<usize, Vec<usize>> =
            std::collections::BTreeMap::new();
        for i in 0..n {
            let root = self.find(i);
            by_root.entry(root).or_default().push(i);
        }
        // BTreeMap iterates by root id, not by smallest-member — but since
        // the smallest member of a root is unioned into that root via
        // union-by-rank (not necessarily the smallest index), sort
        // explicitly by each group's minimum index.
        let mut groups: Vec<Vec<usize>> = by_root.into_values().collect();
        groups.sort_by_key(|g| *g.iter().min().unwrap());
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrelated_elements_stay_in_singleton_groups() {
        let mut uf = UnionFind::new(4);
        let groups = uf.groups();
        assert_eq!(groups.len(), 4);
    }

    #[test]
    fn union_merges_groups() {
        let mut uf = UnionFind::new(5);
        uf.union(0, 1);
        uf.union(1, 2);
        uf.union(3, 4);
        let groups = uf.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], vec![0, 1, 2]);
        assert_eq!(groups[1], vec![3, 4]);
    }

    #[test]
    fn groups_ordered_by_smallest_index() {
        let mut uf = UnionFind::new(6);
        uf.union(5, 4);
        uf.union(1, 0);
        let groups = uf.groups();
        // group containing 0 should come before group containing 4
        assert_eq!(groups[0], vec![0, 1]);
        assert_eq!(groups[1], vec![4, 5]);
    }

    #[test]
    fn path_compression_keeps_find_consistent() {
        let mut uf = UnionFind::new(10);
        for i in 1..10 {
            uf.union(0, i);
        }
        let root = uf.find(0);
        for i in 1..10 {
            assert_eq!(uf.find(i), root);
        }
    }
}
