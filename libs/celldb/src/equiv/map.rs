//! Closed equivalence maps and the union-find used to build them.

use ena::unify::{InPlaceUnificationTable, UnifyKey};

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
struct Key(u32);

impl UnifyKey for Key {
    type Value = ();

    fn index(&self) -> u32 {
        self.0
    }

    fn from_index(u: u32) -> Self {
        Self(u)
    }

    fn tag() -> &'static str {
        "equiv"
    }
}

/// An incremental union-find over `0..len`.
pub(crate) struct UnionFind {
    table: InPlaceUnificationTable<Key>,
    len: u32,
}

impl UnionFind {
    /// Creates `len` singleton classes.
    pub(crate) fn new(len: usize) -> Self {
        let mut table = InPlaceUnificationTable::new();
        for _ in 0..len {
            table.new_key(());
        }
        Self {
            table,
            len: len as u32,
        }
    }

    /// Creates a union-find whose classes are those of `map`.
    pub(crate) fn from_map(map: &EquivMap) -> Self {
        let mut uf = Self::new(map.len());
        for (i, &rep) in map.classes.iter().enumerate() {
            if rep as usize != i {
                uf.union(i, rep as usize);
            }
        }
        uf
    }

    /// Merges the classes of `a` and `b`.
    #[inline]
    pub(crate) fn union(&mut self, a: usize, b: usize) {
        self.table.union(Key(a as u32), Key(b as u32));
    }

    /// Returns `true` if `a` and `b` are in the same class.
    #[inline]
    pub(crate) fn same(&mut self, a: usize, b: usize) -> bool {
        self.table.unioned(Key(a as u32), Key(b as u32))
    }

    /// Flattens the classes into a closed map.
    pub(crate) fn close(mut self) -> EquivMap {
        let mut min_of_root = vec![u32::MAX; self.len as usize];
        let mut classes = Vec::with_capacity(self.len as usize);
        for i in 0..self.len {
            let root = self.table.find(Key(i)).0 as usize;
            if min_of_root[root] == u32::MAX {
                min_of_root[root] = i;
            }
            classes.push(min_of_root[root]);
        }
        EquivMap {
            classes: classes.into(),
        }
    }
}

/// A closed equivalence map: every index maps to the smallest index of its
/// class, so `map[i] <= i` and `map[map[i]] == map[i]`.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct EquivMap {
    classes: Box<[u32]>,
}

impl EquivMap {
    /// The map in which every index is its own class.
    pub fn identity(len: usize) -> Self {
        Self {
            classes: (0..len as u32).collect(),
        }
    }

    /// Builds a map from representatives.
    ///
    /// Each entry must satisfy `classes[i] <= i`; the result is closed.
    ///
    /// # Panics
    ///
    /// Panics if an entry points forward.
    pub fn from_representatives(classes: impl Into<Box<[u32]>>) -> Self {
        let mut map = Self {
            classes: classes.into(),
        };
        for (i, &c) in map.classes.iter().enumerate() {
            assert!(c as usize <= i, "representative {} of {} points forward", c, i);
        }
        map.close();
        map
    }

    /// The number of indices.
    #[inline]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if the map is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// The smallest index of `i`'s class.
    #[inline]
    pub fn class(&self, i: usize) -> usize {
        self.classes[i] as usize
    }

    /// The representatives, in index order.
    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.classes
    }

    /// Flattens the map in place. A no-op on a closed map.
    pub fn close(&mut self) {
        for i in 0..self.classes.len() {
            let parent = self.classes[i] as usize;
            self.classes[i] = self.classes[parent];
        }
    }

    /// Returns `true` if every entry is its class's smallest index.
    pub fn is_closed(&self) -> bool {
        self.classes
            .iter()
            .enumerate()
            .all(|(i, &c)| c as usize <= i && self.classes[c as usize] == c)
    }

    /// Returns `true` if every class of `finer` lies within one class of
    /// `self`.
    pub fn coarsens(&self, finer: &EquivMap) -> bool {
        self.len() == finer.len()
            && (0..self.len()).all(|i| self.class(finer.class(i)) == self.class(i))
    }

    /// The map restricted to the first `n` indices.
    pub fn prefix(&self, n: usize) -> EquivMap {
        Self {
            classes: self.classes[..n].into(),
        }
    }

    /// Builds the map over `0..indices.len()` induced by mapping each index
    /// to `indices[i]` in `self`. `None` entries are singletons.
    pub fn pull_back(&self, indices: &[Option<usize>]) -> EquivMap {
        let mut first: std::collections::HashMap<usize, u32> = Default::default();
        let classes = indices
            .iter()
            .enumerate()
            .map(|(i, target)| match target {
                Some(t) => *first.entry(self.class(*t)).or_insert(i as u32),
                None => i as u32,
            })
            .collect();
        Self { classes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn close_yields_smallest_representatives() {
        let mut uf = UnionFind::new(6);
        uf.union(4, 2);
        uf.union(5, 4);
        uf.union(3, 1);
        assert!(uf.same(2, 5));
        assert!(!uf.same(0, 1));
        let map = uf.close();
        assert_eq!(map.as_slice(), &[0, 1, 2, 1, 2, 2]);
        assert!(map.is_closed());
    }

    #[test]
    fn closing_twice_is_a_no_op() {
        let mut map = EquivMap::from_representatives(vec![0, 0, 1, 3, 2]);
        assert_eq!(map.as_slice(), &[0, 0, 0, 3, 0]);
        let before = map.clone();
        map.close();
        assert_eq!(map, before);
    }

    #[test]
    fn coarsening() {
        let fine = EquivMap::from_representatives(vec![0, 0, 2, 3]);
        let coarse = EquivMap::from_representatives(vec![0, 0, 0, 3]);
        assert!(coarse.coarsens(&fine));
        assert!(!fine.coarsens(&coarse));
        assert!(fine.coarsens(&fine));
    }

    #[test]
    fn union_find_round_trips_through_maps() {
        let map = EquivMap::from_representatives(vec![0, 1, 0, 1, 4]);
        assert_eq!(UnionFind::from_map(&map).close(), map);
    }

    #[test]
    fn pull_back_renumbers_classes() {
        let map = EquivMap::from_representatives(vec![0, 1, 0, 1]);
        let pulled = map.pull_back(&[Some(3), Some(2), Some(1), None, Some(0)]);
        assert_eq!(pulled.as_slice(), &[0, 1, 0, 3, 1]);
    }
}
