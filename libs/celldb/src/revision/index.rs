//! Id to position lookup tables.

use std::sync::Arc;

const ABSENT: u32 = u32::MAX;

/// Maps element ids to array positions.
///
/// Cells built by appending elements usually have ids `0..n` in position
/// order; those need no table at all.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum IdIndex {
    /// Id `i` is at position `i`, for `i < n`.
    Identity(usize),
    /// `table[id]` is the position of `id`, or `ABSENT`.
    Explicit(Arc<[u32]>),
}

impl IdIndex {
    /// Builds an index from ids listed in position order.
    ///
    /// Returns the first duplicated id on failure.
    pub(crate) fn build(ids: impl ExactSizeIterator<Item = u32> + Clone) -> Result<Self, u32> {
        let n = ids.len();
        if ids.clone().enumerate().all(|(i, id)| id as usize == i) {
            return Ok(Self::Identity(n));
        }
        let max = ids.clone().max().unwrap_or(0) as usize;
        let mut table = vec![ABSENT; max + 1];
        for (pos, id) in ids.enumerate() {
            let slot = &mut table[id as usize];
            if *slot != ABSENT {
                return Err(id);
            }
            *slot = pos as u32;
        }
        Ok(Self::Explicit(table.into()))
    }

    /// The position of `id`.
    #[inline]
    pub(crate) fn get(&self, id: u32) -> Option<usize> {
        match self {
            Self::Identity(n) => ((id as usize) < *n).then_some(id as usize),
            Self::Explicit(table) => match table.get(id as usize) {
                Some(&pos) if pos != ABSENT => Some(pos as usize),
                _ => None,
            },
        }
    }

    /// One past the largest id that may be present.
    pub(crate) fn id_bound(&self) -> usize {
        match self {
            Self::Identity(n) => *n,
            Self::Explicit(table) => table.len(),
        }
    }

    /// Returns `true` if both indices are equal, comparing tables by content.
    pub(crate) fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Explicit(a), Self::Explicit(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => self == other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn dense_ids_use_identity() {
        let index = IdIndex::build([0u32, 1, 2].into_iter()).unwrap();
        assert_eq!(index, IdIndex::Identity(3));
        assert_eq!(index.get(2), Some(2));
        assert_eq!(index.get(3), None);
    }

    #[test]
    fn sparse_ids_use_table() {
        let index = IdIndex::build([4u32, 0, 9].into_iter()).unwrap();
        assert!(matches!(index, IdIndex::Explicit(_)));
        assert_eq!(index.get(4), Some(0));
        assert_eq!(index.get(9), Some(2));
        assert_eq!(index.get(1), None);
        assert_eq!(index.get(100), None);
        assert_eq!(index.id_bound(), 10);
    }

    #[test]
    fn duplicates_are_reported() {
        assert_eq!(IdIndex::build([1u32, 3, 1].into_iter()), Err(1));
    }
}
