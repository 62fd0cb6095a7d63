use std::cmp::Ordering;
use std::ops::Range;

use super::{end_key, export_key, resolve_query, ConnectivityIndex, Connection};
use crate::element::End;
use crate::ids::{NodeId, PortProtoId};
use crate::revision::CellRevision;

/// Connectivity index backed by two sorted arrays.
///
/// `ends` holds `arc_position << 1 | end` for every arc end, sorted by
/// (node id, port chronological index, arc id, end). `exports` holds export
/// positions sorted by (node id, port chronological index, export
/// chronological index).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SortedIndex {
    ends: Box<[u32]>,
    exports: Box<[u32]>,
}

impl SortedIndex {
    /// Builds the index for a revision.
    ///
    /// Ranges shorter than `threshold` are sorted by binary insertion.
    pub fn build(rev: &CellRevision, threshold: usize) -> Self {
        let _guard = tracing::trace_span!("building sorted connectivity index", cell = %rev.cell_id())
            .entered();
        let arcs = rev.arcs();
        let exports = rev.exports();

        let mut ends: Vec<u32> = (0..arcs.len() as u32 * 2).collect();
        let key = |e: &u32| end_key(&arcs[(*e >> 1) as usize], End::from_index(*e as usize));
        sort_by(&mut ends, threshold, &|a, b| key(a).cmp(&key(b)));

        let mut export_order: Vec<u32> = (0..exports.len() as u32).collect();
        let key = |e: &u32| export_key(&exports[*e as usize]);
        sort_by(&mut export_order, threshold, &|a, b| key(a).cmp(&key(b)));

        Self {
            ends: ends.into(),
            exports: export_order.into(),
        }
    }

    fn end_range(&self, rev: &CellRevision, node: NodeId, port: Option<u32>) -> Range<usize> {
        let arcs = rev.arcs();
        let key = |e: &u32| {
            let (n, p, _, _) = end_key(&arcs[(*e >> 1) as usize], End::from_index(*e as usize));
            (n, p)
        };
        range(&self.ends, key, node, port)
    }

    fn export_range(&self, rev: &CellRevision, node: NodeId, port: Option<u32>) -> Range<usize> {
        let exports = rev.exports();
        let key = |e: &u32| {
            let (n, p, _) = export_key(&exports[*e as usize]);
            (n, p)
        };
        range(&self.exports, key, node, port)
    }
}

fn range(
    entries: &[u32],
    key: impl Fn(&u32) -> (NodeId, u32),
    node: NodeId,
    port: Option<u32>,
) -> Range<usize> {
    match port {
        Some(port) => {
            let lo = entries.partition_point(|e| key(e) < (node, port));
            let hi = lo + entries[lo..].partition_point(|e| key(e) <= (node, port));
            lo..hi
        }
        None => {
            let lo = entries.partition_point(|e| key(e).0 < node);
            let hi = lo + entries[lo..].partition_point(|e| key(e).0 <= node);
            lo..hi
        }
    }
}

impl ConnectivityIndex for SortedIndex {
    fn connections(
        &self,
        rev: &CellRevision,
        node: NodeId,
        port: Option<&PortProtoId>,
    ) -> Vec<Connection> {
        let port = resolve_query(rev, node, port);
        self.ends[self.end_range(rev, node, port)]
            .iter()
            .map(|&e| Connection::new((e >> 1) as usize, End::from_index(e as usize)))
            .collect()
    }

    fn exports(&self, rev: &CellRevision, node: NodeId, port: Option<&PortProtoId>) -> Vec<usize> {
        let port = resolve_query(rev, node, port);
        self.exports[self.export_range(rev, node, port)]
            .iter()
            .map(|&e| e as usize)
            .collect()
    }

    fn connection_count(&self, rev: &CellRevision, node: NodeId, port: Option<&PortProtoId>) -> usize {
        let port = resolve_query(rev, node, port);
        self.end_range(rev, node, port).len()
    }

    fn export_count(&self, rev: &CellRevision, node: NodeId, port: Option<&PortProtoId>) -> usize {
        let port = resolve_query(rev, node, port);
        self.export_range(rev, node, port).len()
    }
}

/// Sorts `v` with a median-of-three quicksort, finishing ranges shorter than
/// `threshold` with binary insertion sort.
pub(crate) fn sort_by<T: Copy>(v: &mut [T], threshold: usize, cmp: &impl Fn(&T, &T) -> Ordering) {
    let threshold = threshold.max(2);
    let mut v = v;
    loop {
        if v.len() < threshold {
            binary_insertion_sort(v, cmp);
            return;
        }
        let p = partition(v, cmp);
        let whole = v;
        let (left, right) = whole.split_at_mut(p);
        let right = &mut right[1..];
        // Recurse into the smaller half to bound stack depth.
        if left.len() < right.len() {
            sort_by(left, threshold, cmp);
            v = right;
        } else {
            sort_by(right, threshold, cmp);
            v = left;
        }
    }
}

fn partition<T: Copy>(v: &mut [T], cmp: &impl Fn(&T, &T) -> Ordering) -> usize {
    let last = v.len() - 1;
    let mid = v.len() / 2;
    if cmp(&v[mid], &v[0]) == Ordering::Less {
        v.swap(mid, 0);
    }
    if cmp(&v[last], &v[0]) == Ordering::Less {
        v.swap(last, 0);
    }
    if cmp(&v[last], &v[mid]) == Ordering::Less {
        v.swap(last, mid);
    }
    v.swap(mid, last);
    let pivot = v[last];
    let mut store = 0;
    for i in 0..last {
        if cmp(&v[i], &pivot) == Ordering::Less {
            v.swap(i, store);
            store += 1;
        }
    }
    v.swap(store, last);
    store
}

fn binary_insertion_sort<T: Copy>(v: &mut [T], cmp: &impl Fn(&T, &T) -> Ordering) {
    for i in 1..v.len() {
        let x = v[i];
        let pos = v[..i].partition_point(|y| cmp(y, &x) != Ordering::Greater);
        if pos < i {
            v.copy_within(pos..i, pos + 1);
            v[pos] = x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn scrambled(n: u32) -> Vec<u32> {
        (0..n).map(|i| (i * 7919 + 13) % n).collect()
    }

    #[test]
    fn sorts_across_thresholds() {
        for n in [0u32, 1, 2, 3, 31, 32, 33, 500] {
            for threshold in [0, 2, 8, 32, 1000] {
                let mut v = scrambled(n);
                sort_by(&mut v, threshold, &|a: &u32, b: &u32| a.cmp(b));
                assert_eq!(v, (0..n).collect::<Vec<_>>(), "n={n} threshold={threshold}");
            }
        }
    }

    #[test]
    fn sorts_reversed_and_sorted_input() {
        let mut v: Vec<u32> = (0..200).rev().collect();
        sort_by(&mut v, 16, &|a: &u32, b: &u32| a.cmp(b));
        assert!(v.windows(2).all(|w| w[0] < w[1]));
        sort_by(&mut v, 16, &|a: &u32, b: &u32| a.cmp(b));
        assert!(v.windows(2).all(|w| w[0] < w[1]));
    }
}
