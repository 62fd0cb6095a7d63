//! Immutable cell revisions.
//!
//! A [`CellRevision`] holds the three canonically ordered element arrays of
//! one cell together with derived lookup tables and usage accounting.
//! [`CellRevision::with`] is the only way to derive a new revision; the old
//! one is never modified and unchanged arrays, tables and caches are shared.

mod check;
pub(crate) mod index;
mod usage;

pub use usage::CellUsageInfo;

use std::collections::BTreeSet;
use std::sync::Arc;

use fixedbitset::FixedBitSet;
use tracing::Level;

use crate::cache::CacheSlot;
use crate::config::DEFAULT_INSERTION_SORT_THRESHOLD;
use crate::connectivity::{BlockIndex, ConnectivityIndex, EngineKind, SortedIndex};
use crate::element::{same_records, ArcInst, CellMeta, Export, ImmutableArray, NodeInst};
use crate::error::{Error, Result};
use crate::ids::{ArcId, CellId, NodeId, TechId};
use crate::name;
use crate::remap::IdMapper;

use index::IdIndex;
use usage::Usages;

/// An immutable revision of one cell.
#[derive(Debug)]
pub struct CellRevision {
    meta: Arc<CellMeta>,
    nodes: ImmutableArray<NodeInst>,
    arcs: ImmutableArray<ArcInst>,
    exports: ImmutableArray<Export>,
    node_index: IdIndex,
    arc_index: IdIndex,
    export_index: IdIndex,
    defined_exports: Arc<FixedBitSet>,
    deleted_exports: Arc<FixedBitSet>,
    usages: Usages,
    sorted_index: CacheSlot<SortedIndex>,
    block_index: CacheSlot<BlockIndex>,
}

struct Changes {
    nodes: Option<ImmutableArray<NodeInst>>,
    arcs: Option<ImmutableArray<ArcInst>>,
    exports: Option<ImmutableArray<Export>>,
}

impl CellRevision {
    /// Creates an empty revision.
    pub fn new(meta: Arc<CellMeta>) -> Arc<Self> {
        let usages = Usages::empty(meta.tech());
        Arc::new(Self {
            meta,
            nodes: Arc::new([]),
            arcs: Arc::new([]),
            exports: Arc::new([]),
            node_index: IdIndex::Identity(0),
            arc_index: IdIndex::Identity(0),
            export_index: IdIndex::Identity(0),
            defined_exports: Arc::new(FixedBitSet::new()),
            deleted_exports: Arc::new(FixedBitSet::new()),
            usages,
            sorted_index: CacheSlot::new(),
            block_index: CacheSlot::new(),
        })
    }

    /// Derives a revision with new metadata and, optionally, new element
    /// arrays.
    ///
    /// `None` leaves an array unchanged. Supplied arrays must already be in
    /// canonical order: nodes and exports by name, arcs by name then id.
    /// Returns `self` if nothing changed.
    pub fn with(
        self: &Arc<Self>,
        meta: Arc<CellMeta>,
        nodes: Option<ImmutableArray<NodeInst>>,
        arcs: Option<ImmutableArray<ArcInst>>,
        exports: Option<ImmutableArray<Export>>,
    ) -> Result<Arc<Self>> {
        if meta.cell_id() != self.cell_id() {
            return Err(Error::CellIdChanged {
                from: self.cell_id().clone(),
                to: meta.cell_id().clone(),
            });
        }
        let meta = if Arc::ptr_eq(&meta, &self.meta) || meta == self.meta {
            self.meta.clone()
        } else {
            meta
        };
        let changes = Changes {
            nodes: nodes.filter(|n| !same_records(n, &self.nodes)),
            arcs: arcs.filter(|a| !same_records(a, &self.arcs)),
            exports: exports.filter(|e| !same_records(e, &self.exports)),
        };
        if Arc::ptr_eq(&meta, &self.meta)
            && changes.nodes.is_none()
            && changes.arcs.is_none()
            && changes.exports.is_none()
        {
            return Ok(self.clone());
        }
        let seed: Vec<CellId> = self.usages.slots.iter().map(|u| u.proto().clone()).collect();
        Ok(Arc::new(self.derive(meta, changes, seed)?))
    }

    /// Rebuilds a stored revision, keeping its usage slot order and the
    /// exports it had deleted.
    pub(crate) fn restore(
        meta: Arc<CellMeta>,
        nodes: ImmutableArray<NodeInst>,
        arcs: ImmutableArray<ArcInst>,
        exports: ImmutableArray<Export>,
        usage_slots: Vec<CellId>,
        deleted: FixedBitSet,
    ) -> Result<Arc<Self>> {
        let changes = Changes {
            nodes: Some(nodes),
            arcs: Some(arcs),
            exports: Some(exports),
        };
        let mut rev = Self::new(meta.clone()).derive(meta, changes, usage_slots)?;
        if deleted != *rev.deleted_exports {
            rev.deleted_exports = Arc::new(deleted);
        }
        Ok(Arc::new(rev))
    }

    fn derive(&self, meta: Arc<CellMeta>, changes: Changes, seed: Vec<CellId>) -> Result<Self> {
        let _guard =
            tracing::span!(Level::DEBUG, "deriving cell revision", cell = %meta.cell_id()).entered();
        let cell = meta.cell_id().clone();
        let cell_changed = &cell != self.cell_id();

        let nodes_changed = changes.nodes.is_some() || cell_changed;
        let arcs_changed = changes.arcs.is_some();
        let exports_changed = changes.exports.is_some();

        let nodes = changes.nodes.unwrap_or_else(|| self.nodes.clone());
        let arcs = changes.arcs.unwrap_or_else(|| self.arcs.clone());
        let exports = changes.exports.unwrap_or_else(|| self.exports.clone());

        let node_index = if nodes_changed {
            let index = check::check_nodes(&cell, &nodes)?;
            if index.same(&self.node_index) {
                self.node_index.clone()
            } else {
                index
            }
        } else {
            self.node_index.clone()
        };

        let arc_index = if arcs_changed || nodes_changed {
            let index = check::check_arcs(&cell, &arcs, &nodes, &node_index)?;
            if index.same(&self.arc_index) {
                self.arc_index.clone()
            } else {
                index
            }
        } else {
            self.arc_index.clone()
        };

        let (export_index, defined_exports, deleted_exports) = if exports_changed || nodes_changed
        {
            let table = check::check_exports(&cell, &exports, &nodes, &node_index)?;
            let index = if table.index.same(&self.export_index) {
                self.export_index.clone()
            } else {
                table.index
            };
            let defined = if table.defined == *self.defined_exports {
                self.defined_exports.clone()
            } else {
                Arc::new(table.defined)
            };
            let deleted = deleted_exports(&self.defined_exports, &self.deleted_exports, &defined);
            let deleted = if deleted == *self.deleted_exports {
                self.deleted_exports.clone()
            } else {
                Arc::new(deleted)
            };
            (index, defined, deleted)
        } else {
            (
                self.export_index.clone(),
                self.defined_exports.clone(),
                self.deleted_exports.clone(),
            )
        };

        let tech_changed = meta.tech() != self.meta.tech();
        let usages = if nodes_changed || arcs_changed || exports_changed || tech_changed {
            Usages::compute(seed, meta.tech(), &nodes, &arcs, &exports, |id| {
                node_index.get(id.0)
            })
            .share_with(&self.usages)
        } else {
            self.usages.clone()
        };

        let connectivity_changed = arcs_changed || exports_changed;
        let sorted_index = match self.sorted_index.get() {
            Some(index) if !connectivity_changed => CacheSlot::with_value(index),
            _ => CacheSlot::new(),
        };
        let carried_blocks = self.block_index.get();

        let next = Self {
            meta,
            nodes,
            arcs,
            exports,
            node_index,
            arc_index,
            export_index,
            defined_exports,
            deleted_exports,
            usages,
            sorted_index,
            block_index: CacheSlot::new(),
        };
        if let Some(blocks) = carried_blocks {
            if connectivity_changed {
                next.block_index
                    .set(Arc::new(BlockIndex::patched(&blocks, self, &next)));
            } else {
                next.block_index.set(blocks);
            }
        }
        tracing::event!(
            Level::TRACE,
            nodes = next.nodes.len(),
            arcs = next.arcs.len(),
            exports = next.exports.len(),
            "derived cell revision"
        );
        Ok(next)
    }

    /// The metadata.
    #[inline]
    pub fn meta(&self) -> &Arc<CellMeta> {
        &self.meta
    }

    /// The cell.
    #[inline]
    pub fn cell_id(&self) -> &CellId {
        self.meta.cell_id()
    }

    /// Node instances, in name order.
    #[inline]
    pub fn nodes(&self) -> &ImmutableArray<NodeInst> {
        &self.nodes
    }

    /// Arc instances, in name then id order.
    #[inline]
    pub fn arcs(&self) -> &ImmutableArray<ArcInst> {
        &self.arcs
    }

    /// Exports, in name order.
    #[inline]
    pub fn exports(&self) -> &ImmutableArray<Export> {
        &self.exports
    }

    /// The position of a node in [`nodes`](Self::nodes).
    #[inline]
    pub fn node_position(&self, id: NodeId) -> Option<usize> {
        self.node_index.get(id.0)
    }

    /// Looks up a node by id.
    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&Arc<NodeInst>> {
        self.node_position(id).map(|pos| &self.nodes[pos])
    }

    /// The position of an arc in [`arcs`](Self::arcs).
    #[inline]
    pub fn arc_position(&self, id: ArcId) -> Option<usize> {
        self.arc_index.get(id.0)
    }

    /// Looks up an arc by id.
    #[inline]
    pub fn arc(&self, id: ArcId) -> Option<&Arc<ArcInst>> {
        self.arc_position(id).map(|pos| &self.arcs[pos])
    }

    /// The position of an export in [`exports`](Self::exports).
    #[inline]
    pub fn export_position(&self, chron: u32) -> Option<usize> {
        self.export_index.get(chron)
    }

    /// Looks up an export by chronological index.
    #[inline]
    pub fn export(&self, chron: u32) -> Option<&Arc<Export>> {
        self.export_position(chron).map(|pos| &self.exports[pos])
    }

    /// Looks up an export by name.
    pub fn export_by_name(&self, name: &str) -> Option<&Arc<Export>> {
        self.exports
            .binary_search_by(|e| name::compare(e.name().as_str(), name))
            .ok()
            .map(|pos| &self.exports[pos])
    }

    /// One past the largest export chronological index in use.
    #[inline]
    pub fn export_chron_bound(&self) -> usize {
        self.defined_exports.len()
    }

    /// Chronological indices of the current exports.
    #[inline]
    pub fn defined_exports(&self) -> &FixedBitSet {
        &self.defined_exports
    }

    /// Chronological indices of exports this cell defined in an earlier
    /// revision and no longer has.
    #[inline]
    pub fn deleted_exports(&self) -> &FixedBitSet {
        &self.deleted_exports
    }

    /// Usage slots. Slot positions are stable across derivations; a slot
    /// whose subcell is no longer instantiated has a zero instance count.
    #[inline]
    pub fn usages(&self) -> &[CellUsageInfo] {
        &self.usages.slots
    }

    /// The usage slot of a subcell.
    pub fn usage_slot(&self, cell: &CellId) -> Option<usize> {
        self.usages.slots.iter().position(|u| u.proto() == cell)
    }

    /// Technologies used by the cell and its primitives and arcs.
    #[inline]
    pub fn tech_usages(&self) -> &Arc<BTreeSet<TechId>> {
        &self.usages.techs
    }

    /// Verifies usage slot `slot` against the current revision of its subcell.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    pub fn check_usage(&self, slot: usize, child: &CellRevision) -> Result<()> {
        let usage = &self.usages.slots[slot];
        if usage.proto() != child.cell_id() {
            return Err(Error::SubtreeMismatch {
                cell: self.cell_id().clone(),
                slot,
                expected: usage.proto().clone(),
                found: child.cell_id().clone(),
            });
        }
        usage.check(self.cell_id(), child)
    }

    /// The sorted-key connectivity index.
    pub fn sorted_index(&self) -> Arc<SortedIndex> {
        self.sorted_index_with(DEFAULT_INSERTION_SORT_THRESHOLD)
    }

    /// The sorted-key connectivity index, building it with the given
    /// insertion-sort threshold on a miss.
    pub fn sorted_index_with(&self, threshold: usize) -> Arc<SortedIndex> {
        self.sorted_index
            .get_or_init(|| SortedIndex::build(self, threshold))
    }

    /// The block-structured connectivity index.
    pub fn block_index(&self) -> Arc<BlockIndex> {
        self.block_index.get_or_init(|| BlockIndex::build(self))
    }

    /// The connectivity index of the given kind.
    pub fn connectivity(&self, kind: EngineKind, threshold: usize) -> Arc<dyn ConnectivityIndex> {
        match kind {
            EngineKind::SortedKeys => self.sorted_index_with(threshold) as Arc<dyn ConnectivityIndex>,
            EngineKind::Blocks => self.block_index() as Arc<dyn ConnectivityIndex>,
        }
    }

    /// Drops cached connectivity indices.
    pub fn reclaim_caches(&self) {
        self.sorted_index.reclaim();
        self.block_index.reclaim();
    }

    /// Returns `true` if both revisions hold equal metadata and elements.
    pub fn same_content(&self, other: &CellRevision) -> bool {
        self.meta == other.meta
            && self.nodes == other.nodes
            && self.arcs == other.arcs
            && self.exports == other.exports
    }

    /// Re-verifies every structural invariant and derived table.
    pub fn check(&self) -> Result<()> {
        let _guard =
            tracing::span!(Level::DEBUG, "checking cell revision", cell = %self.cell_id()).entered();
        let cell = self.cell_id();
        let inconsistent = |what| Error::Inconsistent {
            cell: cell.clone(),
            what,
        };
        let node_index = check::check_nodes(cell, &self.nodes)?;
        if !node_index.same(&self.node_index) {
            return Err(inconsistent("node index"));
        }
        let arc_index = check::check_arcs(cell, &self.arcs, &self.nodes, &node_index)?;
        if !arc_index.same(&self.arc_index) {
            return Err(inconsistent("arc index"));
        }
        let table = check::check_exports(cell, &self.exports, &self.nodes, &node_index)?;
        if !table.index.same(&self.export_index) || table.defined != *self.defined_exports {
            return Err(inconsistent("export index"));
        }
        if self.deleted_exports.ones().any(|i| self.defined_exports.contains(i)) {
            return Err(inconsistent("deleted exports"));
        }
        let seed = self.usages.slots.iter().map(|u| u.proto().clone());
        let usages = Usages::compute(
            seed,
            self.meta.tech(),
            &self.nodes,
            &self.arcs,
            &self.exports,
            |id| node_index.get(id.0),
        );
        if usages != self.usages {
            return Err(inconsistent("usage table"));
        }
        Ok(())
    }

    /// Rewrites every embedded identifier through `mapper`.
    ///
    /// Returns `self` if no identifier changes.
    pub fn with_ids(self: &Arc<Self>, mapper: &IdMapper) -> Result<Arc<Self>> {
        let meta = self.meta.with_ids(mapper);
        let nodes = map_array(&self.nodes, |n| n.with_ids(mapper));
        let arcs = map_array(&self.arcs, |a| a.with_ids(mapper));
        let exports = map_array(&self.exports, |e| e.with_ids(mapper));
        if Arc::ptr_eq(&meta, &self.meta) && nodes.is_none() && arcs.is_none() && exports.is_none()
        {
            return Ok(self.clone());
        }
        let seed = self
            .usages
            .slots
            .iter()
            .map(|u| mapper.map_cell(u.proto()))
            .collect();
        let next = self.derive(
            meta,
            Changes {
                nodes,
                arcs,
                exports,
            },
            seed,
        )?;
        Ok(Arc::new(next))
    }
}

/// Maps every record, returning `None` if all records are unchanged.
fn map_array<T>(
    array: &ImmutableArray<T>,
    f: impl Fn(&Arc<T>) -> Arc<T>,
) -> Option<ImmutableArray<T>> {
    let mapped: Vec<Arc<T>> = array.iter().map(f).collect();
    if same_records(&mapped, array) {
        None
    } else {
        Some(mapped.into())
    }
}

fn deleted_exports(
    old_defined: &FixedBitSet,
    old_deleted: &FixedBitSet,
    defined: &FixedBitSet,
) -> FixedBitSet {
    let mut deleted = old_defined.clone();
    deleted.union_with(old_deleted);
    deleted.difference_with(defined);
    deleted
}
