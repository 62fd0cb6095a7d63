use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use smallvec::SmallVec;

use super::{resolve_query, ConnectivityIndex, Connection};
use crate::element::{same_records, ArcInst, End, Export};
use crate::ids::{ArcId, NodeId, PortProtoId};
use crate::revision::CellRevision;

const BLOCK_SHIFT: usize = 6;
const BLOCK_SIZE: usize = 1 << BLOCK_SHIFT;

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
struct WireEnd {
    arc: ArcId,
    end: End,
}

type Wires = Vec<(u32, WireEnd)>;
type Exports = Vec<(u32, u32)>;

/// The storage shape chosen for one node.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum Shape {
    /// One arc end.
    Wire1,
    /// Two arc ends on one port.
    Wire2,
    /// Three arc ends on one port.
    Wire3,
    /// More arc ends on one port.
    WireN,
    /// One export.
    Export1,
    /// More exports of one port.
    ExportN,
    /// Anything else: several ports, arcs and exports together, or a loop.
    Generic,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum NodeConns {
    Wire1 { port: u32, wire: WireEnd },
    Wire2 { port: u32, wires: [WireEnd; 2] },
    Wire3 { port: u32, wires: [WireEnd; 3] },
    WireN { port: u32, wires: Box<[WireEnd]> },
    Export1 { port: u32, export: u32 },
    ExportN { port: u32, exports: Box<[u32]> },
    Generic { wires: Box<[(u32, WireEnd)]>, exports: Box<[(u32, u32)]> },
}

impl NodeConns {
    /// Picks the most compact shape for the given connections.
    fn from_parts(mut wires: Wires, mut exports: Exports) -> Option<Self> {
        wires.sort_unstable();
        exports.sort_unstable();
        let port = match (wires.first(), exports.first()) {
            (Some((p, _)), _) | (None, Some((p, _))) => *p,
            (None, None) => return None,
        };
        let single_port = wires.iter().all(|(p, _)| *p == port) && exports.iter().all(|(p, _)| *p == port);
        let has_loop = wires.windows(2).any(|w| w[0].1.arc == w[1].1.arc);
        if !single_port || has_loop || (!wires.is_empty() && !exports.is_empty()) {
            return Some(Self::Generic {
                wires: wires.into(),
                exports: exports.into(),
            });
        }
        let ends: SmallVec<[WireEnd; 4]> = wires.iter().map(|(_, w)| *w).collect();
        Some(match (ends.as_slice(), exports.as_slice()) {
            ([wire], []) => Self::Wire1 { port, wire: *wire },
            ([a, b], []) => Self::Wire2 {
                port,
                wires: [*a, *b],
            },
            ([a, b, c], []) => Self::Wire3 {
                port,
                wires: [*a, *b, *c],
            },
            (_, []) => Self::WireN {
                port,
                wires: wires.iter().map(|(_, w)| *w).collect(),
            },
            ([], [(_, export)]) => Self::Export1 {
                port,
                export: *export,
            },
            _ => Self::ExportN {
                port,
                exports: exports.iter().map(|(_, e)| *e).collect(),
            },
        })
    }

    fn shape(&self) -> Shape {
        match self {
            Self::Wire1 { .. } => Shape::Wire1,
            Self::Wire2 { .. } => Shape::Wire2,
            Self::Wire3 { .. } => Shape::Wire3,
            Self::WireN { .. } => Shape::WireN,
            Self::Export1 { .. } => Shape::Export1,
            Self::ExportN { .. } => Shape::ExportN,
            Self::Generic { .. } => Shape::Generic,
        }
    }

    /// Arc ends in (port, arc id, end) order.
    fn wires(&self) -> SmallVec<[(u32, WireEnd); 4]> {
        match self {
            Self::Wire1 { port, wire } => SmallVec::from_iter([(*port, *wire)]),
            Self::Wire2 { port, wires } => wires.iter().map(|w| (*port, *w)).collect(),
            Self::Wire3 { port, wires } => wires.iter().map(|w| (*port, *w)).collect(),
            Self::WireN { port, wires } => wires.iter().map(|w| (*port, *w)).collect(),
            Self::Export1 { .. } | Self::ExportN { .. } => SmallVec::new(),
            Self::Generic { wires, .. } => wires.iter().copied().collect(),
        }
    }

    /// Exports in (port, chronological index) order.
    fn exports(&self) -> SmallVec<[(u32, u32); 4]> {
        match self {
            Self::Export1 { port, export } => SmallVec::from_iter([(*port, *export)]),
            Self::ExportN { port, exports } => exports.iter().map(|e| (*port, *e)).collect(),
            Self::Generic { exports, .. } => exports.iter().copied().collect(),
            _ => SmallVec::new(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct Block {
    nodes: Box<[Option<NodeConns>]>,
}

impl Block {
    fn empty() -> Self {
        Self {
            nodes: vec![None; BLOCK_SIZE].into(),
        }
    }

    fn is_empty(&self) -> bool {
        self.nodes.iter().all(Option::is_none)
    }
}

/// Counts of blocks rebuilt and shared by the last derivation.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PatchStats {
    /// Blocks built from scratch or rebuilt.
    pub rebuilt: usize,
    /// Non-empty blocks shared with the previous index.
    pub reused: usize,
}

/// Connectivity index partitioning node ids into blocks of 64.
#[derive(Clone, Debug)]
pub struct BlockIndex {
    blocks: Vec<Option<Arc<Block>>>,
    stats: PatchStats,
}

#[derive(Default)]
struct NodeDelta {
    wires: Wires,
    exports: Exports,
}

impl BlockIndex {
    /// Builds the index for a revision.
    pub fn build(rev: &CellRevision) -> Self {
        let _guard =
            tracing::trace_span!("building block connectivity index", cell = %rev.cell_id()).entered();
        let mut per_node: BTreeMap<NodeId, NodeDelta> = BTreeMap::new();
        for arc in rev.arcs().iter() {
            add_arc(&mut per_node, arc);
        }
        for export in rev.exports().iter() {
            add_export(&mut per_node, export);
        }

        let mut blocks: Vec<Option<Block>> = Vec::new();
        for (node, delta) in per_node {
            let (b, slot) = (node.index() >> BLOCK_SHIFT, node.index() & (BLOCK_SIZE - 1));
            if blocks.len() <= b {
                blocks.resize(b + 1, None);
            }
            blocks[b].get_or_insert_with(Block::empty).nodes[slot] =
                NodeConns::from_parts(delta.wires, delta.exports);
        }
        let blocks: Vec<Option<Arc<Block>>> = blocks.into_iter().map(|b| b.map(Arc::new)).collect();
        let rebuilt = blocks.iter().filter(|b| b.is_some()).count();
        Self {
            blocks,
            stats: PatchStats { rebuilt, reused: 0 },
        }
    }

    /// Derives the index of `new_rev` from the index of `old_rev`.
    ///
    /// Only blocks holding nodes whose arcs or exports changed are rebuilt;
    /// all other blocks are shared with `old`.
    pub fn patched(old: &BlockIndex, old_rev: &CellRevision, new_rev: &CellRevision) -> Self {
        let _guard =
            tracing::trace_span!("patching block connectivity index", cell = %new_rev.cell_id())
                .entered();
        let mut touched: BTreeMap<NodeId, NodeDelta> = BTreeMap::new();
        let mut dropped_arcs: HashSet<ArcId> = HashSet::new();
        let mut dropped_exports: HashSet<u32> = HashSet::new();

        if !same_records(old_rev.arcs(), new_rev.arcs()) {
            for arc in new_rev.arcs().iter() {
                match old_rev.arc(arc.id()) {
                    Some(prev) if Arc::ptr_eq(prev, arc) || same_arc_binding(prev, arc) => {}
                    Some(prev) => {
                        dropped_arcs.insert(prev.id());
                        touch_arc(&mut touched, prev);
                        add_arc(&mut touched, arc);
                    }
                    None => add_arc(&mut touched, arc),
                }
            }
            for arc in old_rev.arcs().iter() {
                if new_rev.arc(arc.id()).is_none() {
                    dropped_arcs.insert(arc.id());
                    touch_arc(&mut touched, arc);
                }
            }
        }
        if !same_records(old_rev.exports(), new_rev.exports()) {
            for export in new_rev.exports().iter() {
                match old_rev.export(export.chron()) {
                    Some(prev) if Arc::ptr_eq(prev, export) || same_export_binding(prev, export) => {}
                    Some(prev) => {
                        dropped_exports.insert(prev.chron());
                        touched.entry(prev.original_node()).or_default();
                        add_export(&mut touched, export);
                    }
                    None => add_export(&mut touched, export),
                }
            }
            for export in old_rev.exports().iter() {
                if new_rev.export(export.chron()).is_none() {
                    dropped_exports.insert(export.chron());
                    touched.entry(export.original_node()).or_default();
                }
            }
        }

        let mut blocks = old.blocks.clone();
        let touched_blocks: BTreeSet<usize> =
            touched.keys().map(|n| n.index() >> BLOCK_SHIFT).collect();
        let mut rebuilt: BTreeMap<usize, Block> = BTreeMap::new();
        for (node, delta) in touched {
            let (b, slot) = (node.index() >> BLOCK_SHIFT, node.index() & (BLOCK_SIZE - 1));
            let block = rebuilt.entry(b).or_insert_with(|| {
                old.blocks
                    .get(b)
                    .and_then(|b| b.as_deref().cloned())
                    .unwrap_or_else(Block::empty)
            });
            let (mut wires, mut exports): (Wires, Exports) = match &block.nodes[slot] {
                Some(conns) => (conns.wires().into_vec(), conns.exports().into_vec()),
                None => Default::default(),
            };
            wires.retain(|(_, w)| !dropped_arcs.contains(&w.arc));
            exports.retain(|(_, e)| !dropped_exports.contains(e));
            wires.extend(delta.wires);
            exports.extend(delta.exports);
            block.nodes[slot] = NodeConns::from_parts(wires, exports);
        }
        for (b, block) in rebuilt {
            if blocks.len() <= b {
                blocks.resize(b + 1, None);
            }
            blocks[b] = (!block.is_empty()).then(|| Arc::new(block));
        }
        while matches!(blocks.last(), Some(None)) {
            blocks.pop();
        }

        let reused = blocks
            .iter()
            .enumerate()
            .filter(|(b, block)| block.is_some() && !touched_blocks.contains(b))
            .count();
        let stats = PatchStats {
            rebuilt: touched_blocks.len(),
            reused,
        };
        tracing::trace!(rebuilt = stats.rebuilt, reused = stats.reused, "patched block index");
        Self { blocks, stats }
    }

    /// Statistics of the build or patch that produced this index.
    #[inline]
    pub fn stats(&self) -> PatchStats {
        self.stats
    }

    /// The storage shape of a node, or `None` if it has no connections.
    pub fn shape(&self, node: NodeId) -> Option<Shape> {
        self.node_conns(node).map(NodeConns::shape)
    }

    /// The number of blocks that are the same object in both indices.
    pub fn shared_blocks(&self, other: &BlockIndex) -> usize {
        self.blocks
            .iter()
            .zip(other.blocks.iter())
            .filter(|(a, b)| matches!((a, b), (Some(a), Some(b)) if Arc::ptr_eq(a, b)))
            .count()
    }

    /// Returns `true` if both indices store the same connections.
    pub fn same_content(&self, other: &BlockIndex) -> bool {
        let len = self.blocks.len().max(other.blocks.len());
        (0..len).all(|b| {
            let a = self.blocks.get(b).and_then(|b| b.as_deref());
            let o = other.blocks.get(b).and_then(|b| b.as_deref());
            a == o
        })
    }

    fn node_conns(&self, node: NodeId) -> Option<&NodeConns> {
        let block = self.blocks.get(node.index() >> BLOCK_SHIFT)?.as_ref()?;
        block.nodes[node.index() & (BLOCK_SIZE - 1)].as_ref()
    }
}

fn add_arc(nodes: &mut BTreeMap<NodeId, NodeDelta>, arc: &ArcInst) {
    for end in End::ALL {
        let e = arc.end(end);
        nodes.entry(e.node()).or_default().wires.push((
            e.port().chron(),
            WireEnd { arc: arc.id(), end },
        ));
    }
}

fn touch_arc(nodes: &mut BTreeMap<NodeId, NodeDelta>, arc: &ArcInst) {
    for end in End::ALL {
        nodes.entry(arc.end(end).node()).or_default();
    }
}

fn add_export(nodes: &mut BTreeMap<NodeId, NodeDelta>, export: &Export) {
    nodes
        .entry(export.original_node())
        .or_default()
        .exports
        .push((export.original_port().chron(), export.chron()));
}

fn same_arc_binding(a: &ArcInst, b: &ArcInst) -> bool {
    End::ALL.iter().all(|&end| {
        let (x, y) = (a.end(end), b.end(end));
        x.node() == y.node() && x.port().chron() == y.port().chron()
    })
}

fn same_export_binding(a: &Export, b: &Export) -> bool {
    a.original_node() == b.original_node()
        && a.original_port().chron() == b.original_port().chron()
}

impl ConnectivityIndex for BlockIndex {
    fn connections(
        &self,
        rev: &CellRevision,
        node: NodeId,
        port: Option<&PortProtoId>,
    ) -> Vec<Connection> {
        let port = resolve_query(rev, node, port);
        let Some(conns) = self.node_conns(node) else {
            return Vec::new();
        };
        conns
            .wires()
            .into_iter()
            .filter(|(p, _)| port.map_or(true, |port| port == *p))
            .filter_map(|(_, w)| rev.arc_position(w.arc).map(|pos| Connection::new(pos, w.end)))
            .collect()
    }

    fn exports(&self, rev: &CellRevision, node: NodeId, port: Option<&PortProtoId>) -> Vec<usize> {
        let port = resolve_query(rev, node, port);
        let Some(conns) = self.node_conns(node) else {
            return Vec::new();
        };
        conns
            .exports()
            .into_iter()
            .filter(|(p, _)| port.map_or(true, |port| port == *p))
            .filter_map(|(_, chron)| rev.export_position(chron))
            .collect()
    }

    fn connection_count(&self, rev: &CellRevision, node: NodeId, port: Option<&PortProtoId>) -> usize {
        let port = resolve_query(rev, node, port);
        match (self.node_conns(node), port) {
            (None, _) => 0,
            (Some(NodeConns::Wire1 { .. }), None) => 1,
            (Some(NodeConns::Wire2 { .. }), None) => 2,
            (Some(NodeConns::Wire3 { .. }), None) => 3,
            (Some(conns), port) => conns
                .wires()
                .iter()
                .filter(|(p, _)| port.map_or(true, |port| port == *p))
                .count(),
        }
    }
}
