//! Connectivity queries over a revision.
//!
//! Both engines answer the same questions: which arc ends and which exports
//! are bound to a node, optionally restricted to one port. Results are
//! ordered by port chronological index, then arc id and end (for arcs) or
//! export chronological index (for exports).
//!
//! * [`SortedIndex`] keeps one sorted array of arc ends and one of exports
//!   and answers queries by binary search.
//! * [`BlockIndex`] partitions node ids into blocks of 64 and stores a small
//!   per-node shape. Deriving a revision patches only the blocks whose
//!   nodes gained or lost connections.

mod blocks;
mod sorted;

pub use blocks::{BlockIndex, PatchStats, Shape};
pub use sorted::SortedIndex;

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::element::{ArcInst, End, Export};
use crate::ids::{NodeId, PortProtoId};
use crate::revision::CellRevision;

/// Selects a connectivity engine.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// The sorted-key array.
    SortedKeys,
    /// The block-structured, incrementally patched index.
    #[default]
    Blocks,
}

/// One arc end bound to a node.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct Connection {
    arc: usize,
    end: End,
}

impl Connection {
    /// Creates a connection.
    #[inline]
    pub fn new(arc: usize, end: End) -> Self {
        Self { arc, end }
    }

    /// The position of the arc in the revision's arc array.
    #[inline]
    pub fn arc_position(&self) -> usize {
        self.arc
    }

    /// Which end of the arc is bound.
    #[inline]
    pub fn end(&self) -> End {
        self.end
    }

    /// The arc.
    #[inline]
    pub fn arc<'a>(&self, rev: &'a CellRevision) -> &'a Arc<ArcInst> {
        &rev.arcs()[self.arc]
    }
}

/// The connectivity query contract.
///
/// Every method panics if `node` is not in `rev`, or if `port` is not a
/// port of the node's prototype. An index must only be queried with the
/// revision it was built for.
pub trait ConnectivityIndex: Debug + Send + Sync {
    /// Arc ends bound to the node (or to one of its ports).
    fn connections(
        &self,
        rev: &CellRevision,
        node: NodeId,
        port: Option<&PortProtoId>,
    ) -> Vec<Connection>;

    /// Positions of the exports of the node (or of one of its ports).
    fn exports(&self, rev: &CellRevision, node: NodeId, port: Option<&PortProtoId>) -> Vec<usize>;

    /// The number of arc ends bound to the node.
    fn connection_count(&self, rev: &CellRevision, node: NodeId, port: Option<&PortProtoId>) -> usize {
        self.connections(rev, node, port).len()
    }

    /// Returns `true` if any arc end is bound to the node.
    fn has_connections(&self, rev: &CellRevision, node: NodeId, port: Option<&PortProtoId>) -> bool {
        self.connection_count(rev, node, port) > 0
    }

    /// The number of exports of the node.
    fn export_count(&self, rev: &CellRevision, node: NodeId, port: Option<&PortProtoId>) -> usize {
        self.exports(rev, node, port).len()
    }

    /// Returns `true` if the node has exports.
    fn has_exports(&self, rev: &CellRevision, node: NodeId, port: Option<&PortProtoId>) -> bool {
        self.export_count(rev, node, port) > 0
    }
}

/// Validates a query and returns the requested port's chronological index.
///
/// # Panics
///
/// Panics if the node is absent or the port is not on the node's prototype.
pub(crate) fn resolve_query(
    rev: &CellRevision,
    node: NodeId,
    port: Option<&PortProtoId>,
) -> Option<u32> {
    let inst = match rev.node(node) {
        Some(inst) => inst,
        None => panic!("{} is not a node of `{}`", node, rev.cell_id()),
    };
    port.map(|port| {
        if !port.belongs_to(inst.proto()) {
            panic!("{} is not a port of {} in `{}`", port, node, rev.cell_id());
        }
        port.chron()
    })
}

/// The sort key of an arc end: node, port, arc id, end.
#[inline]
pub(crate) fn end_key(arc: &ArcInst, end: End) -> (NodeId, u32, u32, usize) {
    let e = arc.end(end);
    (e.node(), e.port().chron(), arc.id().0, end.index())
}

/// The sort key of an export: node, port, export.
#[inline]
pub(crate) fn export_key(export: &Export) -> (NodeId, u32, u32) {
    (
        export.original_node(),
        export.original_port().chron(),
        export.chron(),
    )
}
