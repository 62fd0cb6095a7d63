//! A persistent, versioned database of circuit cells.
//!
//! Cells are stored as immutable revisions whose element arrays are shared
//! between versions. Every edit derives a new [`CellRevision`] from an old one;
//! the old revision is never mutated, so any number of readers can keep using
//! a published snapshot while the single writer prepares the next one.
//!
//! The layers, leaves first:
//!
//! * element records ([`NodeInst`], [`ArcInst`], [`Export`]) with sorted
//!   variable sets;
//! * [`CellRevision`]: the three ordered element arrays of one cell, with
//!   id lookup tables, usage accounting and two interchangeable
//!   [connectivity indices](connectivity);
//! * [`CellBackup`]: a revision plus its restricted [`TechPool`] and
//!   technology-dependent caches;
//! * [`CellTree`]: a backup plus the trees of every subcell it uses, with
//!   whole-hierarchy bounds and port equivalence;
//! * [`Snapshot`]: a consistent set of trees, assembled bottom-up.
//!
//! Port equivalence (see [`equiv`]) answers which exports of a cell are
//! guaranteed to be electrically identical, under three increasingly
//! permissive views of which devices short internally.
#![warn(missing_docs)]

pub mod backup;
pub mod cache;
pub mod codec;
pub mod config;
pub mod connectivity;
pub mod diagnostics;
pub mod element;
pub mod equiv;
pub mod error;
pub mod geom;
pub mod ids;
pub mod metrics;
pub mod name;
pub mod remap;
pub mod revision;
pub mod snapshot;
pub mod tech;
pub mod tree;
pub mod var;

#[cfg(test)]
pub(crate) mod tests;

pub use backup::CellBackup;
pub use config::DbConfig;
pub use element::{ArcEnd, ArcInst, CellMeta, End, Export, NodeInst, PortCharacteristic, PortInst};
pub use equiv::{EquivPorts, ShortLevel};
pub use error::{Error, Result};
pub use ids::{
    ArcId, ArcProtoId, CellId, CellName, ExportId, LibId, NodeId, NodeProtoId, PortProtoId,
    PrimitiveNodeId, PrimitivePortId, TechId, View,
};
pub use name::Name;
pub use remap::IdMapper;
pub use revision::CellRevision;
pub use snapshot::Snapshot;
pub use tech::{TechPool, Technology};
pub use tree::CellTree;
