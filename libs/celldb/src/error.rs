//! Error types and error handling utilities.

use std::sync::Arc;

use arcstr::ArcStr;

use crate::ids::{ArcId, ArcProtoId, CellId, ExportId, LibId, NodeId, PrimitiveNodeId, TechId};

/// A result type returning cell database errors.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The element collection an ordering or uniqueness failure refers to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Collection {
    /// Node instances.
    Nodes,
    /// Arc instances.
    Arcs,
    /// Exports.
    Exports,
}

/// Why a parent's recorded usage of a child cell is no longer valid.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum StaleUsage {
    /// The parent binds an export the child has deleted.
    ExportDeleted(u32),
    /// The parent binds an export chronological index the child never defined.
    ExportUnknown(u32),
    /// The parent sets a parameter the child does not declare.
    ParamMissing(ArcStr),
    /// The parent sets a parameter whose unit changed in the child.
    ParamUnitChanged(ArcStr),
}

impl std::fmt::Display for StaleUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExportDeleted(chron) => write!(f, "export #{} was deleted", chron),
            Self::ExportUnknown(chron) => write!(f, "export #{} was never defined", chron),
            Self::ParamMissing(key) => write!(f, "parameter `{}` is not declared", key),
            Self::ParamUnitChanged(key) => write!(f, "parameter `{}` changed its unit", key),
        }
    }
}

/// The error type for cell database operations.
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// A name is malformed.
    #[error("invalid name `{name}`: {reason}")]
    InvalidName {
        /// The offending name.
        name: ArcStr,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// A multi-bit name was used where only single-bit names are permitted.
    #[error("bus name `{name}` is not allowed for {what} in cell `{cell}`")]
    BusNameNotAllowed {
        /// The offending name.
        name: ArcStr,
        /// The kind of element carrying the name.
        what: &'static str,
        /// The cell.
        cell: CellId,
    },
    /// An id read from an external source is negative or out of range.
    #[error("invalid {what} id {value}")]
    InvalidId {
        /// The kind of id.
        what: &'static str,
        /// The raw value.
        value: i64,
    },
    /// A coordinate or size exceeds the fixed-point range.
    #[error("coordinate {0} is out of range")]
    CoordinateOutOfRange(i64),
    /// An arc width is negative.
    #[error("negative width {0}")]
    NegativeWidth(i64),
    /// A variable key is empty.
    #[error("empty variable key")]
    EmptyVarKey,
    /// A variable set contains the same key twice.
    #[error("duplicate variable key `{0}`")]
    DuplicateVarKey(ArcStr),
    /// An element collection is not in canonical order.
    #[error("{collection:?} of cell `{cell}` are not sorted at position {position}")]
    Unordered {
        /// The cell.
        cell: CellId,
        /// The collection.
        collection: Collection,
        /// Position of the first out-of-order element.
        position: usize,
    },
    /// Two node instances share an id.
    #[error("duplicate node id {id} in cell `{cell}`")]
    DuplicateNodeId {
        /// The cell.
        cell: CellId,
        /// The duplicated id.
        id: NodeId,
    },
    /// Two arc instances share an id.
    #[error("duplicate arc id {id} in cell `{cell}`")]
    DuplicateArcId {
        /// The cell.
        cell: CellId,
        /// The duplicated id.
        id: ArcId,
    },
    /// Two exports share a chronological index.
    #[error("duplicate export chronological index {chron} in cell `{cell}`")]
    DuplicateExportChron {
        /// The cell.
        cell: CellId,
        /// The duplicated index.
        chron: u32,
    },
    /// More than one cell-center marker.
    #[error("cell `{0}` has more than one cell-center marker")]
    MultipleCellCenters(CellId),
    /// An export belongs to another cell.
    #[error("export {export} does not belong to cell `{cell}`")]
    ForeignExport {
        /// The cell.
        cell: CellId,
        /// The export id.
        export: ExportId,
    },
    /// An element references a node that does not exist.
    #[error("{what} in cell `{cell}` references missing node {node}")]
    DanglingNode {
        /// The cell.
        cell: CellId,
        /// The kind of referencing element.
        what: &'static str,
        /// The missing node.
        node: NodeId,
    },
    /// A port binding names a port that is not on the node's prototype.
    #[error("{what} in cell `{cell}` binds port `{port}` which is not a port of node {node}")]
    DanglingPort {
        /// The cell.
        cell: CellId,
        /// The kind of referencing element.
        what: &'static str,
        /// The node.
        node: NodeId,
        /// Display form of the port.
        port: String,
    },
    /// An icon cell contains a subcell instance.
    #[error("icon cell `{cell}` may not contain an instance of `{child}`")]
    IllegalIconContents {
        /// The icon cell.
        cell: CellId,
        /// The instantiated cell.
        child: CellId,
    },
    /// A derivation attempted to change the identity of a cell.
    #[error("cannot derive cell `{to}` from a revision of `{from}`")]
    CellIdChanged {
        /// The original cell.
        from: CellId,
        /// The requested cell.
        to: CellId,
    },
    /// A cell transitively uses itself.
    #[error("hierarchy cycle through cell `{0}`")]
    HierarchyCycle(CellId),
    /// The icon/schematic resolution of a cell recurses into itself.
    #[error("view resolution cycle through cell `{0}`")]
    ViewCycle(CellId),
    /// A subtree does not match its usage slot.
    #[error("subtree slot {slot} of `{cell}` expects `{expected}`, found `{found}`")]
    SubtreeMismatch {
        /// The parent cell.
        cell: CellId,
        /// The usage slot.
        slot: usize,
        /// The cell used in that slot.
        expected: CellId,
        /// The root of the supplied subtree.
        found: CellId,
    },
    /// A used subcell has no subtree.
    #[error("missing subtree for `{child}` in `{cell}`")]
    MissingSubtree {
        /// The parent cell.
        cell: CellId,
        /// The used child.
        child: CellId,
    },
    /// A subtree was supplied for an unused slot.
    #[error("unexpected subtree in slot {slot} of `{cell}`")]
    UnexpectedSubtree {
        /// The parent cell.
        cell: CellId,
        /// The slot.
        slot: usize,
    },
    /// A parent's usage of a child is stale.
    #[error("`{parent}` uses `{child}` but {reason}")]
    StaleUsage {
        /// The parent cell.
        parent: CellId,
        /// The child cell.
        child: CellId,
        /// What changed.
        reason: StaleUsage,
    },
    /// A technology is not available in the pool.
    #[error("unknown technology `{0}`")]
    UnknownTechnology(TechId),
    /// A primitive node or one of its ports is unknown to its technology.
    #[error("unknown primitive `{0}`")]
    UnknownPrimitive(PrimitiveNodeId),
    /// An arc prototype is unknown to its technology.
    #[error("unknown arc prototype `{0}`")]
    UnknownArcProto(ArcProtoId),
    /// Two pools disagree on the definition of a technology.
    #[error("technology `{0}` differs from the ambient pool")]
    TechPoolMismatch(TechId),
    /// A cell is not part of a snapshot.
    #[error("cell `{0}` is not in the snapshot")]
    MissingCell(CellId),
    /// A rename would move a cell between view categories.
    #[error("cannot rename `{from}` to `{to}`: view category changes")]
    ViewCategoryChange {
        /// The old id.
        from: CellId,
        /// The new id.
        to: CellId,
    },
    /// A rename is inconsistent with other renames in the batch.
    #[error("invalid rename of {what}: {detail}")]
    InvalidRename {
        /// The kind of id.
        what: &'static str,
        /// Details.
        detail: String,
    },
    /// Renaming a library collides with an existing rename.
    #[error("library `{0}` is renamed twice")]
    DuplicateLibraryRename(LibId),
    /// A derived structure disagrees with the data it was derived from.
    #[error("inconsistent {what} in cell `{cell}`")]
    Inconsistent {
        /// The cell.
        cell: CellId,
        /// The derived structure.
        what: &'static str,
    },
    /// The binary form is malformed.
    #[error("malformed binary data: {0}")]
    Decode(String),
    /// An I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] Arc<std::io::Error>),
    /// The configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<toml::de::Error> for Error {
    fn from(value: toml::de::Error) -> Self {
        Self::Config(value.to_string())
    }
}
