//! Identifiers for libraries, cells, exports and technology objects.
//!
//! Cell identifiers carry their library and full cell name, so renaming a
//! cell produces a new [`CellId`]. Exports keep their chronological index
//! across renames; [`ExportId`] pairs it with the owning cell.

use std::fmt::{Display, Formatter};

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

/// A library identifier.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LibId(ArcStr);

impl LibId {
    /// Creates a library id with the given name.
    #[inline]
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self(name.into())
    }

    /// The library name.
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.0
    }
}

impl Display for LibId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The view of a cell.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum View {
    /// Physical layout.
    #[default]
    Layout,
    /// A schematic implementation.
    Schematic,
    /// A symbol standing for a schematic.
    Icon,
    /// Documentation.
    Documentation,
    /// Any other view.
    Other,
}

/// Coarse grouping of views; a rename may not change it.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum ViewCategory {
    /// Icon views.
    Icon,
    /// Schematic views.
    Schematic,
    /// Everything else.
    Physical,
}

impl View {
    /// All views, in code order.
    pub const ALL: [View; 5] = [
        View::Layout,
        View::Schematic,
        View::Icon,
        View::Documentation,
        View::Other,
    ];

    /// The view's abbreviation as written in cell names.
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Self::Layout => "lay",
            Self::Schematic => "sch",
            Self::Icon => "ic",
            Self::Documentation => "doc",
            Self::Other => "",
        }
    }

    /// Parses a view abbreviation.
    pub fn from_abbreviation(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.abbreviation() == s)
    }

    /// The category of this view.
    pub fn category(&self) -> ViewCategory {
        match self {
            Self::Icon => ViewCategory::Icon,
            Self::Schematic => ViewCategory::Schematic,
            _ => ViewCategory::Physical,
        }
    }

    /// Numeric code used by the binary form.
    pub(crate) fn code(&self) -> u8 {
        match self {
            Self::Layout => 0,
            Self::Schematic => 1,
            Self::Icon => 2,
            Self::Documentation => 3,
            Self::Other => 4,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// The full name of a cell within its library.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CellName {
    name: ArcStr,
    view: View,
    version: u32,
}

impl CellName {
    /// Creates a cell name.
    pub fn new(name: impl Into<ArcStr>, view: View, version: u32) -> Self {
        Self {
            name: name.into(),
            view,
            version,
        }
    }

    /// The base name, shared by all views of a cell group.
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The view.
    #[inline]
    pub fn view(&self) -> View {
        self.view
    }

    /// The version.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }
}

impl Display for CellName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{};{}{{{}}}", self.name, self.version, self.view.abbreviation())
    }
}

/// A cell identifier.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CellId {
    lib: LibId,
    name: CellName,
}

impl CellId {
    /// Creates a cell id.
    pub fn new(lib: LibId, name: CellName) -> Self {
        Self { lib, name }
    }

    /// The library.
    #[inline]
    pub fn lib(&self) -> &LibId {
        &self.lib
    }

    /// The cell name.
    #[inline]
    pub fn cell_name(&self) -> &CellName {
        &self.name
    }

    /// The view of this cell.
    #[inline]
    pub fn view(&self) -> View {
        self.name.view
    }

    /// Returns `true` for icon cells.
    #[inline]
    pub fn is_icon(&self) -> bool {
        self.name.view == View::Icon
    }

    /// Returns `true` for schematic cells.
    #[inline]
    pub fn is_schematic(&self) -> bool {
        self.name.view == View::Schematic
    }

    /// Returns a copy of this id moved to another library.
    pub fn in_lib(&self, lib: LibId) -> Self {
        Self {
            lib,
            name: self.name.clone(),
        }
    }

    /// Returns the id of the export with the given chronological index.
    #[inline]
    pub fn export(&self, chron: u32) -> ExportId {
        ExportId {
            parent: self.clone(),
            chron,
        }
    }
}

impl Display for CellId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.lib.0, self.name)
    }
}

/// An export identifier.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ExportId {
    parent: CellId,
    chron: u32,
}

impl ExportId {
    /// The cell owning this export.
    #[inline]
    pub fn parent(&self) -> &CellId {
        &self.parent
    }

    /// The chronological index, stable across renames.
    #[inline]
    pub fn chron(&self) -> u32 {
        self.chron
    }
}

impl Display for ExportId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.parent, self.chron)
    }
}

/// A technology identifier.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TechId(ArcStr);

impl TechId {
    /// Creates a technology id.
    #[inline]
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self(name.into())
    }

    /// The technology name.
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.0
    }
}

impl Display for TechId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A primitive node prototype identifier.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PrimitiveNodeId {
    tech: TechId,
    name: ArcStr,
}

impl PrimitiveNodeId {
    /// Creates a primitive node id.
    pub fn new(tech: TechId, name: impl Into<ArcStr>) -> Self {
        Self {
            tech,
            name: name.into(),
        }
    }

    /// The technology.
    #[inline]
    pub fn tech(&self) -> &TechId {
        &self.tech
    }

    /// The primitive name.
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// Returns the id of the port with the given chronological index.
    #[inline]
    pub fn port(&self, chron: u32) -> PrimitivePortId {
        PrimitivePortId {
            node: self.clone(),
            chron,
        }
    }
}

impl Display for PrimitiveNodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.tech, self.name)
    }
}

/// A primitive port identifier.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PrimitivePortId {
    node: PrimitiveNodeId,
    chron: u32,
}

impl PrimitivePortId {
    /// The primitive owning this port.
    #[inline]
    pub fn node(&self) -> &PrimitiveNodeId {
        &self.node
    }

    /// The chronological index.
    #[inline]
    pub fn chron(&self) -> u32 {
        self.chron
    }
}

/// An arc prototype identifier.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ArcProtoId {
    tech: TechId,
    name: ArcStr,
}

impl ArcProtoId {
    /// Creates an arc prototype id.
    pub fn new(tech: TechId, name: impl Into<ArcStr>) -> Self {
        Self {
            tech,
            name: name.into(),
        }
    }

    /// The technology.
    #[inline]
    pub fn tech(&self) -> &TechId {
        &self.tech
    }

    /// The prototype name.
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }
}

impl Display for ArcProtoId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.tech, self.name)
    }
}

/// The prototype of a node instance.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum NodeProtoId {
    /// An instance of a subcell.
    Cell(CellId),
    /// A primitive device.
    Primitive(PrimitiveNodeId),
}

impl NodeProtoId {
    /// The subcell, for cell instances.
    #[inline]
    pub fn as_cell(&self) -> Option<&CellId> {
        match self {
            Self::Cell(id) => Some(id),
            Self::Primitive(_) => None,
        }
    }

    /// The primitive, for primitive instances.
    #[inline]
    pub fn as_primitive(&self) -> Option<&PrimitiveNodeId> {
        match self {
            Self::Primitive(id) => Some(id),
            Self::Cell(_) => None,
        }
    }
}

impl Display for NodeProtoId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cell(id) => write!(f, "{}", id),
            Self::Primitive(id) => write!(f, "{}", id),
        }
    }
}

/// A port on a node prototype.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum PortProtoId {
    /// An export of a subcell.
    Export(ExportId),
    /// A port of a primitive.
    Primitive(PrimitivePortId),
}

impl PortProtoId {
    /// The chronological index of this port within its prototype.
    #[inline]
    pub fn chron(&self) -> u32 {
        match self {
            Self::Export(e) => e.chron,
            Self::Primitive(p) => p.chron,
        }
    }

    /// Returns `true` if this port is a port of the given node prototype.
    pub fn belongs_to(&self, proto: &NodeProtoId) -> bool {
        match (self, proto) {
            (Self::Export(e), NodeProtoId::Cell(c)) => &e.parent == c,
            (Self::Primitive(p), NodeProtoId::Primitive(n)) => &p.node == n,
            _ => false,
        }
    }

    /// The node prototype owning this port.
    pub fn node_proto(&self) -> NodeProtoId {
        match self {
            Self::Export(e) => NodeProtoId::Cell(e.parent.clone()),
            Self::Primitive(p) => NodeProtoId::Primitive(p.node.clone()),
        }
    }
}

impl Display for PortProtoId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Export(e) => write!(f, "{}", e),
            Self::Primitive(p) => write!(f, "{}#{}", p.node, p.chron),
        }
    }
}

/// A node instance id, unique within a cell.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// An arc instance id, unique within a cell.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ArcId(pub u32);

impl NodeId {
    /// The id as an array index.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl ArcId {
    /// The id as an array index.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "node{}", self.0)
    }
}

impl Display for ArcId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "arc{}", self.0)
    }
}
