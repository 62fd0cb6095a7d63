//! Batch renaming of libraries, cells and exports.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::ids::{CellId, ExportId, LibId, NodeProtoId, PortProtoId};

/// A set of identifier renames applied together.
///
/// Ids without a rename pass through unchanged. A cell in a renamed library
/// moves with its library unless it is renamed explicitly, and exports follow
/// their parent cell.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IdMapper {
    libs: BTreeMap<LibId, LibId>,
    cells: BTreeMap<CellId, CellId>,
    exports: BTreeMap<ExportId, ExportId>,
}

impl IdMapper {
    /// Creates a mapper with no renames.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no rename has been added.
    pub fn is_identity(&self) -> bool {
        self.libs.is_empty() && self.cells.is_empty() && self.exports.is_empty()
    }

    /// Renames a library.
    pub fn rename_library(&mut self, from: LibId, to: LibId) -> Result<&mut Self> {
        match self.libs.get(&from) {
            Some(prev) if *prev != to => return Err(Error::DuplicateLibraryRename(from)),
            Some(_) => return Ok(self),
            None => {}
        }
        if from != to {
            if let Some((other, _)) = self.libs.iter().find(|(_, t)| **t == to) {
                return Err(Error::InvalidRename {
                    what: "library",
                    detail: format!("`{}` and `{}` both renamed to `{}`", other.name(), from.name(), to.name()),
                });
            }
            self.libs.insert(from, to);
        }
        Ok(self)
    }

    /// Renames a cell.
    ///
    /// A cell may not move between the icon, schematic and physical view
    /// categories.
    pub fn rename_cell(&mut self, from: CellId, to: CellId) -> Result<&mut Self> {
        if from.view().category() != to.view().category() {
            return Err(Error::ViewCategoryChange { from, to });
        }
        if let Some(prev) = self.cells.get(&from) {
            if *prev == to {
                return Ok(self);
            }
            return Err(Error::InvalidRename {
                what: "cell",
                detail: format!("`{}` renamed to both `{}` and `{}`", from, prev, to),
            });
        }
        if let Some((other, _)) = self.cells.iter().find(|(_, t)| **t == to) {
            return Err(Error::InvalidRename {
                what: "cell",
                detail: format!("`{}` and `{}` both renamed to `{}`", other, from, to),
            });
        }
        if from != to {
            self.cells.insert(from, to);
        }
        Ok(self)
    }

    /// Renumbers an export.
    ///
    /// The target must belong to the cell the source's parent maps to.
    pub fn rename_export(&mut self, from: ExportId, to: ExportId) -> Result<&mut Self> {
        let parent = self.map_cell(from.parent());
        if *to.parent() != parent {
            return Err(Error::InvalidRename {
                what: "export",
                detail: format!("`{}` would move to `{}`, not `{}`", from, to.parent(), parent),
            });
        }
        match self.exports.get(&from) {
            Some(prev) if *prev != to => Err(Error::InvalidRename {
                what: "export",
                detail: format!("`{}` renamed to both `{}` and `{}`", from, prev, to),
            }),
            _ => {
                self.exports.insert(from, to);
                Ok(self)
            }
        }
    }

    /// The new id of a library.
    pub fn map_lib(&self, lib: &LibId) -> LibId {
        self.libs.get(lib).unwrap_or(lib).clone()
    }

    /// The new id of a cell.
    pub fn map_cell(&self, cell: &CellId) -> CellId {
        if let Some(to) = self.cells.get(cell) {
            return to.clone();
        }
        match self.libs.get(cell.lib()) {
            Some(lib) => cell.in_lib(lib.clone()),
            None => cell.clone(),
        }
    }

    /// The new id of an export.
    pub fn map_export(&self, export: &ExportId) -> ExportId {
        if let Some(to) = self.exports.get(export) {
            return to.clone();
        }
        let parent = self.map_cell(export.parent());
        if parent == *export.parent() {
            export.clone()
        } else {
            parent.export(export.chron())
        }
    }

    /// The new id of a port prototype.
    pub fn map_port(&self, port: &PortProtoId) -> PortProtoId {
        match port {
            PortProtoId::Export(e) => PortProtoId::Export(self.map_export(e)),
            PortProtoId::Primitive(_) => port.clone(),
        }
    }

    /// The new id of a node prototype.
    pub fn map_node_proto(&self, proto: &NodeProtoId) -> NodeProtoId {
        match proto {
            NodeProtoId::Cell(c) => NodeProtoId::Cell(self.map_cell(c)),
            NodeProtoId::Primitive(_) => proto.clone(),
        }
    }
}
