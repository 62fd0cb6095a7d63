//! Structural validation of element collections.

use std::cmp::Ordering;
use std::sync::Arc;

use fixedbitset::FixedBitSet;

use super::index::IdIndex;
use crate::element::{ArcInst, Export, NodeInst};
use crate::error::{Collection, Error, Result};
use crate::ids::{ArcId, CellId, NodeId, NodeProtoId, PortProtoId, View};
use crate::name::{self, Name};

pub(super) fn check_nodes(cell: &CellId, nodes: &[Arc<NodeInst>]) -> Result<IdIndex> {
    let view = cell.view();
    let mut centers = 0;
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 && name::compare(nodes[i - 1].name().as_str(), node.name().as_str()) != Ordering::Less {
            return Err(unordered(cell, Collection::Nodes, i));
        }
        if node.name().is_bus() && view != View::Schematic {
            return Err(bus_not_allowed(cell, node.name(), "node"));
        }
        if node.is_cell_center() {
            centers += 1;
            if centers > 1 {
                return Err(Error::MultipleCellCenters(cell.clone()));
            }
        }
        if let NodeProtoId::Cell(child) = node.proto() {
            if child == cell {
                return Err(Error::HierarchyCycle(cell.clone()));
            }
            if view == View::Icon {
                return Err(Error::IllegalIconContents {
                    cell: cell.clone(),
                    child: child.clone(),
                });
            }
        }
    }
    IdIndex::build(nodes.iter().map(|n| n.id().0)).map_err(|id| Error::DuplicateNodeId {
        cell: cell.clone(),
        id: NodeId(id),
    })
}

pub(super) fn check_arcs(
    cell: &CellId,
    arcs: &[Arc<ArcInst>],
    nodes: &[Arc<NodeInst>],
    node_index: &IdIndex,
) -> Result<IdIndex> {
    let allow_bus = matches!(cell.view(), View::Schematic | View::Icon);
    for (i, arc) in arcs.iter().enumerate() {
        if i > 0 && arcs[i - 1].canonical_cmp(arc) != Ordering::Less {
            return Err(unordered(cell, Collection::Arcs, i));
        }
        if arc.name().is_bus() && !allow_bus {
            return Err(bus_not_allowed(cell, arc.name(), "arc"));
        }
        check_binding(cell, "arc", arc.tail().node(), arc.tail().port(), nodes, node_index)?;
        check_binding(cell, "arc", arc.head().node(), arc.head().port(), nodes, node_index)?;
    }
    IdIndex::build(arcs.iter().map(|a| a.id().0)).map_err(|id| Error::DuplicateArcId {
        cell: cell.clone(),
        id: ArcId(id),
    })
}

/// The chronological-index table of an export array.
pub(super) struct ExportTable {
    pub(super) index: IdIndex,
    pub(super) defined: FixedBitSet,
}

pub(super) fn check_exports(
    cell: &CellId,
    exports: &[Arc<Export>],
    nodes: &[Arc<NodeInst>],
    node_index: &IdIndex,
) -> Result<ExportTable> {
    let allow_bus = matches!(cell.view(), View::Schematic | View::Icon);
    for (i, export) in exports.iter().enumerate() {
        if i > 0
            && name::compare(exports[i - 1].name().as_str(), export.name().as_str())
                != Ordering::Less
        {
            return Err(unordered(cell, Collection::Exports, i));
        }
        if export.id().parent() != cell {
            return Err(Error::ForeignExport {
                cell: cell.clone(),
                export: export.id().clone(),
            });
        }
        if export.name().is_bus() && !allow_bus {
            return Err(bus_not_allowed(cell, export.name(), "export"));
        }
        check_binding(
            cell,
            "export",
            export.original_node(),
            export.original_port(),
            nodes,
            node_index,
        )?;
    }
    let index = IdIndex::build(exports.iter().map(|e| e.chron())).map_err(|chron| {
        Error::DuplicateExportChron {
            cell: cell.clone(),
            chron,
        }
    })?;
    let mut defined = FixedBitSet::with_capacity(index.id_bound());
    for export in exports {
        defined.insert(export.chron() as usize);
    }
    Ok(ExportTable { index, defined })
}

fn check_binding(
    cell: &CellId,
    what: &'static str,
    node: NodeId,
    port: &PortProtoId,
    nodes: &[Arc<NodeInst>],
    node_index: &IdIndex,
) -> Result<()> {
    let inst = node_index
        .get(node.0)
        .map(|pos| &nodes[pos])
        .ok_or_else(|| Error::DanglingNode {
            cell: cell.clone(),
            what,
            node,
        })?;
    if !port.belongs_to(inst.proto()) {
        return Err(Error::DanglingPort {
            cell: cell.clone(),
            what,
            node,
            port: port.to_string(),
        });
    }
    Ok(())
}

fn unordered(cell: &CellId, collection: Collection, position: usize) -> Error {
    Error::Unordered {
        cell: cell.clone(),
        collection,
        position,
    }
}

fn bus_not_allowed(cell: &CellId, name: &Name, what: &'static str) -> Error {
    Error::BusNameNotAllowed {
        name: name.text().clone(),
        what,
        cell: cell.clone(),
    }
}
