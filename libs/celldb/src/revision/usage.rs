//! Accounting of the subcells and technologies a revision uses.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use fixedbitset::FixedBitSet;

use crate::element::{ArcInst, Export, NodeInst};
use crate::error::{Error, Result, StaleUsage};
use crate::ids::{CellId, NodeId, NodeProtoId, PortProtoId, TechId};
use crate::revision::CellRevision;
use crate::var::{Unit, VarKey};

/// How a revision uses one subcell.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CellUsageInfo {
    proto: CellId,
    instance_count: usize,
    used_exports: FixedBitSet,
    used_params: BTreeMap<VarKey, Unit>,
}

impl CellUsageInfo {
    fn new(proto: CellId) -> Self {
        Self {
            proto,
            instance_count: 0,
            used_exports: FixedBitSet::new(),
            used_params: BTreeMap::new(),
        }
    }

    /// The used subcell.
    #[inline]
    pub fn proto(&self) -> &CellId {
        &self.proto
    }

    /// The number of instances of the subcell.
    #[inline]
    pub fn instance_count(&self) -> usize {
        self.instance_count
    }

    /// Returns `true` if the subcell is no longer instantiated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instance_count == 0
    }

    /// Chronological indices of the subcell's exports bound by arcs,
    /// exports or port variables.
    #[inline]
    pub fn used_exports(&self) -> &FixedBitSet {
        &self.used_exports
    }

    /// Parameters set on instances of an icon subcell, with their units.
    #[inline]
    pub fn used_params(&self) -> &BTreeMap<VarKey, Unit> {
        &self.used_params
    }

    fn mark_export(&mut self, chron: u32) {
        let i = chron as usize;
        if i >= self.used_exports.len() {
            self.used_exports.grow(i + 1);
        }
        self.used_exports.insert(i);
    }

    /// Verifies this usage against the current revision of the subcell.
    pub fn check(&self, parent: &CellId, child: &CellRevision) -> Result<()> {
        let stale = |reason| Error::StaleUsage {
            parent: parent.clone(),
            child: self.proto.clone(),
            reason,
        };
        for chron in self.used_exports.ones() {
            if child.deleted_exports().contains(chron) {
                return Err(stale(StaleUsage::ExportDeleted(chron as u32)));
            }
            if !child.defined_exports().contains(chron) {
                return Err(stale(StaleUsage::ExportUnknown(chron as u32)));
            }
        }
        for (key, unit) in self.used_params.iter() {
            match child.meta().vars().get(key.as_str()) {
                Some(param) if param.is_param() => {
                    if param.unit() != *unit {
                        return Err(stale(StaleUsage::ParamUnitChanged(key.text().clone())));
                    }
                }
                _ => return Err(stale(StaleUsage::ParamMissing(key.text().clone()))),
            }
        }
        Ok(())
    }
}

/// The usage table of a revision.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Usages {
    pub(crate) slots: Arc<[CellUsageInfo]>,
    pub(crate) techs: Arc<BTreeSet<TechId>>,
}

impl Usages {
    pub(crate) fn empty(tech: Option<&TechId>) -> Self {
        Self {
            slots: Arc::new([]),
            techs: Arc::new(tech.into_iter().cloned().collect()),
        }
    }

    /// Recomputes usage in one pass over the elements.
    ///
    /// Slots listed in `seed` keep their positions; newly used subcells are
    /// appended in order of first appearance.
    pub(crate) fn compute(
        seed: impl IntoIterator<Item = CellId>,
        tech: Option<&TechId>,
        nodes: &[Arc<NodeInst>],
        arcs: &[Arc<ArcInst>],
        exports: &[Arc<Export>],
        node_pos: impl Fn(NodeId) -> Option<usize>,
    ) -> Self {
        let mut slots: Vec<CellUsageInfo> = seed.into_iter().map(CellUsageInfo::new).collect();
        let mut slot_of: BTreeMap<CellId, usize> = slots
            .iter()
            .enumerate()
            .map(|(i, u)| (u.proto.clone(), i))
            .collect();
        let mut techs: BTreeSet<TechId> = tech.into_iter().cloned().collect();

        let mut node_slot = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node.proto() {
                NodeProtoId::Cell(cell) => {
                    let slot = *slot_of.entry(cell.clone()).or_insert_with(|| {
                        slots.push(CellUsageInfo::new(cell.clone()));
                        slots.len() - 1
                    });
                    let usage = &mut slots[slot];
                    usage.instance_count += 1;
                    if cell.is_icon() {
                        for param in node.vars().params() {
                            usage
                                .used_params
                                .entry(param.key().clone())
                                .or_insert(param.unit());
                        }
                    }
                    for (chron, port) in node.ports().iter().enumerate() {
                        if port.is_some() {
                            usage.mark_export(chron as u32);
                        }
                    }
                    node_slot.push(Some(slot));
                }
                NodeProtoId::Primitive(prim) => {
                    if !techs.contains(prim.tech()) {
                        techs.insert(prim.tech().clone());
                    }
                    node_slot.push(None);
                }
            }
        }

        let mut bind = |node: NodeId, port: &PortProtoId| {
            if let PortProtoId::Export(export) = port {
                if let Some(slot) = node_pos(node).and_then(|p| node_slot[p]) {
                    slots[slot].mark_export(export.chron());
                }
            }
        };
        for arc in arcs {
            bind(arc.tail().node(), arc.tail().port());
            bind(arc.head().node(), arc.head().port());
        }
        for export in exports {
            bind(export.original_node(), export.original_port());
        }
        for arc in arcs {
            if !techs.contains(arc.proto().tech()) {
                techs.insert(arc.proto().tech().clone());
            }
        }

        Self {
            slots: slots.into(),
            techs: Arc::new(techs),
        }
    }

    /// Reuses shared parts of `prev` where the content is equal.
    pub(crate) fn share_with(mut self, prev: &Usages) -> Self {
        if self.slots == prev.slots {
            self.slots = prev.slots.clone();
        }
        if self.techs == prev.techs {
            self.techs = prev.techs.clone();
        }
        self
    }
}
