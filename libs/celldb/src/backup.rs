//! Cell backups: a revision bound to the technologies it uses.

use std::sync::Arc;

use fixedbitset::FixedBitSet;
use tracing::Level;

use crate::cache::CacheSlot;
use crate::connectivity::ConnectivityIndex;
use crate::error::{Error, Result};
use crate::geom::{BoundsBuilder, Rect};
use crate::ids::{CellId, NodeProtoId, PortProtoId};
use crate::remap::IdMapper;
use crate::revision::CellRevision;
use crate::tech::{PrimitiveFunction, TechPool};

/// A revision together with its restricted technology pool, a modified flag
/// and technology-dependent caches.
#[derive(Debug)]
pub struct CellBackup {
    revision: Arc<CellRevision>,
    tech_pool: TechPool,
    modified: bool,
    pin_wipe: CacheSlot<FixedBitSet>,
    hard_shapes: CacheSlot<FixedBitSet>,
    primitive_bounds: CacheSlot<Option<Rect>>,
}

impl CellBackup {
    /// Creates an unmodified backup.
    ///
    /// `pool` must contain every technology the revision uses; the backup
    /// keeps only those.
    pub fn new(revision: Arc<CellRevision>, pool: &TechPool) -> Result<Arc<Self>> {
        let tech_pool = pool.restrict(revision.tech_usages())?;
        validate(&revision, &tech_pool)?;
        Ok(Arc::new(Self::from_parts(revision, tech_pool, false)))
    }

    fn from_parts(revision: Arc<CellRevision>, tech_pool: TechPool, modified: bool) -> Self {
        Self {
            revision,
            tech_pool,
            modified,
            pin_wipe: CacheSlot::new(),
            hard_shapes: CacheSlot::new(),
            primitive_bounds: CacheSlot::new(),
        }
    }

    /// Derives a backup.
    ///
    /// Returns `self` if the revision is the same object, the flag is
    /// unchanged and the restricted pool is equal.
    pub fn with(
        self: &Arc<Self>,
        revision: Arc<CellRevision>,
        modified: bool,
        pool: &TechPool,
    ) -> Result<Arc<Self>> {
        let same_revision = Arc::ptr_eq(&revision, &self.revision);
        let restricted = pool.restrict(revision.tech_usages())?;
        let tech_pool = if restricted == self.tech_pool {
            self.tech_pool.clone()
        } else {
            restricted
        };
        let same_pool = tech_pool.ptr_eq(&self.tech_pool);
        if same_revision && same_pool && modified == self.modified {
            return Ok(self.clone());
        }
        if !same_revision || !same_pool {
            validate(&revision, &tech_pool)?;
        }
        let next = Self::from_parts(revision, tech_pool, modified);
        if same_revision && same_pool {
            // Only the flag changed.
            if let Some(v) = self.pin_wipe.get() {
                next.pin_wipe.set(v);
            }
            if let Some(v) = self.hard_shapes.get() {
                next.hard_shapes.set(v);
            }
            if let Some(v) = self.primitive_bounds.get() {
                next.primitive_bounds.set(v);
            }
        }
        Ok(Arc::new(next))
    }

    /// The revision.
    #[inline]
    pub fn revision(&self) -> &Arc<CellRevision> {
        &self.revision
    }

    /// The cell.
    #[inline]
    pub fn cell_id(&self) -> &CellId {
        self.revision.cell_id()
    }

    /// The technologies used by the revision.
    #[inline]
    pub fn tech_pool(&self) -> &TechPool {
        &self.tech_pool
    }

    /// Returns `true` if the cell changed since it was last saved.
    #[inline]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Node positions of pins that can be wiped from display: pins with one
    /// or two connections, all of wipable arcs, and no exports.
    pub fn pin_wipe(&self) -> Arc<FixedBitSet> {
        self.pin_wipe.get_or_init(|| self.compute_pin_wipe())
    }

    /// Returns `true` if the node at `position` is a wiped pin.
    pub fn is_wiped(&self, position: usize) -> bool {
        self.pin_wipe().contains(position)
    }

    /// Arc positions of arcs that cannot be drawn as simple polygons:
    /// non-Manhattan arcs and arcs ending on a node that is not a pin.
    pub fn hard_shapes(&self) -> Arc<FixedBitSet> {
        self.hard_shapes.get_or_init(|| self.compute_hard_shapes())
    }

    /// Bounds of the primitives and arcs of this cell, ignoring subcells.
    ///
    /// The cell center, wiped pins and invisible pins without inheritable or
    /// interior variables do not contribute. `None` for a cell with no
    /// contributing elements.
    pub fn primitive_bounds(&self) -> Option<Rect> {
        *self
            .primitive_bounds
            .get_or_init(|| self.compute_primitive_bounds())
    }

    /// Drops all cached values.
    pub fn reclaim_caches(&self) {
        self.pin_wipe.reclaim();
        self.hard_shapes.reclaim();
        self.primitive_bounds.reclaim();
        self.revision.reclaim_caches();
    }

    /// Rewrites every embedded identifier through `mapper`.
    pub fn with_ids(self: &Arc<Self>, mapper: &IdMapper) -> Result<Arc<Self>> {
        let revision = self.revision.with_ids(mapper)?;
        if Arc::ptr_eq(&revision, &self.revision) {
            return Ok(self.clone());
        }
        Ok(Arc::new(Self::from_parts(
            revision,
            self.tech_pool.clone(),
            self.modified,
        )))
    }

    fn function_of(&self, proto: &NodeProtoId) -> Option<PrimitiveFunction> {
        proto
            .as_primitive()
            .and_then(|id| self.tech_pool.primitive(id))
            .map(|p| p.function())
    }

    fn compute_pin_wipe(&self) -> FixedBitSet {
        let rev = &*self.revision;
        let index = rev.block_index();
        let mut wiped = FixedBitSet::with_capacity(rev.nodes().len());
        for (pos, node) in rev.nodes().iter().enumerate() {
            if self.function_of(node.proto()) != Some(PrimitiveFunction::Pin) {
                continue;
            }
            if index.has_exports(rev, node.id(), None) {
                continue;
            }
            let conns = index.connections(rev, node.id(), None);
            if !(1..=2).contains(&conns.len()) {
                continue;
            }
            let wipable = conns.iter().all(|c| {
                self.tech_pool
                    .arc_proto(c.arc(rev).proto())
                    .is_some_and(|p| p.is_wipable())
            });
            if wipable {
                wiped.insert(pos);
            }
        }
        wiped
    }

    fn compute_hard_shapes(&self) -> FixedBitSet {
        let rev = &*self.revision;
        let mut hard = FixedBitSet::with_capacity(rev.arcs().len());
        for (pos, arc) in rev.arcs().iter().enumerate() {
            let on_pins = [arc.tail(), arc.head()].iter().all(|end| {
                rev.node(end.node())
                    .and_then(|n| self.function_of(n.proto()))
                    .is_some_and(|f| f == PrimitiveFunction::Pin)
            });
            if !arc.is_manhattan() || !on_pins {
                hard.insert(pos);
            }
        }
        hard
    }

    fn compute_primitive_bounds(&self) -> Option<Rect> {
        let rev = &*self.revision;
        let _guard =
            tracing::span!(Level::TRACE, "computing primitive bounds", cell = %rev.cell_id())
                .entered();
        let wiped = self.pin_wipe();
        let mut bounds = BoundsBuilder::new();
        for (pos, node) in rev.nodes().iter().enumerate() {
            let Some(prim) = node
                .proto()
                .as_primitive()
                .and_then(|id| self.tech_pool.primitive(id))
            else {
                continue;
            };
            let skip = match prim.function() {
                PrimitiveFunction::CellCenter => true,
                PrimitiveFunction::InvisiblePin => !node.vars().has_inheritable_or_interior(),
                _ => wiped.contains(pos),
            };
            if !skip {
                bounds.add(prim.bounds(node.orient(), node.anchor(), node.size()));
            }
        }
        for arc in rev.arcs().iter() {
            bounds.add(arc.bounds());
        }
        bounds.build()
    }
}

/// Checks that every primitive, primitive port and arc prototype exists.
fn validate(revision: &CellRevision, pool: &TechPool) -> Result<()> {
    let check_port = |port: &PortProtoId| match port {
        PortProtoId::Primitive(p) if pool.primitive_port(p).is_none() => {
            Err(Error::UnknownPrimitive(p.node().clone()))
        }
        _ => Ok(()),
    };
    for node in revision.nodes().iter() {
        if let NodeProtoId::Primitive(id) = node.proto() {
            if pool.primitive(id).is_none() {
                return Err(Error::UnknownPrimitive(id.clone()));
            }
        }
    }
    for arc in revision.arcs().iter() {
        if pool.arc_proto(arc.proto()).is_none() {
            return Err(Error::UnknownArcProto(arc.proto().clone()));
        }
        check_port(arc.tail().port())?;
        check_port(arc.head().port())?;
    }
    for export in revision.exports().iter() {
        check_port(export.original_port())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ArcEnd, ArcInst};
    use crate::geom::Point;
    use crate::ids::ArcId;
    use crate::tech::builtin;
    use crate::tests::fixtures::*;
    use test_log::test;

    #[test]
    fn unchanged_with_returns_same_instance() {
        let rev = two_pins_and_wire();
        let backup = CellBackup::new(rev.clone(), &builtin::pool()).unwrap();
        let same = backup.with(rev.clone(), false, &builtin::pool()).unwrap();
        assert!(Arc::ptr_eq(&backup, &same));
        let modified = backup.with(rev, true, &builtin::pool()).unwrap();
        assert!(!Arc::ptr_eq(&backup, &modified));
        assert!(modified.is_modified());
        assert!(modified.tech_pool().ptr_eq(backup.tech_pool()));
    }

    #[test]
    fn pool_is_restricted_to_used_technologies() {
        let backup = CellBackup::new(two_pins_and_wire(), &builtin::pool()).unwrap();
        let ids: Vec<&str> = backup.tech_pool().ids().map(|t| t.name().as_str()).collect();
        assert_eq!(ids, vec!["schematic"]);
    }

    #[test]
    fn missing_technology_is_rejected() {
        let err = CellBackup::new(two_pins_and_wire(), &TechPool::new()).unwrap_err();
        assert!(matches!(err, Error::UnknownTechnology(_)));
    }

    #[test]
    fn pins_with_wires_are_wiped() {
        let backup = CellBackup::new(two_pins_and_wire(), &builtin::pool()).unwrap();
        let wiped = backup.pin_wipe();
        assert_eq!(wiped.ones().collect::<Vec<_>>(), vec![0, 1]);
        assert!(backup.hard_shapes().is_clear());
    }

    #[test]
    fn exported_pins_are_not_wiped() {
        let rev = exported_pins("cell", 2);
        let backup = CellBackup::new(rev, &builtin::pool()).unwrap();
        assert!(backup.pin_wipe().is_clear());
    }

    #[test]
    fn diagonal_arcs_are_hard() {
        let rev = two_pins_and_wire();
        let arc = &rev.arcs()[0];
        let tail = arc.tail().clone();
        let head = ArcEnd::new(arc.head().node(), arc.head().port().clone(), Point::new(10, 10))
            .unwrap();
        let diagonal = ArcInst::new(ArcId(0), arc.proto().clone(), arc.name().clone(), tail, head, 0)
            .unwrap();
        let rev = rev
            .with(rev.meta().clone(), None, Some(vec![diagonal].into()), None)
            .unwrap();
        let backup = CellBackup::new(rev, &builtin::pool()).unwrap();
        assert_eq!(backup.hard_shapes().ones().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn primitive_bounds_skip_wiped_pins() {
        let backup = CellBackup::new(two_pins_and_wire(), &builtin::pool()).unwrap();
        // Only the zero-width wire from (0, 0) to (10, 0) remains.
        assert_eq!(
            backup.primitive_bounds(),
            Some(Rect::from_sides(0, 0, 10, 0))
        );
        let empty = CellBackup::new(empty_layout("nothing"), &builtin::pool()).unwrap();
        assert_eq!(empty.primitive_bounds(), None);
    }
}
