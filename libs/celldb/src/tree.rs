//! Cell trees: a backup together with the trees of every subcell it uses.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::Level;

use crate::backup::CellBackup;
use crate::cache::CacheSlot;
use crate::equiv::{CellResolver, EquivPorts, Equivalence};
use crate::error::{Error, Result};
use crate::geom::{BoundsBuilder, Rect};
use crate::ids::CellId;
use crate::tech::TechPool;

/// A backup and the trees of its subcells, indexed by usage slot.
///
/// A tree never contains its own cell, so hierarchies are acyclic by
/// construction.
#[derive(Debug)]
pub struct CellTree {
    backup: Arc<CellBackup>,
    subtrees: Arc<[Option<Arc<CellTree>>]>,
    tech_pool: TechPool,
    all_cells: Arc<BTreeSet<CellId>>,
    bounds: CacheSlot<Option<Rect>>,
    equivalence: CacheSlot<EquivPorts>,
}

impl CellTree {
    /// Assembles a tree.
    ///
    /// `subtrees[i]` is the tree of the subcell in usage slot `i` of the
    /// backup's revision; trailing `None`s may be omitted. Every technology
    /// of the hierarchy must be the same object as in `pool`.
    pub fn new(
        backup: Arc<CellBackup>,
        subtrees: Vec<Option<Arc<CellTree>>>,
        pool: &TechPool,
    ) -> Result<Arc<Self>> {
        Ok(Arc::new(Self::assemble(None, backup, subtrees, pool)?))
    }

    /// Derives a tree.
    ///
    /// Returns `self` if the backup and every subtree are the same objects.
    /// Cached bounds and equivalence are carried forward when the backup is
    /// unchanged and every subtree's value is unchanged.
    pub fn with(
        self: &Arc<Self>,
        backup: Arc<CellBackup>,
        subtrees: Vec<Option<Arc<CellTree>>>,
        pool: &TechPool,
    ) -> Result<Arc<Self>> {
        let subtrees = trim(subtrees);
        if Arc::ptr_eq(&backup, &self.backup)
            && same_subtrees(&subtrees, &self.subtrees)
            && self.tech_pool.is_consistent_with(pool)
            && contains_all(pool, &self.tech_pool)
        {
            return Ok(self.clone());
        }
        Ok(Arc::new(Self::assemble(Some(self), backup, subtrees, pool)?))
    }

    fn assemble(
        prior: Option<&CellTree>,
        backup: Arc<CellBackup>,
        subtrees: Vec<Option<Arc<CellTree>>>,
        pool: &TechPool,
    ) -> Result<Self> {
        let rev = backup.revision();
        let cell = rev.cell_id();
        let _guard = tracing::span!(Level::DEBUG, "assembling cell tree", cell = %cell).entered();
        let subtrees = trim(subtrees);
        let usages = rev.usages();

        if subtrees.len() > usages.len() {
            return Err(Error::UnexpectedSubtree {
                cell: cell.clone(),
                slot: usages.len(),
            });
        }
        let mut tech_pool = backup.tech_pool().clone();
        let mut all_cells = BTreeSet::new();
        for (slot, usage) in usages.iter().enumerate() {
            let subtree = subtrees.get(slot).and_then(Option::as_ref);
            match (usage.is_empty(), subtree) {
                (true, None) => {}
                (true, Some(_)) => {
                    return Err(Error::UnexpectedSubtree {
                        cell: cell.clone(),
                        slot,
                    })
                }
                (false, None) => {
                    return Err(Error::MissingSubtree {
                        cell: cell.clone(),
                        child: usage.proto().clone(),
                    })
                }
                (false, Some(subtree)) => {
                    rev.check_usage(slot, subtree.backup.revision())?;
                    tech_pool = tech_pool.union(&subtree.tech_pool)?;
                    all_cells.insert(subtree.cell_id().clone());
                    all_cells.extend(subtree.all_cells.iter().cloned());
                }
            }
        }
        if all_cells.contains(cell) {
            return Err(Error::HierarchyCycle(cell.clone()));
        }
        if let Some(id) = tech_pool
            .ids()
            .find(|id| match (tech_pool.get(id), pool.get(id)) {
                (Some(a), Some(b)) => !Arc::ptr_eq(a, b),
                _ => true,
            })
        {
            return Err(Error::TechPoolMismatch(id.clone()));
        }

        let subtrees: Arc<[Option<Arc<CellTree>>]> = match prior {
            Some(prior) if same_subtrees(&subtrees, &prior.subtrees) => prior.subtrees.clone(),
            _ => subtrees.into(),
        };
        let all_cells = match prior {
            Some(prior) if *prior.all_cells == all_cells => prior.all_cells.clone(),
            _ => Arc::new(all_cells),
        };
        let tech_pool = match prior {
            Some(prior) if prior.tech_pool == tech_pool => prior.tech_pool.clone(),
            _ => tech_pool,
        };

        let tree = Self {
            backup,
            subtrees,
            tech_pool,
            all_cells,
            bounds: CacheSlot::new(),
            equivalence: CacheSlot::new(),
        };
        if let Some(prior) = prior {
            tree.carry_caches(prior);
        }
        Ok(tree)
    }

    /// Reuses the prior tree's cached values where nothing they depend on
    /// changed.
    fn carry_caches(&self, prior: &CellTree) {
        if !Arc::ptr_eq(&self.backup, &prior.backup) || self.subtrees.len() != prior.subtrees.len()
        {
            return;
        }
        let pairs = || self.subtrees.iter().zip(prior.subtrees.iter());
        if let Some(bounds) = prior.bounds.get() {
            let children_same = pairs().all(|(a, b)| match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => {
                    Arc::ptr_eq(a, b)
                        || matches!((a.bounds.get(), b.bounds.get()), (Some(x), Some(y)) if x == y)
                }
                _ => false,
            });
            if children_same {
                self.bounds.set(bounds);
            }
        }
        if let Some(equivalence) = prior.equivalence.get() {
            let children_same = pairs().all(|(a, b)| match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => {
                    Arc::ptr_eq(a, b)
                        || matches!(
                            (a.equivalence.get(), b.equivalence.get()),
                            (Some(x), Some(y)) if x.equals_ports(&y)
                        )
                }
                _ => false,
            });
            if children_same {
                self.equivalence.set(equivalence);
            }
        }
    }

    /// The backup.
    #[inline]
    pub fn backup(&self) -> &Arc<CellBackup> {
        &self.backup
    }

    /// The cell.
    #[inline]
    pub fn cell_id(&self) -> &CellId {
        self.backup.cell_id()
    }

    /// Subtrees indexed by usage slot.
    #[inline]
    pub fn subtrees(&self) -> &[Option<Arc<CellTree>>] {
        &self.subtrees
    }

    /// The subtree of a used subcell.
    pub fn subtree(&self, cell: &CellId) -> Option<&Arc<CellTree>> {
        let slot = self.backup.revision().usage_slot(cell)?;
        self.subtrees.get(slot)?.as_ref()
    }

    /// Every technology of the hierarchy.
    #[inline]
    pub fn tech_pool(&self) -> &TechPool {
        &self.tech_pool
    }

    /// Every cell used, directly or transitively, excluding this one.
    #[inline]
    pub fn all_cells(&self) -> &BTreeSet<CellId> {
        &self.all_cells
    }

    /// Bounds of the whole hierarchy in this cell's coordinates.
    pub fn bounds(&self) -> Option<Rect> {
        *self.bounds.get_or_init(|| self.compute_bounds())
    }

    fn compute_bounds(&self) -> Option<Rect> {
        let rev = self.backup.revision();
        let mut bounds = BoundsBuilder::new();
        bounds.add_opt(self.backup.primitive_bounds());
        for node in rev.nodes().iter() {
            let Some(child) = node.proto().as_cell().and_then(|c| self.subtree(c)) else {
                continue;
            };
            if let Some(r) = child.bounds() {
                bounds.add(r.transform(node.orient(), node.anchor()));
            }
        }
        bounds.build()
    }

    /// Port equivalence of this cell within its own hierarchy.
    ///
    /// Icons use their own content here, since their main schematics are not
    /// part of the hierarchy; [`Snapshot::equivalence`] resolves them.
    ///
    /// [`Snapshot::equivalence`]: crate::Snapshot::equivalence
    pub fn equivalence(&self) -> Result<Arc<EquivPorts>> {
        self.equivalence_with(cfg!(debug_assertions))
    }

    /// Port equivalence of this cell, optionally checking every closed map.
    pub fn equivalence_with(&self, verify: bool) -> Result<Arc<EquivPorts>> {
        Equivalence::new(self)
            .with_verification(verify)
            .compute(self.cell_id())
    }

    /// Returns `true` if the equivalence is cached.
    #[inline]
    pub fn is_equivalence_cached(&self) -> bool {
        self.equivalence.is_cached()
    }

    pub(crate) fn cached_equivalence(&self) -> Option<Arc<EquivPorts>> {
        self.equivalence.get()
    }

    pub(crate) fn store_equivalence(&self, equivalence: Arc<EquivPorts>) {
        self.equivalence.set(equivalence);
    }

    /// The tree of a cell in this hierarchy, including this one.
    pub fn find(&self, cell: &CellId) -> Option<&CellTree> {
        if self.cell_id() == cell {
            return Some(self);
        }
        if !self.all_cells.contains(cell) {
            return None;
        }
        self.subtrees.iter().flatten().find_map(|t| t.find(cell))
    }

    /// Drops cached bounds and equivalence of this tree and its backup.
    pub fn reclaim_caches(&self) {
        self.bounds.reclaim();
        self.equivalence.reclaim();
        self.backup.reclaim_caches();
    }
}

impl CellResolver for CellTree {
    fn tree(&self, cell: &CellId) -> Option<&CellTree> {
        self.find(cell)
    }

    fn main_schematic(&self, _icon: &CellId) -> Option<CellId> {
        None
    }
}

fn trim(mut subtrees: Vec<Option<Arc<CellTree>>>) -> Vec<Option<Arc<CellTree>>> {
    while matches!(subtrees.last(), Some(None)) {
        subtrees.pop();
    }
    subtrees
}

fn same_subtrees(a: &[Option<Arc<CellTree>>], b: &[Option<Arc<CellTree>>]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| match (x, y) {
            (None, None) => true,
            (Some(x), Some(y)) => Arc::ptr_eq(x, y),
            _ => false,
        })
}

fn contains_all(pool: &TechPool, techs: &TechPool) -> bool {
    pool.contains(techs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{Orientation, Point, Rotation};
    use crate::ids::View;
    use crate::tech::builtin;
    use crate::tests::fixtures::*;
    use test_log::test;

    fn leaf(rev: Arc<crate::CellRevision>) -> Arc<CellTree> {
        let pool = builtin::pool();
        CellTree::new(CellBackup::new(rev, &pool).unwrap(), Vec::new(), &pool).unwrap()
    }

    #[test]
    fn unchanged_with_returns_same_instance() {
        let pool = builtin::pool();
        let child = leaf(exported_pins("child", 2));
        let parent_rev = parent_binding_export(child.backup().revision(), 0);
        let backup = CellBackup::new(parent_rev, &pool).unwrap();
        let tree = CellTree::new(backup.clone(), vec![Some(child.clone())], &pool).unwrap();
        let same = tree
            .with(backup, vec![Some(child.clone()), None, None], &pool)
            .unwrap();
        assert!(Arc::ptr_eq(&tree, &same));
        assert!(tree.all_cells().contains(child.cell_id()));
    }

    #[test]
    fn missing_and_unexpected_subtrees() {
        let pool = builtin::pool();
        let child = leaf(exported_pins("child", 1));
        let parent_rev = parent_binding_export(child.backup().revision(), 0);
        let backup = CellBackup::new(parent_rev, &pool).unwrap();
        let err = CellTree::new(backup.clone(), Vec::new(), &pool).unwrap_err();
        assert!(matches!(err, Error::MissingSubtree { .. }));
        let err = CellTree::new(backup, vec![Some(child.clone()), Some(child)], &pool).unwrap_err();
        assert!(matches!(err, Error::UnexpectedSubtree { slot: 1, .. }));
    }

    #[test]
    fn wrong_subtree_is_rejected() {
        let pool = builtin::pool();
        let child = leaf(exported_pins("child", 1));
        let other = leaf(exported_pins("other", 1));
        let parent_rev = parent_binding_export(child.backup().revision(), 0);
        let backup = CellBackup::new(parent_rev, &pool).unwrap();
        let err = CellTree::new(backup, vec![Some(other)], &pool).unwrap_err();
        assert!(matches!(err, Error::SubtreeMismatch { slot: 0, .. }));
    }

    #[test]
    fn stale_usage_fails_assembly() {
        let pool = builtin::pool();
        let child_rev = exported_pins("child", 2);
        let parent_rev = parent_binding_export(&child_rev, 1);
        let edited = child_rev
            .with(
                child_rev.meta().clone(),
                None,
                None,
                Some(child_rev.exports().iter().take(1).cloned().collect::<Vec<_>>().into()),
            )
            .unwrap();
        let backup = CellBackup::new(parent_rev, &pool).unwrap();
        let err = CellTree::new(backup, vec![Some(leaf(edited))], &pool).unwrap_err();
        assert!(matches!(err, Error::StaleUsage { .. }));
    }

    #[test]
    fn technology_objects_must_match() {
        let tree = leaf(two_pins_and_wire());
        let impostor = crate::Technology::builder(builtin::SCHEMATIC).build();
        let pool = TechPool::from_techs([impostor]);
        let backup = tree.backup().clone();
        let err = CellTree::new(backup, Vec::new(), &pool).unwrap_err();
        assert!(matches!(err, Error::TechPoolMismatch(_)));
    }

    #[test]
    fn rotated_instance_bounds() {
        let pool = builtin::pool();
        let child = leaf(two_pins_and_wire());
        assert_eq!(child.bounds(), Some(Rect::from_sides(0, 0, 10, 0)));

        let parent = empty_schematic("top");
        let inst = instance(0, "sub@0", child.cell_id(), 100, 50)
            .with_orient(Orientation::new(false, Rotation::R90));
        let parent = parent
            .with(parent.meta().clone(), Some(vec![inst].into()), None, None)
            .unwrap();
        let backup = CellBackup::new(parent, &pool).unwrap();
        let tree = CellTree::new(backup, vec![Some(child)], &pool).unwrap();
        assert_eq!(tree.bounds(), Some(Rect::from_sides(100, 50, 100, 60)));
    }

    #[test]
    fn modified_flag_change_recomputes_equal_caches() {
        let pool = builtin::pool();
        let tree = leaf(exported_pins("cell", 2));
        let eq = tree.equivalence().unwrap();
        let bounds = tree.bounds();
        let modified = tree
            .backup()
            .with(tree.backup().revision().clone(), true, &pool)
            .unwrap();
        let next = tree.with(modified, Vec::new(), &pool).unwrap();
        assert!(!Arc::ptr_eq(&tree, &next));
        // Backup changed, so caches are recomputed but equal.
        assert!(next.equivalence().unwrap().equals_ports(&eq));
        assert_eq!(next.bounds(), bounds);
        assert_eq!(tree.cell_id().view(), View::Layout);
    }
}
