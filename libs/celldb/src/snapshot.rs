//! Consistent sets of cells.
//!
//! A [`Snapshot`] maps every cell to its backup and its tree. Snapshots are
//! immutable; each change produces a new snapshot in which every tree whose
//! backup and subtrees are unchanged is the same object as before.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::Level;

use crate::backup::CellBackup;
use crate::config::DbConfig;
use crate::connectivity::{Connection, EngineKind};
use crate::diagnostics::{IssueSet, NetIssue};
use crate::equiv::{CellResolver, EquivPorts, Equivalence};
use crate::error::{Error, Result};
use crate::ids::{CellId, NodeId, PortProtoId, View};
use crate::metrics::{Counter, Metrics, NoMetrics};
use crate::remap::IdMapper;
use crate::revision::CellRevision;
use crate::tech::TechPool;
use crate::tree::CellTree;

/// A consistent set of cell backups and the trees assembled from them.
#[derive(Clone, Debug)]
pub struct Snapshot {
    config: Arc<DbConfig>,
    metrics: Arc<dyn Metrics>,
    pool: TechPool,
    backups: Arc<BTreeMap<CellId, Arc<CellBackup>>>,
    trees: Arc<BTreeMap<CellId, Arc<CellTree>>>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    pub fn new(config: DbConfig, metrics: Arc<dyn Metrics>, pool: TechPool) -> Self {
        Self {
            config: Arc::new(config),
            metrics,
            pool,
            backups: Arc::new(BTreeMap::new()),
            trees: Arc::new(BTreeMap::new()),
        }
    }

    /// Creates an empty snapshot with default configuration and no metrics.
    pub fn with_pool(pool: TechPool) -> Self {
        Self::new(DbConfig::default(), Arc::new(NoMetrics), pool)
    }

    /// The configuration.
    #[inline]
    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// The technology pool.
    #[inline]
    pub fn tech_pool(&self) -> &TechPool {
        &self.pool
    }

    /// Every cell, in id order.
    pub fn cells(&self) -> impl Iterator<Item = &CellId> {
        self.backups.keys()
    }

    /// The backup of a cell.
    pub fn backup(&self, cell: &CellId) -> Option<&Arc<CellBackup>> {
        self.backups.get(cell)
    }

    /// The tree of a cell.
    pub fn tree(&self, cell: &CellId) -> Option<&Arc<CellTree>> {
        self.trees.get(cell)
    }

    /// The revision of a cell.
    pub fn revision(&self, cell: &CellId) -> Option<&Arc<CellRevision>> {
        self.backups.get(cell).map(|b| b.revision())
    }

    /// Replaces, adds (`Some`) or removes (`None`) backups and reassembles
    /// the trees.
    ///
    /// Fails if any used subcell is missing, the hierarchy has a cycle, a
    /// usage is stale, or a backup's technologies are not the pool's.
    pub fn with_backups(
        &self,
        changes: impl IntoIterator<Item = (CellId, Option<Arc<CellBackup>>)>,
    ) -> Result<Self> {
        let mut backups = (*self.backups).clone();
        let mut changed = false;
        for (cell, backup) in changes {
            match backup {
                Some(backup) => {
                    if backup.cell_id() != &cell {
                        return Err(Error::CellIdChanged {
                            from: cell,
                            to: backup.cell_id().clone(),
                        });
                    }
                    if self.config.verify {
                        backup.revision().check()?;
                    }
                    match backups.insert(cell, backup.clone()) {
                        Some(prev) if Arc::ptr_eq(&prev, &backup) => {}
                        _ => changed = true,
                    }
                }
                None => changed |= backups.remove(&cell).is_some(),
            }
        }
        if !changed {
            return Ok(self.clone());
        }
        self.reassemble(backups, &self.trees)
    }

    /// Stores a new revision of a cell, marking its backup modified.
    pub fn with_revision(&self, revision: Arc<CellRevision>) -> Result<Self> {
        let cell = revision.cell_id().clone();
        let backup = match self.backups.get(&cell) {
            Some(prev) => {
                if !Arc::ptr_eq(prev.revision(), &revision) {
                    self.metrics.incr(Counter::RevisionDerived, 1);
                }
                prev.with(revision, true, &self.pool)?
            }
            None => {
                self.metrics.incr(Counter::RevisionDerived, 1);
                CellBackup::new(revision.clone(), &self.pool)?.with(revision, true, &self.pool)?
            }
        };
        if let Some(prev) = self.backups.get(&cell) {
            if Arc::ptr_eq(prev, &backup) {
                return Ok(self.clone());
            }
        }
        self.metrics.incr(Counter::BackupCreated, 1);
        if self.config.connectivity == EngineKind::Blocks {
            let stats = backup.revision().block_index().stats();
            self.metrics.incr(Counter::BlockRebuilt, stats.rebuilt as u64);
            self.metrics.incr(Counter::BlockReused, stats.reused as u64);
        }
        self.with_backups([(cell, Some(backup))])
    }

    /// Renames libraries, cells and exports throughout the snapshot.
    pub fn with_ids(&self, mapper: &IdMapper) -> Result<Self> {
        if mapper.is_identity() {
            return Ok(self.clone());
        }
        let _guard = tracing::span!(Level::DEBUG, "renaming snapshot ids").entered();
        let mut backups = BTreeMap::new();
        for backup in self.backups.values() {
            let backup = backup.with_ids(mapper)?;
            let cell = backup.cell_id().clone();
            if backups.contains_key(&cell) {
                return Err(Error::InvalidRename {
                    what: "cell",
                    detail: format!("two cells renamed to `{}`", cell),
                });
            }
            backups.insert(cell, backup);
        }
        // Trees of unchanged cells are reused where their subtrees are too.
        self.reassemble(backups, &self.trees)
    }

    fn reassemble(
        &self,
        backups: BTreeMap<CellId, Arc<CellBackup>>,
        prior: &BTreeMap<CellId, Arc<CellTree>>,
    ) -> Result<Self> {
        let _guard =
            tracing::span!(Level::DEBUG, "assembling snapshot", cells = backups.len()).entered();
        let mut assembly = Assembly {
            backups: &backups,
            prior,
            pool: &self.pool,
            metrics: &*self.metrics,
            built: BTreeMap::new(),
            in_progress: BTreeSet::new(),
        };
        for cell in backups.keys() {
            assembly.build(cell)?;
        }
        let trees = assembly.built;
        Ok(Self {
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            pool: self.pool.clone(),
            backups: Arc::new(backups),
            trees: Arc::new(trees),
        })
    }

    /// The main schematic of a cell: the highest version of the schematic
    /// view with the same library and name.
    pub fn main_schematic(&self, cell: &CellId) -> Option<CellId> {
        let name = cell.cell_name();
        self.backups
            .keys()
            .filter(|c| {
                c.lib() == cell.lib()
                    && c.view() == View::Schematic
                    && c.cell_name().name() == name.name()
            })
            .max_by_key(|c| c.cell_name().version())
            .cloned()
    }

    /// The port equivalence of a cell.
    ///
    /// Schematic and icon cells resolve named nets and globals, and icons
    /// resolve to their main schematic when one exists. Results are stored
    /// on the trees and reused while their inputs are unchanged.
    pub fn equivalence(&self, cell: &CellId) -> Result<Arc<EquivPorts>> {
        Ok(self.schematic_equivalence(cell)?.0)
    }

    /// The port equivalence of a cell, with the issues of every cell it was
    /// resolved through.
    pub fn schematic_equivalence(
        &self,
        cell: &CellId,
    ) -> Result<(Arc<EquivPorts>, IssueSet<NetIssue>)> {
        let mut equiv = Equivalence::new(self).with_verification(self.config.verify);
        let result = equiv.compute(cell);
        self.metrics
            .incr(Counter::EquivComputed, equiv.computed() as u64);
        Ok((result?, equiv.into_issues()))
    }

    /// Arc ends bound to a node, answered by the configured engine.
    ///
    /// # Panics
    ///
    /// Panics if the node is not in the cell, or the port is not a port of
    /// the node's prototype.
    pub fn connections(
        &self,
        cell: &CellId,
        node: NodeId,
        port: Option<&PortProtoId>,
    ) -> Result<Vec<Connection>> {
        let rev = self
            .revision(cell)
            .ok_or_else(|| Error::MissingCell(cell.clone()))?;
        let index = rev.connectivity(self.config.connectivity, self.config.insertion_sort_threshold);
        Ok(index.connections(rev, node, port))
    }

    /// Export positions of a node, answered by the configured engine.
    ///
    /// # Panics
    ///
    /// Panics if the node is not in the cell, or the port is not a port of
    /// the node's prototype.
    pub fn exports(
        &self,
        cell: &CellId,
        node: NodeId,
        port: Option<&PortProtoId>,
    ) -> Result<Vec<usize>> {
        let rev = self
            .revision(cell)
            .ok_or_else(|| Error::MissingCell(cell.clone()))?;
        let index = rev.connectivity(self.config.connectivity, self.config.insertion_sort_threshold);
        Ok(index.exports(rev, node, port))
    }

    /// Drops every reclaimable cache.
    pub fn reclaim_caches(&self) {
        for tree in self.trees.values() {
            tree.reclaim_caches();
            tree.backup().revision().reclaim_caches();
        }
    }
}

impl CellResolver for Snapshot {
    fn tree(&self, cell: &CellId) -> Option<&CellTree> {
        self.trees.get(cell).map(|t| &**t)
    }

    fn main_schematic(&self, icon: &CellId) -> Option<CellId> {
        Snapshot::main_schematic(self, icon)
    }
}

/// Bottom-up tree assembly.
struct Assembly<'a> {
    backups: &'a BTreeMap<CellId, Arc<CellBackup>>,
    prior: &'a BTreeMap<CellId, Arc<CellTree>>,
    pool: &'a TechPool,
    metrics: &'a dyn Metrics,
    built: BTreeMap<CellId, Arc<CellTree>>,
    in_progress: BTreeSet<CellId>,
}

impl Assembly<'_> {
    fn build(&mut self, cell: &CellId) -> Result<Arc<CellTree>> {
        if let Some(tree) = self.built.get(cell) {
            return Ok(tree.clone());
        }
        if !self.in_progress.insert(cell.clone()) {
            return Err(Error::HierarchyCycle(cell.clone()));
        }
        let backup = self
            .backups
            .get(cell)
            .ok_or_else(|| Error::MissingCell(cell.clone()))?
            .clone();
        let mut subtrees = Vec::with_capacity(backup.revision().usages().len());
        for usage in backup.revision().usages() {
            if usage.is_empty() {
                subtrees.push(None);
            } else {
                subtrees.push(Some(self.build(usage.proto())?));
            }
        }
        self.in_progress.remove(cell);

        let tree = match self.prior.get(cell) {
            Some(prior) => {
                let tree = prior.with(backup, subtrees, self.pool)?;
                if Arc::ptr_eq(&tree, prior) {
                    self.metrics.incr(Counter::TreeReused, 1);
                } else {
                    self.metrics.incr(Counter::TreeCreated, 1);
                    if tree.is_equivalence_cached() {
                        self.metrics.incr(Counter::EquivReused, 1);
                    }
                }
                tree
            }
            None => {
                self.metrics.incr(Counter::TreeCreated, 1);
                CellTree::new(backup, subtrees, self.pool)?
            }
        };
        self.built.insert(cell.clone(), tree.clone());
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::CounterMetrics;
    use crate::tech::builtin;
    use crate::tests::fixtures::*;
    use test_log::test;

    #[test]
    fn unchanged_trees_are_reused() {
        let metrics = Arc::new(CounterMetrics::new());
        let snap = Snapshot::new(DbConfig::default(), metrics.clone(), builtin::pool());
        let child = exported_pins("child", 2);
        let parent = parent_binding_export(&child, 0);
        let other = two_pins_and_wire();
        let snap = snap
            .with_revision(child.clone())
            .unwrap()
            .with_revision(parent.clone())
            .unwrap()
            .with_revision(other.clone())
            .unwrap();
        let parent_tree = snap.tree(parent.cell_id()).unwrap().clone();
        let child_tree = snap.tree(child.cell_id()).unwrap().clone();
        assert!(Arc::ptr_eq(parent_tree.subtree(child.cell_id()).unwrap(), &child_tree));

        let renamed = other
            .with(
                other.meta().with_revision_date(7),
                None,
                None,
                None,
            )
            .unwrap();
        let next = snap.with_revision(renamed).unwrap();
        assert!(Arc::ptr_eq(next.tree(parent.cell_id()).unwrap(), &parent_tree));
        assert!(Arc::ptr_eq(next.tree(child.cell_id()).unwrap(), &child_tree));
        assert!(metrics.get(Counter::TreeReused) >= 2);
    }

    #[test]
    fn missing_child_is_reported() {
        let snap = Snapshot::with_pool(builtin::pool());
        let child = exported_pins("child", 1);
        let parent = parent_binding_export(&child, 0);
        let err = snap.with_revision(parent).unwrap_err();
        assert!(matches!(err, Error::MissingCell(c) if &c == child.cell_id()));
    }

    #[test]
    fn removing_a_used_cell_fails() {
        let snap = Snapshot::with_pool(builtin::pool());
        let child = exported_pins("child", 1);
        let parent = parent_binding_export(&child, 0);
        let snap = snap
            .with_revision(child.clone())
            .unwrap()
            .with_revision(parent)
            .unwrap();
        assert!(snap.with_backups([(child.cell_id().clone(), None)]).is_err());
    }

    #[test]
    fn main_schematic_is_latest_version() {
        let mut snap = Snapshot::with_pool(builtin::pool());
        for version in [1, 3, 2] {
            let rev = empty_schematic_version("inv", version);
            snap = snap.with_revision(rev).unwrap();
        }
        let icon = cell_id("inv", View::Icon);
        let main = snap.main_schematic(&icon).unwrap();
        assert_eq!(main.cell_name().version(), 3);
        assert!(snap.main_schematic(&cell_id("buf", View::Icon)).is_none());
    }

    #[test]
    fn queries_use_the_configured_engine() {
        for engine in [EngineKind::SortedKeys, EngineKind::Blocks] {
            let config = DbConfig {
                connectivity: engine,
                ..DbConfig::default()
            };
            let snap = Snapshot::new(config, Arc::new(NoMetrics), builtin::pool());
            let rev = two_pins_and_wire();
            let snap = snap.with_revision(rev.clone()).unwrap();
            let conns = snap.connections(rev.cell_id(), NodeId(0), None).unwrap();
            assert_eq!(conns.len(), 1);
            assert_eq!(conns[0].arc_position(), 0);
            assert!(snap.exports(rev.cell_id(), NodeId(1), None).unwrap().is_empty());
        }
    }
}
