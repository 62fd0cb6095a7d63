use std::sync::Arc;

use super::derive_with;
use crate::ids::{CellId, TechId};
use crate::remap::IdMapper;
use crate::var::{VarSet, Variable};

/// Persistent per-cell metadata.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CellMeta {
    cell_id: CellId,
    tech: Option<TechId>,
    flags: u32,
    revision_date: i64,
    vars: VarSet,
}

impl CellMeta {
    /// Creates metadata for a cell with no flags or variables.
    pub fn new(cell_id: CellId, tech: Option<TechId>) -> Arc<Self> {
        Arc::new(Self {
            cell_id,
            tech,
            flags: 0,
            revision_date: 0,
            vars: VarSet::empty(),
        })
    }

    pub(crate) fn from_parts(
        cell_id: CellId,
        tech: Option<TechId>,
        flags: u32,
        revision_date: i64,
        vars: VarSet,
    ) -> Arc<Self> {
        Arc::new(Self {
            cell_id,
            tech,
            flags,
            revision_date,
            vars,
        })
    }

    /// The cell.
    #[inline]
    pub fn cell_id(&self) -> &CellId {
        &self.cell_id
    }

    /// The cell's technology.
    #[inline]
    pub fn tech(&self) -> Option<&TechId> {
        self.tech.as_ref()
    }

    /// Cell flags.
    #[inline]
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// The revision date, in milliseconds since the epoch.
    #[inline]
    pub fn revision_date(&self) -> i64 {
        self.revision_date
    }

    /// The cell's variables.
    #[inline]
    pub fn vars(&self) -> &VarSet {
        &self.vars
    }

    /// The cell's parameters.
    pub fn params(&self) -> impl Iterator<Item = &Variable> {
        self.vars.params()
    }

    /// Returns metadata with a different technology.
    pub fn with_tech(self: &Arc<Self>, tech: Option<TechId>) -> Arc<Self> {
        derive_with(self, |m| m.tech = tech)
    }

    /// Returns metadata with different flags.
    pub fn with_flags(self: &Arc<Self>, flags: u32) -> Arc<Self> {
        derive_with(self, |m| m.flags = flags)
    }

    /// Returns metadata with a different revision date.
    pub fn with_revision_date(self: &Arc<Self>, revision_date: i64) -> Arc<Self> {
        derive_with(self, |m| m.revision_date = revision_date)
    }

    /// Returns metadata with a variable added or replaced.
    pub fn with_var(self: &Arc<Self>, var: Variable) -> Arc<Self> {
        let vars = self.vars.with(var);
        if vars.ptr_eq(&self.vars) {
            return self.clone();
        }
        derive_with(self, |m| m.vars = vars)
    }

    /// Returns metadata with a variable removed.
    pub fn without_var(self: &Arc<Self>, key: &str) -> Arc<Self> {
        derive_with(self, |m| m.vars = m.vars.without(key))
    }

    /// Returns metadata for another cell id, keeping everything else.
    pub(crate) fn with_cell_id(self: &Arc<Self>, cell_id: CellId) -> Arc<Self> {
        derive_with(self, |m| m.cell_id = cell_id)
    }

    /// Rewrites the cell id and cell references in variables.
    pub fn with_ids(self: &Arc<Self>, mapper: &IdMapper) -> Arc<Self> {
        let cell_id = mapper.map_cell(&self.cell_id);
        let vars = self.vars.with_ids(mapper);
        if cell_id == self.cell_id && vars.ptr_eq(&self.vars) {
            return self.clone();
        }
        Arc::new(Self {
            cell_id,
            vars,
            ..(**self).clone()
        })
    }
}
