//! Resolving the equivalence of cells through a set of trees.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::Level;

use super::{compute_layout, EquivPorts};
use crate::diagnostics::{Cause, IssueSet, NetIssue, Severity};
use crate::error::{Error, Result};
use crate::ids::{CellId, NodeProtoId, ViewCategory};
use crate::tree::CellTree;

/// Looks up the cells an equivalence computation descends into.
pub trait CellResolver {
    /// The tree of a cell.
    fn tree(&self, cell: &CellId) -> Option<&CellTree>;

    /// The main schematic implementing an icon.
    fn main_schematic(&self, icon: &CellId) -> Option<CellId>;
}

/// An equivalence computation over a set of cells.
///
/// Results are memoized per cell for the lifetime of this value and stored
/// on the cell's tree. A stored result is reused while every result it was
/// computed from is unchanged and, for icons, while the icon still resolves
/// to the same main schematic. A cell whose resolution reaches itself fails
/// with [`Error::ViewCycle`].
pub struct Equivalence<'a, R: ?Sized> {
    pub(super) resolver: &'a R,
    memo: HashMap<CellId, Arc<EquivPorts>>,
    in_progress: HashSet<CellId>,
    pending: Vec<NetIssue>,
    issues: IssueSet<NetIssue>,
    computed: usize,
    pub(super) verify: bool,
}

impl<'a, R: CellResolver + ?Sized> Equivalence<'a, R> {
    /// Creates a computation.
    pub fn new(resolver: &'a R) -> Self {
        Self {
            resolver,
            memo: HashMap::new(),
            in_progress: HashSet::new(),
            pending: Vec::new(),
            issues: IssueSet::new(),
            computed: 0,
            verify: cfg!(debug_assertions),
        }
    }

    /// Enables or disables closure checks.
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Issues of every cell resolved so far.
    #[inline]
    pub fn issues(&self) -> &IssueSet<NetIssue> {
        &self.issues
    }

    /// The number of results computed rather than reused.
    #[inline]
    pub fn computed(&self) -> usize {
        self.computed
    }

    /// Consumes the computation, returning its issues.
    pub fn into_issues(self) -> IssueSet<NetIssue> {
        self.issues
    }

    /// The equivalence of a cell.
    pub fn compute(&mut self, cell: &CellId) -> Result<Arc<EquivPorts>> {
        if let Some(hit) = self.memo.get(cell) {
            return Ok(hit.clone());
        }
        if !self.in_progress.insert(cell.clone()) {
            return Err(Error::ViewCycle(cell.clone()));
        }
        let result = self.resolve(cell);
        self.in_progress.remove(cell);
        let result = result?;
        for issue in result.issues() {
            self.issues.add(issue.clone());
        }
        self.memo.insert(cell.clone(), result.clone());
        Ok(result)
    }

    fn resolve(&mut self, cell: &CellId) -> Result<Arc<EquivPorts>> {
        let resolver = self.resolver;
        let tree = resolver
            .tree(cell)
            .ok_or_else(|| Error::MissingCell(cell.clone()))?;
        if let Some(cached) = tree.cached_equivalence() {
            if self.is_current(cell, &cached)? {
                return Ok(cached);
            }
            tracing::event!(Level::DEBUG, cell = %cell, "stored port equivalence is stale");
        }
        let start = self.pending.len();
        let result = self.compute_uncached(cell, tree);
        let issues = self.pending.split_off(start);
        let result = Arc::new(result?.with_issues(issues));
        self.computed += 1;
        tree.store_equivalence(result.clone());
        Ok(result)
    }

    fn compute_uncached(&mut self, cell: &CellId, tree: &CellTree) -> Result<EquivPorts> {
        match cell.view().category() {
            ViewCategory::Icon => match self.resolver.main_schematic(cell) {
                Some(main) => {
                    let summary = self.compute(&main)?;
                    Ok(self
                        .project_icon(tree, &summary)
                        .with_inputs(Some(main), vec![summary]))
                }
                None => self.compute_content(tree),
            },
            ViewCategory::Schematic => self.compute_content(tree),
            ViewCategory::Physical => {
                let children = self.children(tree)?;
                let inputs = distinct(&children);
                Ok(compute_layout(tree, &children, self.verify).with_inputs(None, inputs))
            }
        }
    }

    /// The equivalence of the subcell of every node, `None` for primitives.
    pub(super) fn children(&mut self, tree: &CellTree) -> Result<Vec<Option<Arc<EquivPorts>>>> {
        let nodes = tree.backup().revision().nodes();
        let mut children = Vec::with_capacity(nodes.len());
        for node in nodes.iter() {
            children.push(match node.proto() {
                NodeProtoId::Cell(child) => Some(self.compute(child)?),
                NodeProtoId::Primitive(_) => None,
            });
        }
        Ok(children)
    }

    pub(super) fn issue(&mut self, cause: Cause, cell: &CellId) {
        self.pending
            .push(NetIssue::new_and_log(cause, cell.clone(), Severity::Warning));
    }

    pub(super) fn issues_found(&mut self, issues: IssueSet<NetIssue>) {
        self.pending.extend(issues);
    }

    fn is_current(&mut self, cell: &CellId, cached: &EquivPorts) -> Result<bool> {
        if cell.is_icon() && self.resolver.main_schematic(cell).as_ref() != cached.main_schematic()
        {
            return Ok(false);
        }
        for input in cached.inputs() {
            let now = self.compute(input.cell())?;
            if !now.same_summary(input) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Each subcell result once, in first-use order.
pub(super) fn distinct(children: &[Option<Arc<EquivPorts>>]) -> Vec<Arc<EquivPorts>> {
    let mut seen = HashSet::new();
    children
        .iter()
        .flatten()
        .filter(|c| seen.insert(c.cell().clone()))
        .cloned()
        .collect()
}
