//! Port equivalence.
//!
//! Determines which exports of a cell are electrically identical from the
//! wiring alone plus the recursively known equivalence of subcell ports.
//! Three maps of increasing permissiveness are produced:
//!
//! * [`ShortLevel::None`]: only wiring and device topology count.
//! * [`ShortLevel::Parasitic`]: resistors short their terminals unless they
//!   carry a non-zero resistance selector.
//! * [`ShortLevel::All`]: every resistor and complex resistor shorts.
//!
//! The index space lays exports out first, then one slot per node port and
//! one per arc, so projecting a closed map onto the exports is a prefix.
//!
//! Physical cells use the wiring-only engine. Schematic and icon cells
//! additionally resolve named nets and global signals, and an icon resolves
//! to its main schematic. Every result is stored on the tree of its cell
//! together with the results it was computed from, so a later query reuses
//! it only while those inputs are unchanged.

mod global;
pub mod map;
mod resolve;
mod schem;

pub use global::Global;
pub use map::EquivMap;
pub use resolve::{CellResolver, Equivalence};

use std::sync::Arc;

use arcstr::ArcStr;
use tracing::Level;

use crate::diagnostics::NetIssue;
use crate::element::NodeInst;
use crate::ids::{CellId, NodeId, NodeProtoId, PortProtoId};
use crate::name::Name;
use crate::tech::{PrimitiveFunction, PrimitiveNode, TechPool};
use crate::tree::CellTree;
use crate::var::keys;
use map::UnionFind;

/// Which devices are treated as shorting their terminals.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum ShortLevel {
    /// No device shorts.
    None,
    /// Resistors without an explicit resistance selector short.
    Parasitic,
    /// Every resistor and complex resistor shorts.
    All,
}

impl ShortLevel {
    /// All levels, least permissive first.
    pub const ALL: [ShortLevel; 3] = [ShortLevel::None, ShortLevel::Parasitic, ShortLevel::All];

    /// Returns `true` if a device of `function` with variables of `node`
    /// shorts its terminals at this level.
    pub fn shorts(&self, function: PrimitiveFunction, node: &NodeInst) -> bool {
        match (self, function) {
            (Self::Parasitic, PrimitiveFunction::Resistor) => {
                node.vars().int(keys::RESISTANCE_SELECTOR).unwrap_or(0) == 0
            }
            (Self::All, PrimitiveFunction::Resistor | PrimitiveFunction::ComplexResistor) => true,
            _ => false,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// The port equivalence of one cell.
///
/// All maps are indexed by "port bits": for layout cells one entry per
/// export, in export order; for schematic cells one entry per single-bit
/// subname of each export followed by one entry per global signal.
#[derive(Clone, Debug)]
pub struct EquivPorts {
    cell: CellId,
    export_ids: Arc<[u32]>,
    export_names: Arc<[Name]>,
    bits: Arc<[ArcStr]>,
    globals: Arc<[Global]>,
    drawn: EquivMap,
    maps: [EquivMap; 3],
    main_schematic: Option<CellId>,
    inputs: Arc<[Arc<EquivPorts>]>,
    issues: Arc<[NetIssue]>,
}

impl EquivPorts {
    pub(crate) fn new(
        cell: CellId,
        export_ids: Arc<[u32]>,
        export_names: Arc<[Name]>,
        bits: Arc<[ArcStr]>,
        globals: Arc<[Global]>,
        drawn: EquivMap,
        maps: [EquivMap; 3],
    ) -> Self {
        Self {
            cell,
            export_ids,
            export_names,
            bits,
            globals,
            drawn,
            maps,
            main_schematic: None,
            inputs: Arc::new([]),
            issues: Arc::new([]),
        }
    }

    /// Records what this result was computed from.
    pub(crate) fn with_inputs(
        mut self,
        main_schematic: Option<CellId>,
        inputs: Vec<Arc<EquivPorts>>,
    ) -> Self {
        self.main_schematic = main_schematic;
        self.inputs = inputs.into();
        self
    }

    pub(crate) fn with_issues(mut self, issues: Vec<NetIssue>) -> Self {
        self.issues = issues.into();
        self
    }

    /// The cell.
    #[inline]
    pub fn cell(&self) -> &CellId {
        &self.cell
    }

    /// Chronological indices of the exports, in export order.
    #[inline]
    pub fn export_ids(&self) -> &[u32] {
        &self.export_ids
    }

    /// Export names, in export order.
    #[inline]
    pub fn export_names(&self) -> &[Name] {
        &self.export_names
    }

    /// The name of every port bit.
    #[inline]
    pub fn bits(&self) -> &[ArcStr] {
        &self.bits
    }

    /// Global signals reaching this cell, after the export bits.
    #[inline]
    pub fn globals(&self) -> &[Global] {
        &self.globals
    }

    /// Connectivity from wiring and device topology only.
    #[inline]
    pub fn drawn(&self) -> &EquivMap {
        &self.drawn
    }

    /// The equivalence map at a short level.
    #[inline]
    pub fn map(&self, level: ShortLevel) -> &EquivMap {
        &self.maps[level.index()]
    }

    /// The equivalence map at a level, one entry per export.
    ///
    /// Exports are equivalent when their first bits are.
    pub fn export_map(&self, level: ShortLevel) -> EquivMap {
        let mut offsets = Vec::with_capacity(self.export_names.len());
        let mut bit = 0;
        for name in self.export_names.iter() {
            offsets.push(Some(bit));
            bit += name.width();
        }
        self.map(level).pull_back(&offsets)
    }

    /// The main schematic an icon was resolved through.
    #[inline]
    pub fn main_schematic(&self) -> Option<&CellId> {
        self.main_schematic.as_ref()
    }

    /// Issues raised while resolving this cell's own nets.
    #[inline]
    pub fn issues(&self) -> &[NetIssue] {
        &self.issues
    }

    /// Results of the subcells and main schematic this one depends on.
    #[inline]
    pub(crate) fn inputs(&self) -> &[Arc<EquivPorts>] {
        &self.inputs
    }

    /// Returns `true` if a cell depending on `self` would compute the same
    /// result from `other`.
    pub(crate) fn same_summary(self: &Arc<Self>, other: &Arc<EquivPorts>) -> bool {
        Arc::ptr_eq(self, other)
            || (self.bits == other.bits && self.drawn == other.drawn && self.equals_ports(other))
    }

    /// Returns `true` if port bits `a` and `b` are equivalent at `level`.
    pub fn equivalent(&self, level: ShortLevel, a: usize, b: usize) -> bool {
        let map = self.map(level);
        map.class(a) == map.class(b)
    }

    /// The port bit of a global signal.
    pub fn global_bit(&self, name: &str) -> Option<usize> {
        let first = self.bits.len() - self.globals.len();
        self.globals
            .iter()
            .position(|g| g.name() == name)
            .map(|i| first + i)
    }

    /// Returns `true` if both results describe the same ports with the same
    /// equivalence.
    pub fn equals_ports(&self, other: &EquivPorts) -> bool {
        self.export_ids == other.export_ids
            && self.export_names == other.export_names
            && self.globals == other.globals
            && self.maps == other.maps
    }
}

/// Highest port chronological index of a primitive, plus one.
pub(crate) fn port_bound(prim: &PrimitiveNode) -> usize {
    prim.ports()
        .iter()
        .map(|p| p.chron() as usize + 1)
        .max()
        .unwrap_or(0)
}

/// Returns `true` if `port` is an isolated primitive port.
pub(crate) fn is_isolated(pool: &TechPool, port: &PortProtoId) -> bool {
    match port {
        PortProtoId::Primitive(p) => pool.primitive_port(p).is_some_and(|p| p.is_isolated()),
        PortProtoId::Export(_) => false,
    }
}

/// Computes the equivalence of a physical cell from the equivalence of the
/// subcell of every node (`None` for primitives).
pub(crate) fn compute_layout(
    tree: &CellTree,
    children: &[Option<Arc<EquivPorts>>],
    verify: bool,
) -> EquivPorts {
    let backup = tree.backup();
    let rev = backup.revision();
    let pool = backup.tech_pool();
    let _guard =
        tracing::span!(Level::DEBUG, "computing port equivalence", cell = %rev.cell_id()).entered();

    let exports = rev.exports();
    let nodes = rev.nodes();
    let arcs = rev.arcs();

    let mut bases = Vec::with_capacity(nodes.len());
    let mut counts = Vec::with_capacity(nodes.len());
    let mut next = exports.len();
    for node in nodes.iter() {
        let count = match node.proto() {
            NodeProtoId::Primitive(id) => pool.primitive(id).map_or(0, |p| port_bound(p)),
            NodeProtoId::Cell(cell) => tree
                .subtree(cell)
                .map_or(0, |t| t.backup().revision().export_chron_bound()),
        };
        bases.push(next);
        counts.push(count);
        next += count;
    }
    let arc_base = next;
    let len = arc_base + arcs.len();
    let slot = |node: NodeId, chron: u32| -> Option<usize> {
        let pos = rev.node_position(node)?;
        ((chron as usize) < counts[pos]).then(|| bases[pos] + chron as usize)
    };

    let mut uf = UnionFind::new(len);
    for (i, export) in exports.iter().enumerate() {
        if let Some(s) = slot(export.original_node(), export.original_port().chron()) {
            uf.union(i, s);
        }
    }
    for (k, arc) in arcs.iter().enumerate() {
        let Some(proto) = pool.arc_proto(arc.proto()) else {
            continue;
        };
        if proto.is_inert() {
            continue;
        }
        for end in [arc.tail(), arc.head()] {
            if is_isolated(pool, end.port()) && !proto.bridges_isolated() {
                continue;
            }
            if let Some(s) = slot(end.node(), end.port().chron()) {
                uf.union(arc_base + k, s);
            }
        }
    }
    for (pos, node) in nodes.iter().enumerate() {
        let Some(prim) = node.proto().as_primitive().and_then(|id| pool.primitive(id)) else {
            continue;
        };
        let ports = prim.ports();
        for (i, a) in ports.iter().enumerate() {
            for b in &ports[i + 1..] {
                if a.topology().is_some() && a.topology() == b.topology() {
                    uf.union(
                        bases[pos] + a.chron() as usize,
                        bases[pos] + b.chron() as usize,
                    );
                }
            }
        }
    }
    let drawn = uf.close();

    let mut levels: [(UnionFind, bool); 3] = [
        (UnionFind::from_map(&drawn), false),
        (UnionFind::from_map(&drawn), false),
        (UnionFind::from_map(&drawn), false),
    ];
    for (pos, node) in nodes.iter().enumerate() {
        match node.proto() {
            NodeProtoId::Primitive(id) => {
                let Some(prim) = pool.primitive(id) else {
                    continue;
                };
                for level in ShortLevel::ALL {
                    if !level.shorts(prim.function(), node) {
                        continue;
                    }
                    let (uf, merged) = &mut levels[level.index()];
                    let ports = prim.ports();
                    for port in ports.iter().skip(1) {
                        uf.union(
                            bases[pos] + ports[0].chron() as usize,
                            bases[pos] + port.chron() as usize,
                        );
                        *merged = true;
                    }
                }
            }
            NodeProtoId::Cell(_) => {
                let Some(child) = &children[pos] else {
                    continue;
                };
                for level in ShortLevel::ALL {
                    let (uf, merged) = &mut levels[level.index()];
                    let map = child.export_map(level);
                    for j in 0..map.len() {
                        let k = map.class(j);
                        if k == j {
                            continue;
                        }
                        let a = slot(node.id(), child.export_ids()[j]);
                        let b = slot(node.id(), child.export_ids()[k]);
                        if let (Some(a), Some(b)) = (a, b) {
                            uf.union(a, b);
                            *merged = true;
                        }
                    }
                }
            }
        }
    }
    let [none, parasitic, all] = levels.map(|(uf, merged)| (uf.close(), merged));

    if verify {
        for (map, merged) in [&none, &parasitic, &all] {
            assert!(map.is_closed(), "equivalence map of `{}` is not closed", rev.cell_id());
            assert!(
                map.coarsens(&drawn),
                "equivalence map of `{}` splits the drawn partition",
                rev.cell_id()
            );
            if !merged {
                assert_eq!(map, &drawn, "unmerged map of `{}` differs", rev.cell_id());
            }
        }
        assert!(parasitic.0.coarsens(&none.0) && all.0.coarsens(&parasitic.0));
    }

    let n = exports.len();
    let export_ids: Arc<[u32]> = exports.iter().map(|e| e.chron()).collect();
    let export_names: Arc<[Name]> = exports.iter().map(|e| e.name().clone()).collect();
    let bits: Arc<[ArcStr]> = exports.iter().map(|e| e.name().text().clone()).collect();
    tracing::event!(Level::TRACE, exports = n, "computed port equivalence");
    EquivPorts::new(
        rev.cell_id().clone(),
        export_ids,
        export_names,
        bits,
        Arc::new([]),
        drawn.prefix(n),
        [none.0.prefix(n), parasitic.0.prefix(n), all.0.prefix(n)],
    )
}
