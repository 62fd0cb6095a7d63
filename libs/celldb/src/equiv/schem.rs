//! Equivalence of schematic and icon cells.
//!
//! Schematic nets are resolved by name as well as by wiring: every
//! non-temporary arc name and every export name joins the net of the same
//! name, bus names expand bit by bit, arrayed instances expand to one copy
//! per sub-name, and global signals from power, ground and global sources
//! are threaded through the hierarchy. An icon is resolved to its main
//! schematic.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use arcstr::ArcStr;
use tracing::Level;

use super::global::{self, GlobalSet};
use super::map::UnionFind;
use super::resolve::distinct;
use super::{is_isolated, port_bound, CellResolver, Equivalence, EquivMap, EquivPorts, ShortLevel};
use crate::diagnostics::{Cause, IssueSet};
use crate::error::Result;
use crate::ids::{CellId, NodeId, NodeProtoId};
use crate::name::Name;
use crate::tree::CellTree;

impl<R: CellResolver + ?Sized> Equivalence<'_, R> {
    /// Re-indexes the summary of a main schematic by the icon's export names.
    pub(super) fn project_icon(&mut self, tree: &CellTree, main: &EquivPorts) -> EquivPorts {
        let rev = tree.backup().revision();
        let icon = rev.cell_id();
        let mut offsets: HashMap<&str, usize> = HashMap::new();
        let mut main_export_bits = 0;
        for name in main.export_names() {
            offsets.insert(name.as_str(), main_export_bits);
            main_export_bits += name.width();
        }

        let mut indices: Vec<Option<usize>> = Vec::new();
        let mut bits: Vec<ArcStr> = Vec::new();
        for export in rev.exports().iter() {
            let name = export.name();
            match offsets.get(name.as_str()) {
                Some(&offset) => indices.extend((0..name.width()).map(|j| Some(offset + j))),
                None => {
                    self.issue(
                        Cause::UnresolvedIconExport {
                            export: name.text().clone(),
                            schematic: main.cell().clone(),
                        },
                        icon,
                    );
                    indices.extend((0..name.width()).map(|_| None));
                }
            }
            bits.extend(name.subnames().cloned());
        }
        for (k, g) in main.globals().iter().enumerate() {
            indices.push(Some(main_export_bits + k));
            bits.push(g.name().clone());
        }

        EquivPorts::new(
            icon.clone(),
            rev.exports().iter().map(|e| e.chron()).collect(),
            rev.exports().iter().map(|e| e.name().clone()).collect(),
            bits.into(),
            main.globals().into(),
            main.drawn().pull_back(&indices),
            ShortLevel::ALL.map(|level| main.map(level).pull_back(&indices)),
        )
    }

    pub(super) fn compute_content(&mut self, tree: &CellTree) -> Result<EquivPorts> {
        let backup = tree.backup();
        let rev = backup.revision();
        let pool = backup.tech_pool();
        let cell = rev.cell_id();
        let _guard =
            tracing::span!(Level::DEBUG, "computing schematic equivalence", cell = %cell).entered();
        let exports = rev.exports();
        let nodes = rev.nodes();
        let arcs = rev.arcs();

        let children = self.children(tree)?;

        // Element-level connectivity: exports, node ports, arcs.
        let mut bases = Vec::with_capacity(nodes.len());
        let mut counts = Vec::with_capacity(nodes.len());
        let mut next = exports.len();
        for node in nodes.iter() {
            let count = match node.proto() {
                NodeProtoId::Primitive(id) => pool.primitive(id).map_or(0, |p| port_bound(p)),
                NodeProtoId::Cell(child) => tree
                    .subtree(child)
                    .map_or(0, |t| t.backup().revision().export_chron_bound()),
            };
            bases.push(next);
            counts.push(count);
            next += count;
        }
        let arc_base = next;
        let elem_len = arc_base + arcs.len();
        let slot = |node: NodeId, chron: u32| -> Option<usize> {
            let pos = rev.node_position(node)?;
            ((chron as usize) < counts[pos]).then(|| bases[pos] + chron as usize)
        };

        let mut uf = UnionFind::new(elem_len);
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
        let elems = uf.close();

        // Group widths: names fix a width, instance ports only suggest one.
        let mut widths = Widths::default();
        for (i, export) in exports.iter().enumerate() {
            if let Some(cause) = widths.declare(elems.class(i), export.name()) {
                self.issue(cause, cell);
            }
        }
        for (k, arc) in arcs.iter().enumerate() {
            if arc.name().is_temp() {
                continue;
            }
            if let Some(cause) = widths.declare(elems.class(arc_base + k), arc.name()) {
                self.issue(cause, cell);
            }
        }
        for (node, child) in nodes.iter().zip(&children) {
            let Some(child) = child else {
                continue;
            };
            let inst_width = node.name().width();
            for (&chron, name) in child.export_ids().iter().zip(child.export_names()) {
                if let Some(elem) = slot(node.id(), chron) {
                    widths.suggest(elems.class(elem), inst_width * name.width());
                }
            }
        }

        // Port bits: export subnames, then globals.
        let mut bit_names: Vec<ArcStr> = Vec::new();
        let mut export_offsets = Vec::with_capacity(exports.len());
        for export in exports.iter() {
            export_offsets.push(bit_names.len());
            bit_names.extend(export.name().subnames().cloned());
        }
        let export_bits = bit_names.len();
        let mut globals = GlobalSet::new();
        let mut issues = IssueSet::new();
        for (node, child) in nodes.iter().zip(&children) {
            match child {
                Some(child) => {
                    for g in child.globals() {
                        globals.add(g, cell, &mut issues);
                    }
                }
                None => {
                    let source = node
                        .proto()
                        .as_primitive()
                        .and_then(|id| pool.primitive(id))
                        .and_then(|prim| global::source(prim, node));
                    if let Some(g) = source {
                        globals.add(&g, cell, &mut issues);
                    }
                }
            }
        }
        self.issues_found(issues);
        let prefix = export_bits + globals.len();

        // Every element group gets a contiguous run of bits.
        let mut next = prefix;
        let mut group_base: HashMap<usize, usize> = HashMap::new();
        for e in 0..elem_len {
            if elems.class(e) == e {
                group_base.insert(e, next);
                next += widths.width(e);
            }
        }
        let group_bit = |elem: usize, j: usize| -> usize {
            let g = elems.class(elem);
            group_base[&g] + j % widths.width(g)
        };

        let mut drawn_pairs: Vec<(usize, usize)> = Vec::new();
        let mut level_pairs: [Vec<(usize, usize)>; 3] = Default::default();
        let mut named: HashMap<ArcStr, usize> = HashMap::new();
        let mut named_bit = |name: &ArcStr, next: &mut usize| -> usize {
            *named.entry(name.clone()).or_insert_with(|| {
                *next += 1;
                *next - 1
            })
        };

        for (i, export) in exports.iter().enumerate() {
            for (j, sub) in export.name().subnames().enumerate() {
                let bit = export_offsets[i] + j;
                drawn_pairs.push((bit, group_bit(i, j)));
                drawn_pairs.push((bit, named_bit(sub, &mut next)));
            }
        }
        for (k, arc) in arcs.iter().enumerate() {
            if arc.name().is_temp() {
                continue;
            }
            for (j, sub) in arc.name().subnames().enumerate() {
                drawn_pairs.push((group_bit(arc_base + k, j), named_bit(sub, &mut next)));
            }
        }

        let mut seen: HashSet<ArcStr> = HashSet::new();
        for node in nodes.iter().filter(|n| !n.name().is_temp()) {
            for sub in node.name().subnames() {
                if !seen.insert(sub.clone()) {
                    self.issue(Cause::DuplicateSubName { name: sub.clone() }, cell);
                }
            }
        }

        for (pos, (node, child)) in nodes.iter().zip(&children).enumerate() {
            match child {
                None => {
                    let Some(prim) = node.proto().as_primitive().and_then(|id| pool.primitive(id))
                    else {
                        continue;
                    };
                    let ports = prim.ports();
                    if let Some(g) = global::source(prim, node) {
                        if let (Some(port), Some(k)) = (ports.first(), globals.position(g.name())) {
                            let elem = bases[pos] + port.chron() as usize;
                            drawn_pairs.push((export_bits + k, group_bit(elem, 0)));
                        }
                    }
                    for level in ShortLevel::ALL {
                        if !level.shorts(prim.function(), node) {
                            continue;
                        }
                        let first = bases[pos] + ports[0].chron() as usize;
                        for port in &ports[1..] {
                            let other = bases[pos] + port.chron() as usize;
                            let width = widths
                                .width(elems.class(first))
                                .max(widths.width(elems.class(other)));
                            for j in 0..width {
                                level_pairs[level.index()]
                                    .push((group_bit(first, j), group_bit(other, j)));
                            }
                        }
                    }
                }
                Some(child) => {
                    let inst_width = node.name().width();
                    let child_bits = child.bits().len();
                    let mut idx: Vec<usize> = Vec::with_capacity(child_bits);
                    for a in 0..inst_width {
                        idx.clear();
                        for (&chron, name) in child.export_ids().iter().zip(child.export_names()) {
                            let ew = name.width();
                            let Some(elem) = slot(node.id(), chron) else {
                                idx.extend((0..ew).map(|_| {
                                    next += 1;
                                    next - 1
                                }));
                                continue;
                            };
                            let gw = widths.width(elems.class(elem));
                            let bus = inst_width * ew;
                            if gw != bus && gw != ew && a == 0 {
                                self.issue(
                                    Cause::PortWidthMismatch {
                                        instance: node.name().text().clone(),
                                        port: name.text().clone(),
                                        net_width: gw,
                                        expected: bus,
                                    },
                                    cell,
                                );
                            }
                            for j in 0..ew {
                                let bit = if gw == ew && gw != bus { j } else { a * ew + j };
                                idx.push(group_bit(elem, bit));
                            }
                        }
                        for g in child.globals() {
                            match globals.position(g.name()) {
                                Some(k) => idx.push(export_bits + k),
                                None => {
                                    next += 1;
                                    idx.push(next - 1);
                                }
                            }
                        }
                        for level in ShortLevel::ALL {
                            let map = child.map(level);
                            for b in 0..map.len().min(idx.len()) {
                                let c = map.class(b);
                                if c != b {
                                    level_pairs[level.index()].push((idx[b], idx[c]));
                                }
                            }
                        }
                    }
                }
            }
        }

        let len = next;
        let mut uf = UnionFind::new(len);
        for &(a, b) in &drawn_pairs {
            uf.union(a, b);
        }
        let drawn = uf.close();
        let maps = ShortLevel::ALL.map(|level| {
            let mut uf = UnionFind::from_map(&drawn);
            for &(a, b) in &level_pairs[level.index()] {
                uf.union(a, b);
            }
            uf.close()
        });
        if self.verify {
            check_maps(cell, &drawn, &maps);
        }

        let globals = globals.into_vec();
        bit_names.extend(globals.iter().map(|g| g.name().clone()));
        tracing::event!(
            Level::TRACE,
            bits = prefix,
            globals = globals.len(),
            "computed schematic equivalence"
        );
        Ok(EquivPorts::new(
            cell.clone(),
            exports.iter().map(|e| e.chron()).collect(),
            exports.iter().map(|e| e.name().clone()).collect(),
            bit_names.into(),
            globals.into(),
            drawn.prefix(prefix),
            maps.map(|m| m.prefix(prefix)),
        )
        .with_inputs(None, distinct(&children)))
    }
}

fn check_maps(cell: &CellId, drawn: &EquivMap, maps: &[EquivMap; 3]) {
    for map in maps {
        assert!(map.is_closed(), "equivalence map of `{}` is not closed", cell);
        assert!(
            map.coarsens(drawn),
            "equivalence map of `{}` splits the drawn partition",
            cell
        );
    }
    assert!(
        maps[1].coarsens(&maps[0]) && maps[2].coarsens(&maps[1]),
        "equivalence maps of `{}` are not monotonic",
        cell
    );
}

/// Bus widths of element groups.
#[derive(Default)]
struct Widths {
    declared: HashMap<usize, (usize, ArcStr)>,
    suggested: HashMap<usize, usize>,
}

impl Widths {
    /// Fixes the width of a group by a name. On a conflict the wider width
    /// is kept and the conflict returned.
    fn declare(&mut self, group: usize, name: &Name) -> Option<Cause> {
        let width = name.width();
        match self.declared.entry(group) {
            Entry::Vacant(v) => {
                v.insert((width, name.text().clone()));
                None
            }
            Entry::Occupied(mut o) => {
                let (current, net) = o.get_mut();
                if *current == width {
                    return None;
                }
                let cause = Cause::WidthMismatch {
                    net: Some(net.clone()),
                    kept: width.max(*current),
                    discarded: width.min(*current),
                };
                *current = width.max(*current);
                Some(cause)
            }
        }
    }

    fn suggest(&mut self, group: usize, width: usize) {
        let entry = self.suggested.entry(group).or_insert(width);
        *entry = (*entry).max(width);
    }

    fn width(&self, group: usize) -> usize {
        self.declared
            .get(&group)
            .map(|(w, _)| *w)
            .or_else(|| self.suggested.get(&group).copied())
            .unwrap_or(1)
            .max(1)
    }
}
