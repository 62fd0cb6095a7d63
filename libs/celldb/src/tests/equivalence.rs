use std::sync::Arc;

use test_log::test;

use super::fixtures::*;
use crate::equiv::ShortLevel;
use crate::ids::View;
use crate::metrics::{Counter, CounterMetrics};
use crate::revision::CellRevision;
use crate::snapshot::Snapshot;
use crate::tech::builtin;
use crate::var::{keys, VarValue, Variable};
use crate::DbConfig;

/// Two-terminal devices `d@0` and `d@1`. Exports `A` and `B` sit on the
/// given ports, and a wire joins `d@0.wired.0` to `d@1.wired.1`.
fn two_devices(prim: &str, exported: (u32, u32), wired: (u32, u32)) -> Arc<CellRevision> {
    let rev = empty_schematic("pair");
    let cell = rev.cell_id().clone();
    let d0 = schematic_node(0, prim, "d@0", 0, 0);
    let d1 = schematic_node(1, prim, "d@1", 20, 0);
    let wire = arc(0, schematic_wire(), "net@0", end(&d0, wired.0), end(&d1, wired.1));
    let exports = vec![
        export(&cell, 0, "A", &d0, exported.0),
        export(&cell, 1, "B", &d1, exported.1),
    ];
    with_elements(&rev, vec![d0, d1], vec![wire], exports)
}

fn maps(snap: &Snapshot, rev: &CellRevision) -> [Vec<u32>; 3] {
    let eq = snap.equivalence(rev.cell_id()).unwrap();
    ShortLevel::ALL.map(|level| eq.map(level).as_slice().to_vec())
}

#[test]
fn capacitors_joined_on_their_first_ports() {
    let rev = two_devices(builtin::CAPACITOR, (0, 0), (0, 0));
    let snap = Snapshot::with_pool(builtin::pool()).with_revision(rev.clone()).unwrap();
    let [none, parasitic, all] = maps(&snap, &rev);
    assert_eq!(none, vec![0, 0]);
    assert_eq!(parasitic, vec![0, 0]);
    assert_eq!(all, vec![0, 0]);
}

#[test]
fn resistors_in_series_short_only_when_permitted() {
    let rev = two_devices(builtin::RESISTOR, (0, 1), (1, 0));
    let snap = Snapshot::with_pool(builtin::pool()).with_revision(rev.clone()).unwrap();
    let [none, parasitic, all] = maps(&snap, &rev);
    assert_eq!(none, vec![0, 1]);
    assert_eq!(parasitic, vec![0, 0]);
    assert_eq!(all, vec![0, 0]);
}

#[test]
fn resistance_selector_keeps_parasitic_resistors_open() {
    let rev = two_devices(builtin::RESISTOR, (0, 1), (1, 0));
    let selector = Variable::plain(keys::RESISTANCE_SELECTOR, VarValue::Int(1)).unwrap();
    let nodes: Vec<_> = rev.nodes().iter().map(|n| n.with_var(selector.clone())).collect();
    let rev = with_elements(
        &rev,
        nodes,
        rev.arcs().iter().cloned().collect(),
        rev.exports().iter().cloned().collect(),
    );
    let snap = Snapshot::with_pool(builtin::pool()).with_revision(rev.clone()).unwrap();
    let [none, parasitic, all] = maps(&snap, &rev);
    assert_eq!(none, vec![0, 1]);
    assert_eq!(parasitic, vec![0, 1]);
    assert_eq!(all, vec![0, 0]);
}

#[test]
fn maps_are_closed_and_monotonic() {
    let rev = two_devices(builtin::RESISTOR, (0, 1), (1, 0));
    let snap = Snapshot::with_pool(builtin::pool()).with_revision(rev.clone()).unwrap();
    let eq = snap.equivalence(rev.cell_id()).unwrap();
    for level in ShortLevel::ALL {
        let map = eq.map(level);
        assert!(map.is_closed());
        let mut closed = map.clone();
        closed.close();
        assert_eq!(&closed, map);
        assert!(map.coarsens(eq.drawn()));
    }
    assert!(eq.map(ShortLevel::Parasitic).coarsens(eq.map(ShortLevel::None)));
    assert!(eq.map(ShortLevel::All).coarsens(eq.map(ShortLevel::Parasitic)));
}

/// A layout cell whose two exported pins are wired together.
fn shorted_child() -> Arc<CellRevision> {
    let rev = exported_pins("child", 2);
    let nodes: Vec<_> = rev.nodes().iter().cloned().collect();
    let wire = arc(0, unrouted(), "net@0", end(&nodes[0], 0), end(&nodes[1], 0));
    with_elements(&rev, nodes, vec![wire], rev.exports().iter().cloned().collect())
}

/// Layout cell `top` exporting both ports of one instance of `child`.
fn exporting_parent(child: &CellRevision) -> Arc<CellRevision> {
    let rev = empty_layout("top");
    let cell = rev.cell_id().clone();
    let inst = instance(0, "inst@0", child.cell_id(), 0, 0);
    let exports = vec![export(&cell, 0, "x", &inst, 0), export(&cell, 1, "y", &inst, 1)];
    with_elements(&rev, vec![inst], Vec::new(), exports)
}

#[test]
fn subcell_equivalence_propagates_upward() {
    for (child, expected) in [(shorted_child(), vec![0, 0]), (exported_pins("child", 2), vec![0, 1])] {
        let parent = exporting_parent(&child);
        let snap = Snapshot::with_pool(builtin::pool())
            .with_revision(child)
            .unwrap()
            .with_revision(parent.clone())
            .unwrap();
        let eq = snap.equivalence(parent.cell_id()).unwrap();
        assert_eq!(eq.map(ShortLevel::None).as_slice(), &expected[..]);
        assert_eq!(eq.export_ids(), &[0, 1]);
    }
}

#[test]
fn equivalence_is_cached_per_tree() {
    let metrics = Arc::new(CounterMetrics::new());
    let snap = Snapshot::new(DbConfig::default(), metrics.clone(), builtin::pool());
    let child = shorted_child();
    let parent = exporting_parent(&child);
    let snap = snap
        .with_revision(child.clone())
        .unwrap()
        .with_revision(parent.clone())
        .unwrap();
    let first = snap.equivalence(parent.cell_id()).unwrap();
    assert_eq!(metrics.get(Counter::EquivComputed), 2);
    let second = snap.equivalence(parent.cell_id()).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(metrics.get(Counter::EquivComputed), 2);
    assert!(snap.tree(child.cell_id()).unwrap().is_equivalence_cached());

    // Editing an unrelated cell keeps the cached value.
    let snap = snap.with_revision(two_pins_and_wire()).unwrap();
    assert!(snap.tree(parent.cell_id()).unwrap().is_equivalence_cached());
    assert!(Arc::ptr_eq(&snap.equivalence(parent.cell_id()).unwrap(), &first));

    snap.reclaim_caches();
    assert!(!snap.tree(parent.cell_id()).unwrap().is_equivalence_cached());
    assert!(snap.equivalence(parent.cell_id()).unwrap().equals_ports(&first));
    assert_eq!(snap.tree(parent.cell_id()).unwrap().cell_id().view(), View::Layout);
}
