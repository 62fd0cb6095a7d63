use std::sync::Arc;

use test_log::test;

use super::fixtures::*;
use crate::diagnostics::{Cause, Diagnostic};
use crate::element::{NodeInst, PortCharacteristic};
use crate::equiv::ShortLevel;
use crate::error::Error;
use crate::ids::{CellId, View};
use crate::revision::CellRevision;
use crate::snapshot::Snapshot;
use crate::tech::builtin;
use crate::var::{keys, VarValue, Variable};

fn snapshot(revs: impl IntoIterator<Item = Arc<CellRevision>>) -> Snapshot {
    let mut snap = Snapshot::with_pool(builtin::pool());
    for rev in revs {
        snap = snap.with_revision(rev).unwrap();
    }
    snap
}

/// Schematic `buf` whose exports `in` and `out` are wired together.
fn buf_schematic() -> Arc<CellRevision> {
    let rev = empty_schematic("buf");
    let cell = rev.cell_id().clone();
    let a = wire_pin(0, "pin@0", 0, 0);
    let b = wire_pin(1, "pin@1", 10, 0);
    let wire = arc(0, schematic_wire(), "net@0", end(&a, 0), end(&b, 0));
    let exports = vec![export(&cell, 0, "in", &a, 0), export(&cell, 1, "out", &b, 0)];
    with_elements(&rev, vec![a, b], vec![wire], exports)
}

/// Icon `buf` with one pin per export name.
fn buf_icon(names: &[&str]) -> Arc<CellRevision> {
    let rev = empty_icon("buf");
    let cell = rev.cell_id().clone();
    let pins: Vec<_> = (0..names.len() as u32)
        .map(|i| wire_pin(i, &format!("pin@{}", i), 10 * i as i64, 0))
        .collect();
    let exports = names
        .iter()
        .zip(&pins)
        .enumerate()
        .map(|(i, (name, pin))| export(&cell, i as u32, name, pin, 0))
        .collect();
    with_elements(&rev, pins, Vec::new(), exports)
}

#[test]
fn icon_resolves_to_its_main_schematic() {
    let icon = buf_icon(&["in", "out"]);
    let snap = snapshot([buf_schematic(), icon.clone()]);
    let (eq, issues) = snap.schematic_equivalence(icon.cell_id()).unwrap();
    assert!(issues.is_empty());
    assert_eq!(eq.cell(), icon.cell_id());
    let bits: Vec<&str> = eq.bits().iter().map(|b| b.as_str()).collect();
    assert_eq!(bits, ["in", "out"]);
    assert_eq!(eq.map(ShortLevel::None).as_slice(), &[0, 0]);
}

#[test]
fn unmatched_icon_export_is_reported() {
    let icon = buf_icon(&["clk", "in", "out"]);
    let snap = snapshot([buf_schematic(), icon.clone()]);
    let (eq, issues) = snap.schematic_equivalence(icon.cell_id()).unwrap();
    assert_eq!(issues.len(), 1);
    let issue = issues.iter().next().unwrap();
    assert!(!issue.severity().is_error());
    assert!(matches!(
        issue.cause(),
        Cause::UnresolvedIconExport { export, .. } if export == "clk"
    ));
    assert_eq!(eq.map(ShortLevel::None).as_slice(), &[0, 1, 1]);
}

#[test]
fn instances_of_icons_see_through_to_the_schematic() {
    let icon = buf_icon(&["in", "out"]);
    let top = empty_schematic("top");
    let cell = top.cell_id().clone();
    let inst = instance(0, "buf@0", icon.cell_id(), 0, 0);
    let exports = vec![export(&cell, 0, "a", &inst, 0), export(&cell, 1, "b", &inst, 1)];
    let top = with_elements(&top, vec![inst], Vec::new(), exports);
    let snap = snapshot([buf_schematic(), icon, top.clone()]);
    let (eq, issues) = snap.schematic_equivalence(top.cell_id()).unwrap();
    assert!(issues.is_empty());
    assert_eq!(eq.map(ShortLevel::None).as_slice(), &[0, 0]);
}

/// Schematic `top` with one instance of `child`, exporting its first two
/// ports as `a` and `b`.
fn top_over(child: &CellId) -> Arc<CellRevision> {
    let top = empty_schematic("top");
    let cell = top.cell_id().clone();
    let inst = instance(0, "buf@0", child, 0, 0);
    let exports = vec![export(&cell, 0, "a", &inst, 0), export(&cell, 1, "b", &inst, 1)];
    with_elements(&top, vec![inst], Vec::new(), exports)
}

#[test]
fn equivalence_of_a_schematic_joins_named_nets() {
    let rev = empty_schematic("named");
    let cell = rev.cell_id().clone();
    let pins: Vec<_> = (0..4)
        .map(|i| wire_pin(i, &format!("pin@{}", i), 10 * i as i64, 0))
        .collect();
    let arcs = vec![
        arc(0, schematic_wire(), "n", end(&pins[0], 0), end(&pins[1], 0)),
        arc(1, schematic_wire(), "n", end(&pins[2], 0), end(&pins[3], 0)),
    ];
    let exports = vec![
        export(&cell, 0, "A", &pins[0], 0),
        export(&cell, 1, "B", &pins[2], 0),
    ];
    let rev = with_elements(&rev, pins, arcs, exports);
    let snap = snapshot([rev.clone()]);

    let eq = snap.equivalence(rev.cell_id()).unwrap();
    assert_eq!(eq.map(ShortLevel::None).as_slice(), &[0, 0]);
    let (resolved, issues) = snap.schematic_equivalence(rev.cell_id()).unwrap();
    assert!(issues.is_empty());
    assert!(Arc::ptr_eq(&eq, &resolved));
    assert!(Arc::ptr_eq(&snap.tree(rev.cell_id()).unwrap().equivalence().unwrap(), &eq));
}

#[test]
fn tree_equivalence_of_an_icon_uses_its_own_content() {
    let icon = buf_icon(&["in", "out"]);
    let snap = snapshot([buf_schematic(), icon.clone()]);
    let own = snap.tree(icon.cell_id()).unwrap().equivalence().unwrap();
    assert_eq!(own.map(ShortLevel::None).as_slice(), &[0, 1]);
    assert!(own.main_schematic().is_none());

    let resolved = snap.equivalence(icon.cell_id()).unwrap();
    assert_eq!(resolved.map(ShortLevel::None).as_slice(), &[0, 0]);
    assert_eq!(resolved.main_schematic().map(|c| c.view()), Some(View::Schematic));
}

#[test]
fn editing_a_main_schematic_refreshes_its_users() {
    let icon = buf_icon(&["in", "out"]);
    let top = top_over(icon.cell_id());
    let snap = snapshot([buf_schematic(), icon.clone(), top.clone()]);
    let before = snap.equivalence(top.cell_id()).unwrap();
    assert_eq!(before.map(ShortLevel::None).as_slice(), &[0, 0]);

    let buf = buf_schematic();
    let open = with_elements(
        &buf,
        buf.nodes().iter().cloned().collect(),
        Vec::new(),
        buf.exports().iter().cloned().collect(),
    );
    let next = snap.with_revision(open).unwrap();
    assert!(Arc::ptr_eq(next.tree(top.cell_id()).unwrap(), snap.tree(top.cell_id()).unwrap()));

    let after = next.equivalence(top.cell_id()).unwrap();
    assert_eq!(after.map(ShortLevel::None).as_slice(), &[0, 1]);
    assert_eq!(
        next.equivalence(icon.cell_id()).unwrap().map(ShortLevel::None).as_slice(),
        &[0, 1]
    );
    // The earlier snapshot still sees its own schematic.
    let again = snap.equivalence(top.cell_id()).unwrap();
    assert!(again.equals_ports(&before));
}

#[test]
fn schematic_instantiating_its_own_icon_is_a_view_cycle() {
    let icon = buf_icon(&["in", "out"]);
    let rev = buf_schematic();
    let inst = instance(2, "buf@0", icon.cell_id(), 50, 0);
    let mut nodes: Vec<_> = rev.nodes().iter().cloned().collect();
    nodes.push(inst);
    let rev = with_elements(
        &rev,
        nodes,
        rev.arcs().iter().cloned().collect(),
        rev.exports().iter().cloned().collect(),
    );
    let snap = snapshot([icon.clone(), rev]);
    let err = snap.schematic_equivalence(icon.cell_id()).unwrap_err();
    assert!(matches!(err, Error::ViewCycle(_)));
}

#[test]
fn bus_wire_on_scalar_export_is_a_width_mismatch() {
    let rev = empty_schematic("narrow");
    let cell = rev.cell_id().clone();
    let a = wire_pin(0, "pin@0", 0, 0);
    let b = wire_pin(1, "pin@1", 10, 0);
    let bus = arc(0, schematic_wire(), "a[0:1]", end(&a, 0), end(&b, 0));
    let rev = with_elements(&rev, vec![a.clone(), b], vec![bus], vec![export(&cell, 0, "a", &a, 0)]);
    let snap = snapshot([rev.clone()]);
    let (_, issues) = snap.schematic_equivalence(rev.cell_id()).unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(
        issues.iter().next().unwrap().cause(),
        &Cause::WidthMismatch {
            net: Some("a".into()),
            kept: 2,
            discarded: 1,
        }
    );
}

#[test]
fn overlapping_arrayed_names_are_duplicates() {
    let rev = empty_schematic("array");
    let r0 = schematic_node(0, builtin::RESISTOR, "x[0:1]", 0, 0);
    let r1 = schematic_node(1, builtin::RESISTOR, "x[1:2]", 20, 0);
    let rev = with_elements(&rev, vec![r0, r1], Vec::new(), Vec::new());
    let snap = snapshot([rev.clone()]);
    let (_, issues) = snap.schematic_equivalence(rev.cell_id()).unwrap();
    let dups: Vec<_> = issues
        .iter()
        .filter_map(|i| match i.cause() {
            Cause::DuplicateSubName { name } => Some(name.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(dups, vec!["x[1]".to_string()]);
}

fn global_node(id: u32, name: &str, characteristic: &str) -> Arc<NodeInst> {
    schematic_node(id, builtin::GLOBAL, &format!("global@{}", id), 0, 10 * id as i64)
        .with_var(Variable::plain(keys::GLOBAL_NAME, VarValue::Str(name.into())).unwrap())
        .with_var(
            Variable::plain(keys::GLOBAL_CHARACTERISTIC, VarValue::Str(characteristic.into()))
                .unwrap(),
        )
}

#[test]
fn conflicting_global_characteristics_keep_the_first() {
    let rev = empty_schematic("clocked");
    let rev = with_elements(
        &rev,
        vec![global_node(0, "clk", "clock"), global_node(1, "clk", "input")],
        Vec::new(),
        Vec::new(),
    );
    let snap = snapshot([rev.clone()]);
    let (eq, issues) = snap.schematic_equivalence(rev.cell_id()).unwrap();
    assert_eq!(issues.len(), 1);
    assert!(matches!(
        issues.iter().next().unwrap().cause(),
        Cause::GlobalCharacteristicConflict { global, kept, discarded }
            if global == "clk" && kept == "clock" && discarded == "input"
    ));
    assert_eq!(eq.globals().len(), 1);
    assert_eq!(eq.globals()[0].characteristic(), PortCharacteristic::Clock);
    assert_eq!(eq.global_bit("clk"), Some(0));
}

/// Schematic `supply` with exports `vdd` and `vss` wired to a power and a
/// ground source.
fn supply() -> Arc<CellRevision> {
    let rev = empty_schematic("supply");
    let cell = rev.cell_id().clone();
    let pwr = schematic_node(0, builtin::POWER, "pwr@0", 0, 10);
    let gnd = schematic_node(1, builtin::GROUND, "gnd@0", 0, -10);
    let vdd = wire_pin(2, "pin@0", 10, 10);
    let vss = wire_pin(3, "pin@1", 10, -10);
    let arcs = vec![
        arc(0, schematic_wire(), "net@0", end(&pwr, 0), end(&vdd, 0)),
        arc(1, schematic_wire(), "net@1", end(&gnd, 0), end(&vss, 0)),
    ];
    let exports = vec![export(&cell, 0, "vdd", &vdd, 0), export(&cell, 1, "vss", &vss, 0)];
    with_elements(&rev, vec![pwr, gnd, vdd, vss], arcs, exports)
}

#[test]
fn power_and_ground_become_globals() {
    let rev = supply();
    let snap = snapshot([rev.clone()]);
    let (eq, issues) = snap.schematic_equivalence(rev.cell_id()).unwrap();
    assert!(issues.is_empty());
    let power = eq.global_bit("power").unwrap();
    let ground = eq.global_bit("ground").unwrap();
    assert_eq!(eq.bits().len(), 4);
    assert!(eq.equivalent(ShortLevel::None, 0, power));
    assert!(eq.equivalent(ShortLevel::None, 1, ground));
    assert!(!eq.equivalent(ShortLevel::All, 0, 1));
}

#[test]
fn globals_reach_the_parent() {
    let child = supply();
    let top = empty_schematic("top");
    let inst = instance(0, "supply@0", child.cell_id(), 0, 0);
    let top = with_elements(&top, vec![inst], Vec::new(), Vec::new());
    let snap = snapshot([child, top.clone()]);
    let (eq, _) = snap.schematic_equivalence(top.cell_id()).unwrap();
    let mut names: Vec<_> = eq.globals().iter().map(|g| g.name().to_string()).collect();
    names.sort();
    assert_eq!(names, vec!["ground".to_string(), "power".to_string()]);
    assert_eq!(eq.cell().view(), View::Schematic);
}
