use std::sync::Arc;

use test_log::test;

use super::fixtures::*;
use crate::error::{Error, StaleUsage};
use crate::ids::{CellId, CellName, LibId, NodeProtoId, PortProtoId, View};
use crate::metrics::{Counter, CounterMetrics};
use crate::remap::IdMapper;
use crate::revision::CellRevision;
use crate::snapshot::Snapshot;
use crate::tech::builtin;
use crate::DbConfig;

fn instantiating(rev: &Arc<CellRevision>, child: &CellId) -> Arc<CellRevision> {
    let inst = instance(0, "inst@0", child, 0, 0);
    with_elements(rev, vec![inst], Vec::new(), Vec::new())
}

#[test]
fn renamed_cell_is_rebound_everywhere() {
    let child = exported_pins("child", 2);
    let parent = parent_binding_export(&child, 1);
    let snap = Snapshot::with_pool(builtin::pool())
        .with_revision(child.clone())
        .unwrap()
        .with_revision(parent.clone())
        .unwrap();

    let renamed = CellId::new(LibId::new(LIB), CellName::new("leaf", View::Layout, 1));
    let mut mapper = IdMapper::new();
    mapper.rename_cell(child.cell_id().clone(), renamed.clone()).unwrap();
    let next = snap.with_ids(&mapper).unwrap();

    assert!(next.backup(child.cell_id()).is_none());
    assert!(next.tree(&renamed).is_some());
    let top = next.revision(parent.cell_id()).unwrap();
    let inst = top.nodes().iter().find(|n| n.is_cell_instance()).unwrap();
    assert_eq!(inst.proto(), &NodeProtoId::Cell(renamed.clone()));
    let bound = top.arcs()[0].tail().port().clone();
    assert_eq!(bound, PortProtoId::Export(renamed.export(1)));

    let tree = next.tree(parent.cell_id()).unwrap();
    assert!(tree.all_cells().contains(&renamed));
    assert!(Arc::ptr_eq(tree.subtree(&renamed).unwrap(), next.tree(&renamed).unwrap()));
}

#[test]
fn identity_rename_keeps_the_snapshot() {
    let snap = Snapshot::with_pool(builtin::pool())
        .with_revision(two_pins_and_wire())
        .unwrap();
    let next = snap.with_ids(&IdMapper::new()).unwrap();
    for cell in snap.cells() {
        assert!(Arc::ptr_eq(snap.tree(cell).unwrap(), next.tree(cell).unwrap()));
    }
}

#[test]
fn colliding_renames_are_rejected() {
    let a = exported_pins("a", 1);
    let b = exported_pins("b", 1);
    let snap = Snapshot::with_pool(builtin::pool())
        .with_revision(a.clone())
        .unwrap()
        .with_revision(b.clone())
        .unwrap();
    let mut mapper = IdMapper::new();
    mapper.rename_cell(a.cell_id().clone(), b.cell_id().clone()).unwrap();
    let err = snap.with_ids(&mapper).unwrap_err();
    assert!(matches!(err, Error::InvalidRename { what: "cell", .. }));
}

#[test]
fn mutual_instantiation_is_a_cycle() {
    let a = empty_layout("a");
    let b = empty_layout("b");
    let snap = Snapshot::with_pool(builtin::pool())
        .with_revision(b.clone())
        .unwrap()
        .with_revision(instantiating(&a, b.cell_id()))
        .unwrap();

    let err = snap.with_revision(instantiating(&b, a.cell_id())).unwrap_err();
    assert!(matches!(err, Error::HierarchyCycle(_)));
    // The failed edit leaves the snapshot untouched.
    assert!(snap.revision(b.cell_id()).unwrap().nodes().is_empty());
}

#[test]
fn self_instantiation_is_a_cycle() {
    let a = empty_layout("a");
    let inst = instance(0, "inst@0", a.cell_id(), 0, 0);
    let err = a
        .with(a.meta().clone(), Some(vec![inst].into()), None, None)
        .unwrap_err();
    assert!(matches!(err, Error::HierarchyCycle(_)));
}

#[test]
fn deleting_a_bound_export_is_stale() {
    let child = exported_pins("child", 2);
    let parent = parent_binding_export(&child, 1);
    let snap = Snapshot::with_pool(builtin::pool())
        .with_revision(child.clone())
        .unwrap()
        .with_revision(parent)
        .unwrap();

    let kept = child.exports().iter().take(1).cloned().collect::<Vec<_>>();
    let edited = child
        .with(child.meta().clone(), None, None, Some(kept.into()))
        .unwrap();
    let err = snap.with_revision(edited).unwrap_err();
    assert!(matches!(
        err,
        Error::StaleUsage {
            reason: StaleUsage::ExportDeleted(1),
            ..
        }
    ));
}

#[test]
fn deleting_an_unbound_export_is_fine() {
    let child = exported_pins("child", 2);
    let parent = parent_binding_export(&child, 0);
    let snap = Snapshot::with_pool(builtin::pool())
        .with_revision(child.clone())
        .unwrap()
        .with_revision(parent.clone())
        .unwrap();
    let kept = child.exports().iter().take(1).cloned().collect::<Vec<_>>();
    let edited = child
        .with(child.meta().clone(), None, None, Some(kept.into()))
        .unwrap();
    let next = snap.with_revision(edited).unwrap();
    assert!(!Arc::ptr_eq(
        next.tree(parent.cell_id()).unwrap(),
        snap.tree(parent.cell_id()).unwrap()
    ));
}

#[test]
fn assembly_metrics() {
    let metrics = Arc::new(CounterMetrics::new());
    let snap = Snapshot::new(DbConfig::default(), metrics.clone(), builtin::pool());
    let child = exported_pins("child", 2);
    let parent = parent_binding_export(&child, 0);
    let snap = snap.with_revision(child.clone()).unwrap();
    assert_eq!(metrics.get(Counter::TreeCreated), 1);
    let snap = snap.with_revision(parent).unwrap();
    assert_eq!(metrics.get(Counter::TreeCreated), 2);
    assert_eq!(metrics.get(Counter::TreeReused), 1);
    assert_eq!(metrics.get(Counter::BackupCreated), 2);
    assert_eq!(metrics.get(Counter::RevisionDerived), 2);

    // Storing the same revision again changes nothing.
    let same = snap.with_revision(snap.revision(child.cell_id()).unwrap().clone()).unwrap();
    assert_eq!(metrics.get(Counter::BackupCreated), 2);
    assert!(Arc::ptr_eq(same.tree(child.cell_id()).unwrap(), snap.tree(child.cell_id()).unwrap()));
}
