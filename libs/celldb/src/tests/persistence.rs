use std::sync::Arc;

use test_log::test;

use super::fixtures::*;
use crate::codec::{self, decode_backup, decode_revision, encode_backup, encode_revision};
use crate::element::PortCharacteristic;
use crate::error::{Error, StaleUsage};
use crate::geom::{Orientation, Rotation};
use crate::name::Name;
use crate::revision::CellRevision;
use crate::snapshot::Snapshot;
use crate::tech::builtin;
use crate::var::{keys, VarValue, Variable};

/// A schematic touching every encoded field: variables on the cell, nodes
/// and exports, a rotated node, bus names and a wide arc.
fn rich_schematic() -> Arc<CellRevision> {
    let rev = empty_schematic("rich");
    let cell = rev.cell_id().clone();
    let meta = rev
        .meta()
        .with_revision_date(1_700_000_000)
        .with_var(Variable::plain("NET_ncc_note", VarValue::Str("kept".into())).unwrap());
    let rev = rev.with(meta, None, None, None).unwrap();

    let r = schematic_node(0, builtin::RESISTOR, "r@0", 0, 0)
        .with_orient(Orientation::new(true, Rotation::R90))
        .with_var(Variable::plain(keys::RESISTANCE_SELECTOR, VarValue::Int(2)).unwrap())
        .with_flags(3);
    let pin = wire_pin(1, "pin@0", 20, 0);
    let bus = arc(0, schematic_wire(), "d[0:1]", end(&r, 1), end(&pin, 0))
        .with_width(2)
        .unwrap();
    let out = export(&cell, 0, "out[0:1]", &pin, 0).with_characteristic(PortCharacteristic::Output);
    let tap = export(&cell, 3, "tap", &r, 0)
        .with_var(Variable::plain("ATTR_pin", VarValue::Ints(vec![1, 2, 3].into())).unwrap());
    with_elements(&rev, vec![r, pin], vec![bus], vec![out, tap])
}

#[test]
fn revisions_round_trip() {
    for rev in [
        rich_schematic(),
        two_pins_and_wire(),
        exported_pins("cell", 4),
        parent_binding_export(&exported_pins("child", 2), 1),
        empty_icon("inv"),
    ] {
        let decoded = decode_revision(&encode_revision(&rev).unwrap()).unwrap();
        assert!(decoded.same_content(&rev), "{} changed", rev.cell_id());
        assert_eq!(decoded.usages(), rev.usages());
        assert_eq!(decoded.export_chron_bound(), rev.export_chron_bound());
        assert_eq!(decoded.export(3).map(|e| e.name().clone()), rev.export(3).map(|e| e.name().clone()));
    }
}

#[test]
fn deleted_exports_and_usage_slots_survive_decoding() {
    let child = exported_pins("child", 3);
    let kept = child
        .exports()
        .iter()
        .filter(|e| e.chron() != 1)
        .cloned()
        .collect::<Vec<_>>();
    let edited = child
        .with(child.meta().clone(), None, None, Some(kept.into()))
        .unwrap();
    let decoded = decode_revision(&encode_revision(&edited).unwrap()).unwrap();
    assert_eq!(decoded.deleted_exports().ones().collect::<Vec<_>>(), vec![1]);

    let parent = parent_binding_export(&child, 1);
    let slot = parent.usage_slot(child.cell_id()).unwrap();
    let err = parent.check_usage(slot, &decoded).unwrap_err();
    assert!(matches!(
        err,
        Error::StaleUsage {
            reason: StaleUsage::ExportDeleted(1),
            ..
        }
    ));

    let a = exported_pins("a", 1);
    let b = exported_pins("b", 1);
    let b_inst = instance(1, "b@0", b.cell_id(), 100, 0);
    let both = with_elements(
        &empty_layout("top"),
        vec![instance(0, "a@0", a.cell_id(), 0, 0), b_inst.clone()],
        Vec::new(),
        Vec::new(),
    );
    let only_b = both
        .with(both.meta().clone(), Some(vec![b_inst].into()), None, None)
        .unwrap();
    let decoded = decode_revision(&encode_revision(&only_b).unwrap()).unwrap();
    assert_eq!(decoded.usages(), only_b.usages());
    assert!(decoded.usages()[0].is_empty());
    assert_eq!(decoded.usage_slot(b.cell_id()), Some(1));
}

#[test]
fn deleted_exports_overlapping_defined_ones_are_rejected() {
    let mut bytes = encode_revision(&exported_pins("cell", 2)).unwrap();
    // No deleted exports and no usage slots end the encoding.
    bytes.truncate(bytes.len() - 8);
    bytes.extend_from_slice(&1u32.to_be_bytes());
    bytes.extend_from_slice(&0i64.to_be_bytes());
    bytes.extend_from_slice(&0u32.to_be_bytes());
    assert!(matches!(
        decode_revision(&bytes),
        Err(Error::Inconsistent {
            what: "deleted exports",
            ..
        })
    ));
}

#[test]
fn streams_hold_consecutive_revisions() {
    let first = rich_schematic();
    let second = two_pins_and_wire();
    let mut buf = Vec::new();
    codec::write_revision(&mut buf, &first).unwrap();
    codec::write_revision(&mut buf, &second).unwrap();

    let mut r = &buf[..];
    assert!(codec::read_revision(&mut r).unwrap().same_content(&first));
    assert!(codec::read_revision(&mut r).unwrap().same_content(&second));
    assert!(r.is_empty());
}

#[test]
fn snapshot_round_trips_through_backups() {
    let pool = builtin::pool();
    let child = exported_pins("child", 2);
    let parent = parent_binding_export(&child, 1);
    let snap = Snapshot::with_pool(pool.clone())
        .with_revision(child)
        .unwrap()
        .with_revision(parent.clone())
        .unwrap()
        .with_revision(rich_schematic())
        .unwrap();

    let encoded: Vec<_> = snap
        .cells()
        .map(|cell| encode_backup(snap.backup(cell).unwrap()).unwrap())
        .collect();
    let decoded = encoded
        .iter()
        .map(|bytes| {
            let backup = decode_backup(bytes, &pool).unwrap();
            (backup.cell_id().clone(), Some(backup))
        })
        .collect::<Vec<_>>();
    let restored = Snapshot::with_pool(pool).with_backups(decoded).unwrap();

    assert!(snap.cells().eq(restored.cells()));
    for cell in snap.cells() {
        let (a, b) = (snap.backup(cell).unwrap(), restored.backup(cell).unwrap());
        assert!(a.revision().same_content(b.revision()));
        assert_eq!(a.is_modified(), b.is_modified());
    }
    let before = snap.equivalence(parent.cell_id()).unwrap();
    let after = restored.equivalence(parent.cell_id()).unwrap();
    assert!(before.equals_ports(&after));
    assert_eq!(
        snap.tree(parent.cell_id()).unwrap().bounds(),
        restored.tree(parent.cell_id()).unwrap().bounds()
    );
}

#[test]
fn unchanged_derivations_share_the_original() {
    let rev = rich_schematic();
    let same = rev
        .with(
            rev.meta().clone(),
            Some(rev.nodes().clone()),
            Some(rev.arcs().clone()),
            Some(rev.exports().clone()),
        )
        .unwrap();
    assert!(Arc::ptr_eq(&rev, &same));

    let node = rev.nodes()[0].clone();
    assert!(Arc::ptr_eq(&node, &node.with_name(node.name().clone())));
    assert!(Arc::ptr_eq(&node, &node.with_flags(node.flags())));

    let renamed = node.with_name(Name::parse("r@9").unwrap());
    assert!(!Arc::ptr_eq(&node, &renamed));
    assert_eq!(renamed.vars(), node.vars());
}
