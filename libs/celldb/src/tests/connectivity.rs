use std::sync::Arc;

use test_log::test;

use super::fixtures::*;
use crate::connectivity::{BlockIndex, ConnectivityIndex, EngineKind, Shape, SortedIndex};
use crate::element::{ArcInst, NodeInst};
use crate::ids::{ArcId, NodeId, NodeProtoId, PortProtoId};
use crate::revision::CellRevision;
use crate::tech::builtin;

/// Hub pin 0 with `n` wires to pins `1..=n`, all on the hub's only port.
fn hub(n: u32) -> Arc<CellRevision> {
    let center = universal_pin(0, "hub", 0, 0);
    let mut nodes = vec![center.clone()];
    let mut arcs = Vec::new();
    for i in 1..=n {
        let pin = universal_pin(i, &format!("leaf{}", i), 10 * i as i64, 0);
        arcs.push(arc(i - 1, unrouted(), &format!("w{}", i - 1), end(&center, 0), end(&pin, 0)));
        nodes.push(pin);
    }
    with_elements(&empty_layout("hub"), nodes, arcs, Vec::new())
}

fn arc_ids(rev: &CellRevision, index: &dyn ConnectivityIndex, node: NodeId) -> Vec<u32> {
    index
        .connections(rev, node, None)
        .iter()
        .map(|c| c.arc(rev).id().0)
        .collect()
}

/// Every port of a primitive, or the first port of an instance.
fn ports(node: &NodeInst) -> Vec<PortProtoId> {
    match node.proto() {
        NodeProtoId::Primitive(id) => builtin::pool()
            .primitive(id)
            .map(|p| p.ports().iter().map(|port| port_of(node, port.chron())).collect())
            .unwrap_or_default(),
        NodeProtoId::Cell(_) => vec![port_of(node, 0)],
    }
}

fn assert_engines_agree(rev: &CellRevision) {
    let sorted = SortedIndex::build(rev, 4);
    let blocks = BlockIndex::build(rev);
    assert_indices_agree(rev, &sorted, &blocks);
}

fn assert_indices_agree(rev: &CellRevision, a: &dyn ConnectivityIndex, b: &dyn ConnectivityIndex) {
    for node in rev.nodes().iter() {
        assert_eq!(
            a.connections(rev, node.id(), None),
            b.connections(rev, node.id(), None),
            "connections of {}",
            node.id()
        );
        assert_eq!(
            a.exports(rev, node.id(), None),
            b.exports(rev, node.id(), None),
            "exports of {}",
            node.id()
        );
        for port in ports(node) {
            assert_eq!(
                a.connections(rev, node.id(), Some(&port)),
                b.connections(rev, node.id(), Some(&port)),
                "connections of {} on {}",
                node.id(),
                port
            );
            assert_eq!(
                a.exports(rev, node.id(), Some(&port)),
                b.exports(rev, node.id(), Some(&port)),
                "exports of {} on {}",
                node.id(),
                port
            );
        }
    }
}

/// Resistors `r@0` and `r@1` wired port to port, with `r@1.1` also wired to
/// a pin. Exports `x` and `y` sit on both ports of `r@0`, `z` on the pin.
fn resistor_pair() -> Arc<CellRevision> {
    let rev = empty_schematic("pair");
    let cell = rev.cell_id().clone();
    let r0 = schematic_node(0, builtin::RESISTOR, "r@0", 0, 0);
    let r1 = schematic_node(1, builtin::RESISTOR, "r@1", 20, 0);
    let pin = wire_pin(2, "pin@0", 40, 0);
    let arcs = vec![
        arc(0, schematic_wire(), "net@0", end(&r0, 0), end(&r1, 0)),
        arc(1, schematic_wire(), "net@1", end(&r0, 1), end(&r1, 1)),
        arc(2, schematic_wire(), "net@2", end(&r1, 1), end(&pin, 0)),
    ];
    let exports = vec![
        export(&cell, 0, "x", &r0, 0),
        export(&cell, 1, "y", &r0, 1),
        export(&cell, 2, "z", &pin, 0),
    ];
    with_elements(&rev, vec![r0, r1, pin], arcs, exports)
}

#[test]
fn engines_agree_on_fixtures() {
    for rev in [two_pins_and_wire(), exported_pins("cell", 5), hub(7), hub(1)] {
        assert_engines_agree(&rev);
    }
    let child = exported_pins("child", 3);
    assert_engines_agree(&parent_binding_export(&child, 2));
}

#[test]
fn shapes_follow_connection_counts() {
    let rev = hub(3);
    let blocks = rev.block_index();
    assert_eq!(blocks.shape(NodeId(0)), Some(Shape::Wire3));
    assert_eq!(blocks.shape(NodeId(1)), Some(Shape::Wire1));
    let exported = exported_pins("cell", 1);
    assert_eq!(exported.block_index().shape(NodeId(0)), Some(Shape::Export1));
    assert_eq!(hub(9).block_index().shape(NodeId(0)), Some(Shape::WireN));
}

#[test]
fn loops_fall_back_to_generic_shape() {
    let rev = empty_layout("loop");
    let pin = universal_pin(0, "pin", 0, 0);
    let lp = arc(0, unrouted(), "w", end(&pin, 0), end(&pin, 0));
    let rev = with_elements(&rev, vec![pin], vec![lp], Vec::new());
    assert_eq!(rev.block_index().shape(NodeId(0)), Some(Shape::Generic));
    assert_eq!(rev.sorted_index().connection_count(&rev, NodeId(0), None), 2);
    assert_engines_agree(&rev);
}

#[test]
fn deleting_a_wire_keeps_relative_order() {
    for engine in [EngineKind::SortedKeys, EngineKind::Blocks] {
        let rev = hub(3);
        let index = rev.connectivity(engine, 2);
        assert_eq!(arc_ids(&rev, &*index, NodeId(0)), vec![0, 1, 2]);

        let arcs: Vec<Arc<ArcInst>> = rev
            .arcs()
            .iter()
            .filter(|a| a.id() != ArcId(1))
            .cloned()
            .collect();
        let next = rev
            .with(rev.meta().clone(), None, Some(arcs.into()), None)
            .unwrap();
        let index = next.connectivity(engine, 2);
        assert_eq!(arc_ids(&next, &*index, NodeId(0)), vec![0, 2]);
        assert!(!index.has_connections(&next, NodeId(2), None));
    }
}

#[test]
fn patched_blocks_match_fresh_build() {
    let rev = hub(5);
    let _ = rev.block_index();
    let arcs: Vec<Arc<ArcInst>> = rev.arcs().iter().skip(1).cloned().collect();
    let next = rev
        .with(rev.meta().clone(), None, Some(arcs.into()), None)
        .unwrap();
    let patched = next.block_index();
    assert!(patched.same_content(&BlockIndex::build(&next)));
    assert_engines_agree(&next);
}

#[test]
fn untouched_blocks_are_shared() {
    let rev = empty_layout("wide");
    let pins: Vec<_> = (0..130)
        .map(|i| universal_pin(i, &format!("p{}", i), 10 * i as i64, 0))
        .collect();
    let arcs: Vec<_> = (0..65)
        .map(|i| {
            arc(
                i,
                unrouted(),
                &format!("w{}", i),
                end(&pins[2 * i as usize], 0),
                end(&pins[2 * i as usize + 1], 0),
            )
        })
        .collect();
    let rev = with_elements(&rev, pins, arcs, Vec::new());
    let before = rev.block_index();
    assert_eq!(before.stats().rebuilt, 3);

    let arcs: Vec<Arc<ArcInst>> = rev
        .arcs()
        .iter()
        .filter(|a| a.id() != ArcId(0))
        .cloned()
        .collect();
    let next = rev
        .with(rev.meta().clone(), None, Some(arcs.into()), None)
        .unwrap();
    let after = next.block_index();
    assert_eq!(after.stats().rebuilt, 1);
    assert_eq!(after.stats().reused, 2);
    assert_eq!(after.shared_blocks(&before), 2);
    assert!(after.same_content(&BlockIndex::build(&next)));
}

#[test]
fn unchanged_connectivity_keeps_indices() {
    let rev = hub(2);
    let sorted = rev.sorted_index();
    let blocks = rev.block_index();
    let next = rev
        .with(rev.meta().with_revision_date(42), None, None, None)
        .unwrap();
    assert!(!Arc::ptr_eq(&rev, &next));
    assert!(Arc::ptr_eq(&sorted, &next.sorted_index()));
    assert!(Arc::ptr_eq(&blocks, &next.block_index()));
}

#[test]
#[should_panic]
fn absent_node_panics() {
    let rev = hub(1);
    rev.sorted_index().connections(&rev, NodeId(99), None);
}

#[test]
fn multiport_nodes_agree_and_patch() {
    let rev = resistor_pair();
    let blocks = rev.block_index();
    for node in 0..3 {
        assert_eq!(blocks.shape(NodeId(node)), Some(Shape::Generic));
    }
    assert_engines_agree(&rev);
    let r1 = rev.node(NodeId(1)).unwrap().clone();
    let on_port_1 = blocks.connections(&rev, NodeId(1), Some(&port_of(&r1, 1)));
    let arcs: Vec<_> = on_port_1.iter().map(|c| c.arc(&rev).id().0).collect();
    assert_eq!(arcs, vec![1, 2]);

    // Deleting an export.
    let kept: Vec<_> = rev
        .exports()
        .iter()
        .filter(|e| e.chron() != 1)
        .cloned()
        .collect();
    let fewer = rev
        .with(rev.meta().clone(), None, None, Some(kept.into()))
        .unwrap();
    let patched = fewer.block_index();
    assert!(patched.same_content(&BlockIndex::build(&fewer)));
    assert_eq!(patched.stats().rebuilt, 1);
    assert_indices_agree(&fewer, &*fewer.sorted_index(), &*patched);
    let r0 = fewer.node(NodeId(0)).unwrap().clone();
    assert!(patched
        .exports(&fewer, NodeId(0), Some(&port_of(&r0, 1)))
        .is_empty());

    // Moving an arc end to another node under the same arc id.
    let mut arcs: Vec<_> = rev.arcs().iter().filter(|a| a.id() != ArcId(2)).cloned().collect();
    let pin = rev.node(NodeId(2)).unwrap().clone();
    let r0 = rev.node(NodeId(0)).unwrap().clone();
    arcs.push(arc(2, schematic_wire(), "net@2", end(&r0, 0), end(&pin, 0)));
    let moved = with_elements(
        &rev,
        rev.nodes().iter().cloned().collect(),
        arcs,
        rev.exports().iter().cloned().collect(),
    );
    let patched = moved.block_index();
    assert!(patched.same_content(&BlockIndex::build(&moved)));
    assert_indices_agree(&moved, &*moved.sorted_index(), &*patched);
    let on_port_0: Vec<_> = patched
        .connections(&moved, NodeId(0), Some(&port_of(&r0, 0)))
        .iter()
        .map(|c| c.arc(&moved).id().0)
        .collect();
    assert_eq!(on_port_0, vec![0, 2]);
    assert_eq!(patched.connection_count(&moved, NodeId(1), Some(&port_of(&r1, 1))), 1);
}
