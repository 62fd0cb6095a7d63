//! Built-in technologies.
//!
//! `generic` holds technology-independent markers and unrouted arcs;
//! `schematic` holds schematic devices, pins and wires.

use std::sync::Arc;

use once_cell::sync::Lazy;

use super::{ArcFunction, PrimitiveFunction, PrimitivePort, TechPool, Technology};
use crate::element::PortCharacteristic;
use crate::geom::Size;

/// Name of the generic technology.
pub const GENERIC: &str = "generic";
/// Name of the schematic technology.
pub const SCHEMATIC: &str = "schematic";

/// The cell-center marker.
pub const CELL_CENTER: &str = "Facet-Center";
/// An invisible pin carrying text.
pub const INVISIBLE_PIN: &str = "Invisible-Pin";
/// A pin accepting any arc.
pub const UNIVERSAL_PIN: &str = "Universal-Pin";
/// An unrouted arc.
pub const UNROUTED: &str = "Unrouted";
/// A drawing-only arc.
pub const NON_ELECTRICAL: &str = "Non-Electrical";

/// A single-wire pin.
pub const WIRE_PIN: &str = "Wire_Pin";
/// A bus pin.
pub const BUS_PIN: &str = "Bus_Pin";
/// A wire connector.
pub const WIRE_CON: &str = "Wire_Con";
/// A two-terminal resistor.
pub const RESISTOR: &str = "Resistor";
/// A poly resistor, shorted only when everything is shorted.
pub const POLY_RESISTOR: &str = "Poly-Resistor";
/// A capacitor.
pub const CAPACITOR: &str = "Capacitor";
/// A diode.
pub const DIODE: &str = "Diode";
/// A four-terminal transistor (gate, source, drain, bulk).
pub const TRANSISTOR: &str = "Transistor";
/// A named global signal source.
pub const GLOBAL: &str = "Global";
/// The power source.
pub const POWER: &str = "Power";
/// The ground source.
pub const GROUND: &str = "Ground";
/// An off-page connector.
pub const OFF_PAGE: &str = "Off-Page";
/// A schematic wire.
pub const WIRE: &str = "wire";
/// A schematic bus.
pub const BUS: &str = "bus";

static GENERIC_TECH: Lazy<Arc<Technology>> = Lazy::new(|| {
    Technology::builder(GENERIC)
        .node(CELL_CENTER, PrimitiveFunction::CellCenter, Size::new(0, 0), Vec::<PrimitivePort>::new())
        .node(
            INVISIBLE_PIN,
            PrimitiveFunction::InvisiblePin,
            Size::new(2, 2),
            [PrimitivePort::new(0, "center")],
        )
        .node(
            UNIVERSAL_PIN,
            PrimitiveFunction::Pin,
            Size::new(2, 2),
            [PrimitivePort::new(0, "univ")],
        )
        .arc(UNROUTED, ArcFunction::Unrouted, 0, true, false)
        .arc(NON_ELECTRICAL, ArcFunction::NonElectrical, 0, false, false)
        .build()
});

static SCHEMATIC_TECH: Lazy<Arc<Technology>> = Lazy::new(|| {
    let two_terminal = || [PrimitivePort::new(0, "a"), PrimitivePort::new(1, "b")];
    Technology::builder(SCHEMATIC)
        .node(
            WIRE_PIN,
            PrimitiveFunction::Pin,
            Size::new(1, 1),
            [PrimitivePort::new(0, "wire")],
        )
        .node(
            BUS_PIN,
            PrimitiveFunction::Pin,
            Size::new(2, 2),
            [PrimitivePort::new(0, "bus")],
        )
        .node(
            WIRE_CON,
            PrimitiveFunction::Connect,
            Size::new(2, 2),
            [PrimitivePort::new(0, "wire")],
        )
        .node(RESISTOR, PrimitiveFunction::Resistor, Size::new(2, 6), two_terminal())
        .node(
            POLY_RESISTOR,
            PrimitiveFunction::ComplexResistor,
            Size::new(2, 6),
            two_terminal(),
        )
        .node(CAPACITOR, PrimitiveFunction::Capacitor, Size::new(6, 4), two_terminal())
        .node(DIODE, PrimitiveFunction::Diode, Size::new(2, 4), two_terminal())
        .node(
            TRANSISTOR,
            PrimitiveFunction::Transistor,
            Size::new(4, 4),
            [
                PrimitivePort::new(0, "g"),
                PrimitivePort::new(1, "s"),
                PrimitivePort::new(2, "d"),
                PrimitivePort::new(3, "b"),
            ],
        )
        .node(
            GLOBAL,
            PrimitiveFunction::Global,
            Size::new(3, 3),
            [PrimitivePort::new(0, "global")],
        )
        .node(
            POWER,
            PrimitiveFunction::Power,
            Size::new(3, 3),
            [PrimitivePort::new(0, "vdd").with_characteristic(PortCharacteristic::Power)],
        )
        .node(
            GROUND,
            PrimitiveFunction::Ground,
            Size::new(3, 3),
            [PrimitivePort::new(0, "gnd").with_characteristic(PortCharacteristic::Ground)],
        )
        .node(
            OFF_PAGE,
            PrimitiveFunction::OffPage,
            Size::new(4, 2),
            [
                PrimitivePort::new(0, "a").with_topology(0),
                PrimitivePort::new(1, "y").with_topology(0),
            ],
        )
        .arc(WIRE, ArcFunction::Wire, 0, true, false)
        .arc(BUS, ArcFunction::Bus, 1, true, true)
        .build()
});

/// The generic technology.
pub fn generic() -> &'static Arc<Technology> {
    &GENERIC_TECH
}

/// The schematic technology.
pub fn schematics() -> &'static Arc<Technology> {
    &SCHEMATIC_TECH
}

/// A pool holding both built-in technologies.
pub fn pool() -> TechPool {
    TechPool::from_techs([generic().clone(), schematics().clone()])
}
