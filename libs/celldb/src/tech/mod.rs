//! Read-only technology data model.
//!
//! A [`Technology`] lists primitive node prototypes and arc prototypes. The
//! database only needs a few facts from it: port topology groups, isolated
//! ports, device classification and default sizes for bounds. A
//! [`TechPool`] is an immutable set of technologies keyed by id; pools are
//! consistent when every technology they share is the same `Arc`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use arcstr::ArcStr;
use indexmap::IndexMap;

use crate::element::PortCharacteristic;
use crate::error::{Error, Result};
use crate::geom::{Orientation, Point, Rect, Size};
use crate::ids::{ArcProtoId, PrimitiveNodeId, PrimitivePortId, TechId};

pub mod builtin;

/// The electrical role of a primitive node.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum PrimitiveFunction {
    /// A wire pin joining arcs.
    Pin,
    /// A layer contact.
    Contact,
    /// A plain layer node.
    Node,
    /// A transistor.
    Transistor,
    /// A resistor. Shorted when parasitics are shorted.
    Resistor,
    /// A resistor that is only shorted when everything is shorted.
    ComplexResistor,
    /// A capacitor.
    Capacitor,
    /// A diode.
    Diode,
    /// A source of a named global signal.
    Global,
    /// A power source.
    Power,
    /// A ground source.
    Ground,
    /// The cell-center marker.
    CellCenter,
    /// An invisible pin used to carry text.
    InvisiblePin,
    /// A connector joining wires and buses.
    Connect,
    /// An off-page connector.
    OffPage,
    /// Anything else.
    Unknown,
}

impl PrimitiveFunction {
    /// Returns `true` for visible and invisible pins.
    #[inline]
    pub fn is_pin(&self) -> bool {
        matches!(self, Self::Pin | Self::InvisiblePin)
    }
}

/// A port of a primitive node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PrimitivePort {
    chron: u32,
    name: ArcStr,
    topology: Option<u32>,
    isolated: bool,
    characteristic: PortCharacteristic,
}

impl PrimitivePort {
    /// Creates a port with no topology group.
    pub fn new(chron: u32, name: impl Into<ArcStr>) -> Self {
        Self {
            chron,
            name: name.into(),
            topology: None,
            isolated: false,
            characteristic: PortCharacteristic::Unknown,
        }
    }

    /// Puts the port into a topology group; ports of one node in the same
    /// group are electrically connected inside the device.
    pub fn with_topology(mut self, group: u32) -> Self {
        self.topology = Some(group);
        self
    }

    /// Marks the port isolated: arcs ending on it are not joined to it
    /// unless their prototype bridges isolated ports.
    pub fn isolated(mut self) -> Self {
        self.isolated = true;
        self
    }

    /// Sets the electrical characteristic.
    pub fn with_characteristic(mut self, characteristic: PortCharacteristic) -> Self {
        self.characteristic = characteristic;
        self
    }

    /// The chronological index.
    #[inline]
    pub fn chron(&self) -> u32 {
        self.chron
    }

    /// The port name.
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The topology group, if any.
    #[inline]
    pub fn topology(&self) -> Option<u32> {
        self.topology
    }

    /// Returns `true` for isolated ports.
    #[inline]
    pub fn is_isolated(&self) -> bool {
        self.isolated
    }

    /// The electrical characteristic.
    #[inline]
    pub fn characteristic(&self) -> PortCharacteristic {
        self.characteristic
    }
}

/// A primitive node prototype.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PrimitiveNode {
    id: PrimitiveNodeId,
    function: PrimitiveFunction,
    ports: Vec<PrimitivePort>,
    default_size: Size,
}

impl PrimitiveNode {
    /// The id.
    #[inline]
    pub fn id(&self) -> &PrimitiveNodeId {
        &self.id
    }

    /// The function.
    #[inline]
    pub fn function(&self) -> PrimitiveFunction {
        self.function
    }

    /// The ports, indexed by chronological index.
    #[inline]
    pub fn ports(&self) -> &[PrimitivePort] {
        &self.ports
    }

    /// The port with the given chronological index.
    #[inline]
    pub fn port(&self, chron: u32) -> Option<&PrimitivePort> {
        self.ports.get(chron as usize)
    }

    /// The size of an instance with a zero size delta.
    #[inline]
    pub fn default_size(&self) -> Size {
        self.default_size
    }

    /// The bounds of an instance.
    ///
    /// The instance is centered on `anchor` with its default size grown by
    /// `size`; negative results clamp to zero.
    pub fn bounds(&self, orient: Orientation, anchor: Point, size: Size) -> Rect {
        let w = (self.default_size.w + size.w).max(0);
        let h = (self.default_size.h + size.h).max(0);
        Rect::centered(w, h).transform(orient, anchor)
    }
}

/// The electrical role of an arc prototype.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum ArcFunction {
    /// A metal wire.
    Metal,
    /// A polysilicon wire.
    Poly,
    /// A diffusion wire.
    Diffusion,
    /// A schematic wire.
    Wire,
    /// A schematic bus.
    Bus,
    /// An unrouted connection.
    Unrouted,
    /// A drawing-only arc that carries no signal.
    NonElectrical,
}

/// An arc prototype.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArcProto {
    id: ArcProtoId,
    function: ArcFunction,
    default_width: i64,
    wipable: bool,
    bridges_isolated: bool,
}

impl ArcProto {
    /// The id.
    #[inline]
    pub fn id(&self) -> &ArcProtoId {
        &self.id
    }

    /// The function.
    #[inline]
    pub fn function(&self) -> ArcFunction {
        self.function
    }

    /// The width of an arc with a zero width delta.
    #[inline]
    pub fn default_width(&self) -> i64 {
        self.default_width
    }

    /// Returns `true` if pins joining only arcs of this prototype are hidden.
    #[inline]
    pub fn is_wipable(&self) -> bool {
        self.wipable
    }

    /// Returns `true` if arcs of this prototype join isolated ports.
    #[inline]
    pub fn bridges_isolated(&self) -> bool {
        self.bridges_isolated
    }

    /// Returns `true` if this arc carries no signal.
    #[inline]
    pub fn is_inert(&self) -> bool {
        self.function == ArcFunction::NonElectrical
    }
}

/// A technology: named primitive and arc prototype tables.
#[derive(Debug)]
pub struct Technology {
    id: TechId,
    nodes: IndexMap<ArcStr, Arc<PrimitiveNode>>,
    arcs: IndexMap<ArcStr, Arc<ArcProto>>,
}

impl Technology {
    /// Starts building a technology with the given name.
    pub fn builder(name: impl Into<ArcStr>) -> TechnologyBuilder {
        TechnologyBuilder {
            id: TechId::new(name),
            nodes: IndexMap::new(),
            arcs: IndexMap::new(),
        }
    }

    /// The id.
    #[inline]
    pub fn id(&self) -> &TechId {
        &self.id
    }

    /// Looks up a primitive node by name.
    #[inline]
    pub fn node(&self, name: &str) -> Option<&Arc<PrimitiveNode>> {
        self.nodes.get(name)
    }

    /// Looks up an arc prototype by name.
    #[inline]
    pub fn arc(&self, name: &str) -> Option<&Arc<ArcProto>> {
        self.arcs.get(name)
    }

    /// The primitive nodes, in definition order.
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<PrimitiveNode>> {
        self.nodes.values()
    }

    /// The arc prototypes, in definition order.
    pub fn arcs(&self) -> impl Iterator<Item = &Arc<ArcProto>> {
        self.arcs.values()
    }

    /// The id of the named primitive node.
    ///
    /// # Panics
    ///
    /// Panics if the technology has no such node.
    pub fn node_id(&self, name: &str) -> PrimitiveNodeId {
        match self.nodes.get(name) {
            Some(node) => node.id.clone(),
            None => panic!("technology `{}` has no primitive `{}`", self.id, name),
        }
    }

    /// The id of the named arc prototype.
    ///
    /// # Panics
    ///
    /// Panics if the technology has no such arc prototype.
    pub fn arc_id(&self, name: &str) -> ArcProtoId {
        match self.arcs.get(name) {
            Some(arc) => arc.id.clone(),
            None => panic!("technology `{}` has no arc prototype `{}`", self.id, name),
        }
    }
}

/// Builds a [`Technology`].
#[derive(Debug)]
pub struct TechnologyBuilder {
    id: TechId,
    nodes: IndexMap<ArcStr, Arc<PrimitiveNode>>,
    arcs: IndexMap<ArcStr, Arc<ArcProto>>,
}

impl TechnologyBuilder {
    /// Adds a primitive node.
    ///
    /// Port chronological indices are assigned from the iteration order.
    pub fn node(
        mut self,
        name: impl Into<ArcStr>,
        function: PrimitiveFunction,
        default_size: Size,
        ports: impl IntoIterator<Item = PrimitivePort>,
    ) -> Self {
        let name = name.into();
        let ports = ports
            .into_iter()
            .enumerate()
            .map(|(i, mut p)| {
                p.chron = i as u32;
                p
            })
            .collect();
        let node = PrimitiveNode {
            id: PrimitiveNodeId::new(self.id.clone(), name.clone()),
            function,
            ports,
            default_size,
        };
        self.nodes.insert(name, Arc::new(node));
        self
    }

    /// Adds an arc prototype.
    pub fn arc(
        mut self,
        name: impl Into<ArcStr>,
        function: ArcFunction,
        default_width: i64,
        wipable: bool,
        bridges_isolated: bool,
    ) -> Self {
        let name = name.into();
        let arc = ArcProto {
            id: ArcProtoId::new(self.id.clone(), name.clone()),
            function,
            default_width,
            wipable,
            bridges_isolated,
        };
        self.arcs.insert(name, Arc::new(arc));
        self
    }

    /// Finishes the technology.
    pub fn build(self) -> Arc<Technology> {
        Arc::new(Technology {
            id: self.id,
            nodes: self.nodes,
            arcs: self.arcs,
        })
    }
}

/// An immutable set of technologies.
#[derive(Clone, Debug, Default)]
pub struct TechPool(Arc<BTreeMap<TechId, Arc<Technology>>>);

impl TechPool {
    /// The empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pool from technologies; later duplicates replace earlier ones.
    pub fn from_techs(techs: impl IntoIterator<Item = Arc<Technology>>) -> Self {
        Self(Arc::new(
            techs.into_iter().map(|t| (t.id.clone(), t)).collect(),
        ))
    }

    /// Looks up a technology.
    #[inline]
    pub fn get(&self, id: &TechId) -> Option<&Arc<Technology>> {
        self.0.get(id)
    }

    /// The technology ids in this pool.
    pub fn ids(&self) -> impl Iterator<Item = &TechId> {
        self.0.keys()
    }

    /// The number of technologies.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the pool is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Looks up a primitive node.
    pub fn primitive(&self, id: &PrimitiveNodeId) -> Option<&Arc<PrimitiveNode>> {
        self.get(id.tech())?.node(id.name())
    }

    /// Looks up a primitive port.
    pub fn primitive_port(&self, id: &PrimitivePortId) -> Option<&PrimitivePort> {
        self.primitive(id.node())?.port(id.chron())
    }

    /// Looks up an arc prototype.
    pub fn arc_proto(&self, id: &ArcProtoId) -> Option<&Arc<ArcProto>> {
        self.get(id.tech())?.arc(id.name())
    }

    /// Restricts this pool to the given technologies.
    ///
    /// Returns a clone sharing this pool if nothing is removed.
    pub fn restrict(&self, techs: &BTreeSet<TechId>) -> Result<TechPool> {
        if let Some(missing) = techs.iter().find(|t| !self.0.contains_key(t)) {
            return Err(Error::UnknownTechnology(missing.clone()));
        }
        if techs.len() == self.0.len() {
            return Ok(self.clone());
        }
        Ok(Self(Arc::new(
            techs
                .iter()
                .filter_map(|t| self.0.get_key_value(t))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )))
    }

    /// Returns `true` if every technology in both pools is the same object.
    pub fn is_consistent_with(&self, other: &TechPool) -> bool {
        self.0
            .iter()
            .all(|(id, t)| other.0.get(id).map_or(true, |o| Arc::ptr_eq(t, o)))
    }

    /// Returns `true` if `self` contains every technology of `other`.
    pub fn contains(&self, other: &TechPool) -> bool {
        other
            .0
            .iter()
            .all(|(id, t)| self.0.get(id).is_some_and(|s| Arc::ptr_eq(s, t)))
    }

    /// The union of two consistent pools.
    ///
    /// Returns a clone of `self` if it already contains `other`.
    pub fn union(&self, other: &TechPool) -> Result<TechPool> {
        if let Some(id) = self
            .0
            .iter()
            .find(|(id, t)| other.0.get(*id).is_some_and(|o| !Arc::ptr_eq(t, o)))
            .map(|(id, _)| id)
        {
            return Err(Error::TechPoolMismatch(id.clone()));
        }
        if self.contains(other) {
            return Ok(self.clone());
        }
        if other.contains(self) {
            return Ok(other.clone());
        }
        let mut merged = (*self.0).clone();
        merged.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(Self(Arc::new(merged)))
    }

    /// Returns `true` if both pools share the same table.
    #[inline]
    pub fn ptr_eq(&self, other: &TechPool) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for TechPool {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || (self.0.len() == other.0.len() && self.contains(other))
    }
}

impl Eq for TechPool {}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn restrict_and_union() {
        let pool = builtin::pool();
        let generic = BTreeSet::from([builtin::generic().id().clone()]);
        let restricted = pool.restrict(&generic).unwrap();
        assert_eq!(restricted.len(), 1);
        assert!(restricted.is_consistent_with(&pool));
        assert_eq!(restricted.union(&pool).unwrap(), pool);
        assert!(pool.restrict(&BTreeSet::from([TechId::new("cmos")])).is_err());

        let all: BTreeSet<TechId> = pool.ids().cloned().collect();
        assert!(pool.restrict(&all).unwrap().ptr_eq(&pool));
    }

    #[test]
    fn inconsistent_pools_do_not_merge() {
        let a = TechPool::from_techs([Technology::builder("t").build()]);
        let b = TechPool::from_techs([Technology::builder("t").build()]);
        assert!(!a.is_consistent_with(&b));
        assert!(matches!(a.union(&b), Err(Error::TechPoolMismatch(_))));
    }

    #[test]
    fn primitive_bounds() {
        let schem = builtin::schematics();
        let res = schem.node(builtin::RESISTOR).unwrap();
        let r = res.bounds(Orientation::IDENTITY, Point::new(100, 100), Size::default());
        assert_eq!(r.width(), res.default_size().w);
        assert_eq!(r.height(), res.default_size().h);
    }
}
