use std::sync::Arc;

use super::derive_with;
use crate::error::Result;
use crate::geom::{Orientation, Point, Size};
use crate::ids::{NodeId, NodeProtoId, PrimitiveNodeId, TechId};
use crate::name::Name;
use crate::remap::IdMapper;
use crate::tech::builtin;
use crate::var::{VarSet, Variable};

/// Variables attached to one port of a node instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PortInst {
    vars: VarSet,
}

impl PortInst {
    /// The variables.
    #[inline]
    pub fn vars(&self) -> &VarSet {
        &self.vars
    }
}

/// A placed primitive device or subcell instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeInst {
    id: NodeId,
    proto: NodeProtoId,
    name: Name,
    orient: Orientation,
    anchor: Point,
    size: Size,
    flags: u32,
    vars: VarSet,
    ports: Arc<[Option<Arc<PortInst>>]>,
}

impl NodeInst {
    /// Creates a node instance.
    ///
    /// Fails if the anchor or size is outside the coordinate range.
    pub fn new(
        id: NodeId,
        proto: NodeProtoId,
        name: Name,
        orient: Orientation,
        anchor: Point,
        size: Size,
    ) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            id,
            proto,
            name,
            orient,
            anchor: anchor.checked()?,
            size: size.checked()?,
            flags: 0,
            vars: VarSet::empty(),
            ports: Arc::new([]),
        }))
    }

    /// The id, unique within the cell.
    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The prototype.
    #[inline]
    pub fn proto(&self) -> &NodeProtoId {
        &self.proto
    }

    /// The name.
    #[inline]
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// The orientation.
    #[inline]
    pub fn orient(&self) -> Orientation {
        self.orient
    }

    /// The anchor point.
    #[inline]
    pub fn anchor(&self) -> Point {
        self.anchor
    }

    /// The size delta.
    #[inline]
    pub fn size(&self) -> Size {
        self.size
    }

    /// Node flags.
    #[inline]
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// The node's variables.
    #[inline]
    pub fn vars(&self) -> &VarSet {
        &self.vars
    }

    /// Variables of the port with the given chronological index, if any.
    pub fn port_vars(&self, chron: u32) -> Option<&VarSet> {
        self.ports
            .get(chron as usize)
            .and_then(|p| p.as_ref())
            .map(|p| &p.vars)
    }

    /// Per-port variable slots, indexed by port chronological index.
    #[inline]
    pub fn ports(&self) -> &[Option<Arc<PortInst>>] {
        &self.ports
    }

    /// Returns `true` if this node instantiates a subcell.
    #[inline]
    pub fn is_cell_instance(&self) -> bool {
        matches!(self.proto, NodeProtoId::Cell(_))
    }

    /// Returns `true` if this node is the cell-center marker.
    pub fn is_cell_center(&self) -> bool {
        self.proto.as_primitive().is_some_and(is_cell_center)
    }

    /// Returns a node with a different name.
    pub fn with_name(self: &Arc<Self>, name: Name) -> Arc<Self> {
        derive_with(self, |n| n.name = name)
    }

    /// Returns a node with a different prototype.
    ///
    /// Port variables are kept; callers replacing the prototype with one
    /// having fewer ports should clear them first.
    pub fn with_proto(self: &Arc<Self>, proto: NodeProtoId) -> Arc<Self> {
        derive_with(self, |n| n.proto = proto)
    }

    /// Returns a node with a different orientation.
    pub fn with_orient(self: &Arc<Self>, orient: Orientation) -> Arc<Self> {
        derive_with(self, |n| n.orient = orient)
    }

    /// Returns a node moved to `anchor`.
    pub fn with_anchor(self: &Arc<Self>, anchor: Point) -> Result<Arc<Self>> {
        let anchor = anchor.checked()?;
        Ok(derive_with(self, |n| n.anchor = anchor))
    }

    /// Returns a node with a different size delta.
    pub fn with_size(self: &Arc<Self>, size: Size) -> Result<Arc<Self>> {
        let size = size.checked()?;
        Ok(derive_with(self, |n| n.size = size))
    }

    /// Returns a node with different flags.
    pub fn with_flags(self: &Arc<Self>, flags: u32) -> Arc<Self> {
        derive_with(self, |n| n.flags = flags)
    }

    /// Returns a node with a variable added or replaced.
    pub fn with_var(self: &Arc<Self>, var: Variable) -> Arc<Self> {
        let vars = self.vars.with(var);
        if vars.ptr_eq(&self.vars) {
            return self.clone();
        }
        derive_with(self, |n| n.vars = vars)
    }

    /// Returns a node with different variables.
    pub fn with_vars(self: &Arc<Self>, vars: VarSet) -> Arc<Self> {
        derive_with(self, |n| n.vars = vars)
    }

    /// Returns a node whose port `chron` carries `vars`.
    ///
    /// Trailing empty port slots are trimmed.
    pub fn with_port_vars(self: &Arc<Self>, chron: u32, vars: VarSet) -> Arc<Self> {
        let i = chron as usize;
        let current = self.port_vars(chron);
        if current.map_or(vars.is_empty(), |c| *c == vars) {
            return self.clone();
        }
        let mut ports: Vec<Option<Arc<PortInst>>> = self.ports.to_vec();
        if ports.len() <= i {
            ports.resize(i + 1, None);
        }
        ports[i] = (!vars.is_empty()).then(|| Arc::new(PortInst { vars }));
        while matches!(ports.last(), Some(None)) {
            ports.pop();
        }
        Arc::new(Self {
            ports: ports.into(),
            ..(**self).clone()
        })
    }

    /// Rewrites the prototype and cell references in variables.
    pub fn with_ids(self: &Arc<Self>, mapper: &IdMapper) -> Arc<Self> {
        let proto = mapper.map_node_proto(&self.proto);
        let vars = self.vars.with_ids(mapper);
        let ports: Vec<Option<Arc<PortInst>>> = self
            .ports
            .iter()
            .map(|p| {
                p.as_ref().map(|p| {
                    let vars = p.vars.with_ids(mapper);
                    if vars.ptr_eq(&p.vars) {
                        p.clone()
                    } else {
                        Arc::new(PortInst { vars })
                    }
                })
            })
            .collect();
        let ports_same = ports
            .iter()
            .zip(self.ports.iter())
            .all(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => true,
            });
        if proto == self.proto && vars.ptr_eq(&self.vars) && ports_same {
            return self.clone();
        }
        Arc::new(Self {
            proto,
            vars,
            ports: if ports_same {
                self.ports.clone()
            } else {
                ports.into()
            },
            ..(**self).clone()
        })
    }
}

pub(crate) fn is_cell_center(id: &PrimitiveNodeId) -> bool {
    id.tech().name() == builtin::GENERIC && id.name() == builtin::CELL_CENTER
}

/// The id of the generic cell-center marker.
pub fn cell_center_id() -> PrimitiveNodeId {
    PrimitiveNodeId::new(TechId::new(builtin::GENERIC), builtin::CELL_CENTER)
}
