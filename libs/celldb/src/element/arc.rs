use std::cmp::Ordering;
use std::sync::Arc;

use super::derive_with;
use crate::error::{Error, Result};
use crate::geom::{check_coord, Point, Rect};
use crate::ids::{ArcId, ArcProtoId, NodeId, PortProtoId};
use crate::name::{self, Name};
use crate::remap::IdMapper;
use crate::var::{VarSet, Variable};

/// One end of an arc.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum End {
    /// The tail.
    Tail,
    /// The head.
    Head,
}

impl End {
    /// Both ends, tail first.
    pub const ALL: [End; 2] = [End::Tail, End::Head];

    /// `0` for the tail, `1` for the head.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Self::Tail => 0,
            Self::Head => 1,
        }
    }

    /// The end with the given index.
    #[inline]
    pub fn from_index(i: usize) -> Self {
        if i & 1 == 0 {
            Self::Tail
        } else {
            Self::Head
        }
    }

    /// The opposite end.
    #[inline]
    pub fn other(self) -> Self {
        match self {
            Self::Tail => Self::Head,
            Self::Head => Self::Tail,
        }
    }
}

/// The binding of one arc end.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct ArcEnd {
    node: NodeId,
    port: PortProtoId,
    location: Point,
}

impl ArcEnd {
    /// Creates an end binding.
    pub fn new(node: NodeId, port: PortProtoId, location: Point) -> Result<Self> {
        Ok(Self {
            node,
            port,
            location: location.checked()?,
        })
    }

    /// The node.
    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// The port on the node.
    #[inline]
    pub fn port(&self) -> &PortProtoId {
        &self.port
    }

    /// The location.
    #[inline]
    pub fn location(&self) -> Point {
        self.location
    }

    fn with_ids(&self, mapper: &IdMapper) -> Self {
        Self {
            port: mapper.map_port(&self.port),
            ..self.clone()
        }
    }
}

/// A wire between two ports.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArcInst {
    id: ArcId,
    proto: ArcProtoId,
    name: Name,
    ends: [ArcEnd; 2],
    width: i64,
    flags: u32,
    vars: VarSet,
}

impl ArcInst {
    /// Creates an arc.
    ///
    /// Fails on a negative width or an out-of-range width.
    pub fn new(
        id: ArcId,
        proto: ArcProtoId,
        name: Name,
        tail: ArcEnd,
        head: ArcEnd,
        width: i64,
    ) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            id,
            proto,
            name,
            ends: [tail, head],
            width: check_width(width)?,
            flags: 0,
            vars: VarSet::empty(),
        }))
    }

    /// The id, unique within the cell.
    #[inline]
    pub fn id(&self) -> ArcId {
        self.id
    }

    /// The prototype.
    #[inline]
    pub fn proto(&self) -> &ArcProtoId {
        &self.proto
    }

    /// The name.
    #[inline]
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// One end.
    #[inline]
    pub fn end(&self, end: End) -> &ArcEnd {
        &self.ends[end.index()]
    }

    /// The tail end.
    #[inline]
    pub fn tail(&self) -> &ArcEnd {
        &self.ends[0]
    }

    /// The head end.
    #[inline]
    pub fn head(&self) -> &ArcEnd {
        &self.ends[1]
    }

    /// The width.
    #[inline]
    pub fn width(&self) -> i64 {
        self.width
    }

    /// Arc flags.
    #[inline]
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// The arc's variables.
    #[inline]
    pub fn vars(&self) -> &VarSet {
        &self.vars
    }

    /// Returns `true` if both ends bind the same port of the same node.
    pub fn is_loop(&self) -> bool {
        self.ends[0].node == self.ends[1].node && self.ends[0].port == self.ends[1].port
    }

    /// Returns `true` if the arc is horizontal, vertical or zero-length.
    pub fn is_manhattan(&self) -> bool {
        let (t, h) = (self.ends[0].location, self.ends[1].location);
        t.x == h.x || t.y == h.y
    }

    /// The bounding box of the arc's centerline grown by half its width.
    pub fn bounds(&self) -> Rect {
        Rect::new(self.ends[0].location, self.ends[1].location).expand(self.width / 2)
    }

    /// Compares arcs by name, then id.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        name::compare(self.name.as_str(), other.name.as_str()).then(self.id.cmp(&other.id))
    }

    /// Returns an arc with a different name.
    pub fn with_name(self: &Arc<Self>, name: Name) -> Arc<Self> {
        derive_with(self, |a| a.name = name)
    }

    /// Returns an arc with different ends.
    pub fn with_ends(self: &Arc<Self>, tail: ArcEnd, head: ArcEnd) -> Arc<Self> {
        derive_with(self, |a| a.ends = [tail, head])
    }

    /// Returns an arc with a different width.
    pub fn with_width(self: &Arc<Self>, width: i64) -> Result<Arc<Self>> {
        let width = check_width(width)?;
        Ok(derive_with(self, |a| a.width = width))
    }

    /// Returns an arc with different flags.
    pub fn with_flags(self: &Arc<Self>, flags: u32) -> Arc<Self> {
        derive_with(self, |a| a.flags = flags)
    }

    /// Returns an arc with a variable added or replaced.
    pub fn with_var(self: &Arc<Self>, var: Variable) -> Arc<Self> {
        let vars = self.vars.with(var);
        if vars.ptr_eq(&self.vars) {
            return self.clone();
        }
        derive_with(self, |a| a.vars = vars)
    }

    /// Returns an arc with different variables.
    pub fn with_vars(self: &Arc<Self>, vars: VarSet) -> Arc<Self> {
        derive_with(self, |a| a.vars = vars)
    }

    /// Rewrites port ids and cell references in variables.
    pub fn with_ids(self: &Arc<Self>, mapper: &IdMapper) -> Arc<Self> {
        let ends = [self.ends[0].with_ids(mapper), self.ends[1].with_ids(mapper)];
        let vars = self.vars.with_ids(mapper);
        if ends == self.ends && vars.ptr_eq(&self.vars) {
            return self.clone();
        }
        Arc::new(Self {
            ends,
            vars,
            ..(**self).clone()
        })
    }
}

fn check_width(width: i64) -> Result<i64> {
    if width < 0 {
        return Err(Error::NegativeWidth(width));
    }
    check_coord(width)
}
