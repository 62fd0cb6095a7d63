//! Binary form of revisions and backups.
//!
//! All integers are big-endian. A revision is written as
//!
//! ```text
//! magic "CELL" | version u16 | meta | #nodes u32 | #arcs u32 | #exports u32
//!              | nodes.. | arcs.. | exports..
//!              | #deleted u32 | deleted export chrons.. | #usages u32 | usage cells..
//! ```
//!
//! with elements in their in-memory order. Strings are a `u32` byte length
//! followed by UTF-8; every variable array is prefixed by its length. Ids are
//! written as `i64` so that corrupt negative ids are detected on decode.
//!
//! The trailer keeps what the elements alone do not determine: exports the
//! cell has deleted, and the order of its usage slots, including slots whose
//! subcell is no longer instantiated.
//!
//! Decoding rebuilds every record through its validating factory and the
//! revision from its elements and trailer, then runs [`CellRevision::check`].

use std::io::{self, Read, Write};
use std::sync::Arc;

use arcstr::ArcStr;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use fixedbitset::FixedBitSet;
use tracing::Level;

use crate::backup::CellBackup;
use crate::element::{ArcEnd, ArcInst, CellMeta, Export, NodeInst, PortCharacteristic};
use crate::error::{Error, Result};
use crate::geom::{Orientation, Point, Size};
use crate::ids::{
    ArcId, ArcProtoId, CellId, CellName, LibId, NodeId, NodeProtoId, PortProtoId,
    PrimitiveNodeId, TechId, View,
};
use crate::name::Name;
use crate::revision::CellRevision;
use crate::tech::TechPool;
use crate::var::{Unit, VarFlags, VarKey, VarSet, VarValue, Variable};

/// Leading bytes of every encoded revision.
pub const MAGIC: [u8; 4] = *b"CELL";
/// The format version written by this crate.
pub const VERSION: u16 = 1;

const PROTO_CELL: u8 = 0;
const PROTO_PRIMITIVE: u8 = 1;

const VALUE_BOOL: u8 = 0;
const VALUE_INT: u8 = 1;
const VALUE_STR: u8 = 2;
const VALUE_CELL: u8 = 3;
const VALUE_INTS: u8 = 4;

/// Encodes a revision.
///
/// Fails only if an array or string is too long for its length prefix.
pub fn encode_revision(rev: &CellRevision) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_revision(&mut buf, rev)?;
    Ok(buf)
}

/// Decodes a revision, rejecting trailing bytes.
pub fn decode_revision(mut bytes: &[u8]) -> Result<Arc<CellRevision>> {
    let rev = read_revision(&mut bytes)?;
    if !bytes.is_empty() {
        return Err(Error::Decode(format!("{} trailing bytes", bytes.len())));
    }
    Ok(rev)
}

/// Encodes a backup.
pub fn encode_backup(backup: &CellBackup) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_backup(&mut buf, backup)?;
    Ok(buf)
}

/// Decodes a backup against a technology pool.
pub fn decode_backup(mut bytes: &[u8], pool: &TechPool) -> Result<Arc<CellBackup>> {
    let backup = read_backup(&mut bytes, pool)?;
    if !bytes.is_empty() {
        return Err(Error::Decode(format!("{} trailing bytes", bytes.len())));
    }
    Ok(backup)
}

/// Writes a revision.
pub fn write_revision(w: &mut impl Write, rev: &CellRevision) -> Result<()> {
    let _guard = tracing::span!(Level::DEBUG, "encoding cell revision", cell = %rev.cell_id()).entered();
    let mut enc = Encoder { w };
    enc.w.write_all(&MAGIC)?;
    enc.w.write_u16::<BigEndian>(VERSION)?;
    enc.meta(rev.meta())?;
    enc.len(rev.nodes().len())?;
    enc.len(rev.arcs().len())?;
    enc.len(rev.exports().len())?;
    for node in rev.nodes().iter() {
        enc.node(node)?;
    }
    for arc in rev.arcs().iter() {
        enc.arc(arc)?;
    }
    for export in rev.exports().iter() {
        enc.export(export)?;
    }
    let deleted = rev.deleted_exports();
    enc.len(deleted.count_ones(..))?;
    for chron in deleted.ones() {
        enc.i64(chron as i64)?;
    }
    enc.len(rev.usages().len())?;
    for usage in rev.usages() {
        enc.cell_id(usage.proto())?;
    }
    Ok(())
}

/// Reads a revision.
pub fn read_revision(r: &mut impl Read) -> Result<Arc<CellRevision>> {
    let _guard = tracing::span!(Level::DEBUG, "decoding cell revision").entered();
    let mut dec = Decoder { r };
    let mut magic = [0u8; 4];
    dec.r.read_exact(&mut magic).map_err(eof)?;
    if magic != MAGIC {
        return Err(Error::Decode("bad magic".to_string()));
    }
    let version = dec.r.read_u16::<BigEndian>().map_err(eof)?;
    if version != VERSION {
        return Err(Error::Decode(format!("unsupported version {}", version)));
    }
    let meta = dec.meta()?;
    let cell = meta.cell_id().clone();
    tracing::event!(Level::TRACE, cell = %cell, "decoded cell metadata");
    let num_nodes = dec.len()?;
    let num_arcs = dec.len()?;
    let num_exports = dec.len()?;
    let nodes = (0..num_nodes)
        .map(|_| dec.node())
        .collect::<Result<Vec<_>>>()?;
    let arcs = (0..num_arcs)
        .map(|_| dec.arc())
        .collect::<Result<Vec<_>>>()?;
    let exports = (0..num_exports)
        .map(|_| dec.export(&cell))
        .collect::<Result<Vec<_>>>()?;
    let num_deleted = dec.len()?;
    let mut deleted = FixedBitSet::new();
    for _ in 0..num_deleted {
        let chron = dec.id("export")? as usize;
        if chron >= deleted.len() {
            deleted.grow(chron + 1);
        }
        deleted.insert(chron);
    }
    let num_slots = dec.len()?;
    let mut usage_slots = Vec::new();
    for _ in 0..num_slots {
        let proto = dec.cell_id()?;
        if usage_slots.contains(&proto) {
            return Err(Error::Decode(format!("duplicate usage slot for {}", proto)));
        }
        usage_slots.push(proto);
    }
    let rev = CellRevision::restore(
        meta,
        nodes.into(),
        arcs.into(),
        exports.into(),
        usage_slots,
        deleted,
    )?;
    rev.check()?;
    Ok(rev)
}

/// Writes a backup: the modified flag, then the revision.
pub fn write_backup(w: &mut impl Write, backup: &CellBackup) -> Result<()> {
    w.write_u8(backup.is_modified() as u8)?;
    write_revision(w, backup.revision())
}

/// Reads a backup, restricting `pool` to the technologies it uses.
pub fn read_backup(r: &mut impl Read, pool: &TechPool) -> Result<Arc<CellBackup>> {
    let modified = match r.read_u8().map_err(eof)? {
        0 => false,
        1 => true,
        b => return Err(Error::Decode(format!("invalid modified flag {}", b))),
    };
    let rev = read_revision(r)?;
    let backup = CellBackup::new(rev.clone(), pool)?;
    if modified {
        backup.with(rev, true, pool)
    } else {
        Ok(backup)
    }
}

fn eof(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::Decode("unexpected end of data".to_string())
    } else {
        e.into()
    }
}

struct Encoder<'a, W> {
    w: &'a mut W,
}

impl<W: Write> Encoder<'_, W> {
    fn len(&mut self, n: usize) -> Result<()> {
        let n = u32::try_from(n).map_err(|_| Error::Decode(format!("length {} too large", n)))?;
        self.w.write_u32::<BigEndian>(n)?;
        Ok(())
    }

    fn str(&mut self, s: &str) -> Result<()> {
        self.len(s.len())?;
        self.w.write_all(s.as_bytes())?;
        Ok(())
    }

    fn id(&mut self, id: u32) -> Result<()> {
        self.w.write_i64::<BigEndian>(id as i64)?;
        Ok(())
    }

    fn i64(&mut self, v: i64) -> Result<()> {
        self.w.write_i64::<BigEndian>(v)?;
        Ok(())
    }

    fn point(&mut self, p: Point) -> Result<()> {
        self.i64(p.x)?;
        self.i64(p.y)
    }

    fn cell_id(&mut self, cell: &CellId) -> Result<()> {
        self.str(cell.lib().name())?;
        let name = cell.cell_name();
        self.str(name.name())?;
        self.w.write_u8(name.view().code())?;
        self.w.write_u32::<BigEndian>(name.version())?;
        Ok(())
    }

    fn primitive(&mut self, id: &PrimitiveNodeId) -> Result<()> {
        self.str(id.tech().name())?;
        self.str(id.name())
    }

    fn port(&mut self, port: &PortProtoId) -> Result<()> {
        match port {
            PortProtoId::Export(e) => {
                self.w.write_u8(PROTO_CELL)?;
                self.cell_id(e.parent())?;
                self.id(e.chron())
            }
            PortProtoId::Primitive(p) => {
                self.w.write_u8(PROTO_PRIMITIVE)?;
                self.primitive(p.node())?;
                self.id(p.chron())
            }
        }
    }

    fn vars(&mut self, vars: &VarSet) -> Result<()> {
        self.len(vars.len())?;
        for var in vars.iter() {
            self.str(var.key().as_str())?;
            self.w.write_u8(var.flags().bits())?;
            self.w.write_u8(var.unit().code())?;
            match var.value() {
                VarValue::Bool(b) => {
                    self.w.write_u8(VALUE_BOOL)?;
                    self.w.write_u8(*b as u8)?;
                }
                VarValue::Int(v) => {
                    self.w.write_u8(VALUE_INT)?;
                    self.i64(*v)?;
                }
                VarValue::Str(s) => {
                    self.w.write_u8(VALUE_STR)?;
                    self.str(s)?;
                }
                VarValue::Cell(c) => {
                    self.w.write_u8(VALUE_CELL)?;
                    self.cell_id(c)?;
                }
                VarValue::Ints(vs) => {
                    self.w.write_u8(VALUE_INTS)?;
                    self.len(vs.len())?;
                    for v in vs.iter() {
                        self.i64(*v)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn meta(&mut self, meta: &CellMeta) -> Result<()> {
        self.cell_id(meta.cell_id())?;
        match meta.tech() {
            Some(tech) => {
                self.w.write_u8(1)?;
                self.str(tech.name())?;
            }
            None => self.w.write_u8(0)?,
        }
        self.w.write_u32::<BigEndian>(meta.flags())?;
        self.i64(meta.revision_date())?;
        self.vars(meta.vars())
    }

    fn node(&mut self, node: &NodeInst) -> Result<()> {
        self.id(node.id().0)?;
        match node.proto() {
            NodeProtoId::Cell(c) => {
                self.w.write_u8(PROTO_CELL)?;
                self.cell_id(c)?;
            }
            NodeProtoId::Primitive(p) => {
                self.w.write_u8(PROTO_PRIMITIVE)?;
                self.primitive(p)?;
            }
        }
        self.str(node.name().as_str())?;
        self.w.write_u8(node.orient().code())?;
        self.point(node.anchor())?;
        self.i64(node.size().w)?;
        self.i64(node.size().h)?;
        self.w.write_u32::<BigEndian>(node.flags())?;
        self.vars(node.vars())?;
        self.len(node.ports().len())?;
        for port in node.ports().iter() {
            match port {
                Some(port) => {
                    self.w.write_u8(1)?;
                    self.vars(port.vars())?;
                }
                None => self.w.write_u8(0)?,
            }
        }
        Ok(())
    }

    fn end(&mut self, end: &ArcEnd) -> Result<()> {
        self.id(end.node().0)?;
        self.port(end.port())?;
        self.point(end.location())
    }

    fn arc(&mut self, arc: &ArcInst) -> Result<()> {
        self.id(arc.id().0)?;
        self.str(arc.proto().tech().name())?;
        self.str(arc.proto().name())?;
        self.str(arc.name().as_str())?;
        self.end(arc.tail())?;
        self.end(arc.head())?;
        self.i64(arc.width())?;
        self.w.write_u32::<BigEndian>(arc.flags())?;
        self.vars(arc.vars())
    }

    fn export(&mut self, export: &Export) -> Result<()> {
        self.id(export.chron())?;
        self.str(export.name().as_str())?;
        self.id(export.original_node().0)?;
        self.port(export.original_port())?;
        self.w.write_u8(export.characteristic().code())?;
        self.w.write_u32::<BigEndian>(export.flags())?;
        self.vars(export.vars())
    }
}

struct Decoder<'a, R> {
    r: &'a mut R,
}

impl<R: Read> Decoder<'_, R> {
    fn u8(&mut self) -> Result<u8> {
        self.r.read_u8().map_err(eof)
    }

    fn u32(&mut self) -> Result<u32> {
        self.r.read_u32::<BigEndian>().map_err(eof)
    }

    fn i64(&mut self) -> Result<i64> {
        self.r.read_i64::<BigEndian>().map_err(eof)
    }

    fn len(&mut self) -> Result<usize> {
        Ok(self.u32()? as usize)
    }

    fn id(&mut self, what: &'static str) -> Result<u32> {
        let value = self.i64()?;
        u32::try_from(value).map_err(|_| Error::InvalidId { what, value })
    }

    fn str(&mut self) -> Result<ArcStr> {
        let len = self.len()?;
        let mut buf = Vec::new();
        self.r
            .by_ref()
            .take(len as u64)
            .read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(Error::Decode("unexpected end of data".to_string()));
        }
        let s = String::from_utf8(buf).map_err(|e| Error::Decode(e.to_string()))?;
        Ok(ArcStr::from(s))
    }

    fn flag(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(Error::Decode(format!("invalid flag byte {}", b))),
        }
    }

    fn point(&mut self) -> Result<Point> {
        Ok(Point::new(self.i64()?, self.i64()?))
    }

    fn cell_id(&mut self) -> Result<CellId> {
        let lib = LibId::new(self.str()?);
        let name = self.str()?;
        let code = self.u8()?;
        let view =
            View::from_code(code).ok_or_else(|| Error::Decode(format!("invalid view {}", code)))?;
        let version = self.u32()?;
        Ok(CellId::new(lib, CellName::new(name, view, version)))
    }

    fn primitive(&mut self) -> Result<PrimitiveNodeId> {
        let tech = TechId::new(self.str()?);
        Ok(PrimitiveNodeId::new(tech, self.str()?))
    }

    fn port(&mut self) -> Result<PortProtoId> {
        match self.u8()? {
            PROTO_CELL => {
                let cell = self.cell_id()?;
                Ok(PortProtoId::Export(cell.export(self.id("export")?)))
            }
            PROTO_PRIMITIVE => {
                let prim = self.primitive()?;
                Ok(PortProtoId::Primitive(prim.port(self.id("primitive port")?)))
            }
            tag => Err(Error::Decode(format!("invalid port tag {}", tag))),
        }
    }

    fn vars(&mut self) -> Result<VarSet> {
        let n = self.len()?;
        let mut vars = Vec::new();
        for _ in 0..n {
            let key = VarKey::new(self.str()?)?;
            let flags = VarFlags::from_bits(self.u8()?);
            let code = self.u8()?;
            let unit =
                Unit::from_code(code).ok_or_else(|| Error::Decode(format!("invalid unit {}", code)))?;
            let value = match self.u8()? {
                VALUE_BOOL => VarValue::Bool(self.flag()?),
                VALUE_INT => VarValue::Int(self.i64()?),
                VALUE_STR => VarValue::Str(self.str()?),
                VALUE_CELL => VarValue::Cell(self.cell_id()?),
                VALUE_INTS => {
                    let n = self.len()?;
                    let vs = (0..n).map(|_| self.i64()).collect::<Result<Vec<_>>>()?;
                    VarValue::Ints(vs.into())
                }
                tag => return Err(Error::Decode(format!("invalid value tag {}", tag))),
            };
            vars.push(Variable::new(key, value, flags, unit));
        }
        VarSet::from_vars(vars)
    }

    fn meta(&mut self) -> Result<Arc<CellMeta>> {
        let cell = self.cell_id()?;
        let tech = if self.flag()? {
            Some(TechId::new(self.str()?))
        } else {
            None
        };
        let flags = self.u32()?;
        let revision_date = self.i64()?;
        let vars = self.vars()?;
        Ok(CellMeta::from_parts(cell, tech, flags, revision_date, vars))
    }

    fn node(&mut self) -> Result<Arc<NodeInst>> {
        let id = NodeId(self.id("node")?);
        let proto = match self.u8()? {
            PROTO_CELL => NodeProtoId::Cell(self.cell_id()?),
            PROTO_PRIMITIVE => NodeProtoId::Primitive(self.primitive()?),
            tag => return Err(Error::Decode(format!("invalid prototype tag {}", tag))),
        };
        let name = Name::parse(self.str()?)?;
        let code = self.u8()?;
        let orient = Orientation::from_code(code)
            .ok_or_else(|| Error::Decode(format!("invalid orientation {}", code)))?;
        let anchor = self.point()?;
        let size = Size::new(self.i64()?, self.i64()?);
        let flags = self.u32()?;
        let vars = self.vars()?;
        let mut node = NodeInst::new(id, proto, name, orient, anchor, size)?
            .with_flags(flags)
            .with_vars(vars);
        let ports = self.len()?;
        for chron in 0..ports {
            if self.flag()? {
                let vars = self.vars()?;
                node = node.with_port_vars(chron as u32, vars);
            }
        }
        Ok(node)
    }

    fn end(&mut self) -> Result<ArcEnd> {
        let node = NodeId(self.id("node")?);
        let port = self.port()?;
        let location = self.point()?;
        ArcEnd::new(node, port, location)
    }

    fn arc(&mut self) -> Result<Arc<ArcInst>> {
        let id = ArcId(self.id("arc")?);
        let tech = TechId::new(self.str()?);
        let proto = ArcProtoId::new(tech, self.str()?);
        let name = Name::parse(self.str()?)?;
        let tail = self.end()?;
        let head = self.end()?;
        let width = self.i64()?;
        let flags = self.u32()?;
        let vars = self.vars()?;
        Ok(ArcInst::new(id, proto, name, tail, head, width)?
            .with_flags(flags)
            .with_vars(vars))
    }

    fn export(&mut self, cell: &CellId) -> Result<Arc<Export>> {
        let chron = self.id("export")?;
        let name = Name::parse(self.str()?)?;
        let node = NodeId(self.id("node")?);
        let port = self.port()?;
        let code = self.u8()?;
        let characteristic = PortCharacteristic::from_code(code)
            .ok_or_else(|| Error::Decode(format!("invalid characteristic {}", code)))?;
        let flags = self.u32()?;
        let vars = self.vars()?;
        Ok(Export::new(cell.export(chron), name, node, port, characteristic)?
            .with_flags(flags)
            .with_vars(vars))
    }
}
