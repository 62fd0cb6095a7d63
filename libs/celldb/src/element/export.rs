use std::sync::Arc;

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

use super::derive_with;
use crate::error::Result;
use crate::ids::{ExportId, NodeId, PortProtoId};
use crate::name::Name;
use crate::remap::IdMapper;
use crate::var::{VarSet, Variable};

/// The electrical characteristic of a port.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum PortCharacteristic {
    /// Unspecified.
    #[default]
    Unknown,
    /// An input.
    Input,
    /// An output.
    Output,
    /// A bidirectional port.
    Bidirectional,
    /// A power supply.
    Power,
    /// Ground.
    Ground,
    /// A clock.
    Clock,
    /// A reference signal.
    Reference,
}

impl PortCharacteristic {
    const ALL: [PortCharacteristic; 8] = [
        Self::Unknown,
        Self::Input,
        Self::Output,
        Self::Bidirectional,
        Self::Power,
        Self::Ground,
        Self::Clock,
        Self::Reference,
    ];

    /// The lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Input => "input",
            Self::Output => "output",
            Self::Bidirectional => "bidirectional",
            Self::Power => "power",
            Self::Ground => "ground",
            Self::Clock => "clock",
            Self::Reference => "reference",
        }
    }

    /// Parses a lowercase name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.name() == name)
    }

    pub(crate) fn code(&self) -> u8 {
        Self::ALL.iter().position(|c| c == self).unwrap_or(0) as u8
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// The name as a shared string.
    pub fn to_arcstr(&self) -> ArcStr {
        ArcStr::from(self.name())
    }
}

/// A port of a cell, visible to parent cells.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Export {
    id: ExportId,
    name: Name,
    original_node: NodeId,
    original_port: PortProtoId,
    characteristic: PortCharacteristic,
    flags: u32,
    vars: VarSet,
}

impl Export {
    /// Creates an export of `port` on `node`.
    pub fn new(
        id: ExportId,
        name: Name,
        original_node: NodeId,
        original_port: PortProtoId,
        characteristic: PortCharacteristic,
    ) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            id,
            name,
            original_node,
            original_port,
            characteristic,
            flags: 0,
            vars: VarSet::empty(),
        }))
    }

    /// The id, stable across renames.
    #[inline]
    pub fn id(&self) -> &ExportId {
        &self.id
    }

    /// The chronological index.
    #[inline]
    pub fn chron(&self) -> u32 {
        self.id.chron()
    }

    /// The name.
    #[inline]
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// The node whose port is exported.
    #[inline]
    pub fn original_node(&self) -> NodeId {
        self.original_node
    }

    /// The exported port.
    #[inline]
    pub fn original_port(&self) -> &PortProtoId {
        &self.original_port
    }

    /// The electrical characteristic.
    #[inline]
    pub fn characteristic(&self) -> PortCharacteristic {
        self.characteristic
    }

    /// Export flags.
    #[inline]
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// The export's variables.
    #[inline]
    pub fn vars(&self) -> &VarSet {
        &self.vars
    }

    /// Returns an export with a different name.
    pub fn with_name(self: &Arc<Self>, name: Name) -> Arc<Self> {
        derive_with(self, |e| e.name = name)
    }

    /// Returns an export of a different port.
    pub fn with_original(self: &Arc<Self>, node: NodeId, port: PortProtoId) -> Arc<Self> {
        derive_with(self, |e| {
            e.original_node = node;
            e.original_port = port;
        })
    }

    /// Returns an export with a different characteristic.
    pub fn with_characteristic(self: &Arc<Self>, characteristic: PortCharacteristic) -> Arc<Self> {
        derive_with(self, |e| e.characteristic = characteristic)
    }

    /// Returns an export with different flags.
    pub fn with_flags(self: &Arc<Self>, flags: u32) -> Arc<Self> {
        derive_with(self, |e| e.flags = flags)
    }

    /// Returns an export with a variable added or replaced.
    pub fn with_var(self: &Arc<Self>, var: Variable) -> Arc<Self> {
        let vars = self.vars.with(var);
        if vars.ptr_eq(&self.vars) {
            return self.clone();
        }
        derive_with(self, |e| e.vars = vars)
    }

    /// Returns an export with different variables.
    pub fn with_vars(self: &Arc<Self>, vars: VarSet) -> Arc<Self> {
        derive_with(self, |e| e.vars = vars)
    }

    /// Rewrites the export id, the exported port and cell references in
    /// variables.
    pub fn with_ids(self: &Arc<Self>, mapper: &IdMapper) -> Arc<Self> {
        let id = mapper.map_export(&self.id);
        let original_port = mapper.map_port(&self.original_port);
        let vars = self.vars.with_ids(mapper);
        if id == self.id && original_port == self.original_port && vars.ptr_eq(&self.vars) {
            return self.clone();
        }
        Arc::new(Self {
            id,
            original_port,
            vars,
            ..(**self).clone()
        })
    }
}
