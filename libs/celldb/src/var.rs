//! Variables attached to cells, nodes, arcs, exports and port instances.
//!
//! A [`VarSet`] is an immutable array of [`Variable`]s sorted by key.
//! Two sets are equal iff their arrays are element-wise equal.

use std::sync::Arc;

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::CellId;
use crate::remap::IdMapper;

/// Well-known variable keys.
pub mod keys {
    /// Name of the global signal driven by a global-source node.
    pub const GLOBAL_NAME: &str = "SCHEM_global_name";
    /// Electrical characteristic of a global-source node (e.g. `power`).
    pub const GLOBAL_CHARACTERISTIC: &str = "SCHEM_global_characteristic";
    /// Explicit resistance selector; a non-zero integer keeps a resistor
    /// from being shorted when parasitics are shorted.
    pub const RESISTANCE_SELECTOR: &str = "SIM_resistance_selector";
}

/// A variable key.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct VarKey(ArcStr);

impl VarKey {
    /// Creates a key, rejecting empty keys.
    pub fn new(key: impl Into<ArcStr>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(Error::EmptyVarKey);
        }
        Ok(Self(key))
    }

    /// The key text.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key text.
    #[inline]
    pub fn text(&self) -> &ArcStr {
        &self.0
    }
}

/// The value of a variable.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum VarValue {
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A string.
    Str(ArcStr),
    /// A reference to a cell.
    Cell(CellId),
    /// An integer array.
    Ints(Arc<[i64]>),
}

/// The unit of a variable's value.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Unit {
    /// Unitless.
    #[default]
    None,
    /// Ohms.
    Resistance,
    /// Farads.
    Capacitance,
    /// Henries.
    Inductance,
    /// Amperes.
    Current,
    /// Volts.
    Voltage,
    /// Distance.
    Distance,
    /// Seconds.
    Time,
}

impl Unit {
    const ALL: [Unit; 8] = [
        Unit::None,
        Unit::Resistance,
        Unit::Capacitance,
        Unit::Inductance,
        Unit::Current,
        Unit::Voltage,
        Unit::Distance,
        Unit::Time,
    ];

    pub(crate) fn code(&self) -> u8 {
        Self::ALL.iter().position(|u| u == self).unwrap_or(0) as u8
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// Variable display and inheritance flags.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct VarFlags(u8);

impl VarFlags {
    /// No flags.
    pub const NONE: VarFlags = VarFlags(0);
    /// Instances inherit this variable from their prototype.
    pub const INHERIT: VarFlags = VarFlags(1);
    /// The variable is a cell parameter.
    pub const PARAM: VarFlags = VarFlags(2);
    /// The variable is displayed only inside the cell.
    pub const INTERIOR: VarFlags = VarFlags(4);
    /// The variable is displayed.
    pub const DISPLAY: VarFlags = VarFlags(8);

    /// Returns `true` if all flags in `other` are set.
    #[inline]
    pub fn contains(&self, other: VarFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// The raw bits.
    #[inline]
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Flags from raw bits; unknown bits are dropped.
    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0x0f)
    }
}

impl std::ops::BitOr for VarFlags {
    type Output = VarFlags;
    fn bitor(self, rhs: Self) -> Self::Output {
        VarFlags(self.0 | rhs.0)
    }
}

/// A key-value pair with display flags and a unit.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Variable {
    key: VarKey,
    value: VarValue,
    flags: VarFlags,
    unit: Unit,
}

impl Variable {
    /// Creates a variable.
    pub fn new(key: VarKey, value: VarValue, flags: VarFlags, unit: Unit) -> Self {
        Self {
            key,
            value,
            flags,
            unit,
        }
    }

    /// Creates an undisplayed, unitless variable.
    pub fn plain(key: &str, value: VarValue) -> Result<Self> {
        Ok(Self::new(
            VarKey::new(ArcStr::from(key))?,
            value,
            VarFlags::NONE,
            Unit::None,
        ))
    }

    /// The key.
    #[inline]
    pub fn key(&self) -> &VarKey {
        &self.key
    }

    /// The value.
    #[inline]
    pub fn value(&self) -> &VarValue {
        &self.value
    }

    /// The flags.
    #[inline]
    pub fn flags(&self) -> VarFlags {
        self.flags
    }

    /// The unit.
    #[inline]
    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// Returns `true` for cell parameters.
    #[inline]
    pub fn is_param(&self) -> bool {
        self.flags.contains(VarFlags::PARAM)
    }

    fn with_ids(&self, mapper: &IdMapper) -> Option<Self> {
        match &self.value {
            VarValue::Cell(id) => {
                let mapped = mapper.map_cell(id);
                (&mapped != id).then(|| Self {
                    value: VarValue::Cell(mapped),
                    ..self.clone()
                })
            }
            _ => None,
        }
    }
}

/// An immutable, key-sorted set of variables.
#[derive(Clone, Debug, Default)]
pub struct VarSet(Option<Arc<[Variable]>>);

impl VarSet {
    /// The empty set.
    #[inline]
    pub fn empty() -> Self {
        Self(None)
    }

    /// Builds a set from variables in any order, rejecting duplicate keys.
    pub fn from_vars(mut vars: Vec<Variable>) -> Result<Self> {
        vars.sort_by(|a, b| a.key.cmp(&b.key));
        if let Some(w) = vars.windows(2).find(|w| w[0].key == w[1].key) {
            return Err(Error::DuplicateVarKey(w[0].key.0.clone()));
        }
        Ok(Self::from_sorted(vars))
    }

    fn from_sorted(vars: Vec<Variable>) -> Self {
        if vars.is_empty() {
            Self(None)
        } else {
            Self(Some(vars.into()))
        }
    }

    /// The variables, sorted by key.
    #[inline]
    pub fn as_slice(&self) -> &[Variable] {
        self.0.as_deref().unwrap_or(&[])
    }

    /// Iterates over the variables in key order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.as_slice().iter()
    }

    /// The number of variables.
    #[inline]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Returns `true` if there are no variables.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Returns a set with every variable of `vars` added or replaced.
    pub fn with_all(&self, vars: impl IntoIterator<Item = Variable>) -> Self {
        vars.into_iter().fold(self.clone(), |acc, v| acc.with(v))
    }

    /// Looks up a variable by key.
    pub fn get(&self, key: &str) -> Option<&Variable> {
        let vars = self.as_slice();
        vars.binary_search_by(|v| v.key.as_str().cmp(key))
            .ok()
            .map(|i| &vars[i])
    }

    /// Returns a set with `var` added or replaced.
    ///
    /// Returns a clone sharing the same array if `var` is already present.
    pub fn with(&self, var: Variable) -> Self {
        let vars = self.as_slice();
        match vars.binary_search_by(|v| v.key.cmp(&var.key)) {
            Ok(i) if vars[i] == var => self.clone(),
            Ok(i) => {
                let mut next = vars.to_vec();
                next[i] = var;
                Self::from_sorted(next)
            }
            Err(i) => {
                let mut next = Vec::with_capacity(vars.len() + 1);
                next.extend_from_slice(&vars[..i]);
                next.push(var);
                next.extend_from_slice(&vars[i..]);
                Self::from_sorted(next)
            }
        }
    }

    /// Returns a set without the given key.
    pub fn without(&self, key: &str) -> Self {
        let vars = self.as_slice();
        match vars.binary_search_by(|v| v.key.as_str().cmp(key)) {
            Ok(i) => {
                let mut next = vars.to_vec();
                next.remove(i);
                Self::from_sorted(next)
            }
            Err(_) => self.clone(),
        }
    }

    /// Returns `true` if both sets share the same array.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Returns `true` if any variable is inheritable or displayed only inside the cell.
    pub fn has_inheritable_or_interior(&self) -> bool {
        self.iter().any(|v| {
            v.flags.contains(VarFlags::INHERIT) || v.flags.contains(VarFlags::INTERIOR)
        })
    }

    /// The parameters in this set.
    pub fn params(&self) -> impl Iterator<Item = &Variable> {
        self.iter().filter(|v| v.is_param())
    }

    /// The integer value of a variable, if present and an integer.
    pub fn int(&self, key: &str) -> Option<i64> {
        match self.get(key)?.value() {
            VarValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// The string value of a variable, if present and a string.
    pub fn str(&self, key: &str) -> Option<&ArcStr> {
        match self.get(key)?.value() {
            VarValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn with_ids(&self, mapper: &IdMapper) -> Self {
        let vars = self.as_slice();
        if vars.iter().all(|v| v.with_ids(mapper).is_none()) {
            return self.clone();
        }
        Self::from_sorted(
            vars.iter()
                .map(|v| v.with_ids(mapper).unwrap_or_else(|| v.clone()))
                .collect(),
        )
    }
}

impl PartialEq for VarSet {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.as_slice() == other.as_slice()
    }
}

impl Eq for VarSet {}
