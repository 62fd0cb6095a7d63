//! Global signals.

use std::collections::HashMap;

use arcstr::ArcStr;

use crate::diagnostics::{Cause, IssueSet, NetIssue, Severity};
use crate::element::{NodeInst, PortCharacteristic};
use crate::ids::CellId;
use crate::tech::{PrimitiveFunction, PrimitiveNode};
use crate::var::keys;

/// The global driven by power sources.
pub const POWER_NET: &str = "power";
/// The global driven by ground sources.
pub const GROUND_NET: &str = "ground";

/// A global signal and its electrical characteristic.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Global {
    name: ArcStr,
    characteristic: PortCharacteristic,
}

impl Global {
    /// Creates a global.
    pub fn new(name: impl Into<ArcStr>, characteristic: PortCharacteristic) -> Self {
        Self {
            name: name.into(),
            characteristic,
        }
    }

    /// The signal name.
    #[inline]
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The characteristic.
    #[inline]
    pub fn characteristic(&self) -> PortCharacteristic {
        self.characteristic
    }
}

/// The global signal driven by a primitive node, if it is a global source.
pub(crate) fn source(prim: &PrimitiveNode, node: &NodeInst) -> Option<Global> {
    match prim.function() {
        PrimitiveFunction::Power => Some(Global::new(POWER_NET, PortCharacteristic::Power)),
        PrimitiveFunction::Ground => Some(Global::new(GROUND_NET, PortCharacteristic::Ground)),
        PrimitiveFunction::Global => {
            let name = match node.vars().str(keys::GLOBAL_NAME) {
                Some(name) => name.clone(),
                None if !node.name().is_temp() => node.name().text().clone(),
                None => return None,
            };
            let characteristic = node
                .vars()
                .str(keys::GLOBAL_CHARACTERISTIC)
                .and_then(|c| PortCharacteristic::from_name(c))
                .unwrap_or_default();
            Some(Global::new(name, characteristic))
        }
        _ => None,
    }
}

/// Globals of one cell in order of first declaration.
#[derive(Debug, Default)]
pub(crate) struct GlobalSet {
    globals: Vec<Global>,
    index: HashMap<ArcStr, usize>,
}

impl GlobalSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds a global, returning its position.
    ///
    /// An undeclared characteristic takes the first declared one; a second,
    /// different declaration keeps the first and reports a conflict.
    pub(crate) fn add(
        &mut self,
        global: &Global,
        cell: &CellId,
        issues: &mut IssueSet<NetIssue>,
    ) -> usize {
        if let Some(&pos) = self.index.get(&global.name) {
            let existing = &mut self.globals[pos];
            match (existing.characteristic, global.characteristic) {
                (_, PortCharacteristic::Unknown) => {}
                (PortCharacteristic::Unknown, c) => existing.characteristic = c,
                (a, b) if a != b => issues.add(NetIssue::new_and_log(
                    Cause::GlobalCharacteristicConflict {
                        global: global.name.clone(),
                        kept: a.to_arcstr(),
                        discarded: b.to_arcstr(),
                    },
                    cell.clone(),
                    Severity::Warning,
                )),
                _ => {}
            }
            return pos;
        }
        let pos = self.globals.len();
        self.index.insert(global.name.clone(), pos);
        self.globals.push(global.clone());
        pos
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.globals.len()
    }

    pub(crate) fn into_vec(self) -> Vec<Global> {
        self.globals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostic;
    use crate::tests::fixtures::cell_id;
    use crate::ids::View;
    use test_log::test;

    #[test]
    fn first_declared_characteristic_wins() {
        let cell = cell_id("top", View::Schematic);
        let mut issues = IssueSet::new();
        let mut set = GlobalSet::new();
        assert_eq!(set.add(&Global::new("clk", PortCharacteristic::Unknown), &cell, &mut issues), 0);
        assert_eq!(set.add(&Global::new("clk", PortCharacteristic::Clock), &cell, &mut issues), 0);
        assert_eq!(set.add(&Global::new("rst", PortCharacteristic::Input), &cell, &mut issues), 1);
        assert!(issues.is_empty());
        set.add(&Global::new("clk", PortCharacteristic::Input), &cell, &mut issues);
        assert_eq!(issues.len(), 1);
        assert!(!issues.iter().next().unwrap().severity().is_error());
        let globals = set.into_vec();
        assert_eq!(globals[0].characteristic(), PortCharacteristic::Clock);
    }
}
