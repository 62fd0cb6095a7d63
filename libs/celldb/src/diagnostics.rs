//! Utilities for collecting diagnostics.
//!
//! Naming, width and global-characteristic conflicts found while computing
//! schematic equivalence are not fatal. They are collected into an
//! [`IssueSet`] of [`NetIssue`]s, logged as they are found, and the
//! computation continues with a deterministic tie-break.

use std::fmt::{Debug, Display, Formatter};

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::ids::CellId;

/// A diagnostic issue that should be reported to users.
pub trait Diagnostic: Debug + Display {
    /// Returns an optional help message that should indicate
    /// what users need to do to resolve an issue.
    fn help(&self) -> Option<Box<dyn Display>> {
        None
    }

    /// Returns the severity of this issue.
    ///
    /// The default implementation returns [`Severity::default`].
    fn severity(&self) -> Severity {
        Default::default()
    }
}

/// An enumeration of possible severity levels.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Severity {
    /// An informational message.
    Info,
    /// A warning.
    #[default]
    Warning,
    /// An error. Often, but not always, fatal.
    Error,
}

impl Severity {
    /// Returns log level corresponding to this severity.
    #[inline]
    pub const fn as_tracing_level(&self) -> Level {
        match *self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error => Level::ERROR,
        }
    }

    /// Returns `true` if the severity is [`Severity::Error`].
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(*self, Self::Error)
    }
}

/// A collection of issues.
#[derive(Debug, Clone)]
pub struct IssueSet<T> {
    issues: Vec<T>,
    num_errors: usize,
    num_warnings: usize,
}

impl<T> IssueSet<T> {
    /// Creates a new, empty issue set.
    #[inline]
    pub fn new() -> Self {
        Self {
            issues: Vec::new(),
            num_errors: 0,
            num_warnings: 0,
        }
    }

    /// Returns an iterator over all issues in the set.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.issues.iter()
    }

    /// The number of issues in this issue set.
    #[inline]
    pub fn len(&self) -> usize {
        self.issues.len()
    }

    /// Returns `true` if this issue set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

impl<T: Diagnostic> IssueSet<T> {
    /// Adds the given issue to the issue set.
    #[inline]
    pub fn add(&mut self, issue: T) {
        match issue.severity() {
            Severity::Error => self.num_errors += 1,
            Severity::Warning => self.num_warnings += 1,
            _ => (),
        };
        self.issues.push(issue);
    }

    /// Moves all issues of `other` into this set.
    pub fn extend(&mut self, other: IssueSet<T>) {
        self.num_errors += other.num_errors;
        self.num_warnings += other.num_warnings;
        self.issues.extend(other.issues);
    }

    /// Returns `true` if this issue set contains an error.
    pub fn has_error(&self) -> bool {
        self.num_errors > 0
    }

    /// The number of errors in this issue set.
    #[inline]
    pub fn num_errors(&self) -> usize {
        self.num_errors
    }

    /// Returns `true` if this issue set contains a warning.
    pub fn has_warning(&self) -> bool {
        self.num_warnings > 0
    }

    /// The number of warnings in this issue set.
    #[inline]
    pub fn num_warnings(&self) -> usize {
        self.num_warnings
    }
}

impl<T> IntoIterator for IssueSet<T> {
    type Item = T;
    type IntoIter = <std::vec::Vec<T> as IntoIterator>::IntoIter;
    fn into_iter(self) -> Self::IntoIter {
        self.issues.into_iter()
    }
}

impl<T> Default for IssueSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An issue found while resolving the nets of a schematic or icon cell.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct NetIssue {
    cause: Cause,
    severity: Severity,
    cell: CellId,
}

/// The cause of a [`NetIssue`].
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Cause {
    /// Elements of different bus widths are connected.
    ///
    /// The wider width is kept.
    WidthMismatch {
        /// A name on the net, if any.
        net: Option<ArcStr>,
        /// The width kept.
        kept: usize,
        /// The width discarded.
        discarded: usize,
    },
    /// A global signal is declared with two different characteristics.
    ///
    /// The first declared characteristic is kept.
    GlobalCharacteristicConflict {
        /// The global signal.
        global: ArcStr,
        /// The characteristic kept.
        kept: ArcStr,
        /// The conflicting characteristic.
        discarded: ArcStr,
    },
    /// Two arrayed instances expand to the same instance sub-name.
    DuplicateSubName {
        /// The duplicated sub-name.
        name: ArcStr,
    },
    /// An icon export has no counterpart in the main schematic.
    UnresolvedIconExport {
        /// The export name.
        export: ArcStr,
        /// The main schematic.
        schematic: CellId,
    },
    /// A port binding's width is neither the instance width, the port
    /// width, nor their product.
    PortWidthMismatch {
        /// The instance name.
        instance: ArcStr,
        /// The port name.
        port: ArcStr,
        /// The width of the connected net.
        net_width: usize,
        /// The width the binding expects.
        expected: usize,
    },
}

impl Diagnostic for NetIssue {
    fn severity(&self) -> Severity {
        self.severity
    }
}

impl NetIssue {
    /// Creates a new issue from the given cause and severity.
    pub(crate) fn new(cause: Cause, cell: CellId, severity: Severity) -> Self {
        Self {
            cause,
            severity,
            cell,
        }
    }

    /// Creates a new issue and logs it immediately.
    ///
    /// The log level will be selected according to the given severity.
    pub(crate) fn new_and_log(cause: Cause, cell: CellId, severity: Severity) -> Self {
        let result = Self::new(cause, cell, severity);
        match severity {
            Severity::Info => tracing::event!(Level::INFO, issue = ?result.cause, "{}", result),
            Severity::Warning => tracing::event!(Level::WARN, issue = ?result.cause, "{}", result),
            Severity::Error => tracing::event!(Level::ERROR, issue = ?result.cause, "{}", result),
        }
        result
    }

    /// Gets the underlying cause of this issue.
    #[inline]
    pub fn cause(&self) -> &Cause {
        &self.cause
    }

    /// The cell in which the issue was found.
    #[inline]
    pub fn cell(&self) -> &CellId {
        &self.cell
    }
}

impl Display for NetIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} in cell `{}`", self.cause, self.cell)
    }
}

impl Display for Cause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WidthMismatch {
                net,
                kept,
                discarded,
            } => {
                write!(f, "width mismatch ({} vs {}), keeping {}", kept, discarded, kept)?;
                if let Some(net) = net {
                    write!(f, " on net `{}`", net)?;
                }
                Ok(())
            }
            Self::GlobalCharacteristicConflict {
                global,
                kept,
                discarded,
            } => write!(
                f,
                "global `{}` declared as both {} and {}, keeping {}",
                global, kept, discarded, kept
            ),
            Self::DuplicateSubName { name } => {
                write!(f, "duplicate arrayed instance name `{}`", name)
            }
            Self::UnresolvedIconExport { export, schematic } => write!(
                f,
                "icon export `{}` has no counterpart in `{}`",
                export, schematic
            ),
            Self::PortWidthMismatch {
                instance,
                port,
                net_width,
                expected,
            } => write!(
                f,
                "port `{}` of `{}` is connected to a net of width {}, expected {}",
                port, instance, net_width, expected
            ),
        }
    }
}
