use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one of the fixed replica sites, numbered `1..=NUM_SITES`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct SiteId(pub u8);

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one of the fixed logical variables, numbered
/// `1..=NUM_VARIABLES`. Displays as `x{n}`, matching the variable names
/// used in workload scripts.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct VarId(pub u8);

impl VarId {
    pub fn is_even(self) -> bool {
        self.0 % 2 == 0
    }

    /// Parses a variable name such as `"x13"` back into a `VarId`.
    pub fn parse(s: &str) -> Option<VarId> {
        s.strip_prefix('x')?.parse().ok().map(VarId)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// A scalar logical clock tick. Strictly increasing across the run.
#[derive(
    Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
pub struct Tick(pub u64);

impl Tick {
    pub fn next(self) -> Tick {
        Tick(self.0 + 1)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
