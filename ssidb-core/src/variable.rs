use crate::ids::{SiteId, VarId};

pub const NUM_SITES: u8 = 10;
pub const NUM_VARIABLES: u8 = 20;

/// Where the replicas of a given variable live under the fixed placement
/// rule: even-indexed variables are replicated to every site; odd-indexed
/// variables live on exactly one site, `s(1 + i mod 10)`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Sites {
    All,
    One(SiteId),
}

impl Sites {
    /// The concrete list of site ids this selector covers, in ascending order.
    pub fn ids(self) -> Vec<SiteId> {
        match self {
            Sites::All => (1..=NUM_SITES).map(SiteId).collect(),
            Sites::One(id) => vec![id],
        }
    }
}

/// Pure placement function: `Variable.get_sites` from the original design.
pub fn sites_of(var: VarId) -> Sites {
    if var.is_even() {
        Sites::All
    } else {
        Sites::One(SiteId(1 + var.0 % 10))
    }
}

pub fn is_hosted_at(var: VarId, site: SiteId) -> bool {
    match sites_of(var) {
        Sites::All => true,
        Sites::One(id) => id == site,
    }
}

/// Bootstrapped value of `xi`: `10 * i`.
pub fn initial_value(var: VarId) -> i64 {
    10 * i64::from(var.0)
}
