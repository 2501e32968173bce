use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::ids::{SiteId, Tick, VarId};
use crate::variable::{initial_value, is_hosted_at, NUM_VARIABLES};

/// Local storage of whatever replicas the placement rule assigned to one
/// site. Carries no notion of site status; that belongs to `Site`.
#[derive(Clone, Debug)]
pub struct DataManager {
    values: BTreeMap<VarId, i64>,
}

impl DataManager {
    fn for_site(site_id: SiteId) -> Self {
        let mut values = BTreeMap::new();
        for i in 1..=NUM_VARIABLES {
            let var = VarId(i);
            if is_hosted_at(var, site_id) {
                values.insert(var, initial_value(var));
            }
        }
        DataManager { values }
    }

    pub fn has(&self, var: VarId) -> bool {
        self.values.contains_key(&var)
    }

    pub fn get(&self, var: VarId) -> Option<i64> {
        self.values.get(&var).copied()
    }

    /// Returns `false` without effect if the variable is not hosted here.
    pub fn write(&mut self, var: VarId, value: i64) -> bool {
        match self.values.get_mut(&var) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn all_variables(&self) -> impl Iterator<Item = (VarId, i64)> + '_ {
        self.values.iter().map(|(&var, &value)| (var, value))
    }
}

/// Status of a site, carrying exactly the state each status needs. This
/// eliminates the "a down site's readability mask is empty" invariant by
/// construction instead of maintaining it as a side condition on a
/// separately-tracked set.
#[derive(Clone, Debug)]
pub enum Status {
    Up,
    Down,
    Recovering { unreadable_evens: BTreeSet<VarId> },
}

#[derive(Clone, Debug)]
pub struct Site {
    id: SiteId,
    status: Status,
    last_failure_time: Option<Tick>,
    data: DataManager,
}

impl Site {
    pub fn new(id: SiteId) -> Self {
        Site {
            id,
            status: Status::Up,
            last_failure_time: None,
            data: DataManager::for_site(id),
        }
    }

    pub fn id(&self) -> SiteId {
        self.id
    }

    pub fn is_down(&self) -> bool {
        matches!(self.status, Status::Down)
    }

    pub fn data(&self) -> &DataManager {
        &self.data
    }

    pub fn last_failure_time(&self) -> Option<Tick> {
        self.last_failure_time
    }

    /// Whether `var` currently has a readable copy at this site under
    /// Available Copies rules.
    pub fn is_readable(&self, var: VarId) -> bool {
        if !self.data.has(var) {
            return false;
        }
        match &self.status {
            Status::Up => true,
            Status::Down => false,
            Status::Recovering { unreadable_evens } => {
                !var.is_even() || !unreadable_evens.contains(&var)
            }
        }
    }

    /// Applies a committed write. Returns `false` (write ignored) if the
    /// site is down. A recovering site earns readability for an
    /// even-indexed variable the moment a write lands on it.
    pub fn write_variable(&mut self, var: VarId, value: i64) -> bool {
        if self.is_down() {
            return false;
        }
        self.data.write(var, value);
        if let Status::Recovering { unreadable_evens } = &mut self.status {
            if var.is_even() {
                unreadable_evens.remove(&var);
            }
        }
        true
    }

    pub fn fail(&mut self, now: Tick) {
        self.status = Status::Down;
        self.last_failure_time = Some(now);
    }

    /// Odd-hosted (single-replica) variables are immediately readable on
    /// recovery, since they never lost their only copy. Even-hosted
    /// (replicated) variables must earn readability via a post-recovery
    /// write.
    pub fn recover(&mut self) {
        let unreadable_evens = self
            .data
            .all_variables()
            .map(|(var, _)| var)
            .filter(|var| var.is_even())
            .collect();
        self.status = Status::Recovering { unreadable_evens };
    }

    /// Human-readable dump lines for this site, matching the phrasing the
    /// test oracle pattern-matches on.
    pub fn dump(&self) -> Vec<String> {
        let mut lines = vec![format!("=== Site {} ===", self.id)];

        if self.is_down() {
            lines.push("This site is down".to_string());
            return lines;
        }

        let mut unchanged = 0usize;

        for (var, value) in self.data.all_variables() {
            match &self.status {
                Status::Recovering { unreadable_evens } => {
                    if var.is_even() && unreadable_evens.contains(&var) {
                        lines.push(format!("{var}: is not available for reading"));
                    } else {
                        lines.push(format!(
                            "{var}: {value} (available at site {} for reading as it is \
                             the only copy or has been written after recovery)",
                            self.id
                        ));
                    }
                }
                _ => {
                    if value == initial_value(var) {
                        unchanged += 1;
                    } else {
                        lines.push(format!("{var}: {value} at site {}", self.id));
                    }
                }
            }
        }

        if !matches!(self.status, Status::Recovering { .. }) && unchanged != 0 {
            lines.push("All other variables have their initial values.".to_string());
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn up_site_reads_every_hosted_variable() {
        let site = Site::new(SiteId(2));
        assert!(site.is_readable(VarId(1))); // odd, hosted only at s2
        assert!(site.is_readable(VarId(2))); // even, hosted everywhere
        assert!(!site.is_readable(VarId(3))); // odd, hosted at s4 not s2
    }

    #[test]
    fn down_site_reads_nothing() {
        let mut site = Site::new(SiteId(2));
        site.fail(Tick(1));
        assert!(!site.is_readable(VarId(2)));
        assert!(!site.write_variable(VarId(2), 99));
    }

    #[test]
    fn recovering_site_reads_odds_immediately_but_not_evens() {
        let mut site = Site::new(SiteId(2));
        site.fail(Tick(1));
        site.recover();
        assert!(site.is_readable(VarId(1)), "odd-hosted replica readable immediately");
        assert!(!site.is_readable(VarId(2)), "even replica not yet readable");

        assert!(site.write_variable(VarId(2), 444));
        assert!(site.is_readable(VarId(2)), "write since recovery earns readability");
    }
}
