use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use ssidb_base::{err, Result};

use crate::ids::{SiteId, Tick, VarId};
use crate::site::Site;
use crate::variable::{sites_of, NUM_SITES, NUM_VARIABLES};

/// One-way notification from `SiteManager` to whatever needs to react to a
/// site failure, without a bidirectional pointer cycle between the two
/// managers. Wired once, at `Engine` construction time.
pub trait SiteFailureObserver {
    fn on_site_failed(&mut self, site: SiteId);
}

pub struct SiteManager {
    sites: BTreeMap<SiteId, Site>,
    observer: Option<Rc<RefCell<dyn SiteFailureObserver>>>,
}

impl SiteManager {
    pub fn new() -> Self {
        let sites = (1..=NUM_SITES)
            .map(|i| (SiteId(i), Site::new(SiteId(i))))
            .collect();
        SiteManager {
            sites,
            observer: None,
        }
    }

    pub fn set_observer(&mut self, observer: Rc<RefCell<dyn SiteFailureObserver>>) {
        self.observer = Some(observer);
    }

    fn check_range(&self, id: SiteId) -> Result<()> {
        if id.0 == 0 || id.0 > NUM_SITES {
            return Err(err(format!(
                "site index {} out of range 1..={}",
                id.0, NUM_SITES
            )));
        }
        Ok(())
    }

    pub fn site(&self, id: SiteId) -> Result<&Site> {
        self.check_range(id)?;
        Ok(&self.sites[&id])
    }

    pub fn is_down(&self, id: SiteId) -> bool {
        self.sites.get(&id).map(Site::is_down).unwrap_or(true)
    }

    pub fn fail(&mut self, id: SiteId, now: Tick) -> Result<()> {
        self.check_range(id)?;
        self.sites.get_mut(&id).unwrap().fail(now);
        tracing::info!("Site {id} failed");

        if let Some(observer) = &self.observer {
            observer.borrow_mut().on_site_failed(id);
        }
        Ok(())
    }

    pub fn recover(&mut self, id: SiteId) -> Result<()> {
        self.check_range(id)?;
        self.sites.get_mut(&id).unwrap().recover();
        tracing::info!("Site {id} recovered");
        Ok(())
    }

    pub fn write_to_site(&mut self, id: SiteId, var: VarId, value: i64) -> bool {
        self.sites
            .get_mut(&id)
            .map(|site| site.write_variable(var, value))
            .unwrap_or(false)
    }

    /// The sites hosting `var` that are not currently down. Used both to
    /// capture a transaction's write footprint and to apply committed
    /// writes under Available Copies.
    pub fn writable_sites(&self, var: VarId) -> Vec<SiteId> {
        sites_of(var)
            .ids()
            .into_iter()
            .filter(|id| !self.is_down(*id))
            .collect()
    }

    /// The snapshot used at `begin(T)`: for each variable, the value held
    /// at the first ascending-id site with a currently readable copy.
    /// Variables with no readable replica anywhere are omitted.
    pub fn current_variables(&self) -> BTreeMap<VarId, i64> {
        let mut snapshot = BTreeMap::new();
        for i in 1..=NUM_VARIABLES {
            let var = VarId(i);
            for site_id in 1..=NUM_SITES {
                let site = &self.sites[&SiteId(site_id)];
                if site.is_readable(var) {
                    if let Some(value) = site.data().get(var) {
                        snapshot.insert(var, value);
                    }
                    break;
                }
            }
        }
        snapshot
    }

    pub fn dump_all(&self) -> Vec<String> {
        (1..=NUM_SITES)
            .flat_map(|i| self.sites[&SiteId(i)].dump())
            .collect()
    }

    pub fn dump_site(&self, id: SiteId) -> Result<Vec<String>> {
        Ok(self.site(id)?.dump())
    }

    /// `dump(xN)`: the value of `xN` at every site that hosts it and
    /// currently holds a readable copy.
    pub fn dump_variable(&self, var: VarId) -> Vec<String> {
        sites_of(var)
            .ids()
            .into_iter()
            .filter_map(|id| {
                let site = &self.sites[&id];
                site.is_readable(var)
                    .then(|| site.data().get(var))
                    .flatten()
                    .map(|value| format!("{var} at site {id}: {value}"))
            })
            .collect()
    }
}

impl Default for SiteManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fails_and_recovers_within_range() {
        let mut mgr = SiteManager::new();
        assert!(mgr.fail(SiteId(3), Tick(1)).is_ok());
        assert!(mgr.is_down(SiteId(3)));
        assert!(mgr.recover(SiteId(3)).is_ok());
        assert!(!mgr.is_down(SiteId(3)));
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let mut mgr = SiteManager::new();
        assert!(mgr.fail(SiteId(0), Tick(1)).is_err());
        assert!(mgr.fail(SiteId(11), Tick(1)).is_err());
        assert!(mgr.recover(SiteId(200)).is_err());
    }

    #[test]
    fn repeated_fail_is_idempotent_in_effect() {
        let mut mgr = SiteManager::new();
        mgr.fail(SiteId(2), Tick(1)).unwrap();
        mgr.fail(SiteId(2), Tick(2)).unwrap();
        assert!(mgr.is_down(SiteId(2)));
    }

    #[test]
    fn snapshot_omits_variables_with_no_readable_replica() {
        let mut mgr = SiteManager::new();
        // x3 lives only at site 4.
        mgr.fail(SiteId(4), Tick(1)).unwrap();
        let snap = mgr.current_variables();
        assert!(!snap.contains_key(&VarId(3)));
        assert!(snap.contains_key(&VarId(2)));
    }
}
