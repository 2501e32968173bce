use std::collections::{BTreeMap, BTreeSet};

use crate::ids::{SiteId, Tick, VarId};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Running,
    Committed,
    Aborted,
}

/// Per-transaction state. All mutation flows through `TransactionManager`;
/// this type is a plain value.
#[derive(Clone, Debug)]
pub struct Transaction {
    /// Internal numeric id, assigned as `transactions.len()` at the
    /// moment the transaction begins — not used for any logic, just
    /// carried for parity with the original's `Transaction.id`.
    pub id: u64,
    pub name: String,
    pub status: Status,
    pub start_ts: Tick,
    pub commit_ts: Option<Tick>,
    pub snapshot: BTreeMap<VarId, i64>,
    pub uncommitted: BTreeMap<VarId, i64>,
    pub read_set: BTreeSet<VarId>,
    pub write_set: BTreeSet<VarId>,
    pub read_history: BTreeMap<VarId, Vec<i64>>,
    pub write_sites: BTreeSet<SiteId>,
}

impl Transaction {
    pub fn new(id: u64, name: String, start_ts: Tick, snapshot: BTreeMap<VarId, i64>) -> Self {
        Transaction {
            id,
            name,
            status: Status::Running,
            start_ts,
            commit_ts: None,
            snapshot,
            uncommitted: BTreeMap::new(),
            read_set: BTreeSet::new(),
            write_set: BTreeSet::new(),
            read_history: BTreeMap::new(),
            write_sites: BTreeSet::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, Status::Committed | Status::Aborted)
    }

    pub fn record_read(&mut self, var: VarId, value: i64) {
        self.read_set.insert(var);
        self.read_history.entry(var).or_default().push(value);
    }
}
