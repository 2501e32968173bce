use std::collections::{BTreeMap, BTreeSet};

use crate::ids::{Tick, VarId};
use crate::site_manager::{SiteFailureObserver, SiteManager};
use crate::transaction::{Status, Transaction};
use crate::variable::sites_of;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadOutcome {
    /// The value observed, from either the write buffer or the snapshot.
    Value(i64),
    /// The variable had no readable replica at `begin` time; the
    /// transaction was aborted as a side effect.
    AbortedNoSnapshot,
    /// The transaction name is unknown or already terminal; ignored.
    Ignored,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AbortReason {
    WriteWriteConflict,
    SsiCycle,
    SiteFailure,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EndOutcome {
    Committed,
    Aborted(AbortReason),
    /// The transaction name is unknown or already terminal; ignored.
    Ignored,
}

/// Coordinates every transaction and certifies serializability via a
/// dependency graph on top of per-variable Snapshot Isolation.
pub struct TransactionManager {
    transactions: BTreeMap<String, Transaction>,
    last_commit_ts: BTreeMap<VarId, Tick>,
    last_writer: BTreeMap<VarId, String>,
    version_history: BTreeMap<VarId, Vec<(Tick, String)>>,
    dep_graph: BTreeMap<String, BTreeSet<String>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        TransactionManager {
            transactions: BTreeMap::new(),
            last_commit_ts: BTreeMap::new(),
            last_writer: BTreeMap::new(),
            version_history: BTreeMap::new(),
            dep_graph: BTreeMap::new(),
        }
    }

    pub fn version_history(&self, var: VarId) -> &[(Tick, String)] {
        self.version_history
            .get(&var)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn transaction_status(&self, name: &str) -> Option<Status> {
        self.transactions.get(name).map(|t| t.status)
    }

    /// The most recent value `name` observed reading `var`, whether
    /// served from its own write buffer or from its snapshot.
    pub fn last_read(&self, name: &str, var: VarId) -> Option<i64> {
        self.transactions
            .get(name)?
            .read_history
            .get(&var)?
            .last()
            .copied()
    }

    /// Drops already-aborted transactions from the dependency graph. Safe
    /// to call on every dispatch; pruning on abort directly would be
    /// equally correct, this just matches doing it lazily.
    pub fn prune_aborted(&mut self) {
        let aborted: Vec<String> = self
            .transactions
            .iter()
            .filter(|(_, t)| t.status == Status::Aborted)
            .map(|(name, _)| name.clone())
            .collect();
        for name in aborted {
            self.remove_from_graph(&name);
        }
    }

    pub fn begin(&mut self, name: String, now: Tick, sites: &SiteManager) {
        let id = self.transactions.len() as u64;
        let snapshot = sites.current_variables();
        let txn = Transaction::new(id, name.clone(), now, snapshot);
        tracing::info!("Starting transaction {name} at ts={now}");
        self.transactions.insert(name, txn);
    }

    pub fn write_request(&mut self, name: &str, var: VarId, value: i64, sites: &SiteManager) {
        let Some(txn) = self.transactions.get_mut(name) else {
            return;
        };
        if txn.is_terminal() {
            return;
        }

        txn.uncommitted.insert(var, value);
        txn.write_set.insert(var);
        tracing::debug!("{name} buffered write {var} = {value}");

        for site_id in sites.writable_sites(var) {
            txn.write_sites.insert(site_id);
        }
    }

    pub fn read_request(&mut self, name: &str, var: VarId) -> ReadOutcome {
        let Some(txn) = self.transactions.get_mut(name) else {
            return ReadOutcome::Ignored;
        };
        if txn.is_terminal() {
            return ReadOutcome::Ignored;
        }

        let value = if let Some(&buffered) = txn.uncommitted.get(&var) {
            buffered
        } else if let Some(&snapshotted) = txn.snapshot.get(&var) {
            snapshotted
        } else {
            tracing::info!(
                "{name} cannot read {var} because it is not in the snapshot; aborting {name}"
            );
            txn.status = Status::Aborted;
            return ReadOutcome::AbortedNoSnapshot;
        };

        txn.record_read(var, value);
        tracing::info!("{name} read the value {value} of variable {var}");
        ReadOutcome::Value(value)
    }

    /// Aborts every running transaction whose write footprint depended on
    /// `site_id` surviving until commit. Available Copies requires every
    /// write participant to still be up when the write is applied.
    pub fn abort_transactions_on_site_failure(&mut self, site_id: crate::ids::SiteId) {
        for txn in self.transactions.values_mut() {
            if txn.is_terminal() {
                continue;
            }
            if txn.write_sites.contains(&site_id) {
                tracing::info!("{} aborted as site {site_id} failed", txn.name);
                txn.status = Status::Aborted;
            }
        }
        self.prune_aborted();
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        if from == to {
            return;
        }
        self.dep_graph
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    fn has_cycle_from(&self, start: &str) -> bool {
        fn dfs(
            graph: &BTreeMap<String, BTreeSet<String>>,
            node: &str,
            visited: &mut BTreeSet<String>,
            stack: &mut BTreeSet<String>,
        ) -> bool {
            visited.insert(node.to_string());
            stack.insert(node.to_string());
            if let Some(neighbors) = graph.get(node) {
                for next in neighbors {
                    if !visited.contains(next) {
                        if dfs(graph, next, visited, stack) {
                            return true;
                        }
                    } else if stack.contains(next) {
                        return true;
                    }
                }
            }
            stack.remove(node);
            false
        }

        let mut visited = BTreeSet::new();
        let mut stack = BTreeSet::new();
        dfs(&self.dep_graph, start, &mut visited, &mut stack)
    }

    fn remove_from_graph(&mut self, name: &str) {
        self.dep_graph.remove(name);
        for neighbors in self.dep_graph.values_mut() {
            neighbors.remove(name);
        }
    }

    /// Adds SSI dependency edges for `name`'s writes against every other
    /// non-aborted transaction: rw anti-dependencies from readers, and ww
    /// ordering edges against other writers.
    fn record_conflicts_on_commit(&mut self, name: &str) {
        let commit_ts = self.transactions[name].commit_ts;
        let start_ts = self.transactions[name].start_ts;
        let write_set = self.transactions[name].write_set.clone();

        let others: Vec<(String, BTreeSet<VarId>, BTreeSet<VarId>, Tick)> = self
            .transactions
            .iter()
            .filter(|(other_name, other)| {
                other_name.as_str() != name && other.status != Status::Aborted
            })
            .map(|(other_name, other)| {
                (
                    other_name.clone(),
                    other.read_set.clone(),
                    other.write_set.clone(),
                    other.start_ts,
                )
            })
            .collect();

        for var in &write_set {
            for (other_name, other_reads, other_writes, other_start_ts) in &others {
                let has_read = other_reads.contains(var);
                let has_write = other_writes.contains(var);

                if has_read {
                    if let Some(commit_ts) = commit_ts {
                        if *other_start_ts < commit_ts {
                            self.add_edge(other_name, name);
                        }
                    }
                }

                if has_write && !has_read {
                    if *other_start_ts <= start_ts {
                        self.add_edge(other_name, name);
                    } else {
                        self.add_edge(name, other_name);
                    }
                }
            }
        }
    }

    /// Attempts to commit `name`. `now` is the shared Engine clock: it is
    /// advanced by one, here, iff a commit timestamp is actually assigned
    /// (phase 2 of the algorithm below).
    pub fn end(&mut self, name: &str, now: &mut Tick, sites: &mut SiteManager) -> EndOutcome {
        let Some(txn) = self.transactions.get(name) else {
            return EndOutcome::Ignored;
        };
        if txn.is_terminal() {
            return EndOutcome::Ignored;
        }

        // Phase 1: SI write-write check, first-committer-wins.
        for var in self.transactions[name].uncommitted.keys().copied().collect::<Vec<_>>() {
            let last_ts = self.last_commit_ts.get(&var).copied();
            let last_writer = self.last_writer.get(&var).cloned();
            let conflicts = matches!(
                (last_ts, &last_writer),
                (Some(last_ts), Some(writer))
                    if last_ts > self.transactions[name].start_ts && writer != name
            );
            if conflicts {
                tracing::info!(
                    "{name} aborted: SI write-write conflict on {var} (last writer {:?} at ts={:?})",
                    last_writer,
                    last_ts,
                );
                self.transactions.get_mut(name).unwrap().status = Status::Aborted;
                self.remove_from_graph(name);
                return EndOutcome::Aborted(AbortReason::WriteWriteConflict);
            }
        }

        // Phase 2: assign the commit timestamp and extend version history.
        *now = now.next();
        let commit_ts = *now;
        {
            let txn = self.transactions.get_mut(name).unwrap();
            txn.commit_ts = Some(commit_ts);
            for var in txn.uncommitted.keys() {
                self.version_history
                    .entry(*var)
                    .or_default()
                    .push((commit_ts, name.to_string()));
            }
        }

        // Phase 3: record SSI dependency edges.
        self.record_conflicts_on_commit(name);

        // Phase 4: cycle check.
        if self.has_cycle_from(name) {
            let txn = self.transactions.get_mut(name).unwrap();
            txn.status = Status::Aborted;
            txn.uncommitted.clear();
            self.remove_from_graph(name);
            tracing::info!("{name} aborted: SSI dependency cycle detected at commit");
            return EndOutcome::Aborted(AbortReason::SsiCycle);
        }

        // Phase 5: apply writes to every surviving write-site replica.
        let writes: Vec<(VarId, i64)> = self
            .transactions
            .get(name)
            .unwrap()
            .uncommitted
            .iter()
            .map(|(&var, &value)| (var, value))
            .collect();
        let write_sites = self.transactions[name].write_sites.clone();

        for (var, value) in writes {
            for site_id in sites_of(var).ids() {
                if !write_sites.contains(&site_id) {
                    continue;
                }
                if sites.is_down(site_id) {
                    continue;
                }
                sites.write_to_site(site_id, var, value);
            }
            self.last_commit_ts.insert(var, commit_ts);
            self.last_writer.insert(var, name.to_string());
        }

        self.transactions.get_mut(name).unwrap().status = Status::Committed;
        tracing::info!("{name} committed");
        EndOutcome::Committed
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteFailureObserver for TransactionManager {
    fn on_site_failed(&mut self, site: crate::ids::SiteId) {
        self.abort_transactions_on_site_failure(site);
    }
}
