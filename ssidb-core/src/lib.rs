#![allow(dead_code)]

// The database here is a toy, but the concurrency control it models is
// not: it is Serializable Snapshot Isolation (SSI) layered on top of an
// Available Copies replication scheme, the same combination many real
// systems reach for when they want serializability without paying for
// two-phase locking.
//
// Simplifications:
//
//  - A fixed universe of 20 variables and 10 sites, known up front.
//  - Even-indexed variables are fully replicated; odd-indexed variables
//    live at exactly one site. No repartitioning, no elastic membership.
//  - Everything runs on one logical clock, advanced one command at a
//    time. There is no real concurrency and no wall-clock time; "Tick"
//    is the only notion of "when".
//
// The general sequence looks like this:
//
//  1. `begin(T)` takes a snapshot of every variable that currently has
//     a readable replica somewhere, and stamps T with the clock's
//     current tick as its start timestamp.
//
//  2. Reads within T are served from T's own uncommitted writes first,
//     then from the snapshot taken at step 1. If a variable isn't in
//     the snapshot (no site was up and readable for it at `begin`
//     time), T aborts immediately rather than returning a stale or
//     partial answer.
//
//  3. Writes within T are buffered locally and never touch a site until
//     commit. The set of sites that are up and would receive the write
//     is recorded as it's issued, since Available Copies bases the
//     write's validity on who was up when it was requested, not who's
//     up at commit time.
//
//  4. `end(T)` runs five phases: first-committer-wins write-write
//     conflict detection against anything committed after T started;
//     commit timestamp assignment and version history append; rw/ww
//     dependency edge recording against every other live transaction;
//     a cycle check over that dependency graph (a cycle is exactly the
//     signature of a non-serializable history under SSI); and finally,
//     if none of the above aborted T, applying its buffered writes to
//     every site that was recorded as a write participant and is still
//     up.
//
//  5. A site going down at any point aborts every running transaction
//     whose write footprint touched it, since Available Copies cannot
//     guarantee that write survives to commit.
//
// None of this needs threads: every operation above runs to completion
// before the next command is read, so the whole simulation is one big
// deterministic state machine driven by a script of commands.

use std::cell::RefCell;
use std::rc::Rc;

use ssidb_base::Result;

pub mod ids;
pub mod site;
pub mod site_manager;
pub mod transaction;
pub mod transaction_manager;
pub mod variable;

pub use ids::{SiteId, Tick, VarId};
pub use site_manager::SiteManager;
pub use transaction_manager::{AbortReason, EndOutcome, ReadOutcome, TransactionManager};

/// One parsed line of a workload script.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Begin { name: String },
    Read { name: String, var: VarId },
    Write { name: String, var: VarId, value: i64 },
    End { name: String },
    Fail { site: SiteId },
    Recover { site: SiteId },
    Dump,
    DumpSite { site: SiteId },
    DumpVariable { var: VarId },
}

/// Owns the shared clock and wires `SiteManager` to `TransactionManager`
/// via the one-way failure callback, so callers never touch either
/// manager directly once the engine exists.
pub struct Engine {
    clock: Tick,
    sites: SiteManager,
    txns: Rc<RefCell<TransactionManager>>,
}

impl Engine {
    pub fn new() -> Self {
        let mut sites = SiteManager::new();
        let txns = Rc::new(RefCell::new(TransactionManager::new()));
        sites.set_observer(txns.clone());
        Engine {
            clock: Tick(0),
            sites,
            txns,
        }
    }

    pub fn now(&self) -> Tick {
        self.clock
    }

    pub fn sites(&self) -> &SiteManager {
        &self.sites
    }

    pub fn transaction_status(&self, name: &str) -> Option<transaction::Status> {
        self.txns.borrow().transaction_status(name)
    }

    pub fn last_read(&self, name: &str, var: VarId) -> Option<i64> {
        self.txns.borrow().last_read(name, var)
    }

    pub fn version_history(&self, var: VarId) -> Vec<(Tick, String)> {
        self.txns.borrow().version_history(var).to_vec()
    }

    /// Advances the clock by one and dispatches a single parsed command.
    /// Every command, including `fail`/`recover`/`dump`, counts as a tick:
    /// the clock is a command counter first and a commit-ordering device
    /// second.
    pub fn dispatch(&mut self, cmd: Command) -> Result<()> {
        self.clock = self.clock.next();
        self.txns.borrow_mut().prune_aborted();

        match cmd {
            Command::Begin { name } => {
                self.txns.borrow_mut().begin(name, self.clock, &self.sites);
            }
            Command::Read { name, var } => {
                self.txns.borrow_mut().read_request(&name, var);
            }
            Command::Write { name, var, value } => {
                self.txns
                    .borrow_mut()
                    .write_request(&name, var, value, &self.sites);
            }
            Command::End { name } => {
                let mut clock = self.clock;
                let outcome = self.txns.borrow_mut().end(&name, &mut clock, &mut self.sites);
                self.clock = clock;
                let _ = outcome;
            }
            Command::Fail { site } => {
                self.sites.fail(site, self.clock)?;
            }
            Command::Recover { site } => {
                self.sites.recover(site)?;
            }
            Command::Dump => {
                for line in self.sites.dump_all() {
                    tracing::info!("{line}");
                }
            }
            Command::DumpSite { site } => {
                for line in self.sites.dump_site(site)? {
                    tracing::info!("{line}");
                }
            }
            Command::DumpVariable { var } => {
                for line in self.sites.dump_variable(var) {
                    tracing::info!("{line}");
                }
            }
        }
        Ok(())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_read_write_commit_round_trip() {
        let mut engine = Engine::new();
        engine.dispatch(Command::Begin { name: "T1".into() }).unwrap();
        engine
            .dispatch(Command::Write {
                name: "T1".into(),
                var: VarId(2),
                value: 999,
            })
            .unwrap();
        engine.dispatch(Command::End { name: "T1".into() }).unwrap();
        assert_eq!(
            engine.transaction_status("T1"),
            Some(transaction::Status::Committed)
        );
    }

    #[test]
    fn site_failure_aborts_dependent_transaction() {
        let mut engine = Engine::new();
        engine.dispatch(Command::Begin { name: "T1".into() }).unwrap();
        // x3 lives only at site 4.
        engine
            .dispatch(Command::Write {
                name: "T1".into(),
                var: VarId(3),
                value: 55,
            })
            .unwrap();
        engine.dispatch(Command::Fail { site: SiteId(4) }).unwrap();
        assert_eq!(
            engine.transaction_status("T1"),
            Some(transaction::Status::Aborted)
        );
    }

    #[test]
    fn out_of_range_site_command_is_an_error() {
        let mut engine = Engine::new();
        assert!(engine.dispatch(Command::Fail { site: SiteId(99) }).is_err());
    }

    fn begin(engine: &mut Engine, name: &str) {
        engine
            .dispatch(Command::Begin { name: name.into() })
            .unwrap();
    }

    fn read(engine: &mut Engine, name: &str, var: u8) {
        engine
            .dispatch(Command::Read {
                name: name.into(),
                var: VarId(var),
            })
            .unwrap();
    }

    fn write(engine: &mut Engine, name: &str, var: u8, value: i64) {
        engine
            .dispatch(Command::Write {
                name: name.into(),
                var: VarId(var),
                value,
            })
            .unwrap();
    }

    fn end(engine: &mut Engine, name: &str) {
        engine.dispatch(Command::End { name: name.into() }).unwrap();
    }

    fn status(engine: &Engine, name: &str) -> transaction::Status {
        engine.transaction_status(name).unwrap()
    }

    /// Scenario 1 — basic SI commit: a write by T1 becomes visible to a
    /// transaction that begins after T1 commits.
    #[test]
    fn scenario_basic_si_commit() {
        let mut engine = Engine::new();
        begin(&mut engine, "T1");
        write(&mut engine, "T1", 1, 101);
        end(&mut engine, "T1");
        assert_eq!(status(&engine, "T1"), transaction::Status::Committed);

        begin(&mut engine, "T2");
        read(&mut engine, "T2", 1);
        assert_eq!(engine.last_read("T2", VarId(1)), Some(101));
        end(&mut engine, "T2");
        assert_eq!(status(&engine, "T2"), transaction::Status::Committed);
    }

    /// Scenario 2 — SI write-write conflict: the second committer loses
    /// under first-committer-wins, even with no read-based cycle.
    #[test]
    fn scenario_si_write_write_conflict() {
        let mut engine = Engine::new();
        begin(&mut engine, "T1");
        begin(&mut engine, "T2");
        write(&mut engine, "T1", 1, 5);
        write(&mut engine, "T2", 1, 6);
        end(&mut engine, "T1");
        end(&mut engine, "T2");
        assert_eq!(status(&engine, "T1"), transaction::Status::Committed);
        assert_eq!(status(&engine, "T2"), transaction::Status::Aborted);
    }

    /// Scenario 3 — SSI cycle (write skew): both transactions read what
    /// the other writes, forming a dependency cycle certified at commit.
    #[test]
    fn scenario_ssi_write_skew_cycle() {
        let mut engine = Engine::new();
        begin(&mut engine, "T1");
        begin(&mut engine, "T2");
        read(&mut engine, "T1", 1);
        read(&mut engine, "T2", 2);
        write(&mut engine, "T1", 2, 22);
        write(&mut engine, "T2", 1, 11);
        end(&mut engine, "T1");
        end(&mut engine, "T2");
        assert_eq!(status(&engine, "T1"), transaction::Status::Committed);
        assert_eq!(status(&engine, "T2"), transaction::Status::Aborted);
    }

    /// Scenario 5 — Available Copies on recovery: a recovered replicated
    /// site withholds an even variable until a post-recovery write lands.
    #[test]
    fn scenario_available_copies_on_recovery() {
        let mut engine = Engine::new();
        engine.dispatch(Command::Fail { site: SiteId(3) }).unwrap();
        begin(&mut engine, "T1");
        write(&mut engine, "T1", 4, 444);
        end(&mut engine, "T1");
        assert_eq!(status(&engine, "T1"), transaction::Status::Committed);

        engine.dispatch(Command::Recover { site: SiteId(3) }).unwrap();
        begin(&mut engine, "T2");
        read(&mut engine, "T2", 4);
        assert_eq!(engine.last_read("T2", VarId(4)), Some(444));
        end(&mut engine, "T2");
        assert_eq!(status(&engine, "T2"), transaction::Status::Committed);
    }

    /// Scenario 6 — unreplicated variable survives failure only in the
    /// sense that the snapshot omits it once its one host is down.
    #[test]
    fn scenario_unreplicated_variable_unreadable_after_failure() {
        let mut engine = Engine::new();
        begin(&mut engine, "T1");
        write(&mut engine, "T1", 3, 333);
        end(&mut engine, "T1");
        assert_eq!(status(&engine, "T1"), transaction::Status::Committed);

        engine.dispatch(Command::Fail { site: SiteId(4) }).unwrap();
        begin(&mut engine, "T2");
        read(&mut engine, "T2", 3);
        assert_eq!(status(&engine, "T2"), transaction::Status::Aborted);
    }

    #[test]
    fn read_your_writes_within_one_transaction() {
        let mut engine = Engine::new();
        begin(&mut engine, "T1");
        write(&mut engine, "T1", 5, 77);
        read(&mut engine, "T1", 5);
        assert_eq!(engine.last_read("T1", VarId(5)), Some(77));
    }

    #[test]
    fn begin_end_with_no_reads_or_writes_always_commits() {
        let mut engine = Engine::new();
        begin(&mut engine, "T1");
        end(&mut engine, "T1");
        assert_eq!(status(&engine, "T1"), transaction::Status::Committed);
    }

    #[test]
    fn repeated_fail_and_recover_are_idempotent_in_effect() {
        let mut engine = Engine::new();
        engine.dispatch(Command::Fail { site: SiteId(5) }).unwrap();
        engine.dispatch(Command::Fail { site: SiteId(5) }).unwrap();
        assert!(engine.sites().is_down(SiteId(5)));

        engine.dispatch(Command::Recover { site: SiteId(5) }).unwrap();
        engine.dispatch(Command::Recover { site: SiteId(5) }).unwrap();
        assert!(!engine.sites().is_down(SiteId(5)));
    }

    #[test]
    fn version_history_is_strictly_increasing_in_commit_ts() {
        let mut engine = Engine::new();
        for (name, value) in [("T1", 1), ("T2", 2), ("T3", 3)] {
            begin(&mut engine, name);
            write(&mut engine, name, 2, value);
            end(&mut engine, name);
        }
        let history = engine.version_history(VarId(2));
        assert_eq!(history.len(), 3);
        assert!(history.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn unknown_transaction_name_is_silently_ignored() {
        let mut engine = Engine::new();
        // None of these should panic or error; there is no such T1.
        read(&mut engine, "T1", 2);
        write(&mut engine, "T1", 2, 1);
        end(&mut engine, "T1");
        assert_eq!(engine.transaction_status("T1"), None);
    }
}
