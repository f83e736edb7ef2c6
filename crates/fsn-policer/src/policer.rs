use std::sync::{Arc, Mutex};

use fsn_placement::{ContainerSource, LocalInfo, NodeInfo, PlacementBuilder, PlacementError};
use fsn_service::{CancelToken, RemoteClient};
use fsn_types::Address;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::PolicerConfig;
use crate::error::PolicerResult;
use crate::replicator::{ReplicationTask, Replicator};
use crate::source::{ObjectInhumer, ObjectListSource};

/// Invoked with an address whose local copy placement no longer needs.
/// Whether and when to delete it is up to the callee.
pub type RedundantCopyCallback = Arc<dyn Fn(Address) + Send + Sync>;

/// Collaborators of a [`Policer`].
pub struct PolicerDeps {
    pub objects: Arc<dyn ObjectListSource>,
    pub inhumer: Arc<dyn ObjectInhumer>,
    pub containers: Arc<dyn ContainerSource>,
    pub builder: Arc<dyn PlacementBuilder>,
    pub client: Arc<dyn RemoteClient>,
    pub replicator: Arc<dyn Replicator>,
    pub local: LocalInfo,
    pub on_redundant: Option<RedundantCopyCallback>,
}

/// What policing one object decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Every group has its copies.
    Satisfied,
    /// Replication tasks were scheduled.
    Replicating { tasks: usize },
    /// The local copy is not needed by any group.
    Redundant,
    /// The local node is outside the placement.
    NotPoliced,
    /// The container is gone and the object was inhumed.
    Inhumed,
}

/// Counters of one reconciliation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub selected: usize,
    pub processed: usize,
    pub replication_tasks: usize,
    pub redundant: usize,
    pub inhumed: usize,
    pub failed: usize,
    /// Addresses left unprocessed because the pass was cancelled.
    pub undone: usize,
}

#[derive(Debug)]
struct Scope {
    work_scope: usize,
    undone: usize,
}

pub struct Policer {
    config: PolicerConfig,
    deps: PolicerDeps,
    scope: Mutex<Scope>,
    trigger: Notify,
}

impl Policer {
    pub fn new(config: PolicerConfig, deps: PolicerDeps) -> Self {
        let scope = Scope {
            work_scope: config.work_scope.max(1),
            undone: 0,
        };
        Self {
            config,
            deps,
            scope: Mutex::new(scope),
            trigger: Notify::new(),
        }
    }

    /// Current batch size.
    pub fn work_scope(&self) -> usize {
        self.scope.lock().expect("lock poisoned").work_scope
    }

    /// Request a pass without waiting for the interval.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Candidate batch size: grown by `expand_rate` percent after a
    /// completed pass, shrunk by what the previous pass left undone.
    fn next_limit(&self) -> usize {
        let scope = self.scope.lock().expect("lock poisoned");
        let current = scope.work_scope;
        let limit = if scope.undone > 0 {
            current.saturating_sub(scope.undone)
        } else {
            let rate = usize::try_from(self.config.expand_rate).unwrap_or(usize::MAX);
            current.saturating_add(current.saturating_mul(rate) / 100)
        };
        limit.max(1)
    }

    /// Police one batch of local addresses.
    pub async fn run_pass(&self, cancel: &CancelToken) -> PassReport {
        let limit = self.next_limit();
        let mut report = PassReport::default();
        let addresses = match self.deps.objects.list(limit) {
            Ok(addresses) => addresses,
            Err(e) => {
                error!(error = %e, "could not list local objects");
                return report;
            }
        };
        // the candidate is only adopted once the store can fill it
        if limit <= addresses.len() {
            self.scope.lock().expect("lock poisoned").work_scope = limit;
        }
        debug!(limit, selected = addresses.len(), "policer pass started");
        report.selected = addresses.len();
        report.undone = addresses.len();

        for address in &addresses {
            if cancel.is_cancelled() {
                break;
            }
            match self.process_object(address, cancel).await {
                Ok(Outcome::Replicating { tasks }) => report.replication_tasks += tasks,
                Ok(Outcome::Redundant) => report.redundant += 1,
                Ok(Outcome::Inhumed) => report.inhumed += 1,
                Ok(Outcome::Satisfied | Outcome::NotPoliced) => {}
                Err(e) => {
                    warn!(%address, error = %e, "could not police object");
                    report.failed += 1;
                }
            }
            report.processed += 1;
            report.undone -= 1;
        }

        self.scope.lock().expect("lock poisoned").undone = report.undone;
        report
    }

    /// Compare the local copy of `address` against its placement.
    pub async fn process_object(&self, address: &Address, cancel: &CancelToken) -> PolicerResult<Outcome> {
        let container = match self.deps.containers.get(&address.container()) {
            Ok(container) => container,
            Err(PlacementError::ContainerNotFound(cid)) => {
                info!(%address, container = %cid, "container is gone, inhuming object");
                self.deps.inhumer.inhume(&[*address])?;
                return Ok(Outcome::Inhumed);
            }
            Err(e) => return Err(e.into()),
        };
        let policy = &container.policy;
        let groups = self.deps.builder.build_placement(address, policy)?;

        let local = &self.deps.local;
        if !groups.iter().flatten().any(|node| local.is_local(node)) {
            debug!(%address, "local node outside placement, not policed");
            return Ok(Outcome::NotPoliced);
        }

        let mut tasks = 0;
        let mut needed_locally = false;
        let mut redundant_locally = false;
        for (group, replica) in groups.iter().zip(&policy.replicas) {
            let mut shortage = replica.count;
            let mut missing = Vec::new();
            for node in group {
                if local.is_local(node) {
                    if shortage == 0 {
                        redundant_locally = true;
                    } else {
                        shortage -= 1;
                        needed_locally = true;
                    }
                } else if shortage > 0 {
                    if self.holds(node, address, cancel).await {
                        shortage -= 1;
                    } else {
                        missing.push(node.clone());
                    }
                }
            }
            if shortage > 0 {
                debug!(%address, shortage, "replicas missing");
                self.deps.replicator.schedule(ReplicationTask {
                    address: *address,
                    quantity: shortage,
                    nodes: missing,
                })?;
                tasks += 1;
            }
        }

        if tasks > 0 {
            return Ok(Outcome::Replicating { tasks });
        }
        if redundant_locally && !needed_locally {
            debug!(%address, "redundant local copy");
            if let Some(callback) = &self.deps.on_redundant {
                callback(*address);
            }
            return Ok(Outcome::Redundant);
        }
        Ok(Outcome::Satisfied)
    }

    /// Whether `node` answers a head request in time. Errors count as not
    /// holding the object.
    ///
    /// Peers of a group are asked one at a time: the shortage left after
    /// each answer decides whether the next peer is asked at all.
    async fn holds(&self, node: &NodeInfo, address: &Address, cancel: &CancelToken) -> bool {
        let head = self.deps.client.head(node, address, false, cancel);
        match tokio::time::timeout(self.config.head_timeout(), head).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(%address, %node, error = %e, "remote head failed");
                false
            }
            Err(_) => {
                warn!(%address, %node, "remote head timed out");
                false
            }
        }
    }

    /// Run passes on the configured interval and on [`Policer::trigger`]
    /// until cancelled. Passes never overlap.
    pub async fn run(self: Arc<Self>, cancel: CancelToken) {
        let mut ticker = tokio::time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval = ?self.config.interval(), "policer started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.trigger.notified() => {}
            }
            let report = self.run_pass(&cancel).await;
            info!(
                selected = report.selected,
                replication = report.replication_tasks,
                redundant = report.redundant,
                inhumed = report.inhumed,
                failed = report.failed,
                work_scope = self.work_scope(),
                "policer pass finished"
            );
        }
        info!("policer stopped");
    }
}
