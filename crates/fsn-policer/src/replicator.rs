use fsn_placement::NodeInfo;
use fsn_types::Address;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{PolicerError, PolicerResult};

/// Request to create `quantity` more copies of an object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicationTask {
    pub address: Address,
    pub quantity: u32,
    /// Candidates that did not confirm holding a copy.
    pub nodes: Vec<NodeInfo>,
}

/// Fire-and-forget sink of replication work.
pub trait Replicator: Send + Sync {
    fn schedule(&self, task: ReplicationTask) -> PolicerResult<()>;
}

/// Replicator backed by a bounded channel. A full queue drops the task;
/// the next pass schedules it again.
#[derive(Clone, Debug)]
pub struct ChannelReplicator {
    tx: mpsc::Sender<ReplicationTask>,
}

impl ChannelReplicator {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ReplicationTask>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl Replicator for ChannelReplicator {
    fn schedule(&self, task: ReplicationTask) -> PolicerResult<()> {
        match self.tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(task)) => {
                warn!(address = %task.address, "replication queue full, task dropped");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PolicerError::ReplicatorClosed),
        }
    }
}
