use fsn_types::Address;

use crate::builder::PlacementBuilder;
use crate::error::PlacementResult;
use crate::netmap::NodeInfo;
use crate::policy::PlacementPolicy;

/// How successes are counted during a traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuccessPolicy {
    /// Each group must reach its replica count. Batches are sized to the
    /// copies still missing in the current group.
    PerGroup,
    /// No threshold: every group is handed out whole and the traversal
    /// succeeds once all groups were visited.
    Untracked,
    /// Groups are flattened into one list and `n` successes overall are
    /// enough. Batches hold `n` nodes.
    Flat(u32),
}

/// Walks placement groups for a single operation.
///
/// `remaining[i]` is the number of successes still wanted from group `i`
/// (negative when untracked). Callers alternate [`Traverser::next`] with
/// [`Traverser::submit_success`] until [`Traverser::success`] holds or
/// `next` returns an empty batch.
#[derive(Debug)]
pub struct Traverser {
    groups: Vec<Vec<NodeInfo>>,
    remaining: Vec<i64>,
}

impl Traverser {
    pub fn new(
        builder: &dyn PlacementBuilder,
        address: &Address,
        policy: &PlacementPolicy,
        success: SuccessPolicy,
    ) -> PlacementResult<Self> {
        let groups = builder.build_placement(address, policy)?;
        Ok(Self::from_groups(groups, policy, success))
    }

    pub fn from_groups(groups: Vec<Vec<NodeInfo>>, policy: &PlacementPolicy, success: SuccessPolicy) -> Self {
        match success {
            SuccessPolicy::Flat(n) => Self {
                groups: vec![groups.into_iter().flatten().collect()],
                remaining: vec![i64::from(n)],
            },
            SuccessPolicy::PerGroup => {
                let remaining = policy.replicas.iter().map(|r| i64::from(r.count)).collect();
                Self::aligned(groups, remaining)
            }
            SuccessPolicy::Untracked => {
                let remaining = vec![-1; policy.replicas.len()];
                Self::aligned(groups, remaining)
            }
        }
    }

    /// Pairs groups with counters. Extra groups without a descriptor are
    /// not tracked.
    fn aligned(groups: Vec<Vec<NodeInfo>>, mut remaining: Vec<i64>) -> Self {
        remaining.resize(groups.len().max(remaining.len()), -1);
        let mut groups = groups;
        groups.resize(remaining.len(), Vec::new());
        Self { groups, remaining }
    }

    /// Drop leading groups that are done: drained and untracked, or whose
    /// counter reached zero.
    fn skip_finished(&mut self) {
        while let (Some(group), Some(&rem)) = (self.groups.first(), self.remaining.first()) {
            if rem == 0 || (group.is_empty() && rem < 0) {
                self.groups.remove(0);
                self.remaining.remove(0);
            } else {
                break;
            }
        }
    }

    /// Next batch of nodes to contact.
    ///
    /// Empty once the groups are exhausted, or when the current group has
    /// fewer nodes left than successes it still needs. In the latter case
    /// only a [`Traverser::submit_success`] can move the traversal on.
    pub fn next(&mut self) -> Vec<NodeInfo> {
        self.skip_finished();
        let (Some(group), Some(&rem)) = (self.groups.first_mut(), self.remaining.first()) else {
            return Vec::new();
        };
        let count = if rem < 0 { group.len() } else { rem as usize };
        if group.len() < count {
            return Vec::new();
        }
        group.drain(..count).collect()
    }

    /// Count one success against the current group.
    pub fn submit_success(&mut self) {
        if let Some(rem) = self.remaining.first_mut() {
            *rem -= 1;
        }
    }

    pub fn success(&self) -> bool {
        self.remaining.iter().all(|rem| *rem <= 0)
    }
}
