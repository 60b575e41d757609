//! Pure autoscaler logic. No I/O: the caller supplies the observed
//! node/job counts and acts on the returned decision.

use serde::{Deserialize, Serialize};

/// Capacity ceilings and slack the autoscaler decides against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AutoscalePolicy {
    pub max_per_node: u32,
    pub max_nodes: u32,
    pub overflow_threshold: i64,
}

impl Default for AutoscalePolicy {
    fn default() -> Self {
        AutoscalePolicy {
            max_per_node: 1,
            max_nodes: 3,
            overflow_threshold: 2,
        }
    }
}

impl AutoscalePolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_per_node == 0 {
            return Err("max_per_node must be nonzero".to_string());
        }
        if self.max_nodes == 0 {
            return Err("max_nodes must be nonzero".to_string());
        }
        Ok(())
    }
}

/// The result of one autoscaler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleDecision {
    pub launch_needed: bool,
    pub to_launch: u32,
}

impl ScaleDecision {
    fn none() -> Self {
        ScaleDecision {
            launch_needed: false,
            to_launch: 0,
        }
    }
}

/// The capacity/deficit/bootstrap formula, evaluated for one tick.
pub fn decide(
    policy: &AutoscalePolicy,
    active_node_count: u32,
    unfinished_job_count: u32,
) -> ScaleDecision {
    let capacity = active_node_count as i64 * policy.max_per_node as i64;
    let deficit = unfinished_job_count as i64 - capacity - policy.overflow_threshold;

    let bootstrap = unfinished_job_count > 0 && active_node_count == 0;
    let overflow = deficit >= 0;
    let launch_needed = bootstrap || overflow;

    if !launch_needed {
        return ScaleDecision::none();
    }

    let raw_to_launch = std::cmp::max(1, deficit / policy.max_per_node as i64).max(0) as u32;
    let headroom = policy.max_nodes.saturating_sub(active_node_count);
    let to_launch = raw_to_launch.min(headroom);

    if to_launch == 0 {
        return ScaleDecision::none();
    }

    ScaleDecision {
        launch_needed: true,
        to_launch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_launches_one_node() {
        let policy = AutoscalePolicy {
            max_per_node: 2,
            max_nodes: 3,
            overflow_threshold: 2,
        };
        let decision = decide(&policy, 0, 1);
        assert_eq!(decision.to_launch, 1);
        assert!(decision.launch_needed);
    }

    #[test]
    fn ceiling_blocks_further_launches() {
        let policy = AutoscalePolicy {
            max_per_node: 2,
            max_nodes: 3,
            overflow_threshold: 2,
        };
        let decision = decide(&policy, 3, 100);
        assert_eq!(decision.to_launch, 0);
    }

    #[test]
    fn below_overflow_threshold_does_nothing() {
        let policy = AutoscalePolicy {
            max_per_node: 2,
            max_nodes: 3,
            overflow_threshold: 2,
        };
        // capacity = 2*2 = 4, unfinished = 5, deficit = 5-4-2 = -1 < 0, not bootstrap.
        let decision = decide(&policy, 2, 5);
        assert_eq!(decision.to_launch, 0);
        assert!(!decision.launch_needed);
    }

    #[test]
    fn never_terminates_nodes() {
        // The autoscaler has no notion of shrinking; to_launch is always >= 0
        // by construction (u32), so there is nothing to additionally assert
        // beyond the type itself — documented here as the contract.
        let policy = AutoscalePolicy::default();
        let decision = decide(&policy, 5, 0);
        assert_eq!(decision.to_launch, 0);
    }

    #[test]
    fn monotonic_in_unfinished_job_count() {
        let policy = AutoscalePolicy {
            max_per_node: 2,
            max_nodes: 50,
            overflow_threshold: 2,
        };
        let mut previous = 0;
        for unfinished in 0..200 {
            let decision = decide(&policy, 1, unfinished);
            assert!(
                decision.to_launch >= previous,
                "to_launch regressed at unfinished={unfinished}"
            );
            previous = decision.to_launch;
        }
    }
}
